// Checkpoints and the effect journal that make each unit of execution atomic

use std::collections::VecDeque;

use crate::host::{CellChange, CellDefaults, CellId, ChargeReason, CursorId, Host};
use crate::interpreter::events::{EventRegistry, QueuedEvent};
use crate::interpreter::ops::access::StackSlots;
use crate::memory::{heap::Heap, scope::ScopeArena};

/// Copy of every piece of runtime state an instruction can mutate
#[derive(Debug, Clone)]
pub struct Checkpoint {
    pub scopes: ScopeArena,
    pub heap: Heap,
    pub events: EventRegistry,
    pub event_queue: VecDeque<QueuedEvent>,
    pub stack_slots: StackSlots,
}

/// A host effect waiting for its unit to commit
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    Charge { sp: u64, reason: ChargeReason },
    CellChanged(CellChange),
    CursorMoved { cursor: CursorId, position: i64 },
    ResetCell { cell: CellId, defaults: CellDefaults },
}

/// Host effects recorded while a unit runs.
///
/// Platform API calls are not journaled: they reach the host immediately
/// and are not undone by a rollback.
#[derive(Debug, Clone, Default)]
pub struct Journal {
    effects: Vec<Effect>,
    pending_charge: u64,
}

impl Journal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, effect: Effect) {
        if let Effect::Charge { sp, .. } = &effect {
            self.pending_charge = self.pending_charge.saturating_add(*sp);
        }
        self.effects.push(effect);
    }

    /// Energy recorded but not yet handed to the host
    pub fn pending_charge(&self) -> u64 {
        self.pending_charge
    }

    pub fn effects(&self) -> &[Effect] {
        &self.effects
    }

    pub fn len(&self) -> usize {
        self.effects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.effects.is_empty()
    }

    /// Hand every effect to the host in order. Returns the sp charged.
    pub fn flush<H: Host + ?Sized>(&mut self, host: &mut H) -> u64 {
        let charged = self.pending_charge;
        for effect in self.effects.drain(..) {
            match effect {
                Effect::Charge { sp, reason } => host.charge(sp, reason),
                Effect::CellChanged(change) => host.cell_changed(&change),
                Effect::CursorMoved { cursor, position } => host.cursor_moved(cursor, position),
                Effect::ResetCell { cell, defaults } => host.reset_cell(cell, &defaults),
            }
        }
        self.pending_charge = 0;
        charged
    }

    /// Drop every effect (the unit rolled back)
    pub fn discard(&mut self) {
        self.effects.clear();
        self.pending_charge = 0;
    }
}
