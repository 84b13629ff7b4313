//! Events: subscriptions to observable state changes
//!
//! An event definition resolves its observables once, at definition time, into
//! concrete [`Observable`]s. Every state change the engine makes is reported as
//! a [`Mutation`]; each registered event with a matching subscription has its
//! trigger evaluated and, if it holds, is enqueued exactly once for that
//! mutation. The queue is drained in FIFO order after each top-level
//! instruction. Every event execution is its own atomic unit.

use std::rc::Rc;

use tracing::{debug, trace, warn};

use crate::ast::{CellAspect, CommandOutcome, Comparator, EventDef, Expr, ObservableSpec};
use crate::host::{CellId, CommandId, CursorId, Host};
use crate::interpreter::engine::Interpreter;
use crate::interpreter::errors::RuntimeError;
use crate::memory::instructions::InstructionId;
use crate::memory::scope::{ScopeId, ScopeKind, GENERAL_SCOPE};
use crate::memory::value::{HeapHandle, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EventId(pub u32);

/// A resolved subscription. `None` targets match any instance.
#[derive(Debug, Clone, PartialEq)]
pub enum Observable {
    HeapChange(Option<HeapHandle>),
    CursorMove(Option<CursorId>),
    Cell {
        aspect: CellAspect,
        cell: Option<CellId>,
    },
    EventFired(Option<EventId>),
    Command {
        outcome: CommandOutcome,
        command: Option<CommandId>,
    },
    EnergyThreshold {
        level: f64,
        comparator: Comparator,
    },
    EcrThreshold {
        level: f64,
        comparator: Comparator,
    },
    InstructionCommitted(Option<InstructionId>),
    InstructionReverted(Option<InstructionId>),
}

/// A state change reported by the engine
#[derive(Debug, Clone, PartialEq)]
pub enum Mutation {
    Heap(HeapHandle),
    Cursor(CursorId),
    Cell { aspect: CellAspect, cell: CellId },
    EventFired(EventId),
    Command {
        outcome: CommandOutcome,
        command: CommandId,
    },
    Energy { before: f64, after: f64 },
    Ecr { before: f64, after: f64 },
    InstructionCommitted(InstructionId),
    InstructionReverted(InstructionId),
}

fn targets<T: PartialEq>(target: &Option<T>, actual: &T) -> bool {
    target.as_ref().map_or(true, |t| t == actual)
}

/// Edge-triggered: the threshold becomes true with this change
fn crosses(comparator: Comparator, level: f64, before: f64, after: f64) -> bool {
    !comparator.holds(before, level) && comparator.holds(after, level)
}

impl Observable {
    pub fn matches(&self, mutation: &Mutation) -> bool {
        match (self, mutation) {
            (Observable::HeapChange(t), Mutation::Heap(h)) => targets(t, h),
            (Observable::CursorMove(t), Mutation::Cursor(c)) => targets(t, c),
            (
                Observable::Cell { aspect, cell },
                Mutation::Cell {
                    aspect: changed,
                    cell: c,
                },
            ) => (*aspect == CellAspect::Any || aspect == changed) && targets(cell, c),
            (Observable::EventFired(t), Mutation::EventFired(e)) => targets(t, e),
            (
                Observable::Command { outcome, command },
                Mutation::Command {
                    outcome: o,
                    command: c,
                },
            ) => outcome == o && targets(command, c),
            (
                Observable::EnergyThreshold { level, comparator },
                Mutation::Energy { before, after },
            )
            | (Observable::EcrThreshold { level, comparator }, Mutation::Ecr { before, after }) => {
                crosses(*comparator, *level, *before, *after)
            }
            (Observable::InstructionCommitted(t), Mutation::InstructionCommitted(i)) => targets(t, i),
            (Observable::InstructionReverted(t), Mutation::InstructionReverted(i)) => targets(t, i),
            _ => false,
        }
    }
}

/// A registered event
#[derive(Debug, Clone)]
pub struct Event {
    pub id: EventId,
    pub name: String,
    pub subscriptions: Vec<Observable>,
    pub definition: Rc<EventDef>,
}

impl Event {
    pub fn subscribes_to(&self, mutation: &Mutation) -> bool {
        self.subscriptions.iter().any(|s| s.matches(mutation))
    }
}

/// Registered events, in definition order
#[derive(Debug, Clone, Default)]
pub struct EventRegistry {
    events: Vec<Event>,
    next_id: u32,
}

impl EventRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an event. A previous event with the same name is replaced.
    pub fn register(
        &mut self,
        name: &str,
        subscriptions: Vec<Observable>,
        definition: Rc<EventDef>,
    ) -> EventId {
        self.events.retain(|e| e.name != name);
        let id = EventId(self.next_id);
        self.next_id += 1;
        self.events.push(Event {
            id,
            name: name.to_string(),
            subscriptions,
            definition,
        });
        id
    }

    pub fn remove(&mut self, name: &str) -> Option<Event> {
        let position = self.events.iter().position(|e| e.name == name)?;
        Some(self.events.remove(position))
    }

    pub fn get(&self, id: EventId) -> Option<&Event> {
        self.events.iter().find(|e| e.id == id)
    }

    pub fn by_name(&self, name: &str) -> Option<&Event> {
        self.events.iter().find(|e| e.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Event> {
        self.events.iter()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Events subscribed to a mutation, in definition order
    fn subscribers(&self, mutation: &Mutation) -> Vec<(EventId, String, Rc<EventDef>)> {
        self.events
            .iter()
            .filter(|e| e.subscribes_to(mutation))
            .map(|e| (e.id, e.name.clone(), Rc::clone(&e.definition)))
            .collect()
    }
}

/// An event waiting to run, with the cascade depth it will run at
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueuedEvent {
    pub event: EventId,
    pub depth: usize,
}

impl<H: Host> Interpreter<H> {
    /// Register an event definition
    pub(crate) fn define_event(&mut self, def: &Rc<EventDef>, scope: ScopeId) -> Result<(), RuntimeError> {
        let subscriptions = def
            .observables
            .iter()
            .map(|spec| self.resolve_observable(spec, scope))
            .collect::<Result<Vec<_>, _>>()?;
        let id = self.events.register(&def.name, subscriptions, Rc::clone(def));
        debug!(event = %def.name, id = id.0, "event registered");
        Ok(())
    }

    pub(crate) fn remove_event(&mut self, name: &str) -> Result<(), RuntimeError> {
        self.events
            .remove(name)
            .ok_or_else(|| RuntimeError::UnknownEvent {
                name: name.to_string(),
            })?;
        debug!(event = %name, "event removed");
        Ok(())
    }

    fn resolve_observable(&mut self, spec: &ObservableSpec, scope: ScopeId) -> Result<Observable, RuntimeError> {
        Ok(match spec {
            ObservableSpec::HeapChange(target) => Observable::HeapChange(match target {
                Some(expr) => {
                    let value = self.evaluate_expr(expr, scope)?;
                    Some(value.heap_handle().ok_or_else(|| RuntimeError::TypeError {
                        expected: "heap value".to_string(),
                        got: value.kind().to_string(),
                    })?)
                }
                None => None,
            }),
            ObservableSpec::CursorMove(target) => {
                Observable::CursorMove(self.resolve_id(target.as_ref(), scope)?)
            }
            ObservableSpec::Cell { aspect, cell } => Observable::Cell {
                aspect: *aspect,
                cell: self.resolve_id(cell.as_ref(), scope)?,
            },
            ObservableSpec::EventFired(name) => Observable::EventFired(match name {
                Some(name) => Some(
                    self.events
                        .by_name(name)
                        .map(|e| e.id)
                        .ok_or_else(|| RuntimeError::UnknownEvent { name: name.clone() })?,
                ),
                None => None,
            }),
            ObservableSpec::Command { outcome, command } => Observable::Command {
                outcome: *outcome,
                command: self.resolve_id(command.as_ref(), scope)?,
            },
            ObservableSpec::EnergyThreshold { level, comparator } => Observable::EnergyThreshold {
                level: self.resolve_level(level, scope)?,
                comparator: *comparator,
            },
            ObservableSpec::EcrThreshold { level, comparator } => Observable::EcrThreshold {
                level: self.resolve_level(level, scope)?,
                comparator: *comparator,
            },
            ObservableSpec::InstructionCommitted(target) => Observable::InstructionCommitted(
                self.resolve_id(target.as_ref(), scope)?.map(InstructionId),
            ),
            ObservableSpec::InstructionReverted(target) => Observable::InstructionReverted(
                self.resolve_id(target.as_ref(), scope)?.map(InstructionId),
            ),
        })
    }

    fn resolve_id(&mut self, target: Option<&Expr>, scope: ScopeId) -> Result<Option<u64>, RuntimeError> {
        let Some(expr) = target else {
            return Ok(None);
        };
        match self.evaluate_expr(expr, scope)? {
            Value::Number(n) if n >= 0 => Ok(Some(n as u64)),
            other => Err(RuntimeError::TypeError {
                expected: "non-negative number".to_string(),
                got: other.kind().to_string(),
            }),
        }
    }

    fn resolve_level(&mut self, level: &Expr, scope: ScopeId) -> Result<f64, RuntimeError> {
        let value = self.evaluate_expr(level, scope)?;
        value.as_f64().ok_or_else(|| RuntimeError::TypeError {
            expected: "number".to_string(),
            got: value.kind().to_string(),
        })
    }

    /// Report a mutation: enqueue every subscribed event whose trigger holds
    pub(crate) fn report(&mut self, mutation: Mutation) -> Result<(), RuntimeError> {
        if self.reporting_suspended > 0 {
            return Ok(());
        }
        for (id, name, def) in self.events.subscribers(&mutation) {
            if !self.evaluate_trigger(&def)? {
                trace!(event = %name, "trigger did not hold");
                continue;
            }
            let depth = self.event_depth + 1;
            if depth > self.config.max_event_depth {
                return Err(RuntimeError::EventLoopOverflow {
                    event: name,
                    depth,
                    limit: self.config.max_event_depth,
                });
            }
            debug!(event = %name, depth, ?mutation, "event enqueued");
            self.event_queue.push_back(QueuedEvent { event: id, depth });
        }
        Ok(())
    }

    /// Triggers see the general scope only, raise no observables and never
    /// leak an Error into the surrounding code.
    fn evaluate_trigger(&mut self, def: &EventDef) -> Result<bool, RuntimeError> {
        let Some(trigger) = &def.trigger else {
            return Ok(true);
        };

        let taint = std::mem::take(&mut self.taint);
        let try_depth = std::mem::take(&mut self.try_depth);
        self.reporting_suspended += 1;
        self.nonblocking += 1;
        self.meter_depth += 1;

        let result = self.in_child_scope(GENERAL_SCOPE, ScopeKind::Trigger, |this, scope| {
            this.evaluate_expr(trigger, scope)
        });

        self.meter_depth -= 1;
        self.nonblocking -= 1;
        self.reporting_suspended -= 1;
        self.try_depth = try_depth;
        self.taint = taint;

        match result? {
            Value::Bool(holds) => Ok(holds),
            Value::Error(_) => Ok(false),
            other => Err(RuntimeError::TypeError {
                expected: "bool trigger".to_string(),
                got: other.kind().to_string(),
            }),
        }
    }

    /// Run queued events until the queue is empty. A fatal error in one event
    /// rolls that event back and drops the rest of the queue.
    pub(crate) fn drain_events(&mut self) -> Result<(), RuntimeError> {
        while let Some(queued) = self.event_queue.pop_front() {
            if let Err(err) = self.run_event(queued) {
                self.event_queue.clear();
                return Err(err);
            }
        }
        Ok(())
    }

    fn run_event(&mut self, queued: QueuedEvent) -> Result<(), RuntimeError> {
        let Some(event) = self.events.get(queued.event) else {
            trace!(id = queued.event.0, "event removed before it ran");
            return Ok(());
        };
        let name = event.name.clone();
        let def = Rc::clone(&event.definition);
        debug!(event = %name, depth = queued.depth, "running event");

        let checkpoint = self.checkpoint();
        self.event_depth = queued.depth;
        // The whole body is one unit; only loop iterations are charged inside
        self.meter_depth = 1;
        self.nonblocking = 1;

        let mut result = self.in_child_scope(GENERAL_SCOPE, ScopeKind::Event, |this, scope| {
            this.execute_block(&def.body, scope)
        });
        if result.is_ok() {
            result = self.report(Mutation::EventFired(queued.event));
        }
        if result.is_ok() {
            result = self.commit_unit();
        }
        self.reset_transient();

        if let Err(err) = result {
            self.restore(checkpoint);
            warn!(event = %name, error = %err, "event execution failed");
            return Err(err);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::build::block;

    fn definition(name: &str) -> Rc<EventDef> {
        Rc::new(EventDef {
            name: name.to_string(),
            observables: vec![],
            trigger: None,
            body: block(vec![]),
        })
    }

    #[test]
    fn test_targeted_and_broad_subscriptions() {
        let narrow = Observable::HeapChange(Some(HeapHandle(1)));
        let broad = Observable::HeapChange(None);
        assert!(narrow.matches(&Mutation::Heap(HeapHandle(1))));
        assert!(!narrow.matches(&Mutation::Heap(HeapHandle(2))));
        assert!(broad.matches(&Mutation::Heap(HeapHandle(2))));
        assert!(!broad.matches(&Mutation::Cursor(0)));
    }

    #[test]
    fn test_cell_aspect_any() {
        let any = Observable::Cell {
            aspect: CellAspect::Any,
            cell: Some(3),
        };
        let mode = Observable::Cell {
            aspect: CellAspect::Mode,
            cell: None,
        };
        let change = Mutation::Cell {
            aspect: CellAspect::Content,
            cell: 3,
        };
        assert!(any.matches(&change));
        assert!(!mode.matches(&change));
    }

    #[test]
    fn test_threshold_is_edge_triggered() {
        let low = Observable::EnergyThreshold {
            level: 100.0,
            comparator: Comparator::Less,
        };
        assert!(low.matches(&Mutation::Energy {
            before: 101.0,
            after: 99.0
        }));
        // Already below: no new crossing
        assert!(!low.matches(&Mutation::Energy {
            before: 99.0,
            after: 98.0
        }));
        assert!(!low.matches(&Mutation::Ecr {
            before: 101.0,
            after: 99.0
        }));
    }

    #[test]
    fn test_command_outcome_must_match() {
        let failed = Observable::Command {
            outcome: CommandOutcome::Failed,
            command: None,
        };
        assert!(failed.matches(&Mutation::Command {
            outcome: CommandOutcome::Failed,
            command: 9
        }));
        assert!(!failed.matches(&Mutation::Command {
            outcome: CommandOutcome::Executed,
            command: 9
        }));
    }

    #[test]
    fn test_registry_replaces_by_name() {
        let mut registry = EventRegistry::new();
        let first = registry.register("e", vec![], definition("e"));
        registry.register("f", vec![], definition("f"));
        let second = registry.register("e", vec![], definition("e"));
        assert_ne!(first, second);
        assert_eq!(registry.len(), 2);
        assert!(registry.get(first).is_none());
        assert_eq!(registry.by_name("e").map(|e| e.id), Some(second));
        // Replacement moves to the end of the order
        let names: Vec<_> = registry.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, ["f", "e"]);
    }

    #[test]
    fn test_registry_remove() {
        let mut registry = EventRegistry::new();
        registry.register("e", vec![], definition("e"));
        assert!(registry.remove("e").is_some());
        assert!(registry.remove("e").is_none());
        assert!(registry.is_empty());
    }
}
