//! Runtime configuration
//!
//! Every limit and tariff the engine applies lives in [`RuntimeConfig`].
//! Defaults come from [`crate::interpreter::constants`].

use super::constants::*;
use crate::host::CellDefaults;

#[derive(Debug, Clone, PartialEq)]
pub struct RuntimeConfig {
    /// Weighted sp executed per tick
    pub tick_budget: u64,
    pub max_event_depth: usize,
    pub growth_penalty_per_slot: u64,
    /// Energy cost of Errors raised by the engine (arithmetic faults)
    pub default_error_cost: u64,
    pub max_loop_iterations: u64,
    pub max_call_depth: usize,
    /// Largest vector or map buffer, in slots
    pub max_heap_slots: usize,
    /// Longest range that may be materialized as a slice
    pub max_range_len: u64,
    /// Values restored into a cell corrupted by an Error
    pub cell_defaults: CellDefaults,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        RuntimeConfig {
            tick_budget: DEFAULT_TICK_BUDGET,
            max_event_depth: DEFAULT_MAX_EVENT_DEPTH,
            growth_penalty_per_slot: DEFAULT_GROWTH_PENALTY_PER_SLOT,
            default_error_cost: DEFAULT_ERROR_COST,
            max_loop_iterations: DEFAULT_MAX_LOOP_ITERATIONS,
            max_call_depth: DEFAULT_MAX_CALL_DEPTH,
            max_heap_slots: DEFAULT_MAX_HEAP_SLOTS,
            max_range_len: DEFAULT_MAX_RANGE_LEN,
            cell_defaults: CellDefaults::default(),
        }
    }
}

impl RuntimeConfig {
    /// A tick always runs at least one instruction, so the budget is at least 1
    pub fn with_tick_budget(mut self, sp: u64) -> Self {
        self.tick_budget = sp.max(1);
        self
    }

    pub fn with_max_event_depth(mut self, depth: usize) -> Self {
        self.max_event_depth = depth;
        self
    }

    pub fn with_growth_penalty(mut self, sp_per_slot: u64) -> Self {
        self.growth_penalty_per_slot = sp_per_slot;
        self
    }

    pub fn with_default_error_cost(mut self, sp: u64) -> Self {
        self.default_error_cost = sp;
        self
    }

    pub fn with_max_loop_iterations(mut self, iterations: u64) -> Self {
        self.max_loop_iterations = iterations;
        self
    }

    pub fn with_max_call_depth(mut self, depth: usize) -> Self {
        self.max_call_depth = depth;
        self
    }

    pub fn with_max_heap_slots(mut self, slots: usize) -> Self {
        self.max_heap_slots = slots;
        self
    }

    pub fn with_max_range_len(mut self, len: u64) -> Self {
        self.max_range_len = len;
        self
    }

    pub fn with_cell_defaults(mut self, defaults: CellDefaults) -> Self {
        self.cell_defaults = defaults;
        self
    }
}
