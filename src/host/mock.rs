// Recording host for tests and headless embedding

use rustc_hash::FxHashMap;

use super::{sp_as_energy, CellChange, CellDefaults, CellId, ChargeReason, CursorId, Host};
use crate::memory::value::Value;

/// Platform function implementation
pub type PlatformFn = fn(&[Value]) -> Value;

/// A host that records every effect it receives
#[derive(Debug, Clone)]
pub struct MockHost {
    pub energy: i64,
    pub charges: Vec<(u64, ChargeReason)>,
    pub cell_changes: Vec<CellChange>,
    pub cursor_moves: Vec<(CursorId, i64)>,
    pub resets: Vec<(CellId, CellDefaults)>,
    pub platform_calls: Vec<(String, Vec<Value>)>,
    platform: FxHashMap<String, PlatformFn>,
}

impl MockHost {
    pub fn new() -> Self {
        Self::with_energy(10_000)
    }

    pub fn with_energy(energy: i64) -> Self {
        MockHost {
            energy,
            charges: Vec::new(),
            cell_changes: Vec::new(),
            cursor_moves: Vec::new(),
            resets: Vec::new(),
            platform_calls: Vec::new(),
            platform: FxHashMap::default(),
        }
    }

    /// Register a platform API function
    pub fn register(&mut self, name: &str, function: PlatformFn) {
        self.platform.insert(name.to_string(), function);
    }

    /// Total sp charged so far
    pub fn total_charged(&self) -> u64 {
        self.charges
            .iter()
            .fold(0u64, |total, (sp, _)| total.saturating_add(*sp))
    }

    /// Total sp charged for one reason
    pub fn charged_for(&self, reason: ChargeReason) -> u64 {
        self.charges
            .iter()
            .filter(|(_, r)| *r == reason)
            .fold(0u64, |total, (sp, _)| total.saturating_add(*sp))
    }
}

impl Default for MockHost {
    fn default() -> Self {
        Self::new()
    }
}

impl Host for MockHost {
    fn charge(&mut self, sp: u64, reason: ChargeReason) {
        self.energy = self.energy.saturating_sub(sp_as_energy(sp));
        self.charges.push((sp, reason));
    }

    fn energy(&self) -> i64 {
        self.energy
    }

    /// Cumulative consumption; enough for threshold tests
    fn ecr(&self) -> f64 {
        self.total_charged() as f64
    }

    fn cell_changed(&mut self, change: &CellChange) {
        self.cell_changes.push(change.clone());
    }

    fn cursor_moved(&mut self, cursor: CursorId, position: i64) {
        self.cursor_moves.push((cursor, position));
    }

    fn reset_cell(&mut self, cell: CellId, defaults: &CellDefaults) {
        self.resets.push((cell, defaults.clone()));
    }

    fn call_platform(&mut self, name: &str, args: &[Value]) -> Option<Value> {
        let function = *self.platform.get(name)?;
        let result = function(args);
        self.platform_calls.push((name.to_string(), args.to_vec()));
        Some(result)
    }
}
