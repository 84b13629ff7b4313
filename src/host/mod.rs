//! The boundary between the runtime and the game embedding it
//!
//! [`Host`] bundles the external collaborators the engine talks to: the energy
//! ledger, the ribbon cell grid, cursors and the platform API. The engine never
//! calls these directly while an instruction is running; ledger and grid
//! effects are journaled and handed over only once the instruction commits.

pub mod mock;

pub use mock::MockHost;

use crate::ast::CellAspect;
use crate::memory::value::Value;

pub type CellId = u64;
pub type CursorId = u64;
pub type CommandId = u64;

/// Values a cell is restored to when an Error corrupts it
#[derive(Debug, Clone, PartialEq)]
pub struct CellDefaults {
    pub mode: Value,
    pub state: Value,
    pub substate: Value,
    pub content: Value,
}

impl Default for CellDefaults {
    fn default() -> Self {
        CellDefaults {
            mode: Value::Number(0),
            state: Value::Number(0),
            substate: Value::Number(0),
            content: Value::Unit,
        }
    }
}

/// A write to one aspect of a cell
#[derive(Debug, Clone, PartialEq)]
pub struct CellChange {
    pub cell: CellId,
    pub aspect: CellAspect,
    pub value: Value,
}

/// Why energy was charged
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChargeReason {
    /// Static casm weight of a top-level instruction
    Instruction,
    /// Body weight of one loop iteration
    LoopIteration,
    /// An Error travelling one more hop
    ErrorPropagation,
    /// Reallocation of a heap buffer
    HeapGrowth,
}

/// An sp amount as an energy delta, saturating at `i64::MAX`
pub fn sp_as_energy(sp: u64) -> i64 {
    i64::try_from(sp).unwrap_or(i64::MAX)
}

pub trait Host {
    /// Deduct `sp` from the energy ledger
    fn charge(&mut self, sp: u64, reason: ChargeReason);

    fn energy(&self) -> i64;

    /// Current energy consumption rate
    fn ecr(&self) -> f64;

    fn cell_changed(&mut self, change: &CellChange);

    fn cursor_moved(&mut self, cursor: CursorId, position: i64);

    /// Restore a corrupted cell
    fn reset_cell(&mut self, cell: CellId, defaults: &CellDefaults);

    /// Run a platform API function. `None` when no such function exists.
    fn call_platform(&mut self, name: &str, args: &[Value]) -> Option<Value>;
}
