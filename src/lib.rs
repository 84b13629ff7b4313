//! # Introduction
//!
//! Ciphel is the scripting runtime of a programming game. Programs are trees of
//! instructions handed over by a front end; the runtime executes them against
//! a memory model of nested scopes and a heap, charges every instruction to
//! the player's energy ledger, and reacts to state changes through events.
//!
//! ## Execution pipeline
//!
//! ```text
//! AST → instruction log → Interpreter (step / tick) → journal → Host
//!                             ↑                ↓
//!                        event queue  ←  mutations
//! ```
//!
//! 1. [`ast`]: the statement and expression tree, plus [`ast::build`] helpers.
//! 2. [`interpreter`]: executes the general scope's instruction log, one
//!    atomic unit at a time, and drains the event queue after each unit.
//! 3. [`memory`]: tagged [`memory::value::Value`]s in parent-linked
//!    [`memory::scope`]s and a [`memory::heap::Heap`] of vectors, maps,
//!    closures and channels.
//! 4. [`snapshot`]: checkpoints and the effect journal that make each unit
//!    atomic.
//! 5. [`host`]: the [`host::Host`] boundary (energy ledger, ribbon, platform
//!    API) and a [`host::MockHost`] for tests.
//!
//! ## Language values
//!
//! Errors are values. An Error spreads through every operation that touches
//! it, costing energy at each hop, and corrupts every variable written in a
//! branch it steers. `try` contains it.

pub mod ast;
pub mod host;
pub mod interpreter;
pub mod memory;
pub mod snapshot;

pub use interpreter::{Interpreter, RunOutcome, RuntimeConfig, RuntimeError, StepOutcome, TickOutcome};
