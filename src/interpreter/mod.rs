//! Ciphel execution engine
//!
//! This module provides the core execution logic:
//! - [`engine`]: The [`Interpreter`], its scheduler (step / tick / run) and host API
//! - [`events`]: Event registry, observables and the event queue
//! - [`cost`]: Static casm weights
//! - [`config`]: Limits and tariffs
//! - [`errors`]: Runtime error types
//!
//! # Execution Model
//!
//! The general scope executes its instruction log one instruction at a time.
//! Each instruction (and each event execution it triggers) is an atomic unit:
//! state is checkpointed before it runs, host effects are journaled, and a
//! fatal error restores the checkpoint and drops the journal.

pub(crate) mod taint;

mod builtins;
mod calls;
pub mod config;
pub mod constants;
pub mod cost;
pub mod engine;
pub mod errors;
pub mod events;
mod expressions;
mod jumps;
mod loops;
pub mod ops;
mod statements;

pub use config::RuntimeConfig;
pub use engine::{Interpreter, Parked, RunOutcome, StepOutcome, TickOutcome};
pub use errors::RuntimeError;
