//! Runtime error types for the Ciphel runtime
//!
//! This module defines [`RuntimeError`], the engine-fatal conditions. These
//! are distinct from the language-level Error *value*, which corrupts state
//! instead of stopping execution.
//!
//! A fatal error unwinds to the nearest unit of execution (a top-level
//! instruction or an event execution), restores its checkpoint and is
//! returned to the caller.

use thiserror::Error;

use crate::memory::channel::Timeout;
use crate::memory::heap::HeapError;
use crate::memory::instructions::InstructionId;
use crate::memory::scope::{ScopeError, ScopeId};
use crate::memory::value::{Address, ErrorValue, HeapHandle, ValueKind};

/// Runtime errors that can occur during execution
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RuntimeError {
    #[error("unresolved variable '{name}'")]
    UnresolvedVariable { name: String },

    /// Map key of a non-hashable kind
    #[error("a {kind} cannot be used as a map key")]
    InvalidKeyType { kind: ValueKind },

    #[error("event '{event}' would run at depth {depth}, limit is {limit}")]
    EventLoopOverflow {
        event: String,
        depth: usize,
        limit: usize,
    },

    #[error("channel {channel} has no attached reader")]
    NoReaderError { channel: HeapHandle },

    #[error("channel {channel} still holds an unreceived value")]
    WriterConflictError { channel: HeapHandle },

    #[error("receive on channel {channel} timed out after {ticks} ticks")]
    TimeoutError { channel: HeapHandle, ticks: u64 },

    #[error("type error: expected {expected}, got {got}")]
    TypeError { expected: String, got: String },

    #[error("use-after-free: heap object {handle} at 0x{address:x}")]
    UseAfterFree { handle: HeapHandle, address: Address },

    #[error("double free of heap object {handle} at 0x{address:x}")]
    DoubleFree { handle: HeapHandle, address: Address },

    #[error("heap object {handle} was never allocated")]
    InvalidHandle { handle: HeapHandle },

    /// Dereference of an address that no longer (or never) held anything
    #[error("invalid address 0x{address:x}")]
    InvalidAddress { address: Address },

    #[error("index {index} out of bounds for length {len}")]
    IndexOutOfBounds { index: i64, len: usize },

    #[error("cannot allocate {requested} heap slot(s), limit is {limit}")]
    AllocationLimit { requested: usize, limit: usize },

    #[error("range of {len} items exceeds the limit of {limit}")]
    RangeTooLong { len: u64, limit: u64 },

    #[error("assertion failed")]
    AssertionFailed,

    /// Receive timeouts are `-1` (forever), `0` (immediate) or a tick count
    #[error("invalid receive timeout {raw}")]
    InvalidTimeout { raw: i64 },

    #[error("a {got} is not callable")]
    NotCallable { got: ValueKind },

    #[error("function '{function}' expects {expected} argument(s), got {got}")]
    ArgumentCountMismatch {
        function: String,
        expected: usize,
        got: usize,
    },

    #[error("no field '{field}'")]
    NoSuchField { field: String },

    #[error("no event named '{name}'")]
    UnknownEvent { name: String },

    #[error("no instruction {id} in the log")]
    UnknownInstruction { id: InstructionId },

    #[error("no platform function '{name}'")]
    UnknownPlatformFunction { name: String },

    #[error("loop exceeded {limit} iterations")]
    LoopLimitExceeded { limit: u64 },

    #[error("call depth exceeded {limit}")]
    CallDepthExceeded { limit: usize },

    #[error("scope {scope:?} has already been closed")]
    ScopeClosed { scope: ScopeId },

    /// The instruction must wait for channel data (internal signal, not a real error)
    #[error("blocked on channel {channel}")]
    Blocked { channel: HeapHandle, timeout: Timeout },

    /// An Error reached a `try` main scope (internal signal, not a real error)
    #[error("contained error: {}", .0.message)]
    Contained(ErrorValue),
}

impl RuntimeError {
    /// Signals used for control transfer inside the engine
    pub fn is_internal(&self) -> bool {
        matches!(
            self,
            RuntimeError::Blocked { .. } | RuntimeError::Contained(_)
        )
    }
}

impl From<HeapError> for RuntimeError {
    fn from(err: HeapError) -> Self {
        match err {
            HeapError::UseAfterFree { handle, address } => {
                RuntimeError::UseAfterFree { handle, address }
            }
            HeapError::DoubleFree { handle, address } => RuntimeError::DoubleFree { handle, address },
            HeapError::InvalidHandle { handle } => RuntimeError::InvalidHandle { handle },
            HeapError::KindMismatch {
                expected, found, ..
            } => RuntimeError::TypeError {
                expected: expected.to_string(),
                got: found.to_string(),
            },
            HeapError::IndexOutOfBounds { index, len } => {
                RuntimeError::IndexOutOfBounds { index, len }
            }
            HeapError::AllocationLimit { requested, limit } => {
                RuntimeError::AllocationLimit { requested, limit }
            }
        }
    }
}

impl From<ScopeError> for RuntimeError {
    fn from(err: ScopeError) -> Self {
        match err {
            ScopeError::Unresolved { name } => RuntimeError::UnresolvedVariable { name },
            ScopeError::MissingScope(scope) => RuntimeError::ScopeClosed { scope },
            ScopeError::TypeMismatch { expected, got, .. } => RuntimeError::TypeError {
                expected: expected.to_string(),
                got: got.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_heap_errors_convert() {
        let err: RuntimeError = HeapError::DoubleFree {
            handle: HeapHandle(2),
            address: 0x1000_0000,
        }
        .into();
        assert_eq!(
            err.to_string(),
            "double free of heap object #2 at 0x10000000"
        );
    }

    #[test]
    fn test_argument_count_message() {
        let err = RuntimeError::ArgumentCountMismatch {
            function: "f".to_string(),
            expected: 1,
            got: 3,
        };
        assert_eq!(err.to_string(), "function 'f' expects 1 argument(s), got 3");
    }

    #[test]
    fn test_internal_signals() {
        assert!(RuntimeError::Contained(ErrorValue::new("E", 1)).is_internal());
        assert!(!RuntimeError::LoopLimitExceeded { limit: 3 }.is_internal());
    }
}
