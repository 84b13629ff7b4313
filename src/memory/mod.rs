//! Memory model for the Ciphel runtime
//!
//! This module provides the core memory abstractions:
//! - [`value`]: Runtime value representation (stack kinds, heap handles, Error)
//! - [`scope`]: Parent-linked lexical scopes stored in an arena
//! - [`heap`]: Heap objects with relocatable backing addresses and tombstones
//! - [`channel`]: Single-writer, multi-reader channels
//! - [`instructions`]: The general scope's id-addressed instruction log
//!
//! # Addresses
//!
//! Stack slots and heap buffers share one 64-bit address space:
//! ```text
//! 0x0000_0004 ..   stack slots (one per addressed variable)
//! 0x1000_0000 ..   heap buffers (8 bytes per slot, moved on growth)
//! ```

pub mod channel;
pub mod heap;
pub mod instructions;
pub mod scope;
pub mod value;
