//! Single-writer, multi-reader channels
//!
//! A channel holds at most one pending message: a second send before the
//! first one is received is a writer conflict. Receivers choose a timeout
//! with the raw convention `-1` (wait forever), `0` (never wait) or `n > 0`
//! (wait at most `n` ticks).

use std::collections::VecDeque;

use thiserror::Error;

use super::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ChannelError {
    #[error("send on a channel with no attached reader")]
    NoReader,

    #[error("send while a previously sent value is still pending")]
    WriterConflict,

    #[error("detach from a channel with no attached reader")]
    NotAttached,
}

/// Outcome of a non-blocking receive
#[derive(Debug, Clone, PartialEq)]
pub enum Received {
    Value(Value),
    WouldBlock,
}

/// How long a receive may wait for data
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Timeout {
    Forever,
    Immediate,
    Ticks(u64),
}

impl Timeout {
    /// `-1` waits forever; any other negative value is rejected
    pub fn from_raw(raw: i64) -> Option<Self> {
        match raw {
            -1 => Some(Timeout::Forever),
            0 => Some(Timeout::Immediate),
            n => u64::try_from(n).ok().map(Timeout::Ticks),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Channel {
    queue: VecDeque<Value>,
    readers: usize,
}

impl Channel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attach_reader(&mut self) {
        self.readers += 1;
    }

    pub fn detach_reader(&mut self) -> Result<(), ChannelError> {
        if self.readers == 0 {
            return Err(ChannelError::NotAttached);
        }
        self.readers -= 1;
        Ok(())
    }

    pub fn readers(&self) -> usize {
        self.readers
    }

    pub fn has_pending(&self) -> bool {
        !self.queue.is_empty()
    }

    pub fn send(&mut self, value: Value) -> Result<(), ChannelError> {
        if self.readers == 0 {
            return Err(ChannelError::NoReader);
        }
        if self.has_pending() {
            return Err(ChannelError::WriterConflict);
        }
        self.queue.push_back(value);
        Ok(())
    }

    pub fn try_receive(&mut self) -> Received {
        match self.queue.pop_front() {
            Some(value) => Received::Value(value),
            None => Received::WouldBlock,
        }
    }
}
