//! Runtime library: vectors, maps, strings, math, channels and the ribbon
//!
//! Every function evaluates its arguments first. An Error in a payload
//! position (the value pushed, inserted, sent or written to a cell) is stored
//! like any other value; an Error anywhere else short-circuits the call.

use tracing::{debug, trace};

use crate::ast::{CellAspect, CoreFn, Expr};
use crate::host::{CellChange, CellId, ChargeReason, Host};
use crate::interpreter::engine::Interpreter;
use crate::interpreter::errors::RuntimeError;
use crate::interpreter::events::Mutation;
use crate::interpreter::ops::access::{expect_number, map_key};
use crate::interpreter::ops::binary::Arith;
use crate::interpreter::ops::math::math_op;
use crate::memory::channel::{Channel, ChannelError, Received, Timeout};
use crate::memory::heap::{Growth, HeapObject};
use crate::memory::scope::ScopeId;
use crate::memory::value::{ErrorValue, HeapHandle, Value};
use crate::snapshot::Effect;

fn arity(function: CoreFn) -> usize {
    use CoreFn::*;
    match function {
        Chan => 0,
        VecWithCapacity | VecPop | VecLen | VecCapacity | VecClear | MapWithCapacity | MapLen | MapCapacity
        | MapKeys | MapClear | StrLen | Abs | Floor | Ceil | Sqrt | Assert | ChanAttach | ChanDetach => 1,
        VecPush | VecRemove | VecContains | VecGet | VecExtend | MapGet | MapContains | MapDelete | StrAppend
        | CharAt | Pow | Send | Receive | SetCellMode | SetCellState | SetCellSubstate | SetCellContent
        | MoveCursor => 2,
        VecSet | MapInsert => 3,
    }
}

/// Argument position that may legitimately carry an Error
fn payload_position(function: CoreFn) -> Option<usize> {
    use CoreFn::*;
    match function {
        VecPush | VecContains | Send | SetCellMode | SetCellState | SetCellSubstate | SetCellContent => Some(1),
        VecSet | MapInsert => Some(2),
        _ => None,
    }
}

fn expect_heap(value: &Value, expected: &str) -> Result<HeapHandle, RuntimeError> {
    let handle = match (expected, value) {
        ("vector", Value::Vector(h)) | ("map", Value::Map(h)) | ("channel", Value::Channel(h)) => Some(*h),
        _ => None,
    };
    handle.ok_or_else(|| RuntimeError::TypeError {
        expected: expected.to_string(),
        got: value.kind().to_string(),
    })
}

fn expect_size(value: &Value) -> Result<usize, RuntimeError> {
    let n = expect_number(value)?;
    usize::try_from(n).map_err(|_| RuntimeError::TypeError {
        expected: "non-negative number".to_string(),
        got: n.to_string(),
    })
}

fn expect_str(value: &Value) -> Result<&str, RuntimeError> {
    match value {
        Value::StaticString(s) => Ok(s),
        other => Err(RuntimeError::TypeError {
            expected: "string".to_string(),
            got: other.kind().to_string(),
        }),
    }
}

fn expect_id(value: &Value) -> Result<u64, RuntimeError> {
    Ok(expect_size(value)? as u64)
}

fn channel_error(err: ChannelError, channel: HeapHandle) -> RuntimeError {
    match err {
        ChannelError::NoReader | ChannelError::NotAttached => RuntimeError::NoReaderError { channel },
        ChannelError::WriterConflict => RuntimeError::WriterConflictError { channel },
    }
}

fn received(value: Value, ok: bool) -> Value {
    Value::Tuple(vec![value, Value::Bool(ok)])
}

impl<H: Host> Interpreter<H> {
    pub(crate) fn call_core(&mut self, function: CoreFn, arg_exprs: &[Expr], scope: ScopeId) -> Result<Value, RuntimeError> {
        let args = self.evaluate_args(arg_exprs, scope)?;
        if args.len() != arity(function) {
            return Err(RuntimeError::ArgumentCountMismatch {
                function: format!("{:?}", function),
                expected: arity(function),
                got: args.len(),
            });
        }

        let payload = payload_position(function);
        for (position, arg) in args.iter().enumerate() {
            if let Value::Error(err) = arg {
                if payload == Some(position) {
                    self.contain(err)?;
                } else {
                    return self.propagate(err.clone());
                }
            }
        }

        trace!(?function, "core call");
        use CoreFn::*;
        match function {
            VecWithCapacity => {
                let capacity = expect_size(&args[0])?;
                Ok(Value::Vector(self.heap.allocate_vector(Vec::new(), capacity)?))
            }
            VecPush => {
                let handle = expect_heap(&args[0], "vector")?;
                if let Some(growth) = self.heap.vec_push(handle, args[1].clone())? {
                    self.charge_growth(growth)?;
                }
                self.report(Mutation::Heap(handle))?;
                Ok(Value::Unit)
            }
            VecPop => {
                let handle = expect_heap(&args[0], "vector")?;
                match self.heap.vec_pop(handle)? {
                    Some(value) => {
                        self.report(Mutation::Heap(handle))?;
                        Ok(value)
                    }
                    None => Ok(Value::Unit),
                }
            }
            VecRemove => {
                let handle = expect_heap(&args[0], "vector")?;
                let value = self.heap.vec_remove(handle, expect_number(&args[1])?)?;
                self.report(Mutation::Heap(handle))?;
                Ok(value)
            }
            VecContains => {
                let handle = expect_heap(&args[0], "vector")?;
                Ok(Value::Bool(self.heap.vec_contains(handle, &args[1])?))
            }
            VecGet => {
                let handle = expect_heap(&args[0], "vector")?;
                Ok(self.heap.vec_get(handle, expect_number(&args[1])?)?)
            }
            VecSet => {
                let handle = expect_heap(&args[0], "vector")?;
                self.heap
                    .vec_set(handle, expect_number(&args[1])?, args[2].clone())?;
                self.report(Mutation::Heap(handle))?;
                Ok(Value::Unit)
            }
            VecLen => {
                let handle = expect_heap(&args[0], "vector")?;
                Ok(Value::Number(self.heap.vector(handle)?.items.len() as i64))
            }
            VecCapacity => {
                let handle = expect_heap(&args[0], "vector")?;
                Ok(Value::Number(self.heap.vector(handle)?.capacity as i64))
            }
            VecExtend => {
                let handle = expect_heap(&args[0], "vector")?;
                let items = self.items_of(&args[1])?;
                for growth in self.heap.vec_extend(handle, items)? {
                    self.charge_growth(growth)?;
                }
                self.report(Mutation::Heap(handle))?;
                Ok(Value::Unit)
            }
            VecClear => {
                let handle = expect_heap(&args[0], "vector")?;
                self.heap.vec_clear(handle)?;
                self.report(Mutation::Heap(handle))?;
                Ok(Value::Unit)
            }

            MapWithCapacity => {
                let capacity = expect_size(&args[0])?;
                Ok(Value::Map(self.heap.allocate_map(capacity)?))
            }
            MapInsert => {
                let handle = expect_heap(&args[0], "map")?;
                let key = map_key(&args[1])?;
                if let Some(growth) = self.heap.map_insert(handle, key, args[2].clone())? {
                    self.charge_growth(growth)?;
                }
                self.report(Mutation::Heap(handle))?;
                Ok(Value::Unit)
            }
            MapGet => {
                let handle = expect_heap(&args[0], "map")?;
                let key = map_key(&args[1])?;
                Ok(self.heap.map_get(handle, &key)?.unwrap_or(Value::Unit))
            }
            MapContains => {
                let handle = expect_heap(&args[0], "map")?;
                let key = map_key(&args[1])?;
                Ok(Value::Bool(self.heap.map_contains(handle, &key)?))
            }
            MapDelete => {
                let handle = expect_heap(&args[0], "map")?;
                let key = map_key(&args[1])?;
                match self.heap.map_delete(handle, &key)? {
                    Some(value) => {
                        self.report(Mutation::Heap(handle))?;
                        Ok(value)
                    }
                    None => Ok(Value::Unit),
                }
            }
            MapLen => {
                let handle = expect_heap(&args[0], "map")?;
                Ok(Value::Number(self.heap.map_len(handle)? as i64))
            }
            MapCapacity => {
                let handle = expect_heap(&args[0], "map")?;
                Ok(Value::Number(self.heap.map_capacity(handle)? as i64))
            }
            MapKeys => {
                let handle = expect_heap(&args[0], "map")?;
                let keys = self.heap.map_keys(handle)?;
                Ok(Value::Slice(keys.into_iter().map(|k| k.to_value()).collect()))
            }
            MapClear => {
                let handle = expect_heap(&args[0], "map")?;
                self.heap.map_clear(handle)?;
                self.report(Mutation::Heap(handle))?;
                Ok(Value::Unit)
            }

            StrAppend => {
                let mut appended = expect_str(&args[0])?.to_string();
                match &args[1] {
                    Value::Char(c) => appended.push(*c),
                    other => appended.push_str(expect_str(other)?),
                }
                Ok(Value::StaticString(appended))
            }
            StrLen => Ok(Value::Number(expect_str(&args[0])?.chars().count() as i64)),
            CharAt => {
                let s = expect_str(&args[0])?;
                let index = expect_number(&args[1])?;
                usize::try_from(index)
                    .ok()
                    .and_then(|i| s.chars().nth(i))
                    .map(Value::Char)
                    .ok_or(RuntimeError::IndexOutOfBounds {
                        index,
                        len: s.chars().count(),
                    })
            }

            Abs | Floor | Ceil | Sqrt | Pow => match math_op(function, &args)? {
                Arith::Value(value) => Ok(value),
                Arith::Fault(message) => {
                    let cost = self.config.default_error_cost;
                    self.produce(ErrorValue::new(message, cost))
                }
            },
            Assert => match args[0].as_bool() {
                Some(true) => Ok(Value::Unit),
                Some(false) => {
                    debug!("assertion failed");
                    Err(RuntimeError::AssertionFailed)
                }
                None => Err(RuntimeError::TypeError {
                    expected: "bool".to_string(),
                    got: args[0].kind().to_string(),
                }),
            },

            Chan => Ok(Value::Channel(
                self.heap.allocate(HeapObject::Channel(Channel::new()))?,
            )),
            ChanAttach => {
                let handle = expect_heap(&args[0], "channel")?;
                self.heap.channel_mut(handle)?.attach_reader();
                Ok(Value::Unit)
            }
            ChanDetach => {
                let handle = expect_heap(&args[0], "channel")?;
                self.heap
                    .channel_mut(handle)?
                    .detach_reader()
                    .map_err(|e| channel_error(e, handle))?;
                Ok(Value::Unit)
            }
            Send => {
                let handle = expect_heap(&args[0], "channel")?;
                self.send_on(handle, args[1].clone())?;
                Ok(Value::Unit)
            }
            Receive => {
                let handle = expect_heap(&args[0], "channel")?;
                let raw = expect_number(&args[1])?;
                let timeout = Timeout::from_raw(raw).ok_or(RuntimeError::InvalidTimeout { raw })?;
                self.receive_on(handle, timeout)
            }

            SetCellMode => self.set_cell(CellAspect::Mode, &args[0], &args[1]),
            SetCellState => self.set_cell(CellAspect::State, &args[0], &args[1]),
            SetCellSubstate => self.set_cell(CellAspect::Substate, &args[0], &args[1]),
            SetCellContent => self.set_cell(CellAspect::Content, &args[0], &args[1]),
            MoveCursor => {
                let cursor = expect_id(&args[0])?;
                let position = expect_number(&args[1])?;
                self.journal.record(Effect::CursorMoved { cursor, position });
                self.report(Mutation::Cursor(cursor))?;
                Ok(Value::Unit)
            }
        }
    }

    /// Charge a reallocation: the penalty scales with the new capacity
    pub(crate) fn charge_growth(&mut self, growth: Growth) -> Result<(), RuntimeError> {
        let sp = self
            .config
            .growth_penalty_per_slot
            .saturating_mul(growth.new_capacity as u64);
        debug!(
            handle = %growth.handle,
            from = format_args!("0x{:x}", growth.old_address),
            to = format_args!("0x{:x}", growth.new_address),
            capacity = growth.new_capacity,
            sp,
            "heap buffer grew"
        );
        self.charge(sp, ChargeReason::HeapGrowth)
    }

    /// Elements of a slice, tuple, string or vector, in order
    fn items_of(&self, iterable: &Value) -> Result<Vec<Value>, RuntimeError> {
        match iterable {
            Value::Slice(items) | Value::Tuple(items) => Ok(items.clone()),
            Value::StaticString(s) => Ok(s.chars().map(Value::Char).collect()),
            Value::Vector(handle) => Ok(self.heap.vector(*handle)?.items.clone()),
            other => Err(RuntimeError::TypeError {
                expected: "slice, string or vector".to_string(),
                got: other.kind().to_string(),
            }),
        }
    }

    pub(crate) fn send_on(&mut self, channel: HeapHandle, value: Value) -> Result<(), RuntimeError> {
        self.heap
            .channel_mut(channel)?
            .send(value)
            .map_err(|e| channel_error(e, channel))?;
        trace!(%channel, "sent");
        self.report(Mutation::Heap(channel))
    }

    /// Yields `(value, true)`, or `(unit, false)` when nothing arrived.
    /// Outside events, a waiting receive parks the whole instruction.
    fn receive_on(&mut self, channel: HeapHandle, timeout: Timeout) -> Result<Value, RuntimeError> {
        match self.heap.channel_mut(channel)?.try_receive() {
            Received::Value(value) => {
                self.report(Mutation::Heap(channel))?;
                Ok(received(value, true))
            }
            Received::WouldBlock => match timeout {
                Timeout::Immediate => Ok(received(Value::Unit, false)),
                _ if self.nonblocking > 0 => {
                    trace!(%channel, "receive cannot wait here");
                    Ok(received(Value::Unit, false))
                }
                _ => Err(RuntimeError::Blocked { channel, timeout }),
            },
        }
    }

    /// A corrupted value resets the whole cell instead of being written
    fn set_cell(&mut self, aspect: CellAspect, cell: &Value, value: &Value) -> Result<Value, RuntimeError> {
        let cell: CellId = expect_id(cell)?;
        if value.is_error() {
            debug!(cell, "cell corrupted, resetting");
            self.journal.record(Effect::ResetCell {
                cell,
                defaults: self.config.cell_defaults.clone(),
            });
        } else {
            self.journal.record(Effect::CellChanged(CellChange {
                cell,
                aspect,
                value: value.clone(),
            }));
        }
        self.report(Mutation::Cell { aspect, cell })?;
        Ok(Value::Unit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_positions_are_in_range() {
        use CoreFn::*;
        for function in [VecPush, VecContains, VecSet, MapInsert, Send, SetCellMode, SetCellContent] {
            let position = payload_position(function).unwrap();
            assert!(position < arity(function), "{function:?}");
        }
        assert_eq!(payload_position(VecGet), None);
    }

    #[test]
    fn test_expect_heap_checks_kind() {
        let v = Value::Vector(HeapHandle(0));
        assert_eq!(expect_heap(&v, "vector"), Ok(HeapHandle(0)));
        assert!(expect_heap(&v, "map").is_err());
    }

    #[test]
    fn test_expect_size_rejects_negative() {
        assert_eq!(expect_size(&Value::Number(3)), Ok(3));
        assert!(expect_size(&Value::Number(-1)).is_err());
    }

    #[test]
    fn test_arity_of_library_additions() {
        use CoreFn::*;
        for function in [VecClear, MapClear, StrLen, Abs, Sqrt, Assert] {
            assert_eq!(arity(function), 1, "{function:?}");
        }
        for function in [VecExtend, StrAppend, CharAt, Pow] {
            assert_eq!(arity(function), 2, "{function:?}");
        }
        assert_eq!(payload_position(VecExtend), None);
    }
}
