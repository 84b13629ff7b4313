//! Reads through addresses, fields and indices
//!
//! # Addresses
//!
//! - Stack variables get a slot address from [`StackSlots`] the first time
//!   `&` is applied to them, starting at `STACK_ADDRESS_START`
//! - Heap values evaluate `&` to their current backing address, which moves
//!   when the buffer grows

use rustc_hash::FxHashMap;

use crate::ast::{Expr, Place};
use crate::host::Host;
use crate::interpreter::constants::{STACK_ADDRESS_START, STACK_SLOT_SIZE};
use crate::interpreter::engine::Interpreter;
use crate::interpreter::errors::RuntimeError;
use crate::interpreter::taint::operand;
use crate::memory::scope::{ScopeArena, ScopeId};
use crate::memory::value::{Address, MapKey, Value};

/// Addresses handed out for stack variables
#[derive(Debug, Clone)]
pub struct StackSlots {
    by_address: FxHashMap<Address, (ScopeId, String)>,
    by_binding: FxHashMap<(ScopeId, String), Address>,
    next_address: Address,
}

impl StackSlots {
    pub fn new() -> Self {
        StackSlots {
            by_address: FxHashMap::default(),
            by_binding: FxHashMap::default(),
            next_address: STACK_ADDRESS_START,
        }
    }

    /// Address of a binding, assigned on first use
    pub fn address_for(&mut self, scope: ScopeId, name: &str) -> Address {
        let key = (scope, name.to_string());
        if let Some(address) = self.by_binding.get(&key) {
            return *address;
        }
        let address = self.next_address;
        self.next_address += STACK_SLOT_SIZE;
        self.by_address.insert(address, key.clone());
        self.by_binding.insert(key, address);
        address
    }

    pub fn binding_at(&self, address: Address) -> Option<&(ScopeId, String)> {
        self.by_address.get(&address)
    }

    /// Drop slots whose scope has exited. Their addresses are never reused.
    pub fn forget_closed(&mut self, scopes: &ScopeArena) {
        self.by_address.retain(|_, (scope, _)| scopes.contains(*scope));
        self.by_binding.retain(|(scope, _), _| scopes.contains(*scope));
    }

    pub fn len(&self) -> usize {
        self.by_address.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_address.is_empty()
    }
}

impl Default for StackSlots {
    fn default() -> Self {
        Self::new()
    }
}

pub(crate) fn expect_number(value: &Value) -> Result<i64, RuntimeError> {
    value.as_number().ok_or_else(|| RuntimeError::TypeError {
        expected: "number".to_string(),
        got: value.kind().to_string(),
    })
}

pub(crate) fn map_key(value: &Value) -> Result<MapKey, RuntimeError> {
    MapKey::from_value(value).ok_or(RuntimeError::InvalidKeyType { kind: value.kind() })
}

fn element(items: &[Value], index: i64) -> Result<Value, RuntimeError> {
    usize::try_from(index)
        .ok()
        .and_then(|i| items.get(i))
        .cloned()
        .ok_or(RuntimeError::IndexOutOfBounds {
            index,
            len: items.len(),
        })
}

impl<H: Host> Interpreter<H> {
    pub(crate) fn evaluate_address_of(&mut self, target: &Expr, scope: ScopeId) -> Result<Value, RuntimeError> {
        let Expr::Variable(name) = target else {
            return Err(RuntimeError::TypeError {
                expected: "variable".to_string(),
                got: "expression".to_string(),
            });
        };
        let (owner, var) = self.scopes.resolve(scope, name)?;
        match var.value.heap_handle() {
            Some(handle) => Ok(Value::Address(self.heap.address_of(handle)?)),
            None => Ok(Value::Address(self.stack_slots.address_for(owner, name))),
        }
    }

    pub(crate) fn evaluate_deref(&mut self, target: &Expr, scope: ScopeId) -> Result<Value, RuntimeError> {
        let pointer = operand!(self, target, scope);
        self.deref_value(&pointer)
    }

    /// The value stored at an address
    pub(crate) fn deref_value(&self, pointer: &Value) -> Result<Value, RuntimeError> {
        let Value::Address(address) = *pointer else {
            return Err(RuntimeError::TypeError {
                expected: "address".to_string(),
                got: pointer.kind().to_string(),
            });
        };

        if let Some((owner, name)) = self.stack_slots.binding_at(address) {
            return self
                .scopes
                .binding(*owner, name)
                .map(|var| var.value.clone())
                .map_err(|_| RuntimeError::InvalidAddress { address });
        }

        let handle = self
            .heap
            .handle_at(address)
            .ok_or(RuntimeError::InvalidAddress { address })?;
        // A tombstone reports use-after-free
        Ok(self.heap.get(handle)?.to_value(handle))
    }

    pub(crate) fn evaluate_field(&mut self, target: &Expr, field: &str, scope: ScopeId) -> Result<Value, RuntimeError> {
        let container = operand!(self, target, scope);
        Self::field_of(&container, field)
    }

    pub(crate) fn field_of(container: &Value, field: &str) -> Result<Value, RuntimeError> {
        match container {
            Value::Struct(fields) => fields.get(field).cloned().ok_or_else(|| RuntimeError::NoSuchField {
                field: field.to_string(),
            }),
            other => Err(RuntimeError::TypeError {
                expected: "struct".to_string(),
                got: other.kind().to_string(),
            }),
        }
    }

    pub(crate) fn evaluate_tuple_index(
        &mut self,
        target: &Expr,
        index: usize,
        scope: ScopeId,
    ) -> Result<Value, RuntimeError> {
        let container = operand!(self, target, scope);
        Self::nth_of(&container, index)
    }

    pub(crate) fn nth_of(container: &Value, index: usize) -> Result<Value, RuntimeError> {
        match container {
            Value::Tuple(items) => element(items, index as i64),
            other => Err(RuntimeError::TypeError {
                expected: "tuple".to_string(),
                got: other.kind().to_string(),
            }),
        }
    }

    pub(crate) fn evaluate_index(&mut self, target: &Expr, index: &Expr, scope: ScopeId) -> Result<Value, RuntimeError> {
        let container = operand!(self, target, scope);
        let index = operand!(self, index, scope);
        self.index_of(&container, &index)
    }

    /// `container[index]`. A missing map key reads as unit.
    pub(crate) fn index_of(&self, container: &Value, index: &Value) -> Result<Value, RuntimeError> {
        match container {
            Value::Slice(items) | Value::Tuple(items) => element(items, expect_number(index)?),
            Value::StaticString(s) => {
                let chars: Vec<Value> = s.chars().map(Value::Char).collect();
                element(&chars, expect_number(index)?)
            }
            Value::Vector(handle) => Ok(self.heap.vec_get(*handle, expect_number(index)?)?),
            Value::Map(handle) => Ok(self
                .heap
                .map_get(*handle, &map_key(index)?)?
                .unwrap_or(Value::Unit)),
            other => Err(RuntimeError::TypeError {
                expected: "indexable value".to_string(),
                got: other.kind().to_string(),
            }),
        }
    }

    /// Current value of an assignable place
    pub(crate) fn read_place(&mut self, place: &Place, scope: ScopeId) -> Result<Value, RuntimeError> {
        match place {
            Place::Variable(name) => Ok(self.scopes.lookup(scope, name)?.clone()),
            Place::Deref(pointer) => {
                let pointer = self.evaluate_expr(pointer, scope)?;
                if pointer.is_error() {
                    return Ok(pointer);
                }
                self.deref_value(&pointer)
            }
            Place::Field { target, field } => match self.read_place(target, scope)? {
                err @ Value::Error(_) => Ok(err),
                container => Self::field_of(&container, field),
            },
            Place::TupleIndex { target, index } => match self.read_place(target, scope)? {
                err @ Value::Error(_) => Ok(err),
                container => Self::nth_of(&container, *index),
            },
            Place::Index { target, index } => {
                let container = self.read_place(target, scope)?;
                if container.is_error() {
                    return Ok(container);
                }
                let index = self.evaluate_expr(index, scope)?;
                if index.is_error() {
                    return Ok(index);
                }
                self.index_of(&container, &index)
            }
        }
    }
}
