//! Writes to assignable places
//!
//! Compound places (fields, tuple positions, indices into static data) are
//! read, modified and written back to their root. Indexing into a vector or
//! a map writes the heap object directly.

use crate::ast::Place;
use crate::host::Host;
use crate::interpreter::engine::Interpreter;
use crate::interpreter::errors::RuntimeError;
use crate::interpreter::events::Mutation;
use crate::interpreter::ops::access::{expect_number, map_key};
use crate::memory::scope::ScopeId;
use crate::memory::value::Value;

fn replace_element(items: &mut [Value], index: i64, value: Value) -> Result<(), RuntimeError> {
    let len = items.len();
    let slot = usize::try_from(index)
        .ok()
        .and_then(|i| items.get_mut(i))
        .ok_or(RuntimeError::IndexOutOfBounds { index, len })?;
    *slot = value;
    Ok(())
}

impl<H: Host> Interpreter<H> {
    /// Store `value` (already prepared for taint) into `place`
    pub(crate) fn write_place(&mut self, place: &Place, value: Value, scope: ScopeId) -> Result<(), RuntimeError> {
        match place {
            Place::Variable(name) => {
                self.scopes.assign(scope, name, value)?;
                Ok(())
            }

            Place::Deref(pointer) => {
                let pointer = self.evaluate_expr(pointer, scope)?;
                self.write_through(&pointer, value)
            }

            Place::Field { target, field } => {
                let mut container = self.read_place(target, scope)?;
                match &mut container {
                    Value::Struct(fields) => {
                        let slot = fields.get_mut(field).ok_or_else(|| RuntimeError::NoSuchField {
                            field: field.clone(),
                        })?;
                        *slot = value;
                    }
                    // A corrupted container absorbs the write
                    Value::Error(err) => return self.contain(err),
                    other => {
                        return Err(RuntimeError::TypeError {
                            expected: "struct".to_string(),
                            got: other.kind().to_string(),
                        })
                    }
                }
                self.write_place(target, container, scope)
            }

            Place::TupleIndex { target, index } => {
                let mut container = self.read_place(target, scope)?;
                match &mut container {
                    Value::Tuple(items) => replace_element(items, *index as i64, value)?,
                    Value::Error(err) => return self.contain(err),
                    other => {
                        return Err(RuntimeError::TypeError {
                            expected: "tuple".to_string(),
                            got: other.kind().to_string(),
                        })
                    }
                }
                self.write_place(target, container, scope)
            }

            Place::Index { target, index } => {
                let index = self.evaluate_expr(index, scope)?;
                if let Value::Error(err) = &index {
                    return self.contain(err);
                }
                let mut container = self.read_place(target, scope)?;
                match &mut container {
                    Value::Vector(handle) => {
                        let handle = *handle;
                        self.heap.vec_set(handle, expect_number(&index)?, value)?;
                        self.report(Mutation::Heap(handle))
                    }
                    Value::Map(handle) => {
                        let handle = *handle;
                        if let Some(growth) = self.heap.map_insert(handle, map_key(&index)?, value)? {
                            self.charge_growth(growth)?;
                        }
                        self.report(Mutation::Heap(handle))
                    }
                    Value::Slice(items) | Value::Tuple(items) => {
                        replace_element(items, expect_number(&index)?, value)?;
                        self.write_place(target, container, scope)
                    }
                    Value::Error(err) => self.contain(err),
                    other => Err(RuntimeError::TypeError {
                        expected: "indexable value".to_string(),
                        got: other.kind().to_string(),
                    }),
                }
            }
        }
    }

    /// `*p = value`. Only stack addresses are writable.
    fn write_through(&mut self, pointer: &Value, value: Value) -> Result<(), RuntimeError> {
        let address = match pointer {
            Value::Address(address) => *address,
            Value::Error(err) => return self.contain(err),
            other => {
                return Err(RuntimeError::TypeError {
                    expected: "address".to_string(),
                    got: other.kind().to_string(),
                })
            }
        };

        match self.stack_slots.binding_at(address).cloned() {
            Some((owner, name)) if self.scopes.contains(owner) => {
                self.scopes.store_at(owner, &name, value)?;
                Ok(())
            }
            Some(_) => Err(RuntimeError::InvalidAddress { address }),
            None if self.heap.handle_at(address).is_some() => Err(RuntimeError::TypeError {
                expected: "stack address".to_string(),
                got: "heap address".to_string(),
            }),
            None => Err(RuntimeError::InvalidAddress { address }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_replace_element() {
        let mut items = vec![Value::Number(1), Value::Number(2)];
        replace_element(&mut items, 1, Value::Bool(true)).unwrap();
        assert_eq!(items[1], Value::Bool(true));
        assert_eq!(
            replace_element(&mut items, 2, Value::Unit),
            Err(RuntimeError::IndexOutOfBounds { index: 2, len: 2 })
        );
    }
}
