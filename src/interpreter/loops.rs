//! Loop statement execution (`for`, `while`, `loop`).
//!
//! Every iteration is charged the body's static weight before it runs and
//! counts against `max_loop_iterations`. `break` and `continue` are handed
//! back through [`LoopBodyResult`]; `return` ends the loop with
//! [`LoopBodyResult::Exit`] and leaves `control_flow` set for the caller.
//!
//! Iterating a vector reads it lazily, so elements pushed by the body are
//! visited too.

use tracing::trace;

use crate::ast::{Block, Expr};
use crate::host::{ChargeReason, Host};
use crate::interpreter::cost;
use crate::interpreter::engine::{ControlFlow, Interpreter};
use crate::interpreter::errors::RuntimeError;
use crate::interpreter::ops::access::expect_number;
use crate::memory::heap::Heap;
use crate::memory::scope::{ScopeId, ScopeKind};
use crate::memory::value::{ErrorValue, HeapHandle, Value};

/// How a loop body ended
pub(crate) enum LoopBodyResult {
    /// Ran to completion or hit `continue`
    Continue,
    Break,
    /// `return` inside the body
    Exit,
}

/// Source of `for` loop items
enum ItemCursor {
    Range { next: i64, end: i64 },
    Items(std::vec::IntoIter<Value>),
    Vector { handle: HeapHandle, position: usize },
    /// A corrupted iterable yields its Error once
    Corrupted(Option<ErrorValue>),
}

impl ItemCursor {
    fn next_item(&mut self, heap: &Heap) -> Result<Option<Value>, RuntimeError> {
        Ok(match self {
            ItemCursor::Range { next, end } => {
                if next < end {
                    let item = Value::Number(*next);
                    *next += 1;
                    Some(item)
                } else {
                    None
                }
            }
            ItemCursor::Items(items) => items.next(),
            ItemCursor::Vector { handle, position } => {
                let item = heap.vector(*handle)?.items.get(*position).cloned();
                *position += 1;
                item
            }
            ItemCursor::Corrupted(err) => err.take().map(Value::Error),
        })
    }
}

impl<H: Host> Interpreter<H> {
    fn item_cursor(&mut self, iterable: &Expr, scope: ScopeId) -> Result<ItemCursor, RuntimeError> {
        if let Expr::Range { start, end } = iterable {
            let start = self.evaluate_expr(start, scope)?;
            let end = self.evaluate_expr(end, scope)?;
            if let Some(err) = start.as_error().or(end.as_error()) {
                return Ok(ItemCursor::Corrupted(Some(err.clone())));
            }
            return Ok(ItemCursor::Range {
                next: expect_number(&start)?,
                end: expect_number(&end)?,
            });
        }

        Ok(match self.evaluate_expr(iterable, scope)? {
            Value::Slice(items) | Value::Tuple(items) => ItemCursor::Items(items.into_iter()),
            Value::StaticString(s) => {
                let chars: Vec<Value> = s.chars().map(Value::Char).collect();
                ItemCursor::Items(chars.into_iter())
            }
            Value::Vector(handle) => {
                self.heap.vector(handle)?;
                ItemCursor::Vector {
                    handle,
                    position: 0,
                }
            }
            Value::Map(handle) => {
                let keys: Vec<Value> = self
                    .heap
                    .map_keys(handle)?
                    .into_iter()
                    .map(|k| k.to_value())
                    .collect();
                ItemCursor::Items(keys.into_iter())
            }
            Value::Error(err) => ItemCursor::Corrupted(Some(err)),
            other => {
                return Err(RuntimeError::TypeError {
                    expected: "iterable".to_string(),
                    got: other.kind().to_string(),
                })
            }
        })
    }

    /// Count and charge one iteration
    fn begin_iteration(&mut self, iterations: &mut u64, weight: u64) -> Result<(), RuntimeError> {
        *iterations += 1;
        if *iterations > self.config.max_loop_iterations {
            return Err(RuntimeError::LoopLimitExceeded {
                limit: self.config.max_loop_iterations,
            });
        }
        self.charge(weight, ChargeReason::LoopIteration)
    }

    /// Executes `body` in a fresh loop scope, binding `item` first if given
    fn execute_loop_body(
        &mut self,
        body: &Block,
        scope: ScopeId,
        item: Option<(&str, Value)>,
    ) -> Result<LoopBodyResult, RuntimeError> {
        self.in_child_scope(scope, ScopeKind::Loop, |this, frame| {
            if let Some((name, value)) = item {
                let value = this.prepare_store(value)?;
                this.scopes.declare(frame, name, value)?;
            }
            this.execute_block(body, frame)?;
            Ok(match this.control_flow {
                ControlFlow::Normal => LoopBodyResult::Continue,
                ControlFlow::Continue => {
                    this.control_flow = ControlFlow::Normal;
                    LoopBodyResult::Continue
                }
                ControlFlow::Break => {
                    this.control_flow = ControlFlow::Normal;
                    LoopBodyResult::Break
                }
                ControlFlow::Return => LoopBodyResult::Exit,
            })
        })
    }

    pub(crate) fn execute_for(&mut self, item: &str, iterable: &Expr, body: &Block, scope: ScopeId) -> Result<(), RuntimeError> {
        let weight = cost::block_weight(body, &self.callee_weights(scope));
        let mut cursor = self.item_cursor(iterable, scope)?;
        let mut iterations = 0;

        while let Some(value) = cursor.next_item(&self.heap)? {
            self.begin_iteration(&mut iterations, weight)?;
            match self.execute_loop_body(body, scope, Some((item, value)))? {
                LoopBodyResult::Continue => {}
                LoopBodyResult::Break | LoopBodyResult::Exit => break,
            }
        }
        trace!(iterations, "for loop finished");
        Ok(())
    }

    pub(crate) fn execute_while(&mut self, condition: &Expr, body: &Block, scope: ScopeId) -> Result<(), RuntimeError> {
        let weight = cost::block_weight(body, &self.callee_weights(scope));
        let mut iterations = 0;

        loop {
            let condition = self.evaluate_expr(condition, scope)?;
            if let Value::Error(err) = condition {
                // One corrupted iteration, then the loop is over
                self.contain(&err)?;
                self.begin_iteration(&mut iterations, weight)?;
                self.tainted(err, |this| this.execute_loop_body(body, scope, None))?;
                break;
            }
            if !Self::truthy(&condition)? {
                break;
            }

            self.begin_iteration(&mut iterations, weight)?;
            match self.execute_loop_body(body, scope, None)? {
                LoopBodyResult::Continue => {}
                LoopBodyResult::Break | LoopBodyResult::Exit => break,
            }
        }
        trace!(iterations, "while loop finished");
        Ok(())
    }

    pub(crate) fn execute_loop(&mut self, body: &Block, scope: ScopeId) -> Result<(), RuntimeError> {
        let weight = cost::block_weight(body, &self.callee_weights(scope));
        let mut iterations = 0;

        loop {
            self.begin_iteration(&mut iterations, weight)?;
            match self.execute_loop_body(body, scope, None)? {
                LoopBodyResult::Continue => {}
                LoopBodyResult::Break | LoopBodyResult::Exit => break,
            }
        }
        Ok(())
    }
}
