//! Statement execution implementation
//!
//! This module handles the execution of every statement form:
//!
//! - Declarations (single and tuple) and assignments
//! - Function and event definitions
//! - `if`, `try` and nested scopes
//! - Explicit `free`
//!
//! Loops live in `loops`, `return`/`match` in `jumps`.
//!
//! # Charging
//!
//! A statement executed while no other statement is being charged is a unit
//! of its own: its full static weight is charged before it runs. Statements
//! nested inside it (including those of called functions) are covered by
//! that charge, except loop iterations which are charged as they happen.

use std::rc::Rc;

use tracing::debug;

use crate::ast::{Block, DeclPattern, Expr, FunctionDef, Place, Stmt};
use crate::host::{ChargeReason, Host};
use crate::interpreter::cost;
use crate::interpreter::engine::{ControlFlow, Interpreter};
use crate::interpreter::errors::RuntimeError;
use crate::interpreter::events::Mutation;
use crate::memory::scope::{ScopeId, ScopeKind};
use crate::memory::value::{HeapHandle, Value};

impl<H: Host> Interpreter<H> {
    pub(crate) fn execute_statement(&mut self, stmt: &Stmt, scope: ScopeId) -> Result<(), RuntimeError> {
        if self.meter_depth == 0 {
            let weight = cost::stmt_weight(stmt, &self.callee_weights(scope));
            self.charge(weight, ChargeReason::Instruction)?;
        }

        self.meter_depth += 1;
        let result = self.dispatch_statement(stmt, scope);
        self.meter_depth -= 1;
        result
    }

    fn dispatch_statement(&mut self, stmt: &Stmt, scope: ScopeId) -> Result<(), RuntimeError> {
        match stmt {
            Stmt::Declare { pattern, value } => self.execute_declare(pattern, value, scope),
            Stmt::Assign { target, value } => self.execute_assign(target, value, scope),

            Stmt::For {
                item,
                iterable,
                body,
            } => self.execute_for(item, iterable, body, scope),
            Stmt::While { condition, body } => self.execute_while(condition, body, scope),
            Stmt::Loop { body } => self.execute_loop(body, scope),

            Stmt::Function(def) => self.execute_function_def(def, scope),
            Stmt::Event(def) => self.define_event(def, scope),
            Stmt::RemoveEvent(name) => self.remove_event(name),

            Stmt::If {
                condition,
                then_branch,
                else_branch,
            } => self.execute_if(condition, then_branch, else_branch.as_ref(), scope),
            Stmt::Match {
                scrutinee,
                arms,
                default,
            } => self.execute_match(scrutinee, arms, default.as_ref(), scope),
            Stmt::Try { main, fallback } => self.execute_try(main, fallback.as_ref(), scope),

            Stmt::Call(call) => self.evaluate_call(call, scope).map(|_| ()),
            Stmt::Scope(block) => self.execute_branch(block, scope),

            Stmt::Return(value) => self.execute_return(value.as_ref(), scope),
            Stmt::Break => {
                self.control_flow = ControlFlow::Break;
                Ok(())
            }
            Stmt::Continue => {
                self.control_flow = ControlFlow::Continue;
                Ok(())
            }

            Stmt::Free(name) => self.execute_free(name, scope),
        }
    }

    /// Run statements in order until one transfers control
    pub(crate) fn execute_block(&mut self, block: &Block, scope: ScopeId) -> Result<(), RuntimeError> {
        for stmt in &block.instructions {
            self.execute_statement(stmt, scope)?;
            if self.control_flow != ControlFlow::Normal {
                break;
            }
        }
        Ok(())
    }

    /// Run a block in a fresh child scope
    pub(crate) fn execute_branch(&mut self, block: &Block, scope: ScopeId) -> Result<(), RuntimeError> {
        self.in_child_scope(scope, ScopeKind::Block, |this, child| this.execute_block(block, child))
    }

    fn execute_declare(&mut self, pattern: &DeclPattern, value: &Expr, scope: ScopeId) -> Result<(), RuntimeError> {
        let value = self.evaluate_expr(value, scope)?;
        match pattern {
            DeclPattern::Name(name) => {
                let value = self.prepare_store(value)?;
                self.scopes.declare(scope, name, value)?;
            }
            DeclPattern::Tuple(names) => {
                let items = match value {
                    Value::Tuple(items) if items.len() == names.len() => items,
                    // Every name receives the Error
                    Value::Error(err) => vec![Value::Error(err); names.len()],
                    Value::Tuple(items) => {
                        return Err(RuntimeError::TypeError {
                            expected: format!("tuple of {}", names.len()),
                            got: format!("tuple of {}", items.len()),
                        })
                    }
                    other => {
                        return Err(RuntimeError::TypeError {
                            expected: "tuple".to_string(),
                            got: other.kind().to_string(),
                        })
                    }
                };
                for (name, item) in names.iter().zip(items) {
                    let item = self.prepare_store(item)?;
                    self.scopes.declare(scope, name, item)?;
                }
            }
        }
        Ok(())
    }

    fn execute_assign(&mut self, target: &Place, value: &Expr, scope: ScopeId) -> Result<(), RuntimeError> {
        let value = self.evaluate_expr(value, scope)?;
        let value = self.prepare_store(value)?;
        self.write_place(target, value, scope)
    }

    fn execute_function_def(&mut self, def: &Rc<FunctionDef>, scope: ScopeId) -> Result<(), RuntimeError> {
        let value = self.prepare_store(Value::Function(Rc::clone(def), scope))?;
        self.scopes.declare(scope, &def.name, value)?;
        debug!(function = %def.name, "function defined");
        Ok(())
    }

    fn execute_if(
        &mut self,
        condition: &Expr,
        then_branch: &Block,
        else_branch: Option<&Block>,
        scope: ScopeId,
    ) -> Result<(), RuntimeError> {
        match self.evaluate_expr(condition, scope)? {
            // A corrupted condition takes the main branch and corrupts its stores
            Value::Error(err) => {
                self.contain(&err)?;
                self.tainted(err, |this| this.execute_branch(then_branch, scope))
            }
            condition => {
                if Self::truthy(&condition)? {
                    self.execute_branch(then_branch, scope)
                } else if let Some(else_branch) = else_branch {
                    self.execute_branch(else_branch, scope)
                } else {
                    Ok(())
                }
            }
        }
    }

    fn execute_try(&mut self, main: &Block, fallback: Option<&Block>, scope: ScopeId) -> Result<(), RuntimeError> {
        let taint_depth = self.taint.len();
        self.try_depth += 1;
        let result = self.execute_branch(main, scope);
        self.try_depth -= 1;

        match result {
            Err(RuntimeError::Contained(err)) => {
                debug!(message = %err.message, "try contained an error");
                self.taint.truncate(taint_depth);
                self.control_flow = ControlFlow::Normal;
                match fallback {
                    Some(fallback) => self.execute_branch(fallback, scope),
                    None => Ok(()),
                }
            }
            other => other,
        }
    }

    /// Reset a variable to unit, releasing the heap object it held
    fn execute_free(&mut self, name: &str, scope: ScopeId) -> Result<(), RuntimeError> {
        let (owner, old) = self.scopes.free_binding(scope, name)?;
        if let Some(handle) = old.heap_handle() {
            self.free_heap(handle)?;
        }
        debug!(variable = %name, ?owner, "freed");
        Ok(())
    }

    pub(crate) fn free_heap(&mut self, handle: HeapHandle) -> Result<(), RuntimeError> {
        let outer = self.heap.closure(handle).ok().map(|c| c.outer);
        self.heap.free(handle)?;
        if let Some(outer) = outer {
            self.scopes.exit(outer);
            self.stack_slots.forget_closed(&self.scopes);
        }
        self.report(Mutation::Heap(handle))
    }
}
