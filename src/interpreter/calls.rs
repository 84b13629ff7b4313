//! Function, closure and platform calls
//!
//! A function runs in a fresh scope whose parent is the scope that defined
//! it, so it resolves names exactly like code written at its definition: it
//! sees its siblings and the enclosing bindings, but none of its caller's
//! locals. A closure's scope hangs off its captured environment instead,
//! which outlives every call: writes to captured names persist between calls.

use std::rc::Rc;

use tracing::trace;

use crate::ast::{Call, Callee, Expr, FunctionDef};
use crate::host::Host;
use crate::interpreter::cost::{block_weight, CalleeWeights, NoCallees};
use crate::interpreter::engine::{ControlFlow, Interpreter};
use crate::interpreter::errors::RuntimeError;
use crate::memory::heap::Heap;
use crate::memory::scope::{ScopeArena, ScopeId, ScopeKind};
use crate::memory::value::Value;

/// Resolves callee body weights against live bindings
pub(crate) struct ScopeCallees<'a> {
    scopes: &'a ScopeArena,
    heap: &'a Heap,
    scope: ScopeId,
}

impl CalleeWeights for ScopeCallees<'_> {
    fn body_weight(&self, callee: &Expr) -> Option<u64> {
        let Expr::Variable(name) = callee else {
            return None;
        };
        let def = match self.scopes.lookup(self.scope, name).ok()? {
            Value::Function(def, _) => Rc::clone(def),
            Value::Closure(handle) => Rc::clone(&self.heap.closure(*handle).ok()?.function),
            _ => return None,
        };
        Some(block_weight(&def.body, &NoCallees))
    }
}

fn display_name(def: &FunctionDef) -> String {
    if def.name.is_empty() {
        "<closure>".to_string()
    } else {
        def.name.clone()
    }
}

impl<H: Host> Interpreter<H> {
    pub(crate) fn callee_weights(&self, scope: ScopeId) -> ScopeCallees<'_> {
        ScopeCallees {
            scopes: &self.scopes,
            heap: &self.heap,
            scope,
        }
    }

    pub(crate) fn evaluate_call(&mut self, call: &Call, scope: ScopeId) -> Result<Value, RuntimeError> {
        match &call.callee {
            Callee::Function(callee) => {
                let target = self.evaluate_expr(callee, scope)?;
                if let Value::Error(err) = target {
                    return self.propagate(err);
                }
                let args = self.evaluate_args(&call.args, scope)?;
                self.call_value(target, args)
            }
            Callee::Platform(name) => {
                let args = self.evaluate_args(&call.args, scope)?;
                self.call_platform(name, args)
            }
            Callee::Core(function) => self.call_core(*function, &call.args, scope),
        }
    }

    /// Arguments are evaluated left to right; Errors are kept as values
    pub(crate) fn evaluate_args(&mut self, args: &[Expr], scope: ScopeId) -> Result<Vec<Value>, RuntimeError> {
        args.iter().map(|arg| self.evaluate_expr(arg, scope)).collect()
    }

    /// Invoke a function or closure value
    pub(crate) fn call_value(&mut self, target: Value, args: Vec<Value>) -> Result<Value, RuntimeError> {
        let (def, parent) = match target {
            Value::Function(def, defined_in) => (def, defined_in),
            Value::Closure(handle) => {
                let closure = self.heap.closure(handle)?;
                (Rc::clone(&closure.function), closure.outer)
            }
            other => return Err(RuntimeError::NotCallable { got: other.kind() }),
        };

        if def.params.len() != args.len() {
            return Err(RuntimeError::ArgumentCountMismatch {
                function: display_name(&def),
                expected: def.params.len(),
                got: args.len(),
            });
        }
        if self.call_depth >= self.config.max_call_depth {
            return Err(RuntimeError::CallDepthExceeded {
                limit: self.config.max_call_depth,
            });
        }
        if !self.scopes.contains(parent) {
            return Err(RuntimeError::ScopeClosed { scope: parent });
        }

        trace!(function = %display_name(&def), depth = self.call_depth + 1, "call");
        self.call_depth += 1;
        let result = self.in_child_scope(parent, ScopeKind::Function, |this, frame| {
            this.run_function(&def, args, frame)
        });
        self.call_depth -= 1;
        result
    }

    fn run_function(
        &mut self,
        def: &Rc<FunctionDef>,
        args: Vec<Value>,
        frame: ScopeId,
    ) -> Result<Value, RuntimeError> {
        for (param, arg) in def.params.iter().zip(args) {
            let arg = match arg {
                // Binding the parameter is one hop
                Value::Error(err) => self.propagate(err)?,
                arg => arg,
            };
            self.scopes.declare(frame, param, arg)?;
        }

        let saved = self.return_value.take();
        let result = self.execute_block(&def.body, frame);
        let value = self.return_value.take().unwrap_or(Value::Unit);
        self.return_value = saved;
        self.control_flow = ControlFlow::Normal;
        result.map(|()| value)
    }

    /// Platform calls reach the host immediately and are not rolled back.
    /// A parked instruction re-running after its receive is served the
    /// results it already got, so the host sees each call once.
    fn call_platform(&mut self, name: &str, args: Vec<Value>) -> Result<Value, RuntimeError> {
        let result = match self.platform_replay.pop_front() {
            Some(result) => {
                trace!(function = %name, "platform call replayed");
                result
            }
            None => {
                trace!(function = %name, args = args.len(), "platform call");
                self.host
                    .call_platform(name, &args)
                    .ok_or_else(|| RuntimeError::UnknownPlatformFunction {
                        name: name.to_string(),
                    })?
            }
        };
        if let Some(log) = &mut self.platform_log {
            log.push(result.clone());
        }
        match result {
            Value::Error(err) => self.produce(err),
            value => Ok(value),
        }
    }
}
