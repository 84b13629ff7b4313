//! Expression evaluation implementation
//!
//! This module handles evaluation of every expression form:
//!
//! - Literals, Error literals and variables
//! - Static data (slices, tuples, structs, ranges)
//! - Heap data (vectors, maps, closures)
//! - Operators, addresses, field and index access
//! - `if`, `match` and `try` in expression position
//!
//! # Errors
//!
//! An Error operand makes the enclosing operation evaluate to that same
//! Error, charging one propagation hop. Composite literals propagate the
//! first Error among their elements the same way.

use std::rc::Rc;

use rustc_hash::FxHashMap;

use crate::ast::{Expr, FunctionDef, Literal};
use crate::host::Host;
use crate::interpreter::engine::Interpreter;
use crate::interpreter::errors::RuntimeError;
use crate::interpreter::ops::access::{expect_number, map_key};
use crate::interpreter::taint::operand;
use crate::memory::heap::{ClosureData, HeapObject};
use crate::memory::scope::{ScopeId, ScopeKind, GENERAL_SCOPE};
use crate::memory::value::{ErrorValue, Value};

pub(crate) fn literal_value(literal: &Literal) -> Value {
    match literal {
        Literal::Number(n) => Value::Number(*n),
        Literal::Float(f) => Value::Float(*f),
        Literal::Char(c) => Value::Char(*c),
        Literal::Bool(b) => Value::Bool(*b),
        Literal::Str(s) => Value::StaticString(s.clone()),
        Literal::Unit => Value::Unit,
    }
}

/// Operands evaluated left to right until the first Error
pub(crate) enum Operands {
    Values(Vec<Value>),
    Error(ErrorValue),
}

impl<H: Host> Interpreter<H> {
    /// Evaluate an expression and return its value
    pub(crate) fn evaluate_expr(&mut self, expr: &Expr, scope: ScopeId) -> Result<Value, RuntimeError> {
        match expr {
            Expr::Literal(literal) => Ok(literal_value(literal)),

            Expr::Error {
                message,
                energy_cost,
            } => self.produce(ErrorValue::new(message.clone(), *energy_cost)),

            Expr::Variable(name) => Ok(self.scopes.lookup(scope, name)?.clone()),

            Expr::Slice(items) => match self.evaluate_operands(items, scope)? {
                Operands::Values(values) => Ok(Value::Slice(values)),
                Operands::Error(err) => self.propagate(err),
            },

            Expr::Tuple(items) => match self.evaluate_operands(items, scope)? {
                Operands::Values(values) => Ok(Value::Tuple(values)),
                Operands::Error(err) => self.propagate(err),
            },

            Expr::Struct(fields) => {
                let mut values = FxHashMap::default();
                for (name, field) in fields {
                    let value = operand!(self, field, scope);
                    values.insert(name.clone(), value);
                }
                Ok(Value::Struct(values))
            }

            Expr::Range { start, end } => {
                let start = expect_number(&operand!(self, start, scope))?;
                let end = expect_number(&operand!(self, end, scope))?;
                // `for` walks ranges lazily; only a range used as a value is materialized
                let len = if end > start { end.abs_diff(start) } else { 0 };
                if len > self.config.max_range_len {
                    return Err(RuntimeError::RangeTooLong {
                        len,
                        limit: self.config.max_range_len,
                    });
                }
                Ok(Value::Slice((start..end).map(Value::Number).collect()))
            }

            Expr::Vector(items) => match self.evaluate_operands(items, scope)? {
                Operands::Values(values) => {
                    let capacity = values.len();
                    Ok(Value::Vector(self.heap.allocate_vector(values, capacity)?))
                }
                Operands::Error(err) => self.propagate(err),
            },

            Expr::Map(entries) => self.evaluate_map_literal(entries, scope),

            Expr::Closure(def) => self.evaluate_closure(def, scope),

            Expr::AddressOf(target) => self.evaluate_address_of(target, scope),
            Expr::Deref(target) => self.evaluate_deref(target, scope),

            Expr::Unary { op, operand } => self.evaluate_unary(*op, operand, scope),
            Expr::Binary { op, lhs, rhs } => self.evaluate_binary(*op, lhs, rhs, scope),
            Expr::Paren(inner) => self.evaluate_expr(inner, scope),

            Expr::Field { target, field } => self.evaluate_field(target, field, scope),
            Expr::TupleIndex { target, index } => self.evaluate_tuple_index(target, *index, scope),
            Expr::Index { target, index } => self.evaluate_index(target, index, scope),

            Expr::If {
                condition,
                then_branch,
                else_branch,
            } => {
                let condition = operand!(self, condition, scope);
                if Self::truthy(&condition)? {
                    self.evaluate_expr(then_branch, scope)
                } else {
                    self.evaluate_expr(else_branch, scope)
                }
            }

            Expr::Match {
                scrutinee,
                arms,
                default,
            } => {
                let value = operand!(self, scrutinee, scope);
                for (pattern, arm) in arms {
                    if Self::pattern_matches(pattern, &value) {
                        return self.evaluate_expr(arm, scope);
                    }
                }
                match default {
                    Some(default) => self.evaluate_expr(default, scope),
                    None => Ok(Value::Unit),
                }
            }

            Expr::Try { main, fallback } => {
                let taint_depth = self.taint.len();
                self.try_depth += 1;
                let result = self.evaluate_expr(main, scope);
                self.try_depth -= 1;
                match result {
                    Err(RuntimeError::Contained(err)) => {
                        tracing::debug!(message = %err.message, "try expression contained an error");
                        self.taint.truncate(taint_depth);
                        match fallback {
                            Some(fallback) => self.evaluate_expr(fallback, scope),
                            None => Ok(Value::Unit),
                        }
                    }
                    other => other,
                }
            }

            Expr::Call(call) => self.evaluate_call(call, scope),
        }
    }

    pub(crate) fn evaluate_operands(&mut self, exprs: &[Expr], scope: ScopeId) -> Result<Operands, RuntimeError> {
        let mut values = Vec::with_capacity(exprs.len());
        for expr in exprs {
            match self.evaluate_expr(expr, scope)? {
                Value::Error(err) => return Ok(Operands::Error(err)),
                value => values.push(value),
            }
        }
        Ok(Operands::Values(values))
    }

    fn evaluate_map_literal(&mut self, entries: &[(Expr, Expr)], scope: ScopeId) -> Result<Value, RuntimeError> {
        let mut pairs = Vec::with_capacity(entries.len());
        for (key, value) in entries {
            let key = map_key(&operand!(self, key, scope))?;
            let value = operand!(self, value, scope);
            pairs.push((key, value));
        }
        let handle = self.heap.allocate_map(pairs.len())?;
        for (key, value) in pairs {
            // Sized for its entries up front, so never grows here
            self.heap.map_insert(handle, key, value)?;
        }
        Ok(Value::Map(handle))
    }

    /// A closure owns a persistent scope holding copies of every binding
    /// visible where it is created.
    fn evaluate_closure(&mut self, def: &Rc<FunctionDef>, scope: ScopeId) -> Result<Value, RuntimeError> {
        let captured = self.scopes.visible_bindings(scope);
        let outer = self.scopes.enter_child(GENERAL_SCOPE, ScopeKind::Closure);
        for (name, value) in captured {
            self.scopes.declare(outer, &name, value)?;
        }
        let handle = self.heap.allocate(HeapObject::Closure(ClosureData {
            function: Rc::clone(def),
            outer,
        }))?;
        tracing::trace!(%handle, ?outer, "closure created");
        Ok(Value::Closure(handle))
    }

    pub(crate) fn truthy(value: &Value) -> Result<bool, RuntimeError> {
        value.as_bool().ok_or_else(|| RuntimeError::TypeError {
            expected: "bool".to_string(),
            got: value.kind().to_string(),
        })
    }
}
