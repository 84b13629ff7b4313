use crate::ast::{BinOp, Expr};
use crate::host::Host;
use crate::interpreter::engine::Interpreter;
use crate::interpreter::errors::RuntimeError;
use crate::interpreter::taint::operand;
use crate::memory::scope::ScopeId;
use crate::memory::value::{ErrorValue, Value};

/// Result of applying an operator to two clean operands
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Arith {
    Value(Value),
    /// Arithmetic fault raised as an Error value (division by zero, overflow)
    Fault(&'static str),
}

fn mismatch(op: BinOp, left: &Value, right: &Value) -> RuntimeError {
    RuntimeError::TypeError {
        expected: format!("operands for {:?}", op),
        got: format!("{} and {}", left.kind(), right.kind()),
    }
}

fn checked(result: Option<i64>, fault: &'static str) -> Arith {
    result.map_or(Arith::Fault(fault), |n| Arith::Value(Value::Number(n)))
}

fn integer_op(op: BinOp, a: i64, b: i64) -> Option<Arith> {
    Some(match op {
        BinOp::Add => checked(a.checked_add(b), "integer overflow"),
        BinOp::Sub => checked(a.checked_sub(b), "integer overflow"),
        BinOp::Mul => checked(a.checked_mul(b), "integer overflow"),
        BinOp::Div if b == 0 => Arith::Fault("division by zero"),
        BinOp::Div => checked(a.checked_div(b), "integer overflow"),
        BinOp::Mod if b == 0 => Arith::Fault("division by zero"),
        BinOp::Mod => checked(a.checked_rem(b), "integer overflow"),
        BinOp::BitAnd => Arith::Value(Value::Number(a & b)),
        BinOp::BitOr => Arith::Value(Value::Number(a | b)),
        BinOp::BitXor => Arith::Value(Value::Number(a ^ b)),
        BinOp::Shl | BinOp::Shr => {
            let shifted = u32::try_from(b).ok().and_then(|shift| match op {
                BinOp::Shl => a.checked_shl(shift),
                _ => a.checked_shr(shift),
            });
            checked(shifted, "shift out of range")
        }
        _ => return None,
    })
}

fn float_op(op: BinOp, a: f64, b: f64) -> Option<Arith> {
    Some(match op {
        BinOp::Add => Arith::Value(Value::Float(a + b)),
        BinOp::Sub => Arith::Value(Value::Float(a - b)),
        BinOp::Mul => Arith::Value(Value::Float(a * b)),
        BinOp::Div | BinOp::Mod if b == 0.0 => Arith::Fault("division by zero"),
        BinOp::Div => Arith::Value(Value::Float(a / b)),
        BinOp::Mod => Arith::Value(Value::Float(a % b)),
        _ => return None,
    })
}

fn ordering(op: BinOp, ord: Option<std::cmp::Ordering>) -> Option<bool> {
    use std::cmp::Ordering::*;
    let ord = ord?;
    Some(match op {
        BinOp::Lt => ord == Less,
        BinOp::Le => ord != Greater,
        BinOp::Gt => ord == Greater,
        BinOp::Ge => ord != Less,
        _ => return None,
    })
}

/// Apply a non-short-circuit operator to two non-Error operands
pub(crate) fn binary_op(op: BinOp, left: &Value, right: &Value) -> Result<Arith, RuntimeError> {
    if matches!(op, BinOp::Eq | BinOp::Ne) {
        let equal = left == right;
        return Ok(Arith::Value(Value::Bool(equal == (op == BinOp::Eq))));
    }

    let comparison = matches!(op, BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge);
    let result = match (left, right) {
        (Value::Number(a), Value::Number(b)) if comparison => ordering(op, Some(a.cmp(b))).map(|r| Arith::Value(Value::Bool(r))),
        (Value::Number(a), Value::Number(b)) => integer_op(op, *a, *b),
        (Value::Float(_), Value::Float(_) | Value::Number(_)) | (Value::Number(_), Value::Float(_)) => {
            // Mixed operands are promoted to float
            let (a, b) = (left.as_f64(), right.as_f64());
            match (a, b) {
                (Some(a), Some(b)) if comparison => ordering(op, a.partial_cmp(&b)).map(|r| Arith::Value(Value::Bool(r))),
                (Some(a), Some(b)) => float_op(op, a, b),
                _ => None,
            }
        }
        (Value::Char(a), Value::Char(b)) if comparison => ordering(op, Some(a.cmp(b))).map(|r| Arith::Value(Value::Bool(r))),
        (Value::Bool(a), Value::Bool(b)) => match op {
            BinOp::BitAnd => Some(Arith::Value(Value::Bool(a & b))),
            BinOp::BitOr => Some(Arith::Value(Value::Bool(a | b))),
            BinOp::BitXor => Some(Arith::Value(Value::Bool(a ^ b))),
            _ => None,
        },
        (Value::StaticString(a), Value::StaticString(b)) => match op {
            BinOp::Add => Some(Arith::Value(Value::StaticString(format!("{a}{b}")))),
            _ if comparison => ordering(op, Some(a.cmp(b))).map(|r| Arith::Value(Value::Bool(r))),
            _ => None,
        },
        (Value::Slice(a), Value::Slice(b)) if op == BinOp::Add => {
            Some(Arith::Value(Value::Slice(a.iter().chain(b).cloned().collect())))
        }
        _ => None,
    };
    result.ok_or_else(|| mismatch(op, left, right))
}

fn expect_bool(value: &Value) -> Result<bool, RuntimeError> {
    value.as_bool().ok_or_else(|| RuntimeError::TypeError {
        expected: "bool".to_string(),
        got: value.kind().to_string(),
    })
}

impl<H: Host> Interpreter<H> {
    pub(crate) fn evaluate_binary(&mut self, op: BinOp, lhs: &Expr, rhs: &Expr, scope: ScopeId) -> Result<Value, RuntimeError> {
        let left = operand!(self, lhs, scope);

        if matches!(op, BinOp::And | BinOp::Or) {
            let l = expect_bool(&left)?;
            // Short-circuit
            if l == (op == BinOp::Or) {
                return Ok(Value::Bool(l));
            }
            let right = operand!(self, rhs, scope);
            return Ok(Value::Bool(expect_bool(&right)?));
        }

        let right = operand!(self, rhs, scope);
        match binary_op(op, &left, &right)? {
            Arith::Value(value) => Ok(value),
            Arith::Fault(message) => {
                let cost = self.config.default_error_cost;
                self.produce(ErrorValue::new(message, cost))
            }
        }
    }
}
