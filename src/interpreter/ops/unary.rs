use crate::ast::{Expr, UnOp};
use crate::host::Host;
use crate::interpreter::engine::Interpreter;
use crate::interpreter::errors::RuntimeError;
use crate::interpreter::ops::binary::Arith;
use crate::interpreter::taint::operand;
use crate::memory::scope::ScopeId;
use crate::memory::value::{ErrorValue, Value};

pub(crate) fn unary_op(op: UnOp, value: &Value) -> Result<Arith, RuntimeError> {
    match (op, value) {
        (UnOp::Neg, Value::Number(n)) => Ok(n
            .checked_neg()
            .map_or(Arith::Fault("integer overflow"), |n| Arith::Value(Value::Number(n)))),
        (UnOp::Neg, Value::Float(f)) => Ok(Arith::Value(Value::Float(-f))),
        (UnOp::Not, Value::Bool(b)) => Ok(Arith::Value(Value::Bool(!b))),
        (UnOp::Not, Value::Number(n)) => Ok(Arith::Value(Value::Number(!n))),
        (op, other) => Err(RuntimeError::TypeError {
            expected: format!("operand for {:?}", op),
            got: other.kind().to_string(),
        }),
    }
}

impl<H: Host> Interpreter<H> {
    pub(crate) fn evaluate_unary(&mut self, op: UnOp, operand: &Expr, scope: ScopeId) -> Result<Value, RuntimeError> {
        let value = operand!(self, operand, scope);
        match unary_op(op, &value)? {
            Arith::Value(value) => Ok(value),
            Arith::Fault(message) => {
                let cost = self.config.default_error_cost;
                self.produce(ErrorValue::new(message, cost))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_negation() {
        assert_eq!(unary_op(UnOp::Neg, &Value::Number(5)), Ok(Arith::Value(Value::Number(-5))));
        assert_eq!(unary_op(UnOp::Neg, &Value::Number(i64::MIN)), Ok(Arith::Fault("integer overflow")));
    }

    #[test]
    fn test_not() {
        assert_eq!(unary_op(UnOp::Not, &Value::Bool(true)), Ok(Arith::Value(Value::Bool(false))));
        assert_eq!(unary_op(UnOp::Not, &Value::Number(0)), Ok(Arith::Value(Value::Number(-1))));
        assert!(unary_op(UnOp::Not, &Value::Unit).is_err());
    }
}
