use crate::ast::CoreFn;
use crate::interpreter::errors::RuntimeError;
use crate::interpreter::ops::binary::Arith;
use crate::memory::value::Value;

fn numeric(value: &Value) -> Result<f64, RuntimeError> {
    value.as_f64().ok_or_else(|| RuntimeError::TypeError {
        expected: "number or float".to_string(),
        got: value.kind().to_string(),
    })
}

fn float(f: f64) -> Arith {
    Arith::Value(Value::Float(f))
}

/// Integers stay integers where the result is exact; everything else is a float
pub(crate) fn math_op(function: CoreFn, args: &[Value]) -> Result<Arith, RuntimeError> {
    Ok(match (function, args) {
        (CoreFn::Abs, [Value::Number(n)]) => n
            .checked_abs()
            .map_or(Arith::Fault("integer overflow"), |n| Arith::Value(Value::Number(n))),
        (CoreFn::Floor | CoreFn::Ceil, [Value::Number(n)]) => Arith::Value(Value::Number(*n)),
        (CoreFn::Abs, [x]) => float(numeric(x)?.abs()),
        (CoreFn::Floor, [x]) => float(numeric(x)?.floor()),
        (CoreFn::Ceil, [x]) => float(numeric(x)?.ceil()),
        (CoreFn::Sqrt, [x]) => float(numeric(x)?.sqrt()),
        (CoreFn::Pow, [Value::Number(base), Value::Number(exp)]) => match u32::try_from(*exp) {
            Ok(exp) => base
                .checked_pow(exp)
                .map_or(Arith::Fault("integer overflow"), |n| Arith::Value(Value::Number(n))),
            Err(_) => Arith::Fault("exponent out of range"),
        },
        (CoreFn::Pow, [base, exp]) => float(numeric(base)?.powf(numeric(exp)?)),
        (function, args) => {
            return Err(RuntimeError::TypeError {
                expected: format!("arguments for {:?}", function),
                got: args
                    .iter()
                    .map(|a| a.kind().to_string())
                    .collect::<Vec<_>>()
                    .join(", "),
            })
        }
    })
}
