use crate::ast::{Block, Expr, MatchArm, Pattern};
use crate::host::Host;
use crate::interpreter::engine::{ControlFlow, Interpreter};
use crate::interpreter::errors::RuntimeError;
use crate::interpreter::expressions::literal_value;
use crate::memory::scope::ScopeId;
use crate::memory::value::Value;

impl<H: Host> Interpreter<H> {
    pub(crate) fn execute_return(&mut self, expr: Option<&Expr>, scope: ScopeId) -> Result<(), RuntimeError> {
        let value = match expr {
            Some(expr) => match self.evaluate_expr(expr, scope)? {
                // Leaving the function is one more hop
                Value::Error(err) => self.propagate(err)?,
                value => value,
            },
            None => Value::Unit,
        };
        self.return_value = Some(value);
        self.control_flow = ControlFlow::Return;
        Ok(())
    }

    /// First matching arm wins; no fallthrough
    pub(crate) fn execute_match(
        &mut self,
        scrutinee: &Expr,
        arms: &[MatchArm],
        default: Option<&Block>,
        scope: ScopeId,
    ) -> Result<(), RuntimeError> {
        let value = self.evaluate_expr(scrutinee, scope)?;

        if let Value::Error(err) = value {
            // A corrupted scrutinee takes the first arm (or the default) tainted
            self.contain(&err)?;
            let Some(body) = arms.first().map(|arm| &arm.body).or(default) else {
                return Ok(());
            };
            return self.tainted(err, |this| this.execute_branch(body, scope));
        }

        let selected = arms
            .iter()
            .find(|arm| Self::pattern_matches(&arm.pattern, &value))
            .map(|arm| &arm.body)
            .or(default);
        match selected {
            Some(body) => self.execute_branch(body, scope),
            None => Ok(()),
        }
    }

    pub(crate) fn pattern_matches(pattern: &Pattern, value: &Value) -> bool {
        match pattern {
            Pattern::Wildcard => true,
            Pattern::Literal(literal) => Self::values_equal(&literal_value(literal), value),
        }
    }

    pub(crate) fn values_equal(a: &Value, b: &Value) -> bool {
        match (a, b) {
            (Value::Number(x), Value::Float(y)) | (Value::Float(y), Value::Number(x)) => *x as f64 == *y,
            _ => a == b,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Literal;
    use crate::host::MockHost;

    type Interp = Interpreter<MockHost>;

    #[test]
    fn test_patterns() {
        assert!(Interp::pattern_matches(&Pattern::Wildcard, &Value::Unit));
        assert!(Interp::pattern_matches(
            &Pattern::Literal(Literal::Char('x')),
            &Value::Char('x')
        ));
        assert!(!Interp::pattern_matches(
            &Pattern::Literal(Literal::Number(1)),
            &Value::Number(2)
        ));
        assert!(Interp::pattern_matches(
            &Pattern::Literal(Literal::Float(2.0)),
            &Value::Number(2)
        ));
    }
}
