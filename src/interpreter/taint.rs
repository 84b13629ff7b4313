//! Error values in flight
//!
//! An Error is an ordinary value that spreads: every operation receiving one
//! yields it again (one *hop*, charged at the Error's own energy cost), and a
//! branch entered on an Error condition stores that Error into every variable
//! it writes. Inside a `try` main scope the first Error that would be stored or
//! carried further is turned into [`RuntimeError::Contained`] instead, which
//! unwinds to the `try` and runs its fallback.

use crate::host::{ChargeReason, Host};
use crate::interpreter::engine::Interpreter;
use crate::interpreter::errors::RuntimeError;
use crate::memory::value::{ErrorValue, Value};

/// Evaluate an operand, returning early with the propagated Error if it is one
macro_rules! operand {
    ($interp:expr, $expr:expr, $scope:expr) => {
        match $interp.evaluate_expr($expr, $scope)? {
            $crate::memory::value::Value::Error(err) => return $interp.propagate(err),
            value => value,
        }
    };
}

pub(crate) use operand;

impl<H: Host> Interpreter<H> {
    /// Charge one propagation hop
    pub(crate) fn hop(&mut self, err: &ErrorValue) -> Result<(), RuntimeError> {
        self.charge(err.energy_cost, ChargeReason::ErrorPropagation)
    }

    pub(crate) fn contain(&self, err: &ErrorValue) -> Result<(), RuntimeError> {
        if self.try_depth > 0 {
            Err(RuntimeError::Contained(err.clone()))
        } else {
            Ok(())
        }
    }

    /// Carry an Error received as an operand one hop further
    pub(crate) fn propagate(&mut self, err: ErrorValue) -> Result<Value, RuntimeError> {
        self.hop(&err)?;
        self.contain(&err)?;
        Ok(Value::Error(err))
    }

    /// A freshly raised Error: a literal or an arithmetic fault
    pub(crate) fn produce(&mut self, err: ErrorValue) -> Result<Value, RuntimeError> {
        self.contain(&err)?;
        Ok(Value::Error(err))
    }

    /// The value a variable write actually stores
    pub(crate) fn prepare_store(&mut self, value: Value) -> Result<Value, RuntimeError> {
        let value = match self.taint.last().cloned() {
            Some(err) => {
                self.hop(&err)?;
                Value::Error(err)
            }
            None => value,
        };
        if let Value::Error(err) = &value {
            self.contain(err)?;
        }
        Ok(value)
    }

    /// Run `f` with every store inside it corrupted by `err`
    pub(crate) fn tainted<T>(
        &mut self,
        err: ErrorValue,
        f: impl FnOnce(&mut Self) -> Result<T, RuntimeError>,
    ) -> Result<T, RuntimeError> {
        self.taint.push(err);
        let result = f(self);
        self.taint.pop();
        result
    }
}
