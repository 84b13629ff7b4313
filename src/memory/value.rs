//! Runtime value representation
//!
//! This module defines the [`Value`] enum, the tagged representation of every
//! value a Ciphel program can hold.
//!
//! # Stack and heap kinds
//!
//! - Stack kinds (`Number`, `Float`, `Char`, `Bool`, `Slice`, `StaticString`,
//!   `Unit`, `Tuple`, `Address`, `Struct`, `Function`) are copied on assignment.
//! - Heap kinds (`Vector`, `Map`, `Closure`, `Channel`) carry a [`HeapHandle`];
//!   copying the value shares the object.
//!
//! # Errors
//!
//! [`Value::Error`] is not an exception: it is an ordinary value that corrupts
//! whatever variable holds it.

use std::fmt;
use std::rc::Rc;

use rustc_hash::FxHashMap;

use super::scope::ScopeId;
use crate::ast::FunctionDef;

/// Memory address type (64-bit)
pub type Address = u64;

/// Stable identifier of a heap object.
///
/// The handle survives reallocation; the object's backing [`Address`] does not.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HeapHandle(pub u32);

impl fmt::Display for HeapHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// The language-level Error value
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorValue {
    pub message: String,
    pub energy_cost: u64,
}

impl ErrorValue {
    pub fn new(message: impl Into<String>, energy_cost: u64) -> Self {
        ErrorValue {
            message: message.into(),
            energy_cost,
        }
    }
}

/// Runtime values in the interpreter
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    Number(i64),
    Float(f64),
    Char(char),
    Bool(bool),
    Slice(Vec<Value>),
    StaticString(String),
    #[default]
    Unit,
    Tuple(Vec<Value>),
    Address(Address),
    Struct(FxHashMap<String, Value>), // Field name -> field value
    /// A named function and the scope that defined it
    Function(Rc<FunctionDef>, ScopeId),
    Vector(HeapHandle),
    Map(HeapHandle),
    Closure(HeapHandle),
    Channel(HeapHandle),
    Error(ErrorValue),
}

/// Type tag of a value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    Number,
    Float,
    Char,
    Bool,
    Slice,
    StaticString,
    Unit,
    Tuple,
    Address,
    Struct,
    Function,
    Vector,
    Map,
    Closure,
    Channel,
    Error,
}

impl ValueKind {
    pub fn is_heap(&self) -> bool {
        matches!(
            self,
            ValueKind::Vector | ValueKind::Map | ValueKind::Closure | ValueKind::Channel
        )
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValueKind::Number => "number",
            ValueKind::Float => "float",
            ValueKind::Char => "char",
            ValueKind::Bool => "bool",
            ValueKind::Slice => "slice",
            ValueKind::StaticString => "string",
            ValueKind::Unit => "unit",
            ValueKind::Tuple => "tuple",
            ValueKind::Address => "address",
            ValueKind::Struct => "struct",
            ValueKind::Function => "function",
            ValueKind::Vector => "vector",
            ValueKind::Map => "map",
            ValueKind::Closure => "closure",
            ValueKind::Channel => "channel",
            ValueKind::Error => "error",
        };
        f.write_str(name)
    }
}

impl Value {
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Number(_) => ValueKind::Number,
            Value::Float(_) => ValueKind::Float,
            Value::Char(_) => ValueKind::Char,
            Value::Bool(_) => ValueKind::Bool,
            Value::Slice(_) => ValueKind::Slice,
            Value::StaticString(_) => ValueKind::StaticString,
            Value::Unit => ValueKind::Unit,
            Value::Tuple(_) => ValueKind::Tuple,
            Value::Address(_) => ValueKind::Address,
            Value::Struct(_) => ValueKind::Struct,
            Value::Function(..) => ValueKind::Function,
            Value::Vector(_) => ValueKind::Vector,
            Value::Map(_) => ValueKind::Map,
            Value::Closure(_) => ValueKind::Closure,
            Value::Channel(_) => ValueKind::Channel,
            Value::Error(_) => ValueKind::Error,
        }
    }

    /// Check if this value lives on the heap
    pub fn is_heap(&self) -> bool {
        self.kind().is_heap()
    }

    /// Check if this value is a (corrupting) Error
    pub fn is_error(&self) -> bool {
        matches!(self, Value::Error(_))
    }

    pub fn as_error(&self) -> Option<&ErrorValue> {
        match self {
            Value::Error(err) => Some(err),
            _ => None,
        }
    }

    /// Get the heap handle of a heap-kind value
    pub fn heap_handle(&self) -> Option<HeapHandle> {
        match self {
            Value::Vector(h) | Value::Map(h) | Value::Closure(h) | Value::Channel(h) => Some(*h),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<i64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Numeric view used by threshold comparisons
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Number(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<ErrorValue> for Value {
    fn from(err: ErrorValue) -> Self {
        Value::Error(err)
    }
}

/// Hashable map key.
///
/// Only primitive (non-float) and address values may key a map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MapKey {
    Number(i64),
    Char(char),
    Bool(bool),
    Address(Address),
}

impl MapKey {
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => Some(MapKey::Number(*n)),
            Value::Char(c) => Some(MapKey::Char(*c)),
            Value::Bool(b) => Some(MapKey::Bool(*b)),
            Value::Address(a) => Some(MapKey::Address(*a)),
            _ => None,
        }
    }

    pub fn to_value(self) -> Value {
        match self {
            MapKey::Number(n) => Value::Number(n),
            MapKey::Char(c) => Value::Char(c),
            MapKey::Bool(b) => Value::Bool(b),
            MapKey::Address(a) => Value::Address(a),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_heap_kinds() {
        assert!(Value::Vector(HeapHandle(0)).is_heap());
        assert!(Value::Channel(HeapHandle(3)).is_heap());
        assert!(!Value::Number(1).is_heap());
        assert!(!Value::Address(0x10).is_heap());
    }

    #[test]
    fn test_map_keys_reject_non_hashable() {
        assert_eq!(MapKey::from_value(&Value::Number(4)), Some(MapKey::Number(4)));
        assert_eq!(
            MapKey::from_value(&Value::Address(0x1000_0000)),
            Some(MapKey::Address(0x1000_0000))
        );
        assert_eq!(MapKey::from_value(&Value::Float(1.5)), None);
        assert_eq!(MapKey::from_value(&Value::Slice(vec![])), None);
        assert_eq!(MapKey::from_value(&Value::Vector(HeapHandle(1))), None);
    }

    #[test]
    fn test_error_accessors() {
        let err = Value::Error(ErrorValue::new("E", 5));
        assert!(err.is_error());
        assert_eq!(err.as_error().map(|e| e.energy_cost), Some(5));
        assert_eq!(err.kind(), ValueKind::Error);
    }
}
