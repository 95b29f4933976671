//! Array element values and keys

use std::fmt;
use std::sync::Arc;

use crate::array::ArrayRef;

/// A value stored in an array
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Null
    Null,
    /// Boolean
    Bool(bool),
    /// Integer
    Int(i64),
    /// Float
    Double(f64),
    /// String
    Str(Arc<str>),
    /// Nested array (compared by identity)
    Array(ArrayRef),
}

impl Value {
    /// Type name used in diagnostics
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Double(_) => "float",
            Self::Str(_) => "string",
            Self::Array(_) => "array",
        }
    }

    /// The key this value denotes, if it can be a key
    pub fn as_key(&self) -> Option<ArrayKey> {
        match self {
            Self::Int(i) => Some(ArrayKey::Int(*i)),
            Self::Str(s) => Some(ArrayKey::Str(s.clone())),
            _ => None,
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Self::Int(i)
    }
}

impl From<f64> for Value {
    fn from(d: f64) -> Self {
        Self::Double(d)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Str(Arc::from(s))
    }
}

impl From<ArrayRef> for Value {
    fn from(a: ArrayRef) -> Self {
        Self::Array(a)
    }
}

impl From<ArrayKey> for Value {
    fn from(k: ArrayKey) -> Self {
        match k {
            ArrayKey::Int(i) => Self::Int(i),
            ArrayKey::Str(s) => Self::Str(s),
        }
    }
}

/// An array key
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ArrayKey {
    /// Integer key
    Int(i64),
    /// String key
    Str(Arc<str>),
}

impl From<i64> for ArrayKey {
    fn from(i: i64) -> Self {
        Self::Int(i)
    }
}

impl From<&str> for ArrayKey {
    fn from(s: &str) -> Self {
        Self::Str(Arc::from(s))
    }
}

impl fmt::Display for ArrayKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(i) => write!(f, "{i}"),
            Self::Str(s) => write!(f, "\"{s}\""),
        }
    }
}
