//! Dynamic SQL values.
//!
//! The engine has five storage classes and nothing else, so [`Value`] mirrors
//! them exactly. Booleans are stored as integers 0/1.

use serde::{Deserialize, Serialize};

/// A dynamically-typed SQL value, used for parameter binding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// NULL value
    Null,

    /// 64-bit signed integer
    Integer(i64),

    /// 64-bit floating point
    Real(f64),

    /// UTF-8 text
    Text(String),

    /// Binary data
    Blob(Vec<u8>),
}

/// A borrowed view of a value, as read straight out of a result row.
///
/// Text is kept as raw bytes; the engine does not guarantee valid UTF-8.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ValueRef<'a> {
    Null,
    Integer(i64),
    Real(f64),
    Text(&'a [u8]),
    Blob(&'a [u8]),
}

/// Storage class of a stored value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FieldType {
    Null,
    Integer,
    Float,
    Text,
    Blob,
}

impl Value {
    /// Check if this value is NULL.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Get the storage class of this value.
    pub fn field_type(&self) -> FieldType {
        match self {
            Value::Null => FieldType::Null,
            Value::Integer(_) => FieldType::Integer,
            Value::Real(_) => FieldType::Float,
            Value::Text(_) => FieldType::Text,
            Value::Blob(_) => FieldType::Blob,
        }
    }

    /// Borrow this value as a [`ValueRef`].
    pub fn as_value_ref(&self) -> ValueRef<'_> {
        match self {
            Value::Null => ValueRef::Null,
            Value::Integer(v) => ValueRef::Integer(*v),
            Value::Real(v) => ValueRef::Real(*v),
            Value::Text(s) => ValueRef::Text(s.as_bytes()),
            Value::Blob(b) => ValueRef::Blob(b),
        }
    }

    /// Try to get this value as an i64.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(v) => Some(*v),
            _ => None,
        }
    }

    /// Try to get this value as a string slice.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl ValueRef<'_> {
    /// Get the storage class of this value.
    pub fn field_type(&self) -> FieldType {
        match self {
            ValueRef::Null => FieldType::Null,
            ValueRef::Integer(_) => FieldType::Integer,
            ValueRef::Real(_) => FieldType::Float,
            ValueRef::Text(_) => FieldType::Text,
            ValueRef::Blob(_) => FieldType::Blob,
        }
    }

    /// Copy into an owned [`Value`]. Invalid UTF-8 in text is replaced.
    pub fn to_owned_value(&self) -> Value {
        match *self {
            ValueRef::Null => Value::Null,
            ValueRef::Integer(v) => Value::Integer(v),
            ValueRef::Real(v) => Value::Real(v),
            ValueRef::Text(bytes) => Value::Text(String::from_utf8_lossy(bytes).into_owned()),
            ValueRef::Blob(bytes) => Value::Blob(bytes.to_vec()),
        }
    }
}

impl FieldType {
    /// Get the type name for error messages.
    pub const fn name(self) -> &'static str {
        match self {
            FieldType::Null => "NULL",
            FieldType::Integer => "INTEGER",
            FieldType::Float => "FLOAT",
            FieldType::Text => "TEXT",
            FieldType::Blob => "BLOB",
        }
    }

    pub(crate) fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(FieldType::Null),
            1 => Some(FieldType::Integer),
            2 => Some(FieldType::Float),
            3 => Some(FieldType::Text),
            4 => Some(FieldType::Blob),
            _ => None,
        }
    }

    pub(crate) fn tag(self) -> u8 {
        match self {
            FieldType::Null => 0,
            FieldType::Integer => 1,
            FieldType::Float => 2,
            FieldType::Text => 3,
            FieldType::Blob => 4,
        }
    }
}

impl<'a> From<&'a Value> for ValueRef<'a> {
    fn from(v: &'a Value) -> Self {
        v.as_value_ref()
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Integer(i64::from(v))
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Integer(i64::from(v))
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Value::Integer(i64::from(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Real(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Blob(v)
    }
}

impl From<&[u8]> for Value {
    fn from(v: &[u8]) -> Self {
        Value::Blob(v.to_vec())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        match v {
            Some(v) => v.into(),
            None => Value::Null,
        }
    }
}
