//! Typed values shared by device models, virtual devices and messages.

use core::fmt;

use serde::{Deserialize, Serialize};

/// Milliseconds elapsed since 1970-01-01T00:00:00Z.
pub type DateTime = i64;

/// The type of a device-model attribute or format field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum ValueType {
    Integer = 0,
    Number = 1,
    Boolean = 2,
    String = 3,
    DateTime = 4,
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Integer => write!(f, "INTEGER"),
            Self::Number => write!(f, "NUMBER"),
            Self::Boolean => write!(f, "BOOLEAN"),
            Self::String => write!(f, "STRING"),
            Self::DateTime => write!(f, "DATETIME"),
        }
    }
}

/// A value together with its type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Integer(i32),
    Number(f32),
    Boolean(bool),
    String(String),
    DateTime(DateTime),
}

impl Value {
    pub fn value_type(&self) -> ValueType {
        match self {
            Self::Integer(_) => ValueType::Integer,
            Self::Number(_) => ValueType::Number,
            Self::Boolean(_) => ValueType::Boolean,
            Self::String(_) => ValueType::String,
            Self::DateTime(_) => ValueType::DateTime,
        }
    }

    /// Convert a decoded JSON value into a `Value` of the modelled type.
    ///
    /// Returns `None` when the JSON value cannot represent `ty` (wrong kind,
    /// or an integer that does not fit in `i32`).
    pub fn from_json(ty: ValueType, json: &serde_json::Value) -> Option<Self> {
        match ty {
            ValueType::Integer => json
                .as_i64()
                .and_then(|v| i32::try_from(v).ok())
                .map(Self::Integer),
            ValueType::Number => json.as_f64().map(|v| Self::Number(v as f32)),
            ValueType::Boolean => json.as_bool().map(Self::Boolean),
            ValueType::String => json.as_str().map(|s| Self::String(s.to_owned())),
            ValueType::DateTime => json.as_i64().map(Self::DateTime),
        }
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::Integer(v)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Self::Number(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Boolean(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::String(v.to_owned())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

/// An attribute or field name paired with its value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedValue {
    pub name: String,
    pub value: Value,
}

impl NamedValue {
    pub fn new(name: impl Into<String>, value: Value) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }
}
