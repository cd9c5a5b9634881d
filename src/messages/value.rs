//! Typed values used by capabilities and header extensions.

use serde::{Deserialize, Serialize};

/// A small tagged union of the value kinds ETP endpoints exchange.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataValue {
    Null,
    Boolean(bool),
    Int(i32),
    Long(i64),
    Double(f64),
    String(String),
    Bytes(Vec<u8>),
}

impl DataValue {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            DataValue::Boolean(value) => Some(*value),
            _ => None,
        }
    }

    /// Integer view of `Int` and `Long` values.
    pub fn as_long(&self) -> Option<i64> {
        match self {
            DataValue::Int(value) => Some(i64::from(*value)),
            DataValue::Long(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            DataValue::String(value) => Some(value),
            _ => None,
        }
    }
}

impl From<bool> for DataValue {
    fn from(value: bool) -> Self {
        DataValue::Boolean(value)
    }
}

impl From<i32> for DataValue {
    fn from(value: i32) -> Self {
        DataValue::Int(value)
    }
}

impl From<i64> for DataValue {
    fn from(value: i64) -> Self {
        DataValue::Long(value)
    }
}

impl From<&str> for DataValue {
    fn from(value: &str) -> Self {
        DataValue::String(value.to_string())
    }
}

impl From<String> for DataValue {
    fn from(value: String) -> Self {
        DataValue::String(value)
    }
}
