//! Core data model: keys, field types, cell values and rows.

use std::fmt;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Row position. Totally ordered; scans are always in key order.
pub type Key = i64;

/// Scalar type of a field. Fixed once any value has been written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DataType {
    Boolean,
    Integer,
    Long,
    Float,
    Double,
    Binary,
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DataType::Boolean => "BOOLEAN",
            DataType::Integer => "INTEGER",
            DataType::Long => "LONG",
            DataType::Float => "FLOAT",
            DataType::Double => "DOUBLE",
            DataType::Binary => "BINARY",
        };
        f.write_str(name)
    }
}

/// A single cell value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Boolean(bool),
    Integer(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    Binary(Bytes),
}

impl Value {
    pub fn data_type(&self) -> DataType {
        match self {
            Value::Boolean(_) => DataType::Boolean,
            Value::Integer(_) => DataType::Integer,
            Value::Long(_) => DataType::Long,
            Value::Float(_) => DataType::Float,
            Value::Double(_) => DataType::Double,
            Value::Binary(_) => DataType::Binary,
        }
    }

    /// Approximate in-memory footprint, used for write buffer accounting.
    pub fn estimated_size(&self) -> usize {
        match self {
            Value::Boolean(_) => 1,
            Value::Integer(_) | Value::Float(_) => 4,
            Value::Long(_) | Value::Double(_) => 8,
            Value::Binary(b) => b.len() + 16,
        }
    }

    /// Numeric view used by filter comparisons
    pub(crate) fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Integer(v) => Some(*v as f64),
            Value::Long(v) => Some(*v as f64),
            Value::Float(v) => Some(*v as f64),
            Value::Double(v) => Some(*v),
            Value::Boolean(_) | Value::Binary(_) => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Boolean(v) => write!(f, "{}", v),
            Value::Integer(v) => write!(f, "{}", v),
            Value::Long(v) => write!(f, "{}", v),
            Value::Float(v) => write!(f, "{}", v),
            Value::Double(v) => write!(f, "{}", v),
            Value::Binary(v) => write!(f, "{}", String::from_utf8_lossy(v)),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Boolean(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Integer(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Long(v)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::Float(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Double(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Binary(Bytes::copy_from_slice(v.as_bytes()))
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Binary(Bytes::from(v))
    }
}

/// One row of a query result: a key and the surviving cells at that key,
/// ordered by field name.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    pub key: Key,
    pub cells: Vec<(String, Value)>,
}

impl Row {
    pub fn new(key: Key) -> Self {
        Self {
            key,
            cells: Vec::new(),
        }
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.cells
            .iter()
            .find(|(name, _)| name == field)
            .map(|(_, value)| value)
    }
}
