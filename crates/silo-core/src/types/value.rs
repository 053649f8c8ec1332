//! Runtime value types for Silo rows
//!
//! Unlike a JSON-style value, `Value` keeps integers, floats and timestamps
//! apart so that every feature column carries a single static `DType`.
//! Serialization is externally tagged; an untagged representation could not
//! tell `Int64` from `Timestamp` on the way back in.

use super::DType;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Runtime value of a single cell
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// Absent value
    Null,
    /// 64-bit signed integer
    Int64(i64),
    /// 64-bit floating point
    Float64(f64),
    /// Boolean
    Bool(bool),
    /// UTF-8 string
    String(String),
    /// Event time as epoch milliseconds
    Timestamp(i64),
}

impl Value {
    /// The data type of this value, or `None` for `Null`
    pub fn dtype(&self) -> Option<DType> {
        match self {
            Value::Null => None,
            Value::Int64(_) => Some(DType::Int64),
            Value::Float64(_) => Some(DType::Float64),
            Value::Bool(_) => Some(DType::Bool),
            Value::String(_) => Some(DType::String),
            Value::Timestamp(_) => Some(DType::Timestamp),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// The additive identity for a numeric type
    pub fn zero(dtype: DType) -> Value {
        match dtype {
            DType::Int64 => Value::Int64(0),
            DType::Float64 => Value::Float64(0.0),
            DType::Timestamp => Value::Timestamp(0),
            DType::Bool => Value::Bool(false),
            DType::String => Value::String(String::new()),
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int64(v) => Some(*v),
            Value::Timestamp(v) => Some(*v),
            _ => None,
        }
    }

    /// Numeric view of the value, widening integers
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int64(v) => Some(*v as f64),
            Value::Float64(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(v) => Some(v),
            _ => None,
        }
    }

    /// Total ordering across all values.
    ///
    /// Within a type the natural order applies; `Int64` and `Float64`
    /// compare numerically against each other. Across types the order is
    /// Null < Bool < numeric < String < Timestamp. Used as the documented
    /// last-resort tie-break, so it must never report two distinct values
    /// as arbitrary.
    pub fn cmp_total(&self, other: &Value) -> Ordering {
        fn rank(v: &Value) -> u8 {
            match v {
                Value::Null => 0,
                Value::Bool(_) => 1,
                Value::Int64(_) | Value::Float64(_) => 2,
                Value::String(_) => 3,
                Value::Timestamp(_) => 4,
            }
        }

        match (self, other) {
            (Value::Null, Value::Null) => Ordering::Equal,
            (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
            (Value::String(a), Value::String(b)) => a.cmp(b),
            (Value::Timestamp(a), Value::Timestamp(b)) => a.cmp(b),
            (a, b) if rank(a) == 2 && rank(b) == 2 => {
                let x = a.as_f64().unwrap_or(f64::NAN);
                let y = b.as_f64().unwrap_or(f64::NAN);
                x.partial_cmp(&y).unwrap_or(Ordering::Equal)
            }
            (a, b) => rank(a).cmp(&rank(b)),
        }
    }
}
