//! Static data types for feature values
//!
//! Every feature has exactly one `DType`, determined at definition time.
//! Execution never re-infers types.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Data type of a field or feature value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DType {
    /// 64-bit signed integer
    Int64,
    /// 64-bit floating point
    Float64,
    /// Boolean
    Bool,
    /// UTF-8 string
    String,
    /// Event time as epoch milliseconds
    Timestamp,
}

impl DType {
    /// Whether arithmetic operators apply to this type
    pub fn is_numeric(&self) -> bool {
        matches!(self, DType::Int64 | DType::Float64)
    }

    /// Whether ordering comparisons apply to this type
    pub fn is_comparable(&self) -> bool {
        matches!(
            self,
            DType::Int64 | DType::Float64 | DType::String | DType::Timestamp
        )
    }

    /// The wider of two numeric types (Int64 joined with Float64 is Float64)
    pub fn numeric_join(self, other: DType) -> Option<DType> {
        match (self, other) {
            (DType::Int64, DType::Int64) => Some(DType::Int64),
            (DType::Int64, DType::Float64)
            | (DType::Float64, DType::Int64)
            | (DType::Float64, DType::Float64) => Some(DType::Float64),
            _ => None,
        }
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DType::Int64 => "int64",
            DType::Float64 => "float64",
            DType::Bool => "bool",
            DType::String => "string",
            DType::Timestamp => "timestamp",
        };
        write!(f, "{}", name)
    }
}
