//! Transform declarations within a feature view

use super::view::ViewRef;
use crate::ast::{AggFunc, Expr};
use serde::{Deserialize, Serialize};

/// A row-local derived column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DerivedColumn {
    pub name: String,
    pub expr: Expr,
}

impl DerivedColumn {
    pub fn new(name: impl Into<String>, expr: Expr) -> Self {
        Self {
            name: name.into(),
            expr,
        }
    }
}

/// An aggregation column within a window-aggregation transform
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateColumn {
    pub name: String,
    pub func: AggFunc,
    /// Row-local argument expression evaluated per input row before
    /// accumulation
    pub arg: Expr,
}

impl AggregateColumn {
    pub fn new(name: impl Into<String>, func: AggFunc, arg: Expr) -> Self {
        Self {
            name: name.into(),
            func,
            arg,
        }
    }
}

/// One step of a feature view's transform chain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Transform {
    /// Add or replace row-local derived columns; input columns pass through
    Project { columns: Vec<DerivedColumn> },

    /// Keep rows where the predicate evaluates to true
    Filter { predicate: Expr },

    /// Per-key aggregation over a trailing event-time window, appended to
    /// each input row
    WindowAggregate {
        /// Trailing window length in milliseconds
        window_ms: i64,
        aggregates: Vec<AggregateColumn>,
    },

    /// Enrich each row with the point-in-time-correct latest matching row
    /// of another view
    TemporalJoin {
        right: ViewRef,
        /// Shared key fields joined on
        keys: Vec<String>,
        /// Feature columns taken from the right view
        columns: Vec<String>,
    },
}
