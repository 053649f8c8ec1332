//! Physical operators

use crate::ast::{AggFunc, TypedExpr};
use crate::types::{DType, Schema, TimeRange, Value};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// The kinds of physical operators a processor can execute.
///
/// Processors advertise a set of these; the compiler branches on
/// capabilities, never on backend identity.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum OperatorKind {
    Scan,
    Project,
    Filter,
    /// Fused filter-then-project stage
    FilterProject,
    WindowAggregate,
    TemporalJoin,
    TimeRangeFilter,
    KeyFilter,
}

/// A processor's declared operator support
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    kinds: BTreeSet<OperatorKind>,
}

impl Capabilities {
    pub fn of(kinds: impl IntoIterator<Item = OperatorKind>) -> Self {
        Self {
            kinds: kinds.into_iter().collect(),
        }
    }

    /// Every operator kind, fusion included
    pub fn all() -> Self {
        Self::of([
            OperatorKind::Scan,
            OperatorKind::Project,
            OperatorKind::Filter,
            OperatorKind::FilterProject,
            OperatorKind::WindowAggregate,
            OperatorKind::TemporalJoin,
            OperatorKind::TimeRangeFilter,
            OperatorKind::KeyFilter,
        ])
    }

    pub fn supports(&self, kind: OperatorKind) -> bool {
        self.kinds.contains(&kind)
    }

    pub fn kinds(&self) -> impl Iterator<Item = OperatorKind> + '_ {
        self.kinds.iter().copied()
    }
}

/// Window bound policy. The single supported policy is open-lower,
/// closed-upper: a probe at `t` over window `W` sees rows with
/// `ts` in `(t - W, t]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WindowBounds {
    OpenLowerClosedUpper,
}

/// Tie-break rule for rows sharing an entity key and event timestamp
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TieBreak {
    /// The row with the highest ingestion sequence wins
    IngestionOrder,
}

/// Restriction of output rows to a requested entity-key set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyFilter {
    pub fields: Vec<String>,
    /// Requested key tuples, positional against `fields`
    pub keys: Vec<Vec<Value>>,
}

impl KeyFilter {
    pub fn new(fields: Vec<String>, keys: Vec<Vec<Value>>) -> Self {
        Self { fields, keys }
    }
}

/// One output column of a projection stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectColumn {
    pub name: String,
    pub expr: TypedExpr,
}

impl ProjectColumn {
    pub fn new(name: impl Into<String>, expr: TypedExpr) -> Self {
        Self {
            name: name.into(),
            expr,
        }
    }
}

/// A compiled aggregation column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateExpr {
    pub name: String,
    pub func: AggFunc,
    pub arg: TypedExpr,
    pub dtype: DType,
}

/// A physical operator.
///
/// Window and join operators carry the exact point-in-time parameters the
/// compiler resolved from the logical definitions; every processor must
/// implement those semantics bit-for-bit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhysicalOp {
    /// Read a raw source in ingestion order, dropping rows later than the
    /// watermark tolerance
    Scan {
        source: String,
        schema: Schema,
        timestamp_field: String,
        watermark_ms: Option<i64>,
    },

    /// Row-local projection; `columns` is the complete output column list
    Project { columns: Vec<ProjectColumn> },

    /// Keep rows whose predicate evaluates to true
    Filter { predicate: TypedExpr },

    /// Fused filter-then-project stage, emitted only for processors that
    /// advertise the fusion capability
    FilterProject {
        predicate: TypedExpr,
        columns: Vec<ProjectColumn>,
    },

    /// Per-key trailing-window aggregation appended to each probe row
    WindowAggregate {
        keys: Vec<String>,
        timestamp_field: String,
        window_ms: i64,
        bounds: WindowBounds,
        aggregates: Vec<AggregateExpr>,
    },

    /// Enrich left rows with the latest visible right row per key;
    /// inputs are [left, right] and the probe time is the left row's
    /// event timestamp
    TemporalJoin {
        keys: Vec<String>,
        left_timestamp_field: String,
        right_timestamp_field: String,
        tie_break: TieBreak,
        /// Columns taken from the right input
        columns: Vec<String>,
    },

    /// Restrict output rows to an event-time range (start inclusive, end
    /// exclusive); applied above the transform chain so window and join
    /// operators keep their pre-range history
    TimeRangeFilter {
        timestamp_field: String,
        range: TimeRange,
    },

    /// Restrict output rows to the requested entity keys
    KeyFilter(KeyFilter),
}

impl PhysicalOp {
    pub fn kind(&self) -> OperatorKind {
        match self {
            PhysicalOp::Scan { .. } => OperatorKind::Scan,
            PhysicalOp::Project { .. } => OperatorKind::Project,
            PhysicalOp::Filter { .. } => OperatorKind::Filter,
            PhysicalOp::FilterProject { .. } => OperatorKind::FilterProject,
            PhysicalOp::WindowAggregate { .. } => OperatorKind::WindowAggregate,
            PhysicalOp::TemporalJoin { .. } => OperatorKind::TemporalJoin,
            PhysicalOp::TimeRangeFilter { .. } => OperatorKind::TimeRangeFilter,
            PhysicalOp::KeyFilter(_) => OperatorKind::KeyFilter,
        }
    }
}
