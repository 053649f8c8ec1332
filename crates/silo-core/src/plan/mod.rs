//! Physical execution-plan IR
//!
//! An `ExecutionPlan` is the compiled, processor-targeted representation of
//! a feature view for one (time range, key filter, processor) request. It is
//! created per compilation and discarded after execution; it is never
//! persisted.

mod operator;
mod plan;

pub use operator::{
    AggregateExpr, Capabilities, KeyFilter, OperatorKind, PhysicalOp, ProjectColumn, TieBreak,
    WindowBounds,
};
pub use plan::{ExecutionPlan, PlanNode};
