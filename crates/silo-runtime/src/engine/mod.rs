//! In-process plan execution
//!
//! The engine evaluates a compiled plan node by node. It is the reference
//! implementation of every physical operator: the point-in-time rules come
//! from `silo_compiler::pit`, so any processor built on this engine is
//! automatically consistent with the compiler's semantics.

mod operators;

use serde::{Deserialize, Serialize};
use silo_core::plan::{ExecutionPlan, PhysicalOp};
use silo_core::types::Table;
use std::sync::Arc;

use crate::error::{Result, RuntimeError};
use crate::provider::SourceProvider;

/// The result of executing a plan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionOutput {
    pub table: Table,
    /// Rows excluded at scan time as later than the watermark tolerance
    pub dropped_late: u64,
}

/// In-process, synchronous plan evaluator
pub struct Engine {
    provider: Arc<dyn SourceProvider>,
}

impl Engine {
    pub fn new(provider: Arc<dyn SourceProvider>) -> Self {
        Self { provider }
    }

    /// Execute a plan to completion.
    ///
    /// Plan nodes are stored dependencies-first, so a single forward pass
    /// evaluates every operator exactly once.
    pub fn execute(&self, plan: &ExecutionPlan) -> Result<ExecutionOutput> {
        let mut results: Vec<Option<Table>> = vec![None; plan.nodes.len()];
        let mut dropped_late = 0u64;

        for node in &plan.nodes {
            let input = |index: usize| -> Result<Table> {
                results
                    .get(node.inputs[index])
                    .and_then(|t| t.clone())
                    .ok_or_else(|| {
                        RuntimeError::Execution(format!(
                            "plan node {} input {} not yet evaluated",
                            node.id, index
                        ))
                    })
            };

            let table = match &node.op {
                PhysicalOp::Scan {
                    source,
                    schema,
                    timestamp_field,
                    watermark_ms,
                } => {
                    let raw = self.provider.scan(source)?;
                    let (table, dropped) =
                        operators::scan(raw, schema, timestamp_field, *watermark_ms)?;
                    dropped_late += dropped;
                    table
                }

                PhysicalOp::Project { columns } => operators::project(&input(0)?, columns)?,

                PhysicalOp::Filter { predicate } => operators::filter(&input(0)?, predicate)?,

                PhysicalOp::FilterProject { predicate, columns } => {
                    let filtered = operators::filter(&input(0)?, predicate)?;
                    operators::project(&filtered, columns)?
                }

                PhysicalOp::WindowAggregate {
                    keys,
                    timestamp_field,
                    window_ms,
                    bounds,
                    aggregates,
                } => operators::window_aggregate(
                    &input(0)?,
                    keys,
                    timestamp_field,
                    *window_ms,
                    *bounds,
                    aggregates,
                )?,

                PhysicalOp::TemporalJoin {
                    keys,
                    left_timestamp_field,
                    right_timestamp_field,
                    tie_break,
                    columns,
                } => operators::temporal_join(
                    &input(0)?,
                    &input(1)?,
                    keys,
                    left_timestamp_field,
                    right_timestamp_field,
                    *tie_break,
                    columns,
                )?,

                PhysicalOp::TimeRangeFilter {
                    timestamp_field,
                    range,
                } => operators::time_range_filter(&input(0)?, timestamp_field, *range)?,

                PhysicalOp::KeyFilter(filter) => operators::key_filter(&input(0)?, filter)?,
            };

            results[node.id] = Some(table);
        }

        let table = results
            .get(plan.root)
            .and_then(|t| t.clone())
            .ok_or_else(|| RuntimeError::Execution("plan has no root result".to_string()))?;

        Ok(ExecutionOutput {
            table,
            dropped_late,
        })
    }
}
