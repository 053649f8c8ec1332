//! Compiled execution plans

use super::operator::{OperatorKind, PhysicalOp};
use crate::types::Schema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// A node of the physical DAG
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanNode {
    pub id: usize,
    pub op: PhysicalOp,
    /// Input node ids, in operator-defined order
    pub inputs: Vec<usize>,
}

/// A compiled physical plan: a DAG of operators with a single root.
///
/// Structural equality is the compiler's determinism contract: compiling the
/// same inputs twice yields `PartialEq`-equal plans.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionPlan {
    pub nodes: Vec<PlanNode>,
    pub root: usize,
    pub output_schema: Schema,
}

impl ExecutionPlan {
    pub fn node(&self, id: usize) -> Option<&PlanNode> {
        self.nodes.iter().find(|n| n.id == id)
    }

    /// The operator kinds this plan requires of its processor
    pub fn required_kinds(&self) -> BTreeSet<OperatorKind> {
        self.nodes.iter().map(|n| n.op.kind()).collect()
    }
}
