//! Resolved feature-view graphs
//!
//! A `ResolvedGraph` is the immutable output of resolution: every named
//! reference substituted with its definition, every expression type-checked
//! against its actual input schema, and the whole DAG validated acyclic.

use petgraph::algo::toposort;
use petgraph::graph::DiGraph;
use silo_core::ast::{AggFunc, TypedExpr};
use silo_core::types::{DType, Schema};
use silo_core::view::DataSource;

use crate::error::ResolveError;

/// A compiled aggregation column of a window transform
#[derive(Debug, Clone, PartialEq)]
pub struct TypedAggregate {
    pub name: String,
    pub func: AggFunc,
    pub arg: TypedExpr,
    pub dtype: DType,
}

/// A type-checked on-demand column, evaluated at serving time only
#[derive(Debug, Clone, PartialEq)]
pub struct TypedOnDemand {
    pub name: String,
    pub expr: TypedExpr,
    pub dtype: DType,
}

/// A type-checked transform, with expressions resolved against the running
/// schema at its position in the chain
#[derive(Debug, Clone, PartialEq)]
pub enum TypedTransform {
    Project { columns: Vec<(String, TypedExpr)> },
    Filter { predicate: TypedExpr },
    WindowAggregate {
        window_ms: i64,
        aggregates: Vec<TypedAggregate>,
    },
    TemporalJoin {
        /// Graph index of the right view
        right: usize,
        keys: Vec<String>,
        columns: Vec<String>,
    },
}

/// The input of a resolved view node
#[derive(Debug, Clone, PartialEq)]
pub enum ResolvedInput {
    /// A single upstream node
    Node(usize),
    /// An ordered pair of upstream views, temporally joined on shared keys
    Join {
        left: usize,
        right: usize,
        keys: Vec<String>,
        /// Columns taken from the right view, in joined-schema order
        columns: Vec<String>,
    },
}

/// What a resolved node is
#[derive(Debug, Clone, PartialEq)]
pub enum ResolvedKind {
    Source(DataSource),
    View {
        input: ResolvedInput,
        transforms: Vec<TypedTransform>,
        /// Schema snapshots along the transform chain: `schemas[0]` is the
        /// input schema, `schemas[i + 1]` the schema after transform `i`.
        /// The compiler lowers against these, so resolution is the only
        /// place schemas are ever derived.
        schemas: Vec<Schema>,
        on_demand: Vec<TypedOnDemand>,
        request_schema: Option<Schema>,
    },
}

/// A fully typed node of the resolved graph
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedNode {
    pub name: String,
    /// Pinned concrete version, even when referenced as "latest"
    pub version: u32,
    pub kind: ResolvedKind,
    pub output_schema: Schema,
    pub keys: Vec<String>,
    pub timestamp_field: String,
    /// Graph indexes of direct dependencies
    pub dependencies: Vec<usize>,
}

/// An immutable DAG of fully typed nodes, ready for compilation.
///
/// Nodes are stored dependencies-first, so iterating `order()` visits every
/// upstream node before its dependents.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedGraph {
    nodes: Vec<ResolvedNode>,
    root: usize,
}

impl ResolvedGraph {
    pub(crate) fn new(nodes: Vec<ResolvedNode>, root: usize) -> Self {
        Self { nodes, root }
    }

    pub fn nodes(&self) -> &[ResolvedNode] {
        &self.nodes
    }

    pub fn node(&self, index: usize) -> &ResolvedNode {
        &self.nodes[index]
    }

    pub fn root(&self) -> usize {
        self.root
    }

    pub fn root_node(&self) -> &ResolvedNode {
        &self.nodes[self.root]
    }

    /// Node indexes in dependency order (upstream first)
    pub fn order(&self) -> impl Iterator<Item = usize> + '_ {
        0..self.nodes.len()
    }

    /// Validate acyclicity of the assembled graph.
    ///
    /// The resolver already refuses cycles while walking references; this
    /// re-checks the final structure as an invariant of the type.
    pub(crate) fn validate(&self) -> Result<(), ResolveError> {
        let mut graph = DiGraph::<usize, ()>::new();
        let indices: Vec<_> = (0..self.nodes.len()).map(|i| graph.add_node(i)).collect();
        for (i, node) in self.nodes.iter().enumerate() {
            for &dep in &node.dependencies {
                graph.add_edge(indices[dep], indices[i], ());
            }
        }
        match toposort(&graph, None) {
            Ok(_) => Ok(()),
            Err(cycle) => {
                let start = graph[cycle.node_id()];
                Err(ResolveError::CyclicDependency {
                    path: vec![self.nodes[start].name.clone()],
                })
            }
        }
    }
}
