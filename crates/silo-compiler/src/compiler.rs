//! Execution plan compiler
//!
//! Lowers a resolved graph into a physical plan for a concrete
//! (time range, key filter, capability set) request. Lowering is
//! deterministic: the same inputs always produce a structurally equal plan.
//!
//! Capability-aware choices (operator fusion) change the plan's shape but
//! never its observable results; the point-in-time parameters on window and
//! join operators come straight from the [`pit`](crate::pit) semantics.

use silo_core::ast::{TypedExpr, TypedExprKind};
use silo_core::plan::{
    AggregateExpr, Capabilities, ExecutionPlan, KeyFilter, OperatorKind, PhysicalOp, PlanNode,
    ProjectColumn, TieBreak, WindowBounds,
};
use silo_core::types::{Schema, TimeRange};
use std::collections::HashMap;

use crate::error::CompileError;
use crate::graph::{ResolvedGraph, ResolvedInput, ResolvedKind, TypedTransform};

type Result<T> = std::result::Result<T, CompileError>;

/// Compiler options
#[derive(Debug, Clone)]
pub struct CompilerOptions {
    /// Fuse a filter directly followed by a projection into one stage when
    /// the target processor supports it
    pub enable_operator_fusion: bool,
}

impl Default for CompilerOptions {
    fn default() -> Self {
        Self {
            enable_operator_fusion: true,
        }
    }
}

/// The Silo plan compiler
pub struct PlanCompiler {
    options: CompilerOptions,
}

impl Default for PlanCompiler {
    fn default() -> Self {
        Self::new()
    }
}

impl PlanCompiler {
    pub fn new() -> Self {
        Self::with_options(CompilerOptions::default())
    }

    pub fn with_options(options: CompilerOptions) -> Self {
        Self { options }
    }

    /// Compile a resolved graph for a target processor.
    ///
    /// `range: None` leaves the output unbounded in event time; a `Some`
    /// range restricts output rows to `[start, end)` without starving
    /// window or join operators of earlier history.
    pub fn compile(
        &self,
        graph: &ResolvedGraph,
        range: Option<TimeRange>,
        key_filter: Option<&KeyFilter>,
        capabilities: &Capabilities,
    ) -> Result<ExecutionPlan> {
        if let Some(range) = range {
            if !range.is_valid() {
                return Err(CompileError::InvalidTimeRange {
                    start: range.start,
                    end: range.end,
                });
            }
        }

        let fuse = self.options.enable_operator_fusion
            && capabilities.supports(OperatorKind::FilterProject);

        let mut builder = PlanBuilder::default();
        // resolved node index -> plan node id of that node's root operator
        let mut lowered: HashMap<usize, usize> = HashMap::new();

        for index in graph.order() {
            let node = graph.node(index);
            let plan_id = match &node.kind {
                ResolvedKind::Source(source) => builder.push(
                    PhysicalOp::Scan {
                        source: source.name.clone(),
                        schema: source.schema.clone(),
                        timestamp_field: source.timestamp_field.clone(),
                        watermark_ms: source.watermark_ms,
                    },
                    vec![],
                ),

                ResolvedKind::View {
                    input,
                    transforms,
                    schemas,
                    ..
                } => {
                    let mut current = match input {
                        ResolvedInput::Node(upstream) => lowered[upstream],
                        ResolvedInput::Join {
                            left,
                            right,
                            keys,
                            columns,
                        } => builder.push(
                            PhysicalOp::TemporalJoin {
                                keys: keys.clone(),
                                left_timestamp_field: graph
                                    .node(*left)
                                    .timestamp_field
                                    .clone(),
                                right_timestamp_field: graph
                                    .node(*right)
                                    .timestamp_field
                                    .clone(),
                                tie_break: TieBreak::IngestionOrder,
                                columns: columns.clone(),
                            },
                            vec![lowered[left], lowered[right]],
                        ),
                    };

                    current = self.lower_transforms(
                        graph, &mut builder, &lowered, current, transforms, schemas, node, fuse,
                    );

                    // Restrict to the declared features when the output
                    // schema narrows the chain's final schema
                    let final_schema = schemas.last().expect("chain has an input schema");
                    if node.output_schema != *final_schema {
                        let columns = passthrough_columns(&node.output_schema, final_schema);
                        current = builder.push(PhysicalOp::Project { columns }, vec![current]);
                    }

                    current
                }
            };
            lowered.insert(index, plan_id);
        }

        let root_node = graph.root_node();
        let mut root = lowered[&graph.root()];

        if let Some(range) = range {
            root = builder.push(
                PhysicalOp::TimeRangeFilter {
                    timestamp_field: root_node.timestamp_field.clone(),
                    range,
                },
                vec![root],
            );
        }

        if let Some(filter) = key_filter {
            for field in &filter.fields {
                if !root_node.output_schema.contains(field) {
                    return Err(CompileError::InvalidKeyFilter(format!(
                        "field '{}' is not in the view output",
                        field
                    )));
                }
            }
            for key in &filter.keys {
                if key.len() != filter.fields.len() {
                    return Err(CompileError::InvalidKeyFilter(format!(
                        "key tuple has {} values for {} fields",
                        key.len(),
                        filter.fields.len()
                    )));
                }
            }
            root = builder.push(PhysicalOp::KeyFilter(filter.clone()), vec![root]);
        }

        let plan = ExecutionPlan {
            nodes: builder.nodes,
            root,
            output_schema: root_node.output_schema.clone(),
        };

        for kind in plan.required_kinds() {
            if !capabilities.supports(kind) {
                return Err(CompileError::UnsupportedOperator { kind });
            }
        }

        Ok(plan)
    }

    #[allow(clippy::too_many_arguments)]
    fn lower_transforms(
        &self,
        graph: &ResolvedGraph,
        builder: &mut PlanBuilder,
        lowered: &HashMap<usize, usize>,
        mut current: usize,
        transforms: &[TypedTransform],
        schemas: &[Schema],
        node: &crate::graph::ResolvedNode,
        fuse: bool,
    ) -> usize {
        // A filter is held back one step so it can fuse with a directly
        // following projection
        let mut pending_filter: Option<TypedExpr> = None;
        // Plan id, window length and input width of a window operator that
        // directly precedes this step, for merging aggregates that share
        // one window descriptor
        let mut open_window: Option<(usize, i64, usize)> = None;

        for (step, transform) in transforms.iter().enumerate() {
            let input_schema = &schemas[step];
            let output_schema = &schemas[step + 1];

            match transform {
                TypedTransform::Project { columns } => {
                    open_window = None;
                    let project_columns =
                        derived_columns(columns, input_schema, output_schema);
                    current = match pending_filter.take() {
                        Some(predicate) if fuse => builder.push(
                            PhysicalOp::FilterProject {
                                predicate,
                                columns: project_columns,
                            },
                            vec![current],
                        ),
                        Some(predicate) => {
                            let filtered =
                                builder.push(PhysicalOp::Filter { predicate }, vec![current]);
                            builder.push(
                                PhysicalOp::Project {
                                    columns: project_columns,
                                },
                                vec![filtered],
                            )
                        }
                        None => builder.push(
                            PhysicalOp::Project {
                                columns: project_columns,
                            },
                            vec![current],
                        ),
                    };
                }

                TypedTransform::Filter { predicate } => {
                    open_window = None;
                    if let Some(previous) = pending_filter.take() {
                        current =
                            builder.push(PhysicalOp::Filter { predicate: previous }, vec![current]);
                    }
                    pending_filter = Some(predicate.clone());
                }

                TypedTransform::WindowAggregate {
                    window_ms,
                    aggregates,
                } => {
                    if let Some(predicate) = pending_filter.take() {
                        current = builder.push(PhysicalOp::Filter { predicate }, vec![current]);
                        open_window = None;
                    }

                    let compiled: Vec<AggregateExpr> = aggregates
                        .iter()
                        .map(|aggregate| AggregateExpr {
                            name: aggregate.name.clone(),
                            func: aggregate.func,
                            arg: aggregate.arg.clone(),
                            dtype: aggregate.dtype,
                        })
                        .collect();

                    // Aggregations over the same window and keys collapse
                    // into one operator, unless an argument reads a column
                    // the open window itself produced
                    let mergeable = match open_window {
                        Some((_, open_ms, input_width)) => {
                            open_ms == *window_ms
                                && compiled.iter().all(|aggregate| {
                                    max_field_index(&aggregate.arg)
                                        .map(|index| index < input_width)
                                        .unwrap_or(true)
                                })
                        }
                        None => false,
                    };
                    match (mergeable, open_window) {
                        (true, Some((window_id, _, _))) => {
                            builder.extend_window(window_id, compiled);
                        }
                        _ => {
                            current = builder.push(
                                PhysicalOp::WindowAggregate {
                                    keys: node.keys.clone(),
                                    timestamp_field: node.timestamp_field.clone(),
                                    window_ms: *window_ms,
                                    bounds: WindowBounds::OpenLowerClosedUpper,
                                    aggregates: compiled,
                                },
                                vec![current],
                            );
                            open_window = Some((current, *window_ms, input_schema.len()));
                        }
                    }
                }

                TypedTransform::TemporalJoin {
                    right,
                    keys,
                    columns,
                } => {
                    open_window = None;
                    if let Some(predicate) = pending_filter.take() {
                        current = builder.push(PhysicalOp::Filter { predicate }, vec![current]);
                    }
                    current = builder.push(
                        PhysicalOp::TemporalJoin {
                            keys: keys.clone(),
                            left_timestamp_field: node.timestamp_field.clone(),
                            right_timestamp_field: graph.node(*right).timestamp_field.clone(),
                            tie_break: TieBreak::IngestionOrder,
                            columns: columns.clone(),
                        },
                        vec![current, lowered[right]],
                    );
                }
            }
        }

        if let Some(predicate) = pending_filter.take() {
            current = builder.push(PhysicalOp::Filter { predicate }, vec![current]);
        }

        current
    }
}

/// The highest column index an expression reads, if it reads any
fn max_field_index(expr: &TypedExpr) -> Option<usize> {
    match &expr.kind {
        TypedExprKind::Literal(_) => None,
        TypedExprKind::Field { index, .. } => Some(*index),
        TypedExprKind::Binary { left, right, .. } => {
            max_option(max_field_index(left), max_field_index(right))
        }
        TypedExprKind::Unary { operand, .. } => max_field_index(operand),
        TypedExprKind::If {
            condition,
            then_expr,
            else_expr,
        } => max_option(
            max_field_index(condition),
            max_option(max_field_index(then_expr), max_field_index(else_expr)),
        ),
    }
}

fn max_option(a: Option<usize>, b: Option<usize>) -> Option<usize> {
    match (a, b) {
        (Some(x), Some(y)) => Some(x.max(y)),
        (x, None) => x,
        (None, y) => y,
    }
}

/// Build the complete output column list of a projection step: derived
/// columns where declared, passthrough field references everywhere else
fn derived_columns(
    derived: &[(String, TypedExpr)],
    input_schema: &Schema,
    output_schema: &Schema,
) -> Vec<ProjectColumn> {
    output_schema
        .fields()
        .iter()
        .map(|field| {
            match derived.iter().find(|(name, _)| *name == field.name) {
                Some((name, expr)) => ProjectColumn::new(name.clone(), expr.clone()),
                None => {
                    let index = input_schema
                        .index_of(&field.name)
                        .expect("passthrough field exists in the input schema");
                    ProjectColumn::new(
                        field.name.clone(),
                        TypedExpr::new(
                            TypedExprKind::Field {
                                index,
                                name: field.name.clone(),
                            },
                            field.dtype,
                        ),
                    )
                }
            }
        })
        .collect()
}

/// Pure column selection, as passthrough field references
fn passthrough_columns(output_schema: &Schema, input_schema: &Schema) -> Vec<ProjectColumn> {
    output_schema
        .fields()
        .iter()
        .map(|field| {
            let index = input_schema
                .index_of(&field.name)
                .expect("selected field exists in the chain's final schema");
            ProjectColumn::new(
                field.name.clone(),
                TypedExpr::new(
                    TypedExprKind::Field {
                        index,
                        name: field.name.clone(),
                    },
                    field.dtype,
                ),
            )
        })
        .collect()
}

#[derive(Default)]
struct PlanBuilder {
    nodes: Vec<PlanNode>,
}

impl PlanBuilder {
    fn push(&mut self, op: PhysicalOp, inputs: Vec<usize>) -> usize {
        let id = self.nodes.len();
        self.nodes.push(PlanNode { id, op, inputs });
        id
    }

    fn extend_window(&mut self, id: usize, extra: Vec<AggregateExpr>) {
        if let PhysicalOp::WindowAggregate { aggregates, .. } = &mut self.nodes[id].op {
            aggregates.extend(extra);
        }
    }
}
