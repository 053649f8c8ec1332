//! Feature-view graph resolution
//!
//! Walks named references through the registry, substituting each reference
//! with its definition, recursively. Resolution is memoized per
//! (name, version) so shared ancestors are resolved once, and the current
//! reference path is tracked so any cycle fails before compilation.
//!
//! All schema derivation happens here: every expression is type-checked
//! against the actual schema at its position in the transform chain, and
//! the snapshots are recorded on the resolved node for the compiler.

use silo_core::types::{DType, Field, Schema};
use silo_core::view::{Definition, Transform, ViewInput};
use silo_registry::{Registry, RegistryError};
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;

use crate::error::ResolveError;
use crate::graph::{
    ResolvedGraph, ResolvedInput, ResolvedKind, ResolvedNode, TypedAggregate, TypedOnDemand,
    TypedTransform,
};

type Result<T> = std::result::Result<T, ResolveError>;

/// Resolves a named view into an immutable, fully typed graph snapshot.
///
/// A resolver is cheap and single-use: one `resolve` call builds one
/// snapshot. Compilations never share resolver state, so concurrent
/// resolutions only contend on the registry's read path.
pub struct Resolver<'a> {
    registry: &'a dyn Registry,
    /// Memo of already resolved (name, version) -> node index
    cache: HashMap<(String, u32), usize>,
    nodes: Vec<ResolvedNode>,
    /// Names currently being resolved, for cycle detection
    path: Vec<String>,
}

impl<'a> Resolver<'a> {
    pub fn new(registry: &'a dyn Registry) -> Self {
        Self {
            registry,
            cache: HashMap::new(),
            nodes: Vec::new(),
            path: Vec::new(),
        }
    }

    /// Resolve a view (or source) by name, pinning `version: None` to the
    /// latest registered version
    pub async fn resolve(
        mut self,
        name: &str,
        version: Option<u32>,
    ) -> Result<ResolvedGraph> {
        let root = self.resolve_ref(name.to_string(), version).await?;
        let graph = ResolvedGraph::new(self.nodes, root);
        graph.validate()?;
        Ok(graph)
    }

    /// Recursive resolution step; boxed because async recursion needs an
    /// indirection
    fn resolve_ref<'s>(
        &'s mut self,
        name: String,
        version: Option<u32>,
    ) -> Pin<Box<dyn Future<Output = Result<usize>> + Send + 's>> {
        Box::pin(async move {
            if self.path.contains(&name) {
                let mut path = self.path.clone();
                path.push(name);
                return Err(ResolveError::CyclicDependency { path });
            }

            let concrete = match version {
                Some(v) => v,
                None => match self.registry.latest_version(&name).await {
                    Ok(v) => v,
                    Err(RegistryError::NotFound { .. }) => {
                        return Err(ResolveError::UnknownReference {
                            name,
                            version: None,
                        })
                    }
                    Err(err) => return Err(ResolveError::Registry(err)),
                },
            };

            if let Some(&index) = self.cache.get(&(name.clone(), concrete)) {
                return Ok(index);
            }

            let definition = match self.registry.get(&name, Some(concrete)).await {
                Ok(definition) => definition,
                Err(RegistryError::NotFound { .. }) => {
                    return Err(ResolveError::UnknownReference {
                        name,
                        version: Some(concrete),
                    })
                }
                Err(err) => return Err(ResolveError::Registry(err)),
            };

            self.path.push(name.clone());
            let node = match definition {
                Definition::Source(source) => ResolvedNode {
                    name: name.clone(),
                    version: 1,
                    output_schema: source.schema.clone(),
                    keys: source.keys.clone(),
                    timestamp_field: source.timestamp_field.clone(),
                    dependencies: Vec::new(),
                    kind: ResolvedKind::Source(source),
                },
                Definition::View(view) => self.resolve_view(&name, concrete, view).await?,
            };
            self.path.pop();

            let index = self.nodes.len();
            self.nodes.push(node);
            self.cache.insert((name, concrete), index);
            Ok(index)
        })
    }

    async fn resolve_view(
        &mut self,
        name: &str,
        version: u32,
        view: silo_core::view::FeatureView,
    ) -> Result<ResolvedNode> {
        let mut dependencies = Vec::new();

        // Resolve the input and establish the initial schema, keys and
        // timestamp field
        let (input, mut schema, keys, timestamp_field) = match &view.input {
            ViewInput::Source(source_name) => {
                let index = self.resolve_ref(source_name.clone(), None).await?;
                let node = &self.nodes[index];
                if !matches!(node.kind, ResolvedKind::Source(_)) {
                    return Err(ResolveError::SchemaConflict(format!(
                        "view '{}': input '{}' is not a data source",
                        name, source_name
                    )));
                }
                dependencies.push(index);
                (
                    ResolvedInput::Node(index),
                    node.output_schema.clone(),
                    node.keys.clone(),
                    node.timestamp_field.clone(),
                )
            }
            ViewInput::View(view_ref) => {
                let index = self
                    .resolve_ref(view_ref.name.clone(), view_ref.version)
                    .await?;
                let node = &self.nodes[index];
                dependencies.push(index);
                (
                    ResolvedInput::Node(index),
                    node.output_schema.clone(),
                    node.keys.clone(),
                    node.timestamp_field.clone(),
                )
            }
            ViewInput::Join { left, right, keys } => {
                let left_index = self.resolve_ref(left.name.clone(), left.version).await?;
                let right_index = self.resolve_ref(right.name.clone(), right.version).await?;
                dependencies.push(left_index);
                dependencies.push(right_index);

                let left_schema = self.nodes[left_index].output_schema.clone();
                let left_timestamp = self.nodes[left_index].timestamp_field.clone();
                let joined = self.check_join(name, &left_schema, right_index, keys, None)?;

                (
                    ResolvedInput::Join {
                        left: left_index,
                        right: right_index,
                        keys: keys.clone(),
                        columns: joined.columns,
                    },
                    joined.schema,
                    keys.clone(),
                    left_timestamp,
                )
            }
        };

        // Walk the transform chain, recording a schema snapshot per step
        let mut schemas = vec![schema.clone()];
        let mut transforms = Vec::with_capacity(view.transforms.len());

        for transform in &view.transforms {
            let typed = match transform {
                Transform::Project { columns } => {
                    let mut typed_columns = Vec::with_capacity(columns.len());
                    for column in columns {
                        let typed_expr = silo_parser::check(&column.expr, &schema)?;
                        typed_columns.push((column.name.clone(), typed_expr));
                    }
                    for (column_name, typed_expr) in &typed_columns {
                        schema = schema.with_field(Field::new(column_name, typed_expr.dtype));
                    }
                    TypedTransform::Project {
                        columns: typed_columns,
                    }
                }

                Transform::Filter { predicate } => {
                    let typed_predicate = silo_parser::check(predicate, &schema)?;
                    if typed_predicate.dtype != DType::Bool {
                        return Err(ResolveError::SchemaConflict(format!(
                            "view '{}': filter predicate has type {}, expected bool",
                            name, typed_predicate.dtype
                        )));
                    }
                    TypedTransform::Filter {
                        predicate: typed_predicate,
                    }
                }

                Transform::WindowAggregate {
                    window_ms,
                    aggregates,
                } => {
                    if *window_ms <= 0 {
                        return Err(ResolveError::SchemaConflict(format!(
                            "view '{}': window length must be positive, got {}",
                            name, window_ms
                        )));
                    }
                    if keys.is_empty() {
                        return Err(ResolveError::SchemaConflict(format!(
                            "view '{}': window aggregation requires entity keys",
                            name
                        )));
                    }
                    if !schema.contains(&timestamp_field) {
                        return Err(ResolveError::SchemaConflict(format!(
                            "view '{}': timestamp field '{}' is not in scope for window aggregation",
                            name, timestamp_field
                        )));
                    }

                    let mut typed_aggregates = Vec::with_capacity(aggregates.len());
                    for aggregate in aggregates {
                        let (arg, dtype) =
                            silo_parser::check_aggregate(aggregate.func, &aggregate.arg, &schema)?;
                        typed_aggregates.push(TypedAggregate {
                            name: aggregate.name.clone(),
                            func: aggregate.func,
                            arg,
                            dtype,
                        });
                    }
                    for aggregate in &typed_aggregates {
                        schema = schema.with_field(Field::new(&aggregate.name, aggregate.dtype));
                    }
                    TypedTransform::WindowAggregate {
                        window_ms: *window_ms,
                        aggregates: typed_aggregates,
                    }
                }

                Transform::TemporalJoin {
                    right,
                    keys: join_keys,
                    columns,
                } => {
                    let right_index =
                        self.resolve_ref(right.name.clone(), right.version).await?;
                    if !dependencies.contains(&right_index) {
                        dependencies.push(right_index);
                    }
                    let joined = self.check_join(
                        name,
                        &schema,
                        right_index,
                        join_keys,
                        Some(columns),
                    )?;
                    schema = joined.schema;
                    TypedTransform::TemporalJoin {
                        right: right_index,
                        keys: join_keys.clone(),
                        columns: joined.columns,
                    }
                }
            };

            transforms.push(typed);
            schemas.push(schema.clone());
        }

        // Restrict the output to the declared features, when any are
        // declared: keys and the timestamp field always survive
        let output_schema = if view.features.is_empty() {
            schema.clone()
        } else {
            let mut names: Vec<String> = keys.clone();
            if !names.contains(&timestamp_field) {
                names.push(timestamp_field.clone());
            }
            for feature in &view.features {
                match schema.dtype_of(&feature.name) {
                    None => {
                        return Err(ResolveError::SchemaConflict(format!(
                            "view '{}': declared feature '{}' is not produced by the transform chain",
                            name, feature.name
                        )))
                    }
                    Some(actual) if actual != feature.dtype => {
                        return Err(ResolveError::SchemaConflict(format!(
                            "view '{}': feature '{}' declared as {} but derived as {}",
                            name, feature.name, feature.dtype, actual
                        )))
                    }
                    Some(_) => {}
                }
                for key in &feature.keys {
                    if !keys.contains(key) {
                        return Err(ResolveError::SchemaConflict(format!(
                            "view '{}': feature '{}' declares key '{}' the view is not computed per",
                            name, feature.name, key
                        )));
                    }
                }
                if !names.contains(&feature.name) {
                    names.push(feature.name.clone());
                }
            }
            schema
                .select(&names)
                .map_err(|err| ResolveError::SchemaConflict(err.to_string()))?
        };

        // On-demand columns see the request fields plus the stored output
        let on_demand = if view.on_demand.is_empty() {
            Vec::new()
        } else {
            let serving_schema = match &view.request_schema {
                Some(request_schema) => request_schema.merge(&output_schema).map_err(|err| {
                    ResolveError::SchemaConflict(format!(
                        "view '{}': request schema collides with output: {}",
                        name, err
                    ))
                })?,
                None => output_schema.clone(),
            };
            let mut typed: Vec<TypedOnDemand> = Vec::with_capacity(view.on_demand.len());
            for column in &view.on_demand {
                if serving_schema.contains(&column.name)
                    || typed.iter().any(|c| c.name == column.name)
                {
                    return Err(ResolveError::SchemaConflict(format!(
                        "view '{}': on-demand column '{}' collides with an existing field",
                        name, column.name
                    )));
                }
                let expr = silo_parser::check(&column.expr, &serving_schema)?;
                typed.push(TypedOnDemand {
                    name: column.name.clone(),
                    dtype: expr.dtype,
                    expr,
                });
            }
            typed
        };

        Ok(ResolvedNode {
            name: name.to_string(),
            version,
            output_schema,
            keys,
            timestamp_field,
            dependencies,
            kind: ResolvedKind::View {
                input,
                transforms,
                schemas,
                on_demand,
                request_schema: view.request_schema.clone(),
            },
        })
    }

    /// Validate a temporal join and compute the enriched schema.
    ///
    /// `columns: None` takes every right column that is neither a join key
    /// nor the right timestamp field.
    fn check_join(
        &self,
        view_name: &str,
        left_schema: &Schema,
        right_index: usize,
        keys: &[String],
        columns: Option<&Vec<String>>,
    ) -> Result<JoinedSchema> {
        let right_node = &self.nodes[right_index];
        let right_schema = &right_node.output_schema;

        if keys.is_empty() {
            return Err(ResolveError::SchemaConflict(format!(
                "view '{}': temporal join requires join keys",
                view_name
            )));
        }
        for key in keys {
            let left_dtype = left_schema.dtype_of(key).ok_or_else(|| {
                ResolveError::SchemaConflict(format!(
                    "view '{}': join key '{}' is not in the left schema",
                    view_name, key
                ))
            })?;
            let right_dtype = right_schema.dtype_of(key).ok_or_else(|| {
                ResolveError::SchemaConflict(format!(
                    "view '{}': join key '{}' is not in '{}'",
                    view_name, key, right_node.name
                ))
            })?;
            if left_dtype != right_dtype {
                return Err(ResolveError::SchemaConflict(format!(
                    "view '{}': join key '{}' is {} on the left but {} in '{}'",
                    view_name, key, left_dtype, right_dtype, right_node.name
                )));
            }
        }

        let column_names: Vec<String> = match columns {
            Some(names) => names.clone(),
            None => right_schema
                .fields()
                .iter()
                .map(|f| f.name.clone())
                .filter(|n| !keys.contains(n) && *n != right_node.timestamp_field)
                .collect(),
        };

        let mut schema = left_schema.clone();
        for column in &column_names {
            let dtype = right_schema.dtype_of(column).ok_or_else(|| {
                ResolveError::SchemaConflict(format!(
                    "view '{}': joined column '{}' is not produced by '{}'",
                    view_name, column, right_node.name
                ))
            })?;
            if schema.contains(column) {
                return Err(ResolveError::SchemaConflict(format!(
                    "view '{}': joined column '{}' collides with an existing field",
                    view_name, column
                )));
            }
            schema = schema.with_field(Field::new(column, dtype));
        }

        Ok(JoinedSchema {
            schema,
            columns: column_names,
        })
    }
}

struct JoinedSchema {
    schema: Schema,
    columns: Vec<String>,
}
