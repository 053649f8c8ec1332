//! Materialization & online serving coordinator
//!
//! Orchestrates a materialization request through its state machine:
//! `Pending -> Compiling -> Executing -> {Succeeded, Failed}`. Compilation
//! failures abort before any execution; transient execution failures retry
//! with bounded exponential backoff; the caller's execution deadline is
//! terminal and triggers an advisory cancel. Store writes are idempotent
//! per (key, timestamp), so partial writes surviving a cancel or retry are
//! harmless.

use silo_compiler::graph::{ResolvedGraph, ResolvedKind};
use silo_compiler::{PlanCompiler, Resolver};
use silo_core::plan::{ExecutionPlan, KeyFilter};
use silo_core::types::{Field, Row, Schema, Table, TimeRange, Value};
use silo_registry::Registry;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::engine::ExecutionOutput;
use crate::error::{Result, RuntimeError};
use crate::key::KeyTuple;
use crate::processor::{JobStatus, Processor};
use crate::store::{OfflineStore, OnlineStore};

/// Online store writes are split across this many key-shards per request
const ONLINE_WRITE_SHARDS: usize = 4;

/// Where a materialization's output goes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaterializationTarget {
    /// Append every output row to the offline store
    Offline,
    /// Upsert only the latest row per entity key into the online store
    Online,
    /// Return the output table to the caller
    AdHoc,
}

/// A materialization request
#[derive(Debug, Clone)]
pub struct MaterializationRequest {
    pub view: String,
    /// `None` pins to the latest registered version at resolution time
    pub version: Option<u32>,
    pub range: Option<TimeRange>,
    pub keys: Option<KeyFilter>,
    pub target: MaterializationTarget,
}

/// Lifecycle states of a materialization request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaterializationState {
    Pending,
    Compiling,
    Executing,
    Succeeded,
    Failed,
}

/// Outcome of a successful materialization
#[derive(Debug, Clone)]
pub struct MaterializationReport {
    pub view: String,
    /// Concrete version the request resolved to
    pub version: u32,
    pub state: MaterializationState,
    /// Wall-clock time the request was accepted
    pub started_at: chrono::DateTime<chrono::Utc>,
    pub rows_written: u64,
    /// Rows excluded at scan time as later than the watermark tolerance
    pub dropped_late: u64,
    /// Execution attempts, retries included
    pub attempts: u32,
    /// The output table, for ad hoc requests
    pub output: Option<Table>,
}

/// Bounded exponential backoff for transient execution failures
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(100),
        }
    }
}

impl RetryPolicy {
    fn delay(&self, attempt: u32) -> Duration {
        self.base_delay * 2u32.saturating_pow(attempt.saturating_sub(1))
    }
}

/// The materialization & serving coordinator
pub struct Coordinator {
    registry: Arc<dyn Registry>,
    processor: Arc<dyn Processor>,
    offline: Arc<dyn OfflineStore>,
    online: Arc<dyn OnlineStore>,
    compiler: PlanCompiler,
    retry: RetryPolicy,
    execution_timeout: Option<Duration>,
    poll_interval: Duration,
}

impl Coordinator {
    pub fn new(
        registry: Arc<dyn Registry>,
        processor: Arc<dyn Processor>,
        offline: Arc<dyn OfflineStore>,
        online: Arc<dyn OnlineStore>,
    ) -> Self {
        Self {
            registry,
            processor,
            offline,
            online,
            compiler: PlanCompiler::new(),
            retry: RetryPolicy::default(),
            execution_timeout: None,
            poll_interval: Duration::from_millis(10),
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_execution_timeout(mut self, timeout: Duration) -> Self {
        self.execution_timeout = Some(timeout);
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Run a materialization request to completion
    pub async fn materialize(
        &self,
        request: MaterializationRequest,
    ) -> Result<MaterializationReport> {
        let started_at = chrono::Utc::now();
        info!(view = %request.view, state = ?MaterializationState::Pending, "materialization accepted");

        info!(view = %request.view, state = ?MaterializationState::Compiling, "resolving and compiling");
        let graph = Resolver::new(self.registry.as_ref())
            .resolve(&request.view, request.version)
            .await
            .map_err(|err| {
                warn!(view = %request.view, state = ?MaterializationState::Failed, error = %err, "resolution failed");
                err
            })?;
        let plan = self
            .compiler
            .compile(
                &graph,
                request.range,
                request.keys.as_ref(),
                self.processor.capabilities(),
            )
            .map_err(|err| {
                warn!(view = %request.view, state = ?MaterializationState::Failed, error = %err, "compilation failed");
                err
            })?;

        info!(view = %request.view, state = ?MaterializationState::Executing, operators = plan.nodes.len(), "submitting plan");
        let (output, attempts) = self.execute_with_retry(&request.view, plan).await.map_err(
            |err| {
                warn!(view = %request.view, state = ?MaterializationState::Failed, error = %err, "execution failed");
                err
            },
        )?;

        let root = graph.root_node();
        let dropped_late = output.dropped_late;
        let (rows_written, table) = match request.target {
            MaterializationTarget::Offline => {
                let written = self
                    .offline
                    .append(
                        &request.view,
                        &output.table.schema,
                        &root.keys,
                        &root.timestamp_field,
                        &output.table.rows,
                    )
                    .await?;
                (written, None)
            }
            MaterializationTarget::Online => {
                let entries =
                    latest_per_key(&output.table, &root.keys, &root.timestamp_field)?;
                // Batched per key-shard; shards race under last-write-wins,
                // which is fine for a cache of the latest offline truth
                let mut shards: Vec<Vec<(KeyTuple, Vec<Value>)>> =
                    (0..ONLINE_WRITE_SHARDS).map(|_| Vec::new()).collect();
                for (index, entry) in entries.into_iter().enumerate() {
                    shards[index % ONLINE_WRITE_SHARDS].push(entry);
                }
                let writes = shards.into_iter().filter(|s| !s.is_empty()).map(|shard| {
                    self.online
                        .upsert_batch(&request.view, &output.table.schema, shard)
                });
                let written: u64 = futures::future::try_join_all(writes)
                    .await?
                    .into_iter()
                    .sum();
                (written, None)
            }
            MaterializationTarget::AdHoc => (output.table.len() as u64, Some(output.table)),
        };

        info!(
            view = %request.view,
            state = ?MaterializationState::Succeeded,
            rows_written,
            dropped_late,
            attempts,
            "materialization finished"
        );
        Ok(MaterializationReport {
            view: request.view,
            version: root.version,
            state: MaterializationState::Succeeded,
            started_at,
            rows_written,
            dropped_late,
            attempts,
            output: table,
        })
    }

    /// Serve features for a set of entity keys: point lookups of the
    /// precomputed features combined with synchronous evaluation of the
    /// view's on-demand columns over the request's own fields.
    pub async fn fetch_online_features(
        &self,
        view: &str,
        version: Option<u32>,
        keys: &[Vec<Value>],
        request_rows: Option<&Table>,
    ) -> Result<Table> {
        let graph = Resolver::new(self.registry.as_ref())
            .resolve(view, version)
            .await?;
        let root = graph.root_node();

        let key_tuples: Vec<KeyTuple> = keys
            .iter()
            .map(|key| {
                if key.len() != root.keys.len() {
                    return Err(RuntimeError::InvalidRequest(format!(
                        "key tuple has {} values, view '{}' is keyed by {} fields",
                        key.len(),
                        view,
                        root.keys.len()
                    )));
                }
                Ok(KeyTuple(key.clone()))
            })
            .collect::<Result<_>>()?;

        let stored = self.online.lookup(view, &key_tuples).await?;

        let (on_demand, request_schema) = on_demand_of(&graph);
        let request_values = validate_request_rows(request_schema, request_rows, keys.len())?;

        let mut schema = root.output_schema.clone();
        for column in on_demand {
            schema = schema.with_field(Field::new(&column.name, column.dtype));
        }

        let key_indexes: Vec<usize> = root
            .keys
            .iter()
            .map(|k| {
                root.output_schema.index_of(k).ok_or_else(|| {
                    RuntimeError::InvalidRequest(format!(
                        "view '{}' does not output its key field '{}'",
                        view, k
                    ))
                })
            })
            .collect::<Result<_>>()?;

        let mut rows = Vec::with_capacity(keys.len());
        for (i, key) in key_tuples.iter().enumerate() {
            // Stored features, or an all-null row for a cache miss
            let mut values = match &stored[i] {
                Some(values) => values.clone(),
                None => {
                    let mut values = vec![Value::Null; root.output_schema.len()];
                    for (pos, &index) in key_indexes.iter().enumerate() {
                        values[index] = key.values()[pos].clone();
                    }
                    values
                }
            };

            // On-demand columns see request fields first, stored values after
            if !on_demand.is_empty() {
                let mut serving_values = match &request_values {
                    Some(per_row) => per_row[i].clone(),
                    None => Vec::new(),
                };
                serving_values.extend(values.iter().cloned());
                let serving_row = Row::new(serving_values);
                for column in on_demand {
                    values.push(column.expr.eval(&serving_row)?);
                }
            }

            rows.push(Row::with_seq(values, i as u64));
        }

        debug!(view, served = rows.len(), "online feature fetch");
        Ok(Table::with_rows(schema, rows))
    }

    async fn execute_with_retry(
        &self,
        view: &str,
        plan: ExecutionPlan,
    ) -> Result<(ExecutionOutput, u32)> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.execute_once(plan.clone()).await {
                Ok(output) => return Ok((output, attempt)),
                Err(err) if err.is_transient() && attempt < self.retry.max_attempts => {
                    let delay = self.retry.delay(attempt);
                    warn!(view, attempt, error = %err, delay_ms = delay.as_millis() as u64, "transient execution failure, retrying");
                    tokio::time::sleep(delay).await;
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn execute_once(&self, plan: ExecutionPlan) -> Result<ExecutionOutput> {
        let started = Instant::now();
        let handle = self.processor.submit(plan).await?;

        loop {
            if let Some(timeout) = self.execution_timeout {
                if started.elapsed() >= timeout {
                    // Advisory: the processor may still complete partial
                    // writes, which idempotent stores tolerate
                    let _ = self.processor.cancel(&handle).await;
                    return Err(RuntimeError::Timeout {
                        elapsed_ms: started.elapsed().as_millis() as u64,
                    });
                }
            }

            match self.processor.status(&handle).await? {
                JobStatus::Succeeded => return self.processor.take_output(&handle).await,
                JobStatus::Failed { reason } => return Err(RuntimeError::Execution(reason)),
                JobStatus::Running => tokio::time::sleep(self.poll_interval).await,
            }
        }
    }
}

/// Reduce a materialized table to the latest row per entity key,
/// latest = max (event timestamp, ingestion sequence)
fn latest_per_key(
    table: &Table,
    key_fields: &[String],
    timestamp_field: &str,
) -> Result<Vec<(KeyTuple, Vec<Value>)>> {
    let key_indexes: Vec<usize> = key_fields
        .iter()
        .map(|f| {
            table
                .schema
                .index_of(f)
                .ok_or_else(|| RuntimeError::Store(format!("missing key field '{}'", f)))
        })
        .collect::<Result<_>>()?;
    let ts_index = table.schema.index_of(timestamp_field).ok_or_else(|| {
        RuntimeError::Store(format!("missing timestamp field '{}'", timestamp_field))
    })?;

    let mut latest: BTreeMap<KeyTuple, (i64, u64, Vec<Value>)> = BTreeMap::new();
    for row in &table.rows {
        let key = KeyTuple::from_row(&row.values, &key_indexes);
        let ts = row.values[ts_index].as_i64().ok_or_else(|| {
            RuntimeError::Store("materialized row has a non-timestamp event time".to_string())
        })?;
        match latest.get(&key) {
            Some((stored_ts, stored_seq, _)) if (*stored_ts, *stored_seq) >= (ts, row.seq) => {}
            _ => {
                latest.insert(key, (ts, row.seq, row.values.clone()));
            }
        }
    }

    Ok(latest
        .into_iter()
        .map(|(key, (_, _, values))| (key, values))
        .collect())
}

fn on_demand_of(
    graph: &ResolvedGraph,
) -> (
    &[silo_compiler::graph::TypedOnDemand],
    Option<&Schema>,
) {
    match &graph.root_node().kind {
        ResolvedKind::View {
            on_demand,
            request_schema,
            ..
        } => (on_demand.as_slice(), request_schema.as_ref()),
        ResolvedKind::Source(_) => (&[], None),
    }
}

/// Check the request rows against the view's declared request schema and
/// return them as positional values per requested key
fn validate_request_rows(
    request_schema: Option<&Schema>,
    request_rows: Option<&Table>,
    key_count: usize,
) -> Result<Option<Vec<Vec<Value>>>> {
    match (request_schema, request_rows) {
        (None, _) => Ok(None),
        (Some(schema), Some(table)) => {
            if table.schema != *schema {
                return Err(RuntimeError::InvalidRequest(
                    "request rows do not match the view's request schema".to_string(),
                ));
            }
            if table.len() != key_count {
                return Err(RuntimeError::InvalidRequest(format!(
                    "{} request rows for {} keys",
                    table.len(),
                    key_count
                )));
            }
            Ok(Some(table.rows.iter().map(|r| r.values.clone()).collect()))
        }
        (Some(_), None) => Err(RuntimeError::InvalidRequest(
            "view declares a request schema but no request rows were supplied".to_string(),
        )),
    }
}
