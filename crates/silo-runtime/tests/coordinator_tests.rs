//! Coordinator tests: materialization state machine, idempotent store
//! writes, retry/timeout behavior and online serving with on-demand
//! features

use async_trait::async_trait;
use silo_core::ast::AggFunc;
use silo_core::plan::{Capabilities, ExecutionPlan};
use silo_core::types::{DType, Field, Row, Schema, Table, TimeRange, Value};
use silo_core::view::{
    AggregateColumn, DataSource, Definition, Feature, FeatureView, OnDemandColumn, Transform,
    ViewInput,
};
use silo_registry::{MemoryRegistry, Registry};
use silo_runtime::{
    Coordinator, JobHandle, JobStatus, LocalProcessor, MaterializationRequest,
    MaterializationState, MaterializationTarget, MemoryOfflineStore, MemoryOnlineStore,
    MemorySourceProvider, OfflineStore, OnlineStore, Processor, Result, RetryPolicy,
    RuntimeError,
};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

fn orders_schema() -> Schema {
    Schema::new(vec![
        Field::new("user_id", DType::Int64),
        Field::new("amount", DType::Int64),
        Field::new("ts", DType::Timestamp),
    ])
    .unwrap()
}

async fn seeded_registry() -> Arc<MemoryRegistry> {
    let registry = Arc::new(MemoryRegistry::new());
    registry
        .register(Definition::Source(
            DataSource::new("orders", orders_schema(), vec!["user_id".to_string()], "ts")
                .unwrap(),
        ))
        .await
        .unwrap();
    registry
        .register(Definition::View(
            FeatureView::new("rolling", 1, ViewInput::Source("orders".to_string()))
                .with_transform(Transform::WindowAggregate {
                    window_ms: 15,
                    aggregates: vec![AggregateColumn::new(
                        "sum_amount",
                        AggFunc::Sum,
                        silo_parser::parse_raw("amount").unwrap(),
                    )],
                })
                .with_feature(Feature::new(
                    "sum_amount",
                    DType::Int64,
                    vec!["user_id".to_string()],
                ))
                .with_request_schema(Schema::new(vec![Field::new("fee", DType::Int64)]).unwrap())
                .with_on_demand(OnDemandColumn::new(
                    "amount_with_fee",
                    silo_parser::parse_raw("sum_amount + fee").unwrap(),
                )),
        ))
        .await
        .unwrap();
    registry
}

fn seeded_provider() -> Arc<MemorySourceProvider> {
    let provider = Arc::new(MemorySourceProvider::new());
    provider.insert(
        "orders",
        Table::with_rows(
            orders_schema(),
            vec![
                Row::new(vec![Value::Int64(1), Value::Int64(5), Value::Timestamp(10)]),
                Row::new(vec![Value::Int64(1), Value::Int64(7), Value::Timestamp(20)]),
                Row::new(vec![Value::Int64(2), Value::Int64(3), Value::Timestamp(12)]),
            ],
        ),
    );
    provider
}

struct Fixture {
    coordinator: Coordinator,
    offline: Arc<MemoryOfflineStore>,
    online: Arc<MemoryOnlineStore>,
}

async fn fixture_with(processor: Arc<dyn Processor>) -> Fixture {
    let offline = Arc::new(MemoryOfflineStore::new());
    let online = Arc::new(MemoryOnlineStore::new());
    let coordinator = Coordinator::new(
        seeded_registry().await,
        processor,
        offline.clone(),
        online.clone(),
    )
    .with_poll_interval(Duration::from_millis(1));
    Fixture {
        coordinator,
        offline,
        online,
    }
}

async fn fixture() -> Fixture {
    fixture_with(Arc::new(LocalProcessor::new(seeded_provider()))).await
}

fn offline_request() -> MaterializationRequest {
    MaterializationRequest {
        view: "rolling".to_string(),
        version: None,
        range: Some(TimeRange::new(0, 100)),
        keys: None,
        target: MaterializationTarget::Offline,
    }
}

#[tokio::test]
async fn offline_materialization_is_idempotent() {
    let fixture = fixture().await;

    let report = fixture.coordinator.materialize(offline_request()).await.unwrap();
    assert_eq!(report.state, MaterializationState::Succeeded);
    assert_eq!(report.version, 1);
    assert_eq!(report.rows_written, 3);
    let first = fixture.offline.read("rolling").await.unwrap();

    // re-running writes the same rows over themselves
    fixture.coordinator.materialize(offline_request()).await.unwrap();
    let second = fixture.offline.read("rolling").await.unwrap();

    assert_eq!(first, second);
    assert_eq!(second.len(), 3);
}

#[tokio::test]
async fn online_materialization_keeps_only_the_latest_row_per_key() {
    let fixture = fixture().await;
    let request = MaterializationRequest {
        target: MaterializationTarget::Online,
        ..offline_request()
    };

    let report = fixture.coordinator.materialize(request.clone()).await.unwrap();
    // one latest row per entity key
    assert_eq!(report.rows_written, 2);

    let rows = fixture
        .online
        .lookup("rolling", &[silo_runtime::KeyTuple(vec![Value::Int64(1)])])
        .await
        .unwrap();
    let user1 = rows[0].clone().expect("user 1 is materialized");
    // latest row is ts=20; its 15ms window saw both of user 1's orders
    assert_eq!(user1, vec![Value::Int64(1), Value::Timestamp(20), Value::Int64(12)]);

    // re-running leaves the store in the same final state
    fixture.coordinator.materialize(request).await.unwrap();
    let again = fixture
        .online
        .lookup("rolling", &[silo_runtime::KeyTuple(vec![Value::Int64(1)])])
        .await
        .unwrap();
    assert_eq!(again[0].clone().unwrap(), user1);
}

#[tokio::test]
async fn ad_hoc_materialization_returns_the_table() {
    let fixture = fixture().await;
    let request = MaterializationRequest {
        target: MaterializationTarget::AdHoc,
        ..offline_request()
    };
    let report = fixture.coordinator.materialize(request).await.unwrap();
    let table = report.output.expect("ad hoc output");
    assert_eq!(table.len(), 3);
    assert_eq!(table.schema.names(), vec!["user_id", "ts", "sum_amount"]);
}

#[tokio::test]
async fn serving_combines_stored_features_with_on_demand_columns() {
    let fixture = fixture().await;
    fixture
        .coordinator
        .materialize(MaterializationRequest {
            target: MaterializationTarget::Online,
            ..offline_request()
        })
        .await
        .unwrap();

    let request_rows = Table::with_rows(
        Schema::new(vec![Field::new("fee", DType::Int64)]).unwrap(),
        vec![
            Row::new(vec![Value::Int64(3)]),
            Row::new(vec![Value::Int64(100)]),
        ],
    );
    let served = fixture
        .coordinator
        .fetch_online_features(
            "rolling",
            None,
            &[vec![Value::Int64(1)], vec![Value::Int64(99)]],
            Some(&request_rows),
        )
        .await
        .unwrap();

    assert_eq!(
        served.schema.names(),
        vec!["user_id", "ts", "sum_amount", "amount_with_fee"]
    );
    // stored sum 12 plus the request's own fee 3
    assert_eq!(served.value(0, "amount_with_fee"), Some(&Value::Int64(15)));
    // unmaterialized key: stored features null, on-demand propagates null
    assert_eq!(served.value(1, "user_id"), Some(&Value::Int64(99)));
    assert_eq!(served.value(1, "sum_amount"), Some(&Value::Null));
    assert_eq!(served.value(1, "amount_with_fee"), Some(&Value::Null));
}

#[tokio::test]
async fn serving_validates_request_rows() {
    let fixture = fixture().await;
    // view declares a request schema but none supplied
    let result = fixture
        .coordinator
        .fetch_online_features("rolling", None, &[vec![Value::Int64(1)]], None)
        .await;
    assert!(matches!(result, Err(RuntimeError::InvalidRequest(_))));
}

/// Fails the first N submits with a transient error, then delegates
struct FlakyProcessor {
    inner: LocalProcessor,
    failures_left: Mutex<u32>,
}

#[async_trait]
impl Processor for FlakyProcessor {
    fn capabilities(&self) -> &Capabilities {
        self.inner.capabilities()
    }

    async fn submit(&self, plan: ExecutionPlan) -> Result<JobHandle> {
        {
            let mut left = self.failures_left.lock().unwrap();
            if *left > 0 {
                *left -= 1;
                return Err(RuntimeError::Transient("connection reset".to_string()));
            }
        }
        self.inner.submit(plan).await
    }

    async fn status(&self, handle: &JobHandle) -> Result<JobStatus> {
        self.inner.status(handle).await
    }

    async fn cancel(&self, handle: &JobHandle) -> Result<()> {
        self.inner.cancel(handle).await
    }

    async fn take_output(&self, handle: &JobHandle) -> Result<silo_runtime::ExecutionOutput> {
        self.inner.take_output(handle).await
    }
}

#[tokio::test]
async fn transient_failures_are_retried_with_backoff() {
    let processor = Arc::new(FlakyProcessor {
        inner: LocalProcessor::new(seeded_provider()),
        failures_left: Mutex::new(2),
    });
    let fixture = fixture_with(processor).await;
    let coordinator = fixture.coordinator.with_retry_policy(RetryPolicy {
        max_attempts: 3,
        base_delay: Duration::from_millis(1),
    });

    let report = coordinator.materialize(offline_request()).await.unwrap();
    assert_eq!(report.attempts, 3);
    assert_eq!(report.state, MaterializationState::Succeeded);
}

#[tokio::test]
async fn transient_failures_exhaust_the_retry_budget() {
    let processor = Arc::new(FlakyProcessor {
        inner: LocalProcessor::new(seeded_provider()),
        failures_left: Mutex::new(10),
    });
    let fixture = fixture_with(processor).await;
    let coordinator = fixture.coordinator.with_retry_policy(RetryPolicy {
        max_attempts: 2,
        base_delay: Duration::from_millis(1),
    });

    assert!(matches!(
        coordinator.materialize(offline_request()).await,
        Err(RuntimeError::Transient(_))
    ));
}

/// Counts submits and reports a terminal backend failure
struct FailingProcessor {
    capabilities: Capabilities,
    submits: AtomicU32,
}

#[async_trait]
impl Processor for FailingProcessor {
    fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    async fn submit(&self, _plan: ExecutionPlan) -> Result<JobHandle> {
        self.submits.fetch_add(1, Ordering::SeqCst);
        Err(RuntimeError::Execution("backend out of disk".to_string()))
    }

    async fn status(&self, _handle: &JobHandle) -> Result<JobStatus> {
        unreachable!("submit always fails")
    }

    async fn cancel(&self, _handle: &JobHandle) -> Result<()> {
        Ok(())
    }

    async fn take_output(&self, _handle: &JobHandle) -> Result<silo_runtime::ExecutionOutput> {
        unreachable!("submit always fails")
    }
}

#[tokio::test]
async fn terminal_failures_are_not_retried_and_carry_the_diagnostic() {
    let processor = Arc::new(FailingProcessor {
        capabilities: Capabilities::all(),
        submits: AtomicU32::new(0),
    });
    let fixture = fixture_with(processor.clone()).await;

    match fixture.coordinator.materialize(offline_request()).await {
        Err(RuntimeError::Execution(reason)) => assert!(reason.contains("out of disk")),
        other => panic!("expected terminal Execution error, got ok={}", other.is_ok()),
    }
    assert_eq!(processor.submits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn compilation_failure_aborts_before_any_submission() {
    let processor = Arc::new(FailingProcessor {
        capabilities: Capabilities::all(),
        submits: AtomicU32::new(0),
    });
    let fixture = fixture_with(processor.clone()).await;

    let request = MaterializationRequest {
        range: Some(TimeRange::new(50, 50)), // empty range
        ..offline_request()
    };
    assert!(matches!(
        fixture.coordinator.materialize(request).await,
        Err(RuntimeError::Compile(_))
    ));
    assert_eq!(processor.submits.load(Ordering::SeqCst), 0);

    // nothing was written either
    assert!(fixture.offline.read("rolling").await.is_err());
}

/// Completes submit but never finishes; records advisory cancellation
struct StuckProcessor {
    inner: LocalProcessor,
    cancelled: AtomicBool,
}

#[async_trait]
impl Processor for StuckProcessor {
    fn capabilities(&self) -> &Capabilities {
        self.inner.capabilities()
    }

    async fn submit(&self, plan: ExecutionPlan) -> Result<JobHandle> {
        self.inner.submit(plan).await
    }

    async fn status(&self, _handle: &JobHandle) -> Result<JobStatus> {
        Ok(JobStatus::Running)
    }

    async fn cancel(&self, _handle: &JobHandle) -> Result<()> {
        self.cancelled.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn take_output(&self, handle: &JobHandle) -> Result<silo_runtime::ExecutionOutput> {
        self.inner.take_output(handle).await
    }
}

#[tokio::test]
async fn execution_timeout_fails_the_request_and_cancels_advisorily() {
    let processor = Arc::new(StuckProcessor {
        inner: LocalProcessor::new(seeded_provider()),
        cancelled: AtomicBool::new(false),
    });
    let fixture = fixture_with(processor.clone()).await;
    let coordinator = fixture
        .coordinator
        .with_execution_timeout(Duration::from_millis(30))
        .with_poll_interval(Duration::from_millis(5));

    assert!(matches!(
        coordinator.materialize(offline_request()).await,
        Err(RuntimeError::Timeout { .. })
    ));
    assert!(processor.cancelled.load(Ordering::SeqCst));
}
