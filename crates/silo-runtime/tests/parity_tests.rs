//! Training-serving parity: the same logical view over the same time range
//! must produce row-for-row identical output on the local processor and on
//! the distributed-backend adapter, fusion differences included

use silo_compiler::{PlanCompiler, Resolver};
use silo_core::ast::AggFunc;
use silo_core::plan::OperatorKind;
use silo_core::types::{DType, Field, Row, Schema, Table, TimeRange, Value};
use silo_core::view::{
    AggregateColumn, DataSource, Definition, DerivedColumn, FeatureView, Transform, ViewInput,
};
use silo_registry::{MemoryRegistry, Registry};
use silo_runtime::{
    ClusterProcessor, ExecutionOutput, JobStatus, LocalProcessor, LoopbackClient,
    MemorySourceProvider, Processor,
};
use std::sync::Arc;
use std::time::Duration;

fn orders_schema() -> Schema {
    Schema::new(vec![
        Field::new("user_id", DType::Int64),
        Field::new("amount", DType::Int64),
        Field::new("ts", DType::Timestamp),
    ])
    .unwrap()
}

fn fixture() -> (MemoryRegistry, Arc<MemorySourceProvider>) {
    let provider = Arc::new(MemorySourceProvider::new());
    provider.insert(
        "orders",
        Table::with_rows(
            orders_schema(),
            vec![
                Row::new(vec![Value::Int64(1), Value::Int64(5), Value::Timestamp(10)]),
                Row::new(vec![Value::Int64(2), Value::Int64(3), Value::Timestamp(12)]),
                Row::new(vec![Value::Int64(1), Value::Int64(7), Value::Timestamp(20)]),
                Row::new(vec![Value::Int64(2), Value::Int64(-1), Value::Timestamp(21)]),
                Row::new(vec![Value::Int64(1), Value::Int64(2), Value::Timestamp(24)]),
            ],
        ),
    );
    (MemoryRegistry::new(), provider)
}

fn rolling_view() -> Definition {
    Definition::View(
        FeatureView::new("rolling", 1, ViewInput::Source("orders".to_string()))
            .with_transform(Transform::Filter {
                predicate: silo_parser::parse_raw("amount > 0").unwrap(),
            })
            .with_transform(Transform::Project {
                columns: vec![DerivedColumn::new(
                    "double_amount",
                    silo_parser::parse_raw("amount * 2").unwrap(),
                )],
            })
            .with_transform(Transform::WindowAggregate {
                window_ms: 15,
                aggregates: vec![
                    AggregateColumn::new(
                        "sum_amount",
                        AggFunc::Sum,
                        silo_parser::parse_raw("amount").unwrap(),
                    ),
                    AggregateColumn::new(
                        "order_count",
                        AggFunc::Count,
                        silo_parser::parse_raw("amount").unwrap(),
                    ),
                ],
            }),
    )
}

async fn run(processor: &dyn Processor, plan: silo_core::plan::ExecutionPlan) -> ExecutionOutput {
    let handle = processor.submit(plan).await.unwrap();
    loop {
        match processor.status(&handle).await.unwrap() {
            JobStatus::Succeeded => break,
            JobStatus::Failed { reason } => panic!("job failed: {}", reason),
            JobStatus::Running => tokio::time::sleep(Duration::from_millis(1)).await,
        }
    }
    processor.take_output(&handle).await.unwrap()
}

#[tokio::test]
async fn local_and_cluster_produce_identical_rows() {
    let (registry, provider) = fixture();
    registry
        .register(Definition::Source(
            DataSource::new("orders", orders_schema(), vec!["user_id".to_string()], "ts")
                .unwrap(),
        ))
        .await
        .unwrap();
    registry.register(rolling_view()).await.unwrap();
    let graph = Resolver::new(&registry).resolve("rolling", None).await.unwrap();

    let local = LocalProcessor::new(provider.clone());
    let cluster = ClusterProcessor::new(Arc::new(LoopbackClient::new(provider.clone())));

    let compiler = PlanCompiler::new();
    let range = Some(TimeRange::new(0, 100));
    let local_plan = compiler
        .compile(&graph, range, None, local.capabilities())
        .unwrap();
    let cluster_plan = compiler
        .compile(&graph, range, None, cluster.capabilities())
        .unwrap();

    // the two processors run structurally different plans
    let local_kinds: Vec<_> = local_plan.nodes.iter().map(|n| n.op.kind()).collect();
    let cluster_kinds: Vec<_> = cluster_plan.nodes.iter().map(|n| n.op.kind()).collect();
    assert!(!local_kinds.contains(&OperatorKind::FilterProject));
    assert!(cluster_kinds.contains(&OperatorKind::FilterProject));

    let local_output = run(&local, local_plan).await;
    let cluster_output = run(&cluster, cluster_plan).await;

    // identical schema, identical row set (order-independent)
    assert_eq!(local_output.table.schema, cluster_output.table.schema);
    assert_eq!(
        local_output.table.canonical_rows(),
        cluster_output.table.canonical_rows()
    );
    assert_eq!(local_output.dropped_late, cluster_output.dropped_late);
}

#[tokio::test]
async fn a_second_run_is_identical_to_the_first() {
    let (registry, provider) = fixture();
    registry
        .register(Definition::Source(
            DataSource::new("orders", orders_schema(), vec!["user_id".to_string()], "ts")
                .unwrap(),
        ))
        .await
        .unwrap();
    registry.register(rolling_view()).await.unwrap();
    let graph = Resolver::new(&registry).resolve("rolling", None).await.unwrap();

    let local = LocalProcessor::new(provider.clone());
    let plan = PlanCompiler::new()
        .compile(&graph, Some(TimeRange::new(0, 100)), None, local.capabilities())
        .unwrap();

    let first = run(&local, plan.clone()).await;
    let second = run(&local, plan).await;
    assert_eq!(first.table, second.table);
}
