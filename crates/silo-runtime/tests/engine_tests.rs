//! Engine tests: point-in-time windows, temporal joins, tie-breaking and
//! lateness over real compiled plans

use silo_compiler::{PlanCompiler, Resolver};
use silo_core::ast::AggFunc;
use silo_core::plan::{Capabilities, ExecutionPlan, KeyFilter};
use silo_core::types::{DType, Field, Row, Schema, Table, TimeRange, Value};
use silo_core::view::{
    AggregateColumn, DataSource, Definition, Feature, FeatureView, Transform, ViewInput, ViewRef,
};
use silo_registry::{MemoryRegistry, Registry};
use silo_runtime::{Engine, MemorySourceProvider};
use std::sync::Arc;

fn orders_schema() -> Schema {
    Schema::new(vec![
        Field::new("user_id", DType::Int64),
        Field::new("amount", DType::Int64),
        Field::new("ts", DType::Timestamp),
    ])
    .unwrap()
}

fn orders_source() -> DataSource {
    DataSource::new("orders", orders_schema(), vec!["user_id".to_string()], "ts").unwrap()
}

fn order_row(user_id: i64, ts: i64, amount: Option<i64>) -> Row {
    Row::new(vec![
        Value::Int64(user_id),
        amount.map(Value::Int64).unwrap_or(Value::Null),
        Value::Timestamp(ts),
    ])
}

fn window_view(name: &str, window_ms: i64) -> Definition {
    Definition::View(
        FeatureView::new(name, 1, ViewInput::Source("orders".to_string())).with_transform(
            Transform::WindowAggregate {
                window_ms,
                aggregates: vec![
                    AggregateColumn::new(
                        "sum_amount",
                        AggFunc::Sum,
                        silo_parser::parse_raw("amount").unwrap(),
                    ),
                    AggregateColumn::new(
                        "avg_amount",
                        AggFunc::Avg,
                        silo_parser::parse_raw("amount").unwrap(),
                    ),
                ],
            },
        ),
    )
}

async fn compile(definitions: Vec<Definition>, root: &str) -> ExecutionPlan {
    let registry = MemoryRegistry::new();
    for definition in definitions {
        registry.register(definition).await.unwrap();
    }
    let graph = Resolver::new(&registry).resolve(root, None).await.unwrap();
    PlanCompiler::new()
        .compile(&graph, None, None, &Capabilities::all())
        .unwrap()
}

fn sum_at(table: &Table, ts: i64) -> Value {
    let row = table
        .rows
        .iter()
        .position(|r| {
            table.schema.index_of("ts").map(|i| &r.values[i]) == Some(&Value::Timestamp(ts))
        })
        .expect("probe row exists");
    table.value(row, "sum_amount").cloned().unwrap()
}

#[tokio::test]
async fn trailing_window_sum_per_probe_row() {
    // rows at ts=10 (amount 5) and ts=20 (amount 7), null-amount probes
    let provider = Arc::new(MemorySourceProvider::new());
    provider.insert(
        "orders",
        Table::with_rows(
            orders_schema(),
            vec![
                order_row(1, 10, Some(5)),
                order_row(1, 12, None),
                order_row(1, 20, Some(7)),
                order_row(1, 22, None),
            ],
        ),
    );
    let plan = compile(
        vec![Definition::Source(orders_source()), window_view("rolling", 15)],
        "rolling",
    )
    .await;
    let output = Engine::new(provider).execute(&plan).unwrap();

    // (-5, 10] holds only the ts=10 row
    assert_eq!(sum_at(&output.table, 10), Value::Int64(5));
    // (-3, 12] still holds only ts=10
    assert_eq!(sum_at(&output.table, 12), Value::Int64(5));
    // (5, 20] holds both rows
    assert_eq!(sum_at(&output.table, 20), Value::Int64(12));
    // (7, 22] holds ts=10 and ts=20
    assert_eq!(sum_at(&output.table, 22), Value::Int64(12));
}

#[tokio::test]
async fn short_window_sees_only_the_latest_row() {
    let provider = Arc::new(MemorySourceProvider::new());
    provider.insert(
        "orders",
        Table::with_rows(
            orders_schema(),
            vec![
                order_row(1, 10, Some(5)),
                order_row(1, 20, Some(7)),
                order_row(1, 22, None),
            ],
        ),
    );
    let plan = compile(
        vec![Definition::Source(orders_source()), window_view("rolling", 5)],
        "rolling",
    )
    .await;
    let output = Engine::new(provider).execute(&plan).unwrap();

    // (17, 22] holds only the ts=20 row
    assert_eq!(sum_at(&output.table, 22), Value::Int64(7));
}

#[tokio::test]
async fn row_exactly_at_lower_boundary_is_excluded() {
    // open-lower: a row at exactly t - W does not count
    let provider = Arc::new(MemorySourceProvider::new());
    provider.insert(
        "orders",
        Table::with_rows(
            orders_schema(),
            vec![
                order_row(1, 7, Some(100)),
                order_row(1, 10, Some(5)),
                order_row(1, 20, Some(7)),
                order_row(1, 22, None),
            ],
        ),
    );
    let plan = compile(
        vec![Definition::Source(orders_source()), window_view("rolling", 15)],
        "rolling",
    )
    .await;
    let output = Engine::new(provider).execute(&plan).unwrap();

    // window at ts=22 is (7, 22]: the ts=7 row is out, 10 and 20 are in
    assert_eq!(sum_at(&output.table, 22), Value::Int64(12));
}

#[tokio::test]
async fn empty_window_sum_is_zero_avg_is_null() {
    let provider = Arc::new(MemorySourceProvider::new());
    provider.insert(
        "orders",
        Table::with_rows(orders_schema(), vec![order_row(3, 50, None)]),
    );
    let plan = compile(
        vec![Definition::Source(orders_source()), window_view("rolling", 15)],
        "rolling",
    )
    .await;
    let output = Engine::new(provider).execute(&plan).unwrap();

    assert_eq!(sum_at(&output.table, 50), Value::Int64(0));
    assert_eq!(output.table.value(0, "avg_amount"), Some(&Value::Null));
}

#[tokio::test]
async fn inserting_a_future_row_never_changes_a_past_answer() {
    let plan = compile(
        vec![Definition::Source(orders_source()), window_view("rolling", 15)],
        "rolling",
    )
    .await;

    let provider = Arc::new(MemorySourceProvider::new());
    provider.insert(
        "orders",
        Table::with_rows(orders_schema(), vec![order_row(1, 10, Some(5))]),
    );
    let before = Engine::new(provider.clone()).execute(&plan).unwrap();
    let past_answer = sum_at(&before.table, 10);

    // a future row arrives
    provider.insert(
        "orders",
        Table::with_rows(
            orders_schema(),
            vec![order_row(1, 10, Some(5)), order_row(1, 20, Some(7))],
        ),
    );
    let after = Engine::new(provider).execute(&plan).unwrap();

    assert_eq!(past_answer, Value::Int64(5));
    assert_eq!(sum_at(&after.table, 10), past_answer);
}

fn profile_schema() -> Schema {
    Schema::new(vec![
        Field::new("user_id", DType::Int64),
        Field::new("tier", DType::String),
        Field::new("ts", DType::Timestamp),
    ])
    .unwrap()
}

fn profile_row(user_id: i64, ts: i64, tier: &str) -> Row {
    Row::new(vec![
        Value::Int64(user_id),
        Value::String(tier.to_string()),
        Value::Timestamp(ts),
    ])
}

fn joined_view() -> Vec<Definition> {
    let profiles = DataSource::new(
        "profiles",
        profile_schema(),
        vec!["user_id".to_string()],
        "ts",
    )
    .unwrap();
    let enriched = FeatureView::new("enriched", 1, ViewInput::Source("orders".to_string()))
        .with_transform(Transform::TemporalJoin {
            right: ViewRef::latest("profile_view"),
            keys: vec!["user_id".to_string()],
            columns: vec!["tier".to_string()],
        });
    let profile_view = FeatureView::new(
        "profile_view",
        1,
        ViewInput::Source("profiles".to_string()),
    )
    .with_feature(Feature::new("tier", DType::String, vec!["user_id".to_string()]));
    vec![
        Definition::Source(orders_source()),
        Definition::Source(profiles),
        Definition::View(profile_view),
        Definition::View(enriched),
    ]
}

#[tokio::test]
async fn temporal_join_takes_last_known_value() {
    let provider = Arc::new(MemorySourceProvider::new());
    provider.insert(
        "orders",
        Table::with_rows(
            orders_schema(),
            vec![
                order_row(1, 5, Some(1)),
                order_row(1, 15, Some(2)),
                order_row(1, 30, Some(3)),
            ],
        ),
    );
    provider.insert(
        "profiles",
        Table::with_rows(
            profile_schema(),
            vec![profile_row(1, 10, "bronze"), profile_row(1, 20, "gold")],
        ),
    );
    let plan = compile(joined_view(), "enriched").await;
    let output = Engine::new(provider).execute(&plan).unwrap();

    // before any profile row: null
    assert_eq!(output.table.value(0, "tier"), Some(&Value::Null));
    // after the bronze row, before gold
    assert_eq!(
        output.table.value(1, "tier"),
        Some(&Value::String("bronze".to_string()))
    );
    // after both: latest wins
    assert_eq!(
        output.table.value(2, "tier"),
        Some(&Value::String("gold".to_string()))
    );
}

#[tokio::test]
async fn same_timestamp_ties_break_by_ingestion_order() {
    let provider = Arc::new(MemorySourceProvider::new());
    provider.insert(
        "orders",
        Table::with_rows(orders_schema(), vec![order_row(1, 10, Some(1))]),
    );
    // two profile rows at the same (key, ts): the later-ingested one wins
    provider.insert(
        "profiles",
        Table::with_rows(
            profile_schema(),
            vec![profile_row(1, 10, "first"), profile_row(1, 10, "second")],
        ),
    );
    let plan = compile(joined_view(), "enriched").await;
    let output = Engine::new(provider).execute(&plan).unwrap();

    assert_eq!(
        output.table.value(0, "tier"),
        Some(&Value::String("second".to_string()))
    );
}

#[tokio::test]
async fn rows_beyond_lateness_tolerance_are_dropped_and_counted() {
    let source = orders_source().with_watermark_ms(5).unwrap();
    let provider = Arc::new(MemorySourceProvider::new());
    provider.insert(
        "orders",
        Table::with_rows(
            orders_schema(),
            vec![
                order_row(1, 100, Some(1)),
                order_row(1, 96, Some(2)),  // within tolerance
                order_row(1, 90, Some(3)),  // too late, dropped
            ],
        ),
    );
    let plan = compile(
        vec![Definition::Source(source), window_view("rolling", 50)],
        "rolling",
    )
    .await;
    let output = Engine::new(provider).execute(&plan).unwrap();

    assert_eq!(output.dropped_late, 1);
    assert_eq!(output.table.len(), 2);
    // the dropped row is invisible to the window as well
    assert_eq!(sum_at(&output.table, 100), Value::Int64(1));
}

#[tokio::test]
async fn time_range_and_key_filter_restrict_output_only() {
    let registry = MemoryRegistry::new();
    registry
        .register(Definition::Source(orders_source()))
        .await
        .unwrap();
    registry.register(window_view("rolling", 15)).await.unwrap();
    let graph = Resolver::new(&registry).resolve("rolling", None).await.unwrap();
    let key_filter = KeyFilter::new(vec!["user_id".to_string()], vec![vec![Value::Int64(1)]]);
    let plan = PlanCompiler::new()
        .compile(
            &graph,
            Some(TimeRange::new(15, 25)),
            Some(&key_filter),
            &Capabilities::all(),
        )
        .unwrap();

    let provider = Arc::new(MemorySourceProvider::new());
    provider.insert(
        "orders",
        Table::with_rows(
            orders_schema(),
            vec![
                order_row(1, 10, Some(5)),
                order_row(1, 20, Some(7)),
                order_row(2, 20, Some(100)),
                order_row(1, 25, Some(9)), // end is exclusive
            ],
        ),
    );
    let output = Engine::new(provider).execute(&plan).unwrap();

    // only user 1's ts=20 row survives the range and key restrictions
    assert_eq!(output.table.len(), 1);
    // but its window still saw the pre-range ts=10 row
    assert_eq!(sum_at(&output.table, 20), Value::Int64(12));
}
