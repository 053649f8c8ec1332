//! Physical operator implementations
//!
//! Each operator is a pure function from input tables to an output table.
//! Window and join visibility, tie-breaking and empty-set defaults delegate
//! to `silo_compiler::pit`; nothing here re-derives those rules.

use silo_compiler::pit::{self, LatenessTracker, RowStamp};
use silo_core::ast::TypedExpr;
use silo_core::plan::{AggregateExpr, KeyFilter, ProjectColumn, TieBreak, WindowBounds};
use silo_core::types::{Field, Row, Schema, Table, TimeRange, Value};
use std::collections::BTreeMap;

use crate::error::{Result, RuntimeError};
use crate::key::KeyTuple;

/// Scan a raw table: verify the declared schema, assign ingestion
/// sequence numbers and drop rows beyond the lateness tolerance
pub fn scan(
    raw: Table,
    schema: &Schema,
    timestamp_field: &str,
    watermark_ms: Option<i64>,
) -> Result<(Table, u64)> {
    if raw.schema != *schema {
        return Err(RuntimeError::Execution(format!(
            "source schema mismatch: expected {:?}, provider returned {:?}",
            schema.names(),
            raw.schema.names()
        )));
    }
    let ts_index = field_index(schema, timestamp_field)?;

    let mut tracker = LatenessTracker::new(watermark_ms);
    let mut rows = Vec::with_capacity(raw.rows.len());
    for (seq, row) in raw.rows.into_iter().enumerate() {
        let ts = event_time(&row, ts_index)?;
        if tracker.admit(ts) {
            rows.push(Row::with_seq(row.values, seq as u64));
        }
    }

    Ok((Table::with_rows(schema.clone(), rows), tracker.dropped()))
}

/// Evaluate the complete output column list per row
pub fn project(table: &Table, columns: &[ProjectColumn]) -> Result<Table> {
    let schema = Schema::new(
        columns
            .iter()
            .map(|c| Field::new(&c.name, c.expr.dtype))
            .collect(),
    )
    .map_err(RuntimeError::Core)?;

    let mut rows = Vec::with_capacity(table.rows.len());
    for row in &table.rows {
        let mut values = Vec::with_capacity(columns.len());
        for column in columns {
            values.push(column.expr.eval(row)?);
        }
        rows.push(Row::with_seq(values, row.seq));
    }
    Ok(Table::with_rows(schema, rows))
}

/// Keep rows whose predicate evaluates to true; null is not true
pub fn filter(table: &Table, predicate: &TypedExpr) -> Result<Table> {
    let mut rows = Vec::new();
    for row in &table.rows {
        if predicate.eval(row)? == Value::Bool(true) {
            rows.push(row.clone());
        }
    }
    Ok(Table::with_rows(table.schema.clone(), rows))
}

/// Trailing-window aggregation per entity key, appended to each probe row
pub fn window_aggregate(
    table: &Table,
    keys: &[String],
    timestamp_field: &str,
    window_ms: i64,
    bounds: WindowBounds,
    aggregates: &[AggregateExpr],
) -> Result<Table> {
    let key_indexes = field_indexes(&table.schema, keys)?;
    let ts_index = field_index(&table.schema, timestamp_field)?;

    let mut schema = table.schema.clone();
    for aggregate in aggregates {
        schema = schema.with_field(Field::new(&aggregate.name, aggregate.dtype));
    }

    // Group row indexes per key; BTreeMap keeps evaluation deterministic
    let mut groups: BTreeMap<KeyTuple, Vec<usize>> = BTreeMap::new();
    for (index, row) in table.rows.iter().enumerate() {
        let key = KeyTuple::from_row(&row.values, &key_indexes);
        groups.entry(key).or_default().push(index);
    }

    let mut rows = Vec::with_capacity(table.rows.len());
    for row in &table.rows {
        let key = KeyTuple::from_row(&row.values, &key_indexes);
        let as_of = event_time(row, ts_index)?;
        let group = groups.get(&key).map(|g| g.as_slice()).unwrap_or(&[]);

        let mut values = row.values.clone();
        // Mirrors Schema::with_field: replace in place, append otherwise
        let mut appended: Vec<&str> = Vec::new();
        for aggregate in aggregates {
            let mut items = Vec::new();
            for &candidate_index in group {
                let candidate = &table.rows[candidate_index];
                let ts = event_time(candidate, ts_index)?;
                if pit::visible_in_window(ts, as_of, window_ms, bounds) {
                    let value = aggregate.arg.eval(candidate)?;
                    items.push((
                        RowStamp {
                            ts,
                            seq: candidate.seq,
                        },
                        value,
                    ));
                }
            }
            let result = pit::accumulate(aggregate.func, &items, aggregate.dtype)?;
            if let Some(index) = table.schema.index_of(&aggregate.name) {
                values[index] = result;
            } else if let Some(pos) = appended.iter().position(|n| *n == aggregate.name) {
                values[table.schema.len() + pos] = result;
            } else {
                appended.push(&aggregate.name);
                values.push(result);
            }
        }
        rows.push(Row::with_seq(values, row.seq));
    }

    Ok(Table::with_rows(schema, rows))
}

/// Enrich each left row with the latest visible right row sharing its key
pub fn temporal_join(
    left: &Table,
    right: &Table,
    keys: &[String],
    left_timestamp_field: &str,
    right_timestamp_field: &str,
    tie_break: TieBreak,
    columns: &[String],
) -> Result<Table> {
    let left_key_indexes = field_indexes(&left.schema, keys)?;
    let left_ts_index = field_index(&left.schema, left_timestamp_field)?;
    let right_key_indexes = field_indexes(&right.schema, keys)?;
    let right_ts_index = field_index(&right.schema, right_timestamp_field)?;
    let column_indexes = field_indexes(&right.schema, columns)?;

    let mut schema = left.schema.clone();
    for (column, &index) in columns.iter().zip(&column_indexes) {
        schema = schema.with_field(Field::new(column, right.schema.fields()[index].dtype));
    }

    let mut groups: BTreeMap<KeyTuple, Vec<usize>> = BTreeMap::new();
    for (index, row) in right.rows.iter().enumerate() {
        let key = KeyTuple::from_row(&row.values, &right_key_indexes);
        groups.entry(key).or_default().push(index);
    }

    let mut rows = Vec::with_capacity(left.rows.len());
    for row in &left.rows {
        let key = KeyTuple::from_row(&row.values, &left_key_indexes);
        let as_of = event_time(row, left_ts_index)?;

        let mut candidates = Vec::new();
        if let Some(group) = groups.get(&key) {
            for &candidate_index in group {
                let candidate = &right.rows[candidate_index];
                let ts = event_time(candidate, right_ts_index)?;
                if pit::visible_for_join(ts, as_of) {
                    candidates.push((
                        candidate_index,
                        RowStamp {
                            ts,
                            seq: candidate.seq,
                        },
                    ));
                }
            }
        }

        let winner = pit::pick_latest(candidates, tie_break);
        let mut values = row.values.clone();
        match winner {
            // Last-known-value semantics
            Some(winner_index) => {
                let winner_row = &right.rows[winner_index];
                for &column_index in &column_indexes {
                    values.push(winner_row.values[column_index].clone());
                }
            }
            // No qualifying row: every joined column is null
            None => values.extend(std::iter::repeat(Value::Null).take(column_indexes.len())),
        }
        rows.push(Row::with_seq(values, row.seq));
    }

    Ok(Table::with_rows(schema, rows))
}

/// Restrict rows to `[start, end)` over the event timestamp
pub fn time_range_filter(table: &Table, timestamp_field: &str, range: TimeRange) -> Result<Table> {
    let ts_index = field_index(&table.schema, timestamp_field)?;
    let mut rows = Vec::new();
    for row in &table.rows {
        if range.contains(event_time(row, ts_index)?) {
            rows.push(row.clone());
        }
    }
    Ok(Table::with_rows(table.schema.clone(), rows))
}

/// Keep rows whose key fields match at least one requested key tuple
pub fn key_filter(table: &Table, filter: &KeyFilter) -> Result<Table> {
    let indexes = field_indexes(&table.schema, &filter.fields)?;
    let requested: std::collections::BTreeSet<KeyTuple> = filter
        .keys
        .iter()
        .map(|key| KeyTuple(key.clone()))
        .collect();

    let mut rows = Vec::new();
    for row in &table.rows {
        let key = KeyTuple::from_row(&row.values, &indexes);
        if requested.contains(&key) {
            rows.push(row.clone());
        }
    }
    Ok(Table::with_rows(table.schema.clone(), rows))
}

fn field_index(schema: &Schema, name: &str) -> Result<usize> {
    schema.index_of(name).ok_or_else(|| {
        RuntimeError::Execution(format!("operator references missing field '{}'", name))
    })
}

fn field_indexes(schema: &Schema, names: &[String]) -> Result<Vec<usize>> {
    names.iter().map(|n| field_index(schema, n)).collect()
}

/// Read a row's event timestamp as epoch milliseconds
fn event_time(row: &Row, ts_index: usize) -> Result<i64> {
    row.values[ts_index].as_i64().ok_or_else(|| {
        RuntimeError::Execution(format!(
            "event timestamp is not a timestamp value: {:?}",
            row.values[ts_index]
        ))
    })
}

