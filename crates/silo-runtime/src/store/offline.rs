//! Offline (historical) feature storage

use async_trait::async_trait;
use silo_core::types::{Row, Schema, Table};
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::{Result, RuntimeError};
use crate::key::KeyTuple;

/// Append-oriented historical storage keyed by (entity key, event
/// timestamp).
///
/// Writes must be idempotent per (key, timestamp): re-appending a
/// recomputed row overwrites rather than duplicates, so retries after
/// partial failures are safe.
#[async_trait]
pub trait OfflineStore: Send + Sync {
    /// Append materialized rows for a view
    async fn append(
        &self,
        view: &str,
        schema: &Schema,
        key_fields: &[String],
        timestamp_field: &str,
        rows: &[Row],
    ) -> Result<u64>;

    /// Read back everything stored for a view
    async fn read(&self, view: &str) -> Result<Table>;
}

struct StoredView {
    schema: Schema,
    // Sequence disambiguates distinct rows sharing (key, ts); recomputed
    // runs produce identical sequences, so re-appending stays idempotent
    rows: BTreeMap<(KeyTuple, i64, u64), Vec<silo_core::types::Value>>,
}

/// In-memory offline store
#[derive(Default)]
pub struct MemoryOfflineStore {
    views: RwLock<HashMap<String, StoredView>>,
}

impl MemoryOfflineStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl OfflineStore for MemoryOfflineStore {
    async fn append(
        &self,
        view: &str,
        schema: &Schema,
        key_fields: &[String],
        timestamp_field: &str,
        rows: &[Row],
    ) -> Result<u64> {
        let key_indexes: Vec<usize> = key_fields
            .iter()
            .map(|f| {
                schema
                    .index_of(f)
                    .ok_or_else(|| RuntimeError::Store(format!("missing key field '{}'", f)))
            })
            .collect::<Result<_>>()?;
        let ts_index = schema.index_of(timestamp_field).ok_or_else(|| {
            RuntimeError::Store(format!("missing timestamp field '{}'", timestamp_field))
        })?;

        let mut views = self.views.write().await;
        let stored = views.entry(view.to_string()).or_insert_with(|| StoredView {
            schema: schema.clone(),
            rows: BTreeMap::new(),
        });
        if stored.schema != *schema {
            return Err(RuntimeError::Store(format!(
                "schema change for offline view '{}'",
                view
            )));
        }

        for row in rows {
            let key = KeyTuple::from_row(&row.values, &key_indexes);
            let ts = row.values[ts_index].as_i64().ok_or_else(|| {
                RuntimeError::Store("offline row has a non-timestamp event time".to_string())
            })?;
            stored.rows.insert((key, ts, row.seq), row.values.clone());
        }

        debug!(view, appended = rows.len(), total = stored.rows.len(), "offline append");
        Ok(rows.len() as u64)
    }

    async fn read(&self, view: &str) -> Result<Table> {
        let views = self.views.read().await;
        let stored = views
            .get(view)
            .ok_or_else(|| RuntimeError::Store(format!("unknown offline view '{}'", view)))?;

        let rows = stored
            .rows
            .values()
            .enumerate()
            .map(|(seq, values)| Row::with_seq(values.clone(), seq as u64))
            .collect();
        Ok(Table::with_rows(stored.schema.clone(), rows))
    }
}
