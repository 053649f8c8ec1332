//! Online (serving) feature storage

use async_trait::async_trait;
use silo_core::types::{Schema, Value};
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::{Result, RuntimeError};
use crate::key::KeyTuple;

/// Latest-state storage for serving: one row per entity key, overwritten on
/// every upsert ("latest wins"). Online state is a cache of the latest
/// offline truth, not a source of record, so concurrent writers race under
/// last-write-wins with no extra locking.
#[async_trait]
pub trait OnlineStore: Send + Sync {
    /// Upsert a batch of latest rows for a view
    async fn upsert_batch(
        &self,
        view: &str,
        schema: &Schema,
        entries: Vec<(KeyTuple, Vec<Value>)>,
    ) -> Result<u64>;

    /// Point lookup of the stored row per requested key
    async fn lookup(&self, view: &str, keys: &[KeyTuple]) -> Result<Vec<Option<Vec<Value>>>>;
}

struct ServingView {
    schema: Schema,
    rows: BTreeMap<KeyTuple, Vec<Value>>,
}

/// In-memory online store
#[derive(Default)]
pub struct MemoryOnlineStore {
    views: RwLock<HashMap<String, ServingView>>,
}

impl MemoryOnlineStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl OnlineStore for MemoryOnlineStore {
    async fn upsert_batch(
        &self,
        view: &str,
        schema: &Schema,
        entries: Vec<(KeyTuple, Vec<Value>)>,
    ) -> Result<u64> {
        let mut views = self.views.write().await;
        let serving = views.entry(view.to_string()).or_insert_with(|| ServingView {
            schema: schema.clone(),
            rows: BTreeMap::new(),
        });
        if serving.schema != *schema {
            return Err(RuntimeError::Store(format!(
                "schema change for online view '{}'",
                view
            )));
        }

        let count = entries.len() as u64;
        for (key, values) in entries {
            serving.rows.insert(key, values);
        }
        debug!(view, upserted = count, total = serving.rows.len(), "online upsert");
        Ok(count)
    }

    async fn lookup(&self, view: &str, keys: &[KeyTuple]) -> Result<Vec<Option<Vec<Value>>>> {
        let views = self.views.read().await;
        let serving = match views.get(view) {
            Some(serving) => serving,
            // An unmaterialized view serves all-miss rather than an error
            None => return Ok(keys.iter().map(|_| None).collect()),
        };
        Ok(keys
            .iter()
            .map(|key| serving.rows.get(key).cloned())
            .collect())
    }
}
