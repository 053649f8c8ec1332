//! In-memory registry backend

use async_trait::async_trait;
use silo_core::view::Definition;
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::{RegistryError, RegistryResult};
use crate::traits::Registry;

/// In-memory, append-only registry.
///
/// Versions per name are kept in a `BTreeMap` so "latest" is the map's last
/// key. The read lock is held only for the duration of a lookup, so
/// concurrent resolutions proceed in parallel and registrations of new
/// versions never invalidate them.
#[derive(Default)]
pub struct MemoryRegistry {
    entries: RwLock<HashMap<String, BTreeMap<u32, Definition>>>,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Registry for MemoryRegistry {
    async fn register(&self, definition: Definition) -> RegistryResult<()> {
        let name = definition.name().to_string();
        let version = definition.version();

        let mut entries = self.entries.write().await;
        let versions = entries.entry(name.clone()).or_default();

        if let Some(existing) = versions.get(&version) {
            if *existing == definition {
                debug!(name = %name, version, "identical re-registration ignored");
                return Ok(());
            }
            return Err(RegistryError::DuplicateVersion { name, version });
        }

        versions.insert(version, definition);
        debug!(name = %name, version, "registered definition");
        Ok(())
    }

    async fn get(&self, name: &str, version: Option<u32>) -> RegistryResult<Definition> {
        let entries = self.entries.read().await;
        let versions = entries.get(name).ok_or_else(|| RegistryError::NotFound {
            name: name.to_string(),
            version,
        })?;

        let definition = match version {
            Some(v) => versions.get(&v),
            None => versions.values().next_back(),
        };
        definition.cloned().ok_or_else(|| RegistryError::NotFound {
            name: name.to_string(),
            version,
        })
    }

    async fn latest_version(&self, name: &str) -> RegistryResult<u32> {
        let entries = self.entries.read().await;
        entries
            .get(name)
            .and_then(|versions| versions.keys().next_back().copied())
            .ok_or_else(|| RegistryError::NotFound {
                name: name.to_string(),
                version: None,
            })
    }

    async fn list_versions(&self, name: &str) -> RegistryResult<Vec<u32>> {
        let entries = self.entries.read().await;
        entries
            .get(name)
            .map(|versions| versions.keys().copied().collect())
            .ok_or_else(|| RegistryError::NotFound {
                name: name.to_string(),
                version: None,
            })
    }
}
