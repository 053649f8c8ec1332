//! Raw source access for the in-process engine

use silo_core::types::Table;
use std::collections::HashMap;
use std::sync::RwLock;

use crate::error::{Result, RuntimeError};

/// Supplies raw source tables to scan operators, in ingestion order
pub trait SourceProvider: Send + Sync {
    fn scan(&self, source: &str) -> Result<Table>;
}

/// In-memory source provider
#[derive(Default)]
pub struct MemorySourceProvider {
    tables: RwLock<HashMap<String, Table>>,
}

impl MemorySourceProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) a source table. Row order is ingestion order.
    pub fn insert(&self, name: impl Into<String>, table: Table) {
        self.tables
            .write()
            .expect("source provider lock poisoned")
            .insert(name.into(), table);
    }
}

impl SourceProvider for MemorySourceProvider {
    fn scan(&self, source: &str) -> Result<Table> {
        self.tables
            .read()
            .expect("source provider lock poisoned")
            .get(source)
            .cloned()
            .ok_or_else(|| RuntimeError::Execution(format!("unknown source '{}'", source)))
    }
}
