//! In-memory rows and tables
//!
//! Every row carries the ingestion sequence number it was assigned when its
//! source was scanned. The sequence is the deterministic tie-break between
//! rows that share an entity key and an event timestamp, so row-local
//! operators must preserve it.

use super::{Schema, Value};
use crate::error::{CoreError, Result};
use serde::{Deserialize, Serialize};

/// A single row, positional against a `Schema`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Row {
    pub values: Vec<Value>,
    /// Ingestion sequence assigned at scan time
    pub seq: u64,
}

impl Row {
    pub fn new(values: Vec<Value>) -> Self {
        Self { values, seq: 0 }
    }

    pub fn with_seq(values: Vec<Value>, seq: u64) -> Self {
        Self { values, seq }
    }

    pub fn value(&self, index: usize) -> Result<&Value> {
        self.values
            .get(index)
            .ok_or_else(|| CoreError::InvalidValue(format!("row has no column {}", index)))
    }
}

/// A schema plus its rows
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Table {
    pub schema: Schema,
    pub rows: Vec<Row>,
}

impl Table {
    pub fn new(schema: Schema) -> Self {
        Self {
            schema,
            rows: Vec::new(),
        }
    }

    pub fn with_rows(schema: Schema, rows: Vec<Row>) -> Self {
        Self { schema, rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Cell lookup by row index and field name
    pub fn value(&self, row: usize, field: &str) -> Option<&Value> {
        let col = self.schema.index_of(field)?;
        self.rows.get(row).and_then(|r| r.values.get(col))
    }

    /// Rows sorted by value then sequence, for order-independent comparison
    pub fn canonical_rows(&self) -> Vec<Row> {
        let mut rows = self.rows.clone();
        rows.sort_by(|a, b| {
            for (x, y) in a.values.iter().zip(b.values.iter()) {
                let ord = x.cmp_total(y);
                if ord != std::cmp::Ordering::Equal {
                    return ord;
                }
            }
            a.seq.cmp(&b.seq)
        });
        rows
    }
}
