//! Raw data source declarations

use crate::error::{CoreError, Result};
use crate::types::{DType, Schema};
use serde::{Deserialize, Serialize};

/// A named, schema-typed reference to raw tabular data.
///
/// Immutable once registered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataSource {
    /// Unique source name
    pub name: String,

    /// Declared field list
    pub schema: Schema,

    /// Entity-key fields
    pub keys: Vec<String>,

    /// Event-timestamp field, must be of type `timestamp`
    pub timestamp_field: String,

    /// Lateness tolerance in milliseconds; rows arriving later than this
    /// behind the watermark are dropped and counted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub watermark_ms: Option<i64>,
}

impl DataSource {
    pub fn new(
        name: impl Into<String>,
        schema: Schema,
        keys: Vec<String>,
        timestamp_field: impl Into<String>,
    ) -> Result<Self> {
        let name = name.into();
        let timestamp_field = timestamp_field.into();

        for key in &keys {
            if !schema.contains(key) {
                return Err(CoreError::InvalidDefinition(format!(
                    "source '{}': key field '{}' not in schema",
                    name, key
                )));
            }
        }
        match schema.dtype_of(&timestamp_field) {
            Some(DType::Timestamp) => {}
            Some(other) => {
                return Err(CoreError::InvalidDefinition(format!(
                    "source '{}': timestamp field '{}' has type {}, expected timestamp",
                    name, timestamp_field, other
                )))
            }
            None => {
                return Err(CoreError::InvalidDefinition(format!(
                    "source '{}': timestamp field '{}' not in schema",
                    name, timestamp_field
                )))
            }
        }

        Ok(Self {
            name,
            schema,
            keys,
            timestamp_field,
            watermark_ms: None,
        })
    }

    pub fn with_watermark_ms(mut self, watermark_ms: i64) -> Result<Self> {
        if watermark_ms < 0 {
            return Err(CoreError::InvalidDefinition(format!(
                "source '{}': watermark must be non-negative",
                self.name
            )));
        }
        self.watermark_ms = Some(watermark_ms);
        Ok(self)
    }
}
