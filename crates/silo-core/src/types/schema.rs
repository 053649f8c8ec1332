//! Schemas: ordered, uniquely named, statically typed field lists

use super::DType;
use crate::error::{CoreError, Result};
use serde::{Deserialize, Serialize};

/// A named, typed column
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    pub dtype: DType,
}

impl Field {
    pub fn new(name: impl Into<String>, dtype: DType) -> Self {
        Self {
            name: name.into(),
            dtype,
        }
    }
}

/// An ordered list of fields with unique names
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    fields: Vec<Field>,
}

impl Schema {
    /// Build a schema, rejecting duplicate field names
    pub fn new(fields: Vec<Field>) -> Result<Self> {
        for (i, field) in fields.iter().enumerate() {
            if fields[..i].iter().any(|f| f.name == field.name) {
                return Err(CoreError::InvalidSchema(format!(
                    "duplicate field name '{}'",
                    field.name
                )));
            }
        }
        Ok(Self { fields })
    }

    pub fn empty() -> Self {
        Self { fields: Vec::new() }
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }

    pub fn dtype_of(&self, name: &str) -> Option<DType> {
        self.field(name).map(|f| f.dtype)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.field(name).is_some()
    }

    pub fn names(&self) -> Vec<&str> {
        self.fields.iter().map(|f| f.name.as_str()).collect()
    }

    /// Append a field, or replace an existing field of the same name in place
    pub fn with_field(&self, field: Field) -> Schema {
        let mut fields = self.fields.clone();
        match fields.iter().position(|f| f.name == field.name) {
            Some(i) => fields[i] = field,
            None => fields.push(field),
        }
        Schema { fields }
    }

    /// Project onto a subset of fields, preserving the requested order
    pub fn select(&self, names: &[String]) -> Result<Schema> {
        let mut fields = Vec::with_capacity(names.len());
        for name in names {
            let field = self
                .field(name)
                .ok_or_else(|| CoreError::FieldNotFound(name.clone()))?;
            fields.push(field.clone());
        }
        Schema::new(fields)
    }

    /// Concatenate two schemas, rejecting name collisions
    pub fn merge(&self, other: &Schema) -> Result<Schema> {
        let mut fields = self.fields.clone();
        fields.extend(other.fields.iter().cloned());
        Schema::new(fields)
    }
}
