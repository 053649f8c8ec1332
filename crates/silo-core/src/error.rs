//! Error types for Silo Core

use thiserror::Error;

/// Core error type
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Type error: {0}")]
    TypeError(String),

    #[error("Field not found: {0}")]
    FieldNotFound(String),

    #[error("Invalid value: {0}")]
    InvalidValue(String),

    #[error("Invalid schema: {0}")]
    InvalidSchema(String),

    #[error("Invalid definition: {0}")]
    InvalidDefinition(String),

    #[error("Division by zero")]
    DivisionByZero,
}

pub type Result<T> = std::result::Result<T, CoreError>;
