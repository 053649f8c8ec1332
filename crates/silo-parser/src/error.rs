//! Parser error types

use thiserror::Error;

/// Expression layer error
#[derive(Error, Debug)]
pub enum ExpressionError {
    /// Malformed expression text
    #[error("Syntax error: {0}")]
    SyntaxError(String),

    /// Operand types do not fit the operator
    #[error("Type error: {0}")]
    TypeError(String),

    /// Reference to a field the input schema does not declare
    #[error("Unknown field: {0}")]
    UnknownField(String),

    /// Call to a function outside the aggregation vocabulary
    #[error("Unknown function: {0}")]
    UnknownFunction(String),
}

/// Result type for expression-layer operations
pub type Result<T> = std::result::Result<T, ExpressionError>;
