//! Runtime error types

use silo_compiler::{CompileError, ResolveError};
use silo_core::error::CoreError;
use thiserror::Error;

/// Runtime error
///
/// `Transient` marks failures worth retrying with backoff (connectivity,
/// backend-side timeouts reported by a client). The coordinator's own
/// execution deadline surfaces as `Timeout` and is terminal for the
/// request.
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// Graph resolution failed; nothing was compiled or executed
    #[error("Resolution error: {0}")]
    Resolve(#[from] ResolveError),

    /// Plan compilation failed; nothing was submitted
    #[error("Compilation error: {0}")]
    Compile(#[from] CompileError),

    /// Expression evaluation failed inside an operator
    #[error("Evaluation error: {0}")]
    Core(#[from] CoreError),

    /// Plan or row (de)serialization for a remote processor failed
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Retryable failure reported by a processor or its transport
    #[error("Transient error: {0}")]
    Transient(String),

    /// Terminal failure reported by the execution backend
    #[error("Execution failed: {0}")]
    Execution(String),

    /// The coordinator's execution deadline elapsed
    #[error("Execution timed out after {elapsed_ms} ms")]
    Timeout { elapsed_ms: u64 },

    /// Store connector failure
    #[error("Store error: {0}")]
    Store(String),

    /// Unknown job handle
    #[error("Unknown job: {0}")]
    UnknownJob(String),

    /// Malformed request
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl RuntimeError {
    /// Whether the coordinator should retry this failure with backoff
    pub fn is_transient(&self) -> bool {
        matches!(self, RuntimeError::Transient(_))
    }
}

/// Result type for runtime operations
pub type Result<T> = std::result::Result<T, RuntimeError>;
