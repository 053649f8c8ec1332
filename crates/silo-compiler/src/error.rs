//! Error types for resolution and compilation

use silo_core::plan::OperatorKind;
use silo_parser::ExpressionError;
use silo_registry::RegistryError;
use thiserror::Error;

/// Errors surfaced at graph-resolution time, before any compilation or
/// execution resource is consumed
#[derive(Error, Debug)]
pub enum ResolveError {
    /// A referenced name/version is not registered
    #[error("Unknown reference: {name}{}", version.map(|v| format!(" v{}", v)).unwrap_or_default())]
    UnknownReference { name: String, version: Option<u32> },

    /// The reference chain revisited a view already on the resolution path
    #[error("Cyclic dependency: {}", path.join(" -> "))]
    CyclicDependency { path: Vec<String> },

    /// A transform or join does not fit its upstream output schema
    #[error("Schema conflict: {0}")]
    SchemaConflict(String),

    /// Definition-time expression error inside a referenced view
    #[error("Expression error: {0}")]
    Expression(#[from] ExpressionError),

    /// Registry failure other than a missing entry
    #[error("Registry error: {0}")]
    Registry(RegistryError),
}

/// Errors surfaced at plan-compilation time, before job submission
#[derive(Error, Debug)]
pub enum CompileError {
    /// The logical graph requires an operator outside the target
    /// processor's capability set
    #[error("Unsupported operator for target processor: {kind:?}")]
    UnsupportedOperator { kind: OperatorKind },

    /// Empty or inverted time range
    #[error("Invalid time range: [{start}, {end})")]
    InvalidTimeRange { start: i64, end: i64 },

    /// A key filter names a field the view does not output, or a key tuple
    /// does not match the filter's field list
    #[error("Invalid key filter: {0}")]
    InvalidKeyFilter(String),
}
