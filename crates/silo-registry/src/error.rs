//! Error types for the registry layer

use thiserror::Error;

/// Result type alias for registry operations
pub type RegistryResult<T> = Result<T, RegistryError>;

/// Errors that can occur during registry operations
#[derive(Error, Debug)]
pub enum RegistryError {
    /// No definition under the requested name/version
    #[error("Definition not found: {name}{}", version.map(|v| format!(" v{}", v)).unwrap_or_default())]
    NotFound { name: String, version: Option<u32> },

    /// A different definition body already exists under this (name, version)
    #[error("Duplicate version: {name} v{version} is already registered with a different definition")]
    DuplicateVersion { name: String, version: u32 },

    /// I/O error occurred
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization error
    #[error("Failed to parse YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Malformed registry directory entry
    #[error("Invalid registry entry: {0}")]
    InvalidEntry(String),
}
