//! Core trait definition for the registry
//!
//! All implementations must be `Send + Sync` for use across async tasks.
//! Reads are safe under concurrent registration: registering a new version
//! never blocks or invalidates a resolution of an older version already in
//! flight.

use async_trait::async_trait;
use silo_core::view::Definition;

use crate::RegistryResult;

/// Versioned, append-only storage for feature-view and source definitions
#[async_trait]
pub trait Registry: Send + Sync {
    /// Register a definition under its (name, version).
    ///
    /// Re-registering an identical body is an idempotent no-op;
    /// re-registering a different body under an existing (name, version)
    /// fails with [`RegistryError::DuplicateVersion`].
    ///
    /// [`RegistryError::DuplicateVersion`]: crate::RegistryError::DuplicateVersion
    async fn register(&self, definition: Definition) -> RegistryResult<()>;

    /// Fetch a definition; `version: None` means the latest registered
    async fn get(&self, name: &str, version: Option<u32>) -> RegistryResult<Definition>;

    /// The highest registered version of a name
    async fn latest_version(&self, name: &str) -> RegistryResult<u32>;

    /// All registered versions of a name, ascending
    async fn list_versions(&self, name: &str) -> RegistryResult<Vec<u32>>;
}
