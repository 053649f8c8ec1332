//! File-system registry backend
//!
//! One YAML document per (name, version), laid out as
//! `<root>/<name>/<version>.yaml`. The directory tree is the append-only
//! log; files are written once and never rewritten with different content.

use async_trait::async_trait;
use silo_core::view::Definition;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::error::{RegistryError, RegistryResult};
use crate::traits::Registry;

/// Registry over a directory of YAML definition files
pub struct FileSystemRegistry {
    root: PathBuf,
}

impl FileSystemRegistry {
    /// Open a registry rooted at the given directory, creating it if absent
    pub fn new(root: impl AsRef<Path>) -> RegistryResult<Self> {
        let root = root.as_ref().to_path_buf();
        std::fs::create_dir_all(&root)?;
        info!(root = %root.display(), "opened file-system registry");
        Ok(Self { root })
    }

    fn entry_path(&self, name: &str, version: u32) -> PathBuf {
        self.root.join(name).join(format!("{}.yaml", version))
    }

    async fn read_entry(&self, name: &str, version: u32) -> RegistryResult<Option<Definition>> {
        let path = self.entry_path(name, version);
        match tokio::fs::read_to_string(&path).await {
            Ok(content) => {
                let definition = serde_yaml::from_str(&content)?;
                Ok(Some(definition))
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    async fn versions_of(&self, name: &str) -> RegistryResult<Vec<u32>> {
        let dir = self.root.join(name);
        let mut reader = match tokio::fs::read_dir(&dir).await {
            Ok(reader) => reader,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };

        let mut versions = Vec::new();
        while let Some(entry) = reader.next_entry().await? {
            let path = entry.path();
            if path.extension().map(|e| e == "yaml").unwrap_or(false) {
                let stem = path
                    .file_stem()
                    .and_then(|s| s.to_str())
                    .ok_or_else(|| {
                        RegistryError::InvalidEntry(format!("bad file name: {}", path.display()))
                    })?;
                let version = stem.parse::<u32>().map_err(|_| {
                    RegistryError::InvalidEntry(format!(
                        "non-numeric version file: {}",
                        path.display()
                    ))
                })?;
                versions.push(version);
            }
        }
        versions.sort_unstable();
        Ok(versions)
    }
}

#[async_trait]
impl Registry for FileSystemRegistry {
    async fn register(&self, definition: Definition) -> RegistryResult<()> {
        let name = definition.name().to_string();
        let version = definition.version();

        if let Some(existing) = self.read_entry(&name, version).await? {
            if existing == definition {
                debug!(name = %name, version, "identical re-registration ignored");
                return Ok(());
            }
            return Err(RegistryError::DuplicateVersion { name, version });
        }

        let path = self.entry_path(&name, version);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let content = serde_yaml::to_string(&definition)?;
        tokio::fs::write(&path, content).await?;
        debug!(name = %name, version, path = %path.display(), "registered definition");
        Ok(())
    }

    async fn get(&self, name: &str, version: Option<u32>) -> RegistryResult<Definition> {
        let resolved = match version {
            Some(v) => v,
            None => self.latest_version(name).await?,
        };
        self.read_entry(name, resolved)
            .await?
            .ok_or_else(|| RegistryError::NotFound {
                name: name.to_string(),
                version,
            })
    }

    async fn latest_version(&self, name: &str) -> RegistryResult<u32> {
        self.versions_of(name)
            .await?
            .last()
            .copied()
            .ok_or_else(|| RegistryError::NotFound {
                name: name.to_string(),
                version: None,
            })
    }

    async fn list_versions(&self, name: &str) -> RegistryResult<Vec<u32>> {
        let versions = self.versions_of(name).await?;
        if versions.is_empty() {
            return Err(RegistryError::NotFound {
                name: name.to_string(),
                version: None,
            });
        }
        Ok(versions)
    }
}
