//! Registry artifacts

use super::source::DataSource;
use super::view::FeatureView;
use serde::{Deserialize, Serialize};

/// The artifact stored under a (name, version) registry entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Definition {
    Source(DataSource),
    View(FeatureView),
}

impl Definition {
    pub fn name(&self) -> &str {
        match self {
            Definition::Source(source) => &source.name,
            Definition::View(view) => &view.name,
        }
    }

    /// Sources are unversioned declarations; they register as version 1
    pub fn version(&self) -> u32 {
        match self {
            Definition::Source(_) => 1,
            Definition::View(view) => view.version,
        }
    }

    pub fn as_source(&self) -> Option<&DataSource> {
        match self {
            Definition::Source(source) => Some(source),
            Definition::View(_) => None,
        }
    }

    pub fn as_view(&self) -> Option<&FeatureView> {
        match self {
            Definition::View(view) => Some(view),
            Definition::Source(_) => None,
        }
    }
}
