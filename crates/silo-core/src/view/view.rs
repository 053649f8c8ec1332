//! Feature view declarations

use super::transform::Transform;
use crate::ast::Expr;
use crate::types::{DType, Schema};
use serde::{Deserialize, Serialize};

/// A reference to a named, versioned feature view.
///
/// `version: None` means "latest at resolution time"; the resolver pins the
/// concrete version so a compiled plan is reproducible.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ViewRef {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<u32>,
}

impl ViewRef {
    /// Reference the latest registered version
    pub fn latest(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: None,
        }
    }

    /// Reference a pinned version
    pub fn pinned(name: impl Into<String>, version: u32) -> Self {
        Self {
            name: name.into(),
            version: Some(version),
        }
    }
}

/// The input a feature view reads from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViewInput {
    /// A registered raw data source, by name
    Source(String),

    /// Another feature view, by reference
    View(ViewRef),

    /// An ordered pair of views joined on shared keys; the left view drives
    Join {
        left: ViewRef,
        right: ViewRef,
        keys: Vec<String>,
    },
}

/// A declared output column of a feature view
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feature {
    pub name: String,
    pub dtype: DType,
    /// Entity keys this feature is computed per
    pub keys: Vec<String>,
}

impl Feature {
    pub fn new(name: impl Into<String>, dtype: DType, keys: Vec<String>) -> Self {
        Self {
            name: name.into(),
            dtype,
            keys,
        }
    }
}

/// A column computed at request time from request-supplied fields plus the
/// view's stored features; never materialized
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OnDemandColumn {
    pub name: String,
    pub expr: Expr,
}

impl OnDemandColumn {
    pub fn new(name: impl Into<String>, expr: Expr) -> Self {
        Self {
            name: name.into(),
            expr,
        }
    }
}

/// A named, versioned feature view: one input, a transform chain, and a set
/// of declared output features
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureView {
    pub name: String,
    pub version: u32,
    pub input: ViewInput,
    #[serde(default)]
    pub transforms: Vec<Transform>,
    #[serde(default)]
    pub features: Vec<Feature>,
    #[serde(default)]
    pub on_demand: Vec<OnDemandColumn>,
    /// Schema of request-supplied fields available to on-demand columns
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_schema: Option<Schema>,
}

impl FeatureView {
    pub fn new(name: impl Into<String>, version: u32, input: ViewInput) -> Self {
        Self {
            name: name.into(),
            version,
            input,
            transforms: Vec::new(),
            features: Vec::new(),
            on_demand: Vec::new(),
            request_schema: None,
        }
    }

    pub fn with_transform(mut self, transform: Transform) -> Self {
        self.transforms.push(transform);
        self
    }

    pub fn with_feature(mut self, feature: Feature) -> Self {
        self.features.push(feature);
        self
    }

    pub fn with_on_demand(mut self, column: OnDemandColumn) -> Self {
        self.on_demand.push(column);
        self
    }

    pub fn with_request_schema(mut self, schema: Schema) -> Self {
        self.request_schema = Some(schema);
        self
    }
}
