//! The declarative feature-view data model
//!
//! Definitions are created by user declaration, persisted through the
//! registry, and read (never mutated) by the resolver at compile time.

mod definition;
mod source;
mod transform;
mod view;

pub use definition::Definition;
pub use source::DataSource;
pub use transform::{AggregateColumn, DerivedColumn, Transform};
pub use view::{Feature, FeatureView, OnDemandColumn, ViewInput, ViewRef};
