//! Silo Core - Core types and definitions for the Silo feature store
//!
//! This crate provides the fundamental types used across the Silo workspace:
//! - Value and data types for rows, schemas and tables
//! - Expression AST and typed expression trees
//! - The declarative feature-view data model
//! - The physical execution-plan IR
//! - Error types

pub mod ast;
pub mod error;
pub mod plan;
pub mod types;
pub mod view;

// Re-export commonly used types
pub use error::CoreError;
pub use types::{DType, Field, Row, Schema, Table, TimeRange, Value};
