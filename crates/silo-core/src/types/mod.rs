//! Data types for Silo rows, schemas and tables

mod dtype;
mod schema;
mod table;
mod time;
mod value;

pub use dtype::DType;
pub use schema::{Field, Schema};
pub use table::{Row, Table};
pub use time::TimeRange;
pub use value::Value;
