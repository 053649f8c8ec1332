//! Offline and online store connectors
//!
//! Concrete external storage systems are out of scope; the traits define
//! the contracts the coordinator relies on, and the in-memory backends
//! implement them for tests and local runs.

mod offline;
mod online;

pub use offline::{MemoryOfflineStore, OfflineStore};
pub use online::{MemoryOnlineStore, OnlineStore};
