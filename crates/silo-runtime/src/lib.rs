//! Silo Runtime - Execution engine, processors, stores and the
//! materialization coordinator
//!
//! This crate turns compiled plans into rows:
//! - [`engine`] is the in-process evaluator of every physical operator,
//!   implementing the point-in-time semantics from `silo_compiler::pit`
//!   bit-for-bit. Both processors execute through it in tests, which is
//!   what makes training-serving parity checkable.
//! - [`processor`] defines the processor abstraction plus the synchronous
//!   local evaluator and the submit-and-poll cluster adapter.
//! - [`store`] holds the offline/online store connectors.
//! - [`Coordinator`] orchestrates materialization requests and online
//!   feature serving.

pub mod coordinator;
pub mod engine;
pub mod error;
pub mod key;
pub mod processor;
pub mod provider;
pub mod store;

pub use coordinator::{
    Coordinator, MaterializationReport, MaterializationRequest, MaterializationState,
    MaterializationTarget, RetryPolicy,
};
pub use engine::{Engine, ExecutionOutput};
pub use error::{Result, RuntimeError};
pub use key::KeyTuple;
pub use processor::{
    ClusterClient, ClusterJobState, ClusterProcessor, JobHandle, JobStatus, LocalProcessor,
    LoopbackClient, Processor,
};
pub use provider::{MemorySourceProvider, SourceProvider};
pub use store::{MemoryOfflineStore, MemoryOnlineStore, OfflineStore, OnlineStore};
