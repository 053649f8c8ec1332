//! Processor abstraction
//!
//! A processor executes compiled plans. Two implementations ship here:
//!
//! - [`LocalProcessor`]: synchronous in-process evaluator; blocks for the
//!   full scan at submit time, so status is immediately terminal.
//! - [`ClusterProcessor`]: adapter over an opaque [`ClusterClient`]
//!   transport; submit-and-poll, with plans shipped as JSON.
//!
//! The compiler branches on [`Capabilities`], never on which of these it is
//! talking to.

mod cluster;
mod local;

pub use cluster::{ClusterClient, ClusterJobState, ClusterProcessor, LoopbackClient};
pub use local::LocalProcessor;

use async_trait::async_trait;
use silo_core::plan::{Capabilities, ExecutionPlan};
use std::fmt;
use uuid::Uuid;

use crate::engine::ExecutionOutput;
use crate::error::Result;

/// Opaque handle to a submitted job
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct JobHandle(Uuid);

impl JobHandle {
    pub(crate) fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for JobHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Processor-reported job state
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobStatus {
    Running,
    Succeeded,
    Failed { reason: String },
}

/// An execution backend for compiled plans
#[async_trait]
pub trait Processor: Send + Sync {
    /// The operator kinds this processor can execute
    fn capabilities(&self) -> &Capabilities;

    /// Submit a plan for execution
    async fn submit(&self, plan: ExecutionPlan) -> Result<JobHandle>;

    /// Current state of a submitted job
    async fn status(&self, handle: &JobHandle) -> Result<JobStatus>;

    /// Advisory cancellation; the processor may still complete partial
    /// writes, which the idempotent-write contract tolerates
    async fn cancel(&self, handle: &JobHandle) -> Result<()>;

    /// Fetch the output of a succeeded job, consuming it
    async fn take_output(&self, handle: &JobHandle) -> Result<ExecutionOutput>;
}
