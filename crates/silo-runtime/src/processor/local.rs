//! Synchronous in-process processor

use async_trait::async_trait;
use silo_core::plan::{Capabilities, ExecutionPlan, OperatorKind};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

use super::{JobHandle, JobStatus, Processor};
use crate::engine::{Engine, ExecutionOutput};
use crate::error::{Result, RuntimeError};
use crate::provider::SourceProvider;

/// Local evaluator: executes the whole plan eagerly at submit time.
///
/// Advertises the discrete operators but not the fused filter-project
/// stage, so the compiler emits the unfused form for it.
pub struct LocalProcessor {
    engine: Engine,
    capabilities: Capabilities,
    jobs: Mutex<HashMap<JobHandle, std::result::Result<ExecutionOutput, String>>>,
}

impl LocalProcessor {
    pub fn new(provider: Arc<dyn SourceProvider>) -> Self {
        Self {
            engine: Engine::new(provider),
            capabilities: Capabilities::of([
                OperatorKind::Scan,
                OperatorKind::Project,
                OperatorKind::Filter,
                OperatorKind::WindowAggregate,
                OperatorKind::TemporalJoin,
                OperatorKind::TimeRangeFilter,
                OperatorKind::KeyFilter,
            ]),
            jobs: Mutex::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl Processor for LocalProcessor {
    fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    async fn submit(&self, plan: ExecutionPlan) -> Result<JobHandle> {
        let handle = JobHandle::new();
        // Blocking evaluation; the job is terminal by the time the handle
        // is returned
        let result = self.engine.execute(&plan).map_err(|e| e.to_string());
        debug!(job = %handle, ok = result.is_ok(), "local execution finished");
        self.jobs.lock().await.insert(handle.clone(), result);
        Ok(handle)
    }

    async fn status(&self, handle: &JobHandle) -> Result<JobStatus> {
        let jobs = self.jobs.lock().await;
        match jobs.get(handle) {
            Some(Ok(_)) => Ok(JobStatus::Succeeded),
            Some(Err(reason)) => Ok(JobStatus::Failed {
                reason: reason.clone(),
            }),
            None => Err(RuntimeError::UnknownJob(handle.to_string())),
        }
    }

    async fn cancel(&self, _handle: &JobHandle) -> Result<()> {
        // Execution is synchronous; there is nothing in flight to cancel
        Ok(())
    }

    async fn take_output(&self, handle: &JobHandle) -> Result<ExecutionOutput> {
        let mut jobs = self.jobs.lock().await;
        match jobs.remove(handle) {
            Some(Ok(output)) => Ok(output),
            Some(Err(reason)) => Err(RuntimeError::Execution(reason)),
            None => Err(RuntimeError::UnknownJob(handle.to_string())),
        }
    }
}
