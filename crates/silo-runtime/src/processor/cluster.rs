//! Distributed-backend adapter
//!
//! The cluster itself is an external collaborator behind the opaque
//! [`ClusterClient`] transport: submit a serialized plan, poll its state,
//! fetch serialized rows. This adapter owns handle bookkeeping and the
//! JSON wire format; it knows nothing about how the backend schedules work.

use async_trait::async_trait;
use silo_core::plan::{Capabilities, ExecutionPlan};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

use super::{JobHandle, JobStatus, Processor};
use crate::engine::{Engine, ExecutionOutput};
use crate::error::{Result, RuntimeError};
use crate::provider::SourceProvider;

/// Backend-reported job state
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClusterJobState {
    Pending,
    Running,
    Finished,
    Failed(String),
}

/// Opaque transport to a distributed execution backend
#[async_trait]
pub trait ClusterClient: Send + Sync {
    /// Submit a serialized plan; returns the backend's job id
    async fn submit_job(&self, plan: serde_json::Value) -> Result<String>;

    /// Poll a job's state
    async fn poll(&self, job_id: &str) -> Result<ClusterJobState>;

    /// Fetch the serialized output of a finished job
    async fn fetch(&self, job_id: &str) -> Result<serde_json::Value>;

    /// Best-effort cancellation
    async fn cancel(&self, job_id: &str) -> Result<()>;
}

/// Processor adapter over a [`ClusterClient`]
pub struct ClusterProcessor {
    client: Arc<dyn ClusterClient>,
    capabilities: Capabilities,
    jobs: Mutex<HashMap<JobHandle, String>>,
}

impl ClusterProcessor {
    /// A distributed backend supports every operator kind, the fused
    /// filter-project stage included
    pub fn new(client: Arc<dyn ClusterClient>) -> Self {
        Self {
            client,
            capabilities: Capabilities::all(),
            jobs: Mutex::new(HashMap::new()),
        }
    }

    async fn job_id(&self, handle: &JobHandle) -> Result<String> {
        self.jobs
            .lock()
            .await
            .get(handle)
            .cloned()
            .ok_or_else(|| RuntimeError::UnknownJob(handle.to_string()))
    }
}

#[async_trait]
impl Processor for ClusterProcessor {
    fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    async fn submit(&self, plan: ExecutionPlan) -> Result<JobHandle> {
        let serialized = serde_json::to_value(&plan)?;
        let job_id = self.client.submit_job(serialized).await?;
        let handle = JobHandle::new();
        debug!(job = %handle, backend_job = %job_id, "submitted plan to cluster");
        self.jobs.lock().await.insert(handle.clone(), job_id);
        Ok(handle)
    }

    async fn status(&self, handle: &JobHandle) -> Result<JobStatus> {
        let job_id = self.job_id(handle).await?;
        let status = match self.client.poll(&job_id).await? {
            ClusterJobState::Pending | ClusterJobState::Running => JobStatus::Running,
            ClusterJobState::Finished => JobStatus::Succeeded,
            ClusterJobState::Failed(reason) => JobStatus::Failed { reason },
        };
        Ok(status)
    }

    async fn cancel(&self, handle: &JobHandle) -> Result<()> {
        let job_id = self.job_id(handle).await?;
        self.client.cancel(&job_id).await
    }

    async fn take_output(&self, handle: &JobHandle) -> Result<ExecutionOutput> {
        let job_id = self.job_id(handle).await?;
        let serialized = self.client.fetch(&job_id).await?;
        let output: ExecutionOutput = serde_json::from_value(serialized)?;
        self.jobs.lock().await.remove(handle);
        Ok(output)
    }
}

/// Reference transport: runs plans on the in-process engine behind
/// asynchronous job bookkeeping.
///
/// The first poll of a job reports it running; the next poll executes and
/// reports it finished, so callers exercise the full submit-and-poll path.
pub struct LoopbackClient {
    engine: Engine,
    jobs: Mutex<HashMap<String, LoopbackJob>>,
    next_id: Mutex<u64>,
}

struct LoopbackJob {
    plan: serde_json::Value,
    polls: u32,
    result: Option<std::result::Result<ExecutionOutput, String>>,
    cancelled: bool,
}

impl LoopbackClient {
    pub fn new(provider: Arc<dyn SourceProvider>) -> Self {
        Self {
            engine: Engine::new(provider),
            jobs: Mutex::new(HashMap::new()),
            next_id: Mutex::new(0),
        }
    }
}

#[async_trait]
impl ClusterClient for LoopbackClient {
    async fn submit_job(&self, plan: serde_json::Value) -> Result<String> {
        let mut next_id = self.next_id.lock().await;
        *next_id += 1;
        let job_id = format!("loopback-{}", next_id);
        self.jobs.lock().await.insert(
            job_id.clone(),
            LoopbackJob {
                plan,
                polls: 0,
                result: None,
                cancelled: false,
            },
        );
        Ok(job_id)
    }

    async fn poll(&self, job_id: &str) -> Result<ClusterJobState> {
        let mut jobs = self.jobs.lock().await;
        let job = jobs
            .get_mut(job_id)
            .ok_or_else(|| RuntimeError::UnknownJob(job_id.to_string()))?;

        if job.cancelled {
            return Ok(ClusterJobState::Failed("cancelled".to_string()));
        }

        job.polls += 1;
        if job.polls == 1 {
            return Ok(ClusterJobState::Running);
        }

        if job.result.is_none() {
            let plan: ExecutionPlan = serde_json::from_value(job.plan.clone())?;
            job.result = Some(self.engine.execute(&plan).map_err(|e| e.to_string()));
        }
        match &job.result {
            Some(Ok(_)) => Ok(ClusterJobState::Finished),
            Some(Err(reason)) => Ok(ClusterJobState::Failed(reason.clone())),
            None => Ok(ClusterJobState::Running),
        }
    }

    async fn fetch(&self, job_id: &str) -> Result<serde_json::Value> {
        let jobs = self.jobs.lock().await;
        let job = jobs
            .get(job_id)
            .ok_or_else(|| RuntimeError::UnknownJob(job_id.to_string()))?;
        match &job.result {
            Some(Ok(output)) => Ok(serde_json::to_value(output)?),
            Some(Err(reason)) => Err(RuntimeError::Execution(reason.clone())),
            None => Err(RuntimeError::Execution(format!(
                "job {} has not finished",
                job_id
            ))),
        }
    }

    async fn cancel(&self, job_id: &str) -> Result<()> {
        let mut jobs = self.jobs.lock().await;
        if let Some(job) = jobs.get_mut(job_id) {
            if job.result.is_none() {
                job.cancelled = true;
            }
        }
        Ok(())
    }
}
