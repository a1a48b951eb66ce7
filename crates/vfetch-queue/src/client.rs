//! Submit jobs and poll their status.

use std::sync::Arc;

use tracing::info;

use vfetch_models::{JobId, JobSnapshot};

use crate::broker::JobBroker;
use crate::error::QueueResult;
use crate::job::QueueJob;
use crate::status::StatusStore;

/// Submit/poll facade used by the request layer.
#[derive(Clone)]
pub struct JobClient {
    broker: Arc<dyn JobBroker>,
    store: Arc<dyn StatusStore>,
}

impl JobClient {
    pub fn new(broker: Arc<dyn JobBroker>, store: Arc<dyn StatusStore>) -> Self {
        Self { broker, store }
    }

    /// Record the job as `PENDING`, publish it and return its handle.
    ///
    /// Returns as soon as the job is on the broker; execution happens on a
    /// worker.
    pub async fn submit(&self, job: QueueJob) -> QueueResult<JobId> {
        let job_id = job.job_id().clone();
        let snapshot = JobSnapshot::new(job_id.clone(), job.kind());

        self.store.put(&snapshot).await?;
        self.broker.publish(&job).await?;

        info!(job_id = %job_id, kind = %job.kind(), "Job submitted");
        Ok(job_id)
    }

    /// Latest snapshot for a handle; unknown handles read as `PENDING`.
    pub async fn status(&self, job_id: &JobId) -> QueueResult<JobSnapshot> {
        Ok(self
            .store
            .get(job_id)
            .await?
            .unwrap_or_else(|| JobSnapshot::unknown(job_id.clone())))
    }

    /// Check broker and store connectivity.
    pub async fn ping(&self) -> QueueResult<()> {
        self.store.ping().await?;
        self.broker.len().await?;
        Ok(())
    }

    pub fn broker(&self) -> &Arc<dyn JobBroker> {
        &self.broker
    }

    pub fn store(&self) -> &Arc<dyn StatusStore> {
        &self.store
    }
}
