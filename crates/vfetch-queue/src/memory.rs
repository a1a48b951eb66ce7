//! In-process broker and status store.
//!
//! Used by tests and single-process development setups; both implement the
//! same contracts as the Redis versions.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::Notify;

use vfetch_models::{JobId, JobSnapshot};

use crate::broker::{Delivery, JobBroker};
use crate::error::{QueueError, QueueResult};
use crate::job::QueueJob;
use crate::status::StatusStore;

#[derive(Default)]
struct BrokerState {
    next_id: u64,
    ready: VecDeque<Delivery>,
    delayed: Vec<(Instant, QueueJob)>,
    pending: HashMap<String, (QueueJob, Instant)>,
    dead: Vec<(QueueJob, String)>,
}

/// Broker keeping every queue in memory.
#[derive(Default)]
pub struct InMemoryBroker {
    state: Mutex<BrokerState>,
    notify: Notify,
}

impl InMemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> QueueResult<std::sync::MutexGuard<'_, BrokerState>> {
        self.state
            .lock()
            .map_err(|_| QueueError::dequeue_failed("broker state poisoned"))
    }

    /// Jobs parked on the dead letter queue with their errors.
    pub fn dead_letters(&self) -> Vec<(QueueJob, String)> {
        self.lock().map(|s| s.dead.clone()).unwrap_or_default()
    }

    /// Deliveries handed out and not yet acknowledged.
    pub fn in_flight(&self) -> usize {
        self.lock().map(|s| s.pending.len()).unwrap_or_default()
    }

    /// Jobs waiting for their retry delay.
    pub fn scheduled(&self) -> usize {
        self.lock().map(|s| s.delayed.len()).unwrap_or_default()
    }

    fn take_ready(&self, count: usize) -> QueueResult<Vec<Delivery>> {
        let mut state = self.lock()?;
        let take = count.min(state.ready.len());
        let batch: Vec<Delivery> = state.ready.drain(..take).collect();
        for delivery in &batch {
            state
                .pending
                .insert(delivery.id.clone(), (delivery.job.clone(), Instant::now()));
        }
        Ok(batch)
    }
}

#[async_trait]
impl JobBroker for InMemoryBroker {
    async fn init(&self) -> QueueResult<()> {
        Ok(())
    }

    async fn publish(&self, job: &QueueJob) -> QueueResult<String> {
        let id = {
            let mut state = self.lock()?;
            state.next_id += 1;
            let id = format!("{}-0", state.next_id);
            state.ready.push_back(Delivery {
                id: id.clone(),
                job: job.clone(),
            });
            id
        };
        self.notify.notify_waiters();
        Ok(id)
    }

    async fn schedule(&self, job: &QueueJob, delay: Duration) -> QueueResult<()> {
        self.lock()?.delayed.push((Instant::now() + delay, job.clone()));
        Ok(())
    }

    async fn promote_due(&self) -> QueueResult<usize> {
        let now = Instant::now();
        let due: Vec<QueueJob> = {
            let mut state = self.lock()?;
            let (due, waiting): (Vec<_>, Vec<_>) =
                state.delayed.drain(..).partition(|(at, _)| *at <= now);
            state.delayed = waiting;
            due.into_iter().map(|(_, job)| job).collect()
        };

        for job in &due {
            self.publish(job).await?;
        }
        Ok(due.len())
    }

    async fn consume(
        &self,
        _consumer: &str,
        block_ms: u64,
        count: usize,
    ) -> QueueResult<Vec<Delivery>> {
        let notified = self.notify.notified();
        let batch = self.take_ready(count)?;
        if !batch.is_empty() {
            return Ok(batch);
        }

        let _ = tokio::time::timeout(Duration::from_millis(block_ms), notified).await;
        self.take_ready(count)
    }

    async fn claim_stale(
        &self,
        _consumer: &str,
        min_idle_ms: u64,
        count: usize,
    ) -> QueueResult<Vec<Delivery>> {
        let min_idle = Duration::from_millis(min_idle_ms);
        let mut state = self.lock()?;
        let mut claimed = Vec::new();

        for (id, (job, since)) in state.pending.iter_mut() {
            if claimed.len() >= count {
                break;
            }
            if since.elapsed() >= min_idle {
                *since = Instant::now();
                claimed.push(Delivery {
                    id: id.clone(),
                    job: job.clone(),
                });
            }
        }
        Ok(claimed)
    }

    async fn ack(&self, delivery_id: &str) -> QueueResult<()> {
        self.lock()?.pending.remove(delivery_id);
        Ok(())
    }

    async fn dead_letter(
        &self,
        delivery_id: &str,
        job: &QueueJob,
        error: &str,
    ) -> QueueResult<()> {
        let mut state = self.lock()?;
        state.dead.push((job.clone(), error.to_string()));
        state.pending.remove(delivery_id);
        Ok(())
    }

    async fn len(&self) -> QueueResult<u64> {
        Ok(self.lock()?.ready.len() as u64)
    }
}

/// Status store keeping snapshots in a map.
#[derive(Default)]
pub struct InMemoryStatusStore {
    snapshots: Mutex<HashMap<JobId, JobSnapshot>>,
}

impl InMemoryStatusStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StatusStore for InMemoryStatusStore {
    async fn put(&self, snapshot: &JobSnapshot) -> QueueResult<bool> {
        let mut snapshots = self
            .snapshots
            .lock()
            .map_err(|_| QueueError::status_store("status map poisoned"))?;

        if snapshots
            .get(&snapshot.job_id)
            .is_some_and(|current| current.is_terminal())
        {
            return Ok(false);
        }
        snapshots.insert(snapshot.job_id.clone(), snapshot.clone());
        Ok(true)
    }

    async fn get(&self, job_id: &JobId) -> QueueResult<Option<JobSnapshot>> {
        let snapshots = self
            .snapshots
            .lock()
            .map_err(|_| QueueError::status_store("status map poisoned"))?;
        Ok(snapshots.get(job_id).cloned())
    }

    async fn ping(&self) -> QueueResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::DownloadJob;
    use serde_json::json;
    use vfetch_models::JobKind;

    #[tokio::test]
    async fn test_publish_consume_ack() {
        let broker = InMemoryBroker::new();
        let job = QueueJob::Download(DownloadJob::new("https://youtu.be/a"));
        broker.publish(&job).await.unwrap();

        let deliveries = broker.consume("c1", 10, 5).await.unwrap();
        assert_eq!(deliveries.len(), 1);
        assert_eq!(deliveries[0].job.job_id(), job.job_id());
        assert_eq!(broker.in_flight(), 1);

        broker.ack(&deliveries[0].id).await.unwrap();
        assert_eq!(broker.in_flight(), 0);
        assert!(broker.consume("c1", 10, 5).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_scheduled_job_waits_for_delay() {
        let broker = InMemoryBroker::new();
        let job = QueueJob::Download(DownloadJob::new("https://youtu.be/a"));
        broker.schedule(&job, Duration::from_millis(30)).await.unwrap();

        assert_eq!(broker.promote_due().await.unwrap(), 0);
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(broker.promote_due().await.unwrap(), 1);
        assert_eq!(broker.len().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_store_refuses_to_overwrite_terminal() {
        let store = InMemoryStatusStore::new();
        let mut snapshot = JobSnapshot::new(JobId::new(), JobKind::Search);
        snapshot.start_attempt();
        snapshot.succeed(json!({"status": "success"}));
        assert!(store.put(&snapshot).await.unwrap());

        let mut stale = JobSnapshot::new(snapshot.job_id.clone(), JobKind::Search);
        stale.start_attempt();
        assert!(!store.put(&stale).await.unwrap());

        let stored = store.get(&snapshot.job_id).await.unwrap().unwrap();
        assert_eq!(stored, snapshot);
    }
}
