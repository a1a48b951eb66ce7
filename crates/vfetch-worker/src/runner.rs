//! One delivery, start to finish.
//!
//! The runner owns the job state machine on the worker side:
//! `PROGRESS` on start, progress updates while the handler runs, then
//! `SUCCESS`, `RETRY` (re-published after a backoff) or `FAILURE` (parked on
//! the dead letter queue). A job that is already terminal is acked and
//! skipped, so redeliveries never reopen it.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, Instrument};

use vfetch_models::{JobKind, JobSnapshot};
use vfetch_queue::{progress_channel, Delivery, JobBroker, StatusStore, StoreProgressSink};

use crate::error::{WorkerError, WorkerResult};
use crate::logging::JobLogger;
use crate::metrics;
use crate::observer::{JobContext, JobObserver};
use crate::processor::JobHandler;
use crate::retry::{RetryDecision, RetryPolicy};

/// What happened to a delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Succeeded,
    Retrying { delay: Duration },
    Failed { error: String },
    /// Job was already terminal.
    Skipped,
}

pub struct JobRunner {
    handler: Arc<dyn JobHandler>,
    broker: Arc<dyn JobBroker>,
    store: Arc<dyn StatusStore>,
    observers: Vec<Arc<dyn JobObserver>>,
    retry_base_delay: Duration,
    policies: HashMap<JobKind, RetryPolicy>,
    soft_time_limit: Duration,
    hard_time_limit: Duration,
}

impl JobRunner {
    pub fn new(
        handler: Arc<dyn JobHandler>,
        broker: Arc<dyn JobBroker>,
        store: Arc<dyn StatusStore>,
    ) -> Self {
        Self {
            handler,
            broker,
            store,
            observers: Vec::new(),
            retry_base_delay: Duration::from_secs(1),
            policies: HashMap::new(),
            soft_time_limit: Duration::from_secs(25 * 60),
            hard_time_limit: Duration::from_secs(30 * 60),
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn JobObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    pub fn with_retry_base_delay(mut self, delay: Duration) -> Self {
        self.retry_base_delay = delay;
        self
    }

    /// Override the retry policy of one job kind.
    pub fn with_policy(mut self, kind: JobKind, policy: RetryPolicy) -> Self {
        self.policies.insert(kind, policy);
        self
    }

    pub fn with_time_limits(mut self, soft: Duration, hard: Duration) -> Self {
        self.soft_time_limit = soft;
        self.hard_time_limit = hard;
        self
    }

    pub fn policy_for(&self, kind: JobKind) -> RetryPolicy {
        self.policies
            .get(&kind)
            .cloned()
            .unwrap_or_else(|| RetryPolicy::for_kind(kind, self.retry_base_delay))
    }

    /// Process one delivery.
    ///
    /// Errors are infrastructure failures (store or broker unreachable); the
    /// delivery is then left unacknowledged for another worker to claim.
    pub async fn run(&self, delivery: &Delivery) -> WorkerResult<RunOutcome> {
        let job = &delivery.job;
        let kind = job.kind();
        let attempt = job.attempt();
        let logger = JobLogger::new(job.job_id(), kind, attempt);

        self.run_inner(delivery, kind, attempt, &logger)
            .instrument(logger.create_span())
            .await
    }

    async fn run_inner(
        &self,
        delivery: &Delivery,
        kind: JobKind,
        attempt: u32,
        logger: &JobLogger,
    ) -> WorkerResult<RunOutcome> {
        let job = &delivery.job;
        let mut snapshot = self
            .store
            .get(job.job_id())
            .await?
            .unwrap_or_else(|| JobSnapshot::new(job.job_id().clone(), kind));

        if snapshot.is_terminal() {
            logger.log_warning(&format!(
                "already {}, skipping redelivery",
                snapshot.state
            ));
            self.broker.ack(&delivery.id).await?;
            return Ok(RunOutcome::Skipped);
        }

        snapshot.start_attempt();
        self.store.put(&snapshot).await?;
        metrics::record_job_started(kind);
        logger.log_start(&format!("attempt {}", attempt + 1));

        let started = Instant::now();
        let (sink, writer) = progress_channel(Arc::clone(&self.store), snapshot);
        let result = self.execute(delivery, &sink).await;
        drop(sink);
        let mut snapshot = writer.finish().await?;
        if let Some(progress) = &snapshot.progress {
            logger.log_progress(&format!(
                "last report {}/{} after {:.1}s",
                progress.current,
                progress.total,
                started.elapsed().as_secs_f64()
            ));
        }

        let ctx = JobContext {
            job_id: job.job_id().clone(),
            kind,
            attempt,
            elapsed: started.elapsed(),
        };

        match result {
            Ok(value) => {
                snapshot.succeed(value);
                self.store.put(&snapshot).await?;
                self.broker.ack(&delivery.id).await?;
                self.notify(|o| o.on_success(&ctx));
                Ok(RunOutcome::Succeeded)
            }
            Err(err) => {
                let message = err.to_string();
                match self.policy_for(kind).decide(attempt, &err) {
                    RetryDecision::Retry { delay } => {
                        snapshot.mark_retry(message.clone());
                        self.store.put(&snapshot).await?;
                        self.broker.schedule(&job.next_attempt(), delay).await?;
                        self.broker.ack(&delivery.id).await?;
                        self.notify(|o| o.on_retry(&ctx, &message, delay));
                        Ok(RunOutcome::Retrying { delay })
                    }
                    RetryDecision::Fail => {
                        snapshot.fail(message.clone());
                        self.store.put(&snapshot).await?;
                        self.broker
                            .dead_letter(&delivery.id, job, &message)
                            .await?;
                        self.notify(|o| o.on_failure(&ctx, &message));
                        Ok(RunOutcome::Failed { error: message })
                    }
                }
            }
        }
    }

    /// Run the handler under both time limits.
    ///
    /// Hitting the soft limit aborts the attempt as a retryable failure; the
    /// hard limit fails the job outright.
    async fn execute(
        &self,
        delivery: &Delivery,
        sink: &StoreProgressSink,
    ) -> WorkerResult<serde_json::Value> {
        let attempt = tokio::time::timeout(
            self.soft_time_limit,
            self.handler.handle(&delivery.job, sink),
        );

        match tokio::time::timeout(self.hard_time_limit, attempt).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(WorkerError::SoftTimeLimit(self.soft_time_limit.as_secs())),
            Err(_) => Err(WorkerError::HardTimeLimit(self.hard_time_limit.as_secs())),
        }
    }

    fn notify(&self, hook: impl Fn(&dyn JobObserver)) {
        for observer in &self.observers {
            hook(observer.as_ref());
        }
        debug!(observers = self.observers.len(), "Observers notified");
    }
}
