//! End-to-end job lifecycle tests over the in-memory broker and store.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use vfetch_models::{JobId, JobKind, JobProgress, JobState, ProgressSink};
use vfetch_queue::{
    DownloadJob, InMemoryBroker, InMemoryStatusStore, JobBroker, JobClient, LookupJob, QueueJob,
    SceneDetectionJob, StatusStore,
};
use vfetch_worker::{
    JobContext, JobExecutor, JobHandler, JobObserver, JobRunner, RetryPolicy, RunOutcome,
    WorkerConfig, WorkerError, WorkerResult,
};

/// Fails the first `failures` calls, then succeeds with `{"ok": true}`.
struct ScriptedHandler {
    failures: u32,
    calls: AtomicU32,
    stall: Option<Duration>,
}

impl ScriptedHandler {
    fn failing(failures: u32) -> Self {
        Self {
            failures,
            calls: AtomicU32::new(0),
            stall: None,
        }
    }

    fn stalling(stall: Duration) -> Self {
        Self {
            failures: 0,
            calls: AtomicU32::new(0),
            stall: Some(stall),
        }
    }

    fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl JobHandler for ScriptedHandler {
    async fn handle(&self, job: &QueueJob, progress: &dyn ProgressSink) -> WorkerResult<Value> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        progress.report(JobProgress::percent(10));

        if let Some(stall) = self.stall {
            tokio::time::sleep(stall).await;
        }
        if let QueueJob::SceneDetection(j) = job {
            let _: vfetch_models::DetectionMethod = j.method.parse()?;
        }
        if call < self.failures {
            return Err(WorkerError::job_failed(format!("transient failure {}", call + 1)));
        }

        progress.report(JobProgress::percent(100));
        Ok(json!({"status": "success", "ok": true}))
    }
}

#[derive(Default)]
struct CountingObserver {
    events: Mutex<Vec<String>>,
}

impl CountingObserver {
    fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }
}

impl JobObserver for CountingObserver {
    fn on_success(&self, ctx: &JobContext) {
        self.events.lock().unwrap().push(format!("success:{}", ctx.attempt));
    }

    fn on_failure(&self, ctx: &JobContext, _error: &str) {
        self.events.lock().unwrap().push(format!("failure:{}", ctx.attempt));
    }

    fn on_retry(&self, ctx: &JobContext, _error: &str, _delay: Duration) {
        self.events.lock().unwrap().push(format!("retry:{}", ctx.attempt));
    }
}

struct Harness {
    broker: Arc<InMemoryBroker>,
    store: Arc<InMemoryStatusStore>,
    client: JobClient,
    observer: Arc<CountingObserver>,
}

impl Harness {
    fn new() -> Self {
        let broker = Arc::new(InMemoryBroker::new());
        let store = Arc::new(InMemoryStatusStore::new());
        let client = JobClient::new(broker.clone(), store.clone());
        Self {
            broker,
            store,
            client,
            observer: Arc::new(CountingObserver::default()),
        }
    }

    fn runner(&self, handler: Arc<dyn JobHandler>) -> JobRunner {
        JobRunner::new(handler, self.broker.clone(), self.store.clone())
            .with_observer(self.observer.clone())
            .with_retry_base_delay(Duration::from_millis(5))
    }

    /// Consume and run deliveries until nothing is left to do.
    async fn drain(&self, runner: &JobRunner) -> Vec<RunOutcome> {
        let mut outcomes = Vec::new();
        for _ in 0..50 {
            let deliveries = self.broker.consume("test", 10, 10).await.unwrap();
            if deliveries.is_empty() {
                if self.broker.scheduled() == 0 {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
                self.broker.promote_due().await.unwrap();
                continue;
            }
            for delivery in deliveries {
                outcomes.push(runner.run(&delivery).await.unwrap());
            }
        }
        outcomes
    }
}

#[tokio::test]
async fn test_success_is_terminal_and_stable() {
    let harness = Harness::new();
    let handler = Arc::new(ScriptedHandler::failing(0));
    let runner = harness.runner(handler.clone());

    let job_id = harness
        .client
        .submit(QueueJob::VideoInfo(LookupJob::new("https://youtu.be/a")))
        .await
        .unwrap();

    let outcomes = harness.drain(&runner).await;
    assert_eq!(outcomes, vec![RunOutcome::Succeeded]);

    let first = harness.client.status(&job_id).await.unwrap();
    let second = harness.client.status(&job_id).await.unwrap();
    assert_eq!(first.state, JobState::Success);
    assert_eq!(first.result.as_ref().unwrap()["ok"], true);
    assert_eq!(first, second);
    assert_eq!(harness.observer.events(), vec!["success:0"]);
    assert_eq!(harness.broker.in_flight(), 0);
}

#[tokio::test]
async fn test_retry_backoff_then_failure() {
    let harness = Harness::new();
    let handler = Arc::new(ScriptedHandler::failing(u32::MAX));
    let runner = harness
        .runner(handler.clone())
        .with_policy(JobKind::Search, RetryPolicy::new(3, Duration::from_millis(5)));

    let job_id = harness
        .client
        .submit(QueueJob::Search(vfetch_queue::SearchJob::new(
            vfetch_models::SearchRequest::manual("gols"),
        )))
        .await
        .unwrap();

    let outcomes = harness.drain(&runner).await;
    assert_eq!(handler.calls(), 4);

    let delays: Vec<Duration> = outcomes
        .iter()
        .filter_map(|o| match o {
            RunOutcome::Retrying { delay } => Some(*delay),
            _ => None,
        })
        .collect();
    assert_eq!(delays.len(), 3);
    assert!(delays.windows(2).all(|w| w[0] < w[1]));
    assert!(matches!(outcomes.last(), Some(RunOutcome::Failed { .. })));

    let snapshot = harness.client.status(&job_id).await.unwrap();
    assert_eq!(snapshot.state, JobState::Failure);
    assert_eq!(snapshot.attempts, 4);
    assert!(snapshot.error.unwrap().contains("transient failure 4"));
    assert_eq!(harness.broker.dead_letters().len(), 1);
    assert_eq!(
        harness.observer.events(),
        vec!["retry:0", "retry:1", "retry:2", "failure:3"]
    );
}

#[tokio::test]
async fn test_retry_recovers() {
    let harness = Harness::new();
    let handler = Arc::new(ScriptedHandler::failing(1));
    let runner = harness.runner(handler.clone());

    let job_id = harness
        .client
        .submit(QueueJob::Download(DownloadJob::new("https://youtu.be/a")))
        .await
        .unwrap();

    harness.drain(&runner).await;

    let snapshot = harness.client.status(&job_id).await.unwrap();
    assert_eq!(snapshot.state, JobState::Success);
    assert_eq!(snapshot.attempts, 2);
    assert!(snapshot.error.is_none());
    assert_eq!(harness.observer.events(), vec!["retry:0", "success:1"]);
}

#[tokio::test]
async fn test_invalid_detection_method_fails_without_retry() {
    let harness = Harness::new();
    let handler = Arc::new(ScriptedHandler::failing(0));
    let runner = harness
        .runner(handler.clone())
        .with_policy(JobKind::SceneDetection, RetryPolicy::new(3, Duration::from_millis(5)));

    let job_id = harness
        .client
        .submit(QueueJob::SceneDetection(SceneDetectionJob::new(
            "/tmp/video_uploads/a.mp4",
            "histogram",
        )))
        .await
        .unwrap();

    let outcomes = harness.drain(&runner).await;
    assert_eq!(outcomes.len(), 1);
    assert_eq!(handler.calls(), 1);

    let snapshot = harness.client.status(&job_id).await.unwrap();
    assert_eq!(snapshot.state, JobState::Failure);
    assert!(snapshot.error.unwrap().contains("histogram"));
}

#[tokio::test]
async fn test_soft_time_limit_aborts_attempt() {
    let harness = Harness::new();
    let handler = Arc::new(ScriptedHandler::stalling(Duration::from_secs(5)));
    let runner = harness
        .runner(handler.clone())
        .with_time_limits(Duration::from_millis(20), Duration::from_secs(1));

    let job_id = harness
        .client
        .submit(QueueJob::Formats(LookupJob::new("https://youtu.be/a")))
        .await
        .unwrap();

    let outcomes = harness.drain(&runner).await;
    assert_eq!(outcomes.len(), 1);

    let snapshot = harness.client.status(&job_id).await.unwrap();
    assert_eq!(snapshot.state, JobState::Failure);
    assert!(snapshot.error.unwrap().contains("Soft time limit"));
}

#[tokio::test]
async fn test_hard_time_limit_fails_without_retry() {
    let harness = Harness::new();
    let handler = Arc::new(ScriptedHandler::stalling(Duration::from_secs(5)));
    let runner = harness
        .runner(handler.clone())
        .with_time_limits(Duration::from_secs(10), Duration::from_millis(20));

    let job_id = harness
        .client
        .submit(QueueJob::Download(DownloadJob::new("https://youtu.be/a")))
        .await
        .unwrap();

    harness.drain(&runner).await;

    assert_eq!(handler.calls(), 1);
    let snapshot = harness.client.status(&job_id).await.unwrap();
    assert_eq!(snapshot.state, JobState::Failure);
    assert!(snapshot.error.unwrap().contains("Hard time limit"));
}

#[tokio::test]
async fn test_redelivered_terminal_job_is_skipped() {
    let harness = Harness::new();
    let handler = Arc::new(ScriptedHandler::failing(0));
    let runner = harness.runner(handler.clone());

    let job = QueueJob::VideoInfo(LookupJob::new("https://youtu.be/a"));
    let job_id = harness.client.submit(job.clone()).await.unwrap();
    harness.drain(&runner).await;
    let done = harness.client.status(&job_id).await.unwrap();

    harness.broker.publish(&job).await.unwrap();
    let outcomes = harness.drain(&runner).await;

    assert_eq!(outcomes, vec![RunOutcome::Skipped]);
    assert_eq!(handler.calls(), 1);
    assert_eq!(harness.client.status(&job_id).await.unwrap(), done);
}

#[tokio::test]
async fn test_progress_is_visible_while_running() {
    let harness = Harness::new();
    let handler = Arc::new(ScriptedHandler::stalling(Duration::from_millis(200)));
    let runner = Arc::new(harness.runner(handler.clone()));

    let job_id = harness
        .client
        .submit(QueueJob::Download(DownloadJob::new("https://youtu.be/a")))
        .await
        .unwrap();
    let delivery = harness.broker.consume("test", 10, 1).await.unwrap().remove(0);

    let background = Arc::clone(&runner);
    let task = tokio::spawn(async move { background.run(&delivery).await });

    tokio::time::sleep(Duration::from_millis(100)).await;
    let running = harness.client.status(&job_id).await.unwrap();
    assert_eq!(running.state, JobState::Progress);
    assert_eq!(running.progress.map(|p| p.current), Some(10));

    assert_eq!(task.await.unwrap().unwrap(), RunOutcome::Succeeded);
    let done = harness.store.get(&job_id).await.unwrap().unwrap();
    assert_eq!(done.state, JobState::Success);
}

#[tokio::test]
async fn test_executor_runs_submitted_jobs() {
    let harness = Harness::new();
    let handler = Arc::new(ScriptedHandler::failing(0));
    let runner = harness.runner(handler.clone());

    let config = WorkerConfig {
        max_concurrent_jobs: 2,
        shutdown_timeout: Duration::from_secs(5),
        ..Default::default()
    };
    let executor = Arc::new(JobExecutor::new(config, harness.broker.clone(), runner));

    let ids: Vec<JobId> = {
        let mut ids = Vec::new();
        for i in 0..3 {
            let job = QueueJob::VideoInfo(LookupJob::new(format!("https://youtu.be/{}", i)));
            ids.push(harness.client.submit(job).await.unwrap());
        }
        ids
    };

    let running = Arc::clone(&executor);
    let task = tokio::spawn(async move { running.run().await });

    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        let mut done = 0;
        for id in &ids {
            if harness.client.status(id).await.unwrap().state == JobState::Success {
                done += 1;
            }
        }
        if done == ids.len() {
            break;
        }
        assert!(tokio::time::Instant::now() < deadline, "jobs did not finish");
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    executor.shutdown();
    task.await.unwrap().unwrap();
    assert_eq!(handler.calls(), 3);
}
