//! Progress reporting into the status store.
//!
//! Orchestrators report synchronously through [`ProgressSink`]; a background
//! task coalesces reports (last write wins) and persists them, so a slow
//! store never stalls the job.

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::warn;

use vfetch_models::{JobProgress, JobSnapshot, ProgressSink};

use crate::error::{QueueError, QueueResult};
use crate::status::StatusStore;

/// Sink half: cheap, non-blocking, usable from sync code.
pub struct StoreProgressSink {
    tx: watch::Sender<Option<JobProgress>>,
}

impl ProgressSink for StoreProgressSink {
    fn report(&self, progress: JobProgress) {
        self.tx.send_replace(Some(progress));
    }
}

/// Writer half: owns the job snapshot while the job runs.
pub struct ProgressWriter {
    handle: JoinHandle<JobSnapshot>,
}

impl ProgressWriter {
    /// Wait for the last report to be written and take the snapshot back.
    ///
    /// The paired sink must be dropped first.
    pub async fn finish(self) -> QueueResult<JobSnapshot> {
        self.handle
            .await
            .map_err(|e| QueueError::status_store(format!("progress writer failed: {}", e)))
    }
}

/// Start a progress writer for `snapshot`.
pub fn progress_channel(
    store: Arc<dyn StatusStore>,
    mut snapshot: JobSnapshot,
) -> (StoreProgressSink, ProgressWriter) {
    let (tx, mut rx) = watch::channel(None::<JobProgress>);

    let handle = tokio::spawn(async move {
        // Ends once the sink is dropped and the last value was seen
        while rx.changed().await.is_ok() {
            let latest = rx.borrow_and_update().clone();
            if let Some(progress) = latest {
                if !snapshot.set_progress(progress) {
                    continue;
                }
                if let Err(e) = store.put(&snapshot).await {
                    warn!(job_id = %snapshot.job_id, "Failed to persist progress: {}", e);
                }
            }
        }
        snapshot
    });

    (StoreProgressSink { tx }, ProgressWriter { handle })
}
