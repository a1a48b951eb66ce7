//! Job status snapshot stored against a handle and returned to pollers.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::job::{JobId, JobKind, JobState};
use crate::progress::JobProgress;

/// Hint attached to snapshots for handles the store has never seen.
pub const UNKNOWN_TASK_HINT: &str = "Task is unknown or still pending";

/// Latest known state of a job.
///
/// Mutators return `false` and leave the snapshot untouched once the job
/// reached `SUCCESS` or `FAILURE`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct JobSnapshot {
    pub job_id: JobId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<JobKind>,
    pub state: JobState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<JobProgress>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
    /// Attempts started so far
    #[serde(default)]
    pub attempts: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Monotonic counter bumped on every accepted update
    #[serde(default)]
    pub event_seq: u64,
}

impl JobSnapshot {
    /// Snapshot for a freshly submitted job.
    pub fn new(job_id: JobId, kind: JobKind) -> Self {
        let now = Utc::now();
        Self {
            job_id,
            kind: Some(kind),
            state: JobState::Pending,
            progress: None,
            result: None,
            error: None,
            hint: None,
            attempts: 0,
            created_at: now,
            updated_at: now,
            event_seq: 0,
        }
    }

    /// Snapshot returned for a handle with no stored state.
    pub fn unknown(job_id: JobId) -> Self {
        let now = Utc::now();
        Self {
            job_id,
            kind: None,
            state: JobState::Pending,
            progress: None,
            result: None,
            error: None,
            hint: Some(UNKNOWN_TASK_HINT.to_string()),
            attempts: 0,
            created_at: now,
            updated_at: now,
            event_seq: 0,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
        self.event_seq += 1;
    }

    /// Mark the start of an attempt.
    pub fn start_attempt(&mut self) -> bool {
        if self.is_terminal() {
            return false;
        }
        self.state = JobState::Progress;
        self.attempts += 1;
        self.error = None;
        self.touch();
        true
    }

    /// Replace the progress payload.
    pub fn set_progress(&mut self, progress: JobProgress) -> bool {
        if self.is_terminal() {
            return false;
        }
        self.state = JobState::Progress;
        self.progress = Some(progress);
        self.touch();
        true
    }

    /// Record a failed attempt that will be retried.
    pub fn mark_retry(&mut self, error: impl Into<String>) -> bool {
        if self.is_terminal() {
            return false;
        }
        self.state = JobState::Retry;
        self.error = Some(error.into());
        self.touch();
        true
    }

    /// Mark the job as successfully completed.
    pub fn succeed(&mut self, result: Value) -> bool {
        if self.is_terminal() {
            return false;
        }
        self.state = JobState::Success;
        self.result = Some(result);
        self.error = None;
        self.touch();
        true
    }

    /// Mark the job as failed with an error message.
    pub fn fail(&mut self, error: impl Into<String>) -> bool {
        if self.is_terminal() {
            return false;
        }
        self.state = JobState::Failure;
        self.error = Some(error.into());
        self.touch();
        true
    }
}
