//! Progress payloads and the sink orchestrators report into.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Progress snapshot for a running job.
///
/// Each report replaces the previous one; pollers only ever see the latest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct JobProgress {
    pub current: u64,
    pub total: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Job-type specific fields (speed, eta, url, ...)
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl JobProgress {
    pub fn new(current: u64, total: u64) -> Self {
        Self {
            current,
            total,
            message: None,
            extra: Map::new(),
        }
    }

    /// Progress on a 0-100 scale.
    pub fn percent(current: u64) -> Self {
        Self::new(current.min(100), 100)
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }
}

/// Receives progress reports from a running operation.
///
/// Implementations must not block: the caller is usually in the middle of
/// streaming subprocess output.
pub trait ProgressSink: Send + Sync {
    fn report(&self, progress: JobProgress);
}

/// Sink that drops every report.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopProgress;

impl ProgressSink for NoopProgress {
    fn report(&self, _progress: JobProgress) {}
}
