//! Job identifiers and lifecycle states.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Unique identifier for a job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    /// Generate a new random job ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Job state as seen by pollers.
///
/// `Retry` is runner-internal: the job failed an attempt and is waiting
/// for its backoff delay before being re-published.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobState {
    /// Submitted, not yet picked up by a worker
    #[default]
    Pending,
    /// A worker is executing the job
    Progress,
    /// Waiting for a backoff delay before the next attempt
    Retry,
    /// Completed with a result
    Success,
    /// Failed permanently
    Failure,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Pending => "PENDING",
            JobState::Progress => "PROGRESS",
            JobState::Retry => "RETRY",
            JobState::Success => "SUCCESS",
            JobState::Failure => "FAILURE",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Success | JobState::Failure)
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Type of job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    /// Platform search (manual or automatic)
    Search,
    /// Single video download
    Download,
    /// Sequential download of a URL list
    BatchDownload,
    /// Metadata lookup for one URL
    VideoInfo,
    /// Available format listing for one URL
    Formats,
    /// Scene boundary detection on a staged upload
    SceneDetection,
}

impl JobKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::Search => "search",
            JobKind::Download => "download",
            JobKind::BatchDownload => "batch_download",
            JobKind::VideoInfo => "video_info",
            JobKind::Formats => "formats",
            JobKind::SceneDetection => "scene_detection",
        }
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
