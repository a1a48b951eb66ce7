//! Shared data models for the vfetch job system.
//!
//! This crate provides Serde-serializable types for:
//! - Job identifiers, states and status snapshots
//! - Progress payloads and the progress sink seam
//! - Search, download, format and scene payloads
//! - Batch accounting and per-job result envelopes

pub mod batch;
pub mod error;
pub mod job;
pub mod progress;
pub mod result;
pub mod scene;
pub mod search;
pub mod snapshot;
pub mod video;

pub use batch::{BatchItemError, BatchResult};
pub use error::{ModelError, ModelResult};
pub use job::{JobId, JobKind, JobState};
pub use progress::{JobProgress, NoopProgress, ProgressSink};
pub use result::{
    BatchDownloadJobResult, DownloadJobResult, FormatsJobResult, KeyPoolStatus, ResultStatus,
    SceneDetectionJobResult, SearchJobResult, VideoInfoJobResult,
};
pub use scene::{
    DetectionMethod, SceneRecord, DEFAULT_ADAPTIVE_THRESHOLD, DEFAULT_CONTENT_THRESHOLD,
};
pub use search::{SearchMode, SearchRequest, SortBy, TimeRange};
pub use snapshot::JobSnapshot;
pub use video::{DownloadProgress, DownloadRecord, VideoDetails, VideoFormat, VideoSummary};
