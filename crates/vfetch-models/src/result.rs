//! Terminal result payloads, one per job kind.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::batch::BatchResult;
use crate::scene::SceneRecord;
use crate::video::{DownloadRecord, VideoDetails, VideoFormat, VideoSummary};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum ResultStatus {
    #[default]
    Success,
}

/// Credential pool counters reported alongside search results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct KeyPoolStatus {
    pub total_keys: usize,
    pub current_key_index: usize,
    pub failed_keys_count: usize,
    pub available_keys: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SearchJobResult {
    pub status: ResultStatus,
    pub total_videos: usize,
    pub videos: Vec<VideoSummary>,
    pub key_status: KeyPoolStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DownloadJobResult {
    pub status: ResultStatus,
    pub video_info: DownloadRecord,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct BatchDownloadJobResult {
    pub status: ResultStatus,
    pub results: BatchResult<DownloadRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct VideoInfoJobResult {
    pub status: ResultStatus,
    pub video_info: VideoDetails,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct FormatsJobResult {
    pub status: ResultStatus,
    pub formats: Vec<VideoFormat>,
}

/// Scene detection result.
///
/// `video_path` points at the staged upload; the status endpoint deletes
/// that file and strips the field before returning the payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SceneDetectionJobResult {
    pub status: ResultStatus,
    pub scenes_count: usize,
    pub scenes: Vec<SceneRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_path: Option<String>,
}

impl SceneDetectionJobResult {
    /// JSON field holding the staged upload path.
    pub const VIDEO_PATH_FIELD: &'static str = "videoPath";

    pub fn new(scenes: Vec<SceneRecord>, video_path: impl Into<String>) -> Self {
        Self {
            status: ResultStatus::Success,
            scenes_count: scenes.len(),
            scenes,
            video_path: Some(video_path.into()),
        }
    }
}
