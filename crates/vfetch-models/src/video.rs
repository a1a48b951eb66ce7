//! Video payloads produced by search, download and metadata lookups.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// One search hit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct VideoSummary {
    pub id: String,
    pub title: String,
    pub channel: Option<String>,
    pub duration_seconds: Option<u64>,
    /// Upload date as `YYYYMMDD`
    pub upload_date: Option<String>,
    pub url: String,
}

impl VideoSummary {
    /// Canonical watch URL for a video id.
    pub fn watch_url(id: &str) -> String {
        format!("https://www.youtube.com/watch?v={}", id)
    }
}

/// A video written to the download directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DownloadRecord {
    pub id: String,
    pub title: String,
    pub file_path: String,
    /// Size on disk, 0 when the file could not be found after download
    pub file_size_bytes: u64,
    pub duration_seconds: Option<u64>,
    pub url: String,
    pub uploader: Option<String>,
    pub upload_date: Option<String>,
}

/// Download progress emitted while yt-dlp runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DownloadProgress {
    #[serde(rename_all = "camelCase")]
    Downloading {
        percent_complete: Option<f64>,
        /// Bytes per second
        speed: Option<f64>,
        /// Seconds remaining
        eta: Option<u64>,
        bytes_downloaded: Option<u64>,
        total_bytes: Option<u64>,
    },
    Finished,
}

impl DownloadProgress {
    pub fn is_finished(&self) -> bool {
        matches!(self, DownloadProgress::Finished)
    }
}

/// Metadata for a single video without downloading it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct VideoDetails {
    pub id: String,
    pub title: String,
    pub duration_seconds: Option<u64>,
    pub uploader: Option<String>,
    pub upload_date: Option<String>,
    pub description: Option<String>,
    pub thumbnail: Option<String>,
    pub view_count: Option<u64>,
    pub like_count: Option<u64>,
    pub formats_available: usize,
}

/// One downloadable format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct VideoFormat {
    pub format_id: String,
    pub format: Option<String>,
    pub ext: Option<String>,
    /// `N/A` when the extractor does not report one
    pub resolution: String,
    pub fps: Option<f64>,
    pub vcodec: Option<String>,
    pub acodec: Option<String>,
    pub filesize: Option<u64>,
}
