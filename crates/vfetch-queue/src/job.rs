//! Job payloads carried by the broker.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use vfetch_models::{
    JobId, JobKind, SearchRequest, DEFAULT_ADAPTIVE_THRESHOLD, DEFAULT_CONTENT_THRESHOLD,
};

/// Search the platform in manual or automatic mode.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchJob {
    pub job_id: JobId,
    #[serde(default)]
    pub attempt: u32,
    pub request: SearchRequest,
    pub created_at: DateTime<Utc>,
}

impl SearchJob {
    pub fn new(request: SearchRequest) -> Self {
        Self {
            job_id: JobId::new(),
            attempt: 0,
            request,
            created_at: Utc::now(),
        }
    }
}

/// Download one video.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadJob {
    pub job_id: JobId,
    #[serde(default)]
    pub attempt: u32,
    pub url: String,
    /// yt-dlp format selector
    pub format: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl DownloadJob {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            job_id: JobId::new(),
            attempt: 0,
            url: url.into(),
            format: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_format(mut self, format: Option<String>) -> Self {
        self.format = format;
        self
    }
}

/// Download a list of videos one after another.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchDownloadJob {
    pub job_id: JobId,
    #[serde(default)]
    pub attempt: u32,
    pub urls: Vec<String>,
    pub format: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl BatchDownloadJob {
    pub fn new(urls: Vec<String>) -> Self {
        Self {
            job_id: JobId::new(),
            attempt: 0,
            urls,
            format: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_format(mut self, format: Option<String>) -> Self {
        self.format = format;
        self
    }
}

/// Metadata or format lookup for one URL.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LookupJob {
    pub job_id: JobId,
    #[serde(default)]
    pub attempt: u32,
    pub url: String,
    pub created_at: DateTime<Utc>,
}

impl LookupJob {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            job_id: JobId::new(),
            attempt: 0,
            url: url.into(),
            created_at: Utc::now(),
        }
    }
}

/// Detect scenes in a staged upload.
///
/// `method` is kept as the caller sent it so an unknown value fails the job
/// instead of being rejected by deserialization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SceneDetectionJob {
    pub job_id: JobId,
    #[serde(default)]
    pub attempt: u32,
    pub video_path: String,
    pub method: String,
    pub adaptive_threshold: f64,
    pub content_threshold: f64,
    pub created_at: DateTime<Utc>,
}

impl SceneDetectionJob {
    pub fn new(video_path: impl Into<String>, method: impl Into<String>) -> Self {
        Self {
            job_id: JobId::new(),
            attempt: 0,
            video_path: video_path.into(),
            method: method.into(),
            adaptive_threshold: DEFAULT_ADAPTIVE_THRESHOLD,
            content_threshold: DEFAULT_CONTENT_THRESHOLD,
            created_at: Utc::now(),
        }
    }

    pub fn with_thresholds(mut self, adaptive: f64, content: f64) -> Self {
        self.adaptive_threshold = adaptive;
        self.content_threshold = content;
        self
    }
}

/// Generic job wrapper for queue storage.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum QueueJob {
    Search(SearchJob),
    Download(DownloadJob),
    BatchDownload(BatchDownloadJob),
    VideoInfo(LookupJob),
    Formats(LookupJob),
    SceneDetection(SceneDetectionJob),
}

impl QueueJob {
    pub fn job_id(&self) -> &JobId {
        match self {
            QueueJob::Search(j) => &j.job_id,
            QueueJob::Download(j) => &j.job_id,
            QueueJob::BatchDownload(j) => &j.job_id,
            QueueJob::VideoInfo(j) | QueueJob::Formats(j) => &j.job_id,
            QueueJob::SceneDetection(j) => &j.job_id,
        }
    }

    pub fn kind(&self) -> JobKind {
        match self {
            QueueJob::Search(_) => JobKind::Search,
            QueueJob::Download(_) => JobKind::Download,
            QueueJob::BatchDownload(_) => JobKind::BatchDownload,
            QueueJob::VideoInfo(_) => JobKind::VideoInfo,
            QueueJob::Formats(_) => JobKind::Formats,
            QueueJob::SceneDetection(_) => JobKind::SceneDetection,
        }
    }

    /// Zero-based attempt number of this delivery.
    pub fn attempt(&self) -> u32 {
        match self {
            QueueJob::Search(j) => j.attempt,
            QueueJob::Download(j) => j.attempt,
            QueueJob::BatchDownload(j) => j.attempt,
            QueueJob::VideoInfo(j) | QueueJob::Formats(j) => j.attempt,
            QueueJob::SceneDetection(j) => j.attempt,
        }
    }

    fn attempt_mut(&mut self) -> &mut u32 {
        match self {
            QueueJob::Search(j) => &mut j.attempt,
            QueueJob::Download(j) => &mut j.attempt,
            QueueJob::BatchDownload(j) => &mut j.attempt,
            QueueJob::VideoInfo(j) | QueueJob::Formats(j) => &mut j.attempt,
            QueueJob::SceneDetection(j) => &mut j.attempt,
        }
    }

    /// Copy of this job for the following attempt.
    pub fn next_attempt(&self) -> Self {
        let mut next = self.clone();
        *next.attempt_mut() += 1;
        next
    }

    /// Key identifying one delivery of one attempt.
    pub fn idempotency_key(&self) -> String {
        format!("{}:{}:{}", self.kind(), self.job_id(), self.attempt())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queue_job_is_tagged() {
        let job = QueueJob::Download(DownloadJob::new("https://youtu.be/abc"));
        let json = serde_json::to_value(&job).unwrap();
        assert_eq!(json["type"], "download");
        assert_eq!(json["url"], "https://youtu.be/abc");

        let decoded: QueueJob = serde_json::from_value(json).unwrap();
        assert_eq!(decoded.kind(), JobKind::Download);
        assert_eq!(decoded.job_id(), job.job_id());
    }

    #[test]
    fn test_next_attempt_keeps_job_id() {
        let job = QueueJob::Formats(LookupJob::new("https://youtu.be/abc"));
        let next = job.next_attempt().next_attempt();
        assert_eq!(next.attempt(), 2);
        assert_eq!(next.job_id(), job.job_id());
        assert_ne!(next.idempotency_key(), job.idempotency_key());
    }

    #[test]
    fn test_scene_job_keeps_raw_method() {
        let job = SceneDetectionJob::new("/tmp/video_uploads/a.mp4", "histogram");
        assert_eq!(job.method, "histogram");
        assert_eq!(job.adaptive_threshold, DEFAULT_ADAPTIVE_THRESHOLD);
        assert_eq!(job.content_threshold, DEFAULT_CONTENT_THRESHOLD);
    }
}
