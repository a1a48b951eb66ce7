//! Download, video info and format listing handlers.

use axum::extract::{Path, State};
use axum::Json;
use serde::Deserialize;
use tracing::info;
use validator::Validate;

use vfetch_queue::{BatchDownloadJob, DownloadJob, LookupJob, QueueJob};

use crate::error::{ApiError, ApiResult};
use crate::handlers::jobs::{poll_status, submit_job, JobStatusResponse, SubmitResponse};
use crate::security::validate_video_url;
use crate::state::AppState;

/// Upper bound on URLs per batch.
pub const MAX_BATCH_URLS: usize = 100;

#[derive(Debug, Deserialize, Validate)]
pub struct DownloadRequest {
    #[serde(default)]
    #[validate(length(min = 1, message = "URL is required"))]
    pub url: String,
    /// yt-dlp format selector
    #[serde(default)]
    pub format: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct BatchDownloadRequest {
    #[serde(default)]
    #[validate(length(
        min = 1,
        max = 100,
        message = "Between 1 and 100 URLs are required"
    ))]
    pub urls: Vec<String>,
    #[serde(default)]
    pub format: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UrlRequest {
    #[serde(default)]
    #[validate(length(min = 1, message = "URL is required"))]
    pub url: String,
}

/// Start a single video download.
pub async fn submit_download(
    State(state): State<AppState>,
    Json(request): Json<DownloadRequest>,
) -> ApiResult<Json<SubmitResponse>> {
    request.validate()?;
    let url = validate_video_url(&request.url)?;

    info!(url = %url, "Submitting download job");
    let job = DownloadJob::new(url).with_format(request.format);
    let response = submit_job(&state, QueueJob::Download(job), "Download job started").await?;
    Ok(Json(response))
}

/// Start a sequential download of several videos.
pub async fn submit_batch_download(
    State(state): State<AppState>,
    Json(request): Json<BatchDownloadRequest>,
) -> ApiResult<Json<SubmitResponse>> {
    request.validate()?;

    let urls = request
        .urls
        .iter()
        .enumerate()
        .map(|(idx, url)| {
            validate_video_url(url).map_err(|e| match e {
                ApiError::Validation(msg) => ApiError::Validation(format!("urls[{}]: {}", idx, msg)),
                other => other,
            })
        })
        .collect::<ApiResult<Vec<_>>>()?;

    info!(count = urls.len(), "Submitting batch download job");
    let message = format!("Download of {} videos started", urls.len());
    let job = BatchDownloadJob::new(urls).with_format(request.format);
    let response = submit_job(&state, QueueJob::BatchDownload(job), message).await?;
    Ok(Json(response))
}

/// Fetch metadata for a URL without downloading it.
pub async fn submit_video_info(
    State(state): State<AppState>,
    Json(request): Json<UrlRequest>,
) -> ApiResult<Json<SubmitResponse>> {
    request.validate()?;
    let url = validate_video_url(&request.url)?;

    let job = QueueJob::VideoInfo(LookupJob::new(url));
    let response = submit_job(&state, job, "Fetching video information...").await?;
    Ok(Json(response))
}

/// List the formats available for a URL.
pub async fn submit_formats(
    State(state): State<AppState>,
    Json(request): Json<UrlRequest>,
) -> ApiResult<Json<SubmitResponse>> {
    request.validate()?;
    let url = validate_video_url(&request.url)?;

    let job = QueueJob::Formats(LookupJob::new(url));
    let response = submit_job(&state, job, "Fetching available formats...").await?;
    Ok(Json(response))
}

/// Status of a download, batch, info or formats job.
pub async fn download_status(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> ApiResult<Json<JobStatusResponse>> {
    Ok(Json(poll_status(&state, &job_id).await?))
}
