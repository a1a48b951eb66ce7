//! Scene detection upload and status handlers.
//!
//! Uploads are staged on the shared filesystem and the job carries the path.
//! The first poll that sees a successful result deletes the staged file and
//! strips its path from the response. Failed jobs leave the file in place.

use std::path::{Component, Path as FsPath, PathBuf};

use axum::extract::{Multipart, Path, State};
use axum::Json;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use vfetch_models::{
    DetectionMethod, JobState, DEFAULT_ADAPTIVE_THRESHOLD, DEFAULT_CONTENT_THRESHOLD,
};
use vfetch_queue::{QueueJob, SceneDetectionJob};

use crate::error::{ApiError, ApiResult};
use crate::handlers::jobs::{load_snapshot, submit_job, JobStatusResponse};
use crate::metrics;
use crate::state::AppState;

/// Key of the staged path inside a detection result.
const VIDEO_PATH_KEY: &str = "videoPath";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectResponse {
    pub job_id: String,
    pub state: String,
    pub message: String,
    pub original_filename: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectFailureResponse {
    pub job_id: String,
    pub state: JobState,
    pub error: String,
    pub message: String,
}

/// Fields read from the multipart form.
struct DetectForm {
    upload: Option<(String, axum::body::Bytes)>,
    method: String,
    adaptive_threshold: f64,
    content_threshold: f64,
}

impl Default for DetectForm {
    fn default() -> Self {
        Self {
            upload: None,
            method: DetectionMethod::default().as_str().to_string(),
            adaptive_threshold: DEFAULT_ADAPTIVE_THRESHOLD,
            content_threshold: DEFAULT_CONTENT_THRESHOLD,
        }
    }
}

async fn read_form(mut multipart: Multipart) -> ApiResult<DetectForm> {
    let mut form = DetectForm::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(format!("Invalid multipart body: {}", e)))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" => {
                let filename = field.file_name().unwrap_or_default().to_string();
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::bad_request(format!("Failed to read upload: {}", e)))?;
                form.upload = Some((filename, data));
            }
            "method" => form.method = read_text(field).await?.trim().to_string(),
            "adaptiveThreshold" => {
                form.adaptive_threshold = parse_threshold(&name, &read_text(field).await?)?
            }
            "contentThreshold" => {
                form.content_threshold = parse_threshold(&name, &read_text(field).await?)?
            }
            other => debug!(field = other, "Ignoring unknown form field"),
        }
    }

    Ok(form)
}

async fn read_text(field: axum::extract::multipart::Field<'_>) -> ApiResult<String> {
    field
        .text()
        .await
        .map_err(|e| ApiError::bad_request(format!("Invalid form field: {}", e)))
}

fn parse_threshold(name: &str, value: &str) -> ApiResult<f64> {
    value
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite() && *v >= 0.0)
        .ok_or_else(|| ApiError::Validation(format!("{} must be a non-negative number", name)))
}

/// Stage an upload and start scene detection on it.
///
/// The method is passed through unchecked: an unknown method fails the job,
/// not the upload.
pub async fn detect_scenes(
    State(state): State<AppState>,
    multipart: Multipart,
) -> ApiResult<Json<DetectResponse>> {
    let form = read_form(multipart).await?;
    let (original_filename, data) = form
        .upload
        .ok_or_else(|| ApiError::bad_request("A video file is required"))?;

    let path = state.staging.stage(&original_filename, &data).await?;
    metrics::record_upload_staged(data.len());
    info!(path = %path.display(), bytes = data.len(), "Upload staged");

    // Drop the staged file if the job never makes it onto the queue
    let staged = scopeguard::guard(path.clone(), |path| {
        if let Err(e) = std::fs::remove_file(&path) {
            warn!(path = %path.display(), "Failed to remove unsubmitted upload: {}", e);
        }
    });

    let job = SceneDetectionJob::new(path.to_string_lossy(), form.method)
        .with_thresholds(form.adaptive_threshold, form.content_threshold);
    let submitted = submit_job(&state, QueueJob::SceneDetection(job), "").await?;
    scopeguard::ScopeGuard::into_inner(staged);

    Ok(Json(DetectResponse {
        job_id: submitted.job_id.clone(),
        state: "processing".to_string(),
        message: format!(
            "Scene detection started. Poll /api/v1/scene-detection/status/{} for progress.",
            submitted.job_id
        ),
        original_filename,
    }))
}

/// Status of a scene detection job.
pub async fn scene_detection_status(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> ApiResult<axum::response::Response> {
    use axum::response::IntoResponse;

    let snapshot = load_snapshot(&state, &job_id).await?;

    match snapshot.state {
        JobState::Success => {
            let mut response = JobStatusResponse::from(snapshot);
            release_staged_upload(&state, &mut response).await;
            Ok(Json(response).into_response())
        }
        JobState::Failure => {
            // The staged upload is kept for inspection
            warn!(job_id = %job_id, "Scene detection failed, staged upload left in place");
            Ok(Json(DetectFailureResponse {
                job_id: snapshot.job_id.to_string(),
                state: snapshot.state,
                error: snapshot
                    .error
                    .unwrap_or_else(|| "Unknown error during processing".to_string()),
                message: "The task failed. Check the worker logs for details.".to_string(),
            })
            .into_response())
        }
        _ => Ok(Json(JobStatusResponse::from(snapshot)).into_response()),
    }
}

/// Strip the staged path from a successful result and delete the file.
///
/// Safe to call on every poll: later polls find the file already gone.
pub(crate) async fn release_staged_upload(state: &AppState, response: &mut JobStatusResponse) {
    let Some(Value::Object(result)) = response.result.as_mut() else {
        return;
    };
    let Some(path) = result
        .remove(VIDEO_PATH_KEY)
        .and_then(|v| v.as_str().map(PathBuf::from))
    else {
        return;
    };

    if !is_staged_path(state.staging.dir(), &path) {
        warn!(path = %path.display(), "Refusing to delete file outside the staging directory");
        return;
    }

    match state.staging.remove(&path).await {
        Ok(true) => {
            metrics::record_staged_file_removed();
            info!(job_id = %response.job_id, path = %path.display(), "Staged upload removed");
        }
        Ok(false) => debug!(path = %path.display(), "Staged upload already removed"),
        Err(e) => warn!(path = %path.display(), "Failed to remove staged upload: {}", e),
    }
}

fn is_staged_path(staging_dir: &FsPath, path: &FsPath) -> bool {
    path.starts_with(staging_dir) && !path.components().any(|c| c == Component::ParentDir)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_threshold() {
        assert_eq!(parse_threshold("t", " 3.5 ").unwrap(), 3.5);
        assert!(parse_threshold("t", "-1").is_err());
        assert!(parse_threshold("t", "abc").is_err());
        assert!(parse_threshold("t", "NaN").is_err());
    }

    #[test]
    fn test_is_staged_path() {
        let dir = FsPath::new("/tmp/video_uploads");
        assert!(is_staged_path(dir, FsPath::new("/tmp/video_uploads/a.mp4")));
        assert!(!is_staged_path(dir, FsPath::new("/etc/passwd")));
        assert!(!is_staged_path(
            dir,
            FsPath::new("/tmp/video_uploads/../../etc/passwd")
        ));
    }
}
