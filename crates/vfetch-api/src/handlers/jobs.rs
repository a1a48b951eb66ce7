//! Job submission responses and status polling.

use axum::extract::{Path, State};
use axum::Json;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use vfetch_models::{JobId, JobKind, JobProgress, JobSnapshot, JobState};
use vfetch_queue::QueueJob;

use crate::error::{ApiError, ApiResult};
use crate::handlers::scene_detection::release_staged_upload;
use crate::metrics;
use crate::security::is_valid_job_id;
use crate::state::AppState;

/// Returned by every submit endpoint.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitResponse {
    pub job_id: String,
    pub state: JobState,
    pub message: String,
}

/// Poll response for any job.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatusResponse {
    pub job_id: String,
    pub state: JobState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<JobKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<JobProgress>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Set for handles the store has no record of
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub attempts: u32,
    pub updated_at: String,
}

impl From<JobSnapshot> for JobStatusResponse {
    fn from(snapshot: JobSnapshot) -> Self {
        let progress = match (snapshot.state, snapshot.progress) {
            (JobState::Pending, None) => {
                Some(JobProgress::percent(0).with_message("Waiting for processing..."))
            }
            (_, progress) => progress,
        };

        Self {
            job_id: snapshot.job_id.to_string(),
            state: snapshot.state,
            kind: snapshot.kind,
            progress,
            result: snapshot.result,
            error: snapshot.error,
            message: snapshot.hint,
            attempts: snapshot.attempts,
            updated_at: snapshot.updated_at.to_rfc3339(),
        }
    }
}

/// Publish a job and build the `PENDING` reply.
pub(crate) async fn submit_job(
    state: &AppState,
    job: QueueJob,
    message: impl Into<String>,
) -> ApiResult<SubmitResponse> {
    let kind = job.kind();
    let job_id = state.jobs.submit(job).await?;
    metrics::record_job_submitted(kind.as_str());

    Ok(SubmitResponse {
        job_id: job_id.to_string(),
        state: JobState::Pending,
        message: message.into(),
    })
}

/// Latest snapshot for a path parameter.
pub(crate) async fn load_snapshot(state: &AppState, job_id: &str) -> ApiResult<JobSnapshot> {
    if !is_valid_job_id(job_id) {
        return Err(ApiError::bad_request("Invalid job ID format"));
    }

    let snapshot = state.jobs.status(&JobId::from_string(job_id)).await?;
    debug!(job_id = %job_id, state = %snapshot.state, "Job status polled");
    Ok(snapshot)
}

/// Poll a job and finalize successful scene detection results.
///
/// Every status endpoint goes through here, so a staged upload path never
/// reaches the caller whichever endpoint the handle is polled on.
pub(crate) async fn poll_status(state: &AppState, job_id: &str) -> ApiResult<JobStatusResponse> {
    let snapshot = load_snapshot(state, job_id).await?;
    let mut response = JobStatusResponse::from(snapshot);

    if response.kind == Some(JobKind::SceneDetection) && response.state == JobState::Success {
        release_staged_upload(state, &mut response).await;
    }

    Ok(response)
}

/// Status of any job.
pub async fn job_status(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> ApiResult<Json<JobStatusResponse>> {
    Ok(Json(poll_status(&state, &job_id).await?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_pending_gets_waiting_progress() {
        let snapshot = JobSnapshot::new(JobId::new(), JobKind::Download);
        let response = JobStatusResponse::from(snapshot);
        assert_eq!(response.state, JobState::Pending);
        assert_eq!(response.progress.map(|p| p.current), Some(0));
    }

    #[test]
    fn test_success_carries_result() {
        let mut snapshot = JobSnapshot::new(JobId::new(), JobKind::Formats);
        snapshot.start_attempt();
        snapshot.set_progress(JobProgress::percent(100));
        snapshot.succeed(json!({"status": "success", "formats": []}));

        let json = serde_json::to_value(JobStatusResponse::from(snapshot)).unwrap();
        assert_eq!(json["state"], "SUCCESS");
        assert_eq!(json["result"]["status"], "success");
        assert!(json.get("error").is_none());
    }
}
