//! Search job handlers.

use axum::extract::{Path, State};
use axum::Json;
use tracing::info;

use vfetch_models::{SearchMode, SearchRequest};
use vfetch_queue::{QueueJob, SearchJob};

use crate::error::ApiResult;
use crate::handlers::jobs::{poll_status, submit_job, JobStatusResponse, SubmitResponse};
use crate::state::AppState;

/// Start a manual or automatic search.
pub async fn submit_search(
    State(state): State<AppState>,
    Json(request): Json<SearchRequest>,
) -> ApiResult<Json<SubmitResponse>> {
    request.validate()?;

    info!(
        mode = ?request.mode,
        query = request.query.as_deref().unwrap_or(""),
        channels = request.channel_ids.len(),
        "Submitting search job"
    );

    let message = match request.mode {
        SearchMode::Manual => "Search job started",
        SearchMode::Auto => "Automatic search job started",
    };
    let response = submit_job(&state, QueueJob::Search(SearchJob::new(request)), message).await?;
    Ok(Json(response))
}

/// Status of a search job.
pub async fn search_status(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> ApiResult<Json<JobStatusResponse>> {
    Ok(Json(poll_status(&state, &job_id).await?))
}
