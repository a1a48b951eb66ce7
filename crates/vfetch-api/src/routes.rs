//! API routes.

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::limit::RequestBodyLimitLayer;

use crate::handlers::{
    detect_scenes, download_status, health, job_status, ready, root, scene_detection_status,
    search_status, submit_batch_download, submit_download, submit_formats, submit_search,
    submit_video_info,
};
use crate::metrics::metrics_middleware;
use crate::middleware::{
    cors_layer, rate_limit_middleware, request_id, request_logging, security_headers,
    RateLimiterCache,
};
use crate::state::AppState;

/// Create the API router.
pub fn create_router(state: AppState, metrics_handle: Option<PrometheusHandle>) -> Router {
    let search_routes = Router::new()
        .route("/search", post(submit_search))
        .route("/search/status/:job_id", get(search_status));

    let download_routes = Router::new()
        .route("/download", post(submit_download))
        .route("/download/batch", post(submit_batch_download))
        .route("/download/video-info", post(submit_video_info))
        .route("/download/formats", post(submit_formats))
        .route("/download/status/:job_id", get(download_status));

    let scene_routes = Router::new()
        .route("/scene-detection/detect", post(detect_scenes))
        .route("/scene-detection/status/:job_id", get(scene_detection_status));

    let job_routes = Router::new().route("/jobs/:job_id", get(job_status));

    let rate_limiter = Arc::new(RateLimiterCache::new(
        state.config.rate_limit_rps,
        state.config.rate_limit_burst,
    ));

    let api_routes = Router::new()
        .merge(search_routes)
        .merge(download_routes)
        .merge(scene_routes)
        .merge(job_routes)
        .layer(middleware::from_fn_with_state(
            rate_limiter,
            rate_limit_middleware,
        ));

    let health_routes = Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/ready", get(ready));

    let metrics_routes = if let Some(handle) = metrics_handle {
        Router::new().route("/metrics", get(move || async move { handle.render() }))
    } else {
        Router::new()
    };

    Router::new()
        .nest("/api/v1", api_routes)
        .merge(health_routes)
        .merge(metrics_routes)
        // Uploads are bounded by the configured limit, not axum's 2MB default
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(state.config.max_body_size))
        .layer(middleware::from_fn(metrics_middleware))
        .layer(middleware::from_fn(security_headers))
        .layer(middleware::from_fn(request_id))
        .layer(middleware::from_fn(request_logging))
        .layer(cors_layer(&state.config.cors_origins))
        .with_state(state)
}
