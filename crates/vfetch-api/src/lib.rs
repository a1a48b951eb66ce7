//! Axum HTTP API server.
//!
//! This crate provides:
//! - Submit and poll endpoints for search, download and scene detection jobs
//! - Upload staging with cleanup once detection results are collected
//! - Rate limiting and security headers
//! - Prometheus metrics

pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod routes;
pub mod security;
pub mod state;

pub use config::ApiConfig;
pub use error::{ApiError, ApiResult};
pub use routes::create_router;
pub use state::AppState;
