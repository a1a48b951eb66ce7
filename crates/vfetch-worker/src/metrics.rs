//! Worker metrics.

use std::net::{Ipv4Addr, SocketAddr};

use metrics::{counter, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

use vfetch_models::JobKind;

/// Metric names as constants for consistency.
pub mod names {
    pub const JOBS_STARTED_TOTAL: &str = "vfetch_jobs_started_total";
    pub const JOBS_SUCCEEDED_TOTAL: &str = "vfetch_jobs_succeeded_total";
    pub const JOBS_FAILED_TOTAL: &str = "vfetch_jobs_failed_total";
    pub const JOBS_RETRIED_TOTAL: &str = "vfetch_jobs_retried_total";
    pub const JOB_DURATION_SECONDS: &str = "vfetch_job_duration_seconds";
    pub const KEY_ROTATIONS_TOTAL: &str = "vfetch_key_rotations_total";
    pub const BATCH_ITEMS_TOTAL: &str = "vfetch_batch_items_total";
}

/// Serve Prometheus metrics on `port`.
pub fn init_metrics(port: u16) -> Result<(), BuildError> {
    PrometheusBuilder::new()
        .with_http_listener(SocketAddr::from((Ipv4Addr::UNSPECIFIED, port)))
        .install()
}

pub fn record_job_started(kind: JobKind) {
    counter!(names::JOBS_STARTED_TOTAL, "kind" => kind.as_str()).increment(1);
}

pub fn record_job_succeeded(kind: JobKind, duration_secs: f64) {
    counter!(names::JOBS_SUCCEEDED_TOTAL, "kind" => kind.as_str()).increment(1);
    histogram!(names::JOB_DURATION_SECONDS, "kind" => kind.as_str()).record(duration_secs);
}

pub fn record_job_failed(kind: JobKind) {
    counter!(names::JOBS_FAILED_TOTAL, "kind" => kind.as_str()).increment(1);
}

pub fn record_job_retried(kind: JobKind) {
    counter!(names::JOBS_RETRIED_TOTAL, "kind" => kind.as_str()).increment(1);
}

pub fn record_key_rotation(pool: &str) {
    counter!(names::KEY_ROTATIONS_TOTAL, "pool" => pool.to_string()).increment(1);
}

pub fn record_batch_item(success: bool) {
    let outcome = if success { "success" } else { "failure" };
    counter!(names::BATCH_ITEMS_TOTAL, "outcome" => outcome).increment(1);
}
