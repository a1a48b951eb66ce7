//! Job lifecycle hooks.
//!
//! The runner calls exactly one hook per transition into `SUCCESS`,
//! `FAILURE` or `RETRY`. Hooks observe; they cannot change the outcome.

use std::time::Duration;

use vfetch_models::{JobId, JobKind};

use crate::logging::JobLogger;
use crate::metrics;

/// Identity of the attempt a hook is fired for.
#[derive(Debug, Clone)]
pub struct JobContext {
    pub job_id: JobId,
    pub kind: JobKind,
    /// Zero-based attempt number
    pub attempt: u32,
    pub elapsed: Duration,
}

impl JobContext {
    pub fn logger(&self) -> JobLogger {
        JobLogger::new(&self.job_id, self.kind, self.attempt)
    }
}

pub trait JobObserver: Send + Sync {
    fn on_success(&self, _ctx: &JobContext) {}

    fn on_failure(&self, _ctx: &JobContext, _error: &str) {}

    fn on_retry(&self, _ctx: &JobContext, _error: &str, _delay: Duration) {}
}

/// Logs transitions and records job metrics.
#[derive(Debug, Clone, Default)]
pub struct LoggingObserver;

impl JobObserver for LoggingObserver {
    fn on_success(&self, ctx: &JobContext) {
        ctx.logger()
            .log_completion(&format!("finished in {:.1}s", ctx.elapsed.as_secs_f64()));
        metrics::record_job_succeeded(ctx.kind, ctx.elapsed.as_secs_f64());
    }

    fn on_failure(&self, ctx: &JobContext, error: &str) {
        ctx.logger().log_error(error);
        metrics::record_job_failed(ctx.kind);
    }

    fn on_retry(&self, ctx: &JobContext, error: &str, delay: Duration) {
        ctx.logger().log_warning(&format!(
            "{} (retrying in {}ms)",
            error,
            delay.as_millis()
        ));
        metrics::record_job_retried(ctx.kind);
    }
}
