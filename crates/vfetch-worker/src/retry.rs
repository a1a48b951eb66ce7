//! Job retry policy with exponential backoff.
//!
//! The policy only decides; the runner applies the decision by scheduling
//! the next attempt on the broker or failing the job.

use std::time::Duration;

use vfetch_models::JobKind;

use crate::error::WorkerError;

/// Outcome of a failed attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Run again after `delay`.
    Retry { delay: Duration },
    /// Record `FAILURE`.
    Fail,
}

/// Retry behaviour for one job kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Delay before the first retry; doubles with every attempt.
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
        }
    }

    pub fn no_retry() -> Self {
        Self::new(0, Duration::ZERO)
    }

    /// Deployment defaults per job kind.
    pub fn for_kind(kind: JobKind, base_delay: Duration) -> Self {
        match kind {
            JobKind::Search => Self::new(3, base_delay),
            JobKind::Download => Self::new(2, base_delay),
            JobKind::BatchDownload => Self::new(1, base_delay),
            JobKind::VideoInfo | JobKind::Formats | JobKind::SceneDetection => Self::no_retry(),
        }
    }

    /// Delay before the attempt following zero-based `attempt`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(2u32.saturating_pow(attempt))
    }

    /// Decide what happens after zero-based `attempt` failed with `error`.
    pub fn decide(&self, attempt: u32, error: &WorkerError) -> RetryDecision {
        if error.is_permanent() || attempt >= self.max_retries {
            return RetryDecision::Fail;
        }
        RetryDecision::Retry {
            delay: self.delay_for_attempt(attempt),
        }
    }
}
