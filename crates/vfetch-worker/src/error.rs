//! Worker error types.

use thiserror::Error;

pub type WorkerResult<T> = Result<T, WorkerError>;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Job failed: {0}")]
    JobFailed(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Every credential of a pool was tried and failed.
    #[error("{0}")]
    KeysExhausted(String),

    #[error("Soft time limit of {0}s exceeded")]
    SoftTimeLimit(u64),

    #[error("Hard time limit of {0}s exceeded")]
    HardTimeLimit(u64),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Media error: {0}")]
    Media(#[from] vfetch_media::MediaError),

    #[error("Queue error: {0}")]
    Queue(#[from] vfetch_queue::QueueError),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl WorkerError {
    pub fn job_failed(msg: impl Into<String>) -> Self {
        Self::JobFailed(msg.into())
    }

    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    /// Failures that retrying cannot fix.
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            WorkerError::InvalidInput(_)
                | WorkerError::ConfigError(_)
                | WorkerError::HardTimeLimit(_)
        )
    }

    /// Check if error is retryable.
    pub fn is_retryable(&self) -> bool {
        !self.is_permanent()
    }
}

impl From<vfetch_models::ModelError> for WorkerError {
    fn from(err: vfetch_models::ModelError) -> Self {
        Self::InvalidInput(err.to_string())
    }
}
