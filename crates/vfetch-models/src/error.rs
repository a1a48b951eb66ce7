//! Model validation errors.

use thiserror::Error;

pub type ModelResult<T> = Result<T, ModelError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModelError {
    #[error("Unknown detection method: {0}. Use 'adaptive' or 'content'")]
    InvalidDetectionMethod(String),

    #[error("A search query is required for manual mode")]
    MissingQuery,

    #[error("At least one URL is required")]
    EmptyUrlList,

    #[error("URL must not be empty")]
    EmptyUrl,
}
