//! Per-item accounting for multi-URL jobs.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// A failed batch item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct BatchItemError {
    pub url: String,
    pub error: String,
}

/// Aggregate outcome of a batch.
///
/// `successful == items.len()` and `failed == errors.len()` hold after every
/// push; `successful + failed == total` once every item was processed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct BatchResult<T> {
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
    pub items: Vec<T>,
    pub errors: Vec<BatchItemError>,
}

impl<T> BatchResult<T> {
    pub fn new(total: usize) -> Self {
        Self {
            total,
            successful: 0,
            failed: 0,
            items: Vec::with_capacity(total),
            errors: Vec::new(),
        }
    }

    pub fn push_success(&mut self, item: T) {
        self.items.push(item);
        self.successful += 1;
    }

    pub fn push_failure(&mut self, url: impl Into<String>, error: impl Into<String>) {
        self.errors.push(BatchItemError {
            url: url.into(),
            error: error.into(),
        });
        self.failed += 1;
    }

    /// Items accounted for so far.
    pub fn processed(&self) -> usize {
        self.successful + self.failed
    }

    pub fn is_complete(&self) -> bool {
        self.processed() == self.total
    }
}
