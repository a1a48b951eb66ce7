//! Ordered API key pools with failover.
//!
//! A pool walks its keys in order. A key that keeps failing is marked spent
//! and the cursor moves on; the cursor only goes back to the first key on
//! `reset()`.

use std::collections::HashSet;
use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::{error, info, warn};

use vfetch_models::KeyPoolStatus;

use crate::error::{WorkerError, WorkerResult};
use crate::metrics;

/// Pool shared by concurrently running jobs. The lock is held for a whole
/// rotation.
pub type SharedKeyPool = Arc<Mutex<KeyPool>>;

/// How hard to push each key before moving on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RotationPolicy {
    pub max_attempts_per_key: u32,
    /// Fixed pause between attempts on the same key.
    pub delay: Duration,
}

impl Default for RotationPolicy {
    fn default() -> Self {
        Self {
            max_attempts_per_key: 3,
            delay: Duration::from_secs(2),
        }
    }
}

/// Credentials for one external capability.
#[derive(Debug, Clone)]
pub struct KeyPool {
    name: String,
    keys: Vec<String>,
    cursor: usize,
    failed: HashSet<String>,
}

impl KeyPool {
    /// Build a pool; empty keys are dropped.
    pub fn new(name: impl Into<String>, keys: Vec<String>) -> Self {
        let name = name.into();
        let keys: Vec<String> = keys.into_iter().filter(|k| !k.is_empty()).collect();
        if keys.is_empty() {
            warn!(pool = %name, "No API keys configured");
        }
        Self {
            name,
            keys,
            cursor: 0,
            failed: HashSet::new(),
        }
    }

    pub fn shared(self) -> SharedKeyPool {
        Arc::new(Mutex::new(self))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn current_key(&self) -> Option<&str> {
        self.keys.get(self.cursor).map(String::as_str)
    }

    pub fn is_exhausted(&self) -> bool {
        self.cursor >= self.keys.len()
    }

    /// Mark the current key spent and advance. Returns whether a key remains.
    pub fn mark_current_failed(&mut self) -> bool {
        if let Some(key) = self.keys.get(self.cursor).cloned() {
            self.failed.insert(key);
            warn!(
                pool = %self.name,
                key = self.cursor + 1,
                total = self.keys.len(),
                "API key failed, moving to the next one"
            );
        }

        self.cursor += 1;
        metrics::record_key_rotation(&self.name);

        if self.cursor < self.keys.len() {
            info!(pool = %self.name, key = self.cursor + 1, total = self.keys.len(), "Using next API key");
            true
        } else {
            error!(pool = %self.name, total = self.keys.len(), "All API keys failed");
            false
        }
    }

    pub fn reset(&mut self) {
        self.cursor = 0;
        self.failed.clear();
        info!(pool = %self.name, "Key pool reset to the first key");
    }

    pub fn status(&self) -> KeyPoolStatus {
        KeyPoolStatus {
            total_keys: self.keys.len(),
            current_key_index: self.cursor,
            failed_keys_count: self.failed.len(),
            available_keys: self.keys.len().saturating_sub(self.cursor),
        }
    }

    /// Run `operation` with the current key, failing over to later keys.
    ///
    /// Each key gets `max_attempts_per_key` tries with a fixed pause between
    /// them. When every remaining key is spent the error names the key count
    /// and the last underlying error.
    pub async fn execute_with_rotation<T, E, F, Fut>(
        &mut self,
        policy: &RotationPolicy,
        mut operation: F,
    ) -> WorkerResult<T>
    where
        F: FnMut(String) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        let attempts = policy.max_attempts_per_key.max(1);
        let mut last_error = None;

        while let Some(key) = self.current_key().map(str::to_string) {
            for attempt in 1..=attempts {
                match operation(key.clone()).await {
                    Ok(value) => return Ok(value),
                    Err(e) => {
                        warn!(
                            pool = %self.name,
                            key = self.cursor + 1,
                            attempt,
                            max_attempts = attempts,
                            "Call failed: {}", e
                        );
                        last_error = Some(e.to_string());
                        if attempt < attempts && !policy.delay.is_zero() {
                            tokio::time::sleep(policy.delay).await;
                        }
                    }
                }
            }

            if !self.mark_current_failed() {
                break;
            }
        }

        Err(WorkerError::KeysExhausted(format!(
            "{}: failed after trying all {} keys. Last error: {}",
            self.name,
            self.keys.len(),
            last_error.unwrap_or_else(|| "no API keys available".to_string())
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_err, assert_ok};

    fn pool(n: usize) -> KeyPool {
        KeyPool::new("YouTube", (1..=n).map(|i| format!("key-{}", i)).collect())
    }

    fn fast(max_attempts_per_key: u32) -> RotationPolicy {
        RotationPolicy {
            max_attempts_per_key,
            delay: Duration::ZERO,
        }
    }

    #[test]
    fn test_empty_keys_are_dropped() {
        let pool = KeyPool::new("YouTube", vec!["a".into(), String::new(), "b".into()]);
        assert_eq!(pool.len(), 2);
        assert_eq!(pool.current_key(), Some("a"));
    }

    #[test]
    fn test_status_tracks_cursor() {
        let mut pool = pool(3);
        assert!(pool.mark_current_failed());
        let status = pool.status();
        assert_eq!(status.total_keys, 3);
        assert_eq!(status.current_key_index, 1);
        assert_eq!(status.failed_keys_count, 1);
        assert_eq!(status.available_keys, 2);

        pool.reset();
        assert_eq!(pool.status().available_keys, 3);
        assert_eq!(pool.status().failed_keys_count, 0);
    }

    #[tokio::test]
    async fn test_exhaustion_tries_every_key() {
        let mut pool = pool(3);
        let mut calls: Vec<String> = Vec::new();

        let result: WorkerResult<()> = pool
            .execute_with_rotation(&fast(2), |key| {
                calls.push(key);
                async { Err::<(), _>("quotaExceeded") }
            })
            .await;

        let err = assert_err!(result);
        assert_eq!(calls.len(), 6);
        assert_eq!(calls.iter().filter(|k| *k == "key-2").count(), 2);
        assert!(pool.is_exhausted());
        assert_eq!(pool.status().current_key_index, 3);

        let message = err.to_string();
        assert!(message.contains("3 keys"), "{}", message);
        assert!(message.contains("quotaExceeded"), "{}", message);
    }

    #[tokio::test]
    async fn test_failover_stops_at_first_working_key() {
        let mut pool = pool(3);
        let mut calls: Vec<String> = Vec::new();

        let result = pool
            .execute_with_rotation(&fast(3), |key| {
                calls.push(key.clone());
                async move {
                    if key == "key-1" {
                        Err("forbidden")
                    } else {
                        Ok(key)
                    }
                }
            })
            .await;

        assert_eq!(assert_ok!(result), "key-2");
        assert_eq!(calls, vec!["key-1", "key-1", "key-1", "key-2"]);
        assert_eq!(pool.current_key(), Some("key-2"));
    }

    #[tokio::test]
    async fn test_spent_keys_stay_skipped_until_reset() {
        let mut pool = pool(2);
        let _ = pool
            .execute_with_rotation(&fast(1), |key| async move {
                if key == "key-1" {
                    Err("forbidden")
                } else {
                    Ok(())
                }
            })
            .await;

        let mut first = None;
        pool.execute_with_rotation(&fast(1), |key| {
            first.get_or_insert(key);
            async { Ok::<_, &str>(()) }
        })
        .await
        .unwrap();
        assert_eq!(first.as_deref(), Some("key-2"));
    }

    #[tokio::test]
    async fn test_empty_pool_fails_without_calling() {
        let mut pool = KeyPool::new("YouTube", Vec::new());
        let mut called = false;
        let result: WorkerResult<()> = pool
            .execute_with_rotation(&fast(3), |_| {
                called = true;
                async { Ok::<_, &str>(()) }
            })
            .await;

        assert!(!called);
        assert!(assert_err!(result).to_string().contains("0 keys"));
    }
}
