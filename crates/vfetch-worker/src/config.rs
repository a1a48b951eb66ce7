//! Worker configuration.

use std::str::FromStr;
use std::time::Duration;

/// When the search key cursor goes back to the first key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KeyResetPolicy {
    /// Only on an explicit `reset()`; a spent key stays skipped for the
    /// life of the process.
    #[default]
    Explicit,
    /// Before every top-level search.
    PerOperation,
}

impl FromStr for KeyResetPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "explicit" => Ok(KeyResetPolicy::Explicit),
            "per_operation" => Ok(KeyResetPolicy::PerOperation),
            other => Err(format!("unknown key reset policy: {}", other)),
        }
    }
}

/// Worker configuration.
#[derive(Clone)]
pub struct WorkerConfig {
    /// Maximum concurrent jobs
    pub max_concurrent_jobs: usize,
    /// Attempt is aborted and retried after this long
    pub soft_time_limit: Duration,
    /// Job is failed outright after this long
    pub hard_time_limit: Duration,
    /// Graceful shutdown timeout
    pub shutdown_timeout: Duration,
    /// How often the worker should scan for orphaned pending jobs
    pub claim_interval: Duration,
    /// Minimum idle time before a pending job can be claimed (crash recovery)
    pub claim_min_idle: Duration,
    /// How often delayed retries are moved back onto the queue
    pub promote_interval: Duration,
    /// Directory downloaded videos are written to
    pub download_dir: String,
    /// Base delay for job retries (doubles each attempt)
    pub retry_base_delay: Duration,
    /// YouTube Data API keys, in rotation order
    pub search_api_keys: Vec<String>,
    /// OpenAI keys, in rotation order
    pub ai_api_keys: Vec<String>,
    /// Channels searched by automatic mode
    pub auto_channel_ids: Vec<String>,
    /// Queries run by automatic mode
    pub auto_queries: Vec<String>,
    pub key_reset_policy: KeyResetPolicy,
    /// Port for the Prometheus scrape endpoint, disabled when unset
    pub metrics_port: Option<u16>,
}

impl std::fmt::Debug for WorkerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerConfig")
            .field("max_concurrent_jobs", &self.max_concurrent_jobs)
            .field("soft_time_limit", &self.soft_time_limit)
            .field("hard_time_limit", &self.hard_time_limit)
            .field("shutdown_timeout", &self.shutdown_timeout)
            .field("claim_interval", &self.claim_interval)
            .field("claim_min_idle", &self.claim_min_idle)
            .field("promote_interval", &self.promote_interval)
            .field("download_dir", &self.download_dir)
            .field("retry_base_delay", &self.retry_base_delay)
            .field("search_api_keys", &self.search_api_keys.len())
            .field("ai_api_keys", &self.ai_api_keys.len())
            .field("auto_channel_ids", &self.auto_channel_ids)
            .field("auto_queries", &self.auto_queries)
            .field("key_reset_policy", &self.key_reset_policy)
            .field("metrics_port", &self.metrics_port)
            .finish()
    }
}

pub const DEFAULT_AUTO_QUERIES: [&str; 2] = ["Jogo Completo", "Melhores Momentos"];

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: 4,
            soft_time_limit: Duration::from_secs(25 * 60),
            hard_time_limit: Duration::from_secs(30 * 60),
            shutdown_timeout: Duration::from_secs(60),
            claim_interval: Duration::from_secs(30),
            claim_min_idle: Duration::from_secs(35 * 60), // past the hard limit
            promote_interval: Duration::from_secs(1),
            download_dir: "downloads".to_string(),
            retry_base_delay: Duration::from_secs(1),
            search_api_keys: Vec::new(),
            ai_api_keys: Vec::new(),
            auto_channel_ids: Vec::new(),
            auto_queries: DEFAULT_AUTO_QUERIES.iter().map(|q| q.to_string()).collect(),
            key_reset_policy: KeyResetPolicy::Explicit,
            metrics_port: None,
        }
    }
}

/// Read `PREFIX_1` .. `PREFIX_4`, skipping unset and empty values.
fn numbered_keys(prefix: &str) -> Vec<String> {
    (1..=4)
        .filter_map(|i| std::env::var(format!("{}_{}", prefix, i)).ok())
        .map(|k| k.trim().to_string())
        .filter(|k| !k.is_empty())
        .collect()
}

fn env_secs(name: &str, default: u64) -> Duration {
    Duration::from_secs(
        std::env::var(name)
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(default),
    )
}

impl WorkerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let auto_channel_ids = ["GETV_CHANNEL_ID", "CAZETV_CHANNEL_ID"]
            .iter()
            .filter_map(|name| std::env::var(name).ok())
            .filter(|id| !id.trim().is_empty())
            .collect();

        let auto_queries = std::env::var("AUTO_SEARCH_QUERIES")
            .ok()
            .map(|raw| {
                raw.split(',')
                    .map(|q| q.trim().to_string())
                    .filter(|q| !q.is_empty())
                    .collect::<Vec<_>>()
            })
            .filter(|queries| !queries.is_empty())
            .unwrap_or(defaults.auto_queries);

        Self {
            max_concurrent_jobs: std::env::var("WORKER_MAX_JOBS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_concurrent_jobs),
            soft_time_limit: env_secs("WORKER_SOFT_TIME_LIMIT_SECS", 25 * 60),
            hard_time_limit: env_secs("WORKER_HARD_TIME_LIMIT_SECS", 30 * 60),
            shutdown_timeout: env_secs("WORKER_SHUTDOWN_TIMEOUT", 60),
            claim_interval: env_secs("WORKER_CLAIM_INTERVAL_SECS", 30),
            claim_min_idle: env_secs("WORKER_CLAIM_MIN_IDLE_SECS", 35 * 60),
            promote_interval: defaults.promote_interval,
            download_dir: std::env::var("DOWNLOAD_DIR").unwrap_or(defaults.download_dir),
            retry_base_delay: Duration::from_millis(
                std::env::var("RETRY_BASE_DELAY_MS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(1000),
            ),
            search_api_keys: numbered_keys("YOUTUBE_API_KEY"),
            ai_api_keys: numbered_keys("OPENAI_API_KEY"),
            auto_channel_ids,
            auto_queries,
            key_reset_policy: std::env::var("KEY_RESET_POLICY")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or_default(),
            metrics_port: std::env::var("WORKER_METRICS_PORT")
                .ok()
                .and_then(|s| s.parse().ok()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = WorkerConfig::default();
        assert_eq!(config.soft_time_limit, Duration::from_secs(1500));
        assert_eq!(config.hard_time_limit, Duration::from_secs(1800));
        assert!(config.claim_min_idle > config.hard_time_limit);
        assert_eq!(config.auto_queries, vec!["Jogo Completo", "Melhores Momentos"]);
        assert_eq!(config.key_reset_policy, KeyResetPolicy::Explicit);
    }

    #[test]
    fn test_reset_policy_parsing() {
        assert_eq!("per_operation".parse(), Ok(KeyResetPolicy::PerOperation));
        assert_eq!("EXPLICIT".parse(), Ok(KeyResetPolicy::Explicit));
        assert!("sometimes".parse::<KeyResetPolicy>().is_err());
    }

    #[test]
    fn test_debug_hides_keys() {
        let config = WorkerConfig {
            search_api_keys: vec!["secret-key".to_string()],
            ..Default::default()
        };
        let debug = format!("{:?}", config);
        assert!(!debug.contains("secret-key"));
    }
}
