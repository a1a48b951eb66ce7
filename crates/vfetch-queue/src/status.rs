//! Job status store: the latest snapshot per job handle.

use std::time::Duration;

use async_trait::async_trait;
use redis::AsyncCommands;
use tracing::debug;

use vfetch_models::{JobId, JobSnapshot};

use crate::broker::QueueConfig;
use crate::error::{QueueError, QueueResult};

/// Storage for job snapshots.
///
/// `put` never replaces a snapshot that is already terminal, so a late
/// progress write cannot resurrect a finished job.
#[async_trait]
pub trait StatusStore: Send + Sync {
    /// Write a snapshot. Returns `false` when the stored one is terminal.
    async fn put(&self, snapshot: &JobSnapshot) -> QueueResult<bool>;

    /// Read the snapshot for a job, if one exists.
    async fn get(&self, job_id: &JobId) -> QueueResult<Option<JobSnapshot>>;

    /// Check connectivity.
    async fn ping(&self) -> QueueResult<()>;
}

/// Lua: SET with TTL unless the stored snapshot is SUCCESS or FAILURE.
const PUT_UNLESS_TERMINAL: &str = r#"
local current = redis.call('GET', KEYS[1])
if current then
  local ok, decoded = pcall(cjson.decode, current)
  if ok and (decoded['state'] == 'SUCCESS' or decoded['state'] == 'FAILURE') then
    return 0
  end
end
redis.call('SET', KEYS[1], ARGV[1], 'EX', ARGV[2])
return 1
"#;

/// Redis-backed status store with TTL.
pub struct RedisStatusStore {
    client: redis::Client,
    ttl: Duration,
    script: redis::Script,
}

impl RedisStatusStore {
    pub fn new(config: &QueueConfig) -> QueueResult<Self> {
        let client = redis::Client::open(config.redis_url.as_str())?;
        Ok(Self {
            client,
            ttl: config.status_ttl,
            script: redis::Script::new(PUT_UNLESS_TERMINAL),
        })
    }

    /// Get the Redis key for a job snapshot.
    pub fn key(job_id: &JobId) -> String {
        format!("vfetch:status:{}", job_id)
    }

    async fn connection(&self) -> QueueResult<redis::aio::MultiplexedConnection> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| QueueError::connection_failed(e.to_string()))
    }
}

#[async_trait]
impl StatusStore for RedisStatusStore {
    async fn put(&self, snapshot: &JobSnapshot) -> QueueResult<bool> {
        let mut conn = self.connection().await?;
        let payload = serde_json::to_string(snapshot)?;

        let written: i64 = self
            .script
            .key(Self::key(&snapshot.job_id))
            .arg(payload)
            .arg(self.ttl.as_secs().max(1))
            .invoke_async(&mut conn)
            .await?;

        if written == 0 {
            debug!(
                job_id = %snapshot.job_id,
                state = %snapshot.state,
                "Ignored write over terminal snapshot"
            );
        }
        Ok(written == 1)
    }

    async fn get(&self, job_id: &JobId) -> QueueResult<Option<JobSnapshot>> {
        let mut conn = self.connection().await?;
        let payload: Option<String> = conn.get(Self::key(job_id)).await?;

        payload
            .map(|p| serde_json::from_str(&p).map_err(QueueError::from))
            .transpose()
    }

    async fn ping(&self) -> QueueResult<()> {
        let mut conn = self.connection().await?;
        redis::cmd("PING")
            .query_async::<String>(&mut conn)
            .await
            .map_err(|e| QueueError::status_store(e.to_string()))?;
        Ok(())
    }
}
