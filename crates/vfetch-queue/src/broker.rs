//! Job broker backed by Redis Streams.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use redis::AsyncCommands;
use tracing::{debug, info, warn};

use crate::error::{QueueError, QueueResult};
use crate::job::QueueJob;

/// A job handed to a consumer, identified by its broker message id.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub id: String,
    pub job: QueueJob,
}

/// Transport between submitters and workers.
#[async_trait]
pub trait JobBroker: Send + Sync {
    /// Prepare the broker (consumer group, streams).
    async fn init(&self) -> QueueResult<()>;

    /// Publish a job for immediate consumption.
    async fn publish(&self, job: &QueueJob) -> QueueResult<String>;

    /// Publish a job once `delay` has elapsed.
    async fn schedule(&self, job: &QueueJob, delay: Duration) -> QueueResult<()>;

    /// Move scheduled jobs whose delay elapsed onto the live queue.
    async fn promote_due(&self) -> QueueResult<usize>;

    /// Read up to `count` new jobs, waiting at most `block_ms`.
    async fn consume(&self, consumer: &str, block_ms: u64, count: usize)
        -> QueueResult<Vec<Delivery>>;

    /// Take over deliveries left unacknowledged by a crashed consumer.
    async fn claim_stale(
        &self,
        consumer: &str,
        min_idle_ms: u64,
        count: usize,
    ) -> QueueResult<Vec<Delivery>>;

    /// Acknowledge a delivery (done with it, whatever the outcome).
    async fn ack(&self, delivery_id: &str) -> QueueResult<()>;

    /// Park a terminally failed job on the dead letter queue and ack it.
    async fn dead_letter(&self, delivery_id: &str, job: &QueueJob, error: &str)
        -> QueueResult<()>;

    /// Number of jobs waiting on the live queue.
    async fn len(&self) -> QueueResult<u64>;
}

/// Queue configuration.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Redis URL
    pub redis_url: String,
    /// Stream name for jobs
    pub stream_name: String,
    /// Consumer group name
    pub consumer_group: String,
    /// Dead letter queue stream name
    pub dlq_stream_name: String,
    /// Sorted set holding jobs waiting for a retry delay
    pub delayed_set_name: String,
    /// How long job snapshots are kept after the last update
    pub status_ttl: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            redis_url: "redis://localhost:6379".to_string(),
            stream_name: "vfetch:jobs".to_string(),
            consumer_group: "vfetch:workers".to_string(),
            dlq_stream_name: "vfetch:dlq".to_string(),
            delayed_set_name: "vfetch:delayed".to_string(),
            status_ttl: Duration::from_secs(86400), // 24 hours
        }
    }
}

impl QueueConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self {
            redis_url: std::env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://localhost:6379".to_string()),
            stream_name: std::env::var("QUEUE_STREAM")
                .unwrap_or_else(|_| "vfetch:jobs".to_string()),
            consumer_group: std::env::var("QUEUE_CONSUMER_GROUP")
                .unwrap_or_else(|_| "vfetch:workers".to_string()),
            dlq_stream_name: std::env::var("QUEUE_DLQ_STREAM")
                .unwrap_or_else(|_| "vfetch:dlq".to_string()),
            delayed_set_name: std::env::var("QUEUE_DELAYED_SET")
                .unwrap_or_else(|_| "vfetch:delayed".to_string()),
            status_ttl: Duration::from_secs(
                std::env::var("JOB_STATUS_TTL_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(86400),
            ),
        }
    }
}

/// Redis Streams broker.
pub struct RedisBroker {
    client: redis::Client,
    config: QueueConfig,
}

impl RedisBroker {
    /// Create a new broker.
    pub fn new(config: QueueConfig) -> QueueResult<Self> {
        let client = redis::Client::open(config.redis_url.as_str())?;
        Ok(Self { client, config })
    }

    /// Create from environment variables.
    pub fn from_env() -> QueueResult<Self> {
        Self::new(QueueConfig::from_env())
    }

    async fn connection(&self) -> QueueResult<redis::aio::MultiplexedConnection> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| QueueError::connection_failed(e.to_string()))
    }

    async fn xadd(
        &self,
        conn: &mut redis::aio::MultiplexedConnection,
        payload: &str,
        key: &str,
    ) -> QueueResult<String> {
        let message_id: String = redis::cmd("XADD")
            .arg(&self.config.stream_name)
            .arg("*")
            .arg("job")
            .arg(payload)
            .arg("key")
            .arg(key)
            .query_async(conn)
            .await?;
        Ok(message_id)
    }

    /// Decode stream entries, acking payloads that cannot be parsed.
    async fn decode_entries(
        &self,
        entries: Vec<redis::streams::StreamId>,
    ) -> Vec<Delivery> {
        let mut deliveries = Vec::new();

        for entry in entries {
            let message_id = entry.id.clone();

            if let Some(redis::Value::BulkString(payload)) = entry.map.get("job") {
                let payload_str = String::from_utf8_lossy(payload);
                match serde_json::from_str::<QueueJob>(&payload_str) {
                    Ok(job) => {
                        debug!("Consumed job {} from stream", job.job_id());
                        deliveries.push(Delivery { id: message_id, job });
                    }
                    Err(e) => {
                        warn!("Failed to parse job payload: {}", e);
                        // Ack the malformed message to prevent reprocessing
                        self.ack(&message_id).await.ok();
                    }
                }
            }
        }

        deliveries
    }

    /// Get DLQ length.
    pub async fn dlq_len(&self) -> QueueResult<u64> {
        let mut conn = self.connection().await?;
        let len: u64 = conn.xlen(&self.config.dlq_stream_name).await?;
        Ok(len)
    }
}

#[async_trait]
impl JobBroker for RedisBroker {
    async fn init(&self) -> QueueResult<()> {
        let mut conn = self.connection().await?;

        // Create consumer group (ignore error if already exists). Starting
        // at 0 keeps jobs submitted before the first worker came up.
        let result: Result<(), redis::RedisError> = redis::cmd("XGROUP")
            .arg("CREATE")
            .arg(&self.config.stream_name)
            .arg(&self.config.consumer_group)
            .arg("0")
            .arg("MKSTREAM")
            .query_async(&mut conn)
            .await;

        match result {
            Ok(_) => info!("Created consumer group: {}", self.config.consumer_group),
            Err(e) if e.to_string().contains("BUSYGROUP") => {
                debug!("Consumer group already exists: {}", self.config.consumer_group);
            }
            Err(e) => return Err(QueueError::Redis(e)),
        }

        Ok(())
    }

    async fn publish(&self, job: &QueueJob) -> QueueResult<String> {
        let mut conn = self.connection().await?;

        let payload = serde_json::to_string(job)?;
        let idempotency_key = job.idempotency_key();

        // Check for duplicate using idempotency key
        let dedup_key = format!("vfetch:dedup:{}", idempotency_key);
        let fresh: bool = redis::cmd("SET")
            .arg(&dedup_key)
            .arg("1")
            .arg("NX")
            .arg("EX")
            .arg(3600)
            .query_async::<Option<String>>(&mut conn)
            .await?
            .is_some();
        if !fresh {
            warn!("Duplicate job rejected: {}", idempotency_key);
            return Err(QueueError::enqueue_failed("Duplicate job"));
        }

        let message_id = self.xadd(&mut conn, &payload, &idempotency_key).await?;

        info!(
            "Enqueued {} job {} with message ID {}",
            job.kind(),
            job.job_id(),
            message_id
        );

        Ok(message_id)
    }

    async fn schedule(&self, job: &QueueJob, delay: Duration) -> QueueResult<()> {
        let mut conn = self.connection().await?;
        let payload = serde_json::to_string(job)?;
        let due_ms = Utc::now().timestamp_millis() + delay.as_millis() as i64;

        conn.zadd::<_, _, _, ()>(&self.config.delayed_set_name, &payload, due_ms)
            .await?;

        debug!(
            "Scheduled job {} attempt {} in {:?}",
            job.job_id(),
            job.attempt(),
            delay
        );
        Ok(())
    }

    async fn promote_due(&self) -> QueueResult<usize> {
        let mut conn = self.connection().await?;
        let now_ms = Utc::now().timestamp_millis();

        let due: Vec<String> = redis::cmd("ZRANGEBYSCORE")
            .arg(&self.config.delayed_set_name)
            .arg("-inf")
            .arg(now_ms)
            .arg("LIMIT")
            .arg(0)
            .arg(100)
            .query_async(&mut conn)
            .await?;

        let mut promoted = 0;
        for payload in due {
            // Only the worker that removes the entry publishes it
            let removed: i64 = conn.zrem(&self.config.delayed_set_name, &payload).await?;
            if removed == 0 {
                continue;
            }
            let key = serde_json::from_str::<QueueJob>(&payload)
                .map(|job| job.idempotency_key())
                .unwrap_or_default();
            self.xadd(&mut conn, &payload, &key).await?;
            promoted += 1;
        }

        if promoted > 0 {
            debug!("Promoted {} delayed jobs", promoted);
        }
        Ok(promoted)
    }

    async fn consume(
        &self,
        consumer: &str,
        block_ms: u64,
        count: usize,
    ) -> QueueResult<Vec<Delivery>> {
        let mut conn = self.connection().await?;

        // Read from consumer group
        let result: redis::streams::StreamReadReply = redis::cmd("XREADGROUP")
            .arg("GROUP")
            .arg(&self.config.consumer_group)
            .arg(consumer)
            .arg("COUNT")
            .arg(count)
            .arg("BLOCK")
            .arg(block_ms)
            .arg("STREAMS")
            .arg(&self.config.stream_name)
            .arg(">") // Only new messages
            .query_async(&mut conn)
            .await?;

        let entries = result.keys.into_iter().flat_map(|k| k.ids).collect();
        Ok(self.decode_entries(entries).await)
    }

    async fn claim_stale(
        &self,
        consumer: &str,
        min_idle_ms: u64,
        count: usize,
    ) -> QueueResult<Vec<Delivery>> {
        let mut conn = self.connection().await?;

        // Pending entries idle for longer than min_idle_ms
        let pending: redis::streams::StreamPendingCountReply = redis::cmd("XPENDING")
            .arg(&self.config.stream_name)
            .arg(&self.config.consumer_group)
            .arg("IDLE")
            .arg(min_idle_ms)
            .arg("-")
            .arg("+")
            .arg(count)
            .query_async(&mut conn)
            .await?;

        if pending.ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut cmd = redis::cmd("XCLAIM");
        cmd.arg(&self.config.stream_name)
            .arg(&self.config.consumer_group)
            .arg(consumer)
            .arg(min_idle_ms);
        for entry in &pending.ids {
            cmd.arg(&entry.id);
        }
        let result: redis::streams::StreamClaimReply = cmd.query_async(&mut conn).await?;

        let deliveries = self.decode_entries(result.ids).await;
        for delivery in &deliveries {
            info!("Claimed pending job {} from stream", delivery.job.job_id());
        }
        Ok(deliveries)
    }

    async fn ack(&self, delivery_id: &str) -> QueueResult<()> {
        let mut conn = self.connection().await?;

        redis::cmd("XACK")
            .arg(&self.config.stream_name)
            .arg(&self.config.consumer_group)
            .arg(delivery_id)
            .query_async::<()>(&mut conn)
            .await?;

        // Delete the message from the stream
        redis::cmd("XDEL")
            .arg(&self.config.stream_name)
            .arg(delivery_id)
            .query_async::<()>(&mut conn)
            .await?;

        debug!("Acknowledged job: {}", delivery_id);
        Ok(())
    }

    async fn dead_letter(
        &self,
        delivery_id: &str,
        job: &QueueJob,
        error: &str,
    ) -> QueueResult<()> {
        let mut conn = self.connection().await?;

        let payload = serde_json::to_string(job)?;

        redis::cmd("XADD")
            .arg(&self.config.dlq_stream_name)
            .arg("*")
            .arg("job")
            .arg(&payload)
            .arg("error")
            .arg(error)
            .arg("original_id")
            .arg(delivery_id)
            .query_async::<()>(&mut conn)
            .await?;

        self.ack(delivery_id).await?;

        warn!("Moved job {} to DLQ: {}", job.job_id(), error);
        Ok(())
    }

    async fn len(&self) -> QueueResult<u64> {
        let mut conn = self.connection().await?;
        let len: u64 = conn.xlen(&self.config.stream_name).await?;
        Ok(len)
    }
}
