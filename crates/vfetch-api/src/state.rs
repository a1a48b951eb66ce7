//! Application state.

use std::sync::Arc;

use vfetch_media::UploadStaging;
use vfetch_queue::{JobClient, QueueConfig, QueueResult, RedisBroker, RedisStatusStore};

use crate::config::ApiConfig;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: ApiConfig,
    pub jobs: JobClient,
    pub staging: Arc<UploadStaging>,
}

impl AppState {
    /// State over an existing job client.
    pub fn new(config: ApiConfig, jobs: JobClient) -> Self {
        let staging = Arc::new(UploadStaging::new(config.upload_dir.clone()));
        Self {
            config,
            jobs,
            staging,
        }
    }

    /// State backed by the Redis broker and status store.
    pub fn connect(config: ApiConfig, queue_config: &QueueConfig) -> QueueResult<Self> {
        let broker = RedisBroker::new(queue_config.clone())?;
        let store = RedisStatusStore::new(queue_config)?;
        let jobs = JobClient::new(Arc::new(broker), Arc::new(store));
        Ok(Self::new(config, jobs))
    }
}
