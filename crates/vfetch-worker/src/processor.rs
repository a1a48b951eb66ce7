//! Job dispatch.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use vfetch_media::{FfmpegSceneDetector, YouTubeDataApi, YtDlp};
use vfetch_models::ProgressSink;
use vfetch_queue::QueueJob;

use crate::config::WorkerConfig;
use crate::download::DownloadOrchestrator;
use crate::error::WorkerResult;
use crate::key_rotation::{KeyPool, SharedKeyPool};
use crate::scene_detection::SceneDetectionOrchestrator;
use crate::search::SearchOrchestrator;

/// Executes the body of one job attempt and returns its result payload.
#[async_trait]
pub trait JobHandler: Send + Sync {
    async fn handle(&self, job: &QueueJob, progress: &dyn ProgressSink) -> WorkerResult<Value>;
}

/// Routes each job kind to its orchestrator.
#[derive(Clone)]
pub struct JobProcessor {
    search: SearchOrchestrator,
    downloads: DownloadOrchestrator,
    scenes: SceneDetectionOrchestrator,
}

impl JobProcessor {
    pub fn new(
        search: SearchOrchestrator,
        downloads: DownloadOrchestrator,
        scenes: SceneDetectionOrchestrator,
    ) -> Self {
        Self {
            search,
            downloads,
            scenes,
        }
    }

    /// Wire the production adapters.
    pub fn from_config(config: &WorkerConfig, search_keys: SharedKeyPool) -> Self {
        let search = SearchOrchestrator::new(
            Arc::new(YouTubeDataApi::new(reqwest::Client::new())),
            search_keys,
        )
        .with_reset_policy(config.key_reset_policy)
        .with_auto_plan(config.auto_queries.clone(), config.auto_channel_ids.clone());

        Self::new(
            search,
            DownloadOrchestrator::new(Arc::new(YtDlp::new(&config.download_dir))),
            SceneDetectionOrchestrator::new(Arc::new(FfmpegSceneDetector::new())),
        )
    }

    /// Key pool for the search API, built from the configured keys.
    pub fn search_key_pool(config: &WorkerConfig) -> SharedKeyPool {
        KeyPool::new("YouTube", config.search_api_keys.clone()).shared()
    }
}

#[async_trait]
impl JobHandler for JobProcessor {
    async fn handle(&self, job: &QueueJob, progress: &dyn ProgressSink) -> WorkerResult<Value> {
        let value = match job {
            QueueJob::Search(j) => serde_json::to_value(self.search.run(&j.request, progress).await?)?,
            QueueJob::Download(j) => serde_json::to_value(
                self.downloads
                    .download(&j.url, j.format.as_deref(), progress)
                    .await?,
            )?,
            QueueJob::BatchDownload(j) => serde_json::to_value(
                self.downloads
                    .download_batch(&j.urls, j.format.as_deref(), progress)
                    .await?,
            )?,
            QueueJob::VideoInfo(j) => serde_json::to_value(self.downloads.video_info(&j.url).await?)?,
            QueueJob::Formats(j) => serde_json::to_value(self.downloads.formats(&j.url).await?)?,
            QueueJob::SceneDetection(j) => serde_json::to_value(
                self.scenes
                    .detect(
                        &j.video_path,
                        &j.method,
                        j.adaptive_threshold,
                        j.content_threshold,
                        progress,
                    )
                    .await?,
            )?,
        };
        Ok(value)
    }
}
