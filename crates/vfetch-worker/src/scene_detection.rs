//! Scene detection over a staged upload.

use std::path::Path;
use std::sync::Arc;

use tracing::info;

use vfetch_media::SceneDetector;
use vfetch_models::{DetectionMethod, JobProgress, ProgressSink, SceneDetectionJobResult};

use crate::error::WorkerResult;

#[derive(Clone)]
pub struct SceneDetectionOrchestrator {
    detector: Arc<dyn SceneDetector>,
}

impl SceneDetectionOrchestrator {
    pub fn new(detector: Arc<dyn SceneDetector>) -> Self {
        Self { detector }
    }

    /// Detect scenes in `video_path`.
    ///
    /// An unknown `method` fails before the detector runs. The staged file
    /// is left in place; the result carries its path for the poller.
    pub async fn detect(
        &self,
        video_path: &str,
        method: &str,
        adaptive_threshold: f64,
        content_threshold: f64,
        progress: &dyn ProgressSink,
    ) -> WorkerResult<SceneDetectionJobResult> {
        let method: DetectionMethod = method.parse()?;

        progress.report(JobProgress::percent(0).with_message("Starting scene detection..."));

        let scenes = self
            .detector
            .detect(
                Path::new(video_path),
                method,
                adaptive_threshold,
                content_threshold,
            )
            .await?;

        info!(
            path = %video_path,
            method = %method,
            scenes = scenes.len(),
            "Scene detection finished"
        );
        progress.report(
            JobProgress::percent(100)
                .with_message(format!("Detection finished, {} scenes found.", scenes.len()))
                .with_extra("scenesCount", scenes.len()),
        );

        Ok(SceneDetectionJobResult::new(scenes, video_path))
    }
}
