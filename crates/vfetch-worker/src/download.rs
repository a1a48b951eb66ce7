//! Single, batch and metadata-only download operations.

use std::sync::Arc;

use tracing::{info, warn};

use vfetch_media::VideoFetcher;
use vfetch_models::{
    BatchDownloadJobResult, BatchResult, DownloadJobResult, DownloadProgress, FormatsJobResult,
    JobProgress, ModelError, ProgressSink, ResultStatus, VideoInfoJobResult,
};

use crate::error::{WorkerError, WorkerResult};
use crate::metrics;

fn require_url(url: &str) -> WorkerResult<()> {
    if url.trim().is_empty() {
        return Err(ModelError::EmptyUrl.into());
    }
    Ok(())
}

/// Map a yt-dlp progress event onto the job progress payload.
pub fn download_progress(event: &DownloadProgress) -> JobProgress {
    match event {
        DownloadProgress::Downloading {
            percent_complete,
            speed,
            eta,
            bytes_downloaded,
            total_bytes,
        } => {
            let percent = percent_complete.unwrap_or(0.0);
            let speed_text = speed
                .map(|s| format!("{:.1} KiB/s", s / 1024.0))
                .unwrap_or_else(|| "N/A".to_string());
            let eta_text = eta
                .map(|e| format!("{}s", e))
                .unwrap_or_else(|| "N/A".to_string());

            JobProgress::percent(percent as u64)
                .with_message(format!("Downloading: {} - ETA: {}", speed_text, eta_text))
                .with_extra("percentComplete", percent)
                .with_extra("speed", speed.unwrap_or(0.0))
                .with_extra("eta", eta.unwrap_or(0))
                .with_extra("bytesDownloaded", bytes_downloaded.unwrap_or(0))
                .with_extra("totalBytes", total_bytes.unwrap_or(0))
        }
        DownloadProgress::Finished => JobProgress::percent(100).with_message("Processing file..."),
    }
}

/// Download operations over a [`VideoFetcher`].
#[derive(Clone)]
pub struct DownloadOrchestrator {
    fetcher: Arc<dyn VideoFetcher>,
}

impl DownloadOrchestrator {
    pub fn new(fetcher: Arc<dyn VideoFetcher>) -> Self {
        Self { fetcher }
    }

    pub async fn download(
        &self,
        url: &str,
        format: Option<&str>,
        progress: &dyn ProgressSink,
    ) -> WorkerResult<DownloadJobResult> {
        require_url(url)?;
        progress.report(JobProgress::percent(0).with_message("Starting download..."));

        let on_progress = |event: DownloadProgress| progress.report(download_progress(&event));
        let record = self.fetcher.download(url, format, &on_progress).await?;

        progress.report(JobProgress::percent(100).with_message("Download finished!"));
        info!(video_id = %record.id, title = %record.title, "Download finished");

        Ok(DownloadJobResult {
            status: ResultStatus::Success,
            video_info: record,
        })
    }

    /// Download `urls` one after another.
    ///
    /// A failed item is recorded and the batch moves on; the job itself
    /// only fails on invalid input.
    pub async fn download_batch(
        &self,
        urls: &[String],
        format: Option<&str>,
        progress: &dyn ProgressSink,
    ) -> WorkerResult<BatchDownloadJobResult> {
        if urls.is_empty() {
            return Err(ModelError::EmptyUrlList.into());
        }

        let total = urls.len();
        let mut results = BatchResult::new(total);
        let ignore = |_: DownloadProgress| {};

        for (idx, url) in urls.iter().enumerate() {
            progress.report(
                JobProgress::new((idx + 1) as u64, total as u64)
                    .with_message(format!("Downloading video {}/{}: {}", idx + 1, total, url))
                    .with_extra("url", url.as_str()),
            );

            let outcome = match require_url(url) {
                Ok(()) => self
                    .fetcher
                    .download(url, format, &ignore)
                    .await
                    .map_err(WorkerError::from),
                Err(e) => Err(e),
            };

            match outcome {
                Ok(record) => {
                    metrics::record_batch_item(true);
                    results.push_success(record);
                }
                Err(e) => {
                    warn!(url = %url, "Batch item failed: {}", e);
                    metrics::record_batch_item(false);
                    results.push_failure(url.as_str(), e.to_string());
                }
            }
        }

        progress.report(JobProgress::new(total as u64, total as u64).with_message(format!(
            "Downloads finished! {} succeeded, {} failed",
            results.successful, results.failed
        )));

        Ok(BatchDownloadJobResult {
            status: ResultStatus::Success,
            results,
        })
    }

    pub async fn video_info(&self, url: &str) -> WorkerResult<VideoInfoJobResult> {
        require_url(url)?;
        let details = self.fetcher.video_info(url).await?;
        Ok(VideoInfoJobResult {
            status: ResultStatus::Success,
            video_info: details,
        })
    }

    pub async fn formats(&self, url: &str) -> WorkerResult<FormatsJobResult> {
        require_url(url)?;
        let formats = self.fetcher.formats(url).await?;
        Ok(FormatsJobResult {
            status: ResultStatus::Success,
            formats,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use vfetch_media::{MediaError, MediaResult, ProgressCallback};
    use vfetch_models::{DownloadRecord, NoopProgress, VideoDetails, VideoFormat};

    struct FakeFetcher;

    #[async_trait]
    impl VideoFetcher for FakeFetcher {
        async fn download(
            &self,
            url: &str,
            _format: Option<&str>,
            on_progress: ProgressCallback<'_>,
        ) -> MediaResult<DownloadRecord> {
            if url.contains("broken") {
                return Err(MediaError::download_failed("Video unavailable"));
            }
            on_progress(DownloadProgress::Downloading {
                percent_complete: Some(50.0),
                speed: Some(2048.0),
                eta: Some(3),
                bytes_downloaded: Some(500),
                total_bytes: Some(1000),
            });
            on_progress(DownloadProgress::Finished);
            let id = url.rsplit('/').next().unwrap_or_default().to_string();
            Ok(DownloadRecord {
                file_path: format!("downloads/{}.mp4", id),
                id,
                title: "clip".to_string(),
                file_size_bytes: 1000,
                duration_seconds: Some(60),
                url: url.to_string(),
                uploader: None,
                upload_date: None,
            })
        }

        async fn video_info(&self, _url: &str) -> MediaResult<VideoDetails> {
            Err(MediaError::extraction_failed("not used"))
        }

        async fn formats(&self, _url: &str) -> MediaResult<Vec<VideoFormat>> {
            Ok(Vec::new())
        }
    }

    #[derive(Default)]
    struct Recorder(Mutex<Vec<JobProgress>>);

    impl ProgressSink for Recorder {
        fn report(&self, progress: JobProgress) {
            self.0.lock().unwrap().push(progress);
        }
    }

    #[tokio::test]
    async fn test_single_download_reports_progress() {
        let downloads = DownloadOrchestrator::new(Arc::new(FakeFetcher));
        let recorder = Recorder::default();

        let result = downloads
            .download("https://youtu.be/abc", None, &recorder)
            .await
            .unwrap();
        assert_eq!(result.video_info.id, "abc");

        let reports = recorder.0.lock().unwrap();
        let currents: Vec<u64> = reports.iter().map(|p| p.current).collect();
        assert_eq!(currents, vec![0, 50, 100, 100]);
        assert_eq!(reports[1].extra["bytesDownloaded"], 500);
        assert_eq!(reports[1].extra["totalBytes"], 1000);
    }

    #[tokio::test]
    async fn test_batch_accounts_for_every_item() {
        let downloads = DownloadOrchestrator::new(Arc::new(FakeFetcher));
        let recorder = Recorder::default();
        let urls: Vec<String> = [
            "https://youtu.be/a",
            "https://youtu.be/broken1",
            "https://youtu.be/c",
            "",
            "https://youtu.be/broken2",
        ]
        .iter()
        .map(|u| u.to_string())
        .collect();

        let result = downloads
            .download_batch(&urls, Some("best"), &recorder)
            .await
            .unwrap()
            .results;

        assert_eq!(result.total, 5);
        assert_eq!(result.successful + result.failed, 5);
        assert_eq!(result.failed, 3);
        assert_eq!(result.successful, result.items.len());
        assert_eq!(result.failed, result.errors.len());
        assert_eq!(result.errors[0].url, "https://youtu.be/broken1");
        assert!(result.errors[0].error.contains("Video unavailable"));

        let reports = recorder.0.lock().unwrap();
        assert_eq!(reports[0].current, 1);
        assert_eq!(reports[0].total, 5);
        assert_eq!(reports[2].extra["url"], "https://youtu.be/c");
    }

    #[tokio::test]
    async fn test_empty_batch_is_invalid() {
        let downloads = DownloadOrchestrator::new(Arc::new(FakeFetcher));
        let err = downloads
            .download_batch(&[], None, &NoopProgress)
            .await
            .unwrap_err();
        assert!(err.is_permanent());
    }
}
