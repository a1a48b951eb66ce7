//! Manual and automatic video search with key failover.

use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use tracing::info;

use vfetch_media::{SearchBackend, SearchQuery};
use vfetch_models::{
    JobProgress, ProgressSink, ResultStatus, SearchJobResult, SearchMode, SearchRequest, SortBy,
    VideoSummary,
};

use crate::config::KeyResetPolicy;
use crate::error::WorkerResult;
use crate::key_rotation::{RotationPolicy, SharedKeyPool};

/// Results kept for a manual search.
pub const MANUAL_RESULT_LIMIT: usize = 20;
/// Results requested per automatic query.
pub const AUTO_RESULTS_PER_QUERY: u32 = 10;
/// Automatic mode only keeps uploads this recent.
pub const AUTO_MAX_AGE_DAYS: i64 = 7;

/// Runs search requests against a backend through a key pool.
#[derive(Clone)]
pub struct SearchOrchestrator {
    backend: Arc<dyn SearchBackend>,
    keys: SharedKeyPool,
    rotation: RotationPolicy,
    reset_policy: KeyResetPolicy,
    auto_queries: Vec<String>,
    auto_channel_ids: Vec<String>,
}

impl SearchOrchestrator {
    pub fn new(backend: Arc<dyn SearchBackend>, keys: SharedKeyPool) -> Self {
        Self {
            backend,
            keys,
            rotation: RotationPolicy::default(),
            reset_policy: KeyResetPolicy::default(),
            auto_queries: Vec::new(),
            auto_channel_ids: Vec::new(),
        }
    }

    pub fn with_rotation(mut self, rotation: RotationPolicy) -> Self {
        self.rotation = rotation;
        self
    }

    pub fn with_reset_policy(mut self, policy: KeyResetPolicy) -> Self {
        self.reset_policy = policy;
        self
    }

    pub fn with_auto_plan(mut self, queries: Vec<String>, channel_ids: Vec<String>) -> Self {
        self.auto_queries = queries;
        self.auto_channel_ids = channel_ids;
        self
    }

    pub async fn run(
        &self,
        request: &SearchRequest,
        progress: &dyn ProgressSink,
    ) -> WorkerResult<SearchJobResult> {
        request.validate()?;

        progress.report(JobProgress::percent(0).with_message("Starting search..."));

        let (calls, filter) = match request.mode {
            SearchMode::Manual => {
                let query = request.query.clone().unwrap_or_default();
                progress.report(
                    JobProgress::percent(50).with_message(format!("Searching: {}...", query)),
                );
                (self.manual_plan(request, &query), ResultFilter::manual(request))
            }
            SearchMode::Auto => {
                progress.report(JobProgress::percent(50).with_message("Searching automatically..."));
                (self.auto_plan(), ResultFilter::Recent)
            }
        };

        let mut pool = self.keys.lock().await;
        if self.reset_policy == KeyResetPolicy::PerOperation {
            pool.reset();
        }

        let backend = Arc::clone(&self.backend);
        let videos = pool
            .execute_with_rotation(&self.rotation, |key| {
                let backend = Arc::clone(&backend);
                let calls = calls.clone();
                let filter = filter.clone();
                async move {
                    // Rebuilt from scratch on every attempt
                    let mut videos = Vec::new();
                    for call in &calls {
                        let hits = backend.search(&key, call).await?;
                        videos.extend(hits.into_iter().filter(|v| filter.keep(v)));
                    }
                    Ok::<_, vfetch_media::MediaError>(filter.limit(videos))
                }
            })
            .await?;

        let key_status = pool.status();
        drop(pool);

        info!(
            mode = ?request.mode,
            videos = videos.len(),
            total_keys = key_status.total_keys,
            current_key_index = key_status.current_key_index,
            failed_keys = key_status.failed_keys_count,
            "Search finished"
        );

        progress.report(
            JobProgress::percent(100)
                .with_message(format!("Search finished, {} videos found.", videos.len())),
        );

        Ok(SearchJobResult {
            status: ResultStatus::Success,
            total_videos: videos.len(),
            videos,
            key_status,
        })
    }

    fn manual_plan(&self, request: &SearchRequest, query: &str) -> Vec<SearchQuery> {
        let published_after = request.time_range.window().map(|w| Utc::now() - w);
        let base = SearchQuery::new(query, MANUAL_RESULT_LIMIT as u32)
            .with_order(request.sort_by)
            .with_published_after(published_after);

        if request.channel_ids.is_empty() {
            return vec![base];
        }
        request
            .channel_ids
            .iter()
            .map(|id| base.clone().with_channel(Some(id.clone())))
            .collect()
    }

    fn auto_plan(&self) -> Vec<SearchQuery> {
        let published_after = Some(Utc::now() - chrono::Duration::days(AUTO_MAX_AGE_DAYS));
        let channels: Vec<Option<String>> = if self.auto_channel_ids.is_empty() {
            vec![None]
        } else {
            self.auto_channel_ids.iter().cloned().map(Some).collect()
        };

        self.auto_queries
            .iter()
            .flat_map(|query| {
                channels.iter().map(move |channel| {
                    SearchQuery::new(query.clone(), AUTO_RESULTS_PER_QUERY)
                        .with_channel(channel.clone())
                        .with_order(SortBy::Date)
                        .with_published_after(published_after)
                })
            })
            .collect()
    }
}

#[derive(Debug, Clone)]
enum ResultFilter {
    /// Drop videos longer than the limit, keep at most 20.
    Manual { max_duration_seconds: Option<u64> },
    /// Drop uploads older than seven days.
    Recent,
}

impl ResultFilter {
    fn manual(request: &SearchRequest) -> Self {
        Self::Manual {
            max_duration_seconds: request.max_duration_seconds(),
        }
    }

    fn keep(&self, video: &VideoSummary) -> bool {
        match self {
            ResultFilter::Manual {
                max_duration_seconds,
            } => within_duration(video, *max_duration_seconds),
            ResultFilter::Recent => is_recent(video.upload_date.as_deref(), AUTO_MAX_AGE_DAYS),
        }
    }

    fn limit(&self, mut videos: Vec<VideoSummary>) -> Vec<VideoSummary> {
        if let ResultFilter::Manual { .. } = self {
            videos.truncate(MANUAL_RESULT_LIMIT);
        }
        videos
    }
}

/// Unknown durations pass; the limit itself is inclusive.
pub fn within_duration(video: &VideoSummary, max_seconds: Option<u64>) -> bool {
    match (max_seconds, video.duration_seconds) {
        (Some(max), Some(duration)) => duration <= max,
        _ => true,
    }
}

/// `YYYYMMDD` uploads older than `max_age_days` fail; unparseable or
/// missing dates pass.
pub fn is_recent(upload_date: Option<&str>, max_age_days: i64) -> bool {
    let Some(date) = upload_date.and_then(|d| NaiveDate::parse_from_str(d, "%Y%m%d").ok()) else {
        return true;
    };
    let Some(midnight) = date.and_hms_opt(0, 0, 0) else {
        return true;
    };
    Utc::now().naive_utc() - midnight <= chrono::Duration::days(max_age_days)
}
