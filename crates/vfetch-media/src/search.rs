//! Platform search through the YouTube Data API v3.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Deserialize;
use tracing::debug;
use url::Url;

use vfetch_models::{SortBy, VideoSummary};

use crate::error::{MediaError, MediaResult};

pub const YOUTUBE_API_BASE: &str = "https://www.googleapis.com/youtube/v3";

/// One search call.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchQuery {
    pub query: String,
    pub channel_id: Option<String>,
    pub order: SortBy,
    pub published_after: Option<DateTime<Utc>>,
    pub max_results: u32,
}

impl SearchQuery {
    pub fn new(query: impl Into<String>, max_results: u32) -> Self {
        Self {
            query: query.into(),
            channel_id: None,
            order: SortBy::Relevance,
            published_after: None,
            max_results,
        }
    }

    pub fn with_channel(mut self, channel_id: Option<String>) -> Self {
        self.channel_id = channel_id;
        self
    }

    pub fn with_order(mut self, order: SortBy) -> Self {
        self.order = order;
        self
    }

    pub fn with_published_after(mut self, after: Option<DateTime<Utc>>) -> Self {
        self.published_after = after;
        self
    }
}

/// Search capability keyed by an API credential.
#[async_trait]
pub trait SearchBackend: Send + Sync {
    async fn search(&self, api_key: &str, query: &SearchQuery) -> MediaResult<Vec<VideoSummary>>;
}

/// YouTube Data API v3 client.
#[derive(Debug, Clone)]
pub struct YouTubeDataApi {
    http: reqwest::Client,
    base_url: String,
}

impl YouTubeDataApi {
    pub fn new(http: reqwest::Client) -> Self {
        Self::with_base_url(http, YOUTUBE_API_BASE)
    }

    pub fn with_base_url(http: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    async fn get_json<T: for<'de> Deserialize<'de>>(&self, url: Url) -> MediaResult<T> {
        let response = self.http.get(url).send().await?;
        let status = response.status();

        if !status.is_success() {
            let body: ApiErrorBody = response.json().await.unwrap_or_default();
            return Err(MediaError::SearchRejected {
                status: status.as_u16(),
                message: body
                    .error
                    .map(|e| e.message)
                    .unwrap_or_else(|| status.to_string()),
            });
        }

        Ok(response.json().await?)
    }

    fn endpoint(&self, path: &str, params: &[(&str, String)]) -> MediaResult<Url> {
        Url::parse_with_params(&format!("{}/{}", self.base_url, path), params)
            .map_err(|e| MediaError::search_failed(format!("invalid API URL: {}", e)))
    }

    async fn durations(
        &self,
        api_key: &str,
        ids: &[String],
    ) -> MediaResult<HashMap<String, u64>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }

        let url = self.endpoint(
            "videos",
            &[
                ("part", "contentDetails".to_string()),
                ("id", ids.join(",")),
                ("key", api_key.to_string()),
            ],
        )?;
        let response: VideosResponse = self.get_json(url).await?;

        Ok(response
            .items
            .into_iter()
            .filter_map(|item| {
                let seconds = parse_iso8601_duration(&item.content_details?.duration?)?;
                Some((item.id, seconds))
            })
            .collect())
    }
}

#[async_trait]
impl SearchBackend for YouTubeDataApi {
    async fn search(&self, api_key: &str, query: &SearchQuery) -> MediaResult<Vec<VideoSummary>> {
        let mut params = vec![
            ("part", "snippet".to_string()),
            ("type", "video".to_string()),
            ("q", query.query.clone()),
            ("maxResults", query.max_results.to_string()),
            ("order", query.order.as_str().to_string()),
            ("key", api_key.to_string()),
        ];
        if let Some(channel_id) = &query.channel_id {
            params.push(("channelId", channel_id.clone()));
        }
        if let Some(after) = query.published_after {
            params.push((
                "publishedAfter",
                after.to_rfc3339_opts(SecondsFormat::Secs, true),
            ));
        }

        let url = self.endpoint("search", &params)?;
        let response: SearchResponse = self.get_json(url).await?;

        let hits: Vec<(String, Snippet)> = response
            .items
            .into_iter()
            .filter_map(|item| Some((item.id.video_id?, item.snippet)))
            .collect();

        let ids: Vec<String> = hits.iter().map(|(id, _)| id.clone()).collect();
        let durations = self.durations(api_key, &ids).await?;

        debug!(query = %query.query, hits = hits.len(), "Search completed");

        Ok(hits
            .into_iter()
            .map(|(id, snippet)| VideoSummary {
                url: VideoSummary::watch_url(&id),
                duration_seconds: durations.get(&id).copied(),
                title: snippet.title,
                channel: snippet.channel_title,
                upload_date: snippet.published_at.as_deref().and_then(to_upload_date),
                id,
            })
            .collect())
    }
}

/// RFC 3339 timestamp to `YYYYMMDD`.
fn to_upload_date(published_at: &str) -> Option<String> {
    DateTime::parse_from_rfc3339(published_at)
        .ok()
        .map(|dt| dt.format("%Y%m%d").to_string())
}

/// Parse ISO 8601 durations like `PT1H2M3S` or `P1DT5M`.
pub fn parse_iso8601_duration(raw: &str) -> Option<u64> {
    let rest = raw.strip_prefix('P')?;
    let (date_part, time_part) = match rest.split_once('T') {
        Some((d, t)) => (d, t),
        None => (rest, ""),
    };

    fn sum(part: &str, units: &[(char, u64)]) -> Option<u64> {
        let mut total = 0;
        let mut number = String::new();
        for c in part.chars() {
            if c.is_ascii_digit() {
                number.push(c);
                continue;
            }
            let (_, factor) = units.iter().find(|(u, _)| *u == c)?;
            let value = number.parse::<u64>().ok()?.checked_mul(*factor)?;
            total = value.checked_add(total)?;
            number.clear();
        }
        number.is_empty().then_some(total)
    }

    let days = sum(date_part, &[('W', 604_800), ('D', 86_400)])?;
    let time = sum(time_part, &[('H', 3600), ('M', 60), ('S', 1)])?;
    days.checked_add(time)
}

#[derive(Debug, Deserialize, Default)]
struct ApiErrorBody {
    error: Option<ApiErrorDetail>,
}

#[derive(Debug, Deserialize, Default)]
struct ApiErrorDetail {
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    items: Vec<SearchItem>,
}

#[derive(Debug, Deserialize)]
struct SearchItem {
    id: SearchItemId,
    snippet: Snippet,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchItemId {
    video_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Snippet {
    #[serde(default)]
    title: String,
    channel_title: Option<String>,
    published_at: Option<String>,
}

#[derive(Debug, Deserialize)]
struct VideosResponse {
    #[serde(default)]
    items: Vec<VideoItem>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VideoItem {
    id: String,
    content_details: Option<ContentDetails>,
}

#[derive(Debug, Deserialize)]
struct ContentDetails {
    duration: Option<String>,
}
