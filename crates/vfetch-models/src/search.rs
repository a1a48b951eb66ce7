//! Search request types.

use chrono::Duration;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::{ModelError, ModelResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum SearchMode {
    /// Caller supplied query
    #[default]
    Manual,
    /// Fixed recurring queries against the configured channels
    Auto,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum SortBy {
    #[default]
    Relevance,
    Date,
}

impl SortBy {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortBy::Relevance => "relevance",
            SortBy::Date => "date",
        }
    }
}

/// Upload-time bucket for manual searches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum TimeRange {
    #[default]
    Any,
    Hour,
    Day,
    Week,
    Month,
    Year,
}

impl TimeRange {
    /// Lookback window, `None` for unbounded.
    pub fn window(&self) -> Option<Duration> {
        match self {
            TimeRange::Any => None,
            TimeRange::Hour => Some(Duration::hours(1)),
            TimeRange::Day => Some(Duration::days(1)),
            TimeRange::Week => Some(Duration::weeks(1)),
            TimeRange::Month => Some(Duration::days(30)),
            TimeRange::Year => Some(Duration::days(365)),
        }
    }
}

/// Parameters of a search job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct SearchRequest {
    #[serde(default)]
    pub mode: SearchMode,
    #[serde(default)]
    pub query: Option<String>,
    #[serde(default)]
    pub channel_ids: Vec<String>,
    #[serde(default)]
    pub sort_by: SortBy,
    #[serde(default)]
    pub time_range: TimeRange,
    /// Minutes; `0` disables the filter like `None`
    #[serde(default)]
    pub max_duration_minutes: Option<u32>,
}

impl SearchRequest {
    pub fn manual(query: impl Into<String>) -> Self {
        Self {
            mode: SearchMode::Manual,
            query: Some(query.into()),
            ..Default::default()
        }
    }

    pub fn auto() -> Self {
        Self {
            mode: SearchMode::Auto,
            ..Default::default()
        }
    }

    pub fn validate(&self) -> ModelResult<()> {
        if self.mode == SearchMode::Manual
            && self.query.as_deref().map_or(true, |q| q.trim().is_empty())
        {
            return Err(ModelError::MissingQuery);
        }
        Ok(())
    }

    /// Duration ceiling in seconds, if the filter is active.
    pub fn max_duration_seconds(&self) -> Option<u64> {
        self.max_duration_minutes
            .filter(|m| *m > 0)
            .map(|m| u64::from(m) * 60)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_requires_query() {
        let mut request = SearchRequest::manual("   ");
        assert_eq!(request.validate(), Err(ModelError::MissingQuery));

        request.query = Some("final".to_string());
        assert!(request.validate().is_ok());
        assert!(SearchRequest::auto().validate().is_ok());
    }

    #[test]
    fn test_zero_max_duration_disables_filter() {
        let mut request = SearchRequest::manual("q");
        request.max_duration_minutes = Some(0);
        assert_eq!(request.max_duration_seconds(), None);

        request.max_duration_minutes = Some(10);
        assert_eq!(request.max_duration_seconds(), Some(600));
    }

    #[test]
    fn test_request_defaults_from_json() {
        let request: SearchRequest =
            serde_json::from_str(r#"{"query": "gol", "timeRange": "week"}"#).unwrap();
        assert_eq!(request.mode, SearchMode::Manual);
        assert_eq!(request.sort_by, SortBy::Relevance);
        assert_eq!(request.time_range, TimeRange::Week);
    }
}
