//! Input validation for user-supplied URLs and identifiers.

use url::Url;

use crate::error::{ApiError, ApiResult};

/// Maximum URL length.
pub const MAX_URL_LENGTH: usize = 2048;

/// Validate a video URL and return it trimmed.
///
/// Only absolute http(s) URLs with a host are accepted; whether the site is
/// supported is left to the downloader.
pub fn validate_video_url(url: &str) -> ApiResult<String> {
    let url = url.trim();
    if url.is_empty() {
        return Err(ApiError::Validation("URL is required".to_string()));
    }
    if url.len() > MAX_URL_LENGTH {
        return Err(ApiError::Validation(format!(
            "URL exceeds {} characters",
            MAX_URL_LENGTH
        )));
    }

    let parsed = Url::parse(url)
        .map_err(|e| ApiError::Validation(format!("Invalid URL format: {}", e)))?;

    match parsed.scheme() {
        "http" | "https" => {}
        scheme => {
            return Err(ApiError::Validation(format!(
                "Invalid protocol '{}'. Only HTTP and HTTPS are allowed.",
                scheme
            )))
        }
    }

    if parsed.host_str().is_none() {
        return Err(ApiError::Validation(
            "URL must have a valid domain".to_string(),
        ));
    }

    Ok(url.to_string())
}

/// Validate job ID format.
///
/// Valid format: alphanumeric characters and hyphens only, 8-64 chars.
pub fn is_valid_job_id(id: &str) -> bool {
    if id.len() > 64 || id.len() < 8 {
        return false;
    }
    id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_http_urls() {
        assert_eq!(
            validate_video_url("  https://www.youtube.com/watch?v=abc ").unwrap(),
            "https://www.youtube.com/watch?v=abc"
        );
        assert!(validate_video_url("http://youtu.be/abc").is_ok());
    }

    #[test]
    fn test_rejects_bad_urls() {
        assert!(validate_video_url("").is_err());
        assert!(validate_video_url("not a url").is_err());
        assert!(validate_video_url("file:///etc/passwd").is_err());
        assert!(validate_video_url(&format!("https://a.com/{}", "x".repeat(2100))).is_err());
    }

    #[test]
    fn test_job_ids() {
        assert!(is_valid_job_id("550e8400-e29b-41d4-a716-446655440000"));
        assert!(is_valid_job_id("abc12345"));
        assert!(!is_valid_job_id("short"));
        assert!(!is_valid_job_id("has_underscore"));
        assert!(!is_valid_job_id("../../etc"));
        assert!(!is_valid_job_id(&"a".repeat(65)));
    }
}
