//! Parsing of yt-dlp `--dump-single-json` output.

use serde_json::Value;

use vfetch_models::{VideoDetails, VideoFormat};

use crate::error::{MediaError, MediaResult};

fn str_field(info: &Value, key: &str) -> Option<String> {
    info.get(key).and_then(Value::as_str).map(str::to_string)
}

/// yt-dlp reports durations as floats for some extractors.
fn seconds_field(info: &Value, key: &str) -> Option<u64> {
    let value = info.get(key)?;
    value
        .as_u64()
        .or_else(|| value.as_f64().filter(|f| *f >= 0.0).map(|f| f.round() as u64))
}

/// Build video details from an info dict.
pub fn details_from_json(info: &Value) -> MediaResult<VideoDetails> {
    let id = str_field(info, "id")
        .ok_or_else(|| MediaError::extraction_failed("info JSON has no video id"))?;

    Ok(VideoDetails {
        id,
        title: str_field(info, "title").unwrap_or_default(),
        duration_seconds: seconds_field(info, "duration"),
        uploader: str_field(info, "uploader"),
        upload_date: str_field(info, "upload_date"),
        description: str_field(info, "description"),
        thumbnail: str_field(info, "thumbnail"),
        view_count: seconds_field(info, "view_count"),
        like_count: seconds_field(info, "like_count"),
        formats_available: info
            .get("formats")
            .and_then(Value::as_array)
            .map_or(0, Vec::len),
    })
}

/// List the formats of an info dict.
pub fn formats_from_json(info: &Value) -> Vec<VideoFormat> {
    info.get("formats")
        .and_then(Value::as_array)
        .map(|formats| {
            formats
                .iter()
                .map(|f| VideoFormat {
                    format_id: str_field(f, "format_id").unwrap_or_default(),
                    format: str_field(f, "format"),
                    ext: str_field(f, "ext"),
                    resolution: str_field(f, "resolution").unwrap_or_else(|| "N/A".to_string()),
                    fps: f.get("fps").and_then(Value::as_f64),
                    vcodec: str_field(f, "vcodec"),
                    acodec: str_field(f, "acodec"),
                    filesize: f.get("filesize").and_then(Value::as_u64),
                })
                .collect()
        })
        .unwrap_or_default()
}
