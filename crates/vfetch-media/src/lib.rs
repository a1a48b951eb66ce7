//! Adapters for the external tools and services behind vfetch jobs.
//!
//! - [`YtDlp`] downloads videos and reads metadata through yt-dlp
//! - [`YouTubeDataApi`] searches the platform with an API key
//! - [`FfmpegSceneDetector`] finds scene cuts from FFmpeg frame scores
//! - [`UploadStaging`] holds uploaded files until detection consumes them
//!
//! Each capability sits behind a trait so workers can be driven by fakes.

pub mod command;
pub mod download;
pub mod error;
pub mod info;
pub mod scenes;
pub mod search;
pub mod staging;

pub use download::{parse_progress_line, ProgressCallback, VideoFetcher, YtDlp, DEFAULT_FORMAT};
pub use error::{MediaError, MediaResult};
pub use scenes::{
    detect_cuts, parse_scdet_output, scenes_from_cuts, FfmpegSceneDetector, FrameScore,
    SceneDetector,
};
pub use search::{parse_iso8601_duration, SearchBackend, SearchQuery, YouTubeDataApi};
pub use staging::{sanitize_filename, UploadStaging, DEFAULT_UPLOAD_DIR};
