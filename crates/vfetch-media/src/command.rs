//! External tool lookup and invocation.

use std::path::PathBuf;
use std::process::{Output, Stdio};

use tokio::process::Command;
use tracing::debug;

use crate::error::{MediaError, MediaResult};

/// Locate yt-dlp in PATH.
pub fn ytdlp_path() -> MediaResult<PathBuf> {
    which::which("yt-dlp").map_err(|_| MediaError::YtDlpNotFound)
}

/// Locate ffmpeg in PATH.
pub fn ffmpeg_path() -> MediaResult<PathBuf> {
    which::which("ffmpeg").map_err(|_| MediaError::FfmpegNotFound)
}

/// Run a command to completion with captured output.
pub async fn run_captured(program: &PathBuf, args: &[String]) -> MediaResult<Output> {
    debug!("Running {} {}", program.display(), args.join(" "));

    let output = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .output()
        .await?;

    Ok(output)
}

/// Last non-empty stderr line, which is where yt-dlp and ffmpeg put the
/// actual error.
pub fn last_error_line(stderr: &str) -> String {
    stderr
        .lines()
        .rev()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .unwrap_or("Unknown error")
        .to_string()
}
