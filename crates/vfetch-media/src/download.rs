//! Video download and metadata lookup using yt-dlp.
//!
//! Downloads stream yt-dlp's stdout line by line: progress lines come from
//! a custom `--progress-template`, and a final `--print after_move:` line
//! carries the metadata of the file that ended up on disk.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::Command;
use tracing::{debug, info};

use vfetch_models::{DownloadProgress, DownloadRecord, VideoDetails, VideoFormat};

use crate::command::{last_error_line, run_captured, ytdlp_path};
use crate::error::{MediaError, MediaResult};
use crate::info::{details_from_json, formats_from_json};

const PROGRESS_PREFIX: &str = "vfetch-progress ";
const FILE_PREFIX: &str = "vfetch-file ";

const PROGRESS_TEMPLATE: &str = "download:vfetch-progress %(progress.downloaded_bytes)s \
     %(progress.total_bytes)s %(progress.total_bytes_estimate)s %(progress.speed)s %(progress.eta)s";

const FILE_TEMPLATE: &str =
    "after_move:vfetch-file %(.{id,title,duration,uploader,upload_date,ext,filepath})j";

/// Default yt-dlp format selector.
pub const DEFAULT_FORMAT: &str = "best";

/// Callback receiving download progress.
pub type ProgressCallback<'a> = &'a (dyn Fn(DownloadProgress) + Send + Sync);

/// Video platform access: download, metadata and format listing.
#[async_trait]
pub trait VideoFetcher: Send + Sync {
    /// Download one video into the output directory as `<id>.<ext>`.
    ///
    /// `on_progress` sees zero or more `Downloading` snapshots and exactly
    /// one `Finished` marker before the record is returned.
    async fn download(
        &self,
        url: &str,
        format: Option<&str>,
        on_progress: ProgressCallback<'_>,
    ) -> MediaResult<DownloadRecord>;

    /// Metadata without downloading.
    async fn video_info(&self, url: &str) -> MediaResult<VideoDetails>;

    /// Downloadable formats.
    async fn formats(&self, url: &str) -> MediaResult<Vec<VideoFormat>>;
}

/// yt-dlp backed fetcher.
#[derive(Debug, Clone)]
pub struct YtDlp {
    output_dir: PathBuf,
}

impl YtDlp {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    fn download_args(&self, url: &str, format: &str) -> Vec<String> {
        let template = self.output_dir.join("%(id)s.%(ext)s");
        vec![
            "--newline".to_string(),
            "--progress".to_string(),
            "--no-simulate".to_string(),
            "--no-playlist".to_string(),
            "--progress-template".to_string(),
            PROGRESS_TEMPLATE.to_string(),
            "--print".to_string(),
            FILE_TEMPLATE.to_string(),
            "-f".to_string(),
            format.to_string(),
            "-o".to_string(),
            template.to_string_lossy().into_owned(),
            url.to_string(),
        ]
    }

    async fn dump_json(&self, url: &str) -> MediaResult<serde_json::Value> {
        let program = ytdlp_path()?;
        let args = vec![
            "--dump-single-json".to_string(),
            "--no-playlist".to_string(),
            "--skip-download".to_string(),
            url.to_string(),
        ];

        let output = run_captured(&program, &args).await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(MediaError::extraction_failed(last_error_line(&stderr)));
        }

        Ok(serde_json::from_slice(&output.stdout)?)
    }
}

/// Metadata printed by yt-dlp after the file was moved into place.
#[derive(Debug, Deserialize)]
struct DownloadedFile {
    id: String,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    duration: Option<f64>,
    #[serde(default)]
    uploader: Option<String>,
    #[serde(default)]
    upload_date: Option<String>,
    #[serde(default)]
    ext: Option<String>,
    #[serde(default)]
    filepath: Option<String>,
}

fn parse_field(raw: Option<&str>) -> Option<f64> {
    raw.filter(|s| *s != "NA" && *s != "None")
        .and_then(|s| s.parse::<f64>().ok())
}

/// Parse one line produced by the progress template.
pub fn parse_progress_line(line: &str) -> Option<DownloadProgress> {
    let rest = line.trim().strip_prefix(PROGRESS_PREFIX)?;
    let mut fields = rest.split_whitespace();

    let downloaded = parse_field(fields.next());
    let total = parse_field(fields.next());
    let estimate = parse_field(fields.next());
    let speed = parse_field(fields.next());
    let eta = parse_field(fields.next());

    let total = total.or(estimate);
    let percent_complete = match (downloaded, total) {
        (Some(done), Some(total)) if total > 0.0 => Some((done / total * 100.0).min(100.0)),
        _ => None,
    };

    Some(DownloadProgress::Downloading {
        percent_complete,
        speed,
        eta: eta.map(|e| e as u64),
        bytes_downloaded: downloaded.map(|d| d as u64),
        total_bytes: total.map(|t| t as u64),
    })
}

fn parse_file_line(line: &str) -> Option<DownloadedFile> {
    let json = line.trim().strip_prefix(FILE_PREFIX)?;
    serde_json::from_str(json).ok()
}

#[async_trait]
impl VideoFetcher for YtDlp {
    async fn download(
        &self,
        url: &str,
        format: Option<&str>,
        on_progress: ProgressCallback<'_>,
    ) -> MediaResult<DownloadRecord> {
        let program = ytdlp_path()?;
        tokio::fs::create_dir_all(&self.output_dir).await?;

        info!(url = %url, output_dir = %self.output_dir.display(), "Downloading video");

        let args = self.download_args(url, format.unwrap_or(DEFAULT_FORMAT));
        let mut child = Command::new(&program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| MediaError::download_failed("yt-dlp stdout not captured"))?;
        let mut stderr = child
            .stderr
            .take()
            .ok_or_else(|| MediaError::download_failed("yt-dlp stderr not captured"))?;

        let stderr_task = tokio::spawn(async move {
            let mut buf = String::new();
            stderr.read_to_string(&mut buf).await.ok();
            buf
        });

        let mut downloaded = None;
        let mut lines = BufReader::new(stdout).lines();
        while let Some(line) = lines.next_line().await? {
            if let Some(progress) = parse_progress_line(&line) {
                on_progress(progress);
            } else if let Some(file) = parse_file_line(&line) {
                downloaded = Some(file);
            } else {
                debug!("yt-dlp: {}", line);
            }
        }

        let status = child.wait().await?;
        let stderr = stderr_task.await.unwrap_or_default();

        if !status.success() {
            debug!("yt-dlp stderr: {}", stderr);
            return Err(MediaError::download_failed(format!(
                "yt-dlp failed: {}",
                last_error_line(&stderr)
            )));
        }

        let file = downloaded
            .ok_or_else(|| MediaError::download_failed("yt-dlp did not report a file"))?;

        let file_path = file.filepath.map(PathBuf::from).unwrap_or_else(|| {
            let ext = file.ext.as_deref().unwrap_or("mp4");
            self.output_dir.join(format!("{}.{}", file.id, ext))
        });

        let file_size_bytes = tokio::fs::metadata(&file_path)
            .await
            .map(|m| m.len())
            .unwrap_or(0);

        on_progress(DownloadProgress::Finished);

        info!(
            video_id = %file.id,
            output = %file_path.display(),
            size_mb = file_size_bytes as f64 / (1024.0 * 1024.0),
            "Downloaded video successfully"
        );

        Ok(DownloadRecord {
            id: file.id,
            title: file.title.unwrap_or_default(),
            file_path: file_path.to_string_lossy().into_owned(),
            file_size_bytes,
            duration_seconds: file.duration.map(|d| d.round() as u64),
            url: url.to_string(),
            uploader: file.uploader,
            upload_date: file.upload_date,
        })
    }

    async fn video_info(&self, url: &str) -> MediaResult<VideoDetails> {
        let info = self.dump_json(url).await?;
        details_from_json(&info)
    }

    async fn formats(&self, url: &str) -> MediaResult<Vec<VideoFormat>> {
        let info = self.dump_json(url).await?;
        Ok(formats_from_json(&info))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_progress_line() {
        let line = "vfetch-progress 524288 1048576 NA 262144.5 2";
        match parse_progress_line(line) {
            Some(DownloadProgress::Downloading {
                percent_complete,
                speed,
                eta,
                bytes_downloaded,
                total_bytes,
            }) => {
                assert_eq!(percent_complete, Some(50.0));
                assert_eq!(speed, Some(262144.5));
                assert_eq!(eta, Some(2));
                assert_eq!(bytes_downloaded, Some(524288));
                assert_eq!(total_bytes, Some(1048576));
            }
            other => panic!("unexpected progress: {other:?}"),
        }
    }

    #[test]
    fn test_progress_falls_back_to_estimate() {
        let line = "vfetch-progress 100 NA 400.0 NA NA";
        match parse_progress_line(line) {
            Some(DownloadProgress::Downloading {
                percent_complete,
                eta,
                ..
            }) => {
                assert_eq!(percent_complete, Some(25.0));
                assert_eq!(eta, None);
            }
            other => panic!("unexpected progress: {other:?}"),
        }
    }

    #[test]
    fn test_other_lines_are_not_progress() {
        assert!(parse_progress_line("[youtube] abc: Downloading webpage").is_none());
    }

    #[test]
    fn test_parse_file_line() {
        let line = r#"vfetch-file {"id": "abc", "title": "Gol", "duration": 59.6, "ext": "mp4", "filepath": "downloads/abc.mp4"}"#;
        let file = parse_file_line(line).unwrap();
        assert_eq!(file.id, "abc");
        assert_eq!(file.duration, Some(59.6));
        assert_eq!(file.filepath.as_deref(), Some("downloads/abc.mp4"));
        assert!(file.uploader.is_none());
    }

    #[test]
    fn test_download_args_use_id_template() {
        let ytdlp = YtDlp::new("downloads");
        let args = ytdlp.download_args("https://youtu.be/abc", "best");
        let output = args
            .iter()
            .position(|a| a == "-o")
            .map(|i| args[i + 1].clone())
            .unwrap();
        assert!(output.ends_with("%(id)s.%(ext)s"));
        assert_eq!(args.last().map(String::as_str), Some("https://youtu.be/abc"));
    }
}
