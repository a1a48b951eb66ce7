//! Scene boundary detection over FFmpeg's `scdet` frame scores.
//!
//! FFmpeg is run once with `scdet=t=0` so every frame's difference score is
//! logged to stderr. Cut decisions happen here, on the parsed scores, so the
//! adaptive and content strategies share one decoding pass.
//!
//! Thresholds are expressed on the 0-255 content scale; `scdet` reports
//! 0-100, so absolute thresholds are rescaled before comparison.

use std::path::Path;
use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use tracing::{debug, info};

use vfetch_models::{DetectionMethod, SceneRecord};

use crate::command::{ffmpeg_path, last_error_line, run_captured};
use crate::error::{MediaError, MediaResult};

/// Minimum frames between two cuts.
pub const MIN_SCENE_LEN_FRAMES: u64 = 15;

/// Frames on each side of the target frame in the adaptive average.
pub const ADAPTIVE_WINDOW: usize = 2;

/// Minimum absolute score for an adaptive cut, on the 0-255 scale.
pub const MIN_CONTENT_VAL: f64 = 15.0;

const ADAPTIVE_RATIO_CAP: f64 = 255.0;
const DEFAULT_FPS: f64 = 30.0;

static FPS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d+(?:\.\d+)?) fps").expect("valid fps regex")
});

/// Difference score of one decoded frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameScore {
    pub frame: u64,
    /// `scdet` score, 0-100.
    pub score: f64,
}

/// Everything recovered from one `scdet` pass.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameAnalysis {
    pub scores: Vec<FrameScore>,
    pub fps: f64,
    pub duration: Option<f64>,
}

impl FrameAnalysis {
    /// Frame index one past the last frame of the video.
    pub fn end_frame(&self) -> u64 {
        let from_scores = self.scores.last().map_or(0, |s| s.frame + 1);
        let from_duration = self
            .duration
            .map_or(0, |d| (d * self.fps).round() as u64);
        from_scores.max(from_duration)
    }
}

/// Scene detection capability.
#[async_trait]
pub trait SceneDetector: Send + Sync {
    async fn detect(
        &self,
        video_path: &Path,
        method: DetectionMethod,
        adaptive_threshold: f64,
        content_threshold: f64,
    ) -> MediaResult<Vec<SceneRecord>>;
}

/// FFmpeg-backed detector.
#[derive(Debug, Clone, Default)]
pub struct FfmpegSceneDetector;

impl FfmpegSceneDetector {
    pub fn new() -> Self {
        Self
    }

    async fn analyze(&self, video_path: &Path) -> MediaResult<FrameAnalysis> {
        let program = ffmpeg_path()?;
        let args = vec![
            "-hide_banner".to_string(),
            "-nostats".to_string(),
            "-i".to_string(),
            video_path.to_string_lossy().into_owned(),
            "-vf".to_string(),
            "scdet=t=0:s=0".to_string(),
            "-an".to_string(),
            "-f".to_string(),
            "null".to_string(),
            "-".to_string(),
        ];

        let output = run_captured(&program, &args).await?;
        let stderr = String::from_utf8_lossy(&output.stderr);

        if !output.status.success() {
            return Err(MediaError::ffmpeg_failed(
                last_error_line(&stderr),
                Some(stderr.to_string()),
                output.status.code(),
            ));
        }

        Ok(parse_scdet_output(&stderr))
    }
}

#[async_trait]
impl SceneDetector for FfmpegSceneDetector {
    async fn detect(
        &self,
        video_path: &Path,
        method: DetectionMethod,
        adaptive_threshold: f64,
        content_threshold: f64,
    ) -> MediaResult<Vec<SceneRecord>> {
        if !video_path.exists() {
            return Err(MediaError::FileNotFound(video_path.to_path_buf()));
        }

        info!(
            path = %video_path.display(),
            method = %method,
            adaptive_threshold,
            content_threshold,
            "Running scene detection"
        );

        let analysis = self.analyze(video_path).await?;
        let cuts = detect_cuts(
            &analysis.scores,
            method,
            adaptive_threshold,
            content_threshold,
        );
        let scenes = scenes_from_cuts(&cuts, analysis.end_frame(), analysis.fps);

        info!(
            frames = analysis.scores.len(),
            fps = analysis.fps,
            scenes = scenes.len(),
            "Scene detection finished"
        );

        Ok(scenes)
    }
}

fn to_scdet_scale(content_value: f64) -> f64 {
    content_value * 100.0 / 255.0
}

/// Parse `[scdet @ 0x..] lavfi.scd.score: X, lavfi.scd.time: Y`.
pub fn parse_scdet_line(line: &str) -> Option<(f64, f64)> {
    let score_start = line.find("lavfi.scd.score:")? + "lavfi.scd.score:".len();
    let time_start = line.find("lavfi.scd.time:")? + "lavfi.scd.time:".len();

    let score = line[score_start..].split(',').next()?.trim().parse().ok()?;
    let time = line[time_start..].split_whitespace().next()?.parse().ok()?;
    Some((score, time))
}

/// Parse `Duration: HH:MM:SS.ms, start: ...` into seconds.
pub fn parse_duration_line(line: &str) -> Option<f64> {
    let start = line.find("Duration:")? + "Duration:".len();
    let raw = line[start..].split(',').next()?.trim();

    let mut parts = raw.split(':');
    let hours: f64 = parts.next()?.parse().ok()?;
    let minutes: f64 = parts.next()?.parse().ok()?;
    let seconds: f64 = parts.next()?.parse().ok()?;
    Some(hours * 3600.0 + minutes * 60.0 + seconds)
}

fn parse_fps(line: &str) -> Option<f64> {
    if !line.contains("Video:") {
        return None;
    }
    FPS_RE
        .captures(line)
        .and_then(|c| c[1].parse::<f64>().ok())
        .filter(|fps| *fps > 0.0)
}

/// Collect frame scores, frame rate and duration from ffmpeg stderr.
pub fn parse_scdet_output(stderr: &str) -> FrameAnalysis {
    let mut fps = None;
    let mut duration = None;
    let mut timed = Vec::new();

    for line in stderr.lines() {
        if duration.is_none() && line.contains("Duration:") {
            duration = parse_duration_line(line);
        }
        if fps.is_none() {
            fps = parse_fps(line);
        }
        if let Some(sample) = parse_scdet_line(line) {
            timed.push(sample);
        }
    }

    let fps = fps.unwrap_or_else(|| {
        debug!("Frame rate not reported, assuming {} fps", DEFAULT_FPS);
        DEFAULT_FPS
    });

    let scores = timed
        .into_iter()
        .map(|(score, time)| FrameScore {
            frame: (time * fps).round() as u64,
            score,
        })
        .collect();

    FrameAnalysis {
        scores,
        fps,
        duration,
    }
}

/// Frames at which a new scene starts.
pub fn detect_cuts(
    scores: &[FrameScore],
    method: DetectionMethod,
    adaptive_threshold: f64,
    content_threshold: f64,
) -> Vec<u64> {
    let mut cuts = Vec::new();
    let mut last_cut = 0u64;

    let mut accept = |frame: u64, cuts: &mut Vec<u64>| {
        if frame.saturating_sub(last_cut) >= MIN_SCENE_LEN_FRAMES {
            cuts.push(frame);
            last_cut = frame;
        }
    };

    match method {
        DetectionMethod::Content => {
            let threshold = to_scdet_scale(content_threshold);
            for s in scores {
                if s.score >= threshold {
                    accept(s.frame, &mut cuts);
                }
            }
        }
        DetectionMethod::Adaptive => {
            let min_content = to_scdet_scale(MIN_CONTENT_VAL);
            let w = ADAPTIVE_WINDOW;
            if scores.len() < 2 * w + 1 {
                return cuts;
            }
            for i in w..scores.len() - w {
                let target = scores[i].score;
                let neighbours: f64 = scores[i - w..i]
                    .iter()
                    .chain(&scores[i + 1..=i + w])
                    .map(|s| s.score)
                    .sum();
                let average = neighbours / (2 * w) as f64;

                let ratio = if average.abs() >= 1e-5 {
                    (target / average).min(ADAPTIVE_RATIO_CAP)
                } else {
                    ADAPTIVE_RATIO_CAP
                };

                if ratio >= adaptive_threshold && target >= min_content {
                    accept(scores[i].frame, &mut cuts);
                }
            }
        }
    }

    cuts
}

/// Turn cut frames into contiguous scenes covering `[0, end_frame)`.
///
/// No cuts yields no scenes.
pub fn scenes_from_cuts(cuts: &[u64], end_frame: u64, fps: f64) -> Vec<SceneRecord> {
    if cuts.is_empty() {
        return Vec::new();
    }

    let last = cuts.last().copied().unwrap_or(0);
    let end_frame = end_frame.max(last + 1);

    let mut bounds = Vec::with_capacity(cuts.len() + 2);
    bounds.push(0);
    bounds.extend_from_slice(cuts);
    bounds.push(end_frame);

    bounds
        .windows(2)
        .filter(|w| w[1] > w[0])
        .map(|w| SceneRecord::from_frames(w[0], w[1], fps))
        .collect()
}
