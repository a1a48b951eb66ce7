//! Scene detection payloads.

use std::fmt;
use std::str::FromStr;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::ModelError;

pub const DEFAULT_ADAPTIVE_THRESHOLD: f64 = 3.0;
pub const DEFAULT_CONTENT_THRESHOLD: f64 = 27.0;

/// Scene boundary detection strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum DetectionMethod {
    /// Score relative to a rolling average of neighbouring frames
    #[default]
    Adaptive,
    /// Absolute frame difference threshold
    Content,
}

impl DetectionMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            DetectionMethod::Adaptive => "adaptive",
            DetectionMethod::Content => "content",
        }
    }
}

impl fmt::Display for DetectionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DetectionMethod {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "adaptive" => Ok(DetectionMethod::Adaptive),
            "content" => Ok(DetectionMethod::Content),
            other => Err(ModelError::InvalidDetectionMethod(other.to_string())),
        }
    }
}

/// One detected scene.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SceneRecord {
    pub start_seconds: f64,
    pub end_seconds: f64,
    pub start_frame: u64,
    pub end_frame: u64,
    pub duration_seconds: f64,
}

impl SceneRecord {
    /// Build a record from frame boundaries at a given frame rate.
    pub fn from_frames(start_frame: u64, end_frame: u64, fps: f64) -> Self {
        let start_seconds = start_frame as f64 / fps;
        let end_seconds = end_frame as f64 / fps;
        Self {
            start_seconds,
            end_seconds,
            start_frame,
            end_frame,
            duration_seconds: end_seconds - start_seconds,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_method_parsing() {
        assert_eq!("adaptive".parse::<DetectionMethod>(), Ok(DetectionMethod::Adaptive));
        assert_eq!("content".parse::<DetectionMethod>(), Ok(DetectionMethod::Content));
        assert_eq!(
            "threshold".parse::<DetectionMethod>(),
            Err(ModelError::InvalidDetectionMethod("threshold".to_string()))
        );
    }

    #[test]
    fn test_scene_from_frames() {
        let scene = SceneRecord::from_frames(30, 90, 30.0);
        assert_eq!(scene.start_seconds, 1.0);
        assert_eq!(scene.end_seconds, 3.0);
        assert_eq!(scene.duration_seconds, 2.0);
    }
}
