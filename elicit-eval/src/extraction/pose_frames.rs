//! Hand-pose annotation frames attached to model description prompts
//!
//! Frames live under `<root>/<participant>/<gesture>/*.json`, one file per
//! video frame, and are sent in file-name order.

use crate::records::types::RecordKey;
use serde_json::{Map, Value};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::debug;

/// Key holding the landmark coordinates in each frame
pub const LANDMARKS_KEY: &str = "hand_landmarks";

/// Which part of each frame is sent to the model
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PoseStage {
    /// Everything except the raw landmarks
    Poses,
    /// Only the raw landmarks
    Landmarks,
    /// The whole frame
    Combined,
}

impl PoseStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Poses => "poses",
            Self::Landmarks => "landmarks",
            Self::Combined => "combined",
        }
    }

    /// Reduce one frame to the part this stage sends
    pub fn filter(&self, frame: Value) -> Value {
        match (self, frame) {
            (Self::Combined, frame) => frame,
            (Self::Landmarks, Value::Object(mut map)) => {
                let landmarks = map.remove(LANDMARKS_KEY).unwrap_or_else(|| Value::Object(Map::new()));
                let mut out = Map::new();
                out.insert(LANDMARKS_KEY.to_string(), landmarks);
                Value::Object(out)
            }
            (Self::Landmarks, _) => {
                let mut out = Map::new();
                out.insert(LANDMARKS_KEY.to_string(), Value::Object(Map::new()));
                Value::Object(out)
            }
            (Self::Poses, Value::Object(mut map)) => {
                map.remove(LANDMARKS_KEY);
                Value::Object(map)
            }
            (Self::Poses, frame) => frame,
        }
    }
}

impl fmt::Display for PoseStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PoseStage {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "poses" => Ok(Self::Poses),
            "landmarks" => Ok(Self::Landmarks),
            "combined" => Ok(Self::Combined),
            other => Err(crate::Error::Config(format!(
                "unknown pose stage {:?} (expected poses, landmarks or combined)",
                other
            ))),
        }
    }
}

/// Frame files for one gesture
pub fn frame_dir(root: &Path, key: &RecordKey) -> PathBuf {
    root.join(&key.participant_id).join(&key.gesture_id)
}

/// Render a gesture's frames as `Frame <i>: <json>` lines.
///
/// Returns `Ok(None)` when the gesture has no frame directory or no frames.
pub fn render_frames(root: &Path, key: &RecordKey, stage: PoseStage) -> crate::Result<Option<String>> {
    let dir = frame_dir(root, key);
    if !dir.is_dir() {
        return Ok(None);
    }

    let mut paths: Vec<PathBuf> = std::fs::read_dir(&dir)?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.extension().map(|ext| ext == "json").unwrap_or(false))
        .collect();
    paths.sort();
    if paths.is_empty() {
        return Ok(None);
    }

    let mut rendered = String::new();
    for (i, path) in paths.iter().enumerate() {
        let content = std::fs::read_to_string(path)?;
        let frame: Value = serde_json::from_str(&content)?;
        let value = serde_json::to_string(&stage.filter(frame))?;
        rendered.push_str(&format!("Frame {}: {}\n", i + 1, value));
    }

    debug!(key = %key, frames = paths.len(), stage = %stage, "Rendered pose frames");
    Ok(Some(rendered))
}
