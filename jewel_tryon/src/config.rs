use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::core_modules::placement::PlacementPolicy;
use crate::error::{Error, Result};

/// Largest accepted overlay width, in face widths.
const MAX_WIDTH_RATIO: f64 = 10.0;

/// Tunable behavior of a try-on session. Every field has a default, so a config
/// file only needs to list what it changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TryOnConfig {
    /// Directory that relative product image paths are resolved against.
    pub assets_dir: PathBuf,
    /// Directory snapshots are written to. Created on first capture.
    pub snapshot_dir: PathBuf,
    /// Key that saves a snapshot of the current frame.
    pub capture_key: char,
    /// Key that ends the session.
    pub quit_key: char,
    /// Category → placement table.
    pub placement: PlacementPolicy,
    pub detector: DetectorConfig,
}

impl Default for TryOnConfig {
    fn default() -> Self {
        Self {
            assets_dir: PathBuf::from("assets"),
            snapshot_dir: PathBuf::from("snapshots"),
            capture_key: 'c',
            quit_key: 'q',
            placement: PlacementPolicy::default(),
            detector: DetectorConfig::default(),
        }
    }
}

/// Model files and thresholds for the landmark detector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// ONNX face detector producing the face box (YuNet).
    pub face_model: PathBuf,
    /// ONNX Face Mesh landmark network.
    pub mesh_model: PathBuf,
    /// Minimum face detector confidence.
    pub score_threshold: f32,
    /// Minimum face-presence probability reported by the mesh network.
    pub face_presence_threshold: f32,
    /// Margin added around the face box on each side, as a fraction of its size.
    pub crop_margin: f32,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            face_model: PathBuf::from("models/face_detection_yunet_2023mar.onnx"),
            mesh_model: PathBuf::from("models/face_landmark.onnx"),
            score_threshold: 0.5,
            face_presence_threshold: 0.5,
            crop_margin: 0.25,
        }
    }
}

impl TryOnConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .map_err(|err| Error::Config(format!("{}: {err}", path.display())))?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<Self> {
        let config: TryOnConfig = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.capture_key == self.quit_key {
            return Err(Error::Config(format!(
                "capture_key and quit_key are both '{}'",
                self.quit_key
            )));
        }
        let specs = self
            .placement
            .rules
            .iter()
            .map(|rule| &rule.spec)
            .chain(std::iter::once(&self.placement.default));
        for spec in specs {
            if !(spec.width_ratio > 0.0 && spec.width_ratio <= MAX_WIDTH_RATIO) {
                return Err(Error::Config(format!(
                    "placement width_ratio must be in (0, {MAX_WIDTH_RATIO}], got {}",
                    spec.width_ratio
                )));
            }
            if !spec.vertical_offset_ratio.is_finite() {
                return Err(Error::Config("placement vertical_offset_ratio must be finite".into()));
            }
        }
        Ok(())
    }
}
