//! Precomputed detections stored beside the capture
//!
//! For `bins/A-01/main.jpeg` the sidecar is `bins/A-01/main.detections.json`,
//! a JSON array of `{"class", "x1", "y1", "x2", "y2", "confidence"}` records.
//! Loaded records go through the same NMS and detection cap as model output;
//! confidence filtering is left to scene selection.

use crate::postprocess::non_max_suppression;
use crate::{CartonDetector, DetectionError, DetectorConfig};
use carton_count_common::Detection;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const SIDECAR_SUFFIX: &str = "detections.json";

/// Detector backed by JSON files written by an upstream inference service
#[derive(Debug, Clone, Default)]
pub struct SidecarDetector {
    fixed: Option<PathBuf>,
    config: DetectorConfig,
}

impl SidecarDetector {
    /// Look up `<image stem>.detections.json` next to each image
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Always read detections from `path`, whatever image is passed
    #[must_use]
    pub fn with_file(path: impl Into<PathBuf>) -> Self {
        Self {
            fixed: Some(path.into()),
            ..Self::default()
        }
    }

    /// Use `config` for NMS and the detection cap
    #[must_use]
    pub fn with_config(self, config: DetectorConfig) -> Self {
        Self { config, ..self }
    }

    /// Sidecar file consulted for `image`
    #[must_use]
    pub fn sidecar_path(&self, image: &Path) -> PathBuf {
        if let Some(fixed) = &self.fixed {
            return fixed.clone();
        }
        let stem = image
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        image.with_file_name(format!("{stem}.{SIDECAR_SUFFIX}"))
    }
}

impl CartonDetector for SidecarDetector {
    fn detect(&self, image: &Path) -> Result<Vec<Detection>, DetectionError> {
        let path = self.sidecar_path(image);
        if !path.exists() {
            debug!("No detections sidecar at {}", path.display());
            return Ok(Vec::new());
        }

        let contents = std::fs::read_to_string(&path)?;
        let detections: Vec<Detection> =
            serde_json::from_str(&contents).map_err(|e| DetectionError::Sidecar {
                path: path.clone(),
                message: e.to_string(),
            })?;

        info!("Loaded {} detections from {}", detections.len(), path.display());
        let mut detections = non_max_suppression(detections, self.config.iou_threshold);
        detections.truncate(self.config.max_detections);
        Ok(detections)
    }
}
