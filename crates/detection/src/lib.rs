//! Carton detection for pile captures
//!
//! The stack counter consumes `pile`, `box` and `top` detections. This crate
//! defines the [`CartonDetector`] seam and two implementations:
//!
//! # Features
//! - [`SidecarDetector`]: reads precomputed detections stored next to the image
//! - `YoloCartonDetector` (cargo feature `onnx`): `YOLOv8` model via ONNX Runtime,
//!   loaded lazily and cached for reuse
//! - Per-class non-maximum suppression shared by both paths
//!
//! # Example
//! ```no_run
//! use carton_count_detection::{CartonDetector, SidecarDetector};
//! use std::path::Path;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let detector = SidecarDetector::new();
//! // Reads bins/A-01/main.detections.json
//! let detections = detector.detect(Path::new("bins/A-01/main.jpeg"))?;
//! for det in detections {
//!     println!("{} {:.2}", det.class, det.confidence);
//! }
//! # Ok(())
//! # }
//! ```

pub mod postprocess;
pub mod sidecar;
#[cfg(feature = "onnx")]
pub mod yolo;

pub use postprocess::non_max_suppression;
pub use sidecar::SidecarDetector;
#[cfg(feature = "onnx")]
pub use yolo::YoloCartonDetector;

use carton_count_common::{CountError, Detection};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Source of detections for one capture
pub trait CartonDetector: Send + Sync {
    /// Detect piles, carton faces and carton tops in the image at `image`
    fn detect(&self, image: &Path) -> Result<Vec<Detection>, DetectionError>;
}

/// Configuration for carton detection
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// Minimum confidence threshold for detections (0.0-1.0)
    pub confidence_threshold: f32,
    /// `IoU` threshold for non-maximum suppression (0.0-1.0)
    pub iou_threshold: f32,
    /// Maximum number of detections to return per image
    pub max_detections: usize,
    /// Input image size (`YOLOv8` default is 640x640)
    pub input_size: u32,
    /// Model class names in output order
    pub class_names: Vec<String>,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.65,
            iou_threshold: 0.45,
            max_detections: 300,
            input_size: 640,
            class_names: vec!["pile".to_string(), "box".to_string(), "top".to_string()],
        }
    }
}

impl DetectorConfig {
    pub fn validate(&self) -> Result<(), DetectionError> {
        for (name, value) in [
            ("confidence_threshold", self.confidence_threshold),
            ("iou_threshold", self.iou_threshold),
        ] {
            if !(value > 0.0 && value <= 1.0) {
                return Err(DetectionError::Config(format!(
                    "{name} must be in (0, 1], got {value}"
                )));
            }
        }
        if self.input_size == 0 || self.max_detections == 0 {
            return Err(DetectionError::Config(
                "input_size and max_detections must be positive".to_string(),
            ));
        }
        if self.class_names.is_empty() {
            return Err(DetectionError::Config("class_names is empty".to_string()));
        }
        Ok(())
    }
}

/// Error types for carton detection
#[derive(Debug, Error)]
pub enum DetectionError {
    #[error("Model not found: {}", .0.display())]
    ModelNotFound(PathBuf),

    #[error("Failed to load model: {0}")]
    ModelLoad(String),

    #[error("Inference error: {0}")]
    Inference(String),

    #[error("Image processing error: {0}")]
    ImageProcessing(String),

    #[error("Invalid detections in {}: {message}", path.display())]
    Sidecar { path: PathBuf, message: String },

    #[error("Invalid detector configuration: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[cfg(feature = "onnx")]
    #[error("ONNX Runtime error: {0}")]
    OnnxRuntime(#[from] ort::Error),
}

impl From<image::ImageError> for DetectionError {
    fn from(err: image::ImageError) -> Self {
        DetectionError::ImageProcessing(err.to_string())
    }
}

impl From<DetectionError> for CountError {
    fn from(err: DetectionError) -> Self {
        match err {
            DetectionError::ModelNotFound(path) => CountError::ModelNotFound(path),
            other => CountError::Detector(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = DetectorConfig::default();
        assert_eq!(config.confidence_threshold, 0.65);
        assert_eq!(config.iou_threshold, 0.45);
        assert_eq!(config.max_detections, 300);
        assert_eq!(config.input_size, 640);
        assert_eq!(config.class_names, vec!["pile", "box", "top"]);
    }

    #[test]
    fn test_config_validation() {
        assert!(DetectorConfig::default().validate().is_ok());

        let config = DetectorConfig {
            iou_threshold: 0.0,
            ..DetectorConfig::default()
        };
        assert!(matches!(config.validate(), Err(DetectionError::Config(_))));

        let config = DetectorConfig {
            class_names: Vec::new(),
            ..DetectorConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_model_not_found_keeps_kind() {
        let err: CountError = DetectionError::ModelNotFound(PathBuf::from("carton.onnx")).into();
        assert!(matches!(err, CountError::ModelNotFound(_)));

        let err: CountError = DetectionError::Inference("bad shape".to_string()).into();
        assert!(matches!(err, CountError::Detector(_)));
    }
}
