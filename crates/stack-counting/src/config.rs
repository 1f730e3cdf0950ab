//! Tunable thresholds and resource paths for the counting pipeline

use carton_count_common::{CountError, Result};
use carton_count_depth::sampling::DepthSamplingConfig;
use carton_count_depth::DepthLoadConfig;
use carton_count_detection::DetectorConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Configuration for stack counting
///
/// Missing fields in YAML or JSON input take their default values.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StackCountingConfig {
    /// Layer break when the center gap exceeds this multiple of the mean box height
    pub gap_ratio: f32,
    /// Top layer narrower than this fraction of the next layer is dropped
    pub width_ratio_thr: f32,
    /// Top-layer boxes shorter than this fraction of the tallest are dropped
    pub height_filter_ratio: f32,
    pub coverage_threshold: f32,
    pub cv_gap_threshold: f32,
    /// Minimum detection confidence used for scene selection
    pub confidence_threshold: f32,
    /// Drop rear-row boxes in multi-layer piles
    pub suppress_rear_boxes: bool,
    /// ONNX carton model; sidecar detections are used when unset
    pub model_path: Option<PathBuf>,
    /// JSON pile-type database
    pub pile_config_path: Option<PathBuf>,
    /// NMS, detection cap and model input settings for either detector
    pub detector: DetectorConfig,
    pub depth_sampling: DepthSamplingConfig,
    pub depth_loading: DepthLoadConfig,
}

impl Default for StackCountingConfig {
    fn default() -> Self {
        Self {
            gap_ratio: 0.6,
            width_ratio_thr: 0.7,
            height_filter_ratio: 0.5,
            coverage_threshold: 0.9,
            cv_gap_threshold: 0.4,
            confidence_threshold: 0.65,
            suppress_rear_boxes: false,
            model_path: None,
            pile_config_path: None,
            detector: DetectorConfig::default(),
            depth_sampling: DepthSamplingConfig::default(),
            depth_loading: DepthLoadConfig::default(),
        }
    }
}

impl StackCountingConfig {
    pub fn from_yaml(path: impl AsRef<Path>) -> Result<Self> {
        let contents = read_config(path.as_ref())?;
        let config: Self = serde_yaml::from_str(&contents)
            .map_err(|e| CountError::ConfigParse(format!("Failed to parse YAML: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json(path: impl AsRef<Path>) -> Result<Self> {
        let contents = read_config(path.as_ref())?;
        let config: Self = serde_json::from_str(&contents)
            .map_err(|e| CountError::ConfigParse(format!("Failed to parse JSON: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Load by extension: `.json` as JSON, anything else as YAML
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let is_json = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("json"));
        if is_json {
            Self::from_json(path)
        } else {
            Self::from_yaml(path)
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.gap_ratio > 0.0) {
            return Err(CountError::InvalidConfig(format!(
                "gap_ratio must be positive, got {}",
                self.gap_ratio
            )));
        }
        for (name, value) in [
            ("width_ratio_thr", self.width_ratio_thr),
            ("height_filter_ratio", self.height_filter_ratio),
            ("coverage_threshold", self.coverage_threshold),
            ("cv_gap_threshold", self.cv_gap_threshold),
            ("confidence_threshold", self.confidence_threshold),
        ] {
            if !(value > 0.0 && value <= 1.0) {
                return Err(CountError::InvalidConfig(format!(
                    "{name} must be in (0, 1], got {value}"
                )));
            }
        }
        self.detector
            .validate()
            .map_err(|e| CountError::InvalidConfig(e.to_string()))?;
        self.depth_sampling
            .validate()
            .map_err(|e| CountError::InvalidConfig(e.to_string()))
    }
}

fn read_config(path: &Path) -> Result<String> {
    if !path.exists() {
        return Err(CountError::ConfigNotFound(path.to_path_buf()));
    }
    Ok(std::fs::read_to_string(path)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_are_valid() {
        let config = StackCountingConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.gap_ratio, 0.6);
        assert_eq!(config.confidence_threshold, 0.65);
        assert!(!config.suppress_rear_boxes);
        assert_eq!(config.depth_sampling.region_size, 5);
    }

    #[test]
    fn test_yaml_partial_override() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("counting.yaml");
        std::fs::write(
            &path,
            "gap_ratio: 0.8\nsuppress_rear_boxes: true\ndepth_sampling:\n  region_size: 7\ndetector:\n  iou_threshold: 0.3\n  input_size: 1280\n",
        )
        .unwrap();

        let config = StackCountingConfig::from_file(&path).unwrap();
        assert_eq!(config.gap_ratio, 0.8);
        assert!(config.suppress_rear_boxes);
        assert_eq!(config.depth_sampling.region_size, 7);
        assert_eq!(config.depth_sampling.median_window_mm, 500.0);
        assert_eq!(config.coverage_threshold, 0.9);
        assert_eq!(config.detector.iou_threshold, 0.3);
        assert_eq!(config.detector.input_size, 1280);
        assert_eq!(config.detector.max_detections, 300);
    }

    #[test]
    fn test_json_and_errors() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("counting.json");
        std::fs::write(&path, r#"{"coverage_threshold": 1.5}"#).unwrap();
        assert!(matches!(
            StackCountingConfig::from_file(&path),
            Err(CountError::InvalidConfig(_))
        ));

        std::fs::write(&path, "{").unwrap();
        assert!(matches!(
            StackCountingConfig::from_json(&path),
            Err(CountError::ConfigParse(_))
        ));

        assert!(matches!(
            StackCountingConfig::from_yaml(dir.path().join("missing.yaml")),
            Err(CountError::ConfigNotFound(_))
        ));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let config = StackCountingConfig {
            gap_ratio: 0.0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let mut config = StackCountingConfig::default();
        config.depth_sampling.region_size = 0;
        assert!(matches!(config.validate(), Err(CountError::InvalidConfig(_))));

        let mut config = StackCountingConfig::default();
        config.detector.max_detections = 0;
        assert!(matches!(config.validate(), Err(CountError::InvalidConfig(_))));
    }
}
