//! Robust depth sampling at a normalized image position
//!
//! A small window around the target pixel is read, non-positive values are
//! discarded and the remaining samples are filtered against their median.
//! When too few samples survive the median window, the valid samples are
//! re-filtered with a mean ± k·σ band instead.

use crate::{DepthError, DepthMatrix};
use carton_count_common::stats;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Window and outlier-rejection parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DepthSamplingConfig {
    /// Side length of the square sampling window in pixels
    pub region_size: usize,
    /// Samples further than this from the median (mm) are rejected
    pub median_window_mm: f32,
    /// Minimum survivors before falling back to the sigma filter
    pub min_survivors: usize,
    /// Width of the fallback band in standard deviations
    pub sigma_factor: f32,
}

impl Default for DepthSamplingConfig {
    fn default() -> Self {
        Self {
            region_size: 5,
            median_window_mm: 500.0,
            min_survivors: 5,
            sigma_factor: 2.0,
        }
    }
}

impl DepthSamplingConfig {
    pub fn validate(&self) -> Result<(), DepthError> {
        if self.region_size == 0 {
            return Err(DepthError::InvalidConfig(
                "region_size must be at least 1".to_string(),
            ));
        }
        if !(self.median_window_mm > 0.0) {
            return Err(DepthError::InvalidConfig(format!(
                "median_window_mm must be positive, got {}",
                self.median_window_mm
            )));
        }
        if !(self.sigma_factor > 0.0) {
            return Err(DepthError::InvalidConfig(format!(
                "sigma_factor must be positive, got {}",
                self.sigma_factor
            )));
        }
        Ok(())
    }
}

/// Successful depth sample
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DepthSample {
    /// Mean of the filtered samples (mm)
    pub value: f32,
    /// Median of all positive samples, the center of the outlier window
    pub median: f32,
    pub min: f32,
    pub max: f32,
    pub std: f32,
    /// Samples that survived outlier rejection
    pub valid_points: usize,
    /// Positive samples inside the window
    pub total_points: usize,
    pub pixel_x: usize,
    pub pixel_y: usize,
}

/// Why no depth could be read at a position
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SampleFailure {
    #[error("position ({x:.3}, {y:.3}) is outside the depth matrix")]
    OutOfBounds { x: f32, y: f32 },

    #[error("no positive depth values around pixel ({pixel_x}, {pixel_y})")]
    NoValidSamples { pixel_x: usize, pixel_y: usize },

    #[error("all depth values around pixel ({pixel_x}, {pixel_y}) were rejected as outliers")]
    NoFilteredSamples { pixel_x: usize, pixel_y: usize },
}

/// Sample depth at normalized coordinates `(x, y)` in `[0, 1]`
pub fn sample_depth(
    matrix: &DepthMatrix,
    x: f32,
    y: f32,
    config: &DepthSamplingConfig,
) -> Result<DepthSample, SampleFailure> {
    let (w, h) = (matrix.width(), matrix.height());
    let px = (x * w as f32).floor();
    let py = (y * h as f32).floor();
    if !px.is_finite() || !py.is_finite() || px < 0.0 || py < 0.0 || px >= w as f32 || py >= h as f32 {
        return Err(SampleFailure::OutOfBounds { x, y });
    }
    let (pixel_x, pixel_y) = (px as usize, py as usize);

    let half = config.region_size / 2;
    let x0 = pixel_x.saturating_sub(half);
    let y0 = pixel_y.saturating_sub(half);
    let x1 = (pixel_x + half + 1).min(w);
    let y1 = (pixel_y + half + 1).min(h);

    let valid: Vec<f32> = matrix
        .as_array()
        .slice(ndarray::s![y0..y1, x0..x1])
        .iter()
        .copied()
        .filter(|&v| v > 0.0 && v.is_finite())
        .collect();

    let Some(median) = stats::median(&valid) else {
        return Err(SampleFailure::NoValidSamples { pixel_x, pixel_y });
    };

    let mut filtered: Vec<f32> = valid
        .iter()
        .copied()
        .filter(|&v| (v - median).abs() <= config.median_window_mm)
        .collect();

    if filtered.len() < config.min_survivors {
        let mean = stats::mean(&valid).unwrap_or(median);
        let std = stats::std_dev(&valid).unwrap_or(0.0);
        let band = config.sigma_factor * std;
        filtered = valid
            .iter()
            .copied()
            .filter(|&v| (v - mean).abs() <= band)
            .collect();
        debug!(
            "Depth at ({}, {}): {} samples after sigma fallback",
            pixel_x,
            pixel_y,
            filtered.len()
        );
    }

    let (Some(value), Some(std)) = (stats::mean(&filtered), stats::std_dev(&filtered)) else {
        return Err(SampleFailure::NoFilteredSamples { pixel_x, pixel_y });
    };
    let min = filtered.iter().copied().fold(f32::INFINITY, f32::min);
    let max = filtered.iter().copied().fold(f32::NEG_INFINITY, f32::max);

    Ok(DepthSample {
        value,
        median,
        min,
        max,
        std,
        valid_points: filtered.len(),
        total_points: valid.len(),
        pixel_x,
        pixel_y,
    })
}
