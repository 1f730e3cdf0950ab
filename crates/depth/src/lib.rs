//! Depth matrices for carton pile captures
//!
//! The stereo module of the camera rig delivers either a depth image (16-bit
//! grayscale in millimetres), a disparity image, or a depth matrix exported as
//! CSV. This crate loads all three into a [`DepthMatrix`] and provides robust
//! point sampling ([`sampling::sample_depth`]) used by the top-layer
//! correction path of the stack counter.
//!
//! # Example
//! ```no_run
//! use carton_count_depth::{DepthLoadConfig, DepthProvider, FileDepthProvider};
//! use carton_count_depth::sampling::{sample_depth, DepthSamplingConfig};
//! use std::path::Path;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let provider = FileDepthProvider::new(DepthLoadConfig::default());
//! let depth = provider.depth_matrix(Path::new("bin_a01/depth.png"))?;
//!
//! match sample_depth(&depth, 0.5, 0.4, &DepthSamplingConfig::default()) {
//!     Ok(sample) => println!("depth at centre: {:.1} mm", sample.value),
//!     Err(failure) => println!("no depth: {failure}"),
//! }
//! # Ok(())
//! # }
//! ```

pub mod sampling;

use carton_count_common::CountError;
use image::DynamicImage;
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Errors that can occur while loading depth data
#[derive(Error, Debug)]
pub enum DepthError {
    #[error("Depth file not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("Image processing error: {0}")]
    ImageError(String),

    #[error("Failed to read depth CSV: {0}")]
    Csv(String),

    #[error("Depth matrix is empty")]
    EmptyMatrix,

    #[error("Depth matrix row {row} has {got} columns, expected {expected}")]
    RaggedRows {
        row: usize,
        expected: usize,
        got: usize,
    },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl From<DepthError> for CountError {
    fn from(err: DepthError) -> Self {
        CountError::Depth(err.to_string())
    }
}

impl From<image::ImageError> for DepthError {
    fn from(err: image::ImageError) -> Self {
        DepthError::ImageError(err.to_string())
    }
}

impl From<csv::Error> for DepthError {
    fn from(err: csv::Error) -> Self {
        DepthError::Csv(err.to_string())
    }
}

/// Configuration for loading depth images
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DepthLoadConfig {
    /// 16-bit and float grids whose maximum is below this value are treated
    /// as disparity and converted to millimetres. 8-bit images always keep
    /// their raw values. `None` disables the conversion.
    pub disparity_max: Option<f32>,
    /// Stereo focal length in pixels
    pub focal_length_px: f32,
    /// Stereo baseline in millimetres
    pub baseline_mm: f32,
}

impl Default for DepthLoadConfig {
    fn default() -> Self {
        Self {
            disparity_max: Some(1000.0),
            focal_length_px: 11000.0,
            baseline_mm: 60.0,
        }
    }
}

/// Dense depth grid in millimetres; zero or negative values are invalid
#[derive(Debug, Clone, PartialEq)]
pub struct DepthMatrix {
    data: Array2<f32>,
}

impl DepthMatrix {
    /// Wrap a `(height, width)` array
    pub fn from_array(data: Array2<f32>) -> Result<Self, DepthError> {
        if data.is_empty() {
            return Err(DepthError::EmptyMatrix);
        }
        Ok(Self { data })
    }

    /// Build from row-major rows; every row must have the same length
    pub fn from_rows(rows: Vec<Vec<f32>>) -> Result<Self, DepthError> {
        let height = rows.len();
        let width = rows.first().map_or(0, Vec::len);
        if height == 0 || width == 0 {
            return Err(DepthError::EmptyMatrix);
        }

        let mut flat = Vec::with_capacity(height * width);
        for (row, values) in rows.into_iter().enumerate() {
            if values.len() != width {
                return Err(DepthError::RaggedRows {
                    row,
                    expected: width,
                    got: values.len(),
                });
            }
            flat.extend(values);
        }

        let data = Array2::from_shape_vec((height, width), flat)
            .map_err(|e| DepthError::Csv(e.to_string()))?;
        Self::from_array(data)
    }

    #[must_use]
    pub fn width(&self) -> usize {
        self.data.ncols()
    }

    #[must_use]
    pub fn height(&self) -> usize {
        self.data.nrows()
    }

    #[must_use]
    pub fn as_array(&self) -> &Array2<f32> {
        &self.data
    }

    /// Largest value in the grid
    #[must_use]
    pub fn max_value(&self) -> f32 {
        self.data.iter().copied().fold(f32::MIN, f32::max)
    }

    /// Fraction of cells holding a positive depth
    #[must_use]
    pub fn valid_ratio(&self) -> f32 {
        let valid = self.data.iter().filter(|&&v| v > 0.0).count();
        valid as f32 / self.data.len() as f32
    }
}

/// Convert a disparity grid to depth in millimetres
///
/// `depth = focal_length_px * baseline_mm / disparity`. Non-positive
/// disparities map to 0 (invalid).
#[must_use]
pub fn disparity_to_depth(disparity: &Array2<f32>, focal_length_px: f32, baseline_mm: f32) -> Array2<f32> {
    let scale = focal_length_px * baseline_mm;
    disparity.mapv(|d| {
        if d > 0.0 {
            let depth = scale / d;
            if depth.is_finite() {
                depth
            } else {
                0.0
            }
        } else {
            0.0
        }
    })
}

/// Load a depth or disparity image into a depth matrix
///
/// 16-bit grayscale images keep their raw values; colour images are
/// converted to luma first. Only 16-bit and float images are candidates for
/// disparity conversion.
pub fn load_depth_image(path: &Path, config: &DepthLoadConfig) -> Result<DepthMatrix, DepthError> {
    if !path.exists() {
        return Err(DepthError::NotFound(path.to_path_buf()));
    }

    info!("Loading depth image from {}", path.display());
    let img = image::open(path)?;
    let wide = !matches!(
        img,
        DynamicImage::ImageLuma8(_)
            | DynamicImage::ImageLumaA8(_)
            | DynamicImage::ImageRgb8(_)
            | DynamicImage::ImageRgba8(_)
    );
    let matrix = DepthMatrix::from_array(image_to_array(img))?;

    let matrix = match config.disparity_max {
        Some(limit) if wide && matrix.max_value() < limit => {
            debug!(
                "Max value {:.1} below {:.1}, treating {} as disparity",
                matrix.max_value(),
                limit,
                path.display()
            );
            DepthMatrix::from_array(disparity_to_depth(
                matrix.as_array(),
                config.focal_length_px,
                config.baseline_mm,
            ))?
        }
        _ => matrix,
    };

    debug!(
        "Depth matrix {}x{} ({:.1}% valid)",
        matrix.width(),
        matrix.height(),
        matrix.valid_ratio() * 100.0
    );
    Ok(matrix)
}

fn image_to_array(img: DynamicImage) -> Array2<f32> {
    let (width, height) = (img.width() as usize, img.height() as usize);
    let values: Vec<f32> = match img {
        DynamicImage::ImageLuma16(buf) => buf.into_raw().into_iter().map(f32::from).collect(),
        DynamicImage::ImageLumaA16(_) | DynamicImage::ImageRgb16(_) | DynamicImage::ImageRgba16(_) => {
            img.to_luma16().into_raw().into_iter().map(f32::from).collect()
        }
        DynamicImage::ImageRgb32F(_) | DynamicImage::ImageRgba32F(_) => img.to_luma32f().into_raw(),
        other => other.to_luma8().into_raw().into_iter().map(f32::from).collect(),
    };
    Array2::from_shape_vec((height, width), values)
        .unwrap_or_else(|_| Array2::zeros((height, width)))
}

/// Load a depth matrix exported as CSV (one image row per line)
///
/// Rows that fail to parse are skipped with a warning.
pub fn load_depth_csv(path: &Path) -> Result<DepthMatrix, DepthError> {
    if !path.exists() {
        return Err(DepthError::NotFound(path.to_path_buf()));
    }

    info!("Loading depth matrix from {}", path.display());
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(path)?;

    let mut rows = Vec::new();
    for (line, record) in reader.records().enumerate() {
        let record = record?;
        let parsed: Result<Vec<f32>, _> = record.iter().map(|v| v.trim().parse::<f32>()).collect();
        match parsed {
            Ok(row) => rows.push(row),
            Err(e) => warn!("Skipping depth CSV line {}: {}", line + 1, e),
        }
    }

    let matrix = DepthMatrix::from_rows(rows)?;
    debug!("Depth matrix {}x{}", matrix.width(), matrix.height());
    Ok(matrix)
}

/// Source of depth matrices for a capture
pub trait DepthProvider: Send + Sync {
    fn depth_matrix(&self, path: &Path) -> Result<DepthMatrix, DepthError>;
}

/// Loads depth from files, dispatching on extension (`.csv` or image)
#[derive(Debug, Clone, Default)]
pub struct FileDepthProvider {
    config: DepthLoadConfig,
}

impl FileDepthProvider {
    #[must_use]
    pub fn new(config: DepthLoadConfig) -> Self {
        Self { config }
    }
}

impl DepthProvider for FileDepthProvider {
    fn depth_matrix(&self, path: &Path) -> Result<DepthMatrix, DepthError> {
        let is_csv = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("csv"));
        if is_csv {
            load_depth_csv(path)
        } else {
            load_depth_image(path, &self.config)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_from_rows_rejects_ragged() {
        let err = DepthMatrix::from_rows(vec![vec![1.0, 2.0], vec![3.0]]).unwrap_err();
        assert!(matches!(
            err,
            DepthError::RaggedRows {
                row: 1,
                expected: 2,
                got: 1
            }
        ));
        assert!(matches!(
            DepthMatrix::from_rows(Vec::new()),
            Err(DepthError::EmptyMatrix)
        ));
    }

    #[test]
    fn test_matrix_accessors() {
        let m = DepthMatrix::from_rows(vec![vec![0.0, 1500.0, 1600.0], vec![1700.0, -1.0, 1800.0]])
            .unwrap();
        assert_eq!(m.width(), 3);
        assert_eq!(m.height(), 2);
        assert_eq!(m.as_array()[[1, 2]], 1800.0);
        assert_eq!(m.as_array().get((0, 3)), None);
        assert_eq!(m.max_value(), 1800.0);
        assert!((m.valid_ratio() - 4.0 / 6.0).abs() < 1e-6);
    }

    #[test]
    fn test_disparity_to_depth() {
        let d = array![[66.0, 0.0], [-2.0, 132.0]];
        let depth = disparity_to_depth(&d, 11000.0, 60.0);
        assert!((depth[[0, 0]] - 10000.0).abs() < 1e-2);
        assert_eq!(depth[[0, 1]], 0.0);
        assert_eq!(depth[[1, 0]], 0.0);
        assert!((depth[[1, 1]] - 5000.0).abs() < 1e-2);
    }

    #[test]
    fn test_missing_files_are_not_found() {
        let provider = FileDepthProvider::default();
        assert!(matches!(
            provider.depth_matrix(Path::new("/no/such/depth.csv")),
            Err(DepthError::NotFound(_))
        ));
        assert!(matches!(
            provider.depth_matrix(Path::new("/no/such/depth.png")),
            Err(DepthError::NotFound(_))
        ));
    }
}
