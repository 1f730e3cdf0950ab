//! Common types and utilities shared by the carton counting crates

pub mod detection;
pub mod geometry;
pub mod stats;

pub use detection::{Detection, DetectionClass};
pub use geometry::{ImageSize, Rect};

use std::path::PathBuf;
use thiserror::Error;

/// Counting errors
#[derive(Debug, Error)]
pub enum CountError {
    #[error("Image not found: {}", .0.display())]
    ImageNotFound(PathBuf),

    #[error("Model not found: {}", .0.display())]
    ModelNotFound(PathBuf),

    #[error("Pile configuration not found: {}", .0.display())]
    ConfigNotFound(PathBuf),

    #[error("Failed to parse configuration: {0}")]
    ConfigParse(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid geometry: {0}")]
    InvalidGeometry(String),

    #[error("Detector error: {0}")]
    Detector(String),

    #[error("Depth error: {0}")]
    Depth(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Image processing error: {0}")]
    ImageError(String),
}

impl From<image::ImageError> for CountError {
    fn from(err: image::ImageError) -> Self {
        CountError::ImageError(err.to_string())
    }
}

/// Result type for counting operations
pub type Result<T> = std::result::Result<T, CountError>;
