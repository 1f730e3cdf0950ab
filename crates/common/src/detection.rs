//! Detector output records
//!
//! The detector reports three classes: the pile as a whole, the front face of
//! each carton (`box`), and the visible top face of a carton (`top`).

use crate::geometry::Rect;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Detection class emitted by the carton detector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetectionClass {
    /// The whole carton pile in the bin
    Pile,
    /// Front face of a single carton
    Box,
    /// Top face of a carton seen from above
    Top,
}

impl DetectionClass {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            DetectionClass::Pile => "pile",
            DetectionClass::Box => "box",
            DetectionClass::Top => "top",
        }
    }
}

impl fmt::Display for DetectionClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DetectionClass {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pile" => Ok(DetectionClass::Pile),
            "box" => Ok(DetectionClass::Box),
            "top" => Ok(DetectionClass::Top),
            other => Err(format!("unknown detection class: {other}")),
        }
    }
}

/// Object detection result in source image pixels
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    /// Detected class
    pub class: DetectionClass,
    /// Bounding box (`x1`, `y1`, `x2`, `y2`)
    #[serde(flatten)]
    pub rect: Rect,
    /// Confidence score (0-1)
    pub confidence: f32,
}

impl Detection {
    #[must_use]
    pub fn new(class: DetectionClass, rect: Rect, confidence: f32) -> Self {
        Self {
            class,
            rect,
            confidence,
        }
    }

    #[must_use]
    pub fn is(&self, class: DetectionClass) -> bool {
        self.class == class
    }
}
