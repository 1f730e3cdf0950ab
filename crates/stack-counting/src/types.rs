//! Records flowing through the counting pipeline

use carton_count_common::{Detection, ImageSize, Rect};
use carton_count_depth::DepthMatrix;
use serde::{Deserialize, Serialize};

/// Region of the active pile, optionally tied to its source image size
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PileRoi {
    pub rect: Rect,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_size: Option<ImageSize>,
}

impl PileRoi {
    #[must_use]
    pub fn new(rect: Rect) -> Self {
        Self {
            rect,
            image_size: None,
        }
    }

    #[must_use]
    pub fn with_image_size(mut self, size: ImageSize) -> Self {
        self.image_size = Some(size);
        self
    }

    #[must_use]
    #[inline]
    pub fn width(&self) -> f32 {
        self.rect.width()
    }
}

/// One carton-face detection inside the pile
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoxRoi {
    pub roi: Rect,
    pub confidence: f32,
    /// Index of the originating detection, when known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detection_index: Option<usize>,
}

impl BoxRoi {
    #[must_use]
    pub fn new(roi: Rect) -> Self {
        Self {
            roi,
            confidence: 1.0,
            detection_index: None,
        }
    }

    #[must_use]
    pub fn from_detection(index: usize, detection: &Detection) -> Self {
        Self {
            roi: detection.rect,
            confidence: detection.confidence,
            detection_index: Some(index),
        }
    }

    #[must_use]
    #[inline]
    pub fn height(&self) -> f32 {
        self.roi.height()
    }

    #[must_use]
    #[inline]
    pub fn width(&self) -> f32 {
        self.roi.width()
    }
}

/// Horizontal row of cartons; index 1 is the topmost layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Layer {
    pub index: usize,
    /// Mean vertical center of the member boxes
    pub avg_y: f32,
    pub boxes: Vec<BoxRoi>,
    /// Bounding rectangle of the members; recomputed from `boxes` when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub roi: Option<Rect>,
    /// Boxes dropped as rear-row duplicates
    #[serde(default)]
    pub rear_removed: usize,
}

impl Layer {
    /// Build a layer, deriving `avg_y` and `roi` from the boxes
    #[must_use]
    pub fn new(index: usize, boxes: Vec<BoxRoi>) -> Self {
        let centers: Vec<f32> = boxes.iter().map(|b| b.roi.center_y()).collect();
        let avg_y = carton_count_common::stats::mean(&centers).unwrap_or(0.0);
        let roi = Rect::bounding(boxes.iter().map(|b| &b.roi));
        Self {
            index,
            avg_y,
            boxes,
            roi,
            rear_removed: 0,
        }
    }

    /// Same layer with a new member set; index and rear-removal count are kept
    #[must_use]
    pub fn with_boxes(&self, boxes: Vec<BoxRoi>) -> Self {
        Self {
            rear_removed: self.rear_removed,
            ..Layer::new(self.index, boxes)
        }
    }

    #[must_use]
    #[inline]
    pub fn box_count(&self) -> usize {
        self.boxes.len()
    }

    /// Horizontal extent: `roi` when present, otherwise the member bounding box
    #[must_use]
    pub fn extent(&self) -> Option<Rect> {
        self.roi
            .or_else(|| Rect::bounding(self.boxes.iter().map(|b| &b.roi)))
    }

    /// Width of [`Layer::extent`], 0 for an empty layer
    #[must_use]
    pub fn extent_width(&self) -> f32 {
        self.extent().map_or(0.0, |r| r.width())
    }
}

/// Expected box count per layer, index 0 being the top layer
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TemplateLayers(Vec<u32>);

impl TemplateLayers {
    #[must_use]
    pub fn new(counts: Vec<u32>) -> Self {
        Self(counts)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn as_slice(&self) -> &[u32] {
        &self.0
    }

    /// Expected count of the top layer, 0 when unknown
    #[must_use]
    pub fn top(&self) -> u32 {
        self.0.first().copied().unwrap_or(0)
    }

    /// Sum of all entries, saturating at `u32::MAX`
    #[must_use]
    pub fn sum(&self) -> u32 {
        saturating_sum(&self.0)
    }

    /// Sum of the first `n` entries
    #[must_use]
    pub fn sum_first(&self, n: usize) -> u32 {
        saturating_sum(&self.0[..n.min(self.0.len())])
    }

    /// Sum of every entry but the last; 0 when there is at most one entry
    #[must_use]
    pub fn sum_without_last(&self) -> u32 {
        match self.0.split_last() {
            Some((_, rest)) => saturating_sum(rest),
            None => 0,
        }
    }

    /// One entry per layer taken from its raw box count
    #[must_use]
    pub fn from_layers(layers: &[Layer]) -> Self {
        Self(layers.iter().map(|l| l.box_count() as u32).collect())
    }
}

fn saturating_sum(counts: &[u32]) -> u32 {
    counts.iter().fold(0u32, |acc, &c| acc.saturating_add(c))
}

impl From<Vec<u32>> for TemplateLayers {
    fn from(counts: Vec<u32>) -> Self {
        Self(counts)
    }
}

/// Immutable per-call inputs shared by every stage after scene selection
#[derive(Debug, Clone)]
pub struct CountContext {
    pub pile_roi: PileRoi,
    /// Confident detections of the capture
    pub detections: Vec<Detection>,
    pub depth: Option<DepthMatrix>,
}

impl CountContext {
    #[must_use]
    pub fn new(pile_roi: PileRoi) -> Self {
        Self {
            pile_roi,
            detections: Vec::new(),
            depth: None,
        }
    }

    #[must_use]
    pub fn with_detections(mut self, detections: Vec<Detection>) -> Self {
        self.detections = detections;
        self
    }

    #[must_use]
    pub fn with_depth(mut self, depth: Option<DepthMatrix>) -> Self {
        self.depth = depth;
        self
    }
}
