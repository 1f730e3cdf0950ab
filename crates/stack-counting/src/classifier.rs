//! Full-layer classification of the visible pile
//!
//! The top layer decides how a pile is counted. It is `full` when its box
//! count matches the template, or when its boxes span the pile width with
//! regular spacing. Otherwise it is `partial`. A pile with a single visible
//! layer is classified separately.
//!
//! # Metrics
//! - `coverage`: merged horizontal extent of the top boxes divided by the
//!   pile width, capped at 1
//! - `cv_gap`: coefficient of variation of the gaps between consecutive box
//!   centers; regular rows score close to 0
//! - `cv_width`: coefficient of variation of box widths (diagnostic only)

use crate::filter::LayerFilter;
use crate::types::{BoxRoi, Layer, PileRoi, TemplateLayers};
use carton_count_common::stats;
use carton_count_depth::DepthMatrix;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassificationStatus {
    Full,
    Partial,
    SingleLayer,
}

impl fmt::Display for ClassificationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ClassificationStatus::Full => "full",
            ClassificationStatus::Partial => "partial",
            ClassificationStatus::SingleLayer => "single_layer",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassificationReason {
    MatchTemplate,
    ContinuousFilled,
    LowCoverageOrGap,
    EmptyLayers,
    SingleLayerDetected,
}

impl fmt::Display for ClassificationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ClassificationReason::MatchTemplate => "match_template",
            ClassificationReason::ContinuousFilled => "continuous_filled",
            ClassificationReason::LowCoverageOrGap => "low_coverage_or_gap",
            ClassificationReason::EmptyLayers => "empty_layers",
            ClassificationReason::SingleLayerDetected => "single_layer_detected",
        })
    }
}

/// Expected versus observed box count of the top layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopLayerStats {
    pub expected: u32,
    pub observed: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LayerMetrics {
    pub coverage: f32,
    pub cv_gap: f32,
    pub cv_width: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationResult {
    pub status: ClassificationStatus,
    pub reason: ClassificationReason,
    pub top_layer: Option<TopLayerStats>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics: Option<LayerMetrics>,
}

/// Classifier output: the verdict plus layers with the filtered top layer
#[derive(Debug, Clone)]
pub struct Classified {
    pub layers: Vec<Layer>,
    pub result: ClassificationResult,
}

#[derive(Debug, Clone, Copy)]
pub struct FullLayerClassifier {
    coverage_threshold: f32,
    cv_gap_threshold: f32,
    filter: LayerFilter,
}

impl Default for FullLayerClassifier {
    fn default() -> Self {
        Self {
            coverage_threshold: 0.9,
            cv_gap_threshold: 0.4,
            filter: LayerFilter::default(),
        }
    }
}

impl FullLayerClassifier {
    #[must_use]
    pub fn new(coverage_threshold: f32, cv_gap_threshold: f32, filter: LayerFilter) -> Self {
        Self {
            coverage_threshold,
            cv_gap_threshold,
            filter,
        }
    }

    /// Classify layers sorted top to bottom
    ///
    /// Depth, when present, is only reported in the debug log.
    pub fn classify(
        &self,
        mut layers: Vec<Layer>,
        template: &TemplateLayers,
        pile_roi: &PileRoi,
        depth: Option<&DepthMatrix>,
    ) -> Classified {
        if let Some(depth) = depth {
            debug!(
                "Depth matrix {}x{} available to classifier",
                depth.width(),
                depth.height()
            );
        }

        if layers.is_empty() {
            return Classified {
                layers,
                result: ClassificationResult {
                    status: ClassificationStatus::Partial,
                    reason: ClassificationReason::EmptyLayers,
                    top_layer: None,
                    metrics: None,
                },
            };
        }

        let top = self.filter.filter_by_height(&layers[0]);
        let observed = top.box_count() as u32;
        let expected = template.top();

        if layers.len() == 1 {
            layers[0] = top;
            debug!("Single layer with {} boxes", observed);
            return Classified {
                layers,
                result: ClassificationResult {
                    status: ClassificationStatus::SingleLayer,
                    reason: ClassificationReason::SingleLayerDetected,
                    top_layer: Some(TopLayerStats { expected, observed }),
                    metrics: None,
                },
            };
        }

        let metrics = LayerMetrics {
            coverage: coverage(&top.boxes, pile_roi.width()),
            cv_gap: cv_gap(&top.boxes),
            cv_width: cv_width(&top.boxes),
        };
        debug!(
            "Top layer: observed {}, expected {}, coverage {:.3}, cv_gap {:.3}, cv_width {:.3}",
            observed, expected, metrics.coverage, metrics.cv_gap, metrics.cv_width
        );

        let (status, reason) = if observed == expected {
            (ClassificationStatus::Full, ClassificationReason::MatchTemplate)
        } else if metrics.coverage > self.coverage_threshold && metrics.cv_gap < self.cv_gap_threshold {
            (ClassificationStatus::Full, ClassificationReason::ContinuousFilled)
        } else {
            (ClassificationStatus::Partial, ClassificationReason::LowCoverageOrGap)
        };

        layers[0] = top;
        Classified {
            layers,
            result: ClassificationResult {
                status,
                reason,
                top_layer: Some(TopLayerStats { expected, observed }),
                metrics: Some(metrics),
            },
        }
    }
}

/// Fraction of `pile_width` covered by the union of the boxes' x-intervals
///
/// Falls back to the width of the box extent when `pile_width` is not
/// positive. Always in `[0, 1]`.
#[must_use]
pub fn coverage(boxes: &[BoxRoi], pile_width: f32) -> f32 {
    if boxes.is_empty() {
        return 0.0;
    }
    let mut intervals: Vec<(f32, f32)> = boxes.iter().map(|b| (b.roi.x1(), b.roi.x2())).collect();
    intervals.sort_by(|a, b| a.0.total_cmp(&b.0));

    let mut merged: Vec<(f32, f32)> = Vec::with_capacity(intervals.len());
    for (start, end) in intervals {
        match merged.last_mut() {
            Some(last) if start <= last.1 => last.1 = last.1.max(end),
            _ => merged.push((start, end)),
        }
    }
    let covered: f32 = merged.iter().map(|(s, e)| e - s).sum();

    let width = if pile_width > 0.0 {
        pile_width
    } else {
        let lo = merged.first().map_or(0.0, |m| m.0);
        let hi = merged.iter().map(|m| m.1).fold(f32::MIN, f32::max);
        hi - lo
    };
    if width <= 0.0 {
        return 0.0;
    }
    (covered / width).clamp(0.0, 1.0)
}

/// Coefficient of variation of the gaps between sorted box centers
///
/// 0 for fewer than three boxes.
#[must_use]
pub fn cv_gap(boxes: &[BoxRoi]) -> f32 {
    if boxes.len() < 3 {
        return 0.0;
    }
    let mut centers: Vec<f32> = boxes.iter().map(|b| b.roi.center_x()).collect();
    centers.sort_by(f32::total_cmp);
    let gaps: Vec<f32> = centers.windows(2).map(|w| w[1] - w[0]).collect();
    stats::coefficient_of_variation(&gaps)
}

/// Coefficient of variation of box widths, 0 for fewer than two boxes
#[must_use]
pub fn cv_width(boxes: &[BoxRoi]) -> f32 {
    if boxes.len() < 2 {
        return 0.0;
    }
    let widths: Vec<f32> = boxes.iter().map(BoxRoi::width).collect();
    stats::coefficient_of_variation(&widths)
}
