//! Counting strategies selected by the classification status
//!
//! `Full` trusts the template for every visible layer, `Partial` counts the
//! lower layers from the template and the top layer from detections, and
//! `Single` counts carton tops seen from above.

use crate::classifier::{ClassificationResult, ClassificationStatus};
use crate::types::{BoxRoi, CountContext, Layer, TemplateLayers};
use carton_count_common::DetectionClass;
use carton_count_depth::sampling::{sample_depth, DepthSample, DepthSamplingConfig, SampleFailure};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, info, warn};

/// How the total was obtained
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyTag {
    FullMatch,
    PartialVisible,
    ExceedTemplate,
    PartialWithTemplate,
    SingleLayerTops,
    SingleLayerBoxes,
}

impl fmt::Display for StrategyTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            StrategyTag::FullMatch => "full_match",
            StrategyTag::PartialVisible => "partial_visible",
            StrategyTag::ExceedTemplate => "exceed_template",
            StrategyTag::PartialWithTemplate => "partial_with_template",
            StrategyTag::SingleLayerTops => "single_layer_tops",
            StrategyTag::SingleLayerBoxes => "single_layer_boxes",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FullDetails {
    pub n_detected: usize,
    pub n_template: usize,
    pub template_sum: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartialDetails {
    pub n_detected: usize,
    pub n_template: usize,
    pub top_layer_observed: u32,
    pub lower_layers_sum: u32,
    pub top_layer_boxes: Vec<BoxRoi>,
    /// One entry per top box when a depth matrix was supplied
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depth_samples: Vec<TopBoxDepth>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SingleDetails {
    pub top_detections: u32,
    pub layer_box_count: u32,
}

/// Depth read at the center of one top-layer box
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopBoxDepth {
    pub box_index: usize,
    pub outcome: DepthOutcome,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DepthOutcome {
    Sampled(DepthSample),
    Failed(SampleFailure),
    /// The pile ROI carries no image size to normalize against
    NoImageSize,
}

/// Per-strategy diagnostics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProcessingDetails {
    Full(FullDetails),
    Partial(PartialDetails),
    Single(SingleDetails),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingResult {
    pub total: u32,
    pub strategy: StrategyTag,
    pub details: ProcessingDetails,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StackStrategy {
    Full,
    Partial,
    Single,
}

impl From<ClassificationStatus> for StackStrategy {
    fn from(status: ClassificationStatus) -> Self {
        match status {
            ClassificationStatus::Full => StackStrategy::Full,
            ClassificationStatus::Partial => StackStrategy::Partial,
            ClassificationStatus::SingleLayer => StackStrategy::Single,
        }
    }
}

impl StackStrategy {
    /// Compute the total for layers sorted top to bottom
    #[must_use]
    pub fn process(
        self,
        layers: &[Layer],
        template: &TemplateLayers,
        classification: &ClassificationResult,
        ctx: &CountContext,
        sampling: &DepthSamplingConfig,
    ) -> ProcessingResult {
        debug!(
            "Dispatching {:?} strategy for {} ({})",
            self, classification.status, classification.reason
        );
        let result = match self {
            StackStrategy::Full => process_full(layers, template),
            StackStrategy::Partial => process_partial(layers, template, ctx, sampling),
            StackStrategy::Single => process_single(layers, ctx),
        };
        info!("Strategy {} -> total {}", result.strategy, result.total);
        result
    }
}

fn process_full(layers: &[Layer], template: &TemplateLayers) -> ProcessingResult {
    let n_detected = layers.len();
    let n_template = template.len();

    let (total, strategy) = match n_detected.cmp(&n_template) {
        std::cmp::Ordering::Equal => (template.sum(), StrategyTag::FullMatch),
        std::cmp::Ordering::Less => (template.sum_first(n_detected), StrategyTag::PartialVisible),
        std::cmp::Ordering::Greater => {
            warn!(
                "Detected {} layers but template has {}, using full template",
                n_detected, n_template
            );
            (template.sum(), StrategyTag::ExceedTemplate)
        }
    };

    ProcessingResult {
        total,
        strategy,
        details: ProcessingDetails::Full(FullDetails {
            n_detected,
            n_template,
            template_sum: template.sum(),
        }),
    }
}

fn process_partial(
    layers: &[Layer],
    template: &TemplateLayers,
    ctx: &CountContext,
    sampling: &DepthSamplingConfig,
) -> ProcessingResult {
    let lower_layers_sum = template.sum_without_last();
    let Some(top) = layers.first() else {
        return ProcessingResult {
            total: 0,
            strategy: StrategyTag::PartialWithTemplate,
            details: ProcessingDetails::Partial(PartialDetails {
                n_detected: 0,
                n_template: template.len(),
                top_layer_observed: 0,
                lower_layers_sum,
                top_layer_boxes: Vec::new(),
                depth_samples: Vec::new(),
            }),
        };
    };

    let top_layer_observed = top.box_count() as u32;
    let depth_samples = sample_top_layer(top, ctx, sampling);
    if !depth_samples.is_empty() {
        let sampled = depth_samples
            .iter()
            .filter(|s| matches!(s.outcome, DepthOutcome::Sampled(_)))
            .count();
        debug!(
            "Top layer depth: {}/{} boxes sampled, count left unchanged",
            sampled,
            depth_samples.len()
        );
    }

    ProcessingResult {
        total: lower_layers_sum.saturating_add(top_layer_observed),
        strategy: StrategyTag::PartialWithTemplate,
        details: ProcessingDetails::Partial(PartialDetails {
            n_detected: layers.len(),
            n_template: template.len(),
            top_layer_observed,
            lower_layers_sum,
            top_layer_boxes: top.boxes.clone(),
            depth_samples,
        }),
    }
}

/// Sample depth at every top box center; empty without a depth matrix
fn sample_top_layer(top: &Layer, ctx: &CountContext, sampling: &DepthSamplingConfig) -> Vec<TopBoxDepth> {
    let Some(depth) = ctx.depth.as_ref() else {
        return Vec::new();
    };

    top.boxes
        .iter()
        .enumerate()
        .map(|(box_index, b)| {
            let (cx, cy) = b.roi.center();
            let outcome = match ctx.pile_roi.image_size.and_then(|s| s.normalize(cx, cy)) {
                Some((x, y)) => match sample_depth(depth, x, y, sampling) {
                    Ok(sample) => DepthOutcome::Sampled(sample),
                    Err(failure) => DepthOutcome::Failed(failure),
                },
                None => DepthOutcome::NoImageSize,
            };
            TopBoxDepth { box_index, outcome }
        })
        .collect()
}

fn process_single(layers: &[Layer], ctx: &CountContext) -> ProcessingResult {
    let pile = &ctx.pile_roi.rect;
    let top_detections = ctx
        .detections
        .iter()
        .filter(|d| d.is(DetectionClass::Top) && pile.contains_center_of(&d.rect))
        .count() as u32;
    let layer_box_count = layers.first().map_or(0, |l| l.box_count() as u32);

    let (total, strategy) = if top_detections > 0 {
        (top_detections, StrategyTag::SingleLayerTops)
    } else {
        (layer_box_count, StrategyTag::SingleLayerBoxes)
    };

    ProcessingResult {
        total,
        strategy,
        details: ProcessingDetails::Single(SingleDetails {
            top_detections,
            layer_box_count,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::ClassificationReason;
    use crate::types::PileRoi;
    use carton_count_common::{Detection, ImageSize, Rect};
    use carton_count_depth::DepthMatrix;
    use ndarray::Array2;

    fn layer(index: usize, n: usize) -> Layer {
        let y = index as f32 * 100.0;
        let boxes = (0..n)
            .map(|i| {
                let x = i as f32 * 50.0;
                BoxRoi::new(Rect::new(x, y, x + 45.0, y + 40.0).unwrap())
            })
            .collect();
        Layer::new(index, boxes)
    }

    fn verdict(status: ClassificationStatus) -> ClassificationResult {
        ClassificationResult {
            status,
            reason: ClassificationReason::LowCoverageOrGap,
            top_layer: None,
            metrics: None,
        }
    }

    fn ctx() -> CountContext {
        CountContext::new(PileRoi::new(Rect::new(0.0, 0.0, 600.0, 600.0).unwrap()))
    }

    fn run(strategy: StackStrategy, layers: &[Layer], template: Vec<u32>, ctx: &CountContext) -> ProcessingResult {
        let status = match strategy {
            StackStrategy::Full => ClassificationStatus::Full,
            StackStrategy::Partial => ClassificationStatus::Partial,
            StackStrategy::Single => ClassificationStatus::SingleLayer,
        };
        strategy.process(
            layers,
            &TemplateLayers::new(template),
            &verdict(status),
            ctx,
            &DepthSamplingConfig::default(),
        )
    }

    #[test]
    fn test_full_variants() {
        let three = [layer(1, 10), layer(2, 10), layer(3, 10)];
        let r = run(StackStrategy::Full, &three, vec![10, 12, 12], &ctx());
        assert_eq!((r.total, r.strategy), (34, StrategyTag::FullMatch));

        let r = run(StackStrategy::Full, &three[..2], vec![10, 12, 12], &ctx());
        assert_eq!((r.total, r.strategy), (22, StrategyTag::PartialVisible));

        let r = run(StackStrategy::Full, &three, vec![10, 12], &ctx());
        assert_eq!((r.total, r.strategy), (22, StrategyTag::ExceedTemplate));
    }

    #[test]
    fn test_partial_sums_lower_template() {
        let layers = [layer(1, 8), layer(2, 10), layer(3, 10)];
        let r = run(StackStrategy::Partial, &layers, vec![10, 10, 10], &ctx());
        assert_eq!(r.total, 28);
        let ProcessingDetails::Partial(d) = r.details else {
            panic!("expected partial details");
        };
        assert_eq!(d.lower_layers_sum, 20);
        assert_eq!(d.top_layer_boxes.len(), 8);
        assert!(d.depth_samples.is_empty());

        assert_eq!(run(StackStrategy::Partial, &[], vec![10, 10], &ctx()).total, 0);
        assert_eq!(run(StackStrategy::Partial, &[layer(1, 4)], vec![10], &ctx()).total, 4);
    }

    #[test]
    fn test_partial_depth_is_diagnostic() {
        let layers = [layer(1, 3), layer(2, 10)];
        let depth = DepthMatrix::from_array(Array2::from_elem((60, 60), 1800.0)).unwrap();
        let with_size = CountContext::new(
            PileRoi::new(Rect::new(0.0, 0.0, 600.0, 600.0).unwrap()).with_image_size(ImageSize::new(600, 600)),
        )
        .with_depth(Some(depth.clone()));

        let r = run(StackStrategy::Partial, &layers, vec![10, 10], &with_size);
        assert_eq!(r.total, 13);
        let ProcessingDetails::Partial(d) = r.details else {
            panic!("expected partial details");
        };
        assert_eq!(d.depth_samples.len(), 3);
        assert!(matches!(
            &d.depth_samples[0].outcome,
            DepthOutcome::Sampled(s) if s.value == 1800.0
        ));

        let no_size = ctx().with_depth(Some(depth));
        let r = run(StackStrategy::Partial, &layers, vec![10, 10], &no_size);
        assert_eq!(r.total, 13);
        let ProcessingDetails::Partial(d) = r.details else {
            panic!("expected partial details");
        };
        assert!(d.depth_samples.iter().all(|s| s.outcome == DepthOutcome::NoImageSize));
    }

    #[test]
    fn test_single_counts_tops_inside_pile() {
        let mut detections: Vec<Detection> = (0..6)
            .map(|i| {
                let x = 10.0 + i as f32 * 60.0;
                Detection::new(DetectionClass::Top, Rect::new(x, 10.0, x + 50.0, 40.0).unwrap(), 0.9)
            })
            .collect();
        detections.push(Detection::new(
            DetectionClass::Top,
            Rect::new(700.0, 10.0, 750.0, 40.0).unwrap(),
            0.9,
        ));
        let ctx = ctx().with_detections(detections);

        let r = run(StackStrategy::Single, &[layer(1, 4)], vec![], &ctx);
        assert_eq!((r.total, r.strategy), (6, StrategyTag::SingleLayerTops));

        let r = run(StackStrategy::Single, &[layer(1, 4)], vec![], &self::ctx());
        assert_eq!((r.total, r.strategy), (4, StrategyTag::SingleLayerBoxes));
    }

    #[test]
    fn test_dispatch_from_status() {
        assert_eq!(StackStrategy::from(ClassificationStatus::Full), StackStrategy::Full);
        assert_eq!(StackStrategy::from(ClassificationStatus::Partial), StackStrategy::Partial);
        assert_eq!(StackStrategy::from(ClassificationStatus::SingleLayer), StackStrategy::Single);
    }
}
