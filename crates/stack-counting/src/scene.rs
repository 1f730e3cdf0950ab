//! Selection of the active pile and its carton faces from raw detections

use crate::types::{BoxRoi, PileRoi};
use carton_count_common::{Detection, DetectionClass, ImageSize, Rect};
use tracing::{debug, warn};

/// Pile region and member boxes chosen for counting
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedScene {
    pub pile_roi: PileRoi,
    pub boxes: Vec<BoxRoi>,
    /// Detections that passed the confidence threshold
    pub detections: Vec<Detection>,
}

pub trait SceneSelector: Send + Sync {
    /// Pick the pile to count; `None` when there is nothing to count
    fn prepare(
        &self,
        detections: &[Detection],
        confidence_threshold: f32,
        image_size: Option<ImageSize>,
    ) -> Option<PreparedScene>;
}

/// Counts the most confident pile detection in the image
#[derive(Debug, Clone, Copy, Default)]
pub struct PileSceneSelector;

impl SceneSelector for PileSceneSelector {
    fn prepare(
        &self,
        detections: &[Detection],
        confidence_threshold: f32,
        image_size: Option<ImageSize>,
    ) -> Option<PreparedScene> {
        let confident: Vec<Detection> = detections
            .iter()
            .filter(|d| d.confidence >= confidence_threshold)
            .cloned()
            .collect();

        let pile = confident
            .iter()
            .filter(|d| d.is(DetectionClass::Pile))
            .max_by(|a, b| {
                a.confidence
                    .total_cmp(&b.confidence)
                    .then_with(|| a.rect.area().total_cmp(&b.rect.area()))
            });
        let Some(pile) = pile else {
            debug!("No pile detection above {:.2}", confidence_threshold);
            return None;
        };

        let clipped = match image_size {
            Some(size) => Rect::new(0.0, 0.0, size.width as f32, size.height as f32)
                .ok()
                .and_then(|frame| frame.intersection(&pile.rect)),
            None => Some(pile.rect),
        };
        let rect = match clipped {
            Some(rect) => rect,
            None => {
                let fallback = Rect::bounding(
                    confident
                        .iter()
                        .filter(|d| d.is(DetectionClass::Box))
                        .map(|d| &d.rect),
                )?;
                warn!("Degenerate pile ROI, using extent of detected boxes instead");
                fallback
            }
        };

        let boxes: Vec<BoxRoi> = confident
            .iter()
            .enumerate()
            .filter(|(_, d)| d.is(DetectionClass::Box) && rect.contains_center_of(&d.rect))
            .map(|(i, d)| BoxRoi::from_detection(i, d))
            .collect();
        if boxes.is_empty() {
            debug!("No boxes inside the pile ROI");
            return None;
        }

        let mut pile_roi = PileRoi::new(rect);
        if let Some(size) = image_size {
            pile_roi = pile_roi.with_image_size(size);
        }
        debug!(
            "Selected pile {:?} with {} boxes ({} confident detections)",
            rect,
            boxes.len(),
            confident.len()
        );

        Some(PreparedScene {
            pile_roi,
            boxes,
            detections: confident,
        })
    }
}
