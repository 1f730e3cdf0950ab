//! Layer clean-up passes applied between clustering and classification
//!
//! - Rear-box suppression drops back-row cartons seen through gaps in deep piles
//! - Fake-top removal drops a narrow top layer produced by perspective
//! - Height filtering drops partially visible boxes from the top layer

use crate::types::{BoxRoi, Layer};
use carton_count_common::stats;
use tracing::{debug, warn};

/// Layers with more boxes than this are candidates for rear suppression
const REAR_SUPPRESSION_MIN_BOXES: usize = 3;

#[derive(Debug, Clone, Copy)]
pub struct LayerFilter {
    width_ratio_thr: f32,
    height_filter_ratio: f32,
}

impl Default for LayerFilter {
    fn default() -> Self {
        Self {
            width_ratio_thr: 0.7,
            height_filter_ratio: 0.5,
        }
    }
}

impl LayerFilter {
    #[must_use]
    pub fn new(width_ratio_thr: f32, height_filter_ratio: f32) -> Self {
        Self {
            width_ratio_thr,
            height_filter_ratio,
        }
    }

    /// Keep only front-row boxes (center at or below the layer mean) in
    /// layers with more than three boxes; a single layer passes through
    #[must_use]
    pub fn suppress_rear_boxes(&self, layers: Vec<Layer>) -> Vec<Layer> {
        if layers.len() <= 1 {
            return layers;
        }

        layers
            .into_iter()
            .map(|layer| {
                if layer.box_count() <= REAR_SUPPRESSION_MIN_BOXES {
                    return layer;
                }
                let centers: Vec<f32> = layer.boxes.iter().map(|b| b.roi.center_y()).collect();
                let Some(mean) = stats::mean(&centers) else {
                    return layer;
                };
                let front: Vec<BoxRoi> = layer
                    .boxes
                    .iter()
                    .zip(&centers)
                    .filter(|(_, c)| **c >= mean)
                    .map(|(b, _)| *b)
                    .collect();

                let removed = layer.box_count() - front.len();
                if removed > 0 {
                    debug!(
                        "Layer {}: removed {} rear boxes (mean y {:.1}, std {:.1})",
                        layer.index,
                        removed,
                        mean,
                        stats::std_dev(&centers).unwrap_or(0.0)
                    );
                }
                let mut filtered = layer.with_boxes(front);
                filtered.rear_removed += removed;
                filtered
            })
            .collect()
    }

    /// Drop the topmost layer when it is much narrower than the one below it
    #[must_use]
    pub fn remove_fake_top_layer(&self, layers: Vec<Layer>) -> Vec<Layer> {
        if layers.len() < 2 {
            return layers;
        }
        let mut layers = sort_by_height(layers);

        let width_top = layers[0].extent_width();
        let width_next = layers[1].extent_width();
        let ratio = width_top / width_next.max(1e-6);
        debug!(
            "Top layer width {:.1}, next {:.1}, ratio {:.2}",
            width_top, width_next, ratio
        );

        if ratio < self.width_ratio_thr {
            warn!(
                "Top layer width ratio {:.2} below {:.2}, dropping it as a fake layer",
                ratio, self.width_ratio_thr
            );
            layers.remove(0);
        }
        layers
    }

    /// Drop boxes shorter than `height_filter_ratio` times the tallest box
    #[must_use]
    pub fn filter_by_height(&self, layer: &Layer) -> Layer {
        let max_height = layer
            .boxes
            .iter()
            .map(BoxRoi::height)
            .fold(0.0f32, f32::max);
        let min_height = self.height_filter_ratio * max_height;

        let kept: Vec<BoxRoi> = layer
            .boxes
            .iter()
            .filter(|b| b.height() >= min_height)
            .copied()
            .collect();
        if kept.len() < layer.box_count() {
            debug!(
                "Layer {}: height filter kept {}/{} boxes (min {:.1})",
                layer.index,
                kept.len(),
                layer.box_count(),
                min_height
            );
        }
        layer.with_boxes(kept)
    }
}

fn sort_by_height(mut layers: Vec<Layer>) -> Vec<Layer> {
    layers.sort_by(|a, b| a.avg_y.total_cmp(&b.avg_y));
    layers
}

/// Sort layers top to bottom and re-index them from 1
#[must_use]
pub fn sort_and_reindex(layers: Vec<Layer>) -> Vec<Layer> {
    let mut layers = sort_by_height(layers);
    for (i, layer) in layers.iter_mut().enumerate() {
        layer.index = i + 1;
    }
    layers
}

#[cfg(test)]
mod tests {
    use super::*;
    use carton_count_common::Rect;

    fn bx(x: f32, y: f32, w: f32, h: f32) -> BoxRoi {
        BoxRoi::new(Rect::from_xywh(x, y, w, h).unwrap())
    }

    fn row(y: f32, n: usize, w: f32) -> Vec<BoxRoi> {
        (0..n).map(|i| bx(i as f32 * w, y, w - 2.0, 40.0)).collect()
    }

    #[test]
    fn test_rear_suppression_keeps_front_row() {
        let mut top = row(100.0, 4, 50.0);
        // Two rear boxes sit 20 px higher
        top[1] = bx(50.0, 80.0, 48.0, 40.0);
        top[3] = bx(150.0, 80.0, 48.0, 40.0);
        let layers = vec![Layer::new(1, top), Layer::new(2, row(200.0, 4, 50.0))];

        let out = LayerFilter::default().suppress_rear_boxes(layers);
        assert_eq!(out[0].box_count(), 2);
        assert_eq!(out[0].rear_removed, 2);
        assert_eq!(out[1].box_count(), 4);
        assert_eq!(out[1].rear_removed, 0);
    }

    #[test]
    fn test_rear_suppression_skips_single_and_small_layers() {
        let mut top = row(100.0, 4, 50.0);
        top[0] = bx(0.0, 70.0, 48.0, 40.0);
        let single = vec![Layer::new(1, top.clone())];
        assert_eq!(LayerFilter::default().suppress_rear_boxes(single)[0].box_count(), 4);

        let mut small = row(100.0, 3, 50.0);
        small[0] = bx(0.0, 70.0, 48.0, 40.0);
        let layers = vec![Layer::new(1, small), Layer::new(2, row(200.0, 3, 50.0))];
        let out = LayerFilter::default().suppress_rear_boxes(layers);
        assert_eq!(out[0].box_count(), 3);
    }

    #[test]
    fn test_fake_top_layer_dropped() {
        let layers = vec![
            Layer::new(2, row(200.0, 10, 50.0)),
            Layer::new(1, row(100.0, 5, 50.0)),
        ];
        let out = LayerFilter::default().remove_fake_top_layer(layers);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].box_count(), 10);
    }

    #[test]
    fn test_fake_top_layer_kept_when_wide() {
        let layers = vec![
            Layer::new(1, row(100.0, 8, 50.0)),
            Layer::new(2, row(200.0, 10, 50.0)),
        ];
        let out = LayerFilter::default().remove_fake_top_layer(layers);
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn test_height_filter() {
        let mut boxes = row(100.0, 3, 50.0);
        boxes.push(bx(150.0, 120.0, 48.0, 15.0));
        let layer = Layer::new(1, boxes);
        let out = LayerFilter::default().filter_by_height(&layer);
        assert_eq!(out.box_count(), 3);
        assert_eq!(out.index, 1);
    }

    #[test]
    fn test_sort_and_reindex() {
        let layers = vec![
            Layer::new(7, row(300.0, 2, 50.0)),
            Layer::new(3, row(100.0, 2, 50.0)),
            Layer::new(9, row(200.0, 2, 50.0)),
        ];
        let out = sort_and_reindex(layers);
        assert_eq!(out.iter().map(|l| l.index).collect::<Vec<_>>(), vec![1, 2, 3]);
        assert_eq!(out[0].avg_y, 120.0);
    }
}
