//! Grouping of carton faces into horizontal layers

use crate::types::{BoxRoi, Layer};
use tracing::debug;

/// Splits boxes into layers wherever the vertical gap between consecutive
/// centers exceeds `gap_ratio` times the running mean box height
#[derive(Debug, Clone, Copy)]
pub struct LayerClusterer {
    gap_ratio: f32,
}

impl Default for LayerClusterer {
    fn default() -> Self {
        Self { gap_ratio: 0.6 }
    }
}

impl LayerClusterer {
    #[must_use]
    pub fn new(gap_ratio: f32) -> Self {
        Self { gap_ratio }
    }

    /// Cluster boxes into layers ordered top to bottom, indexed from 1
    #[must_use]
    pub fn cluster(&self, mut boxes: Vec<BoxRoi>) -> Vec<Layer> {
        if boxes.is_empty() {
            return Vec::new();
        }
        boxes.sort_by(|a, b| a.roi.center_y().total_cmp(&b.roi.center_y()));

        let mut groups: Vec<Vec<BoxRoi>> = Vec::new();
        let mut current: Vec<BoxRoi> = Vec::new();
        let mut height_sum = 0.0f32;
        let mut prev_center: Option<f32> = None;

        for (visited, b) in boxes.into_iter().enumerate() {
            height_sum += b.height();
            let avg_height = height_sum / (visited + 1) as f32;
            let center = b.roi.center_y();

            if let Some(prev) = prev_center {
                let gap = center - prev;
                if gap > self.gap_ratio * avg_height {
                    debug!(
                        "Layer break: gap {:.1} > {:.2} x {:.1}",
                        gap, self.gap_ratio, avg_height
                    );
                    groups.push(std::mem::take(&mut current));
                }
            }
            current.push(b);
            prev_center = Some(center);
        }
        groups.push(current);

        let layers: Vec<Layer> = groups
            .into_iter()
            .enumerate()
            .map(|(i, members)| Layer::new(i + 1, members))
            .collect();
        debug!(
            "Clustered {} layers: {:?}",
            layers.len(),
            layers.iter().map(Layer::box_count).collect::<Vec<_>>()
        );
        layers
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use carton_count_common::Rect;

    fn row(y: f32, n: usize) -> Vec<BoxRoi> {
        (0..n)
            .map(|i| {
                let x = i as f32 * 50.0;
                BoxRoi::new(Rect::new(x, y, x + 45.0, y + 40.0).unwrap())
            })
            .collect()
    }

    #[test]
    fn test_empty_input() {
        assert!(LayerClusterer::default().cluster(Vec::new()).is_empty());
    }

    #[test]
    fn test_three_rows() {
        let mut boxes = row(200.0, 4);
        boxes.extend(row(100.0, 5));
        boxes.extend(row(300.0, 3));

        let layers = LayerClusterer::default().cluster(boxes);
        assert_eq!(layers.len(), 3);
        assert_eq!(
            layers.iter().map(Layer::box_count).collect::<Vec<_>>(),
            vec![5, 4, 3]
        );
        assert_eq!(layers[0].index, 1);
        assert_eq!(layers[0].avg_y, 120.0);
        assert!(layers.windows(2).all(|w| w[0].avg_y < w[1].avg_y));
    }

    #[test]
    fn test_gap_at_threshold_does_not_split() {
        // 40 px boxes with ratio 0.5 break only on gaps above 20 px
        let pair = |dy: f32| {
            vec![
                BoxRoi::new(Rect::new(0.0, 0.0, 10.0, 40.0).unwrap()),
                BoxRoi::new(Rect::new(20.0, dy, 30.0, dy + 40.0).unwrap()),
            ]
        };
        assert_eq!(LayerClusterer::new(0.5).cluster(pair(20.0)).len(), 1);
        assert_eq!(LayerClusterer::new(0.5).cluster(pair(21.0)).len(), 2);
    }

    #[test]
    fn test_jitter_stays_in_one_layer() {
        let boxes: Vec<BoxRoi> = (0..6)
            .map(|i| {
                let x = i as f32 * 50.0;
                let y = 100.0 + (i % 3) as f32 * 8.0;
                BoxRoi::new(Rect::new(x, y, x + 45.0, y + 40.0).unwrap())
            })
            .collect();
        let layers = LayerClusterer::new(0.6).cluster(boxes);
        assert_eq!(layers.len(), 1);
        assert_eq!(layers[0].box_count(), 6);
    }
}
