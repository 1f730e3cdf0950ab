//! Decoding and non-maximum suppression of raw detector output

use crate::{DetectionError, DetectorConfig};
use carton_count_common::{Detection, DetectionClass, Rect};
use tracing::debug;

/// Greedy per-class non-maximum suppression
///
/// Detections are visited by descending confidence; any later detection of
/// the same class overlapping a kept one by `iou_threshold` or more is dropped.
#[must_use]
pub fn non_max_suppression(mut detections: Vec<Detection>, iou_threshold: f32) -> Vec<Detection> {
    detections.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut keep: Vec<Detection> = Vec::with_capacity(detections.len());
    for det in detections {
        let suppressed = keep
            .iter()
            .any(|k| k.class == det.class && k.rect.iou(&det.rect) >= iou_threshold);
        if !suppressed {
            keep.push(det);
        }
    }

    debug!("Detections after NMS: {}", keep.len());
    keep
}

/// Decode a `YOLOv8` output tensor laid out as `[1, 4 + classes, anchors]`
///
/// Box coordinates are in model input pixels and are rescaled to the source
/// image, then clipped to it. Anchors whose best class is not one of the
/// configured class names are ignored.
pub fn decode_yolo_output(
    data: &[f32],
    dims: &[usize],
    config: &DetectorConfig,
    source_size: (u32, u32),
) -> Result<Vec<Detection>, DetectionError> {
    if dims.len() != 3 {
        return Err(DetectionError::Inference(format!(
            "Expected 3D output tensor, got {}D",
            dims.len()
        )));
    }
    let num_features = dims[1];
    let num_anchors = dims[2];
    if num_features <= 4 {
        return Err(DetectionError::Inference(format!(
            "Output has {num_features} features, expected box coordinates plus classes"
        )));
    }
    if data.len() < num_features * num_anchors {
        return Err(DetectionError::Inference(format!(
            "Output holds {} values, shape needs {}",
            data.len(),
            num_features * num_anchors
        )));
    }

    let classes: Vec<Option<DetectionClass>> = config
        .class_names
        .iter()
        .map(|name| name.parse().ok())
        .collect();

    let (src_w, src_h) = (source_size.0 as f32, source_size.1 as f32);
    let scale_x = src_w / config.input_size as f32;
    let scale_y = src_h / config.input_size as f32;

    let mut raw = Vec::with_capacity(num_anchors / 10);
    for anchor in 0..num_anchors {
        // [batch, features, anchors]
        let feature = |i: usize| data[i * num_anchors + anchor];

        let mut best = 0.0f32;
        let mut best_id = 0usize;
        for class_id in 0..num_features - 4 {
            let p = feature(4 + class_id);
            if p > best {
                best = p;
                best_id = class_id;
            }
        }
        if best < config.confidence_threshold {
            continue;
        }
        let Some(Some(class)) = classes.get(best_id).copied() else {
            continue;
        };

        let (cx, cy, w, h) = (feature(0), feature(1), feature(2), feature(3));
        let x1 = ((cx - w / 2.0) * scale_x).clamp(0.0, src_w);
        let y1 = ((cy - h / 2.0) * scale_y).clamp(0.0, src_h);
        let x2 = ((cx + w / 2.0) * scale_x).clamp(0.0, src_w);
        let y2 = ((cy + h / 2.0) * scale_y).clamp(0.0, src_h);
        if let Ok(rect) = Rect::new(x1, y1, x2, y2) {
            raw.push(Detection::new(class, rect, best));
        }
    }

    debug!("Raw detections before NMS: {}", raw.len());
    let mut detections = non_max_suppression(raw, config.iou_threshold);
    detections.truncate(config.max_detections);
    Ok(detections)
}
