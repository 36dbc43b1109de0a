//! Box overlap and non-maximum suppression shared by the face and object detectors.

use crate::types::BoundingBox;

/// Compute Intersection-over-Union between two bounding boxes.
pub fn iou(a: &BoundingBox, b: &BoundingBox) -> f32 {
    let x1 = a.x.max(b.x);
    let y1 = a.y.max(b.y);
    let x2 = (a.x + a.width).min(b.x + b.width);
    let y2 = (a.y + a.height).min(b.y + b.height);

    let inter_w = (x2 - x1).max(0.0);
    let inter_h = (y2 - y1).max(0.0);
    let inter_area = inter_w * inter_h;

    let union_area = a.area() + b.area() - inter_area;

    if union_area > 0.0 {
        inter_area / union_area
    } else {
        0.0
    }
}

/// Non-Maximum Suppression over `boxes`.
///
/// Returns indices of the surviving boxes, highest confidence first.
pub fn suppress(boxes: &[BoundingBox], iou_threshold: f32) -> Vec<usize> {
    let mut order: Vec<usize> = (0..boxes.len()).collect();
    order.sort_by(|&a, &b| {
        boxes[b]
            .confidence
            .partial_cmp(&boxes[a].confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut keep = Vec::new();
    let mut suppressed = vec![false; boxes.len()];

    for (pos, &i) in order.iter().enumerate() {
        if suppressed[i] {
            continue;
        }
        keep.push(i);

        for &j in &order[pos + 1..] {
            if !suppressed[j] && iou(&boxes[i], &boxes[j]) > iou_threshold {
                suppressed[j] = true;
            }
        }
    }

    keep
}

/// Apply [`suppress`] and return the surviving boxes.
pub fn nms(detections: Vec<BoundingBox>, iou_threshold: f32) -> Vec<BoundingBox> {
    let keep = suppress(&detections, iou_threshold);
    keep.into_iter().map(|i| detections[i].clone()).collect()
}
