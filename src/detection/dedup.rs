use crate::models::{Detection, DetectionSet};

/// Remove near-duplicate detections from a single image.
///
/// Two detections are duplicates when their centers are closer than
/// `tolerance` pixels. Detections are visited by descending confidence
/// (earlier wins on equal confidence) and each one is kept only if it is not
/// a duplicate of something already kept, so no two survivors are
/// duplicates of each other. Survivors come back in their original order.
///
/// A tolerance of zero (or anything non-positive or NaN) keeps everything.
pub fn dedup(detections: &[Detection], tolerance: f64) -> Vec<Detection> {
    if tolerance.is_nan() || tolerance <= 0.0 || detections.len() < 2 {
        return detections.to_vec();
    }

    let mut order: Vec<usize> = (0..detections.len()).collect();
    order.sort_by(|&a, &b| {
        detections[b]
            .confidence
            .total_cmp(&detections[a].confidence)
    });

    let mut kept: Vec<usize> = Vec::with_capacity(detections.len());
    for idx in order {
        let candidate = &detections[idx];
        let duplicate = kept
            .iter()
            .any(|&k| detections[k].center_distance(candidate) < tolerance);
        if !duplicate {
            kept.push(idx);
        }
    }

    kept.sort_unstable();
    kept.into_iter().map(|idx| detections[idx]).collect()
}

/// Apply [`dedup`] to every image of a batch independently
pub fn dedup_batch(detections: &DetectionSet, tolerance: f64) -> DetectionSet {
    detections
        .iter()
        .map(|per_image| dedup(per_image, tolerance))
        .collect()
}
