use std::cmp::Ordering;

use super::result::Detection;

/// Greedy non-maximum suppression, applied per class.
///
/// Candidates are visited in descending confidence. A candidate is dropped when its
/// IoU with an already kept box of the same class exceeds `overlap`. The output is
/// ordered by descending confidence.
pub fn non_max_suppression(candidates: Vec<Detection>, overlap: f32) -> Vec<Detection> {
    let keep = surviving_indices(&candidates, overlap);
    let mut slots: Vec<Option<Detection>> = candidates.into_iter().map(Some).collect();
    keep.into_iter().filter_map(|i| slots[i].take()).collect()
}

/// Same selection as `non_max_suppression`, returned as indices into
/// `candidates` in output order. Lets callers carry per-candidate data
/// (mask coefficients) through suppression.
pub fn surviving_indices(candidates: &[Detection], overlap: f32) -> Vec<usize> {
    let mut order: Vec<usize> = (0..candidates.len()).collect();
    order.sort_by(|&a, &b| {
        candidates[b]
            .confidence
            .partial_cmp(&candidates[a].confidence)
            .unwrap_or(Ordering::Equal)
    });

    let mut kept: Vec<usize> = Vec::with_capacity(order.len());
    for i in order {
        let candidate = &candidates[i];
        let suppressed = kept.iter().any(|&k| {
            let k = &candidates[k];
            k.class_id == candidate.class_id && k.bbox.iou(&candidate.bbox) > overlap
        });
        if !suppressed {
            kept.push(i);
        }
    }
    kept
}
