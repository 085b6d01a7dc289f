//! Multi-adapter detection fusion.
//!
//! Merges the per-adapter results for one frame into a single deduplicated,
//! confidence-ranked set in the canonical class space. Pure and deterministic
//! given its inputs.

use crate::classmap::ClassMap;
use crate::detect::{ModelResult, NormBox, PixelBox};

/// Normalized center delta below which two same-class boxes are duplicates.
///
/// Fixed in normalized space, so the equivalent pixel distance scales with
/// resolution; reproduced as-is from the reference behavior. Compared in
/// `f64`, where a delta of exactly 0.01 stays on the non-duplicate side.
pub const DEDUP_CENTER_TOLERANCE: f64 = 0.01;

/// A detection translated into the canonical class space.
#[derive(Clone, Debug, PartialEq)]
pub struct CombinedDetection {
    pub class_id: u32,
    pub confidence: f32,
    pub box_px: PixelBox,
    pub box_norm: NormBox,
    pub source_adapter: usize,
}

/// Fuse one frame's per-adapter results into a deduplicated canonical set.
///
/// Detections whose class cannot be mapped to the canonical space are dropped.
/// The output is sorted by confidence descending (stable, so confidence ties
/// keep input order) and deduplicated greedily: a candidate is dropped when an
/// already-kept detection shares its canonical class and sits within
/// [`DEDUP_CENTER_TOLERANCE`] on both normalized center axes. The boundary is
/// exclusive; a delta of exactly 0.01 is not a duplicate.
///
/// The dedup pass is O(n²) over tens of boxes per frame. Keep it that way; an
/// approximate structure would change which of a near-duplicate pair survives.
pub fn fuse(results: &[ModelResult], class_map: &ClassMap) -> Vec<CombinedDetection> {
    let mut combined: Vec<CombinedDetection> = Vec::new();
    for (adapter, result) in results.iter().enumerate() {
        for det in &result.detections {
            let canonical = if adapter == 0 {
                Some(det.class_id)
            } else {
                class_map.map_to_canonical(adapter, det.class_id)
            };
            let Some(class_id) = canonical else {
                continue;
            };
            combined.push(CombinedDetection {
                class_id,
                confidence: det.confidence,
                box_px: det.box_px,
                box_norm: det.box_norm,
                source_adapter: adapter,
            });
        }
    }

    combined.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut kept: Vec<CombinedDetection> = Vec::with_capacity(combined.len());
    'candidates: for cand in combined {
        for existing in &kept {
            if existing.class_id == cand.class_id
                && (existing.box_norm.cx - cand.box_norm.cx).abs() < DEDUP_CENTER_TOLERANCE
                && (existing.box_norm.cy - cand.box_norm.cy).abs() < DEDUP_CENTER_TOLERANCE
            {
                continue 'candidates;
            }
        }
        kept.push(cand);
    }
    kept
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::Detection;

    fn map_two_adapters() -> ClassMap {
        let vocabularies = vec![
            vec!["person".to_string(), "helmet".to_string()],
            vec!["helmet".to_string(), "person".to_string()],
        ];
        let allowed = vec![vec![0, 1], vec![0, 1]];
        ClassMap::build(&vocabularies, &allowed).unwrap()
    }

    fn det_at(class_id: u32, confidence: f32, cx: f64, cy: f64) -> Detection {
        let box_px = PixelBox::new(
            (cx * 640.0 - 64.0) as f32,
            (cy * 480.0 - 96.0) as f32,
            (cx * 640.0 + 64.0) as f32,
            (cy * 480.0 + 96.0) as f32,
        );
        Detection::new(class_id, confidence, box_px, NormBox::new(cx, cy, 0.2, 0.4))
    }

    #[test]
    fn near_duplicates_keep_the_higher_confidence_entry() {
        let map = map_two_adapters();
        // Adapter 0 person at (0.5, 0.5) conf 0.9; adapter 1 person (local id 1)
        // at (0.505, 0.505) conf 0.8 is within tolerance and dropped.
        let results = vec![
            ModelResult::new(vec![det_at(0, 0.9, 0.5, 0.5)]),
            ModelResult::new(vec![det_at(1, 0.8, 0.505, 0.505)]),
        ];
        let fused = fuse(&results, &map);
        assert_eq!(fused.len(), 1);
        assert_eq!(fused[0].class_id, 0);
        assert_eq!(fused[0].source_adapter, 0);
        assert!((fused[0].confidence - 0.9).abs() < 1e-6);
    }

    #[test]
    fn tolerance_boundary_is_exclusive() {
        let map = map_two_adapters();
        // Centers exactly 0.01 apart on x: both retained. The delta rounds
        // below the tolerance in f32, so this pins the f64 comparison.
        let results = vec![
            ModelResult::new(vec![det_at(0, 0.9, 0.50, 0.5)]),
            ModelResult::new(vec![det_at(1, 0.8, 0.51, 0.5)]),
        ];
        let fused = fuse(&results, &map);
        assert_eq!(fused.len(), 2);
    }

    #[test]
    fn separation_on_one_axis_is_enough_to_retain_both() {
        let map = map_two_adapters();
        let results = vec![
            ModelResult::new(vec![det_at(0, 0.9, 0.5, 0.5), det_at(0, 0.7, 0.505, 0.52)]),
            ModelResult::new(vec![]),
        ];
        let fused = fuse(&results, &map);
        assert_eq!(fused.len(), 2);
    }

    #[test]
    fn different_classes_never_deduplicate() {
        let map = map_two_adapters();
        let results = vec![
            ModelResult::new(vec![det_at(0, 0.9, 0.5, 0.5), det_at(1, 0.8, 0.5, 0.5)]),
            ModelResult::new(vec![]),
        ];
        let fused = fuse(&results, &map);
        assert_eq!(fused.len(), 2);
    }

    #[test]
    fn output_is_sorted_by_descending_confidence() {
        let map = map_two_adapters();
        let results = vec![
            ModelResult::new(vec![det_at(0, 0.4, 0.2, 0.2), det_at(1, 0.95, 0.8, 0.8)]),
            ModelResult::new(vec![det_at(1, 0.7, 0.5, 0.5)]),
        ];
        let fused = fuse(&results, &map);
        let confidences: Vec<f32> = fused.iter().map(|d| d.confidence).collect();
        let mut sorted = confidences.clone();
        sorted.sort_by(|a, b| b.total_cmp(a));
        assert_eq!(confidences, sorted);
    }

    #[test]
    fn unmapped_classes_are_dropped() {
        let vocabularies = vec![
            vec!["person".to_string()],
            vec!["person".to_string(), "bicycle".to_string()],
        ];
        let allowed = vec![vec![0], vec![0, 1]];
        let map = ClassMap::build(&vocabularies, &allowed).unwrap();
        let results = vec![
            ModelResult::new(vec![det_at(0, 0.9, 0.3, 0.3)]),
            // bicycle has no canonical counterpart
            ModelResult::new(vec![det_at(1, 0.95, 0.7, 0.7)]),
        ];
        let fused = fuse(&results, &map);
        assert_eq!(fused.len(), 1);
        assert_eq!(fused[0].class_id, 0);
    }

    #[test]
    fn confidence_ties_keep_input_order() {
        let map = map_two_adapters();
        let results = vec![
            ModelResult::new(vec![det_at(0, 0.8, 0.2, 0.2)]),
            ModelResult::new(vec![det_at(1, 0.8, 0.7, 0.7)]),
        ];
        let fused = fuse(&results, &map);
        assert_eq!(fused.len(), 2);
        assert_eq!(fused[0].source_adapter, 0);
        assert_eq!(fused[1].source_adapter, 1);
    }
}
