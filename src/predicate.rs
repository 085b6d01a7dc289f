//! Frame acceptance policies.
//!
//! A policy decides, from the raw per-adapter results of one frame, whether
//! the frame is a candidate worth exporting. Policies run before fusion. Only
//! a small fixed set of policies exists, so they are a closed enum selected at
//! configuration time rather than open-ended plugins.

use crate::classmap::ClassMap;
use crate::detect::ModelResult;
use crate::fusion;

/// Acceptance predicate over the raw per-adapter detection sets.
#[derive(Clone, Debug, PartialEq)]
pub enum AcceptancePolicy {
    /// Accept when the primary adapter reports *exactly* `target` detections
    /// of `class_id` (canonical). Exact equality is deliberate: the curated
    /// dataset wants frames where the whole group is detected, not a floor.
    Count { class_id: u32, target: usize },
    /// Accept when a subject class is seen by every adapter, the primary
    /// adapter also sees the attribute class, and every subject box in every
    /// adapter exceeds the minimum pixel size.
    CoOccurrence {
        subject_class: u32,
        attribute_class: u32,
        min_width: f32,
        min_height: f32,
    },
    /// Accept when the fused, deduplicated set has at least `min_detections`
    /// boxes. Used when two detectors share the same semantic classes and
    /// there is no dedicated attribute class.
    MinFused { min_detections: usize },
}

impl AcceptancePolicy {
    /// Evaluate the policy for one frame.
    ///
    /// `adapter_count` is the configured number of adapters. A frame is only a
    /// candidate when every configured adapter produced at least one
    /// detection; a missing or empty result rejects the frame outright.
    pub fn accept(
        &self,
        results: &[ModelResult],
        adapter_count: usize,
        class_map: &ClassMap,
    ) -> bool {
        if results.len() < adapter_count {
            return false;
        }
        if results.iter().any(|r| r.is_empty()) {
            return false;
        }
        match self {
            AcceptancePolicy::Count { class_id, target } => {
                results[0].count_class(*class_id) == *target
            }
            AcceptancePolicy::CoOccurrence {
                subject_class,
                attribute_class,
                min_width,
                min_height,
            } => self.co_occurrence(
                results,
                class_map,
                *subject_class,
                *attribute_class,
                *min_width,
                *min_height,
            ),
            AcceptancePolicy::MinFused { min_detections } => {
                fusion::fuse(results, class_map).len() >= *min_detections
            }
        }
    }

    fn co_occurrence(
        &self,
        results: &[ModelResult],
        class_map: &ClassMap,
        subject_class: u32,
        attribute_class: u32,
        min_width: f32,
        min_height: f32,
    ) -> bool {
        if !results[0].has_class(attribute_class) {
            return false;
        }
        for (adapter, result) in results.iter().enumerate() {
            let Some(local_subject) = class_map.local_id(adapter, subject_class) else {
                return false;
            };
            if !result.has_class(local_subject) {
                return false;
            }
            let subjects_large_enough = result
                .detections
                .iter()
                .filter(|d| d.class_id == local_subject)
                .all(|d| d.box_px.width() > min_width && d.box_px.height() > min_height);
            if !subjects_large_enough {
                return false;
            }
        }
        true
    }
}
