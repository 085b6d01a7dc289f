use anyhow::Result;

use crate::detect::result::ModelResult;
use crate::frame::Frame;

/// Per-adapter inference settings.
///
/// `allowed_classes` restricts what the adapter may report; detections outside
/// the subset never reach the pipeline. Thresholds are shared across adapters
/// unless a model entry overrides them.
#[derive(Clone, Debug)]
pub struct AdapterSettings {
    /// Local class ids the adapter is allowed to report, in priority order.
    pub allowed_classes: Vec<u32>,
    /// Minimum confidence for a detection to be reported.
    pub confidence_threshold: f32,
    /// IoU threshold for the adapter's internal suppression.
    pub iou_threshold: f32,
}

impl Default for AdapterSettings {
    fn default() -> Self {
        Self {
            allowed_classes: Vec::new(),
            confidence_threshold: 0.25,
            iou_threshold: 0.85,
        }
    }
}

/// Detector adapter trait.
///
/// Wraps one underlying model behind a uniform interface: given a decoded
/// frame, return the detections the model produced. Implementations apply
/// their own confidence/IoU thresholds and allowed-class filter before
/// returning.
///
/// A failed `infer` call (corrupt frame, device error) must return `Err`
/// rather than an empty result; the harvesting loop treats the error as "no
/// result this frame" and keeps going. Returning `Ok` with an empty
/// `ModelResult` means the model ran and found nothing.
pub trait DetectorAdapter: Send {
    /// Adapter identifier for logs.
    fn name(&self) -> &str;

    /// Full class vocabulary, indexed by local class id.
    fn class_names(&self) -> &[String];

    /// The settings this adapter was configured with.
    fn settings(&self) -> &AdapterSettings;

    /// Run inference on one frame.
    fn infer(&mut self, frame: &Frame) -> Result<ModelResult>;

    /// Optional warm-up hook, called once before the first frame.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }
}
