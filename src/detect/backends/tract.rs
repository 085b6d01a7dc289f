#![cfg(feature = "backend-tract")]

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use tract_onnx::prelude::*;

use crate::detect::adapter::{AdapterSettings, DetectorAdapter};
use crate::detect::result::{Detection, ModelResult, PixelBox};
use crate::frame::Frame;

/// Tract-based adapter for ONNX object detection models.
///
/// Loads a local model file and runs it on RGB frames. The output layout is
/// the common one-stage export: `[1, 4 + classes, anchors]` with xywh box
/// coordinates in input pixels. No network I/O; the model path is the only
/// disk access.
pub struct TractAdapter {
    name: String,
    model: SimplePlan<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>,
    class_names: Vec<String>,
    settings: AdapterSettings,
    width: u32,
    height: u32,
}

impl TractAdapter {
    /// Load an ONNX model from disk and prepare it for inference.
    pub fn new<P: AsRef<Path>>(
        name: &str,
        model_path: P,
        class_names: Vec<String>,
        settings: AdapterSettings,
        width: u32,
        height: u32,
    ) -> Result<Self> {
        let model_path = model_path.as_ref();
        let model = tract_onnx::onnx()
            .model_for_path(model_path)
            .with_context(|| format!("failed to load ONNX model from {}", model_path.display()))?
            .with_input_fact(
                0,
                InferenceFact::dt_shape(
                    f32::datum_type(),
                    tvec!(1, 3, height as usize, width as usize),
                ),
            )
            .context("failed to set input fact")?
            .into_optimized()
            .context("failed to optimize ONNX model")?
            .into_runnable()
            .context("failed to build runnable ONNX model")?;

        Ok(Self {
            name: name.to_string(),
            model,
            class_names,
            settings,
            width,
            height,
        })
    }

    fn build_input(&self, frame: &Frame) -> Result<Tensor> {
        if frame.width() != self.width || frame.height() != self.height {
            return Err(anyhow!(
                "frame size {}x{} does not match model input {}x{}",
                frame.width(),
                frame.height(),
                self.width,
                self.height
            ));
        }

        let width = self.width as usize;
        let pixels = frame.pixels();
        let input = tract_ndarray::Array4::from_shape_fn(
            (1, 3, self.height as usize, width),
            |(_, channel, y, x)| {
                let idx = (y * width + x) * 3 + channel;
                pixels[idx] as f32 / 255.0
            },
        );

        Ok(input.into_tensor())
    }

    /// Decode `[1, 4 + classes, anchors]` into thresholded detections.
    fn decode(&self, outputs: TVec<TValue>, frame: &Frame) -> Result<Vec<Detection>> {
        let output = outputs
            .first()
            .ok_or_else(|| anyhow!("model produced no outputs"))?;
        let view = output
            .to_array_view::<f32>()
            .context("model output tensor was not f32")?;
        let shape = view.shape();
        if shape.len() != 3 || shape[1] < 5 {
            return Err(anyhow!("unexpected model output shape {:?}", shape));
        }
        let class_count = shape[1] - 4;
        let anchors = shape[2];

        let mut detections = Vec::new();
        for anchor in 0..anchors {
            let mut best_class = 0usize;
            let mut best_score = f32::NEG_INFINITY;
            for class in 0..class_count {
                let score = view[[0, 4 + class, anchor]];
                if score > best_score {
                    best_score = score;
                    best_class = class;
                }
            }
            if best_score < self.settings.confidence_threshold {
                continue;
            }
            let class_id = best_class as u32;
            if !self.settings.allowed_classes.contains(&class_id) {
                continue;
            }

            let cx = view[[0, 0, anchor]];
            let cy = view[[0, 1, anchor]];
            let w = view[[0, 2, anchor]];
            let h = view[[0, 3, anchor]];
            let box_px = PixelBox::new(cx - w / 2.0, cy - h / 2.0, cx + w / 2.0, cy + h / 2.0);
            detections.push(Detection::from_pixel_box(
                class_id,
                best_score,
                box_px,
                frame.width(),
                frame.height(),
            ));
        }

        Ok(self.non_max_suppress(detections))
    }

    /// Greedy per-class NMS at the adapter's IoU threshold.
    fn non_max_suppress(&self, mut detections: Vec<Detection>) -> Vec<Detection> {
        detections.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
        let mut kept: Vec<Detection> = Vec::with_capacity(detections.len());
        'candidates: for cand in detections {
            for existing in &kept {
                if existing.class_id == cand.class_id
                    && existing.box_px.iou(&cand.box_px) > self.settings.iou_threshold
                {
                    continue 'candidates;
                }
            }
            kept.push(cand);
        }
        kept
    }
}

impl DetectorAdapter for TractAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    fn class_names(&self) -> &[String] {
        &self.class_names
    }

    fn settings(&self) -> &AdapterSettings {
        &self.settings
    }

    fn infer(&mut self, frame: &Frame) -> Result<ModelResult> {
        let input = self.build_input(frame)?;
        let outputs = self
            .model
            .run(tvec!(input.into()))
            .context("ONNX inference failed")?;
        let detections = self.decode(outputs, frame)?;
        Ok(ModelResult::new(detections))
    }

    fn warm_up(&mut self) -> Result<()> {
        let blank = Frame::filled(self.width, self.height, 0);
        self.infer(&blank).map(|_| ())
    }
}
