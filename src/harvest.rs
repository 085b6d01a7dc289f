//! The harvest pipeline.
//!
//! `HarvestService` owns the adapters, the class map and the acceptance
//! policy, and drives one video at a time: sample, infer, evaluate, fuse,
//! crop, export. Queue and vault plumbing stays outside in the worker loop.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use anyhow::{anyhow, Result};

use crate::classmap::ClassMap;
use crate::config::HarvestConfig;
use crate::crop;
use crate::detect::{DetectorAdapter, ModelResult, PixelBox, StubAdapter};
use crate::export::DatasetSink;
use crate::fusion::{self, CombinedDetection};
use crate::ingest::FrameSource;
use crate::predicate::AcceptancePolicy;
use crate::sampler::{FrameDecision, FrameSampler, SamplerConfig};

const ANNOTATION_COLOR: [u8; 3] = [255, 0, 0];

/// Outcome of one processed video.
#[derive(Clone, Debug)]
pub struct HarvestSummary {
    pub frames_seen: u64,
    pub frames_inferred: u64,
    pub accepted: u32,
    pub elapsed: Duration,
}

/// Per-run pipeline state. One service handles many videos sequentially; the
/// sampler is rebuilt per video, everything else is reused.
pub struct HarvestService {
    adapters: Vec<Box<dyn DetectorAdapter>>,
    class_map: ClassMap,
    policy: AcceptancePolicy,
    target_fps: u32,
    cooldown_frames: u32,
    max_accepted: u32,
    min_detections: usize,
    crop_padding: u32,
    annotated: bool,
}

impl HarvestService {
    /// Assemble the service from configured adapters. Builds the class map
    /// once; an inconsistent vocabulary set fails here, before any video is
    /// opened.
    pub fn new(adapters: Vec<Box<dyn DetectorAdapter>>, config: &HarvestConfig) -> Result<Self> {
        if adapters.is_empty() {
            return Err(anyhow!("harvest service requires at least one adapter"));
        }
        let vocabularies: Vec<Vec<String>> = adapters
            .iter()
            .map(|a| a.class_names().to_vec())
            .collect();
        let allowed: Vec<Vec<u32>> = adapters
            .iter()
            .map(|a| a.settings().allowed_classes.clone())
            .collect();
        let class_map = ClassMap::build(&vocabularies, &allowed)?;

        Ok(Self {
            adapters,
            class_map,
            policy: config.detection.policy.clone(),
            target_fps: config.sampling.target_fps,
            cooldown_frames: config.sampling.cooldown_frames,
            max_accepted: config.sampling.max_accepted,
            min_detections: config.detection.min_detections,
            crop_padding: config.detection.crop_padding,
            annotated: config.dataset.annotated,
        })
    }

    /// Canonical class names, in manifest order.
    pub fn canonical_names(&self) -> Vec<String> {
        self.class_map.canonical_names()
    }

    /// Run every adapter's warm-up pass.
    pub fn warm_up(&mut self) -> Result<()> {
        for adapter in &mut self.adapters {
            adapter.warm_up()?;
        }
        Ok(())
    }

    /// Harvest one video into the sink. `stop` is checked once per frame, so
    /// shutdown lands between frames and never truncates an export.
    pub fn process_video(
        &mut self,
        source: &mut dyn FrameSource,
        sink: &mut DatasetSink,
        stop: &AtomicBool,
    ) -> Result<HarvestSummary> {
        let started = Instant::now();
        let skip_factor = skip_factor(source.fps(), self.target_fps);
        let mut sampler = FrameSampler::new(SamplerConfig {
            skip_factor,
            cooldown_frames: self.cooldown_frames,
            max_accepted: self.max_accepted,
        });

        let mut frames_seen = 0u64;
        let mut frames_inferred = 0u64;

        while !sampler.is_done() {
            if stop.load(Ordering::SeqCst) {
                log::info!("shutdown requested, stopping at frame {}", frames_seen);
                break;
            }
            let Some(frame) = source.next_frame()? else {
                sampler.finish();
                break;
            };
            frames_seen += 1;
            if sampler.observe() == FrameDecision::Discard {
                continue;
            }
            frames_inferred += 1;

            let results = self.run_adapters(&frame);
            if !self
                .policy
                .accept(&results, self.adapters.len(), &self.class_map)
            {
                continue;
            }

            let fused = fusion::fuse(&results, &self.class_map);
            if fused.len() < self.min_detections {
                continue;
            }

            let Some(region) = crop::crop_region(
                &fused,
                self.crop_padding,
                frame.width(),
                frame.height(),
            ) else {
                continue;
            };
            let cropped = frame.crop(&region)?;
            let labels = crop::relabel(&fused, &region);
            let annotated = if self.annotated {
                Some(annotate(&cropped, &fused, &region))
            } else {
                None
            };

            sink.export(&cropped, &labels, annotated.as_ref())?;
            sampler.record_acceptance();
        }

        let summary = HarvestSummary {
            frames_seen,
            frames_inferred,
            accepted: sampler.accepted_count(),
            elapsed: started.elapsed(),
        };
        log::info!(
            "video done: {} frames, {} inferred, {} accepted in {:.1}s",
            summary.frames_seen,
            summary.frames_inferred,
            summary.accepted,
            summary.elapsed.as_secs_f64()
        );
        Ok(summary)
    }

    /// Run every adapter on the frame. An adapter failure is logged and its
    /// result omitted; the acceptance policy then rejects the frame.
    fn run_adapters(&mut self, frame: &crate::frame::Frame) -> Vec<ModelResult> {
        let mut results = Vec::with_capacity(self.adapters.len());
        for adapter in &mut self.adapters {
            match adapter.infer(frame) {
                Ok(result) => results.push(result),
                Err(e) => log::warn!("adapter '{}' failed: {:#}", adapter.name(), e),
            }
        }
        results
    }
}

/// Frames to advance between inferences. Truncating division; a source
/// slower than the target rate samples every frame.
fn skip_factor(source_fps: f64, target_fps: u32) -> u64 {
    if source_fps <= 0.0 || target_fps == 0 {
        return 1;
    }
    let factor = (source_fps / target_fps as f64) as u64;
    factor.max(1)
}

/// Build adapters from the model list. `stub://` paths get a script-less
/// stub adapter; real paths need an inference backend.
pub fn build_adapters(config: &HarvestConfig) -> Result<Vec<Box<dyn DetectorAdapter>>> {
    let mut adapters: Vec<Box<dyn DetectorAdapter>> = Vec::with_capacity(config.models.len());
    for model in &config.models {
        let settings = crate::detect::AdapterSettings {
            allowed_classes: model.allowed_classes.clone(),
            confidence_threshold: config.detection.confidence_threshold,
            iou_threshold: config.detection.iou_threshold,
        };
        if model.path.starts_with("stub://") {
            adapters.push(Box::new(StubAdapter::new(
                &model.name,
                model.class_names.clone(),
                settings,
            )));
            continue;
        }
        #[cfg(feature = "backend-tract")]
        {
            adapters.push(Box::new(crate::detect::TractAdapter::new(
                &model.name,
                &model.path,
                model.class_names.clone(),
                settings,
                model.input_width,
                model.input_height,
            )?));
        }
        #[cfg(not(feature = "backend-tract"))]
        {
            return Err(anyhow!(
                "model '{}' needs the backend-tract feature",
                model.name
            ));
        }
    }
    Ok(adapters)
}

fn annotate(
    cropped: &crate::frame::Frame,
    fused: &[CombinedDetection],
    region: &crate::crop::CropRegion,
) -> crate::frame::Frame {
    let mut annotated = cropped.clone();
    for det in fused {
        let shifted = PixelBox::new(
            det.box_px.x1 - region.x1 as f32,
            det.box_px.y1 - region.y1 as f32,
            det.box_px.x2 - region.x1 as f32,
            det.box_px.y2 - region.y1 as f32,
        );
        annotated.draw_box(&shifted, ANNOTATION_COLOR);
    }
    annotated
}
