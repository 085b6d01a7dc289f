use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::crop::DEFAULT_CROP_PADDING;
use crate::export::{ExportFormat, SinkConfig};
use crate::predicate::AcceptancePolicy;

const DEFAULT_TARGET_FPS: u32 = 3;
const DEFAULT_COOLDOWN_FRAMES: u32 = 50;
const DEFAULT_MAX_ACCEPTED: u32 = 25;
const DEFAULT_MIN_DETECTIONS: usize = 1;
const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.25;
const DEFAULT_IOU_THRESHOLD: f32 = 0.85;
const DEFAULT_DATASET_ROOT: &str = "dataset";
const DEFAULT_DATASET_FORMAT: &str = "yolov8";
const DEFAULT_DATASET_VERSION: u32 = 1;
const DEFAULT_MEDIA_DIR: &str = "media";
const DEFAULT_IDLE_WAIT_SECS: u64 = 3;

#[derive(Debug, Deserialize, Default)]
struct HarvestConfigFile {
    sampling: Option<SamplingConfigFile>,
    detection: Option<DetectionConfigFile>,
    models: Option<Vec<ModelConfigFile>>,
    dataset: Option<DatasetConfigFile>,
    queue: Option<QueueConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct SamplingConfigFile {
    target_fps: Option<u32>,
    cooldown_frames: Option<u32>,
    max_accepted: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct DetectionConfigFile {
    min_detections: Option<usize>,
    confidence_threshold: Option<f32>,
    iou_threshold: Option<f32>,
    crop_padding: Option<u32>,
    policy: Option<PolicyConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct PolicyConfigFile {
    kind: Option<String>,
    class_id: Option<u32>,
    target: Option<usize>,
    subject_class: Option<u32>,
    attribute_class: Option<u32>,
    min_width: Option<f32>,
    min_height: Option<f32>,
}

#[derive(Debug, Deserialize)]
struct ModelConfigFile {
    name: String,
    path: String,
    class_names: Vec<String>,
    allowed_classes: Option<Vec<u32>>,
    input_width: Option<u32>,
    input_height: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct DatasetConfigFile {
    root: Option<PathBuf>,
    format: Option<String>,
    version: Option<u32>,
    annotated: Option<bool>,
}

#[derive(Debug, Deserialize, Default)]
struct QueueConfigFile {
    spool_path: Option<PathBuf>,
    media_dir: Option<PathBuf>,
    delete_after_harvest: Option<bool>,
    upload_after_harvest: Option<bool>,
    idle_wait_secs: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct HarvestConfig {
    pub sampling: SamplingSettings,
    pub detection: DetectionSettings,
    pub models: Vec<ModelSettings>,
    pub dataset: DatasetSettings,
    pub queue: QueueSettings,
}

#[derive(Debug, Clone)]
pub struct SamplingSettings {
    pub target_fps: u32,
    pub cooldown_frames: u32,
    pub max_accepted: u32,
}

#[derive(Debug, Clone)]
pub struct DetectionSettings {
    pub min_detections: usize,
    pub confidence_threshold: f32,
    pub iou_threshold: f32,
    /// Pixels added on every side of the detection union before cropping.
    pub crop_padding: u32,
    pub policy: AcceptancePolicy,
}

#[derive(Debug, Clone)]
pub struct ModelSettings {
    pub name: String,
    pub path: String,
    pub class_names: Vec<String>,
    pub allowed_classes: Vec<u32>,
    pub input_width: u32,
    pub input_height: u32,
}

#[derive(Debug, Clone)]
pub struct DatasetSettings {
    pub root: PathBuf,
    pub format: ExportFormat,
    pub version: u32,
    pub annotated: bool,
}

#[derive(Debug, Clone)]
pub struct QueueSettings {
    pub spool_path: Option<PathBuf>,
    pub media_dir: PathBuf,
    pub delete_after_harvest: bool,
    pub upload_after_harvest: bool,
    pub idle_wait_secs: u64,
}

impl HarvestConfig {
    /// Load from the file named by `HARVEST_CONFIG` (if set), apply `HARVEST_*`
    /// environment overrides, and validate. Configuration is resolved once at
    /// startup; nothing re-reads it mid-run.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("HARVEST_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) => Some(read_config_file(Path::new(path))?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default())?;
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: HarvestConfigFile) -> Result<Self> {
        let sampling = SamplingSettings {
            target_fps: file
                .sampling
                .as_ref()
                .and_then(|s| s.target_fps)
                .unwrap_or(DEFAULT_TARGET_FPS),
            cooldown_frames: file
                .sampling
                .as_ref()
                .and_then(|s| s.cooldown_frames)
                .unwrap_or(DEFAULT_COOLDOWN_FRAMES),
            max_accepted: file
                .sampling
                .as_ref()
                .and_then(|s| s.max_accepted)
                .unwrap_or(DEFAULT_MAX_ACCEPTED),
        };
        let detection = DetectionSettings {
            min_detections: file
                .detection
                .as_ref()
                .and_then(|d| d.min_detections)
                .unwrap_or(DEFAULT_MIN_DETECTIONS),
            confidence_threshold: file
                .detection
                .as_ref()
                .and_then(|d| d.confidence_threshold)
                .unwrap_or(DEFAULT_CONFIDENCE_THRESHOLD),
            iou_threshold: file
                .detection
                .as_ref()
                .and_then(|d| d.iou_threshold)
                .unwrap_or(DEFAULT_IOU_THRESHOLD),
            crop_padding: file
                .detection
                .as_ref()
                .and_then(|d| d.crop_padding)
                .unwrap_or(DEFAULT_CROP_PADDING),
            policy: build_policy(file.detection.and_then(|d| d.policy).unwrap_or_default())?,
        };
        let models = file
            .models
            .unwrap_or_default()
            .into_iter()
            .map(|m| {
                let allowed = m
                    .allowed_classes
                    .unwrap_or_else(|| (0..m.class_names.len() as u32).collect());
                ModelSettings {
                    name: m.name,
                    path: m.path,
                    class_names: m.class_names,
                    allowed_classes: allowed,
                    input_width: m.input_width.unwrap_or(640),
                    input_height: m.input_height.unwrap_or(640),
                }
            })
            .collect();
        let dataset = DatasetSettings {
            root: file
                .dataset
                .as_ref()
                .and_then(|d| d.root.clone())
                .unwrap_or_else(|| PathBuf::from(DEFAULT_DATASET_ROOT)),
            format: ExportFormat::parse(
                file.dataset
                    .as_ref()
                    .and_then(|d| d.format.as_deref())
                    .unwrap_or(DEFAULT_DATASET_FORMAT),
            )?,
            version: file
                .dataset
                .as_ref()
                .and_then(|d| d.version)
                .unwrap_or(DEFAULT_DATASET_VERSION),
            annotated: file
                .dataset
                .and_then(|d| d.annotated)
                .unwrap_or(false),
        };
        let queue = QueueSettings {
            spool_path: file.queue.as_ref().and_then(|q| q.spool_path.clone()),
            media_dir: file
                .queue
                .as_ref()
                .and_then(|q| q.media_dir.clone())
                .unwrap_or_else(|| PathBuf::from(DEFAULT_MEDIA_DIR)),
            delete_after_harvest: file
                .queue
                .as_ref()
                .and_then(|q| q.delete_after_harvest)
                .unwrap_or(false),
            upload_after_harvest: file
                .queue
                .as_ref()
                .and_then(|q| q.upload_after_harvest)
                .unwrap_or(false),
            idle_wait_secs: file
                .queue
                .and_then(|q| q.idle_wait_secs)
                .unwrap_or(DEFAULT_IDLE_WAIT_SECS),
        };
        Ok(Self {
            sampling,
            detection,
            models,
            dataset,
            queue,
        })
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(fps) = std::env::var("HARVEST_TARGET_FPS") {
            self.sampling.target_fps = fps
                .parse()
                .map_err(|_| anyhow!("HARVEST_TARGET_FPS must be an integer"))?;
        }
        if let Ok(cooldown) = std::env::var("HARVEST_COOLDOWN_FRAMES") {
            self.sampling.cooldown_frames = cooldown
                .parse()
                .map_err(|_| anyhow!("HARVEST_COOLDOWN_FRAMES must be an integer"))?;
        }
        if let Ok(max) = std::env::var("HARVEST_MAX_ACCEPTED") {
            self.sampling.max_accepted = max
                .parse()
                .map_err(|_| anyhow!("HARVEST_MAX_ACCEPTED must be an integer"))?;
        }
        if let Ok(min) = std::env::var("HARVEST_MIN_DETECTIONS") {
            self.detection.min_detections = min
                .parse()
                .map_err(|_| anyhow!("HARVEST_MIN_DETECTIONS must be an integer"))?;
        }
        if let Ok(root) = std::env::var("HARVEST_DATASET_ROOT") {
            if !root.trim().is_empty() {
                self.dataset.root = PathBuf::from(root);
            }
        }
        if let Ok(format) = std::env::var("HARVEST_DATASET_FORMAT") {
            if !format.trim().is_empty() {
                self.dataset.format = ExportFormat::parse(&format)?;
            }
        }
        if let Ok(version) = std::env::var("HARVEST_DATASET_VERSION") {
            self.dataset.version = version
                .parse()
                .map_err(|_| anyhow!("HARVEST_DATASET_VERSION must be an integer"))?;
        }
        if let Ok(spool) = std::env::var("HARVEST_SPOOL_PATH") {
            if !spool.trim().is_empty() {
                self.queue.spool_path = Some(PathBuf::from(spool));
            }
        }
        if let Ok(media) = std::env::var("HARVEST_MEDIA_DIR") {
            if !media.trim().is_empty() {
                self.queue.media_dir = PathBuf::from(media);
            }
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.sampling.target_fps == 0 {
            return Err(anyhow!("sampling.target_fps must be greater than zero"));
        }
        if self.sampling.max_accepted == 0 {
            return Err(anyhow!("sampling.max_accepted must be greater than zero"));
        }
        if self.detection.min_detections == 0 {
            return Err(anyhow!("detection.min_detections must be at least one"));
        }
        if !(0.0..=1.0).contains(&self.detection.confidence_threshold) {
            return Err(anyhow!("detection.confidence_threshold must be in [0, 1]"));
        }
        if self.models.is_empty() {
            return Err(anyhow!("at least one model must be configured"));
        }
        for model in &self.models {
            if model.class_names.is_empty() {
                return Err(anyhow!("model '{}' has no class names", model.name));
            }
            for &id in &model.allowed_classes {
                if id as usize >= model.class_names.len() {
                    return Err(anyhow!(
                        "model '{}': allowed class {} outside its {} classes",
                        model.name,
                        id,
                        model.class_names.len()
                    ));
                }
            }
        }
        Ok(())
    }

    pub fn sink_config(&self) -> SinkConfig {
        SinkConfig {
            root: self.dataset.root.clone(),
            format: self.dataset.format,
            version: self.dataset.version,
        }
    }
}

fn build_policy(policy: PolicyConfigFile) -> Result<AcceptancePolicy> {
    match policy.kind.as_deref() {
        None | Some("min-fused") => Ok(AcceptancePolicy::MinFused {
            min_detections: policy.target.unwrap_or(DEFAULT_MIN_DETECTIONS),
        }),
        Some("count") => Ok(AcceptancePolicy::Count {
            class_id: policy
                .class_id
                .ok_or_else(|| anyhow!("count policy requires class_id"))?,
            target: policy
                .target
                .ok_or_else(|| anyhow!("count policy requires target"))?,
        }),
        Some("co-occurrence") => Ok(AcceptancePolicy::CoOccurrence {
            subject_class: policy
                .subject_class
                .ok_or_else(|| anyhow!("co-occurrence policy requires subject_class"))?,
            attribute_class: policy
                .attribute_class
                .ok_or_else(|| anyhow!("co-occurrence policy requires attribute_class"))?,
            min_width: policy.min_width.unwrap_or(0.0),
            min_height: policy.min_height.unwrap_or(0.0),
        }),
        Some(other) => Err(anyhow!(
            "unknown policy kind '{}' (expected 'count', 'co-occurrence' or 'min-fused')",
            other
        )),
    }
}

fn read_config_file(path: &Path) -> Result<HarvestConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let cfg = serde_json::from_str(&raw)
        .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?;
    Ok(cfg)
}
