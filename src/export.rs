//! Dataset sink.
//!
//! Allocates the version-tagged export directory, writes accepted crops with
//! their label files, and tracks how many examples this run has produced.
//! Layouts:
//!
//! - structured (`yolov8`): `<root>/yolov8-v<version>/images/<id>.png` and
//!   `.../labels/<id>.txt`, plus a `data.yaml` manifest naming the canonical
//!   classes in id order. Annotated copies, when enabled, land in
//!   `<root>/yolov8-v<version>-labeled/`.
//! - flat: `<root>/flat-v<version>/<id>.png` next to `<id>.txt`.
//!
//! Identifiers are unix timestamps; a second export within the same second
//! would collide, which is reported as an error rather than overwriting.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{anyhow, Context, Result};
use image::RgbImage;

use crate::frame::Frame;

/// On-disk dataset layout.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExportFormat {
    /// images/ + labels/ subdirectories with a data.yaml manifest.
    Yolov8,
    /// image and label side by side in one directory.
    Flat,
}

impl ExportFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExportFormat::Yolov8 => "yolov8",
            ExportFormat::Flat => "flat",
        }
    }

    pub fn parse(name: &str) -> Result<Self> {
        match name {
            "yolov8" => Ok(ExportFormat::Yolov8),
            "flat" => Ok(ExportFormat::Flat),
            other => Err(anyhow!(
                "unknown dataset format '{}' (expected 'yolov8' or 'flat')",
                other
            )),
        }
    }
}

/// Sink configuration.
#[derive(Clone, Debug)]
pub struct SinkConfig {
    pub root: PathBuf,
    pub format: ExportFormat,
    pub version: u32,
}

/// Writes accepted examples under `<root>/<format>-v<version>/`.
pub struct DatasetSink {
    config: SinkConfig,
    result_dir: PathBuf,
    labeled_dir: PathBuf,
    accepted: u32,
    used_ids: HashSet<String>,
}

impl DatasetSink {
    pub fn new(config: SinkConfig) -> Self {
        let dir_name = format!("{}-v{}", config.format.as_str(), config.version);
        let result_dir = config.root.join(&dir_name);
        let labeled_dir = config.root.join(format!("{}-labeled", dir_name));
        Self {
            config,
            result_dir,
            labeled_dir,
            accepted: 0,
            used_ids: HashSet::new(),
        }
    }

    /// Create the directory layout. Idempotent; returns whether the layout
    /// now exists. A partially-initialized directory from an interrupted run
    /// is completed rather than treated as an error.
    pub fn initialize(&mut self) -> Result<bool> {
        fs::create_dir_all(&self.result_dir)
            .with_context(|| format!("create export dir {}", self.result_dir.display()))?;
        if self.config.format == ExportFormat::Yolov8 {
            fs::create_dir_all(self.image_dir())?;
            fs::create_dir_all(self.label_dir())?;
        }
        Ok(self.result_dir.exists())
    }

    /// Write one accepted example. Returns the updated accepted count.
    ///
    /// Never silently overwrites: a colliding identifier (two exports within
    /// the sink's one-second id resolution, or leftovers from a concurrent
    /// writer) is an error.
    pub fn export(
        &mut self,
        image: &Frame,
        label_text: &str,
        annotated: Option<&Frame>,
    ) -> Result<u32> {
        let id = self.next_id()?;
        let (image_path, label_path) = match self.config.format {
            ExportFormat::Yolov8 => (
                self.image_dir().join(format!("{id}.png")),
                self.label_dir().join(format!("{id}.txt")),
            ),
            ExportFormat::Flat => (
                self.result_dir.join(format!("{id}.png")),
                self.result_dir.join(format!("{id}.txt")),
            ),
        };
        if image_path.exists() || label_path.exists() {
            return Err(anyhow!(
                "export id {} already exists under {}",
                id,
                self.result_dir.display()
            ));
        }

        write_png(image, &image_path)?;
        fs::write(&label_path, label_text)
            .with_context(|| format!("write labels {}", label_path.display()))?;

        if let Some(annotated) = annotated {
            fs::create_dir_all(&self.labeled_dir)?;
            write_png(annotated, &self.labeled_dir.join(format!("{id}.png")))?;
        }

        self.accepted += 1;
        log::info!(
            "exported example {} ({} accepted this video)",
            id,
            self.accepted
        );
        Ok(self.accepted)
    }

    /// Write the `data.yaml` manifest for the structured layout. No-op for
    /// the flat layout.
    pub fn write_manifest(&self, class_names: &[String]) -> Result<()> {
        if self.config.format != ExportFormat::Yolov8 {
            return Ok(());
        }
        let mut content = String::from("names:\n");
        for name in class_names {
            content.push_str(&format!("- {name}\n"));
        }
        content.push_str(&format!("nc: {}\n", class_names.len()));
        content.push_str("path: ./\n");
        content.push_str("train: ./images\n");
        let path = self.result_dir.join("data.yaml");
        fs::write(&path, content).with_context(|| format!("write manifest {}", path.display()))?;
        Ok(())
    }

    pub fn result_dir(&self) -> &Path {
        &self.result_dir
    }

    pub fn accepted(&self) -> u32 {
        self.accepted
    }

    fn image_dir(&self) -> PathBuf {
        self.result_dir.join("images")
    }

    fn label_dir(&self) -> PathBuf {
        self.result_dir.join("labels")
    }

    fn next_id(&mut self) -> Result<String> {
        let unix = SystemTime::now().duration_since(UNIX_EPOCH)?.as_secs();
        let id = unix.to_string();
        if !self.used_ids.insert(id.clone()) {
            return Err(anyhow!("export id {} already used within this run", id));
        }
        Ok(id)
    }
}

fn write_png(frame: &Frame, path: &Path) -> Result<()> {
    let img = RgbImage::from_raw(frame.width(), frame.height(), frame.pixels().to_vec())
        .ok_or_else(|| anyhow!("frame buffer does not match its dimensions"))?;
    img.save(path)
        .with_context(|| format!("write image {}", path.display()))?;
    Ok(())
}
