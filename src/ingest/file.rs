//! Local file frame source.
//!
//! Opens one local video file and yields its frames in decode order. Paths
//! with an unrecognized extension are rejected up front so a queue item
//! pointing at a non-video blob fails before any decoding work. The
//! `stub://` scheme selects an in-memory synthetic source for tests.

use anyhow::{anyhow, Result};

#[cfg(feature = "ingest-file-ffmpeg")]
use super::file_ffmpeg::FfmpegFileSource;
use super::FrameSource;
use crate::frame::Frame;

/// Container extensions the harvester will open.
pub const SUPPORTED_EXTENSIONS: &[&str] = &["mp4", "avi", "mov"];

/// Local file frame source.
pub struct FileSource {
    backend: FileBackend,
}

enum FileBackend {
    Synthetic(SyntheticFileSource),
    #[cfg(feature = "ingest-file-ffmpeg")]
    Ffmpeg(FfmpegFileSource),
}

impl FileSource {
    pub fn open(path: &str) -> Result<Self> {
        if path.starts_with("stub://") {
            return Ok(Self {
                backend: FileBackend::Synthetic(SyntheticFileSource::parse(path)?),
            });
        }
        if path.contains("://") {
            return Err(anyhow!(
                "file ingestion only supports local paths (no URL schemes)"
            ));
        }
        if !has_supported_extension(path) {
            return Err(anyhow!(
                "'{}' is not a supported video file (expected one of {:?})",
                path,
                SUPPORTED_EXTENSIONS
            ));
        }
        #[cfg(feature = "ingest-file-ffmpeg")]
        {
            Ok(Self {
                backend: FileBackend::Ffmpeg(FfmpegFileSource::open(path)?),
            })
        }
        #[cfg(not(feature = "ingest-file-ffmpeg"))]
        {
            Err(anyhow!(
                "file ingestion requires the ingest-file-ffmpeg feature"
            ))
        }
    }
}

impl FrameSource for FileSource {
    fn next_frame(&mut self) -> Result<Option<Frame>> {
        match &mut self.backend {
            FileBackend::Synthetic(source) => source.next_frame(),
            #[cfg(feature = "ingest-file-ffmpeg")]
            FileBackend::Ffmpeg(source) => source.next_frame(),
        }
    }

    fn fps(&self) -> f64 {
        match &self.backend {
            FileBackend::Synthetic(source) => source.fps,
            #[cfg(feature = "ingest-file-ffmpeg")]
            FileBackend::Ffmpeg(source) => source.fps(),
        }
    }

    fn frame_count(&self) -> Option<u64> {
        match &self.backend {
            FileBackend::Synthetic(source) => Some(source.total_frames),
            #[cfg(feature = "ingest-file-ffmpeg")]
            FileBackend::Ffmpeg(source) => source.frame_count(),
        }
    }
}

/// Extension gate, case-insensitive.
pub fn has_supported_extension(path: &str) -> bool {
    std::path::Path::new(path)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            let ext = ext.to_lowercase();
            SUPPORTED_EXTENSIONS.contains(&ext.as_str())
        })
        .unwrap_or(false)
}

// ----------------------------------------------------------------------------
// Synthetic source (stub://) for tests
// ----------------------------------------------------------------------------

/// `stub://<frames>x<fps>` or bare `stub://<name>` for the defaults.
struct SyntheticFileSource {
    fps: f64,
    total_frames: u64,
    emitted: u64,
}

impl SyntheticFileSource {
    fn parse(path: &str) -> Result<Self> {
        let spec = path.trim_start_matches("stub://");
        let (total_frames, fps) = match spec.split_once('x') {
            Some((frames, fps)) => {
                let frames = frames
                    .parse()
                    .map_err(|_| anyhow!("invalid stub frame count in '{}'", path))?;
                let fps = fps
                    .parse()
                    .map_err(|_| anyhow!("invalid stub fps in '{}'", path))?;
                (frames, fps)
            }
            None => (300, 30.0),
        };
        log::info!("FileSource: synthetic source {} ({} frames)", path, total_frames);
        Ok(Self {
            fps,
            total_frames,
            emitted: 0,
        })
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        if self.emitted >= self.total_frames {
            return Ok(None);
        }
        // Shade the frame by index so consecutive frames differ.
        let frame = Frame::filled(640, 480, (self.emitted % 256) as u8);
        self.emitted += 1;
        Ok(Some(frame))
    }
}
