//! Video ingestion.
//!
//! A harvest run decodes one video sequentially through a [`FrameSource`].
//! Sources:
//! - Local video files (feature: ingest-file-ffmpeg)
//! - Stub source (`stub://`, testing)
//!
//! Sources only decode; sampling, inference and export all happen downstream.
//! End of stream is a normal `Ok(None)`, not an error.

pub mod file;
#[cfg(feature = "ingest-file-ffmpeg")]
pub(crate) mod file_ffmpeg;

pub use file::{FileSource, SUPPORTED_EXTENSIONS};

use anyhow::Result;

use crate::frame::Frame;

/// Sequential decoded-frame source for one video.
pub trait FrameSource {
    /// Decode the next frame, or `Ok(None)` once the stream is exhausted.
    fn next_frame(&mut self) -> Result<Option<Frame>>;

    /// Native frame rate of the source.
    fn fps(&self) -> f64;

    /// Total frame count when the container reports one.
    fn frame_count(&self) -> Option<u64>;
}
