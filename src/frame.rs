//! Decoded raster frames.
//!
//! A `Frame` is a packed RGB24 image handed from the ingest layer to the
//! adapters and, on acceptance, to the cropper. Frames are created and
//! discarded per video position; nothing in the pipeline holds one across
//! loop iterations.

use anyhow::{anyhow, Result};

use crate::crop::CropRegion;
use crate::detect::PixelBox;

/// Packed RGB24 frame.
#[derive(Clone, Debug)]
pub struct Frame {
    data: Vec<u8>,
    width: u32,
    height: u32,
}

impl Frame {
    /// Wrap a packed RGB24 buffer. The buffer length must be `width * height * 3`.
    pub fn new(data: Vec<u8>, width: u32, height: u32) -> Result<Self> {
        let expected = (width as usize)
            .checked_mul(height as usize)
            .and_then(|v| v.checked_mul(3))
            .ok_or_else(|| anyhow!("frame dimensions overflow"))?;
        if data.len() != expected {
            return Err(anyhow!(
                "expected {} RGB bytes for {}x{}, received {}",
                expected,
                width,
                height,
                data.len()
            ));
        }
        Ok(Self {
            data,
            width,
            height,
        })
    }

    /// Uniform gray frame, handy for tests and the synthetic source.
    pub fn filled(width: u32, height: u32, value: u8) -> Self {
        Self {
            data: vec![value; (width * height * 3) as usize],
            width,
            height,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixels(&self) -> &[u8] {
        &self.data
    }

    pub fn into_pixels(self) -> Vec<u8> {
        self.data
    }

    /// Copy out the given region as a new frame. The region must already be
    /// clamped to frame bounds.
    pub fn crop(&self, region: &CropRegion) -> Result<Frame> {
        if region.x2 > self.width || region.y2 > self.height || region.x1 >= region.x2 || region.y1 >= region.y2 {
            return Err(anyhow!(
                "crop region {:?} out of bounds for {}x{} frame",
                region,
                self.width,
                self.height
            ));
        }
        let crop_w = (region.x2 - region.x1) as usize;
        let crop_h = (region.y2 - region.y1) as usize;
        let src_stride = self.width as usize * 3;
        let mut data = Vec::with_capacity(crop_w * crop_h * 3);
        for row in region.y1..region.y2 {
            let start = row as usize * src_stride + region.x1 as usize * 3;
            data.extend_from_slice(&self.data[start..start + crop_w * 3]);
        }
        Frame::new(data, crop_w as u32, crop_h as u32)
    }

    /// Draw a 2px rectangle outline for annotated exports.
    pub fn draw_box(&mut self, box_px: &PixelBox, rgb: [u8; 3]) {
        let x1 = box_px.x1.max(0.0) as u32;
        let y1 = box_px.y1.max(0.0) as u32;
        let x2 = (box_px.x2 as u32).min(self.width.saturating_sub(1));
        let y2 = (box_px.y2 as u32).min(self.height.saturating_sub(1));
        if x1 >= x2 || y1 >= y2 {
            return;
        }
        for t in 0..2u32 {
            for x in x1..=x2 {
                self.put_pixel(x, (y1 + t).min(y2), rgb);
                self.put_pixel(x, y2.saturating_sub(t).max(y1), rgb);
            }
            for y in y1..=y2 {
                self.put_pixel((x1 + t).min(x2), y, rgb);
                self.put_pixel(x2.saturating_sub(t).max(x1), y, rgb);
            }
        }
    }

    fn put_pixel(&mut self, x: u32, y: u32, rgb: [u8; 3]) {
        if x >= self.width || y >= self.height {
            return;
        }
        let idx = (y as usize * self.width as usize + x as usize) * 3;
        self.data[idx..idx + 3].copy_from_slice(&rgb);
    }
}
