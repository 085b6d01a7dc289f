//! Cropping and label transformation.
//!
//! After fusion, the accepted frame is cropped to the padded union of all
//! fused boxes and every detection is re-expressed relative to the crop. The
//! label text uses one `<class> <cx> <cy> <w> <h>` line per detection with
//! coordinates normalized against the *cropped* dimensions.

use anyhow::{anyhow, Result};

use crate::detect::NormBox;
use crate::fusion::CombinedDetection;

/// Padding added on every side of the detection union, in pixels.
pub const DEFAULT_CROP_PADDING: u32 = 100;

/// Crop rectangle in pixel coordinates, half-open on the bottom/right edge.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CropRegion {
    pub x1: u32,
    pub y1: u32,
    pub x2: u32,
    pub y2: u32,
}

impl CropRegion {
    pub fn width(&self) -> u32 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> u32 {
        self.y2 - self.y1
    }
}

/// Compute the padded, clamped union of all fused boxes.
///
/// Returns `None` for an empty detection set; callers gate on the
/// minimum-detections threshold before reaching this point.
pub fn crop_region(
    detections: &[CombinedDetection],
    padding: u32,
    frame_width: u32,
    frame_height: u32,
) -> Option<CropRegion> {
    let mut boxes = detections.iter().map(|d| d.box_px);
    let first = boxes.next()?;
    let union = boxes.fold(first, |acc, b| acc.union(&b));

    let pad = padding as f32;
    let x1 = (union.x1 - pad).max(0.0) as u32;
    let y1 = (union.y1 - pad).max(0.0) as u32;
    let x2 = ((union.x2 + pad).ceil() as u32).min(frame_width);
    let y2 = ((union.y2 + pad).ceil() as u32).min(frame_height);
    if x1 >= x2 || y1 >= y2 {
        return None;
    }
    Some(CropRegion { x1, y1, x2, y2 })
}

/// Re-express every fused detection relative to the crop and render the
/// label file contents.
///
/// Boxes are shifted by the crop origin, clamped to the crop bounds so corner
/// detections stay in `[0, 1]`, and re-normalized against the cropped
/// dimensions.
pub fn relabel(detections: &[CombinedDetection], region: &CropRegion) -> String {
    let crop_w = region.width().max(1) as f64;
    let crop_h = region.height().max(1) as f64;
    let mut out = String::new();
    for det in detections {
        let x1 = (det.box_px.x1 as f64 - region.x1 as f64).clamp(0.0, crop_w);
        let y1 = (det.box_px.y1 as f64 - region.y1 as f64).clamp(0.0, crop_h);
        let x2 = (det.box_px.x2 as f64 - region.x1 as f64).clamp(0.0, crop_w);
        let y2 = (det.box_px.y2 as f64 - region.y1 as f64).clamp(0.0, crop_h);
        let cx = (x1 + x2) / 2.0 / crop_w;
        let cy = (y1 + y2) / 2.0 / crop_h;
        let w = (x2 - x1).max(0.0) / crop_w;
        let h = (y2 - y1).max(0.0) / crop_h;
        out.push_str(&format!("{} {} {} {} {}\n", det.class_id, cx, cy, w, h));
    }
    out
}

/// Parse label text back into `(class_id, normalized box)` pairs.
pub fn parse_labels(text: &str) -> Result<Vec<(u32, NormBox)>> {
    let mut labels = Vec::new();
    for (lineno, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let mut fields = line.split_whitespace();
        let class_id: u32 = fields
            .next()
            .ok_or_else(|| anyhow!("label line {} is empty", lineno + 1))?
            .parse()
            .map_err(|_| anyhow!("label line {}: bad class id", lineno + 1))?;
        let mut coord = |name: &str| -> Result<f64> {
            fields
                .next()
                .ok_or_else(|| anyhow!("label line {}: missing {}", lineno + 1, name))?
                .parse()
                .map_err(|_| anyhow!("label line {}: bad {}", lineno + 1, name))
        };
        let cx = coord("cx")?;
        let cy = coord("cy")?;
        let w = coord("w")?;
        let h = coord("h")?;
        labels.push((class_id, NormBox::new(cx, cy, w, h)));
    }
    Ok(labels)
}
