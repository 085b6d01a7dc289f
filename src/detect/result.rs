use serde::{Deserialize, Serialize};

/// Axis-aligned box in pixel coordinates, `(x1, y1)` top-left inclusive.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PixelBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl PixelBox {
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    pub fn width(&self) -> f32 {
        (self.x2 - self.x1).max(0.0)
    }

    pub fn height(&self) -> f32 {
        (self.y2 - self.y1).max(0.0)
    }

    pub fn area(&self) -> f32 {
        self.width() * self.height()
    }

    /// Smallest box covering both operands.
    pub fn union(&self, other: &PixelBox) -> PixelBox {
        PixelBox {
            x1: self.x1.min(other.x1),
            y1: self.y1.min(other.y1),
            x2: self.x2.max(other.x2),
            y2: self.y2.max(other.y2),
        }
    }

    /// Intersection-over-union, 0.0 when the boxes are disjoint.
    pub fn iou(&self, other: &PixelBox) -> f32 {
        let ix1 = self.x1.max(other.x1);
        let iy1 = self.y1.max(other.y1);
        let ix2 = self.x2.min(other.x2);
        let iy2 = self.y2.min(other.y2);
        let inter = (ix2 - ix1).max(0.0) * (iy2 - iy1).max(0.0);
        let union = self.area() + other.area() - inter;
        if union <= 0.0 {
            0.0
        } else {
            inter / union
        }
    }
}

/// Box in normalized center/size form, every component in `[0, 1]`.
///
/// Carried as `f64`: the dedup tolerance boundary is exclusive, and center
/// deltas like `0.51 - 0.5` land on the wrong side of it in `f32`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct NormBox {
    pub cx: f64,
    pub cy: f64,
    pub w: f64,
    pub h: f64,
}

impl NormBox {
    pub fn new(cx: f64, cy: f64, w: f64, h: f64) -> Self {
        Self { cx, cy, w, h }
    }

    /// Normalize a pixel box against the dimensions of the frame it came from.
    pub fn from_pixel(box_px: &PixelBox, frame_width: u32, frame_height: u32) -> Self {
        let fw = frame_width.max(1) as f64;
        let fh = frame_height.max(1) as f64;
        Self {
            cx: (box_px.x1 as f64 + box_px.x2 as f64) / 2.0 / fw,
            cy: (box_px.y1 as f64 + box_px.y2 as f64) / 2.0 / fh,
            w: box_px.width() as f64 / fw,
            h: box_px.height() as f64 / fh,
        }
    }
}

/// One detection reported by a single adapter for a single frame.
///
/// Immutable once produced; the class id lives in the adapter's local
/// vocabulary until the fusion engine translates it.
#[derive(Clone, Debug, PartialEq)]
pub struct Detection {
    pub class_id: u32,
    pub confidence: f32,
    pub box_px: PixelBox,
    pub box_norm: NormBox,
}

impl Detection {
    pub fn new(class_id: u32, confidence: f32, box_px: PixelBox, box_norm: NormBox) -> Self {
        Self {
            class_id,
            confidence,
            box_px,
            box_norm,
        }
    }

    /// Build a detection from a pixel box, deriving the normalized form.
    pub fn from_pixel_box(
        class_id: u32,
        confidence: f32,
        box_px: PixelBox,
        frame_width: u32,
        frame_height: u32,
    ) -> Self {
        let box_norm = NormBox::from_pixel(&box_px, frame_width, frame_height);
        Self::new(class_id, confidence, box_px, box_norm)
    }
}

/// Ordered detections from one adapter for one frame. May be empty.
#[derive(Clone, Debug, Default)]
pub struct ModelResult {
    pub detections: Vec<Detection>,
}

impl ModelResult {
    pub fn new(detections: Vec<Detection>) -> Self {
        Self { detections }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.detections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.detections.is_empty()
    }

    /// Count of detections carrying the given local class id.
    pub fn count_class(&self, class_id: u32) -> usize {
        self.detections
            .iter()
            .filter(|d| d.class_id == class_id)
            .count()
    }

    /// True when at least one detection carries the given local class id.
    pub fn has_class(&self, class_id: u32) -> bool {
        self.detections.iter().any(|d| d.class_id == class_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pixel_box_union_covers_both() {
        let a = PixelBox::new(10.0, 10.0, 50.0, 60.0);
        let b = PixelBox::new(40.0, 5.0, 90.0, 55.0);
        let u = a.union(&b);
        assert_eq!(u, PixelBox::new(10.0, 5.0, 90.0, 60.0));
    }

    #[test]
    fn iou_of_disjoint_boxes_is_zero() {
        let a = PixelBox::new(0.0, 0.0, 10.0, 10.0);
        let b = PixelBox::new(20.0, 20.0, 30.0, 30.0);
        assert_eq!(a.iou(&b), 0.0);
    }

    #[test]
    fn iou_of_identical_boxes_is_one() {
        let a = PixelBox::new(5.0, 5.0, 25.0, 45.0);
        assert!((a.iou(&a) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn normalization_centers_a_full_frame_box() {
        let px = PixelBox::new(0.0, 0.0, 640.0, 480.0);
        let norm = NormBox::from_pixel(&px, 640, 480);
        assert!((norm.cx - 0.5).abs() < 1e-6);
        assert!((norm.cy - 0.5).abs() < 1e-6);
        assert!((norm.w - 1.0).abs() < 1e-6);
        assert!((norm.h - 1.0).abs() < 1e-6);
    }

    #[test]
    fn count_class_filters_by_local_id() {
        let det =
            |cls| Detection::from_pixel_box(cls, 0.9, PixelBox::new(0.0, 0.0, 10.0, 10.0), 100, 100);
        let result = ModelResult::new(vec![det(0), det(1), det(0)]);
        assert_eq!(result.count_class(0), 2);
        assert_eq!(result.count_class(1), 1);
        assert!(result.has_class(1));
        assert!(!result.has_class(7));
    }
}
