use std::collections::BTreeMap;

/// Axis-aligned box in frame pixel coordinates (`x1 <= x2`, `y1 <= y2`).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoundingBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl BoundingBox {
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self {
            x1: x1.min(x2),
            y1: y1.min(y2),
            x2: x1.max(x2),
            y2: y1.max(y2),
        }
    }

    /// Box from centre, width and height (YOLO output layout).
    pub fn from_cxcywh(cx: f32, cy: f32, w: f32, h: f32) -> Self {
        Self::new(cx - w / 2.0, cy - h / 2.0, cx + w / 2.0, cy + h / 2.0)
    }

    pub fn width(&self) -> f32 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> f32 {
        self.y2 - self.y1
    }

    pub fn area(&self) -> f32 {
        self.width() * self.height()
    }

    pub fn intersection_area(&self, other: &BoundingBox) -> f32 {
        let w = (self.x2.min(other.x2) - self.x1.max(other.x1)).max(0.0);
        let h = (self.y2.min(other.y2) - self.y1.max(other.y1)).max(0.0);
        w * h
    }

    /// Intersection over union; 0 when both boxes are degenerate.
    pub fn iou(&self, other: &BoundingBox) -> f32 {
        let inter = self.intersection_area(other);
        let union = self.area() + other.area() - inter;
        if union <= 0.0 {
            0.0
        } else {
            inter / union
        }
    }
}

/// Body keypoint from a pose model, in frame pixel coordinates.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Keypoint {
    pub x: f32,
    pub y: f32,
    pub confidence: f32,
}

/// Binary instance mask covering a frame-pixel rectangle (usually the box).
#[derive(Clone, Debug, PartialEq)]
pub struct Mask {
    left: u32,
    top: u32,
    width: u32,
    height: u32,
    bits: Vec<bool>,
}

impl Mask {
    /// `bits` is row-major, `width * height` long.
    pub fn new(left: u32, top: u32, width: u32, height: u32, bits: Vec<bool>) -> Option<Self> {
        if bits.len() != width as usize * height as usize {
            return None;
        }
        Some(Self {
            left,
            top,
            width,
            height,
            bits,
        })
    }

    /// Whether frame pixel `(x, y)` belongs to the instance.
    pub fn contains(&self, x: u32, y: u32) -> bool {
        if x < self.left || y < self.top {
            return false;
        }
        let (dx, dy) = (x - self.left, y - self.top);
        if dx >= self.width || dy >= self.height {
            return false;
        }
        self.bits[(dy * self.width + dx) as usize]
    }

    pub fn area(&self) -> usize {
        self.bits.iter().filter(|b| **b).count()
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Detection {
    pub bbox: BoundingBox,
    pub class_id: usize,
    pub label: String,
    pub confidence: f32,
    /// Pose models only; empty otherwise.
    pub keypoints: Vec<Keypoint>,
    /// Segmentation models only.
    pub mask: Option<Mask>,
}

impl Detection {
    pub fn new(bbox: BoundingBox, class_id: usize, label: impl Into<String>, confidence: f32) -> Self {
        Self {
            bbox,
            class_id,
            label: label.into(),
            confidence,
            keypoints: Vec::new(),
            mask: None,
        }
    }
}

/// Detections for one frame.
///
/// Holds the size of the frame it was computed on; `annotate` draws the boxes onto
/// that frame.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DetectionResult {
    detections: Vec<Detection>,
    width: u32,
    height: u32,
}

impl DetectionResult {
    pub fn new(width: u32, height: u32, detections: Vec<Detection>) -> Self {
        Self {
            detections,
            width,
            height,
        }
    }

    pub fn empty(width: u32, height: u32) -> Self {
        Self::new(width, height, Vec::new())
    }

    pub fn detections(&self) -> &[Detection] {
        &self.detections
    }

    pub fn len(&self) -> usize {
        self.detections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.detections.is_empty()
    }

    pub fn frame_size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Per-label counts, e.g. `"1 car, 2 person"`. Empty when nothing was found.
    pub fn summary(&self) -> String {
        let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
        for det in &self.detections {
            *counts.entry(det.label.as_str()).or_insert(0) += 1;
        }
        counts
            .iter()
            .map(|(label, count)| format!("{} {}", count, label))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn det(label: &str, confidence: f32) -> Detection {
        Detection::new(BoundingBox::new(0.0, 0.0, 10.0, 10.0), 0, label, confidence)
    }

    #[test]
    fn iou_of_identical_boxes_is_one() {
        let a = BoundingBox::new(0.0, 0.0, 10.0, 10.0);
        assert!((a.iou(&a) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn iou_of_disjoint_boxes_is_zero() {
        let a = BoundingBox::new(0.0, 0.0, 10.0, 10.0);
        let b = BoundingBox::new(20.0, 20.0, 30.0, 30.0);
        assert_eq!(a.iou(&b), 0.0);
    }

    #[test]
    fn iou_of_half_overlap() {
        let a = BoundingBox::new(0.0, 0.0, 10.0, 10.0);
        let b = BoundingBox::new(5.0, 0.0, 15.0, 10.0);
        // 50 / 150
        assert!((a.iou(&b) - 1.0 / 3.0).abs() < 1e-6);
    }

    #[test]
    fn degenerate_boxes_do_not_divide_by_zero() {
        let a = BoundingBox::new(1.0, 1.0, 1.0, 1.0);
        assert_eq!(a.iou(&a), 0.0);
    }

    #[test]
    fn constructor_orders_corners() {
        let b = BoundingBox::new(10.0, 8.0, 2.0, 4.0);
        assert_eq!((b.x1, b.y1, b.x2, b.y2), (2.0, 4.0, 10.0, 8.0));
        let c = BoundingBox::from_cxcywh(5.0, 5.0, 4.0, 2.0);
        assert_eq!((c.x1, c.y1, c.x2, c.y2), (3.0, 4.0, 7.0, 6.0));
    }

    #[test]
    fn summary_counts_labels() {
        let result = DetectionResult::new(
            10,
            10,
            vec![det("person", 0.9), det("car", 0.8), det("person", 0.7)],
        );
        assert_eq!(result.summary(), "1 car, 2 person");
        assert_eq!(DetectionResult::empty(1, 1).summary(), "");
    }

    #[test]
    fn mask_lookup_is_offset_by_its_origin() {
        let mask = Mask::new(10, 20, 2, 2, vec![true, false, false, true]).unwrap();
        assert!(mask.contains(10, 20));
        assert!(!mask.contains(11, 20));
        assert!(mask.contains(11, 21));
        assert!(!mask.contains(9, 20));
        assert!(!mask.contains(12, 21));
        assert_eq!(mask.area(), 2);
        assert!(Mask::new(0, 0, 3, 3, vec![true; 4]).is_none());
    }
}
