use anyhow::Result;

use crate::detect::backend::Detector;
use crate::detect::nms::non_max_suppression;
use crate::detect::result::{BoundingBox, Detection, DetectionResult};
use crate::detect::thresholds::Thresholds;
use crate::frame::Frame;

/// Cells per axis.
const GRID: u32 = 4;

/// Deterministic stand-in detector for demos and tests.
///
/// Windows of one grid cell are slid across the frame at half-cell steps, so
/// neighbouring candidates overlap. A window's confidence is its mean luma in
/// `[0, 1]`. Candidates below the confidence threshold are dropped, the rest go
/// through overlap suppression. Everything is reported as class 0, `"blob"`.
pub struct StubBackend {
    label: String,
}

impl StubBackend {
    pub fn new() -> Self {
        Self {
            label: "blob".to_string(),
        }
    }

    fn candidates(&self, frame: &Frame) -> Vec<Detection> {
        let (width, height) = (frame.width(), frame.height());
        let cell_w = (width / GRID).max(1);
        let cell_h = (height / GRID).max(1);
        let step_x = (cell_w / 2).max(1);
        let step_y = (cell_h / 2).max(1);

        let mut out = Vec::new();
        let mut y = 0;
        while y + cell_h <= height {
            let mut x = 0;
            while x + cell_w <= width {
                let confidence = mean_luma(frame, x, y, cell_w, cell_h);
                out.push(Detection::new(
                    BoundingBox::new(
                        x as f32,
                        y as f32,
                        (x + cell_w) as f32,
                        (y + cell_h) as f32,
                    ),
                    0,
                    self.label.clone(),
                    confidence,
                ));
                x += step_x;
            }
            y += step_y;
        }
        out
    }
}

impl Default for StubBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl Detector for StubBackend {
    fn name(&self) -> &str {
        "stub"
    }

    fn infer(&mut self, frame: &Frame, thresholds: &Thresholds) -> Result<DetectionResult> {
        let candidates: Vec<Detection> = self
            .candidates(frame)
            .into_iter()
            .filter(|d| d.confidence >= thresholds.confidence())
            .collect();
        let detections = non_max_suppression(candidates, thresholds.overlap());
        Ok(DetectionResult::new(frame.width(), frame.height(), detections))
    }
}

fn mean_luma(frame: &Frame, x0: u32, y0: u32, w: u32, h: u32) -> f32 {
    let mut sum = 0.0f64;
    let mut count = 0u64;
    for y in y0..y0 + h {
        for x in x0..x0 + w {
            if let Some([r, g, b]) = frame.rgb_at(x, y) {
                sum += 0.299 * r as f64 + 0.587 * g as f64 + 0.114 * b as f64;
                count += 1;
            }
        }
    }
    if count == 0 {
        0.0
    } else {
        (sum / count as f64 / 255.0) as f32
    }
}
