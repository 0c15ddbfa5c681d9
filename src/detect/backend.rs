use anyhow::Result;

use super::result::DetectionResult;
use super::thresholds::Thresholds;
use crate::frame::Frame;

/// Object detector driven by the inference loop.
///
/// # Contract
///
/// - `infer` receives the run's thresholds on every call, unchanged for the whole
///   run. Implementations must apply both: drop candidates below
///   `thresholds.confidence()` and suppress same-class overlaps above
///   `thresholds.overlap()`.
/// - The frame is borrowed for the call only. Implementations must not keep
///   pixels around between calls; caches of derived buffers are allowed and are
///   dropped by `release_resources`.
/// - An error from `infer` ends the run.
pub trait Detector: Send {
    /// Identifier used in logs.
    fn name(&self) -> &str;

    /// Detect objects in one frame.
    fn infer(&mut self, frame: &Frame, thresholds: &Thresholds) -> Result<DetectionResult>;

    /// Free accelerator memory and caches. Called once when a run ends, whether
    /// or not any frame was processed.
    fn release_resources(&mut self) {}
}

impl<D: Detector + ?Sized> Detector for Box<D> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn infer(&mut self, frame: &Frame, thresholds: &Thresholds) -> Result<DetectionResult> {
        (**self).infer(frame, thresholds)
    }

    fn release_resources(&mut self) {
        (**self).release_resources()
    }
}
