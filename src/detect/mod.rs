//! Detectors and their results.
//!
//! - `Detector`: the trait the inference loop drives.
//! - `DetectionResult`: boxes (with pose keypoints or instance masks) for one
//!   frame, plus `annotate` to draw them.
//! - `Thresholds`: validated confidence/overlap pair, fixed for a run.
//! - `ModelCatalog`: maps model identifiers to detectors.

pub mod annotate;
pub mod backend;
pub mod backends;
pub mod catalog;
pub mod labels;
pub mod nms;
pub mod result;
pub mod thresholds;
pub mod yolo;

pub use backend::Detector;
pub use backends::StubBackend;
#[cfg(feature = "backend-tract")]
pub use backends::TractBackend;
pub use catalog::{ModelCatalog, ModelInfo, ModelTask, STUB_MODEL, YOLO_MODELS};
pub use nms::non_max_suppression;
pub use result::{BoundingBox, Detection, DetectionResult, Keypoint, Mask};
pub use thresholds::{ThresholdError, Thresholds};
pub use yolo::{TensorView, YoloHead};
