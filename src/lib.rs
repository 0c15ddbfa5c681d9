//! Live Detect
//!
//! Live object detection over a camera or a video file: each frame is read,
//! passed through a detector, annotated, and published next to the raw frame.
//!
//! # Architecture
//!
//! One loop composes three collaborators under a stop signal:
//!
//! 1. **Frame source** (`ingest::FrameSource`): camera index or local file.
//! 2. **Detector** (`detect::Detector`): frame and thresholds in, boxes out.
//! 3. **Display sink** (`display::DisplaySink`): raw and annotated panels.
//!
//! The loop (`run::run`) is synchronous: one frame in flight, stop signal polled
//! once per frame, source and detector resources released exactly once on every
//! exit path. `control::LoopRunner` moves it onto a worker thread.
//!
//! # Module Structure
//!
//! - `frame`: pixel buffer with a declared channel order
//! - `ingest`: camera and file sources
//! - `detect`: detector trait, results, annotation, NMS, model catalog
//! - `display`: display sinks and user notices
//! - `run`: the loop, its state machine and report
//! - `control`: threaded start/stop
//! - `config`: settings for the binary

pub mod config;
pub mod control;
pub mod detect;
pub mod display;
pub mod frame;
pub mod ingest;
pub mod run;

pub use config::DemoConfig;
pub use control::{LoopHandle, LoopRunner};
pub use detect::{
    BoundingBox, Detection, DetectionResult, Detector, Keypoint, Mask, ModelCatalog, StubBackend,
    Thresholds,
};
pub use display::{DirectorySink, DisplaySink, Notice, NoticeLevel, NullSink, Panel};
pub use frame::{ChannelOrder, Frame};
pub use ingest::{FrameSource, ReadOutcome, SourceError, SourceSpec};
pub use run::{
    run, run_with_options, RunControl, RunError, RunOptions, RunReport, RunState, StopReason,
    StopSignal,
};
