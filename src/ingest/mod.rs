//! Frame sources.
//!
//! This module provides the sources a run can read frames from:
//! - Camera devices, addressed by index (feature: ingest-v4l2)
//! - Local video files (feature: ingest-file-ffmpeg)
//! - Synthetic `stub://` sources for both (testing and demos)
//!
//! Every source implements `FrameSource`: `open` once, `read` until a frame,
//! end-of-stream or a read error, then `release`. Release is idempotent; the run
//! loop calls it exactly once, but a second call must be harmless.
//!
//! Sources hand each frame to the caller and keep no copy of it.

pub mod camera;
pub mod file;
#[cfg(feature = "ingest-file-ffmpeg")]
pub(crate) mod file_ffmpeg;
#[cfg(feature = "ingest-v4l2")]
mod normalize;
mod synthetic;
#[cfg(feature = "ingest-v4l2")]
mod v4l2;

use anyhow::{anyhow, Result};
use thiserror::Error;

use crate::frame::Frame;

pub use camera::{CameraConfig, CameraSource};
pub use file::{FileConfig, FileSource};

/// Failures surfaced by a frame source.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SourceError {
    /// The device or file could not be opened. The run never starts.
    #[error("source {source_id} unavailable: {reason}")]
    Unavailable { source_id: String, reason: String },
    /// A frame could not be read from an opened source.
    #[error("failed to read frame from {source_id}: {reason}")]
    Read { source_id: String, reason: String },
}

impl SourceError {
    pub fn unavailable(source_id: impl Into<String>, err: impl std::fmt::Display) -> Self {
        Self::Unavailable {
            source_id: source_id.into(),
            reason: err.to_string(),
        }
    }

    pub fn read(source_id: impl Into<String>, err: impl std::fmt::Display) -> Self {
        Self::Read {
            source_id: source_id.into(),
            reason: err.to_string(),
        }
    }
}

/// Result of a single read.
#[derive(Debug)]
pub enum ReadOutcome {
    Frame(Frame),
    EndOfStream,
}

/// A source of frames with an explicit open/read/release lifecycle.
pub trait FrameSource: Send {
    /// Human-readable identifier used in logs and notices.
    fn source_id(&self) -> &str;

    /// Acquire the underlying device or file.
    fn open(&mut self) -> Result<(), SourceError>;

    /// Read the next frame. Reading from a source that is not open is a read error.
    fn read(&mut self) -> Result<ReadOutcome, SourceError>;

    /// Release the underlying handle. Calling this on a released source is a no-op.
    fn release(&mut self);

    fn is_open(&self) -> bool;
}

impl<S: FrameSource + ?Sized> FrameSource for Box<S> {
    fn source_id(&self) -> &str {
        (**self).source_id()
    }

    fn open(&mut self) -> Result<(), SourceError> {
        (**self).open()
    }

    fn read(&mut self) -> Result<ReadOutcome, SourceError> {
        (**self).read()
    }

    fn release(&mut self) {
        (**self).release()
    }

    fn is_open(&self) -> bool {
        (**self).is_open()
    }
}

/// User-facing source selection: a camera index or a local video file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SourceSpec {
    Camera(u32),
    File(String),
}

impl SourceSpec {
    /// Parse a selector.
    ///
    /// `webcam` / `camera` select camera 0, a bare integer selects that camera,
    /// `stub://...` selects a synthetic file source, and anything else is treated
    /// as a local file path.
    pub fn parse(value: &str) -> Result<Self> {
        let value = value.trim();
        if value.is_empty() {
            return Err(anyhow!("source selector must not be empty"));
        }
        let lower = value.to_ascii_lowercase();
        if lower == "webcam" || lower == "camera" {
            return Ok(SourceSpec::Camera(0));
        }
        if let Ok(index) = value.parse::<u32>() {
            return Ok(SourceSpec::Camera(index));
        }
        Ok(SourceSpec::File(value.to_string()))
    }

    /// Build an unopened source for this selection.
    pub fn build(&self) -> Result<Box<dyn FrameSource>> {
        match self {
            SourceSpec::Camera(index) => {
                let config = CameraConfig {
                    index: *index,
                    ..CameraConfig::default()
                };
                Ok(Box::new(CameraSource::new(config)?))
            }
            SourceSpec::File(path) => {
                let config = FileConfig {
                    path: path.clone(),
                    ..FileConfig::default()
                };
                Ok(Box::new(FileSource::new(config)?))
            }
        }
    }
}

impl std::fmt::Display for SourceSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceSpec::Camera(index) => write!(f, "camera:{}", index),
            SourceSpec::File(path) => write!(f, "file:{}", path),
        }
    }
}
