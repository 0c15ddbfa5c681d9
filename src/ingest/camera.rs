//! Camera frame source.
//!
//! `CameraSource` captures from a local camera addressed by index
//! (`/dev/video<index>`), or from a synthetic camera when the device path is a
//! `stub://` identifier.
//!
//! Device capture uses V4L2 and requires the `ingest-v4l2` feature. Without it,
//! opening a real device fails with `SourceError::Unavailable`, the same way a
//! missing or busy camera does.

use anyhow::Result;

use super::synthetic::{StubParams, SyntheticFrames, SyntheticRead};
use super::{FrameSource, ReadOutcome, SourceError};
use crate::frame::ChannelOrder;

/// Configuration for a camera source.
#[derive(Clone, Debug)]
pub struct CameraConfig {
    /// Camera index; resolves to `/dev/video<index>` unless `device` is set.
    pub index: u32,
    /// Explicit device path or `stub://` identifier.
    pub device: Option<String>,
    /// Target frame rate requested from the driver (0 leaves the driver default).
    pub target_fps: u32,
    /// Preferred frame width.
    pub width: u32,
    /// Preferred frame height.
    pub height: u32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            index: 0,
            device: None,
            target_fps: 30,
            width: 640,
            height: 480,
        }
    }
}

impl CameraConfig {
    pub fn device_path(&self) -> String {
        self.device
            .clone()
            .unwrap_or_else(|| format!("/dev/video{}", self.index))
    }
}

/// Camera frame source.
pub struct CameraSource {
    id: String,
    backend: CameraBackend,
}

enum CameraBackend {
    Synthetic(SyntheticCamera),
    #[cfg(feature = "ingest-v4l2")]
    Device(super::v4l2::DeviceCamera),
    #[cfg(not(feature = "ingest-v4l2"))]
    Unsupported,
}

impl CameraSource {
    pub fn new(config: CameraConfig) -> Result<Self> {
        let id = config.device_path();
        let backend = if id.starts_with("stub://") {
            CameraBackend::Synthetic(SyntheticCamera::new(&id)?)
        } else {
            #[cfg(feature = "ingest-v4l2")]
            {
                CameraBackend::Device(super::v4l2::DeviceCamera::new(config))
            }
            #[cfg(not(feature = "ingest-v4l2"))]
            {
                CameraBackend::Unsupported
            }
        };
        Ok(Self { id, backend })
    }

    /// Frames delivered since the source was created.
    pub fn frames_captured(&self) -> u64 {
        match &self.backend {
            CameraBackend::Synthetic(camera) => camera.frames.frames_emitted(),
            #[cfg(feature = "ingest-v4l2")]
            CameraBackend::Device(camera) => camera.frames_captured(),
            #[cfg(not(feature = "ingest-v4l2"))]
            CameraBackend::Unsupported => 0,
        }
    }
}

impl FrameSource for CameraSource {
    fn source_id(&self) -> &str {
        &self.id
    }

    fn open(&mut self) -> Result<(), SourceError> {
        if self.is_open() {
            return Ok(());
        }
        let result = match &mut self.backend {
            CameraBackend::Synthetic(camera) => {
                camera.open = true;
                Ok(())
            }
            #[cfg(feature = "ingest-v4l2")]
            CameraBackend::Device(camera) => camera.open(),
            #[cfg(not(feature = "ingest-v4l2"))]
            CameraBackend::Unsupported => Err(anyhow::anyhow!(
                "camera capture requires the ingest-v4l2 feature"
            )),
        };
        match result {
            Ok(()) => {
                log::info!("CameraSource: opened {}", self.id);
                Ok(())
            }
            Err(err) => Err(SourceError::unavailable(&self.id, format!("{:#}", err))),
        }
    }

    fn read(&mut self) -> Result<ReadOutcome, SourceError> {
        if !self.is_open() {
            return Err(SourceError::read(&self.id, "camera is not open"));
        }
        match &mut self.backend {
            CameraBackend::Synthetic(camera) => match camera.frames.next() {
                Ok(SyntheticRead::Frame(frame)) => Ok(ReadOutcome::Frame(frame)),
                Ok(SyntheticRead::EndOfStream) => Ok(ReadOutcome::EndOfStream),
                Ok(SyntheticRead::Failed(reason)) => Err(SourceError::read(&self.id, reason)),
                Err(err) => Err(SourceError::read(&self.id, format!("{:#}", err))),
            },
            #[cfg(feature = "ingest-v4l2")]
            CameraBackend::Device(camera) => camera
                .next_frame()
                .map(ReadOutcome::Frame)
                .map_err(|err| SourceError::read(&self.id, format!("{:#}", err))),
            #[cfg(not(feature = "ingest-v4l2"))]
            CameraBackend::Unsupported => Err(SourceError::read(&self.id, "camera is not open")),
        }
    }

    fn release(&mut self) {
        if !self.is_open() {
            return;
        }
        match &mut self.backend {
            CameraBackend::Synthetic(camera) => camera.open = false,
            #[cfg(feature = "ingest-v4l2")]
            CameraBackend::Device(camera) => camera.close(),
            #[cfg(not(feature = "ingest-v4l2"))]
            CameraBackend::Unsupported => {}
        }
        log::info!(
            "CameraSource: released {} after {} frames",
            self.id,
            self.frames_captured()
        );
    }

    fn is_open(&self) -> bool {
        match &self.backend {
            CameraBackend::Synthetic(camera) => camera.open,
            #[cfg(feature = "ingest-v4l2")]
            CameraBackend::Device(camera) => camera.is_open(),
            #[cfg(not(feature = "ingest-v4l2"))]
            CameraBackend::Unsupported => false,
        }
    }
}

impl Drop for CameraSource {
    fn drop(&mut self) {
        self.release();
    }
}

// ----------------------------------------------------------------------------
// Synthetic camera (stub://)
// ----------------------------------------------------------------------------

struct SyntheticCamera {
    frames: SyntheticFrames,
    open: bool,
}

impl SyntheticCamera {
    fn new(id: &str) -> Result<Self> {
        let params = StubParams::parse(id)?;
        Ok(Self {
            frames: SyntheticFrames::new(params, ChannelOrder::Rgb),
            open: false,
        })
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
