//! V4L2 camera capture backend for `CameraSource`.
//!
//! Frames are captured through an mmap stream, normalized to packed RGB and
//! tagged `ChannelOrder::Rgb`. Closing drops the stream before the device so the
//! driver buffers are returned before the file descriptor is closed.

use anyhow::{Context, Result};
use ouroboros::self_referencing;

use super::normalize::{normalize_to_rgb, PixelFormat};
use super::CameraConfig;
use crate::frame::{ChannelOrder, Frame};

pub(crate) struct DeviceCamera {
    config: CameraConfig,
    state: Option<DeviceState>,
    frame_count: u64,
    active_width: u32,
    active_height: u32,
    /// Bytes per line reported by the driver.
    active_stride: u32,
    active_format: PixelFormat,
}

#[self_referencing]
struct DeviceState {
    device: v4l::Device,
    #[borrows(mut device)]
    #[covariant]
    stream: v4l::prelude::MmapStream<'this, v4l::Device>,
}

impl DeviceCamera {
    pub(crate) fn new(config: CameraConfig) -> Self {
        Self {
            active_width: config.width,
            active_height: config.height,
            config,
            state: None,
            frame_count: 0,
            active_stride: 0,
            active_format: PixelFormat::Rgb24,
        }
    }

    pub(crate) fn open(&mut self) -> Result<()> {
        use v4l::buffer::Type;
        use v4l::video::Capture;

        let path = self.config.device_path();
        let mut device =
            v4l::Device::with_path(&path).with_context(|| format!("open v4l2 device {}", path))?;
        let mut format = device.format().context("read v4l2 format")?;
        format.width = self.config.width;
        format.height = self.config.height;
        format.fourcc = v4l::FourCC::new(b"RGB3");

        let format = match device.set_format(&format) {
            Ok(format) => format,
            Err(err) => {
                log::warn!("CameraSource: failed to set format on {}: {}", path, err);
                device
                    .format()
                    .context("read v4l2 format after set failure")?
            }
        };
        let pixel_format = PixelFormat::from_fourcc(&format.fourcc.repr)?;

        if self.config.target_fps > 0 {
            let params = v4l::video::capture::Parameters::with_fps(self.config.target_fps);
            if let Err(err) = device.set_params(&params) {
                log::warn!("CameraSource: failed to set fps on {}: {}", path, err);
            }
        }

        let state = DeviceStateBuilder {
            device,
            stream_builder: |device| {
                v4l::prelude::MmapStream::with_buffers(device, Type::VideoCapture, 4)
                    .map_err(|err| anyhow::Error::new(err).context("create v4l2 buffer stream"))
            },
        }
        .try_build()?;

        self.active_width = format.width;
        self.active_height = format.height;
        self.active_stride = format.stride;
        self.active_format = pixel_format;
        self.state = Some(state);

        log::info!(
            "CameraSource: capturing {}x{} {:?} (stride {}) from {}",
            self.active_width,
            self.active_height,
            self.active_format,
            self.active_stride,
            path
        );
        Ok(())
    }

    pub(crate) fn next_frame(&mut self) -> Result<Frame> {
        use v4l::io::traits::CaptureStream;

        let state = self.state.as_mut().context("v4l2 device not open")?;
        let pixels = state
            .with_mut(|fields| {
                fields
                    .stream
                    .next()
                    .map(|(buf, _meta)| buf.to_vec())
            })
            .context("capture v4l2 frame")?;

        let rgb = normalize_to_rgb(
            &pixels,
            self.active_width,
            self.active_height,
            self.active_stride,
            self.active_format,
        )?;
        self.frame_count += 1;
        Frame::new(rgb, self.active_width, self.active_height, ChannelOrder::Rgb)
    }

    pub(crate) fn close(&mut self) {
        self.state = None;
    }

    pub(crate) fn is_open(&self) -> bool {
        self.state.is_some()
    }

    pub(crate) fn frames_captured(&self) -> u64 {
        self.frame_count
    }
}
