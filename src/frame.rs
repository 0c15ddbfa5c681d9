//! Frame container shared by sources, detectors and display sinks.
//!
//! - `Frame`: packed 8-bit, 3-channel pixel buffer with its declared channel order.
//! - `ChannelOrder`: `Rgb` or `Bgr`. The order travels with the frame; nothing in
//!   the pipeline swaps channels behind the caller's back. Consumers that need a
//!   specific order convert explicitly (`Frame::to_rgb_image`).
//!
//! Frames are produced once per loop iteration and dropped after display. There is
//! no buffering or backlog.

use anyhow::{anyhow, Result};
use image::RgbImage;

/// Byte order of the three channels in a packed pixel.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ChannelOrder {
    #[default]
    Rgb,
    Bgr,
}

impl ChannelOrder {
    /// Reorder an RGB triple into this channel order.
    pub fn from_rgb(self, rgb: [u8; 3]) -> [u8; 3] {
        match self {
            ChannelOrder::Rgb => rgb,
            ChannelOrder::Bgr => [rgb[2], rgb[1], rgb[0]],
        }
    }
}

/// A single image sample.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    data: Vec<u8>,
    width: u32,
    height: u32,
    order: ChannelOrder,
}

impl Frame {
    /// Wrap a packed pixel buffer. The buffer length must be `width * height * 3`.
    pub fn new(data: Vec<u8>, width: u32, height: u32, order: ChannelOrder) -> Result<Self> {
        let expected = packed_len(width, height)?;
        if data.len() != expected {
            return Err(anyhow!(
                "frame length mismatch: expected {} bytes for {}x{}, got {}",
                expected,
                width,
                height,
                data.len()
            ));
        }
        Ok(Self {
            data,
            width,
            height,
            order,
        })
    }

    /// A frame filled with a single colour, given in RGB.
    pub fn filled(width: u32, height: u32, order: ChannelOrder, rgb: [u8; 3]) -> Result<Self> {
        let pixel = order.from_rgb(rgb);
        let len = packed_len(width, height)?;
        let data = pixel.iter().copied().cycle().take(len).collect();
        Self::new(data, width, height, order)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn channel_order(&self) -> ChannelOrder {
        self.order
    }

    /// Packed pixels in the frame's declared channel order.
    pub fn pixels(&self) -> &[u8] {
        &self.data
    }

    pub fn into_pixels(self) -> Vec<u8> {
        self.data
    }

    /// Pixel at (x, y) reported as RGB regardless of storage order.
    pub fn rgb_at(&self, x: u32, y: u32) -> Option<[u8; 3]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let idx = ((y as usize) * (self.width as usize) + x as usize) * 3;
        let px = [self.data[idx], self.data[idx + 1], self.data[idx + 2]];
        Some(self.order.from_rgb(px))
    }

    /// Explicit conversion to an RGB image, honouring the declared channel order.
    pub fn to_rgb_image(&self) -> Result<RgbImage> {
        let data = match self.order {
            ChannelOrder::Rgb => self.data.clone(),
            ChannelOrder::Bgr => {
                let mut swapped = self.data.clone();
                for px in swapped.chunks_exact_mut(3) {
                    px.swap(0, 2);
                }
                swapped
            }
        };
        RgbImage::from_raw(self.width, self.height, data)
            .ok_or_else(|| anyhow!("frame buffer does not fit {}x{}", self.width, self.height))
    }
}

fn packed_len(width: u32, height: u32) -> Result<usize> {
    (width as usize)
        .checked_mul(height as usize)
        .and_then(|v| v.checked_mul(3))
        .ok_or_else(|| anyhow!("frame dimensions overflow"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_wrong_buffer_length() {
        assert!(Frame::new(vec![0u8; 10], 2, 2, ChannelOrder::Rgb).is_err());
        assert!(Frame::new(vec![0u8; 12], 2, 2, ChannelOrder::Rgb).is_ok());
    }

    #[test]
    fn bgr_frame_keeps_declared_order() {
        let frame = Frame::filled(2, 1, ChannelOrder::Bgr, [10, 20, 30]).unwrap();
        assert_eq!(frame.channel_order(), ChannelOrder::Bgr);
        assert_eq!(&frame.pixels()[..3], &[30, 20, 10]);
        assert_eq!(frame.rgb_at(1, 0), Some([10, 20, 30]));
    }

    #[test]
    fn rgb_image_conversion_swaps_only_bgr() {
        let bgr = Frame::filled(1, 1, ChannelOrder::Bgr, [1, 2, 3]).unwrap();
        let rgb = Frame::filled(1, 1, ChannelOrder::Rgb, [1, 2, 3]).unwrap();
        assert_eq!(bgr.to_rgb_image().unwrap().get_pixel(0, 0).0, [1, 2, 3]);
        assert_eq!(rgb.to_rgb_image().unwrap().get_pixel(0, 0).0, [1, 2, 3]);
        // Source buffers are untouched.
        assert_eq!(bgr.pixels(), &[3, 2, 1]);
    }

    #[test]
    fn rgb_at_out_of_bounds_is_none() {
        let frame = Frame::filled(2, 2, ChannelOrder::Rgb, [0, 0, 0]).unwrap();
        assert!(frame.rgb_at(2, 0).is_none());
        assert!(frame.rgb_at(0, 2).is_none());
    }
}
