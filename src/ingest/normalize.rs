use std::borrow::Cow;

use anyhow::{anyhow, Context, Result};

/// Pixel layouts a camera driver may hand back.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum PixelFormat {
    Rgb24,
    Yuyv,
    Mjpeg,
}

impl PixelFormat {
    pub(crate) fn from_fourcc(fourcc: &[u8; 4]) -> Result<Self> {
        match fourcc {
            b"RGB3" => Ok(PixelFormat::Rgb24),
            b"YUYV" => Ok(PixelFormat::Yuyv),
            b"MJPG" => Ok(PixelFormat::Mjpeg),
            other => Err(anyhow!(
                "unsupported camera pixel format {}",
                String::from_utf8_lossy(other)
            )),
        }
    }
}

/// Convert a captured buffer to packed RGB24.
///
/// `stride` is the driver's bytes per line; rows may carry padding past the
/// pixel data. Zero means rows are tightly packed. Compressed formats ignore it.
pub(crate) fn normalize_to_rgb(
    pixels: &[u8],
    width: u32,
    height: u32,
    stride: u32,
    format: PixelFormat,
) -> Result<Vec<u8>> {
    match format {
        PixelFormat::Rgb24 => {
            let row_bytes = row_bytes(width, 3)?;
            let packed = unpad_rows(pixels, row_bytes, stride, height, "RGB")?;
            Ok(packed.into_owned())
        }
        PixelFormat::Yuyv => {
            let row_bytes = row_bytes(width, 2)?;
            let packed = unpad_rows(pixels, row_bytes, stride, height, "YUYV")?;
            yuyv_to_rgb(&packed, width, height)
        }
        PixelFormat::Mjpeg => mjpeg_to_rgb(pixels, width, height),
    }
}

fn row_bytes(width: u32, bytes_per_pixel: usize) -> Result<usize> {
    (width as usize)
        .checked_mul(bytes_per_pixel)
        .ok_or_else(|| anyhow!("frame width {} overflows", width))
}

/// Drop per-row padding. Borrows when the rows are already packed.
fn unpad_rows<'a>(
    pixels: &'a [u8],
    row_bytes: usize,
    stride: u32,
    height: u32,
    kind: &str,
) -> Result<Cow<'a, [u8]>> {
    let stride = (stride as usize).max(row_bytes);
    let rows = height as usize;
    if stride == row_bytes {
        let expected = row_bytes
            .checked_mul(rows)
            .ok_or_else(|| anyhow!("{} frame dimensions overflow", kind))?;
        let packed = pixels.get(..expected).ok_or_else(|| {
            anyhow!(
                "{} frame length mismatch: expected {}, got {}",
                kind,
                expected,
                pixels.len()
            )
        })?;
        return Ok(Cow::Borrowed(packed));
    }

    let mut packed = Vec::with_capacity(row_bytes * rows);
    for row in 0..rows {
        let start = row * stride;
        let line = pixels.get(start..start + row_bytes).ok_or_else(|| {
            anyhow!(
                "{} frame row {} is out of bounds (stride {}, {} bytes)",
                kind,
                row,
                stride,
                pixels.len()
            )
        })?;
        packed.extend_from_slice(line);
    }
    Ok(Cow::Owned(packed))
}

// Each 4-byte YUYV group encodes two pixels: [Y0, U, Y1, V].
fn yuyv_to_rgb(pixels: &[u8], width: u32, height: u32) -> Result<Vec<u8>> {
    let pixel_count = (width as usize)
        .checked_mul(height as usize)
        .ok_or_else(|| anyhow!("YUYV frame dimensions overflow"))?;
    if width % 2 != 0 {
        return Err(anyhow!("YUYV frame width must be even, got {}", width));
    }
    let expected = pixel_count * 2;
    if pixels.len() < expected {
        return Err(anyhow!(
            "YUYV frame length mismatch: expected {}, got {}",
            expected,
            pixels.len()
        ));
    }

    let mut rgb = Vec::with_capacity(pixel_count * 3);
    for chunk in pixels[..expected].chunks_exact(4) {
        let u = chunk[1] as f32 - 128.0;
        let v = chunk[3] as f32 - 128.0;
        for y in [chunk[0] as f32, chunk[2] as f32] {
            rgb.push(clamp_to_u8(y + 1.402_f32 * v));
            rgb.push(clamp_to_u8(y - 0.344_136_f32 * u - 0.714_136_f32 * v));
            rgb.push(clamp_to_u8(y + 1.772_f32 * u));
        }
    }
    Ok(rgb)
}

fn mjpeg_to_rgb(pixels: &[u8], width: u32, height: u32) -> Result<Vec<u8>> {
    let image = image::load_from_memory_with_format(pixels, image::ImageFormat::Jpeg)
        .context("decode MJPG frame")?
        .to_rgb8();
    if image.width() != width || image.height() != height {
        return Err(anyhow!(
            "MJPG frame is {}x{}, negotiated {}x{}",
            image.width(),
            image.height(),
            width,
            height
        ));
    }
    Ok(image.into_raw())
}

fn clamp_to_u8(value: f32) -> u8 {
    value.round().clamp(0.0, 255.0) as u8
}
