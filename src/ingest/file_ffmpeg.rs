//! FFmpeg-backed decoding for `FileSource`.
//!
//! Frames are decoded in-memory and scaled to packed BGR24. End of file flushes
//! the decoder before reporting end-of-stream, so no buffered frames are lost.

use anyhow::{Context, Result};
use ffmpeg_next as ffmpeg;

use crate::frame::{ChannelOrder, Frame};

pub(crate) struct FfmpegFileSource {
    input: ffmpeg::format::context::Input,
    stream_index: usize,
    decoder: ffmpeg::codec::decoder::Video,
    scaler: ffmpeg::software::scaling::Context,
    eof_sent: bool,
}

impl FfmpegFileSource {
    pub(crate) fn open(path: &str) -> Result<Self> {
        ffmpeg::init().context("initialize ffmpeg")?;
        let input = ffmpeg::format::input(path)
            .with_context(|| format!("failed to open video file '{}' with ffmpeg", path))?;
        let input_stream = input
            .streams()
            .best(ffmpeg::media::Type::Video)
            .ok_or_else(|| anyhow::anyhow!("file has no video track"))?;
        let stream_index = input_stream.index();
        let context = ffmpeg::codec::context::Context::from_parameters(input_stream.parameters())
            .context("load video decoder parameters")?;
        let decoder = context
            .decoder()
            .video()
            .context("open ffmpeg video decoder")?;

        let scaler = ffmpeg::software::scaling::context::Context::get(
            decoder.format(),
            decoder.width(),
            decoder.height(),
            ffmpeg::util::format::pixel::Pixel::BGR24,
            decoder.width(),
            decoder.height(),
            ffmpeg::software::scaling::flag::Flags::BILINEAR,
        )
        .context("create ffmpeg scaler")?;

        log::debug!(
            "FileSource: decoding {} ({}x{}, stream {})",
            path,
            decoder.width(),
            decoder.height(),
            stream_index
        );

        Ok(Self {
            input,
            stream_index,
            decoder,
            scaler,
            eof_sent: false,
        })
    }

    /// Decode the next frame; `None` once the file and the decoder are drained.
    pub(crate) fn next_frame(&mut self) -> Result<Option<Frame>> {
        let mut decoded = ffmpeg::frame::Video::empty();

        if self.decoder.receive_frame(&mut decoded).is_ok() {
            return self.convert(&decoded).map(Some);
        }

        if !self.eof_sent {
            let mut received = false;
            for (stream, packet) in self.input.packets() {
                if stream.index() != self.stream_index {
                    continue;
                }
                self.decoder
                    .send_packet(&packet)
                    .context("send packet to ffmpeg decoder")?;
                if self.decoder.receive_frame(&mut decoded).is_ok() {
                    received = true;
                    break;
                }
            }
            if received {
                return self.convert(&decoded).map(Some);
            }
            self.decoder
                .send_eof()
                .context("flush ffmpeg decoder")?;
            self.eof_sent = true;
        }

        if self.decoder.receive_frame(&mut decoded).is_ok() {
            return self.convert(&decoded).map(Some);
        }
        Ok(None)
    }

    fn convert(&mut self, decoded: &ffmpeg::frame::Video) -> Result<Frame> {
        let mut bgr_frame = ffmpeg::frame::Video::empty();
        self.scaler
            .run(decoded, &mut bgr_frame)
            .context("scale frame to BGR")?;
        let (pixels, width, height) = frame_to_pixels(&bgr_frame)?;
        Frame::new(pixels, width, height, ChannelOrder::Bgr)
    }
}

fn frame_to_pixels(frame: &ffmpeg::frame::Video) -> Result<(Vec<u8>, u32, u32)> {
    let width = frame.width();
    let height = frame.height();
    let row_bytes = (width as usize) * 3;
    let stride = frame.stride(0);
    let data = frame.data(0);

    if stride == row_bytes {
        let len = row_bytes * height as usize;
        let pixels = data
            .get(..len)
            .context("ffmpeg frame is shorter than its dimensions")?;
        return Ok((pixels.to_vec(), width, height));
    }

    let mut pixels = Vec::with_capacity(row_bytes * height as usize);
    for row in 0..height as usize {
        let start = row * stride;
        let end = start + row_bytes;
        pixels.extend_from_slice(
            data.get(start..end)
                .context("ffmpeg frame row is out of bounds")?,
        );
    }

    Ok((pixels, width, height))
}
