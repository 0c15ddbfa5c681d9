//! Synthetic `stub://` frames for tests and demos.
//!
//! A `stub://` identifier may carry query parameters:
//! - `frames=N`: end-of-stream after N frames (unbounded when absent)
//! - `fail_at=K`: the K-th read (1-based) fails with a read error
//! - `width=W`, `height=H`: frame size (defaults 320x240)
//!
//! Frames show a bright square drifting across a dark background so detectors
//! have something to find.

use anyhow::{anyhow, Result};

use crate::frame::{ChannelOrder, Frame};

const DEFAULT_WIDTH: u32 = 320;
const DEFAULT_HEIGHT: u32 = 240;
const BACKGROUND: u8 = 24;
const FOREGROUND: u8 = 230;

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct StubParams {
    pub frames: Option<u64>,
    pub fail_at: Option<u64>,
    pub width: u32,
    pub height: u32,
}

impl StubParams {
    pub(crate) fn parse(id: &str) -> Result<Self> {
        let rest = id
            .strip_prefix("stub://")
            .ok_or_else(|| anyhow!("not a stub identifier: {}", id))?;
        let mut params = Self {
            frames: None,
            fail_at: None,
            width: DEFAULT_WIDTH,
            height: DEFAULT_HEIGHT,
        };
        let Some((_, query)) = rest.split_once('?') else {
            return Ok(params);
        };
        for pair in query.split('&').filter(|p| !p.is_empty()) {
            let (key, value) = pair
                .split_once('=')
                .ok_or_else(|| anyhow!("malformed stub parameter '{}'", pair))?;
            let parsed: u64 = value
                .parse()
                .map_err(|_| anyhow!("stub parameter '{}' must be an integer", key))?;
            match key {
                "frames" => params.frames = Some(parsed),
                "fail_at" => params.fail_at = Some(parsed),
                "width" => params.width = dimension(key, parsed)?,
                "height" => params.height = dimension(key, parsed)?,
                other => return Err(anyhow!("unknown stub parameter '{}'", other)),
            }
        }
        Ok(params)
    }
}

fn dimension(key: &str, value: u64) -> Result<u32> {
    match u32::try_from(value) {
        Ok(v) if (8..=4096).contains(&v) => Ok(v),
        _ => Err(anyhow!("stub {} must be between 8 and 4096", key)),
    }
}

/// What a synthetic read produced.
pub(crate) enum SyntheticRead {
    Frame(Frame),
    EndOfStream,
    Failed(String),
}

pub(crate) struct SyntheticFrames {
    params: StubParams,
    order: ChannelOrder,
    reads: u64,
    frames_emitted: u64,
}

impl SyntheticFrames {
    pub(crate) fn new(params: StubParams, order: ChannelOrder) -> Self {
        Self {
            params,
            order,
            reads: 0,
            frames_emitted: 0,
        }
    }

    pub(crate) fn frames_emitted(&self) -> u64 {
        self.frames_emitted
    }

    pub(crate) fn next(&mut self) -> Result<SyntheticRead> {
        self.reads += 1;
        if self.params.fail_at == Some(self.reads) {
            return Ok(SyntheticRead::Failed(format!(
                "synthetic read failure at read {}",
                self.reads
            )));
        }
        if let Some(limit) = self.params.frames {
            if self.frames_emitted >= limit {
                return Ok(SyntheticRead::EndOfStream);
            }
        }
        let frame = self.render()?;
        self.frames_emitted += 1;
        Ok(SyntheticRead::Frame(frame))
    }

    fn render(&self) -> Result<Frame> {
        let w = self.params.width;
        let h = self.params.height;
        let side = (w.min(h) / 4).max(2);
        let span = w.saturating_sub(side).max(1);
        let x0 = ((self.frames_emitted * 8) % span as u64) as u32;
        let y0 = (h - side) / 2;

        let mut data = vec![BACKGROUND; (w as usize) * (h as usize) * 3];
        let fg = self.order.from_rgb([FOREGROUND, FOREGROUND / 2, FOREGROUND / 4]);
        for y in y0..y0 + side {
            for x in x0..x0 + side {
                let idx = ((y as usize) * (w as usize) + x as usize) * 3;
                data[idx..idx + 3].copy_from_slice(&fg);
            }
        }
        Frame::new(data, w, h, self.order)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_query_parameters() {
        let params = StubParams::parse("stub://clip?frames=3&fail_at=2&width=64&height=48").unwrap();
        assert_eq!(params.frames, Some(3));
        assert_eq!(params.fail_at, Some(2));
        assert_eq!((params.width, params.height), (64, 48));
    }

    #[test]
    fn plain_stub_is_unbounded() {
        let params = StubParams::parse("stub://camera").unwrap();
        assert_eq!(params.frames, None);
        assert_eq!((params.width, params.height), (DEFAULT_WIDTH, DEFAULT_HEIGHT));
    }

    #[test]
    fn rejects_unknown_parameters() {
        assert!(StubParams::parse("stub://clip?speed=2").is_err());
        assert!(StubParams::parse("stub://clip?frames=abc").is_err());
        assert!(StubParams::parse("stub://clip?width=1").is_err());
    }

    #[test]
    fn ends_after_frame_limit() {
        let params = StubParams::parse("stub://clip?frames=2&width=32&height=32").unwrap();
        let mut frames = SyntheticFrames::new(params, ChannelOrder::Rgb);
        assert!(matches!(frames.next().unwrap(), SyntheticRead::Frame(_)));
        assert!(matches!(frames.next().unwrap(), SyntheticRead::Frame(_)));
        assert!(matches!(frames.next().unwrap(), SyntheticRead::EndOfStream));
        assert_eq!(frames.frames_emitted(), 2);
    }

    #[test]
    fn fails_on_requested_read() {
        let params = StubParams::parse("stub://clip?fail_at=2&width=32&height=32").unwrap();
        let mut frames = SyntheticFrames::new(params, ChannelOrder::Rgb);
        assert!(matches!(frames.next().unwrap(), SyntheticRead::Frame(_)));
        assert!(matches!(frames.next().unwrap(), SyntheticRead::Failed(_)));
    }

    #[test]
    fn frames_contain_bright_square() {
        let params = StubParams::parse("stub://clip?width=32&height=32").unwrap();
        let mut frames = SyntheticFrames::new(params, ChannelOrder::Bgr);
        let SyntheticRead::Frame(frame) = frames.next().unwrap() else {
            panic!("expected frame");
        };
        assert_eq!(frame.channel_order(), ChannelOrder::Bgr);
        assert_eq!(frame.rgb_at(0, 0), Some([BACKGROUND; 3]));
        assert_eq!(
            frame.rgb_at(1, 15),
            Some([FOREGROUND, FOREGROUND / 2, FOREGROUND / 4])
        );
    }
}
