//! Overlay drawing for `DetectionResult`.
//!
//! Overlays are drawn straight into a copy of the frame's buffer, in the frame's
//! own channel order: palette colours are reordered instead of the pixels.
//! Instance masks go first, then boxes, then pose skeletons.

use image::{ImageBuffer, Rgb};
use imageproc::drawing::{
    draw_filled_circle_mut, draw_filled_rect_mut, draw_hollow_rect_mut, draw_line_segment_mut,
};
use imageproc::rect::Rect;

use super::result::{BoundingBox, Detection, DetectionResult};
use crate::frame::{ChannelOrder, Frame};

const BOX_THICKNESS: i32 = 2;
const TAB_HEIGHT: u32 = 6;
const KEYPOINT_RADIUS: i32 = 3;
/// Keypoints below this confidence are not drawn.
const KEYPOINT_CONFIDENCE: f32 = 0.5;
/// Weight of the class colour when tinting masked pixels.
const MASK_ALPHA: f32 = 0.5;

/// Limbs of the COCO person skeleton, as keypoint index pairs.
pub const SKELETON: [(usize, usize); 16] = [
    (0, 1),
    (0, 2),
    (1, 3),
    (2, 4),
    (5, 6),
    (5, 11),
    (6, 12),
    (11, 12),
    (5, 7),
    (6, 8),
    (7, 9),
    (8, 10),
    (11, 13),
    (12, 14),
    (13, 15),
    (14, 16),
];

/// Per-class colours, RGB.
const PALETTE: [[u8; 3]; 20] = [
    [0xFF, 0x38, 0x38],
    [0xFF, 0x9D, 0x97],
    [0xFF, 0x70, 0x1F],
    [0xFF, 0xB2, 0x1D],
    [0xCF, 0xD2, 0x31],
    [0x48, 0xF9, 0x0A],
    [0x92, 0xCC, 0x17],
    [0x3D, 0xDB, 0x86],
    [0x1A, 0x93, 0x34],
    [0x00, 0xD4, 0xBB],
    [0x2C, 0x99, 0xA8],
    [0x00, 0xC2, 0xFF],
    [0x34, 0x45, 0x93],
    [0x64, 0x73, 0xFF],
    [0x00, 0x18, 0xEC],
    [0x84, 0x38, 0xFF],
    [0x52, 0x00, 0x85],
    [0xCB, 0x38, 0xFF],
    [0xFF, 0x95, 0xC8],
    [0xFF, 0x37, 0xC7],
];

/// RGB colour used for a class id.
pub fn class_color(class_id: usize) -> [u8; 3] {
    PALETTE[class_id % PALETTE.len()]
}

impl DetectionResult {
    /// Draw every detection onto a copy of `frame`.
    ///
    /// Each box gets an outline in its class colour and a filled tab above the
    /// top-left corner whose width is proportional to the confidence. Instance
    /// masks are tinted with the class colour and pose keypoints are joined into
    /// a skeleton. If `frame` has a different size than the one the result was
    /// computed on, everything is rescaled. The returned frame keeps `frame`'s
    /// channel order.
    pub fn annotate(&self, frame: &Frame) -> Frame {
        let (width, height) = (frame.width(), frame.height());
        let Some(mut canvas) =
            ImageBuffer::<Rgb<u8>, Vec<u8>>::from_raw(width, height, frame.pixels().to_vec())
        else {
            return frame.clone();
        };
        if self.is_empty() || width == 0 || height == 0 {
            return frame.clone();
        }

        let (src_w, src_h) = self.frame_size();
        let sx = if src_w == 0 { 1.0 } else { width as f32 / src_w as f32 };
        let sy = if src_h == 0 { 1.0 } else { height as f32 / src_h as f32 };
        let order = frame.channel_order();

        for det in self.detections() {
            if let Some(rect) = clip(&scaled_box(&det.bbox, sx, sy), width, height) {
                tint_mask(&mut canvas, det, rect, (sx, sy), order);
            }
        }

        for det in self.detections() {
            let Some(rect) = clip(&scaled_box(&det.bbox, sx, sy), width, height) else {
                continue;
            };
            let color = Rgb(order.from_rgb(class_color(det.class_id)));

            for inset in 0..BOX_THICKNESS {
                let w = rect.width() as i32 - 2 * inset;
                let h = rect.height() as i32 - 2 * inset;
                if w < 1 || h < 1 {
                    break;
                }
                let ring = Rect::at(rect.left() + inset, rect.top() + inset)
                    .of_size(w as u32, h as u32);
                draw_hollow_rect_mut(&mut canvas, ring, color);
            }

            let tab_w = ((rect.width() as f32 * det.confidence.clamp(0.0, 1.0)).round() as u32)
                .max(1);
            let tab_top = (rect.top() - TAB_HEIGHT as i32).max(0);
            draw_filled_rect_mut(
                &mut canvas,
                Rect::at(rect.left(), tab_top).of_size(tab_w, TAB_HEIGHT),
                color,
            );
        }

        for det in self.detections() {
            draw_skeleton(&mut canvas, det, (sx, sy), order);
        }

        Frame::new(canvas.into_raw(), width, height, order).unwrap_or_else(|err| {
            log::warn!("annotate: dropping overlay: {:#}", err);
            frame.clone()
        })
    }
}

fn scaled_box(bbox: &BoundingBox, sx: f32, sy: f32) -> BoundingBox {
    BoundingBox::new(bbox.x1 * sx, bbox.y1 * sy, bbox.x2 * sx, bbox.y2 * sy)
}

/// Blend the class colour into every masked pixel inside `rect`.
fn tint_mask(
    canvas: &mut ImageBuffer<Rgb<u8>, Vec<u8>>,
    det: &Detection,
    rect: Rect,
    (sx, sy): (f32, f32),
    order: ChannelOrder,
) {
    let Some(mask) = &det.mask else {
        return;
    };
    let color = order.from_rgb(class_color(det.class_id));
    for y in rect.top()..rect.bottom() + 1 {
        for x in rect.left()..rect.right() + 1 {
            // mask lives in the coordinates the result was computed on
            let mx = ((x as f32 + 0.5) / sx) as u32;
            let my = ((y as f32 + 0.5) / sy) as u32;
            if !mask.contains(mx, my) {
                continue;
            }
            let px = canvas.get_pixel_mut(x as u32, y as u32);
            for (channel, tint) in px.0.iter_mut().zip(color) {
                *channel = (*channel as f32 * (1.0 - MASK_ALPHA) + tint as f32 * MASK_ALPHA)
                    .round() as u8;
            }
        }
    }
}

fn draw_skeleton(
    canvas: &mut ImageBuffer<Rgb<u8>, Vec<u8>>,
    det: &Detection,
    (sx, sy): (f32, f32),
    order: ChannelOrder,
) {
    if det.keypoints.is_empty() {
        return;
    }
    let visible = |i: usize| {
        det.keypoints
            .get(i)
            .filter(|k| k.confidence >= KEYPOINT_CONFIDENCE)
            .map(|k| (k.x * sx, k.y * sy))
    };

    let limb = Rgb(order.from_rgb(class_color(det.class_id)));
    for (a, b) in SKELETON {
        if let (Some(start), Some(end)) = (visible(a), visible(b)) {
            draw_line_segment_mut(canvas, start, end, limb);
        }
    }
    for i in 0..det.keypoints.len() {
        if let Some((x, y)) = visible(i) {
            let color = Rgb(order.from_rgb(class_color(i)));
            draw_filled_circle_mut(
                canvas,
                (x.round() as i32, y.round() as i32),
                KEYPOINT_RADIUS,
                color,
            );
        }
    }
}

/// Clip a box to the frame. `None` when nothing is left to draw.
fn clip(bbox: &BoundingBox, width: u32, height: u32) -> Option<Rect> {
    let x1 = bbox.x1.max(0.0).floor() as i64;
    let y1 = bbox.y1.max(0.0).floor() as i64;
    let x2 = (bbox.x2.min(width as f32).ceil() as i64).min(width as i64);
    let y2 = (bbox.y2.min(height as f32).ceil() as i64).min(height as i64);
    if x2 - x1 < 1 || y2 - y1 < 1 {
        return None;
    }
    Some(Rect::at(x1 as i32, y1 as i32).of_size((x2 - x1) as u32, (y2 - y1) as u32))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::result::{Keypoint, Mask};

    fn result_with_box(x1: f32, y1: f32, x2: f32, y2: f32) -> DetectionResult {
        DetectionResult::new(
            64,
            64,
            vec![Detection::new(BoundingBox::new(x1, y1, x2, y2), 0, "person", 0.5)],
        )
    }

    #[test]
    fn empty_result_returns_identical_frame() {
        let frame = Frame::filled(64, 64, ChannelOrder::Rgb, [10, 20, 30]).unwrap();
        let out = DetectionResult::empty(64, 64).annotate(&frame);
        assert_eq!(out, frame);
    }

    #[test]
    fn draws_outline_in_class_color() {
        let frame = Frame::filled(64, 64, ChannelOrder::Rgb, [0, 0, 0]).unwrap();
        let out = result_with_box(10.0, 20.0, 40.0, 50.0).annotate(&frame);
        assert_eq!(out.rgb_at(10, 30), Some(class_color(0)));
        // interior untouched
        assert_eq!(out.rgb_at(25, 35), Some([0, 0, 0]));
        // input frame is not modified
        assert_eq!(frame.rgb_at(10, 30), Some([0, 0, 0]));
    }

    #[test]
    fn preserves_bgr_order() {
        let frame = Frame::filled(64, 64, ChannelOrder::Bgr, [0, 0, 0]).unwrap();
        let out = result_with_box(10.0, 20.0, 40.0, 50.0).annotate(&frame);
        assert_eq!(out.channel_order(), ChannelOrder::Bgr);
        // rgb_at reads through the declared order, so the colour comes back as RGB
        assert_eq!(out.rgb_at(10, 30), Some(class_color(0)));
        let idx = ((30 * 64 + 10) * 3) as usize;
        let c = class_color(0);
        assert_eq!(&out.pixels()[idx..idx + 3], &[c[2], c[1], c[0]]);
    }

    #[test]
    fn boxes_outside_the_frame_are_skipped() {
        let frame = Frame::filled(64, 64, ChannelOrder::Rgb, [0, 0, 0]).unwrap();
        let out = result_with_box(100.0, 100.0, 120.0, 120.0).annotate(&frame);
        assert_eq!(out, frame);
    }

    #[test]
    fn partially_visible_boxes_are_clipped() {
        let frame = Frame::filled(64, 64, ChannelOrder::Rgb, [0, 0, 0]).unwrap();
        let out = result_with_box(-10.0, -10.0, 20.0, 20.0).annotate(&frame);
        assert_eq!(out.width(), 64);
        assert_eq!(out.rgb_at(0, 10), Some(class_color(0)));
    }

    #[test]
    fn masked_pixels_are_tinted_inside_the_box() {
        let mut det = Detection::new(BoundingBox::new(0.0, 0.0, 32.0, 32.0), 0, "person", 0.9);
        let bits = (0..32 * 32).map(|i| i % 32 < 16).collect();
        det.mask = Mask::new(0, 0, 32, 32, bits);
        let result = DetectionResult::new(64, 64, vec![det]);

        let frame = Frame::filled(64, 64, ChannelOrder::Rgb, [0, 0, 0]).unwrap();
        let out = result.annotate(&frame);
        let c = class_color(0);
        let half = |v: u8| (v as f32 * MASK_ALPHA).round() as u8;
        assert_eq!(out.rgb_at(8, 16), Some([half(c[0]), half(c[1]), half(c[2])]));
        // unmasked half of the box interior stays dark
        assert_eq!(out.rgb_at(24, 16), Some([0, 0, 0]));
    }

    #[test]
    fn confident_keypoints_are_drawn_and_weak_ones_skipped() {
        let mut det = Detection::new(BoundingBox::new(0.0, 0.0, 4.0, 4.0), 0, "person", 0.9);
        // 4-wide grid, far enough apart that the dots do not overlap
        det.keypoints = (0..17)
            .map(|k| Keypoint {
                x: 8.0 + (k % 4) as f32 * 14.0,
                y: 8.0 + (k / 4) as f32 * 12.0,
                confidence: 0.9,
            })
            .collect();
        det.keypoints[16] = Keypoint {
            x: 20.0,
            y: 58.0,
            confidence: 0.1,
        };
        let result = DetectionResult::new(64, 64, vec![det]);

        let frame = Frame::filled(64, 64, ChannelOrder::Bgr, [0, 0, 0]).unwrap();
        let out = result.annotate(&frame);
        assert_eq!(out.rgb_at(8, 8), Some(class_color(0)));
        assert_eq!(out.rgb_at(22, 8), Some(class_color(1)));
        assert_eq!(out.rgb_at(20, 58), Some([0, 0, 0]));
    }

    #[test]
    fn mask_follows_a_resized_frame() {
        let mut det = Detection::new(BoundingBox::new(0.0, 0.0, 16.0, 16.0), 1, "bicycle", 0.9);
        det.mask = Mask::new(0, 0, 16, 16, vec![true; 256]);
        let result = DetectionResult::new(32, 32, vec![det]);

        let frame = Frame::filled(64, 64, ChannelOrder::Rgb, [0, 0, 0]).unwrap();
        let out = result.annotate(&frame);
        assert_ne!(out.rgb_at(16, 16), Some([0, 0, 0]));
        assert_eq!(out.rgb_at(40, 40), Some([0, 0, 0]));
    }
}
