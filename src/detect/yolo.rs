//! YOLOv8 output decoding, independent of the inference runtime.
//!
//! The first output is `[1, 4 + classes + extra, anchors]`. Rows 0..4 are
//! `cx, cy, w, h` in model-input pixels, followed by one score row per class.
//! Pose heads append `POSE_KEYPOINTS * 3` rows (`x, y, confidence` per point).
//! Segmentation heads append one coefficient row per prototype and produce a
//! second output `[1, prototypes, mh, mw]` holding the prototype masks.

use anyhow::{anyhow, Result};

use super::catalog::ModelTask;
use super::labels::coco_label;
use super::nms::surviving_indices;
use super::result::{BoundingBox, Detection, Keypoint, Mask};
use super::thresholds::Thresholds;

/// Points in the COCO person skeleton.
pub const POSE_KEYPOINTS: usize = 17;

/// Sigmoid level above which a mask pixel belongs to the instance.
const MASK_THRESHOLD: f32 = 0.5;

/// Row-major f32 tensor borrowed from a model output.
#[derive(Clone, Copy, Debug)]
pub struct TensorView<'a> {
    data: &'a [f32],
    shape: &'a [usize],
}

impl<'a> TensorView<'a> {
    pub fn new(data: &'a [f32], shape: &'a [usize]) -> Result<Self> {
        let expected: usize = shape.iter().product();
        if expected != data.len() {
            return Err(anyhow!(
                "tensor shape {:?} needs {} values, got {}",
                shape,
                expected,
                data.len()
            ));
        }
        Ok(Self { data, shape })
    }
}

struct Prototypes<'a> {
    data: &'a [f32],
    count: usize,
    height: usize,
    width: usize,
}

impl Prototypes<'_> {
    fn at(&self, proto: usize, y: usize, x: usize) -> f32 {
        self.data[(proto * self.height + y) * self.width + x]
    }
}

/// Decoder for one YOLOv8 head layout.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct YoloHead {
    task: ModelTask,
    class_count: usize,
    input_size: u32,
}

impl YoloHead {
    pub fn new(task: ModelTask, class_count: usize, input_size: u32) -> Self {
        Self {
            task,
            class_count,
            input_size,
        }
    }

    pub fn task(&self) -> ModelTask {
        self.task
    }

    /// Turn raw head outputs into suppressed detections in frame pixels.
    ///
    /// The frame is assumed to have been resized (not letterboxed) to the
    /// square model input, so x and y scale independently.
    pub fn decode(
        &self,
        preds: TensorView<'_>,
        protos: Option<TensorView<'_>>,
        frame_size: (u32, u32),
        thresholds: &Thresholds,
    ) -> Result<Vec<Detection>> {
        let (rows, anchors) = match *preds.shape {
            [1, rows, anchors] => (rows, anchors),
            _ => return Err(anyhow!("unexpected output shape {:?}", preds.shape)),
        };
        let nc = self.class_count;
        if nc == 0 || rows < 4 + nc {
            return Err(anyhow!(
                "output shape {:?} too small for {} classes",
                preds.shape,
                nc
            ));
        }
        let prototypes = self.prototypes(rows, protos)?;
        if self.task == ModelTask::Pose && rows != 4 + nc + POSE_KEYPOINTS * 3 {
            return Err(anyhow!(
                "pose output has {} rows, expected {}",
                rows,
                4 + nc + POSE_KEYPOINTS * 3
            ));
        }

        let (frame_w, frame_h) = frame_size;
        let sx = frame_w as f32 / self.input_size as f32;
        let sy = frame_h as f32 / self.input_size as f32;
        let at = |row: usize, anchor: usize| preds.data[row * anchors + anchor];

        let mut candidates = Vec::new();
        let mut coefficients: Vec<Vec<f32>> = Vec::new();
        for a in 0..anchors {
            let mut best_class = 0;
            let mut best_score = f32::NEG_INFINITY;
            for c in 0..nc {
                let score = at(4 + c, a);
                if score > best_score {
                    best_score = score;
                    best_class = c;
                }
            }
            if !best_score.is_finite() || best_score < thresholds.confidence() {
                continue;
            }

            let bbox =
                BoundingBox::from_cxcywh(at(0, a) * sx, at(1, a) * sy, at(2, a) * sx, at(3, a) * sy);
            let mut det = Detection::new(bbox, best_class, coco_label(best_class), best_score);
            match self.task {
                ModelTask::Pose => {
                    det.keypoints = (0..POSE_KEYPOINTS)
                        .map(|k| {
                            let row = 4 + nc + 3 * k;
                            Keypoint {
                                x: at(row, a) * sx,
                                y: at(row + 1, a) * sy,
                                confidence: at(row + 2, a),
                            }
                        })
                        .collect();
                }
                ModelTask::Segment => {
                    let count = prototypes.as_ref().map_or(0, |p| p.count);
                    coefficients.push((0..count).map(|m| at(4 + nc + m, a)).collect());
                }
                ModelTask::Detect => {}
            }
            candidates.push(det);
        }

        let keep = surviving_indices(&candidates, thresholds.overlap());
        let mut slots: Vec<Option<Detection>> = candidates.into_iter().map(Some).collect();
        let mut detections = Vec::with_capacity(keep.len());
        for i in keep {
            let Some(mut det) = slots[i].take() else {
                continue;
            };
            if let (Some(protos), Some(coeffs)) = (&prototypes, coefficients.get(i)) {
                det.mask = instance_mask(protos, coeffs, &det.bbox, frame_size);
            }
            detections.push(det);
        }
        Ok(detections)
    }

    fn prototypes<'a>(
        &self,
        rows: usize,
        protos: Option<TensorView<'a>>,
    ) -> Result<Option<Prototypes<'a>>> {
        if self.task != ModelTask::Segment {
            return Ok(None);
        }
        let protos = protos.ok_or_else(|| anyhow!("segmentation model produced no mask prototypes"))?;
        let (count, height, width) = match *protos.shape {
            [1, count, height, width] if height > 0 && width > 0 => (count, height, width),
            _ => return Err(anyhow!("unexpected prototype shape {:?}", protos.shape)),
        };
        if rows != 4 + self.class_count + count {
            return Err(anyhow!(
                "segmentation output has {} rows, expected {}",
                rows,
                4 + self.class_count + count
            ));
        }
        Ok(Some(Prototypes {
            data: protos.data,
            count,
            height,
            width,
        }))
    }
}

/// Combine prototypes with one instance's coefficients, cropped to its box.
fn instance_mask(
    protos: &Prototypes<'_>,
    coeffs: &[f32],
    bbox: &BoundingBox,
    (frame_w, frame_h): (u32, u32),
) -> Option<Mask> {
    if frame_w == 0 || frame_h == 0 {
        return None;
    }
    let left = bbox.x1.max(0.0).floor() as u32;
    let top = bbox.y1.max(0.0).floor() as u32;
    let right = (bbox.x2.max(0.0).ceil() as u32).min(frame_w);
    let bottom = (bbox.y2.max(0.0).ceil() as u32).min(frame_h);
    if right <= left || bottom <= top {
        return None;
    }

    // prototype cells are shared by many frame pixels
    let mut cells: Vec<Option<bool>> = vec![None; protos.height * protos.width];
    let mut bits = Vec::with_capacity(((right - left) * (bottom - top)) as usize);
    for y in top..bottom {
        let py = proto_index(y, frame_h, protos.height);
        for x in left..right {
            let px = proto_index(x, frame_w, protos.width);
            let cell = &mut cells[py * protos.width + px];
            let inside = *cell.get_or_insert_with(|| {
                let logit: f32 = coeffs
                    .iter()
                    .enumerate()
                    .map(|(m, c)| c * protos.at(m, py, px))
                    .sum();
                sigmoid(logit) > MASK_THRESHOLD
            });
            bits.push(inside);
        }
    }
    Mask::new(left, top, right - left, bottom - top, bits)
}

fn proto_index(pixel: u32, frame_len: u32, proto_len: usize) -> usize {
    let scaled = (pixel as f32 + 0.5) * proto_len as f32 / frame_len as f32;
    (scaled as usize).min(proto_len - 1)
}

fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Output {
        rows: usize,
        anchors: usize,
        data: Vec<f32>,
    }

    impl Output {
        fn new(rows: usize, anchors: usize) -> Self {
            Self {
                rows,
                anchors,
                data: vec![0.0; rows * anchors],
            }
        }

        fn set(&mut self, row: usize, anchor: usize, value: f32) {
            self.data[row * self.anchors + anchor] = value;
        }

        fn boxed(&mut self, anchor: usize, cxcywh: [f32; 4]) {
            for (row, v) in cxcywh.into_iter().enumerate() {
                self.set(row, anchor, v);
            }
        }

        fn shape(&self) -> [usize; 3] {
            [1, self.rows, self.anchors]
        }
    }

    fn thresholds() -> Thresholds {
        Thresholds::new(0.25, 0.45).unwrap()
    }

    #[test]
    fn pose_head_yields_keypoints_in_frame_pixels() {
        let head = YoloHead::new(ModelTask::Pose, 1, 64);
        let mut out = Output::new(4 + 1 + POSE_KEYPOINTS * 3, 2);
        out.boxed(0, [10.0, 10.0, 4.0, 4.0]);
        out.set(4, 0, 0.9);
        for k in 0..POSE_KEYPOINTS {
            out.set(5 + 3 * k, 0, k as f32);
            out.set(6 + 3 * k, 0, k as f32 + 1.0);
            out.set(7 + 3 * k, 0, 0.8);
        }
        out.boxed(1, [40.0, 40.0, 4.0, 4.0]);
        out.set(4, 1, 0.1);

        let shape = out.shape();
        let preds = TensorView::new(&out.data, &shape).unwrap();
        // frame is twice as wide as the model input
        let dets = head.decode(preds, None, (128, 64), &thresholds()).unwrap();

        assert_eq!(dets.len(), 1);
        let det = &dets[0];
        assert_eq!(det.label, "person");
        assert_eq!((det.bbox.x1, det.bbox.y1), (16.0, 8.0));
        assert_eq!(det.keypoints.len(), POSE_KEYPOINTS);
        assert_eq!(
            det.keypoints[3],
            Keypoint {
                x: 6.0,
                y: 4.0,
                confidence: 0.8
            }
        );
        assert!(det.mask.is_none());
    }

    #[test]
    fn pose_head_with_wrong_row_count_is_rejected() {
        let head = YoloHead::new(ModelTask::Pose, 1, 64);
        let out = Output::new(4 + 1 + 10, 1);
        let shape = out.shape();
        let preds = TensorView::new(&out.data, &shape).unwrap();
        assert!(head.decode(preds, None, (64, 64), &thresholds()).is_err());
    }

    #[test]
    fn segment_head_builds_mask_from_surviving_coefficients() {
        // 2 classes, 2 prototypes of 4x4 over an 8x8 input and frame
        let head = YoloHead::new(ModelTask::Segment, 2, 8);
        let mut out = Output::new(4 + 2 + 2, 2);
        out.boxed(0, [4.0, 4.0, 8.0, 8.0]);
        out.set(5, 0, 0.7);
        out.set(6, 0, -1.0);
        out.boxed(1, [4.0, 4.0, 8.0, 8.0]);
        out.set(5, 1, 0.8);
        out.set(6, 1, 1.0);

        // prototype 0 is positive on the left half, prototype 1 is flat
        let mut protos = vec![0.0f32; 2 * 4 * 4];
        for y in 0..4 {
            for x in 0..4 {
                protos[y * 4 + x] = if x < 2 { 5.0 } else { -5.0 };
            }
        }
        let proto_shape = [1, 2, 4, 4];
        let shape = out.shape();
        let preds = TensorView::new(&out.data, &shape).unwrap();
        let protos = TensorView::new(&protos, &proto_shape).unwrap();

        let dets = head
            .decode(preds, Some(protos), (8, 8), &thresholds())
            .unwrap();

        // same class and box: the 0.8 anchor suppresses the 0.7 one
        assert_eq!(dets.len(), 1);
        assert_eq!(dets[0].confidence, 0.8);
        assert_eq!(dets[0].label, coco_label(1));
        let mask = dets[0].mask.as_ref().expect("mask decoded");
        assert!(mask.contains(1, 1));
        assert!(mask.contains(3, 7));
        assert!(!mask.contains(4, 1));
        assert!(!mask.contains(7, 7));
        assert_eq!(mask.area(), 32);
    }

    #[test]
    fn segment_head_needs_prototypes() {
        let head = YoloHead::new(ModelTask::Segment, 2, 8);
        let out = Output::new(4 + 2 + 2, 1);
        let shape = out.shape();
        let preds = TensorView::new(&out.data, &shape).unwrap();
        let err = head.decode(preds, None, (8, 8), &thresholds()).unwrap_err();
        assert!(err.to_string().contains("prototypes"));
    }

    #[test]
    fn detect_head_ignores_trailing_rows_and_low_scores() {
        let head = YoloHead::new(ModelTask::Detect, 2, 10);
        let mut out = Output::new(4 + 2 + 3, 2);
        out.boxed(0, [5.0, 5.0, 2.0, 2.0]);
        out.set(4, 0, 0.2);
        out.set(5, 0, 0.6);
        out.boxed(1, [2.0, 2.0, 2.0, 2.0]);
        out.set(4, 1, 0.2);

        let shape = out.shape();
        let preds = TensorView::new(&out.data, &shape).unwrap();
        let dets = head.decode(preds, None, (10, 10), &thresholds()).unwrap();
        assert_eq!(dets.len(), 1);
        assert_eq!(dets[0].class_id, 1);
        assert!(dets[0].keypoints.is_empty());
    }

    #[test]
    fn mismatched_tensor_length_is_rejected() {
        assert!(TensorView::new(&[0.0; 5], &[1, 2, 3]).is_err());
    }
}
