#![cfg(feature = "backend-tract")]

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use image::imageops::{resize, FilterType};
use tract_onnx::prelude::*;

use crate::detect::backend::Detector;
use crate::detect::catalog::ModelTask;
use crate::detect::result::DetectionResult;
use crate::detect::thresholds::Thresholds;
use crate::detect::yolo::{TensorView, YoloHead};
use crate::frame::Frame;

/// YOLOv8 ONNX export run through tract.
///
/// The frame is resized (no letterbox) to the square model input, scaled to
/// `[0, 1]` and laid out NCHW. Outputs are decoded by `YoloHead`: boxes for every
/// task, keypoints for pose exports, and masks from the second output for
/// segmentation exports.
pub struct TractBackend {
    name: String,
    model: SimplePlan<TypedFact, Box<dyn TypedOp>>,
    input_size: u32,
    head: YoloHead,
    input_buffer: Option<Vec<f32>>,
}

impl TractBackend {
    /// Load an ONNX model from disk and prepare it for inference.
    pub fn new<P: AsRef<Path>>(model_path: P, input_size: u32, task: ModelTask) -> Result<Self> {
        let model_path = model_path.as_ref();
        let class_count = task.class_count();
        if input_size == 0 || class_count == 0 {
            return Err(anyhow!("model input size and class count must be non-zero"));
        }
        let side = input_size as usize;
        let model = tract_onnx::onnx()
            .model_for_path(model_path)
            .with_context(|| format!("failed to load ONNX model from {}", model_path.display()))?
            .with_input_fact(
                0,
                InferenceFact::dt_shape(f32::datum_type(), tvec!(1, 3, side, side)),
            )
            .context("failed to set input fact")?
            .into_optimized()
            .context("failed to optimize ONNX model")?
            .into_runnable()
            .context("failed to build runnable ONNX model")?;

        let name = model_path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "tract".to_string());
        log::info!(
            "TractBackend: loaded {} (input {}x{}, {:?}, {} classes)",
            model_path.display(),
            input_size,
            input_size,
            task,
            class_count
        );

        Ok(Self {
            name,
            model,
            input_size,
            head: YoloHead::new(task, class_count, input_size),
            input_buffer: None,
        })
    }

    fn build_input(&mut self, frame: &Frame) -> Result<Tensor> {
        let side = self.input_size as usize;
        let rgb = frame.to_rgb_image()?;
        let resized = resize(&rgb, self.input_size, self.input_size, FilterType::Triangle);

        let plane = side * side;
        let buffer = self.input_buffer.get_or_insert_with(Vec::new);
        buffer.clear();
        buffer.resize(3 * plane, 0.0);
        for (i, px) in resized.pixels().enumerate() {
            buffer[i] = px[0] as f32 / 255.0;
            buffer[plane + i] = px[1] as f32 / 255.0;
            buffer[2 * plane + i] = px[2] as f32 / 255.0;
        }

        Tensor::from_shape(&[1, 3, side, side], buffer.as_slice()).context("build input tensor")
    }
}

impl Detector for TractBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn infer(&mut self, frame: &Frame, thresholds: &Thresholds) -> Result<DetectionResult> {
        let input = self.build_input(frame)?;
        let outputs = self
            .model
            .run(tvec!(input.into()))
            .context("ONNX inference failed")?;
        let preds = outputs
            .first()
            .ok_or_else(|| anyhow!("model produced no outputs"))?;
        let preds = TensorView::new(
            preds.as_slice::<f32>().context("model output tensor was not f32")?,
            preds.shape(),
        )?;
        let protos = match (self.head.task(), outputs.get(1)) {
            (ModelTask::Segment, Some(protos)) => Some(TensorView::new(
                protos
                    .as_slice::<f32>()
                    .context("prototype tensor was not f32")?,
                protos.shape(),
            )?),
            _ => None,
        };
        let detections =
            self.head
                .decode(preds, protos, (frame.width(), frame.height()), thresholds)?;
        Ok(DetectionResult::new(frame.width(), frame.height(), detections))
    }

    fn release_resources(&mut self) {
        if self.input_buffer.take().is_some() {
            log::debug!("TractBackend: released input buffer for {}", self.name);
        }
    }
}
