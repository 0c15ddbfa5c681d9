use std::path::{Path, PathBuf};

use anyhow::{anyhow, Result};

use super::backend::Detector;
use super::backends::StubBackend;

/// Identifier of the built-in synthetic detector.
pub const STUB_MODEL: &str = "stub";

/// Square input side used by the YOLOv8 exports.
pub const DEFAULT_INPUT_SIZE: u32 = 640;

/// What a YOLOv8 variant was trained for; decides how its outputs are decoded.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ModelTask {
    Detect,
    Segment,
    Pose,
}

impl ModelTask {
    /// Number of class-score rows in the model output.
    pub fn class_count(self) -> usize {
        match self {
            ModelTask::Detect | ModelTask::Segment => 80,
            ModelTask::Pose => 1,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ModelInfo {
    pub id: &'static str,
    pub task: ModelTask,
}

const fn model(id: &'static str, task: ModelTask) -> ModelInfo {
    ModelInfo { id, task }
}

/// YOLOv8 variants offered for selection.
pub const YOLO_MODELS: [ModelInfo; 15] = [
    model("YOLOv8n", ModelTask::Detect),
    model("YOLOv8s", ModelTask::Detect),
    model("YOLOv8m", ModelTask::Detect),
    model("YOLOv8l", ModelTask::Detect),
    model("YOLOv8x", ModelTask::Detect),
    model("YOLOv8n-Seg", ModelTask::Segment),
    model("YOLOv8s-Seg", ModelTask::Segment),
    model("YOLOv8m-Seg", ModelTask::Segment),
    model("YOLOv8l-Seg", ModelTask::Segment),
    model("YOLOv8x-Seg", ModelTask::Segment),
    model("YOLOv8n-Pose", ModelTask::Pose),
    model("YOLOv8s-Pose", ModelTask::Pose),
    model("YOLOv8m-Pose", ModelTask::Pose),
    model("YOLOv8l-Pose", ModelTask::Pose),
    model("YOLOv8x-Pose", ModelTask::Pose),
];

/// Maps model identifiers to detectors.
///
/// YOLO identifiers resolve to `<models_dir>/<id lowercased>.onnx`, loaded with
/// the tract backend (feature `backend-tract`). `stub` always resolves to
/// `StubBackend`.
#[derive(Clone, Debug)]
pub struct ModelCatalog {
    models_dir: PathBuf,
    input_size: u32,
}

impl ModelCatalog {
    pub fn new(models_dir: impl Into<PathBuf>) -> Self {
        Self {
            models_dir: models_dir.into(),
            input_size: DEFAULT_INPUT_SIZE,
        }
    }

    pub fn with_input_size(mut self, input_size: u32) -> Self {
        self.input_size = input_size;
        self
    }

    pub fn models_dir(&self) -> &Path {
        &self.models_dir
    }

    /// All selectable identifiers, YOLO variants first.
    pub fn ids(&self) -> Vec<&'static str> {
        YOLO_MODELS
            .iter()
            .map(|m| m.id)
            .chain(std::iter::once(STUB_MODEL))
            .collect()
    }

    /// Case-insensitive lookup of a YOLO identifier.
    pub fn lookup(&self, id: &str) -> Option<&'static ModelInfo> {
        YOLO_MODELS.iter().find(|m| m.id.eq_ignore_ascii_case(id.trim()))
    }

    /// Expected weights file for a YOLO identifier.
    pub fn weights_path(&self, id: &str) -> Result<PathBuf> {
        let info = self
            .lookup(id)
            .ok_or_else(|| unknown_model(id, &self.ids()))?;
        Ok(self
            .models_dir
            .join(format!("{}.onnx", info.id.to_ascii_lowercase())))
    }

    /// Build the detector for `id`.
    pub fn resolve(&self, id: &str) -> Result<Box<dyn Detector>> {
        if id.trim().eq_ignore_ascii_case(STUB_MODEL) {
            log::info!("ModelCatalog: using stub detector");
            return Ok(Box::new(StubBackend::new()));
        }
        let info = self
            .lookup(id)
            .ok_or_else(|| unknown_model(id, &self.ids()))?;
        let path = self.weights_path(info.id)?;
        if !path.is_file() {
            return Err(anyhow!(
                "model weights for {} not found at {}",
                info.id,
                path.display()
            ));
        }
        self.load(info, &path)
    }

    #[cfg(feature = "backend-tract")]
    fn load(&self, info: &ModelInfo, path: &Path) -> Result<Box<dyn Detector>> {
        use super::backends::TractBackend;

        let backend = TractBackend::new(path, self.input_size, info.task)?;
        Ok(Box::new(backend))
    }

    #[cfg(not(feature = "backend-tract"))]
    fn load(&self, info: &ModelInfo, path: &Path) -> Result<Box<dyn Detector>> {
        Err(anyhow!(
            "{} ({}) needs ONNX inference; rebuild with the backend-tract feature",
            info.id,
            path.display()
        ))
    }
}

fn unknown_model(id: &str, known: &[&str]) -> anyhow::Error {
    anyhow!("unknown model '{}'; expected one of: {}", id, known.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lists_every_variant_plus_stub() {
        let catalog = ModelCatalog::new("models");
        let ids = catalog.ids();
        assert_eq!(ids.len(), 16);
        assert_eq!(ids[0], "YOLOv8n");
        assert!(ids.contains(&"YOLOv8x-Pose"));
        assert_eq!(ids.last(), Some(&STUB_MODEL));
    }

    #[test]
    fn weights_path_is_lowercased() {
        let catalog = ModelCatalog::new("/opt/models");
        assert_eq!(
            catalog.weights_path("YOLOv8s-Seg").unwrap(),
            PathBuf::from("/opt/models/yolov8s-seg.onnx")
        );
        assert_eq!(
            catalog.weights_path("yolov8n").unwrap(),
            PathBuf::from("/opt/models/yolov8n.onnx")
        );
    }

    #[test]
    fn stub_resolves_without_weights() {
        let detector = ModelCatalog::new("/nonexistent").resolve("stub").unwrap();
        assert_eq!(detector.name(), "stub");
    }

    #[test]
    fn unknown_model_is_descriptive() {
        let err = ModelCatalog::new("models").resolve("resnet50").err().unwrap();
        let msg = err.to_string();
        assert!(msg.contains("unknown model 'resnet50'"));
        assert!(msg.contains("YOLOv8n"));
    }

    #[test]
    fn missing_weights_are_reported() {
        let dir = tempfile::tempdir().unwrap();
        let err = ModelCatalog::new(dir.path()).resolve("YOLOv8n").err().unwrap();
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn pose_models_score_one_class() {
        let catalog = ModelCatalog::new("models");
        assert_eq!(catalog.lookup("YOLOv8m-Pose").unwrap().task.class_count(), 1);
        assert_eq!(catalog.lookup("YOLOv8m").unwrap().task, ModelTask::Detect);
    }
}
