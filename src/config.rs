use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::detect::{ModelCatalog, Thresholds, STUB_MODEL};
use crate::ingest::SourceSpec;

const DEFAULT_SOURCE: &str = "webcam";
const DEFAULT_MODEL: &str = "YOLOv8n";
const DEFAULT_MODELS_DIR: &str = "models";
const DEFAULT_OUT_DIR: &str = "live_detect_out";

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct DemoConfigFile {
    source: Option<String>,
    model: Option<ModelConfigFile>,
    thresholds: Option<ThresholdConfigFile>,
    output: Option<OutputConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct ModelConfigFile {
    id: Option<String>,
    dir: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct ThresholdConfigFile {
    confidence: Option<f32>,
    overlap: Option<f32>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct OutputConfigFile {
    dir: Option<PathBuf>,
    max_frames: Option<u64>,
}

/// Settings for the `live-detect` binary.
///
/// Resolution order: built-in defaults, then the file named by
/// `LIVE_DETECT_CONFIG` (JSON, or TOML when the extension is `.toml`), then
/// `LIVE_DETECT_*` environment variables.
#[derive(Debug, Clone, PartialEq)]
pub struct DemoConfig {
    pub source: SourceSpec,
    pub model: String,
    pub models_dir: PathBuf,
    pub confidence: f32,
    pub overlap: f32,
    pub out_dir: PathBuf,
    pub max_frames: Option<u64>,
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            source: SourceSpec::Camera(0),
            model: DEFAULT_MODEL.to_string(),
            models_dir: PathBuf::from(DEFAULT_MODELS_DIR),
            confidence: Thresholds::DEFAULT_CONFIDENCE,
            overlap: Thresholds::DEFAULT_OVERLAP,
            out_dir: PathBuf::from(DEFAULT_OUT_DIR),
            max_frames: None,
        }
    }
}

impl DemoConfig {
    /// Defaults, then the file named by `LIVE_DETECT_CONFIG`, then `LIVE_DETECT_*`
    /// overrides. Values are not range-checked here so that command-line flags
    /// can still replace them; call `validate` once everything is applied.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("LIVE_DETECT_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) if !path.trim().is_empty() => Some(read_config_file(Path::new(path))?),
            _ => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default())?;
        cfg.apply_env()?;
        Ok(cfg)
    }

    fn from_file(file: DemoConfigFile) -> Result<Self> {
        let source = SourceSpec::parse(file.source.as_deref().unwrap_or(DEFAULT_SOURCE))?;
        let model = file
            .model
            .as_ref()
            .and_then(|model| model.id.clone())
            .unwrap_or_else(|| DEFAULT_MODEL.to_string());
        let models_dir = file
            .model
            .and_then(|model| model.dir)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_MODELS_DIR));
        let confidence = file
            .thresholds
            .as_ref()
            .and_then(|t| t.confidence)
            .unwrap_or(Thresholds::DEFAULT_CONFIDENCE);
        let overlap = file
            .thresholds
            .and_then(|t| t.overlap)
            .unwrap_or(Thresholds::DEFAULT_OVERLAP);
        let out_dir = file
            .output
            .as_ref()
            .and_then(|output| output.dir.clone())
            .unwrap_or_else(|| PathBuf::from(DEFAULT_OUT_DIR));
        let max_frames = file.output.and_then(|output| output.max_frames);
        Ok(Self {
            source,
            model,
            models_dir,
            confidence,
            overlap,
            out_dir,
            max_frames,
        })
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Some(source) = env_value("LIVE_DETECT_SOURCE") {
            self.source = SourceSpec::parse(&source)?;
        }
        if let Some(model) = env_value("LIVE_DETECT_MODEL") {
            self.model = model;
        }
        if let Some(dir) = env_value("LIVE_DETECT_MODELS_DIR") {
            self.models_dir = PathBuf::from(dir);
        }
        if let Some(conf) = env_value("LIVE_DETECT_CONF") {
            self.confidence = conf
                .parse()
                .map_err(|_| anyhow!("LIVE_DETECT_CONF must be a number in [0, 1]"))?;
        }
        if let Some(iou) = env_value("LIVE_DETECT_IOU") {
            self.overlap = iou
                .parse()
                .map_err(|_| anyhow!("LIVE_DETECT_IOU must be a number in [0, 1]"))?;
        }
        if let Some(dir) = env_value("LIVE_DETECT_OUT_DIR") {
            self.out_dir = PathBuf::from(dir);
        }
        if let Some(max) = env_value("LIVE_DETECT_MAX_FRAMES") {
            let max: u64 = max
                .parse()
                .map_err(|_| anyhow!("LIVE_DETECT_MAX_FRAMES must be a positive integer"))?;
            self.max_frames = Some(max);
        }
        Ok(())
    }

    /// Check every field.
    pub fn validate(&self) -> Result<()> {
        self.thresholds()?;
        let catalog = ModelCatalog::new(&self.models_dir);
        if !self.model.trim().eq_ignore_ascii_case(STUB_MODEL) && catalog.lookup(&self.model).is_none()
        {
            return Err(anyhow!(
                "unknown model '{}'; expected one of: {}",
                self.model,
                catalog.ids().join(", ")
            ));
        }
        if self.max_frames == Some(0) {
            return Err(anyhow!("max_frames must be greater than zero"));
        }
        Ok(())
    }

    /// Validated thresholds for a run.
    pub fn thresholds(&self) -> Result<Thresholds> {
        Thresholds::new(self.confidence, self.overlap).context("invalid thresholds")
    }

    pub fn catalog(&self) -> ModelCatalog {
        ModelCatalog::new(&self.models_dir)
    }
}

fn env_value(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .filter(|value| !value.trim().is_empty())
}

fn read_config_file(path: &Path) -> Result<DemoConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let is_toml = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
    let cfg = if is_toml {
        toml::from_str(&raw).map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}
