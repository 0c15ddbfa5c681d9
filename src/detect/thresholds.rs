use thiserror::Error;

/// Confidence and overlap-suppression thresholds for one run.
///
/// Both values lie in `[0, 1]`. Fields are private: a run takes its thresholds by
/// value at start and nothing can change them while it is active.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Thresholds {
    confidence: f32,
    overlap: f32,
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ThresholdError {
    #[error("{name} threshold must be within [0, 1], got {value}")]
    OutOfRange { name: &'static str, value: f32 },
}

impl Thresholds {
    pub const DEFAULT_CONFIDENCE: f32 = 0.25;
    pub const DEFAULT_OVERLAP: f32 = 0.45;

    /// Validate both values. Out-of-range and NaN values are rejected.
    pub fn new(confidence: f32, overlap: f32) -> Result<Self, ThresholdError> {
        Ok(Self {
            confidence: check("confidence", confidence)?,
            overlap: check("overlap", overlap)?,
        })
    }

    /// Clamp both values into `[0, 1]`, the way a slider would. NaN falls back to
    /// the default.
    pub fn clamped(confidence: f32, overlap: f32) -> Self {
        Self {
            confidence: clamp_unit(confidence, Self::DEFAULT_CONFIDENCE),
            overlap: clamp_unit(overlap, Self::DEFAULT_OVERLAP),
        }
    }

    /// Minimum score a detection needs to be kept.
    pub fn confidence(&self) -> f32 {
        self.confidence
    }

    /// IoU above which a lower-scoring box of the same class is suppressed.
    pub fn overlap(&self) -> f32 {
        self.overlap
    }
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            confidence: Self::DEFAULT_CONFIDENCE,
            overlap: Self::DEFAULT_OVERLAP,
        }
    }
}

fn check(name: &'static str, value: f32) -> Result<f32, ThresholdError> {
    if (0.0..=1.0).contains(&value) {
        Ok(value)
    } else {
        Err(ThresholdError::OutOfRange { name, value })
    }
}

fn clamp_unit(value: f32, fallback: f32) -> f32 {
    if value.is_nan() {
        fallback
    } else {
        value.clamp(0.0, 1.0)
    }
}
