//! Feature extraction + classification per task.
//!
//! The service is built once at startup and only read afterwards. It holds
//! no per-call state, so every call decodes and extracts again. Each model is
//! fed features extracted with the scheme it was trained on; the configured
//! scheme only applies to models that did not record one.

use std::path::Path;
use std::sync::Mutex;

use rand::prelude::*;
use rand::rngs::StdRng;
use serde::Serialize;
use tracing::{debug, warn};

use crate::classifier::{ClassifierAdapter, Prediction, PredictionSource};
use crate::config::{AgeStrategy, AppConfig, Task};
use crate::cuisine;
use crate::error::{ModelError, PredictError};
use crate::process::FeatureExtractor;

pub const AGE_GROUPS: [&str; 3] = ["Young (18-30)", "Adult (31-50)", "Senior (51+)"];

/// Placeholder age predictor. Ignores the audio and picks a bracket at random.
#[derive(Debug)]
pub struct StubAgePredictor {
    rng: Mutex<StdRng>,
}

impl StubAgePredictor {
    pub fn new() -> Self {
        Self {
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    pub fn with_seed(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    /// Confidence is the uniform posterior over the brackets.
    pub fn predict(&self) -> Prediction {
        let mut rng = self.rng.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let label = AGE_GROUPS.choose(&mut *rng).copied().unwrap_or(AGE_GROUPS[0]);
        Prediction {
            label: label.to_string(),
            confidence: 100.0 / AGE_GROUPS.len() as f64,
            source: PredictionSource::Stub,
        }
    }
}

impl Default for StubAgePredictor {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug)]
pub enum AgePredictor {
    Trained(ClassifierAdapter),
    Stub(StubAgePredictor),
}

impl AgePredictor {
    pub fn is_stub(&self) -> bool {
        matches!(self, AgePredictor::Stub(_))
    }
}

/// Both predictions for one clip plus the cuisine suggestions for the accent.
#[derive(Debug, Clone, Serialize)]
pub struct Analysis {
    pub accent: Prediction,
    pub age: Prediction,
    pub cuisines: Vec<&'static str>,
}

/// Anything that can name the accent of a clip. Batch evaluation runs on it.
pub trait AccentPredict {
    fn predict_accent(&self, audio_path: &Path) -> Result<Prediction, PredictError>;
}

#[derive(Debug)]
pub struct PredictionService {
    extractor: FeatureExtractor,
    accent: ClassifierAdapter,
    age: AgePredictor,
}

impl PredictionService {
    pub fn new(extractor: FeatureExtractor, accent: ClassifierAdapter, age: AgePredictor) -> Self {
        Self {
            extractor,
            accent,
            age,
        }
    }

    /// Load both artifacts named by `config`. Missing artifacts are fine,
    /// corrupt ones are not.
    pub fn from_config(config: &AppConfig) -> Result<Self, ModelError> {
        let accent = ClassifierAdapter::load("accent", &config.models.resolved_artifact(Task::Accent))?;
        warn_on_scheme_drift(&accent, config);
        let age = match config.models.age_strategy {
            AgeStrategy::Model => {
                let adapter = ClassifierAdapter::load("age", &config.models.resolved_artifact(Task::Age))?;
                warn_on_scheme_drift(&adapter, config);
                AgePredictor::Trained(adapter)
            }
            AgeStrategy::Stub => AgePredictor::Stub(StubAgePredictor::new()),
        };
        Ok(Self::new(FeatureExtractor::new(config.features.clone()), accent, age))
    }

    pub fn accent_model(&self) -> &ClassifierAdapter {
        &self.accent
    }

    pub fn age_predictor(&self) -> &AgePredictor {
        &self.age
    }

    pub fn infer_accent(&self, audio_path: &Path) -> Result<Prediction, PredictError> {
        infer(&self.extractor, &self.accent, audio_path)
    }

    pub fn infer_age(&self, audio_path: &Path) -> Result<Prediction, PredictError> {
        match &self.age {
            AgePredictor::Trained(adapter) => infer(&self.extractor, adapter, audio_path),
            AgePredictor::Stub(stub) => Ok(stub.predict()),
        }
    }

    pub fn analyze(&self, audio_path: &Path) -> Result<Analysis, PredictError> {
        let accent = self.infer_accent(audio_path)?;
        let age = self.infer_age(audio_path)?;
        let cuisines = cuisine::lookup(&accent.label).map(|d| d.to_vec()).unwrap_or_default();
        Ok(Analysis {
            accent,
            age,
            cuisines,
        })
    }
}

impl AccentPredict for PredictionService {
    fn predict_accent(&self, audio_path: &Path) -> Result<Prediction, PredictError> {
        self.infer_accent(audio_path)
    }
}

fn warn_on_scheme_drift(adapter: &ClassifierAdapter, config: &AppConfig) {
    if let Some(trained) = adapter.extractor().map(|e| e.config()) {
        if trained != &config.features {
            warn!(
                model = adapter.name(),
                trained = ?trained,
                configured = ?config.features,
                "configured features differ from the model's, using the model's"
            );
        }
    }
}

fn infer(
    fallback: &FeatureExtractor,
    adapter: &ClassifierAdapter,
    audio_path: &Path,
) -> Result<Prediction, PredictError> {
    if !adapter.is_available() {
        return Ok(Prediction::unavailable());
    }
    let extractor = adapter.extractor().unwrap_or(fallback);
    let features = extractor.extract(audio_path)?;
    let prediction = adapter.predict_with_confidence(&features)?;
    debug!(
        model = adapter.name(),
        label = %prediction.label,
        confidence = prediction.confidence,
        "prediction"
    );
    Ok(prediction)
}
