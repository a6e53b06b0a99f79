//! Adapter between feature vectors and a trained classifier.
//!
//! The adapter owns at most one model. A missing artifact is detected once,
//! at load time, and turns every later call into the "unavailable" sentinel
//! instead of an error.

use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::ModelError;
use crate::models::{Classifier, ForestModel};
use crate::process::{FeatureExtractor, FeatureVector};

pub const UNAVAILABLE_LABEL: &str = "Model unavailable";

/// Where a prediction came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PredictionSource {
    Model,
    Stub,
    Unavailable,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Prediction {
    pub label: String,
    /// Percentage in `[0, 100]`.
    pub confidence: f64,
    pub source: PredictionSource,
}

impl Prediction {
    pub fn unavailable() -> Self {
        Self {
            label: UNAVAILABLE_LABEL.to_string(),
            confidence: 0.0,
            source: PredictionSource::Unavailable,
        }
    }

    pub fn is_unavailable(&self) -> bool {
        self.source == PredictionSource::Unavailable
    }
}

pub struct ClassifierAdapter {
    name: String,
    model: Option<Box<dyn Classifier>>,
    /// Built from the scheme the model recorded, if it recorded one.
    extractor: Option<FeatureExtractor>,
}

impl std::fmt::Debug for ClassifierAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClassifierAdapter")
            .field("name", &self.name)
            .field("available", &self.is_available())
            .finish()
    }
}

impl ClassifierAdapter {
    pub fn new(name: impl Into<String>, model: Box<dyn Classifier>) -> Self {
        let extractor = model.feature_config().cloned().map(FeatureExtractor::new);
        Self {
            name: name.into(),
            model: Some(model),
            extractor,
        }
    }

    pub fn unavailable(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            model: None,
            extractor: None,
        }
    }

    /// Load an artifact. Missing is not an error; a corrupt file is.
    pub fn load(name: impl Into<String>, path: &Path) -> Result<Self, ModelError> {
        let name = name.into();
        match ForestModel::load(path) {
            Ok(model) => {
                info!(
                    model = %name,
                    path = %path.display(),
                    classes = model.classes().len(),
                    "loaded classifier"
                );
                debug!(model = %name, features = ?model.feature_config(), trees = model.n_trees());
                Ok(Self::new(name, Box::new(model)))
            }
            Err(ModelError::Unavailable { path }) => {
                warn!(model = %name, path = %path.display(), "no artifact, predictions unavailable");
                Ok(Self::unavailable(name))
            }
            Err(e) => Err(e),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_available(&self) -> bool {
        self.model.is_some()
    }

    /// Label set of the loaded model, empty when unavailable.
    pub fn classes(&self) -> &[String] {
        self.model.as_ref().map(|m| m.classes()).unwrap_or(&[])
    }

    pub fn held_out_accuracy(&self) -> Option<f64> {
        self.model.as_ref().and_then(|m| m.held_out_accuracy())
    }

    /// Extractor matching the loaded model's training scheme. `None` when the
    /// model did not record one; callers then use their own.
    pub fn extractor(&self) -> Option<&FeatureExtractor> {
        self.extractor.as_ref()
    }

    pub fn predict(&self, features: &FeatureVector) -> Result<String, ModelError> {
        let Some(model) = &self.model else {
            return Ok(UNAVAILABLE_LABEL.to_string());
        };
        check_len(&**model, features)?;
        let index = model.predict_index(features.as_slice())?;
        label_at(&**model, index)
    }

    /// Confidence is the top class probability as a percentage, or 100 when
    /// the model has no probability estimate.
    pub fn predict_with_confidence(&self, features: &FeatureVector) -> Result<Prediction, ModelError> {
        let Some(model) = &self.model else {
            return Ok(Prediction::unavailable());
        };
        check_len(&**model, features)?;

        let (index, confidence) = match model.predict_proba(features.as_slice()) {
            Some(proba) => {
                let proba = proba?;
                let (index, p) = proba
                    .iter()
                    .copied()
                    .enumerate()
                    .fold((0, f64::NEG_INFINITY), |best, (i, p)| if p > best.1 { (i, p) } else { best });
                (index, p * 100.0)
            }
            None => (model.predict_index(features.as_slice())?, 100.0),
        };

        Ok(Prediction {
            label: label_at(&**model, index)?,
            confidence: confidence.clamp(0.0, 100.0),
            source: PredictionSource::Model,
        })
    }
}

fn check_len(model: &dyn Classifier, features: &FeatureVector) -> Result<(), ModelError> {
    if features.len() != model.n_features() {
        return Err(ModelError::FeatureMismatch {
            expected: model.n_features(),
            actual: features.len(),
        });
    }
    Ok(())
}

fn label_at(model: &dyn Classifier, index: usize) -> Result<String, ModelError> {
    model
        .classes()
        .get(index)
        .cloned()
        .ok_or_else(|| ModelError::Inference(format!("class index {index} out of range")))
}

/// Resolve an artifact path against the application's own location.
///
/// Absolute paths are returned unchanged. Relative paths are tried against
/// the executable's directory and its ancestors (covers `target/<profile>/`),
/// then against the crate directory. The working directory is never used.
pub fn resolve_artifact(relative: &Path) -> PathBuf {
    if relative.is_absolute() {
        return relative.to_path_buf();
    }

    if let Ok(exe) = std::env::current_exe() {
        for base in exe.ancestors().skip(1).take(4) {
            let candidate = base.join(relative);
            if candidate.exists() {
                return candidate;
            }
        }
    }

    Path::new(env!("CARGO_MANIFEST_DIR")).join(relative)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Fixed-answer model without probabilities.
    struct Constant {
        classes: Vec<String>,
        answer: usize,
    }

    impl Classifier for Constant {
        fn classes(&self) -> &[String] {
            &self.classes
        }

        fn n_features(&self) -> usize {
            3
        }

        fn predict_index(&self, _features: &[f64]) -> Result<usize, ModelError> {
            Ok(self.answer)
        }
    }

    /// Model with a fixed probability vector.
    struct Probabilistic(Vec<f64>);

    impl Classifier for Probabilistic {
        fn classes(&self) -> &[String] {
            static CLASSES: std::sync::OnceLock<Vec<String>> = std::sync::OnceLock::new();
            CLASSES.get_or_init(|| vec!["kerala".to_string(), "gujrat".to_string(), "tamil_nadu".to_string()])
        }

        fn n_features(&self) -> usize {
            3
        }

        fn predict_index(&self, _features: &[f64]) -> Result<usize, ModelError> {
            Ok(0)
        }

        fn predict_proba(&self, _features: &[f64]) -> Option<Result<Vec<f64>, ModelError>> {
            Some(Ok(self.0.clone()))
        }
    }

    fn features() -> FeatureVector {
        vec![0.1, 0.2, 0.3].into()
    }

    #[test]
    fn test_unavailable_returns_sentinel() {
        let adapter = ClassifierAdapter::unavailable("accent");
        assert!(!adapter.is_available());
        assert_eq!(adapter.predict(&features()).unwrap(), UNAVAILABLE_LABEL);

        let prediction = adapter.predict_with_confidence(&features()).unwrap();
        assert_eq!(prediction, Prediction::unavailable());
        assert_eq!(prediction.confidence, 0.0);
    }

    #[test]
    fn test_missing_artifact_loads_as_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let adapter = ClassifierAdapter::load("accent", &dir.path().join("missing.json")).unwrap();
        assert!(!adapter.is_available());
        assert!(adapter.classes().is_empty());
    }

    #[test]
    fn test_corrupt_artifact_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.json");
        std::fs::write(&path, b"[1, 2").unwrap();
        assert!(ClassifierAdapter::load("accent", &path).is_err());
    }

    #[test]
    fn test_confidence_is_max_probability_percent() {
        let adapter = ClassifierAdapter::new("accent", Box::new(Probabilistic(vec![0.2, 0.65, 0.15])));
        let prediction = adapter.predict_with_confidence(&features()).unwrap();
        assert_eq!(prediction.label, "gujrat");
        assert!((prediction.confidence - 65.0).abs() < 1e-9);
        assert_eq!(prediction.source, PredictionSource::Model);
    }

    #[test]
    fn test_confidence_without_probabilities_is_full() {
        let model = Constant {
            classes: vec!["young".to_string(), "senior".to_string()],
            answer: 1,
        };
        let adapter = ClassifierAdapter::new("age", Box::new(model));
        let prediction = adapter.predict_with_confidence(&features()).unwrap();
        assert_eq!(prediction.label, "senior");
        assert_eq!(prediction.confidence, 100.0);
        assert_eq!(adapter.predict(&features()).unwrap(), "senior");
    }

    #[test]
    fn test_confidence_always_in_range() {
        for proba in [vec![0.0, 0.0, 0.0], vec![1.0, 0.0, 0.0], vec![0.34, 0.33, 0.33]] {
            let adapter = ClassifierAdapter::new("accent", Box::new(Probabilistic(proba)));
            let c = adapter.predict_with_confidence(&features()).unwrap().confidence;
            assert!((0.0..=100.0).contains(&c));
        }
    }

    #[test]
    fn test_feature_mismatch() {
        let adapter = ClassifierAdapter::new("accent", Box::new(Probabilistic(vec![1.0, 0.0, 0.0])));
        let short: FeatureVector = vec![1.0].into();
        assert!(matches!(
            adapter.predict_with_confidence(&short),
            Err(ModelError::FeatureMismatch { expected: 3, actual: 1 })
        ));
    }

    #[test]
    fn test_out_of_range_index_is_error() {
        let model = Constant {
            classes: vec!["only".to_string()],
            answer: 4,
        };
        let adapter = ClassifierAdapter::new("age", Box::new(model));
        assert!(matches!(adapter.predict(&features()), Err(ModelError::Inference(_))));
    }

    #[test]
    fn test_extractor_follows_recorded_scheme() {
        let adapter = ClassifierAdapter::new("age", Box::new(Probabilistic(vec![1.0, 0.0, 0.0])));
        assert!(adapter.extractor().is_none());
        assert!(ClassifierAdapter::unavailable("age").extractor().is_none());

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.json");
        let features = crate::config::FeatureConfig {
            n_mfcc: 3,
            n_fft: 512,
            hop_length: 128,
            n_mels: 40,
            top_db: 60.0,
        };
        let x: Vec<Vec<f64>> = (0..8).map(|i| vec![i as f64; 3]).collect();
        let y: Vec<u32> = (0..8).map(|i| (i / 4) as u32).collect();
        let params = crate::config::TrainingConfig {
            n_trees: 3,
            ..Default::default()
        };
        let classes = vec!["kerala".to_string(), "gujrat".to_string()];
        ForestModel::fit(&x, &y, classes, features.clone(), &params)
            .unwrap()
            .save(&path)
            .unwrap();

        let adapter = ClassifierAdapter::load("accent", &path).unwrap();
        assert_eq!(adapter.extractor().map(|e| e.config()), Some(&features));
    }

    #[test]
    fn test_resolve_absolute_path_unchanged() {
        let abs = std::env::temp_dir().join("accent_model.json");
        assert_eq!(resolve_artifact(&abs), abs);
    }

    #[test]
    fn test_resolve_relative_path_ignores_cwd() {
        let resolved = resolve_artifact(Path::new("models/does_not_exist.json"));
        assert!(resolved.is_absolute());
        assert!(resolved.starts_with(env!("CARGO_MANIFEST_DIR")));
    }
}
