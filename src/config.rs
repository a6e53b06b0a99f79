//! Application configuration.
//!
//! Stored as YAML. Every section and field is optional; anything left out
//! falls back to the defaults below.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::classifier::resolve_artifact;
use crate::error::ConfigError;

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub models: ModelsConfig,
    pub features: FeatureConfig,
    pub training: TrainingConfig,
    pub batch: BatchConfig,
}

impl AppConfig {
    /// Load from `path`, or return defaults when no path is given.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config = match path {
            Some(path) => {
                let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
                    path: path.to_path_buf(),
                    source,
                })?;
                Self::from_yaml(&text).map_err(|source| ConfigError::Parse {
                    path: path.to_path_buf(),
                    source,
                })?
            }
            None => Self::default(),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml(text: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(text)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let f = &self.features;
        if f.n_mfcc == 0 || f.n_mfcc > f.n_mels {
            return Err(ConfigError::Invalid(format!(
                "n_mfcc must be in 1..={}, got {}",
                f.n_mels, f.n_mfcc
            )));
        }
        if f.n_fft < 2 || f.hop_length == 0 {
            return Err(ConfigError::Invalid(
                "n_fft must be >= 2 and hop_length > 0".to_string(),
            ));
        }
        let t = &self.training;
        if !(t.test_size > 0.0 && t.test_size < 1.0) {
            return Err(ConfigError::Invalid(format!(
                "test_size must be in (0, 1), got {}",
                t.test_size
            )));
        }
        if t.n_trees == 0 {
            return Err(ConfigError::Invalid("n_trees must be > 0".to_string()));
        }
        Ok(())
    }
}

/// Which age predictor the service runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgeStrategy {
    /// Trained artifact; falls back to the unavailable sentinel when missing.
    Model,
    /// Random bracket, ignores the audio.
    Stub,
}

/// Which model an artifact belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Task {
    Accent,
    Age,
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Task::Accent => write!(f, "accent"),
            Task::Age => write!(f, "age"),
        }
    }
}

impl FromStr for Task {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "accent" => Ok(Task::Accent),
            "age" => Ok(Task::Age),
            other => Err(format!("unknown task: {other}")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelsConfig {
    /// Relative paths are resolved against the application location, not the
    /// working directory.
    pub dir: PathBuf,
    pub accent_artifact: String,
    pub age_artifact: String,
    pub age_strategy: AgeStrategy,
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("models"),
            accent_artifact: "accent_model.json".to_string(),
            age_artifact: "age_model.json".to_string(),
            age_strategy: AgeStrategy::Model,
        }
    }
}

impl ModelsConfig {
    /// Configured artifact path for `task`, before resolution.
    pub fn artifact(&self, task: Task) -> PathBuf {
        let name = match task {
            Task::Accent => &self.accent_artifact,
            Task::Age => &self.age_artifact,
        };
        self.dir.join(name)
    }

    /// Where `task`'s artifact is read from and written to.
    pub fn resolved_artifact(&self, task: Task) -> PathBuf {
        resolve_artifact(&self.artifact(task))
    }

    /// Training destination: `output` when given, else `task`'s artifact.
    /// Relative paths resolve the same way serving resolves them.
    pub fn training_output(&self, task: Task, output: Option<&Path>) -> PathBuf {
        match output {
            Some(path) => resolve_artifact(path),
            None => self.resolved_artifact(task),
        }
    }
}

/// MFCC front end parameters. Must match between training and inference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureConfig {
    pub n_mfcc: usize,
    pub n_fft: usize,
    pub hop_length: usize,
    pub n_mels: usize,
    /// Dynamic range kept below the loudest mel bin, in dB.
    pub top_db: f64,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            n_mfcc: 13,
            n_fft: 2048,
            hop_length: 512,
            n_mels: 128,
            top_db: 80.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    pub n_trees: usize,
    /// Fraction of each class held out for evaluation.
    pub test_size: f64,
    pub seed: u64,
    pub max_depth: Option<u16>,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            n_trees: 200,
            test_size: 0.2,
            seed: 42,
            max_depth: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    pub folders: Vec<PathBuf>,
    pub report: PathBuf,
}

impl Default for BatchConfig {
    fn default() -> Self {
        let folders = [
            "gujrat",
            "kerala",
            "tamil",
            "andhra_pradesh",
            "karnataka",
            "jharkhand",
        ]
        .iter()
        .map(|name| Path::new("data").join(name))
        .collect();

        Self {
            folders,
            report: PathBuf::from("results.txt"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.features.n_mfcc, 13);
        assert_eq!(config.training.n_trees, 200);
        assert_eq!(config.training.seed, 42);
        assert_eq!(config.models.age_strategy, AgeStrategy::Model);
        assert_eq!(config.batch.folders.len(), 6);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let yaml = "
models:
  age_strategy: stub
training:
  n_trees: 25
";
        let config = AppConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.models.age_strategy, AgeStrategy::Stub);
        assert_eq!(config.models.accent_artifact, "accent_model.json");
        assert_eq!(config.training.n_trees, 25);
        assert_eq!(config.training.test_size, 0.2);
        assert_eq!(config.features, FeatureConfig::default());
    }

    #[test]
    fn test_invalid_values_rejected() {
        let mut config = AppConfig::default();
        config.training.test_size = 1.0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let mut config = AppConfig::default();
        config.features.n_mfcc = 200;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_load_missing_file_is_error() {
        let err = AppConfig::load(Some(Path::new("/nonexistent/accent.yaml"))).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn test_artifact_per_task() {
        let models = ModelsConfig::default();
        assert_eq!(models.artifact(Task::Accent), Path::new("models/accent_model.json"));
        assert_eq!(models.artifact(Task::Age), Path::new("models/age_model.json"));

        let resolved = models.resolved_artifact(Task::Age);
        assert!(resolved.is_absolute());
        assert!(resolved.ends_with("models/age_model.json"));
    }

    #[test]
    fn test_relative_training_output_ignores_cwd() {
        let models = ModelsConfig::default();
        let out = models.training_output(Task::Age, Some(Path::new("models/age_model.json")));
        assert_eq!(out, models.resolved_artifact(Task::Age));
        assert!(out.starts_with(env!("CARGO_MANIFEST_DIR")));

        let abs = std::env::temp_dir().join("age.json");
        assert_eq!(models.training_output(Task::Age, Some(&abs)), abs);
        assert_eq!(models.training_output(Task::Accent, None), models.resolved_artifact(Task::Accent));
    }

    #[test]
    fn test_task_parse() {
        assert_eq!("Age".parse::<Task>().unwrap(), Task::Age);
        assert_eq!("accent".parse::<Task>().unwrap(), Task::Accent);
        assert!("dialect".parse::<Task>().is_err());
        assert_eq!(Task::Age.to_string(), "age");
    }

    #[test]
    fn test_load_without_path_is_default() {
        let config = AppConfig::load(None).unwrap();
        assert_eq!(config.features, FeatureConfig::default());
    }
}
