//! Accent (and age group) detection from short speech clips.
//!
//! Pipeline: WAV → mean MFCC vector → tree ensemble → label + confidence.
//! Models are trained offline by [`trainer::Trainer`] and served by
//! [`prediction::PredictionService`].

pub mod batch;
pub mod classifier;
pub mod config;
pub mod cuisine;
pub mod error;
pub mod history;
pub mod load_and_show;
pub mod models;
pub mod prediction;
pub mod process;
pub mod session;
pub mod trainer;

pub use classifier::{ClassifierAdapter, Prediction, PredictionSource};
pub use config::AppConfig;
pub use prediction::{AgePredictor, PredictionService, StubAgePredictor};
pub use process::{FeatureExtractor, FeatureVector};
pub use trainer::Trainer;
