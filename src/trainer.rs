//! Offline training: labelled folders in, model artifact out.
//!
//! Layout of a dataset root:
//!
//! ```text
//! data/
//!   kerala/      clip_01.wav, clip_02.wav, ...
//!   tamil_nadu/  clip_01.wav, ...
//! ```
//!
//! Each immediate subdirectory is one class. Files that fail to decode are
//! skipped; structural problems abort the run.

use std::fs;
use std::path::{Path, PathBuf};

use rayon::prelude::*;
use tracing::{info, warn};

use crate::config::{FeatureConfig, TrainingConfig};
use crate::error::{DatasetError, TrainError};
use crate::load_and_show::{list_wav_files, plot_confusion_matrix};
use crate::models::{evaluate, stratified_sampling, Evaluation, ForestModel};
use crate::process::FeatureExtractor;

/// Feature rows with class indices into `classes`.
#[derive(Debug, Clone, Default)]
pub struct Dataset {
    pub x: Vec<Vec<f64>>,
    pub y: Vec<u32>,
    pub classes: Vec<String>,
    /// Files that could not be decoded.
    pub skipped: Vec<PathBuf>,
}

impl Dataset {
    pub fn class_counts(&self) -> Vec<usize> {
        let mut counts = vec![0; self.classes.len()];
        for &c in &self.y {
            counts[c as usize] += 1;
        }
        counts
    }
}

#[derive(Debug, Clone)]
pub struct TrainingReport {
    pub artifact: PathBuf,
    pub classes: Vec<String>,
    pub n_train: usize,
    pub n_test: usize,
    pub skipped: usize,
    pub evaluation: Evaluation,
}

pub struct Trainer {
    extractor: FeatureExtractor,
    params: TrainingConfig,
    confusion_plot: Option<PathBuf>,
}

impl Trainer {
    pub fn new(features: FeatureConfig, params: TrainingConfig) -> Self {
        Self {
            extractor: FeatureExtractor::new(features),
            params,
            confusion_plot: None,
        }
    }

    /// Also render the held-out confusion matrix to `path` (PNG).
    pub fn with_confusion_plot(mut self, path: impl Into<PathBuf>) -> Self {
        self.confusion_plot = Some(path.into());
        self
    }

    /// Walk `root` and extract one feature row per decodable file.
    pub fn load_dataset(&self, root: &Path) -> Result<Dataset, DatasetError> {
        if !root.is_dir() {
            return Err(DatasetError::MissingRoot(root.to_path_buf()));
        }
        let io_err = |path: &Path| {
            let path = path.to_path_buf();
            move |source| DatasetError::Io { path, source }
        };

        let mut class_dirs: Vec<PathBuf> = fs::read_dir(root)
            .map_err(io_err(root))?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.is_dir())
            .collect();
        class_dirs.sort();

        let mut jobs: Vec<(PathBuf, String)> = Vec::new();
        for dir in &class_dirs {
            let Some(label) = dir.file_name().and_then(|n| n.to_str()) else {
                warn!(path = %dir.display(), "skipping class folder with non-utf8 name");
                continue;
            };
            for file in list_wav_files(dir).map_err(io_err(dir))? {
                jobs.push((file, label.to_string()));
            }
        }
        info!(files = jobs.len(), classes = class_dirs.len(), "extracting features");

        let extracted: Vec<_> = jobs
            .par_iter()
            .map(|(path, label)| (path, label, self.extractor.extract(path)))
            .collect();

        let mut dataset = Dataset::default();
        for (path, label, result) in extracted {
            match result {
                Ok(features) => {
                    let index = match dataset.classes.iter().position(|c| c == label) {
                        Some(i) => i,
                        None => {
                            dataset.classes.push(label.clone());
                            dataset.classes.len() - 1
                        }
                    };
                    dataset.x.push(features.into_vec());
                    dataset.y.push(index as u32);
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "skipping file");
                    dataset.skipped.push(path.clone());
                }
            }
        }

        if dataset.x.is_empty() {
            return Err(DatasetError::Empty(root.to_path_buf()));
        }
        if dataset.classes.len() < 2 {
            return Err(DatasetError::TooFewClasses(dataset.classes.len()));
        }
        for (label, count) in dataset.classes.iter().zip(dataset.class_counts()) {
            if count < 2 {
                return Err(DatasetError::ClassTooSmall {
                    label: label.clone(),
                    count,
                });
            }
        }
        Ok(dataset)
    }

    /// Full run. Re-running replaces the artifact.
    pub fn train(&self, root: &Path, artifact: &Path) -> Result<TrainingReport, TrainError> {
        info!(root = %root.display(), "loading dataset");
        let dataset = self.load_dataset(root)?;

        let split = stratified_sampling(&dataset.x, &dataset.y, self.params.test_size, self.params.seed)?;
        info!(
            train = split.y_train.len(),
            test = split.y_test.len(),
            trees = self.params.n_trees,
            "training ensemble"
        );

        let mut model = ForestModel::fit(
            &split.x_train,
            &split.y_train,
            dataset.classes.clone(),
            self.extractor.config().clone(),
            &self.params,
        )?;

        let y_pred = model.predict(&split.x_test)?;
        let evaluation = evaluate(&split.y_test, &y_pred, &dataset.classes);
        info!(accuracy = evaluation.accuracy, "held-out evaluation");
        model.set_held_out_accuracy(evaluation.accuracy);

        model.save(artifact)?;
        info!(path = %artifact.display(), "model saved");

        if let Some(plot) = &self.confusion_plot {
            plot_confusion_matrix(&evaluation.confusion, &dataset.classes, plot)
                .map_err(|e| TrainError::Plot(e.to_string()))?;
            info!(path = %plot.display(), "confusion matrix saved");
        }

        Ok(TrainingReport {
            artifact: artifact.to_path_buf(),
            classes: dataset.classes,
            n_train: split.y_train.len(),
            n_test: split.y_test.len(),
            skipped: dataset.skipped.len(),
            evaluation,
        })
    }
}
