use std::collections::BTreeSet;
use std::fs;
use std::io::Write;
use std::path::Path;

use rand::prelude::*;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use smartcore::linalg::basic::matrix::DenseMatrix;
use smartcore::metrics::accuracy;
use smartcore::tree::decision_tree_classifier::{
    DecisionTreeClassifier, DecisionTreeClassifierParameters,
};
use tracing::debug;

use crate::config::{FeatureConfig, TrainingConfig};
use crate::error::{DatasetError, ModelError};

type Tree = DecisionTreeClassifier<f64, u32, DenseMatrix<f64>, Vec<u32>>;

/// Row-major feature matrix plus class indices, split for training.
#[derive(Debug, Clone, Default)]
pub struct Split {
    pub x_train: Vec<Vec<f64>>,
    pub y_train: Vec<u32>,
    pub x_test: Vec<Vec<f64>>,
    pub y_test: Vec<u32>,
}

/// Per-class stratified split with a fixed seed.
///
/// Classes are visited in sorted order so the same seed always yields the
/// same partition. Every class keeps at least one sample on each side.
pub fn stratified_sampling(
    x: &[Vec<f64>],
    y: &[u32],
    test_size: f64,
    seed: u64,
) -> Result<Split, DatasetError> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut train_indices: Vec<usize> = Vec::new();
    let mut test_indices: Vec<usize> = Vec::new();

    let unique_classes: BTreeSet<u32> = y.iter().copied().collect();

    for class in unique_classes {
        let mut indices: Vec<usize> = y
            .iter()
            .enumerate()
            .filter(|(_, &c)| c == class)
            .map(|(i, _)| i)
            .collect();

        let n_samples = indices.len();
        if n_samples < 2 {
            return Err(DatasetError::ClassTooSmall {
                label: class.to_string(),
                count: n_samples,
            });
        }
        let n_test = ((n_samples as f64 * test_size).round() as usize).clamp(1, n_samples - 1);

        indices.shuffle(&mut rng);
        test_indices.extend_from_slice(&indices[..n_test]);
        train_indices.extend_from_slice(&indices[n_test..]);
    }

    train_indices.shuffle(&mut rng);
    test_indices.shuffle(&mut rng);

    Ok(Split {
        x_train: train_indices.iter().map(|&i| x[i].clone()).collect(),
        y_train: train_indices.iter().map(|&i| y[i]).collect(),
        x_test: test_indices.iter().map(|&i| x[i].clone()).collect(),
        y_test: test_indices.iter().map(|&i| y[i]).collect(),
    })
}

/// Anything that maps a feature row to a class index, optionally with
/// class probabilities.
pub trait Classifier: Send + Sync {
    fn classes(&self) -> &[String];

    fn n_features(&self) -> usize;

    fn predict_index(&self, features: &[f64]) -> Result<usize, ModelError>;

    /// `None` when the model has no probability estimate.
    fn predict_proba(&self, _features: &[f64]) -> Option<Result<Vec<f64>, ModelError>> {
        None
    }

    /// Held-out accuracy recorded at training time, when known.
    fn held_out_accuracy(&self) -> Option<f64> {
        None
    }

    /// Feature scheme the model was fitted on. Inputs must be extracted the
    /// same way.
    fn feature_config(&self) -> Option<&FeatureConfig> {
        None
    }
}

/// Bagged ensemble of decision trees. Class probability is the share of
/// trees voting for that class.
#[derive(Serialize, Deserialize)]
pub struct ForestModel {
    classes: Vec<String>,
    features: FeatureConfig,
    held_out_accuracy: Option<f64>,
    trees: Vec<Tree>,
}

impl ForestModel {
    /// Fit `params.n_trees` trees, each on a per-class bootstrap resample
    /// seeded from `params.seed + i`.
    pub fn fit(
        x: &[Vec<f64>],
        y: &[u32],
        classes: Vec<String>,
        features: FeatureConfig,
        params: &TrainingConfig,
    ) -> Result<Self, ModelError> {
        if x.is_empty() || x.len() != y.len() {
            return Err(ModelError::Fit(format!(
                "{} rows but {} labels",
                x.len(),
                y.len()
            )));
        }
        if let Some(bad) = x.iter().find(|row| row.len() != features.n_mfcc) {
            return Err(ModelError::FeatureMismatch {
                expected: features.n_mfcc,
                actual: bad.len(),
            });
        }

        let mut tree_params = DecisionTreeClassifierParameters::default();
        if let Some(depth) = params.max_depth {
            tree_params = tree_params.with_max_depth(depth);
        }

        // a tree needs at least two classes in its resample, so resampling is
        // done within each class
        let by_class: Vec<Vec<usize>> = y
            .iter()
            .copied()
            .collect::<BTreeSet<u32>>()
            .into_iter()
            .map(|class| (0..y.len()).filter(|&i| y[i] == class).collect())
            .collect();
        if by_class.len() < 2 {
            return Err(ModelError::Fit(format!(
                "need at least 2 classes, got {}",
                by_class.len()
            )));
        }

        let n = x.len();
        let mut trees = Vec::with_capacity(params.n_trees);
        for i in 0..params.n_trees {
            let mut rng = StdRng::seed_from_u64(params.seed.wrapping_add(i as u64));
            let picks: Vec<usize> = by_class
                .iter()
                .flat_map(|members| {
                    (0..members.len())
                        .map(|_| members[rng.gen_range(0..members.len())])
                        .collect::<Vec<_>>()
                })
                .collect();

            let x_boot: Vec<Vec<f64>> = picks.iter().map(|&p| x[p].clone()).collect();
            let y_boot: Vec<u32> = picks.iter().map(|&p| y[p]).collect();
            let x_boot = DenseMatrix::from_2d_vec(&x_boot)
                .map_err(|e| ModelError::Fit(e.to_string()))?;

            let tree = Tree::fit(&x_boot, &y_boot, tree_params.clone())
                .map_err(|e| ModelError::Fit(e.to_string()))?;
            trees.push(tree);
        }
        debug!(trees = trees.len(), rows = n, "fitted ensemble");

        Ok(Self {
            classes,
            features,
            held_out_accuracy: None,
            trees,
        })
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    pub fn set_held_out_accuracy(&mut self, accuracy: f64) {
        self.held_out_accuracy = Some(accuracy);
    }

    /// Vote counts per row, shape `(rows, classes)`.
    fn votes(&self, rows: &[Vec<f64>]) -> Result<Vec<Vec<usize>>, ModelError> {
        for row in rows {
            self.check_len(row)?;
        }
        let x = DenseMatrix::from_2d_vec(&rows.to_vec())?;
        let mut votes = vec![vec![0usize; self.classes.len()]; rows.len()];
        for tree in &self.trees {
            let predicted = tree.predict(&x)?;
            for (row, &class) in predicted.iter().enumerate() {
                let class = class as usize;
                if class >= self.classes.len() {
                    return Err(ModelError::Inference(format!(
                        "tree voted for unknown class {class}"
                    )));
                }
                votes[row][class] += 1;
            }
        }
        Ok(votes)
    }

    fn check_len(&self, row: &[f64]) -> Result<(), ModelError> {
        if row.len() != self.features.n_mfcc {
            return Err(ModelError::FeatureMismatch {
                expected: self.features.n_mfcc,
                actual: row.len(),
            });
        }
        Ok(())
    }

    /// Most voted class per row; ties go to the lower class index.
    pub fn predict(&self, rows: &[Vec<f64>]) -> Result<Vec<u32>, ModelError> {
        Ok(self
            .votes(rows)?
            .iter()
            .map(|counts| argmax(counts) as u32)
            .collect())
    }

    pub fn save(&self, path: &Path) -> Result<(), ModelError> {
        /* write next to the target then rename, so readers never see a partial file */
        let io_err = |source| ModelError::Io {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(io_err)?;
        }
        let json = serde_json::to_vec(self).map_err(|e| ModelError::Fit(e.to_string()))?;

        let tmp = path.with_extension("json.tmp");
        let mut file = fs::File::create(&tmp).map_err(io_err)?;
        file.write_all(&json).map_err(io_err)?;
        file.sync_all().map_err(io_err)?;
        fs::rename(&tmp, path).map_err(io_err)?;
        Ok(())
    }

    /// `ModelError::Unavailable` when nothing exists at `path`.
    pub fn load(path: &Path) -> Result<Self, ModelError> {
        if !path.is_file() {
            return Err(ModelError::Unavailable {
                path: path.to_path_buf(),
            });
        }
        let bytes = fs::read(path).map_err(|source| ModelError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_slice(&bytes).map_err(|source| ModelError::Corrupt {
            path: path.to_path_buf(),
            source,
        })
    }
}

impl Classifier for ForestModel {
    fn classes(&self) -> &[String] {
        &self.classes
    }

    fn n_features(&self) -> usize {
        self.features.n_mfcc
    }

    fn predict_index(&self, features: &[f64]) -> Result<usize, ModelError> {
        let votes = self.votes(&[features.to_vec()])?;
        Ok(argmax(&votes[0]))
    }

    fn predict_proba(&self, features: &[f64]) -> Option<Result<Vec<f64>, ModelError>> {
        let total = self.trees.len().max(1) as f64;
        Some(self.votes(&[features.to_vec()]).map(|votes| {
            votes[0].iter().map(|&v| v as f64 / total).collect()
        }))
    }

    fn held_out_accuracy(&self) -> Option<f64> {
        self.held_out_accuracy
    }

    fn feature_config(&self) -> Option<&FeatureConfig> {
        Some(&self.features)
    }
}

fn argmax(counts: &[usize]) -> usize {
    counts
        .iter()
        .enumerate()
        .fold((0, 0), |best, (i, &c)| if c > best.1 { (i, c) } else { best })
        .0
}

/// Precision, recall and F1 for one class.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassMetrics {
    pub label: String,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub support: usize,
}

/// Held-out evaluation of a fitted model.
#[derive(Debug, Clone, Serialize)]
pub struct Evaluation {
    pub accuracy: f64,
    pub per_class: Vec<ClassMetrics>,
    /// `confusion[true][predicted]`
    pub confusion: Vec<Vec<usize>>,
}

pub fn evaluate(y_true: &[u32], y_pred: &[u32], classes: &[String]) -> Evaluation {
    let n = classes.len();
    let mut confusion = vec![vec![0usize; n]; n];
    for (&t, &p) in y_true.iter().zip(y_pred.iter()) {
        if (t as usize) < n && (p as usize) < n {
            confusion[t as usize][p as usize] += 1;
        }
    }

    let per_class = (0..n)
        .map(|c| {
            let tp = confusion[c][c] as f64;
            let predicted: usize = confusion.iter().map(|row| row[c]).sum();
            let support: usize = confusion[c].iter().sum();
            let precision = ratio(tp, predicted as f64);
            let recall = ratio(tp, support as f64);
            let f1 = ratio(2.0 * precision * recall, precision + recall);
            ClassMetrics {
                label: classes[c].clone(),
                precision,
                recall,
                f1,
                support,
            }
        })
        .collect();

    let accuracy = if y_true.is_empty() {
        0.0
    } else {
        // smartcore's metrics take owned vectors
        accuracy(&y_true.to_vec(), &y_pred.to_vec())
    };

    Evaluation {
        accuracy,
        per_class,
        confusion,
    }
}

fn ratio(num: f64, den: f64) -> f64 {
    if den == 0.0 {
        0.0
    } else {
        num / den
    }
}

impl std::fmt::Display for Evaluation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let width = self
            .per_class
            .iter()
            .map(|m| m.label.len())
            .max()
            .unwrap_or(0)
            .max(12);
        writeln!(
            f,
            "{:>width$} {:>9} {:>9} {:>9} {:>9}",
            "", "precision", "recall", "f1-score", "support"
        )?;
        for m in &self.per_class {
            writeln!(
                f,
                "{:>width$} {:>9.2} {:>9.2} {:>9.2} {:>9}",
                m.label, m.precision, m.recall, m.f1, m.support
            )?;
        }
        let total: usize = self.per_class.iter().map(|m| m.support).sum();
        write!(
            f,
            "{:>width$} {:>9} {:>9} {:>9.2} {:>9}",
            "accuracy", "", "", self.accuracy, total
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::tempdir;

    fn small_features() -> FeatureConfig {
        FeatureConfig {
            n_mfcc: 2,
            ..FeatureConfig::default()
        }
    }

    fn two_blobs() -> (Vec<Vec<f64>>, Vec<u32>) {
        let mut x = Vec::new();
        let mut y = Vec::new();
        for i in 0..10 {
            let jitter = i as f64 * 0.01;
            x.push(vec![0.0 + jitter, 0.0 - jitter]);
            y.push(0);
            x.push(vec![5.0 + jitter, 5.0 - jitter]);
            y.push(1);
        }
        (x, y)
    }

    fn params(n_trees: usize) -> TrainingConfig {
        TrainingConfig {
            n_trees,
            ..TrainingConfig::default()
        }
    }

    #[test]
    fn test_no_duplicates_between_train_and_test() {
        let x: Vec<Vec<f64>> = (0..10).map(|i| vec![i as f64, (i * 2) as f64]).collect();
        let y = vec![0, 1, 0, 1, 0, 1, 0, 1, 0, 1];
        let split = stratified_sampling(&x, &y, 0.2, 42).unwrap();

        assert!(split.x_train.iter().all(|row| !split.x_test.contains(row)));
        assert_eq!(split.x_train.len() + split.x_test.len(), x.len());
    }

    #[test]
    fn test_stratified_sampling_even_distribution() {
        let x: Vec<Vec<f64>> = (0..30).map(|i| vec![i as f64]).collect();
        let y: Vec<u32> = (0..30).map(|i| (i % 3) as u32).collect();
        let split = stratified_sampling(&x, &y, 0.2, 7).unwrap();

        let train_class_counts = count_classes(&split.y_train);
        let test_class_counts = count_classes(&split.y_test);
        for class in 0..3 {
            assert_eq!(train_class_counts[&class], 8, "train count for class {class}");
            assert_eq!(test_class_counts[&class], 2, "test count for class {class}");
        }
    }

    #[test]
    fn test_split_is_reproducible() {
        let (x, y) = two_blobs();
        let a = stratified_sampling(&x, &y, 0.2, 42).unwrap();
        let b = stratified_sampling(&x, &y, 0.2, 42).unwrap();
        assert_eq!(a.x_test, b.x_test);
        assert_eq!(a.y_train, b.y_train);
    }

    #[test]
    fn test_singleton_class_cannot_be_stratified() {
        let x = vec![vec![0.0], vec![1.0], vec![2.0]];
        let y = vec![0, 0, 1];
        let err = stratified_sampling(&x, &y, 0.2, 42).unwrap_err();
        assert!(matches!(err, DatasetError::ClassTooSmall { count: 1, .. }));
    }

    // Helper function to count occurrences of each class in a vector of labels
    fn count_classes(y: &[u32]) -> HashMap<u32, usize> {
        let mut class_counts = HashMap::new();
        for &label in y {
            *class_counts.entry(label).or_insert(0) += 1;
        }
        class_counts
    }

    #[test]
    fn test_forest_separates_blobs() {
        let (x, y) = two_blobs();
        let classes = vec!["low".to_string(), "high".to_string()];
        let model = ForestModel::fit(&x, &y, classes, small_features(), &params(15)).unwrap();

        assert_eq!(model.n_trees(), 15);
        assert_eq!(model.predict(&[vec![0.05, -0.05], vec![5.05, 4.95]]).unwrap(), vec![0, 1]);

        let proba = model.predict_proba(&[5.0, 5.0]).unwrap().unwrap();
        assert_eq!(proba.len(), 2);
        assert!((proba.iter().sum::<f64>() - 1.0).abs() < 1e-9);
        assert!(proba[1] > proba[0]);
    }

    #[test]
    fn test_forest_is_deterministic_for_seed() {
        let (x, y) = two_blobs();
        let classes = vec!["a".to_string(), "b".to_string()];
        let m1 = ForestModel::fit(&x, &y, classes.clone(), small_features(), &params(8)).unwrap();
        let m2 = ForestModel::fit(&x, &y, classes, small_features(), &params(8)).unwrap();
        let probe = [2.4, 2.6];
        assert_eq!(
            m1.predict_proba(&probe).unwrap().unwrap(),
            m2.predict_proba(&probe).unwrap().unwrap()
        );
    }

    #[test]
    fn test_wrong_feature_length_is_rejected() {
        let (x, y) = two_blobs();
        let classes = vec!["a".to_string(), "b".to_string()];
        let model = ForestModel::fit(&x, &y, classes, small_features(), &params(3)).unwrap();
        let err = model.predict_index(&[1.0, 2.0, 3.0]).unwrap_err();
        assert!(matches!(err, ModelError::FeatureMismatch { expected: 2, actual: 3 }));
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("model.json");
        let (x, y) = two_blobs();
        let classes = vec!["a".to_string(), "b".to_string()];
        let mut model = ForestModel::fit(&x, &y, classes, small_features(), &params(5)).unwrap();
        model.set_held_out_accuracy(0.75);
        model.save(&path).unwrap();

        let loaded = ForestModel::load(&path).unwrap();
        assert_eq!(loaded.classes(), model.classes());
        assert_eq!(loaded.feature_config(), Some(&small_features()));
        assert_eq!(loaded.held_out_accuracy(), Some(0.75));
        assert_eq!(loaded.predict(&x).unwrap(), model.predict(&x).unwrap());
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[test]
    fn test_load_missing_is_unavailable() {
        let dir = tempdir().unwrap();
        let err = ForestModel::load(&dir.path().join("none.json")).err().unwrap();
        assert!(matches!(err, ModelError::Unavailable { .. }));
    }

    #[test]
    fn test_load_garbage_is_corrupt() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("model.json");
        fs::write(&path, b"{ not json").unwrap();
        let err = ForestModel::load(&path).err().unwrap();
        assert!(matches!(err, ModelError::Corrupt { .. }));
    }

    #[test]
    fn test_evaluate_metrics() {
        let classes = vec!["a".to_string(), "b".to_string()];
        let y_true = vec![0, 0, 0, 1, 1];
        let y_pred = vec![0, 0, 1, 1, 1];
        let eval = evaluate(&y_true, &y_pred, &classes);

        assert!((eval.accuracy - 0.8).abs() < 1e-9);
        assert!((evaluate(&y_true[..3], &y_pred[..3], &classes).accuracy - 2.0 / 3.0).abs() < 1e-9);
        assert_eq!(eval.confusion, vec![vec![2, 1], vec![0, 2]]);
        let a = &eval.per_class[0];
        assert_eq!(a.precision, 1.0);
        assert!((a.recall - 2.0 / 3.0).abs() < 1e-9);
        assert_eq!(a.support, 3);
        let b = &eval.per_class[1];
        assert!((b.precision - 2.0 / 3.0).abs() < 1e-9);
        assert_eq!(b.recall, 1.0);

        let report = eval.to_string();
        assert!(report.contains("precision"));
        assert!(report.contains("accuracy"));
    }
}
