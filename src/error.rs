use std::path::PathBuf;

use thiserror::Error;

/// Audio could not be turned into samples.
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("decode: failed to open {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: hound::Error,
    },

    #[error("decode: corrupt or unsupported audio in {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: hound::Error,
    },

    #[error("decode: unsupported sample format in {path}: {bits}-bit {format}")]
    UnsupportedFormat {
        path: PathBuf,
        bits: u16,
        format: &'static str,
    },

    #[error("decode: {path} contains no samples")]
    Empty { path: PathBuf },
}

#[derive(Error, Debug)]
pub enum ModelError {
    /// Raised by the loader only. The adapter turns it into a cached "no model" state.
    #[error("model: no artifact at {path}")]
    Unavailable { path: PathBuf },

    #[error("model: io error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("model: corrupt artifact {path}: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("model: expected {expected} features, got {actual}")]
    FeatureMismatch { expected: usize, actual: usize },

    #[error("model: inference failed: {0}")]
    Inference(String),

    #[error("model: fit failed: {0}")]
    Fit(String),
}

impl From<smartcore::error::Failed> for ModelError {
    fn from(e: smartcore::error::Failed) -> Self {
        ModelError::Inference(e.to_string())
    }
}

/// Structural problems with a training set. Always fatal for the run.
#[derive(Error, Debug)]
pub enum DatasetError {
    #[error("dataset: root {0} is not a directory")]
    MissingRoot(PathBuf),

    #[error("dataset: io error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("dataset: no usable samples under {0}")]
    Empty(PathBuf),

    #[error("dataset: need at least 2 classes, found {0}")]
    TooFewClasses(usize),

    #[error("dataset: class {label} has {count} sample(s), need at least 2 to stratify")]
    ClassTooSmall { label: String, count: usize },
}

#[derive(Error, Debug)]
pub enum PredictError {
    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Model(#[from] ModelError),
}

#[derive(Error, Debug)]
pub enum TrainError {
    #[error(transparent)]
    Dataset(#[from] DatasetError),

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error("train: failed to render confusion matrix: {0}")]
    Plot(String),
}

#[derive(Error, Debug)]
pub enum BatchError {
    #[error("batch: no folders to evaluate")]
    NoFolders,

    #[error("batch: failed to write report {path}: {source}")]
    Report {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("config: failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("config: invalid yaml in {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("config: {0}")]
    Invalid(String),
}
