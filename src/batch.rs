//! Accuracy of the accent model against folders named after accents.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::error::BatchError;
use crate::load_and_show::list_wav_files;
use crate::prediction::AccentPredict;

#[derive(Debug, Clone, PartialEq)]
pub enum FolderOutcome {
    NotFound { folder: PathBuf },
    Scored { accent: String, correct: usize, total: usize },
}

impl FolderOutcome {
    pub fn accuracy(&self) -> Option<f64> {
        match self {
            FolderOutcome::Scored { correct, total, .. } if *total > 0 => {
                Some(*correct as f64 / *total as f64 * 100.0)
            }
            _ => None,
        }
    }
}

impl fmt::Display for FolderOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FolderOutcome::NotFound { folder } => write!(f, "{}: Folder not found", folder.display()),
            FolderOutcome::Scored { accent, correct, total } => write!(
                f,
                "{accent}: {correct}/{total} correct ({:.2}%)",
                self.accuracy().unwrap_or(0.0)
            ),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchReport {
    pub outcomes: Vec<FolderOutcome>,
}

impl BatchReport {
    pub fn write_to(&self, path: &Path) -> Result<(), BatchError> {
        fs::write(path, self.to_string()).map_err(|source| BatchError::Report {
            path: path.to_path_buf(),
            source,
        })
    }
}

impl fmt::Display for BatchReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for outcome in &self.outcomes {
            writeln!(f, "{outcome}")?;
        }
        Ok(())
    }
}

/// Score every folder. A missing folder is reported, not fatal; files that
/// fail to predict are logged and left out of the total.
pub fn evaluate<P: AccentPredict>(predictor: &P, folders: &[PathBuf]) -> Result<BatchReport, BatchError> {
    if folders.is_empty() {
        return Err(BatchError::NoFolders);
    }

    let mut report = BatchReport::default();
    for folder in folders {
        info!(folder = %folder.display(), "checking folder");
        if !folder.is_dir() {
            warn!(folder = %folder.display(), "folder not found");
            report.outcomes.push(FolderOutcome::NotFound {
                folder: folder.clone(),
            });
            continue;
        }

        let accent = folder
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let files = match list_wav_files(folder) {
            Ok(files) => files,
            Err(e) => {
                warn!(folder = %folder.display(), error = %e, "cannot list folder");
                continue;
            }
        };

        let mut correct = 0;
        let mut total = 0;
        for file in files {
            let name = file.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
            match predictor.predict_accent(&file) {
                Ok(prediction) => {
                    total += 1;
                    if prediction.label.to_lowercase() == accent.to_lowercase() {
                        correct += 1;
                    }
                    info!("[{accent}] {name} → {}", prediction.label);
                }
                Err(e) => warn!("[{accent}] {name} → Error: {e}"),
            }
        }

        if total == 0 {
            warn!(folder = %folder.display(), "no usable audio files");
            continue;
        }
        let outcome = FolderOutcome::Scored { accent, correct, total };
        info!("{outcome}");
        report.outcomes.push(outcome);
    }

    Ok(report)
}
