//! In-memory analysis history for one session.

use std::fmt;

use chrono::{DateTime, Local};
use serde::Serialize;

use crate::classifier::Prediction;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum InputSource {
    Uploaded,
    Recorded,
}

impl fmt::Display for InputSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InputSource::Uploaded => write!(f, "Uploaded"),
            InputSource::Recorded => write!(f, "Recorded"),
        }
    }
}

impl std::str::FromStr for InputSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "uploaded" | "upload" => Ok(InputSource::Uploaded),
            "recorded" | "record" => Ok(InputSource::Recorded),
            other => Err(format!("unknown source: {other}")),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct HistoryEntry {
    pub timestamp: DateTime<Local>,
    pub source: InputSource,
    pub file: String,
    pub accent: String,
    pub accent_confidence: f64,
    pub age_group: String,
    pub age_confidence: f64,
}

impl HistoryEntry {
    pub fn new(source: InputSource, file: impl Into<String>, accent: &Prediction, age: &Prediction) -> Self {
        Self {
            timestamp: Local::now(),
            source,
            file: file.into(),
            accent: accent.label.clone(),
            accent_confidence: accent.confidence,
            age_group: age.label.clone(),
            age_confidence: age.confidence,
        }
    }

    /// `2025-01-31 14:02:11 • Uploaded • clip.wav`
    pub fn title(&self) -> String {
        format!(
            "{} • {} • {}",
            self.timestamp.format("%Y-%m-%d %H:%M:%S"),
            self.source,
            self.file
        )
    }
}

impl fmt::Display for HistoryEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.title())?;
        writeln!(f, "  • Accent: {} (Confidence: {:.2}%)", self.accent, self.accent_confidence)?;
        write!(f, "  • Age Group: {} (Confidence: {:.2}%)", self.age_group, self.age_confidence)
    }
}

/// Append-only log, cleared explicitly.
#[derive(Debug, Default)]
pub struct History {
    entries: Vec<HistoryEntry>,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn log(&mut self, entry: HistoryEntry) {
        self.entries.push(entry);
    }

    /// Oldest first.
    pub fn entries(&self) -> &[HistoryEntry] {
        &self.entries
    }

    /// Newest first, the order they are shown in.
    pub fn recent(&self) -> impl Iterator<Item = &HistoryEntry> {
        self.entries.iter().rev()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
