//! Line-oriented front end: analyse clips, show cuisines and keep history.

use std::io::{self, BufRead, Write};
use std::path::Path;

use tracing::warn;

use crate::classifier::ClassifierAdapter;
use crate::error::PredictError;
use crate::history::{History, HistoryEntry, InputSource};
use crate::prediction::{AgePredictor, Analysis, PredictionService};

const HELP: &str = "\
commands:
  analyze <file.wav> [recorded]   detect accent and age group
  history                         show previous analyses, newest first
  clear                           clear history
  performance                     show model performance
  help                            show this help
  quit                            leave the session";

pub struct Session<'a> {
    service: &'a PredictionService,
    history: History,
}

impl<'a> Session<'a> {
    pub fn new(service: &'a PredictionService) -> Self {
        Self {
            service,
            history: History::new(),
        }
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    pub fn clear_history(&mut self) {
        self.history.clear();
    }

    /// Run both predictions and log the result. `name` is the original file
    /// name when `path` is a temporary copy.
    pub fn analyze(
        &mut self,
        path: &Path,
        source: InputSource,
        name: Option<&str>,
    ) -> Result<Analysis, PredictError> {
        let analysis = self.service.analyze(path)?;
        let file = name.map(str::to_string).unwrap_or_else(|| display_name(path));
        self.history
            .log(HistoryEntry::new(source, file, &analysis.accent, &analysis.age));
        Ok(analysis)
    }

    /// Read commands until `quit` or end of input.
    pub fn run<R: BufRead, W: Write>(&mut self, input: R, mut out: W) -> io::Result<()> {
        writeln!(out, "Accent, Age & Cuisine Detector (type `help` for commands)")?;
        for line in input.lines() {
            let line = line?;
            let line = line.trim();
            let (command, rest) = line.split_once(' ').unwrap_or((line, ""));
            match command {
                "" => continue,
                "quit" | "exit" => break,
                "help" => writeln!(out, "{HELP}")?,
                "history" => write!(out, "{}", render_history(&self.history))?,
                "clear" => {
                    self.clear_history();
                    writeln!(out, "History cleared.")?;
                }
                "performance" => write!(out, "{}", render_performance(self.service))?,
                "analyze" => {
                    let (path, source) = parse_analyze_args(rest);
                    if path.is_empty() {
                        writeln!(out, "usage: analyze <file.wav> [recorded]")?;
                        continue;
                    }
                    match self.analyze(Path::new(path), source, None) {
                        Ok(analysis) => write!(out, "{}", render_analysis(&display_name(Path::new(path)), &analysis))?,
                        Err(e) => {
                            warn!(path, error = %e, "analysis failed");
                            writeln!(out, "Could not analyze {path}: {e}")?;
                        }
                    }
                }
                other => writeln!(out, "unknown command `{other}`, type `help`")?,
            }
        }
        Ok(())
    }
}

fn parse_analyze_args(rest: &str) -> (&str, InputSource) {
    let rest = rest.trim();
    match rest.rsplit_once(' ') {
        Some((path, flag)) => match flag.parse::<InputSource>() {
            Ok(source) => (path.trim(), source),
            Err(_) => (rest, InputSource::Uploaded),
        },
        None => (rest, InputSource::Uploaded),
    }
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

pub fn render_analysis(input: &str, analysis: &Analysis) -> String {
    let mut text = String::new();
    text.push_str("### Analysis result\n");
    text.push_str(&format!("Input: {input}\n"));
    text.push_str(&format!("Detected Accent: {}\n", analysis.accent.label));
    text.push_str(&format!("Accent Confidence: {:.2}%\n", analysis.accent.confidence));
    text.push_str(&format!("Age Group: {}\n", analysis.age.label));
    text.push_str(&format!("Age Confidence: {:.2}%\n", analysis.age.confidence));
    if !analysis.cuisines.is_empty() {
        text.push_str("Famous Cuisines from this Region:\n");
        for dish in &analysis.cuisines {
            text.push_str(&format!("- {dish}\n"));
        }
    }
    text
}

pub fn render_history(history: &History) -> String {
    if history.is_empty() {
        return "No analyses yet. Analyze a file to see entries here.\n".to_string();
    }
    history.recent().map(|entry| format!("{entry}\n")).collect()
}

pub fn render_performance(service: &PredictionService) -> String {
    let age = match service.age_predictor() {
        AgePredictor::Trained(adapter) => model_status(adapter),
        AgePredictor::Stub(_) => "Random assignment (placeholder)".to_string(),
    };
    format!(
        "Accent Model Accuracy: {}\nAge Prediction: {}\n",
        model_status(service.accent_model()),
        age
    )
}

fn model_status(adapter: &ClassifierAdapter) -> String {
    if !adapter.is_available() {
        return "unavailable (no model artifact)".to_string();
    }
    match adapter.held_out_accuracy() {
        Some(acc) => format!("{:.2}%", acc * 100.0),
        None => "unknown".to_string(),
    }
}
