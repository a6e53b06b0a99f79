use std::io;
use std::path::PathBuf;

use accent_detector::batch;
use accent_detector::config::{AgeStrategy, AppConfig, Task};
use accent_detector::history::InputSource;
use accent_detector::session::{render_analysis, Session};
use accent_detector::{PredictionService, Trainer};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Detect speaker accent and age group from WAV clips.
#[derive(Parser, Debug)]
#[command(name = "accent-detector")]
#[command(about = "Detect speaker accent and age group from WAV clips")]
struct Args {
    /// YAML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Use the random placeholder instead of the age model
    #[arg(long, global = true)]
    age_stub: bool,

    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print accent and age predictions for one file
    Predict { file: PathBuf },

    /// Full analysis with cuisine suggestions
    Analyze {
        file: PathBuf,
        /// uploaded or recorded
        #[arg(long, default_value = "uploaded")]
        source: InputSource,
        /// Name to show instead of the file name
        #[arg(long)]
        name: Option<String>,
    },

    /// Interactive session on stdin
    Session,

    /// Train a model from a folder of labelled subfolders
    Train {
        dataset: PathBuf,
        /// accent or age; picks the configured artifact
        #[arg(long, default_value = "accent")]
        task: Task,
        /// Artifact path, relative to the application (default: the task's artifact)
        #[arg(short, long)]
        output: Option<PathBuf>,
        #[arg(long)]
        trees: Option<usize>,
        /// Save the held-out confusion matrix as PNG
        #[arg(long)]
        confusion_plot: Option<PathBuf>,
    },

    /// Score the accent model against per-accent folders
    Batch {
        folders: Vec<PathBuf>,
        #[arg(short, long)]
        report: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();

    let default_level = if args.verbose { "accent_detector=debug" } else { "accent_detector=info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(io::stderr)
        .init();

    let mut config = AppConfig::load(args.config.as_deref()).context("loading configuration")?;
    if args.age_stub {
        config.models.age_strategy = AgeStrategy::Stub;
    }

    match args.command {
        Command::Predict { file } => {
            let service = load_service(&config)?;
            let accent = service.infer_accent(&file).context("accent prediction failed")?;
            let age = service.infer_age(&file).context("age prediction failed")?;
            println!("Accent: {}, Confidence: {:.2}%", accent.label, accent.confidence);
            println!("Age Group: {}, Confidence: {:.2}%", age.label, age.confidence);
        }
        Command::Analyze { file, source, name } => {
            let service = load_service(&config)?;
            let mut session = Session::new(&service);
            let analysis = session
                .analyze(&file, source, name.as_deref())
                .with_context(|| format!("could not analyze {}", file.display()))?;
            let shown = name.unwrap_or_else(|| file.display().to_string());
            print!("{}", render_analysis(&shown, &analysis));
        }
        Command::Session => {
            let service = load_service(&config)?;
            let mut session = Session::new(&service);
            session.run(io::stdin().lock(), io::stdout().lock())?;
        }
        Command::Train {
            dataset,
            task,
            output,
            trees,
            confusion_plot,
        } => {
            if let Some(trees) = trees {
                config.training.n_trees = trees;
            }
            let output = config.models.training_output(task, output.as_deref());
            info!(%task, path = %output.display(), "training");
            let mut trainer = Trainer::new(config.features.clone(), config.training.clone());
            if let Some(plot) = confusion_plot {
                trainer = trainer.with_confusion_plot(plot);
            }
            let report = trainer
                .train(&dataset, &output)
                .with_context(|| format!("training on {} failed", dataset.display()))?;

            println!("Training samples: {}, held-out: {}", report.n_train, report.n_test);
            if report.skipped > 0 {
                println!("Skipped {} undecodable file(s)", report.skipped);
            }
            println!("\nDetailed Classification Report:");
            println!("{}", report.evaluation);
            println!("Accuracy: {:.2}%", report.evaluation.accuracy * 100.0);
            println!("Model saved to {}", report.artifact.display());
        }
        Command::Batch { folders, report } => {
            let service = load_service(&config)?;
            let folders = if folders.is_empty() { config.batch.folders.clone() } else { folders };
            let report_path = report.unwrap_or_else(|| config.batch.report.clone());

            let outcome = batch::evaluate(&service, &folders)?;
            outcome.write_to(&report_path)?;
            print!("{outcome}");
            info!(path = %report_path.display(), "report written");
        }
    }

    Ok(())
}

fn load_service(config: &AppConfig) -> Result<PredictionService> {
    PredictionService::from_config(config).context("loading models")
}
