//! `upiguard`: train, inspect and run the UPI Guard fraud classifier.

mod display;
mod train;

use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use upiguard_core::ClassificationResult;
use upiguard_ml::{InferenceEngine, ModelArtifact, TrainerVariant, artifact};

use crate::train::Overrides;

const DEFAULT_MODEL: &str = "models/upiguard.arrow";

/// UPI Guard: character n-gram fraud classifier for URLs and UPI payment links.
#[derive(Parser, Debug)]
#[command(name = "upiguard", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Train, calibrate and save a model from labeled datasets.
    Train {
        #[command(flatten)]
        data: DataArgs,

        /// Where to write the model artifact.
        #[arg(long, env = "UPIGUARD_MODEL", default_value = DEFAULT_MODEL)]
        output: PathBuf,

        /// Also write the evaluation report as JSON.
        #[arg(long, env = "UPIGUARD_REPORT")]
        report: Option<PathBuf>,
    },

    /// Classify inputs with a trained model, one JSON line per input.
    Classify {
        #[arg(long, env = "UPIGUARD_MODEL", default_value = DEFAULT_MODEL)]
        model: PathBuf,

        /// Inputs to classify. Read from stdin, one per line, when omitted.
        texts: Vec<String>,
    },

    /// Summarize a model artifact.
    Inspect {
        #[arg(long, env = "UPIGUARD_MODEL", default_value = DEFAULT_MODEL)]
        model: PathBuf,

        /// Number of n-grams to list in each direction.
        #[arg(long, default_value_t = 15)]
        top: usize,
    },

    /// Compare class-weighting strategies on one shared split.
    Compare {
        #[command(flatten)]
        data: DataArgs,
    },
}

#[derive(Args, Debug)]
struct DataArgs {
    /// JSON training config. Missing fields take their defaults.
    #[arg(long, env = "UPIGUARD_CONFIG")]
    config: Option<PathBuf>,

    /// Directory holding the built-in datasets.
    #[arg(long, env = "UPIGUARD_DATA_DIR", default_value = "data")]
    data_dir: PathBuf,

    /// Cap the merged corpus at this many rows.
    #[arg(long, env = "UPIGUARD_MAX_ROWS")]
    max_rows: Option<usize>,

    /// Seed for subsampling, shuffling and the train/eval split.
    #[arg(long, env = "UPIGUARD_SEED")]
    seed: Option<u64>,

    /// Fraud precision the hard threshold must reach.
    #[arg(long, env = "UPIGUARD_TARGET_PRECISION")]
    target_precision: Option<f64>,
}

impl DataArgs {
    fn overrides(&self) -> Overrides {
        Overrides {
            max_rows: self.max_rows,
            seed: self.seed,
            target_precision: self.target_precision,
        }
    }
}

#[derive(Serialize)]
struct ClassifiedLine<'a> {
    input: &'a str,
    #[serde(flatten)]
    result: ClassificationResult,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Train { data, output, report } => {
            let config = train::resolve_config(data.config.as_deref(), &data.overrides())?;
            eprintln!("Training UPI Guard v{}", env!("CARGO_PKG_VERSION"));
            let (run, stats) =
                train::run_training(&config, &data.data_dir, &output, report.as_deref())?;
            display::print_report(&run.report);
            eprintln!(
                "Saved model to {} ({} rows in {:.1}s)",
                output.display(),
                stats.corpus_rows,
                stats.elapsed_secs
            );
        }
        Command::Classify { model, texts } => {
            let engine = InferenceEngine::from(load_artifact(&model)?);
            let stdout = io::stdout();
            let mut out = stdout.lock();
            if texts.is_empty() {
                classify_lines(io::stdin().lock(), &mut out, &engine)?;
            } else {
                for text in &texts {
                    write_classified(&mut out, text, engine.classify(Some(text.as_str())))?;
                }
            }
        }
        Command::Inspect { model, top } => {
            let artifact = load_artifact(&model)?;
            display::print_artifact(&model, &artifact, top);
        }
        Command::Compare { data } => {
            let config = train::resolve_config(data.config.as_deref(), &data.overrides())?;
            let (corpus, _) = train::load_corpus(&config, &data.data_dir)?;
            let variants = TrainerVariant::standard_set(&config.trainer);
            let scores = upiguard_ml::compare(corpus, &config, &variants)
                .context("comparing trainer variants")?;
            display::print_comparison(&scores);
        }
    }
    Ok(())
}

fn load_artifact(path: &Path) -> anyhow::Result<ModelArtifact> {
    let bytes = upiguard_store::read_bytes(path)
        .with_context(|| format!("reading model {}", path.display()))?;
    let artifact = artifact::load(&bytes)
        .with_context(|| format!("loading model {}", path.display()))?;
    tracing::info!(
        path = %path.display(),
        vocabulary = artifact.features().len(),
        trained_at = %artifact.info().trained_at,
        "loaded model"
    );
    Ok(artifact)
}

/// Classify `input` one line at a time. A line that is not valid UTF-8 is
/// reported as `unknown` with its lossy decoding as the echoed input.
fn classify_lines(
    mut input: impl BufRead,
    out: &mut impl Write,
    engine: &InferenceEngine,
) -> anyhow::Result<()> {
    let mut buf = Vec::new();
    loop {
        buf.clear();
        if input.read_until(b'\n', &mut buf).context("reading stdin")? == 0 {
            return Ok(());
        }
        let line = buf.strip_suffix(b"\n").unwrap_or(buf.as_slice());
        let line = line.strip_suffix(b"\r").unwrap_or(line);
        match std::str::from_utf8(line) {
            Ok(text) => write_classified(out, text, engine.classify(Some(text)))?,
            Err(_) => {
                let lossy = String::from_utf8_lossy(line);
                write_classified(out, &lossy, engine.classify(None))?;
            }
        }
    }
}

fn write_classified(
    out: &mut impl Write,
    input: &str,
    result: ClassificationResult,
) -> anyhow::Result<()> {
    let line = ClassifiedLine { input, result };
    serde_json::to_writer(&mut *out, &line).context("encoding result")?;
    writeln!(out).context("writing result")?;
    Ok(())
}
