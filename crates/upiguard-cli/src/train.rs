//! Training pipeline: read sources, train and calibrate, write the artifact.

use std::path::Path;
use std::time::Instant;

use anyhow::Context;
use upiguard_core::SourceSpec;
use upiguard_ml::{
    Corpus, CorpusOptions, SourceReport, TrainConfig, TrainingRun, artifact, build_corpus,
};

pub struct TrainStats {
    pub corpus_rows: usize,
    pub elapsed_secs: f64,
}

/// Command-line values that win over the config file.
#[derive(Debug, Default)]
pub struct Overrides {
    pub max_rows: Option<usize>,
    pub seed: Option<u64>,
    pub target_precision: Option<f64>,
}

/// Read the optional JSON config and apply overrides on top.
pub fn resolve_config(
    path: Option<&Path>,
    overrides: &Overrides,
) -> anyhow::Result<TrainConfig> {
    let mut config = match path {
        Some(path) => {
            let bytes = upiguard_store::read_bytes(path)
                .with_context(|| format!("reading config {}", path.display()))?;
            serde_json::from_slice(&bytes)
                .with_context(|| format!("parsing config {}", path.display()))?
        }
        None => TrainConfig::default(),
    };
    if let Some(max_rows) = overrides.max_rows {
        config.max_rows = Some(max_rows);
    }
    if let Some(seed) = overrides.seed {
        config.seed = seed;
    }
    if let Some(target) = overrides.target_precision {
        config.calibration.target_precision = target;
    }
    config.validate().context("validating training config")?;
    Ok(config)
}

/// Merge the configured sources, or the built-in ones under `data_dir`.
pub fn load_corpus(
    config: &TrainConfig,
    data_dir: &Path,
) -> anyhow::Result<(Corpus, Vec<SourceReport>)> {
    let specs = if config.sources.is_empty() {
        SourceSpec::builtin(data_dir)
    } else {
        config.sources.clone()
    };
    let options = CorpusOptions {
        max_rows: config.max_rows,
        seed: config.seed,
    };
    let (corpus, reports) = build_corpus(&specs, options, upiguard_store::load_records)
        .context("building corpus")?;

    for report in &reports {
        if report.is_loaded() {
            eprintln!("  {:<24} {:>9} rows ({})", report.name, report.kept, report.labels);
        } else {
            eprintln!("  {:<24} skipped", report.name);
        }
    }
    eprintln!("  Merged {} rows ({})", corpus.len(), corpus.label_counts());
    Ok((corpus, reports))
}

/// Run the full training pipeline: sources → corpus → model → artifact file.
pub fn run_training(
    config: &TrainConfig,
    data_dir: &Path,
    output: &Path,
    report_path: Option<&Path>,
) -> anyhow::Result<(TrainingRun, TrainStats)> {
    let start = Instant::now();

    let (corpus, reports) = load_corpus(config, data_dir)?;
    let corpus_rows = corpus.len();

    eprintln!("  Training on {corpus_rows} rows...");
    let run = upiguard_ml::train(corpus, reports, config).context("training model")?;

    let bytes = artifact::save(&run.artifact).context("encoding model artifact")?;
    upiguard_store::write_atomic(output, &bytes)
        .with_context(|| format!("writing model {}", output.display()))?;

    if let Some(path) = report_path {
        let json = serde_json::to_vec_pretty(&run.report).context("encoding report")?;
        upiguard_store::write_atomic(path, &json)
            .with_context(|| format!("writing report {}", path.display()))?;
        eprintln!("  Wrote report to {}", path.display());
    }

    let elapsed_secs = start.elapsed().as_secs_f64();
    let stats = TrainStats {
        corpus_rows,
        elapsed_secs,
    };
    Ok((run, stats))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn overrides_win_over_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("train.json");
        std::fs::write(&path, r#"{"seed": 1, "max_rows": 500}"#).unwrap();

        let overrides = Overrides {
            seed: Some(9),
            target_precision: Some(0.95),
            ..Overrides::default()
        };
        let config = resolve_config(Some(&path), &overrides).unwrap();
        assert_eq!(config.seed, 9);
        assert_eq!(config.max_rows, Some(500));
        assert_eq!(config.calibration.target_precision, 0.95);
    }

    #[test]
    fn invalid_override_is_rejected() {
        let overrides = Overrides {
            target_precision: Some(1.5),
            ..Overrides::default()
        };
        assert!(resolve_config(None, &overrides).is_err());
    }

    #[test]
    fn trains_from_csv_sources() {
        let dir = TempDir::new().unwrap();
        let mut csv = String::from("url,label\n");
        for i in 0..20 {
            let (claim, amount) = (i % 3, i % 4 + 1);
            let fraud = format!(
                "http://kyc-reward-claim{claim}.example/verify?otp=1,malicious\n"
            );
            let genuine = format!("https://paytm.com/recharge?amount={amount}00,benign\n");
            csv.push_str(&fraud);
            csv.push_str(&genuine);
        }
        std::fs::write(dir.path().join("balanced_urls.csv"), csv).unwrap();

        let output = dir.path().join("models").join("model.arrow");
        let report = dir.path().join("report.json");
        let config = TrainConfig::default();
        let (run, stats) = run_training(&config, dir.path(), &output, Some(&report)).unwrap();

        assert_eq!(stats.corpus_rows, 40);
        let sources = &run.report.sources;
        assert_eq!(sources.iter().filter(|r| r.is_loaded()).count(), 1);
        let loaded = artifact::load(&std::fs::read(&output).unwrap()).unwrap();
        assert_eq!(loaded.thresholds(), run.artifact.thresholds());
        let report_bytes = std::fs::read(&report).unwrap();
        let json: serde_json::Value = serde_json::from_slice(&report_bytes).unwrap();
        assert_eq!(json["eval_rows"], 4);
    }
}
