//! Terminal rendering for training reports, artifacts and comparisons.
//!
//! Output is grouped into titled sections with a fixed-width key column,
//! written to stdout so it can be captured separately from logs.

use std::path::Path;

use upiguard_ml::{
    CalibrationStatus, ClassMetrics, EvaluationReport, ModelArtifact, OperatingPoint, SourceStatus,
    VariantScore,
};

const MAX_TEXT: usize = 64;
const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S UTC";

// ── Public API ──

/// Print a training run's evaluation report.
pub fn print_report(report: &EvaluationReport) {
    println!("=== UPI Guard training report ===");
    println!("{}", report.trained_at.format(TIME_FORMAT));
    println!();

    section("Corpus");
    field("train rows", report.train_rows);
    field("eval rows", report.eval_rows);
    field("vocabulary", report.vocabulary_size);
    field("labels (all)", report.corpus_labels);
    field("labels (train)", report.train_labels);
    field("labels (eval)", report.eval_labels);
    println!();

    if !report.sources.is_empty() {
        section("Sources");
        for source in &report.sources {
            let status = match &source.status {
                SourceStatus::Loaded => format!(
                    "kept {} dropped {} ({})",
                    source.kept, source.dropped, source.labels
                ),
                SourceStatus::Skipped { reason } => format!("skipped: {reason}"),
            };
            field(&source.name, status);
        }
        println!();
    }

    let calibration = &report.calibration;
    section("Calibration");
    let target = calibration.target_precision;
    field("target precision", format!("{target:.4}"));
    let status = match calibration.status {
        CalibrationStatus::Met => "met".to_string(),
        CalibrationStatus::Degraded { best_precision } => {
            format!("DEGRADED (best precision {best_precision:.4})")
        }
    };
    field("status", status);
    field("hard threshold", point_summary(&calibration.hard_point));
    field("soft threshold", point_summary(&calibration.soft_point));
    println!();

    section("At hard threshold");
    println!(
        "  {:<26} {:>9} {:>9} {:>9} {:>9}",
        "class", "precision", "recall", "f1", "support"
    );
    for metrics in &report.classes {
        class_row(metrics);
    }
    let hard = &calibration.hard_point;
    let confusion = format!(
        "[{} {}; {} {}]",
        hard.true_positives, hard.false_positives, hard.false_negatives, hard.true_negatives
    );
    field("confusion [tp fp; fn tn]", confusion);
    println!();

    if !report.reference_points.is_empty() {
        section("Reference thresholds");
        for point in &report.reference_points {
            field(&format!("{:.2}", point.threshold), point_summary(point));
        }
        println!();
    }

    section("Eval tiers");
    field("fraud", report.tiers.fraud);
    field("suspicious", report.tiers.suspicious);
    field("genuine", report.tiers.genuine);
    println!();

    if !report.sanity.is_empty() {
        section("Sample predictions");
        for check in &report.sanity {
            let probability = check
                .result
                .fraud_probability
                .map(|p| format!("{p:.4}"))
                .unwrap_or_else(|| "-".to_string());
            let text = truncate(&check.text);
            let prediction = check.result.prediction;
            println!("  {text:<66} {prediction:<10} {probability}");
        }
        println!();
    }
}

/// Print a summary of a model artifact and its strongest n-grams.
pub fn print_artifact(path: &Path, artifact: &ModelArtifact, top: usize) {
    let info = artifact.info();
    let (min_n, max_n) = artifact.features().ngram_range();

    println!("=== {} ===", path.display());
    println!();

    section("Artifact");
    field("format version", info.format_version);
    field("trained at", info.trained_at.format(TIME_FORMAT));
    field("train rows", info.train_rows);
    field("eval rows", info.eval_rows);
    field("seed", info.seed);
    println!();

    section("Model");
    field("vocabulary", artifact.features().len());
    field("n-gram range", format!("{min_n}..={max_n}"));
    let order: Vec<&str> = artifact.class_order().iter().map(|l| l.as_str()).collect();
    field("class order", order.join(", "));
    field("bias", format!("{:.6}", artifact.model().bias()));
    println!();

    section("Thresholds");
    field("hard", format!("{:.6}", artifact.thresholds().hard()));
    field("soft", format!("{:.6}", artifact.thresholds().soft()));
    field("target precision", format!("{:.4}", info.target_precision));
    let calibration = if info.calibration_degraded {
        "degraded"
    } else {
        "met"
    };
    field("calibration", calibration);
    println!();

    let (fraud, genuine) = artifact.top_ngrams(top);
    print_ngrams("Towards fraud", &fraud);
    print_ngrams("Towards genuine", &genuine);
}

/// Print one row per trainer variant.
pub fn print_comparison(scores: &[VariantScore]) {
    section("Trainer variants at threshold 0.50");
    println!(
        "  {:<14} {:>9} {:>9} {:>9} {:>9} {:>9}",
        "variant", "precision", "recall", "f1", "g-recall", "accuracy"
    );
    for score in scores {
        println!(
            "  {:<14} {:>9.4} {:>9.4} {:>9.4} {:>9.4} {:>9.4}",
            score.name,
            score.fraud.precision,
            score.fraud.recall,
            score.fraud.f1,
            score.genuine.recall,
            score.accuracy
        );
    }
}

// ── Rendering helpers ──

fn section(header: &str) {
    println!("{header}");
}

fn field(key: &str, value: impl std::fmt::Display) {
    println!("  {key:<26} {value}");
}

fn class_row(m: &ClassMetrics) {
    println!(
        "  {:<26} {:>9.4} {:>9.4} {:>9.4} {:>9}",
        m.label.as_str(),
        m.precision,
        m.recall,
        m.f1,
        m.support
    );
}

fn point_summary(point: &OperatingPoint) -> String {
    format!(
        "t={:.4} precision={:.4} recall={:.4}",
        point.threshold, point.precision, point.recall
    )
}

fn print_ngrams(header: &str, ngrams: &[(&str, f64)]) {
    if ngrams.is_empty() {
        return;
    }
    section(header);
    for (gram, weight) in ngrams {
        println!("  {:<26} {weight:+.4}", format!("{gram:?}"));
    }
    println!();
}

fn truncate(text: &str) -> String {
    if text.chars().count() <= MAX_TEXT {
        return text.to_string();
    }
    let mut out: String = text.chars().take(MAX_TEXT - 1).collect();
    out.push('…');
    out
}
