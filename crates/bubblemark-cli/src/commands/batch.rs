//! The `bubblemark batch` command.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use comfy_table::{Cell, Table};

use bubblemark_core::config::load_config_from;
use bubblemark_core::engine::{
    collect_sheet_inputs, BatchEngine, BatchEngineConfig, BatchReport, ProgressReporter,
    SheetStatus,
};
use bubblemark_core::parser;
use bubblemark_core::policy::StrictnessMode;
use bubblemark_core::results::EvaluationResult;
use bubblemark_core::traits::FixedVersion;

/// Console progress reporter.
struct ConsoleReporter;

impl ProgressReporter for ConsoleReporter {
    fn on_sheet_start(&self, sheet_id: &str) {
        eprintln!("  Starting: {sheet_id}");
    }

    fn on_sheet_complete(&self, sheet_id: &str, result: &EvaluationResult) {
        eprintln!(
            "  Done: {} {}/{} ({} flagged, {}ms)",
            sheet_id,
            result.total_score,
            result.max_score,
            result.flagged_questions.len(),
            result.processing_duration_ms,
        );
    }

    fn on_sheet_error(&self, sheet_id: &str, error: &str) {
        eprintln!("  ERROR: {sheet_id}: {error}");
    }

    fn on_batch_complete(&self, total: usize, completed: usize, failed: usize, elapsed: Duration) {
        eprintln!(
            "\nComplete: {completed}/{total} evaluated, {failed} failed ({:.1}s)",
            elapsed.as_secs_f64()
        );
    }
}

#[allow(clippy::too_many_arguments)]
pub async fn execute(
    images: PathBuf,
    template_path: PathBuf,
    tests_path: PathBuf,
    version: Option<String>,
    mode: Option<StrictnessMode>,
    parallelism: Option<usize>,
    resize: bool,
    output: Option<PathBuf>,
    config_path: Option<PathBuf>,
) -> Result<()> {
    let config = load_config_from(config_path.as_deref())?;
    let parallelism = parallelism.unwrap_or(config.parallelism);
    anyhow::ensure!(parallelism >= 1, "parallelism must be at least 1");

    let template = parser::load_template(&template_path)?;
    let catalog = parser::load_test_catalog(&tests_path)?;
    for w in parser::validate_catalog(&catalog) {
        eprintln!("Warning: {}", w.message);
    }
    for def in &catalog.definitions {
        for w in parser::validate_pairing(&template, def) {
            eprintln!("Warning [{}]: {}", def.id, w.message);
        }
    }
    if let Some(v) = &version {
        anyhow::ensure!(
            catalog.resolve(Some(v)).is_some(),
            "version '{v}' not found. Available: {:?}",
            catalog.versions()
        );
    }

    let sheets = collect_sheet_inputs(&images)?;
    tracing::debug!(count = sheets.len(), dir = %images.display(), "collected sheets");
    anyhow::ensure!(
        !sheets.is_empty(),
        "no sheet images found in {}",
        images.display()
    );

    let engine_config = BatchEngineConfig {
        parallelism,
        sheet_timeout: Duration::from_millis(config.sheet_timeout_ms),
        mode: mode.unwrap_or(config.default_mode),
        options: config.evaluate_options(),
        resize,
    };
    let classifier = Arc::new(FixedVersion(version));
    let engine = BatchEngine::new(classifier, engine_config);

    eprintln!(
        "bubblemark v{}: evaluating {} sheets ({} test version(s))",
        env!("CARGO_PKG_VERSION"),
        sheets.len(),
        catalog.definitions.len()
    );
    eprintln!();

    let report = engine
        .run(sheets, Arc::new(template), Arc::new(catalog), &ConsoleReporter)
        .await?;

    print_summary(&report);

    let output = output.unwrap_or(config.output_dir);
    std::fs::create_dir_all(&output)?;
    let timestamp = report.created_at.format("%Y-%m-%dT%H%M%S");
    let path = output.join(format!("batch-{timestamp}.json"));
    report.save_json(&path)?;
    eprintln!("Results saved to: {}", path.display());

    Ok(())
}

fn print_summary(report: &BatchReport) {
    let mut table = Table::new();
    table.set_header(vec!["Sheet", "Version", "Score", "%", "Confidence", "Flagged"]);

    for sheet in &report.sheets {
        match &sheet.status {
            SheetStatus::Evaluated { result } => {
                table.add_row(vec![
                    Cell::new(&sheet.sheet_id),
                    Cell::new(result.exam_version.as_deref().unwrap_or("-")),
                    Cell::new(format!("{}/{}", result.total_score, result.max_score)),
                    Cell::new(format!("{:.1}%", result.percentage())),
                    Cell::new(format!("{:.1}%", result.overall_confidence * 100.0)),
                    Cell::new(result.flagged_questions.len()),
                ]);
            }
            SheetStatus::Failed { reason, .. } => {
                table.add_row(vec![
                    Cell::new(&sheet.sheet_id),
                    Cell::new("-"),
                    Cell::new("FAILED"),
                    Cell::new("-"),
                    Cell::new("-"),
                    Cell::new(reason),
                ]);
            }
        }
    }

    eprintln!("\n{table}");

    let stats = &report.stats;
    if !stats.per_question.is_empty() {
        let mut items = Table::new();
        items.set_header(vec!["Question", "Correct", "Flagged", "Blank"]);
        for (q, item) in &stats.per_question {
            items.add_row(vec![
                Cell::new(format!("Q{q}")),
                Cell::new(format!("{:.0}%", item.correct_rate * 100.0)),
                Cell::new(format!("{:.0}%", item.flag_rate * 100.0)),
                Cell::new(format!("{:.0}%", item.blank_rate * 100.0)),
            ]);
        }
        eprintln!("{items}");
    }
    eprintln!(
        "Mean score {:.2} (min {}, max {}, sd {:.2}) | mean confidence {:.1}% | flag rate {:.1}%",
        stats.mean_score,
        stats.min_score,
        stats.max_score,
        stats.score_std_dev,
        stats.mean_confidence * 100.0,
        stats.flag_rate * 100.0,
    );
}
