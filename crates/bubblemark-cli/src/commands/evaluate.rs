//! The `bubblemark evaluate` command.

use std::path::PathBuf;

use anyhow::{Context, Result};
use comfy_table::{Cell, Table};

use bubblemark_core::config::load_config_from;
use bubblemark_core::evaluation::evaluate;
use bubblemark_core::model::TestDefinition;
use bubblemark_core::parser;
use bubblemark_core::policy::StrictnessMode;
use bubblemark_core::results::EvaluationResult;
use bubblemark_core::sheet::{load_sheet, normalize_to_page, SheetImage};
use bubblemark_core::traits::{AmbiguityExplainer, StatusExplainer};

#[allow(clippy::too_many_arguments)]
pub async fn execute(
    image_path: PathBuf,
    template_path: PathBuf,
    test_path: PathBuf,
    mode: Option<StrictnessMode>,
    resize: bool,
    flag_threshold: Option<f64>,
    output: Option<PathBuf>,
    details: bool,
    explain: bool,
    config_path: Option<PathBuf>,
) -> Result<()> {
    let config = load_config_from(config_path.as_deref())?;
    let mode = mode.unwrap_or(config.default_mode);
    let mut options = config.evaluate_options();
    if let Some(threshold) = flag_threshold {
        anyhow::ensure!(
            (0.0..=1.0).contains(&threshold),
            "flag threshold must be between 0.0 and 1.0"
        );
        options.scoring.flag_threshold = threshold;
    }

    let template = parser::load_template(&template_path)?;
    let test = parser::parse_test_definition(&test_path)?;
    for w in parser::validate_pairing(&template, &test) {
        eprintln!("Warning: {}", w.message);
    }

    tracing::debug!(%mode, image = %image_path.display(), "evaluating sheet");
    let mut img = load_sheet(&image_path)?;
    if resize {
        img = normalize_to_page(&img, template.page_dimensions);
    }

    let result = evaluate(
        &SheetImage::from_gray(&img),
        &template,
        &test,
        mode,
        &options,
    )
    .with_context(|| format!("failed to evaluate {}", image_path.display()))?;

    print_summary(&result, &test);
    if details {
        println!("\n{}", result.to_text_report(&test));
    }

    if explain {
        let explainer = StatusExplainer {
            flag_threshold: options.scoring.flag_threshold,
        };
        let explanations = explainer.explain(&result).await?;
        if explanations.is_empty() {
            println!("\nNo questions need review.");
        } else {
            println!("\nNeeds review ({}):", explainer.name());
            for e in &explanations {
                println!("  Q{}: {}", e.question_index, e.text);
            }
        }
    }

    let output = output.unwrap_or(config.output_dir);
    std::fs::create_dir_all(&output)
        .with_context(|| format!("failed to create output directory: {}", output.display()))?;
    let stem = image_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "sheet".to_string());
    let path = output.join(format!("{stem}.json"));
    result.save_json(&path)?;
    eprintln!("Result saved to: {}", path.display());

    Ok(())
}

fn print_summary(result: &EvaluationResult, test: &TestDefinition) {
    let mut table = Table::new();
    table.set_header(vec!["Subject", "Score", "Questions"]);

    for subject in &test.subjects {
        let earned = result
            .subject_scores
            .get(&subject.name)
            .copied()
            .unwrap_or(0);
        table.add_row(vec![
            Cell::new(&subject.name),
            Cell::new(earned),
            Cell::new(subject.question_count),
        ]);
    }
    table.add_row(vec![
        Cell::new("Total"),
        Cell::new(result.total_score),
        Cell::new(result.max_score),
    ]);

    println!("{table}");
    println!(
        "Score: {}/{} ({:.1}%)  mode {}  confidence {:.1}%",
        result.total_score,
        result.max_score,
        result.percentage(),
        result.mode,
        result.overall_confidence * 100.0
    );
    if result.flagged_questions.is_empty() {
        println!("Flagged: none");
    } else {
        let list: Vec<String> = result
            .flagged_questions
            .iter()
            .map(|q| format!("Q{q}"))
            .collect();
        println!("Flagged: {}", list.join(", "));
    }
}
