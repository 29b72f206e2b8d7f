//! The `bubblemark review` command.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use bubblemark_core::config::load_config_from;
use bubblemark_core::model::Choice;
use bubblemark_core::parser;
use bubblemark_core::report::AnswerOverride;
use bubblemark_core::results::EvaluationResult;

/// Parse `Q=CHOICE` or `Q=blank`.
fn parse_override(arg: &str) -> Result<AnswerOverride> {
    let (question, answer) = arg
        .split_once('=')
        .with_context(|| format!("expected QUESTION=CHOICE, got '{arg}'"))?;
    let question_index: usize = question
        .trim()
        .trim_start_matches(['Q', 'q'])
        .parse()
        .with_context(|| format!("invalid question number in '{arg}'"))?;
    let answer = answer.trim();
    let choice = if answer.eq_ignore_ascii_case("blank") || answer == "-" {
        None
    } else {
        Some(
            answer
                .parse::<Choice>()
                .map_err(|e| anyhow::anyhow!(e))
                .with_context(|| format!("invalid choice in '{arg}'"))?,
        )
    };
    Ok(AnswerOverride {
        question_index,
        choice,
        note: None,
    })
}

/// `scans/bob.json` -> `scans/bob.reviewed.json`.
fn reviewed_path(result_path: &Path) -> PathBuf {
    let stem = result_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "result".to_string());
    result_path.with_file_name(format!("{stem}.reviewed.json"))
}

fn same_file(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}

pub fn execute(
    result_path: PathBuf,
    test_path: PathBuf,
    overrides: Vec<String>,
    note: Option<String>,
    output: Option<PathBuf>,
    config_path: Option<PathBuf>,
) -> Result<()> {
    let config = load_config_from(config_path.as_deref())?;
    let path = output.unwrap_or_else(|| reviewed_path(&result_path));
    anyhow::ensure!(
        !same_file(&path, &result_path),
        "refusing to overwrite the evaluated result {}; choose another --output",
        result_path.display()
    );
    let overrides = overrides
        .iter()
        .map(|s| {
            parse_override(s).map(|o| AnswerOverride {
                note: note.clone(),
                ..o
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let original = EvaluationResult::load_json(&result_path)?;
    let test = parser::parse_test_definition(&test_path)?;
    let corrected = original.with_overrides(&overrides, &test, &config.scoring_options())?;

    let diff = corrected.compare(&original);
    println!(
        "Applied {} correction(s); score {} -> {} ({:+}), flagged {} -> {}",
        overrides.len(),
        original.total_score,
        corrected.total_score,
        diff.score_delta,
        original.flagged_questions.len(),
        corrected.flagged_questions.len()
    );

    corrected.save_json(&path)?;
    eprintln!("Corrected result saved to: {}", path.display());
    Ok(())
}
