//! The `bubblemark compare` command.

use std::path::PathBuf;

use anyhow::Result;

use bubblemark_core::results::EvaluationResult;

fn choice_str(choice: Option<bubblemark_core::model::Choice>) -> String {
    choice.map_or_else(|| "-".to_string(), |c| c.to_string())
}

pub fn execute(
    baseline_path: PathBuf,
    current_path: PathBuf,
    format: String,
    fail_on_change: bool,
) -> Result<()> {
    let baseline = EvaluationResult::load_json(&baseline_path)?;
    let current = EvaluationResult::load_json(&current_path)?;

    if baseline.test_id != current.test_id {
        eprintln!(
            "Warning: comparing results of different tests ('{}' vs '{}')",
            baseline.test_id, current.test_id
        );
    }

    let diff = current.compare(&baseline);

    match format.as_str() {
        "markdown" | "md" => {
            println!("{}", diff.to_markdown());
        }
        "json" => {
            println!("{}", serde_json::to_string_pretty(&diff)?);
        }
        _ => {
            // text format
            println!(
                "Comparison: {} changed, {} unchanged; score {} -> {} ({:+})",
                diff.changes.len(),
                diff.unchanged,
                diff.baseline_score,
                diff.current_score,
                diff.score_delta
            );
            if diff.baseline_mode != diff.current_mode {
                println!("Mode: {} -> {}", diff.baseline_mode, diff.current_mode);
            }

            if !diff.changes.is_empty() {
                println!("\nChanged questions:");
                for c in &diff.changes {
                    println!(
                        "  Q{}: {} {} -> {} {} ({:.0}% -> {:.0}%)",
                        c.question_index,
                        c.baseline_status,
                        choice_str(c.baseline_choice),
                        c.current_status,
                        choice_str(c.current_choice),
                        c.baseline_confidence * 100.0,
                        c.current_confidence * 100.0
                    );
                }
            }

            if !diff.newly_flagged.is_empty() {
                println!("\nNewly flagged: {:?}", diff.newly_flagged);
            }
            if !diff.cleared_flags.is_empty() {
                println!("Cleared flags: {:?}", diff.cleared_flags);
            }
            if diff.new_questions > 0 {
                println!("\n{} new question(s)", diff.new_questions);
            }
            if diff.removed_questions > 0 {
                println!("{} removed question(s)", diff.removed_questions);
            }
        }
    }

    if fail_on_change && diff.has_changes() {
        std::process::exit(1);
    }

    Ok(())
}
