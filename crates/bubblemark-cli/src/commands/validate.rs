//! The `bubblemark validate` command.

use std::path::PathBuf;

use anyhow::Result;

use bubblemark_core::parser::{self, ValidationWarning};

fn print_warnings(warnings: &[ValidationWarning]) {
    for w in warnings {
        let prefix = w
            .question_index
            .map(|q| format!("  [Q{q}]"))
            .unwrap_or_else(|| "  ".to_string());
        println!("{prefix} WARNING: {}", w.message);
    }
}

pub fn execute(template_path: PathBuf, test_path: Option<PathBuf>) -> Result<()> {
    let template = parser::load_template(&template_path)?;
    println!(
        "Template: {} questions, {} bubbles, page {}",
        template.question_count(),
        template.bubble_count(),
        template.page_dimensions
    );

    let warnings = parser::validate_template(&template);
    print_warnings(&warnings);
    let mut total_warnings = warnings.len();

    if let Some(path) = test_path {
        let catalog = parser::load_test_catalog(&path)?;
        let warnings = parser::validate_catalog(&catalog);
        print_warnings(&warnings);
        total_warnings += warnings.len();

        for def in &catalog.definitions {
            let version = def
                .version
                .as_deref()
                .map(|v| format!(", version {v}"))
                .unwrap_or_default();
            println!(
                "Test: {} ({} questions, {} subjects{version})",
                def.name,
                def.total_questions(),
                def.subjects.len()
            );
            let warnings = parser::validate_pairing(&template, def);
            print_warnings(&warnings);
            total_warnings += warnings.len();
        }
    }

    if total_warnings == 0 {
        println!("All inputs valid.");
    } else {
        println!("\n{total_warnings} warning(s) found.");
    }

    Ok(())
}
