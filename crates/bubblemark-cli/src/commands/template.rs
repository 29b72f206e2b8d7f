//! The `bubblemark template` command.

use std::path::PathBuf;

use anyhow::Result;

use bubblemark_core::model::{Template, TemplateLayout};
use bubblemark_core::parser;

pub fn execute(test_path: PathBuf, output: Option<PathBuf>, force: bool) -> Result<()> {
    let test = parser::parse_test_definition(&test_path)?;
    let template = Template::from_test_definition(&test, &TemplateLayout::default())?;

    let path = output.unwrap_or_else(|| PathBuf::from(format!("templates/{}.json", test.id)));
    anyhow::ensure!(
        force || !path.exists(),
        "{} already exists; pass --force to replace it",
        path.display()
    );
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    parser::save_template(&template, &path)?;

    println!(
        "Template: {} questions, {} bubbles, page {}",
        template.question_count(),
        template.bubble_count(),
        template.page_dimensions
    );
    for block in &template.field_blocks {
        println!(
            "  {:<20} {} x{}",
            block.name,
            block.field_type,
            block.field_labels.len()
        );
    }
    println!("Saved to: {}", path.display());
    Ok(())
}
