//! The `bubblemark init` command.

use std::path::Path;

use anyhow::{Context, Result};

fn write_if_missing(path: &str, contents: &str) -> Result<()> {
    let path = Path::new(path);
    if path.exists() {
        println!("{} already exists, skipping.", path.display());
        return Ok(());
    }
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, contents).with_context(|| format!("failed to write {}", path.display()))?;
    println!("Created {}", path.display());
    Ok(())
}

pub fn execute() -> Result<()> {
    write_if_missing("bubblemark.toml", SAMPLE_CONFIG)?;
    write_if_missing("templates/example.json", EXAMPLE_TEMPLATE)?;
    write_if_missing("tests/example.toml", EXAMPLE_TEST)?;

    println!("\nNext steps:");
    println!("  1. Adjust templates/example.json to your printed sheet");
    println!("  2. Run: bubblemark validate --template templates/example.json --test tests/example.toml");
    println!("  3. Run: bubblemark evaluate --image scan.png --template templates/example.json --test tests/example.toml");

    Ok(())
}

const SAMPLE_CONFIG: &str = r#"# bubblemark configuration

# easy | moderate | strict
default_mode = "moderate"

# Questions read with less confidence than this are flagged for review.
flag_threshold = 0.5
target_flag_rate = 0.05

parallelism = 4
sheet_timeout_ms = 10000
output_dir = "./bubblemark-results"

# "otsu", or a fixed gray level: threshold = { fixed = 128 }
threshold = "otsu"
"#;

const EXAMPLE_TEMPLATE: &str = r#"{
  "pageDimensions": [600, 400],
  "bubbleDimensions": [20, 20],
  "fieldBlocks": [
    {
      "name": "Mathematics",
      "fieldType": "QTYPE_MCQ4",
      "origin": [80, 60],
      "bubblesGap": 40,
      "labelsGap": 50,
      "fieldLabels": ["q1", "q2", "q3", "q4", "q5"]
    },
    {
      "name": "Science",
      "fieldType": "QTYPE_MCQ4",
      "origin": [340, 60],
      "bubblesGap": 40,
      "labelsGap": 50,
      "fieldLabels": ["q6", "q7", "q8", "q9", "q10"]
    }
  ]
}
"#;

const EXAMPLE_TEST: &str = r#"[test]
id = "example"
name = "Example Quiz"

[[subjects]]
name = "Mathematics"
questions = 5
answer_key = ["A", "C", "B", "D", "A"]

[[subjects]]
name = "Science"
questions = 5
answer_key = ["B", "B", "D", "C", "A"]
"#;
