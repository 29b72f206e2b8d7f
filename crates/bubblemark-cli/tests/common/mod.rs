//! Fixtures shared by the CLI integration tests.
//!
//! Writes a small template, a two-subject answer key and synthetic sheet
//! images into a temp directory.

#![allow(dead_code)]

use std::path::{Path, PathBuf};

use assert_cmd::Command;
use image::{GrayImage, Luma};

pub const TEMPLATE: &str = r#"{
  "pageDimensions": [300, 200],
  "bubbleDimensions": [16, 16],
  "fieldBlocks": [
    {
      "name": "Questions",
      "fieldType": "QTYPE_MCQ4",
      "origin": [40, 40],
      "bubblesGap": 40,
      "labelsGap": 40,
      "fieldLabels": ["q1", "q2", "q3", "q4"]
    }
  ]
}
"#;

pub const TEST_DEF: &str = r#"[test]
id = "quiz"
name = "Unit Quiz"

[[subjects]]
name = "Math"
questions = 2
answer_key = ["A", "B"]

[[subjects]]
name = "Science"
questions = 2
answer_key = ["C", "D"]
"#;

pub fn bubblemark(home: &Path) -> Command {
    #[allow(deprecated)]
    let mut cmd = Command::cargo_bin("bubblemark").unwrap();
    cmd.current_dir(home)
        .env("HOME", home)
        .env_remove("BUBBLEMARK_MODE")
        .env_remove("BUBBLEMARK_PARALLELISM")
        .env_remove("BUBBLEMARK_FLAG_THRESHOLD")
        .env_remove("RUST_LOG");
    cmd
}

/// Write the template and answer key; returns their paths.
pub fn write_inputs(dir: &Path) -> (PathBuf, PathBuf) {
    let template = dir.join("template.json");
    let test = dir.join("quiz.toml");
    std::fs::write(&template, TEMPLATE).unwrap();
    std::fs::write(&test, TEST_DEF).unwrap();
    (template, test)
}

/// Render a sheet with each `(question, choice)` bubble filled solid.
pub fn render_sheet(marks: &[(u32, char)]) -> GrayImage {
    let rows: Vec<(u32, char, u32)> = marks.iter().map(|&(q, ch)| (q, ch, 16)).collect();
    render_rows(&rows)
}

/// Render a sheet filling the top `rows` of each listed 16-row bubble.
pub fn render_rows(marks: &[(u32, char, u32)]) -> GrayImage {
    let mut img = GrayImage::from_pixel(300, 200, Luma([255]));
    for &(q, ch, rows) in marks {
        let col = ch as u32 - 'A' as u32;
        let cx = 40 + col * 40;
        let cy = 40 + (q - 1) * 40;
        for y in cy - 8..cy - 8 + rows {
            for x in cx - 8..cx + 8 {
                img.put_pixel(x, y, Luma([0]));
            }
        }
    }
    img
}

/// Save a rendered sheet as PNG.
pub fn write_sheet(path: &Path, marks: &[(u32, char)]) {
    render_sheet(marks).save(path).unwrap();
}

/// Every answer correct.
pub const PERFECT: &[(u32, char)] = &[(1, 'A'), (2, 'B'), (3, 'C'), (4, 'D')];

/// Q1 correct, Q2 double-marked, Q3 blank, Q4 correct.
pub const MIXED: &[(u32, char)] = &[(1, 'A'), (2, 'A'), (2, 'B'), (4, 'D')];
