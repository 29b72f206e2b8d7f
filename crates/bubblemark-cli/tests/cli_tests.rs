//! CLI integration tests using assert_cmd.

mod common;

use predicates::prelude::*;
use tempfile::TempDir;

use common::{bubblemark, write_inputs, write_sheet, PERFECT};

#[test]
fn validate_template_and_test() {
    let dir = TempDir::new().unwrap();
    let (template, test) = write_inputs(dir.path());

    bubblemark(dir.path())
        .arg("validate")
        .arg("--template")
        .arg(&template)
        .arg("--test")
        .arg(&test)
        .assert()
        .success()
        .stdout(predicate::str::contains("4 questions, 16 bubbles, page 300x200"))
        .stdout(predicate::str::contains("Unit Quiz"))
        .stdout(predicate::str::contains("All inputs valid"));
}

#[test]
fn validate_reports_question_count_mismatch() {
    let dir = TempDir::new().unwrap();
    let (template, _) = write_inputs(dir.path());
    let short = dir.path().join("short.toml");
    std::fs::write(
        &short,
        r#"[test]
id = "short"
name = "Short"

[[subjects]]
name = "Math"
questions = 3
answer_key = ["A", "B", "C"]
"#,
    )
    .unwrap();

    bubblemark(dir.path())
        .arg("validate")
        .arg("--template")
        .arg(&template)
        .arg("--test")
        .arg(&short)
        .assert()
        .success()
        .stdout(predicate::str::contains("WARNING"))
        .stdout(predicate::str::contains("evaluation will fail"));
}

#[test]
fn validate_nonexistent_file() {
    let dir = TempDir::new().unwrap();
    bubblemark(dir.path())
        .arg("validate")
        .arg("--template")
        .arg("nonexistent.json")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Error"));
}

#[test]
fn validate_rejects_duplicate_labels() {
    let dir = TempDir::new().unwrap();
    let template = dir.path().join("bad.json");
    std::fs::write(
        &template,
        common::TEMPLATE.replace(r#""q3", "q4""#, r#""q1", "q4""#),
    )
    .unwrap();

    bubblemark(dir.path())
        .arg("validate")
        .arg("--template")
        .arg(&template)
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid template"));
}

#[test]
fn init_creates_files() {
    let dir = TempDir::new().unwrap();

    bubblemark(dir.path())
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("Created bubblemark.toml"))
        .stdout(predicate::str::contains("Created templates/example.json"))
        .stdout(predicate::str::contains("Created tests/example.toml"));

    assert!(dir.path().join("bubblemark.toml").exists());
    assert!(dir.path().join("templates/example.json").exists());
    assert!(dir.path().join("tests/example.toml").exists());
}

#[test]
fn init_skips_existing() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("bubblemark.toml"), "# existing").unwrap();

    bubblemark(dir.path())
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("already exists"));

    let content = std::fs::read_to_string(dir.path().join("bubblemark.toml")).unwrap();
    assert_eq!(content, "# existing");
}

#[test]
fn init_output_validates() {
    let dir = TempDir::new().unwrap();
    bubblemark(dir.path()).arg("init").assert().success();

    bubblemark(dir.path())
        .arg("validate")
        .arg("--template")
        .arg("templates/example.json")
        .arg("--test")
        .arg("tests/example.toml")
        .assert()
        .success()
        .stdout(predicate::str::contains("10 questions"))
        .stdout(predicate::str::contains("All inputs valid"));
}

#[test]
fn template_generated_from_test_validates() {
    let dir = TempDir::new().unwrap();
    write_inputs(dir.path());

    bubblemark(dir.path())
        .arg("template")
        .arg("--test")
        .arg("quiz.toml")
        .assert()
        .success()
        .stdout(predicate::str::contains("4 questions, 16 bubbles, page 260x380"))
        .stdout(predicate::str::contains("templates/quiz.json"));

    bubblemark(dir.path())
        .arg("validate")
        .arg("--template")
        .arg("templates/quiz.json")
        .arg("--test")
        .arg("quiz.toml")
        .assert()
        .success()
        .stdout(predicate::str::contains("All inputs valid"));

    bubblemark(dir.path())
        .arg("template")
        .arg("--test")
        .arg("quiz.toml")
        .assert()
        .failure()
        .stderr(predicate::str::contains("already exists"));

    bubblemark(dir.path())
        .arg("template")
        .arg("--test")
        .arg("quiz.toml")
        .arg("--force")
        .assert()
        .success();
}

#[test]
fn evaluate_rejects_unknown_mode() {
    let dir = TempDir::new().unwrap();
    bubblemark(dir.path())
        .arg("evaluate")
        .arg("--image")
        .arg("a.png")
        .arg("--template")
        .arg("t.json")
        .arg("--test")
        .arg("t.toml")
        .arg("--mode")
        .arg("lenient")
        .assert()
        .failure();
}

#[test]
fn invalid_config_is_reported() {
    let dir = TempDir::new().unwrap();
    let (template, test) = write_inputs(dir.path());
    let sheet = dir.path().join("sheet.png");
    write_sheet(&sheet, PERFECT);
    std::fs::write(dir.path().join("bubblemark.toml"), "flag_threshold = 3.0\n").unwrap();

    bubblemark(dir.path())
        .arg("evaluate")
        .arg("--image")
        .arg(&sheet)
        .arg("--template")
        .arg(&template)
        .arg("--test")
        .arg(&test)
        .assert()
        .failure()
        .stderr(predicate::str::contains("flag_threshold"));
}

#[test]
fn help_lists_commands() {
    let dir = TempDir::new().unwrap();
    bubblemark(dir.path())
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("evaluate"))
        .stdout(predicate::str::contains("batch"))
        .stdout(predicate::str::contains("compare"))
        .stdout(predicate::str::contains("review"))
        .stdout(predicate::str::contains("template"));
}
