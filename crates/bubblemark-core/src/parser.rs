//! Template (JSON) and test definition (TOML) loading.
//!
//! Loads templates and answer keys from files and directories, and checks
//! them against each other.

use std::collections::HashSet;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::grid::map_bubbles;
use crate::model::{Choice, Subject, Template, TestCatalog, TestDefinition};

/// Load and validate a template JSON file.
pub fn load_template(path: &Path) -> Result<Template> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read template file: {}", path.display()))?;
    parse_template_str(&content, path)
}

/// Parse a template from a JSON string.
pub fn parse_template_str(content: &str, source_path: &Path) -> Result<Template> {
    let template: Template = serde_json::from_str(content)
        .with_context(|| format!("failed to parse template JSON: {}", source_path.display()))?;
    map_bubbles(&template)
        .with_context(|| format!("invalid template: {}", source_path.display()))?;
    Ok(template)
}

/// Write a template as pretty-printed JSON.
pub fn save_template(template: &Template, path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(template).context("failed to serialize template")?;
    std::fs::write(path, json)
        .with_context(|| format!("failed to write template: {}", path.display()))?;
    Ok(())
}

/// Intermediate TOML structure for test definition files.
#[derive(Debug, Serialize, Deserialize)]
struct TomlTestFile {
    test: TomlTestHeader,
    #[serde(default)]
    subjects: Vec<TomlSubject>,
}

#[derive(Debug, Serialize, Deserialize)]
struct TomlTestHeader {
    id: String,
    name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    version: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct TomlSubject {
    name: String,
    questions: usize,
    answer_key: Vec<Choice>,
}

/// Parse a single TOML file into a `TestDefinition`.
pub fn parse_test_definition(path: &Path) -> Result<TestDefinition> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read test definition: {}", path.display()))?;

    parse_test_definition_str(&content, path)
}

/// Parse a TOML string into a `TestDefinition`.
pub fn parse_test_definition_str(content: &str, source_path: &Path) -> Result<TestDefinition> {
    let parsed: TomlTestFile = toml::from_str(content)
        .with_context(|| format!("failed to parse TOML: {}", source_path.display()))?;

    let subjects = parsed
        .subjects
        .into_iter()
        .map(|s| Subject {
            name: s.name,
            question_count: s.questions,
            answer_key: s.answer_key,
        })
        .collect();

    let mut def = TestDefinition::new(parsed.test.id, parsed.test.name, subjects)
        .with_context(|| format!("invalid test definition: {}", source_path.display()))?;
    def.version = parsed.test.version;
    Ok(def)
}

/// Render a test definition in the TOML file format.
pub fn test_definition_to_toml(def: &TestDefinition) -> Result<String> {
    let file = TomlTestFile {
        test: TomlTestHeader {
            id: def.id.clone(),
            name: def.name.clone(),
            version: def.version.clone(),
        },
        subjects: def
            .subjects
            .iter()
            .map(|s| TomlSubject {
                name: s.name.clone(),
                questions: s.question_count,
                answer_key: s.answer_key.clone(),
            })
            .collect(),
    };
    toml::to_string_pretty(&file).context("failed to serialize test definition")
}

/// Load a catalog from a single file or every `.toml` file in a directory.
///
/// Unparseable files in a directory are skipped with a warning.
pub fn load_test_catalog(path: &Path) -> Result<TestCatalog> {
    if path.is_file() {
        return Ok(TestCatalog::new(vec![parse_test_definition(path)?]));
    }
    if !path.is_dir() {
        anyhow::bail!("not a file or directory: {}", path.display());
    }

    let mut entries: Vec<_> = std::fs::read_dir(path)
        .with_context(|| format!("failed to read directory: {}", path.display()))?
        .collect::<std::io::Result<Vec<_>>>()?
        .into_iter()
        .map(|e| e.path())
        .filter(|p| p.extension().is_some_and(|ext| ext == "toml"))
        .collect();
    entries.sort();

    let mut definitions = Vec::new();
    for file in entries {
        match parse_test_definition(&file) {
            Ok(def) => definitions.push(def),
            Err(e) => tracing::warn!("skipping {}: {:#}", file.display(), e),
        }
    }

    if definitions.is_empty() {
        anyhow::bail!("no test definitions found in {}", path.display());
    }
    Ok(TestCatalog::new(definitions))
}

/// A warning from template/test validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationWarning {
    /// The question index (if applicable).
    pub question_index: Option<usize>,
    /// Warning message.
    pub message: String,
}

impl ValidationWarning {
    fn sheet(message: impl Into<String>) -> Self {
        Self {
            question_index: None,
            message: message.into(),
        }
    }
}

/// Check a valid template for layouts that will read poorly.
pub fn validate_template(template: &Template) -> Vec<ValidationWarning> {
    let mut warnings = Vec::new();
    let bubble = template.bubble_dimensions;

    for block in &template.field_blocks {
        let (along_choices, along_labels) = match block.direction() {
            crate::model::Direction::Horizontal => (bubble.width, bubble.height),
            crate::model::Direction::Vertical => (bubble.height, bubble.width),
        };
        if block.choices_per_question() > 1 && block.bubbles_gap.abs() < along_choices as f64 {
            warnings.push(ValidationWarning::sheet(format!(
                "block '{}': bubbles_gap {} is smaller than the bubble size; masks overlap",
                block.name, block.bubbles_gap
            )));
        }
        if block.field_labels.len() > 1 && block.labels_gap.abs() < along_labels as f64 {
            warnings.push(ValidationWarning::sheet(format!(
                "block '{}': labels_gap {} is smaller than the bubble size; masks overlap",
                block.name, block.labels_gap
            )));
        }
    }

    // Centres are on the page, but masks may still cross the edge.
    if let Ok(positions) = map_bubbles(template) {
        let page = template.page_dimensions;
        let mut reported = HashSet::new();
        for pos in &positions {
            let x0 = (pos.center_x - bubble.width as f64 / 2.0).round();
            let y0 = (pos.center_y - bubble.height as f64 / 2.0).round();
            let fits = x0 >= 0.0
                && y0 >= 0.0
                && x0 + bubble.width as f64 <= page.width as f64
                && y0 + bubble.height as f64 <= page.height as f64;
            if !fits && reported.insert(pos.question_index) {
                warnings.push(ValidationWarning {
                    question_index: Some(pos.question_index),
                    message: format!(
                        "bubble {} of '{}' crosses the page edge and will always be flagged",
                        pos.choice, pos.label
                    ),
                });
            }
        }
    }

    warnings
}

/// Check a test definition against the template it will be scored with.
pub fn validate_pairing(template: &Template, test: &TestDefinition) -> Vec<ValidationWarning> {
    let mut warnings = Vec::new();

    if template.question_count() != test.total_questions() {
        warnings.push(ValidationWarning::sheet(format!(
            "template has {} questions but test '{}' has {}; evaluation will fail",
            template.question_count(),
            test.id,
            test.total_questions()
        )));
    }

    let choices_by_question: Vec<Vec<Choice>> = template
        .field_blocks
        .iter()
        .flat_map(|b| {
            let choices = b.field_type.choices();
            std::iter::repeat(choices).take(b.field_labels.len())
        })
        .collect();

    for (question_index, choices) in (1..).zip(&choices_by_question) {
        let Some(key) = test.answer_for(question_index) else {
            continue;
        };
        if !choices.contains(&key) {
            warnings.push(ValidationWarning {
                question_index: Some(question_index),
                message: format!(
                    "answer key {key} is not a choice on the sheet; the question can never score"
                ),
            });
        }
    }

    for (subject, _) in test.subject_ranges() {
        if subject.question_count == 0 {
            warnings.push(ValidationWarning::sheet(format!(
                "subject '{}' has no questions",
                subject.name
            )));
        }
    }

    warnings
}

/// Check a catalog for duplicate or missing version tags.
pub fn validate_catalog(catalog: &TestCatalog) -> Vec<ValidationWarning> {
    let mut warnings = Vec::new();
    let mut seen = HashSet::new();
    for def in &catalog.definitions {
        if !seen.insert(def.version.as_deref()) {
            warnings.push(ValidationWarning::sheet(match &def.version {
                Some(v) => format!("version '{v}' is defined more than once"),
                None => "more than one test definition has no version tag".to_string(),
            }));
        }
    }
    warnings
}
