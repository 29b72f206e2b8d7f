//! Core data model types for bubblemark.
//!
//! Templates describe where bubbles sit on a page; test definitions describe
//! how answers are grouped into subjects and which choice is correct. Both are
//! read-only inputs supplied by the caller.

use std::fmt;
use std::ops::RangeInclusive;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::OmrError;

/// A single choice label printed next to a bubble (`A`–`Z` or `0`–`9`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Choice(char);

impl Choice {
    /// Create a choice label, normalizing letters to uppercase.
    pub fn new(c: char) -> Option<Self> {
        let c = c.to_ascii_uppercase();
        (c.is_ascii_uppercase() || c.is_ascii_digit()).then_some(Self(c))
    }

    /// The label as a character.
    pub fn as_char(self) -> char {
        self.0
    }
}

impl fmt::Display for Choice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Choice {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let mut chars = trimmed.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) => {
                Choice::new(c).ok_or_else(|| format!("invalid choice label: {trimmed:?}"))
            }
            _ => Err(format!("choice must be a single character, got {trimmed:?}")),
        }
    }
}

impl TryFrom<String> for Choice {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Choice> for String {
    fn from(choice: Choice) -> Self {
        choice.0.to_string()
    }
}

/// Width and height in pixels, written as `[width, height]` in templates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "[u32; 2]", into = "[u32; 2]")]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

impl Dimensions {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl From<[u32; 2]> for Dimensions {
    fn from([width, height]: [u32; 2]) -> Self {
        Self { width, height }
    }
}

impl From<Dimensions> for [u32; 2] {
    fn from(d: Dimensions) -> Self {
        [d.width, d.height]
    }
}

impl fmt::Display for Dimensions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Axis along which the choices of one question are laid out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Horizontal,
    Vertical,
}

/// Bubble layout of a field block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FieldType {
    /// Four-choice multiple choice, A–D, laid out horizontally.
    #[serde(rename = "QTYPE_MCQ4")]
    Mcq4,
    /// Five-choice multiple choice, A–E, laid out horizontally.
    #[serde(rename = "QTYPE_MCQ5")]
    Mcq5,
    /// Single digit, 0–9, laid out vertically.
    #[serde(rename = "QTYPE_INT")]
    Int,
}

impl FieldType {
    /// The ordered choice labels of one question of this type.
    pub fn choices(self) -> Vec<Choice> {
        let labels: &str = match self {
            FieldType::Mcq4 => "ABCD",
            FieldType::Mcq5 => "ABCDE",
            FieldType::Int => "0123456789",
        };
        labels.chars().map(Choice).collect()
    }

    pub fn default_direction(self) -> Direction {
        match self {
            FieldType::Mcq4 | FieldType::Mcq5 => Direction::Horizontal,
            FieldType::Int => Direction::Vertical,
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldType::Mcq4 => write!(f, "QTYPE_MCQ4"),
            FieldType::Mcq5 => write!(f, "QTYPE_MCQ5"),
            FieldType::Int => write!(f, "QTYPE_INT"),
        }
    }
}

/// A group of questions sharing one layout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldBlock {
    /// Block name (e.g. "Questions").
    #[serde(default)]
    pub name: String,
    /// Layout of each question in the block.
    pub field_type: FieldType,
    /// Centre of the first bubble of the first label, `[x, y]`.
    pub origin: [f64; 2],
    /// Distance between neighbouring choices of one question.
    pub bubbles_gap: f64,
    /// Distance between neighbouring questions.
    pub labels_gap: f64,
    /// Question identifiers, in reading order.
    pub field_labels: Vec<String>,
    /// Choice axis; defaults to the field type's natural direction.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub direction: Option<Direction>,
}

impl FieldBlock {
    pub fn direction(&self) -> Direction {
        self.direction
            .unwrap_or_else(|| self.field_type.default_direction())
    }

    pub fn choices_per_question(&self) -> usize {
        self.field_type.choices().len()
    }
}

/// Page layout of an answer sheet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Template {
    /// Expected size of the rectified sheet image.
    pub page_dimensions: Dimensions,
    /// Size of the rectangular mask sampled around each bubble centre.
    pub bubble_dimensions: Dimensions,
    /// Field blocks in question order.
    pub field_blocks: Vec<FieldBlock>,
}

impl Template {
    /// Number of questions across all field blocks.
    pub fn question_count(&self) -> usize {
        self.field_blocks.iter().map(|b| b.field_labels.len()).sum()
    }

    /// Total number of bubbles across all field blocks.
    pub fn bubble_count(&self) -> usize {
        self.field_blocks
            .iter()
            .map(|b| b.field_labels.len() * b.choices_per_question())
            .sum()
    }

    /// The field labels of every question in question-index order.
    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.field_blocks
            .iter()
            .flat_map(|b| b.field_labels.iter().map(String::as_str))
    }
}

/// A subject: a consecutive run of questions with its answer key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subject {
    pub name: String,
    #[serde(rename = "questions")]
    pub question_count: usize,
    /// Correct choice for each question of this subject, in order.
    pub answer_key: Vec<Choice>,
}

/// A test: ordered subjects covering question indices `1..=total_questions`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestDefinition {
    pub id: String,
    pub name: String,
    /// Exam version tag (e.g. "A"), when several versions share a template.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    pub subjects: Vec<Subject>,
}

impl TestDefinition {
    /// Build and validate a test definition.
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        subjects: Vec<Subject>,
    ) -> Result<Self, OmrError> {
        let def = Self {
            id: id.into(),
            name: name.into(),
            version: None,
            subjects,
        };
        def.validate()?;
        Ok(def)
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    /// Check the structural invariants of the definition.
    pub fn validate(&self) -> Result<(), OmrError> {
        if self.subjects.is_empty() {
            return Err(OmrError::InvalidTestDefinition(format!(
                "test '{}' has no subjects",
                self.id
            )));
        }
        let mut seen = std::collections::HashSet::new();
        for subject in &self.subjects {
            if !seen.insert(subject.name.as_str()) {
                return Err(OmrError::InvalidTestDefinition(format!(
                    "duplicate subject name: {}",
                    subject.name
                )));
            }
            if subject.answer_key.len() != subject.question_count {
                return Err(OmrError::InvalidTestDefinition(format!(
                    "subject '{}' has {} questions but {} answers",
                    subject.name,
                    subject.question_count,
                    subject.answer_key.len()
                )));
            }
        }
        Ok(())
    }

    pub fn total_questions(&self) -> usize {
        self.subjects.iter().map(|s| s.question_count).sum()
    }

    /// Each subject with its 1-based, inclusive question-index range.
    ///
    /// Subjects with no questions yield an empty range.
    pub fn subject_ranges(&self) -> Vec<(&Subject, RangeInclusive<usize>)> {
        let mut start = 1;
        self.subjects
            .iter()
            .map(|s| {
                let range = start..=start + s.question_count - 1;
                start += s.question_count;
                (s, range)
            })
            .collect()
    }

    /// Correct choice for a 1-based question index.
    pub fn answer_for(&self, question_index: usize) -> Option<Choice> {
        self.locate(question_index)
            .map(|(subject, offset)| subject.answer_key[offset])
    }

    /// Subject that owns a 1-based question index.
    pub fn subject_for(&self, question_index: usize) -> Option<&Subject> {
        self.locate(question_index).map(|(subject, _)| subject)
    }

    fn locate(&self, question_index: usize) -> Option<(&Subject, usize)> {
        if question_index == 0 {
            return None;
        }
        let mut offset = question_index - 1;
        for subject in &self.subjects {
            if offset < subject.question_count {
                return subject.answer_key.get(offset).map(|_| (subject, offset));
            }
            offset -= subject.question_count;
        }
        None
    }
}

/// All versions of a test that share one template.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TestCatalog {
    pub definitions: Vec<TestDefinition>,
}

impl TestCatalog {
    pub fn new(definitions: Vec<TestDefinition>) -> Self {
        Self { definitions }
    }

    /// Pick the definition for a version tag.
    ///
    /// With a tag, the definition carrying that version wins. Without one, a
    /// single-definition catalog resolves to it, otherwise the untagged
    /// definition is used.
    pub fn resolve(&self, version: Option<&str>) -> Option<&TestDefinition> {
        match version {
            Some(tag) => self
                .definitions
                .iter()
                .find(|d| d.version.as_deref() == Some(tag)),
            None if self.definitions.len() == 1 => self.definitions.first(),
            None => self.definitions.iter().find(|d| d.version.is_none()),
        }
    }

    pub fn versions(&self) -> Vec<&str> {
        self.definitions
            .iter()
            .filter_map(|d| d.version.as_deref())
            .collect()
    }
}

/// Spacing used when generating a template from a test definition.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TemplateLayout {
    pub bubble_dimensions: Dimensions,
    pub bubbles_gap: f64,
    pub labels_gap: f64,
    /// Centre of the first bubble of the first subject.
    pub origin: [f64; 2],
    /// Extra vertical space between subject blocks.
    pub block_gap: f64,
    /// Blank border right of and below the outermost bubbles.
    pub margin: f64,
}

impl Default for TemplateLayout {
    fn default() -> Self {
        Self {
            bubble_dimensions: Dimensions::new(20, 20),
            bubbles_gap: 50.0,
            labels_gap: 60.0,
            origin: [50.0, 100.0],
            block_gap: 40.0,
            margin: 50.0,
        }
    }
}

impl Template {
    /// Lay out one field block per subject, stacked top to bottom, with
    /// consecutive `q{n}` labels. The page is sized to fit every block.
    ///
    /// Subjects whose keys stay within A–D get `QTYPE_MCQ4` blocks; an `E`
    /// anywhere in a key switches that subject to `QTYPE_MCQ5`.
    pub fn from_test_definition(
        test: &TestDefinition,
        layout: &TemplateLayout,
    ) -> Result<Template, OmrError> {
        let mut field_blocks = Vec::new();
        let mut next_y = layout.origin[1];
        let mut last_y = layout.origin[1];
        let mut widest = 0usize;

        for (subject, range) in test.subject_ranges() {
            if subject.question_count == 0 {
                continue;
            }
            let field_type = [FieldType::Mcq4, FieldType::Mcq5]
                .into_iter()
                .find(|ft| {
                    let choices = ft.choices();
                    subject.answer_key.iter().all(|c| choices.contains(c))
                })
                .ok_or_else(|| {
                    OmrError::InvalidTestDefinition(format!(
                        "subject '{}' has answers outside A-E; no generated layout fits",
                        subject.name
                    ))
                })?;
            widest = widest.max(field_type.choices().len());

            field_blocks.push(FieldBlock {
                name: subject.name.clone(),
                field_type,
                origin: [layout.origin[0], next_y],
                bubbles_gap: layout.bubbles_gap,
                labels_gap: layout.labels_gap,
                field_labels: range.map(|q| format!("q{q}")).collect(),
                direction: None,
            });
            last_y = next_y + (subject.question_count - 1) as f64 * layout.labels_gap;
            next_y = last_y + layout.labels_gap + layout.block_gap;
        }

        if field_blocks.is_empty() {
            return Err(OmrError::InvalidTestDefinition(format!(
                "test '{}' has no questions to lay out",
                test.id
            )));
        }

        let half_w = f64::from(layout.bubble_dimensions.width) / 2.0;
        let half_h = f64::from(layout.bubble_dimensions.height) / 2.0;
        let right = layout.origin[0] + (widest - 1) as f64 * layout.bubbles_gap;
        let page_dimensions = Dimensions::new(
            (right + half_w + layout.margin).ceil() as u32,
            (last_y + half_h + layout.margin).ceil() as u32,
        );

        tracing::debug!(
            test = %test.id,
            blocks = field_blocks.len(),
            page = %page_dimensions,
            "generated template"
        );

        Ok(Template {
            page_dimensions,
            bubble_dimensions: layout.bubble_dimensions,
            field_blocks,
        })
    }
}
