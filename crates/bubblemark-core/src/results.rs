//! Per-bubble, per-question and per-sheet result types.
//!
//! A [`QuestionDecision`] holds a tagged [`Outcome`] in memory, so a decision
//! can never be `answered` without a choice, but it serializes to the flat
//! record that review tools key off:
//! `{question_index, choice, confidence, status}`.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::model::Choice;
use crate::policy::StrictnessMode;
use crate::report::AnswerOverride;
use crate::scoring::Tally;

/// Pixel rectangle sampled for one bubble.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Measured appearance of one bubble.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BubbleFeature {
    pub question_index: usize,
    pub choice: Choice,
    /// Fraction of mask pixels at or below the sheet threshold, in `[0, 1]`.
    pub fill_ratio: f64,
    /// Mean grayscale value of the mask.
    pub mean_intensity: f64,
    pub bbox: BoundingBox,
}

/// Resolved outcome of one question.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Answered { choice: Choice },
    Blank,
    /// Two or more bubbles read as filled.
    MultiFilled { choices: Vec<Choice> },
    /// A candidate exists (or a bubble could not be read) but the reading is
    /// not trustworthy.
    Ambiguous { candidate: Option<Choice> },
}

/// Status tag of an [`Outcome`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Status {
    Answered,
    Blank,
    MultiFilled,
    Ambiguous,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::Answered => write!(f, "answered"),
            Status::Blank => write!(f, "blank"),
            Status::MultiFilled => write!(f, "multi-filled"),
            Status::Ambiguous => write!(f, "ambiguous"),
        }
    }
}

impl Outcome {
    pub fn status(&self) -> Status {
        match self {
            Outcome::Answered { .. } => Status::Answered,
            Outcome::Blank => Status::Blank,
            Outcome::MultiFilled { .. } => Status::MultiFilled,
            Outcome::Ambiguous { .. } => Status::Ambiguous,
        }
    }
}

/// Decision for one question of one sheet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(into = "DecisionRecord", try_from = "DecisionRecord")]
pub struct QuestionDecision {
    pub question_index: usize,
    pub outcome: Outcome,
    /// Decision confidence in `[0, 1]`.
    pub confidence: f64,
}

impl QuestionDecision {
    pub fn status(&self) -> Status {
        self.outcome.status()
    }

    /// The choice a reader would report for this question, if any.
    ///
    /// Ambiguous decisions expose their candidate; multi-filled and blank
    /// decisions expose nothing.
    pub fn selected(&self) -> Option<Choice> {
        match &self.outcome {
            Outcome::Answered { choice } => Some(*choice),
            Outcome::Ambiguous { candidate } => *candidate,
            Outcome::Blank | Outcome::MultiFilled { .. } => None,
        }
    }

    /// Every choice that read as filled.
    pub fn marked(&self) -> Vec<Choice> {
        match &self.outcome {
            Outcome::Answered { choice } => vec![*choice],
            Outcome::MultiFilled { choices } => choices.clone(),
            Outcome::Ambiguous { candidate } => candidate.iter().copied().collect(),
            Outcome::Blank => Vec::new(),
        }
    }
}

/// Wire shape of a [`QuestionDecision`].
#[derive(Debug, Clone, Serialize, Deserialize)]
struct DecisionRecord {
    question_index: usize,
    choice: Option<Choice>,
    confidence: f64,
    status: Status,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    marked: Vec<Choice>,
}

impl From<QuestionDecision> for DecisionRecord {
    fn from(d: QuestionDecision) -> Self {
        let marked = match &d.outcome {
            Outcome::MultiFilled { choices } => choices.clone(),
            _ => Vec::new(),
        };
        Self {
            question_index: d.question_index,
            choice: d.selected(),
            confidence: d.confidence,
            status: d.status(),
            marked,
        }
    }
}

impl TryFrom<DecisionRecord> for QuestionDecision {
    type Error = String;

    fn try_from(r: DecisionRecord) -> Result<Self, Self::Error> {
        if !(0.0..=1.0).contains(&r.confidence) {
            return Err(format!(
                "question {}: confidence {} outside [0, 1]",
                r.question_index, r.confidence
            ));
        }
        let outcome = match (r.status, r.choice) {
            (Status::Answered, Some(choice)) => Outcome::Answered { choice },
            (Status::Answered, None) => {
                return Err(format!(
                    "question {}: answered without a choice",
                    r.question_index
                ))
            }
            (Status::Blank, None) => Outcome::Blank,
            (Status::MultiFilled, None) => Outcome::MultiFilled { choices: r.marked },
            (Status::Blank | Status::MultiFilled, Some(choice)) => {
                return Err(format!(
                    "question {}: {} cannot select choice {choice}",
                    r.question_index, r.status
                ))
            }
            (Status::Ambiguous, candidate) => Outcome::Ambiguous { candidate },
        };
        Ok(Self {
            question_index: r.question_index,
            outcome,
            confidence: r.confidence,
        })
    }
}

/// Everything produced for one sheet. Never mutated after construction;
/// corrections produce a new result (see `with_overrides`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationResult {
    /// Test definition this sheet was scored against.
    pub test_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exam_version: Option<String>,
    pub mode: StrictnessMode,
    /// Global binarization threshold used for the sheet.
    pub threshold: u8,
    /// One decision per question, ordered by question index.
    pub decisions: Vec<QuestionDecision>,
    /// Score per subject name.
    pub subject_scores: BTreeMap<String, u32>,
    pub total_score: u32,
    pub max_score: u32,
    /// Question indices that need human review.
    pub flagged_questions: BTreeSet<usize>,
    pub tally: Tally,
    /// Mean decision confidence across all questions.
    pub overall_confidence: f64,
    /// Wall-clock time of the evaluation.
    pub processing_duration_ms: u64,
    /// Reviewer corrections applied on top of the evaluator's reading.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub overrides: Vec<AnswerOverride>,
}

impl EvaluationResult {
    pub fn decision(&self, question_index: usize) -> Option<&QuestionDecision> {
        self.decisions
            .iter()
            .find(|d| d.question_index == question_index)
    }

    pub fn is_flagged(&self, question_index: usize) -> bool {
        self.flagged_questions.contains(&question_index)
    }

    /// Fraction of questions flagged for review.
    pub fn flag_rate(&self) -> f64 {
        if self.decisions.is_empty() {
            0.0
        } else {
            self.flagged_questions.len() as f64 / self.decisions.len() as f64
        }
    }

    pub fn percentage(&self) -> f64 {
        if self.max_score == 0 {
            0.0
        } else {
            self.total_score as f64 / self.max_score as f64 * 100.0
        }
    }
}

/// Mean decision confidence; 0 for an empty sheet.
pub fn overall_confidence(decisions: &[QuestionDecision]) -> f64 {
    if decisions.is_empty() {
        return 0.0;
    }
    decisions.iter().map(|d| d.confidence).sum::<f64>() / decisions.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn c(ch: char) -> Choice {
        Choice::new(ch).unwrap()
    }

    #[test]
    fn answered_serializes_flat() {
        let d = QuestionDecision {
            question_index: 4,
            outcome: Outcome::Answered { choice: c('B') },
            confidence: 0.75,
        };
        let json = serde_json::to_value(&d).unwrap();
        assert_eq!(json["question_index"], 4);
        assert_eq!(json["choice"], "B");
        assert_eq!(json["status"], "answered");
        assert_eq!(json["confidence"], 0.75);
        assert!(json.get("marked").is_none());
    }

    #[test]
    fn multi_filled_has_null_choice_and_marked_list() {
        let d = QuestionDecision {
            question_index: 1,
            outcome: Outcome::MultiFilled {
                choices: vec![c('A'), c('C')],
            },
            confidence: 0.0,
        };
        let json = serde_json::to_value(&d).unwrap();
        assert!(json["choice"].is_null());
        assert_eq!(json["status"], "multi-filled");
        assert_eq!(json["marked"], serde_json::json!(["A", "C"]));

        let back: QuestionDecision = serde_json::from_value(json).unwrap();
        assert_eq!(back, d);
    }

    #[test]
    fn ambiguous_exposes_candidate() {
        let d = QuestionDecision {
            question_index: 2,
            outcome: Outcome::Ambiguous {
                candidate: Some(c('D')),
            },
            confidence: 0.3,
        };
        assert_eq!(d.selected(), Some(c('D')));
        assert_eq!(d.status(), Status::Ambiguous);
        assert_eq!(d.marked(), vec![c('D')]);
    }

    #[test]
    fn rejects_inconsistent_records() {
        let answered_without_choice = serde_json::json!({
            "question_index": 1, "choice": null, "confidence": 1.0, "status": "answered"
        });
        assert!(serde_json::from_value::<QuestionDecision>(answered_without_choice).is_err());

        let blank_with_choice = serde_json::json!({
            "question_index": 1, "choice": "A", "confidence": 1.0, "status": "blank"
        });
        assert!(serde_json::from_value::<QuestionDecision>(blank_with_choice).is_err());

        let bad_confidence = serde_json::json!({
            "question_index": 1, "choice": null, "confidence": 1.5, "status": "blank"
        });
        assert!(serde_json::from_value::<QuestionDecision>(bad_confidence).is_err());
    }

    #[test]
    fn overall_confidence_is_mean() {
        let decisions = vec![
            QuestionDecision {
                question_index: 1,
                outcome: Outcome::Blank,
                confidence: 1.0,
            },
            QuestionDecision {
                question_index: 2,
                outcome: Outcome::Blank,
                confidence: 0.5,
            },
        ];
        assert!((overall_confidence(&decisions) - 0.75).abs() < 1e-12);
        assert_eq!(overall_confidence(&[]), 0.0);
    }
}
