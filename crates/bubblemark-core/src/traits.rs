//! Collaborator traits at the edges of the core.
//!
//! Exam-version identification and flag explanation live outside the
//! deterministic pipeline. The core defines the contracts and ships one
//! simple implementation of each.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::results::{EvaluationResult, Outcome, QuestionDecision, Status};
use crate::sheet::SheetImage;

// ---------------------------------------------------------------------------
// Ambiguity explanation
// ---------------------------------------------------------------------------

/// Produces human-readable reasons for flagged questions.
///
/// Implementations may call out to a model service; the core only consumes
/// the text.
#[async_trait]
pub trait AmbiguityExplainer: Send + Sync {
    /// Human-readable explainer name (e.g. "status").
    fn name(&self) -> &str;

    /// Explain every flagged question of a result.
    async fn explain(&self, result: &EvaluationResult) -> anyhow::Result<Vec<Explanation>>;
}

/// Why one flagged question needs review.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Explanation {
    pub question_index: usize,
    pub status: Status,
    pub text: String,
}

/// Template-based explanations derived from the decision itself.
#[derive(Debug, Clone, Copy)]
pub struct StatusExplainer {
    /// Confidence below which questions were flagged.
    pub flag_threshold: f64,
}

impl Default for StatusExplainer {
    fn default() -> Self {
        Self {
            flag_threshold: crate::scoring::DEFAULT_FLAG_THRESHOLD,
        }
    }
}

impl StatusExplainer {
    pub fn explain_decision(&self, decision: &QuestionDecision, result: &EvaluationResult) -> String {
        let pct = decision.confidence * 100.0;
        let needed = result.mode.profile().min_acceptance_confidence() * 100.0;
        match &decision.outcome {
            Outcome::MultiFilled { choices } => {
                let list = choices
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join(", ");
                format!("Choices {list} all read as filled; only one mark is allowed.")
            }
            Outcome::Ambiguous {
                candidate: Some(choice),
            } if decision.confidence > 0.0 => format!(
                "Choice {choice} reads as filled but only at {pct:.0}% confidence; \
                 {} mode accepts from {needed:.0}%.",
                result.mode
            ),
            Outcome::Ambiguous {
                candidate: Some(choice),
            } => format!(
                "Choice {choice} looks marked, but the question could not be read reliably \
                 (a bubble may lie outside the scanned area or sit exactly on the threshold)."
            ),
            Outcome::Ambiguous { candidate: None } => {
                "No bubble reads as filled, but at least one bubble could not be read.".to_string()
            }
            Outcome::Answered { choice } => format!(
                "Choice {choice} accepted at {pct:.0}% confidence, below the {:.0}% review level.",
                self.flag_threshold * 100.0
            ),
            Outcome::Blank => format!(
                "Read as blank at {pct:.0}% confidence; a bubble is close to the fill threshold."
            ),
        }
    }
}

#[async_trait]
impl AmbiguityExplainer for StatusExplainer {
    fn name(&self) -> &str {
        "status"
    }

    async fn explain(&self, result: &EvaluationResult) -> anyhow::Result<Vec<Explanation>> {
        Ok(result
            .decisions
            .iter()
            .filter(|d| result.is_flagged(d.question_index))
            .map(|d| Explanation {
                question_index: d.question_index,
                status: d.status(),
                text: self.explain_decision(d, result),
            })
            .collect())
    }
}

// ---------------------------------------------------------------------------
// Exam-version classification
// ---------------------------------------------------------------------------

/// Identifies which exam version a sheet belongs to.
///
/// Runs on the blocking pool alongside evaluation.
pub trait VersionClassifier: Send + Sync {
    /// Version tag of the sheet, or `None` when it cannot be told.
    fn classify(&self, image: &SheetImage<'_>) -> Option<String>;
}

/// Assigns every sheet the same version.
#[derive(Debug, Clone, Default)]
pub struct FixedVersion(pub Option<String>);

impl FixedVersion {
    pub fn new(version: impl Into<String>) -> Self {
        Self(Some(version.into()))
    }
}

impl VersionClassifier for FixedVersion {
    fn classify(&self, _image: &SheetImage<'_>) -> Option<String> {
        self.0.clone()
    }
}
