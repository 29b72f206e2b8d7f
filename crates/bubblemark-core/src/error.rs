//! Error taxonomy for sheet evaluation.
//!
//! Only template and sheet-level problems are fatal. A bubble whose mask
//! leaves the image is reported as [`OmrError::OutOfBounds`] for that bubble
//! alone and is absorbed into the question's decision by the resolver.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::Choice;

/// Errors produced by the evaluation pipeline.
#[derive(Debug, Clone, Error)]
pub enum OmrError {
    /// The template is structurally broken (bad dimensions, duplicate labels,
    /// geometry outside the page).
    #[error("invalid template: {0}")]
    InvalidTemplate(String),

    /// The test definition is inconsistent (answer key length, duplicate
    /// subject names).
    #[error("invalid test definition: {0}")]
    InvalidTestDefinition(String),

    /// A single bubble's mask does not fit inside the image.
    #[error(
        "bubble {choice} of question {question_index} is out of bounds \
         (mask at {x},{y} size {width}x{height})"
    )]
    OutOfBounds {
        question_index: usize,
        choice: Choice,
        x: i64,
        y: i64,
        width: u32,
        height: u32,
    },

    /// The whole sheet could not be evaluated.
    #[error("evaluation failed: {reason} ({partial})")]
    EvaluationFailed {
        reason: String,
        partial: PartialEvaluation,
    },
}

impl OmrError {
    /// Returns `true` if this error aborts the whole sheet.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, OmrError::OutOfBounds { .. })
    }

    pub(crate) fn failed(reason: impl Into<String>, partial: PartialEvaluation) -> Self {
        OmrError::EvaluationFailed {
            reason: reason.into(),
            partial,
        }
    }
}

/// Pipeline stage reached before a fatal failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Validation,
    GridMapping,
    Analysis,
    Timeout,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Validation => write!(f, "validation"),
            Stage::GridMapping => write!(f, "grid mapping"),
            Stage::Analysis => write!(f, "analysis"),
            Stage::Timeout => write!(f, "timeout"),
        }
    }
}

/// What was known about a sheet when it failed. Never carries a score.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartialEvaluation {
    /// Stage at which evaluation stopped.
    pub stage: Stage,
    /// Number of bubble positions mapped before the failure.
    pub bubbles_mapped: usize,
    /// Wall-clock time spent before the failure.
    pub elapsed_ms: u64,
}

impl fmt::Display for PartialEvaluation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "stopped at {} after {}ms, {} bubbles mapped",
            self.stage, self.elapsed_ms, self.bubbles_mapped
        )
    }
}
