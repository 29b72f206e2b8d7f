//! Question resolution: per-bubble decisions to one outcome per question.
//!
//! Resolution never fails. Unreadable bubbles and borderline marks become
//! `ambiguous`, conflicting marks become `multi-filled`, and both surface as
//! flags for human review.

use std::collections::BTreeMap;

use crate::analysis::SheetAnalysis;
use crate::error::OmrError;
use crate::policy::{classify, StrictnessMode};
use crate::results::{BubbleFeature, Outcome, QuestionDecision};

/// Resolve one question from the readings of its choice bubbles.
///
/// Precedence:
/// 1. two or more filled bubbles: `multi-filled`, confidence 0, even when the
///    fill ratios are identical;
/// 2. any unreadable bubble: `ambiguous`, confidence 0;
/// 3. exactly one filled bubble: `answered` with that bubble's confidence, or
///    `ambiguous` when the confidence is below the mode's acceptance level;
/// 4. none filled: `blank`, confidence of the least certain bubble.
pub fn resolve(
    question_index: usize,
    readings: &[&Result<BubbleFeature, OmrError>],
    mode: StrictnessMode,
) -> QuestionDecision {
    let profile = mode.profile();

    let mut filled = Vec::new();
    let mut min_confidence = 1.0f64;
    let mut unreadable = 0usize;

    for reading in readings {
        match reading {
            Ok(feature) => {
                let class = classify(feature, mode);
                if class.is_filled {
                    filled.push((feature.choice, class.confidence));
                }
                min_confidence = min_confidence.min(class.confidence);
            }
            Err(_) => unreadable += 1,
        }
    }

    let (outcome, confidence) = if filled.len() >= 2 {
        let choices = filled.iter().map(|(choice, _)| *choice).collect();
        (Outcome::MultiFilled { choices }, 0.0)
    } else if unreadable > 0 || readings.is_empty() {
        let candidate = filled.first().map(|(choice, _)| *choice);
        (Outcome::Ambiguous { candidate }, 0.0)
    } else if let Some(&(choice, confidence)) = filled.first() {
        if confidence < profile.min_acceptance_confidence() {
            (
                Outcome::Ambiguous {
                    candidate: Some(choice),
                },
                confidence,
            )
        } else {
            (Outcome::Answered { choice }, confidence)
        }
    } else {
        (Outcome::Blank, min_confidence)
    };

    QuestionDecision {
        question_index,
        outcome,
        confidence,
    }
}

/// Resolve every question of an analysed sheet, ordered by question index.
///
/// Every index in `question_indices` gets a decision, even a question with
/// no readings at all (which resolves to `ambiguous`).
pub fn resolve_sheet(
    analysis: &SheetAnalysis,
    question_indices: impl IntoIterator<Item = usize>,
    mode: StrictnessMode,
) -> Vec<QuestionDecision> {
    let mut by_question: BTreeMap<usize, Vec<&Result<BubbleFeature, OmrError>>> =
        question_indices.into_iter().map(|q| (q, Vec::new())).collect();

    for reading in &analysis.bubbles {
        let question_index = match reading {
            Ok(feature) => feature.question_index,
            Err(OmrError::OutOfBounds { question_index, .. }) => *question_index,
            Err(other) => {
                tracing::warn!("ignoring unexpected bubble error: {other}");
                continue;
            }
        };
        by_question.entry(question_index).or_default().push(reading);
    }

    by_question
        .into_iter()
        .map(|(q, readings)| resolve(q, &readings, mode))
        .collect()
}
