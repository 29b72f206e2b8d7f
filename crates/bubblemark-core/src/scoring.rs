//! Answer-key matching, subject totals and review flags.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::model::TestDefinition;
use crate::results::{QuestionDecision, Status};

/// Default confidence below which a question is flagged.
pub const DEFAULT_FLAG_THRESHOLD: f64 = 0.5;
/// Flag rate the thresholds are tuned towards. Exceeding it is logged, never
/// enforced.
pub const DEFAULT_TARGET_FLAG_RATE: f64 = 0.05;

/// Knobs for scoring and flagging.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoringOptions {
    /// Questions with confidence below this are flagged.
    pub flag_threshold: f64,
    /// Expected fraction of flagged questions.
    pub target_flag_rate: f64,
}

impl Default for ScoringOptions {
    fn default() -> Self {
        Self {
            flag_threshold: DEFAULT_FLAG_THRESHOLD,
            target_flag_rate: DEFAULT_TARGET_FLAG_RATE,
        }
    }
}

/// How one question compares against the key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Correct,
    Incorrect,
    Unmarked,
    MultiMarked,
    Ambiguous,
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::Correct => write!(f, "correct"),
            Verdict::Incorrect => write!(f, "incorrect"),
            Verdict::Unmarked => write!(f, "unmarked"),
            Verdict::MultiMarked => write!(f, "multi_marked"),
            Verdict::Ambiguous => write!(f, "ambiguous"),
        }
    }
}

/// Verdict for a decision against the key answer.
pub fn verdict(decision: &QuestionDecision, key: Option<crate::model::Choice>) -> Verdict {
    match decision.status() {
        Status::Answered if decision.selected() == key => Verdict::Correct,
        Status::Answered => Verdict::Incorrect,
        Status::Blank => Verdict::Unmarked,
        Status::MultiFilled => Verdict::MultiMarked,
        Status::Ambiguous => Verdict::Ambiguous,
    }
}

/// Verdict counts for one sheet.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tally {
    pub correct: u32,
    pub incorrect: u32,
    pub unmarked: u32,
    pub multi_marked: u32,
    pub ambiguous: u32,
}

impl Tally {
    fn add(&mut self, verdict: Verdict) {
        match verdict {
            Verdict::Correct => self.correct += 1,
            Verdict::Incorrect => self.incorrect += 1,
            Verdict::Unmarked => self.unmarked += 1,
            Verdict::MultiMarked => self.multi_marked += 1,
            Verdict::Ambiguous => self.ambiguous += 1,
        }
    }

    pub fn total(&self) -> u32 {
        self.correct + self.incorrect + self.unmarked + self.multi_marked + self.ambiguous
    }

    /// Share of correct answers, as a percentage of all questions.
    pub fn percentage(&self) -> f64 {
        match self.total() {
            0 => 0.0,
            total => self.correct as f64 / total as f64 * 100.0,
        }
    }
}

/// Scores and flags for one sheet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreSheet {
    pub subject_scores: BTreeMap<String, u32>,
    pub total_score: u32,
    pub max_score: u32,
    pub flagged_questions: BTreeSet<usize>,
    pub verdicts: BTreeMap<usize, Verdict>,
    pub tally: Tally,
}

/// Score decisions against a test definition.
///
/// A question earns one point only when its status is `answered` and the
/// choice matches the key. Flags cover ambiguous and multi-filled questions
/// plus anything below `options.flag_threshold`. Decisions outside the
/// test's question range are ignored.
pub fn score(
    decisions: &[QuestionDecision],
    test: &TestDefinition,
    options: &ScoringOptions,
) -> ScoreSheet {
    let by_index: BTreeMap<usize, &QuestionDecision> =
        decisions.iter().map(|d| (d.question_index, d)).collect();

    let mut subject_scores = BTreeMap::new();
    let mut verdicts = BTreeMap::new();
    let mut flagged_questions = BTreeSet::new();
    let mut tally = Tally::default();

    for (subject, range) in test.subject_ranges() {
        let mut points = 0u32;
        for (offset, question_index) in range.enumerate() {
            let key = subject.answer_key.get(offset).copied();
            // No decision means nothing was read; treat it as ambiguous.
            let Some(decision) = by_index.get(&question_index) else {
                flagged_questions.insert(question_index);
                tally.add(Verdict::Ambiguous);
                verdicts.insert(question_index, Verdict::Ambiguous);
                continue;
            };

            let v = verdict(decision, key);
            if v == Verdict::Correct {
                points += 1;
            }
            if needs_review(decision, options) {
                flagged_questions.insert(question_index);
            }
            tally.add(v);
            verdicts.insert(question_index, v);
        }
        subject_scores.insert(subject.name.clone(), points);
    }

    let total_score = subject_scores.values().sum();
    let max_score = test.total_questions() as u32;

    let total = test.total_questions();
    if total > 0 {
        let rate = flagged_questions.len() as f64 / total as f64;
        if rate > options.target_flag_rate {
            tracing::warn!(
                flagged = flagged_questions.len(),
                questions = total,
                "flag rate {:.1}% exceeds target {:.1}%",
                rate * 100.0,
                options.target_flag_rate * 100.0
            );
        }
    }

    ScoreSheet {
        subject_scores,
        total_score,
        max_score,
        flagged_questions,
        verdicts,
        tally,
    }
}

/// Whether a decision should go to a human reviewer.
pub fn needs_review(decision: &QuestionDecision, options: &ScoringOptions) -> bool {
    matches!(decision.status(), Status::Ambiguous | Status::MultiFilled)
        || decision.confidence < options.flag_threshold
}
