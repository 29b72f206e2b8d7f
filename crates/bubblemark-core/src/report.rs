//! Evaluation result persistence, comparison, and reviewer overrides.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::model::{Choice, TestDefinition};
use crate::policy::StrictnessMode;
use crate::results::{overall_confidence, EvaluationResult, Outcome, QuestionDecision, Status};
use crate::scoring::{score, verdict, ScoringOptions};

impl EvaluationResult {
    /// Save the result as JSON to a file.
    pub fn save_json(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self).context("failed to serialize result")?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, json)
            .with_context(|| format!("failed to write result to {}", path.display()))?;
        Ok(())
    }

    /// Load a result from a JSON file.
    pub fn load_json(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read result from {}", path.display()))?;
        let result: EvaluationResult =
            serde_json::from_str(&content).context("failed to parse result JSON")?;
        Ok(result)
    }

    /// Compare this result against a baseline reading of the same sheet.
    ///
    /// Typical use is re-running a sheet under another strictness mode and
    /// listing the questions whose reading changed.
    pub fn compare(&self, baseline: &EvaluationResult) -> ResultDiff {
        let baseline_by_q: BTreeMap<usize, &QuestionDecision> = baseline
            .decisions
            .iter()
            .map(|d| (d.question_index, d))
            .collect();

        let mut changes = Vec::new();
        let mut unchanged = 0usize;
        let mut new_questions = 0usize;

        for current in &self.decisions {
            let Some(before) = baseline_by_q.get(&current.question_index) else {
                new_questions += 1;
                continue;
            };
            if before.status() == current.status() && before.selected() == current.selected() {
                unchanged += 1;
            } else {
                changes.push(QuestionChange {
                    question_index: current.question_index,
                    baseline_status: before.status(),
                    baseline_choice: before.selected(),
                    current_status: current.status(),
                    current_choice: current.selected(),
                    baseline_confidence: before.confidence,
                    current_confidence: current.confidence,
                });
            }
        }

        let removed_questions = baseline
            .decisions
            .iter()
            .filter(|b| self.decision(b.question_index).is_none())
            .count();

        let mut subject_deltas = BTreeMap::new();
        for (name, &now) in &self.subject_scores {
            let before = baseline.subject_scores.get(name).copied().unwrap_or(0);
            subject_deltas.insert(name.clone(), now as i64 - before as i64);
        }

        ResultDiff {
            baseline_mode: baseline.mode,
            current_mode: self.mode,
            baseline_score: baseline.total_score,
            current_score: self.total_score,
            score_delta: self.total_score as i64 - baseline.total_score as i64,
            subject_deltas,
            newly_flagged: self
                .flagged_questions
                .difference(&baseline.flagged_questions)
                .copied()
                .collect(),
            cleared_flags: baseline
                .flagged_questions
                .difference(&self.flagged_questions)
                .copied()
                .collect(),
            changes,
            unchanged,
            new_questions,
            removed_questions,
        }
    }

    /// Apply reviewer corrections and re-score.
    ///
    /// Returns a new result; `self` is left untouched. Each override replaces
    /// the named question's decision with the reviewer's answer (or blank) at
    /// confidence 1.0 and is recorded in `overrides`. A later correction of
    /// the same question replaces the earlier record.
    pub fn with_overrides(
        &self,
        overrides: &[AnswerOverride],
        test: &TestDefinition,
        options: &ScoringOptions,
    ) -> Result<EvaluationResult> {
        anyhow::ensure!(
            test.id == self.test_id,
            "result was scored against test '{}', not '{}'",
            self.test_id,
            test.id
        );

        let mut decisions = self.decisions.clone();
        for o in overrides {
            let decision = decisions
                .iter_mut()
                .find(|d| d.question_index == o.question_index)
                .with_context(|| format!("no question {} in result", o.question_index))?;
            decision.outcome = match o.choice {
                Some(choice) => Outcome::Answered { choice },
                None => Outcome::Blank,
            };
            decision.confidence = 1.0;
        }

        let mut applied = self.overrides.clone();
        for o in overrides {
            applied.retain(|prev| prev.question_index != o.question_index);
            applied.push(o.clone());
        }
        applied.sort_by_key(|o| o.question_index);

        let sheet = score(&decisions, test, options);
        tracing::info!(
            overrides = overrides.len(),
            before = self.total_score,
            after = sheet.total_score,
            "applied reviewer overrides"
        );

        Ok(EvaluationResult {
            overall_confidence: overall_confidence(&decisions),
            decisions,
            subject_scores: sheet.subject_scores,
            total_score: sheet.total_score,
            max_score: sheet.max_score,
            flagged_questions: sheet.flagged_questions,
            tally: sheet.tally,
            overrides: applied,
            ..self.clone()
        })
    }

    /// Plain-text summary for terminals and log files.
    pub fn to_text_report(&self, test: &TestDefinition) -> String {
        let mut out = String::new();
        let rule = "=".repeat(60);

        let _ = writeln!(out, "{rule}");
        let _ = writeln!(out, "{} ({})", test.name, self.test_id);
        if let Some(version) = &self.exam_version {
            let _ = writeln!(out, "Version: {version}");
        }
        let _ = writeln!(out, "Mode: {}  Threshold: {}", self.mode, self.threshold);
        let _ = writeln!(out, "{rule}");
        let _ = writeln!(
            out,
            "Total: {}/{} ({:.1}%)",
            self.total_score,
            self.max_score,
            self.percentage()
        );
        let _ = writeln!(
            out,
            "Overall confidence: {:.1}%  Flagged: {} ({:.1}%)",
            self.overall_confidence * 100.0,
            self.flagged_questions.len(),
            self.flag_rate() * 100.0
        );
        let _ = writeln!(
            out,
            "Correct: {}  Incorrect: {}  Unmarked: {}  Multi-marked: {}  Ambiguous: {}",
            self.tally.correct,
            self.tally.incorrect,
            self.tally.unmarked,
            self.tally.multi_marked,
            self.tally.ambiguous
        );

        let _ = writeln!(out, "\nSubjects:");
        for (subject, range) in test.subject_ranges() {
            let got = self.subject_scores.get(&subject.name).copied().unwrap_or(0);
            let _ = writeln!(
                out,
                "  {:<20} {:>3}/{:<3} (Q{}-Q{})",
                subject.name,
                got,
                subject.question_count,
                range.start(),
                range.end()
            );
        }

        let _ = writeln!(out, "\nQuestions:");
        for d in &self.decisions {
            let key = test.answer_for(d.question_index);
            let marker = if self.is_flagged(d.question_index) {
                "  [REVIEW]"
            } else {
                ""
            };
            let _ = writeln!(
                out,
                "  Q{:<4} {:<3} key {:<3} {:<12} {:<12} {:>5.1}%{marker}",
                d.question_index,
                choice_str(d.selected()),
                choice_str(key),
                d.status().to_string(),
                verdict(d, key).to_string(),
                d.confidence * 100.0
            );
        }
        out
    }
}

fn choice_str(choice: Option<Choice>) -> String {
    choice.map_or_else(|| "-".to_string(), |c| c.to_string())
}

/// A reviewer's correction for one question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnswerOverride {
    pub question_index: usize,
    /// The answer the reviewer read; `None` marks the question blank.
    pub choice: Option<Choice>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// Question-level differences between two readings of a sheet.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultDiff {
    pub baseline_mode: StrictnessMode,
    pub current_mode: StrictnessMode,
    pub baseline_score: u32,
    pub current_score: u32,
    pub score_delta: i64,
    /// Score change per subject in the current result.
    pub subject_deltas: BTreeMap<String, i64>,
    /// Questions flagged now but not in the baseline.
    pub newly_flagged: Vec<usize>,
    /// Questions flagged in the baseline but not now.
    pub cleared_flags: Vec<usize>,
    /// Questions whose status or choice changed.
    pub changes: Vec<QuestionChange>,
    pub unchanged: usize,
    /// Questions in current but not baseline.
    pub new_questions: usize,
    /// Questions in baseline but not current.
    pub removed_questions: usize,
}

/// One question read differently in two results.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionChange {
    pub question_index: usize,
    pub baseline_status: Status,
    pub baseline_choice: Option<Choice>,
    pub current_status: Status,
    pub current_choice: Option<Choice>,
    pub baseline_confidence: f64,
    pub current_confidence: f64,
}

impl ResultDiff {
    /// Returns true if any question was read differently.
    pub fn has_changes(&self) -> bool {
        !self.changes.is_empty() || self.new_questions > 0 || self.removed_questions > 0
    }

    /// Format the diff as markdown.
    pub fn to_markdown(&self) -> String {
        let mut md = String::new();

        let _ = write!(
            md,
            "**Summary:** {} changed, {} unchanged; score {} → {} ({:+})",
            self.changes.len(),
            self.unchanged,
            self.baseline_score,
            self.current_score,
            self.score_delta
        );
        if self.baseline_mode != self.current_mode {
            let _ = write!(md, "; mode {} → {}", self.baseline_mode, self.current_mode);
        }
        md.push_str("\n\n");

        if !self.changes.is_empty() {
            md.push_str("### Changed questions\n\n");
            md.push_str("| Question | Baseline | Current | Confidence |\n");
            md.push_str("|----------|----------|---------|------------|\n");
            for c in &self.changes {
                let _ = writeln!(
                    md,
                    "| Q{} | {} {} | {} {} | {:.0}% → {:.0}% |",
                    c.question_index,
                    c.baseline_status,
                    choice_str(c.baseline_choice),
                    c.current_status,
                    choice_str(c.current_choice),
                    c.baseline_confidence * 100.0,
                    c.current_confidence * 100.0
                );
            }
            md.push('\n');
        }

        if self.subject_deltas.values().any(|&d| d != 0) {
            md.push_str("### Subject scores\n\n");
            md.push_str("| Subject | Delta |\n");
            md.push_str("|---------|-------|\n");
            for (name, delta) in self.subject_deltas.iter().filter(|(_, &d)| d != 0) {
                let _ = writeln!(md, "| {name} | {delta:+} |");
            }
            md.push('\n');
        }

        if !self.newly_flagged.is_empty() {
            let _ = writeln!(md, "Newly flagged: {}", join_questions(&self.newly_flagged));
        }
        if !self.cleared_flags.is_empty() {
            let _ = writeln!(md, "Cleared flags: {}", join_questions(&self.cleared_flags));
        }

        md
    }
}

fn join_questions(indices: &[usize]) -> String {
    indices
        .iter()
        .map(|q| format!("Q{q}"))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Subject;
    use crate::scoring::Tally;
    use std::collections::BTreeSet;

    fn c(ch: char) -> Choice {
        Choice::new(ch).unwrap()
    }

    fn test_def() -> TestDefinition {
        TestDefinition::new(
            "quiz",
            "Quiz",
            vec![Subject {
                name: "Math".into(),
                question_count: 3,
                answer_key: vec![c('A'), c('B'), c('C')],
            }],
        )
        .unwrap()
    }

    fn decision(q: usize, outcome: Outcome, confidence: f64) -> QuestionDecision {
        QuestionDecision {
            question_index: q,
            outcome,
            confidence,
        }
    }

    fn make_result(decisions: Vec<QuestionDecision>, mode: StrictnessMode) -> EvaluationResult {
        let def = test_def();
        let sheet = score(&decisions, &def, &ScoringOptions::default());
        EvaluationResult {
            test_id: def.id,
            exam_version: None,
            mode,
            threshold: 120,
            overall_confidence: overall_confidence(&decisions),
            decisions,
            subject_scores: sheet.subject_scores,
            total_score: sheet.total_score,
            max_score: sheet.max_score,
            flagged_questions: sheet.flagged_questions,
            tally: sheet.tally,
            processing_duration_ms: 3,
            overrides: Vec::new(),
        }
    }

    fn moderate() -> EvaluationResult {
        make_result(
            vec![
                decision(1, Outcome::Answered { choice: c('A') }, 1.0),
                decision(2, Outcome::Answered { choice: c('B') }, 0.9),
                decision(
                    3,
                    Outcome::Ambiguous {
                        candidate: Some(c('C')),
                    },
                    0.4,
                ),
            ],
            StrictnessMode::Moderate,
        )
    }

    fn strict() -> EvaluationResult {
        make_result(
            vec![
                decision(1, Outcome::Answered { choice: c('A') }, 1.0),
                decision(2, Outcome::Blank, 0.3),
                decision(
                    3,
                    Outcome::Ambiguous {
                        candidate: Some(c('C')),
                    },
                    0.4,
                ),
            ],
            StrictnessMode::Strict,
        )
    }

    #[test]
    fn json_roundtrip() {
        let result = moderate();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("result.json");

        result.save_json(&path).unwrap();
        let loaded = EvaluationResult::load_json(&path).unwrap();
        assert_eq!(loaded.decisions, result.decisions);
        assert_eq!(loaded.subject_scores, result.subject_scores);
        assert_eq!(loaded.flagged_questions, result.flagged_questions);
        assert_eq!(loaded.tally, result.tally);
        assert!((loaded.overall_confidence - result.overall_confidence).abs() < 1e-12);
    }

    #[test]
    fn serialized_shape_is_stable() {
        let json = serde_json::to_value(moderate()).unwrap();
        let q3 = &json["decisions"][2];
        assert_eq!(q3["question_index"], 3);
        assert_eq!(q3["choice"], "C");
        assert_eq!(q3["status"], "ambiguous");
        assert_eq!(json["subject_scores"]["Math"], 2);
        assert_eq!(json["flagged_questions"], serde_json::json!([3]));
        assert_eq!(json["processing_duration_ms"], 3);
    }

    #[test]
    fn compare_identical_results() {
        let diff = moderate().compare(&moderate());
        assert!(!diff.has_changes());
        assert_eq!(diff.unchanged, 3);
        assert_eq!(diff.score_delta, 0);
    }

    #[test]
    fn compare_across_modes() {
        let diff = strict().compare(&moderate());
        assert!(diff.has_changes());
        assert_eq!(diff.changes.len(), 1);
        let change = &diff.changes[0];
        assert_eq!(change.question_index, 2);
        assert_eq!(change.baseline_status, Status::Answered);
        assert_eq!(change.current_status, Status::Blank);
        assert_eq!(diff.score_delta, -1);
        assert_eq!(diff.subject_deltas["Math"], -1);
        assert_eq!(diff.newly_flagged, vec![2]);

        let md = diff.to_markdown();
        assert!(md.contains("Changed questions"));
        assert!(md.contains("| Q2 | answered B | blank - |"));
        assert!(md.contains("mode moderate → strict"));
    }

    #[test]
    fn overrides_produce_new_result() {
        let original = moderate();
        let overrides = vec![AnswerOverride {
            question_index: 3,
            choice: Some(c('C')),
            note: Some("clear on paper".into()),
        }];
        let corrected = original
            .with_overrides(&overrides, &test_def(), &ScoringOptions::default())
            .unwrap();

        assert_eq!(original.total_score, 2);
        assert!(original.is_flagged(3));
        assert_eq!(corrected.total_score, 3);
        assert!(corrected.flagged_questions.is_empty());
        assert_eq!(corrected.decision(3).unwrap().status(), Status::Answered);
        assert_eq!(corrected.decision(3).unwrap().confidence, 1.0);
        assert_eq!(
            corrected.tally,
            Tally {
                correct: 3,
                ..Tally::default()
            }
        );
        assert_eq!(corrected.processing_duration_ms, original.processing_duration_ms);
    }

    #[test]
    fn override_to_blank() {
        let corrected = moderate()
            .with_overrides(
                &[AnswerOverride {
                    question_index: 1,
                    choice: None,
                    note: None,
                }],
                &test_def(),
                &ScoringOptions::default(),
            )
            .unwrap();
        assert_eq!(corrected.decision(1).unwrap().status(), Status::Blank);
        assert_eq!(corrected.total_score, 1);
        assert_eq!(corrected.flagged_questions, BTreeSet::from([3]));
    }

    #[test]
    fn override_unknown_question_fails() {
        let err = moderate()
            .with_overrides(
                &[AnswerOverride {
                    question_index: 9,
                    choice: None,
                    note: None,
                }],
                &test_def(),
                &ScoringOptions::default(),
            )
            .unwrap_err();
        assert!(err.to_string().contains("no question 9"));
    }

    #[test]
    fn overrides_are_recorded_and_original_kept() {
        let original = moderate();
        let first = original
            .with_overrides(
                &[AnswerOverride {
                    question_index: 3,
                    choice: Some(c('B')),
                    note: Some("faint pencil".into()),
                }],
                &test_def(),
                &ScoringOptions::default(),
            )
            .unwrap();
        assert!(original.overrides.is_empty());
        assert_eq!(original.decision(3).unwrap().status(), Status::Ambiguous);
        assert_eq!(first.overrides.len(), 1);
        assert_eq!(first.overrides[0].note.as_deref(), Some("faint pencil"));

        let second = first
            .with_overrides(
                &[
                    AnswerOverride {
                        question_index: 3,
                        choice: Some(c('C')),
                        note: None,
                    },
                    AnswerOverride {
                        question_index: 1,
                        choice: None,
                        note: None,
                    },
                ],
                &test_def(),
                &ScoringOptions::default(),
            )
            .unwrap();
        let recorded: Vec<_> = second
            .overrides
            .iter()
            .map(|o| (o.question_index, o.choice))
            .collect();
        assert_eq!(recorded, vec![(1, None), (3, Some(c('C')))]);

        let json = serde_json::to_string(&second).unwrap();
        let back: EvaluationResult = serde_json::from_str(&json).unwrap();
        assert_eq!(back.overrides, second.overrides);
        assert!(!serde_json::to_string(&original).unwrap().contains("overrides"));
    }

    #[test]
    fn text_report_lists_flags() {
        let text = moderate().to_text_report(&test_def());
        assert!(text.contains("Total: 2/3"));
        assert!(text.contains("Math"));
        assert!(text.contains("[REVIEW]"));
        assert_eq!(text.matches("[REVIEW]").count(), 1);
    }
}
