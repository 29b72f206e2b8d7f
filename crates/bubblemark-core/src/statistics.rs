//! Batch-level statistics and item analysis.
//!
//! Summarizes many evaluated sheets: score distribution, confidence, flag
//! rate, and per-question difficulty.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::model::{Choice, TestCatalog};
use crate::results::{EvaluationResult, Status};
use crate::scoring::{verdict, Verdict};

/// Aggregate statistics for a batch of sheets.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchStats {
    /// Sheets submitted.
    pub sheets_total: usize,
    /// Sheets that produced a result.
    pub sheets_evaluated: usize,
    /// Sheets that failed fatally or timed out.
    pub sheets_failed: usize,
    pub mean_score: f64,
    pub min_score: u32,
    pub max_score: u32,
    /// Population standard deviation of total scores.
    pub score_std_dev: f64,
    /// Mean of per-sheet percentages.
    pub mean_percentage: f64,
    /// Mean of per-sheet overall confidence.
    pub mean_confidence: f64,
    /// Flagged questions over all questions of all evaluated sheets.
    pub flag_rate: f64,
    /// Mean score per subject.
    pub per_subject_mean: BTreeMap<String, f64>,
    /// Item analysis keyed by question index.
    pub per_question: BTreeMap<usize, QuestionStats>,
}

/// How one question performed across the batch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QuestionStats {
    /// Sheets that had a decision for this question.
    pub responses: usize,
    /// Fraction answered correctly (item difficulty index).
    pub correct_rate: f64,
    /// Fraction flagged for review.
    pub flag_rate: f64,
    /// Fraction read as blank.
    pub blank_rate: f64,
    /// How often each choice was selected.
    pub choice_counts: BTreeMap<Choice, usize>,
}

/// Compute statistics from evaluated sheets.
///
/// `catalog` supplies the answer key for each sheet's exam version; sheets
/// whose version is not in the catalog are left out of the correct rate.
pub fn compute_batch_stats(
    results: &[&EvaluationResult],
    failed: usize,
    catalog: &TestCatalog,
) -> BatchStats {
    let n = results.len();
    let mut stats = BatchStats {
        sheets_total: n + failed,
        sheets_evaluated: n,
        sheets_failed: failed,
        ..Default::default()
    };
    if n == 0 {
        return stats;
    }

    let scores: Vec<f64> = results.iter().map(|r| r.total_score as f64).collect();
    stats.mean_score = mean(&scores);
    stats.score_std_dev = std_dev(&scores, stats.mean_score);
    stats.min_score = results.iter().map(|r| r.total_score).min().unwrap_or(0);
    stats.max_score = results.iter().map(|r| r.total_score).max().unwrap_or(0);
    stats.mean_percentage = mean(&results.iter().map(|r| r.percentage()).collect::<Vec<_>>());
    stats.mean_confidence = mean(
        &results
            .iter()
            .map(|r| r.overall_confidence)
            .collect::<Vec<_>>(),
    );

    let questions: usize = results.iter().map(|r| r.decisions.len()).sum();
    let flagged: usize = results.iter().map(|r| r.flagged_questions.len()).sum();
    stats.flag_rate = if questions == 0 {
        0.0
    } else {
        flagged as f64 / questions as f64
    };

    let mut subject_totals: BTreeMap<String, (u64, usize)> = BTreeMap::new();
    for r in results {
        for (name, &score) in &r.subject_scores {
            let entry = subject_totals.entry(name.clone()).or_default();
            entry.0 += score as u64;
            entry.1 += 1;
        }
    }
    stats.per_subject_mean = subject_totals
        .into_iter()
        .map(|(name, (sum, count))| (name, sum as f64 / count as f64))
        .collect();

    #[derive(Default)]
    struct Counts {
        responses: usize,
        keyed: usize,
        correct: usize,
        flagged: usize,
        blank: usize,
        choices: BTreeMap<Choice, usize>,
    }

    let mut per_question: BTreeMap<usize, Counts> = BTreeMap::new();
    for r in results {
        let test = catalog.resolve(r.exam_version.as_deref());
        if test.is_none() {
            tracing::debug!(
                version = ?r.exam_version,
                "no answer key for sheet version; skipping item difficulty"
            );
        }
        for d in &r.decisions {
            let counts = per_question.entry(d.question_index).or_default();
            counts.responses += 1;
            if r.is_flagged(d.question_index) {
                counts.flagged += 1;
            }
            if d.status() == Status::Blank {
                counts.blank += 1;
            }
            if let Some(choice) = d.selected() {
                *counts.choices.entry(choice).or_default() += 1;
            }
            if let Some(test) = test {
                counts.keyed += 1;
                if verdict(d, test.answer_for(d.question_index)) == Verdict::Correct {
                    counts.correct += 1;
                }
            }
        }
    }

    stats.per_question = per_question
        .into_iter()
        .map(|(q, c)| {
            let rate = |x: usize, of: usize| if of == 0 { 0.0 } else { x as f64 / of as f64 };
            (
                q,
                QuestionStats {
                    responses: c.responses,
                    correct_rate: rate(c.correct, c.keyed),
                    flag_rate: rate(c.flagged, c.responses),
                    blank_rate: rate(c.blank, c.responses),
                    choice_counts: c.choices,
                },
            )
        })
        .collect();

    stats
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

fn std_dev(values: &[f64], mean: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64;
    variance.sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Subject, TestDefinition};
    use crate::policy::StrictnessMode;
    use crate::results::{overall_confidence, Outcome, QuestionDecision};
    use crate::scoring::{score, ScoringOptions};

    fn c(ch: char) -> Choice {
        Choice::new(ch).unwrap()
    }

    fn test_def() -> TestDefinition {
        TestDefinition::new(
            "quiz",
            "Quiz",
            vec![
                Subject {
                    name: "Math".into(),
                    question_count: 1,
                    answer_key: vec![c('A')],
                },
                Subject {
                    name: "Logic".into(),
                    question_count: 1,
                    answer_key: vec![c('B')],
                },
            ],
        )
        .unwrap()
    }

    fn sheet(answers: [Option<char>; 2]) -> EvaluationResult {
        let def = test_def();
        let decisions: Vec<_> = answers
            .iter()
            .enumerate()
            .map(|(i, a)| QuestionDecision {
                question_index: i + 1,
                outcome: match a {
                    Some(ch) => Outcome::Answered { choice: c(*ch) },
                    None => Outcome::Blank,
                },
                confidence: if a.is_some() { 1.0 } else { 0.4 },
            })
            .collect();
        let s = score(&decisions, &def, &ScoringOptions::default());
        EvaluationResult {
            test_id: def.id,
            exam_version: None,
            mode: StrictnessMode::Moderate,
            threshold: 100,
            overall_confidence: overall_confidence(&decisions),
            decisions,
            subject_scores: s.subject_scores,
            total_score: s.total_score,
            max_score: s.max_score,
            flagged_questions: s.flagged_questions,
            tally: s.tally,
            processing_duration_ms: 1,
            overrides: Vec::new(),
        }
    }

    #[test]
    fn empty_batch() {
        let stats = compute_batch_stats(&[], 2, &TestCatalog::new(vec![test_def()]));
        assert_eq!(stats.sheets_total, 2);
        assert_eq!(stats.sheets_failed, 2);
        assert_eq!(stats.mean_score, 0.0);
        assert!(stats.per_question.is_empty());
    }

    #[test]
    fn score_distribution_and_subject_means() {
        let a = sheet([Some('A'), Some('B')]);
        let b = sheet([Some('A'), Some('C')]);
        let c_ = sheet([Some('D'), None]);
        let catalog = TestCatalog::new(vec![test_def()]);
        let stats = compute_batch_stats(&[&a, &b, &c_], 1, &catalog);

        assert_eq!(stats.sheets_total, 4);
        assert_eq!(stats.sheets_evaluated, 3);
        assert_eq!(stats.min_score, 0);
        assert_eq!(stats.max_score, 2);
        assert!((stats.mean_score - 1.0).abs() < 1e-12);
        assert!((stats.score_std_dev - (2.0f64 / 3.0).sqrt()).abs() < 1e-12);
        assert!((stats.per_subject_mean["Math"] - 2.0 / 3.0).abs() < 1e-12);
        assert!((stats.per_subject_mean["Logic"] - 1.0 / 3.0).abs() < 1e-12);
        assert!((stats.flag_rate - 1.0 / 6.0).abs() < 1e-12);
    }

    #[test]
    fn item_analysis() {
        let a = sheet([Some('A'), Some('B')]);
        let b = sheet([Some('A'), Some('C')]);
        let c_ = sheet([Some('D'), None]);
        let catalog = TestCatalog::new(vec![test_def()]);
        let stats = compute_batch_stats(&[&a, &b, &c_], 0, &catalog);

        let q1 = &stats.per_question[&1];
        assert_eq!(q1.responses, 3);
        assert!((q1.correct_rate - 2.0 / 3.0).abs() < 1e-12);
        assert_eq!(q1.choice_counts[&c('A')], 2);
        assert_eq!(q1.choice_counts[&c('D')], 1);

        let q2 = &stats.per_question[&2];
        assert!((q2.blank_rate - 1.0 / 3.0).abs() < 1e-12);
        assert!((q2.flag_rate - 1.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn unknown_version_skips_correct_rate() {
        let mut a = sheet([Some('A'), Some('B')]);
        a.exam_version = Some("Z".into());
        let catalog = TestCatalog::new(vec![test_def().with_version("A")]);
        let stats = compute_batch_stats(&[&a], 0, &catalog);
        assert_eq!(stats.per_question[&1].correct_rate, 0.0);
        assert_eq!(stats.per_question[&1].responses, 1);
    }

    #[test]
    fn stats_serialize_with_choice_keys() {
        let a = sheet([Some('A'), Some('B')]);
        let stats = compute_batch_stats(&[&a], 0, &TestCatalog::new(vec![test_def()]));
        let json = serde_json::to_value(&stats).unwrap();
        assert_eq!(json["per_question"]["1"]["choice_counts"]["A"], 1);
        let back: BatchStats = serde_json::from_value(json).unwrap();
        assert_eq!(back, stats);
    }
}
