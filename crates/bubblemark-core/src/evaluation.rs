//! Single-sheet evaluation: grid → analysis → resolution → scoring.

use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::analysis::analyze;
use crate::error::{OmrError, PartialEvaluation, Stage};
use crate::grid::map_bubbles;
use crate::model::{Template, TestDefinition};
use crate::policy::StrictnessMode;
use crate::resolver::resolve_sheet;
use crate::results::{overall_confidence, EvaluationResult};
use crate::scoring::{score, ScoringOptions};
use crate::sheet::{SheetImage, ThresholdStrategy};

/// Per-run knobs that are not part of the template or test.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct EvaluateOptions {
    pub threshold: ThresholdStrategy,
    pub scoring: ScoringOptions,
}

/// Evaluate one rectified sheet.
///
/// Fails only when the sheet as a whole cannot be read against the template:
/// a broken template, an image whose size differs from the page, or a
/// template whose question count disagrees with the test. Everything below
/// that level ends up in decision statuses and flags.
pub fn evaluate(
    image: &SheetImage<'_>,
    template: &Template,
    test: &TestDefinition,
    mode: StrictnessMode,
    options: &EvaluateOptions,
) -> Result<EvaluationResult, OmrError> {
    let started = Instant::now();
    let partial = |stage, bubbles_mapped| PartialEvaluation {
        stage,
        bubbles_mapped,
        elapsed_ms: started.elapsed().as_millis() as u64,
    };

    let positions = map_bubbles(template)
        .map_err(|e| OmrError::failed(e.to_string(), partial(Stage::GridMapping, 0)))?;

    if image.dimensions() != template.page_dimensions {
        return Err(OmrError::failed(
            format!(
                "image is {}, template page is {}",
                image.dimensions(),
                template.page_dimensions
            ),
            partial(Stage::Validation, positions.len()),
        ));
    }

    if template.question_count() != test.total_questions() {
        return Err(OmrError::failed(
            format!(
                "template has {} questions, test '{}' has {}",
                template.question_count(),
                test.id,
                test.total_questions()
            ),
            partial(Stage::Validation, positions.len()),
        ));
    }

    let analysis = analyze(
        image,
        &positions,
        template.bubble_dimensions,
        options.threshold,
    );
    let decisions = resolve_sheet(&analysis, 1..=template.question_count(), mode);
    let sheet = score(&decisions, test, &options.scoring);

    let result = EvaluationResult {
        test_id: test.id.clone(),
        exam_version: test.version.clone(),
        mode,
        threshold: analysis.threshold,
        overall_confidence: overall_confidence(&decisions),
        decisions,
        subject_scores: sheet.subject_scores,
        total_score: sheet.total_score,
        max_score: sheet.max_score,
        flagged_questions: sheet.flagged_questions,
        tally: sheet.tally,
        processing_duration_ms: started.elapsed().as_millis() as u64,
        overrides: Vec::new(),
    };

    tracing::info!(
        test = %result.test_id,
        %mode,
        score = result.total_score,
        max = result.max_score,
        flagged = result.flagged_questions.len(),
        unreadable = analysis.out_of_bounds_count(),
        "sheet evaluated in {}ms",
        result.processing_duration_ms
    );

    Ok(result)
}
