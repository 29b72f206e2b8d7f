//! Grid mapping: template geometry to bubble centres.
//!
//! Pure function of the template, so the output can be cached per template
//! and shared between concurrent evaluations.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::OmrError;
use crate::model::{Choice, Direction, Template};

/// Centre of one bubble on the page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BubblePosition {
    /// 1-based question index across the whole template.
    pub question_index: usize,
    /// Field label of the question (e.g. "q12").
    pub label: String,
    pub choice: Choice,
    pub center_x: f64,
    pub center_y: f64,
}

/// Compute the centre of every bubble, in reading order.
///
/// Question indices run across field blocks in template order; within a
/// question, choices follow the field type's label order.
pub fn map_bubbles(template: &Template) -> Result<Vec<BubblePosition>, OmrError> {
    validate_template(template)?;

    let page = template.page_dimensions;
    let mut positions = Vec::with_capacity(template.bubble_count());
    let mut question_index = 0usize;

    for block in &template.field_blocks {
        let choices = block.field_type.choices();
        let [ox, oy] = block.origin;

        for (i, label) in block.field_labels.iter().enumerate() {
            question_index += 1;
            let label_offset = i as f64 * block.labels_gap;

            for (c, &choice) in choices.iter().enumerate() {
                let bubble_offset = c as f64 * block.bubbles_gap;
                let (center_x, center_y) = match block.direction() {
                    Direction::Horizontal => (ox + bubble_offset, oy + label_offset),
                    Direction::Vertical => (ox + label_offset, oy + bubble_offset),
                };

                if !(0.0..page.width as f64).contains(&center_x)
                    || !(0.0..page.height as f64).contains(&center_y)
                {
                    return Err(OmrError::InvalidTemplate(format!(
                        "block '{}': bubble {choice} of '{label}' at ({center_x}, {center_y}) \
                         lies outside the {page} page",
                        block.name
                    )));
                }

                positions.push(BubblePosition {
                    question_index,
                    label: label.clone(),
                    choice,
                    center_x,
                    center_y,
                });
            }
        }
    }

    tracing::debug!(
        questions = question_index,
        bubbles = positions.len(),
        "mapped bubble grid"
    );
    Ok(positions)
}

fn validate_template(template: &Template) -> Result<(), OmrError> {
    let page = template.page_dimensions;
    let bubble = template.bubble_dimensions;
    if page.width == 0 || page.height == 0 {
        return Err(OmrError::InvalidTemplate(format!(
            "page dimensions must be non-zero, got {page}"
        )));
    }
    if bubble.width == 0 || bubble.height == 0 {
        return Err(OmrError::InvalidTemplate(format!(
            "bubble dimensions must be non-zero, got {bubble}"
        )));
    }
    if template.field_blocks.is_empty() {
        return Err(OmrError::InvalidTemplate("template has no field blocks".into()));
    }

    let mut seen = HashSet::new();
    for block in &template.field_blocks {
        if block.field_labels.is_empty() {
            return Err(OmrError::InvalidTemplate(format!(
                "block '{}' has no field labels",
                block.name
            )));
        }
        let gaps_ok = block.bubbles_gap.is_finite()
            && block.labels_gap.is_finite()
            && block.origin.iter().all(|v| v.is_finite());
        if !gaps_ok {
            return Err(OmrError::InvalidTemplate(format!(
                "block '{}' has non-finite geometry",
                block.name
            )));
        }
        for label in &block.field_labels {
            if !seen.insert(label.as_str()) {
                return Err(OmrError::InvalidTemplate(format!(
                    "duplicate field label: {label}"
                )));
            }
        }
    }
    Ok(())
}
