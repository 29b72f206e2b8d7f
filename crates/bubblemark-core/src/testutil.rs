//! Synthetic sheets for unit tests.

use image::{GrayImage, Luma};

use crate::grid::map_bubbles;
use crate::model::{Choice, Dimensions, FieldBlock, FieldType, Subject, Template, TestDefinition};

pub(crate) fn c(ch: char) -> Choice {
    Choice::new(ch).unwrap()
}

/// One block, two 4-choice questions, 10x10 bubbles 30px apart.
pub(crate) fn two_question_template() -> Template {
    Template {
        page_dimensions: Dimensions::new(160, 100),
        bubble_dimensions: Dimensions::new(10, 10),
        field_blocks: vec![FieldBlock {
            name: "Questions".into(),
            field_type: FieldType::Mcq4,
            origin: [20.0, 20.0],
            bubbles_gap: 30.0,
            labels_gap: 40.0,
            field_labels: vec!["q1".into(), "q2".into()],
            direction: None,
        }],
    }
}

/// Single-subject test with one question per key character.
pub(crate) fn single_subject_test(key: &str) -> TestDefinition {
    TestDefinition::new(
        "quiz",
        "Quiz",
        vec![Subject {
            name: "Math".into(),
            question_count: key.len(),
            answer_key: key.chars().map(c).collect(),
        }],
    )
    .unwrap()
}

/// White page with `ratio` of each listed bubble's mask painted black,
/// row by row from the top-left of the mask.
pub(crate) fn render(template: &Template, marks: &[(usize, char, f64)]) -> GrayImage {
    let page = template.page_dimensions;
    let size = template.bubble_dimensions;
    let mut img = GrayImage::from_pixel(page.width, page.height, Luma([255]));
    let positions = map_bubbles(template).unwrap();
    for &(q, ch, ratio) in marks {
        let pos = positions
            .iter()
            .find(|p| p.question_index == q && p.choice == c(ch))
            .unwrap();
        let x0 = (pos.center_x - size.width as f64 / 2.0).round() as u32;
        let y0 = (pos.center_y - size.height as f64 / 2.0).round() as u32;
        let dark = (ratio * (size.width * size.height) as f64).round() as u32;
        for i in 0..dark {
            img.put_pixel(x0 + i % size.width, y0 + i / size.width, Luma([0]));
        }
    }
    img
}
