//! Fill analysis: how dark each bubble's mask is.

use crate::error::OmrError;
use crate::grid::BubblePosition;
use crate::model::Dimensions;
use crate::results::{BoundingBox, BubbleFeature};
use crate::sheet::{SheetImage, ThresholdStrategy};

/// Per-bubble measurements of one sheet.
#[derive(Debug, Clone)]
pub struct SheetAnalysis {
    /// Intensity at or below which a pixel counts as dark.
    pub threshold: u8,
    /// One entry per bubble position, in the same order.
    pub bubbles: Vec<Result<BubbleFeature, OmrError>>,
}

impl SheetAnalysis {
    pub fn out_of_bounds_count(&self) -> usize {
        self.bubbles.iter().filter(|b| b.is_err()).count()
    }
}

/// Measure every bubble on a sheet.
///
/// The binarization threshold is computed once for the whole sheet. A bubble
/// whose mask leaves the image yields `OutOfBounds` for that bubble only.
pub fn analyze(
    image: &SheetImage<'_>,
    positions: &[BubblePosition],
    bubble_dimensions: Dimensions,
    strategy: ThresholdStrategy,
) -> SheetAnalysis {
    let threshold = strategy.threshold_for(image);
    tracing::debug!(threshold, ?strategy, "sheet threshold");

    let bubbles = positions
        .iter()
        .map(|pos| measure_bubble(image, pos, bubble_dimensions, threshold))
        .inspect(|res| {
            if let Err(e) = res {
                tracing::warn!("{e}");
            }
        })
        .collect();

    SheetAnalysis { threshold, bubbles }
}

/// Measure a single bubble mask centred on `pos`.
pub fn measure_bubble(
    image: &SheetImage<'_>,
    pos: &BubblePosition,
    size: Dimensions,
    threshold: u8,
) -> Result<BubbleFeature, OmrError> {
    let x0 = (pos.center_x - size.width as f64 / 2.0).round() as i64;
    let y0 = (pos.center_y - size.height as f64 / 2.0).round() as i64;

    let fits = x0 >= 0
        && y0 >= 0
        && x0 + size.width as i64 <= image.width() as i64
        && y0 + size.height as i64 <= image.height() as i64;
    if !fits {
        return Err(OmrError::OutOfBounds {
            question_index: pos.question_index,
            choice: pos.choice,
            x: x0,
            y: y0,
            width: size.width,
            height: size.height,
        });
    }

    let (x0, y0) = (x0 as usize, y0 as usize);
    let (w, h) = (size.width as usize, size.height as usize);
    let mut dark = 0u64;
    let mut sum = 0u64;
    for y in y0..y0 + h {
        for &p in &image.row(y)[x0..x0 + w] {
            sum += p as u64;
            if p <= threshold {
                dark += 1;
            }
        }
    }

    let area = (w * h) as f64;
    Ok(BubbleFeature {
        question_index: pos.question_index,
        choice: pos.choice,
        fill_ratio: dark as f64 / area,
        mean_intensity: sum as f64 / area,
        bbox: BoundingBox {
            x: x0 as u32,
            y: y0 as u32,
            width: size.width,
            height: size.height,
        },
    })
}
