//! Grayscale sheet images, decoding, and global binarization.

use std::path::Path;

use anyhow::{Context, Result};
use image::imageops::FilterType;
use image::{GrayImage, Luma};
use imageproc::contrast::otsu_level;
use serde::{Deserialize, Serialize};

use crate::model::Dimensions;

/// A borrowed 8-bit grayscale sheet with explicit row stride.
#[derive(Debug, Clone, Copy)]
pub struct SheetImage<'a> {
    data: &'a [u8],
    width: usize,
    height: usize,
    stride: usize,
    /// The decoded image this view borrows, when it covers all of it.
    source: Option<&'a GrayImage>,
}

impl<'a> SheetImage<'a> {
    /// Wrap a raw buffer after checking it is large enough for the layout.
    pub fn new(data: &'a [u8], width: usize, height: usize, stride: usize) -> Result<Self> {
        anyhow::ensure!(
            stride >= width,
            "stride ({stride}) cannot be less than width ({width})"
        );
        let required = if height > 0 {
            (height - 1) * stride + width
        } else {
            0
        };
        anyhow::ensure!(
            data.len() >= required,
            "buffer size ({}) is too small for {width}x{height} image with stride {stride} \
             (required: {required})",
            data.len()
        );
        Ok(Self {
            data,
            width,
            height,
            stride,
            source: None,
        })
    }

    /// Borrow a decoded grayscale image.
    pub fn from_gray(img: &'a GrayImage) -> Self {
        let width = img.width() as usize;
        Self {
            data: img.as_raw(),
            width,
            height: img.height() as usize,
            stride: width,
            source: Some(img),
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn dimensions(&self) -> Dimensions {
        Dimensions::new(self.width as u32, self.height as u32)
    }

    /// Pixels of row `y`, without stride padding.
    #[inline]
    pub fn row(&self, y: usize) -> &'a [u8] {
        let start = y * self.stride;
        &self.data[start..start + self.width]
    }

    #[inline]
    pub fn pixel(&self, x: usize, y: usize) -> u8 {
        self.row(y)[x]
    }

    /// Copy the view into an owned image, dropping stride padding.
    pub fn to_gray(&self) -> GrayImage {
        GrayImage::from_fn(self.width as u32, self.height as u32, |x, y| {
            Luma([self.pixel(x as usize, y as usize)])
        })
    }

    /// Iterate every pixel in row-major order.
    pub fn pixels(&self) -> impl Iterator<Item = u8> + 'a {
        let this = *self;
        (0..this.height).flat_map(move |y| this.row(y).iter().copied())
    }
}

/// How the dark/light cut-off is chosen for a sheet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThresholdStrategy {
    /// Otsu's method over the whole sheet.
    #[default]
    Otsu,
    /// A fixed intensity; pixels at or below it are dark.
    Fixed(u8),
}

impl ThresholdStrategy {
    pub fn threshold_for(self, image: &SheetImage<'_>) -> u8 {
        match self {
            ThresholdStrategy::Otsu => otsu_threshold(image),
            ThresholdStrategy::Fixed(t) => t,
        }
    }
}

/// Otsu's global threshold: the cut that maximizes between-class variance.
///
/// Pixels with intensity `<= threshold` form the dark class. A uniform image
/// yields 0.
pub fn otsu_threshold(image: &SheetImage<'_>) -> u8 {
    match image.source {
        Some(gray) => otsu_level(gray),
        None => otsu_level(&image.to_gray()),
    }
}

/// Decode an image file and convert it to 8-bit grayscale.
pub fn load_sheet(path: &Path) -> Result<GrayImage> {
    let img = image::open(path)
        .with_context(|| format!("failed to decode sheet image: {}", path.display()))?;
    Ok(img.into_luma8())
}

/// Resize a sheet to the template's page dimensions.
///
/// Stand-in for upstream normalization when scans arrive at a different
/// resolution; does not correct rotation or perspective.
pub fn normalize_to_page(img: &GrayImage, page: Dimensions) -> GrayImage {
    if img.width() == page.width && img.height() == page.height {
        return img.clone();
    }
    tracing::debug!(
        from = %format!("{}x{}", img.width(), img.height()),
        to = %page,
        "resizing sheet to page dimensions"
    );
    image::imageops::resize(img, page.width, page.height, FilterType::Triangle)
}
