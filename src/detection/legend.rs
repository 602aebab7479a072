//! Legend reconstruction from scattered OCR fragments
//!
//! Chart legends are a colored square followed by a label. The glyphs are
//! isolated from the de-charted image, merged into line blocks, read by the
//! OCR engine and matched against the profile's label patterns. For each
//! recognized label the square is searched in a band, one line high, just
//! left of the block, and its color is sampled on the original image.

use opencv::{
    core::{Mat, Rect, Scalar, Vec3b},
    imgproc::{
        arc_length, contour_area, MORPH_ELLIPSE, MORPH_RECT, RETR_EXTERNAL, THRESH_BINARY_INV,
        THRESH_OTSU,
    },
    prelude::*,
};
use palette::Srgb;
use serde::Serialize;
use tracing::{debug, warn};

use crate::color::PackedColor;
use crate::config::Profile;
use crate::constants::legend;
use crate::imaging;
use crate::label::Label;
use crate::ocr::{OcrRequest, RecognitionMode, TextRecognizer};
use crate::{ChartError, Result};

/// A label and the color of its legend square
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LegendEntry {
    pub label: Label,
    pub color: PackedColor,
}

impl LegendEntry {
    pub fn new(label: Label, color: PackedColor) -> Self {
        Self { label, color }
    }

    pub fn srgb(&self) -> Srgb<u8> {
        self.color.to_srgb()
    }
}

/// Label→color map with at most one entry per label
///
/// Entries keep their insertion order; the first entry for a label wins.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Legend {
    entries: Vec<LegendEntry>,
}

impl Legend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_entries(entries: impl IntoIterator<Item = LegendEntry>) -> Self {
        let mut legend = Self::new();
        for entry in entries {
            legend.insert(entry);
        }
        legend
    }

    /// Add an entry; returns false and keeps the existing one when the
    /// label is already known
    pub fn insert(&mut self, entry: LegendEntry) -> bool {
        if self.contains(entry.label) {
            return false;
        }
        self.entries.push(entry);
        true
    }

    pub fn contains(&self, label: Label) -> bool {
        self.entries.iter().any(|e| e.label == label)
    }

    /// Copy holding only the entries accepted by `keep`
    pub fn filtered(&self, keep: impl Fn(&LegendEntry) -> bool) -> Self {
        Self {
            entries: self.entries.iter().filter(|e| keep(e)).copied().collect(),
        }
    }

    pub fn remove(&mut self, label: Label) {
        self.entries.retain(|e| e.label != label);
    }

    pub fn iter(&self) -> impl Iterator<Item = &LegendEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Rebuilds a chart legend with OCR
pub struct LegendReconstructor {
    glyph_threshold: f64,
    min_block_width: i32,
}

impl Default for LegendReconstructor {
    fn default() -> Self {
        Self::new()
    }
}

impl LegendReconstructor {
    pub fn new() -> Self {
        Self {
            glyph_threshold: legend::GLYPH_THRESHOLD,
            min_block_width: legend::MIN_BLOCK_WIDTH,
        }
    }

    pub fn from_profile(profile: &Profile) -> Self {
        Self {
            glyph_threshold: profile.glyph_threshold,
            ..Self::new()
        }
    }

    /// Scan the de-charted image for legend labels and their colors
    ///
    /// `original` is the unmodified image: OCR and color sampling run on it,
    /// `decharted` only drives the block and swatch segmentation. An empty
    /// legend is a normal outcome.
    pub fn reconstruct(
        &self,
        original: &Mat,
        decharted: &Mat,
        profile: &Profile,
        recognizer: &dyn TextRecognizer,
    ) -> Result<Legend> {
        let mut found = Legend::new();
        if !profile.has_legend_patterns() {
            return Ok(found);
        }

        let gray = imaging::to_gray(decharted)?;
        let blocks = self.line_blocks(&gray, profile)?;
        debug!(blocks = blocks.len(), profile = %profile.name, "legend line blocks");

        for block in blocks {
            let text = recognizer.recognize(&OcrRequest::new(original, block, RecognitionMode::Block))?;
            let lines: Vec<&str> = text.trim().lines().collect();
            let count = lines.len() as i32;

            for (i, line) in lines.iter().enumerate() {
                let Some(label) = profile.match_legend_label(line) else {
                    if line.trim().len() > 2 {
                        warn!(text = %line, "no legend label matches");
                    }
                    continue;
                };
                if found.contains(label) {
                    debug!(%label, text = %line, "skip already found label");
                    continue;
                }

                let line_height = (block.height / count).max(1);
                let line_y = block.y + block.height * i as i32 / count;
                let x0 = (block.x - line_height).max(0);
                let band = Rect::new(x0, line_y, block.x + 2 - x0, line_height);

                match self.swatch_color(original, &gray, band)? {
                    Some(color) => {
                        debug!(%label, %color, text = %line, "legend entry");
                        found.insert(LegendEntry::new(label, color));
                    }
                    None => warn!(%label, text = %line, "no color square next to legend label"),
                }
            }
        }

        Ok(found)
    }

    /// Bounding boxes of the text lines of the de-charted image, trimmed
    /// and sorted top-to-bottom
    fn line_blocks(&self, gray: &Mat, profile: &Profile) -> Result<Vec<Rect>> {
        let (mut glyphs, _) = imaging::threshold(gray, self.glyph_threshold, THRESH_BINARY_INV)?;

        // blobs that survive an erosion thicker than a glyph stroke are
        // color squares or pictograms
        let blob_kernel = imaging::kernel(MORPH_ELLIPSE, legend::BLOB_KERNEL_SIZE, legend::BLOB_KERNEL_SIZE)?;
        let grow_kernel = imaging::kernel(MORPH_RECT, legend::BLOB_GROW_SIZE, legend::BLOB_GROW_SIZE)?;
        let blobs = imaging::erode(&glyphs, &blob_kernel)?;
        let blobs = imaging::dilate(&blobs, &blob_kernel)?;
        let blobs = imaging::dilate(&blobs, &grow_kernel)?;
        glyphs
            .set_to(&Scalar::all(0.0), &blobs)
            .map_err(|e| ChartError::opencv("blob removal", e))?;

        let line_kernel = imaging::kernel(MORPH_RECT, profile.horizontal_dilation, profile.vertical_dilation)?;
        let lines = imaging::dilate(&glyphs, &line_kernel)?;

        Ok(imaging::block_boxes(&lines, RETR_EXTERNAL)?
            .into_iter()
            .filter(|r| r.width >= self.min_block_width)
            .map(|r| {
                Rect::new(
                    r.x + legend::BLOCK_SHRINK,
                    r.y,
                    r.width - 2 * legend::BLOCK_SHRINK,
                    r.height,
                )
            })
            .collect())
    }

    /// Color at the center of the most compact dark shape in `band`
    fn swatch_color(&self, original: &Mat, gray: &Mat, band: Rect) -> Result<Option<PackedColor>> {
        let Some(band) = imaging::clamp_rect(band, gray.cols(), gray.rows()) else {
            return Ok(None);
        };
        let strip = imaging::crop(gray, band)?;
        let strip = imaging::gamma_correct(&strip, legend::SWATCH_GAMMA)?;
        let (mask, _) = imaging::threshold(&strip, 0.0, THRESH_OTSU | THRESH_BINARY_INV)?;

        let mut best: Option<(f64, Rect)> = None;
        for contour in imaging::contours(&mask, RETR_EXTERNAL)?.iter() {
            let area = contour_area(&contour, false).map_err(|e| ChartError::opencv("contour area", e))?;
            let perimeter = arc_length(&contour, true).map_err(|e| ChartError::opencv("contour perimeter", e))?;
            let compactness = area / perimeter.max(1.0);
            if best.map_or(true, |(score, _)| compactness > score) {
                best = Some((compactness, imaging::bounding_box(&contour)?));
            }
        }

        let Some((_, square)) = best else {
            return Ok(None);
        };
        let x = band.x + square.x + square.width / 2;
        let y = band.y + square.y + square.height / 2;
        let pixel = original
            .at_2d::<Vec3b>(y, x)
            .map_err(|e| ChartError::opencv("swatch pixel", e))?;
        Ok(Some(PackedColor::from_bgr(pixel)))
    }
}
