//! Direct "label NN %" extraction around a chart
//!
//! Used when the ring colors cannot be reconciled with a legend. Dark
//! text near the chart is merged into blocks, each block is read on its
//! own and the profile's direct patterns pick `label … number %` pairs.
//!
//! Each doubtful reading lowers the confidence of the result through a
//! malus: a digit guessed from an `S`, two labels in one block, or the
//! same label read twice.

use opencv::{
    core::{Mat, Rect, Size},
    imgproc::{self, INTER_AREA, MORPH_ELLIPSE, MORPH_RECT, RETR_EXTERNAL, THRESH_BINARY_INV},
    prelude::*,
};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{debug, warn};

use crate::config::{LetterSelectMethod, PercentPattern, Profile};
use crate::constants::{confidence, ocr};
use crate::detection::DetectedCircle;
use crate::imaging;
use crate::label::Label;
use crate::ocr::{OcrRequest, RecognitionMode, TextRecognizer};
use crate::{ChartError, Result};

/// Percentages read as text, with the accumulated penalty
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DirectReading {
    pub values: BTreeMap<Label, f64>,
    pub malus: f64,
}

impl DirectReading {
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Sum of the four lifecycle shares that were read
    pub fn core_sum(&self) -> f64 {
        Label::CORE.iter().filter_map(|l| self.values.get(l)).sum()
    }

    /// `Σcore / 100 − malus`
    pub fn confidence(&self) -> f64 {
        self.core_sum() / 100.0 - self.malus
    }

    /// Read the pairs of one OCR block
    pub fn parse_block(&mut self, text: &str, patterns: &[PercentPattern]) {
        let mut matched: Option<Label> = None;
        for pattern in patterns {
            if !pattern.label_regex.is_match(text) {
                continue;
            }
            if let Some(previous) = matched {
                warn!(%previous, label = %pattern.label, text = %text.replace('\n', "|"), "several labels in one block");
                self.malus += confidence::AMBIGUITY_MALUS;
            }
            matched = Some(pattern.label);

            let Some(caps) = pattern.value_regex.captures(text) else {
                warn!(label = %pattern.label, "no percentage next to label");
                continue;
            };
            let raw = &caps[1];
            let digits = raw.replace(['S', 's'], "5");
            if digits != raw {
                self.malus += confidence::DIGIT_SUBSTITUTION_MALUS;
            }
            let Ok(value) = digits.parse::<f64>() else {
                warn!(label = %pattern.label, raw, "cannot convert percentage");
                continue;
            };
            self.record(pattern.label, value);
        }

        if matched.is_none() && !text.trim().is_empty() {
            debug!(text = %text.replace('\n', "|"), "no direct label in block");
        }
    }

    fn record(&mut self, label: Label, value: f64) {
        if value > ocr::MAX_PERCENT {
            warn!(%label, value, "percentage above 100, skipped");
            return;
        }
        match self.values.get_mut(&label) {
            Some(existing) => {
                warn!(%label, first = *existing, second = value, "duplicate percentage, keeping the smallest");
                self.malus += confidence::AMBIGUITY_MALUS;
                if value < *existing {
                    *existing = value;
                }
            }
            None => {
                debug!(%label, value, "ocr percentage");
                self.values.insert(label, value);
            }
        }
    }
}

/// Reads `label NN %` pairs printed around a chart
#[derive(Debug, Clone)]
pub struct OcrFallbackExtractor {
    text_threshold: f64,
    min_block_width: i32,
}

impl Default for OcrFallbackExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl OcrFallbackExtractor {
    pub fn new() -> Self {
        Self {
            text_threshold: ocr::TEXT_THRESHOLD,
            min_block_width: ocr::MIN_BLOCK_WIDTH,
        }
    }

    /// Search window around a chart of outer radius `radius`
    pub fn search_window(circle: &DetectedCircle, radius: f32, width: i32, height: i32) -> Option<Rect> {
        let (cx, cy) = (circle.center_x, circle.center_y);
        let x0 = ((cx - radius * ocr::WINDOW_HALF_WIDTH) as i32).max(0);
        let x1 = ((cx + radius * ocr::WINDOW_HALF_WIDTH) as i32).min(width);
        let y0 = ((cy - radius * ocr::WINDOW_HALF_HEIGHT) as i32).max(0);
        let y1 = ((cy + radius * ocr::WINDOW_HALF_HEIGHT) as i32).min(height);
        imaging::clamp_rect(Rect::new(x0, y0, x1 - x0, y1 - y0), width, height)
    }

    /// Read the percentages printed around `circle`
    pub fn extract(
        &self,
        image: &Mat,
        circle: &DetectedCircle,
        radius: f32,
        profile: &Profile,
        recognizer: &dyn TextRecognizer,
    ) -> Result<DirectReading> {
        let mut reading = DirectReading::default();
        if !profile.has_direct_patterns() {
            return Ok(reading);
        }
        let Some(window) = Self::search_window(circle, radius, image.cols(), image.rows()) else {
            return Ok(reading);
        };
        let area = imaging::crop(image, window)?;

        let letters = match profile.letter_select {
            LetterSelectMethod::Average => imaging::to_gray(&area)?,
            LetterSelectMethod::Max => imaging::max_channel(&area)?,
        };
        let (mask, _) = imaging::threshold(&letters, self.text_threshold, THRESH_BINARY_INV)?;

        let (kernel_width, kernel) = match profile.ocr_dilate_size {
            Some([sx, sy]) => {
                let w = ((sx * radius as f64).round() as i32).max(1);
                let h = ((sy * radius as f64).round() as i32).max(1);
                (w, imaging::kernel(MORPH_ELLIPSE, w, h)?)
            }
            None => (
                ocr::DEFAULT_DILATE_WIDTH,
                imaging::kernel(MORPH_RECT, ocr::DEFAULT_DILATE_WIDTH, ocr::DEFAULT_DILATE_HEIGHT)?,
            ),
        };
        let blocks = imaging::block_boxes(&imaging::dilate(&mask, &kernel)?, RETR_EXTERNAL)?;
        let shrink = (kernel_width as f64 * ocr::BLOCK_SHRINK_FACTOR).ceil() as i32;
        debug!(blocks = blocks.len(), ?window, "direct ocr blocks");

        for block in blocks {
            if block.width < self.min_block_width {
                continue;
            }
            let block = Rect::new(block.x + shrink, block.y, block.width - 2 * shrink, block.height);
            if block.width <= 0 {
                continue;
            }
            let prepared = self.prepare_crop(&area, block, profile.ocr_gamma)?;
            let text = recognizer.recognize(&OcrRequest::whole(&prepared, RecognitionMode::BlockLstm))?;
            let text = text.trim();
            if text.is_empty() {
                continue;
            }
            if text.lines().count() < 2 {
                debug!(text, "single line block");
            }
            reading.parse_block(text, &profile.direct_patterns);
        }

        debug!(values = ?reading.values, malus = reading.malus, "direct ocr done");
        Ok(reading)
    }

    /// Grayscale, gamma-corrected and upscaled copy of a text block
    fn prepare_crop(&self, area: &Mat, block: Rect, gamma: f64) -> Result<Mat> {
        let crop = imaging::crop(area, block)?;
        let gray = imaging::to_gray(&crop)?;
        let gray = imaging::gamma_correct(&gray, gamma)?;

        let factor = upscale_factor(gray.rows());
        if factor == 1 {
            return Ok(gray);
        }
        let mut scaled = Mat::default();
        imgproc::resize(
            &gray,
            &mut scaled,
            Size::new(gray.cols() * factor, gray.rows() * factor),
            0.0,
            0.0,
            INTER_AREA,
        )
        .map_err(|e| ChartError::opencv("ocr crop upscale", e))?;
        Ok(scaled)
    }
}

/// Power of two bringing a crop of `height` pixels to at least the OCR
/// minimum height
fn upscale_factor(height: i32) -> i32 {
    if height <= 0 || height >= ocr::MIN_CROP_HEIGHT {
        return 1;
    }
    let needed = (ocr::MIN_CROP_HEIGHT + height - 1) / height;
    (needed as u32).next_power_of_two() as i32
}
