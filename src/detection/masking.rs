//! De-charted and de-texted copies of a chart image
//!
//! Legend reconstruction needs an image where the charts themselves are
//! gone, otherwise slice borders and the numbers printed inside the ring
//! end up in the OCR blocks. Color sampling needs the opposite: the ring
//! without the dark text drawn over it, filled in from the surrounding
//! slice colors.

use opencv::{
    core::{Mat, Point, Rect, Scalar},
    imgproc::{self, FILLED, LINE_8, MORPH_ELLIPSE, THRESH_BINARY_INV},
    photo::{inpaint, INPAINT_TELEA},
    prelude::*,
};
use tracing::debug;

use crate::config::Profile;
use crate::constants::masking;
use crate::detection::DetectedCircle;
use crate::imaging;
use crate::{ChartError, Result};

const WHITE: f64 = 255.0;

/// Builds the masked image variants used by the later stages
pub struct ChartMasking {
    border_width: i32,
    box_margin: i32,
    erase_margin: i32,
    text_threshold: f64,
    inpaint_radius: f64,
}

impl Default for ChartMasking {
    fn default() -> Self {
        Self::new()
    }
}

impl ChartMasking {
    pub fn new() -> Self {
        Self {
            border_width: masking::BORDER_WIDTH,
            box_margin: masking::BOX_MARGIN,
            erase_margin: masking::CIRCLE_ERASE_MARGIN,
            text_threshold: masking::TEXT_DARKNESS_THRESHOLD,
            inpaint_radius: masking::INPAINT_RADIUS,
        }
    }

    /// Masking with a profile's text darkness and inpainting settings
    pub fn from_profile(profile: &Profile) -> Self {
        Self {
            text_threshold: profile.text_darkness_threshold,
            inpaint_radius: profile.inpaint_radius,
            ..Self::new()
        }
    }

    /// Copy of `image` with the page border and every chart painted white
    ///
    /// `circles` are all circles of the Hough search, unfiltered: secondary
    /// charts must disappear as well even when they are not analyzed.
    pub fn dechart(&self, image: &Mat, circles: &[DetectedCircle]) -> Result<Mat> {
        let mut out = image
            .try_clone()
            .map_err(|e| ChartError::opencv("de-charted copy", e))?;
        let (width, height) = (out.cols(), out.rows());
        let white = Scalar::all(WHITE);

        imgproc::rectangle(
            &mut out,
            Rect::new(0, 0, width, height),
            white,
            self.border_width,
            LINE_8,
            0,
        )
        .map_err(|e| ChartError::opencv("border erase", e))?;

        if let Some(cover) = self.chart_cover(circles, width, height) {
            imgproc::rectangle(&mut out, cover, white, FILLED, LINE_8, 0)
                .map_err(|e| ChartError::opencv("chart box erase", e))?;
        }

        let min_dim = width.min(height) as f32;
        for circle in circles {
            if circle.radius > min_dim * masking::DISC_ERASE_FACTOR {
                let (cx, cy, r) = circle.rounded();
                imgproc::circle(
                    &mut out,
                    Point::new(cx, cy),
                    r + self.erase_margin,
                    white,
                    FILLED,
                    LINE_8,
                    0,
                )
                .map_err(|e| ChartError::opencv("chart disc erase", e))?;
            }
        }

        Ok(out)
    }

    /// Box covering the first circle and every circle large enough not to
    /// be noise, clamped to the image
    fn chart_cover(&self, circles: &[DetectedCircle], width: i32, height: i32) -> Option<Rect> {
        let mut bounds: Option<(i32, i32, i32, i32)> = None;
        for (i, circle) in circles.iter().enumerate() {
            if i > 0 && circle.radius <= masking::MIN_BOX_RADIUS {
                continue;
            }
            let (cx, cy, r) = circle.rounded();
            let r = r + self.box_margin;
            bounds = Some(match bounds {
                None => (cx - r, cy - r, cx + r, cy + r),
                Some((x0, y0, x1, y1)) => (x0.min(cx - r), y0.min(cy - r), x1.max(cx + r), y1.max(cy + r)),
            });
        }
        let (x0, y0, x1, y1) = bounds?;
        let cover = imaging::clamp_rect(Rect::new(x0, y0, x1 - x0 + 1, y1 - y0 + 1), width, height);
        debug!(?cover, "chart cover box");
        cover
    }

    /// Copy of `image` where dark text is inpainted from its surroundings
    pub fn detext(&self, image: &Mat) -> Result<Mat> {
        let max = imaging::max_channel(image)?;
        let (mask, _) = imaging::threshold(&max, self.text_threshold, THRESH_BINARY_INV)?;
        let grow = imaging::kernel(MORPH_ELLIPSE, masking::TEXT_DILATE_SIZE, masking::TEXT_DILATE_SIZE)?;
        let mask = imaging::dilate(&mask, &grow)?;

        let mut out = Mat::default();
        inpaint(image, &mask, &mut out, self.inpaint_radius, INPAINT_TELEA)
            .map_err(|e| ChartError::opencv("text inpainting", e))?;
        Ok(out)
    }
}
