//! Chart circle detection and donut ring estimation
//!
//! Implements circle location that:
//! - Smooths a gamma-darkened grayscale copy of the page image
//! - Runs the `HOUGH_GRADIENT_ALT` circle search
//! - Decides from the image gradient which edge of the ring was found
//! - Filters clamped and spurious circles
//!
//! The Hough search locks onto whichever ring edge is the most circular,
//! so a detected circle is either the outer border of a ring or the rim of
//! its hole. The gradient vote tells the two apart: on the outer border of
//! a chart drawn on a light page the intensity grows outwards.

use opencv::{
    core::{Mat, Size, Vec3f, Vector, BORDER_DEFAULT, CV_32F},
    imgproc::{gaussian_blur_def, hough_circles, sobel, HOUGH_GRADIENT_ALT},
    prelude::*,
};
use tracing::debug;

use crate::config::Profile;
use crate::constants::circles;
use crate::imaging;
use crate::{ChartError, Result};

/// A circle found by the Hough search, in pixels
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectedCircle {
    pub center_x: f32,
    pub center_y: f32,
    pub radius: f32,
}

impl DetectedCircle {
    pub fn new(center_x: f32, center_y: f32, radius: f32) -> Self {
        Self {
            center_x,
            center_y,
            radius,
        }
    }

    /// Center and radius rounded to the pixel grid
    pub fn rounded(&self) -> (i32, i32, i32) {
        (
            self.center_x.round() as i32,
            self.center_y.round() as i32,
            self.radius.round() as i32,
        )
    }

    /// True when the whole circle lies strictly inside a `width`×`height` image
    pub fn fits_within(&self, width: i32, height: i32) -> bool {
        let (cx, cy, r) = self.rounded();
        cx - r >= 0 && cy - r >= 0 && cx + r < width && cy + r < height
    }
}

/// Inner and outer radius of the colored ring
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DonutGeometry {
    pub inner_radius: f32,
    pub outer_radius: f32,
}

impl DonutGeometry {
    pub fn contains(&self, dx: f32, dy: f32) -> bool {
        let d2 = dx * dx + dy * dy;
        d2 <= self.outer_radius * self.outer_radius && d2 > self.inner_radius * self.inner_radius
    }
}

/// Which ring edge the Hough search locked onto
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RingEdge {
    Outer,
    Inner,
}

/// Circles of one image plus the gradient needed to interpret them
#[derive(Debug)]
pub struct CircleScan {
    /// Circles in detection order
    pub circles: Vec<DetectedCircle>,
    grad_x: Mat,
    grad_y: Mat,
}

impl CircleScan {
    pub fn is_empty(&self) -> bool {
        self.circles.is_empty()
    }

    /// Gradient vector at a pixel, zero outside the image
    fn gradient_at(&self, x: i32, y: i32) -> Result<(f32, f32)> {
        if x < 0 || y < 0 || x >= self.grad_x.cols() || y >= self.grad_x.rows() {
            return Ok((0.0, 0.0));
        }
        let gx = *self
            .grad_x
            .at_2d::<f32>(y, x)
            .map_err(|e| ChartError::opencv("gradient read", e))?;
        let gy = *self
            .grad_y
            .at_2d::<f32>(y, x)
            .map_err(|e| ChartError::opencv("gradient read", e))?;
        Ok((gx, gy))
    }
}

/// Hough-based chart circle locator
#[derive(Debug, Clone, PartialEq)]
pub struct CircleLocator {
    min_radius: i32,
    perfectness: f64,
    samples: usize,
    min_relative_radius: f32,
    max_charts: usize,
}

impl Default for CircleLocator {
    fn default() -> Self {
        Self::new()
    }
}

impl CircleLocator {
    /// Create a locator with default parameters
    pub fn new() -> Self {
        Self {
            min_radius: circles::MIN_RADIUS,
            perfectness: circles::HOUGH_PERFECTNESS,
            samples: circles::DONUT_SAMPLES,
            min_relative_radius: circles::MIN_RELATIVE_RADIUS,
            max_charts: circles::MAX_CHARTS,
        }
    }

    /// Locator using a profile's Hough search settings
    pub fn from_profile(profile: &Profile) -> Self {
        Self {
            min_radius: profile.min_circle_radius,
            perfectness: profile.circle_perfectness,
            ..Self::new()
        }
    }

    /// Find circles in a BGR image
    ///
    /// An empty scan is the normal outcome for images that hold no chart.
    pub fn locate(&self, image: &Mat) -> Result<CircleScan> {
        if image.empty() {
            return Err(ChartError::InvalidParameter {
                parameter: "image".to_string(),
                value: "empty".to_string(),
            });
        }

        let gray = imaging::to_gray(image)?;
        let gray = imaging::gamma_correct(&gray, circles::SEARCH_GAMMA)?;
        let mut smoothed = Mat::default();
        gaussian_blur_def(
            &gray,
            &mut smoothed,
            Size::new(circles::BLUR_KERNEL_SIZE, circles::BLUR_KERNEL_SIZE),
            0.0,
        )
        .map_err(|e| ChartError::opencv("gaussian blur", e))?;

        let grad_x = self.gradient(&smoothed, 1, 0)?;
        let grad_y = self.gradient(&smoothed, 0, 1)?;

        let min_dim = image.rows().min(image.cols());
        let max_radius = (min_dim / 2).max(1);
        let min_distance = (min_dim as f64 * circles::MIN_DISTANCE_FACTOR).floor().max(1.0);

        let mut found = Vector::<Vec3f>::new();
        hough_circles(
            &smoothed,
            &mut found,
            HOUGH_GRADIENT_ALT,
            1.0,
            min_distance,
            circles::HOUGH_CANNY_THRESHOLD,
            self.perfectness,
            self.min_radius,
            max_radius,
        )
        .map_err(|e| ChartError::opencv("hough circles", e))?;

        let circles: Vec<DetectedCircle> = found
            .iter()
            .map(|c| DetectedCircle::new(c[0], c[1], c[2]))
            .collect();
        debug!(count = circles.len(), ?circles, "circle search done");

        Ok(CircleScan {
            circles,
            grad_x,
            grad_y,
        })
    }

    fn gradient(&self, smoothed: &Mat, dx: i32, dy: i32) -> Result<Mat> {
        let mut grad = Mat::default();
        sobel(
            smoothed,
            &mut grad,
            CV_32F,
            dx,
            dy,
            circles::SOBEL_APERTURE,
            1.0,
            0.0,
            BORDER_DEFAULT,
        )
        .map_err(|e| ChartError::opencv("sobel gradient", e))?;
        Ok(grad)
    }

    /// Circles worth analyzing, at most `max_charts`, in detection order
    ///
    /// Circles that do not fit in the image are clamped detections and are
    /// skipped; circles much smaller than the first detected one are noise.
    pub fn chart_circles(&self, scan: &CircleScan, width: i32, height: i32) -> Vec<DetectedCircle> {
        let Some(primary) = scan.circles.first() else {
            return Vec::new();
        };
        let min_radius = primary.radius * self.min_relative_radius;

        scan.circles
            .iter()
            .filter(|c| {
                if !c.fits_within(width, height) {
                    debug!(circle = ?c, "skip clamped circle");
                    return false;
                }
                if c.radius < min_radius {
                    debug!(circle = ?c, "skip too small circle");
                    return false;
                }
                true
            })
            .take(self.max_charts)
            .copied()
            .collect()
    }

    /// Accumulated alignment of the gradient with the outward radial
    /// direction, averaged over the sampled angles
    pub fn edge_vote(&self, scan: &CircleScan, circle: &DetectedCircle) -> Result<f32> {
        let (cx, cy, r) = circle.rounded();
        let mut cumulated = 0.0_f32;
        for i in 0..self.samples {
            let angle = i as f32 / self.samples as f32 * std::f32::consts::TAU;
            let (ex, ey) = (angle.cos(), angle.sin());
            let px = (r as f32 * ex + cx as f32) as i32;
            let py = (r as f32 * ey + cy as f32) as i32;
            let (gx, gy) = scan.gradient_at(px, py)?;
            let norm = (gx * gx + gy * gy).sqrt();
            if norm > 0.0 {
                cumulated += ex * gx / norm + ey * gy / norm;
            }
        }
        Ok(cumulated / self.samples as f32)
    }

    /// Inner and outer ring radii for a detected circle
    pub fn donut_geometry(&self, scan: &CircleScan, circle: &DetectedCircle) -> Result<DonutGeometry> {
        let vote = self.edge_vote(scan, circle)?;
        let edge = if vote > 0.0 { RingEdge::Outer } else { RingEdge::Inner };
        let geometry = geometry_from_edge(circle.rounded().2 as f32, edge);
        debug!(vote, ?edge, ?geometry, "donut geometry");
        Ok(geometry)
    }
}

/// Ring radii when the detected radius `r` sits on `edge`
pub fn geometry_from_edge(r: f32, edge: RingEdge) -> DonutGeometry {
    match edge {
        RingEdge::Outer => {
            let outer = r - circles::EDGE_INSET;
            DonutGeometry {
                inner_radius: outer * circles::INNER_TO_OUTER_RATIO,
                outer_radius: outer,
            }
        }
        RingEdge::Inner => {
            let inner = r + circles::EDGE_INSET;
            DonutGeometry {
                inner_radius: inner,
                outer_radius: inner / circles::INNER_TO_OUTER_RATIO,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opencv::core::{Point, Scalar, CV_8UC3};
    use opencv::imgproc::{circle, FILLED, LINE_8};

    fn ring_image(outer: i32, inner: i32) -> Mat {
        let size = outer * 2 + 100;
        let mut image = Mat::new_rows_cols_with_default(size, size, CV_8UC3, Scalar::all(255.0)).unwrap();
        let center = Point::new(size / 2, size / 2);
        circle(&mut image, center, outer, Scalar::new(180.0, 90.0, 20.0, 0.0), FILLED, LINE_8, 0).unwrap();
        circle(&mut image, center, inner, Scalar::all(255.0), FILLED, LINE_8, 0).unwrap();
        image
    }

    #[test]
    fn test_geometry_from_outer_edge() {
        let g = geometry_from_edge(154.0, RingEdge::Outer);
        assert_eq!(g.outer_radius, 150.0);
        assert!((g.inner_radius - 100.0).abs() < 1e-3);
    }

    #[test]
    fn test_geometry_from_inner_edge() {
        let g = geometry_from_edge(96.0, RingEdge::Inner);
        assert_eq!(g.inner_radius, 100.0);
        assert!((g.outer_radius - 150.0).abs() < 1e-3);
    }

    #[test]
    fn test_donut_contains() {
        let g = DonutGeometry {
            inner_radius: 10.0,
            outer_radius: 20.0,
        };
        assert!(g.contains(15.0, 0.0));
        assert!(!g.contains(5.0, 0.0));
        assert!(!g.contains(20.0, 1.0));
    }

    #[test]
    fn test_fits_within() {
        assert!(DetectedCircle::new(50.0, 50.0, 40.0).fits_within(100, 100));
        assert!(!DetectedCircle::new(50.0, 50.0, 50.0).fits_within(100, 100));
        assert!(!DetectedCircle::new(20.0, 50.0, 30.0).fits_within(100, 100));
    }

    #[test]
    fn test_vote_sign_matches_ring_edge() {
        let image = ring_image(150, 100);
        let locator = CircleLocator::new();
        let scan = locator.locate(&image).unwrap();
        let c = image.cols() as f32 / 2.0;

        let outer = locator.edge_vote(&scan, &DetectedCircle::new(c, c, 150.0)).unwrap();
        let inner = locator.edge_vote(&scan, &DetectedCircle::new(c, c, 100.0)).unwrap();
        assert!(outer > 0.0, "outer border vote was {outer}");
        assert!(inner < 0.0, "hole rim vote was {inner}");
    }

    #[test]
    fn test_donut_estimation_is_idempotent() {
        let image = ring_image(150, 100);
        let locator = CircleLocator::new();
        let c = image.cols() as f32 / 2.0;
        let circle = DetectedCircle::new(c, c, 150.0);

        let first = locator.donut_geometry(&locator.locate(&image).unwrap(), &circle).unwrap();
        for _ in 0..3 {
            let scan = locator.locate(&image).unwrap();
            assert_eq!(locator.donut_geometry(&scan, &circle).unwrap(), first);
        }
    }

    #[test]
    fn test_profile_minimum_radius_is_honored() {
        let store = crate::config::ProfileStore::from_json_str(
            r#"{"profiles": {"BIG": {"min circle radius": 190}}}"#,
        )
        .unwrap();
        let image = ring_image(150, 100);
        assert!(!CircleLocator::new().locate(&image).unwrap().is_empty());

        let locator = CircleLocator::from_profile(store.get("BIG").unwrap());
        assert!(locator.locate(&image).unwrap().is_empty());
    }

    #[test]
    fn test_blank_image_has_no_circle() {
        let image = Mat::new_rows_cols_with_default(200, 300, CV_8UC3, Scalar::all(255.0)).unwrap();
        let scan = CircleLocator::new().locate(&image).unwrap();
        assert!(scan.is_empty());
        assert!(CircleLocator::new().chart_circles(&scan, 300, 200).is_empty());
    }

    #[test]
    fn test_chart_circle_filtering() {
        let scan = CircleScan {
            circles: vec![
                DetectedCircle::new(100.0, 100.0, 80.0),
                DetectedCircle::new(300.0, 100.0, 10.0),
                DetectedCircle::new(390.0, 100.0, 40.0),
                DetectedCircle::new(300.0, 100.0, 60.0),
                DetectedCircle::new(300.0, 300.0, 60.0),
            ],
            grad_x: Mat::default(),
            grad_y: Mat::default(),
        };
        let kept = CircleLocator::new().chart_circles(&scan, 400, 400);
        // too small, then clamped, then the two valid ones; only two are kept
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].radius, 80.0);
        assert_eq!(kept[1], DetectedCircle::new(300.0, 100.0, 60.0));
    }
}
