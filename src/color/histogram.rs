//! Pixel-color histogram of a donut ring

use opencv::{core::Vec3b, prelude::*};
use std::collections::HashMap;

use crate::color::PackedColor;
use crate::detection::{DetectedCircle, DonutGeometry};
use crate::{ChartError, Result};

/// Distinct colors of a region with their pixel counts
///
/// Bins are sorted by descending count; equal counts are ordered by
/// descending packed value so the order does not depend on hashing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ColorHistogram {
    bins: Vec<(PackedColor, u64)>,
    total: u64,
}

impl ColorHistogram {
    /// Build from raw counts; repeated colors are merged
    pub fn from_counts(counts: impl IntoIterator<Item = (PackedColor, u64)>) -> Self {
        let mut merged: HashMap<PackedColor, u64> = HashMap::new();
        for (color, count) in counts {
            if count > 0 {
                *merged.entry(color).or_insert(0) += count;
            }
        }
        let mut bins: Vec<(PackedColor, u64)> = merged.into_iter().collect();
        bins.sort_by(|a, b| b.1.cmp(&a.1).then(b.0.cmp(&a.0)));
        let total = bins.iter().map(|(_, n)| n).sum();
        Self { bins, total }
    }

    /// Histogram of the ring pixels of a BGR image
    ///
    /// With `Some(level)`, pixels whose channels all reach `level` are page
    /// background seen through gaps between slices and are left out. With
    /// `None` every ring pixel is tallied.
    pub fn from_ring(
        image: &Mat,
        circle: &DetectedCircle,
        geometry: &DonutGeometry,
        background: Option<u8>,
    ) -> Result<Self> {
        let (cx, cy, _) = circle.rounded();
        let reach = geometry.outer_radius.ceil() as i32;
        let x0 = (cx - reach).max(0);
        let y0 = (cy - reach).max(0);
        let x1 = (cx + reach).min(image.cols() - 1);
        let y1 = (cy + reach).min(image.rows() - 1);

        let mut counts: HashMap<PackedColor, u64> = HashMap::new();
        for y in y0..=y1 {
            for x in x0..=x1 {
                if !geometry.contains((x - cx) as f32, (y - cy) as f32) {
                    continue;
                }
                let pixel = image
                    .at_2d::<Vec3b>(y, x)
                    .map_err(|e| ChartError::opencv("ring pixel", e))?;
                let color = PackedColor::from_bgr(pixel);
                if !background.is_some_and(|level| color.is_brighter_than(level)) {
                    *counts.entry(color).or_insert(0) += 1;
                }
            }
        }
        Ok(Self::from_counts(counts))
    }

    pub fn bins(&self) -> &[(PackedColor, u64)] {
        &self.bins
    }

    /// Number of counted pixels
    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn len(&self) -> usize {
        self.bins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bins.is_empty()
    }
}
