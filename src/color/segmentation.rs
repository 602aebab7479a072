//! Slice proportions from ring colors
//!
//! Every histogram bin is folded into the nearest legend color when the
//! two are close enough; anti-aliased borders and JPEG noise end up in the
//! slice they belong to. Large bins that match nothing are kept as
//! unattributed mass: they usually are a slice whose legend label was not
//! recognized, and dropping them would inflate every other share.
//!
//! Shares are `100 × (pixels + correction) / corrected_total`, where the
//! correction spreads the small unmatched remainder evenly over the kept
//! labels and the unattributed colors, capped per label.

use opencv::core::Mat;
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::debug;

use crate::color::{ColorHistogram, PackedColor};
use crate::config::Profile;
use crate::detection::{DetectedCircle, DonutGeometry, Legend};
use crate::label::Label;
use crate::Result;

/// Which chart of the image is being read
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ChartRole {
    /// Lifecycle overview; its shares add up to 100
    Overview,
    /// Breakdown of manufacturing; shares are scaled by the overview's
    /// manufacturing percentage
    Details { manufacturing: f64 },
}

/// Outcome of reconciling one ring with a legend
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColorAttempt {
    /// Percentages, filled only when the attempt is accepted
    pub shares: BTreeMap<Label, f64>,
    /// Pixels attributed to each kept label
    pub pixel_counts: BTreeMap<Label, u64>,
    pub total_pixels: u64,
    pub attributed_pixels: u64,
    pub unattributed_pixels: u64,
    pub unattributed_colors: usize,
    /// Attributed fraction of the ring
    pub confidence: f64,
    pub accepted: bool,
    /// End-of-life was absent from the ring and added with the correction
    /// share only
    pub eol_inserted: bool,
}

impl ColorAttempt {
    fn empty(total_pixels: u64) -> Self {
        Self {
            shares: BTreeMap::new(),
            pixel_counts: BTreeMap::new(),
            total_pixels,
            attributed_pixels: 0,
            unattributed_pixels: 0,
            unattributed_colors: 0,
            confidence: 0.0,
            accepted: false,
            eol_inserted: false,
        }
    }
}

/// Reconciles ring colors with a legend, using one profile's tolerances
#[derive(Debug, Clone)]
pub struct ColorSegmenter {
    distance_threshold: u8,
    noise_fraction: f64,
    correction_cap: f64,
    optional: Vec<Label>,
    optional_noise_fraction: f64,
    min_attributed_fraction: f64,
    background: Option<u8>,
}

impl ColorSegmenter {
    pub fn from_profile(profile: &Profile) -> Self {
        Self {
            distance_threshold: profile.color_threshold,
            noise_fraction: profile.unattributed_noise_fraction,
            correction_cap: profile.correction_cap,
            optional: profile.optional.clone(),
            optional_noise_fraction: profile.optional_noise_fraction,
            min_attributed_fraction: profile.min_attributed_fraction,
            background: profile.exclude_background.then_some(profile.background_threshold),
        }
    }

    /// Sample the ring of `circle` in the de-texted image and reconcile it
    pub fn segment(
        &self,
        detexted: &Mat,
        circle: &DetectedCircle,
        geometry: &DonutGeometry,
        legend: &Legend,
        role: ChartRole,
    ) -> Result<ColorAttempt> {
        let histogram = ColorHistogram::from_ring(detexted, circle, geometry, self.background)?;
        debug!(
            colors = histogram.len(),
            pixels = histogram.total(),
            top = ?&histogram.bins()[..histogram.len().min(5)],
            "ring histogram"
        );
        Ok(self.reconcile(&histogram, legend, role))
    }

    /// Index and distance of the legend color closest to `color`
    fn nearest(&self, legend: &Legend, color: PackedColor) -> Option<(usize, u8)> {
        legend
            .iter()
            .enumerate()
            .map(|(i, entry)| (i, entry.color.distance(color)))
            .min_by_key(|&(_, d)| d)
    }

    /// Turn a ring histogram into label shares
    pub fn reconcile(&self, histogram: &ColorHistogram, legend: &Legend, role: ChartRole) -> ColorAttempt {
        let total = histogram.total();
        let mut attempt = ColorAttempt::empty(total);
        if total == 0 || legend.is_empty() {
            return attempt;
        }
        let total_f = total as f64;

        let mut assigned = vec![0u64; legend.len()];
        for &(color, count) in histogram.bins() {
            match self.nearest(legend, color) {
                Some((index, distance)) if distance < self.distance_threshold => assigned[index] += count,
                nearest => {
                    if count as f64 > self.noise_fraction * total_f {
                        debug!(%color, count, distance = ?nearest.map(|n| n.1), "unattributed color");
                        attempt.unattributed_colors += 1;
                        attempt.unattributed_pixels += count;
                    }
                }
            }
        }

        let mut kept: Vec<(Label, u64)> = Vec::new();
        for (entry, &pixels) in legend.iter().zip(&assigned) {
            if pixels == 0 {
                continue;
            }
            let optional = self.optional.contains(&entry.label);
            if kept.is_empty() || !optional || pixels as f64 / total_f > self.optional_noise_fraction {
                kept.push((entry.label, pixels));
            } else {
                debug!(label = %entry.label, pixels, "skip optional label noise");
            }
        }

        attempt.attributed_pixels = kept.iter().map(|(_, n)| n).sum();
        attempt.pixel_counts = kept.iter().copied().collect();
        attempt.confidence = attempt.attributed_pixels as f64 / total_f;
        attempt.accepted = attempt.confidence > self.min_attributed_fraction;
        if !attempt.accepted {
            debug!(
                confidence = attempt.confidence,
                required = self.min_attributed_fraction,
                "color attempt rejected"
            );
            return attempt;
        }

        let mut slots = kept.len() + attempt.unattributed_colors;
        if role == ChartRole::Overview && !kept.iter().any(|(l, _)| *l == Label::EndOfLife) {
            kept.push((Label::EndOfLife, 0));
            slots += 1;
            attempt.eol_inserted = true;
        }

        let counted = (attempt.attributed_pixels + attempt.unattributed_pixels) as f64;
        let correction = ((total_f - counted) / slots as f64).min(self.correction_cap * total_f);
        let corrected_total = counted + correction * slots as f64;
        let factor = match role {
            ChartRole::Overview => 1.0,
            ChartRole::Details { manufacturing } => manufacturing / 100.0,
        };

        attempt.shares = kept
            .iter()
            .map(|&(label, pixels)| {
                let share = 100.0 * (pixels as f64 + correction) / corrected_total * factor;
                (label, round2(share))
            })
            .collect();

        debug!(shares = ?attempt.shares, correction, "color attempt accepted");
        attempt
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
