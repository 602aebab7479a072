//! Chart analysis pipeline
//!
//! image → circles → masked copies → legend → ring colors, with direct OCR
//! as fallback → resolved shares.
//!
//! Up to two charts are read per image. The first chart that yields shares
//! is the lifecycle overview; a following chart is read as the breakdown
//! of manufacturing, with the legend restricted to sub-components.

use opencv::{core::Mat, prelude::*};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::color::{ChartRole, ColorSegmenter};
use crate::config::{Profile, ProfileStore};
use crate::detection::{ChartMasking, CircleLocator, CircleScan, DetectedCircle, DonutGeometry, Legend, LegendReconstructor};
use crate::label::Label;
use crate::ocr::{OcrFallbackExtractor, TextRecognizer};
use crate::resolver::{ChartSelector, ExtractionState, ProportionResult, Strategy};
use crate::Result;

/// Profile used by [`PiechartAnalyzer::analyze_auto`] when an image holds
/// several circles (overview plus components breakdown)
pub const DEFAULT_MULTI_CHART_PROFILE: &str = "DELL";

/// Profile used by [`PiechartAnalyzer::analyze_auto`] for single charts
pub const DEFAULT_SINGLE_CHART_PROFILE: &str = "HP";

/// Outcome of analyzing one image
#[derive(Debug, Clone, PartialEq)]
pub enum ChartAnalysis {
    /// No circle in the image
    NoChart,
    /// Charts were found but no strategy produced any share
    Unreadable { charts: usize },
    Chart(ProportionResult),
}

impl ChartAnalysis {
    pub fn result(&self) -> Option<&ProportionResult> {
        match self {
            ChartAnalysis::Chart(result) => Some(result),
            _ => None,
        }
    }

    pub fn into_result(self) -> Option<ProportionResult> {
        match self {
            ChartAnalysis::Chart(result) => Some(result),
            _ => None,
        }
    }
}

/// Strategies tried on the overview chart, in order; a breakdown chart is
/// only read through its colors
const OVERVIEW_STRATEGIES: [Strategy; 2] = [Strategy::ColorLegend, Strategy::DirectOcr];

/// Stateless chart analyzer over a shared profile set
///
/// Image-stage thresholds come from the profile of each call; the default
/// locator only serves the circle count of [`Self::analyze_auto`].
pub struct PiechartAnalyzer<R: TextRecognizer> {
    profiles: Arc<ProfileStore>,
    recognizer: R,
    locator: CircleLocator,
    ocr: OcrFallbackExtractor,
}

impl<R: TextRecognizer> PiechartAnalyzer<R> {
    pub fn new(profiles: Arc<ProfileStore>, recognizer: R) -> Self {
        Self {
            profiles,
            recognizer,
            locator: CircleLocator::new(),
            ocr: OcrFallbackExtractor::new(),
        }
    }

    /// Analyze a BGR image with the named vendor profile
    ///
    /// # Errors
    ///
    /// Unknown profiles fail before the image is looked at. OpenCV and OCR
    /// engine failures are returned as is; "no chart" is not an error.
    pub fn analyze(&self, image: &Mat, profile: &str) -> Result<ChartAnalysis> {
        let profile = self.profiles.get(profile)?;
        let locator = CircleLocator::from_profile(profile);
        let scan = locator.locate(image)?;
        self.run(image, &locator, &scan, profile)
    }

    /// Analyze with a profile chosen from the number of circles found
    pub fn analyze_auto(&self, image: &Mat) -> Result<ChartAnalysis> {
        let scan = self.locator.locate(image)?;
        if scan.is_empty() {
            debug!("no circle found");
            return Ok(ChartAnalysis::NoChart);
        }
        let name = if scan.circles.len() >= 2 {
            DEFAULT_MULTI_CHART_PROFILE
        } else {
            DEFAULT_SINGLE_CHART_PROFILE
        };
        info!(profile = %name, circles = scan.circles.len(), "fallback to default profile");
        let profile = self.profiles.get(name)?;
        let locator = CircleLocator::from_profile(profile);
        if locator == self.locator {
            return self.run(image, &locator, &scan, profile);
        }
        debug!(profile = %name, "profile overrides the circle search");
        let scan = locator.locate(image)?;
        self.run(image, &locator, &scan, profile)
    }

    /// Document selector using the named profile's attributed fraction, or
    /// the default one when profiles are chosen per image
    pub fn selector(&self, profile: Option<&str>) -> Result<ChartSelector> {
        Ok(ChartSelector::new(match profile {
            Some(name) => self.profiles.get(name)?.min_attributed_fraction,
            None => crate::constants::color::MIN_ATTRIBUTED_FRACTION,
        }))
    }

    /// Analyze the images of one document in order and keep the best result
    ///
    /// Stops at the first image whose color result settles the choice.
    /// Images that fail with a recoverable error are skipped.
    pub fn analyze_document<'a>(
        &self,
        images: impl IntoIterator<Item = &'a Mat>,
        profile: Option<&str>,
    ) -> Result<Option<ProportionResult>> {
        let mut selector = self.selector(profile)?;

        for (index, image) in images.into_iter().enumerate() {
            let analysis = match profile {
                Some(name) => self.analyze(image, name),
                None => self.analyze_auto(image),
            };
            let analysis = match analysis {
                Ok(analysis) => analysis,
                Err(e) if e.is_recoverable() => {
                    warn!(index, error = %e, "image skipped");
                    continue;
                }
                Err(e) => return Err(e),
            };
            if let ChartAnalysis::Chart(result) = analysis {
                if selector.offer(result) == ExtractionState::Accepted {
                    debug!(index, "document settled");
                    break;
                }
            }
        }
        Ok(selector.into_selected())
    }

    fn run(&self, image: &Mat, locator: &CircleLocator, scan: &CircleScan, profile: &Profile) -> Result<ChartAnalysis> {
        if scan.is_empty() {
            debug!("no circle found");
            return Ok(ChartAnalysis::NoChart);
        }
        let charts = locator.chart_circles(scan, image.cols(), image.rows());
        if charts.is_empty() {
            debug!(circles = scan.circles.len(), "every circle was filtered out");
            return Ok(ChartAnalysis::Unreadable { charts: 0 });
        }

        let masking = ChartMasking::from_profile(profile);
        let detexted = masking.detext(image)?;
        let decharted = masking.dechart(image, &scan.circles)?;
        let mut legend =
            LegendReconstructor::from_profile(profile).reconstruct(image, &decharted, profile, &self.recognizer)?;
        if legend.is_empty() && !profile.palette.is_empty() {
            debug!(profile = %profile.name, "no legend found, using the profile palette");
            legend = Legend::from_entries(profile.palette.iter().copied());
        }
        debug!(entries = legend.len(), ?legend, "legend");

        let segmenter = ColorSegmenter::from_profile(profile);
        let mut overview: Option<ProportionResult> = None;

        for circle in &charts {
            let geometry = locator.donut_geometry(scan, circle)?;

            if let Some(result) = overview.as_mut() {
                let Some(manufacturing) = result.share(Label::Manufacturing) else {
                    debug!("overview has no manufacturing share, breakdown skipped");
                    continue;
                };
                let components = legend.filtered(|e| e.label.is_component());
                if components.is_empty() {
                    continue;
                }
                let attempt = segmenter.segment(
                    &detexted,
                    circle,
                    &geometry,
                    &components,
                    ChartRole::Details { manufacturing },
                )?;
                if attempt.accepted {
                    result.merge_details(&attempt.shares, Strategy::ColorLegend);
                }
                continue;
            }

            let Some(result) = self.read_overview(image, &detexted, circle, &geometry, &legend, &segmenter, profile)?
            else {
                continue;
            };
            if result.strategy == Strategy::DirectOcr {
                // labels read as text cannot also be slice colors
                for label in result.shares.keys() {
                    legend.remove(*label);
                }
            }
            debug!(state = ?result.state, strategy = ?result.strategy, "overview chart read");
            overview = Some(result);
        }

        let Some(mut result) = overview else {
            warn!(charts = charts.len(), profile = %profile.name, "charts found but no share could be read");
            return Ok(ChartAnalysis::Unreadable { charts: charts.len() });
        };
        result.finalize();
        if result.is_low_confidence() {
            warn!(
                strategy = ?result.strategy,
                confidence1 = result.confidence1,
                confidence2 = result.confidence2,
                ambiguities = result.ambiguities.len(),
                "low confidence extraction"
            );
        } else {
            info!(strategy = ?result.strategy, shares = ?result.shares, "chart shares extracted");
        }
        Ok(ChartAnalysis::Chart(result))
    }

    /// Run the overview strategies until one is accepted
    ///
    /// A low-confidence reading does not stop the list; the most confident
    /// one is returned when no later strategy is accepted.
    #[allow(clippy::too_many_arguments)]
    fn read_overview(
        &self,
        image: &Mat,
        detexted: &Mat,
        circle: &DetectedCircle,
        geometry: &DonutGeometry,
        legend: &Legend,
        segmenter: &ColorSegmenter,
        profile: &Profile,
    ) -> Result<Option<ProportionResult>> {
        let mut state = ExtractionState::NotAttempted;
        let mut best: Option<ProportionResult> = None;
        let mut color_confidence = 0.0;

        for strategy in OVERVIEW_STRATEGIES {
            let candidate = match strategy {
                Strategy::ColorLegend => {
                    if legend.is_empty() {
                        continue;
                    }
                    let attempt = segmenter.segment(detexted, circle, geometry, legend, ChartRole::Overview)?;
                    color_confidence = attempt.confidence;
                    if !attempt.accepted {
                        state = ExtractionState::LowConfidence;
                        continue;
                    }
                    ProportionResult::from_color(&attempt, &profile.name)
                }
                Strategy::DirectOcr => {
                    let reading = self.ocr.extract(image, circle, geometry.outer_radius, profile, &self.recognizer)?;
                    if reading.is_empty() {
                        continue;
                    }
                    ProportionResult::from_ocr(&reading, color_confidence, profile.min_ocr_confidence, &profile.name)
                }
            };

            state = candidate.state;
            debug!(?strategy, ?state, confidence1 = candidate.confidence1, "overview strategy done");
            if state == ExtractionState::Accepted {
                return Ok(Some(candidate));
            }
            if best.as_ref().map_or(true, |b| candidate.confidence1 > b.confidence1) {
                best = Some(candidate);
            }
        }

        if best.is_none() {
            debug!(?state, color_confidence, "no strategy produced shares");
        }
        Ok(best)
    }
}
