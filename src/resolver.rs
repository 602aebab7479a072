//! Proportion results and their mapping to footprint ratio fields
//!
//! A chart reading is rarely complete: end-of-life slices are too thin to
//! be sampled, a legend label goes unrecognized, OCR misses a block. The
//! resolver completes what arithmetic allows (the lifecycle shares add up
//! to 100, the sub-components add up to manufacturing), records what it
//! derived, and flags results whose numbers do not add up.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, warn};

use crate::color::ColorAttempt;
use crate::constants::confidence;
use crate::label::{Label, RatioField};
use crate::ocr::DirectReading;

/// How a result was obtained
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Strategy {
    /// Ring colors reconciled with the OCR-rebuilt legend
    #[serde(rename = "auto legend")]
    ColorLegend,
    /// `label NN %` pairs read around the chart
    #[serde(rename = "ocr")]
    DirectOcr,
}

/// Progress of a strategy list, for one image or a whole document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ExtractionState {
    #[default]
    NotAttempted,
    LowConfidence,
    Accepted,
}

/// A sum that does not come out as expected
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ArithmeticAmbiguity {
    /// use + manufacturing + transport + end-of-life is not 100
    CoreSum { sum: f64 },
    /// Sub-components do not add up to the manufacturing share
    DetailsSum { details: f64, manufacturing: f64 },
}

/// Labels filled in by [`complete_core_labels`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Completion {
    /// Core label computed as `100 − Σothers`
    pub derived: Option<Label>,
    /// End-of-life was set to a placeholder share
    pub eol_placeholder: bool,
}

/// Fill in missing lifecycle shares
///
/// One missing core label is `100 − Σothers` (never negative). With more
/// missing, end-of-life gets `eol_placeholder` first, which may leave a
/// single label to derive.
pub fn complete_core_labels(shares: &mut BTreeMap<Label, f64>, eol_placeholder: f64) -> Completion {
    let mut completion = Completion::default();
    let missing = |shares: &BTreeMap<Label, f64>| -> Vec<Label> {
        Label::CORE.iter().copied().filter(|l| !shares.contains_key(l)).collect()
    };

    let mut absent = missing(shares);
    if absent.len() >= 2 && absent.contains(&Label::EndOfLife) {
        warn!(placeholder = eol_placeholder, "missing end-of-life, using placeholder share");
        shares.insert(Label::EndOfLife, eol_placeholder);
        completion.eol_placeholder = true;
        absent = missing(shares);
    }

    if let [label] = absent[..] {
        let others: f64 = Label::CORE.iter().filter_map(|l| shares.get(l)).sum();
        let value = (100.0 - others).max(0.0);
        warn!(%label, value, "missing core share, derived from the others");
        shares.insert(label, value);
        completion.derived = Some(label);
    }
    completion
}

/// Sum of the sub-component shares
pub fn details_sum(shares: &BTreeMap<Label, f64>) -> f64 {
    shares.iter().filter(|(l, _)| l.is_component()).map(|(_, v)| v).sum()
}

/// Derive a missing manufacturing share
///
/// With use and transport known, manufacturing is what the other lifecycle
/// phases leave; otherwise the sub-components are summed. Returns true when
/// a share was added.
pub fn auto_manufacturing(shares: &mut BTreeMap<Label, f64>) -> bool {
    if shares.contains_key(&Label::Manufacturing) {
        return false;
    }
    let details = details_sum(shares);
    if shares.contains_key(&Label::Use) && shares.contains_key(&Label::Transport) {
        let others: f64 = [Label::Use, Label::Transport, Label::EndOfLife]
            .iter()
            .filter_map(|l| shares.get(l))
            .sum();
        let manufacturing = 100.0 - others;
        if details > 0.0 && (details - manufacturing).abs() > 1.0 {
            warn!(manufacturing, details, "manufacturing differs from the sum of its sub-components");
        }
        shares.insert(Label::Manufacturing, manufacturing);
        true
    } else if details > 0.0 {
        shares.insert(Label::Manufacturing, details);
        true
    } else {
        false
    }
}

/// Consistency checks of a completed result
pub fn sanity_check(shares: &BTreeMap<Label, f64>) -> Vec<ArithmeticAmbiguity> {
    let mut found = Vec::new();

    if Label::CORE.iter().any(|l| shares.contains_key(l)) {
        let sum: f64 = Label::CORE.iter().filter_map(|l| shares.get(l)).sum();
        if (100.0 - sum).abs() > confidence::CORE_SUM_TOLERANCE {
            found.push(ArithmeticAmbiguity::CoreSum { sum });
        }
    }

    let details = details_sum(shares);
    if let Some(&manufacturing) = shares.get(&Label::Manufacturing) {
        if details > 0.0 && (manufacturing - details).abs() > confidence::DETAILS_SUM_TOLERANCE * details {
            found.push(ArithmeticAmbiguity::DetailsSum { details, manufacturing });
        }
    }
    found
}

/// Percentages recovered from one image
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProportionResult {
    /// Percentage per label
    pub shares: BTreeMap<Label, f64>,
    /// Reading quality: attributed fraction on the color path,
    /// `Σcore/100 − malus` on the OCR path
    pub confidence1: f64,
    /// Attributed ring fraction of the color attempt
    pub confidence2: f64,
    /// Labels computed rather than read
    pub extrapolated: Vec<Label>,
    pub strategy: Strategy,
    /// Strategy of the merged components breakdown, if any
    pub details_strategy: Option<Strategy>,
    /// End-of-life holds a placeholder share
    pub eol_placeholder: bool,
    pub malus: f64,
    pub ambiguities: Vec<ArithmeticAmbiguity>,
    pub state: ExtractionState,
    pub profile: String,
}

impl ProportionResult {
    fn new(strategy: Strategy, profile: &str) -> Self {
        Self {
            shares: BTreeMap::new(),
            confidence1: 0.0,
            confidence2: 0.0,
            extrapolated: Vec::new(),
            strategy,
            details_strategy: None,
            eol_placeholder: false,
            malus: 0.0,
            ambiguities: Vec::new(),
            state: ExtractionState::NotAttempted,
            profile: profile.to_string(),
        }
    }

    /// Result of an accepted color attempt on the overview chart
    pub fn from_color(attempt: &ColorAttempt, profile: &str) -> Self {
        let mut result = Self::new(Strategy::ColorLegend, profile);
        result.shares = attempt.shares.clone();
        result.confidence2 = attempt.confidence;
        result.confidence1 = (attempt.confidence * 100.0).round() / 100.0;
        if attempt.eol_inserted {
            // the inserted share is only the correction; with the other
            // phases read, end-of-life is what they leave
            let others_read = Label::CORE
                .iter()
                .all(|l| *l == Label::EndOfLife || result.shares.contains_key(l));
            if others_read {
                result.shares.remove(&Label::EndOfLife);
            }
            result.mark_extrapolated(Label::EndOfLife);
        }
        result.complete(0.0);
        result.state = if attempt.accepted {
            ExtractionState::Accepted
        } else {
            ExtractionState::LowConfidence
        };
        result
    }

    /// Result of direct OCR; `color_confidence` is the attributed fraction
    /// of the abandoned color attempt
    pub fn from_ocr(reading: &DirectReading, color_confidence: f64, min_confidence: f64, profile: &str) -> Self {
        let mut result = Self::new(Strategy::DirectOcr, profile);
        result.shares = reading.values.clone();
        result.confidence1 = reading.confidence();
        result.confidence2 = color_confidence;
        result.malus = reading.malus;
        result.complete(confidence::EOL_PLACEHOLDER_PERCENT);
        result.state = if result.confidence1 >= min_confidence {
            ExtractionState::Accepted
        } else {
            ExtractionState::LowConfidence
        };
        result
    }

    fn complete(&mut self, eol_placeholder: f64) {
        let completion = complete_core_labels(&mut self.shares, eol_placeholder);
        if completion.eol_placeholder {
            self.eol_placeholder = true;
            self.mark_extrapolated(Label::EndOfLife);
        }
        if let Some(label) = completion.derived {
            self.mark_extrapolated(label);
        }
    }

    fn mark_extrapolated(&mut self, label: Label) {
        if !self.extrapolated.contains(&label) {
            self.extrapolated.push(label);
        }
    }

    /// Add the sub-component shares of a components breakdown
    ///
    /// Core labels of the breakdown are ignored; the overview owns them.
    pub fn merge_details(&mut self, details: &BTreeMap<Label, f64>, strategy: Strategy) {
        let mut merged = 0;
        for (&label, &value) in details.iter().filter(|(l, _)| l.is_component()) {
            self.shares.insert(label, value);
            merged += 1;
        }
        if merged > 0 {
            self.details_strategy = Some(strategy);
            debug!(merged, ?strategy, "components breakdown merged");
        }
    }

    /// Derive what is still missing and run the consistency checks
    pub fn finalize(&mut self) {
        if auto_manufacturing(&mut self.shares) {
            self.mark_extrapolated(Label::Manufacturing);
        }
        self.ambiguities = sanity_check(&self.shares);
        for ambiguity in &self.ambiguities {
            warn!(?ambiguity, profile = %self.profile, "inconsistent chart shares");
        }
    }

    pub fn share(&self, label: Label) -> Option<f64> {
        self.shares.get(&label).copied()
    }

    pub fn core_sum(&self) -> f64 {
        Label::CORE.iter().filter_map(|l| self.shares.get(l)).sum()
    }

    pub fn has_use_and_manufacturing(&self) -> bool {
        self.shares.contains_key(&Label::Use) && self.shares.contains_key(&Label::Manufacturing)
    }

    pub fn is_extrapolated(&self, label: Label) -> bool {
        self.extrapolated.contains(&label)
    }

    /// Produced, but not to be trusted without review
    pub fn is_low_confidence(&self) -> bool {
        self.state != ExtractionState::Accepted || !self.ambiguities.is_empty()
    }

    pub fn ratios(&self) -> FootprintRatios {
        FootprintRatios::from_shares(&self.shares)
    }
}

fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}

/// Ratio fields of a device footprint record, in `[0, 1]`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FootprintRatios {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gwp_use_ratio: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gwp_manufacturing_ratio: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gwp_transport_ratio: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gwp_eol_ratio: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gwp_mainboard_ratio: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gwp_ssd_ratio: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gwp_hdd_ratio: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gwp_display_ratio: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gwp_psu_ratio: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gwp_chassis_ratio: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gwp_battery_ratio: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gwp_packaging_ratio: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gwp_opticaldrive_ratio: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gwp_electronics_ratio: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gwp_othercomponents_ratio: Option<f64>,
}

impl FootprintRatios {
    pub fn from_shares(shares: &BTreeMap<Label, f64>) -> Self {
        let mut ratios = Self::default();
        for (&label, &percent) in shares {
            ratios.add(label, percent);
        }
        ratios
    }

    /// Accumulate a percentage into the label's field
    pub fn add(&mut self, label: Label, percent: f64) {
        let slot = self.slot_mut(label.ratio_field());
        *slot = Some(round3(slot.unwrap_or(0.0) + percent / 100.0));
    }

    pub fn get(&self, field: RatioField) -> Option<f64> {
        match field {
            RatioField::Use => self.gwp_use_ratio,
            RatioField::Manufacturing => self.gwp_manufacturing_ratio,
            RatioField::Transport => self.gwp_transport_ratio,
            RatioField::EndOfLife => self.gwp_eol_ratio,
            RatioField::Mainboard => self.gwp_mainboard_ratio,
            RatioField::Ssd => self.gwp_ssd_ratio,
            RatioField::Hdd => self.gwp_hdd_ratio,
            RatioField::Display => self.gwp_display_ratio,
            RatioField::PowerSupply => self.gwp_psu_ratio,
            RatioField::Chassis => self.gwp_chassis_ratio,
            RatioField::Battery => self.gwp_battery_ratio,
            RatioField::Packaging => self.gwp_packaging_ratio,
            RatioField::OpticalDrive => self.gwp_opticaldrive_ratio,
            RatioField::Electronics => self.gwp_electronics_ratio,
            RatioField::OtherComponents => self.gwp_othercomponents_ratio,
        }
    }

    fn slot_mut(&mut self, field: RatioField) -> &mut Option<f64> {
        match field {
            RatioField::Use => &mut self.gwp_use_ratio,
            RatioField::Manufacturing => &mut self.gwp_manufacturing_ratio,
            RatioField::Transport => &mut self.gwp_transport_ratio,
            RatioField::EndOfLife => &mut self.gwp_eol_ratio,
            RatioField::Mainboard => &mut self.gwp_mainboard_ratio,
            RatioField::Ssd => &mut self.gwp_ssd_ratio,
            RatioField::Hdd => &mut self.gwp_hdd_ratio,
            RatioField::Display => &mut self.gwp_display_ratio,
            RatioField::PowerSupply => &mut self.gwp_psu_ratio,
            RatioField::Chassis => &mut self.gwp_chassis_ratio,
            RatioField::Battery => &mut self.gwp_battery_ratio,
            RatioField::Packaging => &mut self.gwp_packaging_ratio,
            RatioField::OpticalDrive => &mut self.gwp_opticaldrive_ratio,
            RatioField::Electronics => &mut self.gwp_electronics_ratio,
            RatioField::OtherComponents => &mut self.gwp_othercomponents_ratio,
        }
    }
}

/// Picks one result among the images of a document
///
/// The first color result that is confident and has both use and
/// manufacturing settles the choice; later images are ignored. Until then
/// the best candidate is kept, preferring results with use and
/// manufacturing, then higher `confidence1`. Direct-OCR results never
/// settle the choice.
#[derive(Debug, Clone)]
pub struct ChartSelector {
    min_confidence: f64,
    settled: bool,
    best: Option<ProportionResult>,
}

impl ChartSelector {
    /// `min_confidence` is the `confidence2` a color result needs to settle
    pub fn new(min_confidence: f64) -> Self {
        Self {
            min_confidence,
            settled: false,
            best: None,
        }
    }

    /// Consider the result of the next image
    pub fn offer(&mut self, result: ProportionResult) -> ExtractionState {
        if self.settled {
            return ExtractionState::Accepted;
        }

        if result.strategy == Strategy::ColorLegend
            && result.confidence2 >= self.min_confidence
            && result.has_use_and_manufacturing()
        {
            debug!(profile = %result.profile, confidence2 = result.confidence2, "document result settled");
            self.best = Some(result);
            self.settled = true;
            return ExtractionState::Accepted;
        }

        let rank = |r: &ProportionResult| (r.has_use_and_manufacturing(), r.confidence1);
        let better = match &self.best {
            None => true,
            Some(best) => {
                let (new_full, new_conf) = rank(&result);
                let (old_full, old_conf) = rank(best);
                (new_full && !old_full) || (new_full == old_full && new_conf > old_conf)
            }
        };
        if better {
            self.best = Some(result);
        }
        ExtractionState::LowConfidence
    }

    pub fn into_selected(self) -> Option<ProportionResult> {
        self.best
    }
}
