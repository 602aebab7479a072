//! Vendor profiles for chart analysis
//!
//! A profile adapts the generic pipeline to one vendor's report layout:
//! the regular expressions that recognize legend labels and "label NN%"
//! pairs, an optional static palette, and the geometric tolerances of the
//! masks. Profiles are loaded once, validated and compiled, then shared
//! read-only by every analysis.
//!
//! # Configuration Loading
//!
//! ```no_run
//! use scan_piecharts::ProfileStore;
//! use std::path::Path;
//!
//! let store = ProfileStore::from_json_file(Path::new("profiles/profiles.json"))?;
//! let hp = store.get("HP")?;
//! # Ok::<(), scan_piecharts::ChartError>(())
//! ```
//!
//! # File Format
//!
//! ```json
//! {"profiles": {"HP": {
//!     "map": {"use": [0, 150, 214]},
//!     "ocr patterns legend": {"use": "(?i)use"},
//!     "ocr patterns direct": {"use": "(?i)use"},
//!     "opt": ["EOL"],
//!     "vertical dilation": 5,
//!     "color_th": 20,
//!     "ocr percent gamma": 1.8,
//!     "ocr percent dilate size": [0.2, 0.1],
//!     "ocr percent letter select method": "average"
//! }}}
//! ```
//!
//! Label pattern objects keep their document order: the first matching
//! pattern wins, so more specific labels must be listed first.

use regex::Regex;
use serde::de::{Deserializer, MapAccess, Visitor};
use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;
use std::path::Path;

use crate::color::PackedColor;
use crate::constants;
use crate::detection::LegendEntry;
use crate::label::Label;
use crate::{ChartError, Result};

/// Profile set bundled with the crate
const EMBEDDED_PROFILES: &str = include_str!("../profiles/profiles.json");

/// How text pixels are selected before direct-percentage OCR
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LetterSelectMethod {
    /// Grayscale average of the channels
    Average,
    /// Brightest channel, so colored text on white stays light
    #[default]
    Max,
}

/// Profile entry as written in the JSON file
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawProfile {
    #[serde(default, deserialize_with = "ordered_labels")]
    map: Vec<(Label, [u8; 3])>,

    #[serde(rename = "ocr patterns legend", default, deserialize_with = "ordered_labels")]
    legend_patterns: Vec<(Label, String)>,

    #[serde(rename = "ocr patterns direct", default, deserialize_with = "ordered_labels")]
    direct_patterns: Vec<(Label, String)>,

    #[serde(default)]
    opt: Vec<Label>,

    #[serde(rename = "vertical dilation", default = "default_vertical_dilation")]
    vertical_dilation: i32,

    #[serde(rename = "horizontal dilation", default = "default_horizontal_dilation")]
    horizontal_dilation: i32,

    #[serde(rename = "color_th", default = "default_color_threshold")]
    color_threshold: u8,

    #[serde(rename = "ocr percent gamma", default = "default_ocr_gamma")]
    ocr_gamma: f64,

    #[serde(rename = "ocr percent dilate size")]
    ocr_dilate_size: Option<[f64; 2]>,

    #[serde(rename = "ocr percent letter select method", default)]
    letter_select: LetterSelectMethod,

    #[serde(rename = "min attributed fraction", default = "default_min_attributed")]
    min_attributed_fraction: f64,

    #[serde(rename = "unattributed noise fraction", default = "default_noise_fraction")]
    unattributed_noise_fraction: f64,

    #[serde(rename = "correction cap", default = "default_correction_cap")]
    correction_cap: f64,

    #[serde(rename = "optional noise fraction", default = "default_optional_noise")]
    optional_noise_fraction: f64,

    #[serde(rename = "min ocr confidence", default = "default_min_ocr_confidence")]
    min_ocr_confidence: f64,

    #[serde(rename = "background threshold", default = "default_background_threshold")]
    background_threshold: u8,

    #[serde(rename = "exclude background", default = "default_true")]
    exclude_background: bool,

    #[serde(rename = "min circle radius", default = "default_min_circle_radius")]
    min_circle_radius: i32,

    #[serde(rename = "circle perfectness", default = "default_circle_perfectness")]
    circle_perfectness: f64,

    #[serde(rename = "text darkness threshold", default = "default_text_darkness")]
    text_darkness_threshold: f64,

    #[serde(rename = "inpaint radius", default = "default_inpaint_radius")]
    inpaint_radius: f64,

    #[serde(rename = "glyph threshold", default = "default_glyph_threshold")]
    glyph_threshold: f64,
}

fn default_vertical_dilation() -> i32 {
    constants::legend::VERTICAL_DILATION
}

fn default_horizontal_dilation() -> i32 {
    constants::legend::HORIZONTAL_DILATION
}

fn default_color_threshold() -> u8 {
    constants::color::DISTANCE_THRESHOLD
}

fn default_ocr_gamma() -> f64 {
    constants::ocr::DEFAULT_GAMMA
}

fn default_min_attributed() -> f64 {
    constants::color::MIN_ATTRIBUTED_FRACTION
}

fn default_noise_fraction() -> f64 {
    constants::color::UNATTRIBUTED_NOISE_FRACTION
}

fn default_correction_cap() -> f64 {
    constants::color::CORRECTION_CAP
}

fn default_optional_noise() -> f64 {
    constants::color::OPTIONAL_NOISE_FRACTION
}

fn default_min_ocr_confidence() -> f64 {
    constants::confidence::MIN_OCR_CONFIDENCE
}

fn default_background_threshold() -> u8 {
    constants::color::BACKGROUND_THRESHOLD
}

fn default_true() -> bool {
    true
}

fn default_min_circle_radius() -> i32 {
    constants::circles::MIN_RADIUS
}

fn default_circle_perfectness() -> f64 {
    constants::circles::HOUGH_PERFECTNESS
}

fn default_text_darkness() -> f64 {
    constants::masking::TEXT_DARKNESS_THRESHOLD
}

fn default_inpaint_radius() -> f64 {
    constants::masking::INPAINT_RADIUS
}

fn default_glyph_threshold() -> f64 {
    constants::legend::GLYPH_THRESHOLD
}

/// Deserialize a `{label: value}` object into a vector in document order
fn ordered_labels<'de, D, V>(deserializer: D) -> std::result::Result<Vec<(Label, V)>, D::Error>
where
    D: Deserializer<'de>,
    V: Deserialize<'de>,
{
    struct OrderedVisitor<V>(std::marker::PhantomData<V>);

    impl<'de, V: Deserialize<'de>> Visitor<'de> for OrderedVisitor<V> {
        type Value = Vec<(Label, V)>;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("an object keyed by chart labels")
        }

        fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> std::result::Result<Self::Value, A::Error> {
            let mut entries = Vec::with_capacity(map.size_hint().unwrap_or(0));
            while let Some((label, value)) = map.next_entry::<Label, V>()? {
                entries.push((label, value));
            }
            Ok(entries)
        }
    }

    deserializer.deserialize_map(OrderedVisitor(std::marker::PhantomData))
}

#[derive(Debug, Deserialize)]
struct RawProfileFile {
    profiles: HashMap<String, RawProfile>,
}

/// Legend label recognizer
#[derive(Debug, Clone)]
pub struct LabelPattern {
    pub label: Label,
    pub regex: Regex,
}

/// Direct-percentage recognizer: the label pattern alone, and the label
/// pattern followed by a number and a percent sign
#[derive(Debug, Clone)]
pub struct PercentPattern {
    pub label: Label,
    pub label_regex: Regex,
    pub value_regex: Regex,
}

/// Validated, compiled vendor profile
#[derive(Debug, Clone)]
pub struct Profile {
    pub name: String,
    /// Static palette used when no legend can be reconstructed
    pub palette: Vec<LegendEntry>,
    pub legend_patterns: Vec<LabelPattern>,
    pub direct_patterns: Vec<PercentPattern>,
    /// Labels that may legitimately be absent from a chart
    pub optional: Vec<Label>,
    pub vertical_dilation: i32,
    pub horizontal_dilation: i32,
    pub color_threshold: u8,
    pub ocr_gamma: f64,
    /// Dilation kernel for direct OCR, as fractions of the outer radius
    pub ocr_dilate_size: Option<[f64; 2]>,
    pub letter_select: LetterSelectMethod,
    pub min_attributed_fraction: f64,
    pub unattributed_noise_fraction: f64,
    pub correction_cap: f64,
    pub optional_noise_fraction: f64,
    pub min_ocr_confidence: f64,
    pub background_threshold: u8,
    /// Drop near-white ring pixels from the color tally
    pub exclude_background: bool,
    pub min_circle_radius: i32,
    /// `HOUGH_GRADIENT_ALT` circle perfectness in `(0, 1]`
    pub circle_perfectness: f64,
    /// Brightest-channel level under which a pixel is inpainted as text
    pub text_darkness_threshold: f64,
    pub inpaint_radius: f64,
    /// Gray level under which a de-charted pixel belongs to a legend glyph
    pub glyph_threshold: f64,
}

/// Number, possibly misread with S for 5, followed by a percent sign
const PERCENT_SUFFIX: &str = r"[^0-9sS%]*([0-9sS]+\.?[0-9]*)\s*%";

impl Profile {
    fn compile(name: &str, raw: RawProfile) -> Result<Self> {
        let compile = |label: Label, pattern: &str| {
            Regex::new(pattern).map_err(|source| ChartError::InvalidPattern {
                profile: name.to_string(),
                label: label.to_string(),
                source,
            })
        };

        let legend_patterns = raw
            .legend_patterns
            .iter()
            .map(|(label, pattern)| {
                Ok(LabelPattern {
                    label: *label,
                    regex: compile(*label, pattern)?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let direct_patterns = raw
            .direct_patterns
            .iter()
            .map(|(label, pattern)| {
                Ok(PercentPattern {
                    label: *label,
                    label_regex: compile(*label, pattern)?,
                    value_regex: compile(*label, &format!("(?:{pattern}){PERCENT_SUFFIX}"))?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let palette = raw
            .map
            .iter()
            .map(|(label, rgb)| LegendEntry::new(*label, PackedColor::from(*rgb)))
            .collect();

        let profile = Self {
            name: name.to_string(),
            palette,
            legend_patterns,
            direct_patterns,
            optional: raw.opt,
            vertical_dilation: raw.vertical_dilation,
            horizontal_dilation: raw.horizontal_dilation,
            color_threshold: raw.color_threshold,
            ocr_gamma: raw.ocr_gamma,
            ocr_dilate_size: raw.ocr_dilate_size,
            letter_select: raw.letter_select,
            min_attributed_fraction: raw.min_attributed_fraction,
            unattributed_noise_fraction: raw.unattributed_noise_fraction,
            correction_cap: raw.correction_cap,
            optional_noise_fraction: raw.optional_noise_fraction,
            min_ocr_confidence: raw.min_ocr_confidence,
            background_threshold: raw.background_threshold,
            exclude_background: raw.exclude_background,
            min_circle_radius: raw.min_circle_radius,
            circle_perfectness: raw.circle_perfectness,
            text_darkness_threshold: raw.text_darkness_threshold,
            inpaint_radius: raw.inpaint_radius,
            glyph_threshold: raw.glyph_threshold,
        };
        profile.validate()?;
        Ok(profile)
    }

    fn validate(&self) -> Result<()> {
        let fail = |reason: String| Err(ChartError::config(Some(&self.name), reason));

        if self.vertical_dilation < 1 || self.horizontal_dilation < 1 {
            return fail(format!(
                "dilation kernel must be positive, got {}x{}",
                self.horizontal_dilation, self.vertical_dilation
            ));
        }
        if self.color_threshold == 0 {
            return fail("color_th must be at least 1".to_string());
        }
        if !(self.ocr_gamma > 0.0) {
            return fail(format!("ocr percent gamma must be positive, got {}", self.ocr_gamma));
        }
        if let Some([w, h]) = self.ocr_dilate_size {
            if !(w > 0.0 && h > 0.0) {
                return fail(format!("ocr percent dilate size must be positive, got [{w}, {h}]"));
            }
        }
        if self.min_circle_radius < 1 || !(self.inpaint_radius > 0.0) {
            return fail(format!(
                "min circle radius and inpaint radius must be positive, got {} and {}",
                self.min_circle_radius, self.inpaint_radius
            ));
        }
        if !(0.0..=255.0).contains(&self.text_darkness_threshold) || !(0.0..=255.0).contains(&self.glyph_threshold) {
            return fail("text darkness and glyph thresholds must lie in [0, 255]".to_string());
        }
        if !(self.circle_perfectness > 0.0 && self.circle_perfectness <= 1.0) {
            return fail(format!("circle perfectness must lie in (0, 1], got {}", self.circle_perfectness));
        }
        for (key, value) in [
            ("min attributed fraction", self.min_attributed_fraction),
            ("unattributed noise fraction", self.unattributed_noise_fraction),
            ("correction cap", self.correction_cap),
            ("optional noise fraction", self.optional_noise_fraction),
            ("min ocr confidence", self.min_ocr_confidence),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return fail(format!("{key} must lie in [0, 1], got {value}"));
            }
        }
        Ok(())
    }

    pub fn has_legend_patterns(&self) -> bool {
        !self.legend_patterns.is_empty()
    }

    pub fn has_direct_patterns(&self) -> bool {
        !self.direct_patterns.is_empty()
    }

    /// First legend label whose pattern matches `text`
    pub fn match_legend_label(&self, text: &str) -> Option<Label> {
        self.legend_patterns
            .iter()
            .find(|p| p.regex.is_match(text))
            .map(|p| p.label)
    }
}

/// Immutable set of vendor profiles keyed by name
#[derive(Debug, Clone)]
pub struct ProfileStore {
    profiles: HashMap<String, Profile>,
}

impl ProfileStore {
    /// Load profiles from a JSON file
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| ChartError::ConfigurationError {
            profile: None,
            reason: format!("cannot read profile file {}", path.display()),
            source: Some(Box::new(e)),
        })?;
        Self::from_json_str(&content)
    }

    /// Parse profiles from a JSON document
    pub fn from_json_str(content: &str) -> Result<Self> {
        let raw: RawProfileFile =
            serde_json::from_str(content).map_err(|e| ChartError::ConfigurationError {
                profile: None,
                reason: "malformed profile document".to_string(),
                source: Some(Box::new(e)),
            })?;

        let profiles = raw
            .profiles
            .into_iter()
            .map(|(name, raw)| Profile::compile(&name, raw).map(|p| (name, p)))
            .collect::<Result<HashMap<_, _>>>()?;

        Ok(Self { profiles })
    }

    /// Profiles bundled with the crate
    pub fn embedded() -> Result<Self> {
        Self::from_json_str(EMBEDDED_PROFILES)
    }

    pub fn get(&self, name: &str) -> Result<&Profile> {
        self.profiles.get(name).ok_or_else(|| ChartError::ProfileNotFound {
            name: name.to_string(),
        })
    }

    /// Sorted profile names
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.profiles.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{"profiles": {"TEST": {
        "map": {"use": [0, 0, 255], "prod": [255, 0, 0]},
        "ocr patterns legend": {"transp": "(?i)transport", "use": "(?i)use", "prod": "(?i)manufactur"},
        "ocr patterns direct": {"use": "(?i)use"},
        "opt": ["EOL"],
        "vertical dilation": 7,
        "color_th": 25,
        "ocr percent dilate size": [0.2, 0.1],
        "ocr percent letter select method": "average"
    }}}"#;

    #[test]
    fn test_profile_loading() {
        let store = ProfileStore::from_json_str(SAMPLE).unwrap();
        assert_eq!(store.len(), 1);
        let profile = store.get("TEST").unwrap();

        assert_eq!(profile.vertical_dilation, 7);
        assert_eq!(profile.horizontal_dilation, constants::legend::HORIZONTAL_DILATION);
        assert_eq!(profile.color_threshold, 25);
        assert_eq!(profile.ocr_gamma, constants::ocr::DEFAULT_GAMMA);
        assert_eq!(profile.letter_select, LetterSelectMethod::Average);
        assert_eq!(profile.ocr_dilate_size, Some([0.2, 0.1]));
        assert_eq!(profile.optional, vec![Label::EndOfLife]);
        assert!(profile.exclude_background);
        assert_eq!(profile.glyph_threshold, constants::legend::GLYPH_THRESHOLD);
        assert_eq!(profile.palette.len(), 2);
        assert_eq!(profile.palette[0].color, PackedColor::from_rgb(0, 0, 255));
    }

    #[test]
    fn test_legend_patterns_keep_document_order() {
        let store = ProfileStore::from_json_str(SAMPLE).unwrap();
        let profile = store.get("TEST").unwrap();
        let order: Vec<Label> = profile.legend_patterns.iter().map(|p| p.label).collect();
        assert_eq!(order, vec![Label::Transport, Label::Use, Label::Manufacturing]);

        assert_eq!(profile.match_legend_label("Product use"), Some(Label::Use));
        assert_eq!(profile.match_legend_label("Manufacturing"), Some(Label::Manufacturing));
        assert_eq!(profile.match_legend_label("Recycling"), None);
    }

    #[test]
    fn test_value_pattern_is_derived_from_label_pattern() {
        let store = ProfileStore::from_json_str(SAMPLE).unwrap();
        let pattern = &store.get("TEST").unwrap().direct_patterns[0];
        let caps = pattern.value_regex.captures("Use: 81.5 %").unwrap();
        assert_eq!(&caps[1], "81.5");
    }

    #[test]
    fn test_missing_profile_is_a_configuration_error() {
        let store = ProfileStore::from_json_str(SAMPLE).unwrap();
        let err = store.get("ACME").unwrap_err();
        assert!(matches!(err, ChartError::ProfileNotFound { .. }));
        assert!(err.is_configuration_error());
    }

    #[test]
    fn test_invalid_regex_is_rejected() {
        let json = r#"{"profiles": {"BAD": {"ocr patterns legend": {"use": "(unclosed"}}}}"#;
        let err = ProfileStore::from_json_str(json).unwrap_err();
        assert!(matches!(err, ChartError::InvalidPattern { ref label, .. } if label == "use"));
    }

    #[test]
    fn test_unknown_label_is_rejected() {
        let json = r#"{"profiles": {"BAD": {"ocr patterns legend": {"coffee": "(?i)coffee"}}}}"#;
        let err = ProfileStore::from_json_str(json).unwrap_err();
        assert!(err.is_configuration_error());
    }

    #[test]
    fn test_invalid_parameters_are_rejected() {
        let json = r#"{"profiles": {"BAD": {"vertical dilation": 0}}}"#;
        assert!(ProfileStore::from_json_str(json).is_err());

        let json = r#"{"profiles": {"BAD": {"ocr percent gamma": -1.0}}}"#;
        assert!(ProfileStore::from_json_str(json).is_err());

        let json = r#"{"profiles": {"BAD": {"min attributed fraction": 1.5}}}"#;
        assert!(ProfileStore::from_json_str(json).is_err());

        let json = r#"{"profiles": {"BAD": {"circle perfectness": 0.0}}}"#;
        assert!(ProfileStore::from_json_str(json).is_err());
        let json = r#"{"profiles": {"BAD": {"glyph threshold": 300.0}}}"#;
        assert!(ProfileStore::from_json_str(json).is_err());
    }

    #[test]
    fn test_image_thresholds_are_overridable() {
        let json = r#"{"profiles": {"SCAN": {
            "exclude background": false,
            "min circle radius": 25,
            "circle perfectness": 0.8,
            "text darkness threshold": 50,
            "inpaint radius": 8,
            "glyph threshold": 180
        }}}"#;
        let store = ProfileStore::from_json_str(json).unwrap();
        let profile = store.get("SCAN").unwrap();
        assert!(!profile.exclude_background);
        assert_eq!(profile.min_circle_radius, 25);
        assert_eq!(profile.circle_perfectness, 0.8);
        assert_eq!(profile.text_darkness_threshold, 50.0);
        assert_eq!(profile.inpaint_radius, 8.0);
        assert_eq!(profile.glyph_threshold, 180.0);
    }

    #[test]
    fn test_embedded_profiles() {
        let store = ProfileStore::embedded().unwrap();
        assert!(store.get("HP").is_ok());
        assert!(store.get("DELL").is_ok());
        assert!(store.names().windows(2).all(|w| w[0] <= w[1]));
    }
}
