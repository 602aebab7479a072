//! # Scan Piecharts
//!
//! Recovers the lifecycle carbon-footprint shares (use, manufacturing,
//! transport, end of life and manufacturing sub-components) printed as pie
//! or donut charts in product sustainability reports.
//!
//! The pipeline works on a rendered page image:
//! - Locating the chart circles and deciding whether they are donuts
//! - Rebuilding the legend (swatch color to label) with OCR
//! - Counting ring pixels per legend color and turning counts into shares
//! - Falling back to reading the printed "label NN %" pairs
//! - Completing missing core shares and checking the arithmetic
//!
//! Vendor layouts differ, so every threshold and label pattern comes from a
//! named [`Profile`].
//!
//! ## Example
//!
//! ```rust,no_run
//! use scan_piecharts::{image_loader::load_image, NoText, PiechartAnalyzer, ProfileStore};
//! use std::{path::Path, sync::Arc};
//!
//! let profiles = Arc::new(ProfileStore::embedded()?);
//! let analyzer = PiechartAnalyzer::new(profiles, NoText);
//! let page = load_image(Path::new("report-page-3.png"))?;
//! if let Some(result) = analyzer.analyze(&page, "HP")?.into_result() {
//!     println!("{}", serde_json::to_string(&result.ratios()).unwrap_or_default());
//! }
//! # Ok::<(), scan_piecharts::ChartError>(())
//! ```

pub mod analyzer;
pub mod color;
pub mod config;
pub mod constants;
pub mod detection;
pub mod error;
pub mod image_loader;
pub mod label;
pub mod ocr;
pub mod resolver;

pub(crate) mod imaging;

pub use analyzer::{ChartAnalysis, PiechartAnalyzer};
pub use color::PackedColor;
pub use config::{Profile, ProfileStore};
pub use detection::{DetectedCircle, Legend, LegendEntry};
pub use error::{ChartError, Result};
pub use label::{Label, RatioField};
pub use ocr::{NoText, OcrRequest, RecognitionMode, TextRecognizer};
pub use resolver::{ArithmeticAmbiguity, ChartSelector, ExtractionState, FootprintRatios, ProportionResult, Strategy};

#[cfg(feature = "tesseract")]
pub use ocr::TesseractRecognizer;
