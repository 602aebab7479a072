//! Color analysis module
//!
//! Packed pixel colors, ring histograms and their reconciliation with a
//! chart legend.

pub mod histogram;
pub mod packed;
pub mod segmentation;

pub use histogram::ColorHistogram;
pub use packed::PackedColor;
pub use segmentation::{ChartRole, ColorAttempt, ColorSegmenter};
