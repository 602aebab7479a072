//! Chart detection module
//!
//! Locates chart circles, prepares the masked image variants and rebuilds
//! the legend that maps labels to slice colors.

pub mod circle;
pub mod legend;
pub mod masking;

pub use circle::{CircleLocator, CircleScan, DetectedCircle, DonutGeometry, RingEdge};
pub use legend::{Legend, LegendEntry, LegendReconstructor};
pub use masking::ChartMasking;
