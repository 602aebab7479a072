//! Text recognition module
//!
//! The recognizer seam and the direct-percentage fallback built on it.

pub mod direct;
pub mod engine;

pub use direct::{DirectReading, OcrFallbackExtractor};
pub use engine::{NoText, OcrRequest, RecognitionMode, TextRecognizer};

#[cfg(feature = "tesseract")]
pub use engine::TesseractRecognizer;
