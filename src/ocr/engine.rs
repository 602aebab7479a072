//! Boundary to the text recognition engine
//!
//! The pipeline only ever asks one question: "what text is printed in this
//! region of this image?". [`TextRecognizer`] captures that question so the
//! engine can be Tesseract in production and a scripted closure in tests.

use opencv::core::{Mat, Rect};
use opencv::prelude::*;

use crate::Result;

/// Page segmentation requested from the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecognitionMode {
    /// Single uniform block of text (Tesseract `--psm 6`)
    Block,
    /// Single block read with the neural-network engine (`--psm 6 --oem 1`)
    BlockLstm,
}

/// One recognition call: a region of an image and how to read it
#[derive(Debug, Clone, Copy)]
pub struct OcrRequest<'a> {
    /// BGR or single-channel image
    pub image: &'a Mat,
    /// Region to read, in `image` coordinates
    pub region: Rect,
    pub mode: RecognitionMode,
}

impl<'a> OcrRequest<'a> {
    pub fn new(image: &'a Mat, region: Rect, mode: RecognitionMode) -> Self {
        Self { image, region, mode }
    }

    /// Request covering the whole image
    pub fn whole(image: &'a Mat, mode: RecognitionMode) -> Self {
        let region = Rect::new(0, 0, image.cols(), image.rows());
        Self { image, region, mode }
    }
}

/// Recognizes the text printed in an image region
///
/// Implementations return the raw engine output, one text line per line.
/// An empty string means nothing readable was found.
pub trait TextRecognizer {
    fn recognize(&self, request: &OcrRequest<'_>) -> Result<String>;
}

impl<F> TextRecognizer for F
where
    F: Fn(&OcrRequest<'_>) -> Result<String>,
{
    fn recognize(&self, request: &OcrRequest<'_>) -> Result<String> {
        self(request)
    }
}

/// Recognizer for pipelines without OCR: every region reads as empty
#[derive(Debug, Clone, Copy, Default)]
pub struct NoText;

impl TextRecognizer for NoText {
    fn recognize(&self, _request: &OcrRequest<'_>) -> Result<String> {
        Ok(String::new())
    }
}

#[cfg(feature = "tesseract")]
pub use self::tesseract::TesseractRecognizer;

#[cfg(feature = "tesseract")]
mod tesseract {
    use std::sync::Mutex;

    use leptess::{LepTess, Variable};
    use opencv::{core::Vector, imgcodecs, prelude::*};
    use tracing::debug;

    use super::{OcrRequest, RecognitionMode, TextRecognizer};
    use crate::imaging;
    use crate::{ChartError, Result};

    /// Tesseract engine shared behind a lock
    ///
    /// The engine keeps its image and variables between calls, so one
    /// instance serves one recognition at a time.
    pub struct TesseractRecognizer {
        engine: Mutex<LepTess>,
    }

    impl TesseractRecognizer {
        /// Initialize Tesseract with `language` (for example `"eng"`) and
        /// an optional tessdata directory
        pub fn new(data_path: Option<&str>, language: &str) -> Result<Self> {
            let engine = LepTess::new(data_path, language)
                .map_err(|e| ChartError::ocr(format!("cannot initialize tesseract for '{language}'"), e))?;
            Ok(Self {
                engine: Mutex::new(engine),
            })
        }
    }

    impl TextRecognizer for TesseractRecognizer {
        fn recognize(&self, request: &OcrRequest<'_>) -> Result<String> {
            let crop = imaging::crop(request.image, request.region)?;
            let mut png = Vector::<u8>::new();
            imgcodecs::imencode(".png", &crop, &mut png, &Vector::new())
                .map_err(|e| ChartError::opencv("png encoding", e))?;

            let mut engine = self.engine.lock().map_err(|_| ChartError::OcrError {
                message: "tesseract engine lock poisoned".to_string(),
                source: None,
            })?;

            // the LSTM engine is the default of Tesseract 4+, only the
            // segmentation mode has to be set per call
            let psm = match request.mode {
                RecognitionMode::Block | RecognitionMode::BlockLstm => "6",
            };
            engine
                .set_variable(Variable::TesseditPagesegMode, psm)
                .map_err(|e| ChartError::ocr("cannot set page segmentation mode", e))?;
            engine
                .set_image_from_mem(png.as_slice())
                .map_err(|e| ChartError::ocr("cannot hand image to tesseract", e))?;
            let text = engine
                .get_utf8_text()
                .map_err(|e| ChartError::ocr("tesseract returned invalid text", e))?;

            debug!(region = ?request.region, text = %text.trim(), "ocr");
            Ok(text)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opencv::core::{Scalar, CV_8UC3};

    #[test]
    fn test_closures_are_recognizers() {
        let image = Mat::new_rows_cols_with_default(40, 80, CV_8UC3, Scalar::all(255.0)).unwrap();
        let recognizer = |req: &OcrRequest<'_>| -> Result<String> {
            Ok(if req.region.y < 20 { "Use".into() } else { "Transport".into() })
        };

        let top = OcrRequest::new(&image, Rect::new(0, 0, 80, 20), RecognitionMode::Block);
        let bottom = OcrRequest::new(&image, Rect::new(0, 20, 80, 20), RecognitionMode::Block);
        assert_eq!(recognizer.recognize(&top).unwrap(), "Use");
        assert_eq!(recognizer.recognize(&bottom).unwrap(), "Transport");

        let dynamic: &dyn TextRecognizer = &recognizer;
        assert_eq!(dynamic.recognize(&top).unwrap(), "Use");
    }

    #[test]
    fn test_whole_request_covers_image() {
        let image = Mat::new_rows_cols_with_default(40, 80, CV_8UC3, Scalar::all(255.0)).unwrap();
        let request = OcrRequest::whole(&image, RecognitionMode::BlockLstm);
        assert_eq!(request.region, Rect::new(0, 0, 80, 40));
        assert!(NoText.recognize(&request).unwrap().is_empty());
    }
}
