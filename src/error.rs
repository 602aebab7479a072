//! Error types for the scan_piecharts library
//!
//! "No chart in this image" and "chart found but extraction is unreliable"
//! are outcomes, not errors: see [`crate::ChartAnalysis`] and
//! [`crate::resolver::ProportionResult::is_low_confidence`].

use thiserror::Error;

/// Result type alias for scan_piecharts operations
pub type Result<T> = std::result::Result<T, ChartError>;

/// Error types for chart analysis operations
#[derive(Error, Debug)]
pub enum ChartError {
    /// Image file could not be loaded or decoded
    #[error("Failed to load image: {message}")]
    ImageLoadError {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Requested vendor profile is not part of the loaded profile set
    #[error("Unknown profile: {name}")]
    ProfileNotFound { name: String },

    /// Profile file is malformed or holds inconsistent parameters
    #[error("Invalid configuration{}: {reason}", .profile.as_deref().map(|p| format!(" for profile {p}")).unwrap_or_default())]
    ConfigurationError {
        profile: Option<String>,
        reason: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A label pattern of a profile is not a valid regular expression
    #[error("Invalid pattern for label '{label}' in profile {profile}")]
    InvalidPattern {
        profile: String,
        label: String,
        #[source]
        source: regex::Error,
    },

    /// OpenCV operation failed
    #[error("OpenCV error: {operation}")]
    OpenCvError {
        operation: String,
        #[source]
        source: Option<opencv::Error>,
    },

    /// Text recognition engine failed
    #[error("OCR error: {message}")]
    OcrError {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Invalid input parameters
    #[error("Invalid parameter: {parameter} = {value}")]
    InvalidParameter { parameter: String, value: String },

    /// Generic processing error
    #[error("Processing error: {message}")]
    ProcessingError { message: String },
}

impl ChartError {
    /// Create an image load error with context
    pub fn image_load<E>(message: impl Into<String>, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::ImageLoadError {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create an OpenCV error with context
    pub fn opencv(operation: impl Into<String>, source: opencv::Error) -> Self {
        Self::OpenCvError {
            operation: operation.into(),
            source: Some(source),
        }
    }

    /// Create an OCR engine error with context
    pub fn ocr<E>(message: impl Into<String>, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::OcrError {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a configuration error without an underlying source
    pub fn config(profile: Option<&str>, reason: impl Into<String>) -> Self {
        Self::ConfigurationError {
            profile: profile.map(str::to_string),
            reason: reason.into(),
            source: None,
        }
    }

    /// Create a generic processing error
    pub fn processing(message: impl Into<String>) -> Self {
        Self::ProcessingError {
            message: message.into(),
        }
    }

    /// Configuration problems are programmer/config errors and must not be
    /// retried with another image.
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            ChartError::ProfileNotFound { .. }
                | ChartError::ConfigurationError { .. }
                | ChartError::InvalidPattern { .. }
        )
    }

    /// Check if the caller may move on to the next image or page
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            ChartError::ImageLoadError { .. }
                | ChartError::OcrError { .. }
                | ChartError::OpenCvError { .. }
                | ChartError::ProcessingError { .. }
        )
    }
}
