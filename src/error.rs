//! Error types for the background removal pipeline

use thiserror::Error;

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, BgRemovalError>;

/// Error taxonomy for the background removal pipeline
#[derive(Error, Debug)]
pub enum BgRemovalError {
    /// Input/output errors (file not found, permission denied, etc.)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Image decoding or encoding errors raised by the image crate
    #[error("Image processing error: {0}")]
    Image(#[from] image::ImageError),

    /// Non-image or undecodable input, rejected before any stage runs
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Unknown output format, quality tier or strategy id
    #[error("Unsupported {parameter} '{value}'. Valid values: {}", .valid.join(", "))]
    UnsupportedParameter {
        parameter: String,
        value: String,
        valid: Vec<String>,
    },

    /// Failure of the segmentation capability
    #[error("Segmentation failed using strategy '{strategy}': {message}")]
    Segmentation { strategy: String, message: String },

    /// Encoder failure for a given output format
    #[error("Encoding to {format} failed: {message}")]
    Encode { format: String, message: String },

    /// Numerical failure inside an iterative algorithm
    #[error("Numerical error: {0}")]
    Numerical(String),

    /// Invalid configuration or parameters
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Stage-level processing errors
    #[error("Processing error: {0}")]
    Processing(String),

    /// Generic error for unexpected conditions
    #[error("Internal error: {0}")]
    Internal(String),
}

impl BgRemovalError {
    /// Create a new invalid input error
    pub fn invalid_input<S: Into<String>>(msg: S) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Create a new invalid configuration error
    pub fn invalid_config<S: Into<String>>(msg: S) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// Create an unsupported parameter error listing the accepted values
    pub fn unsupported_parameter<S: Into<String> + Clone, V: Into<String>>(
        parameter: &str,
        value: V,
        valid: &[S],
    ) -> Self {
        Self::UnsupportedParameter {
            parameter: parameter.to_string(),
            value: value.into(),
            valid: valid.iter().cloned().map(Into::into).collect(),
        }
    }

    /// Create a new segmentation error
    pub fn segmentation<S: Into<String>, M: Into<String>>(strategy: S, msg: M) -> Self {
        Self::Segmentation {
            strategy: strategy.into(),
            message: msg.into(),
        }
    }

    /// Create a new encode error
    pub fn encode<S: Into<String>, M: Into<String>>(format: S, msg: M) -> Self {
        Self::Encode {
            format: format.into(),
            message: msg.into(),
        }
    }

    /// Create a new numerical error
    pub fn numerical<S: Into<String>>(msg: S) -> Self {
        Self::Numerical(msg.into())
    }

    /// Create a new processing error
    pub fn processing<S: Into<String>>(msg: S) -> Self {
        Self::Processing(msg.into())
    }

    /// Create a new internal error
    pub fn internal<S: Into<String>>(msg: S) -> Self {
        Self::Internal(msg.into())
    }

    /// Create configuration error with valid ranges
    pub fn config_value_error<T: std::fmt::Display>(
        parameter: &str,
        value: T,
        valid_range: &str,
        recommended: Option<T>,
    ) -> Self {
        let recommendation = match recommended {
            Some(rec) => format!(" Recommended: {}", rec),
            None => String::new(),
        };

        Self::InvalidConfig(format!(
            "Invalid {}: {} (valid range: {}).{}",
            parameter, value, valid_range, recommendation
        ))
    }

    /// Create processing error with stage context
    pub fn processing_stage_error(stage: &str, details: &str, input_info: Option<&str>) -> Self {
        let input_context = match input_info {
            Some(info) => format!(" (input: {})", info),
            None => String::new(),
        };

        Self::Processing(format!(
            "Processing failed at stage '{}'{}: {}",
            stage, input_context, details
        ))
    }

    /// Whether the error should be reported to callers as a client-side rejection
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidInput(_) | Self::UnsupportedParameter { .. } | Self::InvalidConfig(_)
        )
    }
}
