// Feature extraction error types and constants

use crate::error::ErrorCode;
use log::warn;
use std::fmt;

/// Feature extraction error code constants
///
/// Error code range: 3001-3002
pub struct FeatureErrorCodes {}

impl FeatureErrorCodes {
    /// Buffer is empty or shorter than the minimum analysis window
    pub const INSUFFICIENT_SIGNAL: i32 = 3001;

    /// Sample rate is zero
    pub const INVALID_SAMPLE_RATE: i32 = 3002;
}

/// Log a feature extraction failure with structured context
///
/// Extraction failures are per-event and never fatal, so they are logged at
/// warn level rather than error.
pub fn log_feature_error(err: &FeatureError, context: &str) {
    warn!(
        "Feature error in {}: code={}, component=FeatureExtractor, message={}",
        context,
        err.code(),
        err.message()
    );
}

/// Errors raised while turning an event buffer into features
#[derive(Debug, Clone, PartialEq)]
pub enum FeatureError {
    /// Buffer too short for the underlying transform
    InsufficientSignal { len: usize, required: usize },

    /// Sample rate must be positive
    InvalidSampleRate { sample_rate: u32 },
}

impl ErrorCode for FeatureError {
    fn code(&self) -> i32 {
        match self {
            FeatureError::InsufficientSignal { .. } => FeatureErrorCodes::INSUFFICIENT_SIGNAL,
            FeatureError::InvalidSampleRate { .. } => FeatureErrorCodes::INVALID_SAMPLE_RATE,
        }
    }

    fn message(&self) -> String {
        match self {
            FeatureError::InsufficientSignal { len, required } => {
                format!(
                    "Insufficient signal: buffer has {} samples, need at least {}",
                    len, required
                )
            }
            FeatureError::InvalidSampleRate { sample_rate } => {
                format!("Sample rate must be greater than 0 (got {})", sample_rate)
            }
        }
    }
}

impl fmt::Display for FeatureError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "FeatureError::{:?} (code {}): {}",
            self,
            self.code(),
            self.message()
        )
    }
}

impl std::error::Error for FeatureError {}
