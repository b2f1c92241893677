// Pipeline error types and constants

use crate::error::ErrorCode;
use log::error;
use std::fmt;

/// Pipeline error code constants
///
/// Error code range: 6001-6003
pub struct PipelineErrorCodes {}

impl PipelineErrorCodes {
    /// Configuration values are out of range
    pub const INVALID_CONFIG: i32 = 6001;

    /// Segmentation thread could not be spawned
    pub const THREAD_SPAWN: i32 = 6002;

    /// Pipeline was already stopped
    pub const ALREADY_STOPPED: i32 = 6003;
}

/// Log a pipeline error with structured context
pub fn log_pipeline_error(err: &PipelineError, context: &str) {
    error!(
        "Pipeline error in {}: code={}, component=Pipeline, message={}",
        context,
        err.code(),
        err.message()
    );
}

/// Errors raised while starting or driving the segmentation pipeline
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineError {
    /// A configuration field failed validation
    InvalidConfig { field: String, reason: String },

    /// OS refused to spawn the segmentation thread
    ThreadSpawn { reason: String },

    /// `stop()` called twice, or `ingest` after stop
    AlreadyStopped,
}

impl ErrorCode for PipelineError {
    fn code(&self) -> i32 {
        match self {
            PipelineError::InvalidConfig { .. } => PipelineErrorCodes::INVALID_CONFIG,
            PipelineError::ThreadSpawn { .. } => PipelineErrorCodes::THREAD_SPAWN,
            PipelineError::AlreadyStopped => PipelineErrorCodes::ALREADY_STOPPED,
        }
    }

    fn message(&self) -> String {
        match self {
            PipelineError::InvalidConfig { field, reason } => {
                format!("Invalid configuration for {}: {}", field, reason)
            }
            PipelineError::ThreadSpawn { reason } => {
                format!("Failed to spawn segmentation thread: {}", reason)
            }
            PipelineError::AlreadyStopped => "Pipeline already stopped".to_string(),
        }
    }
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "PipelineError::{:?} (code {}): {}",
            self,
            self.code(),
            self.message()
        )
    }
}

impl std::error::Error for PipelineError {}

impl From<std::io::Error> for PipelineError {
    fn from(err: std::io::Error) -> Self {
        PipelineError::ThreadSpawn {
            reason: err.to_string(),
        }
    }
}
