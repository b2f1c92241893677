// Model and persistence error types and constants

use crate::error::ErrorCode;
use log::error;
use std::fmt;

/// Model error code constants
///
/// Error code range: 4001-4004
pub struct ModelErrorCodes {}

impl ModelErrorCodes {
    /// Not enough samples or distinct labels to train
    pub const INSUFFICIENT_DATA: i32 = 4001;

    /// Model RwLock was poisoned
    pub const LOCK_POISONED: i32 = 4002;

    /// No captured features are waiting for a label
    pub const NOTHING_PENDING: i32 = 4003;

    /// Sample label was empty
    pub const EMPTY_LABEL: i32 = 4004;
}

/// Persistence error code constants
///
/// Error code range: 5001-5002
pub struct PersistenceErrorCodes {}

impl PersistenceErrorCodes {
    /// Reading or writing the persisted unit failed
    pub const IO: i32 = 5001;

    /// Persisted unit could not be decoded or violates model invariants
    pub const CORRUPT: i32 = 5002;
}

/// Log a model error with structured context
pub fn log_model_error(err: &ModelError, context: &str) {
    error!(
        "Model error in {}: code={}, component=KeyboardModel, message={}",
        context,
        err.code(),
        err.message()
    );
}

/// Errors raised by the sample store / classifier pair
#[derive(Debug, Clone, PartialEq)]
pub enum ModelError {
    /// Training requires samples for at least two distinct labels
    InsufficientData { samples: usize, labels: usize },

    /// Shared model lock was poisoned
    LockPoisoned,

    /// `commit_sample` called with no captured key event
    NothingPending,

    /// Labels must be non-empty
    EmptyLabel,
}

impl ErrorCode for ModelError {
    fn code(&self) -> i32 {
        match self {
            ModelError::InsufficientData { .. } => ModelErrorCodes::INSUFFICIENT_DATA,
            ModelError::LockPoisoned => ModelErrorCodes::LOCK_POISONED,
            ModelError::NothingPending => ModelErrorCodes::NOTHING_PENDING,
            ModelError::EmptyLabel => ModelErrorCodes::EMPTY_LABEL,
        }
    }

    fn message(&self) -> String {
        match self {
            ModelError::InsufficientData { samples, labels } => {
                format!(
                    "Insufficient training data: {} samples across {} labels, need at least 2 labels",
                    samples, labels
                )
            }
            ModelError::LockPoisoned => "Model lock poisoned".to_string(),
            ModelError::NothingPending => {
                "No key event captured yet. Press a key before adding a sample.".to_string()
            }
            ModelError::EmptyLabel => "Sample label must not be empty".to_string(),
        }
    }
}

impl fmt::Display for ModelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ModelError::{:?} (code {}): {}",
            self,
            self.code(),
            self.message()
        )
    }
}

impl std::error::Error for ModelError {}

/// Errors raised while saving or loading the persisted model unit
#[derive(Debug, Clone, PartialEq)]
pub enum PersistenceError {
    /// Filesystem failure
    Io { details: String },

    /// Malformed or inconsistent persisted unit
    Corrupt { reason: String },
}

impl ErrorCode for PersistenceError {
    fn code(&self) -> i32 {
        match self {
            PersistenceError::Io { .. } => PersistenceErrorCodes::IO,
            PersistenceError::Corrupt { .. } => PersistenceErrorCodes::CORRUPT,
        }
    }

    fn message(&self) -> String {
        match self {
            PersistenceError::Io { details } => format!("Model file I/O failed: {}", details),
            PersistenceError::Corrupt { reason } => {
                format!("Persisted model is corrupt: {}", reason)
            }
        }
    }
}

impl fmt::Display for PersistenceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "PersistenceError::{:?} (code {}): {}",
            self,
            self.code(),
            self.message()
        )
    }
}

impl std::error::Error for PersistenceError {}

impl From<std::io::Error> for PersistenceError {
    fn from(err: std::io::Error) -> Self {
        PersistenceError::Io {
            details: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for PersistenceError {
    fn from(err: serde_json::Error) -> Self {
        PersistenceError::Corrupt {
            reason: err.to_string(),
        }
    }
}
