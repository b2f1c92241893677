// Error types for the keytap recognizer
//
// This module defines custom error types for the pipeline, feature extraction,
// the classifier model and its persistence. Each error carries a stable numeric
// code so status surfaces can react without string matching.

mod feature;
mod model;
mod pipeline;

pub use feature::{log_feature_error, FeatureError, FeatureErrorCodes};
pub use model::{
    log_model_error, ModelError, ModelErrorCodes, PersistenceError, PersistenceErrorCodes,
};
pub use pipeline::{log_pipeline_error, PipelineError, PipelineErrorCodes};

/// Error codes for structured error reporting
///
/// This trait provides a standard way to get error codes and messages
/// from custom error types, enabling consistent error handling across
/// the status/log boundary.
pub trait ErrorCode {
    /// Get the numeric error code
    fn code(&self) -> i32;

    /// Get the human-readable error message
    fn message(&self) -> String;
}
