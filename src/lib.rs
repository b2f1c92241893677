// keytap - acoustic keystroke segmentation, fingerprinting and recognition
// Frame ingestion feeds a segmentation thread; key events are turned into
// feature vectors and classified by a random forest trained on labeled samples.

// Module declarations
pub mod analysis;
pub mod audio;
pub mod config;
pub mod engine;
pub mod error;
pub mod model;
pub mod session;
pub mod telemetry;

// Re-exports for convenience
pub use analysis::classifier::{Prediction, RandomForest};
pub use analysis::features::{extract_features, FeatureExtractor, FeatureVector, Spectrogram};
pub use analysis::{NoopObserver, PipelineObserver};
pub use audio::EventBuffer;
pub use config::AppConfig;
pub use engine::{ParamPatch, Pipeline};
pub use model::{KeyboardModel, ModelHandle};
pub use session::{sensitivity_to_threshold, Mode, Session, SessionObserver};

use tracing_subscriber::EnvFilter;

/// Install the tracing subscriber
///
/// The filter comes from `RUST_LOG`, defaulting to `info`. Calling this more
/// than once, or after another subscriber was installed, is a no-op.
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}
