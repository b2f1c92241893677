// Session - routes key events to learning or matching
//
// A Session is the pipeline observer used by interactive front ends. In
// learning mode each event's features are held as the pending sample until
// the user labels it; in matching mode each event is classified. Every user
// facing outcome is reported as a status line through the SessionObserver and
// the telemetry hub.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use serde::{Deserialize, Serialize};

use crate::analysis::classifier::Prediction;
use crate::analysis::features::{FeatureExtractor, FeatureVector, Spectrogram};
use crate::analysis::PipelineObserver;
use crate::audio::EventBuffer;
use crate::engine::Pipeline;
use crate::error::{log_feature_error, log_model_error, ErrorCode, ModelError};
use crate::model::ModelHandle;
use crate::telemetry;

/// Loudness threshold at 0% sensitivity
const MAX_THRESHOLD: f32 = 0.05;

/// What the session does with each key event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    Learning,
    Matching,
}

/// Receives session output; every method defaults to a no-op
pub trait SessionObserver: Send + Sync {
    fn on_status(&self, _message: &str) {}

    fn on_features(&self, _features: &FeatureVector) {}

    fn on_prediction(&self, _prediction: &Prediction) {}

    /// Spectrograms are only rendered for observers that ask for them
    fn wants_spectrogram(&self) -> bool {
        false
    }

    fn on_spectrogram(&self, _spectrogram: &Spectrogram) {}
}

/// Observer that ignores everything
pub struct SilentObserver;

impl SessionObserver for SilentObserver {}

/// Map a 0-100 sensitivity percentage to a loudness threshold
///
/// 100% gives 0.0 (every frame is loud), 0% gives 0.05.
pub fn sensitivity_to_threshold(percent: f32) -> f32 {
    let percent = percent.clamp(0.0, 100.0);
    MAX_THRESHOLD * (100.0 - percent) / 100.0
}

fn lock_recover<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

pub struct Session {
    model: ModelHandle,
    extractor: FeatureExtractor,
    mode: Mutex<Mode>,
    pending: Mutex<Option<FeatureVector>>,
    observer: Arc<dyn SessionObserver>,
}

impl Session {
    /// Create a session in learning mode
    pub fn new(model: ModelHandle, sample_rate: u32, observer: Arc<dyn SessionObserver>) -> Self {
        Self {
            model,
            extractor: FeatureExtractor::new(sample_rate),
            mode: Mutex::new(Mode::Learning),
            pending: Mutex::new(None),
            observer,
        }
    }

    pub fn model(&self) -> &ModelHandle {
        &self.model
    }

    pub fn mode(&self) -> Mode {
        *lock_recover(&self.mode)
    }

    pub fn set_mode(&self, mode: Mode) {
        *lock_recover(&self.mode) = mode;
        match mode {
            Mode::Learning => self.status("Learning mode: press a key, then label it"),
            Mode::Matching => {
                self.status("Matching mode: press a key to identify it");
                if !self.model.is_trained() {
                    self.status("Warning: model not trained yet, train before matching");
                }
            }
        }
    }

    /// Features captured in learning mode that have not been labeled yet
    pub fn pending(&self) -> Option<FeatureVector> {
        *lock_recover(&self.pending)
    }

    /// Set the pipeline threshold from a sensitivity percentage
    ///
    /// # Returns
    /// The threshold now in effect
    pub fn set_sensitivity(&self, pipeline: &Pipeline, percent: f32) -> f32 {
        let threshold = sensitivity_to_threshold(percent);
        pipeline.set_threshold(threshold);
        self.status(format!(
            "Sensitivity {:.0}% (threshold {:.4})",
            percent.clamp(0.0, 100.0),
            threshold
        ));
        threshold
    }

    /// Store the pending features under `label`
    ///
    /// # Errors
    /// * `EmptyLabel` - label is empty or whitespace
    /// * `NothingPending` - no key event captured since the last commit
    /// * `LockPoisoned` - the model lock is poisoned
    pub fn commit_sample(&self, label: &str) -> Result<BTreeMap<String, usize>, ModelError> {
        let label = label.trim();
        if label.is_empty() {
            self.status("Enter a label before adding a sample");
            return Err(ModelError::EmptyLabel);
        }

        let Some(features) = lock_recover(&self.pending).take() else {
            self.status("No key sound captured yet");
            return Err(ModelError::NothingPending);
        };

        if !self.model.add_sample(label, features) {
            // Keep the features so the user can retry
            *lock_recover(&self.pending) = Some(features);
            return Err(ModelError::LockPoisoned);
        }

        let counts = self.model.sample_counts();
        self.status(format!("Added sample for '{}'. Counts: {}", label, format_counts(&counts)));
        Ok(counts)
    }

    /// Train on every stored sample and report the outcome
    pub fn train(&self) -> bool {
        match self.model.try_train() {
            Ok(()) => {
                let counts = self.model.sample_counts();
                let total: usize = counts.values().sum();
                self.status(format!(
                    "Model trained on {} samples across {} keys",
                    total,
                    counts.len()
                ));
                true
            }
            Err(ModelError::InsufficientData { .. }) => {
                self.status("Not enough samples: record at least two different keys");
                false
            }
            Err(err) => {
                log_model_error(&err, "session_train");
                self.status(format!("Training failed: {}", err.message()));
                false
            }
        }
    }

    /// Process one key event according to the current mode
    pub fn handle_event(&self, event: &EventBuffer) {
        if self.observer.wants_spectrogram() {
            match self.extractor.spectrogram(event.samples()) {
                Ok(spectrogram) => self.observer.on_spectrogram(&spectrogram),
                Err(err) => log_feature_error(&err, "spectrogram"),
            }
        }

        let features = match self.extractor.extract(event.samples()) {
            Ok(features) => features,
            Err(err) => {
                log_feature_error(&err, "handle_event");
                telemetry::hub().record_extraction_failure(&err, "handle_event");
                self.status(format!("Could not analyse key sound: {}", err.message()));
                return;
            }
        };
        self.observer.on_features(&features);

        match self.mode() {
            Mode::Learning => {
                *lock_recover(&self.pending) = Some(features);
                self.status("Key sound captured: enter a label and add the sample");
            }
            Mode::Matching => {
                if !self.model.is_trained() {
                    self.status("Model not trained: train before matching");
                    return;
                }

                let prediction = self.model.predict(&features);
                telemetry::hub().record_prediction(&prediction);
                self.observer.on_prediction(&prediction);
                match &prediction.label {
                    Some(label) => {
                        self.status(format!("{} ({:.2})", label, prediction.confidence))
                    }
                    None => self.status("Unrecognized key sound"),
                }
            }
        }
    }

    fn status(&self, message: impl Into<String>) {
        let message = message.into();
        tracing::info!("[Session] {}", message);
        self.observer.on_status(&message);
        telemetry::hub().record_status(message);
    }
}

impl PipelineObserver for Session {
    fn on_key_event(&self, event: &EventBuffer) {
        self.handle_event(event);
    }
}

fn format_counts(counts: &BTreeMap<String, usize>) -> String {
    counts
        .iter()
        .map(|(label, count)| format!("{}={}", label, count))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClassifierConfig;
    use crate::model::KeyboardModel;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    const SAMPLE_RATE: u32 = 44100;

    #[derive(Default)]
    struct Recorder {
        statuses: Mutex<Vec<String>>,
        predictions: Mutex<Vec<Prediction>>,
        spectrograms: Mutex<usize>,
        wants_spectrogram: bool,
    }

    impl Recorder {
        fn statuses(&self) -> Vec<String> {
            self.statuses.lock().unwrap().clone()
        }
    }

    impl SessionObserver for Recorder {
        fn on_status(&self, message: &str) {
            self.statuses.lock().unwrap().push(message.to_string());
        }

        fn on_prediction(&self, prediction: &Prediction) {
            self.predictions.lock().unwrap().push(prediction.clone());
        }

        fn wants_spectrogram(&self) -> bool {
            self.wants_spectrogram
        }

        fn on_spectrogram(&self, _spectrogram: &Spectrogram) {
            *self.spectrograms.lock().unwrap() += 1;
        }
    }

    fn small_model() -> ModelHandle {
        ModelHandle::new(KeyboardModel::new(ClassifierConfig {
            n_trees: 10,
            ..ClassifierConfig::default()
        }))
    }

    fn session(recorder: Arc<Recorder>) -> Session {
        Session::new(small_model(), SAMPLE_RATE, recorder)
    }

    fn noise_event(seed: u64, amplitude: f32) -> EventBuffer {
        let mut rng = StdRng::seed_from_u64(seed);
        let samples: Vec<f32> = (0..4096)
            .map(|_| rng.gen_range(-amplitude..amplitude))
            .collect();
        EventBuffer::from_samples(samples, 4, 0)
    }

    fn tone_event(freq: f32) -> EventBuffer {
        let samples: Vec<f32> = (0..4096)
            .map(|i| 0.5 * (2.0 * std::f32::consts::PI * freq * i as f32 / SAMPLE_RATE as f32).sin())
            .collect();
        EventBuffer::from_samples(samples, 4, 0)
    }

    #[test]
    fn test_sensitivity_mapping() {
        assert_eq!(sensitivity_to_threshold(100.0), 0.0);
        assert!((sensitivity_to_threshold(0.0) - 0.05).abs() < 1e-7);
        assert!((sensitivity_to_threshold(60.0) - 0.02).abs() < 1e-7);
        assert_eq!(sensitivity_to_threshold(150.0), 0.0);
        assert!((sensitivity_to_threshold(-20.0) - 0.05).abs() < 1e-7);
    }

    #[test]
    fn test_learning_mode_captures_pending_sample() {
        let recorder = Arc::new(Recorder::default());
        let session = session(recorder.clone());
        assert_eq!(session.mode(), Mode::Learning);
        assert!(session.pending().is_none());

        session.handle_event(&noise_event(1, 0.3));
        assert!(session.pending().is_some());
        assert!(recorder
            .statuses()
            .iter()
            .any(|s| s.starts_with("Key sound captured")));
    }

    #[test]
    fn test_commit_requires_label_and_pending() {
        let session = session(Arc::new(Recorder::default()));
        assert_eq!(session.commit_sample("a"), Err(ModelError::NothingPending));

        session.handle_event(&noise_event(1, 0.3));
        assert_eq!(session.commit_sample("   "), Err(ModelError::EmptyLabel));
        assert!(session.pending().is_some());

        let counts = session.commit_sample("a").unwrap();
        assert_eq!(counts.get("a"), Some(&1));
        assert!(session.pending().is_none());
        assert_eq!(session.commit_sample("a"), Err(ModelError::NothingPending));
    }

    #[test]
    fn test_short_event_is_reported_and_skipped() {
        let recorder = Arc::new(Recorder::default());
        let session = session(recorder.clone());
        session.handle_event(&EventBuffer::from_samples(vec![0.5; 8], 3, 0));

        assert!(session.pending().is_none());
        assert!(recorder
            .statuses()
            .iter()
            .any(|s| s.starts_with("Could not analyse key sound")));
    }

    #[test]
    fn test_train_with_one_label_reports_not_enough_samples() {
        let recorder = Arc::new(Recorder::default());
        let session = session(recorder.clone());
        session.handle_event(&noise_event(1, 0.3));
        session.commit_sample("a").unwrap();

        assert!(!session.train());
        assert!(!session.model().is_trained());
        assert!(recorder
            .statuses()
            .iter()
            .any(|s| s.starts_with("Not enough samples")));
    }

    #[test]
    fn test_matching_before_training_warns() {
        let recorder = Arc::new(Recorder::default());
        let session = session(recorder.clone());
        session.set_mode(Mode::Matching);
        session.handle_event(&noise_event(1, 0.3));

        let statuses = recorder.statuses();
        assert!(statuses.iter().any(|s| s.starts_with("Warning: model not trained")));
        assert!(statuses.iter().any(|s| s.starts_with("Model not trained")));
        assert!(recorder.predictions.lock().unwrap().is_empty());
    }

    #[test]
    fn test_learn_train_match_cycle() {
        let recorder = Arc::new(Recorder::default());
        let session = session(recorder.clone());

        for _ in 0..3 {
            session.handle_event(&tone_event(440.0));
            session.commit_sample("low").unwrap();
            session.handle_event(&tone_event(6000.0));
            session.commit_sample("high").unwrap();
        }
        assert!(session.train());

        session.set_mode(Mode::Matching);
        session.handle_event(&tone_event(440.0));

        let predictions = recorder.predictions.lock().unwrap();
        assert_eq!(predictions.len(), 1);
        assert_eq!(predictions[0].label.as_deref(), Some("low"));
        assert!(recorder.statuses().iter().any(|s| s.starts_with("low (")));
    }

    #[test]
    fn test_spectrogram_only_for_interested_observers() {
        let quiet = Arc::new(Recorder::default());
        session(quiet.clone()).handle_event(&noise_event(2, 0.3));
        assert_eq!(*quiet.spectrograms.lock().unwrap(), 0);

        let interested = Arc::new(Recorder {
            wants_spectrogram: true,
            ..Recorder::default()
        });
        session(interested.clone()).handle_event(&noise_event(2, 0.3));
        assert_eq!(*interested.spectrograms.lock().unwrap(), 1);
    }
}
