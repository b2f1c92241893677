// KeyboardModel - sample store plus the classifier trained on it
//
// Adding samples never retrains. `train()` refits from scratch on the whole
// store, and the version counters make a stale classifier visible to callers
// instead of silently serving predictions from old data.

mod handle;
pub mod persistence;
mod sample_store;

pub use handle::ModelHandle;
pub use persistence::PersistedModel;
pub use sample_store::SampleStore;

use std::collections::BTreeMap;
use std::path::Path;

use crate::analysis::classifier::{Prediction, RandomForest};
use crate::analysis::features::FeatureVector;
use crate::config::ClassifierConfig;
use crate::error::{ModelError, PersistenceError};

/// Labeled samples and the optional classifier fitted on them
#[derive(Debug, Clone)]
pub struct KeyboardModel {
    samples: SampleStore,
    classifier: Option<RandomForest>,
    is_trained: bool,
    samples_version: u64,
    trained_version: u64,
    config: ClassifierConfig,
}

impl KeyboardModel {
    /// Empty, untrained model
    pub fn new(config: ClassifierConfig) -> Self {
        Self {
            samples: SampleStore::new(),
            classifier: None,
            is_trained: false,
            samples_version: 0,
            trained_version: 0,
            config,
        }
    }

    /// Record a labeled sample; the classifier is left untouched
    pub fn add_sample(&mut self, label: &str, features: FeatureVector) {
        self.samples.add(label, features);
        self.samples_version += 1;
    }

    /// Fit a fresh forest on every stored sample
    ///
    /// On success the model is marked trained and, when a model path is
    /// configured, persisted. A failed save is logged and does not undo the
    /// training.
    ///
    /// # Errors
    /// `ModelError::InsufficientData` with fewer than two labels; the previous
    /// classifier and trained flag are kept in that case.
    pub fn train(&mut self) -> Result<(), ModelError> {
        let forest = RandomForest::fit(self.samples.as_map(), &self.config)?;
        self.install(forest, self.samples_version);

        if let Some(path) = self.config.model_path.clone() {
            if let Err(err) = self.save(&path) {
                tracing::warn!("[Model] Trained model could not be saved to {:?}: {}", path, err);
            }
        }
        Ok(())
    }

    /// Install a forest fitted on the store as of `version`
    ///
    /// A forest fitted on fewer samples than the installed one is discarded.
    /// Returns whether `forest` was installed.
    pub(crate) fn install(&mut self, forest: RandomForest, version: u64) -> bool {
        if self.is_trained && version < self.trained_version {
            tracing::info!(
                "[Model] Discarding forest fitted on {} samples, {} already installed",
                version,
                self.trained_version
            );
            return false;
        }

        tracing::info!(
            "[Model] Trained on {} samples across {} labels",
            self.samples.total_samples(),
            forest.classes().len()
        );
        self.classifier = Some(forest);
        self.is_trained = true;
        self.trained_version = version;
        true
    }

    /// Classify one feature vector
    ///
    /// Returns the `(None, 0.0)` sentinel while untrained.
    pub fn predict(&self, features: &FeatureVector) -> Prediction {
        match (&self.classifier, self.is_trained) {
            (Some(forest), true) => forest.predict(features),
            _ => Prediction::untrained(),
        }
    }

    pub fn sample_counts(&self) -> BTreeMap<String, usize> {
        self.samples.counts()
    }

    pub fn samples(&self) -> &SampleStore {
        &self.samples
    }

    pub fn classifier(&self) -> Option<&RandomForest> {
        self.classifier.as_ref()
    }

    pub fn config(&self) -> &ClassifierConfig {
        &self.config
    }

    pub fn is_trained(&self) -> bool {
        self.is_trained
    }

    pub fn samples_version(&self) -> u64 {
        self.samples_version
    }

    pub fn trained_version(&self) -> u64 {
        self.trained_version
    }

    /// True when samples were added since the last successful training
    pub fn needs_retraining(&self) -> bool {
        self.samples_version != self.trained_version
    }

    /// Snapshot of the persisted unit
    pub fn to_unit(&self) -> PersistedModel {
        PersistedModel {
            classifier: self.classifier.clone(),
            samples: self.samples.clone(),
            is_trained: self.is_trained,
            trained_samples: self.is_trained.then_some(self.trained_version as usize),
        }
    }

    /// Rebuild a model from a validated unit
    ///
    /// Versions restart at the stored sample count. A trained unit without a
    /// recorded training count is taken as trained on every stored sample.
    pub fn from_unit(unit: PersistedModel, config: ClassifierConfig) -> Self {
        let version = unit.samples.total_samples() as u64;
        let trained_version = if unit.is_trained {
            unit.trained_samples
                .map_or(version, |count| (count as u64).min(version))
        } else {
            0
        };
        Self {
            trained_version,
            samples_version: version,
            samples: unit.samples,
            classifier: unit.classifier,
            is_trained: unit.is_trained,
            config,
        }
    }

    /// Write the model unit to `path`
    pub fn save(&self, path: &Path) -> Result<(), PersistenceError> {
        persistence::save(path, &self.to_unit())
    }

    /// Restore a model from `path`
    ///
    /// Never fails: a missing, unreadable or corrupt unit is logged and an
    /// empty, untrained model is returned instead.
    pub fn load(path: &Path, config: ClassifierConfig) -> Self {
        match persistence::load(path) {
            Ok(unit) => {
                tracing::info!(
                    "[Model] Loaded {} samples from {:?} (trained: {})",
                    unit.samples.total_samples(),
                    path,
                    unit.is_trained
                );
                Self::from_unit(unit, config)
            }
            Err(err) => {
                log::warn!(
                    "[Model] Could not restore model from {:?}: {}. Starting empty.",
                    path,
                    err
                );
                Self::new(config)
            }
        }
    }
}

impl Default for KeyboardModel {
    fn default() -> Self {
        Self::new(ClassifierConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::features::FEATURE_DIM;
    use std::fs;
    use std::path::PathBuf;

    fn features(value: f32) -> FeatureVector {
        FeatureVector::from_array([value; FEATURE_DIM])
    }

    fn temp_file(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("keytap_model_{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        dir.join(name)
    }

    #[test]
    fn test_new_model_is_untrained() {
        let model = KeyboardModel::default();
        assert!(!model.is_trained());
        assert!(!model.needs_retraining());
        assert_eq!(model.predict(&features(0.0)), Prediction::untrained());
    }

    #[test]
    fn test_add_sample_does_not_train() {
        let mut model = KeyboardModel::default();
        model.add_sample("a", features(0.0));
        model.add_sample("b", features(1.0));
        assert!(!model.is_trained());
        assert!(model.needs_retraining());
        assert_eq!(model.sample_counts().len(), 2);
    }

    #[test]
    fn test_train_with_one_label_keeps_state() {
        let mut model = KeyboardModel::default();
        model.add_sample("a", features(0.0));
        model.add_sample("a", features(1.0));

        let result = model.train();
        assert_eq!(
            result,
            Err(ModelError::InsufficientData {
                samples: 2,
                labels: 1
            })
        );
        assert!(!model.is_trained());
        assert!(model.classifier().is_none());
    }

    #[test]
    fn test_retrain_after_new_samples() {
        let mut model = KeyboardModel::default();
        model.add_sample("a", features(0.0));
        model.add_sample("b", features(1.0));
        model.train().unwrap();
        let before = model.classifier().cloned();

        model.add_sample("a", features(0.1));
        assert!(model.needs_retraining());
        model.train().unwrap();
        assert!(!model.needs_retraining());
        assert_ne!(model.classifier().cloned(), before);
    }

    #[test]
    fn test_train_then_predict() {
        let mut model = KeyboardModel::default();
        model.add_sample("x", features(0.0));
        model.add_sample("y", features(10.0));
        model.train().unwrap();

        assert!(model.is_trained());
        assert_eq!(model.trained_version(), 2);
        let prediction = model.predict(&features(0.0));
        assert_eq!(prediction.label.as_deref(), Some("x"));
        assert!(prediction.confidence >= 0.5);
    }

    #[test]
    fn test_train_saves_when_path_configured() {
        let path = temp_file("autosave.json");
        fs::remove_file(&path).ok();
        let config = ClassifierConfig {
            model_path: Some(path.clone()),
            ..ClassifierConfig::default()
        };

        let mut model = KeyboardModel::new(config.clone());
        model.add_sample("x", features(0.0));
        model.add_sample("y", features(10.0));
        model.train().unwrap();
        assert!(path.exists());

        let restored = KeyboardModel::load(&path, config);
        assert!(restored.is_trained());
        assert!(!restored.needs_retraining());
        assert_eq!(
            restored.predict(&features(10.0)),
            model.predict(&features(10.0))
        );
        fs::remove_file(&path).ok();
    }

    #[test]
    fn test_unwritable_model_path_does_not_fail_training() {
        let blocker = temp_file("not_a_dir");
        fs::write(&blocker, b"file").unwrap();
        let config = ClassifierConfig {
            model_path: Some(blocker.join("model.json")),
            ..ClassifierConfig::default()
        };

        let mut model = KeyboardModel::new(config);
        model.add_sample("x", features(0.0));
        model.add_sample("y", features(10.0));
        assert!(model.train().is_ok());
        assert!(model.is_trained());
        fs::remove_file(&blocker).ok();
    }

    #[test]
    fn test_load_corrupt_file_yields_empty_model() {
        let path = temp_file("corrupt.json");
        fs::write(&path, b"\x00\x01 definitely not a model").unwrap();

        let model = KeyboardModel::load(&path, ClassifierConfig::default());
        assert!(!model.is_trained());
        assert!(model.sample_counts().is_empty());
        fs::remove_file(&path).ok();
    }

    #[test]
    fn test_load_missing_file_yields_empty_model() {
        let model = KeyboardModel::load(&temp_file("never_written.json"), ClassifierConfig::default());
        assert!(!model.is_trained());
        assert_eq!(model.samples_version(), 0);
    }

    #[test]
    fn test_staleness_survives_save_and_load() {
        let path = temp_file("stale.json");
        let mut model = KeyboardModel::default();
        model.add_sample("a", features(0.0));
        model.add_sample("b", features(1.0));
        model.train().unwrap();
        model.add_sample("c", features(2.0));
        assert!(model.needs_retraining());
        model.save(&path).unwrap();

        let restored = KeyboardModel::load(&path, ClassifierConfig::default());
        assert!(restored.is_trained());
        assert!(restored.needs_retraining());
        assert_eq!(restored.sample_counts().get("c"), Some(&1));
        assert_eq!(restored.trained_version(), 2);
        assert_eq!(restored.samples_version(), 3);
        fs::remove_file(&path).ok();
    }

    #[test]
    fn test_older_forest_is_not_installed() {
        let mut model = KeyboardModel::default();
        model.add_sample("a", features(0.0));
        model.add_sample("b", features(1.0));
        let older = RandomForest::fit(model.samples().as_map(), model.config()).unwrap();
        let older_version = model.samples_version();

        model.add_sample("c", features(2.0));
        model.train().unwrap();
        assert!(!model.install(older, older_version));

        assert_eq!(model.trained_version(), 3);
        assert!(!model.needs_retraining());
        let classes = model.classifier().map(|forest| forest.classes().to_vec());
        assert!(classes.is_some_and(|classes| classes.iter().any(|label| label == "c")));
    }

    #[test]
    fn test_untrained_unit_roundtrip() {
        let path = temp_file("untrained.json");
        let mut model = KeyboardModel::default();
        model.add_sample("solo", features(0.3));
        model.save(&path).unwrap();

        let restored = KeyboardModel::load(&path, ClassifierConfig::default());
        assert!(!restored.is_trained());
        assert_eq!(restored.sample_counts(), model.sample_counts());
        assert!(restored.needs_retraining());
        fs::remove_file(&path).ok();
    }
}
