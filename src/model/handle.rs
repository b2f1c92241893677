// ModelHandle - shared, lock-guarded access to the keyboard model
//
// Every method fails closed on a poisoned lock: writes report false, reads
// return the untrained sentinel or empty counts, and the poisoning is logged.
//
// Saves are serialized and each one snapshots the model after taking the
// persist lock, so the file on disk never goes back to an older unit.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::KeyboardModel;
use crate::analysis::classifier::{Prediction, RandomForest};
use crate::analysis::features::FeatureVector;
use crate::config::ClassifierConfig;
use crate::error::{log_model_error, ErrorCode, ModelError, PersistenceError};

/// Cloneable handle to one shared `KeyboardModel`
#[derive(Debug, Clone)]
pub struct ModelHandle {
    model: Arc<RwLock<KeyboardModel>>,
    persist: Arc<Mutex<()>>,
}

impl ModelHandle {
    pub fn new(model: KeyboardModel) -> Self {
        Self {
            model: Arc::new(RwLock::new(model)),
            persist: Arc::new(Mutex::new(())),
        }
    }

    /// Restore from `path`, falling back to an empty model
    pub fn load(path: &Path, config: ClassifierConfig) -> Self {
        Self::new(KeyboardModel::load(path, config))
    }

    /// Record a labeled sample
    ///
    /// # Returns
    /// false only when the model lock is poisoned
    pub fn add_sample(&self, label: &str, features: FeatureVector) -> bool {
        match self.write_model() {
            Ok(mut model) => {
                model.add_sample(label, features);
                true
            }
            Err(err) => {
                log_model_error(&err, "add_sample");
                false
            }
        }
    }

    /// Train on every stored sample
    ///
    /// The forest is fitted on a snapshot taken under the read lock, so
    /// predictions keep being served while training runs. Samples added in
    /// the meantime leave the model flagged as needing retraining. A forest
    /// that finishes after a newer one was installed is dropped unsaved.
    ///
    /// # Returns
    /// true when the model holds a classifier covering this call's snapshot
    pub fn train(&self) -> bool {
        match self.try_train() {
            Ok(()) => true,
            Err(ModelError::InsufficientData { samples, labels }) => {
                tracing::info!(
                    "[Model] Not enough samples to train: {} samples across {} labels",
                    samples,
                    labels
                );
                false
            }
            Err(err) => {
                log_model_error(&err, "train");
                false
            }
        }
    }

    /// Train, reporting why training did not happen
    pub fn try_train(&self) -> Result<(), ModelError> {
        let (samples, config, version) = {
            let model = self.read_model()?;
            (
                model.samples().clone(),
                model.config().clone(),
                model.samples_version(),
            )
        };

        let forest = RandomForest::fit(samples.as_map(), &config)?;

        if !self.write_model()?.install(forest, version) {
            return Ok(());
        }

        if let Some(path) = config.model_path.as_deref() {
            if let Err(err) = self.persist_to(path) {
                tracing::warn!("[Model] Trained model could not be saved to {:?}: {}", path, err);
            }
        }
        Ok(())
    }

    /// Classify one feature vector, `(None, 0.0)` when untrained
    pub fn predict(&self, features: &FeatureVector) -> Prediction {
        match self.read_model() {
            Ok(model) => model.predict(features),
            Err(err) => {
                log_model_error(&err, "predict");
                Prediction::untrained()
            }
        }
    }

    pub fn sample_counts(&self) -> BTreeMap<String, usize> {
        match self.read_model() {
            Ok(model) => model.sample_counts(),
            Err(err) => {
                log_model_error(&err, "sample_counts");
                BTreeMap::new()
            }
        }
    }

    pub fn is_trained(&self) -> bool {
        self.read_model().map(|m| m.is_trained()).unwrap_or(false)
    }

    pub fn needs_retraining(&self) -> bool {
        self.read_model()
            .map(|m| m.needs_retraining())
            .unwrap_or(false)
    }

    /// Persist the current unit to `path`
    pub fn save(&self, path: &Path) -> Result<(), PersistenceError> {
        self.persist_to(path)
    }

    /// Clone of the current model state
    pub fn snapshot(&self) -> Result<KeyboardModel, ModelError> {
        Ok(self.read_model()?.clone())
    }

    // ========================================================================
    // HELPER METHODS - Lock management
    // ========================================================================

    fn read_model(&self) -> Result<RwLockReadGuard<'_, KeyboardModel>, ModelError> {
        self.model.read().map_err(|_| ModelError::LockPoisoned)
    }

    fn write_model(&self) -> Result<RwLockWriteGuard<'_, KeyboardModel>, ModelError> {
        self.model.write().map_err(|_| ModelError::LockPoisoned)
    }

    /// Snapshot and write the unit while holding the persist lock
    fn persist_to(&self, path: &Path) -> Result<(), PersistenceError> {
        // The guarded value is (), so a poisoned persist lock carries no bad state
        let _persisting = self
            .persist
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let unit = match self.read_model() {
            Ok(model) => model.to_unit(),
            Err(err) => {
                log_model_error(&err, "save");
                return Err(PersistenceError::Io {
                    details: err.message(),
                });
            }
        };
        super::persistence::save(path, &unit)
    }
}

impl Default for ModelHandle {
    fn default() -> Self {
        Self::new(KeyboardModel::default())
    }
}
