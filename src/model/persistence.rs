// Persistence - the saved model unit
//
// Classifier, samples and trained flag are written together as one JSON
// document so they can never drift apart on disk. Saves go through a sibling
// temporary file and a rename, so a crash mid-write leaves the previous unit
// intact.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::sample_store::SampleStore;
use crate::analysis::classifier::RandomForest;
use crate::error::PersistenceError;

/// Everything that survives a restart
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedModel {
    pub classifier: Option<RandomForest>,
    pub samples: SampleStore,
    pub is_trained: bool,
    /// Stored sample count when the classifier was fitted; absent in older units
    #[serde(default)]
    pub trained_samples: Option<usize>,
}

impl PersistedModel {
    /// Reject units that break the trained-model invariants
    pub fn validate(&self) -> Result<(), PersistenceError> {
        let corrupt = |reason: &str| PersistenceError::Corrupt {
            reason: reason.to_string(),
        };

        if !self.is_trained {
            return Ok(());
        }

        if self
            .trained_samples
            .is_some_and(|count| count > self.samples.total_samples())
        {
            return Err(corrupt("trained on more samples than the unit stores"));
        }

        let classifier = self
            .classifier
            .as_ref()
            .ok_or_else(|| corrupt("marked trained but has no classifier"))?;

        if classifier.classes().len() < 2 {
            return Err(corrupt("trained classifier covers fewer than two labels"));
        }
        if !classifier.is_well_formed() {
            return Err(corrupt("classifier trees are malformed"));
        }
        Ok(())
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "model".into());
    name.push(".tmp");
    path.with_file_name(name)
}

/// Atomically write `unit` to `path`
///
/// Parent directories are created as needed.
pub fn save(path: &Path, unit: &PersistedModel) -> Result<(), PersistenceError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    let json = serde_json::to_vec(unit)?;
    let tmp = temp_path(path);
    fs::write(&tmp, json)?;
    if let Err(err) = fs::rename(&tmp, path) {
        let _ = fs::remove_file(&tmp);
        return Err(err.into());
    }

    tracing::debug!("[Persistence] Saved model unit to {:?}", path);
    Ok(())
}

/// Read and validate the unit at `path`
pub fn load(path: &Path) -> Result<PersistedModel, PersistenceError> {
    let bytes = fs::read(path)?;
    let unit: PersistedModel = serde_json::from_slice(&bytes)?;
    unit.validate()?;
    Ok(unit)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::features::{FeatureVector, FEATURE_DIM};
    use crate::config::ClassifierConfig;

    fn temp_file(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("keytap_persistence_{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        dir.join(name)
    }

    fn trained_unit() -> PersistedModel {
        let mut samples = SampleStore::new();
        samples.add("a", FeatureVector::from_array([0.0; FEATURE_DIM]));
        samples.add("b", FeatureVector::from_array([1.0; FEATURE_DIM]));
        let classifier = RandomForest::fit(samples.as_map(), &ClassifierConfig::default()).unwrap();
        PersistedModel {
            classifier: Some(classifier),
            samples,
            is_trained: true,
            trained_samples: Some(2),
        }
    }

    #[test]
    fn test_save_then_load() {
        let path = temp_file("roundtrip.json");
        let unit = trained_unit();
        save(&path, &unit).unwrap();

        let restored = load(&path).unwrap();
        assert_eq!(restored, unit);
        assert!(!temp_path(&path).exists());
        fs::remove_file(&path).ok();
    }

    #[test]
    fn test_save_replaces_existing_file() {
        let path = temp_file("replace.json");
        fs::write(&path, b"old contents").unwrap();
        save(&path, &trained_unit()).unwrap();
        assert!(load(&path).is_ok());
        fs::remove_file(&path).ok();
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let result = load(&temp_file("does_not_exist.json"));
        assert!(matches!(result, Err(PersistenceError::Io { .. })));
    }

    #[test]
    fn test_garbage_is_corrupt() {
        let path = temp_file("garbage.json");
        fs::write(&path, b"{ not json").unwrap();
        assert!(matches!(load(&path), Err(PersistenceError::Corrupt { .. })));
        fs::remove_file(&path).ok();
    }

    #[test]
    fn test_trained_without_classifier_is_corrupt() {
        let unit = PersistedModel {
            classifier: None,
            samples: SampleStore::new(),
            is_trained: true,
            trained_samples: None,
        };
        assert!(matches!(
            unit.validate(),
            Err(PersistenceError::Corrupt { .. })
        ));
    }

    #[test]
    fn test_untrained_unit_is_valid() {
        let mut samples = SampleStore::new();
        samples.add("only", FeatureVector::from_array([0.0; FEATURE_DIM]));
        let unit = PersistedModel {
            classifier: None,
            samples,
            is_trained: false,
            trained_samples: None,
        };
        assert!(unit.validate().is_ok());
    }

    #[test]
    fn test_trained_count_beyond_store_is_corrupt() {
        let mut unit = trained_unit();
        unit.trained_samples = Some(3);
        assert!(matches!(
            unit.validate(),
            Err(PersistenceError::Corrupt { .. })
        ));
    }

    #[test]
    fn test_unit_without_trained_count_still_loads() {
        let path = temp_file("legacy.json");
        let mut json = serde_json::to_value(trained_unit()).unwrap();
        json.as_object_mut().unwrap().remove("trained_samples");
        fs::write(&path, serde_json::to_vec(&json).unwrap()).unwrap();

        let restored = load(&path).unwrap();
        assert!(restored.is_trained);
        assert_eq!(restored.trained_samples, None);
        fs::remove_file(&path).ok();
    }

    #[test]
    fn test_temp_path_is_sibling() {
        let path = Path::new("/data/models/keys.json");
        assert_eq!(temp_path(path), Path::new("/data/models/keys.json.tmp"));
    }
}
