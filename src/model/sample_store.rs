// SampleStore - labeled feature vectors collected in learning mode
//
// Labels are case-sensitive and kept in sorted order. The store only grows:
// there is no way to remove a sample once added.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::analysis::features::FeatureVector;

/// Ordered map of key label to its recorded feature vectors
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SampleStore {
    samples: BTreeMap<String, Vec<FeatureVector>>,
}

impl SampleStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one sample under `label`
    pub fn add(&mut self, label: &str, features: FeatureVector) {
        self.samples
            .entry(label.to_string())
            .or_default()
            .push(features);
    }

    /// Samples recorded for `label`, empty if none
    pub fn get(&self, label: &str) -> &[FeatureVector] {
        self.samples.get(label).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Number of samples per label
    pub fn counts(&self) -> BTreeMap<String, usize> {
        self.samples
            .iter()
            .map(|(label, vectors)| (label.clone(), vectors.len()))
            .collect()
    }

    /// Labels that have at least one sample
    pub fn label_count(&self) -> usize {
        self.samples.values().filter(|v| !v.is_empty()).count()
    }

    pub fn total_samples(&self) -> usize {
        self.samples.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.total_samples() == 0
    }

    pub fn as_map(&self) -> &BTreeMap<String, Vec<FeatureVector>> {
        &self.samples
    }
}
