// Classifier - random forest over key-sound feature vectors
//
// Each tree is grown on a bootstrap draw of the training samples with a random
// subset of candidate features per split. Prediction averages the leaf class
// distributions of all trees, so the confidence is the share of forest votes
// (weighted by leaf purity) the winning key received.
//
// Training is fully deterministic for a given seed and sample order.

mod tree;

use std::collections::BTreeMap;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::analysis::features::{FeatureVector, FEATURE_DIM};
use crate::config::ClassifierConfig;
use crate::error::ModelError;
use tree::{DecisionTree, TreeParams};

/// Result of classifying one key sound
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    /// Most probable key, `None` when no model is trained
    pub label: Option<String>,
    /// Probability of `label` in [0, 1]
    pub confidence: f32,
}

impl Prediction {
    /// Sentinel returned before any model has been trained
    pub fn untrained() -> Self {
        Self {
            label: None,
            confidence: 0.0,
        }
    }

    pub fn is_recognized(&self) -> bool {
        self.label.is_some()
    }
}

/// Number of candidate features per split: floor(sqrt(n_features)), at least 1
pub fn default_max_features() -> usize {
    ((FEATURE_DIM as f64).sqrt().floor() as usize).max(1)
}

/// Fitted random forest
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RandomForest {
    /// Class labels in sorted order; leaf distributions index into this
    classes: Vec<String>,
    trees: Vec<DecisionTree>,
}

impl RandomForest {
    /// Fit a forest on labeled samples
    ///
    /// # Arguments
    /// * `samples` - Label to feature vectors, as kept by the sample store
    /// * `config` - Tree count, seed and growth limits
    ///
    /// # Errors
    /// `ModelError::InsufficientData` when the samples cover fewer than two
    /// labels. Labels without any vectors do not count.
    pub fn fit(
        samples: &BTreeMap<String, Vec<FeatureVector>>,
        config: &ClassifierConfig,
    ) -> Result<Self, ModelError> {
        let classes: Vec<String> = samples
            .iter()
            .filter(|(_, vectors)| !vectors.is_empty())
            .map(|(label, _)| label.clone())
            .collect();

        let mut features = Vec::new();
        let mut targets = Vec::new();
        for (class, label) in classes.iter().enumerate() {
            for vector in &samples[label] {
                features.push(*vector);
                targets.push(class);
            }
        }

        if classes.len() < 2 {
            return Err(ModelError::InsufficientData {
                samples: features.len(),
                labels: classes.len(),
            });
        }

        let params = TreeParams {
            max_features: default_max_features(),
            max_depth: config.max_depth,
            min_samples_split: config.min_samples_split,
        };

        let n = features.len();
        let mut rng = StdRng::seed_from_u64(config.seed);
        let trees = (0..config.n_trees.max(1))
            .map(|_| {
                let bootstrap: Vec<usize> = (0..n).map(|_| rng.gen_range(0..n)).collect();
                DecisionTree::fit(&features, &targets, classes.len(), bootstrap, params, &mut rng)
            })
            .collect();

        tracing::debug!(
            "[Classifier] Fitted {} trees on {} samples across {} labels",
            config.n_trees.max(1),
            n,
            classes.len()
        );

        Ok(Self { classes, trees })
    }

    /// Labels the forest can predict, sorted
    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    /// Mean class distribution over all trees, aligned with `classes()`
    pub fn predict_proba(&self, features: &FeatureVector) -> Vec<f32> {
        let mut totals = vec![0.0f64; self.classes.len()];
        for tree in &self.trees {
            for (total, &p) in totals.iter_mut().zip(tree.predict_distribution(features)) {
                *total += p as f64;
            }
        }

        let n_trees = self.trees.len().max(1) as f64;
        totals.iter().map(|&t| (t / n_trees) as f32).collect()
    }

    /// Most probable label with its probability
    ///
    /// Ties go to the label that sorts first.
    pub fn predict(&self, features: &FeatureVector) -> Prediction {
        let proba = self.predict_proba(features);

        let mut best: Option<(usize, f32)> = None;
        for (index, &p) in proba.iter().enumerate() {
            if best.map_or(true, |(_, best_p)| p > best_p) {
                best = Some((index, p));
            }
        }

        match best {
            Some((index, p)) => Prediction {
                label: Some(self.classes[index].clone()),
                confidence: p.clamp(0.0, 1.0),
            },
            None => Prediction::untrained(),
        }
    }

    /// Check a deserialized forest before trusting it
    pub fn is_well_formed(&self) -> bool {
        self.classes.len() >= 2
            && self.classes.windows(2).all(|pair| pair[0] < pair[1])
            && !self.trees.is_empty()
            && self
                .trees
                .iter()
                .all(|tree| tree.is_well_formed(self.classes.len()))
    }

    /// Node count and depth of every tree, for diagnostics
    pub fn tree_shapes(&self) -> Vec<(usize, usize)> {
        self.trees
            .iter()
            .map(|tree| (tree.node_count(), tree.depth()))
            .collect()
    }
}

#[cfg(test)]
#[path = "classifier_tests.rs"]
mod tests;
