// Decision tree - CART with Gini impurity
//
// Nodes live in a flat arena so that fitting, prediction and serialization
// never recurse, whatever depth an unrestricted tree grows to.

use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::analysis::features::{FeatureVector, FEATURE_DIM};

/// Growth limits shared by every tree in a forest
#[derive(Debug, Clone, Copy)]
pub(crate) struct TreeParams {
    /// Candidate features examined per split before settling on the best one
    pub max_features: usize,
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
enum Node {
    /// Class fractions of the training samples that reached this leaf
    Leaf { distribution: Vec<f32> },
    /// `x[feature] <= threshold` goes left
    Split {
        feature: usize,
        threshold: f32,
        left: usize,
        right: usize,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct DecisionTree {
    nodes: Vec<Node>,
}

struct SplitCandidate {
    feature: usize,
    threshold: f32,
    impurity: f64,
}

/// Gini impurity of a class histogram holding `total` samples
fn gini(counts: &[usize], total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    let total = total as f64;
    1.0 - counts
        .iter()
        .map(|&c| {
            let p = c as f64 / total;
            p * p
        })
        .sum::<f64>()
}

impl DecisionTree {
    /// Grow a tree on the rows selected by `indices` (duplicates allowed)
    ///
    /// # Arguments
    /// * `features` - All training rows
    /// * `targets` - Class index of each row
    /// * `n_classes` - Width of the leaf distributions
    /// * `indices` - Rows this tree trains on, typically a bootstrap draw
    pub(crate) fn fit<R: Rng>(
        features: &[FeatureVector],
        targets: &[usize],
        n_classes: usize,
        indices: Vec<usize>,
        params: TreeParams,
        rng: &mut R,
    ) -> Self {
        let mut nodes: Vec<Node> = Vec::new();
        // (rows, depth, slot to patch in the parent)
        let mut stack: Vec<(Vec<usize>, usize, Option<(usize, bool)>)> = vec![(indices, 0, None)];

        while let Some((rows, depth, parent)) = stack.pop() {
            let mut counts = vec![0usize; n_classes];
            for &row in &rows {
                counts[targets[row]] += 1;
            }

            let can_split = rows.len() >= params.min_samples_split.max(2)
                && params.max_depth.map_or(true, |max| depth < max)
                && counts.iter().filter(|&&c| c > 0).count() > 1;

            let split = if can_split {
                best_split(features, targets, n_classes, &rows, &counts, params, rng)
            } else {
                None
            };

            let id = nodes.len();
            match split {
                Some(candidate) => {
                    let (left_rows, right_rows): (Vec<usize>, Vec<usize>) =
                        rows.into_iter().partition(|&row| {
                            features[row].as_array()[candidate.feature] <= candidate.threshold
                        });
                    nodes.push(Node::Split {
                        feature: candidate.feature,
                        threshold: candidate.threshold,
                        left: 0,
                        right: 0,
                    });
                    stack.push((right_rows, depth + 1, Some((id, false))));
                    stack.push((left_rows, depth + 1, Some((id, true))));
                }
                None => {
                    let total = rows.len().max(1) as f32;
                    nodes.push(Node::Leaf {
                        distribution: counts.iter().map(|&c| c as f32 / total).collect(),
                    });
                }
            }

            if let Some((parent_id, is_left)) = parent {
                if let Node::Split { left, right, .. } = &mut nodes[parent_id] {
                    if is_left {
                        *left = id;
                    } else {
                        *right = id;
                    }
                }
            }
        }

        Self { nodes }
    }

    /// Class distribution of the leaf `features` falls into
    pub(crate) fn predict_distribution(&self, features: &FeatureVector) -> &[f32] {
        let values = features.as_array();
        let mut id = 0;
        loop {
            match &self.nodes[id] {
                Node::Leaf { distribution } => return distribution,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    id = if values[*feature] <= *threshold {
                        *left
                    } else {
                        *right
                    };
                }
            }
        }
    }

    pub(crate) fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub(crate) fn depth(&self) -> usize {
        let mut max_depth = 0;
        let mut stack = vec![(0usize, 0usize)];
        while let Some((id, depth)) = stack.pop() {
            max_depth = max_depth.max(depth);
            if let Some(Node::Split { left, right, .. }) = self.nodes.get(id) {
                stack.push((*left, depth + 1));
                stack.push((*right, depth + 1));
            }
        }
        max_depth
    }

    /// Structural sanity check for trees restored from disk
    pub(crate) fn is_well_formed(&self, n_classes: usize) -> bool {
        !self.nodes.is_empty()
            && self.nodes.iter().enumerate().all(|(id, node)| match node {
                Node::Leaf { distribution } => distribution.len() == n_classes,
                Node::Split {
                    feature,
                    left,
                    right,
                    ..
                } => {
                    *feature < FEATURE_DIM
                        && *left > id
                        && *right > id
                        && *left < self.nodes.len()
                        && *right < self.nodes.len()
                }
            })
    }
}

/// Search shuffled features for the lowest weighted Gini split
///
/// Features are visited in random order. The search stops once
/// `max_features` non-constant features have been examined and a split has
/// been found, so a node whose first draws are all constant keeps looking.
fn best_split<R: Rng>(
    features: &[FeatureVector],
    targets: &[usize],
    n_classes: usize,
    rows: &[usize],
    counts: &[usize],
    params: TreeParams,
    rng: &mut R,
) -> Option<SplitCandidate> {
    let mut order: Vec<usize> = (0..FEATURE_DIM).collect();
    order.shuffle(rng);

    let n = rows.len();
    let mut best: Option<SplitCandidate> = None;
    let mut visited = 0usize;
    let mut sorted: Vec<(f32, usize)> = Vec::with_capacity(n);

    for feature in order {
        if visited >= params.max_features && best.is_some() {
            break;
        }

        sorted.clear();
        sorted.extend(
            rows.iter()
                .map(|&row| (features[row].as_array()[feature], targets[row])),
        );
        sorted.sort_by(|a, b| a.0.total_cmp(&b.0));

        if sorted[0].0 >= sorted[n - 1].0 {
            // Constant within this node
            continue;
        }
        visited += 1;

        let mut left_counts = vec![0usize; n_classes];
        let mut right_counts = counts.to_vec();
        for i in 0..n - 1 {
            let (value, class) = sorted[i];
            left_counts[class] += 1;
            right_counts[class] -= 1;

            let next = sorted[i + 1].0;
            if value >= next {
                continue;
            }

            let n_left = i + 1;
            let n_right = n - n_left;
            let impurity = (n_left as f64 * gini(&left_counts, n_left)
                + n_right as f64 * gini(&right_counts, n_right))
                / n as f64;

            if best.as_ref().map_or(true, |b| impurity < b.impurity) {
                let mut threshold = value + (next - value) / 2.0;
                if threshold >= next || !threshold.is_finite() {
                    threshold = value;
                }
                best = Some(SplitCandidate {
                    feature,
                    threshold,
                    impurity,
                });
            }
        }
    }

    best
}
