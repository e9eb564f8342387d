//! CART decision tree for classification
//!
//! Nodes live in a flat arena; a split node's children are always pushed
//! after the node itself, so child indices are strictly greater than their
//! parent's. `validate` relies on that to reject cyclic trees read back from
//! disk.

use super::features::FeatureMatrix;
use ndarray::ArrayView1;
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Impurity threshold below which a node counts as pure
const PURITY_EPSILON: f64 = 1e-12;

/// Split quality criterion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Criterion {
    /// Gini impurity: `1 - Σ p²`
    #[default]
    Gini,
    /// Shannon entropy: `-Σ p log2 p`
    Entropy,
}

impl Criterion {
    /// Impurity of a node with the given class counts
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn impurity(self, counts: &[usize], total: usize) -> f64 {
        if total == 0 {
            return 0.0;
        }
        let total = total as f64;
        match self {
            Self::Gini => {
                1.0 - counts
                    .iter()
                    .map(|&c| {
                        let p = c as f64 / total;
                        p * p
                    })
                    .sum::<f64>()
            }
            Self::Entropy => -counts
                .iter()
                .filter(|&&c| c > 0)
                .map(|&c| {
                    let p = c as f64 / total;
                    p * p.log2()
                })
                .sum::<f64>(),
        }
    }
}

/// Number of features examined per split
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MaxFeatures {
    /// Every feature
    All,
    /// `max(1, floor(sqrt(n)))`
    Sqrt,
    /// `max(1, floor(log2(n)))`
    Log2,
    /// A fixed count, clamped to `1..=n`
    Fixed(usize),
}

impl MaxFeatures {
    /// Resolve against the total feature count
    #[must_use]
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    pub fn resolve(self, n_features: usize) -> usize {
        let k = match self {
            Self::All => n_features,
            Self::Sqrt => (n_features as f64).sqrt() as usize,
            Self::Log2 => (n_features as f64).log2() as usize,
            Self::Fixed(k) => k,
        };
        k.clamp(1, n_features.max(1))
    }
}

/// Growth limits for one tree
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeParams {
    /// Maximum depth (`None` = unlimited)
    pub max_depth: Option<usize>,
    /// Minimum samples required to split an internal node
    pub min_samples_split: usize,
    /// Minimum samples required in each leaf
    pub min_samples_leaf: usize,
    /// Features examined per split
    pub max_features: MaxFeatures,
    /// Split quality criterion
    pub criterion: Criterion,
}

/// Arena node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TreeNode {
    /// Terminal node holding the class distribution of its samples
    Leaf {
        /// Class probabilities, summing to 1
        distribution: Vec<f64>,
    },
    /// Internal node: `row[feature] <= threshold` goes left
    Split {
        /// Feature index
        feature: usize,
        /// Split threshold
        threshold: f64,
        /// Left child index
        left: usize,
        /// Right child index
        right: usize,
    },
}

/// Fitted classification tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionTree {
    nodes: Vec<TreeNode>,
    n_features: usize,
    n_classes: usize,
    depth: usize,
}

#[derive(Debug, Clone, Copy)]
struct SplitCandidate {
    feature: usize,
    threshold: f64,
    score: f64,
}

struct Builder<'a, R> {
    x: &'a FeatureMatrix,
    y: &'a [usize],
    n_classes: usize,
    params: &'a TreeParams,
    max_features: usize,
    rng: &'a mut R,
    nodes: Vec<TreeNode>,
    depth: usize,
}

impl<R: Rng> Builder<'_, R> {
    fn class_counts(&self, samples: &[usize]) -> Vec<usize> {
        let mut counts = vec![0; self.n_classes];
        for &s in samples {
            counts[self.y[s]] += 1;
        }
        counts
    }

    #[allow(clippy::cast_precision_loss)]
    fn push_leaf(&mut self, counts: &[usize], total: usize) -> usize {
        let distribution = counts
            .iter()
            .map(|&c| c as f64 / total as f64)
            .collect();
        self.nodes.push(TreeNode::Leaf { distribution });
        self.nodes.len() - 1
    }

    fn grow(&mut self, samples: &mut [usize], depth: usize) -> usize {
        self.depth = self.depth.max(depth);

        let n = samples.len();
        let counts = self.class_counts(samples);
        let impurity = self.params.criterion.impurity(&counts, n);

        let depth_reached = self.params.max_depth.is_some_and(|max| depth >= max);
        if depth_reached
            || n < self.params.min_samples_split
            || n < 2 * self.params.min_samples_leaf
            || impurity <= PURITY_EPSILON
        {
            return self.push_leaf(&counts, n);
        }

        let Some(split) = self.best_split(samples, &counts) else {
            return self.push_leaf(&counts, n);
        };

        // Stable partition: left = row[feature] <= threshold
        let column = self.x.column(split.feature);
        let (mut ordered, right): (Vec<usize>, Vec<usize>) = samples
            .iter()
            .partition(|&&s| column[s] <= split.threshold);
        let mid = ordered.len();
        ordered.extend(right);
        samples.copy_from_slice(&ordered);

        let node = self.nodes.len();
        self.nodes.push(TreeNode::Leaf {
            distribution: Vec::new(),
        });

        let (left_samples, right_samples) = samples.split_at_mut(mid);
        let left = self.grow(left_samples, depth + 1);
        let right = self.grow(right_samples, depth + 1);

        self.nodes[node] = TreeNode::Split {
            feature: split.feature,
            threshold: split.threshold,
            left,
            right,
        };
        node
    }

    /// Examine `max_features` random features; keep drawing past that only
    /// while no valid split has been found.
    fn best_split(&mut self, samples: &[usize], counts: &[usize]) -> Option<SplitCandidate> {
        let mut features: Vec<usize> = (0..self.x.n_cols()).collect();
        features.shuffle(&mut *self.rng);

        let mut best: Option<SplitCandidate> = None;
        for (visited, &feature) in features.iter().enumerate() {
            if visited >= self.max_features && best.is_some() {
                break;
            }
            if let Some(candidate) = self.best_split_on(samples, counts, feature) {
                if best.map_or(true, |b| candidate.score < b.score) {
                    best = Some(candidate);
                }
            }
        }
        best
    }

    #[allow(clippy::cast_precision_loss)]
    fn best_split_on(
        &self,
        samples: &[usize],
        counts: &[usize],
        feature: usize,
    ) -> Option<SplitCandidate> {
        let n = samples.len();
        let column = self.x.column(feature);
        let mut sorted: Vec<(f64, usize)> = samples
            .iter()
            .map(|&s| (column[s], self.y[s]))
            .collect();
        sorted.sort_by(|a, b| a.0.total_cmp(&b.0));

        if sorted[0].0 >= sorted[n - 1].0 {
            return None;
        }

        let min_leaf = self.params.min_samples_leaf.max(1);
        let criterion = self.params.criterion;
        let mut left = vec![0usize; self.n_classes];
        let mut right = counts.to_vec();
        let mut best: Option<SplitCandidate> = None;

        for i in 0..n - 1 {
            let (value, class) = sorted[i];
            left[class] += 1;
            right[class] -= 1;

            let n_left = i + 1;
            let n_right = n - n_left;
            let next = sorted[i + 1].0;
            if n_left < min_leaf || n_right < min_leaf || next <= value {
                continue;
            }

            let score = (n_left as f64 * criterion.impurity(&left, n_left)
                + n_right as f64 * criterion.impurity(&right, n_right))
                / n as f64;

            if best.map_or(true, |b| score < b.score) {
                let mut threshold = value / 2.0 + next / 2.0;
                if threshold >= next {
                    threshold = value;
                }
                best = Some(SplitCandidate {
                    feature,
                    threshold,
                    score,
                });
            }
        }
        best
    }
}

impl DecisionTree {
    /// Fit a tree on the given sample indices.
    ///
    /// `samples` may contain repeats (bootstrap draws).
    ///
    /// # Errors
    ///
    /// Returns a message if `samples` is empty or a label is out of range
    pub fn fit<R: Rng>(
        x: &FeatureMatrix,
        y: &[usize],
        n_classes: usize,
        samples: Vec<usize>,
        params: &TreeParams,
        rng: &mut R,
    ) -> Result<Self, String> {
        if samples.is_empty() {
            return Err("Cannot fit a tree on zero samples".to_string());
        }
        if let Some(&bad) = samples.iter().find(|&&s| y[s] >= n_classes) {
            return Err(format!("Label {} at row {bad} exceeds class count {n_classes}", y[bad]));
        }

        let mut builder = Builder {
            x,
            y,
            n_classes,
            params,
            max_features: params.max_features.resolve(x.n_cols()),
            rng,
            nodes: Vec::new(),
            depth: 0,
        };
        let mut samples = samples;
        builder.grow(&mut samples, 0);

        Ok(Self {
            nodes: builder.nodes,
            n_features: x.n_cols(),
            n_classes,
            depth: builder.depth,
        })
    }

    /// Class distribution of the leaf `row` falls into
    #[must_use]
    pub fn predict_proba(&self, row: ArrayView1<'_, f64>) -> &[f64] {
        let mut idx = 0;
        loop {
            match &self.nodes[idx] {
                TreeNode::Leaf { distribution } => return distribution,
                TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    idx = if row[*feature] <= *threshold { *left } else { *right };
                }
            }
        }
    }

    /// Depth of the deepest leaf (root = 0)
    #[must_use]
    pub const fn depth(&self) -> usize {
        self.depth
    }

    /// Total node count
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Leaf count
    #[must_use]
    pub fn leaf_count(&self) -> usize {
        self.nodes
            .iter()
            .filter(|node| matches!(node, TreeNode::Leaf { .. }))
            .count()
    }

    /// Check structural consistency of a tree read back from disk
    ///
    /// # Errors
    ///
    /// Returns a message describing the first inconsistency
    pub fn validate(&self, n_features: usize, n_classes: usize) -> Result<(), String> {
        if self.nodes.is_empty() {
            return Err("Tree has no nodes".to_string());
        }
        if self.n_features != n_features || self.n_classes != n_classes {
            return Err(format!(
                "Tree shape {}x{} does not match forest {n_features}x{n_classes}",
                self.n_features, self.n_classes
            ));
        }
        for (idx, node) in self.nodes.iter().enumerate() {
            match node {
                TreeNode::Leaf { distribution } => {
                    if distribution.len() != n_classes {
                        return Err(format!("Leaf {idx} has {} classes", distribution.len()));
                    }
                }
                TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    let in_range = |child: usize| child > idx && child < self.nodes.len();
                    if *feature >= n_features || !threshold.is_finite() {
                        return Err(format!("Split {idx} has an invalid feature or threshold"));
                    }
                    if !in_range(*left) || !in_range(*right) {
                        return Err(format!("Split {idx} points outside the tree"));
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use ndarray::aview1;
    use rand::SeedableRng;

    fn params() -> TreeParams {
        TreeParams {
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: MaxFeatures::All,
            criterion: Criterion::Gini,
        }
    }

    fn fit(rows: &[Vec<f64>], y: &[usize], n_classes: usize, params: &TreeParams) -> DecisionTree {
        let x = FeatureMatrix::from_rows(rows).unwrap();
        let mut rng = StdRng::seed_from_u64(0);
        DecisionTree::fit(&x, y, n_classes, (0..y.len()).collect(), params, &mut rng).unwrap()
    }

    #[test]
    fn test_gini_impurity() {
        assert!(Criterion::Gini.impurity(&[4, 0], 4).abs() < 1e-12);
        assert!((Criterion::Gini.impurity(&[2, 2], 4) - 0.5).abs() < 1e-12);
        assert!((Criterion::Entropy.impurity(&[2, 2], 4) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_max_features_resolution() {
        assert_eq!(MaxFeatures::Log2.resolve(4), 2);
        assert_eq!(MaxFeatures::Log2.resolve(10), 3);
        assert_eq!(MaxFeatures::Log2.resolve(1), 1);
        assert_eq!(MaxFeatures::Sqrt.resolve(16), 4);
        assert_eq!(MaxFeatures::All.resolve(7), 7);
        assert_eq!(MaxFeatures::Fixed(50).resolve(3), 3);
        assert_eq!(MaxFeatures::Fixed(0).resolve(3), 1);
    }

    #[test]
    fn test_separable_data_fits_exactly() {
        let rows = vec![vec![1.0], vec![2.0], vec![10.0], vec![11.0]];
        let y = [0, 0, 1, 1];
        let tree = fit(&rows, &y, 2, &params());

        assert_eq!(tree.depth(), 1);
        assert_eq!(tree.leaf_count(), 2);
        assert_eq!(tree.predict_proba(aview1(&[1.5])), &[1.0, 0.0]);
        assert_eq!(tree.predict_proba(aview1(&[10.5])), &[0.0, 1.0]);
        // Threshold sits at the midpoint 6.0
        assert_eq!(tree.predict_proba(aview1(&[6.0])), &[1.0, 0.0]);
        assert_eq!(tree.predict_proba(aview1(&[6.1])), &[0.0, 1.0]);
    }

    #[test]
    fn test_xor_needs_two_levels() {
        let rows = vec![
            vec![0.0, 0.0],
            vec![0.0, 1.0],
            vec![1.0, 0.0],
            vec![1.0, 1.0],
        ];
        let y = [0, 1, 1, 0];
        let tree = fit(&rows, &y, 2, &params());
        for (row, &label) in rows.iter().zip(&y) {
            assert!((tree.predict_proba(aview1(row))[label] - 1.0).abs() < 1e-12);
        }
        assert_eq!(tree.depth(), 2);
    }

    #[test]
    fn test_max_depth_limits_growth() {
        let rows: Vec<Vec<f64>> = (0..32).map(|i| vec![f64::from(i)]).collect();
        let y: Vec<usize> = (0..32).map(|i| i % 2).collect();
        let limited = TreeParams {
            max_depth: Some(3),
            ..params()
        };
        let tree = fit(&rows, &y, 2, &limited);
        assert!(tree.depth() <= 3);
        tree.validate(1, 2).unwrap();
    }

    #[test]
    fn test_min_samples_leaf_respected() {
        let rows: Vec<Vec<f64>> = (0..10).map(|i| vec![f64::from(i)]).collect();
        let y = [0, 1, 0, 1, 0, 1, 0, 1, 0, 1];
        let wide_leaves = TreeParams {
            min_samples_leaf: 5,
            ..params()
        };
        let tree = fit(&rows, &y, 2, &wide_leaves);
        // Only one 5/5 split is possible
        assert!(tree.leaf_count() <= 2);
    }

    #[test]
    fn test_constant_features_make_a_leaf() {
        let rows = vec![vec![1.0], vec![1.0], vec![1.0]];
        let y = [0, 1, 1];
        let tree = fit(&rows, &y, 2, &params());
        assert_eq!(tree.node_count(), 1);
        let proba = tree.predict_proba(aview1(&[1.0]));
        assert!((proba[1] - 2.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_distributions_sum_to_one() {
        let rows: Vec<Vec<f64>> = (0..40)
            .map(|i| vec![f64::from(i % 7), f64::from(i % 5)])
            .collect();
        let y: Vec<usize> = (0..40).map(|i| i % 3).collect();
        let shallow = TreeParams {
            max_depth: Some(2),
            ..params()
        };
        let tree = fit(&rows, &y, 3, &shallow);
        for row in &rows {
            let sum: f64 = tree.predict_proba(aview1(row)).iter().sum();
            assert!((sum - 1.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_sampled_features_skip_constant_columns() {
        // Log2 of two features samples one per split; when the constant column
        // comes up first the search has to move on to the separating one
        let rows: Vec<Vec<f64>> = (0..8).map(|i| vec![4.0, f64::from(i)]).collect();
        let y = [0, 0, 0, 0, 1, 1, 1, 1];
        let x = FeatureMatrix::from_rows(&rows).unwrap();
        let sampled = TreeParams {
            max_features: MaxFeatures::Log2,
            ..params()
        };
        assert_eq!(sampled.max_features.resolve(2), 1);

        for seed in 0..16 {
            let mut rng = StdRng::seed_from_u64(seed);
            let tree =
                DecisionTree::fit(&x, &y, 2, (0..y.len()).collect(), &sampled, &mut rng).unwrap();
            assert_eq!(tree.leaf_count(), 2, "seed {seed}");
            for (row, &label) in rows.iter().zip(&y) {
                assert!((tree.predict_proba(aview1(row))[label] - 1.0).abs() < 1e-12);
            }
        }
    }

    #[test]
    fn test_validate_rejects_cycles() {
        let tree = DecisionTree {
            nodes: vec![TreeNode::Split {
                feature: 0,
                threshold: 0.5,
                left: 0,
                right: 0,
            }],
            n_features: 1,
            n_classes: 2,
            depth: 1,
        };
        assert!(tree.validate(1, 2).is_err());
    }

    #[test]
    fn test_fit_rejects_out_of_range_labels() {
        let x = FeatureMatrix::from_rows(&[vec![1.0]]).unwrap();
        let mut rng = StdRng::seed_from_u64(0);
        let result = DecisionTree::fit(&x, &[3], 2, vec![0], &params(), &mut rng);
        assert!(result.is_err());
    }
}
