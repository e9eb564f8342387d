//! Random forest: an ensemble of [`DecisionTree`]s with averaged votes

use super::features::FeatureMatrix;
use super::tree::{Criterion, DecisionTree, MaxFeatures, TreeParams};
use super::Classifier;
use crate::{Error, Result};
use ndarray::ArrayView1;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

/// Forest hyperparameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForestParams {
    /// Number of trees
    pub n_estimators: usize,
    /// Maximum tree depth (`None` = unlimited)
    pub max_depth: Option<usize>,
    /// Draw a bootstrap sample per tree instead of using every row
    pub bootstrap: bool,
    /// Split quality criterion
    pub criterion: Criterion,
    /// Features examined per split
    pub max_features: MaxFeatures,
    /// Minimum samples per leaf
    pub min_samples_leaf: usize,
    /// Minimum samples required to split
    pub min_samples_split: usize,
    /// Worker threads (`None` = all cores)
    pub n_jobs: Option<usize>,
    /// Base seed; tree `i` uses `seed + i`
    pub seed: u64,
}

impl Default for ForestParams {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            max_depth: Some(30),
            bootstrap: false,
            criterion: Criterion::Gini,
            max_features: MaxFeatures::Log2,
            min_samples_leaf: 1,
            min_samples_split: 2,
            n_jobs: None,
            seed: rand::random(),
        }
    }
}

impl ForestParams {
    fn tree_params(&self) -> TreeParams {
        TreeParams {
            max_depth: self.max_depth,
            min_samples_split: self.min_samples_split,
            min_samples_leaf: self.min_samples_leaf,
            max_features: self.max_features,
            criterion: self.criterion,
        }
    }
}

/// Random forest classifier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RandomForest {
    params: ForestParams,
    trees: Vec<DecisionTree>,
    n_features: usize,
    n_classes: usize,
}

impl Default for RandomForest {
    fn default() -> Self {
        Self::new(ForestParams::default())
    }
}

impl RandomForest {
    /// Create an unfitted forest
    #[must_use]
    pub const fn new(params: ForestParams) -> Self {
        Self {
            params,
            trees: Vec::new(),
            n_features: 0,
            n_classes: 0,
        }
    }

    /// Get the hyperparameters
    #[must_use]
    pub const fn params(&self) -> &ForestParams {
        &self.params
    }

    /// Get the fitted trees
    #[must_use]
    pub fn trees(&self) -> &[DecisionTree] {
        &self.trees
    }

    fn fit_tree(
        &self,
        index: usize,
        x: &FeatureMatrix,
        y: &[usize],
        n_classes: usize,
        tree_params: &TreeParams,
    ) -> std::result::Result<DecisionTree, String> {
        let mut rng = StdRng::seed_from_u64(self.params.seed.wrapping_add(index as u64));
        let n = x.n_rows();
        let samples = if self.params.bootstrap {
            (0..n).map(|_| rng.gen_range(0..n)).collect()
        } else {
            (0..n).collect()
        };
        DecisionTree::fit(x, y, n_classes, samples, tree_params, &mut rng)
    }

    #[cfg(feature = "parallel")]
    fn fit_trees(
        &self,
        x: &FeatureMatrix,
        y: &[usize],
        n_classes: usize,
    ) -> std::result::Result<Vec<DecisionTree>, String> {
        use rayon::prelude::*;

        let tree_params = self.params.tree_params();
        let build = || -> std::result::Result<Vec<DecisionTree>, String> {
            (0..self.params.n_estimators)
                .into_par_iter()
                .map(|i| self.fit_tree(i, x, y, n_classes, &tree_params))
                .collect()
        };

        match self.params.n_jobs {
            Some(threads) => rayon::ThreadPoolBuilder::new()
                .num_threads(threads)
                .build()
                .map_err(|e| format!("Failed to build training thread pool: {e}"))?
                .install(build),
            None => build(),
        }
    }

    #[cfg(not(feature = "parallel"))]
    fn fit_trees(
        &self,
        x: &FeatureMatrix,
        y: &[usize],
        n_classes: usize,
    ) -> std::result::Result<Vec<DecisionTree>, String> {
        let tree_params = self.params.tree_params();
        (0..self.params.n_estimators)
            .map(|i| self.fit_tree(i, x, y, n_classes, &tree_params))
            .collect()
    }
}

impl Classifier for RandomForest {
    const NAME: &'static str = "Random Forest Classifier";

    fn fit(&mut self, x: &FeatureMatrix, y: &[usize], n_classes: usize) -> Result<()> {
        if x.n_rows() == 0 {
            return Err(Error::Training("Cannot fit a forest on zero rows".to_string()));
        }
        if x.n_rows() != y.len() {
            return Err(Error::Training(format!(
                "Feature rows ({}) and labels ({}) differ in length",
                x.n_rows(),
                y.len()
            )));
        }
        if self.params.n_estimators == 0 {
            return Err(Error::Training("A forest needs at least one tree".to_string()));
        }

        let trees = self.fit_trees(x, y, n_classes).map_err(Error::Training)?;
        self.trees = trees;
        self.n_features = x.n_cols();
        self.n_classes = n_classes;
        Ok(())
    }

    #[allow(clippy::cast_precision_loss)]
    fn predict_proba(&self, row: ArrayView1<'_, f64>) -> Result<Vec<f64>> {
        if self.trees.is_empty() {
            return Err(Error::Prediction("Forest is not fitted".to_string()));
        }
        if row.len() != self.n_features {
            return Err(Error::Prediction(format!(
                "Expected {} features, got {}",
                self.n_features,
                row.len()
            )));
        }

        let mut proba = vec![0.0; self.n_classes];
        for tree in &self.trees {
            for (acc, p) in proba.iter_mut().zip(tree.predict_proba(row)) {
                *acc += p;
            }
        }
        let n_trees = self.trees.len() as f64;
        for p in &mut proba {
            *p /= n_trees;
        }
        Ok(proba)
    }

    fn n_features(&self) -> usize {
        self.n_features
    }

    fn n_classes(&self) -> usize {
        self.n_classes
    }

    fn validate(&self) -> Result<()> {
        if self.trees.is_empty() {
            return Err(Error::Artifact("Forest has no trees".to_string()));
        }
        for (idx, tree) in self.trees.iter().enumerate() {
            tree.validate(self.n_features, self.n_classes)
                .map_err(|e| Error::Artifact(format!("Tree {idx}: {e}")))?;
        }
        Ok(())
    }
}
