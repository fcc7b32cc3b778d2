//! Bagged ensemble of regression trees.
use super::tree::{RegressionTree, TreeParams};
use crate::config::MaxFeatures;
use crate::error::{ImpactError, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::Serialize;

/// One point of the hyperparameter grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ForestParams {
    pub n_estimators: usize,
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    pub max_features: MaxFeatures,
}

impl ForestParams {
    fn tree_params(&self, n_features: usize) -> TreeParams {
        TreeParams {
            max_depth: self.max_depth,
            min_samples_split: self.min_samples_split,
            min_samples_leaf: self.min_samples_leaf,
            max_features: self.max_features.resolve(n_features),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RandomForest {
    n_features: usize,
    trees: Vec<RegressionTree>,
}

impl RandomForest {
    /// Fit on bootstrap resamples of `(x, y)`.
    ///
    /// Tree seeds are drawn up front from `seed`, so the fitted forest is
    /// identical however rayon schedules the trees.
    pub fn fit(x: &[Vec<f64>], y: &[f64], params: ForestParams, seed: u64) -> Result<Self> {
        if x.is_empty() || x.len() != y.len() {
            return Err(ImpactError::ModelSearch(format!(
                "cannot fit forest on {} rows and {} targets",
                x.len(),
                y.len()
            )));
        }
        let n_features = x[0].len();
        if x.iter().any(|row| row.len() != n_features) {
            return Err(ImpactError::ModelSearch("ragged feature matrix".into()));
        }
        let n = x.len();
        let tree_params = params.tree_params(n_features);
        let mut master = StdRng::seed_from_u64(seed);
        let seeds: Vec<u64> = (0..params.n_estimators).map(|_| master.gen()).collect();

        let trees = seeds
            .par_iter()
            .map(|&s| {
                let mut rng = StdRng::seed_from_u64(s);
                let samples: Vec<usize> = (0..n).map(|_| rng.gen_range(0..n)).collect();
                RegressionTree::fit(x, y, &samples, tree_params, &mut rng)
            })
            .collect();

        Ok(Self {
            n_features,
            trees,
        })
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    pub fn predict_one(&self, row: &[f64]) -> f64 {
        let sum: f64 = self.trees.iter().map(|t| t.predict_one(row)).sum();
        sum / self.trees.len() as f64
    }

    pub fn predict(&self, x: &[Vec<f64>]) -> Vec<f64> {
        x.iter().map(|row| self.predict_one(row)).collect()
    }

    /// Mean of per-tree normalized importances, renormalized to sum to 1.
    pub fn feature_importances(&self) -> Vec<f64> {
        let mut acc = vec![0.0; self.n_features];
        for tree in &self.trees {
            for (a, v) in acc.iter_mut().zip(tree.feature_importances()) {
                *a += v;
            }
        }
        let total: f64 = acc.iter().sum();
        if total > 0.0 {
            acc.iter_mut().for_each(|v| *v /= total);
        }
        acc
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn params(n: usize) -> ForestParams {
        ForestParams {
            n_estimators: n,
            max_depth: Some(6),
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: MaxFeatures::All,
        }
    }

    fn data() -> (Vec<Vec<f64>>, Vec<f64>) {
        let x: Vec<Vec<f64>> = (0..60)
            .map(|i| vec![i as f64, ((i * 13) % 7) as f64, 1.0])
            .collect();
        let y: Vec<f64> = x.iter().map(|r| 2.0 * r[0] + 0.1 * r[1]).collect();
        (x, y)
    }

    #[test]
    fn same_seed_same_forest() {
        let (x, y) = data();
        let a = RandomForest::fit(&x, &y, params(15), 42).unwrap();
        let b = RandomForest::fit(&x, &y, params(15), 42).unwrap();
        assert_eq!(a.predict(&x), b.predict(&x));
        assert_eq!(a.feature_importances(), b.feature_importances());
    }

    #[test]
    fn importances_sum_to_one_and_favor_signal() {
        let (x, y) = data();
        let forest = RandomForest::fit(&x, &y, params(20), 1).unwrap();
        let imp = forest.feature_importances();
        assert_relative_eq!(imp.iter().sum::<f64>(), 1.0, epsilon = 1e-9);
        assert!(imp[0] > imp[1]);
        assert_eq!(imp[2], 0.0);
    }

    #[test]
    fn fits_monotone_signal() {
        let (x, y) = data();
        let forest = RandomForest::fit(&x, &y, params(20), 3).unwrap();
        assert!(forest.predict_one(&x[5]) < forest.predict_one(&x[50]));
        assert_eq!(forest.n_trees(), 20);
    }

    #[test]
    fn rejects_empty_input() {
        assert!(matches!(
            RandomForest::fit(&[], &[], params(3), 0),
            Err(ImpactError::ModelSearch(_))
        ));
    }
}
