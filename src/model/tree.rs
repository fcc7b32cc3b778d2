//! CART regression tree with variance-reduction splits.
use rand::rngs::StdRng;
use rand::seq::SliceRandom;

/// Two feature values closer than this are treated as equal when placing
/// a split threshold.
const FEATURE_THRESHOLD: f64 = 1e-7;
const IMPURITY_EPSILON: f64 = 1e-12;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TreeParams {
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    /// Features examined per split, already resolved against the column count.
    pub max_features: usize,
}

#[derive(Debug, Clone, PartialEq)]
enum Node {
    Leaf {
        value: f64,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct RegressionTree {
    nodes: Vec<Node>,
    /// Unnormalized weighted impurity decrease per feature.
    importances: Vec<f64>,
}

#[derive(Debug, Clone, Copy)]
struct Moments {
    n: f64,
    sum: f64,
    sum_sq: f64,
}

impl Moments {
    fn of(y: &[f64], idx: &[usize]) -> Self {
        idx.iter().fold(
            Moments {
                n: 0.0,
                sum: 0.0,
                sum_sq: 0.0,
            },
            |m, &i| Moments {
                n: m.n + 1.0,
                sum: m.sum + y[i],
                sum_sq: m.sum_sq + y[i] * y[i],
            },
        )
    }

    fn mean(&self) -> f64 {
        self.sum / self.n
    }

    /// Mean squared error around the node mean.
    fn impurity(&self) -> f64 {
        (self.sum_sq / self.n - self.mean().powi(2)).max(0.0)
    }
}

struct BestSplit {
    feature: usize,
    threshold: f64,
    proxy: f64,
}

struct Builder<'a> {
    x: &'a [Vec<f64>],
    y: &'a [f64],
    params: TreeParams,
    rng: &'a mut StdRng,
    nodes: Vec<Node>,
    importances: Vec<f64>,
    features: Vec<usize>,
}

impl<'a> Builder<'a> {
    fn build(&mut self, idx: &mut [usize], depth: usize) -> usize {
        let node_id = self.nodes.len();
        let moments = Moments::of(self.y, idx);
        self.nodes.push(Node::Leaf {
            value: moments.mean(),
        });

        let n = idx.len();
        let p = self.params;
        let depth_reached = p.max_depth.is_some_and(|d| depth >= d);
        if depth_reached
            || n < 2
            || n < p.min_samples_split
            || n < 2 * p.min_samples_leaf
            || moments.impurity() <= IMPURITY_EPSILON
        {
            return node_id;
        }

        let Some(best) = self.find_split(idx, &moments) else {
            return node_id;
        };

        let mid = partition(idx, |i| self.x[i][best.feature] <= best.threshold);
        if mid == 0 || mid == n {
            return node_id;
        }
        let (left_idx, right_idx) = idx.split_at_mut(mid);
        let left_m = Moments::of(self.y, left_idx);
        let right_m = Moments::of(self.y, right_idx);
        self.importances[best.feature] += moments.n * moments.impurity()
            - left_m.n * left_m.impurity()
            - right_m.n * right_m.impurity();

        let left = self.build(left_idx, depth + 1);
        let right = self.build(right_idx, depth + 1);
        self.nodes[node_id] = Node::Split {
            feature: best.feature,
            threshold: best.threshold,
            left,
            right,
        };
        node_id
    }

    /// Search a random subset of features for the split with the largest
    /// variance reduction. Constant features do not count toward the subset.
    fn find_split(&mut self, idx: &[usize], parent: &Moments) -> Option<BestSplit> {
        self.features.shuffle(&mut *self.rng);
        let n = idx.len();
        let min_leaf = self.params.min_samples_leaf;
        let parent_proxy = parent.sum * parent.sum / parent.n;
        let mut best: Option<BestSplit> = None;
        let mut visited = 0usize;
        let mut sorted: Vec<(f64, f64)> = Vec::with_capacity(n);

        for &f in &self.features {
            if visited >= self.params.max_features {
                break;
            }
            sorted.clear();
            sorted.extend(idx.iter().map(|&i| (self.x[i][f], self.y[i])));
            sorted.sort_by(|a, b| a.0.total_cmp(&b.0));
            if sorted[n - 1].0 <= sorted[0].0 + FEATURE_THRESHOLD {
                continue;
            }
            visited += 1;

            let mut left_sum = 0.0;
            for pos in 1..n {
                left_sum += sorted[pos - 1].1;
                if pos < min_leaf || n - pos < min_leaf {
                    continue;
                }
                let (lo, hi) = (sorted[pos - 1].0, sorted[pos].0);
                if hi <= lo + FEATURE_THRESHOLD {
                    continue;
                }
                let nl = pos as f64;
                let nr = (n - pos) as f64;
                let right_sum = parent.sum - left_sum;
                let proxy = left_sum * left_sum / nl + right_sum * right_sum / nr;
                if proxy > parent_proxy + IMPURITY_EPSILON
                    && best.as_ref().map_or(true, |b| proxy > b.proxy)
                {
                    let mut threshold = lo / 2.0 + hi / 2.0;
                    if threshold >= hi || !threshold.is_finite() {
                        threshold = lo;
                    }
                    best = Some(BestSplit {
                        feature: f,
                        threshold,
                        proxy,
                    });
                }
            }
        }
        best
    }
}

/// Stable-enough in-place partition; returns the count of elements satisfying `pred`.
fn partition<F>(idx: &mut [usize], pred: F) -> usize
where
    F: Fn(usize) -> bool,
{
    let mut mid = 0;
    for i in 0..idx.len() {
        if pred(idx[i]) {
            idx.swap(mid, i);
            mid += 1;
        }
    }
    mid
}

impl RegressionTree {
    /// Grow a tree on the rows listed in `samples` (duplicates allowed for bootstrap).
    pub fn fit(
        x: &[Vec<f64>],
        y: &[f64],
        samples: &[usize],
        params: TreeParams,
        rng: &mut StdRng,
    ) -> Self {
        let n_features = x.first().map_or(0, Vec::len);
        let mut builder = Builder {
            x,
            y,
            params,
            rng,
            nodes: Vec::new(),
            importances: vec![0.0; n_features],
            features: (0..n_features).collect(),
        };
        let mut idx = samples.to_vec();
        if !idx.is_empty() {
            builder.build(&mut idx, 0);
        } else {
            builder.nodes.push(Node::Leaf { value: 0.0 });
        }
        RegressionTree {
            nodes: builder.nodes,
            importances: builder.importances,
        }
    }

    pub fn predict_one(&self, row: &[f64]) -> f64 {
        let mut id = 0;
        loop {
            match &self.nodes[id] {
                Node::Leaf { value } => return *value,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    id = if row[*feature] <= *threshold { *left } else { *right };
                }
            }
        }
    }

    /// Impurity-decrease importances normalized to sum to 1 (all zero for a stump).
    pub fn feature_importances(&self) -> Vec<f64> {
        let total: f64 = self.importances.iter().sum();
        if total > 0.0 {
            self.importances.iter().map(|v| v / total).collect()
        } else {
            vec![0.0; self.importances.len()]
        }
    }

    pub fn n_nodes(&self) -> usize {
        self.nodes.len()
    }

    pub fn depth(&self) -> usize {
        fn walk(nodes: &[Node], id: usize) -> usize {
            match &nodes[id] {
                Node::Leaf { .. } => 0,
                Node::Split { left, right, .. } => 1 + walk(nodes, *left).max(walk(nodes, *right)),
            }
        }
        walk(&self.nodes, 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn params(max_depth: Option<usize>, min_leaf: usize) -> TreeParams {
        TreeParams {
            max_depth,
            min_samples_split: 2,
            min_samples_leaf: min_leaf,
            max_features: 2,
        }
    }

    #[test]
    fn learns_a_step_function() {
        let x: Vec<Vec<f64>> = (0..20).map(|i| vec![i as f64, 0.0]).collect();
        let y: Vec<f64> = (0..20).map(|i| if i < 10 { 1.0 } else { 5.0 }).collect();
        let samples: Vec<usize> = (0..20).collect();
        let mut rng = StdRng::seed_from_u64(7);
        let tree = RegressionTree::fit(&x, &y, &samples, params(None, 1), &mut rng);
        assert_eq!(tree.predict_one(&[3.0, 0.0]), 1.0);
        assert_eq!(tree.predict_one(&[15.0, 0.0]), 5.0);
        assert_eq!(tree.depth(), 1);
        // the constant column never gets credit
        assert_eq!(tree.feature_importances(), vec![1.0, 0.0]);
    }

    #[test]
    fn depth_limit_and_leaf_minimum_hold() {
        let x: Vec<Vec<f64>> = (0..64).map(|i| vec![i as f64, (i % 7) as f64]).collect();
        let y: Vec<f64> = (0..64).map(|i| ((i * 37) % 11) as f64).collect();
        let samples: Vec<usize> = (0..64).collect();
        let mut rng = StdRng::seed_from_u64(1);
        let tree = RegressionTree::fit(&x, &y, &samples, params(Some(3), 4), &mut rng);
        assert!(tree.depth() <= 3);
        assert!(tree.n_nodes() <= 15);
    }

    #[test]
    fn constant_target_is_a_single_leaf() {
        let x: Vec<Vec<f64>> = (0..5).map(|i| vec![i as f64]).collect();
        let y = vec![2.0; 5];
        let samples: Vec<usize> = (0..5).collect();
        let mut rng = StdRng::seed_from_u64(3);
        let tree = RegressionTree::fit(&x, &y, &samples, params(None, 1), &mut rng);
        assert_eq!(tree.n_nodes(), 1);
        assert_eq!(tree.predict_one(&[100.0]), 2.0);
        assert_eq!(tree.feature_importances(), vec![0.0]);
    }
}
