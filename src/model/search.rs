//! Randomized hyperparameter search scored by k-fold cross-validated R².
use super::forest::{ForestParams, RandomForest};
use super::r2_score;
use crate::config::{ParamSpace, SearchConfig};
use crate::error::{ImpactError, Result};
use log::{debug, info};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rayon::prelude::*;
use std::ops::Range;

#[derive(Debug, Clone, PartialEq)]
pub struct CandidateScore {
    pub params: ForestParams,
    pub fold_scores: Vec<f64>,
    pub mean_score: f64,
}

#[derive(Debug, Clone)]
pub struct SearchResult {
    pub best_params: ForestParams,
    pub best_score: f64,
    pub candidates: Vec<CandidateScore>,
    /// Best configuration refit on the full training set.
    pub model: RandomForest,
}

/// Every grid point, in a fixed nested order.
pub fn expand_grid(space: &ParamSpace) -> Vec<ForestParams> {
    let mut grid = Vec::with_capacity(space.grid_size());
    for &n_estimators in &space.n_estimators {
        for &max_depth in &space.max_depth {
            for &min_samples_split in &space.min_samples_split {
                for &min_samples_leaf in &space.min_samples_leaf {
                    for &max_features in &space.max_features {
                        grid.push(ForestParams {
                            n_estimators,
                            max_depth,
                            min_samples_split,
                            min_samples_leaf,
                            max_features,
                        });
                    }
                }
            }
        }
    }
    grid
}

/// Draw `n_iter` distinct grid points; the whole grid when it is smaller.
pub fn sample_candidates(space: &ParamSpace, n_iter: usize, seed: u64) -> Vec<ForestParams> {
    let grid = expand_grid(space);
    if n_iter >= grid.len() {
        return grid;
    }
    let mut rng = StdRng::seed_from_u64(seed);
    rand::seq::index::sample(&mut rng, grid.len(), n_iter)
        .into_iter()
        .map(|i| grid[i])
        .collect()
}

/// Contiguous, unshuffled folds; the first `n % k` folds get one extra row.
pub fn kfold_ranges(n: usize, k: usize) -> Vec<Range<usize>> {
    let base = n / k;
    let extra = n % k;
    let mut start = 0;
    (0..k)
        .map(|i| {
            let len = base + usize::from(i < extra);
            let r = start..start + len;
            start += len;
            r
        })
        .collect()
}

fn select(x: &[Vec<f64>], y: &[f64], keep: impl Fn(usize) -> bool) -> (Vec<Vec<f64>>, Vec<f64>) {
    (0..x.len())
        .filter(|&i| keep(i))
        .map(|i| (x[i].clone(), y[i]))
        .unzip()
}

fn cross_validate(
    x: &[Vec<f64>],
    y: &[f64],
    params: ForestParams,
    folds: &[Range<usize>],
    seed: u64,
) -> Result<Vec<f64>> {
    folds
        .par_iter()
        .map(|fold| {
            let (x_train, y_train) = select(x, y, |i| !fold.contains(&i));
            let model = RandomForest::fit(&x_train, &y_train, params, seed)?;
            let predicted = model.predict(&x[fold.clone()]);
            Ok(r2_score(&y[fold.clone()], &predicted))
        })
        .collect()
}

/// Run the search and refit the winner on all rows.
///
/// Every candidate uses the same forest seed, so a fixed `config.seed`
/// reproduces the same winner and the same fitted model.
pub fn randomized_search(x: &[Vec<f64>], y: &[f64], config: &SearchConfig) -> Result<SearchResult> {
    if config.cv_folds < 2 {
        return Err(ImpactError::Config(format!(
            "search.cv_folds must be at least 2, got {}",
            config.cv_folds
        )));
    }
    if x.is_empty() {
        return Err(ImpactError::EmptyTrainingSet);
    }
    if x.len() < config.cv_folds {
        return Err(ImpactError::ModelSearch(format!(
            "{} training rows cannot fill {} folds",
            x.len(),
            config.cv_folds
        )));
    }
    let candidates = sample_candidates(&config.space, config.n_iter, config.seed);
    let folds = kfold_ranges(x.len(), config.cv_folds);
    info!(
        "searching {} candidates x {} folds on {} rows",
        candidates.len(),
        folds.len(),
        x.len()
    );

    let scored: Vec<CandidateScore> = candidates
        .par_iter()
        .map(|&params| {
            let fold_scores = cross_validate(x, y, params, &folds, config.seed)?;
            let mean_score = fold_scores.iter().sum::<f64>() / fold_scores.len() as f64;
            Ok(CandidateScore {
                params,
                fold_scores,
                mean_score,
            })
        })
        .collect::<Result<_>>()?;

    for c in &scored {
        debug!("candidate {:?}: mean R2 {:.4}", c.params, c.mean_score);
    }

    let mut best: Option<&CandidateScore> = None;
    for c in scored.iter().filter(|c| c.mean_score.is_finite()) {
        if best.map_or(true, |b| c.mean_score > b.mean_score) {
            best = Some(c);
        }
    }
    let best = best.ok_or_else(|| {
        ImpactError::ModelSearch("no candidate produced a finite cross-validated R2".into())
    })?;
    let (best_params, best_score) = (best.params, best.mean_score);
    info!("best parameters {:?} with mean R2 {:.4}", best_params, best_score);

    let model = RandomForest::fit(x, y, best_params, config.seed)?;
    Ok(SearchResult {
        best_params,
        best_score,
        candidates: scored,
        model,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MaxFeatures;

    fn small_space() -> ParamSpace {
        ParamSpace {
            n_estimators: vec![5, 8],
            max_depth: vec![Some(3), None],
            min_samples_split: vec![2],
            min_samples_leaf: vec![1, 2],
            max_features: vec![MaxFeatures::Sqrt],
        }
    }

    #[test]
    fn folds_cover_rows_once() {
        let folds = kfold_ranges(10, 3);
        assert_eq!(folds, vec![0..4, 4..7, 7..10]);
    }

    #[test]
    fn sampling_is_distinct_and_seeded() {
        let space = ParamSpace::default();
        let a = sample_candidates(&space, 20, 42);
        let b = sample_candidates(&space, 20, 42);
        assert_eq!(a, b);
        assert_eq!(a.len(), 20);
        for (i, p) in a.iter().enumerate() {
            assert!(!a[i + 1..].contains(p));
        }
        assert_eq!(sample_candidates(&small_space(), 100, 1).len(), 8);
    }

    #[test]
    fn search_is_deterministic() {
        let x: Vec<Vec<f64>> = (0..45).map(|i| vec![i as f64, ((i * 7) % 5) as f64]).collect();
        let y: Vec<f64> = x.iter().map(|r| r[0] * 0.5 + r[1]).collect();
        let config = SearchConfig {
            n_iter: 4,
            cv_folds: 3,
            seed: 42,
            space: small_space(),
        };
        let a = randomized_search(&x, &y, &config).unwrap();
        let b = randomized_search(&x, &y, &config).unwrap();
        assert_eq!(a.best_params, b.best_params);
        assert_eq!(a.best_score, b.best_score);
        assert_eq!(a.model.predict(&x), b.model.predict(&x));
        assert_eq!(a.candidates.len(), 4);
    }

    #[test]
    fn too_few_rows_is_an_error() {
        let config = SearchConfig {
            space: small_space(),
            ..SearchConfig::default()
        };
        let err = randomized_search(&[vec![1.0]], &[1.0], &config).unwrap_err();
        assert!(matches!(err, ImpactError::ModelSearch(_)));
        let err = randomized_search(&[], &[], &config).unwrap_err();
        assert!(matches!(err, ImpactError::EmptyTrainingSet));
    }

    #[test]
    fn fewer_than_two_folds_is_a_config_error() {
        let x: Vec<Vec<f64>> = (0..6).map(|i| vec![i as f64]).collect();
        let y: Vec<f64> = (0..6).map(|i| i as f64).collect();
        for cv_folds in [0, 1] {
            let config = SearchConfig {
                cv_folds,
                space: small_space(),
                ..SearchConfig::default()
            };
            let err = randomized_search(&x, &y, &config).unwrap_err();
            assert!(matches!(err, ImpactError::Config(_)));
        }
    }
}
