//! Run configuration.
//!
//! Every knob has a default matching the reference analysis, so an empty
//! JSON object (or no config file at all) reproduces the standard run.
use crate::error::{ImpactError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// How raw years are bucketed into periods.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PeriodGranularity {
    /// One period per calendar year.
    #[default]
    Annual,
    /// Five-year buckets labelled by their first year (2020 covers 2020-2024).
    FiveYear,
}

impl PeriodGranularity {
    pub fn period_of(self, year: i32) -> i32 {
        match self {
            PeriodGranularity::Annual => year,
            PeriodGranularity::FiveYear => year - year.rem_euclid(5),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatasetConfig {
    /// Groups with fewer observed rows than this are discarded.
    pub min_events: usize,
    pub granularity: PeriodGranularity,
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            min_events: 1,
            granularity: PeriodGranularity::Annual,
        }
    }
}

/// Number of features considered at each split.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaxFeatures {
    Sqrt,
    Log2,
    All,
}

impl MaxFeatures {
    pub fn resolve(self, n_features: usize) -> usize {
        let n = n_features as f64;
        let k = match self {
            MaxFeatures::Sqrt => n.sqrt() as usize,
            MaxFeatures::Log2 => n.log2() as usize,
            MaxFeatures::All => n_features,
        };
        k.clamp(1, n_features.max(1))
    }
}

/// Grid the randomized search samples from.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ParamSpace {
    pub n_estimators: Vec<usize>,
    /// `None` grows trees until the leaf constraints stop them.
    pub max_depth: Vec<Option<usize>>,
    pub min_samples_split: Vec<usize>,
    pub min_samples_leaf: Vec<usize>,
    pub max_features: Vec<MaxFeatures>,
}

impl Default for ParamSpace {
    fn default() -> Self {
        Self {
            n_estimators: vec![200, 300],
            max_depth: vec![Some(5), Some(10), Some(15), None],
            min_samples_split: vec![2, 5, 10],
            min_samples_leaf: vec![1, 2, 4],
            max_features: vec![MaxFeatures::Sqrt, MaxFeatures::Log2],
        }
    }
}

impl ParamSpace {
    pub fn grid_size(&self) -> usize {
        self.n_estimators.len()
            * self.max_depth.len()
            * self.min_samples_split.len()
            * self.min_samples_leaf.len()
            * self.max_features.len()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub n_iter: usize,
    pub cv_folds: usize,
    pub seed: u64,
    pub space: ParamSpace,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            n_iter: 20,
            cv_folds: 3,
            seed: 42,
            space: ParamSpace::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Last period whose rows may be used for training statistics.
    pub train_cutoff: i32,
    /// Candidate "current" periods, in priority order.
    pub prediction_years: Vec<i32>,
    /// Distinct training periods a country needs to receive a prediction.
    pub min_history_periods: usize,
    /// Aggregate regions and historical entities that are not countries.
    pub excluded_entities: Vec<String>,
    pub search: SearchConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            train_cutoff: 2023,
            prediction_years: vec![2025, 2024, 2023, 2022, 2021, 2020],
            min_history_periods: 5,
            excluded_entities: default_excluded_entities(),
            search: SearchConfig::default(),
        }
    }
}

pub fn default_excluded_entities() -> Vec<String> {
    [
        "Asia",
        "Africa",
        "Europe",
        "North America",
        "South America",
        "Oceania",
        "USSR",
        "Soviet Union",
        "Czechoslovakia",
        "Yugoslavia",
        "World",
        "Low-income countries",
        "Lower-middle-income countries",
        "Upper-middle-income countries",
        "High-income countries",
        "European Union",
        "EU",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

impl PipelineConfig {
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let config: PipelineConfig = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.prediction_years.is_empty() {
            return Err(ImpactError::Config("prediction_years is empty".into()));
        }
        let search = &self.search;
        if search.n_iter == 0 {
            return Err(ImpactError::Config("search.n_iter must be positive".into()));
        }
        if search.cv_folds < 2 {
            return Err(ImpactError::Config(format!(
                "search.cv_folds must be at least 2, got {}",
                search.cv_folds
            )));
        }
        if search.space.grid_size() == 0 {
            return Err(ImpactError::Config(
                "search.space has an empty parameter list".into(),
            ));
        }
        if search.space.n_estimators.contains(&0) {
            return Err(ImpactError::Config("n_estimators must be positive".into()));
        }
        if search.space.min_samples_split.iter().any(|&s| s < 2) {
            return Err(ImpactError::Config("min_samples_split must be >= 2".into()));
        }
        if search.space.min_samples_leaf.contains(&0) {
            return Err(ImpactError::Config("min_samples_leaf must be positive".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn five_year_buckets_floor_to_multiple_of_five() {
        let g = PeriodGranularity::FiveYear;
        assert_eq!(g.period_of(2020), 2020);
        assert_eq!(g.period_of(2024), 2020);
        assert_eq!(g.period_of(1999), 1995);
        assert_eq!(PeriodGranularity::Annual.period_of(2024), 2024);
    }

    #[test]
    fn max_features_for_eighteen_columns() {
        assert_eq!(MaxFeatures::Sqrt.resolve(18), 4);
        assert_eq!(MaxFeatures::Log2.resolve(18), 4);
        assert_eq!(MaxFeatures::All.resolve(18), 18);
        assert_eq!(MaxFeatures::Log2.resolve(1), 1);
    }

    #[test]
    fn default_grid_has_144_combinations() {
        assert_eq!(ParamSpace::default().grid_size(), 144);
        assert!(PipelineConfig::default().validate().is_ok());
    }

    #[test]
    fn partial_json_falls_back_to_defaults() {
        let config: PipelineConfig =
            serde_json::from_str(r#"{"train_cutoff": 2019, "search": {"n_iter": 3}}"#).unwrap();
        assert_eq!(config.train_cutoff, 2019);
        assert_eq!(config.search.n_iter, 3);
        assert_eq!(config.search.cv_folds, 3);
        assert_eq!(config.min_history_periods, 5);
        assert!(config.excluded_entities.iter().any(|e| e == "World"));
    }

    #[test]
    fn rejects_single_fold() {
        let mut config = PipelineConfig::default();
        config.search.cv_folds = 1;
        assert!(matches!(config.validate(), Err(ImpactError::Config(_))));
    }
}
