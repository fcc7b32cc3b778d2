//! Next-period impact regression.
//!
//! Training pairs are (features at period t, `impact_rebased` at t+1) for
//! every complete row inside the training window. Each eligible country
//! then contributes its most recent row as the input for one forecast.
use crate::config::PipelineConfig;
use crate::error::{ImpactError, Result};
use crate::features::{EngineeredRow, Feature};
use crate::model::{r2_score, randomized_search, rmse, SearchResult};
use crate::util::{mean, median};
use log::{debug, info};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, PartialEq)]
pub struct PredictionRow {
    pub row: EngineeredRow,
    pub predicted_impact_rebased_next: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct HoldoutMetrics {
    pub rows: usize,
    pub r2: f64,
    pub rmse: f64,
}

#[derive(Debug, Clone)]
pub struct PredictionOutcome {
    pub search: SearchResult,
    pub predictions: Vec<PredictionRow>,
    /// Features sorted by descending importance.
    pub importances: Vec<(Feature, f64)>,
    pub training_rows: usize,
    /// Scores on complete rows after the training cutoff, when any exist.
    pub holdout: Option<HoldoutMetrics>,
}

/// Dense feature vector, or `None` if any feature is missing.
fn complete_features(row: &EngineeredRow) -> Option<Vec<f64>> {
    row.feature_vector().into_iter().collect()
}

/// Rows inside the training window with every feature and the target present.
pub fn training_matrix(rows: &[EngineeredRow], train_cutoff: i32) -> (Vec<Vec<f64>>, Vec<f64>) {
    rows.iter()
        .filter(|r| r.period() <= train_cutoff)
        .filter_map(|r| Some((complete_features(r)?, r.impact_rebased_next?)))
        .unzip()
}

/// Pick one "current" row per country and drop countries with too little history.
///
/// Candidate countries are those with at least one training-window row.
/// For each, the first period of `prediction_years` present is used.
pub fn select_prediction_rows(
    rows: &[EngineeredRow],
    config: &PipelineConfig,
) -> Result<Vec<EngineeredRow>> {
    let mut history: BTreeMap<&str, BTreeSet<i32>> = BTreeMap::new();
    for r in rows.iter().filter(|r| r.period() <= config.train_cutoff) {
        history.entry(r.country()).or_default().insert(r.period());
    }

    let mut by_key: BTreeMap<(&str, i32), &EngineeredRow> = BTreeMap::new();
    for r in rows {
        by_key.entry((r.country(), r.period())).or_insert(r);
    }

    let selected: Vec<&EngineeredRow> = history
        .keys()
        .filter_map(|country| {
            config
                .prediction_years
                .iter()
                .find_map(|year| by_key.get(&(*country, *year)).copied())
        })
        .collect();
    if selected.is_empty() {
        return Err(ImpactError::NoPredictionData);
    }

    let eligible: Vec<EngineeredRow> = selected
        .into_iter()
        .filter(|r| {
            history
                .get(r.country())
                .is_some_and(|periods| periods.len() >= config.min_history_periods)
        })
        .cloned()
        .collect();
    info!(
        "{} countries have a current row and at least {} training periods",
        eligible.len(),
        config.min_history_periods
    );
    if eligible.is_empty() {
        return Err(ImpactError::NoPredictionData);
    }
    Ok(eligible)
}

/// Fill missing features on prediction rows, one feature at a time in
/// `Feature::ALL` order:
///
/// - hazard impacts: 0
/// - climate_impact_index: mean of the (already filled) hazard impacts, else 0
/// - trend columns: 0
/// - everything else: median over the prediction rows, else 0
pub fn impute_prediction_rows(rows: &mut [EngineeredRow]) {
    for feature in Feature::ALL {
        let fill = match feature {
            f if f.is_hazard_impact() => None,
            Feature::ImpactTrend5yr | Feature::AbsoluteImpactTrend => None,
            Feature::ClimateImpactIndex => None,
            _ => median(rows.iter().filter_map(|r| r.feature(feature)).collect()),
        };
        for row in rows.iter_mut() {
            if row.feature(feature).is_some() {
                continue;
            }
            let value = match feature {
                Feature::ClimateImpactIndex => {
                    let hazards: Vec<f64> = Feature::ALL
                        .iter()
                        .filter(|f| f.is_hazard_impact())
                        .filter_map(|f| row.feature(*f))
                        .collect();
                    mean(&hazards).unwrap_or(0.0)
                }
                _ => fill.unwrap_or(0.0),
            };
            debug!("imputed {} = {} for {}", feature.name(), value, row.country());
            row.set_feature(feature, value);
        }
    }
}

fn holdout_metrics(
    rows: &[EngineeredRow],
    train_cutoff: i32,
    search: &SearchResult,
) -> Option<HoldoutMetrics> {
    let (x, y): (Vec<Vec<f64>>, Vec<f64>) = rows
        .iter()
        .filter(|r| r.period() > train_cutoff)
        .filter_map(|r| Some((complete_features(r)?, r.impact_rebased_next?)))
        .unzip();
    if y.is_empty() {
        return None;
    }
    let predicted = search.model.predict(&x);
    Some(HoldoutMetrics {
        rows: y.len(),
        r2: r2_score(&y, &predicted),
        rmse: rmse(&y, &predicted),
    })
}

/// Train the tuned forest and forecast next-period rebased impact for
/// every eligible country.
pub fn train_and_predict(rows: &[EngineeredRow], config: &PipelineConfig) -> Result<PredictionOutcome> {
    let mut current = select_prediction_rows(rows, config)?;
    let (x_train, y_train) = training_matrix(rows, config.train_cutoff);
    info!("training on {} complete rows", y_train.len());
    if y_train.is_empty() {
        return Err(ImpactError::EmptyTrainingSet);
    }

    impute_prediction_rows(&mut current);

    let search = randomized_search(&x_train, &y_train, &config.search)?;

    let predictions = current
        .into_iter()
        .map(|row| {
            let x = complete_features(&row).ok_or_else(|| {
                ImpactError::ModelSearch(format!("{} still has missing features", row.country()))
            })?;
            let predicted = search.model.predict_one(&x);
            Ok(PredictionRow {
                row,
                predicted_impact_rebased_next: predicted,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let mut importances: Vec<(Feature, f64)> = Feature::ALL
        .iter()
        .copied()
        .zip(search.model.feature_importances())
        .collect();
    importances.sort_by(|a, b| b.1.total_cmp(&a.1));

    let holdout = holdout_metrics(rows, config.train_cutoff, &search);
    if let Some(h) = &holdout {
        info!("holdout after {}: {} rows, R2 {:.4}, RMSE {:.4}", config.train_cutoff, h.rows, h.r2, h.rmse);
    }

    Ok(PredictionOutcome {
        search,
        predictions,
        importances,
        training_rows: y_train.len(),
        holdout,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::build_features;
    use crate::types::CountryPeriodRecord;

    fn rec(country: &str, period: i32, index: Option<f64>) -> CountryPeriodRecord {
        let mut r = CountryPeriodRecord::empty(country, period);
        r.flood_impact = index;
        r.drought_impact = index.map(|v| v / 2.0);
        r.storms_impact = index;
        r.extreme_temp_impact = index;
        r.climate_impact_index = index;
        r.impact_rebased = index.map(|v| v + 1.0);
        r.hazard_count = index.map(|_| 4);
        r.total_affected = Some(100.0);
        r.total_deaths = Some(1.0);
        r.economic_damage_pct_gdp = Some(0.0);
        r
    }

    fn config() -> PipelineConfig {
        PipelineConfig::default()
    }

    #[test]
    fn most_recent_priority_year_is_selected() {
        let mut input: Vec<CountryPeriodRecord> = (2015..=2024).map(|y| rec("A", y, Some(1.0))).collect();
        input.extend((2016..=2022).map(|y| rec("B", y, Some(2.0))));
        let rows = build_features(&input, 2023);
        let selected = select_prediction_rows(&rows, &config()).unwrap();
        assert_eq!(selected.len(), 2);
        assert_eq!((selected[0].country(), selected[0].period()), ("A", 2024));
        assert_eq!((selected[1].country(), selected[1].period()), ("B", 2022));
    }

    #[test]
    fn short_history_countries_are_silently_dropped() {
        let mut input: Vec<CountryPeriodRecord> = (2015..=2023).map(|y| rec("A", y, Some(1.0))).collect();
        input.extend((2020..=2023).map(|y| rec("Short", y, Some(2.0))));
        let rows = build_features(&input, 2023);
        let selected = select_prediction_rows(&rows, &config()).unwrap();
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].country(), "A");
    }

    #[test]
    fn no_current_rows_is_terminal() {
        let input: Vec<CountryPeriodRecord> = (1990..=2000).map(|y| rec("A", y, Some(1.0))).collect();
        let rows = build_features(&input, 2023);
        assert!(matches!(
            select_prediction_rows(&rows, &config()),
            Err(ImpactError::NoPredictionData)
        ));
        let short: Vec<CountryPeriodRecord> = (2021..=2023).map(|y| rec("A", y, Some(1.0))).collect();
        let rows = build_features(&short, 2023);
        assert!(matches!(
            select_prediction_rows(&rows, &config()),
            Err(ImpactError::NoPredictionData)
        ));
    }

    #[test]
    fn imputation_follows_per_feature_policy() {
        let input = vec![rec("A", 2020, Some(2.0)), rec("B", 2020, Some(4.0)), rec("C", 2020, None)];
        let mut rows = build_features(&input, 2023);
        let mut c = rows.remove(2);
        c.record.flood_impact = Some(3.0);
        rows.push(c);
        impute_prediction_rows(&mut rows);
        let c = &rows[2];
        assert_eq!(c.record.drought_impact, Some(0.0));
        // mean of filled hazards: 3, 0, 0, 0
        assert_eq!(c.record.climate_impact_index, Some(0.75));
        // median of A and B
        assert_eq!(c.hazard_count, Some(4.0));
        assert_eq!(c.impact_3yr_avg, Some(3.0));
        assert!(rows.iter().all(|r| complete_features(r).is_some()));
    }

    #[test]
    fn imputed_hazard_count_keeps_fractional_median() {
        let mut a = rec("A", 2020, Some(1.0));
        a.hazard_count = Some(2);
        let mut b = rec("B", 2020, Some(1.0));
        b.hazard_count = Some(3);
        let mut c = rec("C", 2020, Some(1.0));
        c.hazard_count = None;
        let mut rows = build_features(&[a, b, c], 2023);
        impute_prediction_rows(&mut rows);
        assert_eq!(rows[2].feature(Feature::HazardCount), Some(2.5));
        assert_eq!(rows[0].feature(Feature::HazardCount), Some(2.0));
    }

    #[test]
    fn training_matrix_needs_target_and_features() {
        let mut input: Vec<CountryPeriodRecord> = (2019..=2025).map(|y| rec("A", y, Some(y as f64 - 2019.0))).collect();
        input[2].flood_impact = None;
        let rows = build_features(&input, 2023);
        let (x, y) = training_matrix(&rows, 2023);
        // 2019..=2023 minus the row with a missing hazard
        assert_eq!(x.len(), 4);
        assert_eq!(y, vec![2.0, 3.0, 5.0, 6.0]);
        assert!(x.iter().all(|r| r.len() == Feature::ALL.len()));
    }
}
