//! Component scorer: four standardized sub-scores and the weighted CLI.
//!
//! Scales are fit once on training-window rows and then applied to every
//! row, historical and prediction alike, so both live on the same scale.
use crate::features::EngineeredRow;
use crate::util::{mean, mean_present, sample_std};
use log::debug;

pub const HUMAN_BURDEN_WEIGHT: f64 = 0.50;
pub const PERSISTENCE_WEIGHT: f64 = 0.25;
pub const CLIMATE_INTENSITY_WEIGHT: f64 = 0.15;
pub const STRUCTURAL_VULNERABILITY_WEIGHT: f64 = 0.10;

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ComponentScores {
    pub human_burden: Option<f64>,
    pub persistence: Option<f64>,
    pub climate_intensity: Option<f64>,
    pub structural_vulnerability: Option<f64>,
    pub cli: Option<f64>,
}

/// Mean and standard deviation of one raw component.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Standardizer {
    pub mean: f64,
    pub std: f64,
}

impl Standardizer {
    /// Fit with the sample standard deviation. A zero or undefined spread
    /// is replaced by 1 so degenerate slices still score (to 0).
    pub fn fit(values: &[f64]) -> Option<Self> {
        let mean = mean(values)?;
        let std = match sample_std(values) {
            Some(s) if s != 0.0 && s.is_finite() => s,
            _ => 1.0,
        };
        Some(Self { mean, std })
    }

    pub fn apply(&self, v: f64) -> f64 {
        (v - self.mean) / self.std
    }
}

fn human_burden_raw(row: &EngineeredRow) -> Option<f64> {
    mean(&[
        row.log_total_affected,
        row.log_total_death,
        row.log_total_affected_3yr_avg,
        row.log_total_death_3yr_avg,
    ])
}

fn persistence_raw(row: &EngineeredRow) -> Option<f64> {
    mean_present([row.impact_3yr_avg, row.impact_lag1])
}

fn climate_intensity_raw(row: &EngineeredRow) -> Option<f64> {
    row.record.climate_impact_index
}

fn structural_raw(row: &EngineeredRow) -> Option<f64> {
    row.country_mean_impact
}

/// Training-window statistics for the four components.
///
/// Built once per run and passed to every call that scores rows.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ComponentScaler {
    pub human_burden: Option<Standardizer>,
    pub persistence: Option<Standardizer>,
    pub climate_intensity: Option<Standardizer>,
    pub structural_vulnerability: Option<Standardizer>,
}

impl ComponentScaler {
    /// Fit on rows with `period <= train_cutoff`.
    pub fn fit(rows: &[EngineeredRow], train_cutoff: i32) -> Self {
        let train: Vec<&EngineeredRow> = rows.iter().filter(|r| r.period() <= train_cutoff).collect();
        let fit_with = |f: fn(&EngineeredRow) -> Option<f64>| {
            let values: Vec<f64> = train.iter().filter_map(|r| f(r)).collect();
            Standardizer::fit(&values)
        };
        let scaler = Self {
            human_burden: fit_with(human_burden_raw),
            persistence: fit_with(persistence_raw),
            climate_intensity: fit_with(climate_intensity_raw),
            structural_vulnerability: fit_with(structural_raw),
        };
        debug!("component scaler fit on {} training rows: {:?}", train.len(), scaler);
        scaler
    }

    pub fn score(&self, row: &EngineeredRow) -> ComponentScores {
        let standardize = |s: Option<Standardizer>, raw: Option<f64>| s.zip(raw).map(|(s, v)| s.apply(v));
        let human_burden = standardize(self.human_burden, human_burden_raw(row));
        let persistence = standardize(self.persistence, persistence_raw(row));
        let climate_intensity = standardize(self.climate_intensity, climate_intensity_raw(row));
        let structural_vulnerability = standardize(self.structural_vulnerability, structural_raw(row));
        let cli = match (human_burden, persistence, climate_intensity, structural_vulnerability) {
            (Some(h), Some(p), Some(c), Some(s)) => Some(
                HUMAN_BURDEN_WEIGHT * h
                    + PERSISTENCE_WEIGHT * p
                    + CLIMATE_INTENSITY_WEIGHT * c
                    + STRUCTURAL_VULNERABILITY_WEIGHT * s,
            ),
            _ => None,
        };
        ComponentScores {
            human_burden,
            persistence,
            climate_intensity,
            structural_vulnerability,
            cli,
        }
    }

    /// Recompute `scores` on every row in place.
    pub fn apply(&self, rows: &mut [EngineeredRow]) {
        for row in rows.iter_mut() {
            row.scores = self.score(row);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::build_features;
    use crate::types::CountryPeriodRecord;
    use approx::assert_relative_eq;

    fn rec(country: &str, period: i32, index: f64, affected: f64) -> CountryPeriodRecord {
        let mut r = CountryPeriodRecord::empty(country, period);
        r.flood_impact = Some(index);
        r.climate_impact_index = Some(index);
        r.impact_rebased = Some(index);
        r.hazard_count = Some(1);
        r.total_affected = Some(affected);
        r.total_deaths = Some(0.0);
        r
    }

    #[test]
    fn zero_variance_scores_zero() {
        let s = Standardizer::fit(&[4.0, 4.0, 4.0]).unwrap();
        assert_eq!(s.std, 1.0);
        assert_eq!(s.apply(4.0), 0.0);
        let single = Standardizer::fit(&[2.5]).unwrap();
        assert_eq!(single.std, 1.0);
    }

    #[test]
    fn identical_rows_have_zero_cli() {
        let input: Vec<CountryPeriodRecord> = ["A", "B", "C"].iter().map(|c| rec(c, 2020, 1.0, 10.0)).collect();
        let mut rows = build_features(&input, 2023);
        let scaler = ComponentScaler::fit(&rows, 2023);
        scaler.apply(&mut rows);
        for r in &rows {
            assert_relative_eq!(r.scores.cli.unwrap(), 0.0, epsilon = 1e-12);
            assert_relative_eq!(r.scores.human_burden.unwrap(), 0.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn prediction_rows_reuse_training_scale() {
        let input = vec![
            rec("A", 2020, 0.0, 0.0),
            rec("B", 2020, 2.0, 0.0),
            rec("C", 2025, 10.0, 0.0),
        ];
        let mut rows = build_features(&input, 2023);
        let scaler = ComponentScaler::fit(&rows, 2023);
        let ci = scaler.climate_intensity.unwrap();
        assert_relative_eq!(ci.mean, 1.0);
        assert_relative_eq!(ci.std, 2f64.sqrt());
        scaler.apply(&mut rows);
        let c = rows.iter().find(|r| r.country() == "C").unwrap();
        assert_relative_eq!(c.scores.climate_intensity.unwrap(), 9.0 / 2f64.sqrt());
    }

    #[test]
    fn cli_is_weighted_sum() {
        let input = vec![rec("A", 2020, 0.0, 0.0), rec("B", 2020, 2.0, 1000.0)];
        let mut rows = build_features(&input, 2023);
        ComponentScaler::fit(&rows, 2023).apply(&mut rows);
        for r in &rows {
            let s = r.scores;
            let expected = 0.5 * s.human_burden.unwrap()
                + 0.25 * s.persistence.unwrap()
                + 0.15 * s.climate_intensity.unwrap()
                + 0.10 * s.structural_vulnerability.unwrap();
            assert_relative_eq!(s.cli.unwrap(), expected, epsilon = 1e-12);
        }
    }

    #[test]
    fn missing_index_leaves_cli_missing() {
        let mut r = rec("A", 2020, 1.0, 0.0);
        r.climate_impact_index = None;
        let mut rows = build_features(&[r, rec("B", 2020, 1.0, 0.0)], 2023);
        ComponentScaler::fit(&rows, 2023).apply(&mut rows);
        assert_eq!(rows[0].scores.climate_intensity, None);
        assert_eq!(rows[0].scores.cli, None);
        assert!(rows[1].scores.cli.is_some());
    }
}
