//! Per-country temporal features.
//!
//! Every window here is trailing: position `i` only sees periods at or
//! before `i` in the country's own series. Country-level baselines are
//! computed from training-eligible periods only.
use crate::scoring::ComponentScores;
use crate::types::CountryPeriodRecord;
use crate::util::{mean, rolling_mean, rolling_std, rolling_trend};
use log::debug;
use std::collections::HashMap;

pub const ROLLING_AVG_WINDOW: usize = 3;
pub const TREND_WINDOW: usize = 5;
pub const STD_WINDOW: usize = 5;

/// The fixed regression feature set, in model column order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Feature {
    FloodImpact,
    DroughtImpact,
    StormsImpact,
    ExtremeTempImpact,
    ClimateImpactIndex,
    CountryMeanImpact,
    ImpactLag1,
    Impact3yrAvg,
    ImpactTrend5yr,
    ImpactStd5yr,
    CountryRecentDeviation,
    LogTotalAffected,
    LogTotalDeath,
    LogTotalAffected3yrAvg,
    LogTotalDeath3yrAvg,
    AbsoluteImpactTrend,
    HazardCount,
    EconomicDamagePctGdp,
}

impl Feature {
    pub const ALL: [Feature; 18] = [
        Feature::FloodImpact,
        Feature::DroughtImpact,
        Feature::StormsImpact,
        Feature::ExtremeTempImpact,
        Feature::ClimateImpactIndex,
        Feature::CountryMeanImpact,
        Feature::ImpactLag1,
        Feature::Impact3yrAvg,
        Feature::ImpactTrend5yr,
        Feature::ImpactStd5yr,
        Feature::CountryRecentDeviation,
        Feature::LogTotalAffected,
        Feature::LogTotalDeath,
        Feature::LogTotalAffected3yrAvg,
        Feature::LogTotalDeath3yrAvg,
        Feature::AbsoluteImpactTrend,
        Feature::HazardCount,
        Feature::EconomicDamagePctGdp,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Feature::FloodImpact => "flood_impact",
            Feature::DroughtImpact => "drought_impact",
            Feature::StormsImpact => "storms_impact",
            Feature::ExtremeTempImpact => "extreme_temp_impact",
            Feature::ClimateImpactIndex => "climate_impact_index",
            Feature::CountryMeanImpact => "country_mean_impact",
            Feature::ImpactLag1 => "impact_lag1",
            Feature::Impact3yrAvg => "impact_3yr_avg",
            Feature::ImpactTrend5yr => "impact_trend_5yr",
            Feature::ImpactStd5yr => "impact_std_5yr",
            Feature::CountryRecentDeviation => "country_recent_deviation",
            Feature::LogTotalAffected => "log_total_affected",
            Feature::LogTotalDeath => "log_total_death",
            Feature::LogTotalAffected3yrAvg => "log_total_affected_3yr_avg",
            Feature::LogTotalDeath3yrAvg => "log_total_death_3yr_avg",
            Feature::AbsoluteImpactTrend => "absolute_impact_trend",
            Feature::HazardCount => "hazard_count",
            Feature::EconomicDamagePctGdp => "economic_damage_pct_gdp",
        }
    }

    pub fn is_hazard_impact(self) -> bool {
        matches!(
            self,
            Feature::FloodImpact
                | Feature::DroughtImpact
                | Feature::StormsImpact
                | Feature::ExtremeTempImpact
        )
    }
}

/// A country-period record with its derived features and component scores.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineeredRow {
    pub record: CountryPeriodRecord,
    pub country_mean_impact: Option<f64>,
    pub impact_lag1: Option<f64>,
    pub impact_3yr_avg: Option<f64>,
    pub impact_trend_5yr: f64,
    pub impact_std_5yr: f64,
    pub country_long_term_mean: Option<f64>,
    pub country_recent_deviation: Option<f64>,
    pub log_total_affected: f64,
    pub log_total_death: f64,
    pub log_total_affected_3yr_avg: f64,
    pub log_total_death_3yr_avg: f64,
    pub absolute_impact_trend: f64,
    /// Number of hazards with data; kept as a float so an imputed median
    /// (e.g. 2.5) reaches the model unrounded.
    pub hazard_count: Option<f64>,
    /// Next period's `impact_rebased` for the same country; the regression target.
    pub impact_rebased_next: Option<f64>,
    pub scores: ComponentScores,
}

impl EngineeredRow {
    pub fn country(&self) -> &str {
        &self.record.country
    }

    pub fn period(&self) -> i32 {
        self.record.period
    }

    pub fn feature(&self, f: Feature) -> Option<f64> {
        let r = &self.record;
        match f {
            Feature::FloodImpact => r.flood_impact,
            Feature::DroughtImpact => r.drought_impact,
            Feature::StormsImpact => r.storms_impact,
            Feature::ExtremeTempImpact => r.extreme_temp_impact,
            Feature::ClimateImpactIndex => r.climate_impact_index,
            Feature::CountryMeanImpact => self.country_mean_impact,
            Feature::ImpactLag1 => self.impact_lag1,
            Feature::Impact3yrAvg => self.impact_3yr_avg,
            Feature::ImpactTrend5yr => Some(self.impact_trend_5yr),
            Feature::ImpactStd5yr => Some(self.impact_std_5yr),
            Feature::CountryRecentDeviation => self.country_recent_deviation,
            Feature::LogTotalAffected => Some(self.log_total_affected),
            Feature::LogTotalDeath => Some(self.log_total_death),
            Feature::LogTotalAffected3yrAvg => Some(self.log_total_affected_3yr_avg),
            Feature::LogTotalDeath3yrAvg => Some(self.log_total_death_3yr_avg),
            Feature::AbsoluteImpactTrend => Some(self.absolute_impact_trend),
            Feature::HazardCount => self.hazard_count,
            Feature::EconomicDamagePctGdp => r.economic_damage_pct_gdp,
        }
    }

    /// Overwrite a feature value. Used by prediction-row imputation.
    pub fn set_feature(&mut self, f: Feature, v: f64) {
        let r = &mut self.record;
        match f {
            Feature::FloodImpact => r.flood_impact = Some(v),
            Feature::DroughtImpact => r.drought_impact = Some(v),
            Feature::StormsImpact => r.storms_impact = Some(v),
            Feature::ExtremeTempImpact => r.extreme_temp_impact = Some(v),
            Feature::ClimateImpactIndex => r.climate_impact_index = Some(v),
            Feature::CountryMeanImpact => self.country_mean_impact = Some(v),
            Feature::ImpactLag1 => self.impact_lag1 = Some(v),
            Feature::Impact3yrAvg => self.impact_3yr_avg = Some(v),
            Feature::ImpactTrend5yr => self.impact_trend_5yr = v,
            Feature::ImpactStd5yr => self.impact_std_5yr = v,
            Feature::CountryRecentDeviation => self.country_recent_deviation = Some(v),
            Feature::LogTotalAffected => self.log_total_affected = v,
            Feature::LogTotalDeath => self.log_total_death = v,
            Feature::LogTotalAffected3yrAvg => self.log_total_affected_3yr_avg = v,
            Feature::LogTotalDeath3yrAvg => self.log_total_death_3yr_avg = v,
            Feature::AbsoluteImpactTrend => self.absolute_impact_trend = v,
            Feature::HazardCount => self.hazard_count = Some(v),
            Feature::EconomicDamagePctGdp => r.economic_damage_pct_gdp = Some(v),
        }
    }

    /// The full feature vector, `None` where a value is missing.
    pub fn feature_vector(&self) -> Vec<Option<f64>> {
        Feature::ALL.iter().map(|f| self.feature(*f)).collect()
    }
}

/// Per-country means of a column over training-eligible rows, with the
/// global training mean as the fallback for countries never seen there.
struct TrainingBaseline {
    per_country: HashMap<String, f64>,
    global: Option<f64>,
}

impl TrainingBaseline {
    fn fit<F>(records: &[CountryPeriodRecord], train_cutoff: i32, value: F) -> Self
    where
        F: Fn(&CountryPeriodRecord) -> Option<f64>,
    {
        let mut acc: HashMap<String, Vec<f64>> = HashMap::new();
        let mut all = Vec::new();
        for r in records.iter().filter(|r| r.period <= train_cutoff) {
            if let Some(v) = value(r) {
                acc.entry(r.country.clone()).or_default().push(v);
                all.push(v);
            }
        }
        let per_country = acc
            .into_iter()
            .filter_map(|(c, v)| mean(&v).map(|m| (c, m)))
            .collect();
        Self {
            per_country,
            global: mean(&all),
        }
    }

    fn get(&self, country: &str) -> Option<f64> {
        self.per_country.get(country).copied().or(self.global)
    }
}

/// Derive the temporal features for every record.
///
/// Output is sorted by (country, period) regardless of input order.
pub fn build_features(records: &[CountryPeriodRecord], train_cutoff: i32) -> Vec<EngineeredRow> {
    let mut sorted: Vec<CountryPeriodRecord> = records.to_vec();
    sorted.sort_by(|a, b| a.country.cmp(&b.country).then(a.period.cmp(&b.period)));

    let mean_impact = TrainingBaseline::fit(&sorted, train_cutoff, |r| r.impact_rebased);
    let long_term = TrainingBaseline::fit(&sorted, train_cutoff, |r| r.climate_impact_index);

    let mut out = Vec::with_capacity(sorted.len());
    let mut start = 0;
    while start < sorted.len() {
        let country = sorted[start].country.clone();
        let end = sorted[start..]
            .iter()
            .position(|r| r.country != country)
            .map_or(sorted.len(), |p| start + p);
        out.extend(build_country(
            &sorted[start..end],
            mean_impact.get(&country),
            long_term.get(&country),
        ));
        start = end;
    }
    debug!("engineered {} rows", out.len());
    out
}

fn build_country(
    rows: &[CountryPeriodRecord],
    country_mean_impact: Option<f64>,
    country_long_term_mean: Option<f64>,
) -> Vec<EngineeredRow> {
    let index: Vec<Option<f64>> = rows.iter().map(|r| r.climate_impact_index).collect();
    let affected: Vec<Option<f64>> = rows.iter().map(|r| r.total_affected).collect();
    let deaths: Vec<Option<f64>> = rows.iter().map(|r| r.total_deaths).collect();
    let log_affected: Vec<f64> = affected.iter().map(|v| v.unwrap_or(0.0).ln_1p()).collect();

    let impact_3yr = rolling_mean(&index, ROLLING_AVG_WINDOW);
    let impact_trend = rolling_trend(&index, TREND_WINDOW);
    let impact_std = rolling_std(&index, STD_WINDOW);
    let affected_3yr = rolling_mean(&affected, ROLLING_AVG_WINDOW);
    let deaths_3yr = rolling_mean(&deaths, ROLLING_AVG_WINDOW);
    let log_affected_series: Vec<Option<f64>> = log_affected.iter().copied().map(Some).collect();
    let absolute_trend = rolling_trend(&log_affected_series, TREND_WINDOW);

    rows.iter()
        .enumerate()
        .map(|(i, r)| {
            let previous = if i > 0 { rows[i - 1].impact_rebased } else { None };
            let next = rows.get(i + 1).and_then(|n| n.impact_rebased);
            EngineeredRow {
                record: r.clone(),
                country_mean_impact,
                impact_lag1: previous.or(country_mean_impact),
                impact_3yr_avg: impact_3yr[i],
                impact_trend_5yr: impact_trend[i],
                impact_std_5yr: impact_std[i].unwrap_or(0.0),
                country_long_term_mean,
                country_recent_deviation: r
                    .climate_impact_index
                    .zip(country_long_term_mean)
                    .map(|(v, m)| v - m),
                log_total_affected: log_affected[i],
                log_total_death: r.total_deaths.unwrap_or(0.0).ln_1p(),
                log_total_affected_3yr_avg: affected_3yr[i].unwrap_or(0.0).ln_1p(),
                log_total_death_3yr_avg: deaths_3yr[i].unwrap_or(0.0).ln_1p(),
                absolute_impact_trend: absolute_trend[i],
                hazard_count: r.hazard_count.map(f64::from),
                impact_rebased_next: next,
                scores: ComponentScores::default(),
            }
        })
        .collect()
}
