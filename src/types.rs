use crate::predictor::HoldoutMetrics;
use serde::{Deserialize, Serialize};
use tabled::Tabled;

/// The four hazard families that make up the composite index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Hazard {
    Flood,
    Drought,
    Storms,
    ExtremeTemp,
}

impl Hazard {
    pub const ALL: [Hazard; 4] = [
        Hazard::Flood,
        Hazard::Drought,
        Hazard::Storms,
        Hazard::ExtremeTemp,
    ];

    /// File stem used for hazard input tables (`flood.csv`, `extreme_temp.csv`, ...).
    pub fn key(self) -> &'static str {
        match self {
            Hazard::Flood => "flood",
            Hazard::Drought => "drought",
            Hazard::Storms => "storms",
            Hazard::ExtremeTemp => "extreme_temp",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            Hazard::Flood => "Floods",
            Hazard::Drought => "Droughts",
            Hazard::Storms => "Storms",
            Hazard::ExtremeTemp => "Extreme Temperature",
        }
    }

    pub fn prone_label(self) -> &'static str {
        match self {
            Hazard::Flood => "Flood-prone",
            Hazard::Drought => "Drought-prone",
            Hazard::Storms => "Storm-prone",
            Hazard::ExtremeTemp => "Extreme-temperature-prone",
        }
    }
}

/// Raw per-hazard, per-country-year record.
#[derive(Debug, Clone, PartialEq)]
pub struct HazardObservation {
    pub country: String,
    pub year: i32,
    pub affected: Option<f64>,
    pub death: Option<f64>,
}

/// Standardized hazard severity for one country-period.
#[derive(Debug, Clone, PartialEq)]
pub struct HazardImpact {
    pub country: String,
    pub period: i32,
    pub events: usize,
    /// `None` when either the affected or the death aggregate is missing.
    pub impact: Option<f64>,
}

/// Summed raw counts for one hazard and country-period.
#[derive(Debug, Clone, PartialEq)]
pub struct HazardTotal {
    pub country: String,
    pub period: i32,
    pub events: usize,
    pub total_affected: f64,
    pub total_deaths: f64,
}

/// Economic damage as a share of GDP, one row per country-year.
#[derive(Debug, Clone, PartialEq)]
pub struct EconomicDamageObservation {
    pub country: String,
    pub year: i32,
    pub flood: Option<f64>,
    pub drought: Option<f64>,
    pub storm: Option<f64>,
    pub extreme_temp: Option<f64>,
}

/// One row of the per-period analysis table; the unit of the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CountryPeriodRecord {
    pub country: String,
    pub period: i32,
    pub flood_impact: Option<f64>,
    pub drought_impact: Option<f64>,
    pub storms_impact: Option<f64>,
    pub extreme_temp_impact: Option<f64>,
    pub climate_impact_index: Option<f64>,
    pub impact_rebased: Option<f64>,
    /// `None` for rows that only exist in the totals or economic tables.
    pub hazard_count: Option<u32>,
    pub total_deaths: Option<f64>,
    pub total_affected: Option<f64>,
    pub resilience_rate: Option<f64>,
    pub resilience_per_100k: Option<f64>,
    pub economic_damage_pct_gdp: Option<f64>,
}

impl CountryPeriodRecord {
    pub fn empty(country: &str, period: i32) -> Self {
        Self {
            country: country.to_string(),
            period,
            flood_impact: None,
            drought_impact: None,
            storms_impact: None,
            extreme_temp_impact: None,
            climate_impact_index: None,
            impact_rebased: None,
            hazard_count: None,
            total_deaths: None,
            total_affected: None,
            resilience_rate: None,
            resilience_per_100k: None,
            economic_damage_pct_gdp: None,
        }
    }

    pub fn hazard_impact(&self, hazard: Hazard) -> Option<f64> {
        match hazard {
            Hazard::Flood => self.flood_impact,
            Hazard::Drought => self.drought_impact,
            Hazard::Storms => self.storms_impact,
            Hazard::ExtremeTemp => self.extreme_temp_impact,
        }
    }

    pub fn set_hazard_impact(&mut self, hazard: Hazard, value: Option<f64>) {
        match hazard {
            Hazard::Flood => self.flood_impact = value,
            Hazard::Drought => self.drought_impact = value,
            Hazard::Storms => self.storms_impact = value,
            Hazard::ExtremeTemp => self.extreme_temp_impact = value,
        }
    }
}

/// Per-hazard summed counts keyed by country-period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HazardTotalsRecord {
    pub country: String,
    pub period: i32,
    pub flood_total_affected: f64,
    pub flood_total_deaths: f64,
    pub drought_total_affected: f64,
    pub drought_total_deaths: f64,
    pub storm_total_affected: f64,
    pub storm_total_deaths: f64,
    pub extreme_temp_total_affected: f64,
    pub extreme_temp_total_deaths: f64,
    pub total_deaths: f64,
    pub total_affected: f64,
}

impl HazardTotalsRecord {
    pub fn affected(&self, hazard: Hazard) -> f64 {
        match hazard {
            Hazard::Flood => self.flood_total_affected,
            Hazard::Drought => self.drought_total_affected,
            Hazard::Storms => self.storm_total_affected,
            Hazard::ExtremeTemp => self.extreme_temp_total_affected,
        }
    }

    pub fn deaths(&self, hazard: Hazard) -> f64 {
        match hazard {
            Hazard::Flood => self.flood_total_deaths,
            Hazard::Drought => self.drought_total_deaths,
            Hazard::Storms => self.storm_total_deaths,
            Hazard::ExtremeTemp => self.extreme_temp_total_deaths,
        }
    }
}

fn display_score(v: &f64) -> String {
    format!("{:.3}", v)
}

fn display_optional(v: &Option<f64>) -> String {
    match v {
        Some(v) => format!("{:.3}", v),
        None => "-".to_string(),
    }
}

fn display_share(v: &f64) -> String {
    format!("{:.1}%", v * 100.0)
}

/// Ranked CLI output for the presentation layer.
#[derive(Debug, Serialize, Tabled, Clone, PartialEq)]
pub struct RankedCountryRow {
    #[serde(rename = "country")]
    #[tabled(rename = "Country")]
    pub country: String,
    #[serde(rename = "period")]
    #[tabled(rename = "Period")]
    pub period: i32,
    #[serde(rename = "predicted_impact_rebased_next")]
    #[tabled(rename = "PredictedImpact", display_with = "display_score")]
    pub predicted_impact_rebased_next: f64,
    #[serde(rename = "CLI")]
    #[tabled(rename = "CLI", display_with = "display_score")]
    pub cli: f64,
    #[serde(rename = "CLI_rank")]
    #[tabled(rename = "Rank")]
    pub cli_rank: usize,
    #[serde(rename = "risk_category")]
    #[tabled(rename = "RiskCategory")]
    pub risk_category: String,
    #[serde(rename = "risk_color")]
    #[tabled(skip)]
    pub risk_color: String,
}

#[derive(Debug, Serialize, Tabled, Clone, PartialEq)]
pub struct FeatureImportanceRow {
    #[tabled(rename = "Feature")]
    pub feature: String,
    #[tabled(rename = "Importance", display_with = "display_score")]
    pub importance: f64,
}

/// Severity ranking of a single historical period.
#[derive(Debug, Serialize, Tabled, Clone, PartialEq)]
pub struct HistoricalRankRow {
    #[tabled(rename = "Country")]
    pub country: String,
    #[tabled(rename = "Period")]
    pub period: i32,
    #[tabled(rename = "ImpactSeverity", display_with = "display_score")]
    pub impact_rebased: f64,
    #[tabled(rename = "Rank")]
    pub impact_rank: usize,
    #[tabled(rename = "RiskCategory")]
    pub risk_category: String,
    #[tabled(skip)]
    pub risk_color: String,
}

#[derive(Debug, Serialize, Tabled, Clone, PartialEq)]
pub struct DominantHazardRow {
    #[tabled(rename = "Country")]
    pub country: String,
    #[tabled(rename = "HazardProne")]
    pub hazard_prone: String,
    #[tabled(rename = "Flood", display_with = "display_optional")]
    pub flood_mean_abs: Option<f64>,
    #[tabled(rename = "Drought", display_with = "display_optional")]
    pub drought_mean_abs: Option<f64>,
    #[tabled(rename = "Storms", display_with = "display_optional")]
    pub storms_mean_abs: Option<f64>,
    #[tabled(rename = "ExtremeTemp", display_with = "display_optional")]
    pub extreme_temp_mean_abs: Option<f64>,
}

#[derive(Debug, Serialize, Tabled, Clone, PartialEq)]
pub struct HazardContributionRow {
    #[tabled(rename = "Country")]
    pub country: String,
    #[tabled(rename = "Hazard")]
    pub hazard: String,
    #[tabled(rename = "TotalAffected", display_with = "display_score")]
    pub total_affected: f64,
    #[tabled(rename = "Contribution", display_with = "display_share")]
    pub contribution: f64,
}

#[derive(Debug, Serialize)]
pub struct SummaryStats {
    pub generated_at: String,
    pub total_records: usize,
    pub total_countries: usize,
    pub training_rows: usize,
    pub predicted_countries: usize,
    pub best_params: serde_json::Value,
    pub best_cv_r2: f64,
    pub mean_cli: Option<f64>,
    pub mean_predicted_impact_rebased: Option<f64>,
    /// Fit on complete rows after the training cutoff, if there are any.
    pub holdout: Option<HoldoutMetrics>,
}
