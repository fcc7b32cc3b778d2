use crate::dataset::DatasetInputs;
use crate::error::{ImpactError, Result};
use crate::types::{
    CountryPeriodRecord, EconomicDamageObservation, Hazard, HazardObservation, HazardTotalsRecord,
};
use crate::util::{parse_f64_cell, parse_i32_cell};
use csv::{Reader, ReaderBuilder, StringRecord, Trim};
use log::{info, warn};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::fs::File;
use std::path::Path;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoadReport {
    pub total_rows: usize,
    pub loaded_rows: usize,
    pub skipped_rows: usize,
}

#[derive(Debug, Deserialize)]
struct RawHazardRow {
    country: Option<String>,
    year: Option<String>,
    affected: Option<String>,
    death: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawEconomicRow {
    country: Option<String>,
    year: Option<String>,
    drought: Option<String>,
    flood: Option<String>,
    storm: Option<String>,
    extreme_temp: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawAnalysisRow {
    country: Option<String>,
    period: Option<String>,
    flood_impact: Option<String>,
    drought_impact: Option<String>,
    storms_impact: Option<String>,
    extreme_temp_impact: Option<String>,
    climate_impact_index: Option<String>,
    impact_rebased: Option<String>,
    hazard_count: Option<String>,
    total_deaths: Option<String>,
    total_affected: Option<String>,
    resilience_rate: Option<String>,
    resilience_per_100k: Option<String>,
    economic_damage_pct_gdp: Option<String>,
}

pub const HAZARD_COLUMNS: &[&str] = &["country", "year", "affected", "death"];
pub const ECONOMIC_COLUMNS: &[&str] = &["country", "year", "drought", "flood", "storm", "extreme_temp"];
pub const ANALYSIS_COLUMNS: &[&str] = &[
    "country",
    "period",
    "flood_impact",
    "drought_impact",
    "storms_impact",
    "extreme_temp_impact",
    "climate_impact_index",
    "impact_rebased",
    "hazard_count",
    "total_deaths",
    "total_affected",
    "resilience_rate",
    "resilience_per_100k",
    "economic_damage_pct_gdp",
];
pub const TOTALS_COLUMNS: &[&str] = &[
    "country",
    "period",
    "flood_total_affected",
    "flood_total_deaths",
    "drought_total_affected",
    "drought_total_deaths",
    "storm_total_affected",
    "storm_total_deaths",
    "extreme_temp_total_affected",
    "extreme_temp_total_deaths",
    "total_deaths",
    "total_affected",
];

/// Open a CSV file and fail fast if any required column is absent.
fn open_checked(path: &Path, required: &[&str]) -> Result<Reader<File>> {
    let mut rdr = ReaderBuilder::new()
        .flexible(true)
        .trim(Trim::Headers)
        .from_path(path)?;
    let headers: StringRecord = rdr.headers()?.clone();
    for col in required {
        if !headers.iter().any(|h| h == *col) {
            return Err(ImpactError::missing_column(path.display().to_string(), *col));
        }
    }
    Ok(rdr)
}

/// Deserialize every row, mapping each through `convert`.
/// `convert` returns `Ok(None)` for rows that should be skipped.
fn read_rows<R, T, F>(path: &Path, required: &[&str], mut convert: F) -> Result<(Vec<T>, LoadReport)>
where
    R: DeserializeOwned,
    F: FnMut(R, &Cell) -> Result<Option<T>>,
{
    let mut rdr = open_checked(path, required)?;
    let mut report = LoadReport::default();
    let mut out = Vec::new();
    for (idx, result) in rdr.deserialize::<R>().enumerate() {
        report.total_rows += 1;
        let raw = result?;
        let cell = Cell {
            path: path.display().to_string(),
            row: idx + 2,
        };
        match convert(raw, &cell)? {
            Some(v) => {
                out.push(v);
                report.loaded_rows += 1;
            }
            None => report.skipped_rows += 1,
        }
    }
    if report.skipped_rows > 0 {
        warn!(
            "{}: skipped {} of {} rows without country or year",
            path.display(),
            report.skipped_rows,
            report.total_rows
        );
    }
    info!("{}: loaded {} rows", path.display(), report.loaded_rows);
    Ok((out, report))
}

/// Location of the row being converted, used in parse errors.
struct Cell {
    path: String,
    row: usize,
}

impl Cell {
    fn f64(&self, column: &str, raw: &Option<String>) -> Result<Option<f64>> {
        parse_f64_cell(raw.as_deref()).map_err(|_| {
            ImpactError::invalid_value(&self.path, self.row, column, raw.clone().unwrap_or_default())
        })
    }

    fn i32(&self, column: &str, raw: &Option<String>) -> Result<Option<i32>> {
        parse_i32_cell(raw.as_deref()).map_err(|_| {
            ImpactError::invalid_value(&self.path, self.row, column, raw.clone().unwrap_or_default())
        })
    }
}

fn clean_country(raw: Option<String>) -> Option<String> {
    raw.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

/// Load one hazard table in the `country,year,affected,death` layout.
pub fn load_hazard_observations(path: impl AsRef<Path>) -> Result<(Vec<HazardObservation>, LoadReport)> {
    read_rows(path.as_ref(), HAZARD_COLUMNS, |row: RawHazardRow, cell| {
        let year = cell.i32("year", &row.year)?;
        let (Some(country), Some(year)) = (clean_country(row.country), year) else {
            return Ok(None);
        };
        Ok(Some(HazardObservation {
            country,
            year,
            affected: cell.f64("affected", &row.affected)?,
            death: cell.f64("death", &row.death)?,
        }))
    })
}

pub fn load_economic_damage(
    path: impl AsRef<Path>,
) -> Result<(Vec<EconomicDamageObservation>, LoadReport)> {
    read_rows(path.as_ref(), ECONOMIC_COLUMNS, |row: RawEconomicRow, cell| {
        let year = cell.i32("year", &row.year)?;
        let (Some(country), Some(year)) = (clean_country(row.country), year) else {
            return Ok(None);
        };
        Ok(Some(EconomicDamageObservation {
            country,
            year,
            flood: cell.f64("flood", &row.flood)?,
            drought: cell.f64("drought", &row.drought)?,
            storm: cell.f64("storm", &row.storm)?,
            extreme_temp: cell.f64("extreme_temp", &row.extreme_temp)?,
        }))
    })
}

/// Load the per-period analysis table consumed by the pipeline.
pub fn load_analysis_table(path: impl AsRef<Path>) -> Result<(Vec<CountryPeriodRecord>, LoadReport)> {
    read_rows(path.as_ref(), ANALYSIS_COLUMNS, |row: RawAnalysisRow, cell| {
        let period = cell.i32("period", &row.period)?;
        let (Some(country), Some(period)) = (clean_country(row.country), period) else {
            return Ok(None);
        };
        let hazard_count = match cell.f64("hazard_count", &row.hazard_count)? {
            Some(v) if v >= 0.0 && v.fract() == 0.0 => Some(v as u32),
            Some(_) => {
                return Err(ImpactError::invalid_value(
                    &cell.path,
                    cell.row,
                    "hazard_count",
                    row.hazard_count.unwrap_or_default(),
                ))
            }
            None => None,
        };
        Ok(Some(CountryPeriodRecord {
            country,
            period,
            flood_impact: cell.f64("flood_impact", &row.flood_impact)?,
            drought_impact: cell.f64("drought_impact", &row.drought_impact)?,
            storms_impact: cell.f64("storms_impact", &row.storms_impact)?,
            extreme_temp_impact: cell.f64("extreme_temp_impact", &row.extreme_temp_impact)?,
            climate_impact_index: cell.f64("climate_impact_index", &row.climate_impact_index)?,
            impact_rebased: cell.f64("impact_rebased", &row.impact_rebased)?,
            hazard_count,
            total_deaths: cell.f64("total_deaths", &row.total_deaths)?,
            total_affected: cell.f64("total_affected", &row.total_affected)?,
            resilience_rate: cell.f64("resilience_rate", &row.resilience_rate)?,
            resilience_per_100k: cell.f64("resilience_per_100k", &row.resilience_per_100k)?,
            economic_damage_pct_gdp: cell
                .f64("economic_damage_pct_gdp", &row.economic_damage_pct_gdp)?,
        }))
    })
}

/// Load the per-hazard totals table. Every count column must be numeric.
pub fn load_hazard_totals(path: impl AsRef<Path>) -> Result<(Vec<HazardTotalsRecord>, LoadReport)> {
    read_rows(path.as_ref(), TOTALS_COLUMNS, |row: HazardTotalsRecord, _| Ok(Some(row)))
}

/// Read a hazard input directory:
///
/// - `per_capita/<hazard>.csv` for each of flood, drought, storms, extreme_temp
/// - `totals/<hazard>.csv` for the raw counts
/// - `economic_damage.csv` (optional)
///
/// Missing hazard files are logged and skipped; at least one per-capita
/// table is required.
pub fn load_hazard_dir(dir: impl AsRef<Path>) -> Result<DatasetInputs> {
    let dir = dir.as_ref();
    let mut inputs = DatasetInputs::default();
    for hazard in Hazard::ALL {
        let file = format!("{}.csv", hazard.key());
        let per_capita = dir.join("per_capita").join(&file);
        if per_capita.exists() {
            let (rows, _) = load_hazard_observations(&per_capita)?;
            inputs.per_capita.insert(hazard, rows);
        } else {
            warn!("no per-capita table for {} at {}", hazard.key(), per_capita.display());
        }
        let totals = dir.join("totals").join(&file);
        if totals.exists() {
            let (rows, _) = load_hazard_observations(&totals)?;
            inputs.totals.insert(hazard, rows);
        } else {
            warn!("no totals table for {} at {}", hazard.key(), totals.display());
        }
    }
    let economic = dir.join("economic_damage.csv");
    if economic.exists() {
        let (rows, _) = load_economic_damage(&economic)?;
        inputs.economic = rows;
    }
    if inputs.per_capita.is_empty() {
        return Err(ImpactError::Config(format!(
            "{}: no per-capita hazard tables found",
            dir.display()
        )));
    }
    Ok(inputs)
}
