//! Composite index builder and analysis-table assembly.
//!
//! Joins the four hazard impact tables into one row per country-period,
//! averages them into `climate_impact_index`, rebases against the global
//! minimum and then attaches the human totals, economic damage and the
//! resilience ratios.
use crate::config::DatasetConfig;
use crate::hazard::{build_hazard_impact, build_hazard_totals};
use crate::types::{
    CountryPeriodRecord, EconomicDamageObservation, Hazard, HazardImpact, HazardObservation,
    HazardTotal, HazardTotalsRecord,
};
use crate::util::mean_present;
use log::info;
use std::collections::{BTreeMap, HashMap};

/// Raw inputs for one dataset build. Any hazard may be absent from a map.
#[derive(Debug, Default, Clone)]
pub struct DatasetInputs {
    pub per_capita: HashMap<Hazard, Vec<HazardObservation>>,
    pub totals: HashMap<Hazard, Vec<HazardObservation>>,
    pub economic: Vec<EconomicDamageObservation>,
}

#[derive(Debug, Clone)]
pub struct AnalysisDataset {
    pub records: Vec<CountryPeriodRecord>,
    pub totals: Vec<HazardTotalsRecord>,
}

/// Outer-join per-hazard impacts on (country, period) and derive the
/// composite index, hazard count and rebased impact.
pub fn build_composite_index(
    impacts: &HashMap<Hazard, Vec<HazardImpact>>,
) -> Vec<CountryPeriodRecord> {
    let mut rows: BTreeMap<(String, i32), CountryPeriodRecord> = BTreeMap::new();
    for hazard in Hazard::ALL {
        let Some(table) = impacts.get(&hazard) else {
            continue;
        };
        for h in table {
            let row = rows
                .entry((h.country.clone(), h.period))
                .or_insert_with(|| CountryPeriodRecord::empty(&h.country, h.period));
            row.set_hazard_impact(hazard, h.impact);
        }
    }

    let mut records: Vec<CountryPeriodRecord> = rows.into_values().collect();
    for r in &mut records {
        let values: Vec<Option<f64>> = Hazard::ALL.iter().map(|h| r.hazard_impact(*h)).collect();
        r.hazard_count = Some(values.iter().flatten().count() as u32);
        r.climate_impact_index = mean_present(values);
    }
    rebase_impact(&mut records);
    records
}

/// Set `impact_rebased = climate_impact_index - min(climate_impact_index)`
/// over every row of the table.
pub fn rebase_impact(records: &mut [CountryPeriodRecord]) {
    let min = records
        .iter()
        .filter_map(|r| r.climate_impact_index)
        .fold(f64::INFINITY, f64::min);
    for r in records.iter_mut() {
        r.impact_rebased = if min.is_finite() {
            r.climate_impact_index.map(|v| v - min)
        } else {
            None
        };
    }
}

/// Outer-join per-hazard totals; missing hazards count as zero.
pub fn merge_hazard_totals(totals: &HashMap<Hazard, Vec<HazardTotal>>) -> Vec<HazardTotalsRecord> {
    let mut rows: BTreeMap<(String, i32), HazardTotalsRecord> = BTreeMap::new();
    for hazard in Hazard::ALL {
        let Some(table) = totals.get(&hazard) else {
            continue;
        };
        for t in table {
            let row = rows
                .entry((t.country.clone(), t.period))
                .or_insert_with(|| HazardTotalsRecord {
                    country: t.country.clone(),
                    period: t.period,
                    flood_total_affected: 0.0,
                    flood_total_deaths: 0.0,
                    drought_total_affected: 0.0,
                    drought_total_deaths: 0.0,
                    storm_total_affected: 0.0,
                    storm_total_deaths: 0.0,
                    extreme_temp_total_affected: 0.0,
                    extreme_temp_total_deaths: 0.0,
                    total_deaths: 0.0,
                    total_affected: 0.0,
                });
            match hazard {
                Hazard::Flood => {
                    row.flood_total_affected = t.total_affected;
                    row.flood_total_deaths = t.total_deaths;
                }
                Hazard::Drought => {
                    row.drought_total_affected = t.total_affected;
                    row.drought_total_deaths = t.total_deaths;
                }
                Hazard::Storms => {
                    row.storm_total_affected = t.total_affected;
                    row.storm_total_deaths = t.total_deaths;
                }
                Hazard::ExtremeTemp => {
                    row.extreme_temp_total_affected = t.total_affected;
                    row.extreme_temp_total_deaths = t.total_deaths;
                }
            }
        }
    }
    let mut out: Vec<HazardTotalsRecord> = rows.into_values().collect();
    for r in &mut out {
        r.total_affected = Hazard::ALL.iter().map(|h| r.affected(*h)).sum();
        r.total_deaths = Hazard::ALL.iter().map(|h| r.deaths(*h)).sum();
    }
    out
}

/// Mean economic damage across hazards per country-period, skipping gaps.
pub fn aggregate_economic_damage(
    rows: &[EconomicDamageObservation],
    config: &DatasetConfig,
) -> BTreeMap<(String, i32), f64> {
    let mut acc: BTreeMap<(String, i32), Vec<f64>> = BTreeMap::new();
    for r in rows {
        let period = config.granularity.period_of(r.year);
        let e = acc.entry((r.country.clone(), period)).or_default();
        e.extend([r.drought, r.flood, r.storm, r.extreme_temp].into_iter().flatten());
    }
    acc.into_iter()
        .filter_map(|(k, v)| mean_present(v.into_iter().map(Some)).map(|m| (k, m)))
        .collect()
}

/// Build the full per-period analysis table and the per-hazard totals table.
pub fn build_analysis_dataset(inputs: &DatasetInputs, config: &DatasetConfig) -> AnalysisDataset {
    let impacts: HashMap<Hazard, Vec<HazardImpact>> = inputs
        .per_capita
        .iter()
        .map(|(h, obs)| (*h, build_hazard_impact(obs, config)))
        .collect();
    let composite = build_composite_index(&impacts);
    info!("composite index built for {} country-periods", composite.len());

    let per_hazard_totals: HashMap<Hazard, Vec<HazardTotal>> = inputs
        .totals
        .iter()
        .map(|(h, obs)| (*h, build_hazard_totals(obs, config)))
        .collect();
    let totals = merge_hazard_totals(&per_hazard_totals);
    let economic = aggregate_economic_damage(&inputs.economic, config);

    let mut rows: BTreeMap<(String, i32), CountryPeriodRecord> = composite
        .into_iter()
        .map(|r| ((r.country.clone(), r.period), r))
        .collect();
    for t in &totals {
        let row = rows
            .entry((t.country.clone(), t.period))
            .or_insert_with(|| CountryPeriodRecord::empty(&t.country, t.period));
        row.total_deaths = Some(t.total_deaths);
        row.total_affected = Some(t.total_affected);
    }
    for ((country, period), damage) in &economic {
        let row = rows
            .entry((country.clone(), *period))
            .or_insert_with(|| CountryPeriodRecord::empty(country, *period));
        row.economic_damage_pct_gdp = Some(*damage);
    }

    let mut records: Vec<CountryPeriodRecord> = rows.into_values().collect();
    for r in &mut records {
        let rate = match (r.total_deaths, r.total_affected) {
            (Some(d), Some(a)) if a > 0.0 => d / a,
            _ => 0.0,
        };
        r.resilience_rate = Some(rate);
        r.resilience_per_100k = Some(rate * 100_000.0);
        r.economic_damage_pct_gdp = Some(r.economic_damage_pct_gdp.unwrap_or(0.0));
    }
    info!(
        "analysis dataset: {} rows, {} totals rows, {} economic rows",
        records.len(),
        totals.len(),
        economic.len()
    );
    AnalysisDataset { records, totals }
}
