use crate::error::Result;
use crate::pipeline::PipelineOutput;
use crate::ranking::rank_by;
use crate::types::{
    CountryPeriodRecord, DominantHazardRow, Hazard, HazardContributionRow, HazardTotalsRecord,
    HistoricalRankRow, SummaryStats,
};
use crate::util::{mean, mean_present};
use chrono::{SecondsFormat, Utc};
use std::collections::{BTreeMap, HashSet};

/// Most recent period at or before `cutoff` that has any composite index.
pub fn latest_period(records: &[CountryPeriodRecord], cutoff: i32) -> Option<i32> {
    records
        .iter()
        .filter(|r| r.period <= cutoff && r.climate_impact_index.is_some())
        .map(|r| r.period)
        .max()
}

/// Rank one period's countries by composite index, rebased to that
/// period's minimum.
pub fn generate_historical_ranking(records: &[CountryPeriodRecord], period: i32) -> Vec<HistoricalRankRow> {
    let slice: Vec<(&str, f64)> = records
        .iter()
        .filter(|r| r.period == period)
        .filter_map(|r| r.climate_impact_index.map(|v| (r.country.as_str(), v)))
        .collect();
    let Some(floor) = slice.iter().map(|(_, v)| *v).min_by(|a, b| a.total_cmp(b)) else {
        return Vec::new();
    };
    let rebased: Vec<(&str, f64)> = slice.into_iter().map(|(c, v)| (c, v - floor)).collect();

    rank_by(rebased, |(_, v)| *v, |(c, _)| *c)
        .into_iter()
        .map(|((country, impact_rebased), rank, category)| HistoricalRankRow {
            country: country.to_string(),
            period,
            impact_rebased,
            impact_rank: rank,
            risk_category: category.label().to_string(),
            risk_color: category.color().to_string(),
        })
        .collect()
}

/// Label each country by the hazard with the largest mean absolute impact.
pub fn generate_dominant_hazard(records: &[CountryPeriodRecord]) -> Vec<DominantHazardRow> {
    let mut by_country: BTreeMap<&str, Vec<&CountryPeriodRecord>> = BTreeMap::new();
    for r in records {
        by_country.entry(r.country.as_str()).or_default().push(r);
    }

    let mut rows = Vec::new();
    for (country, group) in by_country {
        let means: Vec<Option<f64>> = Hazard::ALL
            .iter()
            .map(|h| mean_present(group.iter().map(|r| r.hazard_impact(*h))).map(f64::abs))
            .collect();
        let mut best: Option<(Hazard, f64)> = None;
        for (h, m) in Hazard::ALL.iter().zip(&means) {
            if let Some(m) = m {
                if best.map_or(true, |(_, b)| *m > b) {
                    best = Some((*h, *m));
                }
            }
        }
        let Some((hazard, _)) = best else {
            continue;
        };
        rows.push(DominantHazardRow {
            country: country.to_string(),
            hazard_prone: hazard.prone_label().to_string(),
            flood_mean_abs: means[0],
            drought_mean_abs: means[1],
            storms_mean_abs: means[2],
            extreme_temp_mean_abs: means[3],
        });
    }
    rows
}

/// Share of each hazard in a country's total affected population.
pub fn generate_hazard_contribution(totals: &[HazardTotalsRecord]) -> Vec<HazardContributionRow> {
    let mut sums: BTreeMap<&str, [f64; 4]> = BTreeMap::new();
    for t in totals {
        let acc = sums.entry(t.country.as_str()).or_insert([0.0; 4]);
        for (slot, h) in acc.iter_mut().zip(Hazard::ALL) {
            *slot += t.affected(h);
        }
    }

    let mut rows = Vec::new();
    for (country, acc) in sums {
        let total: f64 = acc.iter().sum();
        if total <= 0.0 {
            continue;
        }
        for (h, affected) in Hazard::ALL.iter().zip(acc) {
            rows.push(HazardContributionRow {
                country: country.to_string(),
                hazard: h.display_name().to_string(),
                total_affected: affected,
                contribution: affected / total,
            });
        }
    }
    rows
}

pub fn generate_summary(output: &PipelineOutput) -> Result<SummaryStats> {
    let countries: HashSet<&str> = output.records.iter().map(|r| r.country.as_str()).collect();
    let clis: Vec<f64> = output.ranked.iter().map(|r| r.cli).collect();
    let predicted: Vec<f64> = output
        .ranked
        .iter()
        .map(|r| r.predicted_impact_rebased_next)
        .collect();
    Ok(SummaryStats {
        generated_at: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
        total_records: output.records.len(),
        total_countries: countries.len(),
        training_rows: output.outcome.training_rows,
        predicted_countries: output.ranked.len(),
        best_params: serde_json::to_value(output.outcome.search.best_params)?,
        best_cv_r2: output.outcome.search.best_score,
        mean_cli: mean(&clis),
        mean_predicted_impact_rebased: mean(&predicted),
        holdout: output.outcome.holdout,
    })
}
