//! Hazard normalizer: turns raw affected/death observations for a single
//! hazard into a per-country-period impact score.
//!
//! The z-scores are fit against the whole aggregated table for the hazard,
//! not per country, so every country's score depends on the global
//! distribution of that hazard.
use crate::config::DatasetConfig;
use crate::types::{HazardImpact, HazardObservation, HazardTotal};
use crate::util::{mean, population_std};
use log::debug;
use std::collections::BTreeMap;

#[derive(Default)]
struct Group {
    affected: Vec<f64>,
    death: Vec<f64>,
    events: usize,
}

/// Group observations by (country, period), dropping rows with neither
/// value. `BTreeMap` keeps the groups sorted by country then period.
fn group_observations(
    observations: &[HazardObservation],
    config: &DatasetConfig,
) -> BTreeMap<(String, i32), Group> {
    let mut groups: BTreeMap<(String, i32), Group> = BTreeMap::new();
    let mut dropped = 0usize;
    for obs in observations {
        if obs.affected.is_none() && obs.death.is_none() {
            dropped += 1;
            continue;
        }
        let period = config.granularity.period_of(obs.year);
        let g = groups.entry((obs.country.clone(), period)).or_default();
        g.events += 1;
        if let Some(a) = obs.affected {
            g.affected.push(a);
        }
        if let Some(d) = obs.death {
            g.death.push(d);
        }
    }
    groups.retain(|_, g| g.events >= config.min_events);
    debug!(
        "grouped {} observations into {} country-periods ({} empty rows dropped)",
        observations.len(),
        groups.len(),
        dropped
    );
    groups
}

/// Fitted mean and scale of one column, with a zero scale replaced by 1.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ZScaler {
    pub mean: f64,
    pub scale: f64,
}

impl ZScaler {
    /// Fit on the present values of `column` using the population standard deviation.
    pub fn fit(column: &[Option<f64>]) -> Option<Self> {
        let present: Vec<f64> = column.iter().flatten().copied().collect();
        let mean = mean(&present)?;
        let std = population_std(&present)?;
        let scale = if std == 0.0 || !std.is_finite() { 1.0 } else { std };
        Some(Self { mean, scale })
    }

    pub fn transform(&self, v: f64) -> f64 {
        (v - self.mean) / self.scale
    }
}

fn log1p_finite(v: Option<f64>) -> Option<f64> {
    v.map(f64::ln_1p).filter(|x| x.is_finite())
}

/// Mean-aggregate one hazard and score it as `z(log1p(affected)) + z(log1p(death))`.
pub fn build_hazard_impact(
    observations: &[HazardObservation],
    config: &DatasetConfig,
) -> Vec<HazardImpact> {
    let groups = group_observations(observations, config);

    let mut keys = Vec::with_capacity(groups.len());
    let mut affected_log = Vec::with_capacity(groups.len());
    let mut death_log = Vec::with_capacity(groups.len());
    for (key, g) in groups {
        affected_log.push(log1p_finite(mean(&g.affected)));
        death_log.push(log1p_finite(mean(&g.death)));
        keys.push((key, g.events));
    }

    let affected_scaler = ZScaler::fit(&affected_log);
    let death_scaler = ZScaler::fit(&death_log);

    keys.into_iter()
        .zip(affected_log.into_iter().zip(death_log))
        .map(|(((country, period), events), (a, d))| {
            let za = a.zip(affected_scaler).map(|(a, s)| s.transform(a));
            let zd = d.zip(death_scaler).map(|(d, s)| s.transform(d));
            HazardImpact {
                country,
                period,
                events,
                impact: za.zip(zd).map(|(za, zd)| za + zd),
            }
        })
        .collect()
}

/// Sum-aggregate one hazard into raw totals. Independent of the impact score.
pub fn build_hazard_totals(
    observations: &[HazardObservation],
    config: &DatasetConfig,
) -> Vec<HazardTotal> {
    group_observations(observations, config)
        .into_iter()
        .map(|((country, period), g)| HazardTotal {
            country,
            period,
            events: g.events,
            total_affected: g.affected.iter().sum(),
            total_deaths: g.death.iter().sum(),
        })
        .collect()
}
