//! End-to-end run: analysis table in, ranked CLI table out.
use crate::config::PipelineConfig;
use crate::error::Result;
use crate::features::{build_features, EngineeredRow};
use crate::predictor::{train_and_predict, PredictionOutcome, PredictionRow};
use crate::ranking::{rank_by, EntityFilter};
use crate::scoring::ComponentScaler;
use crate::types::{CountryPeriodRecord, FeatureImportanceRow, RankedCountryRow};
use log::info;

#[derive(Debug, Clone)]
pub struct PipelineOutput {
    /// Input records minus excluded entities, sorted by (country, period).
    pub records: Vec<CountryPeriodRecord>,
    /// Every historical row with features and training-scale scores.
    pub rows: Vec<EngineeredRow>,
    pub scaler: ComponentScaler,
    pub outcome: PredictionOutcome,
    /// Prediction rows ordered by CLI rank.
    pub ranked: Vec<RankedCountryRow>,
    pub importances: Vec<FeatureImportanceRow>,
}

/// Drop prediction rows without a CLI and rank the rest by descending CLI.
pub fn rank_predictions(predictions: &[PredictionRow], filter: &EntityFilter) -> Vec<RankedCountryRow> {
    let mut scored: Vec<(&PredictionRow, f64)> = predictions
        .iter()
        .filter_map(|p| p.row.scores.cli.map(|cli| (p, cli)))
        .collect();
    let excluded = filter.retain(&mut scored, |(p, _)| p.row.country());
    if excluded > 0 {
        info!("dropped {} aggregate rows before ranking", excluded);
    }
    rank_by(scored, |(_, cli)| *cli, |(p, _)| p.row.country())
        .into_iter()
        .map(|((p, cli), rank, category)| RankedCountryRow {
            country: p.row.country().to_string(),
            period: p.row.period(),
            predicted_impact_rebased_next: p.predicted_impact_rebased_next,
            cli,
            cli_rank: rank,
            risk_category: category.label().to_string(),
            risk_color: category.color().to_string(),
        })
        .collect()
}

/// Run feature building, scoring, model search and ranking over `records`.
///
/// Component scales come from the training window only and are reused on
/// the prediction rows, so their CLI is comparable with the history.
pub fn run(records: &[CountryPeriodRecord], config: &PipelineConfig) -> Result<PipelineOutput> {
    config.validate()?;
    let filter = EntityFilter::new(config.excluded_entities.iter().cloned());

    let mut records: Vec<CountryPeriodRecord> = records.to_vec();
    let excluded = filter.retain(&mut records, |r| r.country.as_str());
    records.sort_by(|a, b| (a.country.as_str(), a.period).cmp(&(b.country.as_str(), b.period)));
    info!(
        "pipeline input: {} records ({} aggregate rows excluded)",
        records.len(),
        excluded
    );

    let mut rows = build_features(&records, config.train_cutoff);
    let scaler = ComponentScaler::fit(&rows, config.train_cutoff);
    scaler.apply(&mut rows);

    let mut outcome = train_and_predict(&rows, config)?;
    for p in outcome.predictions.iter_mut() {
        p.row.scores = scaler.score(&p.row);
    }

    let ranked = rank_predictions(&outcome.predictions, &filter);
    info!(
        "ranked {} of {} predicted countries",
        ranked.len(),
        outcome.predictions.len()
    );

    let importances = outcome
        .importances
        .iter()
        .map(|(feature, importance)| FeatureImportanceRow {
            feature: feature.name().to_string(),
            importance: *importance,
        })
        .collect();

    Ok(PipelineOutput {
        records,
        rows,
        scaler,
        outcome,
        ranked,
        importances,
    })
}
