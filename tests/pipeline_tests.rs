use approx::assert_relative_eq;
use climate_risk_index::config::{MaxFeatures, ParamSpace, SearchConfig};
use climate_risk_index::dataset::build_analysis_dataset;
use climate_risk_index::{loader, output, pipeline, reports};
use climate_risk_index::{CountryPeriodRecord, DatasetConfig, Hazard, ImpactError, PipelineConfig};
use std::fmt::Write as _;
use std::path::Path;

const COUNTRIES: [&str; 8] = ["Asia", "Bangladesh", "Chile", "Kenya", "Nepal", "Peru", "Tonga", "World"];
const AGGREGATES: [&str; 2] = ["Asia", "World"];
const REAL_COUNTRIES: usize = COUNTRIES.len() - AGGREGATES.len();

fn tiny_config() -> PipelineConfig {
    PipelineConfig {
        search: SearchConfig {
            n_iter: 3,
            cv_folds: 3,
            seed: 42,
            space: ParamSpace {
                n_estimators: vec![5, 8],
                max_depth: vec![Some(4), None],
                min_samples_split: vec![2],
                min_samples_leaf: vec![1],
                max_features: vec![MaxFeatures::Sqrt],
            },
        },
        ..PipelineConfig::default()
    }
}

fn hazard_csv(hazard: usize, scale: f64) -> String {
    let mut body = String::from("country,year,affected,death\n");
    for (c, country) in COUNTRIES.iter().enumerate() {
        for year in 2008..=2024 {
            let wiggle = ((year as usize * 13 + c * 7 + hazard * 3) % 17) as f64;
            let affected = scale * (100.0 * (c + 1) as f64 + wiggle * 10.0);
            let death = scale * ((c + 1) as f64 + ((year as usize + c + hazard) % 5) as f64);
            writeln!(body, "{},{},{},{}", country, year, affected, death).unwrap();
        }
    }
    body
}

fn write_hazard_dir(dir: &Path) {
    std::fs::create_dir_all(dir.join("per_capita")).unwrap();
    std::fs::create_dir_all(dir.join("totals")).unwrap();
    for (i, hazard) in Hazard::ALL.iter().enumerate() {
        let file = format!("{}.csv", hazard.key());
        std::fs::write(dir.join("per_capita").join(&file), hazard_csv(i, 0.001)).unwrap();
        std::fs::write(dir.join("totals").join(&file), hazard_csv(i, 1.0)).unwrap();
    }
    let mut economic = String::from("country,year,drought,flood,storm,extreme_temp\n");
    for country in COUNTRIES {
        writeln!(economic, "{},2020,0.1,0.3,,0.2", country).unwrap();
    }
    std::fs::write(dir.join("economic_damage.csv"), economic).unwrap();
}

fn built_records(dir: &Path) -> (Vec<CountryPeriodRecord>, Vec<climate_risk_index::HazardTotalsRecord>) {
    write_hazard_dir(dir);
    let inputs = loader::load_hazard_dir(dir).unwrap();
    let dataset = build_analysis_dataset(&inputs, &DatasetConfig::default());
    (dataset.records, dataset.totals)
}

#[test]
fn analysis_table_survives_a_csv_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let (records, totals) = built_records(dir.path());
    assert_eq!(records.len(), COUNTRIES.len() * 17);

    let table = dir.path().join("analysis_table.csv");
    let totals_path = dir.path().join("hazard_totals.csv");
    output::write_csv(&table, &records).unwrap();
    output::write_csv(&totals_path, &totals).unwrap();

    let (reloaded, report) = loader::load_analysis_table(&table).unwrap();
    assert_eq!(report.skipped_rows, 0);
    assert_eq!(reloaded, records);
    let (reloaded_totals, _) = loader::load_hazard_totals(&totals_path).unwrap();
    assert_eq!(reloaded_totals, totals);
}

#[test]
fn rebased_impact_has_zero_floor() {
    let dir = tempfile::tempdir().unwrap();
    let (records, _) = built_records(dir.path());
    let rebased: Vec<f64> = records.iter().filter_map(|r| r.impact_rebased).collect();
    assert!(!rebased.is_empty());
    assert!(rebased.iter().all(|v| *v >= 0.0));
    let floor = rebased.iter().cloned().fold(f64::INFINITY, f64::min);
    assert_eq!(floor, 0.0);

    let chile_2020 = records.iter().find(|r| r.country == "Chile" && r.period == 2020).unwrap();
    assert_relative_eq!(chile_2020.economic_damage_pct_gdp.unwrap(), 0.2);
    let chile_2019 = records.iter().find(|r| r.country == "Chile" && r.period == 2019).unwrap();
    assert_eq!(chile_2019.economic_damage_pct_gdp, Some(0.0));
}

#[test]
fn full_run_is_deterministic() {
    let dir = tempfile::tempdir().unwrap();
    let (records, _) = built_records(dir.path());
    let config = tiny_config();
    let a = pipeline::run(&records, &config).unwrap();
    let b = pipeline::run(&records, &config).unwrap();

    assert_eq!(a.ranked, b.ranked);
    assert_eq!(a.importances, b.importances);
    assert_eq!(a.outcome.search.best_params, b.outcome.search.best_params);
    assert_eq!(a.ranked.len(), REAL_COUNTRIES);
}

#[test]
fn ranked_output_is_dense_and_excludes_aggregates() {
    let dir = tempfile::tempdir().unwrap();
    let (records, totals) = built_records(dir.path());
    let out = pipeline::run(&records, &tiny_config()).unwrap();

    assert!(out.ranked.iter().all(|r| !AGGREGATES.contains(&r.country.as_str())));
    assert!(out.records.iter().all(|r| !AGGREGATES.contains(&r.country.as_str())));
    assert_eq!(out.ranked[0].cli_rank, 1);
    for pair in out.ranked.windows(2) {
        assert!(pair[0].cli >= pair[1].cli);
        let step = pair[1].cli_rank - pair[0].cli_rank;
        assert!(step <= 1);
    }
    assert!(out.ranked.iter().all(|r| r.period == 2024 && r.risk_category == "1-10"));

    let imp: f64 = out.importances.iter().map(|r| r.importance).sum();
    assert_relative_eq!(imp, 1.0, epsilon = 1e-9);
    for pair in out.importances.windows(2) {
        assert!(pair[0].importance >= pair[1].importance);
    }

    let summary = reports::generate_summary(&out).unwrap();
    assert_eq!(summary.predicted_countries, out.ranked.len());
    assert_eq!(summary.total_countries, REAL_COUNTRIES);
    // the only post-cutoff period is each country's last, which has no target
    assert!(summary.holdout.is_none());

    let contribution = reports::generate_hazard_contribution(&totals);
    assert_eq!(contribution.len(), COUNTRIES.len() * 4);
}

#[test]
fn removing_aggregates_keeps_relative_order() {
    let dir = tempfile::tempdir().unwrap();
    let (records, _) = built_records(dir.path());
    let with_world = pipeline::run(&records, &tiny_config()).unwrap();
    let without: Vec<CountryPeriodRecord> = records
        .into_iter()
        .filter(|r| !AGGREGATES.contains(&r.country.as_str()))
        .collect();
    let clean = pipeline::run(&without, &tiny_config()).unwrap();

    let order = |rows: &[climate_risk_index::RankedCountryRow]| -> Vec<String> {
        rows.iter().map(|r| r.country.clone()).collect()
    };
    assert_eq!(order(&with_world.ranked), order(&clean.ranked));
}

#[test]
fn stale_data_reports_no_prediction_data() {
    let dir = tempfile::tempdir().unwrap();
    let (records, _) = built_records(dir.path());
    let stale: Vec<CountryPeriodRecord> = records.into_iter().filter(|r| r.period < 2020).collect();
    let err = pipeline::run(&stale, &tiny_config()).unwrap_err();
    assert!(matches!(err, ImpactError::NoPredictionData));
    assert_eq!(err.to_string(), "No prediction data available");
}
