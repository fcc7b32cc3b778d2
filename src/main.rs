// Entry point and high-level CLI flow.
//
// - `build` assembles the per-period analysis table from hazard CSVs.
// - `predict` runs the full pipeline once and writes every report.
// - `menu` is the interactive loop: [1] loads the tables, [2] generates
//   reports, reusing the pipeline result until new data is loaded.
use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use climate_risk_index::config::{DatasetConfig, PeriodGranularity, PipelineConfig};
use climate_risk_index::dataset::build_analysis_dataset;
use climate_risk_index::pipeline::{self, PipelineOutput};
use climate_risk_index::types::{CountryPeriodRecord, HazardTotalsRecord};
use climate_risk_index::{loader, output, reports, util, EntityFilter};
use log::{info, warn, LevelFilter};
use once_cell::sync::Lazy;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Parser, Debug)]
#[command(name = "climate_risk_index", version, about = "Climate impact index scoring and risk ranking")]
struct Cli {
    /// JSON pipeline configuration; missing keys use defaults
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Assemble the analysis table from per-hazard CSVs
    Build {
        /// Directory with per_capita/, totals/ and economic_damage.csv
        #[arg(long)]
        hazard_dir: PathBuf,
        #[arg(long, default_value = "analysis_table.csv")]
        output: PathBuf,
        #[arg(long, default_value = "hazard_totals.csv")]
        totals_output: PathBuf,
        /// Bucket years into five-year periods
        #[arg(long)]
        five_year: bool,
        #[arg(long, default_value_t = 1)]
        min_events: usize,
    },
    /// Train, predict and write all reports
    Predict {
        #[arg(long, default_value = "analysis_table.csv")]
        data: PathBuf,
        /// Per-hazard totals table, enables the contribution report
        #[arg(long)]
        totals: Option<PathBuf>,
        #[arg(long, default_value = ".")]
        out_dir: PathBuf,
        /// Period for the historical ranking; latest before the cutoff by default
        #[arg(long)]
        period: Option<i32>,
    },
    /// Interactive load / report loop
    Menu {
        #[arg(long, default_value = "analysis_table.csv")]
        data: PathBuf,
        #[arg(long)]
        totals: Option<PathBuf>,
        #[arg(long, default_value = ".")]
        out_dir: PathBuf,
    },
}

// Loaded tables and the last pipeline result, so one session can generate
// reports repeatedly without retraining.
static APP_STATE: Lazy<Mutex<AppState>> = Lazy::new(|| {
    Mutex::new(AppState {
        records: None,
        totals: None,
        result: None,
    })
});

struct AppState {
    records: Option<Vec<CountryPeriodRecord>>,
    totals: Option<Vec<HazardTotalsRecord>>,
    result: Option<Arc<PipelineOutput>>,
}

fn app_state() -> MutexGuard<'static, AppState> {
    APP_STATE.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    env_logger::Builder::from_default_env()
        .filter_level(level)
        .parse_default_env()
        .init();
}

fn load_config(path: Option<&Path>) -> Result<PipelineConfig> {
    match path {
        Some(p) => PipelineConfig::from_json_file(p)
            .with_context(|| format!("failed to read config {}", p.display())),
        None => Ok(PipelineConfig::default()),
    }
}

fn run_build(
    hazard_dir: &Path,
    output_path: &Path,
    totals_output: &Path,
    five_year: bool,
    min_events: usize,
) -> Result<()> {
    let config = DatasetConfig {
        min_events,
        granularity: if five_year {
            PeriodGranularity::FiveYear
        } else {
            PeriodGranularity::Annual
        },
    };
    let inputs = loader::load_hazard_dir(hazard_dir)
        .with_context(|| format!("failed to load hazard tables from {}", hazard_dir.display()))?;
    let dataset = build_analysis_dataset(&inputs, &config);
    output::write_csv(output_path, &dataset.records)
        .with_context(|| format!("failed to write {}", output_path.display()))?;
    output::write_csv(totals_output, &dataset.totals)
        .with_context(|| format!("failed to write {}", totals_output.display()))?;
    println!(
        "Analysis table: {} rows -> {}",
        util::format_int(dataset.records.len()),
        output_path.display()
    );
    println!(
        "Hazard totals: {} rows -> {}",
        util::format_int(dataset.totals.len()),
        totals_output.display()
    );
    Ok(())
}

fn load_tables(
    data: &Path,
    totals: Option<&Path>,
) -> Result<(Vec<CountryPeriodRecord>, Option<Vec<HazardTotalsRecord>>)> {
    let (records, report) = loader::load_analysis_table(data)
        .with_context(|| format!("failed to load {}", data.display()))?;
    println!(
        "Processing dataset... ({} rows read, {} loaded)",
        util::format_int(report.total_rows),
        util::format_int(report.loaded_rows)
    );
    if report.skipped_rows > 0 {
        println!(
            "Note: {} rows skipped for a missing country or period.",
            util::format_int(report.skipped_rows)
        );
    }
    let totals = match totals {
        Some(path) => {
            let (rows, _) = loader::load_hazard_totals(path)
                .with_context(|| format!("failed to load {}", path.display()))?;
            Some(rows)
        }
        None => None,
    };
    Ok((records, totals))
}

/// Write every report for one pipeline result and print previews.
fn write_reports(
    result: &PipelineOutput,
    totals: Option<&[HazardTotalsRecord]>,
    config: &PipelineConfig,
    out_dir: &Path,
    period: Option<i32>,
) -> Result<()> {
    std::fs::create_dir_all(out_dir)
        .with_context(|| format!("failed to create {}", out_dir.display()))?;
    println!("Outputs saved to {}...\n", out_dir.display());

    let file = out_dir.join("cli_predictions.csv");
    output::write_csv(&file, &result.ranked)?;
    output::preview_table(
        "Predicted Climate Impact Index Ranking",
        Some("Dense rank, 1 = most severe"),
        &result.ranked,
        10,
    );
    println!("(Full table exported to {})\n", file.display());

    let file = out_dir.join("feature_importance.csv");
    output::write_csv(&file, &result.importances)?;
    output::preview_table("Top Feature Importances", None, &result.importances, 10);
    println!("(Full table exported to {})\n", file.display());

    match period.or_else(|| reports::latest_period(&result.records, config.train_cutoff)) {
        Some(p) => {
            let rows = reports::generate_historical_ranking(&result.records, p);
            let file = out_dir.join("historical_ranking.csv");
            output::write_csv(&file, &rows)?;
            let note = format!("Period {}", p);
            output::preview_table("Historical Impact Ranking", Some(&note), &rows, 10);
            println!("(Full table exported to {})\n", file.display());
        }
        None => warn!("no period with a composite index; historical ranking skipped"),
    }

    let dominant = reports::generate_dominant_hazard(&result.records);
    let file = out_dir.join("dominant_hazard.csv");
    output::write_csv(&file, &dominant)?;
    output::preview_table("Dominant Hazard by Country", None, &dominant, 5);
    println!("(Full table exported to {})\n", file.display());

    if let Some(totals) = totals {
        let filter = EntityFilter::new(config.excluded_entities.iter().cloned());
        let mut totals = totals.to_vec();
        filter.retain(&mut totals, |t| t.country.as_str());
        let rows = reports::generate_hazard_contribution(&totals);
        let file = out_dir.join("hazard_contribution.csv");
        output::write_csv(&file, &rows)?;
        output::preview_table(
            "Hazard Contribution to Affected Population",
            None,
            &rows,
            8,
        );
        println!("(Full table exported to {})\n", file.display());
    }

    let summary = reports::generate_summary(result)?;
    let file = out_dir.join("summary.json");
    output::write_json(&file, &summary)?;
    println!("Summary Stats ({}):", file.display());
    println!(
        "{{\"predicted_countries\": {}, \"best_cv_r2\": {}}}\n",
        util::format_int(summary.predicted_countries),
        util::format_number(summary.best_cv_r2, 4)
    );
    Ok(())
}

fn run_predict(
    config: &PipelineConfig,
    data: &Path,
    totals: Option<&Path>,
    out_dir: &Path,
    period: Option<i32>,
) -> Result<()> {
    let (records, totals) = load_tables(data, totals)?;
    let result = pipeline::run(&records, config).context("pipeline failed")?;
    write_reports(&result, totals.as_deref(), config, out_dir, period)
}

/// Read a single line of input after printing the common "Enter choice:" prompt.
fn read_choice() -> Option<String> {
    print!("Enter choice: ");
    let _ = io::stdout().flush();
    let mut buf = String::new();
    match io::stdin().read_line(&mut buf) {
        Ok(0) | Err(_) => None,
        Ok(_) => Some(buf.trim().to_string()),
    }
}

/// Returns `true` if the user chose `Y`, `false` on `N` or end of input.
fn prompt_back_to_menu() -> bool {
    loop {
        print!("Back to Report Selection (Y/N): ");
        let _ = io::stdout().flush();
        let mut buf = String::new();
        match io::stdin().read_line(&mut buf) {
            Ok(0) | Err(_) => return false,
            Ok(_) => {}
        }
        match buf.trim().to_uppercase().as_str() {
            "Y" => return true,
            "N" => return false,
            _ => println!("Invalid choice. Please enter Y or N."),
        }
    }
}

/// Option [1]: load the tables and drop any cached result.
fn handle_load(data: &Path, totals: Option<&Path>) {
    match load_tables(data, totals) {
        Ok((records, totals)) => {
            println!();
            let mut state = app_state();
            state.records = Some(records);
            state.totals = totals;
            state.result = None;
        }
        Err(e) => eprintln!("Failed to load file: {:#}\n", e),
    }
}

/// Option [2]: run the pipeline (once per load) and write every report.
fn handle_generate_reports(config: &PipelineConfig, out_dir: &Path) {
    let (records, totals, cached) = {
        let state = app_state();
        (state.records.clone(), state.totals.clone(), state.result.clone())
    };
    let Some(records) = records else {
        println!("Error: No data loaded. Please load the CSV file first (option 1).\n");
        return;
    };

    let result = match cached {
        Some(result) => {
            info!("reusing pipeline result from this session");
            result
        }
        None => {
            println!("Training model and scoring countries...");
            match pipeline::run(&records, config) {
                Ok(result) => {
                    let result = Arc::new(result);
                    app_state().result = Some(Arc::clone(&result));
                    result
                }
                Err(e) => {
                    eprintln!("Pipeline failed: {}\n", e);
                    return;
                }
            }
        }
    };

    if let Err(e) = write_reports(&result, totals.as_deref(), config, out_dir, None) {
        eprintln!("Write error: {:#}", e);
    }
}

fn run_menu(config: &PipelineConfig, data: &Path, totals: Option<&Path>, out_dir: &Path) {
    loop {
        println!("Climate Impact Index");
        println!("[1] Load the file");
        println!("[2] Generate Reports\n");
        let Some(choice) = read_choice() else {
            break;
        };
        match choice.as_str() {
            "1" => handle_load(data, totals),
            "2" => {
                println!();
                handle_generate_reports(config, out_dir);
                if !prompt_back_to_menu() {
                    println!("Exiting the program.");
                    break;
                }
            }
            _ => println!("Invalid choice. Please enter 1 or 2.\n"),
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Command::Build {
            hazard_dir,
            output,
            totals_output,
            five_year,
            min_events,
        } => run_build(&hazard_dir, &output, &totals_output, five_year, min_events),
        Command::Predict {
            data,
            totals,
            out_dir,
            period,
        } => run_predict(&config, &data, totals.as_deref(), &out_dir, period),
        Command::Menu {
            data,
            totals,
            out_dir,
        } => {
            run_menu(&config, &data, totals.as_deref(), &out_dir);
            Ok(())
        }
    }
}
