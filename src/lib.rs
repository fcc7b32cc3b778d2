//! Country-level climate impact scoring, forecasting and risk ranking.
pub mod config;
pub mod dataset;
pub mod error;
pub mod features;
pub mod hazard;
pub mod loader;
pub mod model;
pub mod output;
pub mod pipeline;
pub mod predictor;
pub mod ranking;
pub mod reports;
pub mod scoring;
pub mod types;
pub mod util;

pub use config::{DatasetConfig, PeriodGranularity, PipelineConfig, SearchConfig};
pub use error::{ImpactError, Result};
pub use pipeline::{run, PipelineOutput};
pub use ranking::{dense_rank_desc, EntityFilter, RiskCategory};
pub use types::{CountryPeriodRecord, Hazard, HazardTotalsRecord, RankedCountryRow};
