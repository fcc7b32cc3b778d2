//! Error types for the climate risk pipeline.

use thiserror::Error;

/// Unified error type for loading, building and scoring.
#[derive(Error, Debug)]
pub enum ImpactError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A required column is absent from an input table header.
    #[error("{path}: missing required column '{column}'")]
    MissingColumn { path: String, column: String },

    /// A cell could not be parsed into the type its column requires.
    #[error("{path}: row {row}, column '{column}': cannot parse '{value}'")]
    InvalidValue {
        path: String,
        row: usize,
        column: String,
        value: String,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    /// No country has a usable row to predict from.
    #[error("No prediction data available")]
    NoPredictionData,

    #[error("Training set is empty after dropping incomplete rows")]
    EmptyTrainingSet,

    /// The hyperparameter search produced no usable model.
    #[error("Model search failed: {0}")]
    ModelSearch(String),
}

impl ImpactError {
    pub fn missing_column(path: impl Into<String>, column: impl Into<String>) -> Self {
        ImpactError::MissingColumn {
            path: path.into(),
            column: column.into(),
        }
    }

    pub fn invalid_value(
        path: impl Into<String>,
        row: usize,
        column: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        ImpactError::InvalidValue {
            path: path.into(),
            row,
            column: column.into(),
            value: value.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ImpactError>;
