use polars::prelude::PolarsError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PrepError {
    #[error("Polars error: {0}")]
    Polars(#[from] PolarsError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yml::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Input not found: {0}")]
    MissingInput(String),
    #[error("Column '{column}' not found in {context}")]
    MissingColumn { column: String, context: String },
    #[error("No dose-response rows for drug '{0}'")]
    DrugNotFound(String),
    #[error("Pathway '{0}' has no genes")]
    EmptyPathway(String),
    #[error("None of the {0} pathway gene symbols mapped to a gene identifier")]
    NoIdentifiersMapped(usize),
    #[error("Joining expression with dose-response produced no rows")]
    EmptyJoin,
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

pub type Result<T> = std::result::Result<T, PrepError>;
