use crate::config::MergeConfig;
use crate::error::{PrepError, Result};
use crate::normalize::{keep_first_per_key, normalize_key_column, CELL_LINE_KEY};
use crate::{fetch, separator_for};
use log::{info, warn};
use polars::prelude::*;
use std::collections::HashSet;
use std::path;

pub const SAMPLE_COLUMN: &str = "cell_line";

/// Genes x samples expression values as published; `values[g][s]` is gene `g` in sample `s`.
#[derive(Clone, Debug, PartialEq, Default)]
pub struct ExpressionMatrix {
    pub genes: Vec<String>,
    pub samples: Vec<String>,
    pub values: Vec<Vec<Option<f64>>>,
}

fn parse_expression_value(raw: &str) -> Option<f64> {
    match raw.trim() {
        "" | "NA" | "NaN" | "nan" | "null" => None,
        value => value.parse::<f64>().ok(),
    }
}

/// Reads a matrix whose first column holds gene identifiers and whose header names the samples.
/// Repeated gene rows after the first are skipped.
pub fn read_expression_matrix(input: &path::Path) -> Result<ExpressionMatrix> {
    let mut rdr = csv::ReaderBuilder::new().has_headers(true).delimiter(separator_for(input)).from_path(input)?;

    let samples: Vec<String> = rdr.headers()?.iter().skip(1).map(|a| a.trim().to_string()).collect();
    if samples.is_empty() {
        return Err(PrepError::InvalidInput(format!("{:?} has no sample columns", input)));
    }

    let mut matrix = ExpressionMatrix {
        samples,
        ..Default::default()
    };
    let mut seen = HashSet::new();
    let mut duplicates = 0;
    for result in rdr.records() {
        let record = result?;
        let gene = record.get(0).unwrap_or_default().trim().to_string();
        if gene.is_empty() || !seen.insert(gene.clone()) {
            duplicates += 1;
            continue;
        }
        matrix.values.push(record.iter().skip(1).map(parse_expression_value).collect());
        matrix.genes.push(gene);
    }

    if duplicates > 0 {
        warn!("skipped {} blank or repeated gene rows in {:?}", duplicates, input);
    }
    info!("expression matrix: {} genes x {} samples", matrix.genes.len(), matrix.samples.len());
    Ok(matrix)
}

impl ExpressionMatrix {
    /// Samples x genes frame: `sample_column` followed by one Float64 column per gene.
    pub fn into_samples_by_genes(self, sample_column: &str) -> Result<DataFrame> {
        let mut columns = Vec::with_capacity(self.genes.len() + 1);
        columns.push(Column::new(sample_column.into(), self.samples));
        for (gene, values) in self.genes.into_iter().zip(self.values.into_iter()) {
            columns.push(Column::new(gene.into(), values));
        }
        Ok(DataFrame::new(columns)?)
    }
}

/// Expression table keyed by normalized cell-line name, one row per cell line.
pub fn load_expression_table(input: &path::Path) -> Result<DataFrame> {
    let df = read_expression_matrix(input)?.into_samples_by_genes(SAMPLE_COLUMN)?;
    let keyed = normalize_key_column(df, SAMPLE_COLUMN, CELL_LINE_KEY)?;
    keep_first_per_key(keyed, CELL_LINE_KEY, SAMPLE_COLUMN)
}

pub async fn fetch_expression(config: &MergeConfig) -> Result<DataFrame> {
    if config.expression_source.is_empty() {
        return Err(PrepError::InvalidInput("no expression source configured".to_string()));
    }
    let input = fetch::fetch_to_cache(&config.expression_source, &config.cache_dir).await?;
    load_expression_table(&input)
}
