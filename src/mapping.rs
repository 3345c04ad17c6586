use crate::config::SubsetConfig;
use crate::error::{PrepError, Result};
use crate::{fetch, separator_for};
use itertools::Itertools;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path;

#[derive(Clone, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EnsemblXref {
    pub id: String,
    #[serde(rename = "type")]
    pub xref_type: String,
}

/// Resolves gene symbols to stable gene identifiers.
#[derive(Clone, Debug, PartialEq)]
pub enum IdentifierSource {
    EnsemblRest { base_url: String, species: String },
    /// symbol -> identifier, first row per symbol
    Table(HashMap<String, String>),
}

impl IdentifierSource {
    pub fn from_config(config: &SubsetConfig) -> Result<Self> {
        match &config.gene_mapping_file {
            Some(mapping_file) => Ok(IdentifierSource::Table(read_mapping_table(mapping_file)?)),
            None => Ok(IdentifierSource::EnsemblRest {
                base_url: config.ensembl_url.trim_end_matches('/').to_string(),
                species: config.species.clone(),
            }),
        }
    }

    /// First matching identifier for `symbol`, if any.
    pub async fn lookup(&self, symbol: &str) -> Result<Option<String>> {
        match self {
            IdentifierSource::Table(table) => Ok(table.get(symbol).cloned()),
            IdentifierSource::EnsemblRest { base_url, species } => {
                let url = ensembl_xref_url(base_url, species, symbol)?;
                let body = fetch::fetch_text(url.as_str()).await?;
                let xrefs: Vec<EnsemblXref> = serde_json::from_str(&body)?;
                Ok(first_gene_identifier(&xrefs))
            }
        }
    }
}

/// `<base>/xrefs/symbol/<species>/<symbol>?content-type=application/json` with each path
/// segment percent-encoded.
pub fn ensembl_xref_url(base_url: &str, species: &str, symbol: &str) -> Result<reqwest::Url> {
    let mut url = reqwest::Url::parse(base_url).map_err(|e| PrepError::InvalidInput(format!("Ensembl URL {}: {}", base_url, e)))?;
    url.path_segments_mut()
        .map_err(|_| PrepError::InvalidInput(format!("Ensembl URL {} cannot take a path", base_url)))?
        .pop_if_empty()
        .extend(["xrefs", "symbol", species, symbol]);
    url.query_pairs_mut().append_pair("content-type", "application/json");
    Ok(url)
}

pub fn first_gene_identifier(xrefs: &[EnsemblXref]) -> Option<String> {
    xrefs.iter().find(|x| x.xref_type == "gene").map(|x| x.id.clone())
}

/// Two-column table (symbol, identifier) with a header row. Later rows for a symbol are ignored.
pub fn read_mapping_table(input: &path::Path) -> Result<HashMap<String, String>> {
    if !input.exists() {
        return Err(PrepError::MissingInput(input.to_string_lossy().to_string()));
    }
    let mut rdr = csv::ReaderBuilder::new().has_headers(true).delimiter(separator_for(input)).flexible(true).from_path(input)?;

    let mut table = HashMap::new();
    for result in rdr.records() {
        let record = result?;
        let (Some(symbol), Some(identifier)) = (record.get(0), record.get(1)) else {
            continue;
        };
        let (symbol, identifier) = (symbol.trim(), identifier.trim());
        if symbol.is_empty() || identifier.is_empty() {
            continue;
        }
        table.entry(symbol.to_string()).or_insert_with(|| identifier.to_string());
    }
    debug!("read {} symbol mappings from {:?}", table.len(), input);
    Ok(table)
}

#[derive(Clone, Debug, PartialEq, Default)]
pub struct GeneMapping {
    /// (symbol, identifier) in symbol order
    pub mapped: Vec<(String, String)>,
    pub unmapped: Vec<String>,
}

impl GeneMapping {
    /// Distinct identifiers in symbol order.
    pub fn identifiers(&self) -> Vec<String> {
        self.mapped.iter().map(|(_symbol, identifier)| identifier.clone()).unique().collect_vec()
    }
}

pub async fn map_symbols(source: &IdentifierSource, symbols: &[String]) -> Result<GeneMapping> {
    let mut mapping = GeneMapping::default();
    for symbol in symbols.iter() {
        match source.lookup(symbol).await? {
            Some(identifier) => mapping.mapped.push((symbol.clone(), identifier)),
            None => mapping.unmapped.push(symbol.clone()),
        }
    }

    if mapping.mapped.is_empty() {
        return Err(PrepError::NoIdentifiersMapped(symbols.len()));
    }
    info!("mapped {} of {} symbols to gene identifiers", mapping.mapped.len(), symbols.len());
    if !mapping.unmapped.is_empty() {
        warn!("{} symbols have no gene identifier: {}", mapping.unmapped.len(), mapping.unmapped.iter().join(", "));
    }
    Ok(mapping)
}
