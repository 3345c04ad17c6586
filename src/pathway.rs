use crate::config::SubsetConfig;
use crate::error::{PrepError, Result};
use crate::fetch;
use itertools::Itertools;
use log::{debug, info, warn};
use std::{fs, path};

/// Where pathway gene lists come from.
#[derive(Clone, Debug, PartialEq)]
pub enum PathwayGeneSource {
    KeggRest { base_url: String },
    KeggFile(path::PathBuf),
}

impl PathwayGeneSource {
    pub fn from_config(config: &SubsetConfig) -> Self {
        match &config.pathway_file {
            Some(pathway_file) => PathwayGeneSource::KeggFile(pathway_file.clone()),
            None => PathwayGeneSource::KeggRest {
                base_url: config.kegg_url.trim_end_matches('/').to_string(),
            },
        }
    }

    async fn flat_file(&self, pathway_id: &str) -> Result<String> {
        match self {
            PathwayGeneSource::KeggRest { base_url } => fetch::fetch_text(&format!("{}/get/{}", base_url, pathway_id)).await,
            PathwayGeneSource::KeggFile(pathway_file) => {
                if !pathway_file.exists() {
                    return Err(PrepError::MissingInput(pathway_file.to_string_lossy().to_string()));
                }
                Ok(fs::read_to_string(pathway_file)?)
            }
        }
    }

    /// Gene section of the pathway entry as alternating (accession, `symbol; description`) items.
    pub async fn gene_entries(&self, pathway_id: &str) -> Result<Vec<String>> {
        let flat = self.flat_file(pathway_id).await?;
        if let Some(entry) = kegg_entry_id(&flat) {
            if entry != pathway_id {
                warn!("pathway file describes {} but {} was requested", entry, pathway_id);
            }
        }
        Ok(parse_kegg_gene_entries(&flat))
    }
}

fn kegg_entry_id(flat: &str) -> Option<String> {
    flat.lines().find(|line| line.starts_with("ENTRY")).and_then(|line| line.split_whitespace().nth(1)).map(|a| a.to_string())
}

/// Pulls the `GENE` field out of a KEGG flat-file entry. Continuation lines are indented;
/// the field ends at the next line that starts in column 0.
pub fn parse_kegg_gene_entries(flat: &str) -> Vec<String> {
    let mut entries = vec![];
    let mut in_gene_field = false;
    for line in flat.lines() {
        let content = if let Some(rest) = line.strip_prefix("GENE") {
            in_gene_field = true;
            rest
        } else if line.starts_with(char::is_whitespace) && in_gene_field {
            line
        } else {
            in_gene_field = false;
            continue;
        };

        let content = content.trim();
        if content.is_empty() {
            continue;
        }
        match content.split_once(char::is_whitespace) {
            Some((accession, description)) => {
                entries.push(accession.to_string());
                entries.push(description.trim().to_string());
            }
            None => {
                entries.push(content.to_string());
                entries.push(String::new());
            }
        }
    }
    entries
}

/// Every second item of an alternating (accession, annotation) list, reduced to the symbol
/// before the first `;` and deduplicated in first-seen order.
pub fn extract_symbols(entries: &[String]) -> Vec<String> {
    entries
        .iter()
        .skip(1)
        .step_by(2)
        .map(|annotation| annotation.split(';').next().unwrap_or_default().trim().to_string())
        .filter(|symbol| !symbol.is_empty())
        .unique()
        .collect_vec()
}

pub async fn fetch_pathway_symbols(source: &PathwayGeneSource, pathway_id: &str) -> Result<Vec<String>> {
    let entries = source.gene_entries(pathway_id).await?;
    let symbols = extract_symbols(&entries);
    if symbols.is_empty() {
        return Err(PrepError::EmptyPathway(pathway_id.to_string()));
    }
    info!("{}: {} unique gene symbols", pathway_id, symbols.len());
    debug!("symbols: {:?}", symbols);
    Ok(symbols)
}
