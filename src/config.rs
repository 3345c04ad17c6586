use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path;

pub const GDSC1_FITTED_DOSE_RESPONSE_URL: &str = "https://cog.sanger.ac.uk/cancerrxgene/GDSC_release8.5/GDSC1_fitted_dose_response_27Oct23.csv";
pub const GDSC2_FITTED_DOSE_RESPONSE_URL: &str = "https://cog.sanger.ac.uk/cancerrxgene/GDSC_release8.5/GDSC2_fitted_dose_response_27Oct23.csv";
pub const KEGG_REST_URL: &str = "https://rest.kegg.jp";
pub const ENSEMBL_REST_URL: &str = "https://rest.ensembl.org";

/// Settings for merging expression profiles with dose-response measurements.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MergeConfig {
    pub drug_name: String,
    /// URLs or paths, in priority order; the first source wins on duplicate cell lines.
    pub dose_response_sources: Vec<String>,
    /// URL or path of a genes x samples expression matrix.
    pub expression_source: String,
    pub cache_dir: path::PathBuf,
    pub output_path: Option<path::PathBuf>,
    pub drug_column: String,
    pub cell_line_column: String,
    pub response_column: String,
}

impl Default for MergeConfig {
    fn default() -> Self {
        MergeConfig {
            drug_name: String::new(),
            dose_response_sources: vec![GDSC1_FITTED_DOSE_RESPONSE_URL.to_string(), GDSC2_FITTED_DOSE_RESPONSE_URL.to_string()],
            expression_source: String::new(),
            cache_dir: path::PathBuf::from("data"),
            output_path: None,
            drug_column: "DRUG_NAME".to_string(),
            cell_line_column: "CELL_LINE_NAME".to_string(),
            response_column: "LN_IC50".to_string(),
        }
    }
}

impl MergeConfig {
    pub fn resolved_output_path(&self) -> path::PathBuf {
        self.output_path.clone().unwrap_or_else(|| path::PathBuf::from(merged_file_name(&self.drug_name)))
    }
}

/// Settings for subsetting a merged table to the genes of one pathway.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SubsetConfig {
    pub drug_name: String,
    pub pathway_id: String,
    /// Merged table; defaults to `<drug>_GEx_IC50.csv`.
    pub input_path: Option<path::PathBuf>,
    pub output_path: Option<path::PathBuf>,
    pub response_column: String,
    /// Local KEGG flat file used instead of the KEGG REST service.
    pub pathway_file: Option<path::PathBuf>,
    /// Local symbol -> identifier table used instead of the Ensembl REST service.
    pub gene_mapping_file: Option<path::PathBuf>,
    pub kegg_url: String,
    pub ensembl_url: String,
    pub species: String,
}

impl Default for SubsetConfig {
    fn default() -> Self {
        SubsetConfig {
            drug_name: String::new(),
            pathway_id: String::new(),
            input_path: None,
            output_path: None,
            response_column: "LN_IC50".to_string(),
            pathway_file: None,
            gene_mapping_file: None,
            kegg_url: KEGG_REST_URL.to_string(),
            ensembl_url: ENSEMBL_REST_URL.to_string(),
            species: "homo_sapiens".to_string(),
        }
    }
}

impl SubsetConfig {
    pub fn resolved_input_path(&self) -> path::PathBuf {
        self.input_path.clone().unwrap_or_else(|| path::PathBuf::from(merged_file_name(&self.drug_name)))
    }

    pub fn resolved_output_path(&self) -> path::PathBuf {
        self.output_path.clone().unwrap_or_else(|| path::PathBuf::from(subset_file_name(&self.drug_name, &self.pathway_id)))
    }
}

pub fn merged_file_name(drug_name: &str) -> String {
    format!("{}_GEx_IC50.csv", drug_name)
}

pub fn subset_file_name(drug_name: &str, pathway_id: &str) -> String {
    format!("{}_GEx_{}_subset.csv", drug_name, pathway_id)
}

/// Reads a YAML config file; fields absent from the file keep their defaults.
pub fn load_yaml<T>(config_path: &path::Path) -> Result<T>
where
    T: for<'de> Deserialize<'de>,
{
    let content = fs::read_to_string(config_path)?;
    Ok(serde_yml::from_str(&content)?)
}
