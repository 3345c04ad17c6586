use clap::Parser;
use humantime::format_duration;
use log::{debug, info};
use rusty_pharmaco_io::config::{load_yaml, MergeConfig};
use rusty_pharmaco_io::error::PrepError;
use rusty_pharmaco_io::merge;
use std::time::Instant;
use std::{error, path};

#[derive(Parser, PartialEq, Debug)]
#[clap(author, version, about = "Merge cell-line expression profiles with IC50 values for one drug", long_about = None)]
struct Options {
    #[clap(short = 'c', long)]
    config: Option<path::PathBuf>,

    #[clap(short = 'd', long)]
    drug_name: Option<String>,

    /// dose-response table URL or path; repeat for each assay, first wins on duplicates
    #[clap(short = 'r', long)]
    dose_response: Option<Vec<String>>,

    /// genes x samples expression matrix URL or path
    #[clap(short = 'e', long)]
    expression: Option<String>,

    #[clap(short = 'o', long)]
    output: Option<path::PathBuf>,

    #[clap(long)]
    cache_dir: Option<path::PathBuf>,

    #[clap(long)]
    response_column: Option<String>,
}

fn build_config(options: &Options) -> Result<MergeConfig, PrepError> {
    let mut config: MergeConfig = match &options.config {
        Some(config_path) => load_yaml(config_path)?,
        None => MergeConfig::default(),
    };
    if let Some(drug_name) = &options.drug_name {
        config.drug_name = drug_name.clone();
    }
    if let Some(dose_response) = &options.dose_response {
        config.dose_response_sources = dose_response.clone();
    }
    if let Some(expression) = &options.expression {
        config.expression_source = expression.clone();
    }
    if let Some(output) = &options.output {
        config.output_path = Some(output.clone());
    }
    if let Some(cache_dir) = &options.cache_dir {
        config.cache_dir = cache_dir.clone();
    }
    if let Some(response_column) = &options.response_column {
        config.response_column = response_column.clone();
    }
    if config.drug_name.is_empty() {
        return Err(PrepError::InvalidInput("a drug name is required".to_string()));
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn error::Error>> {
    let start = Instant::now();
    env_logger::init();

    let options = Options::parse();
    debug!("{:?}", options);

    let config = build_config(&options)?;
    debug!("{:?}", config);

    let output = merge::run(&config).await?;
    info!("wrote {:?}", output);

    info!("Duration: {}", format_duration(start.elapsed()).to_string());
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn flags_override_defaults() {
        let options = Options::parse_from(["merge_gex_ic50", "-d", "Erlotinib", "-r", "a.csv", "-r", "b.csv", "-e", "rna.tsv"]);
        let config = build_config(&options).unwrap();
        assert_eq!(config.drug_name, "Erlotinib");
        assert_eq!(config.dose_response_sources, vec!["a.csv", "b.csv"]);
        assert_eq!(config.expression_source, "rna.tsv");
        assert_eq!(config.resolved_output_path(), path::PathBuf::from("Erlotinib_GEx_IC50.csv"));
    }

    #[test]
    fn drug_name_is_required() {
        let options = Options::parse_from(["merge_gex_ic50", "-e", "rna.tsv"]);
        assert!(build_config(&options).is_err());
    }
}
