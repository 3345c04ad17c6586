use clap::Parser;
use humantime::format_duration;
use log::{debug, info};
use rusty_pharmaco_io::config::{load_yaml, SubsetConfig};
use rusty_pharmaco_io::error::PrepError;
use rusty_pharmaco_io::subset;
use std::time::Instant;
use std::{error, path};

#[derive(Parser, PartialEq, Debug)]
#[clap(author, version, about = "Subset a merged expression/IC50 table to the genes of one pathway", long_about = None)]
struct Options {
    #[clap(short = 'c', long)]
    config: Option<path::PathBuf>,

    #[clap(short = 'd', long)]
    drug_name: Option<String>,

    /// KEGG pathway identifier, e.g. hsa04115
    #[clap(short = 'p', long)]
    pathway_id: Option<String>,

    #[clap(short = 'i', long)]
    input: Option<path::PathBuf>,

    #[clap(short = 'o', long)]
    output: Option<path::PathBuf>,

    #[clap(long)]
    response_column: Option<String>,

    /// KEGG flat file to read instead of querying the KEGG REST service
    #[clap(long)]
    pathway_file: Option<path::PathBuf>,

    /// symbol -> gene identifier table to use instead of the Ensembl REST service
    #[clap(short = 'm', long)]
    gene_mapping: Option<path::PathBuf>,
}

fn build_config(options: &Options) -> Result<SubsetConfig, PrepError> {
    let mut config: SubsetConfig = match &options.config {
        Some(config_path) => load_yaml(config_path)?,
        None => SubsetConfig::default(),
    };
    if let Some(drug_name) = &options.drug_name {
        config.drug_name = drug_name.clone();
    }
    if let Some(pathway_id) = &options.pathway_id {
        config.pathway_id = pathway_id.clone();
    }
    if let Some(input) = &options.input {
        config.input_path = Some(input.clone());
    }
    if let Some(output) = &options.output {
        config.output_path = Some(output.clone());
    }
    if let Some(response_column) = &options.response_column {
        config.response_column = response_column.clone();
    }
    if let Some(pathway_file) = &options.pathway_file {
        config.pathway_file = Some(pathway_file.clone());
    }
    if let Some(gene_mapping) = &options.gene_mapping {
        config.gene_mapping_file = Some(gene_mapping.clone());
    }
    if config.drug_name.is_empty() || config.pathway_id.is_empty() {
        return Err(PrepError::InvalidInput("a drug name and a pathway identifier are required".to_string()));
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

    let output = subset::run(&config).await?;
    info!("wrote {:?}", output);

    info!("Duration: {}", format_duration(start.elapsed()).to_string());
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use rusty_pharmaco_io::config::MergeConfig;
    use rusty_pharmaco_io::merge;
    use std::fs;

    #[test]
    fn output_name_defaults_from_drug_and_pathway() {
        let options = Options::parse_from(["pathway_subset", "-d", "Cisplatin", "-p", "hsa04115"]);
        let config = build_config(&options).unwrap();
        assert_eq!(config.resolved_input_path(), path::PathBuf::from("Cisplatin_GEx_IC50.csv"));
        assert_eq!(config.resolved_output_path(), path::PathBuf::from("Cisplatin_GEx_hsa04115_subset.csv"));
    }

    #[test]
    fn pathway_is_required() {
        let options = Options::parse_from(["pathway_subset", "-d", "Cisplatin"]);
        assert!(build_config(&options).is_err());
    }

    #[tokio::test]
    async fn subsets_the_table_the_merge_wrote() {
        let dir = tempfile::tempdir().unwrap();
        let gdsc = dir.path().join("GDSC2.csv");
        fs::write(
            &gdsc,
            "DATASET,CELL_LINE_NAME,DRUG_NAME,LN_IC50\nGDSC2,MCF-7,Cisplatin,2.5\nGDSC2,HCT 116,Cisplatin,3.1\nGDSC2,A549,Erlotinib,1.1\n",
        )
        .unwrap();
        let rna = dir.path().join("rna.tsv");
        fs::write(&rna, "gene\tMCF7\tHCT116\nENSG1\t1.0\t2.0\nENSG2\t3.0\t4.0\n").unwrap();
        let merge_config = MergeConfig {
            drug_name: "Cisplatin".into(),
            dose_response_sources: vec![gdsc.to_string_lossy().to_string()],
            expression_source: rna.to_string_lossy().to_string(),
            cache_dir: dir.path().join("cache"),
            output_path: Some(dir.path().join("Cisplatin_GEx_IC50.csv")),
            ..Default::default()
        };
        let merged = merge::run(&merge_config).await.unwrap();

        let pathway_file = dir.path().join("hsa04115.txt");
        fs::write(&pathway_file, "ENTRY       hsa04115                    Pathway\nGENE        1  GENE1; one\n            2  GENE2; two\n///\n").unwrap();
        let mapping_file = dir.path().join("symbols.csv");
        fs::write(&mapping_file, "symbol,gene_id\nGENE1,ENSG2\nGENE2,ENSG9\n").unwrap();
        let output = dir.path().join("Cisplatin_GEx_hsa04115_subset.csv");

        let options = Options::parse_from([
            "pathway_subset",
            "-d",
            "Cisplatin",
            "-p",
            "hsa04115",
            "-i",
            merged.to_str().unwrap(),
            "-o",
            output.to_str().unwrap(),
            "--pathway-file",
            pathway_file.to_str().unwrap(),
            "-m",
            mapping_file.to_str().unwrap(),
        ]);
        let written = subset::run(&build_config(&options).unwrap()).await.unwrap();

        let content = fs::read_to_string(written).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines[0], "ENSG2,LN_IC50");
        assert_eq!(lines.len(), 3);
    }
}
