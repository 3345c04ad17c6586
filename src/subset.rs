use crate::config::SubsetConfig;
use crate::error::{PrepError, Result};
use crate::mapping::{map_symbols, GeneMapping, IdentifierSource};
use crate::pathway::{fetch_pathway_symbols, PathwayGeneSource};
use crate::{column_names, read_table, write_csv};
use itertools::Itertools;
use log::{info, warn};
use std::collections::HashSet;
use std::path;

/// Columns to keep from a merged table for one set of target gene identifiers.
///
/// `kept` and `missing` partition the distinct targets: `kept` follows the table's column
/// order, `missing` follows the target order. `columns` is `kept` followed by the response.
#[derive(Clone, Debug, PartialEq, Default)]
pub struct SubsetPlan {
    pub kept: Vec<String>,
    pub missing: Vec<String>,
    pub columns: Vec<String>,
}

pub fn plan_subset(columns: &[String], targets: &[String], response: &str) -> Result<SubsetPlan> {
    if !columns.iter().any(|c| c == response) {
        return Err(PrepError::MissingColumn {
            column: response.to_string(),
            context: "merged table".to_string(),
        });
    }

    let targets = targets.iter().unique().collect_vec();
    let target_set: HashSet<&str> = targets.iter().map(|a| a.as_str()).collect();
    let gene_columns: HashSet<&str> = columns.iter().map(|a| a.as_str()).filter(|c| *c != response).collect();

    let kept = columns.iter().filter(|c| c.as_str() != response && target_set.contains(c.as_str())).cloned().collect_vec();
    let missing = targets.into_iter().filter(|t| !gene_columns.contains(t.as_str())).cloned().collect_vec();

    let mut selected = kept.clone();
    selected.push(response.to_string());
    Ok(SubsetPlan { kept, missing, columns: selected })
}

pub fn report_discrepancies(pathway_id: &str, plan: &SubsetPlan, mapping: &GeneMapping) {
    info!("{}: keeping {} gene columns", pathway_id, plan.kept.len());
    if !plan.missing.is_empty() {
        warn!(
            "{} pathway gene identifiers are not in the merged table: {}",
            plan.missing.len(),
            plan.missing.iter().join(", ")
        );
    }
    if !mapping.unmapped.is_empty() {
        warn!(
            "{} pathway gene symbols could not be mapped to an identifier: {}",
            mapping.unmapped.len(),
            mapping.unmapped.iter().join(", ")
        );
    }
    if plan.kept.is_empty() {
        warn!("no pathway gene is present in the merged table; only the response column will be written");
    }
}

/// Loads the merged table, resolves the pathway genes, and writes the subset table.
pub async fn run(config: &SubsetConfig) -> Result<path::PathBuf> {
    let input = config.resolved_input_path();
    if !input.exists() {
        return Err(PrepError::MissingInput(input.to_string_lossy().to_string()));
    }
    let merged = read_table(&input, false)?;
    let columns = column_names(&merged);
    if columns.last().map(|a| a.as_str()) != Some(config.response_column.as_str()) {
        warn!("response column {} is not the last column of {:?}", config.response_column, input);
    }

    let pathway_source = PathwayGeneSource::from_config(config);
    let symbols = fetch_pathway_symbols(&pathway_source, &config.pathway_id).await?;

    let identifier_source = IdentifierSource::from_config(config)?;
    let mapping = map_symbols(&identifier_source, &symbols).await?;

    let plan = plan_subset(&columns, &mapping.identifiers(), &config.response_column)?;
    report_discrepancies(&config.pathway_id, &plan, &mapping);

    let mut subset = merged.select(plan.columns)?;
    let output = config.resolved_output_path();
    info!("writing {} x {} subset table to {:?}", subset.height(), subset.width(), output);
    write_csv(&mut subset, &output)?;
    Ok(output)
}

#[cfg(test)]
mod test {
    use super::*;
    use std::fs;

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|a| a.to_string()).collect()
    }

    #[test]
    fn kept_and_missing_partition_the_targets() {
        let columns = strings(&["ENSG1", "ENSG2", "ENSG3", "LN_IC50"]);
        let targets = strings(&["ENSG3", "ENSG9", "ENSG1", "ENSG8", "ENSG1"]);

        let plan = plan_subset(&columns, &targets, "LN_IC50").unwrap();
        assert_eq!(plan.kept, vec!["ENSG1", "ENSG3"]);
        assert_eq!(plan.missing, vec!["ENSG9", "ENSG8"]);
        assert_eq!(plan.columns, vec!["ENSG1", "ENSG3", "LN_IC50"]);

        let distinct: HashSet<&String> = targets.iter().collect();
        assert_eq!(plan.kept.len() + plan.missing.len(), distinct.len());
        assert!(plan.kept.iter().all(|k| !plan.missing.contains(k)));
    }

    #[test]
    fn response_is_always_the_single_trailing_column() {
        let columns = strings(&["ENSG1", "ENSG2", "LN_IC50"]);
        for targets in [strings(&[]), strings(&["ENSG2"]), strings(&["ENSG1", "ENSG2"]), strings(&["LN_IC50", "ENSG7"])] {
            let plan = plan_subset(&columns, &targets, "LN_IC50").unwrap();
            assert_eq!(plan.columns.last().map(|a| a.as_str()), Some("LN_IC50"));
            assert_eq!(plan.columns.iter().filter(|c| c.as_str() == "LN_IC50").count(), 1);
        }
    }

    #[test]
    fn absent_response_column_is_an_error() {
        let columns = strings(&["ENSG1", "ENSG2"]);
        let result = plan_subset(&columns, &strings(&["ENSG1"]), "LN_IC50");
        assert!(matches!(result, Err(PrepError::MissingColumn { column, .. }) if column == "LN_IC50"));
    }

    #[tokio::test]
    async fn unmapped_gene_is_not_reported_as_missing() {
        let dir = tempfile::tempdir().unwrap();
        let merged = dir.path().join("Erlotinib_GEx_IC50.csv");
        fs::write(&merged, "ENSG_GENE1,ENSG_GENE2,RESPONSE\n1.0,2.0,0.5\n3.0,4.0,0.7\n").unwrap();
        let pathway_file = dir.path().join("hsa00001.txt");
        fs::write(
            &pathway_file,
            "ENTRY       hsa00001                    Pathway\nGENE        1  GENE1\n            2  GENE2;desc\n            3  GENE3\n///\n",
        )
        .unwrap();
        let mapping_file = dir.path().join("symbols.csv");
        fs::write(&mapping_file, "symbol,gene_id\nGENE1,ENSG_GENE1\nGENE2,ENSG_GENE2\n").unwrap();

        let config = SubsetConfig {
            drug_name: "Erlotinib".into(),
            pathway_id: "hsa00001".into(),
            input_path: Some(merged),
            output_path: Some(dir.path().join("Erlotinib_GEx_hsa00001_subset.csv")),
            response_column: "RESPONSE".into(),
            pathway_file: Some(pathway_file.clone()),
            gene_mapping_file: Some(mapping_file),
            ..Default::default()
        };

        let symbols = fetch_pathway_symbols(&PathwayGeneSource::KeggFile(pathway_file), "hsa00001").await.unwrap();
        let mapping = map_symbols(&IdentifierSource::from_config(&config).unwrap(), &symbols).await.unwrap();
        let plan = plan_subset(&strings(&["ENSG_GENE1", "ENSG_GENE2", "RESPONSE"]), &mapping.identifiers(), "RESPONSE").unwrap();
        assert!(plan.missing.is_empty());
        assert_eq!(mapping.unmapped, vec!["GENE3"]);

        let output = run(&config).await.unwrap();
        let written = fs::read_to_string(output).unwrap();
        assert_eq!(written.lines().next(), Some("ENSG_GENE1,ENSG_GENE2,RESPONSE"));
        assert_eq!(written.lines().count(), 3);
    }

    #[tokio::test]
    async fn missing_merged_table_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let config = SubsetConfig {
            drug_name: "Erlotinib".into(),
            pathway_id: "hsa04012".into(),
            input_path: Some(dir.path().join("absent.csv")),
            ..Default::default()
        };
        assert!(matches!(run(&config).await, Err(PrepError::MissingInput(_))));
    }
}
