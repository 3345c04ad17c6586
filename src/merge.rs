use crate::config::MergeConfig;
use crate::dose_response::{fetch_dose_response, is_administrative};
use crate::error::{PrepError, Result};
use crate::expression::{fetch_expression, SAMPLE_COLUMN};
use crate::normalize::CELL_LINE_KEY;
use crate::write_csv;
use itertools::Itertools;
use log::{debug, info};
use polars::prelude::*;
use std::path;

/// Inner join on `key`; rows without a partner on the other side are dropped.
pub fn inner_join_on_key(left: DataFrame, right: DataFrame, key: &str) -> Result<DataFrame> {
    Ok(left.lazy().join(right.lazy(), [col(key)], [col(key)], JoinArgs::new(JoinType::Inner)).collect()?)
}

/// Joins expression rows to dose-response rows by normalized cell line and projects the result
/// onto the gene columns followed by the response column.
pub fn merge_expression_with_response(expression: DataFrame, dose_response: DataFrame, config: &MergeConfig) -> Result<DataFrame> {
    let response = config.response_column.as_str();
    let non_gene = [SAMPLE_COLUMN, CELL_LINE_KEY, config.cell_line_column.as_str(), response];
    let gene_columns = expression
        .get_column_names_str()
        .into_iter()
        .filter(|name| !non_gene.contains(name) && !is_administrative(name))
        .map(|name| name.to_string())
        .collect_vec();

    let expression_rows = expression.height();
    let dose_response_rows = dose_response.height();
    let joined = inner_join_on_key(expression, dose_response, CELL_LINE_KEY)?;

    info!(
        "matched {} cell lines; {} expression-only and {} dose-response-only cell lines dropped",
        joined.height(),
        expression_rows.saturating_sub(joined.height()),
        dose_response_rows.saturating_sub(joined.height())
    );
    if joined.height() == 0 {
        return Err(PrepError::EmptyJoin);
    }

    let mut selection = gene_columns;
    selection.push(response.to_string());
    debug!("merged table has {} gene columns", selection.len() - 1);
    Ok(joined.select(selection)?)
}

/// Fetches both inputs, merges them and writes `<drug>_GEx_IC50.csv` (or the configured output).
pub async fn run(config: &MergeConfig) -> Result<path::PathBuf> {
    let dose_response = fetch_dose_response(config).await?;
    let expression = fetch_expression(config).await?;
    let mut merged = merge_expression_with_response(expression, dose_response, config)?;

    let output = config.resolved_output_path();
    info!("writing {} x {} merged table to {:?}", merged.height(), merged.width(), output);
    write_csv(&mut merged, &output)?;
    Ok(output)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::column_names;
    use crate::normalize::normalize_key_column;
    use std::fs;

    fn keyed(df: DataFrame, name_column: &str) -> DataFrame {
        normalize_key_column(df, name_column, CELL_LINE_KEY).unwrap()
    }

    #[test]
    fn differently_formatted_names_still_join() {
        let dose_response = keyed(df!("CELL_LINE_NAME" => &["MCF-7", "HCT 116"], "LN_IC50" => &[2.5, 3.1]).unwrap(), "CELL_LINE_NAME");
        let expression = keyed(df!("cell_line" => &["MCF7", "HCT116"], "ENSG1" => &[1.0, 2.0]).unwrap(), "cell_line");

        let merged = merge_expression_with_response(expression, dose_response, &MergeConfig::default()).unwrap();
        assert_eq!(merged.height(), 2);
        assert_eq!(column_names(&merged), vec!["ENSG1", "LN_IC50"]);
    }

    #[test]
    fn unmatched_rows_are_dropped() {
        let dose_response = keyed(df!("CELL_LINE_NAME" => &["MCF-7", "A549"], "LN_IC50" => &[2.5, 4.0]).unwrap(), "CELL_LINE_NAME");
        let expression = keyed(df!("cell_line" => &["MCF7", "T47D"], "ENSG1" => &[1.0, 2.0], "ENSG2" => &[5.0, 6.0]).unwrap(), "cell_line");

        let merged = merge_expression_with_response(expression, dose_response, &MergeConfig::default()).unwrap();
        assert_eq!(merged.shape(), (1, 3));
        let response: Vec<Option<f64>> = merged.column("LN_IC50").unwrap().f64().unwrap().into_iter().collect();
        assert_eq!(response, vec![Some(2.5)]);
    }

    #[test]
    fn no_overlap_is_an_error() {
        let dose_response = keyed(df!("CELL_LINE_NAME" => &["A549"], "LN_IC50" => &[4.0]).unwrap(), "CELL_LINE_NAME");
        let expression = keyed(df!("cell_line" => &["MCF7"], "ENSG1" => &[1.0]).unwrap(), "cell_line");

        let result = merge_expression_with_response(expression, dose_response, &MergeConfig::default());
        assert!(matches!(result, Err(PrepError::EmptyJoin)));
    }

    #[test]
    fn repeated_dose_rows_outnumbering_expression_rows() {
        let dose_response = df!(CELL_LINE_KEY => &["MCF7", "MCF7", "MCF7"], "LN_IC50" => &[2.5, 2.6, 2.7]).unwrap();
        let expression = df!(CELL_LINE_KEY => &["MCF7"], "ENSG1" => &[1.0]).unwrap();

        let merged = merge_expression_with_response(expression, dose_response, &MergeConfig::default()).unwrap();
        assert_eq!(merged.shape(), (3, 2));
    }

    #[test]
    fn join_is_commutative_in_row_content() {
        let x = df!("k" => &["A", "B", "C"], "x" => &[1, 2, 3]).unwrap();
        let y = df!("k" => &["C", "A", "D"], "y" => &[30, 10, 40]).unwrap();

        let xy = inner_join_on_key(x.clone(), y.clone(), "k").unwrap().select(["k", "x", "y"]).unwrap().sort(["k"], SortMultipleOptions::default()).unwrap();
        let yx = inner_join_on_key(y, x, "k").unwrap().select(["k", "x", "y"]).unwrap().sort(["k"], SortMultipleOptions::default()).unwrap();

        assert_eq!(xy.height(), 2);
        assert!(xy.equals(&yx));
    }

    #[tokio::test]
    async fn run_writes_the_merged_csv() {
        let dir = tempfile::tempdir().unwrap();
        let gdsc = dir.path().join("GDSC2.csv");
        fs::write(
            &gdsc,
            "DATASET,CELL_LINE_NAME,DRUG_NAME,LN_IC50,AUC\nGDSC2,MCF-7,Erlotinib,2.5,0.9\nGDSC2,HCT 116,Erlotinib,3.1,0.8\nGDSC2,HCT 116,Cisplatin,1.1,0.8\n",
        )
        .unwrap();
        let rna = dir.path().join("rna.tsv");
        fs::write(&rna, "gene\tMCF7\tHCT116\nENSG1\t1.0\t2.0\nENSG2\t3.0\t4.0\n").unwrap();

        let config = MergeConfig {
            drug_name: "Erlotinib".into(),
            dose_response_sources: vec![gdsc.to_string_lossy().to_string()],
            expression_source: rna.to_string_lossy().to_string(),
            cache_dir: dir.path().join("cache"),
            output_path: Some(dir.path().join("out").join("Erlotinib_GEx_IC50.csv")),
            ..Default::default()
        };

        let output = run(&config).await.unwrap();
        let written = fs::read_to_string(output).unwrap();
        let lines: Vec<&str> = written.lines().collect();
        assert_eq!(lines[0], "ENSG1,ENSG2,LN_IC50");
        assert_eq!(lines.len(), 3);
    }
}
