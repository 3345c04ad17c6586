use crate::config::MergeConfig;
use crate::error::{PrepError, Result};
use crate::normalize::{keep_first_per_key, normalize_key_column, CELL_LINE_KEY};
use crate::{column_names, fetch, read_table};
use itertools::Itertools;
use log::{debug, info};
use polars::prelude::*;
use std::path;

/// Fitted dose-response metadata that never reaches the merged table.
pub const ADMINISTRATIVE_COLUMNS: [&str; 16] = [
    "DATASET",
    "NLME_RESULT_ID",
    "NLME_CURVE_ID",
    "COSMIC_ID",
    "SANGER_MODEL_ID",
    "TCGA_DESC",
    "DRUG_ID",
    "PUTATIVE_TARGET",
    "PATHWAY_NAME",
    "COMPANY_ID",
    "WEBRELEASE",
    "MIN_CONC",
    "MAX_CONC",
    "AUC",
    "RMSE",
    "Z_SCORE",
];

pub fn is_administrative(column: &str) -> bool {
    ADMINISTRATIVE_COLUMNS.contains(&column)
}

/// Loads every dose-response table as strings, keeps the drug, cell line and response
/// columns and stacks the tables in the given order.
pub fn load_dose_response_tables(paths: &[path::PathBuf], config: &MergeConfig) -> Result<DataFrame> {
    let required = [config.drug_column.as_str(), config.cell_line_column.as_str(), config.response_column.as_str()];

    let mut frames = vec![];
    for input in paths.iter() {
        let df = read_table(input, true)?;
        let header = column_names(&df);

        if let Some(absent) = required.iter().find(|c| !header.iter().any(|h| h.as_str() == **c)) {
            return Err(PrepError::MissingColumn {
                column: absent.to_string(),
                context: input.to_string_lossy().to_string(),
            });
        }

        let ignored = header.iter().filter(|h| !is_administrative(h) && !required.contains(&h.as_str())).collect_vec();
        if !ignored.is_empty() {
            debug!("ignoring unrecognised dose-response columns in {:?}: {:?}", input, ignored);
        }

        info!("{:?}: {} dose-response rows", input, df.height());
        frames.push(df.lazy().select(required.iter().map(|c| col(*c)).collect_vec()));
    }

    if frames.is_empty() {
        return Err(PrepError::InvalidInput("no dose-response sources configured".to_string()));
    }

    Ok(concat(frames, UnionArgs::default())?.collect()?)
}

/// Restricts the stacked table to one drug and returns `[cell line, response, key]`,
/// one row per normalized cell line.
pub fn select_drug(df: DataFrame, config: &MergeConfig) -> Result<DataFrame> {
    let drug_df = df.lazy().filter(col(config.drug_column.as_str()).eq(lit(config.drug_name.as_str()))).collect()?;
    if drug_df.height() == 0 {
        return Err(PrepError::DrugNotFound(config.drug_name.clone()));
    }
    info!("{} dose-response rows for {}", drug_df.height(), config.drug_name);

    let response_df = drug_df
        .lazy()
        .with_column(col(config.response_column.as_str()).cast(DataType::Float64))
        .filter(col(config.response_column.as_str()).is_not_null())
        .select([col(config.cell_line_column.as_str()), col(config.response_column.as_str())])
        .collect()?;

    if response_df.height() == 0 {
        return Err(PrepError::InvalidInput(format!("every {} value for {} is missing", config.response_column, config.drug_name)));
    }

    let keyed = normalize_key_column(response_df, config.cell_line_column.as_str(), CELL_LINE_KEY)?;
    keep_first_per_key(keyed, CELL_LINE_KEY, config.cell_line_column.as_str())
}

pub async fn fetch_dose_response(config: &MergeConfig) -> Result<DataFrame> {
    let mut paths = vec![];
    for source in config.dose_response_sources.iter() {
        paths.push(fetch::fetch_to_cache(source, &config.cache_dir).await?);
    }
    let stacked = load_dose_response_tables(&paths, config)?;
    select_drug(stacked, config)
}

#[cfg(test)]
mod test {
    use super::*;
    use std::fs;

    const GDSC1: &str = "DATASET,NLME_RESULT_ID,COSMIC_ID,CELL_LINE_NAME,DRUG_ID,DRUG_NAME,PUTATIVE_TARGET,LN_IC50,AUC\n\
GDSC1,1,906826,MCF-7,1,Erlotinib,EGFR,2.5,0.9\n\
GDSC1,1,687452,HCT 116,1,Erlotinib,EGFR,3.1,0.8\n\
GDSC1,1,924100,A549,2,Cisplatin,DNA,4.0,0.7\n";

    const GDSC2: &str = "DATASET,NLME_RESULT_ID,COSMIC_ID,CELL_LINE_NAME,DRUG_ID,DRUG_NAME,PUTATIVE_TARGET,LN_IC50,AUC\n\
GDSC2,2,906826,MCF7,1001,Erlotinib,EGFR,1.0,0.5\n\
GDSC2,2,905962,T-47D,1001,Erlotinib,EGFR,NA,0.5\n";

    fn write_sources(dir: &path::Path) -> Vec<path::PathBuf> {
        let gdsc1 = dir.join("GDSC1.csv");
        let gdsc2 = dir.join("GDSC2.csv");
        fs::write(&gdsc1, GDSC1).unwrap();
        fs::write(&gdsc2, GDSC2).unwrap();
        vec![gdsc1, gdsc2]
    }

    fn erlotinib_config() -> MergeConfig {
        MergeConfig {
            drug_name: "Erlotinib".into(),
            ..Default::default()
        }
    }

    #[test]
    fn sources_are_stacked_and_narrowed() {
        let dir = tempfile::tempdir().unwrap();
        let paths = write_sources(dir.path());
        let df = load_dose_response_tables(&paths, &erlotinib_config()).unwrap();
        assert_eq!(df.height(), 5);
        assert_eq!(column_names(&df), vec!["DRUG_NAME", "CELL_LINE_NAME", "LN_IC50"]);
    }

    #[test]
    fn drug_selection_keeps_first_source_on_collision() {
        let dir = tempfile::tempdir().unwrap();
        let paths = write_sources(dir.path());
        let config = erlotinib_config();
        let df = select_drug(load_dose_response_tables(&paths, &config).unwrap(), &config).unwrap();

        // MCF7 from GDSC2 collides with MCF-7 from GDSC1; T-47D has no response
        assert_eq!(df.height(), 2);
        let keys: Vec<Option<&str>> = df.column(CELL_LINE_KEY).unwrap().str().unwrap().into_iter().collect();
        assert_eq!(keys, vec![Some("MCF7"), Some("HCT116")]);
        let responses: Vec<Option<f64>> = df.column("LN_IC50").unwrap().f64().unwrap().into_iter().collect();
        assert_eq!(responses, vec![Some(2.5), Some(3.1)]);
    }

    #[test]
    fn unknown_drug_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let paths = write_sources(dir.path());
        let config = MergeConfig {
            drug_name: "Imaginarib".into(),
            ..Default::default()
        };
        let result = select_drug(load_dose_response_tables(&paths, &config).unwrap(), &config);
        assert!(matches!(result, Err(PrepError::DrugNotFound(drug)) if drug == "Imaginarib"));
    }

    #[test]
    fn missing_response_column_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let paths = write_sources(dir.path());
        let config = MergeConfig {
            drug_name: "Erlotinib".into(),
            response_column: "IC50_UM".into(),
            ..Default::default()
        };
        let result = load_dose_response_tables(&paths, &config);
        assert!(matches!(result, Err(PrepError::MissingColumn { column, .. }) if column == "IC50_UM"));
    }

    #[test]
    fn administrative_columns_are_recognised() {
        assert!(is_administrative("NLME_CURVE_ID"));
        assert!(is_administrative("PATHWAY_NAME"));
        assert!(!is_administrative("LN_IC50"));
    }
}
