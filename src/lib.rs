extern crate env_logger;
extern crate log;

pub mod config;
pub mod dose_response;
pub mod error;
pub mod expression;
pub mod fetch;
pub mod mapping;
pub mod merge;
pub mod normalize;
pub mod pathway;
pub mod regression;
pub mod subset;

use crate::error::Result;
use log::debug;
use polars::prelude::*;
use std::{fs, path};

pub fn separator_for(input: &path::Path) -> u8 {
    match input.extension().and_then(|ext| ext.to_str()).map(|ext| ext.to_ascii_lowercase()) {
        Some(ext) if ext == "tsv" || ext == "txt" || ext == "tab" => b'\t',
        _ => b',',
    }
}

/// Reads a delimited file; with `all_strings` every column is read as a string.
pub fn read_table(input: &path::Path, all_strings: bool) -> Result<DataFrame> {
    let infer_schema_length = if all_strings { Some(0) } else { Some(1000) };
    let parse_options = CsvParseOptions::default().with_separator(separator_for(input)).with_truncate_ragged_lines(true);

    // eager reader; the lazy scan blocks on a runtime of its own and panics under tokio
    let df = CsvReadOptions::default()
        .with_parse_options(parse_options)
        .with_has_header(true)
        .with_infer_schema_length(infer_schema_length)
        .try_into_reader_with_file_path(Some(input.to_path_buf()))?
        .finish()?;
    debug!("Shape of {} is {:?}", input.to_string_lossy(), df.shape());
    Ok(df)
}

pub fn write_csv(df: &mut DataFrame, output: &path::Path) -> Result<()> {
    if let Some(parent_dir) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        debug!("writing output to: {:?}", parent_dir);
        fs::create_dir_all(parent_dir)?;
    }
    let mut file = fs::File::create(output)?;
    CsvWriter::new(&mut file).include_header(true).with_separator(b',').finish(df)?;
    Ok(())
}

pub fn column_names(df: &DataFrame) -> Vec<String> {
    df.get_column_names_str().iter().map(|a| a.to_string()).collect()
}
