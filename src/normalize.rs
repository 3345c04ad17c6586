use crate::error::Result;
use itertools::Itertools;
use log::{debug, warn};
use polars::prelude::*;
use std::collections::HashMap;

pub const CELL_LINE_KEY: &str = "cell_line_key";

/// Canonical form of a cell-line name: `-`, ` ` and `/` removed, then uppercased.
///
/// Both sides of a join must go through this function; two spellings of the same
/// cell line that disagree after normalization will not match.
pub fn normalize_cell_line_name(raw: &str) -> String {
    raw.chars().filter(|c| !matches!(c, '-' | ' ' | '/')).collect::<String>().to_uppercase()
}

/// Adds `key_column` holding the normalized form of `source_column`. Null names stay null.
pub fn normalize_key_column(df: DataFrame, source_column: &str, key_column: &str) -> Result<DataFrame> {
    let keys: Vec<Option<String>> = df.column(source_column)?.str()?.into_iter().map(|name| name.map(normalize_cell_line_name)).collect();
    let mut df = df;
    df.with_column(Column::new(key_column.into(), keys))?;
    Ok(df)
}

/// Keeps the first row for each key; later rows that collide are dropped and reported.
/// Rows with a null key are dropped as well.
pub fn keep_first_per_key(df: DataFrame, key_column: &str, name_column: &str) -> Result<DataFrame> {
    let keys = df.column(key_column)?.str()?;
    let names = df.column(name_column)?.str()?;

    let mut first_seen: HashMap<&str, &str> = HashMap::new();
    let mut collisions = vec![];
    let mut mask = Vec::with_capacity(df.height());
    for (key, name) in keys.into_iter().zip(names.into_iter()) {
        match key {
            Some(key) => match first_seen.get(key) {
                Some(kept) => {
                    collisions.push(format!("{} (kept {})", name.unwrap_or_default(), kept));
                    mask.push(false);
                }
                None => {
                    first_seen.insert(key, name.unwrap_or_default());
                    mask.push(true);
                }
            },
            None => mask.push(false),
        }
    }

    if !collisions.is_empty() {
        warn!("{} cell line name(s) collided after normalization, dropped: {}", collisions.len(), collisions.iter().join(", "));
    }

    let mask = BooleanChunked::from_slice("keep".into(), &mask);
    let filtered = df.filter(&mask)?;
    debug!("rows after key deduplication: {} -> {}", df.height(), filtered.height());
    Ok(filtered)
}
