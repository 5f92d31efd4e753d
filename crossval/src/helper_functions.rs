use std::path::Path;

use anyhow::{Context, Result};
use tracing::warn;

use crate::models::{PredictionRecord, MISSING_FOLD_CHANGE, PRED_TAG};

/// Reads a tab-delimited file into string rows, skipping the first `skip` rows.
///
/// Rows may have varying lengths; the caller decides what to do with short ones.
pub fn read_tsv_rows(path: &Path, skip: usize) -> Result<Vec<Vec<String>>> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(false)
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("cannot open {}", path.display()))?;

    let mut rows = Vec::new();
    for (i, record) in reader.records().enumerate() {
        let record = record.with_context(|| format!("malformed row in {}", path.display()))?;
        if i < skip {
            continue;
        }
        rows.push(record.iter().map(str::to_string).collect());
    }
    Ok(rows)
}

/// Loads a list of gene names from the first column of a tab-delimited file.
pub fn load_gene_names(path: &Path) -> Result<Vec<String>> {
    let rows = read_tsv_rows(path, 0)?;
    Ok(rows
        .into_iter()
        .filter_map(|row| row.into_iter().next())
        .filter(|name| !name.is_empty())
        .collect())
}

/// Parses a solver result file into its prediction rows.
///
/// The header row is skipped; only rows whose second column carries the
/// `pred:` tag are kept. A `not-found` fold change becomes `None`.
pub fn load_predictions(path: &Path) -> Result<Vec<PredictionRecord>> {
    let rows = read_tsv_rows(path, 1)?;
    let mut records = Vec::new();
    for row in rows {
        if row.len() < 2 {
            continue;
        }
        let Some(label) = row[1].strip_prefix(PRED_TAG) else {
            continue;
        };
        let fold_change = match row.get(2).map(String::as_str) {
            None | Some(MISSING_FOLD_CHANGE) | Some("") => None,
            Some(raw) => match raw.parse::<f64>() {
                Ok(v) => Some(v),
                Err(_) => {
                    warn!(
                        "unreadable fold change '{}' for gene '{}' in {}",
                        raw,
                        row[0],
                        path.display()
                    );
                    None
                }
            },
        };
        records.push(PredictionRecord {
            gene: row[0].clone(),
            label: label.to_string(),
            fold_change,
        });
    }
    Ok(records)
}
