use std::collections::HashMap;
use std::path::Path;

use anyhow::{bail, Context, Result};

use crate::helper_functions::read_tsv_rows;
use crate::models::PredictionRecord;

/// Lookup table mapping (prediction label, fold-change bucket) to a score.
///
/// The matrix file is tab-delimited: the first row holds the sorted bucket
/// boundaries, each further row a label followed by `len(boundaries) + 1`
/// scores, or by `cpy`/`inv` and the name of an earlier row to copy or
/// reverse.
#[derive(Debug, Clone)]
pub struct ScoreMatrix {
    bounds: Vec<f64>,
    rows: HashMap<String, Vec<f64>>,
}

impl ScoreMatrix {
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = read_tsv_rows(path, 0)?;
        let mut iter = raw.into_iter();
        let mut first = iter
            .next()
            .with_context(|| format!("score matrix {} is empty", path.display()))?;
        // Leading empty cells before the boundary values are tolerated.
        while first.first().is_some_and(|cell| cell.is_empty()) {
            first.remove(0);
        }
        let bounds = first
            .iter()
            .map(|cell| {
                cell.parse::<f64>()
                    .with_context(|| format!("bad boundary '{}' in {}", cell, path.display()))
            })
            .collect::<Result<Vec<_>>>()?;

        let mut rows: HashMap<String, Vec<f64>> = HashMap::new();
        for row in iter {
            if row.is_empty() || row[0].is_empty() {
                continue;
            }
            let label = row[0].clone();
            let scores = if row.len() >= 3 && (row[1] == "cpy" || row[1] == "inv") {
                let source = rows.get(&row[2]).with_context(|| {
                    format!(
                        "row '{}' of {} references unknown row '{}'",
                        label,
                        path.display(),
                        row[2]
                    )
                })?;
                if row[1] == "inv" {
                    source.iter().rev().copied().collect()
                } else {
                    source.clone()
                }
            } else {
                row[1..]
                    .iter()
                    .map(|cell| {
                        cell.parse::<f64>().with_context(|| {
                            format!("bad score '{}' in row '{}' of {}", cell, label, path.display())
                        })
                    })
                    .collect::<Result<Vec<_>>>()?
            };
            rows.insert(label, scores);
        }

        let matrix = ScoreMatrix { bounds, rows };
        matrix.check()?;
        Ok(matrix)
    }

    fn check(&self) -> Result<()> {
        if self.bounds.is_empty() {
            bail!("score matrix must contain boundary values");
        }
        if !self.bounds.windows(2).all(|w| w[0] < w[1]) {
            bail!("score matrix boundaries must be strictly sorted");
        }
        if self.rows.is_empty() {
            bail!("score matrix must contain at least one label row");
        }
        for (label, scores) in &self.rows {
            if scores.len() != self.bounds.len() + 1 {
                bail!(
                    "row '{}' of the score matrix has length {}, but length {} was expected",
                    label,
                    scores.len(),
                    self.bounds.len() + 1
                );
            }
        }
        Ok(())
    }

    /// Bucket index of a fold change: the count of boundaries strictly below
    /// it, so a value equal to a boundary falls into the bucket of values
    /// less than or equal to that boundary.
    pub fn bucket(&self, fold_change: f64) -> usize {
        self.bounds.partition_point(|&b| b < fold_change)
    }

    pub fn score(&self, label: &str, fold_change: f64) -> Option<f64> {
        self.rows
            .get(label)
            .map(|scores| scores[self.bucket(fold_change)])
    }

    /// Sums scores over genes, returning `(sum, scored count)`.
    /// Genes with a label absent from the matrix are silently excluded.
    pub fn score_genes<'a, I>(&self, genes: I) -> (f64, usize)
    where
        I: IntoIterator<Item = (&'a str, f64)>,
    {
        let mut sum = 0.0;
        let mut count = 0;
        for (label, fold_change) in genes {
            if let Some(score) = self.score(label, fold_change) {
                sum += score;
                count += 1;
            }
        }
        (sum, count)
    }

    /// Scores a parsed result file. Rows without a fold change are dropped;
    /// duplicate genes keep their last row. Normalization divides by the
    /// scored-gene count and yields 0 for an empty set.
    pub fn score_records(&self, records: &[PredictionRecord], normalize: bool) -> f64 {
        let mut latest: HashMap<&str, (&str, f64)> = HashMap::new();
        for record in records {
            if let Some(fold_change) = record.fold_change {
                latest.insert(record.gene.as_str(), (record.label.as_str(), fold_change));
            }
        }
        let (sum, count) = self.score_genes(latest.values().copied());
        if normalize {
            if count == 0 {
                0.0
            } else {
                sum / count as f64
            }
        } else {
            sum
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::fs;
    use std::path::PathBuf;
    use tempfile::tempdir;

    fn write_matrix(content: &str) -> (tempfile::TempDir, PathBuf) {
        let dir = tempdir().unwrap();
        let path = dir.path().join("matrix.tsv");
        fs::write(&path, content).unwrap();
        (dir, path)
    }

    fn sample_matrix() -> (tempfile::TempDir, ScoreMatrix) {
        let (dir, path) = write_matrix(
            "10\t20\t30\n\
             +\t1\t2\t3\t4\n\
             -\tinv\t+\n\
             0\tcpy\t+\n",
        );
        let matrix = ScoreMatrix::from_file(&path).unwrap();
        (dir, matrix)
    }

    #[test]
    fn bucket_lookup_is_monotonic() {
        let (_dir, matrix) = sample_matrix();
        assert_eq!(matrix.bucket(9.0), 0);
        assert_eq!(matrix.bucket(10.0), 0);
        assert_eq!(matrix.bucket(15.0), 1);
        assert_eq!(matrix.bucket(20.0), 1);
        assert_eq!(matrix.bucket(30.0), 2);
        assert_eq!(matrix.bucket(31.0), 3);
    }

    #[test]
    fn inv_rows_reverse_and_cpy_rows_copy() {
        let (_dir, matrix) = sample_matrix();
        assert_relative_eq!(matrix.score("-", 9.0).unwrap(), 4.0);
        assert_relative_eq!(matrix.score("-", 31.0).unwrap(), 1.0);
        assert_relative_eq!(matrix.score("0", 15.0).unwrap(), 2.0);
    }

    #[test]
    fn leading_empty_cells_before_bounds_are_ignored() {
        let (_dir, path) = write_matrix("\t\t10\t20\n+\t1\t2\t3\n");
        let matrix = ScoreMatrix::from_file(&path).unwrap();
        assert_eq!(matrix.bucket(15.0), 1);
    }

    #[test]
    fn wrong_row_length_is_rejected() {
        let (_dir, path) = write_matrix("10\t20\t30\n+\t1\t2\t3\n");
        assert!(ScoreMatrix::from_file(&path).is_err());
    }

    #[test]
    fn unsorted_or_duplicated_bounds_are_rejected() {
        let (_dir, path) = write_matrix("30\t20\t10\n+\t1\t2\t3\t4\n");
        assert!(ScoreMatrix::from_file(&path).is_err());
        let (_dir, path) = write_matrix("10\t10\t30\n+\t1\t2\t3\t4\n");
        assert!(ScoreMatrix::from_file(&path).is_err());
    }

    #[test]
    fn unknown_labels_are_excluded() {
        let (_dir, matrix) = sample_matrix();
        let (sum, count) = matrix.score_genes([("+", 15.0), ("CHANGE", 15.0)]);
        assert_relative_eq!(sum, 2.0);
        assert_eq!(count, 1);
    }

    #[test]
    fn normalized_score_of_empty_set_is_zero() {
        let (_dir, matrix) = sample_matrix();
        assert_relative_eq!(matrix.score_records(&[], true), 0.0);
    }

    #[test]
    fn score_records_skips_missing_fold_changes() {
        let (_dir, matrix) = sample_matrix();
        let records = vec![
            PredictionRecord {
                gene: "A".into(),
                label: "+".into(),
                fold_change: Some(15.0),
            },
            PredictionRecord {
                gene: "B".into(),
                label: "+".into(),
                fold_change: None,
            },
        ];
        assert_relative_eq!(matrix.score_records(&records, true), 2.0);
        assert_relative_eq!(matrix.score_records(&records, false), 2.0);
    }
}
