use std::fs::{self, File};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::Serialize;
use statrs::statistics::{Data, Median, Statistics};
use tracing::{info, warn};

use crate::analysis::plot;
use crate::helper_functions::load_predictions;
use crate::models::RunOutcome;
use crate::sampling::SamplingConfig;
use crate::score_matrix::ScoreMatrix;

#[derive(Debug, Clone, Default)]
pub struct MatrixScoreOptions {
    /// Log the score of each individual run.
    pub detail_scores: bool,
    /// Divide each run's score by its number of scored predictions.
    pub normalize: bool,
    pub export_plot: bool,
    /// Complete (100% sampling) predictions added as the last plot point.
    pub complete_pred: Option<PathBuf>,
    /// Destination of the plot file, relative to the sampling tree.
    pub dest_plot: Option<PathBuf>,
}

impl MatrixScoreOptions {
    /// Rejects flag combinations before any work is done.
    pub fn validate(&self) -> Result<()> {
        if self.complete_pred.is_some() && !self.export_plot {
            bail!("Arguments error: Option --complete-pred requires --export-plot");
        }
        if self.dest_plot.is_some() && !self.export_plot {
            bail!("Arguments error: Option --dest-plot requires --export-plot");
        }
        Ok(())
    }
}

/// Per-run scores gathered for one sampling percentage.
#[derive(Debug, Clone)]
pub struct SamplingScores {
    pub percentage: f64,
    pub dir_name: String,
    pub scores: Vec<f64>,
    pub num_predictions: Vec<usize>,
}

#[derive(Debug, Serialize)]
struct SamplingSummary {
    percentage: f64,
    runs: usize,
    mean_score: f64,
    score_sd: f64,
    mean_predictions: f64,
}

/// Scores every usable run of a sampling tree against a score matrix.
///
/// Each run's score is also written to a `score-<matrix>.txt` file inside its
/// experiment directory, and per-percentage aggregates go to a summary JSON
/// at the tree root.
pub fn score_sampling_tree(
    dir: &Path,
    matrix_file: &Path,
    options: &MatrixScoreOptions,
) -> Result<Vec<SamplingScores>> {
    options.validate()?;
    let config = SamplingConfig::load_info(dir)?;
    let matrix = ScoreMatrix::from_file(matrix_file)?;
    let matrix_name = matrix_file
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "matrix".to_string());

    let values = config.values()?;
    let dir_names = config.percentage_dir_names(&values);
    let exp_labels = config.experiment_labels();

    info!("Gather data and compute scores...");
    let mut all = Vec::with_capacity(values.len());
    for (&n, dir_name) in values.iter().zip(&dir_names) {
        let mut scores = Vec::new();
        let mut num_predictions = Vec::new();
        info!("{dir_name}");
        for label in &exp_labels {
            let exp_dir = dir.join(dir_name).join(label);
            let result_path = match RunOutcome::classify(&exp_dir) {
                RunOutcome::Usable(path) => path,
                RunOutcome::Skipped(reason) => {
                    warn!("  -- {label}: no usable result ({reason:?})");
                    continue;
                }
            };
            let records = load_predictions(&result_path)?;
            let score = matrix.score_records(&records, options.normalize);
            let score_file = exp_dir.join(format!("score-{matrix_name}.txt"));
            fs::write(&score_file, score.to_string())
                .with_context(|| format!("cannot write {}", score_file.display()))?;
            if options.detail_scores {
                info!("  -- {label}: score = {score}");
            }
            scores.push(score);
            num_predictions.push(records.len());
        }
        if !scores.is_empty() {
            info!(
                "mean = {:.4}, SD = {:.4}, mean #pred = {:.1}",
                Statistics::mean(&scores),
                Statistics::population_std_dev(&scores),
                num_predictions.iter().sum::<usize>() as f64 / num_predictions.len() as f64
            );
        }
        all.push(SamplingScores {
            percentage: n,
            dir_name: dir_name.clone(),
            scores,
            num_predictions,
        });
    }

    write_summary(dir, &matrix_name, &all, options.normalize)?;

    if options.export_plot {
        let complete_score = match &options.complete_pred {
            Some(path) => {
                let records = load_predictions(path)?;
                Some(matrix.score_records(&records, options.normalize))
            }
            None => None,
        };
        let plot_dir = match &options.dest_plot {
            Some(dest) => dir.join(dest),
            None => dir.to_path_buf(),
        };
        fs::create_dir_all(&plot_dir)
            .with_context(|| format!("cannot create {}", plot_dir.display()))?;
        let suffix = if options.normalize { "" } else { "-nn" };
        let plot_path = plot_dir.join(format!("{matrix_name}-mean-boxplot{suffix}.png"));
        let boxes: Vec<(String, Vec<f64>)> = all
            .iter()
            .map(|s| (percentage_label(s.percentage, &values), s.scores.clone()))
            .collect();
        plot::score_boxplot(&plot_path, &boxes, complete_score)?;
    }

    Ok(all)
}

fn percentage_label(n: f64, values: &[f64]) -> String {
    if crate::sampling::has_decimal_part(values) {
        format!("{n:.4}%")
    } else {
        format!("{n:.0}%")
    }
}

fn write_summary(
    dir: &Path,
    matrix_name: &str,
    all: &[SamplingScores],
    normalize: bool,
) -> Result<()> {
    let summaries: Vec<SamplingSummary> = all
        .iter()
        .map(|s| {
            let runs = s.scores.len();
            let (mean_score, score_sd, mean_predictions) = if runs == 0 {
                (0.0, 0.0, 0.0)
            } else {
                (
                    Statistics::mean(&s.scores),
                    Statistics::population_std_dev(&s.scores),
                    s.num_predictions.iter().sum::<usize>() as f64 / runs as f64,
                )
            };
            SamplingSummary {
                percentage: s.percentage,
                runs,
                mean_score,
                score_sd,
                mean_predictions,
            }
        })
        .collect();

    let suffix = if normalize { "" } else { "-nn" };
    let path = dir.join(format!("score-{matrix_name}-summary{suffix}.json"));
    let file = File::create(&path).with_context(|| format!("cannot create {}", path.display()))?;
    serde_json::to_writer_pretty(file, &summaries)
        .with_context(|| format!("cannot write {}", path.display()))?;
    info!("Score summary saved to: {}", path.display());
    Ok(())
}

/// Median helper shared with the robustness curves.
pub fn median(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    Data::new(values.to_vec()).median()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::fs;
    use tempfile::tempdir;

    fn build_tree(root: &Path) {
        fs::write(root.join("prp-info.csv"), "prp\t10\t20\t10\t2").unwrap();
        let runs = [
            ("prp010/1", "A\tpred:+\t5\nB\tpred:+\t15\n"),
            ("prp010/2", "A\tpred:+\t25\n"),
            ("prp020/1", "A\tpred:+\t5\nB\tpred:-\t5\n"),
            ("prp020/2", ""),
        ];
        for (rel, rows) in runs {
            let exp_dir = root.join(rel);
            fs::create_dir_all(&exp_dir).unwrap();
            fs::write(
                exp_dir.join("result-0.0.tsv"),
                format!("gene\tprediction\tfold-change\n{rows}"),
            )
            .unwrap();
        }
        // Mark the empty run as failed.
        fs::write(root.join("prp020/2/NORESULT"), "").unwrap();
    }

    fn write_matrix(root: &Path) -> std::path::PathBuf {
        let path = root.join("m1.tsv");
        // One boundary at 10: score 0 at or below, 1 above (reversed for -).
        fs::write(&path, "10\n+\t0\t1\n-\tinv\t+\n").unwrap();
        path
    }

    #[test]
    fn tree_scores_and_summary() {
        let root = tempdir().unwrap();
        build_tree(root.path());
        let matrix_file = write_matrix(root.path());

        let options = MatrixScoreOptions {
            normalize: true,
            ..Default::default()
        };
        let all = score_sampling_tree(root.path(), &matrix_file, &options).unwrap();

        assert_eq!(all.len(), 2);
        assert_eq!(all[0].dir_name, "prp010");
        // 10%: run 1 scores (0 + 1)/2, run 2 scores 1/1.
        assert_relative_eq!(all[0].scores[0], 0.5);
        assert_relative_eq!(all[0].scores[1], 1.0);
        assert_eq!(all[0].num_predictions, vec![2, 1]);
        // 20%: the marked run is skipped entirely.
        assert_eq!(all[1].scores.len(), 1);
        assert_relative_eq!(all[1].scores[0], 0.5);

        let score_file = root.path().join("prp010/1/score-m1.txt");
        assert_eq!(fs::read_to_string(score_file).unwrap(), "0.5");

        let summary = fs::read_to_string(root.path().join("score-m1-summary.json")).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&summary).unwrap();
        assert_eq!(parsed[0]["runs"], 2);
        assert_relative_eq!(parsed[0]["mean_score"].as_f64().unwrap(), 0.75);
        assert_eq!(parsed[1]["runs"], 1);
    }

    #[test]
    fn raw_mode_skips_normalization() {
        let root = tempdir().unwrap();
        build_tree(root.path());
        let matrix_file = write_matrix(root.path());

        let options = MatrixScoreOptions {
            normalize: false,
            ..Default::default()
        };
        let all = score_sampling_tree(root.path(), &matrix_file, &options).unwrap();
        assert_relative_eq!(all[0].scores[0], 1.0);
        assert!(root
            .path()
            .join("score-m1-summary-nn.json")
            .is_file());
    }

    #[test]
    fn plot_options_require_the_plot_export() {
        let complete = MatrixScoreOptions {
            complete_pred: Some(PathBuf::from("result.tsv")),
            ..Default::default()
        };
        assert!(complete.validate().is_err());

        let dest = MatrixScoreOptions {
            dest_plot: Some(PathBuf::from("plots")),
            ..Default::default()
        };
        assert!(dest.validate().is_err());

        let exported = MatrixScoreOptions {
            export_plot: true,
            complete_pred: Some(PathBuf::from("result.tsv")),
            dest_plot: Some(PathBuf::from("plots")),
            ..Default::default()
        };
        assert!(exported.validate().is_ok());
    }

    #[test]
    fn median_of_even_sample() {
        assert_relative_eq!(median(&[1.0, 2.0, 3.0, 4.0]), 2.5);
        assert_relative_eq!(median(&[]), 0.0);
    }
}
