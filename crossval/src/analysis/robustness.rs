use std::collections::{HashMap, HashSet};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use statrs::statistics::Statistics;
use tracing::{debug, info};

use crate::analysis::matrix_score::median;
use crate::analysis::plot::{self, CurveSet};
use crate::helper_functions::load_predictions;
use crate::models::RunOutcome;
use crate::sampling::SamplingConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlotKind {
    NonCumulative,
    Cumulative,
}

#[derive(Debug, Clone, Default)]
pub struct RobustnessOptions {
    /// Complete (100% sampling) predictions to compare against.
    pub complete_pred: Option<PathBuf>,
    /// Pool good/bad/missing counts from each of these samplings upward.
    pub sum_from: Option<Vec<f64>>,
    /// Pool good/bad/missing counts for every sampling value.
    pub sum_all: bool,
    /// Collapse the weak prediction types into one column.
    pub brief_weak: bool,
    /// Print raw counts next to the pooled fractions.
    pub detail_sum: bool,
    /// Let a weak prediction agree with the strong predictions it covers.
    pub good_weak: bool,
    pub plot: Option<PlotKind>,
    /// Extend the plotted curves to the final 100% sampling point.
    pub final_point: bool,
    /// Destination of the plot file, relative to the sampling tree.
    pub dest_plot: Option<PathBuf>,
}

impl RobustnessOptions {
    /// Rejects flag combinations before any work is done.
    pub fn validate(&self) -> Result<()> {
        if self.sum_all && self.sum_from.is_some() {
            bail!("Arguments error: Options --sum-from and --sum-all are incompatible");
        }
        if self.sum_from.is_some() && self.complete_pred.is_none() {
            bail!("Arguments error: Option --sum-from requires --complete-pred");
        }
        if self.sum_all && self.complete_pred.is_none() {
            bail!("Arguments error: Option --sum-all requires --complete-pred");
        }
        if self.plot == Some(PlotKind::Cumulative) && !self.sum_all && self.sum_from.is_none() {
            bail!("Arguments error: Option --cumulative-plot requires --sum-from or --sum-all");
        }
        if self.plot == Some(PlotKind::NonCumulative) && self.complete_pred.is_none() {
            bail!("Arguments error: Option --noncumulative-plot requires --complete-pred");
        }
        if self.final_point && self.plot.is_none() {
            bail!(
                "Arguments error: Option --final-point requires --cumulative-plot or --noncumulative-plot"
            );
        }
        Ok(())
    }
}

/// Recognized prediction types, grouped into report columns.
#[derive(Debug, Clone)]
pub struct PredGroups {
    groups: Vec<(Vec<&'static str>, &'static str)>,
    brief_weak: bool,
    good_weak: bool,
}

fn weak_equivalents(pred: &str) -> Option<&'static [&'static str]> {
    match pred {
        "NOT+" => Some(&["+", "0"]),
        "NOT-" => Some(&["-", "0"]),
        "CHANGE" => Some(&["+", "-"]),
        _ => None,
    }
}

impl PredGroups {
    pub fn new(brief_weak: bool, good_weak: bool) -> Self {
        let groups: Vec<(Vec<&'static str>, &'static str)> = if brief_weak {
            vec![
                (vec!["+"], "+"),
                (vec!["-"], "\u{2212}"),
                (vec!["0"], "0"),
                (vec!["NOT+", "NOT-", "CHANGE"], "weak"),
            ]
        } else {
            vec![
                (vec!["+"], "+"),
                (vec!["-"], "\u{2212}"),
                (vec!["0"], "0"),
                (vec!["NOT+"], "NOT+"),
                (vec!["NOT-"], "NOT\u{2212}"),
                (vec!["CHANGE"], "CHANGE"),
            ]
        };
        PredGroups {
            groups,
            brief_weak,
            good_weak,
        }
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn index_of(&self, pred: &str) -> Option<usize> {
        self.groups
            .iter()
            .position(|(types, _)| types.iter().any(|t| *t == pred))
    }

    pub fn label(&self, index: usize) -> &'static str {
        self.groups[index].1
    }

    /// Whether a group column pools several raw prediction types.
    pub fn is_collapsed(&self, index: usize) -> bool {
        self.groups[index].0.len() > 1
    }

    /// Whether an observed prediction agrees with the reference one. Weak
    /// equivalence only applies when the weak types are pooled.
    pub fn is_good(&self, observed: &str, reference: &str) -> bool {
        if self.brief_weak && self.good_weak {
            if let Some(equivalents) = weak_equivalents(observed) {
                return equivalents.contains(&reference);
            }
        }
        observed == reference
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GoodBad {
    pub good: u32,
    pub bad: u32,
}

/// Everything gathered from one walk over the sampling tree.
#[derive(Debug)]
pub struct RobustnessStats {
    values: Vec<f64>,
    groups: PredGroups,
    /// Genes in order of first appearance, for stable report rows.
    gene_order: Vec<String>,
    /// Per percentage: gene -> per-group occurrence counts.
    counts: Vec<HashMap<String, Vec<u32>>>,
    /// Usable experiment runs per percentage.
    true_num_exp: Vec<u32>,
    /// Reference prediction (raw type) per gene, when a reference was given.
    reference: Option<HashMap<String, String>>,
    /// Thresholds for the pooled good/bad/missing blocks.
    sum_from: Option<Vec<f64>>,
    /// Per gene: pooled good/bad per threshold index.
    cumulative: HashMap<String, Vec<GoodBad>>,
    /// Usable runs pooled per threshold index.
    cumulative_true: Vec<u32>,
    /// Per percentage: good/bad per gene, for the non-cumulative curves.
    non_cumulative: Vec<HashMap<String, GoodBad>>,
}

/// Walks a sampling tree and accumulates per-gene prediction statistics.
pub fn gather(dir: &Path, options: &RobustnessOptions) -> Result<RobustnessStats> {
    let config = SamplingConfig::load_info(dir)?;
    let values = config.values()?;
    let dir_names = config.percentage_dir_names(&values);
    let exp_labels = config.experiment_labels();
    let groups = PredGroups::new(options.brief_weak, options.good_weak);

    let sum_from: Option<Vec<f64>> = if let Some(thresholds) = &options.sum_from {
        Some(thresholds.clone())
    } else if options.sum_all {
        Some(values.clone())
    } else {
        None
    };

    let reference = match &options.complete_pred {
        Some(path) => {
            info!("Load complete predictions file ({})...", path.display());
            let mut map = HashMap::new();
            for record in load_predictions(path)? {
                if groups.index_of(&record.label).is_some() {
                    map.insert(record.gene, record.label);
                }
            }
            Some(map)
        }
        None => None,
    };

    let num_thresholds = sum_from.as_ref().map_or(0, Vec::len);
    let mut stats = RobustnessStats {
        counts: vec![HashMap::new(); values.len()],
        true_num_exp: vec![0; values.len()],
        cumulative: HashMap::new(),
        cumulative_true: vec![0; num_thresholds],
        non_cumulative: vec![HashMap::new(); values.len()],
        gene_order: Vec::new(),
        values,
        groups,
        reference,
        sum_from,
    };
    let mut seen: HashSet<String> = HashSet::new();

    info!("Gather data on all runs...");
    for (vi, (&n, dir_name)) in stats.values.iter().zip(&dir_names).enumerate() {
        info!("  {dir_name}");
        for label in &exp_labels {
            let exp_dir = dir.join(dir_name).join(label);
            let result_path = match RunOutcome::classify(&exp_dir) {
                RunOutcome::Usable(path) => path,
                RunOutcome::Skipped(reason) => {
                    debug!("  -- {label}: no usable result ({reason:?})");
                    continue;
                }
            };
            stats.true_num_exp[vi] += 1;

            for record in load_predictions(&result_path)? {
                let Some(group_index) = stats.groups.index_of(&record.label) else {
                    continue;
                };
                if seen.insert(record.gene.clone()) {
                    stats.gene_order.push(record.gene.clone());
                }
                let row = stats.counts[vi]
                    .entry(record.gene.clone())
                    .or_insert_with(|| vec![0; stats.groups.len()]);
                row[group_index] += 1;

                let Some(reference) = &stats.reference else {
                    continue;
                };
                let Some(ref_pred) = reference.get(&record.gene) else {
                    continue;
                };
                let good = stats.groups.is_good(&record.label, ref_pred);
                let entry = stats.non_cumulative[vi]
                    .entry(record.gene.clone())
                    .or_default();
                if good {
                    entry.good += 1;
                } else {
                    entry.bad += 1;
                }
                if let Some(thresholds) = &stats.sum_from {
                    let pooled = stats
                        .cumulative
                        .entry(record.gene.clone())
                        .or_insert_with(|| vec![GoodBad::default(); thresholds.len()]);
                    for (ti, &threshold) in thresholds.iter().enumerate() {
                        if n >= threshold {
                            if good {
                                pooled[ti].good += 1;
                            } else {
                                pooled[ti].bad += 1;
                            }
                        }
                    }
                }
            }
        }
    }

    if let Some(thresholds) = &stats.sum_from {
        stats.cumulative_true = thresholds
            .iter()
            .map(|&threshold| {
                stats
                    .values
                    .iter()
                    .zip(&stats.true_num_exp)
                    .filter(|(&n, _)| n >= threshold)
                    .map(|(_, &count)| count)
                    .sum()
            })
            .collect();
    }

    Ok(stats)
}

/// Percentages are floats throughout, and the report keeps them that way:
/// integer values render with one decimal (`10.0`), fractional ones as-is.
fn fmt_pct(n: f64) -> String {
    if n.fract() == 0.0 {
        format!("{n:.1}")
    } else {
        format!("{n}")
    }
}

fn fraction(count: i64, total: u32) -> f64 {
    if total == 0 {
        0.0
    } else {
        count as f64 / total as f64
    }
}

impl RobustnessStats {
    pub fn true_num_exp(&self) -> &[u32] {
        &self.true_num_exp
    }

    fn pooled(&self, gene: &str, threshold_index: usize) -> GoodBad {
        self.cumulative
            .get(gene)
            .map(|pooled| pooled[threshold_index])
            .unwrap_or_default()
    }

    /// Missing runs for a gene at a threshold: usable runs at or above the
    /// threshold that recorded neither a good nor a bad prediction.
    pub fn missing(&self, gene: &str, threshold_index: usize) -> i64 {
        let pooled = self.pooled(gene, threshold_index);
        self.cumulative_true[threshold_index] as i64 - (pooled.good + pooled.bad) as i64
    }

    /// Writes the tab-delimited robustness table.
    pub fn write_table(&self, path: &Path, detail_sum: bool) -> Result<()> {
        let file =
            File::create(path).with_context(|| format!("cannot create {}", path.display()))?;
        let mut out = BufWriter::new(file);

        // First head line: one block of columns per percentage.
        let mut line = String::from("sampling (%)");
        for &n in &self.values {
            line.push('\t');
            line.push_str(&fmt_pct(n));
            line.push_str(&"\t".repeat(self.groups.len() - 1));
        }
        if self.reference.is_some() {
            line.push_str("\tfinal (100)");
            if let Some(thresholds) = &self.sum_from {
                for &threshold in thresholds {
                    line.push_str(&format!("\t\tsum \u{2265} {}%\t\t", fmt_pct(threshold)));
                }
            }
        }
        writeln!(out, "{line}")?;

        // Second head line: the group labels, repeated.
        let mut block = String::new();
        for index in 0..self.groups.len() {
            block.push('\t');
            block.push_str(self.groups.label(index));
        }
        let mut line = format!("prediction{}", block.repeat(self.values.len()));
        if self.reference.is_some() {
            line.push_str("\tprediction");
            if let Some(thresholds) = &self.sum_from {
                for _ in thresholds {
                    line.push_str("\t\tgood\tbad\tmissing");
                }
            }
        }
        writeln!(out, "{line}")?;

        for gene in &self.gene_order {
            let mut line = gene.clone();
            for counts in &self.counts {
                match counts.get(gene) {
                    None => line.push_str(&"\t".repeat(self.groups.len())),
                    Some(row) => {
                        for &count in row {
                            line.push('\t');
                            if count > 0 {
                                line.push_str(&count.to_string());
                            }
                        }
                    }
                }
            }
            if let Some(reference) = &self.reference {
                line.push('\t');
                if let Some(ref_pred) = reference.get(gene) {
                    // Only recognized types make it into the reference map.
                    let index = self.groups.index_of(ref_pred).unwrap();
                    line.push_str(self.groups.label(index));
                    if self.groups.is_collapsed(index) {
                        line.push_str(&format!(" ({ref_pred})"));
                    }
                    if let Some(thresholds) = &self.sum_from {
                        for ti in 0..thresholds.len() {
                            let pooled = self.pooled(gene, ti);
                            let total = self.cumulative_true[ti];
                            let missing = self.missing(gene, ti);
                            let cells = [
                                (pooled.good as i64, fraction(pooled.good as i64, total)),
                                (pooled.bad as i64, fraction(pooled.bad as i64, total)),
                                (missing, fraction(missing, total)),
                            ];
                            line.push('\t');
                            for (count, frac) in cells {
                                if detail_sum {
                                    line.push_str(&format!("\t{frac} ({count}/{total})"));
                                } else {
                                    line.push_str(&format!("\t{frac}"));
                                }
                            }
                        }
                    }
                }
            }
            writeln!(out, "{line}")?;
        }
        Ok(())
    }

    /// Min/max/mean/median curves of the good/bad/missing fractions across
    /// the reference genes, in percent.
    pub fn curve_sets(&self, kind: PlotKind, final_point: bool) -> (Vec<f64>, Vec<CurveSet>) {
        let reference = self
            .reference
            .as_ref()
            .expect("curves require reference predictions");

        let mut x: Vec<f64> = match kind {
            PlotKind::NonCumulative => self.values.clone(),
            PlotKind::Cumulative => self.sum_from.clone().unwrap_or_default(),
        };

        let mut curves: Vec<CurveSet> = ["good", "bad", "missing"]
            .into_iter()
            .map(|name| CurveSet {
                name,
                min: Vec::new(),
                max: Vec::new(),
                mean: Vec::new(),
                median: Vec::new(),
            })
            .collect();

        for (index, _) in x.iter().enumerate() {
            let total = match kind {
                PlotKind::NonCumulative => self.true_num_exp[index],
                PlotKind::Cumulative => self.cumulative_true[index],
            };
            let mut good = Vec::with_capacity(reference.len());
            let mut bad = Vec::with_capacity(reference.len());
            let mut missing = Vec::with_capacity(reference.len());
            for gene in reference.keys() {
                let counts = match kind {
                    PlotKind::NonCumulative => self.non_cumulative[index]
                        .get(gene)
                        .copied()
                        .unwrap_or_default(),
                    PlotKind::Cumulative => self.pooled(gene, index),
                };
                good.push(counts.good as f64);
                bad.push(counts.bad as f64);
                missing.push(total as f64 - (counts.good + counts.bad) as f64);
            }
            for (curve, samples) in curves.iter_mut().zip([&good, &bad, &missing]) {
                let scale = if total == 0 {
                    0.0
                } else {
                    100.0 / total as f64
                };
                curve.min.push(Statistics::min(samples) * scale);
                curve.max.push(Statistics::max(samples) * scale);
                curve.mean.push(Statistics::mean(samples) * scale);
                curve.median.push(median(samples) * scale);
            }
        }

        if final_point {
            x.push(100.0);
            for curve in &mut curves {
                let value = if curve.name == "good" { 100.0 } else { 0.0 };
                curve.min.push(value);
                curve.max.push(value);
                curve.mean.push(value);
                curve.median.push(value);
            }
        }

        (x, curves)
    }
}

/// Runs the whole robustness report: gather, write the table, plot if asked.
pub fn run_robustness(dir: &Path, out_file_name: &str, options: &RobustnessOptions) -> Result<()> {
    options.validate()?;
    let stats = gather(dir, options)?;

    let out_path = dir.join(out_file_name);
    info!("Write results in output file ({})...", out_path.display());
    stats.write_table(&out_path, options.detail_sum)?;

    if let Some(kind) = options.plot {
        let plot_dir = match &options.dest_plot {
            Some(dest) => dir.join(dest),
            None => dir.to_path_buf(),
        };
        fs::create_dir_all(&plot_dir)
            .with_context(|| format!("cannot create {}", plot_dir.display()))?;
        let stem = Path::new(out_file_name)
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "robustness".to_string());
        let plot_path = plot_dir.join(format!("{stem}.png"));
        let (x, curves) = stats.curve_sets(kind, options.final_point);
        plot::fraction_curves(&plot_path, &x, &curves, kind == PlotKind::Cumulative)?;
    }
    Ok(())
}
