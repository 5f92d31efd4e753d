use std::path::PathBuf;

use clap::{ArgAction, Args, Parser, Subcommand};

/// Cross-validation robustness pipeline for sign-consistency gene
/// predictions.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Build a tree of down-sampled observation sets and run the solver on
    /// each of them.
    Sample(SampleArgs),
    /// Score every run of a sampling tree against a score matrix.
    Score(ScoreArgs),
    /// Aggregate per-gene prediction statistics across a sampling tree.
    Stats(StatsArgs),
}

#[derive(Args, Debug)]
pub struct SampleArgs {
    /// Interaction graph in SIF format.
    pub sif_file: PathBuf,
    /// Measured up-regulated genes, one name per line (first column).
    pub up_file: PathBuf,
    /// Measured down-regulated genes, one name per line (first column).
    pub down_file: PathBuf,
    /// Expression data file forwarded to the solver workflow.
    pub data_file: PathBuf,
    /// Directory the sampling tree is created in.
    pub out_dir: PathBuf,

    /// First sampling percentage.
    #[arg(long, default_value_t = 10.0)]
    pub start: f64,
    /// Last sampling percentage (inclusive).
    #[arg(long, default_value_t = 90.0)]
    pub stop: f64,
    /// Step between sampling percentages.
    #[arg(long, default_value_t = 10.0)]
    pub step: f64,
    /// Number of experiments per sampling percentage.
    #[arg(long, default_value_t = 10)]
    pub num_exp: usize,
    /// Name prefix of the percentage directories.
    #[arg(long, default_value = crate::sampling::DEFAULT_PREFIX)]
    pub prefix: String,

    /// Directory holding the observation and workflow scripts.
    #[arg(long, default_value = ".")]
    pub scripts_dir: PathBuf,
    /// Solver command handed to the workflow script.
    #[arg(long, default_value = "iggy")]
    pub iggy_command: String,
    /// Resume a previous sampling, keeping every usable run.
    #[arg(long = "continue")]
    pub continue_run: bool,
    /// Seed of the sampling random generator.
    #[arg(long)]
    pub seed: Option<u64>,
}

#[derive(Args, Debug)]
pub struct ScoreArgs {
    /// Root of an existing sampling tree.
    pub dir: PathBuf,
    /// Score matrix file.
    pub matrix_file: PathBuf,

    /// Log the score of each individual run.
    #[arg(long)]
    pub detail_scores: bool,
    /// Keep raw score sums instead of dividing by the prediction count.
    #[arg(long)]
    pub no_normalize: bool,
    /// Export a boxplot of the per-run scores.
    #[arg(long)]
    pub export_plot: bool,
    /// Complete (100% sampling) predictions added as the last plot point.
    #[arg(long)]
    pub complete_pred: Option<PathBuf>,
    /// Destination of the plot file, relative to the sampling tree.
    #[arg(long)]
    pub dest_plot: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct StatsArgs {
    /// Root of an existing sampling tree.
    pub dir: PathBuf,
    /// Name of the report file, written inside the tree.
    #[arg(long, default_value = "robustness.tsv")]
    pub out_file: String,

    /// Complete (100% sampling) predictions to compare against.
    #[arg(long)]
    pub complete_pred: Option<PathBuf>,
    /// Pool good/bad/missing counts from each of these samplings upward.
    #[arg(long, num_args = 1.., value_delimiter = ',')]
    pub sum_from: Option<Vec<f64>>,
    /// Pool good/bad/missing counts for every sampling value.
    #[arg(long)]
    pub sum_all: bool,
    /// Collapse the weak prediction types into one column.
    #[arg(long)]
    pub brief_weak: bool,
    /// Print raw counts next to the pooled fractions.
    #[arg(long)]
    pub detail_sum: bool,
    /// Count a pooled weak prediction as disagreeing with the strong
    /// predictions it covers, instead of the default agreement.
    #[arg(long = "bad-weak", action = ArgAction::SetFalse)]
    pub good_weak: bool,
    /// Plot the good/bad/missing fractions per sampling percentage.
    #[arg(long, conflicts_with = "cumulative_plot")]
    pub noncumulative_plot: bool,
    /// Plot the pooled good/bad/missing fractions per threshold.
    #[arg(long)]
    pub cumulative_plot: bool,
    /// Extend the plotted curves to the final 100% sampling point.
    #[arg(long)]
    pub final_point: bool,
    /// Destination of the plot file, relative to the sampling tree.
    #[arg(long)]
    pub dest_plot: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_cli() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn sample_defaults() {
        let cli = Cli::parse_from([
            "crossval", "sample", "net.sif", "up.txt", "down.txt", "data.csv", "out",
        ]);
        let Commands::Sample(args) = cli.command else {
            panic!("expected sample subcommand");
        };
        assert_eq!(args.start, 10.0);
        assert_eq!(args.stop, 90.0);
        assert_eq!(args.num_exp, 10);
        assert_eq!(args.prefix, "prp");
        assert!(!args.continue_run);
    }

    #[test]
    fn weak_predictions_agree_unless_bad_weak() {
        use crate::analysis::robustness::PredGroups;

        let cli = Cli::parse_from(["crossval", "stats", "out", "--brief-weak"]);
        let Commands::Stats(args) = cli.command else {
            panic!("expected stats subcommand");
        };
        assert!(args.good_weak);
        let groups = PredGroups::new(args.brief_weak, args.good_weak);
        assert!(groups.is_good("NOT+", "+"));

        let cli = Cli::parse_from(["crossval", "stats", "out", "--brief-weak", "--bad-weak"]);
        let Commands::Stats(args) = cli.command else {
            panic!("expected stats subcommand");
        };
        assert!(!args.good_weak);
        let groups = PredGroups::new(args.brief_weak, args.good_weak);
        assert!(!groups.is_good("NOT+", "+"));
    }

    #[test]
    fn stats_sum_from_accepts_a_list() {
        let cli = Cli::parse_from([
            "crossval",
            "stats",
            "out",
            "--complete-pred",
            "result.tsv",
            "--sum-from",
            "50,70",
        ]);
        let Commands::Stats(args) = cli.command else {
            panic!("expected stats subcommand");
        };
        assert_eq!(args.sum_from, Some(vec![50.0, 70.0]));
    }
}
