mod analysis;
mod cli;
mod helper_functions;
mod iggy_processing;
mod models;
mod sampling;
mod score_matrix;

use anyhow::Result;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::analysis::matrix_score::{score_sampling_tree, MatrixScoreOptions};
use crate::analysis::robustness::{run_robustness, PlotKind, RobustnessOptions};
use crate::cli::{Cli, Commands, SampleArgs, ScoreArgs, StatsArgs};
use crate::iggy_processing::{IggyOptions, SamplingDriver};
use crate::sampling::SamplingConfig;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Sample(args) => sample(args),
        Commands::Score(args) => score(args),
        Commands::Stats(args) => stats(args),
    }
}

fn sample(args: SampleArgs) -> Result<()> {
    let config = SamplingConfig::new(&args.prefix, args.start, args.stop, args.step, args.num_exp)?;
    let driver = SamplingDriver {
        config,
        options: IggyOptions {
            scripts_dir: args.scripts_dir,
            iggy_command: args.iggy_command,
        },
        sif_file: args.sif_file,
        data_file: args.data_file,
        out_dir: args.out_dir,
        continue_run: args.continue_run,
        seed: args.seed,
    };
    driver.run(&args.up_file, &args.down_file)?;
    info!("Sampling finished.");
    Ok(())
}

fn score(args: ScoreArgs) -> Result<()> {
    let options = MatrixScoreOptions {
        detail_scores: args.detail_scores,
        normalize: !args.no_normalize,
        export_plot: args.export_plot,
        complete_pred: args.complete_pred,
        dest_plot: args.dest_plot,
    };
    score_sampling_tree(&args.dir, &args.matrix_file, &options)?;
    info!("Scoring finished.");
    Ok(())
}

fn stats(args: StatsArgs) -> Result<()> {
    let plot = if args.cumulative_plot {
        Some(PlotKind::Cumulative)
    } else if args.noncumulative_plot {
        Some(PlotKind::NonCumulative)
    } else {
        None
    };
    let options = RobustnessOptions {
        complete_pred: args.complete_pred,
        sum_from: args.sum_from,
        sum_all: args.sum_all,
        brief_weak: args.brief_weak,
        detail_sum: args.detail_sum,
        good_weak: args.good_weak,
        plot,
        final_point: args.final_point,
        dest_plot: args.dest_plot,
    };
    run_robustness(&args.dir, &args.out_file, &options)?;
    info!("Statistics finished.");
    Ok(())
}
