use std::path::{Path, PathBuf};

/// File written by the solver workflow inside each experiment directory.
pub const RESULT_FILE: &str = "result-0.0.tsv";
/// Sentinel file marking an experiment directory whose run produced no usable result.
pub const NO_RESULT_MARKER: &str = "NORESULT";
/// Observations drawn by the sampling driver, before input construction.
pub const OBS_FILE: &str = "obs-noinputs.obs";
/// Observations completed with network inputs, fed to the solver.
pub const OBS_WITH_INPUTS_FILE: &str = "obs-withinputs.obs";
/// Raw solver output kept next to the parsed result file.
pub const SOLVER_LOG_FILE: &str = "iggy-output.out";

/// Tag carried by result rows that hold an actual prediction.
pub const PRED_TAG: &str = "pred:";
/// Fold-change placeholder for genes absent from the expression data.
pub const MISSING_FOLD_CHANGE: &str = "not-found";

/// One prediction row of a solver result file.
#[derive(Debug, Clone)]
pub struct PredictionRecord {
    pub gene: String,
    /// Prediction label with the `pred:` tag stripped (e.g. `+`, `NOT-`).
    pub label: String,
    /// `None` when the expression data had no fold change for this gene.
    pub fold_change: Option<f64>,
}

/// Classification of an experiment directory when walking a sampling tree.
///
/// Readers must not look for the `NORESULT` marker themselves; this is the
/// single place where an on-disk run is judged usable or not.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// The run produced a result file; the path points at it.
    Usable(PathBuf),
    Skipped(SkipReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The directory carries the no-result marker.
    Marked,
    /// No result file was found at all.
    MissingResult,
}

impl RunOutcome {
    pub fn classify(exp_dir: &Path) -> RunOutcome {
        if exp_dir.join(NO_RESULT_MARKER).is_file() {
            return RunOutcome::Skipped(SkipReason::Marked);
        }
        let result = exp_dir.join(RESULT_FILE);
        if result.is_file() {
            RunOutcome::Usable(result)
        } else {
            RunOutcome::Skipped(SkipReason::MissingResult)
        }
    }

    pub fn is_usable(&self) -> bool {
        matches!(self, RunOutcome::Usable(_))
    }
}
