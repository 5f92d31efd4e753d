use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use anyhow::{bail, Context, Result};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use tracing::{debug, info};

use crate::helper_functions::load_gene_names;
use crate::models::{RunOutcome, OBS_FILE, OBS_WITH_INPUTS_FILE, RESULT_FILE, SOLVER_LOG_FILE};
use crate::sampling::SamplingConfig;

/// Holds user-defined parameters to run the Iggy workflow.
#[derive(Debug, Clone)]
pub struct IggyOptions {
    /// Directory holding `construct-inputs.sh` and `workflow-iggy.sh`.
    pub scripts_dir: PathBuf,

    /// Command used to call Iggy inside the workflow (e.g. "iggy").
    pub iggy_command: String,
}

/// The sampling driver: draws random observation subsets for every
/// percentage of the configured range and runs the solver once per draw.
#[derive(Debug)]
pub struct SamplingDriver {
    pub config: SamplingConfig,
    pub options: IggyOptions,
    /// The SIF file containing the influence graph.
    pub sif_file: PathBuf,
    /// The expression-data file handed to the solver workflow.
    pub data_file: PathBuf,
    pub out_dir: PathBuf,
    /// Resume into an existing tree instead of creating a fresh one.
    pub continue_run: bool,
    /// Seed for a reproducible draw sequence.
    pub seed: Option<u64>,
}

impl SamplingDriver {
    pub fn run(&self, up_file: &Path, down_file: &Path) -> Result<()> {
        which::which(&self.options.iggy_command).with_context(|| {
            format!(
                "iggy command '{}' not found on PATH",
                self.options.iggy_command
            )
        })?;

        let up_genes = load_gene_names(up_file)?;
        let down_genes = load_gene_names(down_file)?;
        if up_genes.is_empty() || down_genes.is_empty() {
            bail!("observation lists must not be empty");
        }
        // Gene identifiers may carry a `_gen` suffix that the workflow has to
        // know about; the first up-regulated gene is representative.
        let gen_suffix = up_genes[0].ends_with("_gen");

        let values = self.config.values()?;
        let dir_names = self.config.percentage_dir_names(&values);
        let exp_labels = self.config.experiment_labels();

        if self.continue_run {
            if !self.out_dir.is_dir() {
                bail!(
                    "--continue requires an existing directory: {}",
                    self.out_dir.display()
                );
            }
        } else {
            if self.out_dir.exists() {
                bail!(
                    "output directory {} already exists (use --continue to resume)",
                    self.out_dir.display()
                );
            }
            fs::create_dir_all(&self.out_dir)
                .with_context(|| format!("cannot create {}", self.out_dir.display()))?;
            self.config.write_info(&self.out_dir)?;
        }

        let mut rng = match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        for (&n, dir_name) in values.iter().zip(&dir_names) {
            let k_up = sample_size(n, up_genes.len());
            let k_down = sample_size(n, down_genes.len());
            info!("{dir_name} ({k_up} up, {k_down} down per draw)");
            let pct_dir = self.out_dir.join(dir_name);
            fs::create_dir_all(&pct_dir)
                .with_context(|| format!("cannot create {}", pct_dir.display()))?;

            for label in &exp_labels {
                let exp_dir = pct_dir.join(label);
                if self.continue_run && RunOutcome::classify(&exp_dir).is_usable() {
                    debug!("  -- {label}: already complete, skipping");
                    continue;
                }
                info!("  -- {label}");
                fs::create_dir_all(&exp_dir)
                    .with_context(|| format!("cannot create {}", exp_dir.display()))?;

                let picked_up = draw(&mut rng, &up_genes, k_up);
                let picked_down = draw(&mut rng, &down_genes, k_down);
                write_observations(&exp_dir.join(OBS_FILE), &picked_up, &picked_down)?;

                self.construct_inputs(&exp_dir)?;
                self.run_solver(&exp_dir, gen_suffix)?;
            }
        }
        Ok(())
    }

    /// Completes the drawn observations with network inputs. The filter
    /// script exits with 1 when nothing matches, which is not an error.
    fn construct_inputs(&self, exp_dir: &Path) -> Result<()> {
        let script = self.options.scripts_dir.join("construct-inputs.sh");
        let mut cmd = Command::new("sh");
        cmd.arg(&script)
            .arg(&self.sif_file)
            .arg(exp_dir.join(OBS_FILE));
        let output = run_checked(&mut cmd, true)?;
        let with_inputs = exp_dir.join(OBS_WITH_INPUTS_FILE);
        fs::write(&with_inputs, &output.stdout)
            .with_context(|| format!("cannot write {}", with_inputs.display()))
    }

    /// Invokes the solver workflow and captures its stdout as the result file.
    fn run_solver(&self, exp_dir: &Path, gen_suffix: bool) -> Result<()> {
        let script = self.options.scripts_dir.join("workflow-iggy.sh");
        let mut cmd = Command::new("sh");
        cmd.arg(&script);
        if gen_suffix {
            cmd.arg("--gen");
        }
        cmd.arg("--iggy-command")
            .arg(&self.options.iggy_command)
            .arg(exp_dir.join(OBS_WITH_INPUTS_FILE))
            .arg(&self.sif_file)
            .arg(&self.data_file)
            .arg("0")
            .arg("0")
            .arg(exp_dir.join(SOLVER_LOG_FILE));
        let output = run_checked(&mut cmd, false)?;
        let result = exp_dir.join(RESULT_FILE);
        fs::write(&result, &output.stdout)
            .with_context(|| format!("cannot write {}", result.display()))
    }
}

/// Number of genes to draw for a percentage `n` of a list.
pub fn sample_size(n: f64, list_len: usize) -> usize {
    (n / 100.0 * list_len as f64).round() as usize
}

/// Draws `k` genes uniformly without replacement.
pub fn draw(rng: &mut StdRng, genes: &[String], k: usize) -> Vec<String> {
    genes.choose_multiple(rng, k).cloned().collect()
}

/// Writes signed observations, one `gene = +` / `gene = -` line per gene.
pub fn write_observations(path: &Path, up: &[String], down: &[String]) -> Result<()> {
    let mut file =
        File::create(path).with_context(|| format!("cannot create {}", path.display()))?;
    for gene in up {
        writeln!(file, "{gene} = +")?;
    }
    for gene in down {
        writeln!(file, "{gene} = -")?;
    }
    Ok(())
}

/// Runs a command and checks its exit code; `filter` commands may exit with 1
/// to signal "no matches". Anything else aborts with the captured stderr.
fn run_checked(cmd: &mut Command, filter: bool) -> Result<Output> {
    debug!("About to spawn: {cmd:?}");
    let output = cmd
        .output()
        .with_context(|| format!("failed to spawn {cmd:?}"))?;
    let accepted = match output.status.code() {
        Some(0) => true,
        Some(1) => filter,
        _ => false,
    };
    if !accepted {
        bail!(
            "command {:?} exited with status {:?}:\n{}",
            cmd,
            output.status,
            String::from_utf8_lossy(&output.stderr)
        );
    }
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sampling::DEFAULT_PREFIX;
    use std::collections::HashSet;
    use tempfile::tempdir;

    #[test]
    fn sample_sizes_round_the_fraction() {
        assert_eq!(sample_size(10.0, 10), 1);
        assert_eq!(sample_size(20.0, 10), 2);
        assert_eq!(sample_size(15.0, 10), 2);
        assert_eq!(sample_size(0.0, 10), 0);
        assert_eq!(sample_size(100.0, 7), 7);
    }

    #[test]
    fn draws_are_without_replacement() {
        let genes: Vec<String> = (0..100).map(|i| format!("G{i}")).collect();
        let mut rng = StdRng::seed_from_u64(7);
        let picked = draw(&mut rng, &genes, 50);
        assert_eq!(picked.len(), 50);
        let unique: HashSet<&String> = picked.iter().collect();
        assert_eq!(unique.len(), 50);
        assert!(picked.iter().all(|g| genes.contains(g)));
    }

    #[test]
    fn observations_are_signed_lines() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("obs-noinputs.obs");
        write_observations(&path, &["A".into(), "B".into()], &["C".into()]).unwrap();
        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "A = +\nB = +\nC = -\n"
        );
    }

    fn write_stub_scripts(scripts_dir: &Path) {
        fs::create_dir_all(scripts_dir).unwrap();
        // Stand-ins for the real shell helpers: the filter passes the
        // observations through, the workflow emits an empty result table.
        fs::write(
            scripts_dir.join("construct-inputs.sh"),
            "#!/bin/sh\ncat \"$2\"\n",
        )
        .unwrap();
        fs::write(
            scripts_dir.join("workflow-iggy.sh"),
            "#!/bin/sh\nprintf 'gene\\tprediction\\tfold-change\\n'\n",
        )
        .unwrap();
    }

    fn write_gene_list(path: &Path, prefix: &str, count: usize) {
        let lines: Vec<String> = (0..count).map(|i| format!("{prefix}{i}")).collect();
        fs::write(path, lines.join("\n")).unwrap();
    }

    fn stub_driver(root: &Path, out_dir: PathBuf) -> SamplingDriver {
        SamplingDriver {
            config: SamplingConfig::new(DEFAULT_PREFIX, 10.0, 20.0, 10.0, 2).unwrap(),
            options: IggyOptions {
                scripts_dir: root.join("scripts"),
                // Resolvable on any PATH; the stub workflow never calls it.
                iggy_command: "true".to_string(),
            },
            sif_file: root.join("graph.sif"),
            data_file: root.join("data.csv"),
            out_dir,
            continue_run: false,
            seed: Some(42),
        }
    }

    #[test]
    fn driver_builds_the_expected_tree() {
        let root = tempdir().unwrap();
        write_stub_scripts(&root.path().join("scripts"));
        let up = root.path().join("up.txt");
        let down = root.path().join("down.txt");
        write_gene_list(&up, "UP", 10);
        write_gene_list(&down, "DOWN", 10);
        fs::write(root.path().join("graph.sif"), "").unwrap();
        fs::write(root.path().join("data.csv"), "").unwrap();

        let out_dir = root.path().join("prp-10-20-10-2");
        let driver = stub_driver(root.path(), out_dir.clone());
        driver.run(&up, &down).unwrap();

        assert!(out_dir.join("prp-info.csv").is_file());
        for (pct_dir, per_list) in [("prp010", 1), ("prp020", 2)] {
            for exp in ["1", "2"] {
                let exp_dir = out_dir.join(pct_dir).join(exp);
                let obs = fs::read_to_string(exp_dir.join(OBS_FILE)).unwrap();
                let ups = obs.lines().filter(|l| l.ends_with("= +")).count();
                let downs = obs.lines().filter(|l| l.ends_with("= -")).count();
                assert_eq!(ups, per_list);
                assert_eq!(downs, per_list);
                // The stub filter passes the observations through unchanged.
                assert_eq!(
                    fs::read_to_string(exp_dir.join(OBS_WITH_INPUTS_FILE)).unwrap(),
                    obs
                );
                assert!(exp_dir.join(RESULT_FILE).is_file());
            }
            assert_eq!(fs::read_dir(out_dir.join(pct_dir)).unwrap().count(), 2);
        }
    }

    #[test]
    fn continue_mode_skips_completed_runs() {
        let root = tempdir().unwrap();
        write_stub_scripts(&root.path().join("scripts"));
        let up = root.path().join("up.txt");
        let down = root.path().join("down.txt");
        write_gene_list(&up, "UP", 10);
        write_gene_list(&down, "DOWN", 10);
        fs::write(root.path().join("graph.sif"), "").unwrap();
        fs::write(root.path().join("data.csv"), "").unwrap();

        let out_dir = root.path().join("tree");
        let driver = stub_driver(root.path(), out_dir.clone());
        driver.run(&up, &down).unwrap();

        let obs_path = out_dir.join("prp010").join("1").join(OBS_FILE);
        let before = fs::read_to_string(&obs_path).unwrap();

        // A fresh run into the same directory must fail...
        assert!(driver.run(&up, &down).is_err());

        // ...while continuing leaves completed draws untouched.
        let mut resumed = stub_driver(root.path(), out_dir.clone());
        resumed.continue_run = true;
        resumed.seed = Some(1234);
        resumed.run(&up, &down).unwrap();
        assert_eq!(fs::read_to_string(&obs_path).unwrap(), before);
    }
}
