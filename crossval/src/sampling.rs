use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};

use crate::helper_functions::read_tsv_rows;

/// Info file persisted at the root of a sampling tree.
pub const INFO_FILE: &str = "prp-info.csv";
/// Prefix of the percentage directories.
pub const DEFAULT_PREFIX: &str = "prp";

/// Configuration of one random-pick cross-validation: a percentage range
/// walked inclusively from `start` to `stop` by `step`, with
/// `num_experiments` draws per percentage.
#[derive(Debug, Clone, PartialEq)]
pub struct SamplingConfig {
    pub prefix: String,
    pub start: f64,
    pub stop: f64,
    pub step: f64,
    pub num_experiments: usize,
}

impl SamplingConfig {
    pub fn new(
        prefix: impl Into<String>,
        start: f64,
        stop: f64,
        step: f64,
        num_experiments: usize,
    ) -> Result<Self> {
        if step <= 0.0 {
            bail!("sampling step must be positive, got {step}");
        }
        if num_experiments == 0 {
            bail!("at least one experiment per sampling is required");
        }
        let config = SamplingConfig {
            prefix: prefix.into(),
            start,
            stop,
            step,
            num_experiments,
        };
        config.values()?;
        Ok(config)
    }

    /// The inclusive percentage sequence; every value must be a percentage.
    pub fn values(&self) -> Result<Vec<f64>> {
        let mut values = Vec::new();
        let mut current = self.start;
        while current <= self.stop {
            if !(0.0..=100.0).contains(&current) {
                bail!("this value is not a correct percentage: {current}");
            }
            values.push(current);
            current += self.step;
        }
        Ok(values)
    }

    /// Zero-padded experiment directory names, `1..=num_experiments`.
    pub fn experiment_labels(&self) -> Vec<String> {
        let width = self.num_experiments.to_string().len();
        (1..=self.num_experiments)
            .map(|i| format!("{i:0width$}"))
            .collect()
    }

    /// Directory name for each percentage value.
    ///
    /// Integer ranges use a three-digit form (`prp010`); as soon as one value
    /// has a fractional part, all names switch to a fixed-width four-decimal
    /// form. When rounding makes a name collide with its predecessor, `x`
    /// suffixes keep it unique while staying discoverable by re-deriving the
    /// names in the same order.
    pub fn percentage_dir_names(&self, values: &[f64]) -> Vec<String> {
        let decimal = has_decimal_part(values);
        let mut names: Vec<String> = Vec::with_capacity(values.len());
        for &n in values {
            let mut name = if decimal {
                format!("{}{:08.4}", self.prefix, n)
            } else {
                format!("{}{:03.0}", self.prefix, n)
            };
            if let Some(previous) = names.last() {
                while previous.contains(&name) {
                    name.push('x');
                }
            }
            names.push(name);
        }
        names
    }

    /// Writes the single-row tab-delimited info file into `dir`.
    pub fn write_info(&self, dir: &Path) -> Result<()> {
        let path = dir.join(INFO_FILE);
        let line = format!(
            "{}\t{}\t{}\t{}\t{}",
            self.prefix, self.start, self.stop, self.step, self.num_experiments
        );
        fs::write(&path, line).with_context(|| format!("cannot write {}", path.display()))
    }

    /// Reconstructs the configuration persisted at the root of a sampling tree.
    pub fn load_info(dir: &Path) -> Result<Self> {
        let path = dir.join(INFO_FILE);
        let rows = read_tsv_rows(&path, 0)?;
        let row = rows
            .first()
            .with_context(|| format!("{} is empty", path.display()))?;
        if row.len() < 5 {
            bail!(
                "{} should hold prefix, start, stop, step and experiment count",
                path.display()
            );
        }
        let parse = |i: usize| -> Result<f64> {
            row[i]
                .parse::<f64>()
                .with_context(|| format!("bad number '{}' in {}", row[i], path.display()))
        };
        let num_experiments = row[4]
            .parse::<usize>()
            .with_context(|| format!("bad experiment count '{}' in {}", row[4], path.display()))?;
        SamplingConfig::new(row[0].clone(), parse(1)?, parse(2)?, parse(3)?, num_experiments)
    }
}

pub fn has_decimal_part(values: &[f64]) -> bool {
    values.iter().any(|v| v.fract() != 0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use tempfile::tempdir;

    fn config(start: f64, stop: f64, step: f64, num: usize) -> SamplingConfig {
        SamplingConfig::new(DEFAULT_PREFIX, start, stop, step, num).unwrap()
    }

    #[test]
    fn values_walk_the_range_inclusively() {
        let values = config(10.0, 20.0, 10.0, 1).values().unwrap();
        assert_eq!(values, vec![10.0, 20.0]);

        let values = config(10.0, 95.0, 5.0, 1).values().unwrap();
        assert_relative_eq!(values[0], 10.0);
        let last = *values.last().unwrap();
        assert!(last <= 95.0 && last > 90.0);
        assert!(values.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn values_reject_bad_percentages() {
        assert!(SamplingConfig::new("prp", -5.0, 20.0, 5.0, 1).is_err());
        assert!(SamplingConfig::new("prp", 95.0, 110.0, 10.0, 1).is_err());
        assert!(SamplingConfig::new("prp", 10.0, 20.0, 0.0, 1).is_err());
    }

    #[test]
    fn experiment_labels_are_zero_padded() {
        let labels = config(10.0, 10.0, 5.0, 100).experiment_labels();
        assert_eq!(labels.first().unwrap(), "001");
        assert_eq!(labels.last().unwrap(), "100");

        let labels = config(10.0, 10.0, 5.0, 2).experiment_labels();
        assert_eq!(labels, vec!["1", "2"]);
    }

    #[test]
    fn integer_percentages_use_three_digit_names() {
        let cfg = config(10.0, 100.0, 45.0, 1);
        let values = cfg.values().unwrap();
        assert_eq!(
            cfg.percentage_dir_names(&values),
            vec!["prp010", "prp055", "prp100"]
        );
    }

    #[test]
    fn fractional_percentages_use_four_decimal_names() {
        let cfg = config(10.0, 11.0, 0.5, 1);
        let values = cfg.values().unwrap();
        let names = cfg.percentage_dir_names(&values);
        assert_eq!(names[0], "prp010.0000");
        assert_eq!(names[1], "prp010.5000");
    }

    #[test]
    fn colliding_names_get_x_suffixes() {
        let cfg = config(50.0, 50.0, 5.0, 1);
        let names = cfg.percentage_dir_names(&[50.0, 50.0, 50.0]);
        assert_eq!(names, vec!["prp050", "prp050x", "prp050xx"]);
    }

    #[test]
    fn info_file_roundtrips() {
        let dir = tempdir().unwrap();
        let cfg = config(10.0, 95.0, 5.0, 100);
        cfg.write_info(dir.path()).unwrap();
        let loaded = SamplingConfig::load_info(dir.path()).unwrap();
        assert_eq!(loaded, cfg);
    }
}
