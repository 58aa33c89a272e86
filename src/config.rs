use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use serde::Deserialize;

use crate::context::ContextOrder;
use crate::permutation::SubstitutionPolicy;
use crate::randomization::{StatisticParams, TestKind, TestOptions};

/// Settings of a permutation run, loaded from JSON and overridden from the CLI.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct RunConfig {
    pub mutations: Option<PathBuf>,
    pub bed: Option<PathBuf>,
    pub genome: Option<PathBuf>,
    pub output: Option<PathBuf>,
    pub context: ContextOrder,
    pub num_iterations: usize,
    pub stop_criteria: usize,
    pub processes: usize,
    pub seed: u64,
    pub use_unmapped: bool,
    pub unique: bool,
    pub shuffle_genes: bool,
    pub substitution: SubstitutionPolicy,
    pub recurrent: usize,
    pub fraction: f64,
    pub deleterious: u32,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            mutations: None,
            bed: None,
            genome: None,
            output: None,
            context: ContextOrder::OnePointFive,
            num_iterations: 100_000,
            stop_criteria: 1000,
            processes: 0,
            seed: 101,
            use_unmapped: false,
            unique: false,
            shuffle_genes: false,
            substitution: SubstitutionPolicy::Empirical,
            recurrent: 3,
            fraction: 0.02,
            deleterious: 1,
        }
    }
}

impl RunConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse config file: {}", path.display()))?;
        Ok(config)
    }

    /// Check the merged configuration before any work starts.
    pub fn validate(&self) -> Result<()> {
        if self.num_iterations == 0 {
            bail!("number of iterations must be positive");
        }
        if self.stop_criteria == 0 {
            bail!("stop criteria must be positive");
        }
        if !(0.0..=1.0).contains(&self.fraction) {
            bail!("fraction must lie in [0, 1], got {}", self.fraction);
        }
        if self.use_unmapped && self.genome.is_none() {
            bail!("a genome FASTA is required when use-unmapped is set");
        }
        for (name, path) in self.required_inputs() {
            let Some(path) = path else {
                bail!("missing required input: {name}");
            };
            if !path.exists() {
                bail!("{name} file not found: {}", path.display());
            }
        }
        Ok(())
    }

    fn required_inputs(&self) -> [(&str, Option<&PathBuf>); 3] {
        [
            ("mutations", self.mutations.as_ref()),
            ("bed", self.bed.as_ref()),
            ("genome", self.genome.as_ref()),
        ]
    }

    #[must_use]
    pub fn test_options(&self, kind: TestKind) -> TestOptions {
        TestOptions {
            kind,
            num_permutations: self.num_iterations,
            stop_criteria: self.stop_criteria,
            policy: self.substitution,
            params: StatisticParams {
                recurrent: self.recurrent,
                fraction: self.fraction,
            },
            deleterious: self.deleterious,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_file(content: &str) -> NamedTempFile {
        let mut f = NamedTempFile::new().unwrap();
        f.write_all(content.as_bytes()).unwrap();
        f
    }

    #[test]
    fn defaults_when_keys_omitted() {
        let f = write_file("{}");
        let config = RunConfig::from_file(f.path()).unwrap();
        assert_eq!(config.context, ContextOrder::OnePointFive);
        assert_eq!(config.num_iterations, 100_000);
        assert_eq!(config.stop_criteria, 1000);
        assert_eq!(config.seed, 101);
        assert_eq!(config.substitution, SubstitutionPolicy::Empirical);
        assert!(!config.use_unmapped);
    }

    #[test]
    fn camel_case_keys() {
        let json = r#"{
            "context": 3,
            "numIterations": 500,
            "stopCriteria": 50,
            "processes": 4,
            "seed": 7,
            "useUnmapped": true,
            "shuffleGenes": true,
            "substitution": "uniform",
            "genome": "/tmp/genome.fa"
        }"#;
        let f = write_file(json);
        let config = RunConfig::from_file(f.path()).unwrap();
        assert_eq!(config.context, ContextOrder::Three);
        assert_eq!(config.num_iterations, 500);
        assert_eq!(config.processes, 4);
        assert!(config.shuffle_genes);
        assert_eq!(config.substitution, SubstitutionPolicy::Uniform);
        assert_eq!(config.genome.as_deref(), Some(Path::new("/tmp/genome.fa")));
    }

    #[test]
    fn invalid_context_order_rejected() {
        let f = write_file(r#"{ "context": 2.5 }"#);
        let err = RunConfig::from_file(f.path()).unwrap_err();
        assert!(err.to_string().contains("failed to parse config file"));
    }

    #[test]
    fn unknown_key_rejected() {
        let f = write_file(r#"{ "numIteration": 5 }"#);
        assert!(RunConfig::from_file(f.path()).is_err());
    }

    #[test]
    fn validation_fails_fast() {
        let input = write_file("x");
        let complete = RunConfig {
            mutations: Some(input.path().to_path_buf()),
            bed: Some(input.path().to_path_buf()),
            genome: Some(input.path().to_path_buf()),
            ..RunConfig::default()
        };
        assert!(complete.validate().is_ok());

        let zero = RunConfig {
            num_iterations: 0,
            ..complete.clone()
        };
        assert!(zero.validate().unwrap_err().to_string().contains("iterations"));

        let no_stop = RunConfig {
            stop_criteria: 0,
            ..complete.clone()
        };
        assert!(no_stop.validate().is_err());

        let unmapped = RunConfig {
            use_unmapped: true,
            genome: None,
            ..complete.clone()
        };
        assert!(unmapped.validate().unwrap_err().to_string().contains("genome"));

        let missing = RunConfig {
            bed: Some(PathBuf::from("/nonexistent/genes.bed")),
            ..complete
        };
        assert!(missing.validate().unwrap_err().to_string().contains("not found"));
    }
}
