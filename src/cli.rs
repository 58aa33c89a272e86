//! Shared terminal output helpers for the prob2020 binaries.

use std::collections::BTreeMap;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use tracing_subscriber::EnvFilter;

use crate::bed::{GeneRecord, read_bed};
use crate::config::RunConfig;
use crate::context::ContextOrder;
use crate::fasta::ReferenceGenome;
use crate::mutation::{MutationTable, read_mutations};
use crate::permutation::SubstitutionPolicy;

/// Options shared by every permutation command. Unset flags keep the value
/// from `--config`, or the built-in default.
#[derive(Debug, Args)]
pub struct RunArgs {
    /// JSON run configuration (camelCase keys)
    #[arg(long = "config")]
    pub config: Option<PathBuf>,

    /// Somatic mutations (tab separated, gzip allowed)
    #[arg(short = 'm', long = "mutations")]
    pub mutations: Option<PathBuf>,

    /// BED12 gene models
    #[arg(short = 'b', long = "bed")]
    pub bed: Option<PathBuf>,

    /// Reference genome FASTA (gzip allowed)
    #[arg(short = 'g', long = "genome", visible_alias = "input")]
    pub genome: Option<PathBuf>,

    /// Output table
    #[arg(short = 'o', long = "output")]
    pub output: Option<PathBuf>,

    /// Nucleotide context: 0, 1, 1.5, 2 or 3 [default: 1.5]
    #[arg(short = 'c', long = "context")]
    pub context: Option<ContextOrder>,

    /// Number of permutations [default: 100000]
    #[arg(short = 'n', long = "num-iterations")]
    pub num_iterations: Option<usize>,

    /// Extreme null draws after which a statistic stops [default: 1000]
    #[arg(long = "stop-criteria")]
    pub stop_criteria: Option<usize>,

    /// Worker threads; 0 runs on the main thread [default: 0]
    #[arg(short = 'p', long = "processes")]
    pub processes: Option<usize>,

    /// Master seed of the random number generator [default: 101]
    #[arg(long = "seed")]
    pub seed: Option<u64>,

    /// Keep one copy of each mutation per sample
    #[arg(long = "unique")]
    pub unique: bool,

    /// Also relocate mutations that miss the gene model (needs the genome)
    #[arg(short = 'u', long = "use-unmapped")]
    pub use_unmapped: bool,

    /// How relocated mutations pick their somatic base [default: empirical]
    #[arg(long = "substitution", value_enum)]
    pub substitution: Option<SubstitutionPolicy>,

    /// Log filter, e.g. `info` or `prob2020=debug`
    #[arg(long = "log-level", default_value = "warn")]
    pub log_level: String,

    /// Write log events to this file instead of stderr
    #[arg(short = 'l', long = "log")]
    pub log: Option<PathBuf>,
}

impl RunArgs {
    /// Load `--config` (if any) and apply the command-line overrides.
    pub fn to_config(&self) -> Result<RunConfig> {
        let mut config = match &self.config {
            Some(path) => RunConfig::from_file(path)?,
            None => RunConfig::default(),
        };
        let paths = [
            (&self.mutations, &mut config.mutations),
            (&self.bed, &mut config.bed),
            (&self.genome, &mut config.genome),
            (&self.output, &mut config.output),
        ];
        for (arg, field) in paths {
            if let Some(p) = arg {
                *field = Some(p.clone());
            }
        }
        if let Some(v) = self.context {
            config.context = v;
        }
        if let Some(v) = self.num_iterations {
            config.num_iterations = v;
        }
        if let Some(v) = self.stop_criteria {
            config.stop_criteria = v;
        }
        if let Some(v) = self.processes {
            config.processes = v;
        }
        if let Some(v) = self.seed {
            config.seed = v;
        }
        if let Some(v) = self.substitution {
            config.substitution = v;
        }
        config.unique |= self.unique;
        config.use_unmapped |= self.use_unmapped;
        Ok(config)
    }
}

/// Print the settings every command shares.
pub fn print_config(config: &RunConfig) {
    let show = |p: &Option<PathBuf>| p.as_ref().map_or_else(|| "-".to_string(), |p| p.display().to_string());
    kv("Mutations", &show(&config.mutations));
    kv("Gene models", &show(&config.bed));
    kv("Genome", &show(&config.genome));
    kv("Context", &config.context.to_string());
    kv("Iterations", &config.num_iterations.to_string());
    kv("Processes", &config.processes.to_string());
    kv("Seed", &config.seed.to_string());
    kv("Substitution", &config.substitution.to_string());
    if config.use_unmapped {
        kv("Unmapped", "included");
    }
}

pub fn banner(subtitle: &str) {
    eprintln!();
    eprintln!("{} {}", "prob2020".bold().cyan(), subtitle.dimmed());
    eprintln!("{}", "permutation tests for cancer driver genes".dimmed());
    eprintln!();
}

pub fn section(title: &str) {
    let bar = "─".repeat(50);
    eprintln!("{} {}", title.bold().blue(), bar.dimmed());
}

pub fn kv(key: &str, value: &str) {
    eprintln!("  {:<20} {}", key.dimmed(), value);
}

pub fn success(msg: &str) {
    eprintln!("  {} {}", "✓".green().bold(), msg);
}

pub fn warning(msg: &str) {
    eprintln!("  {} {}", "⚠".yellow(), msg.yellow());
}

/// Gene models, mutations and reference loaded for a run.
pub struct LoadedInputs {
    pub genes: BTreeMap<String, Vec<GeneRecord>>,
    pub mutations: MutationTable,
    pub genome: ReferenceGenome,
}

/// Load the inputs named by a validated configuration, reporting as it goes.
pub fn load_inputs(config: &RunConfig) -> Result<LoadedInputs> {
    let (Some(bed), Some(mutations), Some(genome)) = (&config.bed, &config.mutations, &config.genome)
    else {
        anyhow::bail!("configuration is missing an input path");
    };

    let genes = read_bed(bed).with_context(|| format!("failed to read BED file: {}", bed.display()))?;
    let num_genes: usize = genes.values().map(Vec::len).sum();
    kv("Genes", &format!("{num_genes} on {} chromosomes", genes.len()));

    let (mutations, stats) = read_mutations(mutations, config.unique)
        .with_context(|| format!("failed to read mutations: {}", mutations.display()))?;
    kv(
        "Mutations",
        &format!("{} SNVs from {} samples", mutations.len(), mutations.sample_counts().len()),
    );
    let dropped = stats.missing_fields + stats.not_snv + stats.duplicates;
    if dropped > 0 {
        warning(&format!(
            "dropped {dropped} rows ({} incomplete, {} not SNV, {} duplicate)",
            stats.missing_fields, stats.not_snv, stats.duplicates
        ));
    }

    let genome = ReferenceGenome::from_path(genome)
        .with_context(|| format!("failed to read genome: {}", genome.display()))?;
    kv("Contigs", &genome.len().to_string());

    Ok(LoadedInputs {
        genes,
        mutations,
        genome,
    })
}

/// Formats a duration as HH:MM:SS.d (tenths of a second).
#[must_use]
pub fn format_elapsed(d: Duration) -> String {
    let total_secs = d.as_secs();
    let tenths = d.subsec_millis() / 100;
    format!(
        "{:02}:{:02}:{:02}.{tenths}",
        total_secs / 3600,
        (total_secs % 3600) / 60,
        total_secs % 60
    )
}

pub fn print_summary(start: Instant) {
    eprintln!();
    eprintln!("{}  {}", "Time".dimmed(), format_elapsed(start.elapsed()).bold());
    eprintln!();
}

/// Install the global `tracing` subscriber.
///
/// Events go to `log_file` when given, otherwise to stderr. `level` takes an
/// `EnvFilter` directive such as `info` or `prob2020=debug`.
pub fn init_logging(level: &str, log_file: Option<&Path>) -> Result<()> {
    let filter = EnvFilter::try_new(level).with_context(|| format!("invalid log level: '{level}'"))?;
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false);
    match log_file {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("failed to create log file: {}", path.display()))?;
            builder.with_ansi(false).with_writer(Mutex::new(file)).init();
        }
        None => builder.with_writer(std::io::stderr).init(),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn elapsed_format() {
        assert_eq!(format_elapsed(Duration::from_millis(0)), "00:00:00.0");
        assert_eq!(format_elapsed(Duration::from_millis(3_723_450)), "01:02:03.4");
    }

    #[derive(clap::Parser)]
    struct TestCli {
        #[command(flatten)]
        run: RunArgs,
    }

    #[test]
    fn flags_override_defaults() {
        use clap::Parser;
        let cli = TestCli::parse_from(["t", "-c", "3", "-n", "50", "--unique", "--substitution", "uniform"]);
        let config = cli.run.to_config().unwrap();
        assert_eq!(config.context, ContextOrder::Three);
        assert_eq!(config.num_iterations, 50);
        assert!(config.unique);
        assert_eq!(config.substitution, SubstitutionPolicy::Uniform);
        assert_eq!(config.seed, 101);
        assert!(TestCli::try_parse_from(["t", "-c", "2.5"]).is_err());
    }

    #[test]
    fn bad_log_level_rejected() {
        assert!(init_logging("prob2020=loud", None).is_err());
    }
}
