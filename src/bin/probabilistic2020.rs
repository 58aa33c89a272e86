use std::path::Path;
use std::process::ExitCode;
use std::time::Instant;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use colored::Colorize;

use prob2020::cancel::{CancelToken, install_sigint_handler};
use prob2020::cli::{self, RunArgs};
use prob2020::config::RunConfig;
use prob2020::distributor::{RunInputs, run_gene_tests};
use prob2020::error::Error;
use prob2020::randomization::{GeneResult, TestKind};
use prob2020::report;

#[derive(Parser)]
#[command(
    name = "probabilistic2020",
    about = "Per-gene permutation tests for tumour suppressor and oncogene signals"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Excess of inactivating mutations
    Tsg {
        #[command(flatten)]
        run: RunArgs,

        /// Minimum inactivating mutations for a gene to be tested [default: 1]
        #[arg(short = 'd', long = "deleterious")]
        deleterious: Option<u32>,
    },
    /// Clustered and recurrent missense mutations
    Oncogene {
        #[command(flatten)]
        run: RunArgs,

        /// Minimum missense hits at a codon to call it recurrent [default: 3]
        #[arg(short = 'r', long = "recurrent")]
        recurrent: Option<usize>,

        /// Minimum fraction of a gene's mutations at a recurrent codon [default: 0.02]
        #[arg(short = 'f', long = "fraction")]
        fraction: Option<f64>,
    },
}

impl Command {
    fn run_args(&self) -> &RunArgs {
        match self {
            Self::Tsg { run, .. } | Self::Oncogene { run, .. } => run,
        }
    }

    fn kind(&self) -> TestKind {
        match self {
            Self::Tsg { .. } => TestKind::Tsg,
            Self::Oncogene { .. } => TestKind::Oncogene,
        }
    }

    fn to_config(&self) -> Result<RunConfig> {
        let mut config = self.run_args().to_config()?;
        match *self {
            Self::Tsg { deleterious, .. } => {
                if let Some(v) = deleterious {
                    config.deleterious = v;
                }
            }
            Self::Oncogene {
                recurrent, fraction, ..
            } => {
                if let Some(v) = recurrent {
                    config.recurrent = v;
                }
                if let Some(v) = fraction {
                    config.fraction = v;
                }
            }
        }
        Ok(config)
    }
}

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) if matches!(e.downcast_ref::<Error>(), Some(Error::Cancelled)) => {
            eprintln!("{}", "cancelled by user".yellow());
            ExitCode::from(130)
        }
        Err(e) => {
            eprintln!("{} {e:#}", "error:".red().bold());
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<()> {
    let start = Instant::now();
    let cli_args = Cli::parse();
    let kind = cli_args.command.kind();
    let args = cli_args.command.run_args();

    cli::init_logging(&args.log_level, args.log.as_deref())?;
    cli::banner(&format!("{kind} test"));

    // ── Configuration ────────────────────────────────────
    cli::section("Configuration");

    let config = cli_args.command.to_config()?;
    config.validate()?;
    let Some(output) = config.output.clone() else {
        bail!("an output path is required (-o)");
    };
    cli::print_config(&config);
    cli::kv("Stop criteria", &config.stop_criteria.to_string());
    match kind {
        TestKind::Tsg => cli::kv("Deleterious", &config.deleterious.to_string()),
        TestKind::Oncogene => cli::kv(
            "Recurrence",
            &format!("{} hits or {} of mutations", config.recurrent, config.fraction),
        ),
    }
    cli::kv("Output", &output.display().to_string());
    eprintln!();

    // ── Inputs ───────────────────────────────────────────
    cli::section("Inputs");
    let inputs = cli::load_inputs(&config)?;
    eprintln!();

    // ── Permutation ──────────────────────────────────────
    cli::section("Permutation");

    let cancel = CancelToken::new();
    if !install_sigint_handler(&cancel) {
        cli::warning("Ctrl-C will terminate without cleanup");
    }
    let run_inputs = RunInputs {
        genes: &inputs.genes,
        mutations: &inputs.mutations,
        genome: &inputs.genome,
        config: &config,
        cancel: &cancel,
    };
    let mut summary = run_gene_tests(&run_inputs, kind)?;

    let tested = summary.results.iter().filter(|r| r.iterations > 0).count();
    cli::kv("Genes reported", &summary.results.len().to_string());
    cli::kv("Genes permuted", &tested.to_string());
    if !summary.failures.is_empty() {
        cli::warning(&format!("{} genes excluded (see log)", summary.failures.len()));
    }
    eprintln!();

    // ── Output ───────────────────────────────────────────
    cli::section("Output");

    report::sort_by_significance(&mut summary.results);
    write_results(&output, &summary.results)?;
    cli::success(&format!("wrote {}", output.display()));

    cli::print_summary(start);
    Ok(())
}

fn write_results(path: &Path, results: &[GeneResult]) -> Result<()> {
    let mut writer = report::create_writer(path)
        .with_context(|| format!("failed to create output: {}", path.display()))?;
    report::write_gene_results(&mut writer, results)
        .with_context(|| format!("failed to write output: {}", path.display()))?;
    Ok(())
}
