use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Instant;

use anyhow::{Context, Result, bail};
use clap::Parser;
use colored::Colorize;

use prob2020::cancel::{CancelToken, install_sigint_handler};
use prob2020::classify::CategoryCounts;
use prob2020::cli::{self, RunArgs};
use prob2020::distributor::{RunInputs, multiprocess_gene_shuffle, multiprocess_permutation};
use prob2020::error::Error;
use prob2020::report;

#[derive(Parser)]
#[command(
    name = "simulate_non_silent_ratio",
    about = "Genome-wide null distribution of non-silent and silent mutation counts"
)]
struct Cli {
    #[command(flatten)]
    run: RunArgs,

    /// Reassign each gene's mutations to another mutated gene before permuting
    #[arg(short = 's', long = "shuffle-genes")]
    shuffle_genes: bool,

    /// Also write the observed category totals here
    #[arg(long = "observed")]
    observed: Option<PathBuf>,
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

    cli::init_logging(&cli_args.run.log_level, cli_args.run.log.as_deref())?;
    cli::banner("Simulate Non-Silent Ratio");

    // ── Configuration ────────────────────────────────────
    cli::section("Configuration");

    let mut config = cli_args.run.to_config()?;
    config.shuffle_genes |= cli_args.shuffle_genes;
    config.validate()?;
    let Some(output) = config.output.clone() else {
        bail!("an output path is required (-o)");
    };
    cli::print_config(&config);
    cli::kv("Shuffle genes", if config.shuffle_genes { "yes" } else { "no" });
    cli::kv("Output", &output.display().to_string());
    eprintln!();

    // ── Inputs ───────────────────────────────────────────
    cli::section("Inputs");
    let inputs = cli::load_inputs(&config)?;
    eprintln!();

    // ── Simulation ───────────────────────────────────────
    cli::section("Simulation");

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
    let summary = if config.shuffle_genes {
        multiprocess_gene_shuffle(&run_inputs)?
    } else {
        multiprocess_permutation(&run_inputs)?
    };

    cli::kv("Mutated genes", &summary.genes_with_mutations.to_string());
    print_observed(&summary.observed);
    let null = summary.matrix.column_sums();
    if null[1] > 0 {
        cli::kv(
            "Null ratio",
            &format!("{:.3} non-silent per silent", null[0] as f64 / null[1] as f64),
        );
    }
    if summary.skipped_mutations > 0 {
        cli::warning(&format!(
            "{} mutations per iteration had no matching context in their assigned gene",
            summary.skipped_mutations
        ));
    }
    if !summary.failures.is_empty() {
        cli::warning(&format!("{} genes excluded (see log)", summary.failures.len()));
    }
    eprintln!();

    // ── Output ───────────────────────────────────────────
    cli::section("Output");

    let mut writer = report::create_writer(&output)
        .with_context(|| format!("failed to create output: {}", output.display()))?;
    report::write_matrix(&mut writer, &summary.matrix)
        .with_context(|| format!("failed to write output: {}", output.display()))?;
    cli::success(&format!(
        "wrote {} permutations to {}",
        summary.matrix.len(),
        output.display()
    ));

    if let Some(path) = &cli_args.observed {
        let mut writer = report::create_writer(path)
            .with_context(|| format!("failed to create output: {}", path.display()))?;
        report::write_observed(&mut writer, &summary.observed)?;
        cli::success(&format!("wrote observed totals to {}", path.display()));
    }

    cli::print_summary(start);
    Ok(())
}

fn print_observed(observed: &CategoryCounts) {
    cli::kv(
        "Observed",
        &format!("{} non-silent, {} silent", observed.non_silent, observed.silent),
    );
    cli::kv(
        "",
        &format!(
            "{} missense, {} nonsense, {} lost stop, {} lost start, {} splice site",
            observed.missense,
            observed.nonsense,
            observed.lost_stop,
            observed.lost_start,
            observed.splice_site
        ),
    );
}
