//! Spreads per-gene work over chromosome batches and merges the results.
//!
//! Every gene draws from its own RNG seeded from the master seed and the
//! gene's position in the chromosome-sorted gene list, so results do not
//! depend on how many threads run the batches.

use std::collections::BTreeMap;
use std::panic::{AssertUnwindSafe, catch_unwind};

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rayon::prelude::*;
use tracing::{debug, error, info, warn};

use crate::bed::GeneRecord;
use crate::cancel::CancelToken;
use crate::classify::CategoryCounts;
use crate::codon::{CodonTable, translate};
use crate::config::RunConfig;
use crate::error::Error;
use crate::fasta::SequenceFetcher;
use crate::gene_sequence::GeneSequence;
use crate::mutation::MutationTable;
use crate::mutation_context::{GeneContext, compute_mutation_context, observed_counts};
use crate::permutation::{PermutationEngine, PermutationMatrix};
use crate::randomization::{GeneResult, TestKind, adjust_results, test_gene};

/// Stream used for the gene-identity shuffle, distinct from every gene stream.
const SHUFFLE_STREAM: usize = usize::MAX;

/// A gene that was excluded from the run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneFailure {
    pub gene_id: String,
    pub chromosome: String,
    pub reason: String,
}

/// Merged output of a genome-wide null simulation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SimulationSummary {
    pub matrix: PermutationMatrix,
    pub observed: CategoryCounts,
    pub genes_with_mutations: usize,
    /// Relocations skipped because the target gene lacked the context.
    pub skipped_mutations: usize,
    pub failures: Vec<GeneFailure>,
}

impl SimulationSummary {
    #[must_use]
    pub fn zeros(num_permutations: usize) -> Self {
        Self {
            matrix: PermutationMatrix::zeros(num_permutations),
            ..Self::default()
        }
    }

    /// Associative, commutative up to failure order; `zeros` is the identity.
    #[must_use]
    pub fn merge(mut self, other: Self) -> Self {
        self.matrix = self.matrix.merge(other.matrix);
        self.observed += other.observed;
        self.genes_with_mutations += other.genes_with_mutations;
        self.skipped_mutations += other.skipped_mutations;
        self.failures.extend(other.failures);
        self
    }
}

/// Per-gene test results in gene order, with q-values filled in.
#[derive(Debug, Clone, Default)]
pub struct TestSummary {
    pub results: Vec<GeneResult>,
    pub failures: Vec<GeneFailure>,
}

/// Genes of one chromosome, processed as one unit of work.
#[derive(Debug, Clone)]
pub struct Batch<T> {
    pub chromosome: String,
    pub items: Vec<T>,
}

/// A gene and its position in the global gene order.
#[derive(Debug, Clone, Copy)]
pub struct GeneTask<'a> {
    pub index: usize,
    pub record: &'a GeneRecord,
}

/// Read-only inputs shared by every worker.
pub struct RunInputs<'a> {
    pub genes: &'a BTreeMap<String, Vec<GeneRecord>>,
    pub mutations: &'a MutationTable,
    pub genome: &'a (dyn SequenceFetcher + Sync),
    pub config: &'a RunConfig,
    pub cancel: &'a CancelToken,
}

/// Seed of a gene's RNG stream.
#[must_use]
pub fn seed_for_gene(master_seed: u64, gene_index: usize) -> u64 {
    // splitmix64 finalizer over the combined value
    let mut z = master_seed ^ (gene_index as u64).wrapping_add(1).wrapping_mul(0x9e37_79b9_7f4a_7c15);
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    z ^ (z >> 31)
}

/// Group genes by chromosome in sorted chromosome order, numbering them globally.
#[must_use]
pub fn plan_batches(genes: &BTreeMap<String, Vec<GeneRecord>>) -> Vec<Batch<GeneTask<'_>>> {
    let mut index = 0;
    genes
        .iter()
        .filter(|(_, records)| !records.is_empty())
        .map(|(chromosome, records)| {
            let items = records
                .iter()
                .map(|record| {
                    let task = GeneTask { index, record };
                    index += 1;
                    task
                })
                .collect();
            Batch {
                chromosome: chromosome.clone(),
                items,
            }
        })
        .collect()
}

/// Run `work` on every batch: inline when `num_processes` is 0, otherwise on
/// a pool of that many threads. Results come back in batch order.
///
/// A panicking batch is logged and contributes `T::default()`.
pub fn run_batches<B, T, F>(
    batches: &[Batch<B>],
    num_processes: usize,
    cancel: &CancelToken,
    work: F,
) -> Result<Vec<T>, Error>
where
    B: Sync,
    T: Send + Default,
    F: Fn(&Batch<B>) -> Result<T, Error> + Sync,
{
    let guarded = |batch: &Batch<B>| -> Result<T, Error> {
        cancel.check()?;
        info!(chromosome = %batch.chromosome, genes = batch.items.len(), "working on chromosome");
        match catch_unwind(AssertUnwindSafe(|| work(batch))) {
            Ok(result) => {
                let out = result?;
                info!(chromosome = %batch.chromosome, "finished chromosome");
                Ok(out)
            }
            Err(_) => {
                error!(chromosome = %batch.chromosome, "worker panicked; batch contributes nothing");
                Ok(T::default())
            }
        }
    };

    let results = if num_processes == 0 {
        batches.iter().map(guarded).collect::<Result<Vec<_>, _>>()
    } else {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(num_processes)
            .build()
            .map_err(|e| Error::Config(format!("failed to build thread pool: {e}")))?;
        pool.install(|| batches.par_iter().map(guarded).collect::<Result<Vec<_>, _>>())
    };
    cancel.check()?;
    results
}

/// Build the mapped mutation context of one gene.
pub fn load_gene(
    record: &GeneRecord,
    inputs: &RunInputs<'_>,
    table: &CodonTable,
) -> Result<GeneContext, Error> {
    let sequence = GeneSequence::from_record(record, inputs.genome, inputs.config.context)?;
    if let Ok(protein) = translate(sequence.exon_seq(), table)
        && protein.split_last().is_some_and(|(_, body)| body.contains(&b'*'))
    {
        debug!(gene = %record.gene_id, "coding sequence has an internal stop codon");
    }
    let unmapped_source: Option<&dyn SequenceFetcher> = if inputs.config.use_unmapped {
        Some(inputs.genome)
    } else {
        None
    };
    compute_mutation_context(
        record,
        sequence,
        inputs.mutations.for_gene(&record.gene_id),
        unmapped_source,
    )
}

fn gene_failure(record: &GeneRecord, err: &Error) -> GeneFailure {
    warn!(gene = %record.gene_id, chromosome = %record.chromosome, error = %err, "excluding gene");
    GeneFailure {
        gene_id: record.gene_id.clone(),
        chromosome: record.chromosome.clone(),
        reason: err.to_string(),
    }
}

/// Genome-wide null distribution of category counts, merged across genes.
pub fn multiprocess_permutation(inputs: &RunInputs<'_>) -> Result<SimulationSummary, Error> {
    let n = inputs.config.num_iterations;
    let table = CodonTable::standard();
    let batches = plan_batches(inputs.genes);

    let per_batch = run_batches(&batches, inputs.config.processes, inputs.cancel, |batch| {
        let mut summary = SimulationSummary::zeros(n);
        for task in &batch.items {
            inputs.cancel.check()?;
            match simulate_gene(task, inputs, &table) {
                Ok(gene_summary) => summary = summary.merge(gene_summary),
                Err(e) if e.is_gene_local() => summary.failures.push(gene_failure(task.record, &e)),
                Err(e) => return Err(e),
            }
        }
        Ok(summary)
    })?;

    Ok(per_batch
        .into_iter()
        .fold(SimulationSummary::zeros(n), SimulationSummary::merge))
}

fn simulate_gene(
    task: &GeneTask<'_>,
    inputs: &RunInputs<'_>,
    table: &CodonTable,
) -> Result<SimulationSummary, Error> {
    let gene = load_gene(task.record, inputs, table)?;
    if !gene.has_mutations() {
        return Ok(SimulationSummary::default());
    }
    let engine = PermutationEngine::for_gene(&gene, table, inputs.config.substitution);
    let mut rng = StdRng::seed_from_u64(seed_for_gene(inputs.config.seed, task.index));
    Ok(SimulationSummary {
        matrix: engine.simulate(&mut rng, inputs.config.num_iterations)?,
        observed: observed_counts(&gene, table)?,
        genes_with_mutations: 1,
        skipped_mutations: engine.skipped(),
        failures: Vec::new(),
    })
}

/// Seeded reassignment of mutation tables: gene `i` takes the tables of
/// `assignment[i]`. Any permutation may occur, including self-maps.
#[must_use]
pub fn shuffle_assignments(num_genes: usize, seed: u64) -> Vec<usize> {
    let mut assignment: Vec<usize> = (0..num_genes).collect();
    let mut rng = StdRng::seed_from_u64(seed_for_gene(seed, SHUFFLE_STREAM));
    assignment.shuffle(&mut rng);
    assignment
}

#[derive(Default)]
struct Loaded {
    genes: Vec<(usize, GeneContext)>,
    failures: Vec<GeneFailure>,
}

/// Null simulation with gene identities shuffled among mutated genes.
///
/// Context tables are computed on each gene's own sequence, then every
/// gene's mutation table is relocated within the pools of its assigned gene.
pub fn multiprocess_gene_shuffle(inputs: &RunInputs<'_>) -> Result<SimulationSummary, Error> {
    let table = CodonTable::standard();
    let batches = plan_batches(inputs.genes);
    let loaded = run_batches(&batches, inputs.config.processes, inputs.cancel, |batch| {
        let mut out = Loaded::default();
        for task in &batch.items {
            inputs.cancel.check()?;
            match load_gene(task.record, inputs, &table) {
                Ok(gene) if gene.has_mutations() => out.genes.push((task.index, gene)),
                Ok(_) => {}
                Err(e) if e.is_gene_local() => out.failures.push(gene_failure(task.record, &e)),
                Err(e) => return Err(e),
            }
        }
        Ok(out)
    })?;

    let mut genes = Vec::new();
    let mut failures = Vec::new();
    for batch in loaded {
        genes.extend(batch.genes);
        failures.extend(batch.failures);
    }
    info!(genes = genes.len(), "computed context tables of mutated genes");

    let assignment = shuffle_assignments(genes.len(), inputs.config.seed);
    let mut summary = simulate_with_assignment(&genes, &assignment, inputs.config, inputs.cancel)?;
    failures.append(&mut summary.failures);
    summary.failures = failures;
    Ok(summary)
}

/// Relocate the mutation table of `genes[assignment[i]]` onto gene `i`.
///
/// `genes` pairs each context with its global gene index, in gene order.
pub fn simulate_with_assignment(
    genes: &[(usize, GeneContext)],
    assignment: &[usize],
    config: &RunConfig,
    cancel: &CancelToken,
) -> Result<SimulationSummary, Error> {
    if assignment.len() != genes.len() || assignment.iter().any(|&a| a >= genes.len()) {
        return Err(Error::Validation(format!(
            "assignment of {} entries does not cover {} genes",
            assignment.len(),
            genes.len()
        )));
    }
    let n = config.num_iterations;
    let table = CodonTable::standard();

    let mut batches: Vec<Batch<usize>> = Vec::new();
    for (target, (_, gene)) in genes.iter().enumerate() {
        match batches.last_mut() {
            Some(b) if b.chromosome == gene.chromosome => b.items.push(target),
            _ => batches.push(Batch {
                chromosome: gene.chromosome.clone(),
                items: vec![target],
            }),
        }
    }

    let per_batch = run_batches(&batches, config.processes, cancel, |batch| {
        let mut summary = SimulationSummary::zeros(n);
        for &target in &batch.items {
            cancel.check()?;
            let (index, gene) = &genes[target];
            let source = &genes[assignment[target]].1;
            let engine = PermutationEngine::new(
                &gene.sequence,
                &gene.context,
                &source.context_to_mutations,
                &table,
                config.substitution,
            );
            if engine.skipped() > 0 {
                debug!(
                    gene = gene.gene_id(),
                    source = source.gene_id(),
                    skipped = engine.skipped(),
                    "contexts missing from assigned gene"
                );
            }
            let mut rng = StdRng::seed_from_u64(seed_for_gene(config.seed, *index));
            summary = summary.merge(SimulationSummary {
                matrix: engine.simulate(&mut rng, n)?,
                observed: observed_counts(source, &table)?,
                genes_with_mutations: 1,
                skipped_mutations: engine.skipped(),
                failures: Vec::new(),
            });
        }
        Ok(summary)
    })?;

    Ok(per_batch
        .into_iter()
        .fold(SimulationSummary::zeros(n), SimulationSummary::merge))
}

/// Per-gene randomization tests across all genes, with BH and Fisher adjustment.
pub fn run_gene_tests(inputs: &RunInputs<'_>, kind: TestKind) -> Result<TestSummary, Error> {
    let opts = inputs.config.test_options(kind);
    let table = CodonTable::standard();
    let batches = plan_batches(inputs.genes);

    let per_batch = run_batches(&batches, inputs.config.processes, inputs.cancel, |batch| {
        let mut out = TestSummary::default();
        for task in &batch.items {
            inputs.cancel.check()?;
            let result = load_gene(task.record, inputs, &table).and_then(|gene| {
                let mut rng = StdRng::seed_from_u64(seed_for_gene(inputs.config.seed, task.index));
                test_gene(&gene, &opts, &table, &mut rng)
            });
            match result {
                Ok(r) => out.results.push(r),
                Err(e) if e.is_gene_local() => out.failures.push(gene_failure(task.record, &e)),
                Err(e) => return Err(e),
            }
        }
        Ok(out)
    })?;

    let mut summary = TestSummary::default();
    for batch in per_batch {
        summary.results.extend(batch.results);
        summary.failures.extend(batch.failures);
    }
    adjust_results(&mut summary.results, opts.num_permutations);
    Ok(summary)
}
