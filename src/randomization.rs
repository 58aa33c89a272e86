//! Per-gene randomization tests with adaptive stopping.

use std::collections::HashMap;
use std::fmt;

use rand::Rng;

use crate::classify::{Category, CategoryCounts};
use crate::codon::CodonTable;
use crate::error::Error;
use crate::mutation_context::{AminoAcidChange, GeneContext, calc_non_silent_info, observed_changes};
use crate::permutation::{PermutationEngine, SubstitutionPolicy};
use crate::stats::{bh_fdr, clamp_p_values, empirical_p_value, fishers_method, normalized_entropy};

/// Null values within this distance of the observed value count as extreme.
const TIE_TOLERANCE: f64 = 1e-12;

/// Which family of per-gene tests to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestKind {
    /// Tumour suppressor: excess of inactivating mutations.
    Tsg,
    /// Oncogene: missense clustering and recurrence.
    Oncogene,
}

impl TestKind {
    #[must_use]
    pub fn statistics(self) -> &'static [Statistic] {
        match self {
            Self::Tsg => &[Statistic::Inactivating],
            Self::Oncogene => &[Statistic::MissenseEntropy, Statistic::Recurrent],
        }
    }
}

impl fmt::Display for TestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tsg => f.write_str("tsg"),
            Self::Oncogene => f.write_str("oncogene"),
        }
    }
}

/// A per-gene test statistic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Statistic {
    /// Nonsense, lost-stop, splice-site and lost-start mutations.
    Inactivating,
    /// Normalized entropy of missense codon positions.
    MissenseEntropy,
    /// Missense mutations at recurrently hit codons.
    Recurrent,
}

impl Statistic {
    /// Column prefix in result tables.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Inactivating => "inactivating",
            Self::MissenseEntropy => "entropy",
            Self::Recurrent => "recurrent",
        }
    }

    /// Entropy is significant when low; counts when high.
    #[must_use]
    pub fn lower_is_extreme(self) -> bool {
        matches!(self, Self::MissenseEntropy)
    }

    #[inline]
    #[must_use]
    pub fn is_extreme(self, null: f64, observed: f64) -> bool {
        if self.lower_is_extreme() {
            null <= observed + TIE_TOLERANCE
        } else {
            null >= observed - TIE_TOLERANCE
        }
    }

    /// Value of the statistic over a set of amino-acid changes.
    #[must_use]
    pub fn evaluate(self, changes: &[AminoAcidChange], params: &StatisticParams) -> f64 {
        match self {
            Self::Inactivating => f64::from(calc_non_silent_info(changes).inactivating()),
            Self::MissenseEntropy => {
                let counts = missense_codon_counts(changes);
                let counts: Vec<usize> = counts.into_values().collect();
                normalized_entropy(&counts)
            }
            Self::Recurrent => {
                let threshold = params.recurrence_threshold(changes.len());
                missense_codon_counts(changes)
                    .into_values()
                    .filter(|&c| c >= threshold)
                    .sum::<usize>() as f64
            }
        }
    }
}

impl fmt::Display for Statistic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

fn missense_codon_counts(changes: &[AminoAcidChange]) -> HashMap<usize, usize> {
    let mut counts = HashMap::new();
    for c in changes {
        if c.category() == Category::Missense
            && let Some(codon) = c.codon_index
        {
            *counts.entry(codon).or_insert(0) += 1;
        }
    }
    counts
}

/// Thresholds of the recurrence statistic.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StatisticParams {
    /// Minimum missense hits for a codon to be recurrent.
    pub recurrent: usize,
    /// Minimum fraction of the gene's mutations for a codon to be recurrent.
    pub fraction: f64,
}

impl Default for StatisticParams {
    fn default() -> Self {
        Self {
            recurrent: 3,
            fraction: 0.02,
        }
    }
}

impl StatisticParams {
    #[must_use]
    pub fn recurrence_threshold(&self, num_mutations: usize) -> usize {
        let by_fraction = (self.fraction * num_mutations as f64).ceil() as usize;
        self.recurrent.max(by_fraction)
    }
}

/// Settings shared by every gene of a test run.
#[derive(Debug, Clone, Copy)]
pub struct TestOptions {
    pub kind: TestKind,
    pub num_permutations: usize,
    pub stop_criteria: usize,
    pub policy: SubstitutionPolicy,
    pub params: StatisticParams,
    /// Minimum observed inactivating mutations before a tumour-suppressor test runs.
    pub deleterious: u32,
}

/// Outcome of one statistic for one gene.
#[derive(Debug, Clone, PartialEq)]
pub struct TestOutcome {
    pub statistic: Statistic,
    pub observed: f64,
    pub p_value: f64,
    pub q_value: Option<f64>,
    /// Null draws evaluated before this statistic stopped.
    pub iterations: usize,
}

/// Per-gene result record.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneResult {
    pub gene_id: String,
    pub chromosome: String,
    pub observed: CategoryCounts,
    pub tests: Vec<TestOutcome>,
    pub combined_p: Option<f64>,
    pub combined_q: Option<f64>,
    /// Permutations drawn for this gene.
    pub iterations: usize,
    /// Mutations skipped by the engine for lack of a matching context.
    pub skipped: usize,
}

impl GeneResult {
    #[must_use]
    pub fn total_mutations(&self) -> u32 {
        self.observed.total()
    }

    fn untested(gene: &GeneContext, kind: TestKind, observed: CategoryCounts, values: &[f64]) -> Self {
        let tests = kind
            .statistics()
            .iter()
            .zip(values)
            .map(|(&statistic, &observed)| TestOutcome {
                statistic,
                observed,
                p_value: 1.0,
                q_value: None,
                iterations: 0,
            })
            .collect();
        Self {
            gene_id: gene.gene_id().to_string(),
            chromosome: gene.chromosome.clone(),
            observed,
            tests,
            combined_p: None,
            combined_q: None,
            iterations: 0,
            skipped: 0,
        }
    }
}

struct Tally {
    extreme: usize,
    done: usize,
    stopped: bool,
}

/// Run the tests of `opts.kind` on one gene.
///
/// Each statistic stops counting once it has seen `stop_criteria` null
/// values at least as extreme as observed; the gene stops when every
/// statistic has stopped or `num_permutations` draws are spent.
pub fn test_gene<R: Rng + ?Sized>(
    gene: &GeneContext,
    opts: &TestOptions,
    table: &CodonTable,
    rng: &mut R,
) -> Result<GeneResult, Error> {
    let changes = observed_changes(gene, table)?;
    let observed = calc_non_silent_info(&changes);
    let statistics = opts.kind.statistics();
    let values: Vec<f64> = statistics
        .iter()
        .map(|s| s.evaluate(&changes, &opts.params))
        .collect();

    let below_deleterious = opts.kind == TestKind::Tsg && observed.inactivating() < opts.deleterious;
    if changes.is_empty() || !gene.has_mutations() || below_deleterious {
        return Ok(GeneResult::untested(gene, opts.kind, observed, &values));
    }

    let engine = PermutationEngine::for_gene(gene, table, opts.policy);
    let mut tallies: Vec<Tally> = statistics
        .iter()
        .map(|_| Tally {
            extreme: 0,
            done: 0,
            stopped: false,
        })
        .collect();

    let mut drawn = Vec::with_capacity(engine.num_mutations());
    let mut iterations = 0;
    while iterations < opts.num_permutations && tallies.iter().any(|t| !t.stopped) {
        engine.draw_into(rng, &mut drawn);
        let null_changes = engine.amino_acid_changes(&drawn)?;
        for ((statistic, tally), &obs) in statistics.iter().zip(&mut tallies).zip(&values) {
            if tally.stopped {
                continue;
            }
            tally.done += 1;
            if statistic.is_extreme(statistic.evaluate(&null_changes, &opts.params), obs) {
                tally.extreme += 1;
                if tally.extreme >= opts.stop_criteria {
                    tally.stopped = true;
                }
            }
        }
        iterations += 1;
    }

    let tests = statistics
        .iter()
        .zip(&tallies)
        .zip(&values)
        .map(|((&statistic, tally), &observed)| TestOutcome {
            statistic,
            observed,
            p_value: empirical_p_value(tally.extreme, tally.done),
            q_value: None,
            iterations: tally.done,
        })
        .collect();

    Ok(GeneResult {
        gene_id: gene.gene_id().to_string(),
        chromosome: gene.chromosome.clone(),
        observed,
        tests,
        combined_p: None,
        combined_q: None,
        iterations,
        skipped: engine.skipped(),
    })
}

/// Fill in BH q-values per statistic and Fisher-combined p/q-values.
///
/// Genes without observed mutations keep p = 1 and take q = 1; they do not
/// enter the correction.
pub fn adjust_results(results: &mut [GeneResult], num_permutations: usize) {
    let tested: Vec<usize> = results
        .iter()
        .enumerate()
        .filter(|(_, r)| r.total_mutations() > 0)
        .map(|(i, _)| i)
        .collect();

    let num_tests = results.iter().map(|r| r.tests.len()).max().unwrap_or(0);
    for t in 0..num_tests {
        let p: Vec<f64> = tested.iter().map(|&i| results[i].tests[t].p_value).collect();
        for (&i, q) in tested.iter().zip(bh_fdr(&p)) {
            results[i].tests[t].q_value = Some(q);
        }
    }

    if num_tests >= 2 {
        for r in results.iter_mut() {
            let p: Vec<f64> = r.tests.iter().map(|t| t.p_value).collect();
            r.combined_p = Some(fishers_method(&clamp_p_values(&p, num_permutations)));
        }
        let p: Vec<f64> = tested.iter().filter_map(|&i| results[i].combined_p).collect();
        for (&i, q) in tested.iter().zip(bh_fdr(&p)) {
            results[i].combined_q = Some(q);
        }
    }

    for r in results.iter_mut().filter(|r| r.total_mutations() == 0) {
        for t in &mut r.tests {
            t.q_value = Some(1.0);
        }
        if num_tests >= 2 {
            r.combined_q = Some(1.0);
        }
    }
}
