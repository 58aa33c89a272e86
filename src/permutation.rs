//! Context-preserving relocation of a gene's mutations.

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;

use clap::ValueEnum;
use rand::Rng;
use rand::seq::index;
use serde::Deserialize;

use crate::classify::CategoryCounts;
use crate::codon::CodonTable;
use crate::context::{ContextToMutations, SequenceContext};
use crate::error::Error;
use crate::gene_sequence::GeneSequence;
use crate::mutation_context::{AminoAcidChange, GeneContext, aa_change};
use crate::sequence::alternative_bases;

/// How a relocated mutation picks its somatic base.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum SubstitutionPolicy {
    /// Reuse the observed somatic bases of the context.
    #[default]
    Empirical,
    /// One of the three non-reference bases, uniformly.
    Uniform,
}

impl fmt::Display for SubstitutionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empirical => f.write_str("empirical"),
            Self::Uniform => f.write_str("uniform"),
        }
    }
}

/// One relocated mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrawnMutation {
    pub position: usize,
    pub somatic_base: u8,
}

/// Per-iteration category counts, one row per permutation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PermutationMatrix {
    rows: Vec<CategoryCounts>,
}

impl PermutationMatrix {
    /// The merge identity for `n` permutations.
    #[must_use]
    pub fn zeros(n: usize) -> Self {
        Self {
            rows: vec![CategoryCounts::default(); n],
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    #[must_use]
    pub fn rows(&self) -> &[CategoryCounts] {
        &self.rows
    }

    /// Element-wise sum by iteration; a shorter matrix is padded with zeros.
    #[must_use]
    pub fn merge(mut self, mut other: Self) -> Self {
        if other.rows.len() > self.rows.len() {
            std::mem::swap(&mut self, &mut other);
        }
        for (row, o) in self.rows.iter_mut().zip(other.rows) {
            *row += o;
        }
        self
    }

    /// Column-wise totals across all iterations, in `CategoryCounts::COLUMNS` order.
    #[must_use]
    pub fn column_sums(&self) -> [u64; 7] {
        let mut sums = [0u64; 7];
        for row in &self.rows {
            for (sum, c) in sums.iter_mut().zip(row.as_array()) {
                *sum += u64::from(c);
            }
        }
        sums
    }
}

impl From<Vec<CategoryCounts>> for PermutationMatrix {
    fn from(rows: Vec<CategoryCounts>) -> Self {
        Self { rows }
    }
}

struct ContextDraw<'a> {
    pool: Cow<'a, [usize]>,
    bases: Cow<'a, [u8]>,
}

/// Relocates the mutations of one gene within its context pools.
pub struct PermutationEngine<'a> {
    sequence: &'a GeneSequence,
    table: &'a CodonTable,
    draws: Vec<ContextDraw<'a>>,
    policy: SubstitutionPolicy,
    skipped: usize,
}

impl<'a> PermutationEngine<'a> {
    /// Engine over a gene's own context tables.
    #[must_use]
    pub fn for_gene(gene: &'a GeneContext, table: &'a CodonTable, policy: SubstitutionPolicy) -> Self {
        Self::new(
            &gene.sequence,
            &gene.context,
            &gene.context_to_mutations,
            table,
            policy,
        )
    }

    /// Engine placing `context_to_mutations` on the pools of `context`.
    ///
    /// The mutation table may come from another gene. Bases whose context
    /// has no pool here are skipped and counted.
    ///
    /// Under `Empirical`, an observed base is only placed on positions whose
    /// reference differs from it. Contexts that do not fix the reference base
    /// (order 0) are split per somatic base for that.
    #[must_use]
    pub fn new(
        sequence: &'a GeneSequence,
        context: &'a SequenceContext,
        context_to_mutations: &'a ContextToMutations,
        table: &'a CodonTable,
        policy: SubstitutionPolicy,
    ) -> Self {
        let mut draws = Vec::with_capacity(context_to_mutations.len());
        let mut skipped = 0;
        for (key, bases) in context_to_mutations {
            let pool = context.pool(key);
            if pool.is_empty() {
                skipped += bases.len();
                continue;
            }
            let mut observed = [false; 256];
            for &b in bases {
                observed[usize::from(b)] = true;
            }
            let clashes = pool
                .iter()
                .any(|&p| sequence.base_at(p).is_some_and(|r| observed[usize::from(r)]));
            if policy == SubstitutionPolicy::Uniform || !clashes {
                draws.push(ContextDraw {
                    pool: Cow::Borrowed(pool),
                    bases: Cow::Borrowed(bases.as_slice()),
                });
                continue;
            }

            let mut by_base: BTreeMap<u8, Vec<u8>> = BTreeMap::new();
            for &b in bases {
                by_base.entry(b).or_default().push(b);
            }
            for (base, group) in by_base {
                let eligible: Vec<usize> = pool
                    .iter()
                    .copied()
                    .filter(|&p| sequence.base_at(p) != Some(base))
                    .collect();
                if eligible.is_empty() {
                    skipped += group.len();
                    continue;
                }
                draws.push(ContextDraw {
                    pool: Cow::Owned(eligible),
                    bases: Cow::Owned(group),
                });
            }
        }
        Self {
            sequence,
            table,
            draws,
            policy,
            skipped,
        }
    }

    /// Mutations dropped because their context is absent from this gene.
    #[must_use]
    pub fn skipped(&self) -> usize {
        self.skipped
    }

    /// Mutations relocated per iteration.
    #[must_use]
    pub fn num_mutations(&self) -> usize {
        self.draws.iter().map(|d| d.bases.len()).sum()
    }

    /// One iteration of relocation, replacing the contents of `out`.
    pub fn draw_into<R: Rng + ?Sized>(&self, rng: &mut R, out: &mut Vec<DrawnMutation>) {
        out.clear();
        for draw in &self.draws {
            let k = draw.bases.len();
            let n = draw.pool.len();
            if k <= n {
                for (j, i) in index::sample(rng, n, k).into_iter().enumerate() {
                    let position = draw.pool[i];
                    let somatic_base = self.somatic_base(rng, position, draw.bases[j]);
                    out.push(DrawnMutation {
                        position,
                        somatic_base,
                    });
                }
            } else {
                for &observed in draw.bases.iter() {
                    let position = draw.pool[rng.random_range(0..n)];
                    let somatic_base = self.somatic_base(rng, position, observed);
                    out.push(DrawnMutation {
                        position,
                        somatic_base,
                    });
                }
            }
        }
    }

    #[inline]
    fn somatic_base<R: Rng + ?Sized>(&self, rng: &mut R, position: usize, observed: u8) -> u8 {
        match self.policy {
            SubstitutionPolicy::Empirical => observed,
            SubstitutionPolicy::Uniform => {
                let reference = self.sequence.base_at(position).unwrap_or(b'N');
                alternative_bases(reference)[rng.random_range(0..3)]
            }
        }
    }

    /// Amino-acid consequences of a set of drawn mutations.
    pub fn amino_acid_changes(&self, drawn: &[DrawnMutation]) -> Result<Vec<AminoAcidChange>, Error> {
        drawn
            .iter()
            .map(|d| aa_change(d.position, d.somatic_base, self.sequence, self.table))
            .collect()
    }

    /// Category counts of a set of drawn mutations.
    pub fn classify(&self, drawn: &[DrawnMutation]) -> Result<CategoryCounts, Error> {
        let mut counts = CategoryCounts::default();
        for d in drawn {
            counts.record(aa_change(d.position, d.somatic_base, self.sequence, self.table)?.category());
        }
        Ok(counts)
    }

    /// Run `num_permutations` independent iterations.
    pub fn simulate<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        num_permutations: usize,
    ) -> Result<PermutationMatrix, Error> {
        let mut rows = Vec::with_capacity(num_permutations);
        let mut drawn = Vec::with_capacity(self.num_mutations());
        for _ in 0..num_permutations {
            self.draw_into(rng, &mut drawn);
            rows.push(self.classify(&drawn)?);
        }
        Ok(PermutationMatrix { rows })
    }
}
