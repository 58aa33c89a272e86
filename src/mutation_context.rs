//! Maps observed mutations onto a gene model and buckets them by context.

use tracing::debug;

use crate::bed::GeneRecord;
use crate::classify::{Category, CategoryCounts, classify};
use crate::codon::CodonTable;
use crate::context::{ContextKey, ContextToMutations, SequenceContext};
use crate::error::Error;
use crate::fasta::SequenceFetcher;
use crate::gene_sequence::GeneSequence;
use crate::mutation::Mutation;
use crate::sequence::reverse_complement;

/// An observed mutation located on the gene's addressable positions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappedMutation {
    pub position: usize,
    /// Somatic base in coding orientation.
    pub somatic_base: u8,
    pub sample: String,
}

/// Amino-acid consequence of one substitution; `None` for splice sites.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AminoAcidChange {
    pub reference_aa: Option<u8>,
    pub somatic_aa: Option<u8>,
    pub codon_index: Option<usize>,
}

impl AminoAcidChange {
    #[inline]
    #[must_use]
    pub fn category(&self) -> Category {
        classify(self.reference_aa, self.somatic_aa, self.codon_index)
    }
}

/// Everything the permutation engine needs for one gene.
#[derive(Debug, Clone)]
pub struct GeneContext {
    pub chromosome: String,
    pub sequence: GeneSequence,
    pub context: SequenceContext,
    pub context_to_mutations: ContextToMutations,
    pub mutations: Vec<MappedMutation>,
    pub reference_mismatches: usize,
    pub unmapped_used: usize,
    pub unmapped_dropped: usize,
}

impl GeneContext {
    #[must_use]
    pub fn gene_id(&self) -> &str {
        self.sequence.gene_id()
    }

    #[must_use]
    pub fn has_mutations(&self) -> bool {
        !self.context_to_mutations.is_empty()
    }

    /// Number of mutations that will be relocated in each permutation.
    #[must_use]
    pub fn num_randomized(&self) -> usize {
        self.context_to_mutations.values().map(Vec::len).sum()
    }
}

/// Map a gene's mutations and build its context tables.
///
/// With `genome` set, mutations labelled with the gene that fall outside its
/// transcript take their context from the genome and join the randomized
/// pool, but never the observed set.
pub fn compute_mutation_context(
    record: &GeneRecord,
    sequence: GeneSequence,
    mutations: &[Mutation],
    genome: Option<&dyn SequenceFetcher>,
) -> Result<GeneContext, Error> {
    let context = SequenceContext::build(&sequence);
    let splice_positions = record.splice_positions();
    let exon_len = sequence.exon_seq().len();

    let mut mapped = Vec::new();
    let mut unmapped = Vec::new();
    let mut reference_mismatches = 0;

    for m in mutations.iter().filter(|m| m.chromosome == record.chromosome) {
        let position = record.coding_offset(m.start).map(|p| p as usize).or_else(|| {
            splice_positions
                .iter()
                .position(|&p| p == m.start)
                .map(|i| exon_len + i)
        });
        let Some(position) = position else {
            unmapped.push(m);
            continue;
        };
        let expected = record.strand.to_coding_base(m.reference_allele);
        if sequence.base_at(position) != Some(expected) {
            reference_mismatches += 1;
            continue;
        }
        mapped.push(MappedMutation {
            position,
            somatic_base: record.strand.to_coding_base(m.tumor_allele),
            sample: m.sample.clone(),
        });
    }
    // labelled with the gene but on another contig
    unmapped.extend(mutations.iter().filter(|m| m.chromosome != record.chromosome));

    let mut context_to_mutations = ContextToMutations::new();
    for m in &mapped {
        if let Some(key) = sequence.context_at(m.position) {
            context_to_mutations.entry(key).or_default().push(m.somatic_base);
        }
    }

    let (mut unmapped_used, mut unmapped_dropped) = (0, 0);
    if let Some(genome) = genome {
        for m in unmapped {
            match unmapped_context(record, &sequence, genome, m) {
                Some(key) if context.contains(&key) => {
                    context_to_mutations
                        .entry(key)
                        .or_default()
                        .push(record.strand.to_coding_base(m.tumor_allele));
                    unmapped_used += 1;
                }
                _ => unmapped_dropped += 1,
            }
        }
    }

    if reference_mismatches > 0 {
        debug!(
            gene = sequence.gene_id(),
            reference_mismatches, "dropped mutations whose reference allele disagrees"
        );
    }
    if unmapped_dropped > 0 {
        debug!(
            gene = sequence.gene_id(),
            unmapped_used, unmapped_dropped, "unmapped mutations without a usable context"
        );
    }

    Ok(GeneContext {
        chromosome: record.chromosome.clone(),
        sequence,
        context,
        context_to_mutations,
        mutations: mapped,
        reference_mismatches,
        unmapped_used,
        unmapped_dropped,
    })
}

/// Context of a mutation outside the transcript, read from the genome.
fn unmapped_context(
    record: &GeneRecord,
    sequence: &GeneSequence,
    genome: &dyn SequenceFetcher,
    m: &Mutation,
) -> Option<ContextKey> {
    if !genome.contains(&m.chromosome) {
        return None;
    }
    let start = m.start.saturating_sub(1);
    // the downstream flank is missing at the contig end
    let window = genome
        .fetch(&m.chromosome, start, m.start + 2)
        .or_else(|_| genome.fetch(&m.chromosome, start, m.start + 1))
        .ok()?;
    let center = (m.start - start) as usize;
    let (window, center) = if record.strand.is_reverse() {
        let rc = reverse_complement(&window);
        let c = rc.len() - 1 - center;
        (rc, c)
    } else {
        (window, center)
    };
    let &base = window.get(center)?;
    let up = center.checked_sub(1).map(|i| window[i]);
    let down = window.get(center + 1).copied();
    Some(ContextKey::compute(sequence.context_order(), up, base, down))
}

/// Amino-acid consequence of each (position, somatic base) pair.
pub fn get_aa_mut_info(
    positions: &[usize],
    somatic_bases: &[u8],
    gene: &GeneSequence,
    table: &CodonTable,
) -> Result<Vec<AminoAcidChange>, Error> {
    if positions.len() != somatic_bases.len() {
        return Err(Error::Validation(format!(
            "{} positions but {} somatic bases",
            positions.len(),
            somatic_bases.len()
        )));
    }
    positions
        .iter()
        .zip(somatic_bases)
        .map(|(&pos, &base)| aa_change(pos, base, gene, table))
        .collect()
}

#[inline]
pub(crate) fn aa_change(
    pos: usize,
    base: u8,
    gene: &GeneSequence,
    table: &CodonTable,
) -> Result<AminoAcidChange, Error> {
    let site = gene.codon_site(pos);
    Ok(AminoAcidChange {
        reference_aa: table.translate_site(&site)?,
        somatic_aa: table.translate_site(&site.mutate(base))?,
        codon_index: site.codon_index(),
    })
}

/// Tally the categories of a set of amino-acid changes.
#[must_use]
pub fn calc_non_silent_info(changes: &[AminoAcidChange]) -> CategoryCounts {
    changes.iter().map(AminoAcidChange::category).collect()
}

/// Observed category counts for a gene's mapped mutations.
pub fn observed_counts(gene: &GeneContext, table: &CodonTable) -> Result<CategoryCounts, Error> {
    let changes = observed_changes(gene, table)?;
    Ok(calc_non_silent_info(&changes))
}

/// Amino-acid changes for a gene's mapped mutations, in mapping order.
pub fn observed_changes(
    gene: &GeneContext,
    table: &CodonTable,
) -> Result<Vec<AminoAcidChange>, Error> {
    let positions: Vec<usize> = gene.mutations.iter().map(|m| m.position).collect();
    let bases: Vec<u8> = gene.mutations.iter().map(|m| m.somatic_base).collect();
    get_aa_mut_info(&positions, &bases, &gene.sequence, table)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::bed::Exon;
    use crate::context::ContextOrder;
    use crate::fasta::ReferenceGenome;
    use crate::strand::Strand;
    use std::io::Cursor;

    /// Single-exon gene `ATGGCCTAA` at chr1:10-19 with flanking sequence.
    pub(crate) fn toy_genome() -> ReferenceGenome {
        let fasta = b">chr1\nCCCCCCCCCCATGGCCTAAGGGGGGGGGG\n";
        ReferenceGenome::from_reader(Cursor::new(&fasta[..])).unwrap()
    }

    pub(crate) fn toy_record(strand: Strand) -> GeneRecord {
        GeneRecord {
            gene_id: "TOY".into(),
            chromosome: "chr1".into(),
            strand,
            exons: vec![Exon { start: 10, end: 19 }],
        }
    }

    pub(crate) fn snv(start: u64, reference: u8, tumor: u8) -> Mutation {
        Mutation {
            gene: "TOY".into(),
            sample: "S1".into(),
            chromosome: "chr1".into(),
            start,
            reference_allele: reference,
            tumor_allele: tumor,
        }
    }

    fn toy_context(mutations: &[Mutation], order: ContextOrder) -> GeneContext {
        let genome = toy_genome();
        let record = toy_record(Strand::Forward);
        let seq = GeneSequence::from_record(&record, &genome, order).unwrap();
        compute_mutation_context(&record, seq, mutations, None).unwrap()
    }

    #[test]
    fn missense_scenario() {
        // coding offset 3: GCC -> ACC, Ala -> Thr
        let gene = toy_context(&[snv(13, b'G', b'A')], ContextOrder::One);
        let counts = observed_counts(&gene, &CodonTable::standard()).unwrap();
        assert_eq!(counts.as_array(), [1, 0, 0, 0, 0, 0, 1]);
    }

    #[test]
    fn lost_stop_scenario() {
        // coding offset 6: TAA -> AAA, Stop -> Lys
        let gene = toy_context(&[snv(16, b'T', b'A')], ContextOrder::One);
        let counts = observed_counts(&gene, &CodonTable::standard()).unwrap();
        assert_eq!(counts.lost_stop, 1);
        assert_eq!(counts.non_silent, 1);
        assert!(counts.is_consistent());
    }

    #[test]
    fn buckets_bases_by_context() {
        let muts = [snv(13, b'G', b'A'), snv(12, b'G', b'T'), snv(14, b'C', b'T')];
        let gene = toy_context(&muts, ContextOrder::One);
        let g = ContextKey::new(b"G").unwrap();
        let c = ContextKey::new(b"C").unwrap();
        assert_eq!(gene.context_to_mutations[&g], vec![b'A', b'T']);
        assert_eq!(gene.context_to_mutations[&c], vec![b'T']);
        assert_eq!(gene.num_randomized(), 3);
    }

    #[test]
    fn zero_mutations_gives_empty_tables() {
        let gene = toy_context(&[], ContextOrder::Three);
        assert!(!gene.has_mutations());
        assert!(gene.mutations.is_empty());
        assert_eq!(gene.context.total(), 9);
    }

    #[test]
    fn reference_mismatch_is_dropped() {
        let gene = toy_context(&[snv(13, b'C', b'A')], ContextOrder::One);
        assert_eq!(gene.reference_mismatches, 1);
        assert!(!gene.has_mutations());
    }

    #[test]
    fn reverse_strand_complements_bases() {
        let genome = toy_genome();
        let record = toy_record(Strand::Reverse);
        let seq = GeneSequence::from_record(&record, &genome, ContextOrder::One).unwrap();
        // reverse complement of ATGGCCTAA is TTAGGCCAT; genomic 18 (A) is coding 0 (T)
        let gene = compute_mutation_context(&record, seq, &[snv(18, b'A', b'G')], None).unwrap();
        assert_eq!(gene.mutations[0].position, 0);
        assert_eq!(gene.mutations[0].somatic_base, b'C');
    }

    #[test]
    fn unmapped_mutations_join_pool_only() {
        let genome = toy_genome();
        let record = toy_record(Strand::Forward);
        let seq = GeneSequence::from_record(&record, &genome, ContextOrder::One).unwrap();
        // both fall outside the exon; their G and C contexts exist in the gene
        // the chrZ one has no reference window and is dropped
        let elsewhere = Mutation {
            chromosome: "chrZ".into(),
            ..snv(5, b'C', b'T')
        };
        let muts = [snv(22, b'G', b'A'), snv(3, b'C', b'T'), elsewhere];
        let gene = compute_mutation_context(&record, seq, &muts, Some(&genome)).unwrap();
        assert!(gene.mutations.is_empty());
        assert_eq!(gene.unmapped_used, 2);
        assert_eq!(gene.unmapped_dropped, 1);
        assert_eq!(gene.num_randomized(), 2);

        let seq = GeneSequence::from_record(&record, &genome, ContextOrder::One).unwrap();
        let without = compute_mutation_context(&record, seq, &muts, None).unwrap();
        assert_eq!(without.num_randomized(), 0);
    }

    #[test]
    fn aa_info_handles_splice_sites() {
        let gs = GeneSequence::new("S", b"ATGGCC", b"GT", ContextOrder::One).unwrap();
        let table = CodonTable::standard();
        let info = get_aa_mut_info(&[6, 0, 5], &[b'A', b'G', b'G'], &gs, &table).unwrap();
        assert_eq!(info[0].reference_aa, None);
        assert_eq!(info[0].category(), Category::SpliceSite);
        assert_eq!(info[1].category(), Category::LostStart);
        assert_eq!(info[2].category(), Category::Silent);
        assert!(get_aa_mut_info(&[0], &[], &gs, &table).is_err());
    }
}
