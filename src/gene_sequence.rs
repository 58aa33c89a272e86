//! Coding sequence of a single gene, in coding orientation.

use std::sync::OnceLock;

use crate::bed::GeneRecord;
use crate::codon::{CodonSite, pos_to_codon};
use crate::context::{ContextKey, ContextOrder};
use crate::error::Error;
use crate::fasta::SequenceFetcher;
use crate::sequence::{complement, is_valid_base, reverse_complement};

/// Exon and splice-site sequence of a gene.
///
/// Positions `0..exon_len` are coding offsets. Positions from `exon_len` on
/// address splice-site bases; consecutive pairs form one dinucleotide.
#[derive(Debug, Clone)]
pub struct GeneSequence {
    gene_id: String,
    exon_seq: Vec<u8>,
    splice_seq: Vec<u8>,
    context_order: ContextOrder,
    contexts: OnceLock<Vec<ContextKey>>,
}

impl GeneSequence {
    /// Build from bases already in coding orientation.
    pub fn new(
        gene_id: impl Into<String>,
        exon_seq: &[u8],
        splice_seq: &[u8],
        context_order: ContextOrder,
    ) -> Result<Self, Error> {
        let gene_id = gene_id.into();
        if exon_seq.is_empty() {
            return Err(Error::MalformedSequence {
                gene: gene_id,
                reason: "no coding bases".into(),
            });
        }
        if splice_seq.len() % 2 != 0 {
            return Err(Error::MalformedSequence {
                gene: gene_id,
                reason: "splice-site bases must come in dinucleotides".into(),
            });
        }
        if let Some(bad) = exon_seq
            .iter()
            .chain(splice_seq)
            .find(|&&b| !is_valid_base(b))
        {
            return Err(Error::MalformedSequence {
                gene: gene_id,
                reason: format!("unexpected base '{}'", *bad as char),
            });
        }
        Ok(Self {
            gene_id,
            exon_seq: exon_seq.to_ascii_uppercase(),
            splice_seq: splice_seq.to_ascii_uppercase(),
            context_order,
            contexts: OnceLock::new(),
        })
    }

    /// Fetch exon and splice-site bases for a gene model from the reference.
    pub fn from_record<F: SequenceFetcher + ?Sized>(
        record: &GeneRecord,
        reference: &F,
        context_order: ContextOrder,
    ) -> Result<Self, Error> {
        let mut exon_seq = Vec::with_capacity(record.coding_len() as usize);
        for exon in &record.exons {
            exon_seq.extend(reference.fetch(&record.chromosome, exon.start, exon.end)?);
        }
        let mut splice_seq = Vec::new();
        for pos in record.splice_positions() {
            splice_seq.extend(reference.fetch(&record.chromosome, pos, pos + 1)?);
        }
        if record.strand.is_reverse() {
            // splice positions are already listed in coding order
            exon_seq = reverse_complement(&exon_seq);
            splice_seq.iter_mut().for_each(|b| *b = complement(*b));
        }
        Self::new(record.gene_id.clone(), &exon_seq, &splice_seq, context_order)
    }

    #[must_use]
    pub fn gene_id(&self) -> &str {
        &self.gene_id
    }

    #[must_use]
    pub fn exon_seq(&self) -> &[u8] {
        &self.exon_seq
    }

    #[must_use]
    pub fn splice_seq(&self) -> &[u8] {
        &self.splice_seq
    }

    /// Coding plus splice-site positions.
    #[must_use]
    pub fn num_positions(&self) -> usize {
        self.exon_seq.len() + self.splice_seq.len()
    }

    #[must_use]
    pub fn base_at(&self, pos: usize) -> Option<u8> {
        let exon_len = self.exon_seq.len();
        if pos < exon_len {
            Some(self.exon_seq[pos])
        } else {
            self.splice_seq.get(pos - exon_len).copied()
        }
    }

    /// Codon containing `pos`; splice-site positions give the sentinel.
    #[inline]
    #[must_use]
    pub fn codon_site(&self, pos: usize) -> CodonSite {
        if pos >= self.exon_seq.len() {
            CodonSite::SpliceSite
        } else {
            pos_to_codon(&self.exon_seq, pos)
        }
    }

    #[must_use]
    pub fn context_order(&self) -> ContextOrder {
        self.context_order
    }

    /// Switch context order; cached context keys are discarded.
    pub fn set_context_order(&mut self, order: ContextOrder) {
        if order != self.context_order {
            self.context_order = order;
            self.contexts = OnceLock::new();
        }
    }

    /// Context key of every addressable position, computed on first use.
    #[must_use]
    pub fn context_keys(&self) -> &[ContextKey] {
        self.contexts.get_or_init(|| self.compute_contexts())
    }

    #[must_use]
    pub fn context_at(&self, pos: usize) -> Option<ContextKey> {
        self.context_keys().get(pos).copied()
    }

    fn compute_contexts(&self) -> Vec<ContextKey> {
        let order = self.context_order;
        let mut keys = Vec::with_capacity(self.num_positions());

        let exon = &self.exon_seq;
        for i in 0..exon.len() {
            let up = i.checked_sub(1).map(|j| exon[j]);
            let down = exon.get(i + 1).copied();
            keys.push(ContextKey::compute(order, up, exon[i], down));
        }

        // splice dinucleotides are contextualised on their own
        for pair in self.splice_seq.chunks_exact(2) {
            keys.push(ContextKey::compute(order, None, pair[0], Some(pair[1])));
            keys.push(ContextKey::compute(order, Some(pair[0]), pair[1], None));
        }
        keys
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bed::Exon;
    use crate::context::SequenceContext;
    use crate::fasta::ReferenceGenome;
    use crate::strand::Strand;
    use std::io::Cursor;

    const ORDERS: [ContextOrder; 5] = [
        ContextOrder::Zero,
        ContextOrder::One,
        ContextOrder::OnePointFive,
        ContextOrder::Two,
        ContextOrder::Three,
    ];

    fn genome() -> ReferenceGenome {
        let fasta = b">chr1\nAAATGGCGGTAAGCCCAGGGCCTAATT\n";
        ReferenceGenome::from_reader(Cursor::new(&fasta[..])).unwrap()
    }

    fn record(strand: Strand) -> GeneRecord {
        GeneRecord {
            gene_id: "G".into(),
            chromosome: "chr1".into(),
            strand,
            exons: vec![Exon { start: 2, end: 8 }, Exon { start: 18, end: 24 }],
        }
    }

    #[test]
    fn forward_gene_from_reference() {
        let gs = GeneSequence::from_record(&record(Strand::Forward), &genome(), ContextOrder::One)
            .unwrap();
        assert_eq!(gs.exon_seq(), b"ATGGCGGGCCTA");
        assert_eq!(gs.splice_seq(), b"GTAG");
        assert_eq!(gs.num_positions(), 16);
        assert_eq!(gs.base_at(12), Some(b'G'));
        assert_eq!(gs.codon_site(13), CodonSite::SpliceSite);
    }

    #[test]
    fn reverse_gene_is_reverse_complemented() {
        let gs = GeneSequence::from_record(&record(Strand::Reverse), &genome(), ContextOrder::One)
            .unwrap();
        assert_eq!(gs.exon_seq(), b"TAGGCCCGCCAT");
        // genomic 17,16 then 9,8 complemented
        assert_eq!(gs.splice_seq(), b"CTAC");
    }

    #[test]
    fn context_counts_cover_every_position() {
        let mut gs =
            GeneSequence::from_record(&record(Strand::Forward), &genome(), ContextOrder::Zero)
                .unwrap();
        for order in ORDERS {
            gs.set_context_order(order);
            let ctx = SequenceContext::build(&gs);
            assert_eq!(ctx.total(), gs.num_positions(), "order {order}");
        }
        let single = GeneSequence::new("S", b"ATGGCCTAA", b"", ContextOrder::Three).unwrap();
        assert_eq!(SequenceContext::build(&single).total(), 9);
    }

    #[test]
    fn changing_order_resets_cache() {
        let mut gs = GeneSequence::new("S", b"ATGGCCTAA", b"", ContextOrder::Zero).unwrap();
        assert_eq!(gs.context_at(4), Some(ContextKey::NONE));
        gs.set_context_order(ContextOrder::Three);
        assert_eq!(gs.context_at(4), ContextKey::new(b"GCC"));
        assert_eq!(gs.context_at(0), ContextKey::new(b"A"));
        assert_eq!(gs.context_at(8), ContextKey::new(b"AA"));
    }

    #[test]
    fn splice_contexts_stay_within_dinucleotide() {
        let gs = GeneSequence::new("S", b"ATGGCC", b"GTAG", ContextOrder::Three).unwrap();
        assert_eq!(gs.context_at(6), ContextKey::new(b"G"));
        assert_eq!(gs.context_at(7), ContextKey::new(b"GT"));
        assert_eq!(gs.context_at(8), ContextKey::new(b"A"));
        assert_eq!(gs.context_at(9), ContextKey::new(b"AG"));
    }

    #[test]
    fn malformed_sequences_rejected() {
        assert!(matches!(
            GeneSequence::new("X", b"ATGNNN", b"", ContextOrder::One),
            Err(Error::MalformedSequence { .. })
        ));
        assert!(GeneSequence::new("X", b"", b"", ContextOrder::One).is_err());
        assert!(GeneSequence::new("X", b"ATG", b"G", ContextOrder::One).is_err());
    }
}
