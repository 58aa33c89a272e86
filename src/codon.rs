//! Codon lookup and translation for coding sequences.

use crate::error::Error;
use crate::sequence::base_index;

/// Sentinel used in place of a codon for splice-site positions.
pub const SPLICE_SITE: &str = "Splice_Site";

/// Stop codon symbol.
pub const STOP: u8 = b'*';

/// Lookup table for translating codons to amino acids.
///
/// Indexed by 6-bit codon encoding: A=0, C=1, G=2, T=3.
/// Index = first*16 + second*4 + third.
#[derive(Debug, Clone)]
pub struct CodonTable {
    table: [u8; 64],
}

impl Default for CodonTable {
    fn default() -> Self {
        Self::standard()
    }
}

impl CodonTable {
    /// Standard genetic code (NCBI translation table 1).
    #[must_use]
    pub fn standard() -> Self {
        #[rustfmt::skip]
        let table: [u8; 64] = [
            b'K', b'N', b'K', b'N',  // AA*
            b'T', b'T', b'T', b'T',  // AC*
            b'R', b'S', b'R', b'S',  // AG*
            b'I', b'I', b'M', b'I',  // AT*
            b'Q', b'H', b'Q', b'H',  // CA*
            b'P', b'P', b'P', b'P',  // CC*
            b'R', b'R', b'R', b'R',  // CG*
            b'L', b'L', b'L', b'L',  // CT*
            b'E', b'D', b'E', b'D',  // GA*
            b'A', b'A', b'A', b'A',  // GC*
            b'G', b'G', b'G', b'G',  // GG*
            b'V', b'V', b'V', b'V',  // GT*
            b'*', b'Y', b'*', b'Y',  // TA*
            b'S', b'S', b'S', b'S',  // TC*
            b'*', b'C', b'W', b'C',  // TG*
            b'L', b'F', b'L', b'F',  // TT*
        ];
        Self { table }
    }

    /// Translate a single codon. Hot path: no allocation.
    #[inline]
    pub fn translate_codon(&self, codon: [u8; 3]) -> Result<u8, Error> {
        match (
            base_index(codon[0]),
            base_index(codon[1]),
            base_index(codon[2]),
        ) {
            (Some(a), Some(b), Some(c)) => Ok(self.table[a * 16 + b * 4 + c]),
            _ => Err(Error::InvalidCodon(
                String::from_utf8_lossy(&codon).into_owned(),
            )),
        }
    }

    /// Amino acid for a codon string, or `None` for the splice-site sentinel.
    pub fn codon2aa(&self, codon: &str) -> Result<Option<u8>, Error> {
        if codon == SPLICE_SITE {
            return Ok(None);
        }
        let bytes = codon.as_bytes();
        if bytes.len() != 3 {
            return Err(Error::InvalidCodon(codon.to_string()));
        }
        self.translate_codon([bytes[0], bytes[1], bytes[2]]).map(Some)
    }

    /// Amino acid at a codon site; splice sites translate to `None`.
    #[inline]
    pub fn translate_site(&self, site: &CodonSite) -> Result<Option<u8>, Error> {
        match site {
            CodonSite::Codon { codon, .. } => self.translate_codon(*codon).map(Some),
            CodonSite::SpliceSite => Ok(None),
        }
    }
}

/// Where a coding offset falls relative to the reading frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodonSite {
    Codon {
        codon: [u8; 3],
        index: usize,
        pos_in_codon: u8,
    },
    /// Splice-site base or a base of a truncated terminal codon.
    /// Not substitutable.
    SpliceSite,
}

impl CodonSite {
    /// Codon with `base` substituted at this site's position.
    #[inline]
    #[must_use]
    pub fn mutate(&self, base: u8) -> CodonSite {
        match *self {
            CodonSite::Codon {
                mut codon,
                index,
                pos_in_codon,
            } => {
                codon[pos_in_codon as usize] = base.to_ascii_uppercase();
                CodonSite::Codon {
                    codon,
                    index,
                    pos_in_codon,
                }
            }
            CodonSite::SpliceSite => CodonSite::SpliceSite,
        }
    }

    #[must_use]
    pub fn codon_index(&self) -> Option<usize> {
        match self {
            CodonSite::Codon { index, .. } => Some(*index),
            CodonSite::SpliceSite => None,
        }
    }
}

/// Locate the codon containing `offset` in a coding sequence.
#[inline]
#[must_use]
pub fn pos_to_codon(seq: &[u8], offset: usize) -> CodonSite {
    let index = offset / 3;
    let start = index * 3;
    if start + 3 > seq.len() {
        return CodonSite::SpliceSite;
    }
    CodonSite::Codon {
        codon: [
            seq[start].to_ascii_uppercase(),
            seq[start + 1].to_ascii_uppercase(),
            seq[start + 2].to_ascii_uppercase(),
        ],
        index,
        pos_in_codon: (offset % 3) as u8,
    }
}

/// Translate a CDS nucleotide sequence to a protein sequence.
pub fn translate(cds: &[u8], table: &CodonTable) -> Result<Vec<u8>, Error> {
    if cds.len() % 3 != 0 {
        return Err(Error::Validation(format!(
            "coding sequence length {} is not a multiple of three",
            cds.len()
        )));
    }
    cds.chunks_exact(3)
        .map(|c| table.translate_codon([c[0], c[1], c[2]]))
        .collect()
}
