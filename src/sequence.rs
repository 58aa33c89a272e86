//! Nucleotide helpers shared by the gene model and the context model.

/// The four unambiguous DNA bases in index order.
pub const BASES: [u8; 4] = [b'A', b'C', b'G', b'T'];

/// Watson-Crick complement; case is preserved and anything else passes through.
#[must_use]
pub fn complement(base: u8) -> u8 {
    match base {
        b'A' => b'T',
        b'T' => b'A',
        b'C' => b'G',
        b'G' => b'C',
        b'a' => b't',
        b't' => b'a',
        b'c' => b'g',
        b'g' => b'c',
        other => other,
    }
}

/// Reverse complement of a sequence.
#[must_use]
pub fn reverse_complement(seq: &[u8]) -> Vec<u8> {
    seq.iter().rev().map(|&b| complement(b)).collect()
}

/// Index of a base in [`BASES`] (case-insensitive).
#[must_use]
pub fn base_index(base: u8) -> Option<usize> {
    match base {
        b'A' | b'a' => Some(0),
        b'C' | b'c' => Some(1),
        b'G' | b'g' => Some(2),
        b'T' | b't' => Some(3),
        _ => None,
    }
}

#[must_use]
pub fn is_valid_base(base: u8) -> bool {
    base_index(base).is_some()
}

/// The three bases different from `base`, in [`BASES`] order.
#[must_use]
pub fn alternative_bases(base: u8) -> [u8; 3] {
    let reference = base.to_ascii_uppercase();
    let mut out = [b'N'; 3];
    let mut i = 0;
    for b in BASES {
        if b != reference && i < 3 {
            out[i] = b;
            i += 1;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reverse_complement_preserves_case() {
        assert_eq!(reverse_complement(b"ACGTn"), b"nACGT");
        assert_eq!(reverse_complement(b"aacG"), b"Cgtt");
        assert!(reverse_complement(b"").is_empty());
    }

    #[test]
    fn alternatives_exclude_reference() {
        assert_eq!(alternative_bases(b'A'), [b'C', b'G', b'T']);
        assert_eq!(alternative_bases(b'g'), [b'A', b'C', b'T']);
    }

    #[test]
    fn base_validation() {
        assert!(is_valid_base(b'c'));
        assert!(!is_valid_base(b'N'));
        assert_eq!(base_index(b'T'), Some(3));
    }
}
