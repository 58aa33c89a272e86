//! Nucleotide context model: context orders, context keys and per-gene pools.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::Deserialize;

use crate::error::Error;
use crate::gene_sequence::GeneSequence;

/// How much sequence around a position defines its mutational context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(try_from = "f64")]
pub enum ContextOrder {
    /// No context: every position shares one bucket.
    Zero,
    /// The base itself.
    One,
    /// CHASM doublets (CpG, TpC, GpA) or the base itself.
    OnePointFive,
    /// Upstream base and the base.
    Two,
    /// Trinucleotide centred on the base.
    Three,
}

impl TryFrom<f64> for ContextOrder {
    type Error = Error;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        if value == 0.0 {
            Ok(Self::Zero)
        } else if value == 1.0 {
            Ok(Self::One)
        } else if value == 1.5 {
            Ok(Self::OnePointFive)
        } else if value == 2.0 {
            Ok(Self::Two)
        } else if value == 3.0 {
            Ok(Self::Three)
        } else {
            Err(Error::Config(format!(
                "context order must be one of 0, 1, 1.5, 2, 3 (got {value})"
            )))
        }
    }
}

impl FromStr for ContextOrder {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value: f64 = s
            .trim()
            .parse()
            .map_err(|_| Error::Config(format!("invalid context order: '{s}'")))?;
        Self::try_from(value)
    }
}

impl fmt::Display for ContextOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Zero => "0",
            Self::One => "1",
            Self::OnePointFive => "1.5",
            Self::Two => "2",
            Self::Three => "3",
        };
        f.write_str(s)
    }
}

/// Context of a position: up to four ASCII bytes, or the no-context sentinel.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContextKey {
    bytes: [u8; 4],
    len: u8,
}

impl ContextKey {
    /// Shared key when the context order is zero.
    pub const NONE: ContextKey = ContextKey {
        bytes: [0; 4],
        len: 0,
    };

    /// Build a key from at most four bytes; longer input is rejected.
    #[must_use]
    pub fn new(key: &[u8]) -> Option<Self> {
        if key.is_empty() || key.len() > 4 {
            return None;
        }
        let mut bytes = [0u8; 4];
        for (dst, src) in bytes.iter_mut().zip(key) {
            *dst = src.to_ascii_uppercase();
        }
        Some(Self {
            bytes,
            len: key.len() as u8,
        })
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..self.len as usize]
    }

    /// Context key for `base` given its coding-sense neighbours.
    ///
    /// Missing flanks fall back to the shorter key of the same order.
    #[must_use]
    pub fn compute(order: ContextOrder, up: Option<u8>, base: u8, down: Option<u8>) -> Self {
        let b = base.to_ascii_uppercase();
        let up = up.map(|u| u.to_ascii_uppercase());
        let down = down.map(|d| d.to_ascii_uppercase());
        let key = |bytes: &[u8]| Self::new(bytes).unwrap_or(Self::NONE);
        match order {
            ContextOrder::Zero => Self::NONE,
            ContextOrder::One => key(&[b]),
            ContextOrder::OnePointFive => {
                if b == b'C' && down == Some(b'G') {
                    key(b"C*pG")
                } else if b == b'G' && up == Some(b'C') {
                    key(b"CpG*")
                } else if b == b'C' && up == Some(b'T') {
                    key(b"TpC*")
                } else if b == b'G' && down == Some(b'A') {
                    key(b"G*pA")
                } else {
                    key(&[b])
                }
            }
            ContextOrder::Two => match up {
                Some(u) => key(&[u, b]),
                None => key(&[b]),
            },
            ContextOrder::Three => match (up, down) {
                (Some(u), Some(d)) => key(&[u, b, d]),
                (Some(u), None) => key(&[u, b]),
                (None, _) => key(&[b]),
            },
        }
    }
}

impl fmt::Display for ContextKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.len == 0 {
            return f.write_str("None");
        }
        for &b in self.as_bytes() {
            write!(f, "{}", b as char)?;
        }
        Ok(())
    }
}

impl fmt::Debug for ContextKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContextKey({self})")
    }
}

/// Number of positions sharing each context.
pub type ContextCounts = BTreeMap<ContextKey, usize>;

/// Observed somatic bases (coding orientation) bucketed by context.
pub type ContextToMutations = BTreeMap<ContextKey, Vec<u8>>;

/// Per-gene context counts with the positions behind each count.
#[derive(Debug, Clone, Default)]
pub struct SequenceContext {
    counts: ContextCounts,
    pools: BTreeMap<ContextKey, Vec<usize>>,
}

impl SequenceContext {
    /// Bucket every addressable position of a gene by context.
    #[must_use]
    pub fn build(gene: &GeneSequence) -> Self {
        let mut pools: BTreeMap<ContextKey, Vec<usize>> = BTreeMap::new();
        for (pos, key) in gene.context_keys().iter().enumerate() {
            pools.entry(*key).or_default().push(pos);
        }
        let counts = pools.iter().map(|(k, v)| (*k, v.len())).collect();
        Self { counts, pools }
    }

    #[must_use]
    pub fn counts(&self) -> &ContextCounts {
        &self.counts
    }

    /// Positions sharing `key`; empty when the gene lacks that context.
    #[must_use]
    pub fn pool(&self, key: &ContextKey) -> &[usize] {
        self.pools.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    #[must_use]
    pub fn contains(&self, key: &ContextKey) -> bool {
        self.pools.contains_key(key)
    }

    /// Total positions across all contexts.
    #[must_use]
    pub fn total(&self) -> usize {
        self.counts.values().sum()
    }
}
