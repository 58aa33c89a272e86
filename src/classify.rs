//! Functional classification of coding substitutions.

use std::ops::{Add, AddAssign};

use crate::codon::STOP;

/// Effect of a single substitution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    Silent,
    Nonsense,
    LostStop,
    SpliceSite,
    LostStart,
    Missense,
}

impl Category {
    #[must_use]
    pub fn is_non_silent(self) -> bool {
        self != Self::Silent
    }
}

/// Classify a reference/somatic amino-acid pair.
///
/// `None` amino acids mark splice-site positions. `codon_index` is the
/// 0-based codon number; codon 0 is the start codon.
#[inline]
#[must_use]
pub fn classify(ref_aa: Option<u8>, somatic_aa: Option<u8>, codon_index: Option<usize>) -> Category {
    let (Some(r), Some(s)) = (ref_aa, somatic_aa) else {
        return Category::SpliceSite;
    };
    if r == s {
        Category::Silent
    } else if s == STOP {
        Category::Nonsense
    } else if r == STOP {
        Category::LostStop
    } else if codon_index == Some(0) {
        Category::LostStart
    } else {
        Category::Missense
    }
}

/// Per-category tallies in fixed column order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct CategoryCounts {
    pub non_silent: u32,
    pub silent: u32,
    pub nonsense: u32,
    pub lost_stop: u32,
    pub splice_site: u32,
    pub lost_start: u32,
    pub missense: u32,
}

impl CategoryCounts {
    /// Column names in output order.
    pub const COLUMNS: [&'static str; 7] = [
        "non-silent count",
        "silent count",
        "nonsense count",
        "lost stop count",
        "splice site count",
        "lost start count",
        "missense count",
    ];

    #[inline]
    pub fn record(&mut self, category: Category) {
        match category {
            Category::Silent => {
                self.silent += 1;
                return;
            }
            Category::Nonsense => self.nonsense += 1,
            Category::LostStop => self.lost_stop += 1,
            Category::SpliceSite => self.splice_site += 1,
            Category::LostStart => self.lost_start += 1,
            Category::Missense => self.missense += 1,
        }
        self.non_silent += 1;
    }

    /// Values in [`Self::COLUMNS`] order.
    #[must_use]
    pub fn as_array(&self) -> [u32; 7] {
        [
            self.non_silent,
            self.silent,
            self.nonsense,
            self.lost_stop,
            self.splice_site,
            self.lost_start,
            self.missense,
        ]
    }

    #[must_use]
    pub fn total(&self) -> u32 {
        self.non_silent + self.silent
    }

    #[must_use]
    pub fn inactivating(&self) -> u32 {
        self.nonsense + self.lost_stop + self.splice_site + self.lost_start
    }

    /// `non_silent` equals the sum of its sub-categories.
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        self.non_silent == self.inactivating() + self.missense
    }

    /// Element-wise sum; the all-zero record is the identity.
    #[must_use]
    pub fn merge(self, other: Self) -> Self {
        self + other
    }
}

impl Add for CategoryCounts {
    type Output = Self;

    fn add(self, o: Self) -> Self {
        Self {
            non_silent: self.non_silent + o.non_silent,
            silent: self.silent + o.silent,
            nonsense: self.nonsense + o.nonsense,
            lost_stop: self.lost_stop + o.lost_stop,
            splice_site: self.splice_site + o.splice_site,
            lost_start: self.lost_start + o.lost_start,
            missense: self.missense + o.missense,
        }
    }
}

impl AddAssign for CategoryCounts {
    fn add_assign(&mut self, o: Self) {
        *self = *self + o;
    }
}

impl FromIterator<Category> for CategoryCounts {
    fn from_iter<I: IntoIterator<Item = Category>>(iter: I) -> Self {
        let mut counts = Self::default();
        for c in iter {
            counts.record(c);
        }
        counts
    }
}
