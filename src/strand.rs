//! Strand orientation of gene models.

use std::fmt;
use std::str::FromStr;

use crate::error::Error;
use crate::sequence::complement;

/// Strand a gene is transcribed from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Strand {
    Forward,
    Reverse,
}

impl Strand {
    #[must_use]
    pub fn is_reverse(self) -> bool {
        self == Self::Reverse
    }

    /// Express a genomic (+ strand) base in coding orientation.
    #[must_use]
    pub fn to_coding_base(self, base: u8) -> u8 {
        match self {
            Self::Forward => base.to_ascii_uppercase(),
            Self::Reverse => complement(base.to_ascii_uppercase()),
        }
    }
}

impl FromStr for Strand {
    type Err = Error;

    /// Parse BED column 6. Only "+" and "-" are meaningful for coding genes.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "+" => Ok(Self::Forward),
            "-" => Ok(Self::Reverse),
            _ => Err(Error::Parse(format!("invalid strand: '{s}'"))),
        }
    }
}

impl fmt::Display for Strand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Forward => write!(f, "+"),
            Self::Reverse => write!(f, "-"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_bed_strand() {
        assert_eq!("+".parse::<Strand>().unwrap(), Strand::Forward);
        assert_eq!("-".parse::<Strand>().unwrap(), Strand::Reverse);
        assert!(".".parse::<Strand>().is_err());
    }

    #[test]
    fn display_round_trip() {
        for strand in [Strand::Forward, Strand::Reverse] {
            assert_eq!(strand.to_string().parse::<Strand>().unwrap(), strand);
        }
    }

    #[test]
    fn coding_base() {
        assert_eq!(Strand::Forward.to_coding_base(b'a'), b'A');
        assert_eq!(Strand::Reverse.to_coding_base(b'A'), b'T');
        assert_eq!(Strand::Reverse.to_coding_base(b'g'), b'C');
    }
}
