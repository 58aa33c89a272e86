//! Error types for the prob2020 library.

use thiserror::Error;

/// Errors that can occur during prob2020 operations.
#[derive(Debug, Error)]
pub enum Error {
    /// An I/O error occurred.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// A parse error occurred while reading input data.
    #[error("{0}")]
    Parse(String),

    /// A validation constraint was violated.
    #[error("{0}")]
    Validation(String),

    /// A file format error was detected.
    #[error("{0}")]
    Format(String),

    /// A run option is missing or out of range.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// A codon contained something other than A/C/G/T or the splice-site sentinel.
    #[error("invalid codon: {0}")]
    InvalidCodon(String),

    /// Sequence data for a gene cannot be translated or contextualised.
    /// These fail the enclosing gene only, never the whole run.
    #[error("malformed sequence for {gene}: {reason}")]
    MalformedSequence { gene: String, reason: String },

    /// The run was interrupted through its cancellation token.
    #[error("cancelled by user")]
    Cancelled,
}

impl Error {
    /// Whether this error should exclude a single gene rather than abort the run.
    #[must_use]
    pub fn is_gene_local(&self) -> bool {
        matches!(
            self,
            Self::InvalidCodon(_) | Self::MalformedSequence { .. } | Self::Validation(_)
        )
    }
}
