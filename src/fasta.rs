//! FASTA reference reader exposing random-access sequence lookup.

use std::collections::HashMap;
use std::io::BufRead;
use std::path::Path;

use crate::bed::get_reader;
use crate::error::Error;

/// Random-access lookup of reference sequence.
pub trait SequenceFetcher {
    /// Bases of `contig` in the 0-based half-open interval `[start, end)`, uppercased.
    fn fetch(&self, contig: &str, start: u64, end: u64) -> Result<Vec<u8>, Error>;

    /// Whether the reference knows about `contig`.
    fn contains(&self, contig: &str) -> bool;
}

/// In-memory reference genome keyed by contig name.
#[derive(Debug, Default, Clone)]
pub struct ReferenceGenome {
    contigs: HashMap<String, Vec<u8>>,
}

impl ReferenceGenome {
    /// Load a FASTA file, transparently decompressing gzip input.
    pub fn from_path(path: &Path) -> Result<Self, Error> {
        Self::from_reader(get_reader(path)?)
    }

    pub fn from_reader<R: BufRead>(reader: R) -> Result<Self, Error> {
        let entries = parse_fasta(reader)?;
        let mut contigs = HashMap::with_capacity(entries.len());
        for (name, seq) in entries {
            if contigs.contains_key(&name) {
                return Err(Error::Validation(format!(
                    "duplicate contig in FASTA: {name}"
                )));
            }
            contigs.insert(name, seq);
        }
        Ok(Self { contigs })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.contigs.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.contigs.is_empty()
    }
}

impl SequenceFetcher for ReferenceGenome {
    fn fetch(&self, contig: &str, start: u64, end: u64) -> Result<Vec<u8>, Error> {
        let seq = self
            .contigs
            .get(contig)
            .ok_or_else(|| Error::Validation(format!("contig not in reference: {contig}")))?;
        if start > end || end > seq.len() as u64 {
            return Err(Error::Validation(format!(
                "interval {contig}:{start}-{end} outside contig of length {}",
                seq.len()
            )));
        }
        Ok(seq[start as usize..end as usize].to_vec())
    }

    fn contains(&self, contig: &str) -> bool {
        self.contigs.contains_key(contig)
    }
}

/// Reads FASTA from a buffered reader and yields (name, sequence) pairs.
///
/// The name is the first whitespace-delimited token after `>`. Bases are uppercased.
fn parse_fasta<R: BufRead>(reader: R) -> Result<Vec<(String, Vec<u8>)>, Error> {
    let mut results: Vec<(String, Vec<u8>)> = Vec::new();
    let mut current_name: Option<String> = None;
    let mut current_sequence: Vec<u8> = Vec::new();

    for line in reader.lines() {
        let line = line?;
        if let Some(header) = line.strip_prefix('>') {
            if let Some(name) = current_name.take() {
                results.push((name, std::mem::take(&mut current_sequence)));
            }
            let name = header.split_whitespace().next().unwrap_or("");
            if name.is_empty() {
                return Err(Error::Parse(format!("empty FASTA header: {line}")));
            }
            current_name = Some(name.to_string());
        } else if current_name.is_some() {
            let trimmed = line.trim();
            let start = current_sequence.len();
            current_sequence.extend_from_slice(trimmed.as_bytes());
            current_sequence[start..].make_ascii_uppercase();
        } else if !line.trim().is_empty() {
            return Err(Error::Parse("sequence data before first FASTA header".into()));
        }
    }

    if let Some(name) = current_name {
        results.push((name, current_sequence));
    }

    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::Compression;
    use flate2::write::GzEncoder;
    use std::io::{Cursor, Write};
    use tempfile::NamedTempFile;

    fn make_gz(content: &[u8]) -> Vec<u8> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::fast());
        encoder.write_all(content).unwrap();
        encoder.finish().unwrap()
    }

    #[test]
    fn fetch_interval() {
        let fasta = b">chr1 test\nACGTacgt\nNNNN\n>chr2\nTTTT\n";
        let genome = ReferenceGenome::from_reader(Cursor::new(&fasta[..])).unwrap();
        assert_eq!(genome.len(), 2);
        assert_eq!(genome.fetch("chr1", 2, 6).unwrap(), b"GTAC");
        assert_eq!(genome.fetch("chr2", 0, 4).unwrap(), b"TTTT");
        assert_eq!(genome.fetch("chr1", 8, 12).unwrap(), b"NNNN");
    }

    #[test]
    fn fetch_out_of_bounds() {
        let genome = ReferenceGenome::from_reader(Cursor::new(&b">chr1\nACGT\n"[..])).unwrap();
        assert!(genome.fetch("chr1", 2, 10).is_err());
        assert!(genome.fetch("chrX", 0, 1).is_err());
        assert!(!genome.contains("chrX"));
    }

    #[test]
    fn duplicate_contig_rejected() {
        let fasta = b">chr1\nACGT\n>chr1\nTTTT\n";
        assert!(ReferenceGenome::from_reader(Cursor::new(&fasta[..])).is_err());
    }

    #[test]
    fn load_plain_and_gzip_files() {
        let content = b">g1\nATGGCC\nTAA\n";

        let mut plain = NamedTempFile::new().unwrap();
        plain.write_all(content).unwrap();
        let genome = ReferenceGenome::from_path(plain.path()).unwrap();
        assert_eq!(genome.fetch("g1", 0, 9).unwrap(), b"ATGGCCTAA");

        let mut gz = NamedTempFile::new().unwrap();
        gz.write_all(&make_gz(content)).unwrap();
        let genome = ReferenceGenome::from_path(gz.path()).unwrap();
        assert_eq!(genome.fetch("g1", 3, 6).unwrap(), b"GCC");
    }
}
