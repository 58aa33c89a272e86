//! BED gene models: one coding transcript per gene.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

use flate2::read::MultiGzDecoder;

use crate::error::Error;
use crate::strand::Strand;

/// Number of intronic bases on each side of an exon junction treated as splice site.
pub const SPLICE_SITE_LEN: u64 = 2;

/// A coding exon, 0-based half-open genomic interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Exon {
    pub start: u64,
    pub end: u64,
}

impl Exon {
    #[must_use]
    pub fn len(&self) -> u64 {
        self.end - self.start
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }
}

/// A gene with its coding exons, sorted by ascending genomic start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneRecord {
    pub gene_id: String,
    pub chromosome: String,
    pub strand: Strand,
    pub exons: Vec<Exon>,
}

impl GeneRecord {
    /// Total number of coding bases.
    #[must_use]
    pub fn coding_len(&self) -> u64 {
        self.exons.iter().map(Exon::len).sum()
    }

    /// Offset of a genomic position in the coding sequence (5'→3' of the gene).
    #[must_use]
    pub fn coding_offset(&self, pos: u64) -> Option<u64> {
        let mut preceding = 0;
        for exon in &self.exons {
            if pos >= exon.start && pos < exon.end {
                let forward = preceding + (pos - exon.start);
                return Some(match self.strand {
                    Strand::Forward => forward,
                    Strand::Reverse => self.coding_len() - 1 - forward,
                });
            }
            preceding += exon.len();
        }
        None
    }

    /// Genomic positions of splice-site bases in coding order.
    ///
    /// Each internal junction contributes a donor and an acceptor dinucleotide;
    /// consecutive pairs in the returned list always form one dinucleotide.
    /// Junctions whose intron is too short to hold both are skipped.
    #[must_use]
    pub fn splice_positions(&self) -> Vec<u64> {
        let mut positions = Vec::with_capacity(self.exons.len().saturating_sub(1) * 4);
        for pair in self.exons.windows(2) {
            let (left, right) = (pair[0], pair[1]);
            if right.start < left.end + 2 * SPLICE_SITE_LEN {
                continue;
            }
            positions.extend(left.end..left.end + SPLICE_SITE_LEN);
            positions.extend(right.start - SPLICE_SITE_LEN..right.start);
        }
        if self.strand.is_reverse() {
            positions.reverse();
        }
        positions
    }
}

/// Open a text file, decompressing gzip input when the magic bytes say so.
pub fn get_reader(path: &Path) -> Result<Box<dyn BufRead>, Error> {
    let mut magic = [0u8; 2];
    let n = File::open(path)?.read(&mut magic)?;
    let file = File::open(path)?;
    if n == 2 && magic == [0x1f, 0x8b] {
        Ok(Box::new(BufReader::new(MultiGzDecoder::new(file))))
    } else {
        Ok(Box::new(BufReader::new(file)))
    }
}

/// Read a BED file into gene records grouped by chromosome.
pub fn read_bed(path: &Path) -> Result<BTreeMap<String, Vec<GeneRecord>>, Error> {
    parse_bed(get_reader(path)?)
}

pub fn parse_bed<R: BufRead>(reader: R) -> Result<BTreeMap<String, Vec<GeneRecord>>, Error> {
    let mut by_chrom: BTreeMap<String, Vec<GeneRecord>> = BTreeMap::new();
    for (line_num, line) in reader.lines().enumerate() {
        let line = line?;
        if line.is_empty()
            || line.starts_with('#')
            || line.starts_with("track")
            || line.starts_with("browser")
        {
            continue;
        }
        let record = parse_line(&line)
            .map_err(|e| Error::Parse(format!("{e} (line {}: {line})", line_num + 1)))?;
        by_chrom
            .entry(record.chromosome.clone())
            .or_default()
            .push(record);
    }
    Ok(by_chrom)
}

fn parse_u64(field: &str, name: &str) -> Result<u64, Error> {
    field
        .trim()
        .parse()
        .map_err(|_| Error::Parse(format!("invalid {name}: '{field}'")))
}

fn parse_list(field: &str, name: &str) -> Result<Vec<u64>, Error> {
    field
        .split(',')
        .filter(|s| !s.trim().is_empty())
        .map(|s| parse_u64(s, name))
        .collect()
}

/// Parse one BED6/BED12 line. Exons are clipped to the thick (coding) interval.
fn parse_line(line: &str) -> Result<GeneRecord, Error> {
    let fields: Vec<&str> = line.split('\t').collect();
    if fields.len() < 6 {
        return Err(Error::Parse(format!(
            "expected at least 6 BED columns, found {}",
            fields.len()
        )));
    }
    let chromosome = fields[0].to_string();
    let chrom_start = parse_u64(fields[1], "chromStart")?;
    let chrom_end = parse_u64(fields[2], "chromEnd")?;
    let gene_id = fields[3].to_string();
    let strand: Strand = fields[5].parse()?;

    let (thick_start, thick_end) = if fields.len() >= 8 {
        (
            parse_u64(fields[6], "thickStart")?,
            parse_u64(fields[7], "thickEnd")?,
        )
    } else {
        (chrom_start, chrom_end)
    };

    let blocks: Vec<Exon> = if fields.len() >= 12 {
        let sizes = parse_list(fields[10], "blockSizes")?;
        let starts = parse_list(fields[11], "blockStarts")?;
        if sizes.len() != starts.len() {
            return Err(Error::Parse(format!(
                "{gene_id}: {} block sizes but {} block starts",
                sizes.len(),
                starts.len()
            )));
        }
        starts
            .iter()
            .zip(&sizes)
            .map(|(&s, &len)| Exon {
                start: chrom_start + s,
                end: chrom_start + s + len,
            })
            .collect()
    } else {
        vec![Exon {
            start: chrom_start,
            end: chrom_end,
        }]
    };

    let mut exons: Vec<Exon> = blocks
        .into_iter()
        .map(|b| Exon {
            start: b.start.max(thick_start),
            end: b.end.min(thick_end),
        })
        .filter(|e| !e.is_empty())
        .collect();
    exons.sort_by_key(|e| e.start);

    Ok(GeneRecord {
        gene_id,
        chromosome,
        strand,
        exons,
    })
}
