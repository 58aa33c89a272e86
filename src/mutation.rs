//! Somatic mutation table (MAF-like, tab separated).

use std::collections::{BTreeMap, HashMap, HashSet};
use std::io::BufRead;
use std::path::Path;

use tracing::info;

use crate::bed::get_reader;
use crate::error::Error;
use crate::sequence::is_valid_base;

const GENE: &str = "Gene";
const SAMPLE: &str = "Tumor_Sample";
const CHROMOSOME: &str = "Chromosome";
const START: &str = "Start_Position";
const REFERENCE: &str = "Reference_Allele";
const TUMOR: &str = "Tumor_Allele";

/// A single somatic SNV. Positions are 0-based on the + strand.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Mutation {
    pub gene: String,
    pub sample: String,
    pub chromosome: String,
    pub start: u64,
    pub reference_allele: u8,
    pub tumor_allele: u8,
}

/// Counts of rows dropped while loading.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct LoadStats {
    pub total_rows: usize,
    pub missing_fields: usize,
    pub not_snv: usize,
    pub duplicates: usize,
}

/// Mutations grouped by gene label.
#[derive(Debug, Default, Clone)]
pub struct MutationTable {
    by_gene: HashMap<String, Vec<Mutation>>,
    len: usize,
}

impl MutationTable {
    #[must_use]
    pub fn new(mutations: Vec<Mutation>) -> Self {
        let len = mutations.len();
        let mut by_gene: HashMap<String, Vec<Mutation>> = HashMap::new();
        for m in mutations {
            by_gene.entry(m.gene.clone()).or_default().push(m);
        }
        Self { by_gene, len }
    }

    /// Mutations labelled with `gene`, in file order.
    #[must_use]
    pub fn for_gene(&self, gene: &str) -> &[Mutation] {
        self.by_gene.get(gene).map(Vec::as_slice).unwrap_or(&[])
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of mutations per sample, sorted by sample id.
    #[must_use]
    pub fn sample_counts(&self) -> BTreeMap<&str, usize> {
        let mut counts = BTreeMap::new();
        for m in self.by_gene.values().flatten() {
            *counts.entry(m.sample.as_str()).or_insert(0) += 1;
        }
        counts
    }
}

/// Load a mutation file. `unique` keeps one copy of a mutation per sample.
pub fn read_mutations(path: &Path, unique: bool) -> Result<(MutationTable, LoadStats), Error> {
    let (mutations, stats) = parse_mutations(get_reader(path)?, unique)?;
    info!(
        kept = mutations.len(),
        missing = stats.missing_fields,
        not_snv = stats.not_snv,
        duplicates = stats.duplicates,
        "loaded mutations"
    );
    Ok((MutationTable::new(mutations), stats))
}

pub fn parse_mutations<R: BufRead>(
    reader: R,
    unique: bool,
) -> Result<(Vec<Mutation>, LoadStats), Error> {
    let mut lines = reader.lines();
    let header = loop {
        match lines.next() {
            Some(line) => {
                let line = line?;
                if !line.starts_with('#') && !line.trim().is_empty() {
                    break line;
                }
            }
            None => return Err(Error::Format("mutation file has no header".into())),
        }
    };
    let columns: HashMap<&str, usize> = header
        .split('\t')
        .enumerate()
        .map(|(i, name)| (name.trim(), i))
        .collect();
    let column = |name: &str| {
        columns
            .get(name)
            .copied()
            .ok_or_else(|| Error::Format(format!("mutation file is missing column '{name}'")))
    };
    let idx = [
        column(GENE)?,
        column(SAMPLE)?,
        column(CHROMOSOME)?,
        column(START)?,
        column(REFERENCE)?,
        column(TUMOR)?,
    ];

    let mut stats = LoadStats::default();
    let mut seen = HashSet::new();
    let mut mutations = Vec::new();

    for (line_num, line) in lines.enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        stats.total_rows += 1;
        let fields: Vec<&str> = line.split('\t').collect();
        let get = |i: usize| fields.get(i).map(|s| s.trim()).filter(|s| !s.is_empty());
        let (Some(gene), Some(sample), Some(chrom), Some(start), Some(reference), Some(tumor)) = (
            get(idx[0]),
            get(idx[1]),
            get(idx[2]),
            get(idx[3]),
            get(idx[4]),
            get(idx[5]),
        ) else {
            stats.missing_fields += 1;
            continue;
        };

        let start: u64 = start.parse().map_err(|_| {
            Error::Parse(format!(
                "invalid {START} '{start}' (line {})",
                line_num + 2
            ))
        })?;
        if start == 0 {
            return Err(Error::Parse(format!(
                "{START} must be 1-based (line {})",
                line_num + 2
            )));
        }

        let (reference, tumor) = (reference.as_bytes(), tumor.as_bytes());
        if reference.len() != 1
            || tumor.len() != 1
            || !is_valid_base(reference[0])
            || !is_valid_base(tumor[0])
            || reference[0].eq_ignore_ascii_case(&tumor[0])
        {
            stats.not_snv += 1;
            continue;
        }

        let mutation = Mutation {
            gene: gene.to_string(),
            sample: sample.to_string(),
            chromosome: chrom.to_string(),
            start: start - 1,
            reference_allele: reference[0].to_ascii_uppercase(),
            tumor_allele: tumor[0].to_ascii_uppercase(),
        };
        if unique && !seen.insert(mutation.clone()) {
            stats.duplicates += 1;
            continue;
        }
        mutations.push(mutation);
    }

    Ok((mutations, stats))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    const HEADER: &str =
        "Gene\tTumor_Sample\tChromosome\tStart_Position\tReference_Allele\tTumor_Allele\n";

    fn parse(body: &str, unique: bool) -> (Vec<Mutation>, LoadStats) {
        parse_mutations(Cursor::new(format!("{HEADER}{body}")), unique).unwrap()
    }

    #[test]
    fn converts_to_zero_based() {
        let (muts, stats) = parse("TP53\tS1\tchr17\t100\tc\tt\n", false);
        assert_eq!(stats.total_rows, 1);
        assert_eq!(
            muts[0],
            Mutation {
                gene: "TP53".into(),
                sample: "S1".into(),
                chromosome: "chr17".into(),
                start: 99,
                reference_allele: b'C',
                tumor_allele: b'T',
            }
        );
    }

    #[test]
    fn drops_missing_and_non_snv_rows() {
        let body = "A\tS1\tchr1\t5\tA\t\nA\tS1\tchr1\t5\tAC\tA\nA\tS1\tchr1\t5\t-\tA\nA\tS1\tchr1\t6\tG\tG\nA\tS1\tchr1\t7\tG\tA\n";
        let (muts, stats) = parse(body, false);
        assert_eq!(muts.len(), 1);
        assert_eq!(stats.missing_fields, 1);
        assert_eq!(stats.not_snv, 3);
    }

    #[test]
    fn unique_removes_duplicates() {
        let body = "A\tS1\tchr1\t5\tA\tC\nA\tS1\tchr1\t5\tA\tC\nA\tS2\tchr1\t5\tA\tC\n";
        let (muts, stats) = parse(body, true);
        assert_eq!(muts.len(), 2);
        assert_eq!(stats.duplicates, 1);
        let (muts, _) = parse(body, false);
        assert_eq!(muts.len(), 3);
    }

    #[test]
    fn columns_in_any_order() {
        let text = "Tumor_Allele\tGene\tStart_Position\tChromosome\tTumor_Sample\tReference_Allele\nT\tKRAS\t12\tchr12\tS9\tG\n";
        let (muts, _) = parse_mutations(Cursor::new(text), false).unwrap();
        assert_eq!(muts[0].gene, "KRAS");
        assert_eq!(muts[0].start, 11);
        assert_eq!(muts[0].tumor_allele, b'T');
    }

    #[test]
    fn missing_column_is_format_error() {
        let text = "Gene\tChromosome\nA\tchr1\n";
        assert!(matches!(
            parse_mutations(Cursor::new(text), false),
            Err(Error::Format(_))
        ));
    }

    #[test]
    fn table_groups_by_gene() {
        let (muts, _) = parse("A\tS1\tchr1\t5\tA\tC\nB\tS1\tchr1\t9\tA\tC\nA\tS2\tchr1\t6\tA\tG\n", false);
        let table = MutationTable::new(muts);
        assert_eq!(table.len(), 3);
        assert_eq!(table.for_gene("A").len(), 2);
        assert!(table.for_gene("Z").is_empty());
        assert_eq!(table.sample_counts()["S1"], 2);
    }
}
