//! Tab-separated output tables.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::classify::CategoryCounts;
use crate::error::Error;
use crate::permutation::PermutationMatrix;
use crate::randomization::GeneResult;

pub fn create_writer(path: &Path) -> Result<BufWriter<File>, Error> {
    Ok(BufWriter::new(File::create(path)?))
}

fn write_counts<W: Write>(w: &mut W, counts: &CategoryCounts) -> Result<(), Error> {
    let values: Vec<String> = counts.as_array().iter().map(u32::to_string).collect();
    writeln!(w, "{}", values.join("\t"))?;
    Ok(())
}

/// One header line, then one line per permutation.
pub fn write_matrix<W: Write>(w: &mut W, matrix: &PermutationMatrix) -> Result<(), Error> {
    writeln!(w, "{}", CategoryCounts::COLUMNS.join("\t"))?;
    for row in matrix.rows() {
        write_counts(w, row)?;
    }
    w.flush()?;
    Ok(())
}

/// Observed totals in the permutation-matrix layout.
pub fn write_observed<W: Write>(w: &mut W, observed: &CategoryCounts) -> Result<(), Error> {
    writeln!(w, "{}", CategoryCounts::COLUMNS.join("\t"))?;
    write_counts(w, observed)?;
    w.flush()?;
    Ok(())
}

fn format_p(value: Option<f64>) -> String {
    value.map_or_else(|| "NA".to_string(), |v| format!("{v:.6e}"))
}

/// Per-gene result table. All rows must come from the same test kind.
pub fn write_gene_results<W: Write>(w: &mut W, results: &[GeneResult]) -> Result<(), Error> {
    let Some(first) = results.first() else {
        writeln!(w, "gene\tchromosome\ttotal mutations")?;
        w.flush()?;
        return Ok(());
    };
    let combined = first.combined_p.is_some();

    let mut header = vec![
        "gene".to_string(),
        "chromosome".to_string(),
        "total mutations".to_string(),
        "missense".to_string(),
        "inactivating".to_string(),
        "silent".to_string(),
    ];
    for t in &first.tests {
        let name = t.statistic.name();
        header.push(format!("{name} score"));
        header.push(format!("{name} p-value"));
        header.push(format!("{name} BH q-value"));
    }
    if combined {
        header.push("combined p-value".to_string());
        header.push("combined BH q-value".to_string());
    }
    header.push("iterations".to_string());
    writeln!(w, "{}", header.join("\t"))?;

    for r in results {
        if r.tests.len() != first.tests.len() {
            return Err(Error::Validation(format!(
                "gene {} has {} tests, expected {}",
                r.gene_id,
                r.tests.len(),
                first.tests.len()
            )));
        }
        let mut fields = vec![
            r.gene_id.clone(),
            r.chromosome.clone(),
            r.total_mutations().to_string(),
            r.observed.missense.to_string(),
            r.observed.inactivating().to_string(),
            r.observed.silent.to_string(),
        ];
        for t in &r.tests {
            fields.push(format!("{:.4}", t.observed));
            fields.push(format_p(Some(t.p_value)));
            fields.push(format_p(t.q_value));
        }
        if combined {
            fields.push(format_p(r.combined_p));
            fields.push(format_p(r.combined_q));
        }
        fields.push(r.iterations.to_string());
        writeln!(w, "{}", fields.join("\t"))?;
    }
    w.flush()?;
    Ok(())
}

/// Most significant genes first: combined p-value when present, else the
/// first test's p-value; ties broken by gene id.
pub fn sort_by_significance(results: &mut [GeneResult]) {
    let key = |r: &GeneResult| {
        r.combined_p
            .or_else(|| r.tests.first().map(|t| t.p_value))
            .unwrap_or(1.0)
    };
    results.sort_by(|a, b| key(a).total_cmp(&key(b)).then_with(|| a.gene_id.cmp(&b.gene_id)));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::Category;
    use crate::randomization::{Statistic, TestOutcome};

    fn result(gene: &str, p: f64) -> GeneResult {
        GeneResult {
            gene_id: gene.into(),
            chromosome: "chr1".into(),
            observed: [Category::Missense, Category::Nonsense, Category::Silent]
                .into_iter()
                .collect(),
            tests: vec![TestOutcome {
                statistic: Statistic::Inactivating,
                observed: 1.0,
                p_value: p,
                q_value: Some(p),
                iterations: 99,
            }],
            combined_p: None,
            combined_q: None,
            iterations: 99,
            skipped: 0,
        }
    }

    #[test]
    fn matrix_layout() {
        let mut counts = CategoryCounts::default();
        counts.record(Category::Missense);
        let matrix = PermutationMatrix::from(vec![counts, CategoryCounts::default()]);
        let mut out = Vec::new();
        write_matrix(&mut out, &matrix).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("non-silent count\tsilent count"));
        assert_eq!(lines[1], "1\t0\t0\t0\t0\t0\t1");
        assert_eq!(lines[2], "0\t0\t0\t0\t0\t0\t0");
    }

    #[test]
    fn observed_layout() {
        let mut out = Vec::new();
        write_observed(&mut out, &CategoryCounts::default()).unwrap();
        assert_eq!(String::from_utf8(out).unwrap().lines().count(), 2);
    }

    #[test]
    fn gene_table_columns() {
        let mut out = Vec::new();
        write_gene_results(&mut out, &[result("TP53", 0.001)]).unwrap();
        let text = String::from_utf8(out).unwrap();
        let mut lines = text.lines();
        let header: Vec<&str> = lines.next().unwrap().split('\t').collect();
        let row: Vec<&str> = lines.next().unwrap().split('\t').collect();
        assert_eq!(header.len(), row.len());
        assert!(header.contains(&"inactivating p-value"));
        assert!(!header.contains(&"combined p-value"));
        assert_eq!(row[0], "TP53");
        assert_eq!(row[2], "3");
        assert_eq!(row[4], "1");
    }

    #[test]
    fn sorted_by_p_value() {
        let mut results = vec![result("B", 0.5), result("A", 0.01), result("C", 0.5)];
        sort_by_significance(&mut results);
        let ids: Vec<&str> = results.iter().map(|r| r.gene_id.as_str()).collect();
        assert_eq!(ids, vec!["A", "B", "C"]);
    }
}
