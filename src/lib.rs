//! prob2020: permutation-based significance testing for cancer driver genes.

pub mod error;

pub mod bed;
pub mod cancel;
pub mod classify;
pub mod cli;
pub mod codon;
pub mod config;
pub mod context;
pub mod distributor;
pub mod fasta;
pub mod gene_sequence;
pub mod mutation;
pub mod mutation_context;
pub mod permutation;
pub mod randomization;
pub mod report;
pub mod sequence;
pub mod stats;
pub mod strand;
