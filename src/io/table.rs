//! # Genotype Table Loader
//!
//! Reads the plain-text genotype table into [`GenotypeData`]. One row per
//! ploidy slot: sample identifier, population label, then one integer allele
//! code per locus with `0` marking missing data. Consecutive rows sharing a
//! sample identifier form that individual's ploidy slots, so mixed-ploidy
//! datasets need no special syntax. Lines starting with `#` are comments.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use crate::data::GenotypeData;
use crate::error::{DemixError, Result};

/// Load a genotype table from `path`.
pub fn load_genotype_table(path: &Path) -> Result<GenotypeData> {
    let file = File::open(path).map_err(|_| DemixError::FileNotFound {
        path: path.to_path_buf(),
    })?;
    parse_genotype_table(BufReader::new(file))
}

/// Parse a genotype table from any reader.
pub fn parse_genotype_table<R: BufRead>(reader: R) -> Result<GenotypeData> {
    let mut alleles: Vec<Vec<Vec<u16>>> = Vec::new();
    let mut sample_ids: Vec<String> = Vec::new();
    let mut pop_labels: Vec<String> = Vec::new();
    let mut n_loci: Option<usize> = None;

    for (line_no, line) in reader.lines().enumerate() {
        let line_no = line_no + 1;
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        let mut tokens = trimmed.split_whitespace();
        let sample = tokens
            .next()
            .ok_or_else(|| DemixError::parse(line_no, "missing sample identifier"))?;
        let pop = tokens
            .next()
            .ok_or_else(|| DemixError::parse(line_no, "missing population label"))?;

        let codes: Vec<u16> = tokens
            .map(|t| {
                t.parse::<u16>().map_err(|_| {
                    DemixError::parse(line_no, format!("invalid allele code '{}'", t))
                })
            })
            .collect::<Result<_>>()?;
        if codes.is_empty() {
            return Err(DemixError::parse(line_no, "row has no allele columns"));
        }
        match n_loci {
            None => n_loci = Some(codes.len()),
            Some(expected) if codes.len() != expected => {
                return Err(DemixError::parse(
                    line_no,
                    format!("row has {} loci, expected {}", codes.len(), expected),
                ));
            }
            Some(_) => {}
        }

        // consecutive rows with the same sample id extend its ploidy
        match alleles.last_mut() {
            Some(ind) if sample_ids.last().map(String::as_str) == Some(sample) => {
                for (l, &code) in codes.iter().enumerate() {
                    ind[l].push(code);
                }
            }
            _ => {
                sample_ids.push(sample.to_string());
                pop_labels.push(pop.to_string());
                alleles.push(codes.into_iter().map(|c| vec![c]).collect());
            }
        }
    }

    if alleles.is_empty() {
        return Err(DemixError::invalid_data("genotype table has no data rows"));
    }
    GenotypeData::from_parts(alleles, sample_ids, pop_labels)
}
