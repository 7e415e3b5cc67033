//! # Genotype Container
//!
//! In-memory representation of the observed multilocus genotypes.
//!
//! ## Design
//! - Allele observations are a ragged `[individual][locus][ploidy slot]`
//!   array of integer codes, with `0` reserved for missing data. Codes at
//!   locus `l` run over `1..=n_alleles(l)`.
//! - Gene copies are enumerated in a canonical linear order (individuals,
//!   then loci, then ploidy slots). The order is materialized once as a
//!   `gene copy -> (individual, locus, slot)` table so every consumer of the
//!   linear index shares the same ground truth.

use crate::error::{DemixError, Result};

/// Location of one gene copy in the ragged genotype array.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GeneCopy {
    /// Individual index
    pub ind: u32,
    /// Locus index
    pub locus: u32,
    /// Ploidy slot index within the individual
    pub slot: u32,
}

/// Observed genotype data with its population annotations.
#[derive(Debug, Clone)]
pub struct GenotypeData {
    /// Allele observations `alleles[i][l][p]`, `0` = missing
    alleles: Vec<Vec<Vec<u16>>>,
    /// Ploidy of each individual
    ploidy: Vec<usize>,
    /// Number of distinct allele values at each locus
    n_alleles: Vec<usize>,
    /// Sample identifier of each individual
    sample_ids: Vec<String>,
    /// Declared population of each individual (index into `pop_names`)
    pop_index: Vec<usize>,
    /// Unique population labels in order of first appearance
    pop_names: Vec<String>,
    /// Number of individuals in each population
    pop_counts: Vec<usize>,
    /// Canonical linear enumeration of gene copies
    gene_copies: Vec<GeneCopy>,
}

impl GenotypeData {
    /// Assemble a dataset from per-individual observations.
    ///
    /// `alleles[i][l]` holds the `ploidy[i]` observations of individual `i`
    /// at locus `l`. Per-locus allele counts are taken as the maximum
    /// observed code (at least 1). Population labels are interned in order
    /// of first appearance.
    pub fn from_parts(
        alleles: Vec<Vec<Vec<u16>>>,
        sample_ids: Vec<String>,
        pop_labels: Vec<String>,
    ) -> Result<Self> {
        let n_ind = alleles.len();
        if n_ind == 0 {
            return Err(DemixError::invalid_data("no individuals in dataset"));
        }
        if sample_ids.len() != n_ind || pop_labels.len() != n_ind {
            return Err(DemixError::invalid_data(
                "sample/population annotations do not match individual count",
            ));
        }

        let n_loci = alleles[0].len();
        if n_loci == 0 {
            return Err(DemixError::invalid_data("no loci in dataset"));
        }

        let mut ploidy = Vec::with_capacity(n_ind);
        for (i, ind) in alleles.iter().enumerate() {
            if ind.len() != n_loci {
                return Err(DemixError::invalid_data(format!(
                    "individual {} has {} loci, expected {}",
                    i,
                    ind.len(),
                    n_loci
                )));
            }
            let p = ind[0].len();
            if p == 0 {
                return Err(DemixError::invalid_data(format!(
                    "individual {} has ploidy 0",
                    i
                )));
            }
            if ind.iter().any(|locus| locus.len() != p) {
                return Err(DemixError::invalid_data(format!(
                    "individual {} has inconsistent ploidy across loci",
                    i
                )));
            }
            ploidy.push(p);
        }

        let mut n_alleles = vec![1usize; n_loci];
        for ind in &alleles {
            for (l, locus) in ind.iter().enumerate() {
                for &a in locus {
                    if a as usize > n_alleles[l] {
                        n_alleles[l] = a as usize;
                    }
                }
            }
        }

        // Intern population labels
        let mut pop_names: Vec<String> = Vec::new();
        let mut pop_counts: Vec<usize> = Vec::new();
        let mut pop_index = Vec::with_capacity(n_ind);
        for label in &pop_labels {
            let idx = match pop_names.iter().position(|p| p == label) {
                Some(idx) => idx,
                None => {
                    pop_names.push(label.clone());
                    pop_counts.push(0);
                    pop_names.len() - 1
                }
            };
            pop_counts[idx] += 1;
            pop_index.push(idx);
        }

        // Canonical gene-copy enumeration: individual, then locus, then slot
        let mut gene_copies = Vec::new();
        for (i, &p) in ploidy.iter().enumerate() {
            for l in 0..n_loci {
                for s in 0..p {
                    gene_copies.push(GeneCopy {
                        ind: i as u32,
                        locus: l as u32,
                        slot: s as u32,
                    });
                }
            }
        }

        Ok(Self {
            alleles,
            ploidy,
            n_alleles,
            sample_ids,
            pop_index,
            pop_names,
            pop_counts,
            gene_copies,
        })
    }

    /// Number of individuals
    pub fn n_individuals(&self) -> usize {
        self.ploidy.len()
    }

    /// Number of loci
    pub fn n_loci(&self) -> usize {
        self.n_alleles.len()
    }

    /// Ploidy of individual `i`
    #[inline]
    pub fn ploidy(&self, i: usize) -> usize {
        self.ploidy[i]
    }

    /// Number of distinct allele values at locus `l`
    #[inline]
    pub fn n_alleles(&self, l: usize) -> usize {
        self.n_alleles[l]
    }

    /// Largest allele count over all loci
    pub fn max_alleles(&self) -> usize {
        self.n_alleles.iter().copied().max().unwrap_or(1)
    }

    /// Allele observation for one gene copy, `0` = missing
    #[inline]
    pub fn allele(&self, copy: GeneCopy) -> u16 {
        self.alleles[copy.ind as usize][copy.locus as usize][copy.slot as usize]
    }

    /// Total number of gene copies
    #[inline]
    pub fn n_gene_copies(&self) -> usize {
        self.gene_copies.len()
    }

    /// Canonical gene-copy table
    #[inline]
    pub fn gene_copies(&self) -> &[GeneCopy] {
        &self.gene_copies
    }

    /// Count of non-missing observations for individual `i`
    pub fn n_observed(&self, i: usize) -> usize {
        self.alleles[i]
            .iter()
            .flat_map(|locus| locus.iter())
            .filter(|&&a| a != 0)
            .count()
    }

    /// Sample identifier of individual `i`
    pub fn sample_id(&self, i: usize) -> &str {
        &self.sample_ids[i]
    }

    /// Population index of individual `i`
    #[inline]
    pub fn pop_of(&self, i: usize) -> usize {
        self.pop_index[i]
    }

    /// Unique population labels
    pub fn pop_names(&self) -> &[String] {
        &self.pop_names
    }

    /// Number of individuals per population
    pub fn pop_counts(&self) -> &[usize] {
        &self.pop_counts
    }
}
