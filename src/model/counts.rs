//! # Sufficient Statistics
//!
//! The co-maintained count tensors of the admixture model: deme assignment
//! per gene copy, allele counts per (deme, locus, allele), and admixture
//! counts per (individual, deme). All mutation goes through `detach`/`attach`
//! so the decrement-then-increment discipline around each resample lives in
//! one place.
//!
//! Missing observations never touch any count tensor; their gene copies
//! still carry a deme label and are resampled like any other copy.

use rand::Rng;

use crate::data::GenotypeData;

/// Mutable sufficient statistics for one chain.
#[derive(Debug, Clone)]
pub struct SuffStats {
    k: usize,
    /// Current deme of each gene copy (0-based), canonical linear order
    group: Vec<usize>,
    /// `allele_counts[k][l][j]`: copies in deme `k` carrying allele `j` at locus `l`
    allele_counts: Vec<Vec<Vec<u32>>>,
    /// `allele_counts_total[k][l] = sum_j allele_counts[k][l][j]`
    allele_counts_total: Vec<Vec<u32>>,
    /// `admix_counts[i][k]`: non-missing copies of individual `i` in deme `k`
    admix_counts: Vec<Vec<u32>>,
    /// `admix_counts_total[i] = sum_k admix_counts[i][k]`
    admix_counts_total: Vec<u32>,
}

impl SuffStats {
    /// Allocate zeroed statistics sized for `data` and `k` demes.
    pub fn new(data: &GenotypeData, k: usize) -> Self {
        let n_ind = data.n_individuals();
        let n_loci = data.n_loci();
        let allele_counts = (0..k)
            .map(|_| (0..n_loci).map(|l| vec![0u32; data.n_alleles(l)]).collect())
            .collect();
        Self {
            k,
            group: vec![0; data.n_gene_copies()],
            allele_counts,
            allele_counts_total: vec![vec![0; n_loci]; k],
            admix_counts: vec![vec![0; k]; n_ind],
            admix_counts_total: vec![0; n_ind],
        }
    }

    /// Number of demes
    #[inline]
    pub fn k(&self) -> usize {
        self.k
    }

    /// Current deme of gene copy `g`
    #[inline]
    pub fn group(&self, g: usize) -> usize {
        self.group[g]
    }

    /// Full grouping vector in canonical order
    pub fn groups(&self) -> &[usize] {
        &self.group
    }

    #[inline]
    pub fn allele_count(&self, k: usize, l: usize, j: usize) -> u32 {
        self.allele_counts[k][l][j]
    }

    #[inline]
    pub fn allele_count_total(&self, k: usize, l: usize) -> u32 {
        self.allele_counts_total[k][l]
    }

    #[inline]
    pub fn admix_count(&self, i: usize, k: usize) -> u32 {
        self.admix_counts[i][k]
    }

    #[inline]
    pub fn admix_count_total(&self, i: usize) -> u32 {
        self.admix_counts_total[i]
    }

    /// Assign every gene copy a uniform random deme and rebuild all counts.
    pub fn randomize<R: Rng>(&mut self, data: &GenotypeData, rng: &mut R) {
        for g in self.group.iter_mut() {
            *g = rng.random_range(0..self.k);
        }
        self.rebuild(data);
    }

    /// Rebuild the count tensors from the current grouping in one pass.
    pub fn rebuild(&mut self, data: &GenotypeData) {
        for k in 0..self.k {
            for l in 0..data.n_loci() {
                self.allele_counts[k][l].fill(0);
            }
            self.allele_counts_total[k].fill(0);
        }
        for counts in self.admix_counts.iter_mut() {
            counts.fill(0);
        }
        self.admix_counts_total.fill(0);

        for (g, &copy) in data.gene_copies().iter().enumerate() {
            let allele = data.allele(copy);
            if allele == 0 {
                continue;
            }
            let k = self.group[g];
            let (i, l) = (copy.ind as usize, copy.locus as usize);
            self.allele_counts[k][l][allele as usize - 1] += 1;
            self.allele_counts_total[k][l] += 1;
            self.admix_counts[i][k] += 1;
            self.admix_counts_total[i] += 1;
        }
    }

    /// Remove gene copy `g` from the count tensors (no-op when missing).
    #[inline]
    pub fn detach(&mut self, data: &GenotypeData, g: usize) {
        let copy = data.gene_copies()[g];
        let allele = data.allele(copy);
        if allele == 0 {
            return;
        }
        let k = self.group[g];
        let (i, l) = (copy.ind as usize, copy.locus as usize);
        self.allele_counts[k][l][allele as usize - 1] -= 1;
        self.allele_counts_total[k][l] -= 1;
        self.admix_counts[i][k] -= 1;
        self.admix_counts_total[i] -= 1;
    }

    /// Assign gene copy `g` to deme `k` and add it to the count tensors
    /// (label always recorded; counts skipped when missing).
    #[inline]
    pub fn attach(&mut self, data: &GenotypeData, g: usize, k: usize) {
        self.group[g] = k;
        let copy = data.gene_copies()[g];
        let allele = data.allele(copy);
        if allele == 0 {
            return;
        }
        let (i, l) = (copy.ind as usize, copy.locus as usize);
        self.allele_counts[k][l][allele as usize - 1] += 1;
        self.allele_counts_total[k][l] += 1;
        self.admix_counts[i][k] += 1;
        self.admix_counts_total[i] += 1;
    }

    /// Relabel every deme: copy `g` moves from deme `d` to `perm[d]`.
    ///
    /// `order` is the inverse of `perm` (`order[perm[d]] = d`), so the new
    /// row `d` of each count tensor is the old row `order[d]`.
    pub fn apply_permutation(&mut self, perm: &[usize], order: &[usize]) {
        for g in self.group.iter_mut() {
            *g = perm[*g];
        }

        let old_allele = self.allele_counts.clone();
        let old_totals = self.allele_counts_total.clone();
        for k in 0..self.k {
            self.allele_counts[k] = old_allele[order[k]].clone();
            self.allele_counts_total[k] = old_totals[order[k]].clone();
        }

        for counts in self.admix_counts.iter_mut() {
            let old = counts.clone();
            for k in 0..self.k {
                counts[k] = old[order[k]];
            }
        }
    }

    /// Verify the internal consistency of all tensors against `data`.
    ///
    /// Returns an error description on the first violated invariant. Used by
    /// tests and debug assertions, not by the sampling hot path.
    pub fn check_invariants(&self, data: &GenotypeData) -> std::result::Result<(), String> {
        for k in 0..self.k {
            for l in 0..data.n_loci() {
                let sum: u32 = self.allele_counts[k][l].iter().sum();
                if sum != self.allele_counts_total[k][l] {
                    return Err(format!(
                        "allele count total mismatch at deme {}, locus {}",
                        k, l
                    ));
                }
            }
        }
        for i in 0..data.n_individuals() {
            let sum: u32 = self.admix_counts[i].iter().sum();
            if sum != self.admix_counts_total[i] {
                return Err(format!("admix count total mismatch for individual {}", i));
            }
            if sum as usize != data.n_observed(i) {
                return Err(format!(
                    "admix total {} != observed copies {} for individual {}",
                    sum,
                    data.n_observed(i),
                    i
                ));
            }
        }
        // per-datum conservation: each (locus, allele) mass is label-invariant
        for l in 0..data.n_loci() {
            for j in 0..data.n_alleles(l) {
                let across: u32 = (0..self.k).map(|k| self.allele_counts[k][l][j]).sum();
                let observed = data
                    .gene_copies()
                    .iter()
                    .filter(|c| c.locus as usize == l && data.allele(**c) as usize == j + 1)
                    .count() as u32;
                if across != observed {
                    return Err(format!(
                        "allele mass not conserved at locus {}, allele {}",
                        l, j
                    ));
                }
            }
        }
        Ok(())
    }
}
