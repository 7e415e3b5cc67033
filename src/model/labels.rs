//! # Label Alignment
//!
//! The posterior is invariant under permutations of deme labels, so raw
//! per-iteration Q rows cannot be averaged directly. Following Stephens
//! (2000), each iteration's Q matrix is aligned to a running log-space
//! reference: a KxK cost matrix scores every (current label, reference
//! label) pairing, the assignment solver picks the cheapest permutation, and
//! the permutation is pushed through every label-indexed tensor before the
//! reference absorbs the aligned rows.

use crate::error::Result;
use crate::model::counts::SuffStats;
use crate::model::hungarian;
use crate::utils::math::log_add_exp;

/// Per-gene-copy Q rows and their log-space accumulators.
#[derive(Debug, Clone)]
pub struct QMatrices {
    k: usize,
    /// Running log-space sum of aligned rows; the alignment reference
    log_q_running: Vec<Vec<f64>>,
    /// Current iteration's row, log scale
    log_q_new: Vec<Vec<f64>>,
    /// Current iteration's row, linear scale (sums to 1 per gene copy)
    q_new: Vec<Vec<f64>>,
    /// Post-burn-in log-space sum used for the final mean Q
    log_q_accum: Vec<Vec<f64>>,
}

impl QMatrices {
    pub fn new(n_gene_copies: usize, k: usize) -> Self {
        let mut q = Self {
            k,
            log_q_running: vec![vec![0.0; k]; n_gene_copies],
            log_q_new: vec![vec![0.0; k]; n_gene_copies],
            q_new: vec![vec![0.0; k]; n_gene_copies],
            log_q_accum: vec![vec![0.0; k]; n_gene_copies],
        };
        q.reset(true);
        q
    }

    /// Clear per-iteration rows and accumulators. When `reset_running` the
    /// alignment reference is re-seeded with the uniform row `-ln K`.
    pub fn reset(&mut self, reset_running: bool) {
        let uniform = -(self.k as f64).ln();
        for g in 0..self.log_q_new.len() {
            self.log_q_new[g].fill(0.0);
            self.q_new[g].fill(0.0);
            self.log_q_accum[g].fill(f64::NEG_INFINITY);
            if reset_running {
                self.log_q_running[g].fill(uniform);
            }
        }
    }

    #[inline]
    pub fn k(&self) -> usize {
        self.k
    }

    pub fn n_gene_copies(&self) -> usize {
        self.q_new.len()
    }

    /// Store one normalized row for gene copy `g`.
    #[inline]
    pub fn set_row(&mut self, g: usize, weights: &[f64], total: f64) {
        for (k, &w) in weights.iter().enumerate() {
            let q = w / total;
            self.q_new[g][k] = q;
            self.log_q_new[g][k] = q.ln();
        }
    }

    pub fn q_new_row(&self, g: usize) -> &[f64] {
        &self.q_new[g]
    }

    pub fn log_q_accum_row(&self, g: usize) -> &[f64] {
        &self.log_q_accum[g]
    }

    /// Align this iteration's labels to the running reference.
    ///
    /// Builds the Stephens cost matrix
    /// `C[k1][k2] = sum_g q_new[g][k1] * (log_q_new[g][k1] - log_q_running[g][k2])`,
    /// solves for the cheapest permutation, and when it is not the identity
    /// applies it to the grouping, the count tensors, and `log_q_new`.
    /// `q_new` is left alone (regenerated next iteration), and the running
    /// reference is never permuted: the permutation is chosen to make the new
    /// rows consistent with it.
    ///
    /// `cost` is caller-owned KxK scratch space.
    pub fn align_labels(
        &mut self,
        stats: &mut SuffStats,
        cost: &mut [Vec<f64>],
    ) -> Result<Vec<usize>> {
        for k1 in 0..self.k {
            for k2 in 0..self.k {
                let mut c = 0.0;
                for g in 0..self.q_new.len() {
                    c += self.q_new[g][k1] * (self.log_q_new[g][k1] - self.log_q_running[g][k2]);
                }
                cost[k1][k2] = c;
            }
        }

        let perm = hungarian::solve(cost)?;
        if perm.iter().enumerate().all(|(d, &p)| d == p) {
            return Ok(perm);
        }

        // order = inverse of perm: new row d comes from old row order[d]
        let mut order = vec![0usize; self.k];
        for (d, &p) in perm.iter().enumerate() {
            order[p] = d;
        }

        stats.apply_permutation(&perm, &order);
        for row in self.log_q_new.iter_mut() {
            let old = row.clone();
            for k in 0..self.k {
                row[k] = old[order[k]];
            }
        }
        Ok(perm)
    }

    /// Absorb the (aligned) new rows into the running reference.
    pub fn update_running(&mut self) {
        for g in 0..self.log_q_running.len() {
            for k in 0..self.k {
                self.log_q_running[g][k] =
                    log_add_exp(self.log_q_running[g][k], self.log_q_new[g][k]);
            }
        }
    }

    /// Absorb the (aligned) new rows into the post-burn-in accumulator.
    pub fn accumulate(&mut self) {
        for g in 0..self.log_q_accum.len() {
            for k in 0..self.k {
                self.log_q_accum[g][k] =
                    log_add_exp(self.log_q_accum[g][k], self.log_q_new[g][k]);
            }
        }
    }

    #[cfg(test)]
    pub fn set_running_row(&mut self, g: usize, row: &[f64]) {
        self.log_q_running[g].copy_from_slice(row);
    }
}
