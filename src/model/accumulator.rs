//! # Likelihood Accumulation
//!
//! Per-iteration likelihood evaluations and their running summaries: the
//! collapsed Dirichlet-multinomial marginal given the grouping, the joint
//! likelihood under drawn frequencies, the harmonic-mean evidence
//! accumulator, and the mean-Q finalizers.

use serde::Serialize;

use crate::data::GenotypeData;
use crate::model::counts::SuffStats;
use crate::model::labels::QMatrices;
use crate::model::sampler::FreqDraws;
use crate::utils::math::{ln_gamma, log_add_exp};

/// Log probability of the data given only the grouping, allele frequencies
/// integrated out.
///
/// ```text
/// sum_{k,l} [ lnG(J*lam) - lnG(J*lam + total[k][l])
///             + sum_j (lnG(lam + counts[k][l][j]) - lnG(lam)) ]
/// ```
pub fn log_like_group(data: &GenotypeData, stats: &SuffStats, lambda: f64) -> f64 {
    let mut ll = 0.0;
    for k in 0..stats.k() {
        for l in 0..data.n_loci() {
            let j_lambda = data.n_alleles(l) as f64 * lambda;
            for j in 0..data.n_alleles(l) {
                ll += ln_gamma(lambda + stats.allele_count(k, l, j) as f64) - ln_gamma(lambda);
            }
            ll += ln_gamma(j_lambda)
                - ln_gamma(j_lambda + stats.allele_count_total(k, l) as f64);
        }
    }
    ll
}

/// Log probability of the data given drawn allele frequencies and admixture
/// proportions; missing observations contribute nothing.
pub fn log_like_joint(data: &GenotypeData, freqs: &FreqDraws) -> f64 {
    let mut ll = 0.0;
    for copy in data.gene_copies() {
        let allele = data.allele(*copy);
        if allele == 0 {
            continue;
        }
        let i = copy.ind as usize;
        let l = copy.locus as usize;
        let j = allele as usize - 1;
        let mut p = 0.0;
        for (k, admix_row) in freqs.admix_freqs[i].iter().enumerate() {
            p += admix_row * freqs.allele_freqs[k][l][j];
        }
        ll += p.ln();
    }
    ll
}

/// Running likelihood summaries for one chain.
#[derive(Debug, Clone)]
pub struct Accumulator {
    n_recorded: usize,
    group_sum: f64,
    group_sum_sq: f64,
    joint_sum: f64,
    joint_sum_sq: f64,
    /// log-space sum of exp(-logLikeGroup); starts at ln(0)
    harmonic: f64,
}

/// Mean and standard error of a recorded likelihood stream.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct StreamStats {
    pub mean: f64,
    pub variance: f64,
    pub std_err: f64,
}

impl Accumulator {
    pub fn new() -> Self {
        Self {
            n_recorded: 0,
            group_sum: 0.0,
            group_sum_sq: 0.0,
            joint_sum: 0.0,
            joint_sum_sq: 0.0,
            harmonic: f64::NEG_INFINITY,
        }
    }

    /// Record one post-burn-in iteration.
    pub fn record_group(&mut self, ll: f64) {
        self.n_recorded += 1;
        self.group_sum += ll;
        self.group_sum_sq += ll * ll;
        self.harmonic = log_add_exp(self.harmonic, -ll);
    }

    pub fn record_joint(&mut self, ll: f64) {
        self.joint_sum += ll;
        self.joint_sum_sq += ll * ll;
    }

    pub fn n_recorded(&self) -> usize {
        self.n_recorded
    }

    /// Harmonic-mean log evidence: `ln S - ln sum_s exp(-ll_s)`.
    pub fn harmonic_evidence(&self) -> f64 {
        (self.n_recorded as f64).ln() - self.harmonic
    }

    pub fn group_stats(&self) -> StreamStats {
        stream_stats(self.group_sum, self.group_sum_sq, self.n_recorded)
    }

    pub fn joint_stats(&self) -> StreamStats {
        stream_stats(self.joint_sum, self.joint_sum_sq, self.n_recorded)
    }
}

impl Default for Accumulator {
    fn default() -> Self {
        Self::new()
    }
}

fn stream_stats(sum: f64, sum_sq: f64, n: usize) -> StreamStats {
    if n == 0 {
        return StreamStats {
            mean: f64::NAN,
            variance: f64::NAN,
            std_err: f64::NAN,
        };
    }
    let nf = n as f64;
    let mean = sum / nf;
    let variance = (sum_sq / nf - mean * mean).max(0.0);
    StreamStats {
        mean,
        variance,
        std_err: (variance / nf).sqrt(),
    }
}

/// Gene-level mean Q: `exp(log_q_accum - ln samples)` per row.
pub fn mean_q_gene(q: &QMatrices, samples: usize) -> Vec<Vec<f64>> {
    let ln_samples = (samples as f64).ln();
    (0..q.n_gene_copies())
        .map(|g| {
            q.log_q_accum_row(g)
                .iter()
                .map(|&lq| (lq - ln_samples).exp())
                .collect()
        })
        .collect()
}

/// Individual-level mean Q: average of the individual's gene-copy rows.
pub fn mean_q_ind(data: &GenotypeData, q_gene: &[Vec<f64>]) -> Vec<Vec<f64>> {
    let k = q_gene.first().map_or(0, |row| row.len());
    let mut q_ind = vec![vec![0.0; k]; data.n_individuals()];
    for (g, copy) in data.gene_copies().iter().enumerate() {
        let i = copy.ind as usize;
        for d in 0..k {
            q_ind[i][d] += q_gene[g][d];
        }
    }
    for (i, row) in q_ind.iter_mut().enumerate() {
        let n_copies = (data.ploidy(i) * data.n_loci()) as f64;
        for v in row.iter_mut() {
            *v /= n_copies;
        }
    }
    q_ind
}

/// Population-level mean Q: average of individual rows within each declared
/// population.
pub fn mean_q_pop(data: &GenotypeData, q_ind: &[Vec<f64>]) -> Vec<Vec<f64>> {
    let k = q_ind.first().map_or(0, |row| row.len());
    let mut q_pop = vec![vec![0.0; k]; data.pop_names().len()];
    for (i, row) in q_ind.iter().enumerate() {
        let p = data.pop_of(i);
        for d in 0..k {
            q_pop[p][d] += row[d];
        }
    }
    for (p, row) in q_pop.iter_mut().enumerate() {
        let count = data.pop_counts()[p] as f64;
        for v in row.iter_mut() {
            *v /= count;
        }
    }
    q_pop
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::math::log_sum_exp;
    use approx::assert_abs_diff_eq;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn structured_data() -> GenotypeData {
        GenotypeData::from_parts(
            vec![
                vec![vec![1, 1], vec![2, 0]],
                vec![vec![2, 1], vec![1, 1]],
            ],
            vec!["a".into(), "b".into()],
            vec!["x".into(), "y".into()],
        )
        .unwrap()
    }

    /// The collapsed likelihood equals the Dirichlet-multinomial expressed
    /// through multivariate beta functions.
    #[test]
    fn test_log_like_group_matches_beta_form() {
        let data = structured_data();
        let mut rng = StdRng::seed_from_u64(21);
        let mut stats = SuffStats::new(&data, 2);
        stats.randomize(&data, &mut rng);

        let lambda = 0.7;
        let direct = log_like_group(&data, &stats, lambda);

        // ln B(a) = sum_j lnG(a_j) - lnG(sum_j a_j)
        let ln_beta = |a: &[f64]| -> f64 {
            a.iter().map(|&x| ln_gamma(x)).sum::<f64>() - ln_gamma(a.iter().sum())
        };
        let mut expected = 0.0;
        for k in 0..2 {
            for l in 0..data.n_loci() {
                let with_counts: Vec<f64> = (0..data.n_alleles(l))
                    .map(|j| lambda + stats.allele_count(k, l, j) as f64)
                    .collect();
                let prior_only = vec![lambda; data.n_alleles(l)];
                expected += ln_beta(&with_counts) - ln_beta(&prior_only);
            }
        }
        assert_abs_diff_eq!(direct, expected, epsilon = 1e-10);
    }

    /// Relabeling demes never changes the collapsed likelihood.
    #[test]
    fn test_log_like_group_invariant_under_relabeling() {
        let data = structured_data();
        let mut rng = StdRng::seed_from_u64(22);
        let mut stats = SuffStats::new(&data, 3);
        stats.randomize(&data, &mut rng);

        let before = log_like_group(&data, &stats, 1.0);
        let perm = vec![1usize, 2, 0];
        let order = vec![2usize, 0, 1];
        stats.apply_permutation(&perm, &order);
        let after = log_like_group(&data, &stats, 1.0);
        assert_abs_diff_eq!(before, after, epsilon = 1e-12);
    }

    /// Harmonic-mean law: for fixed values v_s the estimate is
    /// `ln S - ln sum exp(-v_s)`.
    #[test]
    fn test_harmonic_mean_identity() {
        let values = [-10.0, -11.5, -9.2, -12.4];
        let mut acc = Accumulator::new();
        for &v in &values {
            acc.record_group(v);
        }
        let negated: Vec<f64> = values.iter().map(|v| -v).collect();
        let expected = (values.len() as f64).ln() - log_sum_exp(&negated);
        assert_abs_diff_eq!(acc.harmonic_evidence(), expected, epsilon = 1e-12);
    }

    #[test]
    fn test_stream_stats() {
        let mut acc = Accumulator::new();
        for v in [1.0, 2.0, 3.0, 4.0] {
            acc.record_group(v);
        }
        let stats = acc.group_stats();
        assert_abs_diff_eq!(stats.mean, 2.5, epsilon = 1e-12);
        assert_abs_diff_eq!(stats.variance, 1.25, epsilon = 1e-12);
    }

    #[test]
    fn test_mean_q_levels() {
        let data = structured_data();
        let mut q = QMatrices::new(data.n_gene_copies(), 2);
        // two recorded iterations with constant rows
        for _ in 0..2 {
            for g in 0..data.n_gene_copies() {
                q.set_row(g, &[0.25, 0.75], 1.0);
            }
            q.accumulate();
        }
        let q_gene = mean_q_gene(&q, 2);
        for row in &q_gene {
            assert_abs_diff_eq!(row[0], 0.25, epsilon = 1e-12);
            assert_abs_diff_eq!(row[1], 0.75, epsilon = 1e-12);
        }
        let q_ind = mean_q_ind(&data, &q_gene);
        assert_eq!(q_ind.len(), 2);
        assert_abs_diff_eq!(q_ind[0][1], 0.75, epsilon = 1e-12);
        // two one-individual populations
        let q_pop = mean_q_pop(&data, &q_ind);
        assert_eq!(q_pop.len(), 2);
        assert_abs_diff_eq!(q_pop[0][0], 0.25, epsilon = 1e-12);
    }

    #[test]
    fn test_joint_likelihood_skips_missing() {
        let data = structured_data();
        let mut freqs = FreqDraws::new(&data, 2);
        for k in 0..2 {
            for l in 0..data.n_loci() {
                let n = data.n_alleles(l) as f64;
                freqs.allele_freqs[k][l] = vec![1.0 / n; data.n_alleles(l)];
            }
        }
        for i in 0..2 {
            freqs.admix_freqs[i] = vec![0.5, 0.5];
        }
        // 7 non-missing copies, each contributing ln(1/2)
        let expected = 7.0 * 0.5_f64.ln();
        assert_abs_diff_eq!(log_like_joint(&data, &freqs), expected, epsilon = 1e-12);
    }
}
