//! # Gibbs Kernel
//!
//! The collapsed updates of the admixture model: per-gene-copy conditional
//! resampling, the Metropolis step on the admixture concentration, the
//! per-iteration Q-row generator, and the optional posterior frequency
//! draws. Allele frequencies are integrated out analytically; only
//! assignments and hyperparameters are sampled.

use rand::Rng;
use rand_distr::{Distribution, Gamma, StandardNormal};

use crate::data::GenotypeData;
use crate::error::{DemixError, Result};
use crate::model::counts::SuffStats;
use crate::utils::math::{ln_gamma, sample_weighted, LnTable};

/// Upper bound of the admixture concentration's support.
pub const ALPHA_MAX: f64 = 10.0;

/// Floor substituted when a proposal lands exactly on zero.
const ALPHA_FLOOR: f64 = 1e-300;

/// Resample the deme of every gene copy in canonical order.
///
/// Each copy is detached from the count tensors, a categorical weight is
/// computed per deme from the leave-one-out counts, and the copy is attached
/// at the drawn deme. For a non-missing allele `a` at locus `l` the weight is
///
/// ```text
/// w[k] = (admix_counts[i][k] + alpha) * p_allele^beta
/// p_allele = (allele_counts[k][l][a] + lambda) / (allele_counts_total[k][l] + J[l]*lambda)
/// ```
///
/// and for a missing observation the allele factor drops out. The admixture
/// denominator is constant across demes and omitted; weights are recomputed
/// for every copy, never reused.
pub fn update_groups<R: Rng>(
    data: &GenotypeData,
    stats: &mut SuffStats,
    alpha: f64,
    lambda: f64,
    beta: f64,
    ln_table: &LnTable,
    weights: &mut [f64],
    rng: &mut R,
) -> Result<()> {
    let k_demes = stats.k();
    for g in 0..data.n_gene_copies() {
        stats.detach(data, g);

        let copy = data.gene_copies()[g];
        let i = copy.ind as usize;
        let l = copy.locus as usize;
        let allele = data.allele(copy);

        let mut total = 0.0;
        for k in 0..k_demes {
            let mut w = stats.admix_count(i, k) as f64 + alpha;
            if allele != 0 {
                let j = allele as usize - 1;
                let count = stats.allele_count(k, l, j);
                let locus_total = stats.allele_count_total(k, l);
                let n_alleles = data.n_alleles(l);
                if beta == 1.0 {
                    w *= (count as f64 + lambda)
                        / (locus_total as f64 + n_alleles as f64 * lambda);
                } else {
                    let ln_p = ln_table.ln_shifted(count, 1)
                        - ln_table.ln_shifted(locus_total, n_alleles);
                    w *= (beta * ln_p).exp();
                }
            }
            weights[k] = w;
            total += w;
        }

        if !(total > 0.0) {
            return Err(DemixError::algorithm(format!(
                "categorical weights sum to {} at gene copy {}",
                total, g
            )));
        }

        let new_deme = sample_weighted(rng, &weights[..k_demes], total);
        stats.attach(data, g, new_deme);
    }
    Ok(())
}

/// Fold a Gaussian proposal back into `[0, ALPHA_MAX]`.
///
/// Two steps: modular reflection into `[-10, 20]`, then one fold of the
/// outer thirds back into range. An exact zero is replaced by a tiny
/// positive floor so downstream `ln_gamma(alpha)` stays finite.
pub fn reflect_alpha(mut x: f64) -> f64 {
    if x < 0.0 || x > ALPHA_MAX {
        while x < -ALPHA_MAX {
            x += 2.0 * ALPHA_MAX;
        }
        while x > 2.0 * ALPHA_MAX {
            x -= 2.0 * ALPHA_MAX;
        }
        if x < 0.0 {
            x = -x;
        }
        if x > ALPHA_MAX {
            x = 2.0 * ALPHA_MAX - x;
        }
    }
    if x == 0.0 {
        x = ALPHA_FLOOR;
    }
    x
}

/// Log marginal probability of the admixture assignments given `alpha`.
///
/// Dirichlet-multinomial over each individual's deme counts; the allele
/// factor does not involve `alpha` and is omitted.
fn log_prob_alpha(data: &GenotypeData, stats: &SuffStats, alpha: f64) -> f64 {
    let k = stats.k() as f64;
    let mut lp = 0.0;
    for i in 0..data.n_individuals() {
        lp += ln_gamma(k * alpha) - ln_gamma(stats.admix_count_total(i) as f64 + k * alpha);
        for d in 0..stats.k() {
            lp += ln_gamma(stats.admix_count(i, d) as f64 + alpha) - ln_gamma(alpha);
        }
    }
    lp
}

/// One Metropolis step on the admixture concentration.
///
/// Gaussian random walk with reflecting boundaries at 0 and `ALPHA_MAX`;
/// flat prior on the interval, so only the assignment marginal enters the
/// ratio. The inverse temperature never applies here. Returns the (possibly
/// unchanged) concentration.
pub fn update_alpha<R: Rng>(
    data: &GenotypeData,
    stats: &SuffStats,
    alpha: f64,
    prop_sd: f64,
    rng: &mut R,
) -> f64 {
    let step: f64 = rng.sample(StandardNormal);
    let proposal = reflect_alpha(alpha + prop_sd * step);

    let lp_old = log_prob_alpha(data, stats, alpha);
    let lp_new = log_prob_alpha(data, stats, proposal);

    if rng.random::<f64>() < (lp_new - lp_old).exp() {
        proposal
    } else {
        alpha
    }
}

/// Fill this iteration's Q rows from the current state.
///
/// Same conditional as [`update_groups`] but at unit temperature and with
/// the gene copy left attached; each row is normalized into `q_new` with its
/// log stored alongside.
pub fn produce_q_matrix(
    data: &GenotypeData,
    stats: &SuffStats,
    alpha: f64,
    lambda: f64,
    q: &mut crate::model::labels::QMatrices,
    weights: &mut [f64],
) -> Result<()> {
    let k_demes = stats.k();
    for g in 0..data.n_gene_copies() {
        let copy = data.gene_copies()[g];
        let i = copy.ind as usize;
        let l = copy.locus as usize;
        let allele = data.allele(copy);

        let mut total = 0.0;
        for k in 0..k_demes {
            let mut w = stats.admix_count(i, k) as f64 + alpha;
            if allele != 0 {
                let j = allele as usize - 1;
                w *= (stats.allele_count(k, l, j) as f64 + lambda)
                    / (stats.allele_count_total(k, l) as f64
                        + data.n_alleles(l) as f64 * lambda);
            }
            weights[k] = w;
            total += w;
        }

        if !(total > 0.0) {
            return Err(DemixError::algorithm(format!(
                "Q-row weights sum to {} at gene copy {}",
                total, g
            )));
        }
        q.set_row(g, &weights[..k_demes], total);
    }
    Ok(())
}

/// Posterior draws of allele frequencies and admixture proportions.
#[derive(Debug, Clone)]
pub struct FreqDraws {
    /// `allele_freqs[k][l][j]`, each `[k][l]` row a probability vector
    pub allele_freqs: Vec<Vec<Vec<f64>>>,
    /// `admix_freqs[i][k]`, each row a probability vector
    pub admix_freqs: Vec<Vec<f64>>,
}

impl FreqDraws {
    pub fn new(data: &GenotypeData, k: usize) -> Self {
        Self {
            allele_freqs: (0..k)
                .map(|_| {
                    (0..data.n_loci())
                        .map(|l| vec![0.0; data.n_alleles(l)])
                        .collect()
                })
                .collect(),
            admix_freqs: vec![vec![0.0; k]; data.n_individuals()],
        }
    }
}

/// Draw frequencies from their conditional Dirichlet posteriors.
///
/// Gamma-then-normalize with shapes `allele_counts + lambda` and
/// `admix_counts + alpha` respectively.
pub fn draw_freqs<R: Rng>(
    data: &GenotypeData,
    stats: &SuffStats,
    alpha: f64,
    lambda: f64,
    freqs: &mut FreqDraws,
    rng: &mut R,
) -> Result<()> {
    for k in 0..stats.k() {
        for l in 0..data.n_loci() {
            let mut sum = 0.0;
            for j in 0..data.n_alleles(l) {
                let shape = stats.allele_count(k, l, j) as f64 + lambda;
                let draw = gamma_unit_rate(shape, rng)?;
                freqs.allele_freqs[k][l][j] = draw;
                sum += draw;
            }
            for j in 0..data.n_alleles(l) {
                freqs.allele_freqs[k][l][j] /= sum;
            }
        }
    }

    for i in 0..data.n_individuals() {
        let mut sum = 0.0;
        for k in 0..stats.k() {
            let shape = stats.admix_count(i, k) as f64 + alpha;
            let draw = gamma_unit_rate(shape, rng)?;
            freqs.admix_freqs[i][k] = draw;
            sum += draw;
        }
        for k in 0..stats.k() {
            freqs.admix_freqs[i][k] /= sum;
        }
    }
    Ok(())
}

fn gamma_unit_rate<R: Rng>(shape: f64, rng: &mut R) -> Result<f64> {
    let gamma = Gamma::new(shape, 1.0)
        .map_err(|e| DemixError::algorithm(format!("gamma draw with shape {}: {}", shape, e)))?;
    Ok(gamma.sample(rng))
}
