//! # Inference Pipeline
//!
//! Orchestrates a full run:
//! 1. Load the genotype table
//! 2. For each K in the configured range, run `main_repeats` independent
//!    chains at unit temperature (parallel, shared-nothing)
//! 3. Optionally run a ladder of tempered chains and combine their mean
//!    log-likelihoods into a thermodynamic-integration evidence estimate
//! 4. Relabel every repeat's Q matrices onto a common frame and average them
//! 5. Write the Q matrices (with between-repeat error matrices when asked),
//!    the evidence table, its normalised form, Evanno's delta K, and the
//!    run summary

use rayon::prelude::*;
use tracing::{debug, info, warn};

use std::fs::File;
use std::io::BufWriter;

use crate::config::Config;
use crate::data::GenotypeData;
use crate::error::{DemixError, Result};
use crate::io::output::{
    self, EvannoRow, EvidenceRow, NormalisedEvidenceRow, RunSummary, SharedSinks, StreamSinks,
};
use crate::io::table::load_genotype_table;
use crate::model::chain::{Chain, ChainParams, ChainSummary};
use crate::model::hungarian;
use crate::utils::math::log_sum_exp;

/// Full inference run over the configured K range.
pub struct RunPipeline {
    config: Config,
}

impl RunPipeline {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// Execute the run and write all outputs.
    pub fn run(&self) -> Result<RunSummary> {
        let cfg = &self.config;
        let data = load_genotype_table(&cfg.gt)?;
        info!(
            individuals = data.n_individuals(),
            loci = data.n_loci(),
            gene_copies = data.n_gene_copies(),
            populations = data.pop_names().len(),
            "loaded genotype table"
        );

        let sinks = SharedSinks::new(StreamSinks::create(
            &cfg.out,
            cfg.likelihood,
            cfg.grouping,
            data.n_gene_copies(),
        )?);

        let mut evidence = Vec::new();
        for k in cfg.k_min..=cfg.k_max {
            evidence.push(self.run_one_k(k, &data, &sinks)?);
        }

        let mut w = BufWriter::new(File::create(output::suffixed(&cfg.out, "evidence.csv"))?);
        output::write_evidence(&mut w, &evidence)?;

        let evidence_normalised = normalised_evidence(&evidence);
        let mut w = BufWriter::new(File::create(output::suffixed(
            &cfg.out,
            "evidence_normalised.csv",
        ))?);
        output::write_evidence_normalised(&mut w, &evidence_normalised)?;

        let evanno = evanno_table(&evidence, cfg.main_repeats);
        let mut w = BufWriter::new(File::create(output::suffixed(&cfg.out, "evanno.csv"))?);
        output::write_evanno(&mut w, &evanno)?;

        let summary = RunSummary {
            n_individuals: data.n_individuals(),
            n_loci: data.n_loci(),
            n_gene_copies: data.n_gene_copies(),
            evidence,
            evidence_normalised,
            evanno,
        };
        output::write_run_summary(&cfg.out, &summary)?;
        Ok(summary)
    }

    /// Run all chains for one value of K and write its Q matrices.
    fn run_one_k(&self, k: usize, data: &GenotypeData, sinks: &SharedSinks) -> Result<EvidenceRow> {
        let cfg = &self.config;
        info!(k, repeats = cfg.main_repeats, "running chains");

        let params: Vec<ChainParams> = (0..cfg.main_repeats)
            .map(|rep| ChainParams {
                k,
                beta: 1.0,
                lambda: cfg.lambda,
                alpha: cfg.alpha,
                alpha_prop_sd: cfg.alpha_prop_sd,
                fix_alpha: cfg.fix_alpha,
                fix_labels: true,
                draw_freqs: cfg.draw_freqs,
                burnin: cfg.burnin,
                samples: cfg.samples,
                thinning: cfg.thinning,
                main_rep: rep,
                seed: chain_seed(cfg.seed, k, rep, 0),
            })
            .collect();

        let results: Vec<Result<ChainSummary>> = params
            .into_par_iter()
            .map(|p| {
                let mut sink = sinks.clone();
                let summary = Chain::new(p, data).run(&mut sink)?;
                debug!(
                    k = summary.k,
                    rep = summary.main_rep,
                    harmonic = summary.harmonic_evidence,
                    "chain finished"
                );
                Ok(summary)
            })
            .collect();

        let mut repeats = Vec::new();
        for result in results {
            match result {
                Ok(summary) => repeats.push(summary),
                Err(e) => warn!(k, error = %e, "chain aborted"),
            }
        }
        if repeats.is_empty() {
            return Err(DemixError::algorithm(format!(
                "all chains failed for K = {}",
                k
            )));
        }
        repeats.sort_by_key(|s| s.main_rep);

        let harmonics: Vec<f64> = repeats.iter().map(|s| s.harmonic_evidence).collect();
        let (harmonic_mean, harmonic_se) = mean_and_se(&harmonics);

        let (ti_estimate, ti_se) = if cfg.thermodynamic {
            let (est, se) = self.thermodynamic_integral(k, data)?;
            (Some(est), Some(se))
        } else {
            (None, None)
        };

        if let Some(combined) = combine_repeat_q(&mut repeats, k)? {
            self.write_q_matrices(k, data, &combined)?;
        }

        info!(
            k,
            harmonic = harmonic_mean,
            ti = ti_estimate.unwrap_or(f64::NAN),
            "evidence estimates"
        );
        Ok(EvidenceRow {
            k,
            harmonic_mean,
            harmonic_std_err: harmonic_se,
            ti_estimate,
            ti_std_err: ti_se,
            alpha_last: repeats[0].alpha,
        })
    }

    /// Evidence by thermodynamic integration.
    ///
    /// One tempered chain per rung at `beta_r = ((r+1)/rungs)^power`; the
    /// mean collapsed log-likelihood is integrated over beta by the
    /// trapezoid rule, with the segment below the first rung treated as a
    /// rectangle. The rung SEs propagate through the quadrature weights.
    fn thermodynamic_integral(&self, k: usize, data: &GenotypeData) -> Result<(f64, f64)> {
        let cfg = &self.config;
        let rungs = cfg.ti_rungs;
        info!(k, rungs, "thermodynamic ladder");

        let params: Vec<ChainParams> = (0..rungs)
            .map(|r| ChainParams {
                k,
                beta: (((r + 1) as f64) / rungs as f64).powf(cfg.ti_power),
                lambda: cfg.lambda,
                alpha: cfg.alpha,
                alpha_prop_sd: cfg.alpha_prop_sd,
                fix_alpha: cfg.fix_alpha,
                // tempered chains feed only the integrand; label bookkeeping
                // and frequency draws would be dead weight here
                fix_labels: false,
                draw_freqs: false,
                burnin: cfg.burnin,
                samples: cfg.samples,
                thinning: cfg.thinning,
                main_rep: r,
                seed: chain_seed(cfg.seed, k, r, 1),
            })
            .collect();

        let results: Vec<Result<ChainSummary>> = params
            .into_par_iter()
            .map(|p| {
                let mut sink = crate::io::output::NullSink;
                Chain::new(p, data).run(&mut sink)
            })
            .collect();

        let mut rung_summaries = Vec::with_capacity(rungs);
        for result in results {
            rung_summaries.push(result?);
        }
        rung_summaries.sort_by(|a, b| a.beta.total_cmp(&b.beta));

        let betas: Vec<f64> = rung_summaries.iter().map(|s| s.beta).collect();
        let means: Vec<f64> = rung_summaries.iter().map(|s| s.group_stats.mean).collect();
        let errs: Vec<f64> = rung_summaries
            .iter()
            .map(|s| s.group_stats.std_err)
            .collect();

        // quadrature weights: rectangle below the first rung, trapezoids above
        let n = betas.len();
        let mut weights = vec![0.0; n];
        weights[0] = betas[0];
        for r in 1..n {
            let half = (betas[r] - betas[r - 1]) / 2.0;
            weights[r - 1] += half;
            weights[r] += half;
        }

        let estimate = weights.iter().zip(&means).map(|(w, m)| w * m).sum();
        let variance: f64 = weights
            .iter()
            .zip(&errs)
            .map(|(w, e)| (w * e) * (w * e))
            .sum();
        Ok((estimate, variance.sqrt()))
    }

    fn write_q_matrices(&self, k: usize, data: &GenotypeData, combined: &CombinedQ) -> Result<()> {
        let cfg = &self.config;
        // between-repeat spread is only meaningful with two or more repeats
        let errors_on = cfg.q_error && combined.n_repeats >= 2;
        if cfg.q_gene {
            let path = output::suffixed(&cfg.out, &format!("qmatrix_gene.K{}.csv", k));
            output::write_q_gene(BufWriter::new(File::create(path)?), data, k, &combined.gene.mean)?;
            if errors_on {
                let path = output::suffixed(&cfg.out, &format!("qmatrix_error_gene.K{}.csv", k));
                output::write_q_gene(
                    BufWriter::new(File::create(path)?),
                    data,
                    k,
                    &combined.gene.std_err,
                )?;
            }
        }
        if cfg.q_ind {
            let path = output::suffixed(&cfg.out, &format!("qmatrix_ind.K{}.csv", k));
            output::write_q_ind(BufWriter::new(File::create(path)?), data, k, &combined.ind.mean)?;
            if errors_on {
                let path = output::suffixed(&cfg.out, &format!("qmatrix_error_ind.K{}.csv", k));
                output::write_q_ind(
                    BufWriter::new(File::create(path)?),
                    data,
                    k,
                    &combined.ind.std_err,
                )?;
            }
        }
        if cfg.q_pop {
            let path = output::suffixed(&cfg.out, &format!("qmatrix_pop.K{}.csv", k));
            output::write_q_pop(BufWriter::new(File::create(path)?), data, k, &combined.pop.mean)?;
            if errors_on {
                let path = output::suffixed(&cfg.out, &format!("qmatrix_error_pop.K{}.csv", k));
                output::write_q_pop(
                    BufWriter::new(File::create(path)?),
                    data,
                    k,
                    &combined.pop.std_err,
                )?;
            }
        }
        Ok(())
    }
}

/// Per-entry mean and standard error of a Q matrix across repeats.
struct QStats {
    mean: Vec<Vec<f64>>,
    std_err: Vec<Vec<f64>>,
}

/// Q matrices combined across a K's repeats.
struct CombinedQ {
    n_repeats: usize,
    gene: QStats,
    ind: QStats,
    pop: QStats,
}

/// Combine per-repeat Q matrices into grand means with between-repeat
/// standard errors.
///
/// Each repeat carries its own label convention, so before averaging, every
/// repeat after the first is relabeled onto the first repeat's frame: the
/// same Stephens-style cost (here against the reference repeat's gene-level
/// mean Q) scores every label pairing and the assignment solver picks the
/// permutation. Returns `None` when no repeat produced Q matrices.
fn combine_repeat_q(repeats: &mut [ChainSummary], k: usize) -> Result<Option<CombinedQ>> {
    let reference = match repeats.first().and_then(|s| s.q_gene.clone()) {
        Some(q) => q,
        None => return Ok(None),
    };

    let mut cost = vec![vec![0.0; k]; k];
    for summary in repeats.iter_mut().skip(1) {
        let perm = {
            let q = match summary.q_gene.as_ref() {
                Some(q) => q,
                None => continue,
            };
            for k1 in 0..k {
                for k2 in 0..k {
                    let mut c = 0.0;
                    for g in 0..q.len() {
                        // floor before the log: a row entry can underflow to
                        // zero, and 0 * ln 0 contributes nothing
                        let ln_q = q[g][k1].max(f64::MIN_POSITIVE).ln();
                        let ln_ref = reference[g][k2].max(f64::MIN_POSITIVE).ln();
                        c += q[g][k1] * (ln_q - ln_ref);
                    }
                    cost[k1][k2] = c;
                }
            }
            hungarian::solve(&cost)?
        };
        for matrix in [
            summary.q_gene.as_mut(),
            summary.q_ind.as_mut(),
            summary.q_pop.as_mut(),
        ]
        .into_iter()
        .flatten()
        {
            permute_columns(matrix, &perm);
        }
    }

    let gene: Vec<&Vec<Vec<f64>>> = repeats.iter().filter_map(|s| s.q_gene.as_ref()).collect();
    let ind: Vec<&Vec<Vec<f64>>> = repeats.iter().filter_map(|s| s.q_ind.as_ref()).collect();
    let pop: Vec<&Vec<Vec<f64>>> = repeats.iter().filter_map(|s| s.q_pop.as_ref()).collect();
    Ok(Some(CombinedQ {
        n_repeats: gene.len(),
        gene: matrix_stats(&gene),
        ind: matrix_stats(&ind),
        pop: matrix_stats(&pop),
    }))
}

/// Relabel a Q matrix in place: column `k1` moves to `perm[k1]`.
fn permute_columns(matrix: &mut [Vec<f64>], perm: &[usize]) {
    for row in matrix.iter_mut() {
        let old = row.clone();
        for (k1, &k2) in perm.iter().enumerate() {
            row[k2] = old[k1];
        }
    }
}

/// Per-entry mean and standard error over a non-empty set of equally-shaped
/// matrices.
fn matrix_stats(matrices: &[&Vec<Vec<f64>>]) -> QStats {
    let n = matrices.len() as f64;
    let rows = matrices.first().map_or(0, |m| m.len());
    let cols = matrices
        .first()
        .and_then(|m| m.first())
        .map_or(0, |r| r.len());

    let mut mean = vec![vec![0.0; cols]; rows];
    for m in matrices {
        for (g, row) in m.iter().enumerate() {
            for (d, &v) in row.iter().enumerate() {
                mean[g][d] += v;
            }
        }
    }
    for row in mean.iter_mut() {
        for v in row.iter_mut() {
            *v /= n;
        }
    }

    let mut std_err = vec![vec![0.0; cols]; rows];
    if matrices.len() > 1 {
        for m in matrices {
            for (g, row) in m.iter().enumerate() {
                for (d, &v) in row.iter().enumerate() {
                    let dev = v - mean[g][d];
                    std_err[g][d] += dev * dev;
                }
            }
        }
        for row in std_err.iter_mut() {
            for v in row.iter_mut() {
                *v = (*v / (n - 1.0) / n).sqrt();
            }
        }
    }

    QStats { mean, std_err }
}

/// Evanno's delta K from the per-K mean log evidence.
///
/// First and second differences over the K range; delta K divides the
/// absolute second difference by the between-repeat standard deviation
/// (recovered from the standard error), so it is undefined with a single
/// repeat or at the ends of the range.
fn evanno_table(evidence: &[EvidenceRow], main_repeats: usize) -> Vec<EvannoRow> {
    let n = evidence.len();
    (0..n)
        .map(|i| {
            let l_prime =
                (i >= 1).then(|| evidence[i].harmonic_mean - evidence[i - 1].harmonic_mean);
            let l_double_prime_abs = (i >= 1 && i + 1 < n).then(|| {
                (evidence[i + 1].harmonic_mean - 2.0 * evidence[i].harmonic_mean
                    + evidence[i - 1].harmonic_mean)
                    .abs()
            });
            let sd = evidence[i].harmonic_std_err * (main_repeats as f64).sqrt();
            let delta_k = match l_double_prime_abs {
                Some(num) if sd > 0.0 => Some(num / sd),
                _ => None,
            };
            EvannoRow {
                k: evidence[i].k,
                mean_evidence: evidence[i].harmonic_mean,
                l_prime,
                l_double_prime_abs,
                delta_k,
            }
        })
        .collect()
}

/// Posterior probability of each K, normalizing the log evidence over the
/// fitted range (flat prior on K).
fn normalised_evidence(evidence: &[EvidenceRow]) -> Vec<NormalisedEvidenceRow> {
    let harmonic_total = log_sum_exp(
        &evidence
            .iter()
            .map(|row| row.harmonic_mean)
            .collect::<Vec<f64>>(),
    );
    let ti_values: Option<Vec<f64>> = evidence.iter().map(|row| row.ti_estimate).collect();
    let ti_total = ti_values.as_deref().map(log_sum_exp);

    evidence
        .iter()
        .map(|row| NormalisedEvidenceRow {
            k: row.k,
            harmonic: (row.harmonic_mean - harmonic_total).exp(),
            ti: row
                .ti_estimate
                .zip(ti_total)
                .map(|(ti, total)| (ti - total).exp()),
        })
        .collect()
}

/// Derive a chain seed from the base seed and the chain's coordinates.
///
/// `family` separates the unit-temperature repeats from the tempered ladder
/// so the two never share a stream.
fn chain_seed(base: u64, k: usize, rep: usize, family: u64) -> u64 {
    let ordinal = ((family & 0xFF) << 56) | ((k as u64 & 0xFFFFFF) << 32) | rep as u64;
    base.wrapping_add(ordinal.wrapping_mul(0x9E37_79B9_7F4A_7C15))
}

/// Mean and standard error across independent repeats.
fn mean_and_se(values: &[f64]) -> (f64, f64) {
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    if values.len() < 2 {
        return (mean, 0.0);
    }
    let var = values.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / (n - 1.0);
    (mean, (var / n).sqrt())
}
