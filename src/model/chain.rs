//! # MCMC Chain
//!
//! One chain of the admixture sampler at a fixed (K, beta, replicate). The
//! chain owns every piece of mutable state it touches: sufficient
//! statistics, Q matrices, likelihood accumulators, scratch buffers, and its
//! RNG. Configuration arrives as an immutable parameter bundle and output
//! streams are injected as sink capabilities, so nothing is shared between
//! sibling chains.

use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::data::GenotypeData;
use crate::error::Result;
use crate::io::output::IterationSink;
use crate::model::accumulator::{self, Accumulator, StreamStats};
use crate::model::counts::SuffStats;
use crate::model::labels::QMatrices;
use crate::model::sampler::{self, FreqDraws};
use crate::utils::math::LnTable;

/// Immutable per-chain configuration.
#[derive(Debug, Clone)]
pub struct ChainParams {
    /// Number of demes
    pub k: usize,
    /// Inverse temperature on the allele-frequency factor
    pub beta: f64,
    /// Allele-frequency Dirichlet pseudocount
    pub lambda: f64,
    /// Initial admixture concentration
    pub alpha: f64,
    /// Proposal SD of the alpha Metropolis step
    pub alpha_prop_sd: f64,
    /// Keep alpha fixed at its initial value
    pub fix_alpha: bool,
    /// Run the label-alignment machinery and accumulate Q matrices
    pub fix_labels: bool,
    /// Draw allele/admixture frequencies and record the joint likelihood
    pub draw_freqs: bool,
    pub burnin: usize,
    pub samples: usize,
    pub thinning: usize,
    /// Replicate ordinal, 0-based (reported 1-based in output rows)
    pub main_rep: usize,
    /// RNG seed for this chain
    pub seed: u64,
}

/// End-of-run results of one chain.
#[derive(Debug, Clone)]
pub struct ChainSummary {
    pub k: usize,
    pub beta: f64,
    pub main_rep: usize,
    /// Harmonic-mean log evidence
    pub harmonic_evidence: f64,
    /// Mean/variance/SE of the recorded collapsed log likelihood
    pub group_stats: StreamStats,
    /// Same for the joint likelihood, when frequencies were drawn
    pub joint_stats: Option<StreamStats>,
    /// Final admixture concentration
    pub alpha: f64,
    /// Mean Q matrices, present when labels were aligned
    pub q_gene: Option<Vec<Vec<f64>>>,
    pub q_ind: Option<Vec<Vec<f64>>>,
    pub q_pop: Option<Vec<Vec<f64>>>,
}

/// One admixture-model MCMC chain.
pub struct Chain<'d> {
    params: ChainParams,
    data: &'d GenotypeData,
    stats: SuffStats,
    q: QMatrices,
    acc: Accumulator,
    freqs: Option<FreqDraws>,
    alpha: f64,
    rng: StdRng,
    ln_table: LnTable,
    /// Scratch: categorical weights over demes
    weights: Vec<f64>,
    /// Scratch: KxK label-alignment cost matrix
    cost: Vec<Vec<f64>>,
}

impl<'d> Chain<'d> {
    pub fn new(params: ChainParams, data: &'d GenotypeData) -> Self {
        let k = params.k;
        let freqs = params.draw_freqs.then(|| FreqDraws::new(data, k));
        let ln_table = LnTable::new(data.max_alleles(), params.lambda);
        Self {
            alpha: params.alpha,
            rng: StdRng::seed_from_u64(params.seed),
            stats: SuffStats::new(data, k),
            q: QMatrices::new(data.n_gene_copies(), k),
            acc: Accumulator::new(),
            freqs,
            ln_table,
            weights: vec![0.0; k],
            cost: vec![vec![0.0; k]; k],
            params,
            data,
        }
    }

    /// Re-randomize the grouping and clear accumulators. The running
    /// alignment reference is re-seeded only when `reset_running`.
    pub fn reset(&mut self, reset_running: bool) {
        self.alpha = self.params.alpha;
        self.stats.randomize(self.data, &mut self.rng);
        self.q.reset(reset_running);
        self.acc = Accumulator::new();
    }

    /// Current sufficient statistics (for inspection and tests).
    pub fn stats(&self) -> &SuffStats {
        &self.stats
    }

    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    /// Run the full burn-in + sampling schedule.
    ///
    /// Thinning activates once burn-in completes, so warm-up sweeps are
    /// never multiplied. Label alignment runs on every recorded iteration,
    /// burn-in included, which lets the running reference warm up before
    /// accumulation starts.
    pub fn run<S: IterationSink>(&mut self, sink: &mut S) -> Result<ChainSummary> {
        self.reset(true);

        let p = self.params.clone();
        let mut thin_switch = 1usize;

        for rep in 0..(p.burnin + p.samples) {
            for _ in 0..thin_switch {
                sampler::update_groups(
                    self.data,
                    &mut self.stats,
                    self.alpha,
                    p.lambda,
                    p.beta,
                    &self.ln_table,
                    &mut self.weights,
                    &mut self.rng,
                )?;
                if !p.fix_alpha {
                    self.alpha = sampler::update_alpha(
                        self.data,
                        &self.stats,
                        self.alpha,
                        p.alpha_prop_sd,
                        &mut self.rng,
                    );
                }
            }
            if rep == p.burnin {
                thin_switch = p.thinning;
            }

            if p.fix_labels {
                sampler::produce_q_matrix(
                    self.data,
                    &self.stats,
                    self.alpha,
                    p.lambda,
                    &mut self.q,
                    &mut self.weights,
                )?;
                self.q.align_labels(&mut self.stats, &mut self.cost)?;
                self.q.update_running();
                if rep >= p.burnin {
                    self.q.accumulate();
                }
            }

            let ll_group = accumulator::log_like_group(self.data, &self.stats, p.lambda);
            let mut ll_joint = 0.0;
            if let Some(freqs) = self.freqs.as_mut() {
                sampler::draw_freqs(
                    self.data,
                    &self.stats,
                    self.alpha,
                    p.lambda,
                    freqs,
                    &mut self.rng,
                )?;
                ll_joint = accumulator::log_like_joint(self.data, freqs);
            }

            if rep >= p.burnin {
                self.acc.record_group(ll_group);
                if self.freqs.is_some() {
                    self.acc.record_joint(ll_joint);
                }
            }

            let iter = rep as i64 - p.burnin as i64 + 1;
            sink.likelihood_row(p.k, p.main_rep + 1, iter, ll_group, ll_joint, self.alpha)?;
            sink.grouping_row(p.k, p.main_rep + 1, iter, self.stats.groups())?;
        }

        Ok(self.summarize())
    }

    fn summarize(&self) -> ChainSummary {
        let p = &self.params;
        let (q_gene, q_ind, q_pop) = if p.fix_labels {
            let gene = accumulator::mean_q_gene(&self.q, p.samples);
            let ind = accumulator::mean_q_ind(self.data, &gene);
            let pop = accumulator::mean_q_pop(self.data, &ind);
            (Some(gene), Some(ind), Some(pop))
        } else {
            (None, None, None)
        };

        ChainSummary {
            k: p.k,
            beta: p.beta,
            main_rep: p.main_rep,
            harmonic_evidence: self.acc.harmonic_evidence(),
            group_stats: self.acc.group_stats(),
            joint_stats: self.freqs.as_ref().map(|_| self.acc.joint_stats()),
            alpha: self.alpha,
            q_gene,
            q_ind,
            q_pop,
        }
    }
}
