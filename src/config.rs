//! # Configuration Logic
//!
//! CLI argument parsing and validation using clap derive.

use clap::Parser;
use std::path::PathBuf;

use crate::error::{DemixError, Result};
use crate::model::sampler::ALPHA_MAX;

/// demix: Bayesian inference of population structure from multilocus genotypes
#[derive(Parser, Debug, Clone)]
#[command(name = "demix")]
#[command(author = "Demix Authors")]
#[command(version = "0.1.0")]
#[command(about = "Bayesian population structure inference", long_about = None)]
pub struct Config {
    // ============ Data Parameters ============
    /// Input genotype table (one row per ploidy slot: sample pop a_1..a_L)
    #[arg(long, value_name = "FILE")]
    pub gt: PathBuf,

    /// Output file prefix (required)
    #[arg(long, short, value_name = "PREFIX")]
    pub out: PathBuf,

    // ============ Model Parameters ============
    /// Smallest number of demes to fit
    #[arg(long = "k-min", default_value = "1")]
    pub k_min: usize,

    /// Largest number of demes to fit
    #[arg(long = "k-max", default_value = "3")]
    pub k_max: usize,

    /// Allele-frequency Dirichlet pseudocount
    #[arg(long, default_value = "1.0")]
    pub lambda: f64,

    /// Initial admixture concentration, in (0, 10]
    #[arg(long, default_value = "1.0")]
    pub alpha: f64,

    /// Proposal SD of the alpha Metropolis step
    #[arg(long = "alpha-prop-sd", default_value = "0.1")]
    pub alpha_prop_sd: f64,

    /// Keep alpha fixed at its initial value
    #[arg(long = "fix-alpha")]
    pub fix_alpha: bool,

    // ============ MCMC Parameters ============
    /// Independent chains per K
    #[arg(long = "main-repeats", default_value = "3")]
    pub main_repeats: usize,

    /// Burn-in iterations per chain
    #[arg(long, default_value = "500")]
    pub burnin: usize,

    /// Recorded iterations per chain
    #[arg(long, default_value = "5000")]
    pub samples: usize,

    /// Sweeps per recorded iteration after burn-in
    #[arg(long, default_value = "1")]
    pub thinning: usize,

    /// Draw allele frequencies and admixture proportions each iteration and
    /// record the joint likelihood
    #[arg(long = "draw-freqs")]
    pub draw_freqs: bool,

    // ============ Thermodynamic Integration ============
    /// Estimate evidence by thermodynamic integration as well
    #[arg(long)]
    pub thermodynamic: bool,

    /// Number of inverse-temperature rungs
    #[arg(long = "ti-rungs", default_value = "21")]
    pub ti_rungs: usize,

    /// Power of the rung ladder; rungs are ((r+1)/rungs)^power
    #[arg(long = "ti-power", default_value = "3.0")]
    pub ti_power: f64,

    // ============ Output Toggles ============
    /// Write the gene-level mean Q matrix
    #[arg(long = "q-gene", value_name = "BOOL", action = clap::ArgAction::Set, default_value_t = true)]
    pub q_gene: bool,

    /// Write the individual-level mean Q matrix
    #[arg(long = "q-ind", value_name = "BOOL", action = clap::ArgAction::Set, default_value_t = true)]
    pub q_ind: bool,

    /// Write the population-level mean Q matrix
    #[arg(long = "q-pop", value_name = "BOOL", action = clap::ArgAction::Set, default_value_t = true)]
    pub q_pop: bool,

    /// Write per-entry standard errors of the Q matrices across repeats
    /// (requires main-repeats >= 2)
    #[arg(long = "q-error")]
    pub q_error: bool,

    /// Stream per-iteration likelihoods to CSV
    #[arg(long = "likelihood")]
    pub likelihood: bool,

    /// Stream per-iteration posterior groupings to CSV
    #[arg(long = "grouping")]
    pub grouping: bool,

    // ============ General Parameters ============
    /// Random seed for reproducibility
    #[arg(long, default_value = "7261")]
    pub seed: u64,

    /// Number of threads (default: all available cores)
    #[arg(long)]
    pub nthreads: Option<usize>,
}

impl Config {
    /// Parse command line arguments and validate
    pub fn parse_and_validate() -> Result<Self> {
        let config = Self::parse();
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration parameters
    pub fn validate(&self) -> Result<()> {
        if !self.gt.exists() {
            return Err(DemixError::FileNotFound {
                path: self.gt.clone(),
            });
        }
        if self.k_min == 0 {
            return Err(DemixError::config("k-min must be at least 1"));
        }
        if self.k_max < self.k_min {
            return Err(DemixError::config(format!(
                "k-max ({}) must not be below k-min ({})",
                self.k_max, self.k_min
            )));
        }
        if self.lambda <= 0.0 {
            return Err(DemixError::config("lambda must be positive"));
        }
        if self.alpha <= 0.0 || self.alpha > ALPHA_MAX {
            return Err(DemixError::config(format!(
                "alpha must lie in (0, {}]",
                ALPHA_MAX
            )));
        }
        if self.alpha_prop_sd <= 0.0 {
            return Err(DemixError::config("alpha-prop-sd must be positive"));
        }
        if self.main_repeats == 0 {
            return Err(DemixError::config("main-repeats must be at least 1"));
        }
        if self.samples == 0 {
            return Err(DemixError::config("samples must be at least 1"));
        }
        if self.thinning == 0 {
            return Err(DemixError::config("thinning must be at least 1"));
        }
        if self.thermodynamic && self.ti_rungs < 2 {
            return Err(DemixError::config(
                "thermodynamic integration needs at least 2 rungs",
            ));
        }
        if self.q_error && self.main_repeats < 2 {
            return Err(DemixError::config(
                "q-error needs at least 2 main-repeats to estimate a spread",
            ));
        }
        if self.out.is_dir() {
            return Err(DemixError::config(format!(
                "'out' parameter cannot be a directory: {:?}",
                self.out
            )));
        }
        Ok(())
    }

    /// Get the number of threads to use
    pub fn nthreads(&self) -> usize {
        self.nthreads.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        })
    }
}
