//! # Demix Library
//!
//! Bayesian inference of population structure from multilocus genotype data.
//! A collapsed-Gibbs sampler under the admixture model, with Stephens-style
//! online label alignment and model-evidence estimation (harmonic mean and
//! thermodynamic integration) for choosing the number of demes.
//!
//! ## Modules
//! - `config`: CLI argument parsing and validation
//! - `data`: in-memory genotype representation and gene-copy enumeration
//! - `error`: error types and result aliases
//! - `io`: genotype table loading, per-iteration streams, result files
//! - `model`: the sampler, label alignment, and evidence accumulators
//! - `pipelines`: the K sweep with repeats and the thermodynamic ladder
//! - `utils`: shared numeric helpers

pub mod config;
pub mod data;
pub mod error;
pub mod io;
pub mod model;
pub mod pipelines;
pub mod utils;

// Re-export commonly used types
pub use config::Config;
pub use data::{GeneCopy, GenotypeData};
pub use error::{DemixError, Result};
pub use io::{IterationSink, NullSink, StreamSinks};
pub use model::{Chain, ChainParams, ChainSummary};
pub use pipelines::RunPipeline;
