//! # Model Module
//!
//! The admixture-model sampler and its supporting machinery.
//!
//! ## Core pieces
//! - `counts`: co-maintained sufficient statistics behind a detach/attach API
//! - `sampler`: collapsed-Gibbs kernel, alpha Metropolis step, Q-row generator
//! - `hungarian`: assignment solver used for label alignment
//! - `labels`: Stephens-style online label-switching correction
//! - `accumulator`: likelihood summaries and evidence accumulators
//! - `chain`: the per-(K, beta, replicate) chain driver

pub mod accumulator;
pub mod chain;
pub mod counts;
pub mod hungarian;
pub mod labels;
pub mod sampler;

pub use chain::{Chain, ChainParams, ChainSummary};
pub use counts::SuffStats;
pub use labels::QMatrices;
