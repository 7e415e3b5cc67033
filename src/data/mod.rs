//! # Data Module
//!
//! In-memory representation of the observed genotypes and the canonical
//! gene-copy enumeration shared by the sampler, the label aligner, and the
//! output writers.

pub mod genotypes;

pub use genotypes::{GeneCopy, GenotypeData};
