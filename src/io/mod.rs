//! # I/O Module
//!
//! Boundaries between disk formats and in-memory state: the genotype table
//! loader and the CSV/JSON result writers.

pub mod output;
pub mod table;

pub use output::{IterationSink, NullSink, SharedSinks, StreamSinks};
pub use table::load_genotype_table;
