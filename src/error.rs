//! # Error Types
//!
//! One `thiserror` enum spans every failure surface of a run: rejected
//! configuration, unreadable or malformed genotype tables, and numerical
//! breakdown inside the sampler. Library code reports these through the
//! crate-wide [`Result`] alias; the binary boundary wraps them in `anyhow`.

use std::fmt::Display;
use std::path::PathBuf;
use thiserror::Error;

/// Any failure a demix run can report.
#[derive(Error, Debug)]
pub enum DemixError {
    /// Command-line parameters rejected before any chain starts
    #[error("bad configuration: {message}")]
    Config { message: String },

    /// An input path that does not point at a readable file
    #[error("no such input file: {path}")]
    FileNotFound { path: PathBuf },

    /// Filesystem failure while reading inputs or writing result streams
    #[error("i/o failure: {0}")]
    Io(#[from] std::io::Error),

    /// A genotype-table line that cannot be tokenized or parsed
    #[error("genotype table line {line}: {message}")]
    Parse { line: usize, message: String },

    /// Rows that parse individually but describe an impossible dataset
    #[error("inconsistent genotype data: {message}")]
    InvalidData { message: String },

    /// Numerical breakdown inside the sampler: degenerate categorical
    /// weights, a failed distribution draw, or an invalid label permutation
    #[error("sampler failure: {message}")]
    Algorithm { message: String },
}

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, DemixError>;

impl DemixError {
    /// Reject a configuration value.
    pub fn config(message: impl Display) -> Self {
        Self::Config {
            message: message.to_string(),
        }
    }

    /// Flag a malformed genotype-table line.
    pub fn parse(line: usize, message: impl Display) -> Self {
        Self::Parse {
            line,
            message: message.to_string(),
        }
    }

    /// Flag a dataset-level inconsistency.
    pub fn invalid_data(message: impl Display) -> Self {
        Self::InvalidData {
            message: message.to_string(),
        }
    }

    /// Flag a numerical failure that aborts the running chain.
    pub fn algorithm(message: impl Display) -> Self {
        Self::Algorithm {
            message: message.to_string(),
        }
    }
}
