//! # Numeric Helpers
//!
//! Special functions and sampling primitives shared by the model layer:
//! log-gamma, stable log-space addition, and the cumulative-sum categorical
//! draw used by the Gibbs kernel.

use rand::Rng;
use special::Gamma;

/// Natural log of the gamma function.
#[inline]
pub fn ln_gamma(x: f64) -> f64 {
    Gamma::ln_gamma(x).0
}

/// Numerically stable `ln(exp(x) + exp(y))`.
///
/// `-inf` operands behave as `ln(0)`: the other operand is returned
/// unchanged, so log-space accumulators can start from `f64::NEG_INFINITY`.
#[inline]
pub fn log_add_exp(x: f64, y: f64) -> f64 {
    if x == f64::NEG_INFINITY {
        y
    } else if y == f64::NEG_INFINITY {
        x
    } else if x > y {
        (y - x).exp().ln_1p() + x
    } else {
        (x - y).exp().ln_1p() + y
    }
}

/// Numerically stable `ln(sum(exp(xs)))`.
pub fn log_sum_exp(xs: &[f64]) -> f64 {
    match xs.len() {
        0 => f64::NEG_INFINITY,
        1 => xs[0],
        _ => {
            let max = xs.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
            if max == f64::NEG_INFINITY {
                return f64::NEG_INFINITY;
            }
            xs.iter().fold(0.0_f64, |acc, x| acc + (x - max).exp()).ln() + max
        }
    }
}

/// Draw an index from an unnormalized weight vector.
///
/// Walks the cumulative sum against `u * total` where `u ~ U(0,1)`. The
/// caller guarantees `total == weights.iter().sum()` and `total > 0`; the
/// final index is returned if rounding pushes the target past the last
/// partial sum.
#[inline]
pub fn sample_weighted<R: Rng>(rng: &mut R, weights: &[f64], total: f64) -> usize {
    let target = rng.random::<f64>() * total;
    let mut cumulative = 0.0;
    for (idx, &w) in weights.iter().enumerate() {
        cumulative += w;
        if cumulative > target {
            return idx;
        }
    }
    weights.len() - 1
}

/// Cache of `ln(c + j * lambda)` for small counts.
///
/// Sized `[0, 1000) x [0, j_max]`; out-of-range counts fall back to `ln`.
/// Entries are computed with the same expression as the fallback, so lookups
/// and direct calls are bit-identical.
#[derive(Debug, Clone)]
pub struct LnTable {
    table: Vec<f64>,
    j_max: usize,
    lambda: f64,
}

/// Count range covered by [`LnTable`].
const LN_TABLE_COUNTS: usize = 1000;

impl LnTable {
    /// Build the cache for counts `0..1000` and multipliers `0..=j_max`.
    pub fn new(j_max: usize, lambda: f64) -> Self {
        let mut table = Vec::with_capacity(LN_TABLE_COUNTS * (j_max + 1));
        for c in 0..LN_TABLE_COUNTS {
            for j in 0..=j_max {
                table.push((c as f64 + j as f64 * lambda).ln());
            }
        }
        Self {
            table,
            j_max,
            lambda,
        }
    }

    /// `ln(c + j * lambda)` via the cache, or directly when out of range.
    #[inline]
    pub fn ln_shifted(&self, c: u32, j: usize) -> f64 {
        let c = c as usize;
        if c < LN_TABLE_COUNTS && j <= self.j_max {
            self.table[c * (self.j_max + 1) + j]
        } else {
            (c as f64 + j as f64 * self.lambda).ln()
        }
    }
}
