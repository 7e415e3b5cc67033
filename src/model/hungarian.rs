//! # Assignment Solver
//!
//! Minimum-cost perfect matching on a dense square cost matrix via shortest
//! augmenting paths with row/column potentials. Used by the label aligner to
//! pick the deme-label permutation closest to the running reference.

use crate::error::{DemixError, Result};

/// Solve the assignment problem for a square cost matrix.
///
/// Returns `perm` with `perm[row] = col` minimizing `sum(cost[row][perm[row]])`.
/// Costs may be any finite reals.
///
/// The implementation maintains dual potentials `u` (rows) and `v` (columns)
/// and grows one augmenting path per row; arrays are 1-based internally with
/// column 0 as the virtual root of the path tree.
pub fn solve(cost: &[Vec<f64>]) -> Result<Vec<usize>> {
    let n = cost.len();
    if n == 0 {
        return Err(DemixError::algorithm("empty cost matrix"));
    }
    for (i, row) in cost.iter().enumerate() {
        if row.len() != n {
            return Err(DemixError::algorithm(format!(
                "cost matrix row {} has {} columns, expected {}",
                i,
                row.len(),
                n
            )));
        }
        if row.iter().any(|c| !c.is_finite()) {
            return Err(DemixError::algorithm("non-finite entry in cost matrix"));
        }
    }

    let mut u = vec![0.0_f64; n + 1];
    let mut v = vec![0.0_f64; n + 1];
    // matched[col] = row assigned to col (0 = unassigned)
    let mut matched = vec![0usize; n + 1];
    let mut path = vec![0usize; n + 1];

    for row in 1..=n {
        matched[0] = row;
        let mut j0 = 0usize;
        let mut min_slack = vec![f64::INFINITY; n + 1];
        let mut visited = vec![false; n + 1];

        // Dijkstra-style scan until an unassigned column is reached
        loop {
            visited[j0] = true;
            let i0 = matched[j0];
            let mut delta = f64::INFINITY;
            let mut j1 = 0usize;

            for j in 1..=n {
                if visited[j] {
                    continue;
                }
                let slack = cost[i0 - 1][j - 1] - u[i0] - v[j];
                if slack < min_slack[j] {
                    min_slack[j] = slack;
                    path[j] = j0;
                }
                if min_slack[j] < delta {
                    delta = min_slack[j];
                    j1 = j;
                }
            }

            for j in 0..=n {
                if visited[j] {
                    u[matched[j]] += delta;
                    v[j] -= delta;
                } else {
                    min_slack[j] -= delta;
                }
            }

            j0 = j1;
            if matched[j0] == 0 {
                break;
            }
        }

        // Unwind the augmenting path
        while j0 != 0 {
            let j1 = path[j0];
            matched[j0] = matched[j1];
            j0 = j1;
        }
    }

    let mut perm = vec![usize::MAX; n];
    for j in 1..=n {
        perm[matched[j] - 1] = j - 1;
    }
    if !is_permutation(&perm) {
        return Err(DemixError::algorithm(
            "assignment solver returned an invalid permutation",
        ));
    }
    Ok(perm)
}

/// Check that `perm` is a bijection on `0..perm.len()`.
pub fn is_permutation(perm: &[usize]) -> bool {
    let mut seen = vec![false; perm.len()];
    for &p in perm {
        if p >= perm.len() || seen[p] {
            return false;
        }
        seen[p] = true;
    }
    true
}
