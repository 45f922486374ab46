//! Expected enhancement cost.
//!
//! The enhancement process is a Markov chain over item levels: success at
//! level `l` moves to `l+1`; failure resets to 0 below the protection
//! threshold and drops one level (consuming a protection item) at or
//! above it. Expected attempts and protection uses are solved exactly
//! from the chain's linear system, one equation per level below the
//! target.

use thiserror::Error;

/// Per-level base success rates, reference data fitted to the game.
/// Index = current level.
pub const BASE_SUCCESS_RATES: [f64; 20] = [
    0.50, 0.45, 0.45, 0.40, 0.40, 0.40, 0.35, 0.35, 0.35, 0.35, 0.30, 0.30, 0.30, 0.30, 0.30,
    0.30, 0.30, 0.30, 0.30, 0.30,
];

#[derive(Debug, Error)]
pub enum EnhanceCostError {
    #[error("invalid level range: start {start} target {target}")]
    InvalidRange { start: u8, target: u8 },
    #[error("success rates missing for levels up to {0}")]
    MissingRates(u8),
    #[error("chain is singular; success rates too close to zero")]
    Singular,
}

#[derive(Debug, Clone)]
pub struct EnhanceCostInput {
    /// Success probability per current level (before the multiplier).
    pub success_rates: Vec<f64>,
    pub start_level: u8,
    pub target_level: u8,
    /// Levels at or above this keep `level - 1` on failure by consuming a
    /// protection item; below it, failure resets to 0.
    pub protect_from: u8,
    pub attempt_seconds: f64,
    /// Buff multiplier applied to every success rate.
    pub success_multiplier: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CostEstimate {
    pub expected_attempts: f64,
    pub expected_protections: f64,
    pub expected_time_ms: f64,
}

/// Solve the chain for expected attempts and protection uses from
/// `start_level` to `target_level`.
pub fn estimate(input: &EnhanceCostInput) -> Result<CostEstimate, EnhanceCostError> {
    let start = input.start_level as usize;
    let target = input.target_level as usize;
    if target <= start {
        return Err(EnhanceCostError::InvalidRange {
            start: input.start_level,
            target: input.target_level,
        });
    }
    if input.success_rates.len() < target {
        return Err(EnhanceCostError::MissingRates(input.target_level));
    }

    let p: Vec<f64> = input.success_rates[..target]
        .iter()
        .map(|rate| (rate * input.success_multiplier).clamp(0.01, 1.0))
        .collect();

    // Unknowns: E[0..target] (attempts-to-target) and P[0..target]
    // (protections-to-target); E[target] = P[target] = 0. Row l encodes
    //   X[l] - p_l X[l+1] - q_l X[dest(l)] = rhs
    // with dest(l) = l-1 (protected) or 0 (reset), rhs = 1 for attempts
    // and q_l·protected(l) for protections. One matrix, two RHS columns.
    let n = target;
    let mut matrix = vec![vec![0.0f64; n]; n];
    let mut rhs_attempts = vec![0.0f64; n];
    let mut rhs_protections = vec![0.0f64; n];

    for l in 0..n {
        let q = 1.0 - p[l];
        matrix[l][l] += 1.0;
        if l + 1 < n {
            matrix[l][l + 1] -= p[l];
        }
        let protected = l >= input.protect_from as usize;
        let dest = if protected { l.saturating_sub(1) } else { 0 };
        matrix[l][dest] -= q;
        rhs_attempts[l] = 1.0;
        rhs_protections[l] = if protected { q } else { 0.0 };
    }

    let (attempts, protections) =
        solve_two(&mut matrix, &mut rhs_attempts, &mut rhs_protections)?;

    let expected_attempts = attempts[start];
    let expected_protections = protections[start];
    Ok(CostEstimate {
        expected_attempts,
        expected_protections,
        expected_time_ms: expected_attempts * input.attempt_seconds * 1000.0,
    })
}

/// Gaussian elimination with partial pivoting over two RHS columns.
fn solve_two(
    matrix: &mut [Vec<f64>],
    rhs_a: &mut [f64],
    rhs_b: &mut [f64],
) -> Result<(Vec<f64>, Vec<f64>), EnhanceCostError> {
    let n = matrix.len();
    for col in 0..n {
        let pivot_row = (col..n)
            .max_by(|&a, &b| {
                matrix[a][col]
                    .abs()
                    .partial_cmp(&matrix[b][col].abs())
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .ok_or(EnhanceCostError::Singular)?;
        if matrix[pivot_row][col].abs() < 1e-12 {
            return Err(EnhanceCostError::Singular);
        }
        matrix.swap(col, pivot_row);
        rhs_a.swap(col, pivot_row);
        rhs_b.swap(col, pivot_row);

        let pivot = matrix[col][col];
        for row in 0..n {
            if row == col {
                continue;
            }
            let factor = matrix[row][col] / pivot;
            if factor == 0.0 {
                continue;
            }
            for k in col..n {
                let value = matrix[col][k];
                matrix[row][k] -= factor * value;
            }
            rhs_a[row] -= factor * rhs_a[col];
            rhs_b[row] -= factor * rhs_b[col];
        }
    }

    let mut solution_a = vec![0.0; n];
    let mut solution_b = vec![0.0; n];
    for row in 0..n {
        solution_a[row] = rhs_a[row] / matrix[row][row];
        solution_b[row] = rhs_b[row] / matrix[row][row];
    }
    Ok((solution_a, solution_b))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(rates: &[f64], target: u8, protect_from: u8) -> EnhanceCostInput {
        EnhanceCostInput {
            success_rates: rates.to_vec(),
            start_level: 0,
            target_level: target,
            protect_from,
            attempt_seconds: 2.0,
            success_multiplier: 1.0,
        }
    }

    #[test]
    fn test_single_level_is_geometric() {
        let estimate = estimate(&input(&[0.5], 1, 10)).expect("estimate");
        assert!((estimate.expected_attempts - 2.0).abs() < 1e-9);
        assert_eq!(estimate.expected_protections, 0.0);
        assert!((estimate.expected_time_ms - 4_000.0).abs() < 1e-9);
    }

    #[test]
    fn test_reset_to_zero_chain() {
        // p = 0.5, two levels, no protection:
        // E1 = 1 + 0.5*E0, E0 = 1 + 0.5*E1 + 0.5*E0  =>  E0 = 6.
        let estimate = estimate(&input(&[0.5, 0.5], 2, 10)).expect("estimate");
        assert!((estimate.expected_attempts - 6.0).abs() < 1e-9);
    }

    #[test]
    fn test_fully_protected_chain() {
        // Protected drop-one-level chain with constant p = 0.5:
        // e0 = 2, e1 = 2 + e0 = 4, total = 6; protections = failures.
        let estimate = estimate(&input(&[0.5, 0.5], 2, 0)).expect("estimate");
        assert!((estimate.expected_attempts - 6.0).abs() < 1e-9);
        // Solving the same chain for failures gives 3 protected uses.
        assert!((estimate.expected_protections - 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_protection_threshold_splits_regimes() {
        let unprotected = estimate(&input(&[0.5, 0.5, 0.5], 3, 10)).expect("estimate");
        let protected_from_2 = estimate(&input(&[0.5, 0.5, 0.5], 3, 2)).expect("estimate");
        // Protection can only reduce expected attempts.
        assert!(protected_from_2.expected_attempts < unprotected.expected_attempts);
        assert!(protected_from_2.expected_protections > 0.0);
        assert_eq!(unprotected.expected_protections, 0.0);
    }

    #[test]
    fn test_success_multiplier_reduces_attempts() {
        let base = estimate(&input(&[0.4, 0.4], 2, 10)).expect("estimate");
        let buffed = estimate(&EnhanceCostInput {
            success_multiplier: 1.25,
            ..input(&[0.4, 0.4], 2, 10)
        })
        .expect("estimate");
        assert!(buffed.expected_attempts < base.expected_attempts);
    }

    #[test]
    fn test_invalid_range_rejected() {
        assert!(matches!(
            estimate(&input(&[0.5], 0, 0)),
            Err(EnhanceCostError::InvalidRange { .. })
        ));
        assert!(matches!(
            estimate(&input(&[0.5], 5, 0)),
            Err(EnhanceCostError::MissingRates(_))
        ));
    }
}
