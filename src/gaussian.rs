//! Gaussian elimination with partial pivoting: linear solve and numerical
//! rank, both used by [`crate::equation_system::EquationSystem`].

use nalgebra::{DMatrix, DVector};

/// Threshold below which a pivot (or, in [`rank`], a row's remaining
/// magnitude) is treated as zero. Matches the `epsilon` used throughout
/// spec.md §4.5 for convergence and substitution-form detection.
pub const EPSILON: f64 = 1e-10;

/// Solves `a * x = b` by Gaussian elimination with partial pivoting.
///
/// `a` is square (`n x n`). Returns `None` if the system is singular to
/// within [`EPSILON`].
pub fn solve(a: &DMatrix<f64>, b: &DVector<f64>) -> Option<DVector<f64>> {
    let n = a.nrows();
    assert_eq!(a.ncols(), n, "solve() requires a square matrix");
    assert_eq!(b.len(), n, "solve() requires b.len() == a.nrows()");

    let mut m = a.clone();
    let mut rhs = b.clone();

    for col in 0..n {
        let pivot_row = (col..n)
            .max_by(|&r1, &r2| m[(r1, col)].abs().partial_cmp(&m[(r2, col)].abs()).unwrap())
            .unwrap();
        if m[(pivot_row, col)].abs() < EPSILON {
            return None;
        }
        if pivot_row != col {
            m.swap_rows(pivot_row, col);
            rhs.swap_rows(pivot_row, col);
        }
        let pivot = m[(col, col)];
        for row in (col + 1)..n {
            let factor = m[(row, col)] / pivot;
            if factor == 0.0 {
                continue;
            }
            for k in col..n {
                m[(row, k)] -= factor * m[(col, k)];
            }
            rhs[row] -= factor * rhs[col];
        }
    }

    let mut x = DVector::zeros(n);
    for row in (0..n).rev() {
        let mut sum = rhs[row];
        for k in (row + 1)..n {
            sum -= m[(row, k)] * x[k];
        }
        x[row] = sum / m[(row, row)];
    }
    Some(x)
}

/// Numerical rank of `a` by Gaussian elimination with partial pivoting,
/// treating any pivot smaller than [`EPSILON`] as zero.
pub fn rank(a: &DMatrix<f64>) -> usize {
    let mut m = a.clone();
    let rows = m.nrows();
    let cols = m.ncols();
    let mut rank = 0;

    for col in 0..cols {
        if rank >= rows {
            break;
        }
        let pivot_row = (rank..rows)
            .max_by(|&r1, &r2| m[(r1, col)].abs().partial_cmp(&m[(r2, col)].abs()).unwrap())
            .unwrap();
        if m[(pivot_row, col)].abs() < EPSILON {
            continue;
        }
        if pivot_row != rank {
            m.swap_rows(pivot_row, rank);
        }
        let pivot = m[(rank, col)];
        for row in (rank + 1)..rows {
            let factor = m[(row, col)] / pivot;
            if factor == 0.0 {
                continue;
            }
            for k in col..cols {
                m[(row, k)] -= factor * m[(rank, k)];
            }
        }
        rank += 1;
    }
    rank
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn solves_simple_system() {
        let a = DMatrix::from_row_slice(2, 2, &[2.0, 1.0, 1.0, 3.0]);
        let b = DVector::from_row_slice(&[5.0, 10.0]);
        let x = solve(&a, &b).unwrap();
        assert!((x[0] - 1.0).abs() < 1e-9);
        assert!((x[1] - 3.0).abs() < 1e-9);
    }

    #[test]
    fn singular_system_returns_none() {
        let a = DMatrix::from_row_slice(2, 2, &[1.0, 2.0, 2.0, 4.0]);
        let b = DVector::from_row_slice(&[1.0, 2.0]);
        assert!(solve(&a, &b).is_none());
    }

    #[test]
    fn rank_of_identity_is_full() {
        let a = DMatrix::identity(3, 3);
        assert_eq!(rank(&a), 3);
    }

    #[test]
    fn rank_detects_dependent_rows() {
        let a = DMatrix::from_row_slice(2, 2, &[1.0, 2.0, 2.0, 4.0]);
        assert_eq!(rank(&a), 1);
    }

    #[test]
    fn rank_is_invariant_under_row_and_column_permutation() {
        let a = DMatrix::from_row_slice(3, 3, &[1.0, 0.0, 2.0, 0.0, 1.0, 0.0, 1.0, 1.0, 2.0]);
        let r1 = rank(&a);
        let permuted = DMatrix::from_row_slice(3, 3, &[0.0, 1.0, 0.0, 1.0, 1.0, 2.0, 1.0, 0.0, 2.0]);
        assert_eq!(rank(&permuted), r1);
    }
}
