//! L1-minimization backend: `minimize ‖x‖₁ subject to A·x = B`.
//!
//! Isolated behind the [`LinearProgram`] trait per spec.md §9 ("the L1
//! backend is an optional strategy... isolate it behind an interface so an
//! alternative can be swapped in"). The default implementation,
//! [`GoodLpProgram`], is backed by the `good_lp` crate's pure-Rust
//! `microlp` solver — no system LP dependency, unlike the original's
//! or-tools/GLOP binding.

use good_lp::{constraint, variable, Expression, Solution, SolverModel};
use nalgebra::{DMatrix, DVector};

/// Strategy for solving `A·x = B, minimize ‖x‖₁`.
///
/// Returns `None` on infeasibility, matching spec.md §4.5/§7(b): the
/// caller treats a `None` result as a no-op step (leaves `X` at zero).
pub trait LinearProgram {
    fn solve_l1(&self, a: &DMatrix<f64>, b: &DVector<f64>) -> Option<DVector<f64>>;
}

/// Splits `x = u - v` with `u, v >= 0` and minimizes `sum(u_i + v_i)`, the
/// standard LP reformulation of L1-minimization.
#[derive(Debug, Default, Clone, Copy)]
pub struct GoodLpProgram;

impl LinearProgram for GoodLpProgram {
    fn solve_l1(&self, a: &DMatrix<f64>, b: &DVector<f64>) -> Option<DVector<f64>> {
        let rows = a.nrows();
        let cols = a.ncols();
        if cols == 0 {
            return Some(DVector::zeros(0));
        }

        let mut vars = good_lp::variables!();
        let u: Vec<_> = (0..cols).map(|_| vars.add(variable().min(0.0))).collect();
        let v: Vec<_> = (0..cols).map(|_| vars.add(variable().min(0.0))).collect();

        let objective: Expression = u.iter().chain(v.iter()).map(|&var| Expression::from(var)).sum();
        let mut model = vars.minimise(objective).using(good_lp::microlp);

        for row in 0..rows {
            let mut lhs = Expression::from(0.0);
            for col in 0..cols {
                let coeff = a[(row, col)];
                if coeff != 0.0 {
                    lhs += coeff * u[col];
                    lhs -= coeff * v[col];
                }
            }
            model = model.with(constraint!(lhs == b[row]));
        }

        let solution = model.solve().ok()?;
        Some(DVector::from_iterator(
            cols,
            (0..cols).map(|i| solution.value(u[i]) - solution.value(v[i])),
        ))
    }
}
