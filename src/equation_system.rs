//! Parameter/equation registry: substitution pass, symbolic Jacobian, and
//! the damped Gauss-Newton / L1 Newton step loop.

use std::collections::HashMap;

use nalgebra::{DMatrix, DVector};
use thiserror::Error;

use crate::expr::Expr;
use crate::gaussian;
use crate::lp::{GoodLpProgram, LinearProgram};
use crate::param::Parameter;

/// Outcome of [`EquationSystem::solve`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolveStatus {
    Okay,
    DidntConverge,
}

/// Errors reported at the library boundary. Everything else that spec.md
/// §7 calls a "programmer error" panics instead — removal of an
/// unregistered equation/parameter is the one case a caller may
/// legitimately want to recover from (a bookkeeping mismatch) rather than
/// crash on.
#[derive(Debug, Error)]
pub enum EquationSystemError {
    #[error("equation not found in system")]
    EquationNotFound,
    #[error("parameter not found in system")]
    ParameterNotFound,
}

/// Assembles residual expressions and parameters, simplifies by
/// substitution, builds a symbolic Jacobian, and solves the resulting
/// nonlinear system by damped Gauss-Newton (default) or L1 minimization.
pub struct EquationSystem {
    source_equations: Vec<Expr>,
    parameters: Vec<Parameter>,

    equations: Vec<Expr>,
    current_params: Vec<Parameter>,
    substitutions: HashMap<Parameter, Parameter>,
    jacobian: Vec<Vec<Expr>>,
    dirty: bool,

    /// Number of initial iterations (inclusive) during which drag
    /// residuals are included. Default 3.
    pub drag_steps: usize,
    /// Upper bound on Newton iterations. Default 20.
    pub max_steps: usize,
    /// Whether to restore pre-solve parameter values on non-convergence.
    /// Default true.
    pub revert_when_not_converged: bool,
    /// Use the L1/linear-program backend instead of least squares.
    /// Default false.
    pub use_linear_program: bool,

    lp: Box<dyn LinearProgram>,
    counted_steps: usize,
}

impl Default for EquationSystem {
    fn default() -> Self {
        EquationSystem {
            source_equations: Vec::new(),
            parameters: Vec::new(),
            equations: Vec::new(),
            current_params: Vec::new(),
            substitutions: HashMap::new(),
            jacobian: Vec::new(),
            dirty: true,
            drag_steps: 3,
            max_steps: 20,
            revert_when_not_converged: true,
            use_linear_program: false,
            lp: Box::new(GoodLpProgram),
            counted_steps: 0,
        }
    }
}

impl EquationSystem {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_equation(&mut self, eq: Expr) {
        self.source_equations.push(eq);
        self.dirty = true;
    }

    pub fn add_equations(&mut self, eqs: impl IntoIterator<Item = Expr>) {
        for e in eqs {
            self.add_equation(e);
        }
    }

    pub fn remove_equation(&mut self, eq: &Expr) -> Result<(), EquationSystemError> {
        let pos = self
            .source_equations
            .iter()
            .position(|e| e.ptr_eq(eq))
            .ok_or(EquationSystemError::EquationNotFound)?;
        self.source_equations.remove(pos);
        self.dirty = true;
        Ok(())
    }

    pub fn add_parameter(&mut self, p: Parameter) {
        if self.parameters.contains(&p) {
            return;
        }
        self.parameters.push(p);
        self.dirty = true;
    }

    pub fn add_parameters(&mut self, ps: impl IntoIterator<Item = Parameter>) {
        for p in ps {
            self.add_parameter(p);
        }
    }

    pub fn remove_parameter(&mut self, p: &Parameter) -> Result<(), EquationSystemError> {
        let pos = self
            .parameters
            .iter()
            .position(|q| q == p)
            .ok_or(EquationSystemError::ParameterNotFound)?;
        self.parameters.remove(pos);
        self.dirty = true;
        Ok(())
    }

    pub fn clear(&mut self) {
        self.parameters.clear();
        self.current_params.clear();
        self.equations.clear();
        self.source_equations.clear();
        self.substitutions.clear();
        self.dirty = true;
    }

    pub fn parameters(&self) -> &[Parameter] {
        &self.parameters
    }

    pub fn current_params(&self) -> &[Parameter] {
        &self.current_params
    }

    pub fn equations(&self) -> &[Expr] {
        &self.equations
    }

    pub fn counted_steps(&self) -> usize {
        self.counted_steps
    }

    /// True iff any source equation contains a drag leaf — used by the
    /// sketch to force a solve even while further non-drag updates are
    /// suppressed.
    pub fn has_dragged(&self) -> bool {
        self.source_equations.iter().any(Expr::is_drag)
    }

    /// Rebuilds `equations`/`current_params` from the source lists (via
    /// the substitution pass) and the symbolic Jacobian, if dirty.
    pub fn update_dirty(&mut self) {
        if !self.dirty {
            return;
        }
        self.equations = self.source_equations.clone();
        self.current_params = self.parameters.clone();
        self.substitutions = self.solve_by_substitution();
        self.jacobian = self
            .equations
            .iter()
            .map(|eq| self.current_params.iter().map(|p| eq.derivative(p)).collect())
            .collect();
        self.dirty = false;
    }

    /// Scans `equations` for substitution-form residuals whose two
    /// parameters currently hold equal values, retires one of the pair,
    /// and rewrites all remaining equations to reference the survivor.
    fn solve_by_substitution(&mut self) -> HashMap<Parameter, Parameter> {
        let mut subs: HashMap<Parameter, Parameter> = HashMap::new();
        let mut i = 0;
        while i < self.equations.len() {
            let Some((mut keep, mut retire)) = self.equations[i].substitution_params() else {
                i += 1;
                continue;
            };
            if (keep.value() - retire.value()).abs() > gaussian::EPSILON {
                i += 1;
                continue;
            }
            if self.current_params.contains(&retire) {
                std::mem::swap(&mut keep, &mut retire);
            }

            for repr in subs.values_mut() {
                if *repr == retire {
                    *repr = keep.clone();
                }
            }
            subs.insert(retire.clone(), keep.clone());

            self.equations.remove(i);
            if let Some(pos) = self.current_params.iter().position(|p| *p == retire) {
                self.current_params.remove(pos);
            }
            for eq in self.equations.iter_mut() {
                *eq = eq.substitute(&retire, &keep);
            }
        }
        subs
    }

    fn back_substitution(&self) {
        if self.substitutions.is_empty() {
            return;
        }
        for p in &self.parameters {
            if let Some(repr) = self.substitutions.get(p) {
                p.set_value(repr.value());
            }
        }
    }

    fn eval_residuals(&self, clear_drag: bool) -> DVector<f64> {
        DVector::from_iterator(
            self.equations.len(),
            self.equations.iter().map(|e| {
                if clear_drag && e.is_drag() {
                    0.0
                } else {
                    e.eval()
                }
            }),
        )
    }

    fn is_converged(&self, b: &DVector<f64>, check_drag: bool) -> bool {
        self.equations.iter().enumerate().all(|(i, eq)| {
            if !check_drag && eq.is_drag() {
                true
            } else {
                b[i].abs() < gaussian::EPSILON
            }
        })
    }

    fn eval_jacobian(&self, clear_drag: bool) -> DMatrix<f64> {
        let rows = self.equations.len();
        let cols = self.current_params.len();
        let mut a = DMatrix::zeros(rows, cols);
        for r in 0..rows {
            if clear_drag && self.equations[r].is_drag() {
                continue;
            }
            for c in 0..cols {
                a[(r, c)] = self.jacobian[r][c].eval();
            }
        }
        a
    }

    fn solve_least_squares(&self, a: &DMatrix<f64>, b: &DVector<f64>) -> DVector<f64> {
        let rows = a.nrows();
        let cols = a.ncols();
        if rows == 0 {
            return DVector::zeros(cols);
        }
        let aat = a * a.transpose();
        match gaussian::solve(&aat, b) {
            Some(z) => a.transpose() * z,
            None => DVector::zeros(cols),
        }
    }

    /// Numerical rank of the Jacobian at current values; `dof` is
    /// `cols - rank`. Returns `true` iff the system has full row rank.
    pub fn test_rank(&mut self) -> (bool, i64) {
        self.update_dirty();
        let a = self.eval_jacobian(false);
        let rank = gaussian::rank(&a) as i64;
        let dof = a.ncols() as i64 - rank;
        (rank == a.nrows() as i64, dof)
    }

    /// Runs the damped Newton loop to convergence or `max_steps`.
    pub fn solve(&mut self) -> SolveStatus {
        self.update_dirty();
        let snapshot: Vec<f64> = self.parameters.iter().map(Parameter::value).collect();

        let mut step = 0usize;
        loop {
            let is_drag_step = step <= self.drag_steps;
            let clear_drag = !is_drag_step;

            let b = self.eval_residuals(clear_drag);
            if self.is_converged(&b, is_drag_step) {
                self.back_substitution();
                self.counted_steps = step;
                return SolveStatus::Okay;
            }

            let a = self.eval_jacobian(clear_drag);
            let x = if self.use_linear_program {
                match self.lp.solve_l1(&a, &b) {
                    Some(x) => x,
                    None => {
                        tracing::warn!("linear program backend reported infeasibility");
                        DVector::zeros(self.current_params.len())
                    }
                }
            } else {
                self.solve_least_squares(&a, &b)
            };

            for (j, p) in self.current_params.iter().enumerate() {
                p.set_value(p.value() - x[j]);
            }

            if step >= self.max_steps {
                break;
            }
            step += 1;
        }

        tracing::warn!(steps = step, "equation system did not converge");
        if self.revert_when_not_converged {
            for (p, v) in self.parameters.iter().zip(snapshot.iter()) {
                p.set_value(*v);
            }
        }
        self.counted_steps = step;
        SolveStatus::DidntConverge
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::Point;
    use crate::expr_vector::ExprVector;
    use approx::assert_relative_eq;

    #[test]
    fn empty_system_converges_trivially() {
        let mut sys = EquationSystem::new();
        assert_eq!(sys.solve(), SolveStatus::Okay);
    }

    #[test]
    fn solves_single_distance_constraint() {
        let p0 = Point::new_xy("p0", 0.0, 0.0);
        let p1 = Point::new_xy("p1", 3.0, 4.0);

        let mut sys = EquationSystem::new();
        sys.add_parameters(p0.parameters());
        sys.add_parameters(p1.parameters());

        let d = (p1.expr() - p0.expr()).magnitude() - Expr::constant(10.0);
        sys.add_equation(d);

        // Anchor p0 with a drag pinned to its current position.
        let target = ExprVector::planar(Expr::constant(0.0), Expr::constant(0.0));
        let anchor = p0.drag_to(&target);
        sys.add_equation(anchor.x);
        sys.add_equation(anchor.y);

        assert_eq!(sys.solve(), SolveStatus::Okay);
        assert_relative_eq!((p1.x.value().powi(2) + p1.y.value().powi(2)).sqrt(), 10.0, epsilon = 1e-6);
    }

    #[test]
    fn over_constrained_system_reverts() {
        let p0 = Point::new_xy("p0", 0.0, 0.0);
        let p1 = Point::new_xy("p1", 3.0, 4.0);

        let mut sys = EquationSystem::new();
        sys.add_parameters(p0.parameters());
        sys.add_parameters(p1.parameters());
        sys.add_equation((p1.expr() - p0.expr()).magnitude() - Expr::constant(5.0));
        sys.add_equation((p1.expr() - p0.expr()).magnitude() - Expr::constant(10.0));

        let before = (p1.x.value(), p1.y.value());
        assert_eq!(sys.solve(), SolveStatus::DidntConverge);
        assert_eq!((p1.x.value(), p1.y.value()), before);
    }

    #[test]
    fn substitution_eliminates_coincident_parameter() {
        let a = Parameter::new("a", 1.0);
        let b = Parameter::new("b", 1.0);
        let mut sys = EquationSystem::new();
        sys.add_parameter(a.clone());
        sys.add_parameter(b.clone());
        sys.add_equation(a.expr() - b.expr());
        sys.update_dirty();
        assert_eq!(sys.current_params().len(), 1);
        b.set_value(42.0);
        sys.solve();
        // back-substitution should have synced whichever was retired
        assert!(a.value() == b.value());
    }
}
