//! A 2D geometric constraint solver for parametric sketching.
//!
//! Build a graph of symbolic [`expr::Expr`] values over mutable
//! [`param::Parameter`] unknowns, attach [`entity::Entity`] geometry and
//! [`constraint::Constraint`] residuals to a [`sketch::Sketch`], and call
//! [`sketch::Sketch::update`] to drive the geometry onto the constrained
//! manifold by damped Gauss-Newton (or, optionally, L1 minimization via a
//! linear program).

pub mod constraint;
pub mod entity;
pub mod equation_system;
pub mod expr;
pub mod expr_vector;
pub mod gaussian;
pub mod identity_set;
pub mod lp;
pub mod param;
pub mod sketch;

pub use constraint::Constraint;
pub use entity::{Circle, Entity, Line, Point};
pub use equation_system::{EquationSystem, EquationSystemError, SolveStatus};
pub use expr::{expr, Expr};
pub use expr_vector::ExprVector;
pub use param::Parameter;
pub use sketch::{Sketch, SketchError};

pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
