//! The top-level aggregator: identity sets of entities, constraints and
//! free expressions, dirty-flag-driven reassembly, and the suppress-solve
//! latch, grounded on the original `Sketch` class's `update()`.

use std::rc::Rc;

use thiserror::Error;

use crate::constraint::Constraint;
use crate::entity::Entity;
use crate::equation_system::{EquationSystem, SolveStatus};
use crate::expr::Expr;
use crate::expr_vector::ExprVector;
use crate::identity_set::IdentitySet;

#[derive(Debug, Error)]
pub enum SketchError {
    #[error("entity not found in sketch")]
    EntityNotFound,
    #[error("constraint not found in sketch")]
    ConstraintNotFound,
    #[error("expression not found in sketch")]
    ExpressionNotFound,
}

/// Aggregates entities, constraints and free-standing equations into a
/// single [`EquationSystem`] and orchestrates `update()`.
pub struct Sketch {
    entities: IdentitySet<Entity>,
    constraints: IdentitySet<Constraint>,
    free_expressions: IdentitySet<Expr>,
    system: EquationSystem,
    /// Entities, constraints or free expressions changed since the last
    /// `update()`; the equation system must be cleared and re-assembled.
    topology_dirty: bool,
    /// Set once `solve()` returns `DidntConverge`; further non-drag
    /// updates are skipped until the user mutates the sketch again.
    suppress_solve: bool,
}

impl Sketch {
    pub fn new() -> Self {
        Sketch {
            entities: IdentitySet::new(),
            constraints: IdentitySet::new(),
            free_expressions: IdentitySet::new(),
            system: EquationSystem::new(),
            topology_dirty: true,
            suppress_solve: false,
        }
    }

    pub fn add_entity(&mut self, entity: Entity) -> Rc<Entity> {
        let handle = Rc::new(entity);
        self.entities.insert(handle.clone());
        self.topology_dirty = true;
        self.suppress_solve = false;
        handle
    }

    pub fn remove_entity(&mut self, entity: &Rc<Entity>) -> Result<(), SketchError> {
        if self.entities.remove(entity) {
            self.topology_dirty = true;
            self.suppress_solve = false;
            Ok(())
        } else {
            Err(SketchError::EntityNotFound)
        }
    }

    pub fn add_constraint(&mut self, constraint: Constraint) -> Rc<Constraint> {
        let handle = Rc::new(constraint);
        self.constraints.insert(handle.clone());
        self.topology_dirty = true;
        self.suppress_solve = false;
        handle
    }

    pub fn remove_constraint(&mut self, constraint: &Rc<Constraint>) -> Result<(), SketchError> {
        if self.constraints.remove(constraint) {
            self.topology_dirty = true;
            self.suppress_solve = false;
            Ok(())
        } else {
            Err(SketchError::ConstraintNotFound)
        }
    }

    pub fn add_expression(&mut self, expr: Expr) -> Rc<Expr> {
        let handle = Rc::new(expr);
        self.free_expressions.insert(handle.clone());
        self.topology_dirty = true;
        self.suppress_solve = false;
        handle
    }

    pub fn remove_expression(&mut self, expr: &Rc<Expr>) -> Result<(), SketchError> {
        if self.free_expressions.remove(expr) {
            self.topology_dirty = true;
            self.suppress_solve = false;
            Ok(())
        } else {
            Err(SketchError::ExpressionNotFound)
        }
    }

    /// Adds each component of `v` as a separate free expression, returning
    /// the three handles in `(x, y, z)` order for later removal.
    pub fn add_expression_vector(&mut self, v: ExprVector) -> (Rc<Expr>, Rc<Expr>, Rc<Expr>) {
        (self.add_expression(v.x), self.add_expression(v.y), self.add_expression(v.z))
    }

    pub fn remove_expression_vector(&mut self, v: (Rc<Expr>, Rc<Expr>, Rc<Expr>)) -> Result<(), SketchError> {
        self.remove_expression(&v.0)?;
        self.remove_expression(&v.1)?;
        self.remove_expression(&v.2)?;
        Ok(())
    }

    pub fn is_using_linear_program(&self) -> bool {
        self.system.use_linear_program
    }

    pub fn use_linear_program(&mut self, enabled: bool) {
        self.system.use_linear_program = enabled;
    }

    pub fn max_steps(&mut self) -> &mut usize {
        &mut self.system.max_steps
    }

    pub fn drag_steps(&mut self) -> &mut usize {
        &mut self.system.drag_steps
    }

    pub fn revert_when_not_converged(&mut self) -> &mut bool {
        &mut self.system.revert_when_not_converged
    }

    fn reassemble(&mut self) {
        self.system.clear();
        for entity in self.entities.iter() {
            self.system.add_parameters(entity.parameters());
        }
        for constraint in self.constraints.iter() {
            self.system.add_parameters(constraint.parameters());
            self.system.add_equations(constraint.equations());
        }
        for expr in self.free_expressions.iter() {
            self.system.add_equation((**expr).clone());
        }
    }

    /// Reassembles the equation system if topology changed, solves unless
    /// suppressed (or a drag is active), and returns the iteration count.
    pub fn update(&mut self) -> usize {
        if self.topology_dirty {
            self.reassemble();
            self.topology_dirty = false;
        }

        if !self.suppress_solve || self.system.has_dragged() {
            match self.system.solve() {
                SolveStatus::Okay => {}
                SolveStatus::DidntConverge => {
                    self.suppress_solve = true;
                }
            }
        }

        self.system.counted_steps()
    }
}

impl Default for Sketch {
    fn default() -> Self {
        Self::new()
    }
}
