//! End-to-end scenarios from spec section 8: full `Sketch`-level behavior
//! rather than unit-level checks on individual modules.

use approx::assert_relative_eq;
use sketch_core::constraint::{Axis, Constraint, Length, Parallel, PointsCoincident, PointsDistance, HV};
use sketch_core::entity::{Entity, Line, Point};
use sketch_core::equation_system::SolveStatus;
use sketch_core::expr::Expr;
use sketch_core::expr_vector::ExprVector;
use sketch_core::sketch::Sketch;

#[test]
fn single_distance_preserves_direction() {
    let p0 = Point::new_xy("p0", 0.0, 0.0);
    let p1 = Point::new_xy("p1", 3.0, 4.0);
    let mut sketch = Sketch::new();
    sketch.add_entity(Entity::Point(p0.clone()));
    sketch.add_entity(Entity::Point(p1.clone()));
    sketch.add_constraint(Constraint::PointsDistance(PointsDistance::new("d", p0.clone(), p1.clone(), 10.0)));

    let anchor = p0.drag_to(&ExprVector::planar(Expr::constant(0.0), Expr::constant(0.0)));
    sketch.add_expression(anchor.x);
    sketch.add_expression(anchor.y);

    sketch.update();

    assert_relative_eq!(p0.x.value(), 0.0, epsilon = 1e-6);
    assert_relative_eq!(p0.y.value(), 0.0, epsilon = 1e-6);
    assert_relative_eq!(p1.x.value(), 6.0, epsilon = 1e-6);
    assert_relative_eq!(p1.y.value(), 8.0, epsilon = 1e-6);
}

#[test]
fn horizontal_line_equalizes_y() {
    let line = Line::new(Point::new_xy("s", 0.0, 0.0), Point::new_xy("t", 1.0, 1.0));
    let mut sketch = Sketch::new();
    let source = line.source.clone();
    let target = line.target.clone();
    sketch.add_entity(Entity::Line(line.clone()));
    sketch.add_constraint(Constraint::HV(HV::from_line(&line, Axis::Oy)));

    sketch.update();

    assert_relative_eq!(source.y.value(), target.y.value(), epsilon = 1e-9);
}

#[test]
fn parallel_and_length_are_both_satisfied() {
    let l0 = Line::new(Point::new_xy("a", 0.0, 0.0), Point::new_xy("b", 10.0, 0.0));
    let l1 = Line::new(Point::new_xy("c", 0.0, 5.0), Point::new_xy("d", 7.0, 6.0));
    let mut sketch = Sketch::new();
    sketch.add_entity(Entity::Line(l0.clone()));
    sketch.add_entity(Entity::Line(l1.clone()));
    sketch.add_constraint(Constraint::Parallel(Parallel::new(l0.clone(), l1.clone())));
    sketch.add_constraint(Constraint::Length(Length::new("len", Entity::Line(l1.clone()), 10.0)));

    // Anchor l1's source so the system isn't left floating.
    let anchor = l1.source.drag_to(&ExprVector::planar(Expr::constant(0.0), Expr::constant(5.0)));
    sketch.add_expression(anchor.x);
    sketch.add_expression(anchor.y);

    sketch.update();

    let d0 = (l0.target.x.value() - l0.source.x.value(), l0.target.y.value() - l0.source.y.value());
    let d1 = (l1.target.x.value() - l1.source.x.value(), l1.target.y.value() - l1.source.y.value());
    let cross = d0.0 * d1.1 - d0.1 * d1.0;
    assert_relative_eq!(cross, 0.0, epsilon = 1e-6);

    let length = (d1.0 * d1.0 + d1.1 * d1.1).sqrt();
    assert_relative_eq!(length, 10.0, epsilon = 1e-6);
}

#[test]
fn drag_stabilizes_onto_constraint_manifold() {
    let p0 = Point::new_xy("p0", 0.0, 0.0);
    let p1 = Point::new_xy("p1", 3.0, 4.0);
    let mut sketch = Sketch::new();
    sketch.add_entity(Entity::Point(p0.clone()));
    sketch.add_entity(Entity::Point(p1.clone()));
    let distance = PointsDistance::new("d", p0.clone(), p1.clone(), 10.0);
    let residual = distance.equations()[0].clone();
    sketch.add_constraint(Constraint::PointsDistance(distance));

    let anchor = p0.drag_to(&ExprVector::planar(Expr::constant(0.0), Expr::constant(0.0)));
    sketch.add_expression(anchor.x);
    sketch.add_expression(anchor.y);
    sketch.update();

    let drag_target = p1.drag_to(&ExprVector::planar(Expr::constant(0.0), Expr::constant(10.0)));
    sketch.add_expression(drag_target.x);
    sketch.add_expression(drag_target.y);
    sketch.update();

    assert_relative_eq!(p0.x.value(), 0.0, epsilon = 1e-6);
    assert_relative_eq!(p0.y.value(), 0.0, epsilon = 1e-6);
    assert_relative_eq!(p1.x.value(), 0.0, epsilon = 1e-6);
    assert_relative_eq!(p1.y.value(), 10.0, epsilon = 1e-6);
    assert!(residual.eval().abs() < 1e-9);
}

#[test]
fn over_constrained_pair_reverts_on_failure() {
    let p0 = Point::new_xy("p0", 0.0, 0.0);
    let p1 = Point::new_xy("p1", 3.0, 4.0);
    let before = (p1.x.value(), p1.y.value());

    let mut sketch = Sketch::new();
    sketch.add_entity(Entity::Point(p0.clone()));
    sketch.add_entity(Entity::Point(p1.clone()));
    sketch.add_constraint(Constraint::PointsDistance(PointsDistance::new("d0", p0.clone(), p1.clone(), 5.0)));
    sketch.add_constraint(Constraint::PointsDistance(PointsDistance::new("d1", p0.clone(), p1.clone(), 10.0)));

    sketch.update();

    assert_eq!((p1.x.value(), p1.y.value()), before);
}

#[test]
fn coincident_points_reduce_via_substitution() {
    let p0 = Point::new_xy("p0", 2.0, 3.0);
    let p1 = Point::new_xy("p1", 2.0, 3.0);

    let mut system = sketch_core::equation_system::EquationSystem::new();
    system.add_parameters(p0.parameters());
    system.add_parameters(p1.parameters());
    let coincident = PointsCoincident::new(p0.clone(), p1.clone());
    system.add_equations(coincident.equations());

    system.update_dirty();

    let has_p0_x = system.current_params().iter().any(|p| *p == p0.x);
    let has_p1_x = system.current_params().iter().any(|p| *p == p1.x);
    assert_ne!(has_p0_x, has_p1_x, "exactly one of {{p0.x, p1.x}} should remain free");

    p1.x.set_value(42.0);
    assert_eq!(system.solve(), SolveStatus::Okay);
    assert_eq!(p0.x.value(), p1.x.value());
}
