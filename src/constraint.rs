//! Constraint kinds: residual construction, owned parameters, and the
//! construction-time initialization heuristics (t-sweeps, option
//! selection, local satisfaction) from spec section 4.4, grounded on
//! the original constraint class hierarchy.

use std::f64::consts::{FRAC_PI_2, PI};

use crate::entity::{Entity, Line, Point};
use crate::equation_system::{EquationSystem, SolveStatus};
use crate::expr::{abs, atan2, Expr};
use crate::expr_vector::ExprVector;
use crate::param::Parameter;

fn angle2d(d0: &ExprVector, d1: &ExprVector) -> Expr {
    atan2(
        d0.x.clone() * d1.y.clone() - d0.y.clone() * d1.x.clone(),
        d1.x.clone() * d0.x.clone() + d1.y.clone() * d0.y.clone(),
    )
}

/// A scalar owned by a value constraint. `reference = true` marks it as a
/// measured quantity: it is exposed to the global solver as a free
/// parameter (`Constraint::parameters()` includes it). When `false` it is
/// an enforced setpoint instead — fixed from the solver's point of view,
/// only ever adjusted by the constraint's own construction-time
/// `satisfy()` call.
#[derive(Clone)]
pub struct ValueParam {
    pub value: Parameter,
    pub reference: bool,
}

impl ValueParam {
    pub fn new(name: impl Into<String>, v: f64, reference: bool) -> Self {
        ValueParam { value: Parameter::new(name, v), reference }
    }
}

/// Runs a throwaway [`EquationSystem`] over just `params`/`eqs` with
/// `revert_when_not_converged = false` — spec section 4.4's "local
/// satisfaction". Failures are logged and swallowed: not fatal, since
/// downstream global solving may still converge.
fn satisfy(params: Vec<Parameter>, eqs: Vec<Expr>) -> bool {
    let mut sys = EquationSystem::new();
    sys.revert_when_not_converged = false;
    sys.add_parameters(params);
    sys.add_equations(eqs);
    match sys.solve() {
        SolveStatus::Okay => true,
        SolveStatus::DidntConverge => {
            tracing::debug!("constraint local satisfy() did not converge at construction");
            false
        }
    }
}

fn residual_sum(eqs: &[Expr]) -> f64 {
    eqs.iter().map(|e| e.eval().abs()).sum()
}

/// `P` coincides with the point on `E` at some curve parameter `t`.
pub struct PointOn {
    pub point: Point,
    pub entity: Entity,
    pub t: ValueParam,
}

impl PointOn {
    pub fn new(name: impl Into<String>, point: Point, entity: Entity) -> Self {
        let t = ValueParam::new(format!("{}.t", name.into()), 0.0, true);

        let mut best_t = 0.0;
        let mut best_residual = f64::INFINITY;
        for step in 0..=8 {
            t.value.set_value(step as f64 * 0.125);
            let eqs = Self::residuals(&point, &entity, &t.value);
            satisfy(vec![t.value.clone()], eqs.clone());
            let sum = residual_sum(&eqs);
            if sum < best_residual {
                best_residual = sum;
                best_t = t.value.value();
            }
        }
        t.value.set_value(best_t);

        PointOn { point, entity, t }
    }

    fn residuals(point: &Point, entity: &Entity, t: &Parameter) -> Vec<Expr> {
        let on = entity.point_on(&t.expr());
        let p = point.expr();
        vec![on.x - p.x, on.y - p.y]
    }

    pub fn equations(&self) -> Vec<Expr> {
        Self::residuals(&self.point, &self.entity, &self.t.value)
    }

    pub fn parameters(&self) -> Vec<Parameter> {
        vec![self.t.value.clone()]
    }
}

pub struct PointsCoincident {
    pub p0: Point,
    pub p1: Point,
}

impl PointsCoincident {
    pub fn new(p0: Point, p1: Point) -> Self {
        let c = PointsCoincident { p0, p1 };
        let eqs = c.equations();
        satisfy(Vec::new(), eqs);
        c
    }

    pub fn equations(&self) -> Vec<Expr> {
        vec![self.p0.x.expr() - self.p1.x.expr(), self.p0.y.expr() - self.p1.y.expr()]
    }

    pub fn parameters(&self) -> Vec<Parameter> {
        Vec::new()
    }
}

pub struct MidPoint {
    pub p0: Point,
    pub p1: Point,
    pub p2: Point,
    pub v: ValueParam,
}

impl MidPoint {
    pub fn new(name: impl Into<String>, p0: Point, p1: Point, p2: Point) -> Self {
        let v = ValueParam::new(format!("{}.v", name.into()), 2.0, false);
        let c = MidPoint { p0, p1, p2, v };
        let eqs = c.equations();
        satisfy(vec![c.v.value.clone()], eqs);
        c
    }

    pub fn equations(&self) -> Vec<Expr> {
        let v = self.v.value.expr();
        vec![
            self.p0.x.expr() + self.p1.x.expr() - v.clone() * self.p2.x.expr(),
            self.p0.y.expr() + self.p1.y.expr() - v * self.p2.y.expr(),
        ]
    }

    pub fn parameters(&self) -> Vec<Parameter> {
        if self.v.reference { vec![self.v.value.clone()] } else { Vec::new() }
    }
}

pub struct PointCenterTriangle {
    pub p0: Point,
    pub p1: Point,
    pub p2: Point,
    pub p3: Point,
    pub v: ValueParam,
}

impl PointCenterTriangle {
    pub fn new(name: impl Into<String>, p0: Point, p1: Point, p2: Point, p3: Point) -> Self {
        let v = ValueParam::new(format!("{}.v", name.into()), 3.0, false);
        let c = PointCenterTriangle { p0, p1, p2, p3, v };
        let eqs = c.equations();
        satisfy(vec![c.v.value.clone()], eqs);
        c
    }

    pub fn equations(&self) -> Vec<Expr> {
        let v = self.v.value.expr();
        vec![
            self.p0.x.expr() + self.p1.x.expr() + self.p2.x.expr() - v.clone() * self.p3.x.expr(),
            self.p0.y.expr() + self.p1.y.expr() + self.p2.y.expr() - v * self.p3.y.expr(),
        ]
    }

    pub fn parameters(&self) -> Vec<Parameter> {
        if self.v.reference { vec![self.v.value.clone()] } else { Vec::new() }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ParallelOption {
    Coincident,
    Anti,
}

/// Two lines held parallel (`Coincident`) or anti-parallel (`Anti`).
pub struct Parallel {
    pub l0: Line,
    pub l1: Line,
    pub option: ParallelOption,
}

fn line_direction(l: &Line) -> ExprVector {
    l.target.expr() - l.source.expr()
}

impl Parallel {
    pub fn new(l0: Line, l1: Line) -> Self {
        let option = Self::choose_best_option(&l0, &l1);
        Parallel { l0, l1, option }
    }

    fn residual_for(option: ParallelOption, l0: &Line, l1: &Line) -> Expr {
        let alpha = angle2d(&line_direction(l0), &line_direction(l1));
        match option {
            ParallelOption::Coincident => alpha,
            ParallelOption::Anti => abs(alpha) - Expr::constant(PI),
        }
    }

    /// Evaluates both candidate residuals at current values and keeps the
    /// option with smaller `|r|`; never re-evaluated until the constraint
    /// is rebuilt.
    fn choose_best_option(l0: &Line, l1: &Line) -> ParallelOption {
        let co = Self::residual_for(ParallelOption::Coincident, l0, l1).eval().abs();
        let anti = Self::residual_for(ParallelOption::Anti, l0, l1).eval().abs();
        if co <= anti {
            ParallelOption::Coincident
        } else {
            ParallelOption::Anti
        }
    }

    pub fn equations(&self) -> Vec<Expr> {
        vec![Self::residual_for(self.option, &self.l0, &self.l1)]
    }

    pub fn parameters(&self) -> Vec<Parameter> {
        Vec::new()
    }
}

pub struct Orthogonal {
    pub l0: Line,
    pub l1: Line,
}

impl Orthogonal {
    pub fn new(l0: Line, l1: Line) -> Self {
        let c = Orthogonal { l0, l1 };
        let eqs = c.equations();
        satisfy(Vec::new(), eqs);
        c
    }

    pub fn equations(&self) -> Vec<Expr> {
        let d0 = line_direction(&self.l0);
        let d1 = line_direction(&self.l1);
        vec![d0.x * d1.x + d0.y * d1.y]
    }

    pub fn parameters(&self) -> Vec<Parameter> {
        Vec::new()
    }
}

pub struct Length {
    pub entity: Entity,
    pub length: ValueParam,
}

impl Length {
    pub fn new(name: impl Into<String>, entity: Entity, length: f64) -> Self {
        let length = ValueParam::new(format!("{}.length", name.into()), length, false);
        let c = Length { entity, length };
        let eqs = c.equations();
        satisfy(vec![c.length.value.clone()], eqs);
        c
    }

    pub fn equations(&self) -> Vec<Expr> {
        vec![self.entity.length() - self.length.value.expr()]
    }

    pub fn parameters(&self) -> Vec<Parameter> {
        if self.length.reference { vec![self.length.value.clone()] } else { Vec::new() }
    }
}

pub struct Equal {
    pub l0: Entity,
    pub l1: Entity,
    pub k: ValueParam,
}

impl Equal {
    pub fn new(name: impl Into<String>, l0: Entity, l1: Entity) -> Self {
        let k = ValueParam::new(format!("{}.k", name.into()), 1.0, false);
        let c = Equal { l0, l1, k };
        let eqs = c.equations();
        satisfy(vec![c.k.value.clone()], eqs);
        c
    }

    pub fn equations(&self) -> Vec<Expr> {
        vec![self.l0.length() - self.k.value.expr() * self.l1.length()]
    }

    pub fn parameters(&self) -> Vec<Parameter> {
        if self.k.reference { vec![self.k.value.clone()] } else { Vec::new() }
    }
}

pub struct PointsDistance {
    pub p0: Point,
    pub p1: Point,
    pub distance: ValueParam,
}

impl PointsDistance {
    pub fn new(name: impl Into<String>, p0: Point, p1: Point, distance: f64) -> Self {
        let distance = ValueParam::new(format!("{}.distance", name.into()), distance, false);
        let c = PointsDistance { p0, p1, distance };
        let eqs = c.equations();
        satisfy(vec![c.distance.value.clone()], eqs);
        c
    }

    pub fn from_line(name: impl Into<String>, line: &Line, distance: f64) -> Self {
        Self::new(name, line.source.clone(), line.target.clone(), distance)
    }

    pub fn equations(&self) -> Vec<Expr> {
        vec![(self.p1.expr() - self.p0.expr()).magnitude() - self.distance.value.expr()]
    }

    pub fn parameters(&self) -> Vec<Parameter> {
        if self.distance.reference { vec![self.distance.value.clone()] } else { Vec::new() }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Axis {
    Ox,
    Oy,
}

/// Forces two points (or a line's endpoints) onto a common horizontal
/// (`Ox`) or vertical (`Oy`) coordinate.
pub struct HV {
    pub p0: Point,
    pub p1: Point,
    pub axis: Axis,
}

impl HV {
    pub fn new(p0: Point, p1: Point, axis: Axis) -> Self {
        let c = HV { p0, p1, axis };
        let eqs = c.equations();
        satisfy(Vec::new(), eqs);
        c
    }

    pub fn from_line(line: &Line, axis: Axis) -> Self {
        Self::new(line.source.clone(), line.target.clone(), axis)
    }

    pub fn equations(&self) -> Vec<Expr> {
        match self.axis {
            Axis::Ox => vec![self.p0.x.expr() - self.p1.x.expr()],
            Axis::Oy => vec![self.p0.y.expr() - self.p1.y.expr()],
        }
    }

    pub fn parameters(&self) -> Vec<Parameter> {
        Vec::new()
    }
}

/// The angle between two line directions. Per spec section 4.4 and
/// DESIGN NOTES "Angle stabilization": when `|theta| > pi/2` the
/// constructor rewrites theta to its supplementary value and reverses the
/// orientation used for `l1`'s direction, keeping `atan2` away from its
/// `+-pi` branch cut.
pub struct Angle {
    pub l0: Line,
    pub l1: Line,
    pub theta: ValueParam,
    pub supplementary: bool,
    reversed: bool,
}

impl Angle {
    pub fn new(name: impl Into<String>, l0: Line, l1: Line, requested: f64) -> Self {
        let (theta_value, supplementary, reversed) = if requested.abs() > FRAC_PI_2 {
            (-(requested.signum() * PI - requested), true, true)
        } else {
            (requested, false, false)
        };
        let theta = ValueParam::new(format!("{}.theta", name.into()), theta_value, false);
        let c = Angle { l0, l1, theta, supplementary, reversed };
        let eqs = c.equations();
        satisfy(vec![c.theta.value.clone()], eqs);
        c
    }

    fn l1_direction(&self) -> ExprVector {
        let d = line_direction(&self.l1);
        if self.reversed {
            ExprVector::new(-d.x, -d.y, -d.z)
        } else {
            d
        }
    }

    pub fn equations(&self) -> Vec<Expr> {
        let alpha = angle2d(&line_direction(&self.l0), &self.l1_direction());
        vec![alpha - self.theta.value.expr()]
    }

    pub fn parameters(&self) -> Vec<Parameter> {
        if self.theta.reference { vec![self.theta.value.clone()] } else { Vec::new() }
    }
}

pub struct Diameter {
    pub entity: Entity,
    pub diameter: ValueParam,
}

impl Diameter {
    pub fn new(name: impl Into<String>, entity: Entity, diameter: f64) -> Self {
        let diameter = ValueParam::new(format!("{}.diameter", name.into()), diameter, false);
        let c = Diameter { entity, diameter };
        let eqs = c.equations();
        satisfy(vec![c.diameter.value.clone()], eqs);
        c
    }

    pub fn equations(&self) -> Vec<Expr> {
        vec![Expr::constant(2.0) * self.entity.radius() - self.diameter.value.expr()]
    }

    pub fn parameters(&self) -> Vec<Parameter> {
        if self.diameter.reference { vec![self.diameter.value.clone()] } else { Vec::new() }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum TangentOption {
    Coincident,
    Anti,
}

/// A circle tangent to a line. Owns curve parameters `t0` (on the circle)
/// and `t1` (on the line). Per DESIGN NOTES open question (i), the
/// coincidence-detection hook that would elide `t0`/`t1` when a `PointOn`
/// is already present between the two entities is designed into the
/// residual shape below but is never consulted — it stays inert in this
/// revision.
pub struct Tangent {
    pub circle: Entity,
    pub line: Entity,
    pub t0: ValueParam,
    pub t1: ValueParam,
    pub option: TangentOption,
}

impl Tangent {
    pub fn new(name: impl Into<String>, circle: Entity, line: Entity) -> Self {
        let name = name.into();
        let t0 = ValueParam::new(format!("{name}.t0"), 0.0, true);
        let t1 = ValueParam::new(format!("{name}.t1"), 0.0, true);
        let option = Self::choose_best_option(&circle, &line, &t0.value, &t1.value);
        Tangent { circle, line, t0, t1, option }
    }

    fn angle_residual(option: TangentOption, circle: &Entity, line: &Entity, t0: &Parameter, t1: &Parameter) -> Expr {
        let alpha = angle2d(&circle.tangent_at(&t0.expr()), &line.tangent_at(&t1.expr()));
        match option {
            TangentOption::Coincident => alpha,
            TangentOption::Anti => abs(alpha) - Expr::constant(PI),
        }
    }

    fn choose_best_option(circle: &Entity, line: &Entity, t0: &Parameter, t1: &Parameter) -> TangentOption {
        let co = Self::angle_residual(TangentOption::Coincident, circle, line, t0, t1).eval().abs();
        let anti = Self::angle_residual(TangentOption::Anti, circle, line, t0, t1).eval().abs();
        if co <= anti {
            TangentOption::Coincident
        } else {
            TangentOption::Anti
        }
    }

    pub fn equations(&self) -> Vec<Expr> {
        let angle = Self::angle_residual(self.option, &self.circle, &self.line, &self.t0.value, &self.t1.value);
        let coincidence = self.line.point_on(&self.t1.value.expr()) - self.circle.point_on(&self.t0.value.expr());
        vec![angle, coincidence.x, coincidence.y]
    }

    pub fn parameters(&self) -> Vec<Parameter> {
        vec![self.t0.value.clone(), self.t1.value.clone()]
    }
}

/// A tagged union over every constraint kind, dispatching `equations()`
/// and `parameters()` the way [`Entity`] dispatches its capability set.
pub enum Constraint {
    PointOn(PointOn),
    PointsCoincident(PointsCoincident),
    MidPoint(MidPoint),
    PointCenterTriangle(PointCenterTriangle),
    Parallel(Parallel),
    Orthogonal(Orthogonal),
    Length(Length),
    Equal(Equal),
    PointsDistance(PointsDistance),
    HV(HV),
    Angle(Angle),
    Diameter(Diameter),
    Tangent(Tangent),
}

impl Constraint {
    pub fn equations(&self) -> Vec<Expr> {
        match self {
            Constraint::PointOn(c) => c.equations(),
            Constraint::PointsCoincident(c) => c.equations(),
            Constraint::MidPoint(c) => c.equations(),
            Constraint::PointCenterTriangle(c) => c.equations(),
            Constraint::Parallel(c) => c.equations(),
            Constraint::Orthogonal(c) => c.equations(),
            Constraint::Length(c) => c.equations(),
            Constraint::Equal(c) => c.equations(),
            Constraint::PointsDistance(c) => c.equations(),
            Constraint::HV(c) => c.equations(),
            Constraint::Angle(c) => c.equations(),
            Constraint::Diameter(c) => c.equations(),
            Constraint::Tangent(c) => c.equations(),
        }
    }

    pub fn parameters(&self) -> Vec<Parameter> {
        match self {
            Constraint::PointOn(c) => c.parameters(),
            Constraint::PointsCoincident(c) => c.parameters(),
            Constraint::MidPoint(c) => c.parameters(),
            Constraint::PointCenterTriangle(c) => c.parameters(),
            Constraint::Parallel(c) => c.parameters(),
            Constraint::Orthogonal(c) => c.parameters(),
            Constraint::Length(c) => c.parameters(),
            Constraint::Equal(c) => c.parameters(),
            Constraint::PointsDistance(c) => c.parameters(),
            Constraint::HV(c) => c.parameters(),
            Constraint::Angle(c) => c.parameters(),
            Constraint::Diameter(c) => c.parameters(),
            Constraint::Tangent(c) => c.parameters(),
        }
    }
}

macro_rules! impl_from_constraint {
    ($variant:ident, $ty:ty) => {
        impl From<$ty> for Constraint {
            fn from(c: $ty) -> Self {
                Constraint::$variant(c)
            }
        }
    };
}

impl_from_constraint!(PointOn, PointOn);
impl_from_constraint!(PointsCoincident, PointsCoincident);
impl_from_constraint!(MidPoint, MidPoint);
impl_from_constraint!(PointCenterTriangle, PointCenterTriangle);
impl_from_constraint!(Parallel, Parallel);
impl_from_constraint!(Orthogonal, Orthogonal);
impl_from_constraint!(Length, Length);
impl_from_constraint!(Equal, Equal);
impl_from_constraint!(PointsDistance, PointsDistance);
impl_from_constraint!(HV, HV);
impl_from_constraint!(Angle, Angle);
impl_from_constraint!(Diameter, Diameter);
impl_from_constraint!(Tangent, Tangent);

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn hv_horizontal_forces_equal_y() {
        let p0 = Point::new_xy("p0", 0.0, 0.0);
        let p1 = Point::new_xy("p1", 1.0, 1.0);
        let hv = HV::new(p0.clone(), p1.clone(), Axis::Oy);
        let mut sys = EquationSystem::new();
        sys.add_parameters(p0.parameters());
        sys.add_parameters(p1.parameters());
        sys.add_equations(hv.equations());
        assert_eq!(sys.solve(), SolveStatus::Okay);
        assert_relative_eq!(p0.y.value(), p1.y.value(), epsilon = 1e-9);
    }

    #[test]
    fn parallel_picks_coincident_option_for_aligned_lines() {
        let l0 = Line::new(Point::new_xy("a", 0.0, 0.0), Point::new_xy("b", 10.0, 0.0));
        let l1 = Line::new(Point::new_xy("c", 0.0, 5.0), Point::new_xy("d", 7.0, 5.1));
        let parallel = Parallel::new(l0, l1);
        assert_eq!(parallel.option, ParallelOption::Coincident);
    }

    #[test]
    fn angle_flips_supplementary_for_obtuse_request() {
        let l0 = Line::new(Point::new_xy("a", 0.0, 0.0), Point::new_xy("b", 1.0, 0.0));
        let l1 = Line::new(Point::new_xy("c", 0.0, 0.0), Point::new_xy("d", -1.0, 1.0));
        let angle = Angle::new("ang", l0, l1, FRAC_PI_2 + 0.3);
        assert!(angle.supplementary);
        assert!(angle.theta.value.value().abs() <= FRAC_PI_2 + 1e-9);
    }

    #[test]
    fn tangent_coincidence_hook_is_inert_but_present() {
        let circle = Entity::Circle(crate::entity::Circle::new(Point::new_xy("c", 0.0, 0.0), Parameter::new("r", 2.0)));
        let line = Entity::Line(Line::new(Point::new_xy("s", -5.0, 2.0), Point::new_xy("t", 5.0, 2.0)));
        let tangent = Tangent::new("tan", circle, line);
        assert_eq!(tangent.equations().len(), 3);
    }

    #[test]
    fn point_on_line_sweep_converges_near_zero_residual() {
        let line = Entity::Line(Line::new(Point::new_xy("s", 0.0, 0.0), Point::new_xy("t", 10.0, 0.0)));
        let p = Point::new_xy("p", 4.0, 0.3);
        let on = PointOn::new("on", p, line);
        let residual = residual_sum(&on.equations());
        assert!(residual < 1e-6, "residual = {residual}");
    }
}
