//! Geometric entities: points, lines and circles, each owning the
//! parameters that define it and exposing the capability set
//! {parameters, point_on, tangent_at, length, radius}.
//!
//! Not every entity implements every capability. Calling an inapplicable
//! one (e.g. `radius()` on a `Point`) is a programmer error in the
//! constraint layer and panics with a clear diagnostic, per spec.md §4.3
//! and §7(d).

use std::f64::consts::TAU;

use crate::expr::{cos, sin, Expr};
use crate::expr_vector::ExprVector;
use crate::param::Parameter;

/// A point, owning three parameters (x, y, z).
#[derive(Clone)]
pub struct Point {
    pub x: Parameter,
    pub y: Parameter,
    pub z: Parameter,
}

impl Point {
    pub fn new(x: Parameter, y: Parameter, z: Parameter) -> Self {
        Point { x, y, z }
    }

    /// Convenience constructor for 2D callers: z is a fresh fixed-at-zero parameter.
    pub fn new_xy(name: impl AsRef<str>, px: f64, py: f64) -> Self {
        let n = name.as_ref();
        Point::new(
            Parameter::new(format!("{n}.x"), px),
            Parameter::new(format!("{n}.y"), py),
            Parameter::new(format!("{n}.z"), 0.0),
        )
    }

    pub fn expr(&self) -> ExprVector {
        ExprVector::new(self.x.expr(), self.y.expr(), self.z.expr())
    }

    pub fn parameters(&self) -> Vec<Parameter> {
        vec![self.x.clone(), self.y.clone(), self.z.clone()]
    }

    /// Residuals `Drag(p_i) - target_i` for each coordinate, to be added to
    /// the sketch as free equations.
    pub fn drag_to(&self, target: &ExprVector) -> ExprVector {
        ExprVector::new(
            Expr::drag(&self.x) - target.x.clone(),
            Expr::drag(&self.y) - target.y.clone(),
            Expr::drag(&self.z) - target.z.clone(),
        )
    }
}

/// A line segment between two owned points.
#[derive(Clone)]
pub struct Line {
    pub source: Point,
    pub target: Point,
}

impl Line {
    pub fn new(source: Point, target: Point) -> Self {
        Line { source, target }
    }
}

/// A circle with an owned center point and radius parameter.
#[derive(Clone)]
pub struct Circle {
    pub center: Point,
    pub radius: Parameter,
}

impl Circle {
    pub fn new(center: Point, radius: Parameter) -> Self {
        Circle { center, radius }
    }

    pub fn drag_center_to(&self, target: &ExprVector) -> ExprVector {
        self.center.drag_to(target)
    }

    pub fn drag_radius_to(&self, target: &Expr) -> Expr {
        Expr::drag(&self.radius) - target.clone()
    }
}

/// A geometric entity: one of [`Point`], [`Line`] or [`Circle`].
#[derive(Clone)]
pub enum Entity {
    Point(Point),
    Line(Line),
    Circle(Circle),
}

impl Entity {
    pub fn as_point(&self) -> &Point {
        match self {
            Entity::Point(p) => p,
            _ => panic!("entity is not a Point"),
        }
    }

    pub fn as_line(&self) -> &Line {
        match self {
            Entity::Line(l) => l,
            _ => panic!("entity is not a Line"),
        }
    }

    pub fn as_circle(&self) -> &Circle {
        match self {
            Entity::Circle(c) => c,
            _ => panic!("entity is not a Circle"),
        }
    }

    /// The parameters this entity owns.
    pub fn parameters(&self) -> Vec<Parameter> {
        match self {
            Entity::Point(p) => p.parameters(),
            Entity::Line(l) => {
                let mut v = l.source.parameters();
                v.extend(l.target.parameters());
                v
            }
            Entity::Circle(c) => {
                let mut v = c.center.parameters();
                v.push(c.radius.clone());
                v
            }
        }
    }

    /// Evaluates the entity's position at curve parameter `t`.
    ///
    /// - Point: ignores `t`, returns its own position.
    /// - Line: `source + t*(target - source)`.
    /// - Circle: `center + r*(cos 2*pi*t, sin 2*pi*t, 0)`.
    pub fn point_on(&self, t: &Expr) -> ExprVector {
        match self {
            Entity::Point(p) => p.expr(),
            Entity::Line(l) => {
                let s = l.source.expr();
                let d = l.target.expr() - s.clone();
                ExprVector::new(
                    s.x + t.clone() * d.x,
                    s.y + t.clone() * d.y,
                    s.z + t.clone() * d.z,
                )
            }
            Entity::Circle(c) => {
                let angle = Expr::constant(TAU) * t.clone();
                let center = c.center.expr();
                ExprVector::new(
                    center.x + c.radius.expr() * cos(angle.clone()),
                    center.y + c.radius.expr() * sin(angle),
                    center.z,
                )
            }
        }
    }

    /// The tangent direction at curve parameter `t` (derivative of
    /// `point_on` with respect to `t`).
    ///
    /// Programmer error for Point (tangent is undefined for a fixed point).
    pub fn tangent_at(&self, t: &Expr) -> ExprVector {
        match self {
            Entity::Point(_) => panic!("tangent_at() is not defined for Entity::Point"),
            Entity::Line(l) => {
                let s = l.source.expr();
                let tgt = l.target.expr();
                tgt - s
            }
            Entity::Circle(c) => {
                let angle = Expr::constant(TAU) * t.clone();
                let r = c.radius.expr();
                ExprVector::new(
                    -(r.clone() * Expr::constant(TAU) * sin(angle.clone())),
                    r * Expr::constant(TAU) * cos(angle),
                    Expr::constant(0.0),
                )
            }
        }
    }

    /// The entity's length: `‖target - source‖` for a Line, `2*pi*r` for a
    /// Circle's circumference.
    ///
    /// Programmer error for Point.
    pub fn length(&self) -> Expr {
        match self {
            Entity::Point(_) => panic!("length() is not defined for Entity::Point"),
            Entity::Line(l) => (l.target.expr() - l.source.expr()).magnitude(),
            Entity::Circle(c) => Expr::constant(TAU) * c.radius.expr(),
        }
    }

    /// The entity's radius parameter expression.
    ///
    /// Programmer error for Point and Line.
    pub fn radius(&self) -> Expr {
        match self {
            Entity::Circle(c) => c.radius.expr(),
            Entity::Point(_) => panic!("radius() is not defined for Entity::Point"),
            Entity::Line(_) => panic!("radius() is not defined for Entity::Line"),
        }
    }

    /// Drag residuals pulling this entity's defining point(s) toward
    /// `target`. Defined for Point and Circle (dragging the center); a
    /// programmer error for Line (drag its endpoints individually instead).
    pub fn drag_to(&self, target: &ExprVector) -> Vec<Expr> {
        match self {
            Entity::Point(p) => {
                let r = p.drag_to(target);
                vec![r.x, r.y, r.z]
            }
            Entity::Circle(c) => {
                let r = c.drag_center_to(target);
                vec![r.x, r.y, r.z]
            }
            Entity::Line(_) => panic!("drag_to() is not defined for Entity::Line; drag its endpoints"),
        }
    }
}

impl From<Point> for Entity {
    fn from(p: Point) -> Self {
        Entity::Point(p)
    }
}

impl From<Line> for Entity {
    fn from(l: Line) -> Self {
        Entity::Line(l)
    }
}

impl From<Circle> for Entity {
    fn from(c: Circle) -> Self {
        Entity::Circle(c)
    }
}
