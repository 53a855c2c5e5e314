//! Symbolic scalar expression graph: construction with peephole
//! simplification, evaluation, symbolic differentiation and substitution.

use std::fmt;
use std::ops::{Add, Div, Mul, Neg, Sub};
use std::rc::Rc;

use crate::param::Parameter;

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Sin,
    Cos,
    Tan,
    Asin,
    Acos,
    Atan,
    Sqrt,
    Sqr,
    Abs,
    Sign,
    Exp,
    Ln,
}

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Atan2,
    Pow,
}

#[derive(Debug)]
enum ExprNode {
    Constant(f64),
    ParamRef(Parameter),
    Drag(Parameter),
    Unary(UnaryOp, Expr),
    Binary(BinaryOp, Expr, Expr),
}

/// A node in the symbolic scalar expression DAG.
///
/// `Expr` is a cheap-to-clone reference to an immutable node. Combinator
/// constructors (`+`, `sin`, ...) fold constants and apply peephole
/// simplifications eagerly, so the graph never grows larger than it needs
/// to for the given inputs.
#[derive(Clone)]
pub struct Expr(Rc<ExprNode>);

impl Expr {
    /// A constant leaf.
    pub fn constant(v: f64) -> Expr {
        Expr(Rc::new(ExprNode::Constant(v)))
    }

    pub(crate) fn param_ref(p: Parameter) -> Expr {
        Expr(Rc::new(ExprNode::ParamRef(p)))
    }

    /// A drag residual leaf: evaluates identically to `ParamRef(p)` but is
    /// tagged so [`Expr::is_drag`] reports true for any expression
    /// containing it.
    pub fn drag(p: &Parameter) -> Expr {
        Expr(Rc::new(ExprNode::Drag(p.clone())))
    }

    /// True iff `self` and `other` are the same allocation (not merely
    /// structurally equal).
    pub fn ptr_eq(&self, other: &Expr) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    fn as_constant(&self) -> Option<f64> {
        match &*self.0 {
            ExprNode::Constant(c) => Some(*c),
            _ => None,
        }
    }

    fn unary(op: UnaryOp, child: Expr) -> Expr {
        if let Some(c) = child.as_constant() {
            return Expr::constant(eval_unary(op, c));
        }
        if op == UnaryOp::Neg {
            if let ExprNode::Unary(UnaryOp::Neg, inner) = &*child.0 {
                return inner.clone();
            }
        }
        Expr(Rc::new(ExprNode::Unary(op, child)))
    }

    fn binary(op: BinaryOp, l: Expr, r: Expr) -> Expr {
        if let (Some(a), Some(b)) = (l.as_constant(), r.as_constant()) {
            return Expr::constant(eval_binary(op, a, b));
        }
        match op {
            BinaryOp::Add => {
                if l.as_constant() == Some(0.0) {
                    return r;
                }
                if r.as_constant() == Some(0.0) {
                    return l;
                }
            }
            BinaryOp::Sub => {
                if r.as_constant() == Some(0.0) {
                    return l;
                }
                if l.as_constant() == Some(0.0) {
                    return Expr::unary(UnaryOp::Neg, r);
                }
            }
            BinaryOp::Mul => {
                if l.as_constant() == Some(0.0) || r.as_constant() == Some(0.0) {
                    return Expr::constant(0.0);
                }
                if l.as_constant() == Some(1.0) {
                    return r;
                }
                if r.as_constant() == Some(1.0) {
                    return l;
                }
            }
            BinaryOp::Div => {
                if r.as_constant() == Some(1.0) {
                    return l;
                }
            }
            _ => {}
        }
        Expr(Rc::new(ExprNode::Binary(op, l, r)))
    }

    /// Evaluates this expression at the current parameter values.
    ///
    /// `ln`/`sqrt` of a negative, division by zero, and out-of-range
    /// `asin`/`acos` are soft errors: they produce IEEE `NaN`/`±inf`
    /// rather than panicking or returning a `Result`; the outer Newton
    /// iteration rejects such a step via its convergence test.
    pub fn eval(&self) -> f64 {
        match &*self.0 {
            ExprNode::Constant(c) => *c,
            ExprNode::ParamRef(p) | ExprNode::Drag(p) => p.value(),
            ExprNode::Unary(op, c) => eval_unary(*op, c.eval()),
            ExprNode::Binary(op, l, r) => eval_binary(*op, l.eval(), r.eval()),
        }
    }

    /// Symbolic derivative with respect to `p`.
    pub fn derivative(&self, p: &Parameter) -> Expr {
        match &*self.0 {
            ExprNode::Constant(_) => Expr::constant(0.0),
            ExprNode::ParamRef(q) | ExprNode::Drag(q) => {
                Expr::constant(if q == p { 1.0 } else { 0.0 })
            }
            ExprNode::Unary(op, c) => {
                let dc = c.derivative(p);
                derive_unary(*op, c, &dc)
            }
            ExprNode::Binary(op, l, r) => {
                let dl = l.derivative(p);
                let dr = r.derivative(p);
                derive_binary(*op, l, r, &dl, &dr)
            }
        }
    }

    /// Returns an expression structurally identical to `self` except every
    /// leaf referencing parameter `b` is replaced by a leaf referencing
    /// `a`. `Drag` leaves are substituted the same way, keeping their drag
    /// tag.
    pub fn substitute(&self, b: &Parameter, a: &Parameter) -> Expr {
        match &*self.0 {
            ExprNode::Constant(_) => self.clone(),
            ExprNode::ParamRef(q) => {
                if q == b {
                    a.expr()
                } else {
                    self.clone()
                }
            }
            ExprNode::Drag(q) => {
                if q == b {
                    Expr::drag(a)
                } else {
                    self.clone()
                }
            }
            ExprNode::Unary(op, c) => Expr::unary(*op, c.substitute(b, a)),
            ExprNode::Binary(op, l, r) => {
                Expr::binary(*op, l.substitute(b, a), r.substitute(b, a))
            }
        }
    }

    /// True iff any leaf reachable from this expression is a [`Drag`](ExprNode::Drag) node.
    pub fn is_drag(&self) -> bool {
        match &*self.0 {
            ExprNode::Constant(_) | ExprNode::ParamRef(_) => false,
            ExprNode::Drag(_) => true,
            ExprNode::Unary(_, c) => c.is_drag(),
            ExprNode::Binary(_, l, r) => l.is_drag() || r.is_drag(),
        }
    }

    /// True iff this expression is structurally `ParamRef(a) - ParamRef(b)`
    /// or one of its commutative/negated equivalents
    /// (`b - a`, `a + (-b)`, `(-b) + a`).
    pub fn is_substitution_form(&self) -> bool {
        self.substitution_params().is_some()
    }

    /// The two parameters of a substitution-form expression, if it is one.
    pub fn substitution_params(&self) -> Option<(Parameter, Parameter)> {
        fn param_of(e: &Expr) -> Option<Parameter> {
            match &*e.0 {
                ExprNode::ParamRef(p) => Some(p.clone()),
                _ => None,
            }
        }
        fn neg_param_of(e: &Expr) -> Option<Parameter> {
            match &*e.0 {
                ExprNode::Unary(UnaryOp::Neg, inner) => param_of(inner),
                _ => None,
            }
        }

        match &*self.0 {
            ExprNode::Binary(BinaryOp::Sub, l, r) => {
                if let (Some(a), Some(b)) = (param_of(l), param_of(r)) {
                    return Some((a, b));
                }
                None
            }
            ExprNode::Binary(BinaryOp::Add, l, r) => {
                if let (Some(a), Some(b)) = (param_of(l), neg_param_of(r)) {
                    return Some((a, b));
                }
                if let (Some(a), Some(b)) = (neg_param_of(l), param_of(r)) {
                    return Some((a, b));
                }
                None
            }
            _ => None,
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &*self.0 {
            ExprNode::Constant(c) => write!(f, "{c}"),
            ExprNode::ParamRef(p) => write!(f, "{}", p.name()),
            ExprNode::Drag(p) => write!(f, "drag({})", p.name()),
            ExprNode::Unary(op, c) => write!(f, "{}({})", unary_name(*op), c),
            ExprNode::Binary(op, l, r) => write!(f, "({} {} {})", l, binary_symbol(*op), r),
        }
    }
}

impl fmt::Debug for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Expr({self})")
    }
}

fn unary_name(op: UnaryOp) -> &'static str {
    match op {
        UnaryOp::Neg => "neg",
        UnaryOp::Sin => "sin",
        UnaryOp::Cos => "cos",
        UnaryOp::Tan => "tan",
        UnaryOp::Asin => "asin",
        UnaryOp::Acos => "acos",
        UnaryOp::Atan => "atan",
        UnaryOp::Sqrt => "sqrt",
        UnaryOp::Sqr => "sqr",
        UnaryOp::Abs => "abs",
        UnaryOp::Sign => "sign",
        UnaryOp::Exp => "exp",
        UnaryOp::Ln => "ln",
    }
}

fn binary_symbol(op: BinaryOp) -> &'static str {
    match op {
        BinaryOp::Add => "+",
        BinaryOp::Sub => "-",
        BinaryOp::Mul => "*",
        BinaryOp::Div => "/",
        BinaryOp::Atan2 => "atan2",
        BinaryOp::Pow => "pow",
    }
}

fn eval_unary(op: UnaryOp, x: f64) -> f64 {
    match op {
        UnaryOp::Neg => -x,
        UnaryOp::Sin => x.sin(),
        UnaryOp::Cos => x.cos(),
        UnaryOp::Tan => x.tan(),
        UnaryOp::Asin => x.asin(),
        UnaryOp::Acos => x.acos(),
        UnaryOp::Atan => x.atan(),
        UnaryOp::Sqrt => x.sqrt(),
        UnaryOp::Sqr => x * x,
        UnaryOp::Abs => x.abs(),
        UnaryOp::Sign => {
            if x < 0.0 {
                -1.0
            } else {
                1.0
            }
        }
        UnaryOp::Exp => x.exp(),
        UnaryOp::Ln => x.ln(),
    }
}

fn eval_binary(op: BinaryOp, a: f64, b: f64) -> f64 {
    match op {
        BinaryOp::Add => a + b,
        BinaryOp::Sub => a - b,
        BinaryOp::Mul => a * b,
        BinaryOp::Div => a / b,
        BinaryOp::Atan2 => a.atan2(b),
        BinaryOp::Pow => a.powf(b),
    }
}

fn derive_unary(op: UnaryOp, c: &Expr, dc: &Expr) -> Expr {
    match op {
        UnaryOp::Neg => -dc.clone(),
        UnaryOp::Sin => cos(c.clone()) * dc.clone(),
        UnaryOp::Cos => -(sin(c.clone()) * dc.clone()),
        UnaryOp::Tan => dc.clone() / sqr(cos(c.clone())),
        UnaryOp::Asin => dc.clone() / sqrt(Expr::constant(1.0) - sqr(c.clone())),
        UnaryOp::Acos => -(dc.clone() / sqrt(Expr::constant(1.0) - sqr(c.clone()))),
        UnaryOp::Atan => dc.clone() / (Expr::constant(1.0) + sqr(c.clone())),
        UnaryOp::Sqrt => dc.clone() / (Expr::constant(2.0) * sqrt(c.clone())),
        UnaryOp::Sqr => Expr::constant(2.0) * c.clone() * dc.clone(),
        UnaryOp::Abs => sign(c.clone()) * dc.clone(),
        UnaryOp::Sign => Expr::constant(0.0),
        UnaryOp::Exp => exp(c.clone()) * dc.clone(),
        UnaryOp::Ln => dc.clone() / c.clone(),
    }
}

fn derive_binary(op: BinaryOp, l: &Expr, r: &Expr, dl: &Expr, dr: &Expr) -> Expr {
    match op {
        BinaryOp::Add => dl.clone() + dr.clone(),
        BinaryOp::Sub => dl.clone() - dr.clone(),
        BinaryOp::Mul => l.clone() * dr.clone() + r.clone() * dl.clone(),
        BinaryOp::Div => {
            (dl.clone() * r.clone() - l.clone() * dr.clone()) / (r.clone() * r.clone())
        }
        BinaryOp::Atan2 => {
            // d/dp atan2(u, v) = (v*du - u*dv) / (u^2 + v^2)
            let denom = sqr(l.clone()) + sqr(r.clone());
            (r.clone() * dl.clone() - l.clone() * dr.clone()) / denom
        }
        BinaryOp::Pow => {
            // general case: d(u^v) = u^v * (dv*ln(u) + v*du/u)
            l.clone().pow(r.clone()) * (dr.clone() * ln(l.clone()) + r.clone() * dl.clone() / l.clone())
        }
    }
}

impl Add for Expr {
    type Output = Expr;
    fn add(self, rhs: Expr) -> Expr {
        Expr::binary(BinaryOp::Add, self, rhs)
    }
}

impl Sub for Expr {
    type Output = Expr;
    fn sub(self, rhs: Expr) -> Expr {
        Expr::binary(BinaryOp::Sub, self, rhs)
    }
}

impl Mul for Expr {
    type Output = Expr;
    fn mul(self, rhs: Expr) -> Expr {
        Expr::binary(BinaryOp::Mul, self, rhs)
    }
}

impl Div for Expr {
    type Output = Expr;
    fn div(self, rhs: Expr) -> Expr {
        Expr::binary(BinaryOp::Div, self, rhs)
    }
}

impl Neg for Expr {
    type Output = Expr;
    fn neg(self) -> Expr {
        Expr::unary(UnaryOp::Neg, self)
    }
}

impl Expr {
    pub fn pow(self, rhs: Expr) -> Expr {
        Expr::binary(BinaryOp::Pow, self, rhs)
    }
}

pub fn sin(e: Expr) -> Expr {
    Expr::unary(UnaryOp::Sin, e)
}
pub fn cos(e: Expr) -> Expr {
    Expr::unary(UnaryOp::Cos, e)
}
pub fn tan(e: Expr) -> Expr {
    Expr::unary(UnaryOp::Tan, e)
}
pub fn asin(e: Expr) -> Expr {
    Expr::unary(UnaryOp::Asin, e)
}
pub fn acos(e: Expr) -> Expr {
    Expr::unary(UnaryOp::Acos, e)
}
pub fn atan(e: Expr) -> Expr {
    Expr::unary(UnaryOp::Atan, e)
}
pub fn sqrt(e: Expr) -> Expr {
    Expr::unary(UnaryOp::Sqrt, e)
}
pub fn sqr(e: Expr) -> Expr {
    Expr::unary(UnaryOp::Sqr, e)
}
pub fn abs(e: Expr) -> Expr {
    Expr::unary(UnaryOp::Abs, e)
}
pub fn sign(e: Expr) -> Expr {
    Expr::unary(UnaryOp::Sign, e)
}
pub fn exp(e: Expr) -> Expr {
    Expr::unary(UnaryOp::Exp, e)
}
pub fn ln(e: Expr) -> Expr {
    Expr::unary(UnaryOp::Ln, e)
}
pub fn atan2(y: Expr, x: Expr) -> Expr {
    Expr::binary(BinaryOp::Atan2, y, x)
}

/// `expr(c)` — a constant literal, matching the external-interface naming
/// in spec.md §6.
pub fn expr(c: f64) -> Expr {
    Expr::constant(c)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn central_diff(e: &Expr, p: &Parameter, h: f64) -> f64 {
        let v = p.value();
        p.set_value(v + h);
        let plus = e.eval();
        p.set_value(v - h);
        let minus = e.eval();
        p.set_value(v);
        (plus - minus) / (2.0 * h)
    }

    #[test]
    fn peephole_constant_folding() {
        let e = Expr::constant(2.0) + Expr::constant(3.0);
        assert_eq!(e.eval(), 5.0);
    }

    #[test]
    fn peephole_identities() {
        let x = Parameter::new("x", 7.0);
        let zero = Expr::constant(0.0);
        let one = Expr::constant(1.0);
        assert!((x.expr() + zero.clone()).ptr_eq(&x.expr()));
        assert!((x.expr() - zero).ptr_eq(&x.expr()));
        assert!((x.expr() * one).ptr_eq(&x.expr()));
    }

    #[test]
    fn double_negation_cancels() {
        let x = Parameter::new("x", 7.0);
        let e = -(-(x.expr()));
        assert_eq!(e.eval(), x.value());
    }

    #[test]
    fn derivative_matches_finite_difference() {
        let x = Parameter::new("x", 1.3);
        let y = Parameter::new("y", 0.7);
        let e = sin(x.expr()) * cos(y.expr()) + sqrt(x.expr() * x.expr() + Expr::constant(1.0));
        let d = e.derivative(&x);
        assert_relative_eq!(d.eval(), central_diff(&e, &x, 1e-6), epsilon = 1e-5);
    }

    #[test]
    fn substitute_matches_parameter_assignment() {
        let a = Parameter::new("a", 2.0);
        let b = Parameter::new("b", 9.0);
        let e = sin(b.expr()) + a.expr() * a.expr();
        let subbed = e.substitute(&b, &a);
        assert_eq!(subbed.eval(), sin(a.expr()).eval() + a.value() * a.value());
    }

    #[test]
    fn substitution_form_detects_param_difference() {
        let a = Parameter::new("a", 1.0);
        let b = Parameter::new("b", 1.0);
        let e = a.expr() - b.expr();
        let (pa, pb) = e.substitution_params().unwrap();
        assert_eq!(pa, a);
        assert_eq!(pb, b);
        assert!((b.expr() - a.expr()).is_substitution_form());
        assert!(!(a.expr() + b.expr()).is_substitution_form());
    }

    #[test]
    fn is_drag_detects_any_drag_leaf() {
        let a = Parameter::new("a", 1.0);
        let b = Parameter::new("b", 1.0);
        assert!(Expr::drag(&a).is_drag());
        assert!((Expr::drag(&a) - b.expr()).is_drag());
        assert!(!(a.expr() - b.expr()).is_drag());
    }
}
