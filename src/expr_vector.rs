//! An ordered triple of expressions with componentwise vector algebra.

use std::ops::{Add, Sub};

use crate::expr::{sqrt, sqr, Expr};

/// Triple `(x, y, z)` of expression references, supporting componentwise
/// `+`/`-` and a scalar `magnitude`.
#[derive(Clone)]
pub struct ExprVector {
    pub x: Expr,
    pub y: Expr,
    pub z: Expr,
}

impl ExprVector {
    pub fn new(x: Expr, y: Expr, z: Expr) -> Self {
        ExprVector { x, y, z }
    }

    /// A vector lying in the z=0 plane, the common case for this 2D solver.
    pub fn planar(x: Expr, y: Expr) -> Self {
        ExprVector { x, y, z: Expr::constant(0.0) }
    }

    /// `sqrt(x^2 + y^2 + z^2)`.
    pub fn magnitude(&self) -> Expr {
        sqrt(sqr(self.x.clone()) + sqr(self.y.clone()) + sqr(self.z.clone()))
    }
}

impl Add for ExprVector {
    type Output = ExprVector;
    fn add(self, rhs: ExprVector) -> ExprVector {
        ExprVector::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl Sub for ExprVector {
    type Output = ExprVector;
    fn sub(self, rhs: ExprVector) -> ExprVector {
        ExprVector::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::param::Parameter;

    #[test]
    fn magnitude_matches_euclidean_norm() {
        let px = Parameter::new("x", 3.0);
        let py = Parameter::new("y", 4.0);
        let v = ExprVector::planar(px.expr(), py.expr());
        assert_eq!(v.magnitude().eval(), 5.0);
    }

    #[test]
    fn componentwise_subtraction() {
        let a = ExprVector::new(Expr::constant(1.0), Expr::constant(2.0), Expr::constant(3.0));
        let b = ExprVector::new(Expr::constant(4.0), Expr::constant(1.0), Expr::constant(0.0));
        let d = a - b;
        assert_eq!(d.x.eval(), -3.0);
        assert_eq!(d.y.eval(), 1.0);
        assert_eq!(d.z.eval(), 3.0);
    }
}
