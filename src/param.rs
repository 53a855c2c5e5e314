//! Named mutable scalar unknowns, identity-compared.
//!
//! A [`Parameter`] is the solver's atomic unknown: expression leaves refer to
//! parameters by identity (not by value or by name), so two distinct
//! parameters may share a name without being confused for one another.

use std::cell::{Cell, OnceCell};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::Rc;

use crate::expr::Expr;

struct ParamData {
    name: String,
    value: Cell<f64>,
    leaf: OnceCell<Expr>,
}

/// A named mutable scalar unknown.
///
/// `Parameter` is cheap to clone (it is a reference-counted handle) and is
/// compared and hashed by the identity of the underlying allocation, never
/// by name or value — two parameters named `"x"` are different unknowns
/// unless they are clones of the same `Parameter`.
#[derive(Clone)]
pub struct Parameter(Rc<ParamData>);

impl Parameter {
    /// Creates a new parameter with the given diagnostic name and initial value.
    pub fn new(name: impl Into<String>, value: f64) -> Self {
        Parameter(Rc::new(ParamData {
            name: name.into(),
            value: Cell::new(value),
            leaf: OnceCell::new(),
        }))
    }

    /// The diagnostic name this parameter was created with. Not used for
    /// equality or hashing.
    pub fn name(&self) -> &str {
        &self.0.name
    }

    /// The current value.
    pub fn value(&self) -> f64 {
        self.0.value.get()
    }

    /// Overwrites the current value.
    pub fn set_value(&self, v: f64) {
        self.0.value.set(v);
    }

    /// A cached `ParamRef` leaf expression bound to this parameter.
    pub fn expr(&self) -> Expr {
        self.0
            .leaf
            .get_or_init(|| Expr::param_ref(self.clone()))
            .clone()
    }

    fn ptr(&self) -> *const () {
        Rc::as_ptr(&self.0) as *const ()
    }
}

impl PartialEq for Parameter {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for Parameter {}

impl Hash for Parameter {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.ptr().hash(state);
    }
}

impl fmt::Debug for Parameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Parameter({}={}, {:p})", self.0.name, self.0.value.get(), self.ptr())
    }
}

impl fmt::Display for Parameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn distinct_parameters_with_same_name_are_not_equal() {
        let a = Parameter::new("x", 1.0);
        let b = Parameter::new("x", 1.0);
        assert_ne!(a, b);
        assert_eq!(a, a.clone());
    }

    #[test]
    fn set_value_is_visible_through_clones() {
        let a = Parameter::new("x", 1.0);
        let b = a.clone();
        b.set_value(5.0);
        assert_eq!(a.value(), 5.0);
    }

    #[test]
    fn expr_is_cached() {
        let a = Parameter::new("x", 1.0);
        let e1 = a.expr();
        let e2 = a.expr();
        assert!(e1.ptr_eq(&e2));
    }
}
