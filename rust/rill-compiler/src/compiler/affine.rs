//! Affine expressions and linear sets over array variables.
//!
//! A `LinExpr` maps array-variable handles to integer coefficients, with a
//! distinguished constant term. A `LinearSet` is a conjunction of
//! equalities and inequalities over such expressions; both convert
//! losslessly into constraint-matrix rows.

use crate::compiler::fir::VarHandle;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinExpr {
    terms: BTreeMap<VarHandle, i64>,
    pub constant: i64,
}

impl LinExpr {
    pub fn constant(value: i64) -> Self {
        Self {
            terms: BTreeMap::new(),
            constant: value,
        }
    }

    pub fn var(var: VarHandle) -> Self {
        let mut terms = BTreeMap::new();
        terms.insert(var, 1);
        Self { terms, constant: 0 }
    }

    pub fn coefficient(&self, var: VarHandle) -> i64 {
        self.terms.get(&var).copied().unwrap_or(0)
    }

    pub fn terms(&self) -> impl Iterator<Item = (VarHandle, i64)> + '_ {
        self.terms.iter().map(|(v, c)| (*v, *c))
    }

    pub fn is_constant(&self) -> bool {
        self.terms.values().all(|c| *c == 0)
    }

    pub fn add(&self, other: &LinExpr) -> LinExpr {
        let mut result = self.clone();
        for (var, coef) in other.terms() {
            *result.terms.entry(var).or_insert(0) += coef;
        }
        result.constant += other.constant;
        result.prune();
        result
    }

    pub fn sub(&self, other: &LinExpr) -> LinExpr {
        self.add(&other.scale(-1))
    }

    pub fn scale(&self, factor: i64) -> LinExpr {
        let mut result = self.clone();
        for coef in result.terms.values_mut() {
            *coef *= factor;
        }
        result.constant *= factor;
        result.prune();
        result
    }

    pub fn with_constant(&self, constant: i64) -> LinExpr {
        let mut result = self.clone();
        result.constant = constant;
        result
    }

    fn prune(&mut self) {
        self.terms.retain(|_, c| *c != 0);
    }
}

impl fmt::Display for LinExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        let mut first = true;
        for (var, coef) in self.terms() {
            if coef == 0 {
                continue;
            }
            if !first || coef < 0 {
                write!(f, "{}", if coef < 0 { "-" } else { "+" })?;
            }
            if coef.abs() != 1 {
                write!(f, "{}", coef.abs())?;
            }
            write!(f, "v{}", var.0)?;
            first = false;
        }
        if self.constant != 0 || first {
            if !first || self.constant < 0 {
                write!(f, "{}", if self.constant < 0 { "-" } else { "+" })?;
            }
            write!(f, "{}", self.constant.abs())?;
        }
        write!(f, "}}")
    }
}

/// `expr == 0` or `expr >= 0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CmpOp {
    Eq,
    Geq,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinConstraint {
    pub expr: LinExpr,
    pub op: CmpOp,
}

impl LinConstraint {
    pub fn eq(expr: LinExpr) -> Self {
        Self {
            expr,
            op: CmpOp::Eq,
        }
    }
    pub fn geq(expr: LinExpr) -> Self {
        Self {
            expr,
            op: CmpOp::Geq,
        }
    }
}

/// A conjunction of linear constraints.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinearSet {
    pub constraints: Vec<LinConstraint>,
}

impl LinearSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn and(&mut self, constraint: LinConstraint) {
        self.constraints.push(constraint);
    }

    pub fn is_empty(&self) -> bool {
        self.constraints.is_empty()
    }

    /// Constraint-matrix row for `expr` given the variable column order:
    /// columns are `vars ∥ constant`.
    pub fn row(expr: &LinExpr, vars: &[VarHandle]) -> Vec<i64> {
        let mut row = vec![0; vars.len() + 1];
        for (i, v) in vars.iter().enumerate() {
            row[i] = expr.coefficient(*v);
        }
        row[vars.len()] = expr.constant;
        row
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_linexpr_algebra() {
        let i = VarHandle(0);
        let j = VarHandle(1);
        let e = LinExpr::var(i).scale(2).add(&LinExpr::var(j)).add(&LinExpr::constant(3));
        assert_eq!(e.coefficient(i), 2);
        assert_eq!(e.coefficient(j), 1);
        assert_eq!(e.constant, 3);
        let z = e.sub(&e);
        assert!(z.is_constant());
        assert_eq!(z.constant, 0);
    }

    #[test]
    fn test_row_conversion() {
        let i = VarHandle(0);
        let j = VarHandle(1);
        let e = LinExpr::var(j).scale(-1).add(&LinExpr::constant(5));
        assert_eq!(LinearSet::row(&e, &[i, j]), vec![0, -1, 5]);
    }
}
