//! The polyhedral representation: statements with iteration domains,
//! write/read relations into arrays, and the kernel/scheduler/sizer/
//! generator that operate on them.

pub mod astgen;
pub mod buffers;
pub mod schedule;
pub mod set;

use crate::compiler::fir::{Extent, PrimKind, PrimitiveOp};
use serde::{Deserialize, Serialize};

pub type StmtId = usize;
pub type ArrayId = usize;

/// An affine map from an iteration space to an array index space:
/// `out_r = Σ coef[r][c] · in_c + constants[r]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexMap {
    pub coef: Vec<Vec<i64>>,
    pub constants: Vec<i64>,
}

impl IndexMap {
    pub fn identity(dims: usize) -> Self {
        let mut coef = vec![vec![0; dims]; dims];
        for (r, row) in coef.iter_mut().enumerate() {
            row[r] = 1;
        }
        Self {
            coef,
            constants: vec![0; dims],
        }
    }

    pub fn zero(out_dims: usize, in_dims: usize) -> Self {
        Self {
            coef: vec![vec![0; in_dims]; out_dims],
            constants: vec![0; out_dims],
        }
    }

    pub fn input_dims(&self) -> usize {
        self.coef.first().map(|r| r.len()).unwrap_or(0)
    }

    pub fn output_dims(&self) -> usize {
        self.coef.len()
    }
}

/// A scalar value in a statement body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Int(i64),
    Real(f64),
    Complex(f64, f64),
    Bool(bool),
}

/// The pure scalar expression a statement evaluates at each iteration
/// point. Reads are resolved to (array, affine index map) accesses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum StmtExpr {
    Const(Value),
    Prim {
        op: PrimitiveOp,
        kind: PrimKind,
        args: Vec<StmtExpr>,
    },
    /// `reads[access]` of the owning statement.
    Read { access: usize },
    /// External input with the given parameter ordinal.
    Input { index: usize },
    /// The iteration variable of dimension `dim`.
    Iterator { dim: usize },
    /// Guard-selected cases evaluated at run time; `None` guard is the
    /// default arm.
    Select {
        cases: Vec<(Option<Box<StmtExpr>>, StmtExpr)>,
    },
}

impl StmtExpr {
    pub fn is_input(&self) -> bool {
        matches!(self, StmtExpr::Input { .. })
    }
}

/// A read access from a statement's iteration space into an array.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadAccess {
    pub array: ArrayId,
    pub map: IndexMap,
}

/// An extra affine constraint on a statement's iteration domain:
/// `Σ coefs·iter + constant (== | ≥) 0`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainConstraint {
    pub coefs: Vec<i64>,
    pub constant: i64,
    pub equality: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Statement {
    pub name: String,
    /// Per-dimension extents; `Infinite` marks the flow dimension.
    pub domain: Vec<Extent>,
    /// Affine guards narrowing the box domain (case splits).
    pub guards: Vec<DomainConstraint>,
    pub expr: StmtExpr,
    pub reads: Vec<ReadAccess>,
    /// The array written, if any; scalar statements have none.
    pub array: Option<ArrayId>,
    /// Index of the infinite iteration dimension.
    pub flow_dim: Option<usize>,
    /// Affine write relation into `array`'s index space.
    pub write: Option<IndexMap>,
}

impl Statement {
    pub fn dims(&self) -> usize {
        self.domain.len()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolyArray {
    pub name: String,
    pub size: Vec<Extent>,
    pub elem: PrimKind,
    /// Index of the infinite dimension.
    pub flow_dim: Option<usize>,
    /// Flow iterations advanced per global period (set by the scheduler).
    pub period: i64,
    /// Flow index where the first period starts.
    pub period_offset: i64,
    pub buffer_size: Vec<i64>,
    pub inter_period_dependency: bool,
}

impl PolyArray {
    pub fn new(name: impl Into<String>, size: Vec<Extent>, elem: PrimKind) -> Self {
        let flow_dim = size.iter().position(|e| e.is_infinite());
        Self {
            name: name.into(),
            size,
            elem,
            flow_dim,
            period: 0,
            period_offset: 0,
            buffer_size: Vec::new(),
            inter_period_dependency: false,
        }
    }
}

/// The full polyhedral program: statement set plus the arrays they
/// exchange data through.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PolyProgram {
    pub statements: Vec<Statement>,
    pub arrays: Vec<PolyArray>,
    /// Statement ids of the external inputs, in parameter order.
    pub inputs: Vec<StmtId>,
    /// The statement producing the evaluated result.
    pub output: Option<StmtId>,
    /// The array holding the evaluated result, when it is an array.
    pub output_array: Option<ArrayId>,
}

impl PolyProgram {
    pub fn add_statement(&mut self, stmt: Statement) -> StmtId {
        self.statements.push(stmt);
        self.statements.len() - 1
    }

    pub fn add_array(&mut self, array: PolyArray) -> ArrayId {
        self.arrays.push(array);
        self.arrays.len() - 1
    }

    pub fn statement(&self, id: StmtId) -> &Statement {
        &self.statements[id]
    }

    pub fn array(&self, id: ArrayId) -> &PolyArray {
        &self.arrays[id]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_map() {
        let m = IndexMap::identity(3);
        assert_eq!(m.input_dims(), 3);
        assert_eq!(m.output_dims(), 3);
        assert_eq!(m.coef[1][1], 1);
        assert_eq!(m.coef[1][0], 0);
        assert_eq!(m.constants, vec![0, 0, 0]);
    }

    #[test]
    fn test_array_flow_dim() {
        let a = PolyArray::new(
            "x",
            vec![Extent::Infinite, Extent::Finite(4)],
            PrimKind::Real,
        );
        assert_eq!(a.flow_dim, Some(0));
        let b = PolyArray::new("y", vec![Extent::Finite(4)], PrimKind::Real);
        assert_eq!(b.flow_dim, None);
    }
}
