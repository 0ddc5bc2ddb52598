//! The functional intermediate representation.
//!
//! Expressions are a sum type; identifiers and variables live in flat
//! arenas addressed by numeric handles, so a `Reference` carries a handle
//! rather than a pointer and the identifier↔expression cycle of recursive
//! arrays never materializes in the ownership graph.

use crate::compiler::affine::{LinExpr, LinearSet};
use rill_core::location::CodeRange;
use serde::{Deserialize, Serialize};
use std::fmt;
use strum_macros::Display;

// ── Primitive kinds and types ──

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[strum(serialize_all = "lowercase")]
pub enum PrimKind {
    Integer,
    Real,
    Complex,
    Boolean,
    Infinity,
    Undefined,
}

impl PrimKind {
    pub fn is_numeric(self) -> bool {
        matches!(self, PrimKind::Integer | PrimKind::Real | PrimKind::Complex)
    }
}

/// The numeric join: integer < real < complex. Mixing booleans with
/// numbers has no join. `undefined` is the bottom element: it joins with
/// anything (the first type-checking pass of a recursive array produces
/// it for the self-referential arm).
pub fn common_type(a: PrimKind, b: PrimKind) -> Option<PrimKind> {
    use PrimKind::*;
    match (a, b) {
        (Undefined, y) => Some(y),
        (x, Undefined) => Some(x),
        (x, y) if x == y => Some(x),
        (Infinity, y) if y.is_numeric() => Some(y),
        (x, Infinity) if x.is_numeric() => Some(x),
        (Integer, Real) | (Real, Integer) => Some(Real),
        (Integer, Complex) | (Complex, Integer) => Some(Complex),
        (Real, Complex) | (Complex, Real) => Some(Complex),
        _ => None,
    }
}

/// An array dimension extent: a positive integer or the infinite sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Extent {
    Finite(i64),
    Infinite,
}

impl Extent {
    pub fn is_infinite(self) -> bool {
        matches!(self, Extent::Infinite)
    }

    pub fn finite(self) -> Option<i64> {
        match self {
            Extent::Finite(n) => Some(n),
            Extent::Infinite => None,
        }
    }
}

impl fmt::Display for Extent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Extent::Finite(n) => write!(f, "{}", n),
            Extent::Infinite => write!(f, "~"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScalarType {
    pub kind: PrimKind,
    pub affine: bool,
    pub constant: bool,
    pub data: bool,
}

impl ScalarType {
    pub fn new(kind: PrimKind) -> Self {
        Self {
            kind,
            affine: false,
            constant: false,
            data: true,
        }
    }

    /// Integer constants are affine, constant and data.
    pub fn int_const() -> Self {
        Self {
            kind: PrimKind::Integer,
            affine: true,
            constant: true,
            data: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Type {
    Undefined,
    Scalar(ScalarType),
    Array { size: Vec<Extent>, elem: PrimKind },
    Function { arity: usize },
}

impl Type {
    pub fn scalar(kind: PrimKind) -> Type {
        Type::Scalar(ScalarType::new(kind))
    }

    pub fn is_undefined(&self) -> bool {
        matches!(self, Type::Undefined)
            || matches!(self, Type::Scalar(s) if s.kind == PrimKind::Undefined)
    }

    pub fn is_array(&self) -> bool {
        matches!(self, Type::Array { .. })
    }

    pub fn is_function(&self) -> bool {
        matches!(self, Type::Function { .. })
    }

    /// The primitive element kind: the scalar kind, or an array's element.
    pub fn elem_kind(&self) -> PrimKind {
        match self {
            Type::Scalar(s) => s.kind,
            Type::Array { elem, .. } => *elem,
            _ => PrimKind::Undefined,
        }
    }

    pub fn shape(&self) -> &[Extent] {
        match self {
            Type::Array { size, .. } => size,
            _ => &[],
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Undefined => write!(f, "undefined"),
            Type::Scalar(s) => write!(f, "{}", s.kind),
            Type::Array { size, elem } => {
                write!(f, "[")?;
                for (i, s) in size.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{}", s)?;
                }
                write!(f, "]{}", elem)
            }
            Type::Function { arity } => write!(f, "function/{}", arity),
        }
    }
}

// ── Primitive operations ──

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[strum(serialize_all = "lowercase")]
pub enum PrimitiveOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
    Neg,
    Eq,
    Neq,
    Lt,
    Lte,
    Gt,
    Gte,
    And,
    Or,
    Not,
    Abs,
    Min,
    Max,
    Floor,
    Ceil,
    Sqrt,
    Exp,
    Log,
    Sin,
    Cos,
    Re,
    Im,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureError {
    /// No overload accepts the argument kinds.
    NoMatch,
    /// More than one overload accepts them equally well.
    Ambiguous,
}

/// Promotion steps from one kind to a parameter kind, `None` when the
/// argument cannot be passed. The infinity sentinel converts to any
/// numeric kind at equal cost, which is what makes calls like `~ + ~`
/// genuinely ambiguous.
fn promotion_cost(from: PrimKind, to: PrimKind) -> Option<u32> {
    use PrimKind::*;
    match (from, to) {
        (a, b) if a == b => Some(0),
        (Integer, Real) => Some(1),
        (Integer, Complex) => Some(2),
        (Real, Complex) => Some(1),
        (Infinity, Integer) | (Infinity, Real) | (Infinity, Complex) => Some(1),
        _ => None,
    }
}

/// Result kind of `op` applied to arguments of the given kinds, resolved
/// against the op's overload table: the candidate needing the least
/// promotion wins; distinct candidates tying at the least cost are
/// `Ambiguous`. An `undefined` argument makes the result `undefined`
/// (first pass over a recursive array); the second pass sees resolved
/// kinds.
pub fn result_type(op: PrimitiveOp, args: &[PrimKind]) -> Result<PrimKind, SignatureError> {
    use PrimKind::*;
    use PrimitiveOp::*;
    if args.iter().any(|k| *k == Undefined) {
        return Ok(Undefined);
    }
    let overloads: &[(&[PrimKind], PrimKind)] = match op {
        Add | Sub | Mul => &[
            (&[Integer, Integer], Integer),
            (&[Real, Real], Real),
            (&[Complex, Complex], Complex),
        ],
        Div | Pow => &[(&[Real, Real], Real), (&[Complex, Complex], Complex)],
        Mod => &[(&[Integer, Integer], Integer)],
        Neg => &[(&[Integer], Integer), (&[Real], Real), (&[Complex], Complex)],
        Eq | Neq => &[
            (&[Integer, Integer], Boolean),
            (&[Real, Real], Boolean),
            (&[Complex, Complex], Boolean),
            (&[Boolean, Boolean], Boolean),
        ],
        Lt | Lte | Gt | Gte => &[
            (&[Integer, Integer], Boolean),
            (&[Real, Real], Boolean),
        ],
        And | Or => &[(&[Boolean, Boolean], Boolean)],
        Not => &[(&[Boolean], Boolean)],
        Abs => &[(&[Integer], Integer), (&[Real], Real), (&[Complex], Real)],
        Min | Max => &[(&[Integer, Integer], Integer), (&[Real, Real], Real)],
        Floor | Ceil => &[(&[Integer], Integer), (&[Real], Integer)],
        Sqrt | Exp | Log | Sin | Cos => &[(&[Real], Real), (&[Complex], Complex)],
        Re | Im => &[(&[Complex], Real)],
    };
    let mut best: Option<(u32, PrimKind)> = None;
    let mut ambiguous = false;
    for (params, result) in overloads {
        if params.len() != args.len() {
            continue;
        }
        let cost = params
            .iter()
            .zip(args.iter())
            .try_fold(0u32, |acc, (p, a)| promotion_cost(*a, *p).map(|c| acc + c));
        let Some(cost) = cost else {
            continue;
        };
        match best {
            None => best = Some((cost, *result)),
            Some((best_cost, best_result)) => {
                if cost < best_cost {
                    best = Some((cost, *result));
                    ambiguous = false;
                } else if cost == best_cost && *result != best_result {
                    ambiguous = true;
                }
            }
        }
    }
    match best {
        None => Err(SignatureError::NoMatch),
        Some(_) if ambiguous => Err(SignatureError::Ambiguous),
        Some((_, result)) => Ok(result),
    }
}

/// Look up a primitive op by its surface name (for `sin(x)`-style calls).
pub fn primitive_by_name(name: &str) -> Option<PrimitiveOp> {
    use PrimitiveOp::*;
    Some(match name {
        "abs" => Abs,
        "min" => Min,
        "max" => Max,
        "floor" => Floor,
        "ceil" => Ceil,
        "sqrt" => Sqrt,
        "exp" => Exp,
        "log" => Log,
        "sin" => Sin,
        "cos" => Cos,
        "re" => Re,
        "im" => Im,
        _ => return None,
    })
}

// ── Handles and arenas ──

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IdHandle(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VarHandle(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FuncVarHandle(pub u32);

/// A named definition. The defining expression is owned here; references
/// to this identifier elsewhere carry the handle only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Identifier {
    pub name: String,
    pub expr: Expr,
    pub ty: Type,
    pub is_recursive: bool,
    pub location: CodeRange,
}

/// An array iteration variable with an optional range expression.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArrayVar {
    pub name: String,
    pub range: Option<Expr>,
    pub location: CodeRange,
    pub ref_count: u32,
}

/// A function parameter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FuncVar {
    pub name: String,
    pub qualified_name: Option<String>,
    pub location: CodeRange,
}

/// Identifiers in dependency order: every identifier appears after the
/// identifiers its expression references.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Scope {
    pub ids: Vec<IdHandle>,
}

/// The arena holding all named entities of one module.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Model {
    pub ids: Vec<Identifier>,
    pub array_vars: Vec<ArrayVar>,
    pub func_vars: Vec<FuncVar>,
    pub top: Scope,
}

impl Model {
    pub fn id(&self, h: IdHandle) -> &Identifier {
        &self.ids[h.0 as usize]
    }
    pub fn id_mut(&mut self, h: IdHandle) -> &mut Identifier {
        &mut self.ids[h.0 as usize]
    }
    pub fn array_var(&self, h: VarHandle) -> &ArrayVar {
        &self.array_vars[h.0 as usize]
    }
    pub fn array_var_mut(&mut self, h: VarHandle) -> &mut ArrayVar {
        &mut self.array_vars[h.0 as usize]
    }
    pub fn func_var(&self, h: FuncVarHandle) -> &FuncVar {
        &self.func_vars[h.0 as usize]
    }

    pub fn add_id(&mut self, id: Identifier) -> IdHandle {
        let h = IdHandle(self.ids.len() as u32);
        self.ids.push(id);
        h
    }
    pub fn add_array_var(&mut self, var: ArrayVar) -> VarHandle {
        let h = VarHandle(self.array_vars.len() as u32);
        self.array_vars.push(var);
        h
    }
    pub fn add_func_var(&mut self, var: FuncVar) -> FuncVarHandle {
        let h = FuncVarHandle(self.func_vars.len() as u32);
        self.func_vars.push(var);
        h
    }

    pub fn lookup(&self, name: &str) -> Option<IdHandle> {
        self.top
            .ids
            .iter()
            .copied()
            .find(|h| self.id(*h).name == name)
    }
}

// ── Expressions ──

/// What a `Reference` names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RefTarget {
    Id(IdHandle),
    ArrayVar(VarHandle),
    FuncVar(FuncVarHandle),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperationKind {
    ArrayConcat,
    ArrayEnumerate,
}

/// An index position of an array pattern: a fixed value or a bound var.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatternIndex {
    pub var: Option<VarHandle>,
    pub value: i64,
}

/// One arm of an `ArrayPatterns` expression.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pattern {
    pub indexes: Vec<PatternIndex>,
    pub guard: Option<Expr>,
    pub value: Expr,
}

/// A case: optional domain constraint and the value it selects.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Case {
    pub guard: Option<Expr>,
    pub value: Expr,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Expr {
    pub kind: ExprKind,
    pub location: CodeRange,
    pub ty: Type,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ExprKind {
    IntConst(i64),
    RealConst(f64),
    ComplexConst { re: f64, im: f64 },
    BoolConst(bool),
    Infinity,
    Primitive {
        op: PrimitiveOp,
        operands: Vec<Expr>,
    },
    Operation {
        kind: OperationKind,
        operands: Vec<Expr>,
    },
    Reference(RefTarget),
    /// Back-reference to the enclosing recursive array's identifier.
    ArraySelfRef(IdHandle),
    Array {
        vars: Vec<VarHandle>,
        scope: Scope,
        body: Box<Expr>,
        is_recursive: bool,
    },
    ArrayPatterns(Vec<Pattern>),
    ArrayApp {
        object: Box<Expr>,
        args: Vec<Expr>,
    },
    ArraySize {
        object: Box<Expr>,
        dim: Option<Box<Expr>>,
    },
    FuncApp {
        object: Box<Expr>,
        args: Vec<Expr>,
    },
    Function {
        params: Vec<FuncVarHandle>,
        scope: Scope,
        body: Box<Expr>,
    },
    CaseExpr(Vec<Case>),
    Affine(LinExpr),
    AffineSet(LinearSet),
}

impl Expr {
    pub fn new(kind: ExprKind, location: CodeRange) -> Self {
        let ty = match &kind {
            ExprKind::IntConst(_) => Type::Scalar(ScalarType::int_const()),
            ExprKind::RealConst(_) => Type::scalar(PrimKind::Real),
            ExprKind::ComplexConst { .. } => Type::scalar(PrimKind::Complex),
            ExprKind::BoolConst(_) => Type::scalar(PrimKind::Boolean),
            ExprKind::Infinity => Type::scalar(PrimKind::Infinity),
            _ => Type::Undefined,
        };
        Self { kind, location, ty }
    }
}

impl Default for Expr {
    fn default() -> Self {
        Expr::new(ExprKind::IntConst(0), CodeRange::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_common_type_join() {
        assert_eq!(
            common_type(PrimKind::Integer, PrimKind::Real),
            Some(PrimKind::Real)
        );
        assert_eq!(
            common_type(PrimKind::Real, PrimKind::Complex),
            Some(PrimKind::Complex)
        );
        assert_eq!(common_type(PrimKind::Boolean, PrimKind::Integer), None);
    }

    #[test]
    fn test_result_type_arith() {
        assert_eq!(
            result_type(PrimitiveOp::Add, &[PrimKind::Integer, PrimKind::Integer]),
            Ok(PrimKind::Integer)
        );
        assert_eq!(
            result_type(PrimitiveOp::Add, &[PrimKind::Integer, PrimKind::Real]),
            Ok(PrimKind::Real)
        );
        assert_eq!(
            result_type(PrimitiveOp::Add, &[PrimKind::Boolean, PrimKind::Integer]),
            Err(SignatureError::NoMatch)
        );
    }

    #[test]
    fn test_result_type_ambiguous_overloads() {
        // `~` promotes to every numeric kind at the same cost, so the
        // arithmetic overloads tie with different results.
        assert_eq!(
            result_type(PrimitiveOp::Add, &[PrimKind::Infinity, PrimKind::Infinity]),
            Err(SignatureError::Ambiguous)
        );
        assert_eq!(
            result_type(PrimitiveOp::Min, &[PrimKind::Infinity, PrimKind::Infinity]),
            Err(SignatureError::Ambiguous)
        );
        // A least-promotion winner resolves the call.
        assert_eq!(
            result_type(PrimitiveOp::Add, &[PrimKind::Infinity, PrimKind::Real]),
            Ok(PrimKind::Real)
        );
        // Tying overloads that agree on the result are not ambiguous.
        assert_eq!(
            result_type(PrimitiveOp::Eq, &[PrimKind::Infinity, PrimKind::Infinity]),
            Ok(PrimKind::Boolean)
        );
    }

    #[test]
    fn test_result_type_compare_and_logic() {
        assert_eq!(
            result_type(PrimitiveOp::Lt, &[PrimKind::Integer, PrimKind::Real]),
            Ok(PrimKind::Boolean)
        );
        assert_eq!(
            result_type(PrimitiveOp::And, &[PrimKind::Boolean, PrimKind::Boolean]),
            Ok(PrimKind::Boolean)
        );
        assert_eq!(
            result_type(PrimitiveOp::Lt, &[PrimKind::Complex, PrimKind::Complex]),
            Err(SignatureError::NoMatch)
        );
    }

    #[test]
    fn test_int_const_flags() {
        let e = Expr::new(ExprKind::IntConst(3), CodeRange::default());
        let Type::Scalar(s) = e.ty else {
            panic!("expected scalar");
        };
        assert!(s.affine && s.constant && s.data);
    }
}
