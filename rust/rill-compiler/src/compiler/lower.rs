//! Translation from the functional IR to the polyhedral model.
//!
//! Each array definition reachable from the evaluated symbol becomes one
//! or more statements writing a single array. Array application arguments
//! are coerced to affine form and become read-relation rows; enumerated
//! variable ranges and array patterns become affine write offsets;
//! concatenation becomes per-operand statements with offset-shifted
//! write relations.

use crate::compiler::affine::LinExpr;
use crate::compiler::fir::*;
use crate::compiler::poly::*;
use crate::compiler::typecheck::{affine_of, const_int};
use rill_core::location::CodeRange;
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Error, Clone)]
pub enum LowerError {
    #[error("affine expression expected")]
    AffineExpected { range: CodeRange },
    #[error("{detail}")]
    Unsupported { detail: String, range: CodeRange },
}

impl LowerError {
    pub fn range(&self) -> CodeRange {
        match self {
            LowerError::AffineExpected { range } | LowerError::Unsupported { range, .. } => *range,
        }
    }

    fn unsupported(detail: impl Into<String>, range: CodeRange) -> Self {
        LowerError::Unsupported {
            detail: detail.into(),
            range,
        }
    }
}

/// An argument type supplied on the command line for `--generate`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArgType {
    Int,
    Real,
    Stream(Vec<Extent>),
}

impl ArgType {
    pub fn as_fir_type(&self) -> Type {
        match self {
            ArgType::Int => Type::scalar(PrimKind::Integer),
            ArgType::Real => Type::scalar(PrimKind::Real),
            ArgType::Stream(size) => Type::Array {
                size: size.clone(),
                elem: PrimKind::Real,
            },
        }
    }
}

/// An affine value in terms of a statement's iteration dimensions.
#[derive(Debug, Clone, PartialEq, Eq)]
struct DimExpr {
    coefs: Vec<i64>,
    constant: i64,
}

impl DimExpr {
    fn constant(dims: usize, value: i64) -> Self {
        Self {
            coefs: vec![0; dims],
            constant: value,
        }
    }

    fn dim(dims: usize, d: usize) -> Self {
        let mut coefs = vec![0; dims];
        coefs[d] = 1;
        Self { coefs, constant: 0 }
    }

    fn add(&self, other: &DimExpr) -> DimExpr {
        DimExpr {
            coefs: self
                .coefs
                .iter()
                .zip(other.coefs.iter())
                .map(|(a, b)| a + b)
                .collect(),
            constant: self.constant + other.constant,
        }
    }

    fn scale(&self, f: i64) -> DimExpr {
        DimExpr {
            coefs: self.coefs.iter().map(|c| c * f).collect(),
            constant: self.constant * f,
        }
    }

    fn sub(&self, other: &DimExpr) -> DimExpr {
        self.add(&other.scale(-1))
    }

    fn is_constant(&self) -> bool {
        self.coefs.iter().all(|c| *c == 0)
    }
}

/// What a bound array variable means inside the statement being built.
type VarEnv = HashMap<VarHandle, DimExpr>;

/// What a function parameter is bound to during translation.
#[derive(Debug, Clone)]
enum ParamBinding {
    Array(ArrayId),
    /// Scalar input: a one-cell array written by an input statement.
    Scalar(ArrayId),
}

pub struct Translator<'m> {
    model: &'m Model,
    program: PolyProgram,
    /// Lowered top-level identifiers.
    lowered: HashMap<IdHandle, ArrayId>,
    params: HashMap<FuncVarHandle, ParamBinding>,
}

/// Lower the evaluation of `target` applied to `args` into a polyhedral
/// program. The model must be fully type-checked (including
/// `check_call` on the target when it is a function).
pub fn translate(
    model: &Model,
    target: IdHandle,
    args: &[ArgType],
) -> Result<PolyProgram, LowerError> {
    let mut tr = Translator {
        model,
        program: PolyProgram::default(),
        lowered: HashMap::new(),
        params: HashMap::new(),
    };
    tr.run(target, args)?;
    Ok(tr.program)
}

impl<'m> Translator<'m> {
    fn run(&mut self, target: IdHandle, args: &[ArgType]) -> Result<(), LowerError> {
        let model = self.model;
        let id = model.id(target);
        let body: &Expr = match &id.expr.kind {
            ExprKind::Function { params, body, .. } => {
                for (p, arg) in params.iter().zip(args.iter()) {
                    let binding = self.bind_input(*p, arg)?;
                    self.params.insert(*p, binding);
                }
                body
            }
            _ => &id.expr,
        };
        // Lower the definitions the body depends on, in dependency order.
        let reachable = self.reachable_ids(body);
        for dep in &reachable {
            self.ensure_lowered(*dep)?;
        }
        // The evaluated body itself.
        let result_ty = body.ty.clone();
        if result_ty.is_array() {
            let array = self.lower_array_expr(&id.name, body)?;
            self.program.output_array = Some(array);
        } else {
            // A scalar result: one-point domain, no array.
            let mut ctx = StmtCtx::new(&id.name, vec![Extent::Finite(1)], None);
            let value = self.lower_value(body, &mut ctx)?;
            let stmt = Statement {
                name: ctx.name,
                domain: ctx.domain,
                guards: Vec::new(),
                expr: value,
                reads: ctx.reads,
                array: None,
                flow_dim: None,
                write: None,
            };
            self.program.add_statement(stmt);
        }
        self.program.output = Some(self.program.statements.len() - 1);
        self.size_arrays_from_writes();
        Ok(())
    }

    /// Create the input array + statement for one function parameter.
    fn bind_input(&mut self, param: FuncVarHandle, arg: &ArgType) -> Result<ParamBinding, LowerError> {
        let name = self.model.func_var(param).name.clone();
        let location = self.model.func_var(param).location;
        let index = self.program.inputs.len();
        match arg {
            ArgType::Stream(size) => {
                let infinite_dims = size.iter().filter(|e| e.is_infinite()).count();
                if infinite_dims > 1 {
                    return Err(LowerError::unsupported(
                        "a stream may have at most one infinite dimension",
                        location,
                    ));
                }
                let array = self
                    .program
                    .add_array(PolyArray::new(&name, size.clone(), PrimKind::Real));
                let flow = self.program.array(array).flow_dim;
                let (domain, flow_dim, write) = if flow.is_some() {
                    // Infinite input: one iteration per flow step; the
                    // write relation is built flow-to-flow by the
                    // scheduler.
                    (vec![Extent::Infinite], Some(0), None)
                } else {
                    (
                        size.clone(),
                        None,
                        Some(IndexMap::identity(size.len())),
                    )
                };
                let stmt = self.program.add_statement(Statement {
                    name: name.clone(),
                    domain,
                    guards: Vec::new(),
                    expr: StmtExpr::Input { index },
                    reads: Vec::new(),
                    array: Some(array),
                    flow_dim,
                    write,
                });
                self.program.inputs.push(stmt);
                Ok(ParamBinding::Array(array))
            }
            ArgType::Int | ArgType::Real => {
                let elem = if *arg == ArgType::Int {
                    PrimKind::Integer
                } else {
                    PrimKind::Real
                };
                let array = self
                    .program
                    .add_array(PolyArray::new(&name, vec![Extent::Finite(1)], elem));
                let stmt = self.program.add_statement(Statement {
                    name: name.clone(),
                    domain: vec![Extent::Finite(1)],
                    guards: Vec::new(),
                    expr: StmtExpr::Input { index },
                    reads: Vec::new(),
                    array: Some(array),
                    flow_dim: None,
                    write: Some(IndexMap::identity(1)),
                });
                self.program.inputs.push(stmt);
                Ok(ParamBinding::Scalar(array))
            }
        }
    }

    /// Identifiers transitively referenced from `expr`, dependency-first,
    /// skipping constant-foldable scalars.
    fn reachable_ids(&self, expr: &Expr) -> Vec<IdHandle> {
        let mut order = Vec::new();
        let mut visited = vec![false; self.model.ids.len()];
        let mut stack = Vec::new();
        collect_refs(expr, &mut stack);
        fn visit(
            model: &Model,
            h: IdHandle,
            visited: &mut [bool],
            order: &mut Vec<IdHandle>,
        ) {
            if visited[h.0 as usize] {
                return;
            }
            visited[h.0 as usize] = true;
            let mut inner = Vec::new();
            collect_refs(&model.id(h).expr, &mut inner);
            for d in inner {
                if d != h {
                    visit(model, d, visited, order);
                }
            }
            order.push(h);
        }
        for h in stack {
            visit(self.model, h, &mut visited, &mut order);
        }
        order
            .into_iter()
            .filter(|h| {
                let id = self.model.id(*h);
                if id.ty.is_function() {
                    return false;
                }
                // Constant scalars fold away.
                !(matches!(id.ty, Type::Scalar(_)) && const_int(self.model, &id.expr).is_some())
            })
            .collect()
    }

    fn ensure_lowered(&mut self, handle: IdHandle) -> Result<ArrayId, LowerError> {
        if let Some(array) = self.lowered.get(&handle) {
            return Ok(*array);
        }
        let id = self.model.id(handle);
        // Allocate the array first so self-references resolve.
        let (size, elem) = match &id.ty {
            Type::Array { size, elem } => (size.clone(), *elem),
            Type::Scalar(s) => (vec![Extent::Finite(1)], s.kind),
            _ => {
                return Err(LowerError::unsupported(
                    format!("'{}' cannot be lowered to a statement", id.name),
                    id.location,
                ))
            }
        };
        let array = self
            .program
            .add_array(PolyArray::new(&id.name, size, elem));
        self.lowered.insert(handle, array);
        self.lower_definition(handle, array)?;
        Ok(array)
    }

    fn lower_definition(&mut self, handle: IdHandle, array: ArrayId) -> Result<(), LowerError> {
        let model = self.model;
        let id = model.id(handle);
        if id.ty.is_array() {
            self.lower_array_into(&id.name, &id.expr, array, 0)?;
        } else {
            // Scalar data definition: a one-cell array.
            let mut ctx = StmtCtx::new(&id.name, vec![Extent::Finite(1)], Some(handle));
            let value = self.lower_value(&id.expr, &mut ctx)?;
            self.program.add_statement(Statement {
                name: ctx.name,
                domain: ctx.domain,
                guards: Vec::new(),
                expr: value,
                reads: ctx.reads,
                array: Some(array),
                flow_dim: None,
                write: Some(IndexMap::zero(1, 1)),
            });
        }
        Ok(())
    }

    /// Lower an array-valued expression into a fresh array; returns it.
    fn lower_array_expr(&mut self, name: &str, expr: &Expr) -> Result<ArrayId, LowerError> {
        // Plain aliases do not copy.
        if let Some(alias) = self.array_operand(expr)? {
            return Ok(alias);
        }
        let (size, elem) = match &expr.ty {
            Type::Array { size, elem } => (size.clone(), *elem),
            other => {
                return Err(LowerError::unsupported(
                    format!("expected an array expression, got {}", other),
                    expr.location,
                ))
            }
        };
        let array = self
            .program
            .add_array(PolyArray::new(name, size, elem));
        self.lower_array_into(name, expr, array, 0)?;
        Ok(array)
    }

    /// If `expr` directly names an existing array, return it.
    fn array_operand(&mut self, expr: &Expr) -> Result<Option<ArrayId>, LowerError> {
        match &expr.kind {
            ExprKind::Reference(RefTarget::Id(h)) if self.model.id(*h).ty.is_array() => {
                Ok(Some(self.ensure_lowered(*h)?))
            }
            ExprKind::Reference(RefTarget::FuncVar(v)) => match self.params.get(v) {
                Some(ParamBinding::Array(a)) => Ok(Some(*a)),
                _ => Ok(None),
            },
            _ => Ok(None),
        }
    }

    /// Lower `expr` as statements writing `array`, with the leading
    /// output dimension shifted by `offset` (concatenation parts).
    fn lower_array_into(
        &mut self,
        name: &str,
        expr: &Expr,
        array: ArrayId,
        offset: i64,
    ) -> Result<(), LowerError> {
        match &expr.kind {
            ExprKind::Array { .. } => self.lower_comprehension(name, expr, array, offset),
            ExprKind::Operation {
                kind: OperationKind::ArrayConcat,
                operands,
            } => {
                let mut at = offset;
                for (i, op) in operands.iter().enumerate() {
                    let part = format!("{}_{}", name, i);
                    let extent = match &op.ty {
                        Type::Array { size, .. } => size[0],
                        _ => {
                            return Err(LowerError::unsupported(
                                "'++' operand is not an array",
                                op.location,
                            ))
                        }
                    };
                    if extent.is_infinite() && i + 1 != operands.len() {
                        return Err(LowerError::unsupported(
                            "only the last '++' operand may be infinite",
                            op.location,
                        ));
                    }
                    if let Some(src) = self.array_operand(op)? {
                        self.emit_copy(&part, src, array, at)?;
                    } else {
                        self.lower_array_into(&part, op, array, at)?;
                    }
                    if let Extent::Finite(n) = extent {
                        at += n;
                    }
                }
                Ok(())
            }
            ExprKind::Operation {
                kind: OperationKind::ArrayEnumerate,
                operands,
            } => {
                let lo = affine_of(self.model, &operands[0])
                    .ok_or(LowerError::AffineExpected {
                        range: operands[0].location,
                    })?;
                if !lo.is_constant() {
                    return Err(LowerError::AffineExpected {
                        range: operands[0].location,
                    });
                }
                let extent = match &expr.ty {
                    Type::Array { size, .. } => size[0],
                    _ => Extent::Infinite,
                };
                let dims = 1;
                let value = StmtExpr::Prim {
                    op: PrimitiveOp::Add,
                    kind: PrimKind::Integer,
                    args: vec![
                        StmtExpr::Iterator { dim: 0 },
                        StmtExpr::Const(Value::Int(lo.constant)),
                    ],
                };
                let mut write = IndexMap::identity(dims);
                write.constants[0] = offset;
                let flow_dim = extent.is_infinite().then_some(0);
                self.program.add_statement(Statement {
                    name: name.to_string(),
                    domain: vec![extent],
                    guards: Vec::new(),
                    expr: value,
                    reads: Vec::new(),
                    array: Some(array),
                    flow_dim,
                    write: Some(write),
                });
                Ok(())
            }
            ExprKind::FuncApp { object, args } => {
                let substituted = self.beta_reduce(object, args, expr.location)?;
                self.lower_array_into(name, &substituted, array, offset)
            }
            ExprKind::Reference(_) => {
                let src = self.array_operand(expr)?.ok_or_else(|| {
                    LowerError::unsupported("not an array value", expr.location)
                })?;
                self.emit_copy(name, src, array, offset)
            }
            _ => Err(LowerError::unsupported(
                "this expression cannot define an array",
                expr.location,
            )),
        }
    }

    /// A statement copying `src` into `dst` with a leading-dim offset.
    fn emit_copy(
        &mut self,
        name: &str,
        src: ArrayId,
        dst: ArrayId,
        offset: i64,
    ) -> Result<(), LowerError> {
        let size = self.program.array(src).size.clone();
        let dims = size.len();
        let flow_dim = size.iter().position(|e| e.is_infinite());
        let read = ReadAccess {
            array: src,
            map: IndexMap::identity(dims),
        };
        let mut write = IndexMap::identity(dims);
        write.constants[0] = offset;
        self.program.add_statement(Statement {
            name: name.to_string(),
            domain: size,
            guards: Vec::new(),
            expr: StmtExpr::Read { access: 0 },
            reads: vec![read],
            array: Some(dst),
            flow_dim,
            write: Some(write),
        });
        Ok(())
    }

    /// Lower `[vars: body]` (possibly nested) into statements.
    fn lower_comprehension(
        &mut self,
        name: &str,
        expr: &Expr,
        array: ArrayId,
        offset: i64,
    ) -> Result<(), LowerError> {
        // Flatten nested comprehensions into one variable list.
        let mut vars: Vec<VarHandle> = Vec::new();
        let mut body = expr;
        let self_id = match &expr.kind {
            ExprKind::Array { .. } => self.lowered_id_of(array),
            _ => None,
        };
        while let ExprKind::Array { vars: vs, body: b, .. } = &body.kind {
            vars.extend(vs.iter().copied());
            body = b;
        }
        // Domain extents and the variable environment.
        let dims = vars.len();
        let mut domain = Vec::with_capacity(dims);
        let mut env: VarEnv = HashMap::new();
        let mut write = IndexMap::zero(dims, dims);
        let mut infinite_seen = false;
        for (d, var) in vars.iter().enumerate() {
            let (extent, lo) = self.var_domain(*var, dims, &env)?;
            if extent.is_infinite() {
                if infinite_seen {
                    return Err(LowerError::unsupported(
                        "an array may have at most one infinite dimension",
                        self.model.array_var(*var).location,
                    ));
                }
                infinite_seen = true;
            }
            domain.push(extent);
            let value = DimExpr::dim(dims, d).add(&lo);
            // write: out_d = iter_d + lo(outer iters)
            for (c, coef) in value.coefs.iter().enumerate() {
                write.coef[d][c] = *coef;
            }
            write.constants[d] = value.constant;
            env.insert(*var, value);
        }
        write.constants[0] += offset;
        let flow_dim = domain.iter().position(|e| e.is_infinite());

        match &body.kind {
            ExprKind::ArrayPatterns(patterns) => self.lower_patterns(
                name, patterns, array, &domain, &env, &write, flow_dim, body.location,
            ),
            ExprKind::CaseExpr(cases) if self.all_guards_affine(cases, &env) => self
                .lower_case_split(
                    name, cases, array, &domain, &env, &write, flow_dim, self_id,
                ),
            _ => {
                let mut ctx = StmtCtx {
                    name: name.to_string(),
                    domain: domain.clone(),
                    env,
                    reads: Vec::new(),
                    self_id,
                    self_array: Some(array),
                };
                let value = self.lower_value(body, &mut ctx)?;
                self.program.add_statement(Statement {
                    name: ctx.name,
                    domain,
                    guards: Vec::new(),
                    expr: value,
                    reads: ctx.reads,
                    array: Some(array),
                    flow_dim,
                    write: Some(write),
                });
                Ok(())
            }
        }
    }

    fn lowered_id_of(&self, array: ArrayId) -> Option<IdHandle> {
        self.lowered
            .iter()
            .find(|(_, a)| **a == array)
            .map(|(h, _)| *h)
    }

    /// Extent and lower bound of one bound variable.
    fn var_domain(
        &self,
        var: VarHandle,
        dims: usize,
        env: &VarEnv,
    ) -> Result<(Extent, DimExpr), LowerError> {
        let v = self.model.array_var(var);
        let zero = DimExpr::constant(dims, 0);
        let Some(range) = &v.range else {
            return Ok((Extent::Infinite, zero));
        };
        match &range.kind {
            ExprKind::Infinity => Ok((Extent::Infinite, zero)),
            ExprKind::Operation {
                kind: OperationKind::ArrayEnumerate,
                operands,
            } => {
                let lo = self.dim_expr_of(&operands[0], dims, env)?;
                let hi = self.dim_expr_of(&operands[1], dims, env)?;
                let diff = hi.sub(&lo);
                if !diff.is_constant() {
                    return Err(LowerError::AffineExpected {
                        range: range.location,
                    });
                }
                Ok((Extent::Finite(diff.constant + 1), lo))
            }
            _ => match const_int(self.model, range) {
                Some(n) => Ok((Extent::Finite(n), zero)),
                None => Err(LowerError::AffineExpected {
                    range: range.location,
                }),
            },
        }
    }

    /// Affine coercion into iteration-dimension form.
    fn dim_expr_of(
        &self,
        expr: &Expr,
        dims: usize,
        env: &VarEnv,
    ) -> Result<DimExpr, LowerError> {
        let lin = affine_of(self.model, expr).ok_or(LowerError::AffineExpected {
            range: expr.location,
        })?;
        self.dim_expr_of_lin(&lin, dims, env, expr.location)
    }

    fn dim_expr_of_lin(
        &self,
        lin: &LinExpr,
        dims: usize,
        env: &VarEnv,
        range: CodeRange,
    ) -> Result<DimExpr, LowerError> {
        let mut out = DimExpr::constant(dims, lin.constant);
        for (var, coef) in lin.terms() {
            let bound = env
                .get(&var)
                .ok_or(LowerError::AffineExpected { range })?;
            out = out.add(&bound.scale(coef));
        }
        Ok(out)
    }

    #[allow(clippy::too_many_arguments)]
    fn lower_patterns(
        &mut self,
        name: &str,
        patterns: &[Pattern],
        array: ArrayId,
        domain: &[Extent],
        env: &VarEnv,
        write: &IndexMap,
        flow_dim: Option<usize>,
        location: CodeRange,
    ) -> Result<(), LowerError> {
        // Fixed indexes claim single cells of the leading dimension; the
        // variable pattern takes the rest, rebased past the largest fixed
        // index.
        let base = patterns
            .iter()
            .filter(|p| p.indexes[0].var.is_none())
            .map(|p| p.indexes[0].value)
            .max()
            .map(|m| m + 1)
            .unwrap_or(0);
        for (k, pattern) in patterns.iter().enumerate() {
            let part = format!("{}_{}", name, k);
            let index = &pattern.indexes[0];
            let (part_domain, part_write, shift) = match index.var {
                None => {
                    let mut d = domain.to_vec();
                    d[0] = Extent::Finite(1);
                    let mut w = write.clone();
                    w.constants[0] += index.value;
                    (d, w, DimExpr::constant(domain.len(), index.value))
                }
                Some(_) => {
                    let mut d = domain.to_vec();
                    d[0] = match d[0] {
                        Extent::Finite(n) => {
                            if n <= base {
                                return Err(LowerError::unsupported(
                                    "array patterns cover the whole extent",
                                    location,
                                ));
                            }
                            Extent::Finite(n - base)
                        }
                        Extent::Infinite => Extent::Infinite,
                    };
                    let mut w = write.clone();
                    w.constants[0] += base;
                    (d, w, DimExpr::constant(domain.len(), base))
                }
            };
            // Rebase the leading variable inside this part's environment.
            let mut part_env = env.clone();
            if let Some((var, _)) = env
                .iter()
                .find(|(_, e)| *e == &DimExpr::dim(domain.len(), 0))
            {
                let rebased = DimExpr::dim(domain.len(), 0).add(&shift);
                part_env.insert(*var, rebased);
            }
            let part_flow = part_domain.iter().position(|e| e.is_infinite());
            debug_assert!(flow_dim.is_none() || part_flow.is_none() || flow_dim == part_flow);
            let mut ctx = StmtCtx {
                name: part,
                domain: part_domain.clone(),
                env: part_env,
                reads: Vec::new(),
                self_id: self.lowered_id_of(array),
                self_array: Some(array),
            };
            let value = self.lower_value(&pattern.value, &mut ctx)?;
            self.program.add_statement(Statement {
                name: ctx.name,
                domain: part_domain,
                guards: Vec::new(),
                expr: value,
                reads: ctx.reads,
                array: Some(array),
                flow_dim: part_flow,
                write: Some(part_write),
            });
        }
        Ok(())
    }

    fn all_guards_affine(&self, cases: &[Case], env: &VarEnv) -> bool {
        cases.iter().all(|c| match &c.guard {
            None => true,
            Some(g) => self.guard_constraints(g, env.len().max(1), env).is_ok(),
        })
    }

    /// Turn an affine boolean guard into domain constraints.
    fn guard_constraints(
        &self,
        guard: &Expr,
        dims: usize,
        env: &VarEnv,
    ) -> Result<Vec<DomainConstraint>, LowerError> {
        let range = guard.location;
        let ExprKind::Primitive { op, operands } = &guard.kind else {
            return Err(LowerError::AffineExpected { range });
        };
        match op {
            PrimitiveOp::And => {
                let mut out = self.guard_constraints(&operands[0], dims, env)?;
                out.extend(self.guard_constraints(&operands[1], dims, env)?);
                Ok(out)
            }
            PrimitiveOp::Lt | PrimitiveOp::Lte | PrimitiveOp::Gt | PrimitiveOp::Gte
            | PrimitiveOp::Eq => {
                let lhs = self.dim_expr_of(&operands[0], dims, env)?;
                let rhs = self.dim_expr_of(&operands[1], dims, env)?;
                // expr ≥ 0 form
                let (expr, equality) = match op {
                    PrimitiveOp::Lt => (rhs.sub(&lhs).add(&DimExpr::constant(dims, -1)), false),
                    PrimitiveOp::Lte => (rhs.sub(&lhs), false),
                    PrimitiveOp::Gt => (lhs.sub(&rhs).add(&DimExpr::constant(dims, -1)), false),
                    PrimitiveOp::Gte => (lhs.sub(&rhs), false),
                    PrimitiveOp::Eq => (lhs.sub(&rhs), true),
                    _ => unreachable!("matched above"),
                };
                Ok(vec![DomainConstraint {
                    coefs: expr.coefs,
                    constant: expr.constant,
                    equality,
                }])
            }
            _ => Err(LowerError::AffineExpected { range }),
        }
    }

    /// Negate a single-constraint guard (for the default arm's domain).
    fn negate_constraint(
        c: &DomainConstraint,
        range: CodeRange,
    ) -> Result<DomainConstraint, LowerError> {
        if c.equality {
            return Err(LowerError::unsupported(
                "cannot take the default of an equality guard",
                range,
            ));
        }
        // ¬(e ≥ 0) ⇔ −e − 1 ≥ 0
        Ok(DomainConstraint {
            coefs: c.coefs.iter().map(|x| -x).collect(),
            constant: -c.constant - 1,
            equality: false,
        })
    }

    #[allow(clippy::too_many_arguments)]
    fn lower_case_split(
        &mut self,
        name: &str,
        cases: &[Case],
        array: ArrayId,
        domain: &[Extent],
        env: &VarEnv,
        write: &IndexMap,
        flow_dim: Option<usize>,
        self_id: Option<IdHandle>,
    ) -> Result<(), LowerError> {
        let dims = domain.len();
        let mut prior: Vec<DomainConstraint> = Vec::new();
        let mut default_ok = true;
        for (k, case) in cases.iter().enumerate() {
            let part = format!("{}_{}", name, k);
            let mut guards: Vec<DomainConstraint> = Vec::new();
            match &case.guard {
                Some(g) => {
                    let cs = self.guard_constraints(g, dims, env)?;
                    // The default arm needs each prior guard negated; only
                    // single-inequality guards negate convexly.
                    if cs.len() == 1 && !cs[0].equality {
                        prior.push(cs[0].clone());
                    } else {
                        default_ok = false;
                    }
                    guards.extend(cs);
                }
                None => {
                    if !default_ok {
                        return Err(LowerError::unsupported(
                            "default case cannot follow a compound guard",
                            case.value.location,
                        ));
                    }
                    for p in &prior {
                        guards.push(Self::negate_constraint(p, case.value.location)?);
                    }
                }
            }
            let mut ctx = StmtCtx {
                name: part,
                domain: domain.to_vec(),
                env: env.clone(),
                reads: Vec::new(),
                self_id,
                self_array: Some(array),
            };
            let value = self.lower_value(&case.value, &mut ctx)?;
            self.program.add_statement(Statement {
                name: ctx.name,
                domain: domain.to_vec(),
                guards,
                expr: value,
                reads: ctx.reads,
                array: Some(array),
                flow_dim,
                write: Some(write.clone()),
            });
        }
        Ok(())
    }

    /// Inline a function application by substituting arguments.
    fn beta_reduce(
        &self,
        object: &Expr,
        args: &[Expr],
        range: CodeRange,
    ) -> Result<Expr, LowerError> {
        let ExprKind::Reference(RefTarget::Id(f)) = &object.kind else {
            return Err(LowerError::unsupported(
                "only named functions can be applied",
                range,
            ));
        };
        let f = *f;
        let ExprKind::Function { params, body, .. } = &self.model.id(f).expr.kind else {
            return Err(LowerError::unsupported(
                format!("'{}' is not a function", self.model.id(f).name),
                range,
            ));
        };
        let bindings: HashMap<FuncVarHandle, Expr> = params
            .iter()
            .copied()
            .zip(args.iter().cloned())
            .collect();
        Ok(substitute(body, &bindings))
    }

    /// Lower a scalar-valued expression into a statement body.
    fn lower_value(&mut self, expr: &Expr, ctx: &mut StmtCtx) -> Result<StmtExpr, LowerError> {
        match &expr.kind {
            ExprKind::IntConst(v) => Ok(StmtExpr::Const(Value::Int(*v))),
            ExprKind::RealConst(v) => Ok(StmtExpr::Const(Value::Real(*v))),
            ExprKind::ComplexConst { re, im } => Ok(StmtExpr::Const(Value::Complex(*re, *im))),
            ExprKind::BoolConst(v) => Ok(StmtExpr::Const(Value::Bool(*v))),
            ExprKind::Infinity => Err(LowerError::unsupported(
                "infinity is not a runtime value",
                expr.location,
            )),
            ExprKind::Primitive { op, operands } => {
                let args = operands
                    .iter()
                    .map(|o| self.lower_value(o, ctx))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(StmtExpr::Prim {
                    op: *op,
                    kind: expr.ty.elem_kind(),
                    args,
                })
            }
            ExprKind::Reference(RefTarget::ArrayVar(v)) => {
                let bound = ctx.env.get(v).cloned().ok_or(LowerError::AffineExpected {
                    range: expr.location,
                })?;
                Ok(dim_expr_value(&bound))
            }
            ExprKind::Reference(RefTarget::Id(h)) => {
                if let Some(v) = const_int(self.model, &self.model.id(*h).expr) {
                    return Ok(StmtExpr::Const(Value::Int(v)));
                }
                let src = self.ensure_lowered(*h)?;
                if self.model.id(*h).ty.is_array() {
                    return Err(LowerError::unsupported(
                        format!("array '{}' must be indexed here", self.model.id(*h).name),
                        expr.location,
                    ));
                }
                Ok(ctx.read_cell(src))
            }
            ExprKind::Reference(RefTarget::FuncVar(v)) => match self.params.get(v) {
                Some(ParamBinding::Scalar(a)) => Ok(ctx.read_cell(*a)),
                Some(ParamBinding::Array(_)) => Err(LowerError::unsupported(
                    "stream parameter must be indexed here",
                    expr.location,
                )),
                None => Err(LowerError::unsupported(
                    "unbound function parameter",
                    expr.location,
                )),
            },
            ExprKind::ArraySelfRef(_) => Err(LowerError::unsupported(
                "recursive array must be indexed",
                expr.location,
            )),
            ExprKind::ArrayApp { object, args } => self.lower_read(object, args, ctx, expr.location),
            ExprKind::CaseExpr(cases) => {
                let mut lowered = Vec::new();
                for c in cases {
                    let guard = c
                        .guard
                        .as_ref()
                        .map(|g| self.lower_value(g, ctx))
                        .transpose()?
                        .map(Box::new);
                    let value = self.lower_value(&c.value, ctx)?;
                    lowered.push((guard, value));
                }
                Ok(StmtExpr::Select { cases: lowered })
            }
            ExprKind::FuncApp { object, args } => {
                let substituted = self.beta_reduce(object, args, expr.location)?;
                self.lower_value(&substituted, ctx)
            }
            ExprKind::Affine(lin) => {
                let e = self.dim_expr_of_lin(lin, ctx.domain.len(), &ctx.env, expr.location)?;
                Ok(dim_expr_value(&e))
            }
            _ => Err(LowerError::unsupported(
                "expression cannot appear in a statement body",
                expr.location,
            )),
        }
    }

    /// `object[args]`: resolve the target array and build the read
    /// relation from the affine index arguments.
    fn lower_read(
        &mut self,
        object: &Expr,
        args: &[Expr],
        ctx: &mut StmtCtx,
        range: CodeRange,
    ) -> Result<StmtExpr, LowerError> {
        let array = match &object.kind {
            ExprKind::ArraySelfRef(_) => ctx.self_array.ok_or_else(|| {
                LowerError::unsupported("self-reference outside an array", range)
            })?,
            _ => self
                .array_operand(object)?
                .ok_or_else(|| LowerError::unsupported("cannot index this expression", range))?,
        };
        let rank = self.program.array(array).size.len();
        if args.len() != rank {
            return Err(LowerError::unsupported(
                format!("array expects {} subscripts, got {}", rank, args.len()),
                range,
            ));
        }
        let dims = ctx.domain.len();
        let mut map = IndexMap::zero(rank, dims);
        for (r, arg) in args.iter().enumerate() {
            let e = self.dim_expr_of(arg, dims, &ctx.env)?;
            map.coef[r].copy_from_slice(&e.coefs);
            map.constants[r] = e.constant;
        }
        let access = ctx.reads.len();
        ctx.reads.push(ReadAccess { array, map });
        Ok(StmtExpr::Read { access })
    }

    /// Grow each array to the image of its writers (enumerated ranges and
    /// concatenation shift cells past the declared extents).
    fn size_arrays_from_writes(&mut self) {
        let mut sizes: Vec<Vec<Extent>> = self
            .program
            .arrays
            .iter()
            .map(|a| a.size.clone())
            .collect();
        for stmt in &self.program.statements {
            let (Some(array), Some(write)) = (stmt.array, &stmt.write) else {
                continue;
            };
            for (d, row) in write.coef.iter().enumerate() {
                let mut hi: i64 = write.constants[d];
                let mut unbounded = false;
                for (c, coef) in row.iter().enumerate() {
                    if *coef == 0 {
                        continue;
                    }
                    match stmt.domain[c] {
                        Extent::Finite(n) => {
                            if *coef > 0 {
                                hi += coef * (n - 1);
                            }
                        }
                        Extent::Infinite => unbounded = true,
                    }
                }
                let current = &mut sizes[array][d];
                if unbounded {
                    *current = Extent::Infinite;
                } else if let Extent::Finite(cur) = *current {
                    *current = Extent::Finite(cur.max(hi + 1));
                }
            }
        }
        for (a, size) in sizes.into_iter().enumerate() {
            self.program.arrays[a].size = size;
        }
    }
}

/// Per-statement lowering context.
struct StmtCtx {
    name: String,
    domain: Vec<Extent>,
    env: VarEnv,
    reads: Vec<ReadAccess>,
    #[allow(dead_code)]
    self_id: Option<IdHandle>,
    self_array: Option<ArrayId>,
}

impl StmtCtx {
    fn new(name: &str, domain: Vec<Extent>, self_id: Option<IdHandle>) -> Self {
        Self {
            name: name.to_string(),
            domain,
            env: HashMap::new(),
            reads: Vec::new(),
            self_id,
            self_array: None,
        }
    }

    /// Read the single cell of a scalar-holding array.
    fn read_cell(&mut self, array: ArrayId) -> StmtExpr {
        let access = self.reads.len();
        self.reads.push(ReadAccess {
            array,
            map: IndexMap::zero(1, self.domain.len()),
        });
        StmtExpr::Read { access }
    }
}

/// Statement-body rendering of an affine value over iteration dims.
fn dim_expr_value(e: &DimExpr) -> StmtExpr {
    let mut terms: Vec<StmtExpr> = Vec::new();
    for (d, coef) in e.coefs.iter().enumerate() {
        if *coef == 0 {
            continue;
        }
        let it = StmtExpr::Iterator { dim: d };
        if *coef == 1 {
            terms.push(it);
        } else {
            terms.push(StmtExpr::Prim {
                op: PrimitiveOp::Mul,
                kind: PrimKind::Integer,
                args: vec![StmtExpr::Const(Value::Int(*coef)), it],
            });
        }
    }
    if e.constant != 0 || terms.is_empty() {
        terms.push(StmtExpr::Const(Value::Int(e.constant)));
    }
    terms
        .into_iter()
        .reduce(|a, b| StmtExpr::Prim {
            op: PrimitiveOp::Add,
            kind: PrimKind::Integer,
            args: vec![a, b],
        })
        .expect("at least one term")
}

/// Clone `expr` with function parameters replaced by argument expressions.
fn substitute(expr: &Expr, bindings: &HashMap<FuncVarHandle, Expr>) -> Expr {
    let mut out = expr.clone();
    substitute_in_place(&mut out, bindings);
    out
}

fn substitute_in_place(expr: &mut Expr, bindings: &HashMap<FuncVarHandle, Expr>) {
    if let ExprKind::Reference(RefTarget::FuncVar(v)) = &expr.kind {
        if let Some(replacement) = bindings.get(v) {
            *expr = replacement.clone();
            return;
        }
    }
    match &mut expr.kind {
        ExprKind::Primitive { operands, .. } | ExprKind::Operation { operands, .. } => {
            for o in operands {
                substitute_in_place(o, bindings);
            }
        }
        ExprKind::Array { body, .. } | ExprKind::Function { body, .. } => {
            substitute_in_place(body, bindings);
        }
        ExprKind::ArrayPatterns(patterns) => {
            for p in patterns {
                if let Some(g) = &mut p.guard {
                    substitute_in_place(g, bindings);
                }
                substitute_in_place(&mut p.value, bindings);
            }
        }
        ExprKind::ArrayApp { object, args } | ExprKind::FuncApp { object, args } => {
            substitute_in_place(object, bindings);
            for a in args {
                substitute_in_place(a, bindings);
            }
        }
        ExprKind::ArraySize { object, dim } => {
            substitute_in_place(object, bindings);
            if let Some(d) = dim {
                substitute_in_place(d, bindings);
            }
        }
        ExprKind::CaseExpr(cases) => {
            for c in cases {
                if let Some(g) = &mut c.guard {
                    substitute_in_place(g, bindings);
                }
                substitute_in_place(&mut c.value, bindings);
            }
        }
        _ => {}
    }
}

fn collect_refs(expr: &Expr, out: &mut Vec<IdHandle>) {
    match &expr.kind {
        ExprKind::Reference(RefTarget::Id(h)) => out.push(*h),
        ExprKind::Primitive { operands, .. } | ExprKind::Operation { operands, .. } => {
            for o in operands {
                collect_refs(o, out);
            }
        }
        ExprKind::Array { body, .. } | ExprKind::Function { body, .. } => collect_refs(body, out),
        ExprKind::ArrayPatterns(patterns) => {
            for p in patterns {
                if let Some(g) = &p.guard {
                    collect_refs(g, out);
                }
                collect_refs(&p.value, out);
            }
        }
        ExprKind::ArrayApp { object, args } | ExprKind::FuncApp { object, args } => {
            collect_refs(object, out);
            for a in args {
                collect_refs(a, out);
            }
        }
        ExprKind::ArraySize { object, dim } => {
            collect_refs(object, out);
            if let Some(d) = dim {
                collect_refs(d, out);
            }
        }
        ExprKind::CaseExpr(cases) => {
            for c in cases {
                if let Some(g) = &c.guard {
                    collect_refs(g, out);
                }
                collect_refs(&c.value, out);
            }
        }
        _ => {}
    }
}
