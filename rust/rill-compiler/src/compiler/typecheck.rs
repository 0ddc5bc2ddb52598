//! Type checking for the functional IR.
//!
//! Every identifier starts `undefined`; the first pass computes a
//! candidate type, and when the defining expression is a recursive array
//! the pass reruns once with the candidate visible through
//! `ArraySelfRef`, reaching a fixed point in exactly two iterations since the
//! self-reference is the only inductive edge. A still-undefined result is
//! `AmbiguousResult`.

use crate::compiler::affine::LinExpr;
use crate::compiler::fir::*;
use rill_core::location::CodeRange;
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Error, Clone)]
pub enum TypeError {
    #[error("ambiguous result type")]
    AmbiguousResult { range: CodeRange },
    #[error("incompatible case types")]
    IncompatibleCases { range: CodeRange },
    #[error("invalid argument types: {detail}")]
    InvalidArgumentTypes { detail: String, range: CodeRange },
    #[error("ambiguous function resolution")]
    AmbiguousCall { range: CodeRange },
}

impl TypeError {
    pub fn range(&self) -> CodeRange {
        match self {
            TypeError::AmbiguousResult { range }
            | TypeError::IncompatibleCases { range }
            | TypeError::InvalidArgumentTypes { range, .. }
            | TypeError::AmbiguousCall { range } => *range,
        }
    }
}

pub struct TypeChecker<'m> {
    model: &'m mut Model,
    /// Function parameter types bound by the current call.
    params: HashMap<FuncVarHandle, Type>,
    /// Identifiers currently being processed (cycle guard; the explicit
    /// stack the self-reference resolution leans on).
    stack: Vec<IdHandle>,
}

/// Type every identifier reachable from the top scope.
pub fn process(model: &mut Model) -> Result<(), TypeError> {
    let order = model.top.ids.clone();
    let mut checker = TypeChecker {
        model,
        params: HashMap::new(),
        stack: Vec::new(),
    };
    for id in order {
        checker.process_id(id)?;
    }
    Ok(())
}

/// Type-check a call of function `f` with the given argument types and
/// return the result type. The function body keeps its annotations for
/// the translator.
pub fn check_call(model: &mut Model, f: IdHandle, args: &[Type]) -> Result<Type, TypeError> {
    let location = model.id(f).location;
    let params: Vec<FuncVarHandle> = match &model.id(f).expr.kind {
        ExprKind::Function { params, .. } => params.clone(),
        _ => {
            if !args.is_empty() {
                return Err(TypeError::InvalidArgumentTypes {
                    detail: format!("'{}' is not a function", model.id(f).name),
                    range: location,
                });
            }
            let mut checker = TypeChecker {
                model,
                params: HashMap::new(),
                stack: Vec::new(),
            };
            checker.process_id(f)?;
            return Ok(checker.model.id(f).ty.clone());
        }
    };
    if params.len() != args.len() {
        return Err(TypeError::InvalidArgumentTypes {
            detail: format!(
                "'{}' takes {} arguments, got {}",
                model.id(f).name,
                params.len(),
                args.len()
            ),
            range: location,
        });
    }
    let bindings: Vec<(FuncVarHandle, Type)> = params
        .iter()
        .copied()
        .zip(args.iter().cloned())
        .collect();
    let mut checker = TypeChecker {
        model,
        params: bindings.into_iter().collect(),
        stack: Vec::new(),
    };
    checker.stack.push(f);
    let mut expr = std::mem::take(&mut checker.model.id_mut(f).expr);
    let result = (|| {
        let ExprKind::Function { body, .. } = &mut expr.kind else {
            unreachable!("checked above");
        };
        let ty = checker.infer(body)?;
        if ty.is_undefined() {
            return Err(TypeError::AmbiguousResult { range: location });
        }
        Ok(ty)
    })();
    checker.model.id_mut(f).expr = expr;
    checker.stack.pop();
    result
}

impl<'m> TypeChecker<'m> {
    fn process_id(&mut self, handle: IdHandle) -> Result<(), TypeError> {
        if !self.model.id(handle).ty.is_undefined() {
            return Ok(());
        }
        if self.stack.contains(&handle) {
            // In progress: callers see the undefined sentinel.
            return Ok(());
        }
        self.stack.push(handle);
        let result = self.process_id_inner(handle);
        self.stack.pop();
        result
    }

    fn process_id_inner(&mut self, handle: IdHandle) -> Result<(), TypeError> {
        let location = self.model.id(handle).location;
        let mut expr = std::mem::take(&mut self.model.id_mut(handle).expr);
        let first = self.infer(&mut expr);
        self.model.id_mut(handle).expr = expr;
        let ty = first?;
        if ty.is_undefined() {
            return Err(TypeError::AmbiguousResult { range: location });
        }
        self.model.id_mut(handle).ty = ty;
        let recursive_array = matches!(
            &self.model.id(handle).expr.kind,
            ExprKind::Array { is_recursive: true, .. }
        );
        if recursive_array {
            // Second pass with the candidate visible through the self-ref.
            let mut expr = std::mem::take(&mut self.model.id_mut(handle).expr);
            let second = self.infer(&mut expr);
            self.model.id_mut(handle).expr = expr;
            let ty = second?;
            if ty.is_undefined() {
                return Err(TypeError::AmbiguousResult { range: location });
            }
            self.model.id_mut(handle).ty = ty;
        }
        Ok(())
    }

    fn infer(&mut self, expr: &mut Expr) -> Result<Type, TypeError> {
        let range = expr.location;
        // These two rewrite `expr` as a whole, so they are dispatched
        // before the in-place match below.
        let op_kind = match &expr.kind {
            ExprKind::Operation { kind, .. } => Some(*kind),
            _ => None,
        };
        if let Some(kind) = op_kind {
            let ty = self.infer_operation(kind, expr)?;
            expr.ty = ty.clone();
            return Ok(ty);
        }
        if matches!(expr.kind, ExprKind::ArraySize { .. }) {
            let ty = self.infer_size(expr)?;
            expr.ty = ty.clone();
            return Ok(ty);
        }
        let ty = match &mut expr.kind {
            ExprKind::IntConst(_) => Type::Scalar(ScalarType::int_const()),
            ExprKind::RealConst(_) => Type::scalar(PrimKind::Real),
            ExprKind::ComplexConst { .. } => Type::scalar(PrimKind::Complex),
            ExprKind::BoolConst(_) => Type::scalar(PrimKind::Boolean),
            ExprKind::Infinity => Type::scalar(PrimKind::Infinity),
            ExprKind::Primitive { op, operands } => {
                let op = *op;
                let mut kinds = Vec::with_capacity(operands.len());
                for operand in operands.iter_mut() {
                    let t = self.infer(operand)?;
                    if t.is_function() || t.is_array() {
                        return Err(TypeError::InvalidArgumentTypes {
                            detail: format!(
                                "operand of '{}' must be scalar, got {}",
                                op, t
                            ),
                            range: operand.location,
                        });
                    }
                    kinds.push(t.elem_kind());
                }
                let kind = result_type(op, &kinds).map_err(|e| match e {
                    SignatureError::NoMatch => TypeError::InvalidArgumentTypes {
                        detail: format!(
                            "'{}' does not accept ({})",
                            op,
                            kinds
                                .iter()
                                .map(|k| k.to_string())
                                .collect::<Vec<_>>()
                                .join(", ")
                        ),
                        range,
                    },
                    SignatureError::Ambiguous => TypeError::AmbiguousCall { range },
                })?;
                Type::scalar(kind)
            }
            ExprKind::Operation { .. } | ExprKind::ArraySize { .. } => {
                unreachable!("dispatched above")
            }
            ExprKind::Reference(target) => match *target {
                RefTarget::Id(id) => {
                    self.process_id(id)?;
                    self.model.id(id).ty.clone()
                }
                RefTarget::ArrayVar(_) => {
                    // Iteration variables are affine integers.
                    let mut t = ScalarType::new(PrimKind::Integer);
                    t.affine = true;
                    Type::Scalar(t)
                }
                RefTarget::FuncVar(v) => {
                    self.params.get(&v).cloned().unwrap_or(Type::Undefined)
                }
            },
            ExprKind::ArraySelfRef(id) => self.model.id(*id).ty.clone(),
            ExprKind::Array { vars, body, .. } => {
                let vars = vars.clone();
                let mut size = Vec::with_capacity(vars.len());
                for v in &vars {
                    size.push(self.var_extent(*v)?);
                }
                let body_ty = self.infer(body)?;
                if body_ty.is_undefined() {
                    Type::Undefined
                } else {
                    size.extend_from_slice(body_ty.shape());
                    Type::Array {
                        size,
                        elem: body_ty.elem_kind(),
                    }
                }
            }
            ExprKind::ArrayPatterns(patterns) => {
                let mut result = PrimKind::Undefined;
                let mut shape: Vec<Extent> = Vec::new();
                for p in patterns.iter_mut() {
                    if let Some(g) = &mut p.guard {
                        self.infer(g)?;
                    }
                    let t = self.infer(&mut p.value)?;
                    result = common_type(result, t.elem_kind())
                        .ok_or(TypeError::IncompatibleCases { range })?;
                    if !t.shape().is_empty() {
                        shape = t.shape().to_vec();
                    }
                }
                if result == PrimKind::Undefined {
                    Type::Undefined
                } else if shape.is_empty() {
                    Type::scalar(result)
                } else {
                    Type::Array {
                        size: shape,
                        elem: result,
                    }
                }
            }
            ExprKind::ArrayApp { object, args } => {
                let object_ty = self.infer(object)?;
                for a in args.iter_mut() {
                    self.infer(a)?;
                }
                if object_ty.is_undefined() {
                    Type::Undefined
                } else {
                    let shape = object_ty.shape();
                    if !object_ty.is_array() || args.len() > shape.len() {
                        return Err(TypeError::InvalidArgumentTypes {
                            detail: format!(
                                "indexing {} with {} subscripts",
                                object_ty,
                                args.len()
                            ),
                            range,
                        });
                    }
                    let rest = &shape[args.len()..];
                    if rest.is_empty() {
                        Type::scalar(object_ty.elem_kind())
                    } else {
                        Type::Array {
                            size: rest.to_vec(),
                            elem: object_ty.elem_kind(),
                        }
                    }
                }
            }
            ExprKind::FuncApp { object, args } => {
                let ExprKind::Reference(RefTarget::Id(f)) = &object.kind else {
                    return Err(TypeError::InvalidArgumentTypes {
                        detail: "only named functions can be applied".to_string(),
                        range: object.location,
                    });
                };
                let f = *f;
                let mut arg_types = Vec::with_capacity(args.len());
                for a in args.iter_mut() {
                    arg_types.push(self.infer(a)?);
                }
                self.infer_func_app(f, &arg_types, range)?
            }
            ExprKind::Function { params, .. } => Type::Function {
                arity: params.len(),
            },
            ExprKind::CaseExpr(cases) => {
                let mut result = PrimKind::Undefined;
                let mut shape: Vec<Extent> = Vec::new();
                for c in cases.iter_mut() {
                    if let Some(g) = &mut c.guard {
                        let gt = self.infer(g)?;
                        if gt.elem_kind() != PrimKind::Boolean
                            && gt.elem_kind() != PrimKind::Undefined
                        {
                            return Err(TypeError::InvalidArgumentTypes {
                                detail: format!("case guard must be boolean, got {}", gt),
                                range: g.location,
                            });
                        }
                    }
                    let t = self.infer(&mut c.value)?;
                    result = common_type(result, t.elem_kind())
                        .ok_or(TypeError::IncompatibleCases { range })?;
                    if !t.shape().is_empty() {
                        shape = t.shape().to_vec();
                    }
                }
                if result == PrimKind::Undefined {
                    Type::Undefined
                } else if shape.is_empty() {
                    Type::scalar(result)
                } else {
                    Type::Array {
                        size: shape,
                        elem: result,
                    }
                }
            }
            ExprKind::Affine(_) => {
                let mut t = ScalarType::new(PrimKind::Integer);
                t.affine = true;
                Type::Scalar(t)
            }
            ExprKind::AffineSet(_) => Type::scalar(PrimKind::Boolean),
        };
        expr.ty = ty.clone();
        Ok(ty)
    }

    /// `#a` / `#a@d`: folds the node to the constant extent (or to the
    /// infinity literal) so the translator sees plain affine expressions.
    fn infer_size(&mut self, expr: &mut Expr) -> Result<Type, TypeError> {
        let range = expr.location;
        let (object_ty, dim_value) = {
            let ExprKind::ArraySize { object, dim } = &mut expr.kind else {
                unreachable!("caller matched ArraySize");
            };
            let object_ty = self.infer(object)?;
            let dim_value = match dim {
                Some(d) => {
                    self.infer(d)?;
                    Some(const_int(self.model, d).ok_or_else(|| {
                        TypeError::InvalidArgumentTypes {
                            detail: "size dimension must be a constant integer".to_string(),
                            range: d.location,
                        }
                    })?)
                }
                None => None,
            };
            (object_ty, dim_value)
        };
        let shape = object_ty.shape();
        let index = dim_value.unwrap_or(1) - 1;
        if index < 0 || index as usize >= shape.len() {
            return Err(TypeError::InvalidArgumentTypes {
                detail: format!("size dimension {} out of range for {}", index + 1, object_ty),
                range,
            });
        }
        match shape[index as usize] {
            Extent::Finite(n) => {
                expr.kind = ExprKind::IntConst(n);
                Ok(Type::Scalar(ScalarType::int_const()))
            }
            Extent::Infinite => {
                expr.kind = ExprKind::Infinity;
                Ok(Type::scalar(PrimKind::Infinity))
            }
        }
    }

    fn infer_operation(&mut self, kind: OperationKind, expr: &mut Expr) -> Result<Type, TypeError> {
        let range = expr.location;
        let ExprKind::Operation { operands, .. } = &mut expr.kind else {
            unreachable!("caller matched Operation");
        };
        match kind {
            OperationKind::ArrayEnumerate => {
                let mut ops = Vec::new();
                for o in operands.iter_mut() {
                    self.infer(o)?;
                    ops.push(o.clone());
                }
                let lo = affine_of(self.model, &ops[0]);
                let hi = affine_of(self.model, &ops[1]);
                let extent = match (lo, hi) {
                    (Some(lo), Some(hi)) => {
                        let diff = hi.sub(&lo);
                        if diff.is_constant() {
                            Extent::Finite(diff.constant + 1)
                        } else {
                            return Err(TypeError::InvalidArgumentTypes {
                                detail: "enumeration length must be constant".to_string(),
                                range,
                            });
                        }
                    }
                    _ => {
                        if matches!(ops[1].kind, ExprKind::Infinity) {
                            Extent::Infinite
                        } else {
                            return Err(TypeError::InvalidArgumentTypes {
                                detail: "enumeration bounds must be affine".to_string(),
                                range,
                            });
                        }
                    }
                };
                Ok(Type::Array {
                    size: vec![extent],
                    elem: PrimKind::Integer,
                })
            }
            OperationKind::ArrayConcat => {
                let mut elem = PrimKind::Undefined;
                let mut leading: Option<Extent> = Some(Extent::Finite(0));
                let mut rest: Option<Vec<Extent>> = None;
                for o in operands.iter_mut() {
                    let t = self.infer(o)?;
                    if t.is_undefined() {
                        return Ok(Type::Undefined);
                    }
                    if !t.is_array() {
                        return Err(TypeError::InvalidArgumentTypes {
                            detail: format!("'++' needs array operands, got {}", t),
                            range: o.location,
                        });
                    }
                    elem = common_type(elem, t.elem_kind())
                        .ok_or(TypeError::IncompatibleCases { range })?;
                    let shape = t.shape();
                    leading = match (leading, shape[0]) {
                        (Some(Extent::Finite(a)), Extent::Finite(b)) => {
                            Some(Extent::Finite(a + b))
                        }
                        _ => Some(Extent::Infinite),
                    };
                    let tail = shape[1..].to_vec();
                    match &rest {
                        None => rest = Some(tail),
                        Some(prev) if *prev == tail => {}
                        Some(_) => {
                            return Err(TypeError::InvalidArgumentTypes {
                                detail: "'++' operands disagree on trailing dimensions"
                                    .to_string(),
                                range,
                            })
                        }
                    }
                }
                let mut size = vec![leading.unwrap_or(Extent::Infinite)];
                size.extend(rest.unwrap_or_default());
                Ok(Type::Array { size, elem })
            }
        }
    }

    fn infer_func_app(
        &mut self,
        f: IdHandle,
        args: &[Type],
        range: CodeRange,
    ) -> Result<Type, TypeError> {
        if self.stack.contains(&f) {
            return Ok(Type::Undefined);
        }
        let ExprKind::Function { params, .. } = &self.model.id(f).expr.kind else {
            return Err(TypeError::InvalidArgumentTypes {
                detail: format!("'{}' is not a function", self.model.id(f).name),
                range,
            });
        };
        if params.len() != args.len() {
            return Err(TypeError::InvalidArgumentTypes {
                detail: format!(
                    "'{}' takes {} arguments, got {}",
                    self.model.id(f).name,
                    params.len(),
                    args.len()
                ),
                range,
            });
        }
        let bindings: Vec<(FuncVarHandle, Type)> =
            params.iter().copied().zip(args.iter().cloned()).collect();
        let saved: Vec<(FuncVarHandle, Option<Type>)> = bindings
            .iter()
            .map(|(h, _)| (*h, self.params.get(h).cloned()))
            .collect();
        for (h, t) in bindings {
            self.params.insert(h, t);
        }
        self.stack.push(f);
        let mut expr = std::mem::take(&mut self.model.id_mut(f).expr);
        let result = (|| {
            let ExprKind::Function { body, .. } = &mut expr.kind else {
                unreachable!("checked above");
            };
            self.infer(body)
        })();
        self.model.id_mut(f).expr = expr;
        self.stack.pop();
        for (h, t) in saved {
            match t {
                Some(t) => {
                    self.params.insert(h, t);
                }
                None => {
                    self.params.remove(&h);
                }
            }
        }
        result
    }

    /// Extent of one bound array variable from its range expression.
    fn var_extent(&mut self, var: VarHandle) -> Result<Extent, TypeError> {
        let range_expr = self.model.array_var(var).range.clone();
        let location = self.model.array_var(var).location;
        let Some(range_expr) = range_expr else {
            return Ok(Extent::Infinite);
        };
        match &range_expr.kind {
            ExprKind::Infinity => Ok(Extent::Infinite),
            ExprKind::Operation {
                kind: OperationKind::ArrayEnumerate,
                operands,
            } => {
                let lo = affine_of(self.model, &operands[0]);
                let hi = affine_of(self.model, &operands[1]);
                match (lo, hi) {
                    (Some(lo), Some(hi)) => {
                        let diff = hi.sub(&lo);
                        if diff.is_constant() {
                            Ok(Extent::Finite(diff.constant + 1))
                        } else {
                            Err(TypeError::InvalidArgumentTypes {
                                detail: "variable range length must be constant".to_string(),
                                range: location,
                            })
                        }
                    }
                    _ => Err(TypeError::InvalidArgumentTypes {
                        detail: "variable range bounds must be affine".to_string(),
                        range: location,
                    }),
                }
            }
            _ => match const_int(self.model, &range_expr) {
                Some(n) if n > 0 => Ok(Extent::Finite(n)),
                Some(_) => Err(TypeError::InvalidArgumentTypes {
                    detail: "variable extent must be positive".to_string(),
                    range: location,
                }),
                None => Err(TypeError::InvalidArgumentTypes {
                    detail: "variable extent must be a constant integer or ~".to_string(),
                    range: location,
                }),
            },
        }
    }
}

/// Constant-fold an integer expression, following references to scalar
/// definitions.
pub fn const_int(model: &Model, expr: &Expr) -> Option<i64> {
    match &expr.kind {
        ExprKind::IntConst(v) => Some(*v),
        ExprKind::Primitive { op, operands } => {
            let vals: Option<Vec<i64>> =
                operands.iter().map(|o| const_int(model, o)).collect();
            let vals = vals?;
            match (op, vals.as_slice()) {
                (PrimitiveOp::Add, [a, b]) => Some(a + b),
                (PrimitiveOp::Sub, [a, b]) => Some(a - b),
                (PrimitiveOp::Mul, [a, b]) => Some(a * b),
                (PrimitiveOp::Neg, [a]) => Some(-a),
                (PrimitiveOp::Min, [a, b]) => Some(*a.min(b)),
                (PrimitiveOp::Max, [a, b]) => Some(*a.max(b)),
                _ => None,
            }
        }
        ExprKind::Reference(RefTarget::Id(h)) => const_int(model, &model.id(*h).expr),
        _ => None,
    }
}

/// Coerce an expression to affine form over array variables, following
/// references to constant scalar definitions. `None` when not affine.
pub fn affine_of(model: &Model, expr: &Expr) -> Option<LinExpr> {
    match &expr.kind {
        ExprKind::IntConst(v) => Some(LinExpr::constant(*v)),
        ExprKind::Affine(lin) => Some(lin.clone()),
        ExprKind::Reference(RefTarget::ArrayVar(v)) => Some(LinExpr::var(*v)),
        ExprKind::Reference(RefTarget::Id(h)) => {
            const_int(model, &model.id(*h).expr).map(LinExpr::constant)
        }
        ExprKind::Primitive { op, operands } => match (op, operands.as_slice()) {
            (PrimitiveOp::Add, [a, b]) => {
                Some(affine_of(model, a)?.add(&affine_of(model, b)?))
            }
            (PrimitiveOp::Sub, [a, b]) => {
                Some(affine_of(model, a)?.sub(&affine_of(model, b)?))
            }
            (PrimitiveOp::Neg, [a]) => Some(affine_of(model, a)?.scale(-1)),
            (PrimitiveOp::Mul, [a, b]) => {
                let lin_a = affine_of(model, a)?;
                let lin_b = affine_of(model, b)?;
                if lin_a.is_constant() {
                    Some(lin_b.scale(lin_a.constant))
                } else if lin_b.is_constant() {
                    Some(lin_a.scale(lin_b.constant))
                } else {
                    None
                }
            }
            _ => None,
        },
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::lexer::Lexer;
    use crate::compiler::parser::Parser;
    use crate::compiler::resolve;

    fn checked(src: &str) -> Model {
        let tokens = Lexer::new(src).tokenize().unwrap();
        let module = Parser::new(tokens).parse_module().unwrap();
        let mut model = resolve::resolve(&module).unwrap();
        process(&mut model).unwrap();
        model
    }

    fn check_err(src: &str) -> TypeError {
        let tokens = Lexer::new(src).tokenize().unwrap();
        let module = Parser::new(tokens).parse_module().unwrap();
        let mut model = resolve::resolve(&module).unwrap();
        process(&mut model).unwrap_err()
    }

    #[test]
    fn test_finite_array_shape() {
        let m = checked("grid = [i:10, j:4: i * j];");
        let grid = m.lookup("grid").unwrap();
        assert_eq!(
            m.id(grid).ty,
            Type::Array {
                size: vec![Extent::Finite(10), Extent::Finite(4)],
                elem: PrimKind::Integer
            }
        );
    }

    #[test]
    fn test_recursive_array_two_passes() {
        let m = checked("fib = [n:~: { n == 0: 0; n == 1: 1; fib[n-1] + fib[n-2] }];");
        let fib = m.lookup("fib").unwrap();
        assert!(m.id(fib).is_recursive);
        assert_eq!(
            m.id(fib).ty,
            Type::Array {
                size: vec![Extent::Infinite],
                elem: PrimKind::Integer
            }
        );
    }

    #[test]
    fn test_self_feeding_array_is_ambiguous() {
        let err = check_err("x = [n:~: x[n-1]];");
        assert!(matches!(err, TypeError::AmbiguousResult { .. }));
    }

    #[test]
    fn test_boolean_plus_int_fails() {
        let err = check_err("y = true + 1;");
        assert!(matches!(err, TypeError::InvalidArgumentTypes { .. }));
    }

    #[test]
    fn test_incompatible_cases() {
        let err = check_err("y = [n:4: { n == 0: true; 1.5 }];");
        assert!(matches!(err, TypeError::IncompatibleCases { .. }));
    }

    #[test]
    fn test_real_join() {
        let m = checked("y = [t:8: 1 + 2.5];");
        let y = m.lookup("y").unwrap();
        assert_eq!(m.id(y).ty.elem_kind(), PrimKind::Real);
    }

    #[test]
    fn test_concat_shape() {
        let m = checked("a = [i:3: i]; b = [i:~: i]; c = a ++ b;");
        let c = m.lookup("c").unwrap();
        assert_eq!(
            m.id(c).ty,
            Type::Array {
                size: vec![Extent::Infinite],
                elem: PrimKind::Integer
            }
        );
    }

    #[test]
    fn test_size_query_folds_to_constant() {
        let m = checked("a = [i:3: i]; n = #a;");
        let n = m.lookup("n").unwrap();
        assert_eq!(m.id(n).ty.elem_kind(), PrimKind::Integer);
        assert!(matches!(m.id(n).expr.kind, ExprKind::IntConst(3)));
    }

    #[test]
    fn test_enumerated_var_extent() {
        let m = checked("grid = [i:10, j: i..i+3 : i*j];");
        let grid = m.lookup("grid").unwrap();
        assert_eq!(
            m.id(grid).ty.shape(),
            &[Extent::Finite(10), Extent::Finite(4)]
        );
    }

    #[test]
    fn test_function_call_typing() {
        let m = {
            let tokens = Lexer::new("f(x) = [t:8: x[t] + 1]; g = f(1);")
                .tokenize()
                .unwrap();
            let module = Parser::new(tokens).parse_module().unwrap();
            resolve::resolve(&module).unwrap()
        };
        // `f(1)` indexes a scalar, which is invalid.
        let mut model = m;
        assert!(process(&mut model).is_err());
    }
}
