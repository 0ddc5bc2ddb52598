//! Name resolution: surface AST → functional IR.
//!
//! Builds the identifier arena, resolves references through a scope
//! stack, marks recursive arrays (a reference to the identifier being
//! defined, inside its own array body, becomes `ArraySelfRef`), and
//! normalizes integer-equality case guards into `ArrayPatterns`.

use crate::compiler::ast;
use crate::compiler::fir::*;
use rill_core::location::CodeRange;
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Error, Clone)]
pub enum ResolveError {
    #[error("undefined symbol '{name}'")]
    UndefinedSymbol { name: String, range: CodeRange },
    #[error("duplicate definition of '{name}'")]
    DuplicateDefinition { name: String, range: CodeRange },
}

impl ResolveError {
    pub fn range(&self) -> CodeRange {
        match self {
            ResolveError::UndefinedSymbol { range, .. }
            | ResolveError::DuplicateDefinition { range, .. } => *range,
        }
    }
}

/// One entry of the lexical environment.
enum Binding {
    Id(IdHandle),
    ArrayVar(VarHandle),
    FuncVar(FuncVarHandle),
}

pub struct Resolver {
    model: Model,
    /// Innermost scope last; each scope maps name → binding.
    env: Vec<HashMap<String, Binding>>,
    /// Identifiers currently being defined, innermost last. A reference
    /// to the innermost one from inside an array body is a self-ref.
    defining: Vec<IdHandle>,
    /// Array nesting depth inside the current definition.
    array_depth: usize,
}

/// Resolve a parsed module into a FIR model.
pub fn resolve(module: &ast::Module) -> Result<Model, ResolveError> {
    let mut resolver = Resolver {
        model: Model::default(),
        env: vec![HashMap::new()],
        defining: Vec::new(),
        array_depth: 0,
    };
    resolver.run(module)?;
    Ok(resolver.model)
}

impl Resolver {
    fn run(&mut self, module: &ast::Module) -> Result<(), ResolveError> {
        // Bind all top-level names first so definitions may reference each
        // other regardless of order.
        for def in &module.defs {
            if self.env[0].contains_key(&def.name) {
                return Err(ResolveError::DuplicateDefinition {
                    name: def.name.clone(),
                    range: def.range,
                });
            }
            let handle = self.model.add_id(Identifier {
                name: def.name.clone(),
                expr: Expr::default(),
                ty: Type::Undefined,
                is_recursive: false,
                location: def.range,
            });
            self.env[0].insert(def.name.clone(), Binding::Id(handle));
        }
        for def in &module.defs {
            let Some(Binding::Id(handle)) = self.env[0].get(&def.name) else {
                unreachable!("top-level name bound above");
            };
            let handle = *handle;
            self.defining.push(handle);
            self.array_depth = 0;
            let expr = if def.params.is_empty() {
                self.expr(&def.body)?
            } else {
                self.function(def)?
            };
            self.defining.pop();
            self.model.id_mut(handle).expr = expr;
        }
        self.order_top_scope();
        Ok(())
    }

    /// Dependency-order the top scope (referenced identifiers first).
    fn order_top_scope(&mut self) {
        let n = self.model.ids.len();
        let mut deps: Vec<Vec<usize>> = vec![Vec::new(); n];
        for (i, id) in self.model.ids.iter().enumerate() {
            collect_id_refs(&id.expr, &mut deps[i]);
        }
        let mut visited = vec![false; n];
        let mut order = Vec::with_capacity(n);
        fn visit(i: usize, deps: &[Vec<usize>], visited: &mut [bool], order: &mut Vec<IdHandle>) {
            if visited[i] {
                return;
            }
            visited[i] = true;
            for &d in &deps[i] {
                if d != i {
                    visit(d, deps, visited, order);
                }
            }
            order.push(IdHandle(i as u32));
        }
        for i in 0..n {
            visit(i, &deps, &mut visited, &mut order);
        }
        self.model.top = Scope { ids: order };
    }

    fn function(&mut self, def: &ast::Def) -> Result<Expr, ResolveError> {
        let mut params = Vec::new();
        self.env.push(HashMap::new());
        for p in &def.params {
            let handle = self.model.add_func_var(FuncVar {
                name: p.name.clone(),
                qualified_name: Some(format!("{}.{}", def.name, p.name)),
                location: p.range,
            });
            params.push(handle);
            self.env
                .last_mut()
                .expect("scope stack is never empty")
                .insert(p.name.clone(), Binding::FuncVar(handle));
        }
        let body = self.expr(&def.body)?;
        self.env.pop();
        Ok(Expr::new(
            ExprKind::Function {
                params,
                scope: Scope::default(),
                body: Box::new(body),
            },
            def.range,
        ))
    }

    fn lookup(&self, name: &str) -> Option<&Binding> {
        self.env.iter().rev().find_map(|scope| scope.get(name))
    }

    fn expr(&mut self, e: &ast::Expr) -> Result<Expr, ResolveError> {
        let range = e.range();
        match e {
            ast::Expr::Int(v, _) => Ok(Expr::new(ExprKind::IntConst(*v), range)),
            ast::Expr::Real(v, _) => Ok(Expr::new(ExprKind::RealConst(*v), range)),
            ast::Expr::Imag(v, _) => Ok(Expr::new(
                ExprKind::ComplexConst { re: 0.0, im: *v },
                range,
            )),
            ast::Expr::Bool(v, _) => Ok(Expr::new(ExprKind::BoolConst(*v), range)),
            ast::Expr::Infinity(_) => Ok(Expr::new(ExprKind::Infinity, range)),
            ast::Expr::Var(name, _) => self.reference(name, range),
            ast::Expr::Unary(op, operand, _) => {
                let operand = self.expr(operand)?;
                let prim = match op {
                    ast::UnaryOp::Neg => PrimitiveOp::Neg,
                    ast::UnaryOp::Not => PrimitiveOp::Not,
                };
                Ok(Expr::new(
                    ExprKind::Primitive {
                        op: prim,
                        operands: vec![operand],
                    },
                    range,
                ))
            }
            ast::Expr::Binary(op, lhs, rhs, _) => {
                let lhs = self.expr(lhs)?;
                let rhs = self.expr(rhs)?;
                if *op == ast::BinOp::Concat {
                    return Ok(Expr::new(
                        ExprKind::Operation {
                            kind: OperationKind::ArrayConcat,
                            operands: vec![lhs, rhs],
                        },
                        range,
                    ));
                }
                let prim = match op {
                    ast::BinOp::Add => PrimitiveOp::Add,
                    ast::BinOp::Sub => PrimitiveOp::Sub,
                    ast::BinOp::Mul => PrimitiveOp::Mul,
                    ast::BinOp::Div => PrimitiveOp::Div,
                    ast::BinOp::Mod => PrimitiveOp::Mod,
                    ast::BinOp::Pow => PrimitiveOp::Pow,
                    ast::BinOp::Eq => PrimitiveOp::Eq,
                    ast::BinOp::Neq => PrimitiveOp::Neq,
                    ast::BinOp::Lt => PrimitiveOp::Lt,
                    ast::BinOp::Lte => PrimitiveOp::Lte,
                    ast::BinOp::Gt => PrimitiveOp::Gt,
                    ast::BinOp::Gte => PrimitiveOp::Gte,
                    ast::BinOp::And => PrimitiveOp::And,
                    ast::BinOp::Or => PrimitiveOp::Or,
                    ast::BinOp::Concat => unreachable!("handled above"),
                };
                Ok(Expr::new(
                    ExprKind::Primitive {
                        op: prim,
                        operands: vec![lhs, rhs],
                    },
                    range,
                ))
            }
            ast::Expr::Range(lo, hi, _) => {
                let lo = self.expr(lo)?;
                let hi = self.expr(hi)?;
                Ok(Expr::new(
                    ExprKind::Operation {
                        kind: OperationKind::ArrayEnumerate,
                        operands: vec![lo, hi],
                    },
                    range,
                ))
            }
            ast::Expr::Call(name, args, _) => {
                let args = args
                    .iter()
                    .map(|a| self.expr(a))
                    .collect::<Result<Vec<_>, _>>()?;
                if let Some(op) = primitive_by_name(name) {
                    if self.lookup(name).is_none() {
                        return Ok(Expr::new(ExprKind::Primitive { op, operands: args }, range));
                    }
                }
                let object = self.reference(name, range)?;
                Ok(Expr::new(
                    ExprKind::FuncApp {
                        object: Box::new(object),
                        args,
                    },
                    range,
                ))
            }
            ast::Expr::Index(object, args, _) => {
                let object = self.expr(object)?;
                let args = args
                    .iter()
                    .map(|a| self.expr(a))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Expr::new(
                    ExprKind::ArrayApp {
                        object: Box::new(object),
                        args,
                    },
                    range,
                ))
            }
            ast::Expr::ArrayComp { vars, body, .. } => self.array_comp(vars, body, range),
            ast::Expr::Cases { arms, .. } => {
                let mut cases = Vec::new();
                for arm in arms {
                    let guard = arm.guard.as_ref().map(|g| self.expr(g)).transpose()?;
                    let value = self.expr(&arm.value)?;
                    cases.push(Case { guard, value });
                }
                Ok(Expr::new(ExprKind::CaseExpr(cases), range))
            }
            ast::Expr::Size { object, dim, .. } => {
                let object = self.expr(object)?;
                let dim = dim.as_ref().map(|d| self.expr(d)).transpose()?;
                Ok(Expr::new(
                    ExprKind::ArraySize {
                        object: Box::new(object),
                        dim: dim.map(Box::new),
                    },
                    range,
                ))
            }
        }
    }

    fn reference(&mut self, name: &str, range: CodeRange) -> Result<Expr, ResolveError> {
        match self.lookup(name) {
            Some(Binding::Id(handle)) => {
                let handle = *handle;
                if self.defining.last() == Some(&handle) && self.array_depth > 0 {
                    self.model.id_mut(handle).is_recursive = true;
                    return Ok(Expr::new(ExprKind::ArraySelfRef(handle), range));
                }
                Ok(Expr::new(ExprKind::Reference(RefTarget::Id(handle)), range))
            }
            Some(Binding::ArrayVar(handle)) => {
                let handle = *handle;
                self.model.array_var_mut(handle).ref_count += 1;
                Ok(Expr::new(
                    ExprKind::Reference(RefTarget::ArrayVar(handle)),
                    range,
                ))
            }
            Some(Binding::FuncVar(handle)) => Ok(Expr::new(
                ExprKind::Reference(RefTarget::FuncVar(*handle)),
                range,
            )),
            None => Err(ResolveError::UndefinedSymbol {
                name: name.to_string(),
                range,
            }),
        }
    }

    fn array_comp(
        &mut self,
        vars: &[ast::VarDecl],
        body: &ast::Expr,
        range: CodeRange,
    ) -> Result<Expr, ResolveError> {
        self.env.push(HashMap::new());
        let mut handles = Vec::new();
        for v in vars {
            let var_range = match &v.bound {
                ast::VarBound::Unconstrained => None,
                ast::VarBound::Extent(e) => Some(self.expr(e)?),
                ast::VarBound::Span(lo, hi) => {
                    let lo = self.expr(lo)?;
                    let hi = self.expr(hi)?;
                    Some(Expr::new(
                        ExprKind::Operation {
                            kind: OperationKind::ArrayEnumerate,
                            operands: vec![lo, hi],
                        },
                        v.range,
                    ))
                }
            };
            let handle = self.model.add_array_var(ArrayVar {
                name: v.name.clone(),
                range: var_range,
                location: v.range,
                ref_count: 0,
            });
            handles.push(handle);
            self.env
                .last_mut()
                .expect("scope stack is never empty")
                .insert(v.name.clone(), Binding::ArrayVar(handle));
        }
        self.array_depth += 1;
        let body = self.expr(body)?;
        self.array_depth -= 1;
        self.env.pop();
        let body = self.normalize_patterns(body, &handles);
        let is_recursive = self
            .defining
            .last()
            .map(|h| self.model.id(*h).is_recursive)
            .unwrap_or(false);
        Ok(Expr::new(
            ExprKind::Array {
                vars: handles,
                scope: Scope::default(),
                body: Box::new(body),
                is_recursive,
            },
            range,
        ))
    }

    /// Rewrite a case body whose guarded arms are all integer equalities
    /// on the first bound variable (`n == 0: …; n == 1: …; default`) into
    /// `ArrayPatterns`; any other case body stays a `CaseExpr`.
    fn normalize_patterns(&self, body: Expr, vars: &[VarHandle]) -> Expr {
        let ExprKind::CaseExpr(cases) = &body.kind else {
            return body;
        };
        let Some(&var) = vars.first() else {
            return body;
        };
        let all_equalities = cases.iter().all(|c| match &c.guard {
            Some(g) => equality_pattern(g, var).is_some(),
            None => true,
        });
        let any_equality = cases
            .iter()
            .any(|c| c.guard.as_ref().and_then(|g| equality_pattern(g, var)).is_some());
        if !all_equalities || !any_equality {
            return body;
        }
        let mut patterns = Vec::new();
        for case in cases {
            match &case.guard {
                Some(guard) => {
                    let value = equality_pattern(guard, var).expect("checked above");
                    patterns.push(Pattern {
                        indexes: vec![PatternIndex { var: None, value }],
                        guard: None,
                        value: case.value.clone(),
                    });
                }
                None => patterns.push(Pattern {
                    indexes: vec![PatternIndex {
                        var: Some(var),
                        value: 0,
                    }],
                    guard: None,
                    value: case.value.clone(),
                }),
            }
        }
        Expr::new(ExprKind::ArrayPatterns(patterns), body.location)
    }
}

/// Matches guards of the shape `v == k` / `k == v`.
fn equality_pattern(guard: &Expr, var: VarHandle) -> Option<i64> {
    let ExprKind::Primitive { op, operands } = &guard.kind else {
        return None;
    };
    if *op != PrimitiveOp::Eq || operands.len() != 2 {
        return None;
    }
    let is_var = |e: &Expr| {
        matches!(e.kind, ExprKind::Reference(RefTarget::ArrayVar(v)) if v == var)
    };
    let as_int = |e: &Expr| match e.kind {
        ExprKind::IntConst(v) => Some(v),
        _ => None,
    };
    if is_var(&operands[0]) {
        return as_int(&operands[1]);
    }
    if is_var(&operands[1]) {
        return as_int(&operands[0]);
    }
    None
}

fn collect_id_refs(expr: &Expr, out: &mut Vec<usize>) {
    match &expr.kind {
        ExprKind::Reference(RefTarget::Id(h)) => out.push(h.0 as usize),
        ExprKind::Primitive { operands, .. } | ExprKind::Operation { operands, .. } => {
            for o in operands {
                collect_id_refs(o, out);
            }
        }
        ExprKind::Array { body, .. } | ExprKind::Function { body, .. } => {
            collect_id_refs(body, out)
        }
        ExprKind::ArrayPatterns(patterns) => {
            for p in patterns {
                if let Some(g) = &p.guard {
                    collect_id_refs(g, out);
                }
                collect_id_refs(&p.value, out);
            }
        }
        ExprKind::ArrayApp { object, args } | ExprKind::FuncApp { object, args } => {
            collect_id_refs(object, out);
            for a in args {
                collect_id_refs(a, out);
            }
        }
        ExprKind::ArraySize { object, dim } => {
            collect_id_refs(object, out);
            if let Some(d) = dim {
                collect_id_refs(d, out);
            }
        }
        ExprKind::CaseExpr(cases) => {
            for c in cases {
                if let Some(g) = &c.guard {
                    collect_id_refs(g, out);
                }
                collect_id_refs(&c.value, out);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::lexer::Lexer;
    use crate::compiler::parser::Parser;

    fn build(src: &str) -> Model {
        let tokens = Lexer::new(src).tokenize().unwrap();
        let module = Parser::new(tokens).parse_module().unwrap();
        resolve(&module).unwrap()
    }

    #[test]
    fn test_self_reference_marks_recursion() {
        let m = build("fib = [n: { n == 0: 0; n == 1: 1; fib[n-1] + fib[n-2] }];");
        let fib = m.lookup("fib").unwrap();
        assert!(m.id(fib).is_recursive);
        let ExprKind::Array { body, is_recursive, .. } = &m.id(fib).expr.kind else {
            panic!("expected array");
        };
        assert!(is_recursive);
        assert!(matches!(body.kind, ExprKind::ArrayPatterns(_)));
    }

    #[test]
    fn test_equality_guards_become_patterns() {
        let m = build("fib = [n: { n == 0: 0; n == 1: 1; fib[n-1] + fib[n-2] }];");
        let fib = m.lookup("fib").unwrap();
        let ExprKind::Array { body, .. } = &m.id(fib).expr.kind else {
            panic!("expected array");
        };
        let ExprKind::ArrayPatterns(patterns) = &body.kind else {
            panic!("expected patterns");
        };
        assert_eq!(patterns.len(), 3);
        assert_eq!(patterns[0].indexes[0].value, 0);
        assert!(patterns[0].indexes[0].var.is_none());
        assert!(patterns[2].indexes[0].var.is_some());
    }

    #[test]
    fn test_undefined_symbol() {
        let tokens = Lexer::new("f = [t: g[t]];").tokenize().unwrap();
        let module = Parser::new(tokens).parse_module().unwrap();
        assert!(matches!(
            resolve(&module),
            Err(ResolveError::UndefinedSymbol { .. })
        ));
    }

    #[test]
    fn test_dependency_order() {
        let m = build("a = b[0] + 1; b = [i:4: i];");
        let pos = |name: &str| {
            m.top
                .ids
                .iter()
                .position(|h| m.id(*h).name == name)
                .unwrap()
        };
        assert!(pos("b") < pos("a"));
    }

    #[test]
    fn test_var_reference_counts() {
        let m = build("f = [t: t + t];");
        assert_eq!(m.array_vars[0].ref_count, 2);
    }
}
