//! Textual rendering of the functional IR (symbol listings and verbose
//! phase dumps).

use crate::compiler::fir::*;

pub struct Printer<'m> {
    model: &'m Model,
    pub print_scopes: bool,
}

impl<'m> Printer<'m> {
    pub fn new(model: &'m Model) -> Self {
        Self {
            model,
            print_scopes: false,
        }
    }

    pub fn print_id(&self, handle: IdHandle, out: &mut String) {
        let id = self.model.id(handle);
        out.push_str(&id.name);
        out.push_str(" = ");
        self.print(&id.expr, out);
    }

    /// One line per top-level identifier, with its resolved type.
    pub fn symbol_listing(&self) -> String {
        let mut out = String::new();
        for &h in &self.model.top.ids {
            let id = self.model.id(h);
            out.push_str(&format!("{} : {}\n", id.name, id.ty));
        }
        out
    }

    pub fn print(&self, expr: &Expr, out: &mut String) {
        match &expr.kind {
            ExprKind::IntConst(v) => out.push_str(&v.to_string()),
            ExprKind::RealConst(v) => out.push_str(&v.to_string()),
            ExprKind::ComplexConst { re, im } => {
                if *re != 0.0 {
                    out.push_str(&format!("{}+", re));
                }
                out.push_str(&format!("{}i", im));
            }
            ExprKind::BoolConst(v) => out.push_str(if *v { "true" } else { "false" }),
            ExprKind::Infinity => out.push('~'),
            ExprKind::Primitive { op, operands } => {
                out.push_str(&op.to_string());
                out.push('(');
                for (i, o) in operands.iter().enumerate() {
                    if i > 0 {
                        out.push(',');
                    }
                    self.print(o, out);
                }
                out.push(')');
            }
            ExprKind::Operation { kind, operands } => {
                out.push_str(match kind {
                    OperationKind::ArrayConcat => "++",
                    OperationKind::ArrayEnumerate => "..",
                });
                out.push('(');
                for (i, o) in operands.iter().enumerate() {
                    if i > 0 {
                        out.push(',');
                    }
                    self.print(o, out);
                }
                out.push(')');
            }
            ExprKind::Reference(target) => match target {
                RefTarget::Id(h) => out.push_str(&self.model.id(*h).name),
                RefTarget::ArrayVar(v) => out.push_str(&self.model.array_var(*v).name),
                RefTarget::FuncVar(v) => out.push_str(&self.model.func_var(*v).name),
            },
            ExprKind::ArraySelfRef(_) => out.push_str("this"),
            ExprKind::Array { vars, scope, body, .. } => {
                out.push('[');
                for (i, v) in vars.iter().enumerate() {
                    if i > 0 {
                        out.push(',');
                    }
                    let var = self.model.array_var(*v);
                    out.push_str(&var.name);
                    if let Some(range) = &var.range {
                        out.push(':');
                        self.print(range, out);
                    }
                }
                out.push_str(": ");
                self.print(body, out);
                if self.print_scopes && !scope.ids.is_empty() {
                    out.push_str(" where ");
                    for (i, id) in scope.ids.iter().enumerate() {
                        if i > 0 {
                            out.push_str(", ");
                        }
                        self.print_id(*id, out);
                    }
                }
                out.push(']');
            }
            ExprKind::ArrayPatterns(patterns) => {
                for (i, p) in patterns.iter().enumerate() {
                    if i > 0 {
                        out.push(' ');
                    }
                    for (d, index) in p.indexes.iter().enumerate() {
                        if d > 0 {
                            out.push(',');
                        }
                        match index.var {
                            Some(v) => out.push_str(&self.model.array_var(v).name),
                            None => out.push_str(&index.value.to_string()),
                        }
                    }
                    if let Some(guard) = &p.guard {
                        out.push(' ');
                        self.print(guard, out);
                        out.push_str(" | ");
                    } else {
                        out.push_str(" -> ");
                    }
                    self.print(&p.value, out);
                    out.push(';');
                }
            }
            ExprKind::ArrayApp { object, args } => {
                self.print(object, out);
                out.push('[');
                for (i, a) in args.iter().enumerate() {
                    if i > 0 {
                        out.push(',');
                    }
                    self.print(a, out);
                }
                out.push(']');
            }
            ExprKind::ArraySize { object, dim } => {
                out.push('#');
                self.print(object, out);
                if let Some(d) = dim {
                    out.push('@');
                    self.print(d, out);
                }
            }
            ExprKind::FuncApp { object, args } => {
                self.print(object, out);
                out.push('(');
                for (i, a) in args.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    self.print(a, out);
                }
                out.push(')');
            }
            ExprKind::Function { params, body, .. } => {
                out.push('\\');
                for (i, p) in params.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    out.push_str(&self.model.func_var(*p).name);
                }
                out.push_str(" -> ");
                self.print(body, out);
            }
            ExprKind::CaseExpr(cases) => {
                for (i, c) in cases.iter().enumerate() {
                    if i > 0 {
                        out.push(' ');
                    }
                    out.push_str("| ");
                    if let Some(g) = &c.guard {
                        self.print(g, out);
                    } else {
                        out.push('_');
                    }
                    out.push_str(" -> ");
                    self.print(&c.value, out);
                }
            }
            ExprKind::Affine(lin) => out.push_str(&lin.to_string()),
            ExprKind::AffineSet(set) => {
                out.push('{');
                for (i, c) in set.constraints.iter().enumerate() {
                    if i > 0 {
                        out.push_str(" and ");
                    }
                    out.push_str(&c.expr.to_string());
                    out.push_str(match c.op {
                        crate::compiler::affine::CmpOp::Eq => " == 0",
                        crate::compiler::affine::CmpOp::Geq => " >= 0",
                    });
                }
                out.push('}');
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::lexer::Lexer;
    use crate::compiler::parser::Parser;
    use crate::compiler::resolve;

    #[test]
    fn test_roundtrip_flavour() {
        let tokens = Lexer::new("f = [t:8: t + 1];").tokenize().unwrap();
        let module = Parser::new(tokens).parse_module().unwrap();
        let model = resolve::resolve(&module).unwrap();
        let printer = Printer::new(&model);
        let mut out = String::new();
        printer.print_id(model.lookup("f").unwrap(), &mut out);
        assert_eq!(out, "f = [t:8: add(t,1)]");
    }
}
