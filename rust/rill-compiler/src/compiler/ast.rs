//! Surface syntax tree produced by the parser.

use rill_core::location::CodeRange;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A complete Rill module (one `.rill` file).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Module {
    pub defs: Vec<Def>,
    pub range: CodeRange,
}

/// A top-level definition: `name = expr;` or `name(p1, p2) = expr;`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Def {
    pub name: String,
    pub params: Vec<Param>,
    pub body: Expr,
    pub range: CodeRange,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Param {
    pub name: String,
    pub range: CodeRange,
}

/// A bound variable of an array comprehension.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VarDecl {
    pub name: String,
    pub bound: VarBound,
    pub range: CodeRange,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum VarBound {
    /// `i`: extent inferred or infinite
    Unconstrained,
    /// `i : n`: extent `n` (an integer expression or `~`)
    Extent(Expr),
    /// `j : a .. b`: enumerated range, inclusive on both ends
    Span(Expr, Expr),
}

/// One arm of a case block; `guard` is absent for the default arm.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaseArm {
    pub guard: Option<Expr>,
    pub value: Expr,
    pub range: CodeRange,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
    Eq,
    Neq,
    Lt,
    Lte,
    Gt,
    Gte,
    And,
    Or,
    Concat,
}

impl fmt::Display for BinOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::Mod => "%",
            BinOp::Pow => "^",
            BinOp::Eq => "==",
            BinOp::Neq => "!=",
            BinOp::Lt => "<",
            BinOp::Lte => "<=",
            BinOp::Gt => ">",
            BinOp::Gte => ">=",
            BinOp::And => "&&",
            BinOp::Or => "||",
            BinOp::Concat => "++",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnaryOp {
    Neg,
    Not,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Expr {
    Int(i64, CodeRange),
    Real(f64, CodeRange),
    /// Imaginary literal `v i`
    Imag(f64, CodeRange),
    Bool(bool, CodeRange),
    Infinity(CodeRange),
    Var(String, CodeRange),
    Unary(UnaryOp, Box<Expr>, CodeRange),
    Binary(BinOp, Box<Expr>, Box<Expr>, CodeRange),
    /// `a .. b` as a value: the enumeration of integers from a to b
    Range(Box<Expr>, Box<Expr>, CodeRange),
    /// `f(a, b)`, a function application
    Call(String, Vec<Expr>, CodeRange),
    /// `a[i, j]`, an array application
    Index(Box<Expr>, Vec<Expr>, CodeRange),
    /// `[i:10, j: a..b : body]`
    ArrayComp {
        vars: Vec<VarDecl>,
        body: Box<Expr>,
        range: CodeRange,
    },
    /// `{ guard: e; guard: e; default }`
    Cases {
        arms: Vec<CaseArm>,
        range: CodeRange,
    },
    /// `#a` or `#a@d`
    Size {
        object: Box<Expr>,
        dim: Option<Box<Expr>>,
        range: CodeRange,
    },
}

impl Expr {
    pub fn range(&self) -> CodeRange {
        match self {
            Expr::Int(_, r)
            | Expr::Real(_, r)
            | Expr::Imag(_, r)
            | Expr::Bool(_, r)
            | Expr::Infinity(r)
            | Expr::Var(_, r)
            | Expr::Unary(_, _, r)
            | Expr::Binary(_, _, _, r)
            | Expr::Range(_, _, r)
            | Expr::Call(_, _, r)
            | Expr::Index(_, _, r) => *r,
            Expr::ArrayComp { range, .. } | Expr::Cases { range, .. } | Expr::Size { range, .. } => {
                *range
            }
        }
    }
}

// ── AST printer (for --print-ast) ──

pub fn print_module(module: &Module) -> String {
    let mut out = String::new();
    for def in &module.defs {
        print_def(def, &mut out);
    }
    out
}

fn print_def(def: &Def, out: &mut String) {
    out.push_str(&def.name);
    if !def.params.is_empty() {
        out.push('(');
        for (i, p) in def.params.iter().enumerate() {
            if i > 0 {
                out.push_str(", ");
            }
            out.push_str(&p.name);
        }
        out.push(')');
    }
    out.push_str(" =\n");
    print_expr(&def.body, 1, out);
}

fn indent(depth: usize, out: &mut String) {
    for _ in 0..depth {
        out.push_str("  ");
    }
}

fn print_expr(expr: &Expr, depth: usize, out: &mut String) {
    indent(depth, out);
    match expr {
        Expr::Int(v, _) => out.push_str(&format!("int {}\n", v)),
        Expr::Real(v, _) => out.push_str(&format!("real {}\n", v)),
        Expr::Imag(v, _) => out.push_str(&format!("imag {}\n", v)),
        Expr::Bool(v, _) => out.push_str(&format!("bool {}\n", v)),
        Expr::Infinity(_) => out.push_str("infinity\n"),
        Expr::Var(name, _) => out.push_str(&format!("var {}\n", name)),
        Expr::Unary(op, operand, _) => {
            out.push_str(&format!("unary {:?}\n", op));
            print_expr(operand, depth + 1, out);
        }
        Expr::Binary(op, lhs, rhs, _) => {
            out.push_str(&format!("binary {}\n", op));
            print_expr(lhs, depth + 1, out);
            print_expr(rhs, depth + 1, out);
        }
        Expr::Range(lo, hi, _) => {
            out.push_str("range\n");
            print_expr(lo, depth + 1, out);
            print_expr(hi, depth + 1, out);
        }
        Expr::Call(name, args, _) => {
            out.push_str(&format!("call {}\n", name));
            for arg in args {
                print_expr(arg, depth + 1, out);
            }
        }
        Expr::Index(object, args, _) => {
            out.push_str("index\n");
            print_expr(object, depth + 1, out);
            for arg in args {
                print_expr(arg, depth + 1, out);
            }
        }
        Expr::ArrayComp { vars, body, .. } => {
            out.push_str("array [");
            for (i, v) in vars.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                out.push_str(&v.name);
                match &v.bound {
                    VarBound::Unconstrained => {}
                    VarBound::Extent(_) => out.push_str(": _"),
                    VarBound::Span(_, _) => out.push_str(": _.._"),
                }
            }
            out.push_str("]\n");
            print_expr(body, depth + 1, out);
        }
        Expr::Cases { arms, .. } => {
            out.push_str("cases\n");
            for arm in arms {
                indent(depth + 1, out);
                if arm.guard.is_some() {
                    out.push_str("guarded\n");
                    print_expr(arm.guard.as_ref().unwrap(), depth + 2, out);
                } else {
                    out.push_str("default\n");
                }
                print_expr(&arm.value, depth + 2, out);
            }
        }
        Expr::Size { object, dim, .. } => {
            out.push_str("size\n");
            print_expr(object, depth + 1, out);
            if let Some(d) = dim {
                print_expr(d, depth + 1, out);
            }
        }
    }
}
