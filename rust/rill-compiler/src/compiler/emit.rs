//! The backend: walks the generated loop-nest ASTs through statement
//! callbacks and prints an imperative C-like program with modulo buffer
//! indexing, plus the JSON description of the stream interface.

use crate::compiler::fir::{PrimKind, PrimitiveOp};
use crate::compiler::poly::astgen::{self, AstCond, AstExpr, AstNode, Callbacks};
use crate::compiler::poly::schedule::Scheduled;
use crate::compiler::poly::set::Set;
use crate::compiler::poly::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Error, Clone)]
pub enum EmitError {
    #[error("backend error: {detail}")]
    Backend { detail: String },
}

impl From<astgen::AstGenError> for EmitError {
    fn from(e: astgen::AstGenError) -> Self {
        EmitError::Backend {
            detail: e.to_string(),
        }
    }
}

// ── Description file ──

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DescPort {
    pub init: i64,
    pub period: i64,
    pub size: Vec<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DescFile {
    pub inputs: Vec<DescPort>,
    pub output: DescPort,
    pub buffers: Vec<i64>,
}

fn port_for(program: &PolyProgram, array: Option<ArrayId>, stmt: StmtId) -> DescPort {
    match array {
        Some(a) => {
            let array = program.array(a);
            match array.flow_dim {
                Some(flow) => DescPort {
                    init: array.period_offset,
                    period: array.period,
                    size: array
                        .size
                        .iter()
                        .enumerate()
                        .filter(|(d, _)| *d != flow)
                        .filter_map(|(_, e)| e.finite())
                        .collect(),
                },
                None => DescPort {
                    init: array.size.first().and_then(|e| e.finite()).unwrap_or(1),
                    period: 0,
                    size: array.size.iter().skip(1).filter_map(|e| e.finite()).collect(),
                },
            }
        }
        None => DescPort {
            init: program
                .statement(stmt)
                .domain
                .first()
                .and_then(|e| e.finite())
                .unwrap_or(1),
            period: 0,
            size: Vec::new(),
        },
    }
}

/// The `out.desc` contents: stream interface of inputs and output plus
/// the flattened buffer cell count per statement.
pub fn describe(program: &PolyProgram) -> DescFile {
    let inputs = program
        .inputs
        .iter()
        .map(|s| port_for(program, program.statement(*s).array, *s))
        .collect();
    let output_stmt = program.output.unwrap_or(0);
    let output_array = program
        .output_array
        .or_else(|| program.statement(output_stmt).array);
    let output = port_for(program, output_array, output_stmt);
    let buffers = program
        .statements
        .iter()
        .map(|s| match s.array {
            Some(a) => program.array(a).buffer_size.iter().product::<i64>(),
            None => 0,
        })
        .collect();
    DescFile {
        inputs,
        output,
        buffers,
    }
}

pub fn describe_json(program: &PolyProgram) -> String {
    serde_json::to_string_pretty(&describe(program)).expect("description serializes")
}

// ── Program text ──

struct Emitter<'p> {
    program: &'p PolyProgram,
    sched: &'p Scheduled,
    /// Deduplicated buffer names per array.
    buffer_names: Vec<String>,
    /// True while printing the periodic phase (accesses advance with the
    /// period counter).
    periodic: bool,
    out: String,
    indent: usize,
}

/// Print the finite, init and period phases as one imperative program.
pub fn emit_text(program: &PolyProgram, sched: &Scheduled) -> Result<String, EmitError> {
    let mut buffer_names = Vec::new();
    let mut taken: HashMap<String, usize> = HashMap::new();
    for array in &program.arrays {
        let base = format!("buf_{}", array.name);
        let n = taken.entry(base.clone()).or_insert(0);
        let name = if *n == 0 { base.clone() } else { format!("{}_{}", base, n) };
        *n += 1;
        buffer_names.push(name);
    }
    let mut e = Emitter {
        program,
        sched,
        buffer_names,
        periodic: false,
        out: String::new(),
        indent: 0,
    };
    e.preamble();
    let universe = Set::universe(set::Context::anonymous(0));

    e.phase("finite", &sched.finite_schedule, &universe)?;
    e.phase("init", &sched.init_schedule, &universe)?;
    e.periodic = true;
    e.phase("period", &sched.period_schedule, &universe)?;
    Ok(e.out)
}

impl<'p> Emitter<'p> {
    fn line(&mut self, text: &str) {
        for _ in 0..self.indent {
            self.out.push_str("    ");
        }
        self.out.push_str(text);
        self.out.push('\n');
    }

    fn preamble(&mut self) {
        self.line("/* generated by rillc */");
        self.line("#include <math.h>");
        self.line("#include <complex.h>");
        self.line("#include <stdbool.h>");
        self.line("");
        self.line("#define RILL_MOD(a, n) ((((a) % (n)) + (n)) % (n))");
        self.line("#define RILL_FLOOR_DIV(a, n) ((a) >= 0 ? (a) / (n) : -((-(a) + (n) - 1) / (n)))");
        self.line("#define RILL_CEIL_DIV(a, n) ((a) >= 0 ? ((a) + (n) - 1) / (n) : -((-(a)) / (n)))");
        self.line("");
        for (i, stmt_id) in self.program.inputs.iter().enumerate() {
            let stmt = self.program.statement(*stmt_id);
            let ty = stmt
                .array
                .map(|a| c_type(self.program.array(a).elem))
                .unwrap_or("double");
            self.line(&format!("extern {} rill_input_{}(long index);", ty, i));
        }
        if self.program.statements.iter().any(|s| s.array.is_none()) {
            self.line("extern void rill_result(double value);");
        }
        self.line("");
        for (a, array) in self.program.arrays.iter().enumerate() {
            let mut decl = format!("static {} {}", c_type(array.elem), self.buffer_names[a]);
            for n in &array.buffer_size {
                decl.push_str(&format!("[{}]", n.max(&1)));
            }
            decl.push(';');
            self.line(&decl);
        }
        self.line("static long rill_period = 0;");
        self.line("");
    }

    fn phase(&mut self, name: &str, schedule: &set::UnionMap, universe: &Set) -> Result<(), EmitError> {
        self.line(&format!("void {}(void) {{", name));
        self.indent += 1;
        let mut make = |stmt_name: &str, indexes: &[AstExpr]| AstNode::User {
            name: stmt_name.to_string(),
            indexes: indexes.to_vec(),
        };
        let lookup = |name: &str| Some(name.to_string());
        let mut callbacks = Callbacks {
            make_statement: &mut make,
            lookup_id: &lookup,
        };
        let ast = astgen::generate(schedule, &self.sched.ctx, universe, &mut callbacks)?;
        match ast {
            Some(node) => self.node(&node)?,
            None => self.line("/* empty */"),
        }
        if self.periodic {
            self.line("rill_period += 1;");
        }
        self.indent -= 1;
        self.line("}");
        self.line("");
        Ok(())
    }

    fn node(&mut self, node: &AstNode) -> Result<(), EmitError> {
        match node {
            AstNode::Block(nodes) => {
                for n in nodes {
                    self.node(n)?;
                }
                Ok(())
            }
            AstNode::For {
                level,
                lower,
                upper,
                body,
            } => {
                self.line(&format!(
                    "for (long t{0} = {1}; t{0} <= {2}; t{0}++) {{",
                    level,
                    expr_text(lower),
                    expr_text(upper)
                ));
                self.indent += 1;
                self.node(body)?;
                self.indent -= 1;
                self.line("}");
                Ok(())
            }
            AstNode::Guard { conds, body } => {
                let rendered: Vec<String> = conds.iter().map(cond_text).collect();
                self.line(&format!("if ({}) {{", rendered.join(" && ")));
                self.indent += 1;
                self.node(body)?;
                self.indent -= 1;
                self.line("}");
                Ok(())
            }
            AstNode::User { name, indexes } => self.statement(name, indexes),
        }
    }

    /// One statement instance: the assignment into its buffer.
    fn statement(&mut self, name: &str, indexes: &[AstExpr]) -> Result<(), EmitError> {
        let name_id = self
            .sched
            .ctx
            .find(name)
            .ok_or_else(|| EmitError::Backend {
                detail: format!("unknown statement '{}'", name),
            })?;
        let stmt_id = *self
            .sched
            .stmt_by_name
            .get(&name_id)
            .ok_or_else(|| EmitError::Backend {
                detail: format!("unknown statement '{}'", name),
            })?;
        let stmt = self.program.statement(stmt_id);

        if let StmtExpr::Input { index } = &stmt.expr {
            let Some(array) = stmt.array else {
                return Err(EmitError::Backend {
                    detail: "input statement without a buffer".to_string(),
                });
            };
            let flow_expr = stmt
                .flow_dim
                .and_then(|f| indexes.get(f))
                .map(|e| self.flow_adjusted(stmt_id, expr_text(e)))
                .unwrap_or_else(|| "0".to_string());
            let target = self.input_target(stmt_id, array, indexes)?;
            self.line(&format!("{} = rill_input_{}({});", target, index, flow_expr));
            return Ok(());
        }

        let value = self.value_text(stmt_id, &stmt.expr, indexes)?;
        match stmt.array {
            Some(array) => {
                let write = stmt.write.as_ref().ok_or_else(|| EmitError::Backend {
                    detail: format!("statement '{}' has no write relation", name),
                })?;
                let target = self.access_text(stmt_id, array, write, indexes)?;
                self.line(&format!("{} = {};", target, value));
            }
            None => {
                self.line(&format!("rill_result({});", value));
            }
        }
        Ok(())
    }

    /// The flow index of a periodic statement, shifted back to absolute
    /// coordinates through the rebase and period counters.
    fn flow_adjusted(&self, stmt: StmtId, local: String) -> String {
        if !self.periodic {
            return local;
        }
        let rebase = self.sched.period_rebase.get(&stmt).copied().unwrap_or(0);
        let span = self
            .program
            .statement(stmt)
            .array
            .map(|a| self.program.array(a).period)
            .unwrap_or(0);
        format!("({} + {} + rill_period * {})", local, rebase, span)
    }

    fn input_target(
        &mut self,
        stmt: StmtId,
        array: ArrayId,
        indexes: &[AstExpr],
    ) -> Result<String, EmitError> {
        // Infinite inputs write one flow cell per iteration; the write
        // relation pins the flow dimension only, the rest is filled by
        // the input callback row by row.
        let arr = self.program.array(array);
        let stmt_data = self.program.statement(stmt);
        let mut target = self.buffer_names[array].clone();
        match (stmt_data.flow_dim, arr.flow_dim) {
            (Some(sf), Some(af)) => {
                for (d, n) in arr.buffer_size.iter().enumerate() {
                    if d == af {
                        let idx = self.flow_adjusted(stmt, expr_text(&indexes[sf]));
                        target.push_str(&format!("[RILL_MOD({}, {})]", idx, n));
                    } else {
                        target.push_str("[0]");
                    }
                }
            }
            _ => {
                for (d, n) in arr.buffer_size.iter().enumerate() {
                    let idx = indexes
                        .get(d)
                        .map(expr_text)
                        .unwrap_or_else(|| "0".to_string());
                    target.push_str(&format!("[RILL_MOD({}, {})]", idx, n));
                }
            }
        }
        Ok(target)
    }

    /// `buf[RILL_MOD(idx0, n0)][…]` for an affine access.
    fn access_text(
        &self,
        stmt: StmtId,
        array: ArrayId,
        map: &IndexMap,
        indexes: &[AstExpr],
    ) -> Result<String, EmitError> {
        let arr = self.program.array(array);
        let mut target = self.buffer_names[array].clone();
        for (d, row) in map.coef.iter().enumerate() {
            let mut terms: Vec<String> = Vec::new();
            for (c, coef) in row.iter().enumerate() {
                if *coef == 0 {
                    continue;
                }
                let idx = expr_text(&indexes[c]);
                terms.push(if *coef == 1 {
                    idx
                } else {
                    format!("{} * ({})", coef, idx)
                });
            }
            if map.constants[d] != 0 || terms.is_empty() {
                terms.push(map.constants[d].to_string());
            }
            let mut idx = terms.join(" + ");
            if self.periodic && Some(d) == arr.flow_dim {
                // Absolute flow coordinate: local + rebase + periods.
                let rebase = flow_rebase(self.program, self.sched, stmt, map, d);
                idx = format!("{} + {} + rill_period * {}", idx, rebase, arr.period);
            }
            let n = arr.buffer_size.get(d).copied().unwrap_or(1).max(1);
            target.push_str(&format!("[RILL_MOD({}, {})]", idx, n));
        }
        Ok(target)
    }

    fn value_text(
        &self,
        stmt: StmtId,
        expr: &StmtExpr,
        indexes: &[AstExpr],
    ) -> Result<String, EmitError> {
        match expr {
            StmtExpr::Const(v) => Ok(match v {
                Value::Int(i) => i.to_string(),
                Value::Real(r) => format!("{:?}", r),
                Value::Complex(re, im) => format!("({:?} + {:?} * I)", re, im),
                Value::Bool(b) => b.to_string(),
            }),
            StmtExpr::Iterator { dim } => Ok(expr_text(&indexes[*dim])),
            StmtExpr::Read { access } => {
                let read = &self.program.statement(stmt).reads[*access];
                self.access_text(stmt, read.array, &read.map, indexes)
            }
            StmtExpr::Input { .. } => Err(EmitError::Backend {
                detail: "input access in an expression position".to_string(),
            }),
            StmtExpr::Prim { op, args, .. } => {
                let parts: Vec<String> = args
                    .iter()
                    .map(|a| self.value_text(stmt, a, indexes))
                    .collect::<Result<_, _>>()?;
                Ok(prim_text(*op, &parts))
            }
            StmtExpr::Select { cases } => {
                let mut rendered = String::new();
                let mut open = 0;
                for (i, (guard, value)) in cases.iter().enumerate() {
                    let v = self.value_text(stmt, value, indexes)?;
                    match guard {
                        Some(g) => {
                            let gtext = self.value_text(stmt, g, indexes)?;
                            rendered.push_str(&format!("({} ? {} : ", gtext, v));
                            open += 1;
                        }
                        None => {
                            rendered.push_str(&v);
                            break;
                        }
                    }
                    if i + 1 == cases.len() {
                        // No default arm: repeat the last value.
                        rendered.push_str(&v);
                    }
                }
                for _ in 0..open {
                    rendered.push(')');
                }
                Ok(rendered)
            }
        }
    }
}

/// The write-relation rebase of a periodic access on the flow dimension.
fn flow_rebase(
    program: &PolyProgram,
    sched: &Scheduled,
    stmt: StmtId,
    map: &IndexMap,
    dim: usize,
) -> i64 {
    let rebase = sched.period_rebase.get(&stmt).copied().unwrap_or(0);
    let flow = program.statement(stmt).flow_dim.unwrap_or(0);
    map.coef[dim][flow] * rebase
}

fn c_type(kind: PrimKind) -> &'static str {
    match kind {
        PrimKind::Integer => "long",
        PrimKind::Real => "double",
        PrimKind::Complex => "double _Complex",
        PrimKind::Boolean => "bool",
        PrimKind::Infinity | PrimKind::Undefined => "double",
    }
}

fn prim_text(op: PrimitiveOp, args: &[String]) -> String {
    use PrimitiveOp::*;
    let bin = |sym: &str| format!("({} {} {})", args[0], sym, args[1]);
    match op {
        Add => bin("+"),
        Sub => bin("-"),
        Mul => bin("*"),
        Div => bin("/"),
        Mod => bin("%"),
        Pow => format!("pow({}, {})", args[0], args[1]),
        Neg => format!("(-{})", args[0]),
        Eq => bin("=="),
        Neq => bin("!="),
        Lt => bin("<"),
        Lte => bin("<="),
        Gt => bin(">"),
        Gte => bin(">="),
        And => bin("&&"),
        Or => bin("||"),
        Not => format!("(!{})", args[0]),
        Abs => format!("fabs({})", args[0]),
        Min => format!("fmin({}, {})", args[0], args[1]),
        Max => format!("fmax({}, {})", args[0], args[1]),
        Floor => format!("floor({})", args[0]),
        Ceil => format!("ceil({})", args[0]),
        Sqrt => format!("sqrt({})", args[0]),
        Exp => format!("exp({})", args[0]),
        Log => format!("log({})", args[0]),
        Sin => format!("sin({})", args[0]),
        Cos => format!("cos({})", args[0]),
        Re => format!("creal({})", args[0]),
        Im => format!("cimag({})", args[0]),
    }
}

fn expr_text(expr: &AstExpr) -> String {
    match expr {
        AstExpr::Const(v) => v.to_string(),
        AstExpr::Var(level) => format!("t{}", level),
        AstExpr::Sum(parts) => {
            let rendered: Vec<String> = parts.iter().map(expr_text).collect();
            format!("({})", rendered.join(" + "))
        }
        AstExpr::Mul(coef, inner) => format!("{} * ({})", coef, expr_text(inner)),
        AstExpr::FloorDiv(inner, den) => {
            format!("RILL_FLOOR_DIV({}, {})", expr_text(inner), den)
        }
        AstExpr::CeilDiv(inner, den) => {
            format!("RILL_CEIL_DIV({}, {})", expr_text(inner), den)
        }
    }
}

fn cond_text(cond: &AstCond) -> String {
    match cond {
        AstCond::Ge(a, b) => format!("{} >= {}", expr_text(a), expr_text(b)),
        AstCond::Le(a, b) => format!("{} <= {}", expr_text(a), expr_text(b)),
        AstCond::DivisibleBy(e, n) => format!("RILL_MOD({}, {}) == 0", expr_text(e), n),
    }
}
