//! Scheduling of the polyhedral program.
//!
//! Statements are partitioned into finite and infinite; dependencies are
//! extracted by composing write relations with inverted read relations;
//! the schedule solver balances per-statement rates (iterations per
//! period) along the dependency edges, orders statements topologically,
//! and picks offsets by longest-path relaxation. The infinite schedule is
//! then split into an init prefix and one period, and both halves are
//! combined with the finite schedule behind a leading −1/0 dimension.

use super::set::*;
use super::*;
use crate::compiler::fir::Extent;
use num_integer::Integer;
use num_rational::Ratio;
use num_traits::Signed;
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Error, Clone)]
pub enum ScheduleError {
    #[error("scheduler failure: {detail}")]
    Failure { detail: String },
    #[error("statements disagree on {what} for array '{array}'")]
    Inconsistent { what: String, array: String },
}

fn failure(detail: impl Into<String>) -> ScheduleError {
    ScheduleError::Failure {
        detail: detail.into(),
    }
}

/// Which schedules exist, derived strictly from the input partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleKind {
    Empty,
    FiniteOnly,
    InfiniteOnly,
    Combined,
}

/// Everything the buffer sizer and the AST generator consume.
#[derive(Debug)]
pub struct Scheduled {
    pub ctx: Context,
    pub kind: ScheduleKind,
    pub stmt_tuples: Vec<Tuple>,
    pub array_tuples: Vec<Tuple>,
    pub stmt_domains: Vec<BasicSet>,
    pub stmt_by_name: HashMap<u32, StmtId>,
    pub write_relations: UnionMap,
    pub read_relations: UnionMap,
    pub dependencies: UnionMap,
    pub finite_schedule: UnionMap,
    pub infinite_schedule: UnionMap,
    pub init_schedule: UnionMap,
    /// Period schedule with every statement's flow iteration rebased to 0.
    pub period_schedule: UnionMap,
    /// Period schedule before rebasing (domain coordinates intact).
    pub period_schedule_raw: UnionMap,
    /// `d*`: the schedule output dimension driven by the flow iterators.
    pub schedule_flow_dim: usize,
    pub period_offset: i64,
    pub least_common_period: i64,
    pub combined_schedule: UnionMap,
    /// Per statement: the flow iteration the period window starts at
    /// (the amount its domain was rebased by).
    pub period_rebase: HashMap<StmtId, i64>,
}

/// Compute all schedules for `program`, setting `period` and
/// `period_offset` on its arrays.
pub fn schedule(program: &mut PolyProgram) -> Result<Scheduled, ScheduleError> {
    let mut b = Builder::new(program)?;
    b.polyhedral_model();
    b.extract_dependencies();

    let finite: Vec<StmtId> = (0..b.program.statements.len())
        .filter(|s| b.program.statements[*s].flow_dim.is_none())
        .collect();
    let infinite: Vec<StmtId> = (0..b.program.statements.len())
        .filter(|s| b.program.statements[*s].flow_dim.is_some())
        .collect();

    let kind = match (finite.is_empty(), infinite.is_empty()) {
        (true, true) => ScheduleKind::Empty,
        (false, true) => ScheduleKind::FiniteOnly,
        (true, false) => ScheduleKind::InfiniteOnly,
        (false, false) => ScheduleKind::Combined,
    };

    let finite_schedule = b.make_schedule(&finite)?;
    if !finite.is_empty() && finite_schedule.is_empty() {
        return Err(failure("empty finite schedule for a non-empty domain"));
    }
    let infinite_schedule = b.make_schedule(&infinite)?;
    if !infinite.is_empty() && infinite_schedule.is_empty() {
        return Err(failure("empty infinite schedule for a non-empty domain"));
    }

    let mut schedule_flow_dim = 0;
    let mut least_common_period = 1;
    let mut period_offset = 0;
    let mut init_schedule = UnionMap::new();
    let mut period_schedule = UnionMap::new();
    let mut period_schedule_raw = UnionMap::new();
    let mut period_rebase = HashMap::new();

    if !infinite.is_empty() {
        least_common_period =
            b.compute_period(&infinite_schedule, &mut schedule_flow_dim)?;
        period_offset = b.common_offset(&infinite_schedule, schedule_flow_dim)?;
        let split = b.split_periodic(
            &infinite_schedule,
            schedule_flow_dim,
            period_offset,
            least_common_period,
            &mut period_rebase,
        )?;
        init_schedule = split.0;
        period_schedule = split.1;
        period_schedule_raw = split.2;
    }

    let combined_schedule = combine_schedules(&finite_schedule, &infinite_schedule, &b);

    Ok(Scheduled {
        ctx: b.ctx,
        kind,
        stmt_tuples: b.stmt_tuples,
        array_tuples: b.array_tuples,
        stmt_domains: b.stmt_domains,
        stmt_by_name: b.stmt_by_name,
        write_relations: b.write_relations,
        read_relations: b.read_relations,
        dependencies: b.dependencies,
        finite_schedule,
        infinite_schedule,
        init_schedule,
        period_schedule,
        period_schedule_raw,
        schedule_flow_dim,
        period_offset,
        least_common_period,
        combined_schedule,
        period_rebase,
    })
}

struct Builder<'p> {
    program: &'p mut PolyProgram,
    ctx: Context,
    stmt_tuples: Vec<Tuple>,
    array_tuples: Vec<Tuple>,
    stmt_domains: Vec<BasicSet>,
    stmt_by_name: HashMap<u32, StmtId>,
    write_relations: UnionMap,
    read_relations: UnionMap,
    dependencies: UnionMap,
}

impl<'p> Builder<'p> {
    fn new(program: &'p mut PolyProgram) -> Result<Self, ScheduleError> {
        // Statement and array tuple names must be unique.
        let mut seen = std::collections::HashSet::new();
        for i in 0..program.statements.len() {
            if !seen.insert(program.statements[i].name.clone()) {
                let fresh = format!("{}_s{}", program.statements[i].name, i);
                program.statements[i].name = fresh.clone();
                seen.insert(fresh);
            }
        }
        let mut seen = std::collections::HashSet::new();
        for i in 0..program.arrays.len() {
            if !seen.insert(program.arrays[i].name.clone()) {
                let fresh = format!("{}_a{}", program.arrays[i].name, i);
                program.arrays[i].name = fresh.clone();
                seen.insert(fresh);
            }
        }
        let mut ctx = Context::new();
        let stmt_tuples: Vec<Tuple> = program
            .statements
            .iter()
            .map(|s| ctx.tuple(&s.name, s.dims()))
            .collect();
        // Array spaces live in their own namespace.
        let array_tuples: Vec<Tuple> = program
            .arrays
            .iter()
            .map(|a| ctx.tuple(&format!("{}$", a.name), a.size.len()))
            .collect();
        let stmt_by_name = stmt_tuples
            .iter()
            .enumerate()
            .map(|(i, t)| (t.name.expect("statement tuples are named"), i))
            .collect();
        Ok(Self {
            program,
            ctx,
            stmt_tuples,
            array_tuples,
            stmt_domains: Vec::new(),
            stmt_by_name,
            write_relations: UnionMap::new(),
            read_relations: UnionMap::new(),
            dependencies: UnionMap::new(),
        })
    }

    /// Iteration domains and write/read relations as sets/maps.
    fn polyhedral_model(&mut self) {
        for (s, stmt) in self.program.statements.iter().enumerate() {
            let tuple = self.stmt_tuples[s];
            let mut dom = BasicSet::universe(tuple);
            for (d, extent) in stmt.domain.iter().enumerate() {
                if let Extent::Finite(n) = extent {
                    dom.add_ineq(&[(d, 1)], 0);
                    dom.add_ineq(&[(d, -1)], n - 1);
                }
            }
            for g in &stmt.guards {
                let terms: Vec<(usize, i64)> = g
                    .coefs
                    .iter()
                    .enumerate()
                    .filter(|(_, c)| **c != 0)
                    .map(|(d, c)| (d, *c))
                    .collect();
                if g.equality {
                    dom.add_eq(&terms, g.constant);
                } else {
                    dom.add_ineq(&terms, g.constant);
                }
            }
            self.stmt_domains.push(dom);
        }
        for (s, stmt) in self.program.statements.iter().enumerate() {
            let tuple = self.stmt_tuples[s];
            if let Some(array) = stmt.array {
                let space = Space::new(tuple, self.array_tuples[array]);
                let mut rel = BasicMap::universe(space);
                match &stmt.write {
                    Some(write) => {
                        add_index_map(&mut rel, write);
                    }
                    None => {
                        // Infinite input access: the write pins the flow
                        // dimensions only.
                        let sf = stmt.flow_dim.expect("input write without flow");
                        let af = self.program.arrays[array]
                            .flow_dim
                            .expect("input array without flow");
                        rel.add_eq(&[(rel.col_in(sf), 1), (rel.col_out(af), -1)], 0);
                    }
                }
                self.write_relations.add_basic(rel);
            }
            for read in &stmt.reads {
                let space = Space::new(tuple, self.array_tuples[read.array]);
                let mut rel = BasicMap::universe(space);
                add_index_map(&mut rel, &read.map);
                self.read_relations.add_basic(rel);
            }
        }
    }

    /// writer → reader dependences, plus the `out = in + 1` ordering
    /// self-dependency of every infinite input access.
    fn extract_dependencies(&mut self) {
        self.dependencies = self
            .write_relations
            .map_range_through(&self.read_relations.inverse());
        for (s, stmt) in self.program.statements.iter().enumerate() {
            if stmt.flow_dim.is_some() && (stmt.expr.is_input() || stmt.array.is_none()) {
                let tuple = self.stmt_tuples[s];
                let space = Space::new(tuple, tuple);
                let mut dep = BasicMap::universe(space);
                let f = stmt.flow_dim.expect("checked above");
                dep.add_eq(&[(dep.col_out(f), 1), (dep.col_in(f), -1)], -1);
                for d in 0..stmt.dims() {
                    if d != f {
                        dep.add_eq(&[(dep.col_out(d), 1), (dep.col_in(d), -1)], 0);
                    }
                }
                self.dependencies.add_basic(dep);
            }
        }
    }

    /// Dependency edges within `subset`, as (writer, reader, basic map).
    fn edges_in(&self, subset: &[StmtId]) -> Vec<(StmtId, StmtId, BasicMap)> {
        let member: std::collections::HashSet<StmtId> = subset.iter().copied().collect();
        let mut out = Vec::new();
        for map in &self.dependencies.maps {
            let (Some(w_name), Some(r_name)) = (map.space.input.name, map.space.output.name)
            else {
                continue;
            };
            let (Some(&w), Some(&r)) = (
                self.stmt_by_name.get(&w_name),
                self.stmt_by_name.get(&r_name),
            ) else {
                continue;
            };
            if !member.contains(&w) || !member.contains(&r) {
                continue;
            }
            for bm in &map.basics {
                out.push((w, r, bm.clone()));
            }
        }
        out
    }

    /// The schedule solver: validity and proximity constraints are the
    /// dependences; the schedule is `(k·flow + c, seq, other iters…)` for
    /// infinite statements and `(seq, iters…)` for finite ones.
    fn make_schedule(&self, subset: &[StmtId]) -> Result<UnionMap, ScheduleError> {
        let mut result = UnionMap::new();
        if subset.is_empty() {
            return Ok(result);
        }
        let edges = self.edges_in(subset);
        let infinite = self.program.statements[subset[0]].flow_dim.is_some();

        let seq = self.sequence(subset, &edges, infinite)?;

        // Infinite: (k·flow + c, seq, other iters…); finite: (seq, iters…).
        // Both shapes need one leading dimension plus the iteration dims.
        let rank = subset
            .iter()
            .map(|s| 1 + self.program.statements[*s].dims())
            .max()
            .expect("subset is non-empty");

        let (ks, cs) = if infinite {
            let ks = self.balance_rates(subset, &edges)?;
            let cs = self.solve_offsets(subset, &edges, &ks, &seq)?;
            (ks, cs)
        } else {
            (HashMap::new(), HashMap::new())
        };

        for &s in subset {
            let stmt = &self.program.statements[s];
            let tuple = self.stmt_tuples[s];
            let out = Context::anonymous(rank);
            let mut map = BasicMap::universe(Space::new(tuple, out));
            let mut next_out = 0;
            if infinite {
                let f = stmt.flow_dim.expect("infinite statement");
                let k = ks[&s];
                let c = cs[&s];
                map.add_eq(&[(map.col_out(0), 1), (map.col_in(f), -k)], -c);
                map.add_eq(&[(map.col_out(1), 1)], -(seq[&s] as i64));
                next_out = 2;
                for d in 0..stmt.dims() {
                    if d != f {
                        map.add_eq(&[(map.col_out(next_out), 1), (map.col_in(d), -1)], 0);
                        next_out += 1;
                    }
                }
            } else {
                map.add_eq(&[(map.col_out(0), 1)], -(seq[&s] as i64));
                next_out = 1;
                for d in 0..stmt.dims() {
                    map.add_eq(&[(map.col_out(next_out), 1), (map.col_in(d), -1)], 0);
                    next_out += 1;
                }
            }
            for z in next_out..rank {
                map.add_eq(&[(map.col_out(z), 1)], 0);
            }
            let map = map
                .intersect_domain(&self.stmt_domains[s])
                .expect("domain tuple matches");
            result.add_basic(map);
        }
        Ok(result)
    }

    /// Topological sequence numbers over the dependence condensation.
    fn sequence(
        &self,
        subset: &[StmtId],
        edges: &[(StmtId, StmtId, BasicMap)],
        allow_cycles: bool,
    ) -> Result<HashMap<StmtId, usize>, ScheduleError> {
        let sccs = strongly_connected(subset, edges);
        if !allow_cycles {
            for scc in &sccs {
                if scc.len() > 1 {
                    return Err(failure(
                        "cyclic dependence between finite statements",
                    ));
                }
            }
        }
        // `strongly_connected` returns components in reverse topological
        // order of the condensation.
        let mut seq = HashMap::new();
        let mut next = 0;
        for scc in sccs.iter().rev() {
            let mut members = scc.clone();
            members.sort_unstable();
            for m in members {
                seq.insert(m, next);
                next += 1;
            }
        }
        Ok(seq)
    }

    /// Iterations-per-period from the linear dependence coefficients
    /// (`writer_flow = α·reader_flow + β` forces `n_w = α·n_r`), scaled
    /// to the least integers; returns the per-statement time step
    /// `k = lcm(n) / n`.
    fn balance_rates(
        &self,
        subset: &[StmtId],
        edges: &[(StmtId, StmtId, BasicMap)],
    ) -> Result<HashMap<StmtId, i64>, ScheduleError> {
        type R = Ratio<i64>;
        let mut ratio_edges: Vec<(StmtId, StmtId, R)> = Vec::new();
        for (w, r, bm) in edges {
            let wf = self.program.statements[*w].flow_dim.expect("infinite");
            let rf = self.program.statements[*r].flow_dim.expect("infinite");
            let n_in = bm.space.n_in();
            for row in &bm.eqs {
                let cw = row[wf];
                let cr = row[n_in + rf];
                if cw != 0 && cr != 0 {
                    // cw·w + cr·r + … = 0  ⇒  w = (−cr/cw)·r + …
                    let alpha = -R::new(cr, cw);
                    if !alpha.is_positive() {
                        return Err(failure("non-positive dependence rate"));
                    }
                    ratio_edges.push((*w, *r, alpha));
                }
            }
        }
        let mut rates: HashMap<StmtId, R> = HashMap::new();
        for &start in subset {
            if rates.contains_key(&start) {
                continue;
            }
            rates.insert(start, R::new(1, 1));
            let mut stack = vec![start];
            while let Some(s) = stack.pop() {
                let here = rates[&s];
                for (w, r, alpha) in &ratio_edges {
                    let (other, implied) = if *w == s {
                        // n_w = α n_r ⇒ n_r = n_w / α
                        (*r, here / alpha)
                    } else if *r == s {
                        (*w, here * alpha)
                    } else {
                        continue;
                    };
                    match rates.get(&other) {
                        Some(have) if *have != implied => {
                            return Err(failure("inconsistent dataflow rates"));
                        }
                        Some(_) => {}
                        None => {
                            rates.insert(other, implied);
                            stack.push(other);
                        }
                    }
                }
            }
        }
        // Scale to least integers.
        let denom = subset
            .iter()
            .fold(1i64, |acc, s| acc.lcm(rates[s].denom()));
        let mut ints: HashMap<StmtId, i64> = subset
            .iter()
            .map(|s| (*s, (rates[s] * denom).to_integer()))
            .collect();
        let g = subset.iter().fold(0i64, |acc, s| acc.gcd(&ints[s]));
        if g > 1 {
            for v in ints.values_mut() {
                *v /= g;
            }
        }
        let period = subset.iter().fold(1i64, |acc, s| acc.lcm(&ints[s]));
        Ok(subset.iter().map(|s| (*s, period / ints[s])).collect())
    }

    /// Offsets by longest-path relaxation: for every dependence,
    /// `c_r ≥ c_w + max(k_w·w_flow − k_r·r_flow) (+1 unless the sequence
    /// breaks the tie)`.
    fn solve_offsets(
        &self,
        subset: &[StmtId],
        edges: &[(StmtId, StmtId, BasicMap)],
        ks: &HashMap<StmtId, i64>,
        seq: &HashMap<StmtId, usize>,
    ) -> Result<HashMap<StmtId, i64>, ScheduleError> {
        let mut weighted: Vec<(StmtId, StmtId, i64)> = Vec::new();
        for (w, r, bm) in edges {
            let wf = self.program.statements[*w].flow_dim.expect("infinite");
            let rf = self.program.statements[*r].flow_dim.expect("infinite");
            let restricted = bm
                .intersect_domain(&self.stmt_domains[*w])
                .and_then(|m| m.intersect_range(&self.stmt_domains[*r]))
                .expect("dependence tuples match domains");
            let n_in = bm.space.n_in();
            let mut obj = vec![0i64; bm.space.cols()];
            obj[wf] = ks[w];
            obj[n_in + rf] = -ks[r];
            match restricted.max_at(&obj) {
                Bound::Empty => continue,
                Bound::Unbounded => {
                    return Err(failure("unbounded dependence distance"));
                }
                Bound::Value(delta) => {
                    let tie_break = seq[w] < seq[r];
                    weighted.push((*w, *r, delta + if tie_break { 0 } else { 1 }));
                }
            }
        }
        let mut cs: HashMap<StmtId, i64> = subset.iter().map(|s| (*s, 0)).collect();
        for round in 0..=subset.len() {
            let mut changed = false;
            for (w, r, weight) in &weighted {
                let bound = cs[w] + weight;
                if cs[r] < bound {
                    cs.insert(*r, bound);
                    changed = true;
                }
            }
            if !changed {
                break;
            }
            if round == subset.len() {
                return Err(failure("dependences admit no periodic schedule"));
            }
        }
        let min = cs.values().copied().min().unwrap_or(0);
        for v in cs.values_mut() {
            *v -= min;
        }
        Ok(cs)
    }

    /// §period: find `d*` and the least common period by scanning the
    /// schedule's equality rows; store the per-array period span.
    fn compute_period(
        &mut self,
        schedule: &UnionMap,
        flow_dim_out: &mut usize,
    ) -> Result<i64, ScheduleError> {
        let mut ks: Vec<(StmtId, i64)> = Vec::new();
        let mut sched_flow_dim: Option<usize> = None;
        for map in &schedule.maps {
            let name = map.space.input.name.expect("statement tuple");
            let s = self.stmt_by_name[&name];
            let stmt_flow = self.program.statements[s]
                .flow_dim
                .expect("infinite statement");
            let n_in = map.space.n_in();
            let n_out = map.space.n_out();
            for bm in &map.basics {
                let mut first_out_dim = n_out;
                let mut first_flow_k = 0i64;
                for row in &bm.eqs {
                    let flow_k = row[stmt_flow];
                    if flow_k == 0 {
                        continue;
                    }
                    for out in 0..n_out {
                        if row[n_in + out] != 0 {
                            if out < first_out_dim {
                                first_out_dim = out;
                                first_flow_k = flow_k.abs();
                            }
                            break;
                        }
                    }
                }
                ks.push((s, first_flow_k));
                match sched_flow_dim {
                    None => sched_flow_dim = Some(first_out_dim),
                    Some(d) if d != first_out_dim => {
                        eprintln!("warning: schedules disagree on the flow dimension");
                    }
                    Some(_) => {}
                }
            }
        }
        *flow_dim_out = sched_flow_dim.unwrap_or(0);
        let mut lcm = 1i64;
        for (_, k) in &ks {
            if *k != 0 {
                lcm = lcm.lcm(k);
            }
        }
        // The span of one period in each statement's flow dimension; it is
        // also the per-period offset added to buffer indexes.
        for (s, k) in &ks {
            if *k == 0 {
                continue;
            }
            let span = lcm / k;
            let Some(array) = self.program.statements[*s].array else {
                continue;
            };
            let a = &mut self.program.arrays[array];
            if a.period == 0 {
                a.period = span;
            } else if a.period != span {
                return Err(ScheduleError::Inconsistent {
                    what: "period".to_string(),
                    array: a.name.clone(),
                });
            }
        }
        Ok(lcm)
    }

    /// One past the largest `sched[d*]` reached by any iteration with
    /// `iter[flow] < 0`: the schedule time taken by initialization.
    fn common_offset(
        &self,
        schedule: &UnionMap,
        sched_flow_dim: usize,
    ) -> Result<i64, ScheduleError> {
        let mut offset = i64::MIN;
        for map in &schedule.maps {
            let name = map.space.input.name.expect("statement tuple");
            let s = self.stmt_by_name[&name];
            let stmt_flow = self.program.statements[s]
                .flow_dim
                .expect("infinite statement");
            for bm in &map.basics {
                let mut m = bm.clone();
                // iter[flow] ≤ −1
                m.add_ineq(&[(m.col_in(stmt_flow), -1)], -1);
                let n_in = m.space.n_in();
                let mut obj = vec![0i64; m.space.cols()];
                obj[n_in + sched_flow_dim] = 1;
                match m.max_at(&obj) {
                    Bound::Empty => continue,
                    Bound::Unbounded => {
                        return Err(failure("unbounded initialization phase"));
                    }
                    Bound::Value(v) => offset = offset.max(v + 1),
                }
            }
        }
        if offset == i64::MIN {
            offset = 0;
        }
        Ok(offset)
    }

    /// Split the infinite schedule into the init prefix and one period,
    /// rebasing every statement's flow iteration to start at 0 within the
    /// period and recording the rebase offset on its array.
    #[allow(clippy::type_complexity)]
    fn split_periodic(
        &mut self,
        schedule: &UnionMap,
        sched_flow_dim: usize,
        offset: i64,
        period: i64,
        rebase: &mut HashMap<StmtId, i64>,
    ) -> Result<(UnionMap, UnionMap, UnionMap), ScheduleError> {
        let mut init = UnionMap::new();
        let mut periodic = UnionMap::new();
        let mut periodic_raw = UnionMap::new();
        for map in &schedule.maps {
            let name = map.space.input.name.expect("statement tuple");
            let s = self.stmt_by_name[&name];
            let stmt_flow = self.program.statements[s]
                .flow_dim
                .expect("infinite statement");
            for bm in &map.basics {
                // Init: iter[flow] ≥ 0 ∧ sched[d*] < offset.
                let mut m = bm.clone();
                m.add_ineq(&[(m.col_in(stmt_flow), 1)], 0);
                m.add_ineq(&[(m.col_out(sched_flow_dim), -1)], offset - 1);
                if !m.is_empty() {
                    init.add_basic(m);
                }
                // Period window: offset ≤ sched[d*] < offset + period.
                let mut p = bm.clone();
                p.add_ineq(&[(p.col_out(sched_flow_dim), 1)], -offset);
                p.add_ineq(&[(p.col_out(sched_flow_dim), -1)], offset + period - 1);
                if p.is_empty() {
                    continue;
                }
                periodic_raw.add_basic(p.clone());
                let min_flow = match p.domain().min_var(stmt_flow) {
                    Bound::Value(v) => v,
                    Bound::Empty => continue,
                    Bound::Unbounded => {
                        return Err(failure("unbounded period window"));
                    }
                };
                if let Some(array) = self.program.statements[s].array {
                    // The first `period_offset` cells of the array's flow
                    // dimension belong to initialization; the write
                    // relation's constant shifts iteration coordinates
                    // into array coordinates.
                    let write_shift = self.program.statements[s]
                        .write
                        .as_ref()
                        .map(|w| {
                            let af = self.program.arrays[array].flow_dim.unwrap_or(0);
                            w.constants[af]
                        })
                        .unwrap_or(0);
                    let a = &mut self.program.arrays[array];
                    let period_offset = min_flow + write_shift;
                    if a.period_offset == 0 {
                        a.period_offset = period_offset;
                    } else if a.period_offset != period_offset {
                        return Err(ScheduleError::Inconsistent {
                            what: "period offset".to_string(),
                            array: a.name.clone(),
                        });
                    }
                }
                let entry = rebase.entry(s).or_insert(min_flow);
                *entry = (*entry).min(min_flow);
                let mut translated = p.clone();
                translated.translate_in(stmt_flow, min_flow);
                periodic.add_basic(translated);
            }
        }
        Ok((init, periodic, periodic_raw))
    }
}

fn add_index_map(rel: &mut BasicMap, map: &IndexMap) {
    for (r, row) in map.coef.iter().enumerate() {
        let mut terms: Vec<(usize, i64)> = row
            .iter()
            .enumerate()
            .filter(|(_, c)| **c != 0)
            .map(|(d, c)| (rel.col_in(d), *c))
            .collect();
        terms.push((rel.col_out(r), -1));
        rel.add_eq(&terms, map.constants[r]);
    }
}

/// Prepend the phase dimension (finite −1, infinite 0), pad the narrower
/// schedule with trailing zeros, and union.
fn combine_schedules(
    finite: &UnionMap,
    infinite: &UnionMap,
    b: &Builder<'_>,
) -> UnionMap {
    let rank_of = |um: &UnionMap| um.maps.first().map(|m| m.space.n_out()).unwrap_or(0);
    let finite_rank = rank_of(finite);
    let infinite_rank = rank_of(infinite);
    let rank = finite_rank.max(infinite_rank);
    let mut combined = UnionMap::new();
    for map in &finite.maps {
        for bm in &map.basics {
            let mut m = bm.clone();
            m.insert_out_dims(0, 1);
            m.add_eq(&[(m.col_out(0), 1)], 1); // phase = −1
            for z in finite_rank..rank {
                m.insert_out_dims(z + 1, 1);
                m.add_eq(&[(m.col_out(z + 1), 1)], 0);
            }
            combined.add_basic(m);
        }
    }
    for map in &infinite.maps {
        let name = map.space.input.name.expect("statement tuple");
        let s = b.stmt_by_name[&name];
        let stmt_flow = b.program.statements[s].flow_dim.expect("infinite");
        for bm in &map.basics {
            let mut m = bm.clone();
            m.add_ineq(&[(m.col_in(stmt_flow), 1)], 0);
            m.insert_out_dims(0, 1);
            m.add_eq(&[(m.col_out(0), 1)], 0); // phase = 0
            for z in infinite_rank..rank {
                m.insert_out_dims(z + 1, 1);
                m.add_eq(&[(m.col_out(z + 1), 1)], 0);
            }
            combined.add_basic(m);
        }
    }
    combined
}

/// Tarjan's strongly connected components; returned in reverse
/// topological order of the condensation.
fn strongly_connected(
    nodes: &[StmtId],
    edges: &[(StmtId, StmtId, BasicMap)],
) -> Vec<Vec<StmtId>> {
    let index_of: HashMap<StmtId, usize> =
        nodes.iter().enumerate().map(|(i, s)| (*s, i)).collect();
    let n = nodes.len();
    let mut succ: Vec<Vec<usize>> = vec![Vec::new(); n];
    for (w, r, _) in edges {
        if let (Some(&a), Some(&b)) = (index_of.get(w), index_of.get(r)) {
            if a != b {
                succ[a].push(b);
            }
        }
    }
    struct State {
        index: Vec<Option<usize>>,
        low: Vec<usize>,
        on_stack: Vec<bool>,
        stack: Vec<usize>,
        next: usize,
        out: Vec<Vec<usize>>,
    }
    fn visit(v: usize, succ: &[Vec<usize>], st: &mut State) {
        st.index[v] = Some(st.next);
        st.low[v] = st.next;
        st.next += 1;
        st.stack.push(v);
        st.on_stack[v] = true;
        for &w in &succ[v] {
            if st.index[w].is_none() {
                visit(w, succ, st);
                st.low[v] = st.low[v].min(st.low[w]);
            } else if st.on_stack[w] {
                st.low[v] = st.low[v].min(st.index[w].expect("indexed"));
            }
        }
        if st.low[v] == st.index[v].expect("indexed") {
            let mut comp = Vec::new();
            while let Some(w) = st.stack.pop() {
                st.on_stack[w] = false;
                comp.push(w);
                if w == v {
                    break;
                }
            }
            st.out.push(comp);
        }
    }
    let mut st = State {
        index: vec![None; n],
        low: vec![0; n],
        on_stack: vec![false; n],
        stack: Vec::new(),
        next: 0,
        out: Vec::new(),
    };
    for v in 0..n {
        if st.index[v].is_none() {
            visit(v, &succ, &mut st);
        }
    }
    st.out
        .into_iter()
        .map(|comp| comp.into_iter().map(|i| nodes[i]).collect())
        .collect()
}
