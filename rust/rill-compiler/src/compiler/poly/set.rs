//! Integer set and map algebra over named tuple spaces.
//!
//! This is the compiler's stand-in for an external polyhedral library.
//! Basic sets and maps are integer constraint matrices (columns are
//! in-dims ∥ out-dims ∥ constant); sets/maps are unions of basics in one
//! space; union sets/maps span several spaces. Projection is Gaussian
//! elimination on equalities plus Fourier–Motzkin on inequalities, with
//! gcd tightening so the common unimodular-with-stride relations stay
//! exact.

use num_integer::Integer;
use std::collections::HashMap;

/// Names the tuple spaces of one compilation. Spaces carry interned ids,
/// so the schedule and buffer passes compare spaces without touching
/// strings; the ids resolve back to names only at code-generation time.
#[derive(Debug, Default)]
pub struct Context {
    names: Vec<String>,
    ids: HashMap<String, u32>,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    /// A named tuple space of the given rank; one id per distinct name.
    pub fn tuple(&mut self, name: &str, dims: usize) -> Tuple {
        let id = match self.ids.get(name) {
            Some(&id) => id,
            None => {
                let id = self.names.len() as u32;
                self.names.push(name.to_string());
                self.ids.insert(name.to_string(), id);
                id
            }
        };
        Tuple {
            name: Some(id),
            dims,
        }
    }

    pub fn anonymous(dims: usize) -> Tuple {
        Tuple { name: None, dims }
    }

    pub fn name_of(&self, tuple: Tuple) -> &str {
        tuple
            .name
            .and_then(|id| self.names.get(id as usize))
            .map(String::as_str)
            .unwrap_or("_")
    }

    /// The id a name was interned under, if any tuple uses it.
    pub fn find(&self, name: &str) -> Option<u32> {
        self.ids.get(name).copied()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Tuple {
    pub name: Option<u32>,
    pub dims: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Space {
    pub input: Tuple,
    pub output: Tuple,
}

impl Space {
    pub fn new(input: Tuple, output: Tuple) -> Self {
        Self { input, output }
    }

    pub fn n_in(&self) -> usize {
        self.input.dims
    }
    pub fn n_out(&self) -> usize {
        self.output.dims
    }
    pub fn cols(&self) -> usize {
        self.n_in() + self.n_out() + 1
    }

    pub fn reversed(&self) -> Space {
        Space {
            input: self.output,
            output: self.input,
        }
    }
}

// ── Row arithmetic ──

pub type Row = Vec<i64>;

fn floor_div(a: i64, b: i64) -> i64 {
    debug_assert!(b > 0);
    a.div_euclid(b)
}

fn combine(a: &Row, b: &Row, ca: i64, cb: i64) -> Row {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| ca * x + cb * y)
        .collect()
}

/// Divide an equality row by the gcd of its variable coefficients.
/// Returns false when the gcd does not divide the constant (no integer
/// solutions).
fn normalize_eq(row: &mut Row) -> bool {
    let n = row.len() - 1;
    let g = row[..n].iter().fold(0i64, |acc, &c| acc.gcd(&c));
    if g == 0 {
        return row[n] == 0;
    }
    if row[n] % g != 0 {
        return false;
    }
    for c in row.iter_mut() {
        *c /= g;
    }
    true
}

/// Divide an inequality row by the gcd of its variable coefficients,
/// floor-dividing the constant (integer tightening).
fn normalize_ineq(row: &mut Row) {
    let n = row.len() - 1;
    let g = row[..n].iter().fold(0i64, |acc, &c| acc.gcd(&c));
    if g <= 1 {
        return;
    }
    for c in row[..n].iter_mut() {
        *c /= g;
    }
    row[n] = floor_div(row[n], g);
}

/// A conjunction of integer constraints over `nvars` variables.
/// Row layout: `nvars` coefficients then the constant; equalities read
/// `Σ c·x + k = 0`, inequalities `Σ c·x + k ≥ 0`.
#[derive(Debug, Clone, Default)]
struct System {
    nvars: usize,
    eqs: Vec<Row>,
    ineqs: Vec<Row>,
    infeasible: bool,
}

impl System {
    fn universe(nvars: usize) -> Self {
        Self {
            nvars,
            ..Default::default()
        }
    }

    /// Eliminate variable `col` (Gauss if an equality defines it,
    /// Fourier–Motzkin otherwise). The column keeps its position but ends
    /// up unused; callers compact columns afterwards.
    fn eliminate(&mut self, col: usize) {
        if self.infeasible {
            return;
        }
        // Prefer a unit-coefficient equality as the pivot.
        let pivot_idx = self
            .eqs
            .iter()
            .position(|r| r[col].abs() == 1)
            .or_else(|| self.eqs.iter().position(|r| r[col] != 0));
        if let Some(idx) = pivot_idx {
            let pivot = self.eqs.remove(idx);
            let p = pivot[col];
            for row in self.eqs.iter_mut() {
                if row[col] != 0 {
                    let k = if p > 0 { -row[col] } else { row[col] };
                    *row = combine(row, &pivot, p.abs(), k);
                    if !normalize_eq(row) {
                        self.infeasible = true;
                        return;
                    }
                }
            }
            for row in self.ineqs.iter_mut() {
                if row[col] != 0 {
                    let k = if p > 0 { -row[col] } else { row[col] };
                    *row = combine(row, &pivot, p.abs(), k);
                    normalize_ineq(row);
                }
            }
            return;
        }
        // Fourier–Motzkin on the inequalities.
        let (with_col, zero): (Vec<Row>, Vec<Row>) =
            std::mem::take(&mut self.ineqs).into_iter().partition(|r| r[col] != 0);
        self.ineqs = zero;
        let (pos, neg): (Vec<Row>, Vec<Row>) = with_col.into_iter().partition(|r| r[col] > 0);
        for p in &pos {
            for n in &neg {
                let mut row = combine(p, n, -n[col], p[col]);
                debug_assert_eq!(row[col], 0);
                normalize_ineq(&mut row);
                self.ineqs.push(row);
            }
        }
    }

    /// Project out columns `start..start+count`.
    fn project_out(&mut self, start: usize, count: usize) {
        for col in start..start + count {
            self.eliminate(col);
            if self.infeasible {
                break;
            }
        }
        let remove = |row: &Row| -> Row {
            let mut out = Vec::with_capacity(row.len() - count);
            for (i, v) in row.iter().enumerate() {
                if i < start || i >= start + count {
                    out.push(*v);
                }
            }
            out
        };
        self.eqs = self.eqs.iter().map(remove).collect();
        self.ineqs = self.ineqs.iter().map(remove).collect();
        self.nvars -= count;
    }

    fn is_empty(&self) -> bool {
        if self.infeasible {
            return true;
        }
        let mut probe = self.clone();
        for col in 0..probe.nvars {
            probe.eliminate(col);
            if probe.infeasible {
                return true;
            }
        }
        let n = probe.nvars;
        probe.eqs.iter().any(|r| r[n] != 0) || probe.ineqs.iter().any(|r| r[n] < 0)
    }

    /// Extreme value of the affine objective (len `nvars + 1`).
    fn bound(&self, objective: &[i64], maximize: bool) -> Bound {
        if self.is_empty() {
            return Bound::Empty;
        }
        let widen = |row: &Row| -> Row {
            let mut out = row[..self.nvars].to_vec();
            out.push(0); // z column
            out.push(row[self.nvars]);
            out
        };
        let mut sys = System::universe(self.nvars + 1);
        sys.eqs = self.eqs.iter().map(widen).collect();
        sys.ineqs = self.ineqs.iter().map(widen).collect();
        // z = objective
        let mut zdef: Row = objective[..self.nvars].to_vec();
        zdef.push(-1);
        zdef.push(objective[self.nvars]);
        sys.eqs.push(zdef);
        sys.project_out(0, self.nvars);
        if sys.is_empty() {
            return Bound::Empty;
        }
        let mut lower: Option<i64> = None;
        let mut upper: Option<i64> = None;
        let tighten = |lo: Option<i64>, hi: Option<i64>, lower: &mut Option<i64>, upper: &mut Option<i64>| {
            if let Some(v) = lo {
                *lower = Some(lower.map_or(v, |cur: i64| cur.max(v)));
            }
            if let Some(v) = hi {
                *upper = Some(upper.map_or(v, |cur: i64| cur.min(v)));
            }
        };
        for row in &sys.eqs {
            let c = row[0];
            if c != 0 {
                let v = -row[1] / c;
                tighten(Some(v), Some(v), &mut lower, &mut upper);
            }
        }
        for row in &sys.ineqs {
            let c = row[0];
            if c > 0 {
                tighten(Some(-floor_div(row[1], c)), None, &mut lower, &mut upper);
            } else if c < 0 {
                tighten(None, Some(floor_div(row[1], -c)), &mut lower, &mut upper);
            }
        }
        if maximize {
            upper.map_or(Bound::Unbounded, Bound::Value)
        } else {
            lower.map_or(Bound::Unbounded, Bound::Value)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bound {
    Empty,
    Unbounded,
    Value(i64),
}

impl Bound {
    pub fn value(self) -> Option<i64> {
        match self {
            Bound::Value(v) => Some(v),
            _ => None,
        }
    }
}

// ── Basic maps and sets ──

#[derive(Debug, Clone)]
pub struct BasicMap {
    pub space: Space,
    pub eqs: Vec<Row>,
    pub ineqs: Vec<Row>,
}

impl BasicMap {
    pub fn universe(space: Space) -> Self {
        Self {
            space,
            eqs: Vec::new(),
            ineqs: Vec::new(),
        }
    }

    pub fn col_in(&self, dim: usize) -> usize {
        dim
    }
    pub fn col_out(&self, dim: usize) -> usize {
        self.space.n_in() + dim
    }
    pub fn col_const(&self) -> usize {
        self.space.n_in() + self.space.n_out()
    }

    fn zero_row(&self) -> Row {
        vec![0; self.space.cols()]
    }

    /// `coeffs · cols + constant = 0`
    pub fn add_eq(&mut self, terms: &[(usize, i64)], constant: i64) {
        let mut row = self.zero_row();
        for (col, c) in terms {
            row[*col] += c;
        }
        let last = self.col_const();
        row[last] += constant;
        self.eqs.push(row);
    }

    /// `coeffs · cols + constant ≥ 0`
    pub fn add_ineq(&mut self, terms: &[(usize, i64)], constant: i64) {
        let mut row = self.zero_row();
        for (col, c) in terms {
            row[*col] += c;
        }
        let last = self.col_const();
        row[last] += constant;
        self.ineqs.push(row);
    }

    fn system(&self) -> System {
        System {
            nvars: self.space.cols() - 1,
            eqs: self.eqs.clone(),
            ineqs: self.ineqs.clone(),
            infeasible: false,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.system().is_empty()
    }

    pub fn inverse(&self) -> BasicMap {
        let n_in = self.space.n_in();
        let n_out = self.space.n_out();
        let swap = |row: &Row| -> Row {
            let mut out = Vec::with_capacity(row.len());
            out.extend_from_slice(&row[n_in..n_in + n_out]);
            out.extend_from_slice(&row[..n_in]);
            out.push(row[n_in + n_out]);
            out
        };
        BasicMap {
            space: self.space.reversed(),
            eqs: self.eqs.iter().map(swap).collect(),
            ineqs: self.ineqs.iter().map(swap).collect(),
        }
    }

    pub fn intersect(&self, other: &BasicMap) -> BasicMap {
        debug_assert_eq!(self.space, other.space);
        let mut out = self.clone();
        out.eqs.extend(other.eqs.iter().cloned());
        out.ineqs.extend(other.ineqs.iter().cloned());
        out
    }

    /// `{ x → z : ∃y, self(x,y) ∧ then(y,z) }`
    pub fn join(&self, then: &BasicMap) -> Option<BasicMap> {
        if self.space.output != then.space.input {
            return None;
        }
        let n_a = self.space.n_in();
        let n_b = self.space.n_out();
        let n_c = then.space.n_out();
        let total = n_a + n_b + n_c;
        let mut sys = System::universe(total);
        let place_left = |row: &Row| -> Row {
            let mut r = vec![0; total + 1];
            r[..n_a + n_b].copy_from_slice(&row[..n_a + n_b]);
            r[total] = row[n_a + n_b];
            r
        };
        sys.eqs.extend(self.eqs.iter().map(place_left));
        sys.ineqs.extend(self.ineqs.iter().map(place_left));
        for row in &then.eqs {
            let mut r = vec![0; total + 1];
            r[n_a..n_a + n_b + n_c].copy_from_slice(&row[..n_b + n_c]);
            r[total] = row[n_b + n_c];
            sys.eqs.push(r);
        }
        for row in &then.ineqs {
            let mut r = vec![0; total + 1];
            r[n_a..n_a + n_b + n_c].copy_from_slice(&row[..n_b + n_c]);
            r[total] = row[n_b + n_c];
            sys.ineqs.push(r);
        }
        sys.project_out(n_a, n_b);
        Some(BasicMap {
            space: Space::new(self.space.input, then.space.output),
            eqs: sys.eqs,
            ineqs: sys.ineqs,
        })
    }

    /// Shared-domain product: `self: T→A`, `other: T→B` gives `T→(A,B)`.
    pub fn product(&self, other: &BasicMap) -> Option<BasicMap> {
        if self.space.input != other.space.input {
            return None;
        }
        let n_t = self.space.n_in();
        let n_a = self.space.n_out();
        let n_b = other.space.n_out();
        let total = n_t + n_a + n_b;
        let mut eqs = Vec::new();
        let mut ineqs = Vec::new();
        let place_first = |row: &Row| -> Row {
            let mut r = vec![0; total + 1];
            r[..n_t + n_a].copy_from_slice(&row[..n_t + n_a]);
            r[total] = row[n_t + n_a];
            r
        };
        let place_second = |row: &Row| -> Row {
            let mut r = vec![0; total + 1];
            r[..n_t].copy_from_slice(&row[..n_t]);
            r[n_t + n_a..n_t + n_a + n_b].copy_from_slice(&row[n_t..n_t + n_b]);
            r[total] = row[n_t + n_b];
            r
        };
        eqs.extend(self.eqs.iter().map(place_first));
        ineqs.extend(self.ineqs.iter().map(place_first));
        eqs.extend(other.eqs.iter().map(place_second));
        ineqs.extend(other.ineqs.iter().map(place_second));
        Some(BasicMap {
            space: Space::new(
                self.space.input,
                Context::anonymous(n_a + n_b),
            ),
            eqs,
            ineqs,
        })
    }

    pub fn domain(&self) -> BasicSet {
        let mut sys = self.system();
        sys.project_out(self.space.n_in(), self.space.n_out());
        BasicSet {
            tuple: self.space.input,
            eqs: sys.eqs,
            ineqs: sys.ineqs,
        }
    }

    pub fn range(&self) -> BasicSet {
        self.inverse().domain()
    }

    /// The map's graph as a set over in-dims ∥ out-dims.
    pub fn wrapped(&self) -> BasicSet {
        BasicSet {
            tuple: Context::anonymous(self.space.n_in() + self.space.n_out()),
            eqs: self.eqs.clone(),
            ineqs: self.ineqs.clone(),
        }
    }

    /// Image of `set` through the map.
    pub fn apply(&self, set: &BasicSet) -> Option<BasicSet> {
        if set.tuple != self.space.input {
            return None;
        }
        let mut joined = self.clone();
        for row in &set.eqs {
            let mut r = joined.zero_row();
            r[..set.tuple.dims].copy_from_slice(&row[..set.tuple.dims]);
            let c = joined.col_const();
            r[c] = row[set.tuple.dims];
            joined.eqs.push(r);
        }
        for row in &set.ineqs {
            let mut r = joined.zero_row();
            r[..set.tuple.dims].copy_from_slice(&row[..set.tuple.dims]);
            let c = joined.col_const();
            r[c] = row[set.tuple.dims];
            joined.ineqs.push(r);
        }
        Some(joined.range())
    }

    pub fn intersect_domain(&self, set: &BasicSet) -> Option<BasicMap> {
        if set.tuple != self.space.input {
            return None;
        }
        let mut out = self.clone();
        for (rows, dst_eq) in [(&set.eqs, true), (&set.ineqs, false)] {
            for row in rows.iter() {
                let mut r = out.zero_row();
                r[..set.tuple.dims].copy_from_slice(&row[..set.tuple.dims]);
                let c = out.col_const();
                r[c] = row[set.tuple.dims];
                if dst_eq {
                    out.eqs.push(r);
                } else {
                    out.ineqs.push(r);
                }
            }
        }
        Some(out)
    }

    pub fn intersect_range(&self, set: &BasicSet) -> Option<BasicMap> {
        Some(self.inverse().intersect_domain(set)?.inverse())
    }

    /// Insert `count` fresh output dimensions at `at`.
    pub fn insert_out_dims(&mut self, at: usize, count: usize) {
        let pos = self.space.n_in() + at;
        for row in self.eqs.iter_mut().chain(self.ineqs.iter_mut()) {
            for _ in 0..count {
                row.insert(pos, 0);
            }
        }
        self.space.output.dims += count;
    }

    /// Substitute input dim `dim` with `dim + delta` (rebases the domain
    /// so the old coordinate `delta` becomes zero).
    pub fn translate_in(&mut self, dim: usize, delta: i64) {
        let last = self.col_const();
        for row in self.eqs.iter_mut().chain(self.ineqs.iter_mut()) {
            row[last] += row[dim] * delta;
        }
    }

    pub fn max_at(&self, objective: &[i64]) -> Bound {
        self.system().bound(objective, true)
    }

    pub fn min_at(&self, objective: &[i64]) -> Bound {
        self.system().bound(objective, false)
    }
}

#[derive(Debug, Clone)]
pub struct BasicSet {
    pub tuple: Tuple,
    pub eqs: Vec<Row>,
    pub ineqs: Vec<Row>,
}

impl BasicSet {
    pub fn universe(tuple: Tuple) -> Self {
        Self {
            tuple,
            eqs: Vec::new(),
            ineqs: Vec::new(),
        }
    }

    fn system(&self) -> System {
        System {
            nvars: self.tuple.dims,
            eqs: self.eqs.clone(),
            ineqs: self.ineqs.clone(),
            infeasible: false,
        }
    }

    pub fn add_eq(&mut self, terms: &[(usize, i64)], constant: i64) {
        let mut row = vec![0; self.tuple.dims + 1];
        for (col, c) in terms {
            row[*col] += c;
        }
        row[self.tuple.dims] += constant;
        self.eqs.push(row);
    }

    pub fn add_ineq(&mut self, terms: &[(usize, i64)], constant: i64) {
        let mut row = vec![0; self.tuple.dims + 1];
        for (col, c) in terms {
            row[*col] += c;
        }
        row[self.tuple.dims] += constant;
        self.ineqs.push(row);
    }

    pub fn is_empty(&self) -> bool {
        self.system().is_empty()
    }

    pub fn intersect(&self, other: &BasicSet) -> BasicSet {
        debug_assert_eq!(self.tuple, other.tuple);
        let mut out = self.clone();
        out.eqs.extend(other.eqs.iter().cloned());
        out.ineqs.extend(other.ineqs.iter().cloned());
        out
    }

    /// Extreme of an affine objective (`dims + 1` coefficients).
    pub fn max_at(&self, objective: &[i64]) -> Bound {
        self.system().bound(objective, true)
    }

    pub fn min_at(&self, objective: &[i64]) -> Bound {
        self.system().bound(objective, false)
    }

    /// Max of a single variable.
    pub fn max_var(&self, dim: usize) -> Bound {
        let mut obj = vec![0; self.tuple.dims + 1];
        obj[dim] = 1;
        self.max_at(&obj)
    }

    pub fn min_var(&self, dim: usize) -> Bound {
        let mut obj = vec![0; self.tuple.dims + 1];
        obj[dim] = 1;
        self.min_at(&obj)
    }
}

// ── Unions ──

#[derive(Debug, Clone)]
pub struct Map {
    pub space: Space,
    pub basics: Vec<BasicMap>,
}

impl Map {
    pub fn from_basic(basic: BasicMap) -> Self {
        Self {
            space: basic.space,
            basics: vec![basic],
        }
    }

    pub fn is_empty(&self) -> bool {
        self.basics.iter().all(|b| b.is_empty())
    }

    pub fn inverse(&self) -> Map {
        Map {
            space: self.space.reversed(),
            basics: self.basics.iter().map(|b| b.inverse()).collect(),
        }
    }

    pub fn intersect(&self, other: &Map) -> Map {
        let mut basics = Vec::new();
        for a in &self.basics {
            for b in &other.basics {
                let m = a.intersect(b);
                if !m.is_empty() {
                    basics.push(m);
                }
            }
        }
        Map {
            space: self.space,
            basics,
        }
    }

    pub fn join(&self, then: &Map) -> Option<Map> {
        if self.space.output != then.space.input {
            return None;
        }
        let mut basics = Vec::new();
        for a in &self.basics {
            for b in &then.basics {
                if let Some(m) = a.join(b) {
                    if !m.is_empty() {
                        basics.push(m);
                    }
                }
            }
        }
        Some(Map {
            space: Space::new(self.space.input, then.space.output),
            basics,
        })
    }

    pub fn product(&self, other: &Map) -> Option<Map> {
        let mut basics = Vec::new();
        for a in &self.basics {
            for b in &other.basics {
                if let Some(m) = a.product(b) {
                    if !m.is_empty() {
                        basics.push(m);
                    }
                }
            }
        }
        let space = Space::new(
            self.space.input,
            Context::anonymous(self.space.n_out() + other.space.n_out()),
        );
        Some(Map { space, basics })
    }

    pub fn domain(&self) -> Set {
        Set {
            tuple: self.space.input,
            basics: self
                .basics
                .iter()
                .map(|b| b.domain())
                .filter(|s| !s.is_empty())
                .collect(),
        }
    }

    pub fn range(&self) -> Set {
        self.inverse().domain()
    }

    pub fn wrapped(&self) -> Set {
        Set {
            tuple: Context::anonymous(self.space.n_in() + self.space.n_out()),
            basics: self.basics.iter().map(|b| b.wrapped()).collect(),
        }
    }

    pub fn intersect_range(&self, set: &Set) -> Map {
        let mut basics = Vec::new();
        for b in &self.basics {
            for s in &set.basics {
                if let Some(m) = b.intersect_range(s) {
                    if !m.is_empty() {
                        basics.push(m);
                    }
                }
            }
        }
        Map {
            space: self.space,
            basics,
        }
    }

    pub fn intersect_domain(&self, set: &Set) -> Map {
        let mut basics = Vec::new();
        for b in &self.basics {
            for s in &set.basics {
                if let Some(m) = b.intersect_domain(s) {
                    if !m.is_empty() {
                        basics.push(m);
                    }
                }
            }
        }
        Map {
            space: self.space,
            basics,
        }
    }

}

#[derive(Debug, Clone)]
pub struct Set {
    pub tuple: Tuple,
    pub basics: Vec<BasicSet>,
}

impl Set {
    pub fn from_basic(basic: BasicSet) -> Self {
        Self {
            tuple: basic.tuple,
            basics: vec![basic],
        }
    }

    pub fn universe(tuple: Tuple) -> Self {
        Self::from_basic(BasicSet::universe(tuple))
    }

    pub fn is_empty(&self) -> bool {
        self.basics.iter().all(|b| b.is_empty())
    }

    pub fn intersect(&self, other: &Set) -> Set {
        let mut basics = Vec::new();
        for a in &self.basics {
            for b in &other.basics {
                let s = a.intersect(b);
                if !s.is_empty() {
                    basics.push(s);
                }
            }
        }
        Set {
            tuple: self.tuple,
            basics,
        }
    }

    pub fn max_var(&self, dim: usize) -> Bound {
        let mut best = Bound::Empty;
        for b in &self.basics {
            match b.max_var(dim) {
                Bound::Empty => {}
                Bound::Unbounded => return Bound::Unbounded,
                Bound::Value(v) => {
                    best = match best {
                        Bound::Empty => Bound::Value(v),
                        Bound::Value(cur) => Bound::Value(cur.max(v)),
                        Bound::Unbounded => Bound::Unbounded,
                    }
                }
            }
        }
        best
    }

    pub fn min_var(&self, dim: usize) -> Bound {
        let mut best = Bound::Empty;
        for b in &self.basics {
            match b.min_var(dim) {
                Bound::Empty => {}
                Bound::Unbounded => return Bound::Unbounded,
                Bound::Value(v) => {
                    best = match best {
                        Bound::Empty => Bound::Value(v),
                        Bound::Value(cur) => Bound::Value(cur.min(v)),
                        Bound::Unbounded => Bound::Unbounded,
                    }
                }
            }
        }
        best
    }

    pub fn max_at(&self, objective: &[i64]) -> Bound {
        let mut best = Bound::Empty;
        for b in &self.basics {
            match b.max_at(objective) {
                Bound::Empty => {}
                Bound::Unbounded => return Bound::Unbounded,
                Bound::Value(v) => {
                    best = match best {
                        Bound::Empty => Bound::Value(v),
                        Bound::Value(cur) => Bound::Value(cur.max(v)),
                        Bound::Unbounded => Bound::Unbounded,
                    }
                }
            }
        }
        best
    }
}

#[derive(Debug, Clone, Default)]
pub struct UnionMap {
    pub maps: Vec<Map>,
}

impl UnionMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.maps.iter().all(|m| m.is_empty())
    }

    pub fn add(&mut self, map: Map) {
        if let Some(existing) = self.maps.iter_mut().find(|m| m.space == map.space) {
            existing.basics.extend(map.basics);
        } else {
            self.maps.push(map);
        }
    }

    pub fn add_basic(&mut self, basic: BasicMap) {
        self.add(Map::from_basic(basic));
    }

    pub fn union(&self, other: &UnionMap) -> UnionMap {
        let mut out = self.clone();
        for m in &other.maps {
            out.add(m.clone());
        }
        out
    }

    pub fn inverse(&self) -> UnionMap {
        let mut out = UnionMap::new();
        for m in &self.maps {
            out.add(m.inverse());
        }
        out
    }

    /// `{ x → z : ∃y, self(x,y) ∧ then(y,z) }` across all space pairs.
    pub fn join(&self, then: &UnionMap) -> UnionMap {
        let mut out = UnionMap::new();
        for a in &self.maps {
            for b in &then.maps {
                if let Some(m) = a.join(b) {
                    if !m.basics.is_empty() {
                        out.add(m);
                    }
                }
            }
        }
        out
    }

    /// Replace each map's domain through `relation` (original
    /// `map_domain_through`): `self: A→B`, `relation: A→C` gives `C→B`.
    pub fn map_domain_through(&self, relation: &UnionMap) -> UnionMap {
        relation.inverse().join(self)
    }

    /// Replace each map's range through `relation`.
    pub fn map_range_through(&self, relation: &UnionMap) -> UnionMap {
        self.join(relation)
    }

    pub fn apply(&self, sets: &UnionSet) -> UnionSet {
        let mut out = UnionSet::new();
        for m in &self.maps {
            for s in &sets.sets {
                if s.tuple != m.space.input {
                    continue;
                }
                for bm in &m.basics {
                    for bs in &s.basics {
                        if let Some(img) = bm.apply(bs) {
                            if !img.is_empty() {
                                out.add(Set::from_basic(img));
                            }
                        }
                    }
                }
            }
        }
        out
    }

    pub fn in_domain(&self, sets: &UnionSet) -> UnionMap {
        let mut out = UnionMap::new();
        for m in &self.maps {
            for s in &sets.sets {
                if s.tuple == m.space.input {
                    let r = m.intersect_domain(s);
                    if !r.basics.is_empty() {
                        out.add(r);
                    }
                }
            }
        }
        out
    }

    pub fn in_range(&self, sets: &UnionSet) -> UnionMap {
        let mut out = UnionMap::new();
        for m in &self.maps {
            for s in &sets.sets {
                if s.tuple == m.space.output {
                    let r = m.intersect_range(s);
                    if !r.basics.is_empty() {
                        out.add(r);
                    }
                }
            }
        }
        out
    }

    pub fn domain(&self) -> UnionSet {
        let mut out = UnionSet::new();
        for m in &self.maps {
            let d = m.domain();
            if !d.basics.is_empty() {
                out.add(d);
            }
        }
        out
    }

    pub fn range(&self) -> UnionSet {
        self.inverse().domain()
    }

    /// All basics whose domain tuple is `tuple`, merged into one map.
    pub fn map_with_domain(&self, tuple: Tuple) -> Option<Map> {
        let maps: Vec<&Map> = self
            .maps
            .iter()
            .filter(|m| m.space.input == tuple)
            .collect();
        let first = maps.first()?;
        let mut merged = Map {
            space: first.space,
            basics: Vec::new(),
        };
        for m in maps {
            merged.basics.extend(m.basics.iter().cloned());
        }
        Some(merged)
    }
}

#[derive(Debug, Clone, Default)]
pub struct UnionSet {
    pub sets: Vec<Set>,
}

impl UnionSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.sets.iter().all(|s| s.is_empty())
    }

    pub fn add(&mut self, set: Set) {
        if let Some(existing) = self.sets.iter_mut().find(|s| s.tuple == set.tuple) {
            existing.basics.extend(set.basics);
        } else {
            self.sets.push(set);
        }
    }

    pub fn union(&self, other: &UnionSet) -> UnionSet {
        let mut out = self.clone();
        for s in &other.sets {
            out.add(s.clone());
        }
        out
    }

    pub fn set_for(&self, tuple: Tuple) -> Option<&Set> {
        self.sets.iter().find(|s| s.tuple == tuple)
    }
}

/// Project the given columns out of a raw constraint system (total row
/// width `cols`, last column the constant). Columns are removed and the
/// remaining ones keep their relative order.
pub fn project_columns(eqs: &mut Vec<Row>, ineqs: &mut Vec<Row>, cols: usize, remove: &[usize]) {
    let mut sys = System {
        nvars: cols - 1,
        eqs: std::mem::take(eqs),
        ineqs: std::mem::take(ineqs),
        infeasible: false,
    };
    for &col in remove {
        sys.eliminate(col);
        if sys.infeasible {
            break;
        }
    }
    let keep = |row: &Row| -> Row {
        row.iter()
            .enumerate()
            .filter(|(i, _)| *i + 1 == cols || !remove.contains(i))
            .map(|(_, v)| *v)
            .collect()
    };
    *eqs = sys.eqs.iter().map(keep).collect();
    *ineqs = sys.ineqs.iter().map(keep).collect();
    if sys.infeasible {
        // Mark infeasibility with a contradictory constant row.
        let width = cols - remove.len();
        let mut row = vec![0; width];
        row[width - 1] = -1;
        ineqs.push(row);
    }
}

/// Lexicographic order over one tuple space: the map
/// `{ t → t' : t' R t }` where R is `≤`/`<`/`≥`/`>` chosen by the flags.
pub fn lex_order_map(tuple: Tuple, strict: bool, greater: bool) -> Map {
    let space = Space::new(tuple, tuple);
    let n = tuple.dims;
    let mut basics = Vec::new();
    for level in 0..n {
        let mut bm = BasicMap::universe(space);
        for i in 0..level {
            // out_i = in_i
            bm.add_eq(&[(bm.col_out(i), 1), (bm.col_in(i), -1)], 0);
        }
        // strict comparison at `level`
        if greater {
            // out_level ≥ in_level + 1
            bm.add_ineq(&[(bm.col_out(level), 1), (bm.col_in(level), -1)], -1);
        } else {
            // out_level ≤ in_level − 1
            bm.add_ineq(&[(bm.col_in(level), 1), (bm.col_out(level), -1)], -1);
        }
        basics.push(bm);
    }
    if !strict {
        let mut bm = BasicMap::universe(space);
        for i in 0..n {
            bm.add_eq(&[(bm.col_out(i), 1), (bm.col_in(i), -1)], 0);
        }
        basics.push(bm);
    }
    Map { space, basics }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> Context {
        Context::new()
    }

    #[test]
    fn test_context_interning() {
        let mut c = ctx();
        let a = c.tuple("fir", 1);
        let b = c.tuple("decim", 2);
        assert_eq!(c.tuple("fir", 1), a);
        assert_ne!(a.name, b.name);
        assert_eq!(c.name_of(b), "decim");
        assert_eq!(c.find("fir"), a.name);
        assert_eq!(c.find("iir"), None);
    }

    #[test]
    fn test_project_box() {
        // { (i,j) : 0 ≤ i < 4, i ≤ j < 8 } projected to j
        let t = Context::anonymous(2);
        let mut s = BasicSet::universe(t);
        s.add_ineq(&[(0, 1)], 0);
        s.add_ineq(&[(0, -1)], 3);
        s.add_ineq(&[(1, 1), (0, -1)], 0);
        s.add_ineq(&[(1, -1)], 7);
        assert_eq!(s.max_var(1), Bound::Value(7));
        assert_eq!(s.min_var(1), Bound::Value(0));
        assert_eq!(s.max_var(0), Bound::Value(3));
    }

    #[test]
    fn test_emptiness() {
        let t = Context::anonymous(1);
        let mut s = BasicSet::universe(t);
        s.add_ineq(&[(0, 1)], 0); // x ≥ 0
        s.add_ineq(&[(0, -1)], -1); // x ≤ -1
        assert!(s.is_empty());

        let mut s2 = BasicSet::universe(t);
        s2.add_eq(&[(0, 2)], -1); // 2x = 1, no integer solution
        assert!(s2.is_empty());
    }

    #[test]
    fn test_join_affine() {
        let mut c = ctx();
        let a = c.tuple("a", 1);
        let b = c.tuple("b", 1);
        let d = c.tuple("d", 1);
        // f: a → b, b = 2a + 1
        let mut f = BasicMap::universe(Space::new(a, b));
        f.add_eq(&[(f.col_out(0), -1), (f.col_in(0), 2)], 1);
        // g: b → d, d = b + 3
        let mut g = BasicMap::universe(Space::new(b, d));
        g.add_eq(&[(g.col_out(0), -1), (g.col_in(0), 1)], 3);
        let fg = f.join(&g).unwrap();
        // d = 2a + 4; at a = 5 → d = 14
        let mut probe = fg.clone();
        probe.add_eq(&[(probe.col_in(0), 1)], -5);
        let img = probe.range();
        assert_eq!(img.max_var(0), Bound::Value(14));
        assert_eq!(img.min_var(0), Bound::Value(14));
    }

    #[test]
    fn test_inverse_and_domain() {
        let mut c = ctx();
        let a = c.tuple("a", 1);
        let b = c.tuple("b", 1);
        let mut f = BasicMap::universe(Space::new(a, b));
        f.add_eq(&[(f.col_out(0), -1), (f.col_in(0), 1)], 2);
        f.add_ineq(&[(f.col_in(0), 1)], 0);
        f.add_ineq(&[(f.col_in(0), -1)], 9);
        let dom = f.domain();
        assert_eq!(dom.max_var(0), Bound::Value(9));
        let rng = f.range();
        assert_eq!(rng.min_var(0), Bound::Value(2));
        assert_eq!(rng.max_var(0), Bound::Value(11));
        let inv = f.inverse();
        assert_eq!(inv.domain().max_var(0), Bound::Value(11));
    }

    #[test]
    fn test_stride_projection_bounds() {
        // schedule t = 2i + 1, 0 ≤ i ≤ 4: range of t
        let mut c = ctx();
        let s = c.tuple("s", 1);
        let t = Context::anonymous(1);
        let mut m = BasicMap::universe(Space::new(s, t));
        m.add_eq(&[(m.col_out(0), -1), (m.col_in(0), 2)], 1);
        m.add_ineq(&[(m.col_in(0), 1)], 0);
        m.add_ineq(&[(m.col_in(0), -1)], 4);
        let rng = m.range();
        assert_eq!(rng.min_var(0), Bound::Value(1));
        assert_eq!(rng.max_var(0), Bound::Value(9));
    }

    #[test]
    fn test_lex_order() {
        let t = Context::anonymous(2);
        let later = lex_order_map(t, true, true);
        // from (1, 5): points (1, 6) and (2, 0) are later, (1, 5) and (0, 9) are not
        let contains = |m: &Map, from: [i64; 2], to: [i64; 2]| -> bool {
            m.basics.iter().any(|bm| {
                let mut probe = bm.clone();
                probe.add_eq(&[(probe.col_in(0), 1)], -from[0]);
                probe.add_eq(&[(probe.col_in(1), 1)], -from[1]);
                probe.add_eq(&[(probe.col_out(0), 1)], -to[0]);
                probe.add_eq(&[(probe.col_out(1), 1)], -to[1]);
                !probe.is_empty()
            })
        };
        assert!(contains(&later, [1, 5], [1, 6]));
        assert!(contains(&later, [1, 5], [2, 0]));
        assert!(!contains(&later, [1, 5], [1, 5]));
        assert!(!contains(&later, [1, 5], [0, 9]));
        let not_later = lex_order_map(t, false, false);
        assert!(contains(&not_later, [1, 5], [1, 5]));
        assert!(contains(&not_later, [1, 5], [0, 9]));
        assert!(!contains(&not_later, [1, 5], [1, 6]));
    }

    #[test]
    fn test_unbounded_max() {
        let t = Context::anonymous(1);
        let mut s = BasicSet::universe(t);
        s.add_ineq(&[(0, 1)], 0); // x ≥ 0
        assert_eq!(s.max_var(0), Bound::Unbounded);
        assert_eq!(s.min_var(0), Bound::Value(0));
    }
}
