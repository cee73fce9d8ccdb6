//! The embedding surface: one `Solver` owning the SAT core, the theory
//! registry and all theories, the external variable map, the optimization
//! objectives and the replay transcript.
//!
//! Construction calls validate their arguments, record themselves in the
//! transcript, and return solver literals. Solve calls run through the
//! preprocessor, the pending pseudo-Boolean conversions and the
//! lexicographic optimizer under the process-wide resource guard.

use crate::amo::AmoTheory;
use crate::bv::{BvTheory, CmpOp};
use crate::callbacks::Callbacks;
use crate::clause::{lbool, Lit, Var};
use crate::core::SolverOpts;
use crate::errors::{check_name, Error, Result};
use crate::fsm::FsmTheory;
use crate::graph::{AtomKind, EdgeWeight, GraphTheory};
use crate::limits;
use crate::optimize::{self, Objective};
use crate::options::GraphOptions;
use crate::pb::{Ineq, PbSolver};
use crate::router::FlowRouter;
use crate::simp::SimpSolver;
use crate::theory::TheoryRegistry;
use crate::transcript::{self, Transcript};
use crate::varmap::VarMap;
use fnv::FnvHashMap;
use std::io::BufRead;

/// Callbacks wired to the process-wide resource guard: the signal hook's
/// flag is polled between conflicts.
pub struct ApiCallbacks;

impl Callbacks for ApiCallbacks {
    fn stop(&self) -> bool {
        limits::interrupt_fired()
    }
}

impl Default for ApiCallbacks {
    fn default() -> Self {
        ApiCallbacks
    }
}

macro_rules! wout {
    ($self:ident, $($arg:tt)*) => {
        $self.transcript.emit(format_args!($($arg)*))?
    };
}

pub struct Solver {
    sat: SimpSolver<ApiCallbacks>,
    th: TheoryRegistry,
    vars: VarMap,
    graph_opts: GraphOptions,
    pb: PbSolver,
    bv_tid: Option<usize>,
    fsm_tid: Option<usize>,
    graphs: Vec<usize>,
    graph_names: FnvHashMap<String, usize>,
    routers: Vec<usize>,
    objectives: Vec<Objective>,
    transcript: Transcript,
    const_true: Option<Lit>,
    last_result: lbool,
    last_solution_optimal: bool,
    has_conflict: bool,
    guard_token: Option<u64>,
}

impl Solver {
    pub fn new() -> Self {
        Self::with_opts(SolverOpts::default(), GraphOptions::default())
    }

    pub fn with_opts(opts: SolverOpts, graph_opts: GraphOptions) -> Self {
        let sat = SimpSolver::new(opts, ApiCallbacks);
        let guard_token = Some(limits::register_solver(sat.interrupt_flag()));
        Self {
            sat,
            th: TheoryRegistry::new(),
            vars: VarMap::new(),
            graph_opts,
            pb: PbSolver::new(),
            bv_tid: None,
            fsm_tid: None,
            graphs: vec![],
            graph_names: FnvHashMap::default(),
            routers: vec![],
            objectives: vec![],
            transcript: Transcript::new(),
            const_true: None,
            last_result: lbool::UNDEF,
            last_solution_optimal: false,
            has_conflict: false,
            guard_token,
        }
    }

    pub fn version() -> &'static str {
        concat!("monosat-", env!("CARGO_PKG_VERSION"))
    }

    /// `false` once the solver is in a permanently UNSAT state.
    pub fn ok(&self) -> bool {
        self.sat.is_ok()
    }

    /// Number of externally visible variables.
    pub fn n_vars(&self) -> usize {
        self.vars.n_external()
    }

    pub fn n_clauses(&self) -> u64 {
        self.sat.num_clauses()
    }

    /// Cancel all decisions, back to level 0.
    pub fn backtrack(&mut self) {
        let Self { sat, th, .. } = self;
        sat.cancel_until_th(th, 0);
    }

    /// Select one graph-algorithm option family; applies to graphs created
    /// afterwards.
    pub fn set_graph_option(&mut self, family: &str, value: &str) -> Result<()> {
        self.graph_opts.set(family, value)
    }

    pub fn print_stats(&self) {
        self.sat.print_stats();
    }

    // ---------- variables, literals, clauses ----------

    fn check_lit(&mut self, l: Lit) -> Result<()> {
        if l.var().idx() >= self.sat.num_vars() {
            return Err(Error::state(format!(
                "literal {:?} references an unallocated variable",
                l
            )));
        }
        self.vars.expose(l.var());
        Ok(())
    }

    pub fn new_var(&mut self) -> Var {
        let v = self.sat.new_var_default();
        self.vars.expose(v);
        v
    }

    /// Create a variable with a unique, printable-ASCII name; an empty name
    /// creates a plain variable.
    pub fn new_named_var(&mut self, name: &str) -> Result<Var> {
        if !name.is_empty() {
            check_name(name)?;
            if self.vars.var_by_name(name).is_some() {
                return Err(Error::domain(format!(
                    "all variable names must be unique; duplicate name: {}",
                    name
                )));
            }
        }
        let v = self.new_var();
        self.set_variable_name(v, name)?;
        Ok(v)
    }

    pub fn set_variable_name(&mut self, v: Var, name: &str) -> Result<()> {
        if name.is_empty() {
            return Ok(());
        }
        self.vars.expose(v);
        self.vars.set_name(v, name)?;
        // a named variable must survive preprocessing
        self.sat.set_frozen(v, true);
        let d = self.vars.dimacs(Lit::new(v, true));
        wout!(self, "symbol {} {}", d, name);
        Ok(())
    }

    pub fn variable_has_name(&self, v: Var) -> bool {
        self.vars.has_name(v)
    }

    pub fn has_variable_with_name(&self, name: &str) -> bool {
        self.vars.var_by_name(name).is_some()
    }

    pub fn variable_name(&self, v: Var) -> &str {
        self.vars.name(v)
    }

    pub fn variable_by_name(&self, name: &str) -> Option<Var> {
        self.vars.var_by_name(name)
    }

    pub fn n_named_variables(&self) -> usize {
        self.vars.n_named()
    }

    pub fn named_variable_n(&self, n: usize) -> Option<Var> {
        self.vars.named_at(n)
    }

    /// A literal that is true in every model, allocated (and pinned at level
    /// 0) on first use.
    pub fn true_lit(&mut self) -> Result<Lit> {
        if let Some(l) = self.const_true {
            return Ok(l);
        }
        let v = self.new_var();
        self.sat.set_frozen(v, true);
        let l = Lit::new(v, true);
        self.sat.add_clause_reuse(&mut vec![l]);
        self.const_true = Some(l);
        let d = self.vars.dimacs(l);
        wout!(self, "{} 0", d);
        Ok(l)
    }

    fn false_lit(&mut self) -> Result<Lit> {
        Ok(!self.true_lit()?)
    }

    /// Protect a literal's variable against elimination by the
    /// preprocessor. Returns `false` (with a warning) if the variable was
    /// already eliminated; that is not fatal.
    pub fn freeze_lit(&mut self, l: Lit) -> bool {
        if self.sat.is_eliminated(l.var()) {
            warn!(
                "literal {:?} has already been eliminated by the pre-processor",
                l
            );
            false
        } else {
            self.sat.set_frozen(l.var(), true);
            true
        }
    }

    /// Fix `l` true at level 0, releasing the variable from further search.
    pub fn release_lit(&mut self, l: Lit) -> Result<()> {
        self.check_lit(l)?;
        let d = self.vars.dimacs(l);
        wout!(self, "{} 0", d);
        self.sat.add_clause_reuse(&mut vec![l]);
        Ok(())
    }

    pub fn disable_preprocessing(&mut self) {
        self.sat.disable_preprocessing();
    }

    pub fn set_decision_var(&mut self, v: Var, decidable: bool) -> Result<()> {
        if self.sat.is_decision_var(v) != decidable {
            self.vars.expose(v);
            let d = self.vars.dimacs(Lit::new(v, true));
            wout!(self, "decision {} {}", d, decidable as i32);
            self.sat.set_decision_var(v, decidable);
        }
        Ok(())
    }

    pub fn is_decision_var(&self, v: Var) -> bool {
        self.sat.is_decision_var(v)
    }

    pub fn set_decision_priority(&mut self, v: Var, priority: i32) -> Result<()> {
        if self.sat.priority(v) != priority {
            self.vars.expose(v);
            let d = self.vars.dimacs(Lit::new(v, true));
            wout!(self, "priority {} {}", d, priority);
            self.sat.set_priority(v, priority);
        }
        Ok(())
    }

    pub fn decision_priority(&self, v: Var) -> i32 {
        self.sat.priority(v)
    }

    pub fn set_decision_polarity(&mut self, v: Var, b: bool) {
        self.sat.set_polarity(v, lbool::new(b));
    }

    pub fn decision_polarity(&self, v: Var) -> bool {
        self.sat.polarity(v) == lbool::TRUE
    }

    pub fn add_clause(&mut self, lits: &[Lit]) -> Result<bool> {
        for &l in lits {
            self.check_lit(l)?;
        }
        if self.transcript.is_active() {
            let mut line = String::new();
            for &l in lits {
                line.push_str(&format!("{} ", self.vars.dimacs(l)));
            }
            line.push('0');
            wout!(self, "{}", line);
        }
        let mut c = lits.to_vec();
        Ok(self.sat.add_clause_reuse(&mut c))
    }

    pub fn add_unit_clause(&mut self, l: Lit) -> Result<bool> {
        self.add_clause(&[l])
    }

    pub fn add_binary_clause(&mut self, a: Lit, b: Lit) -> Result<bool> {
        self.add_clause(&[a, b])
    }

    pub fn add_tertiary_clause(&mut self, a: Lit, b: Lit, c: Lit) -> Result<bool> {
        self.add_clause(&[a, b, c])
    }

    // ---------- external numbering ----------

    /// DIMACS rendering (external var + 1, negative = negated).
    pub fn dimacs_lit(&self, l: Lit) -> i32 {
        self.vars.dimacs(l)
    }

    /// The internal literal for a DIMACS integer over the external
    /// numbering, allocating any not-yet-seen external variables.
    pub fn lit_of_dimacs(&mut self, d: i32) -> Result<Lit> {
        if d == 0 {
            return Err(Error::domain("literal 0 is not valid".to_string()));
        }
        let e = (d.abs() - 1) as usize;
        while self.vars.n_external() <= e {
            self.new_var();
        }
        self.vars.from_dimacs(d)
    }

    pub fn external_lit(&self, l: Lit) -> Option<Lit> {
        self.vars.external_lit(l)
    }

    pub fn internal_lit(&self, ext: Lit) -> Result<Lit> {
        self.vars.internal_lit(ext)
    }

    // ---------- at-most-one and pseudo-Boolean ----------

    /// Assert that at most one of `vars` is true, enforced by a dedicated
    /// theory propagator. Sets of size 0 or 1 need no constraint.
    pub fn at_most_one(&mut self, vars: &[Var]) -> Result<()> {
        if vars.len() <= 1 {
            return Ok(());
        }
        for &v in vars {
            self.check_lit(Lit::new(v, true))?;
        }
        if self.transcript.is_active() {
            let mut line = String::from("amo");
            for &v in vars {
                line.push_str(&format!(" {}", self.vars.dimacs(Lit::new(v, true))));
            }
            line.push_str(" 0");
            wout!(self, "{}", line);
        }
        let tid = self.th.len();
        let mut amo = AmoTheory::new(tid);
        for &v in vars {
            self.sat.set_frozen(v, true);
            let free = self.th.owner(v).is_none();
            amo.add_var(v, free);
        }
        self.th.add_theory(Box::new(amo));
        for &v in vars {
            if self.th.owner(v).is_none() {
                self.th.set_owner(v, tid);
            }
        }
        Ok(())
    }

    /// Buffer a pseudo-Boolean constraint; converted to CNF at the next
    /// flush or solve.
    pub fn assert_pb(&mut self, rhs: i64, lits: &[Lit], coefs: &[i64], ineq: Ineq) -> Result<()> {
        if lits.is_empty() {
            return Ok(());
        }
        for &l in lits {
            self.check_lit(l)?;
        }
        let mut coefs: Vec<i64> = coefs.iter().take(lits.len()).copied().collect();
        while coefs.len() < lits.len() {
            coefs.push(1);
        }
        if self.transcript.is_active() {
            let mut line = format!("pb {} {} {}", ineq.as_str(), rhs, lits.len());
            for &l in lits {
                line.push_str(&format!(" {}", self.vars.dimacs(l)));
            }
            line.push_str(&format!(" {}", coefs.len()));
            for &c in &coefs {
                line.push_str(&format!(" {}", c));
            }
            wout!(self, "{}", line);
        }
        self.pb.add_constr(lits.to_vec(), coefs, rhs, ineq);
        Ok(())
    }

    /// Convert the buffered pseudo-Boolean constraints now.
    pub fn flush_pb(&mut self) -> Result<()> {
        let Self { sat, pb, .. } = self;
        pb.convert(sat);
        Ok(())
    }

    // ---------- bitvector theory ----------

    /// Create the bitvector theory (idempotent); attaches its bound store
    /// to every graph.
    pub fn init_bv_theory(&mut self) {
        if self.bv_tid.is_some() {
            return;
        }
        let tid = self.th.len();
        let bv = BvTheory::new(tid);
        let store = bv.bounds();
        self.th.add_theory(Box::new(bv));
        self.bv_tid = Some(tid);
        for &gtid in &self.graphs {
            self.th
                .theory_mut::<GraphTheory>(gtid)
                .unwrap()
                .set_bv_bounds(store.clone());
        }
    }

    pub fn has_bv_theory(&self) -> bool {
        self.bv_tid.is_some()
    }

    fn bv_tid(&self) -> Result<usize> {
        self.bv_tid
            .ok_or_else(|| Error::state("no bitvector theory created (call init_bv_theory())".to_string()))
    }

    fn bv_ref(&self) -> Result<&BvTheory> {
        Ok(self.th.theory_ref::<BvTheory>(self.bv_tid()?).unwrap())
    }

    pub fn n_bitvectors(&self) -> Result<usize> {
        Ok(self.bv_ref()?.n_bitvectors())
    }

    pub fn new_bv_anon(&mut self, width: u32) -> Result<usize> {
        let tid = self.bv_tid()?;
        let id = self
            .th
            .theory_mut::<BvTheory>(tid)
            .unwrap()
            .new_bitvector_anon(width)?;
        wout!(self, "bv anon {} {}", id, width);
        Ok(id)
    }

    pub fn new_bv_const(&mut self, width: u32, val: u64) -> Result<usize> {
        let tid = self.bv_tid()?;
        let id = self
            .th
            .theory_mut::<BvTheory>(tid)
            .unwrap()
            .new_bitvector_const(width, val)?;
        wout!(self, "bv const {} {} {}", id, width, val);
        Ok(id)
    }

    /// A bitvector over explicit bit variables, LSB first.
    pub fn new_bv(&mut self, bits: &[Var]) -> Result<usize> {
        let tid = self.bv_tid()?;
        let mut bit_lits = vec![];
        for &v in bits {
            self.check_lit(Lit::new(v, true))?;
            self.sat.set_frozen(v, true);
            bit_lits.push(Lit::new(v, true));
        }
        let id = self
            .th
            .theory_mut::<BvTheory>(tid)
            .unwrap()
            .new_bitvector_bits(bit_lits.clone())?;
        if self.transcript.is_active() {
            let mut line = format!("bv {} {}", id, bits.len());
            for &l in &bit_lits {
                line.push_str(&format!(" {}", self.vars.dimacs(l)));
            }
            wout!(self, "{}", line);
        }
        Ok(id)
    }

    pub fn set_bv_name(&mut self, id: usize, name: &str) -> Result<()> {
        if name.is_empty() {
            return Ok(());
        }
        let tid = self.bv_tid()?;
        self.th
            .theory_mut::<BvTheory>(tid)
            .unwrap()
            .set_name(id, name)?;
        wout!(self, "bv symbol {} {}", id, name);
        Ok(())
    }

    pub fn bv_has_name(&self, id: usize) -> Result<bool> {
        Ok(self.bv_ref()?.has_name(id))
    }

    pub fn has_bv_with_name(&self, name: &str) -> Result<bool> {
        Ok(self.bv_ref()?.bv_by_name(name).is_some())
    }

    pub fn bv_name(&self, id: usize) -> Result<String> {
        Ok(self.bv_ref()?.name(id).to_string())
    }

    pub fn bv_by_name(&self, name: &str) -> Result<Option<usize>> {
        Ok(self.bv_ref()?.bv_by_name(name))
    }

    pub fn n_named_bvs(&self) -> Result<usize> {
        Ok(self.bv_ref()?.n_named())
    }

    pub fn named_bv_n(&self, n: usize) -> Result<Option<usize>> {
        Ok(self.bv_ref()?.named_at(n))
    }

    pub fn bv_width(&self, id: usize) -> Result<u32> {
        self.bv_ref()?.width(id)
    }

    /// Number of defined bit literals; may be the width, or exactly 0.
    pub fn bv_n_bits(&self, id: usize) -> Result<usize> {
        Ok(self.bv_ref()?.bits(id)?.len())
    }

    pub fn bv_bit(&self, id: usize, n: usize) -> Result<Lit> {
        self.bv_ref()?.bit(id, n)
    }

    pub fn bv_comparison_const(&mut self, op: CmpOp, id: usize, c: u64) -> Result<Lit> {
        self.bv_comparison_const_with_var(op, id, c, None)
    }

    pub(crate) fn bv_comparison_const_with_var(
        &mut self,
        op: CmpOp,
        id: usize,
        c: u64,
        var: Option<Var>,
    ) -> Result<Lit> {
        let tid = self.bv_tid()?;
        let Self { sat, th, .. } = self;
        let bv = th.theory_mut::<BvTheory>(tid).unwrap();
        let lit = bv.new_comparison_const(sat, op, id, c, var)?;
        th.set_owner(lit.var(), tid);
        self.vars.expose(lit.var());
        let d = self.vars.dimacs(lit);
        let ops = match op {
            CmpOp::Lt => "<",
            CmpOp::Leq => "<=",
            CmpOp::Gt => ">",
            CmpOp::Geq => ">=",
        };
        wout!(self, "bv const {} {} {} {}", ops, d, id, c);
        Ok(lit)
    }

    pub fn bv_comparison_bv(&mut self, op: CmpOp, id: usize, other: usize) -> Result<Lit> {
        self.bv_comparison_bv_with_var(op, id, other, None)
    }

    pub(crate) fn bv_comparison_bv_with_var(
        &mut self,
        op: CmpOp,
        id: usize,
        other: usize,
        var: Option<Var>,
    ) -> Result<Lit> {
        let tid = self.bv_tid()?;
        let Self { sat, th, .. } = self;
        let bv = th.theory_mut::<BvTheory>(tid).unwrap();
        let lit = bv.new_comparison_bv(sat, op, id, other, var)?;
        th.set_owner(lit.var(), tid);
        self.vars.expose(lit.var());
        let d = self.vars.dimacs(lit);
        let ops = match op {
            CmpOp::Lt => "<",
            CmpOp::Leq => "<=",
            CmpOp::Gt => ">",
            CmpOp::Geq => ">=",
        };
        wout!(self, "bv {} {} {} {}", ops, d, id, other);
        Ok(lit)
    }

    /// Equality against a constant, encoded as `geq and not gt` through a
    /// fresh reified variable.
    pub fn bv_eq_const(&mut self, id: usize, c: u64) -> Result<Lit> {
        let a = self.bv_comparison_const(CmpOp::Geq, id, c)?;
        let b = self.bv_comparison_const(CmpOp::Gt, id, c)?;
        self.reify_eq(a, b, None)
    }

    /// Equality between two bitvectors, with redundant bit-level
    /// equivalences when both sides have defined bits.
    pub fn bv_eq_bv(&mut self, id: usize, other: usize) -> Result<Lit> {
        let a = self.bv_comparison_bv(CmpOp::Geq, id, other)?;
        let b = self.bv_comparison_bv(CmpOp::Gt, id, other)?;
        let c = self.reify_eq(a, b, None)?;
        let (bits1, bits2) = {
            let bv = self.bv_ref()?;
            (bv.bits(id)?.to_vec(), bv.bits(other)?.to_vec())
        };
        if !bits1.is_empty() && bits1.len() == bits2.len() {
            // redundant, but helpful, bit-level implications
            for (l1, l2) in bits1.into_iter().zip(bits2.into_iter()) {
                self.add_clause(&[l1, !l2, !c])?;
                self.add_clause(&[!l1, l2, !c])?;
            }
        }
        Ok(c)
    }

    pub fn bv_neq_const(&mut self, id: usize, c: u64) -> Result<Lit> {
        Ok(!self.bv_eq_const(id, c)?)
    }

    pub fn bv_neq_bv(&mut self, id: usize, other: usize) -> Result<Lit> {
        Ok(!self.bv_eq_bv(id, other)?)
    }

    /// `c <-> (a and not b)`.
    fn reify_eq(&mut self, a: Lit, b: Lit, var: Option<Var>) -> Result<Lit> {
        let v = var.unwrap_or_else(|| self.sat.new_var_default());
        self.sat.set_frozen(v, true);
        self.vars.expose(v);
        let c = Lit::new(v, true);
        self.add_clause(&[a, !c])?;
        self.add_clause(&[!b, !c])?;
        self.add_clause(&[c, !a, b])?;
        Ok(c)
    }

    fn with_bv<T>(
        &mut self,
        f: impl FnOnce(&mut BvTheory, &mut SimpSolver<ApiCallbacks>) -> Result<T>,
    ) -> Result<T> {
        let tid = self.bv_tid()?;
        let Self { sat, th, .. } = self;
        let bv = th.theory_mut::<BvTheory>(tid).unwrap();
        f(bv, sat)
    }

    pub fn bv_addition(&mut self, a: usize, b: usize, r: usize) -> Result<()> {
        self.with_bv(|bv, _| bv.add_of(a, b, r))?;
        wout!(self, "bv + {} {} {}", r, a, b);
        Ok(())
    }

    pub fn bv_subtraction(&mut self, a: usize, b: usize, r: usize) -> Result<()> {
        self.with_bv(|bv, _| bv.sub_of(a, b, r))?;
        wout!(self, "bv - {} {} {}", r, a, b);
        Ok(())
    }

    pub fn bv_multiply(&mut self, a: usize, b: usize, r: usize) -> Result<()> {
        self.with_bv(|bv, _| bv.mul_of(a, b, r))?;
        wout!(self, "bv * {} {} {}", r, a, b);
        Ok(())
    }

    pub fn bv_divide(&mut self, a: usize, b: usize, r: usize) -> Result<()> {
        self.with_bv(|bv, _| bv.div_of(a, b, r))?;
        wout!(self, "bv / {} {} {}", r, a, b);
        Ok(())
    }

    pub fn bv_min(&mut self, args: &[usize], r: usize) -> Result<()> {
        self.with_bv(|bv, _| bv.min_of(args.to_vec(), r))?;
        self.write_bv_nary("min", r, args)
    }

    pub fn bv_max(&mut self, args: &[usize], r: usize) -> Result<()> {
        self.with_bv(|bv, _| bv.max_of(args.to_vec(), r))?;
        self.write_bv_nary("max", r, args)
    }

    fn write_bv_nary(&mut self, kw: &str, r: usize, args: &[usize]) -> Result<()> {
        if self.transcript.is_active() {
            let mut line = format!("bv {} {} {}", kw, r, args.len());
            for &a in args {
                line.push_str(&format!(" {}", a));
            }
            wout!(self, "{}", line);
        }
        Ok(())
    }

    pub fn bv_ite(&mut self, cond: Lit, then_bv: usize, else_bv: usize, r: usize) -> Result<()> {
        self.check_lit(cond)?;
        self.with_bv(|bv, _| bv.ite_of(cond, then_bv, else_bv, r))?;
        let d = self.vars.dimacs(cond);
        wout!(self, "bv_ite {} {} {} {}", d, then_bv, else_bv, r);
        Ok(())
    }

    /// `r` counts the true literals among `args` (all positive).
    pub fn bv_popcount(&mut self, args: &[Lit], r: usize) -> Result<()> {
        for &l in args {
            if !l.sign() {
                return Err(Error::domain(
                    "popcount arguments must all be positive literals".to_string(),
                ));
            }
            self.check_lit(l)?;
        }
        self.with_bv(|bv, _| bv.popcount_of(args.to_vec(), r))?;
        self.write_bv_lits("popcount", r, args)
    }

    /// `r` is the length of the true prefix of the sequential variables in
    /// `args`.
    pub fn bv_unary(&mut self, args: &[Lit], r: usize) -> Result<()> {
        for &l in args {
            if !l.sign() {
                return Err(Error::domain(
                    "unary arguments must all be positive literals".to_string(),
                ));
            }
            self.check_lit(l)?;
        }
        self.with_bv(|bv, sat| bv.unary_of(sat, args.to_vec(), r))?;
        self.write_bv_lits("unary", r, args)
    }

    fn write_bv_lits(&mut self, kw: &str, r: usize, args: &[Lit]) -> Result<()> {
        if self.transcript.is_active() {
            let mut line = format!("bv {} {} {}", kw, r, args.len());
            for &l in args {
                line.push_str(&format!(" {}", self.vars.dimacs(l)));
            }
            wout!(self, "{}", line);
        }
        Ok(())
    }

    pub fn bv_not(&mut self, a: usize, out: usize) -> Result<()> {
        self.with_bv(|bv, sat| bv.bitwise_not(sat, a, out))?;
        wout!(self, "bv not {} {}", a, out);
        Ok(())
    }

    pub fn bv_and(&mut self, a: usize, b: usize, out: usize) -> Result<()> {
        self.with_bv(|bv, sat| bv.bitwise_and(sat, a, b, out))?;
        wout!(self, "bv and {} {} {}", a, b, out);
        Ok(())
    }

    pub fn bv_nand(&mut self, a: usize, b: usize, out: usize) -> Result<()> {
        self.with_bv(|bv, sat| bv.bitwise_nand(sat, a, b, out))?;
        wout!(self, "bv nand {} {} {}", a, b, out);
        Ok(())
    }

    pub fn bv_or(&mut self, a: usize, b: usize, out: usize) -> Result<()> {
        self.with_bv(|bv, sat| bv.bitwise_or(sat, a, b, out))?;
        wout!(self, "bv or {} {} {}", a, b, out);
        Ok(())
    }

    pub fn bv_nor(&mut self, a: usize, b: usize, out: usize) -> Result<()> {
        self.with_bv(|bv, sat| bv.bitwise_nor(sat, a, b, out))?;
        wout!(self, "bv nor {} {} {}", a, b, out);
        Ok(())
    }

    pub fn bv_xor(&mut self, a: usize, b: usize, out: usize) -> Result<()> {
        self.with_bv(|bv, sat| bv.bitwise_xor(sat, a, b, out))?;
        wout!(self, "bv xor {} {} {}", a, b, out);
        Ok(())
    }

    pub fn bv_xnor(&mut self, a: usize, b: usize, out: usize) -> Result<()> {
        self.with_bv(|bv, sat| bv.bitwise_xnor(sat, a, b, out))?;
        wout!(self, "bv xnor {} {} {}", a, b, out);
        Ok(())
    }

    pub fn bv_concat(&mut self, a: usize, b: usize, r: usize) -> Result<()> {
        self.with_bv(|bv, _| bv.concat_of(a, b, r))?;
        wout!(self, "bv concat {} {} {}", a, b, r);
        Ok(())
    }

    pub fn bv_slice(&mut self, a: usize, lower: u32, upper: u32, r: usize) -> Result<()> {
        self.with_bv(|bv, _| bv.slice_of(a, lower, upper, r))?;
        wout!(self, "bv slice {} {} {} {}", a, lower, upper, r);
        Ok(())
    }

    /// Compile `id` and its cone of influence to CNF.
    pub fn bv_bitblast(&mut self, id: usize) -> Result<()> {
        self.backtrack();
        self.with_bv(|bv, sat| bv.bitblast(sat, id))?;
        wout!(self, "bv bitblast {}", id);
        Ok(())
    }

    // ---------- graphs ----------

    pub fn new_graph(&mut self) -> Result<usize> {
        self.new_graph_named("", -2)
    }

    /// A graph with an edge-weight bit-width (`-2` selects plain integer
    /// weights) and an optional unique name.
    pub fn new_graph_named(&mut self, name: &str, bitwidth: i32) -> Result<usize> {
        if !name.is_empty() {
            check_name(name)?;
            if self.graph_names.contains_key(name) {
                return Err(Error::domain(format!(
                    "all graph names must be unique; duplicate name: {}",
                    name
                )));
            }
        }
        let gid = self.graphs.len();
        let tid = self.th.len();
        let mut g = GraphTheory::new(tid, gid, name.to_string(), bitwidth, self.graph_opts);
        if let Some(bv_tid) = self.bv_tid {
            let store = self.th.theory_ref::<BvTheory>(bv_tid).unwrap().bounds();
            g.set_bv_bounds(store);
        }
        self.th.add_theory(Box::new(g));
        self.graphs.push(tid);
        if !name.is_empty() {
            self.graph_names.insert(name.to_string(), gid);
        }
        if name.is_empty() {
            wout!(self, "digraph 0 0 {} {}", gid, bitwidth);
        } else {
            wout!(self, "digraph 0 0 {} {} {}", gid, bitwidth, name);
        }
        Ok(gid)
    }

    pub fn graph_by_name(&self, name: &str) -> Option<usize> {
        self.graph_names.get(name).copied()
    }

    fn graph_tid(&self, g: usize) -> Result<usize> {
        self.graphs
            .get(g)
            .copied()
            .ok_or_else(|| Error::domain(format!("graph {} does not exist", g)))
    }

    fn graph_ref(&self, g: usize) -> Result<&GraphTheory> {
        Ok(self.th.theory_ref::<GraphTheory>(self.graph_tid(g)?).unwrap())
    }

    fn graph_mut(&mut self, g: usize) -> Result<&mut GraphTheory> {
        let tid = self.graph_tid(g)?;
        Ok(self.th.theory_mut::<GraphTheory>(tid).unwrap())
    }

    pub fn graph_name(&self, g: usize) -> Result<String> {
        Ok(self.graph_ref(g)?.name().to_string())
    }

    pub fn graph_width(&self, g: usize) -> Result<i32> {
        Ok(self.graph_ref(g)?.edge_weight_bitwidth())
    }

    pub fn n_nodes(&self, g: usize) -> Result<usize> {
        Ok(self.graph_ref(g)?.n_nodes())
    }

    pub fn n_edges(&self, g: usize) -> Result<usize> {
        Ok(self.graph_ref(g)?.n_edges())
    }

    pub fn new_node(&mut self, g: usize) -> Result<usize> {
        self.new_node_named(g, "")
    }

    pub fn new_node_named(&mut self, g: usize, name: &str) -> Result<usize> {
        if !name.is_empty() && self.graph_ref(g)?.has_named_node(name) {
            return Err(Error::domain(
                "all nodes in a graph must have unique names (or empty names)".to_string(),
            ));
        }
        let gr = self.graph_mut(g)?;
        let n = gr.new_node();
        if !name.is_empty() {
            gr.set_node_name(n, name)?;
            wout!(self, "node {} {} {}", g, n, name);
        } else {
            wout!(self, "node {} {}", g, n);
        }
        Ok(n)
    }

    pub fn has_named_node(&self, g: usize, name: &str) -> Result<bool> {
        Ok(self.graph_ref(g)?.has_named_node(name))
    }

    pub fn node_name(&self, g: usize, node: usize) -> Result<String> {
        Ok(self.graph_ref(g)?.node_name(node).to_string())
    }

    pub fn node_by_name(&self, g: usize, name: &str) -> Result<Option<usize>> {
        Ok(self.graph_ref(g)?.node_by_name(name))
    }

    pub fn new_edge(&mut self, g: usize, from: usize, to: usize, weight: u64) -> Result<Lit> {
        self.new_edge_with_var(g, from, to, weight, None)
    }

    pub(crate) fn new_edge_with_var(
        &mut self,
        g: usize,
        from: usize,
        to: usize,
        weight: u64,
        var: Option<Var>,
    ) -> Result<Lit> {
        let tid = self.graph_tid(g)?;
        let v = var.unwrap_or_else(|| self.sat.new_var_default());
        self.sat.set_frozen(v, true);
        self.vars.expose(v);
        self.th
            .theory_mut::<GraphTheory>(tid)
            .unwrap()
            .new_edge(from, to, v, EdgeWeight::Const(weight))?;
        let l = Lit::new(v, true);
        let d = self.vars.dimacs(l);
        wout!(self, "edge {} {} {} {} {}", g, from, to, d, weight);
        Ok(l)
    }

    pub fn new_edge_bv(&mut self, g: usize, from: usize, to: usize, bv: usize) -> Result<Lit> {
        self.new_edge_bv_with_var(g, from, to, bv, None)
    }

    pub(crate) fn new_edge_bv_with_var(
        &mut self,
        g: usize,
        from: usize,
        to: usize,
        bv: usize,
        var: Option<Var>,
    ) -> Result<Lit> {
        let tid = self.graph_tid(g)?;
        let v = var.unwrap_or_else(|| self.sat.new_var_default());
        self.sat.set_frozen(v, true);
        self.vars.expose(v);
        self.th
            .theory_mut::<GraphTheory>(tid)
            .unwrap()
            .new_edge(from, to, v, EdgeWeight::Bv(bv))?;
        let l = Lit::new(v, true);
        let d = self.vars.dimacs(l);
        wout!(self, "edge_bv {} {} {} {} {}", g, from, to, d, bv);
        Ok(l)
    }

    fn graph_atom(&mut self, g: usize, kind: AtomKind, var: Option<Var>) -> Result<(Lit, bool)> {
        let tid = self.graph_tid(g)?;
        let Self { sat, th, vars, .. } = self;
        let gr = th.theory_mut::<GraphTheory>(tid).unwrap();
        let (lit, fresh) = gr.atom_lit(kind, || var.unwrap_or_else(|| sat.new_var_default()))?;
        if fresh {
            sat.set_frozen(lit.var(), true);
            th.set_owner(lit.var(), tid);
            vars.expose(lit.var());
        }
        Ok((lit, fresh))
    }

    /// `to` is reachable from `from` over enabled edges.
    pub fn reaches(&mut self, g: usize, from: usize, to: usize) -> Result<Lit> {
        self.reaches_with_var(g, from, to, -1, None)
    }

    pub(crate) fn reaches_with_var(
        &mut self,
        g: usize,
        from: usize,
        to: usize,
        within: i64,
        var: Option<Var>,
    ) -> Result<Lit> {
        if from == to {
            // trivially reachable; no new variable needed
            return self.true_lit();
        }
        let (lit, fresh) = self.graph_atom(g, AtomKind::Reach { from, to, within }, var)?;
        if fresh {
            let d = self.vars.dimacs(lit);
            if within < 0 {
                wout!(self, "reach {} {} {} {}", g, from, to, d);
            } else {
                wout!(self, "distance_leq {} {} {} {} {}", g, from, to, d, within);
            }
        }
        Ok(lit)
    }

    /// Reachability along reversed edges.
    pub fn reaches_backward(&mut self, g: usize, from: usize, to: usize) -> Result<Lit> {
        self.reaches_backward_with_var(g, from, to, None)
    }

    pub(crate) fn reaches_backward_with_var(
        &mut self,
        g: usize,
        from: usize,
        to: usize,
        var: Option<Var>,
    ) -> Result<Lit> {
        if from == to {
            return self.true_lit();
        }
        let (lit, fresh) = self.graph_atom(g, AtomKind::ReachBackward { from, to }, var)?;
        if fresh {
            let d = self.vars.dimacs(lit);
            wout!(self, "reach_backward {} {} {} {}", g, from, to, d);
        }
        Ok(lit)
    }

    /// Some path from `from` to `to` passes through `node`.
    pub fn on_path(&mut self, g: usize, node: usize, from: usize, to: usize) -> Result<Lit> {
        self.on_path_with_var(g, node, from, to, None)
    }

    pub(crate) fn on_path_with_var(
        &mut self,
        g: usize,
        node: usize,
        from: usize,
        to: usize,
        var: Option<Var>,
    ) -> Result<Lit> {
        let (lit, fresh) = self.graph_atom(g, AtomKind::OnPath { node, from, to }, var)?;
        if fresh {
            let d = self.vars.dimacs(lit);
            wout!(self, "on_path {} {} {} {} {}", g, node, from, to, d);
        }
        Ok(lit)
    }

    /// Reachable in strictly fewer than `steps` edges.
    pub fn shortest_path_unweighted_lt_const(
        &mut self,
        g: usize,
        from: usize,
        to: usize,
        steps: i64,
    ) -> Result<Lit> {
        if steps <= 0 {
            return self.false_lit();
        }
        self.reaches_with_var(g, from, to, steps - 1, None)
    }

    /// Reachable in at most `steps` edges.
    pub fn shortest_path_unweighted_leq_const(
        &mut self,
        g: usize,
        from: usize,
        to: usize,
        steps: i64,
    ) -> Result<Lit> {
        if steps < 0 {
            return self.false_lit();
        }
        self.reaches_with_var(g, from, to, steps, None)
    }

    /// Weighted shortest path strictly below `dist`.
    pub fn shortest_path_lt_const(
        &mut self,
        g: usize,
        from: usize,
        to: usize,
        dist: u64,
    ) -> Result<Lit> {
        self.shortest_path_with_var(g, from, to, dist, true, None)
    }

    /// Weighted shortest path of at most `dist`.
    pub fn shortest_path_leq_const(
        &mut self,
        g: usize,
        from: usize,
        to: usize,
        dist: u64,
    ) -> Result<Lit> {
        self.shortest_path_with_var(g, from, to, dist, false, None)
    }

    pub(crate) fn shortest_path_with_var(
        &mut self,
        g: usize,
        from: usize,
        to: usize,
        dist: u64,
        strict: bool,
        var: Option<Var>,
    ) -> Result<Lit> {
        if from == to {
            // the empty path has weight zero
            return if strict && dist == 0 {
                self.false_lit()
            } else {
                self.true_lit()
            };
        }
        if dist == 0 {
            // a distance bound of zero between distinct nodes cannot hold
            return self.false_lit();
        }
        let (lit, fresh) = self.graph_atom(
            g,
            AtomKind::Distance {
                from,
                to,
                dist,
                strict,
            },
            var,
        )?;
        if fresh {
            let d = self.vars.dimacs(lit);
            let kw = if strict {
                "weighted_distance_lt"
            } else {
                "weighted_distance_leq"
            };
            wout!(self, "{} {} {} {} {} {}", kw, g, from, to, d, dist);
        }
        Ok(lit)
    }

    pub fn shortest_path_lt_bv(&mut self, g: usize, from: usize, to: usize, bv: usize) -> Result<Lit> {
        self.shortest_path_bv_with_var(g, from, to, bv, true, None)
    }

    pub fn shortest_path_leq_bv(&mut self, g: usize, from: usize, to: usize, bv: usize) -> Result<Lit> {
        self.shortest_path_bv_with_var(g, from, to, bv, false, None)
    }

    pub(crate) fn shortest_path_bv_with_var(
        &mut self,
        g: usize,
        from: usize,
        to: usize,
        bv: usize,
        strict: bool,
        var: Option<Var>,
    ) -> Result<Lit> {
        let (lit, fresh) = self.graph_atom(
            g,
            AtomKind::DistanceBv {
                from,
                to,
                bv,
                strict,
            },
            var,
        )?;
        if fresh {
            let d = self.vars.dimacs(lit);
            let kw = if strict {
                "weighted_distance_bv_lt"
            } else {
                "weighted_distance_bv_leq"
            };
            wout!(self, "{} {} {} {} {} {}", kw, g, from, to, d, bv);
        }
        Ok(lit)
    }

    pub fn maximum_flow_geq(
        &mut self,
        g: usize,
        source: usize,
        sink: usize,
        flow: u64,
    ) -> Result<Lit> {
        self.maxflow_with_var(g, source, sink, flow, false, None)
    }

    pub fn maximum_flow_gt(
        &mut self,
        g: usize,
        source: usize,
        sink: usize,
        flow: u64,
    ) -> Result<Lit> {
        self.maxflow_with_var(g, source, sink, flow, true, None)
    }

    pub(crate) fn maxflow_with_var(
        &mut self,
        g: usize,
        source: usize,
        sink: usize,
        flow: u64,
        strict: bool,
        var: Option<Var>,
    ) -> Result<Lit> {
        let (lit, fresh) = self.graph_atom(
            g,
            AtomKind::MaxFlow {
                source,
                sink,
                flow,
                strict,
            },
            var,
        )?;
        if fresh {
            let d = self.vars.dimacs(lit);
            let kw = if strict {
                "maximum_flow_gt"
            } else {
                "maximum_flow_geq"
            };
            wout!(self, "{} {} {} {} {} {}", kw, g, source, sink, d, flow);
        }
        Ok(lit)
    }

    pub fn maximum_flow_geq_bv(
        &mut self,
        g: usize,
        source: usize,
        sink: usize,
        bv: usize,
    ) -> Result<Lit> {
        self.maxflow_bv_with_var(g, source, sink, bv, false, None)
    }

    pub fn maximum_flow_gt_bv(
        &mut self,
        g: usize,
        source: usize,
        sink: usize,
        bv: usize,
    ) -> Result<Lit> {
        self.maxflow_bv_with_var(g, source, sink, bv, true, None)
    }

    pub(crate) fn maxflow_bv_with_var(
        &mut self,
        g: usize,
        source: usize,
        sink: usize,
        bv: usize,
        strict: bool,
        var: Option<Var>,
    ) -> Result<Lit> {
        let (lit, fresh) = self.graph_atom(
            g,
            AtomKind::MaxFlowBv {
                source,
                sink,
                bv,
                strict,
            },
            var,
        )?;
        if fresh {
            let d = self.vars.dimacs(lit);
            let kw = if strict {
                "maximum_flow_bv_gt"
            } else {
                "maximum_flow_bv_geq"
            };
            wout!(self, "{} {} {} {} {} {}", kw, g, source, sink, d, bv);
        }
        Ok(lit)
    }

    pub fn minimum_spanning_tree_leq(&mut self, g: usize, weight: u64) -> Result<Lit> {
        self.mst_weight_with_var(g, weight, false, None)
    }

    pub fn minimum_spanning_tree_lt(&mut self, g: usize, weight: u64) -> Result<Lit> {
        self.mst_weight_with_var(g, weight, true, None)
    }

    pub(crate) fn mst_weight_with_var(
        &mut self,
        g: usize,
        weight: u64,
        strict: bool,
        var: Option<Var>,
    ) -> Result<Lit> {
        let (lit, fresh) = self.graph_atom(g, AtomKind::MstWeight { weight, strict }, var)?;
        if fresh {
            let d = self.vars.dimacs(lit);
            let kw = if strict { "mst_weight_lt" } else { "mst_weight_leq" };
            wout!(self, "{} {} {} {}", kw, g, d, weight);
        }
        Ok(lit)
    }

    pub fn acyclic_directed(&mut self, g: usize) -> Result<Lit> {
        self.acyclic_with_var(g, true, None)
    }

    pub fn acyclic_undirected(&mut self, g: usize) -> Result<Lit> {
        self.acyclic_with_var(g, false, None)
    }

    pub(crate) fn acyclic_with_var(
        &mut self,
        g: usize,
        directed: bool,
        var: Option<Var>,
    ) -> Result<Lit> {
        let (lit, fresh) = self.graph_atom(g, AtomKind::Acyclic { directed }, var)?;
        if fresh {
            let d = self.vars.dimacs(lit);
            let kw = if directed { "acyclic" } else { "forest" };
            wout!(self, "{} {} {}", kw, g, d);
        }
        Ok(lit)
    }

    /// Declare an edge set: at most one member may be enabled (through a
    /// dedicated at-most-one over fresh mirror variables), and, when
    /// `enforce` is set, at least one must be.
    pub fn new_edge_set(&mut self, g: usize, edges: &[Lit], enforce: bool) -> Result<()> {
        let tid = self.graph_tid(g)?;
        let mut edge_ids = vec![];
        {
            let gr = self.th.theory_ref::<GraphTheory>(tid).unwrap();
            for &l in edges {
                if l.var().idx() >= self.sat.num_vars() {
                    return Err(Error::domain(format!("bad edge set variable {:?}", l)));
                }
                match gr.edge_id_of_var(l.var()) {
                    Some(e) => edge_ids.push(e),
                    None => {
                        return Err(Error::domain(format!(
                            "variable {:?} is not an edge variable of graph {}",
                            l, g
                        )))
                    }
                }
            }
        }
        if self.transcript.is_active() {
            let mut line = format!("edge_set {} {}", g, edges.len());
            for &l in edges {
                line.push_str(&format!(" {}", self.vars.dimacs(l)));
            }
            wout!(self, "{}", line);
        }
        // apply the declared edge-set weight, if one was configured
        let assign_w = self.th.theory_ref::<GraphTheory>(tid).unwrap().assign_edges_to_weight();
        if let Some(w) = assign_w {
            let gr = self.th.theory_mut::<GraphTheory>(tid).unwrap();
            for &e in &edge_ids {
                gr.set_edge_weight(e, w);
            }
        }
        if enforce {
            // at least one member is enabled
            let mut alo = edges.to_vec();
            self.sat.add_clause_reuse(&mut alo);
            // at most one, over mirror variables kept equal to the edges, so
            // SAT-level propagation stays decoupled from theory propagation
            let amo_tid = self.th.len();
            let mut amo = AmoTheory::new(amo_tid);
            let mut mirrors = vec![];
            for &l in edges {
                let v = self.sat.new_var_default();
                self.sat.set_frozen(v, true);
                let m = Lit::new(v, true);
                self.sat.add_clause_reuse(&mut vec![!m, l]);
                self.sat.add_clause_reuse(&mut vec![m, !l]);
                amo.add_var(v, true);
                mirrors.push(v);
            }
            self.th.add_theory(Box::new(amo));
            for v in mirrors {
                self.th.set_owner(v, amo_tid);
            }
        }
        Ok(())
    }

    /// Record a weight to assign to the members of subsequently declared
    /// edge sets of this graph.
    pub fn set_assign_edges_to_weight(&mut self, g: usize, w: u64) -> Result<()> {
        self.graph_mut(g)?.set_assign_edges_to_weight(w);
        wout!(self, "graph_assign_edges_to_weight {} {}", g, w);
        Ok(())
    }

    // ---------- finite state machines ----------

    pub fn init_fsm_theory(&mut self) {
        if self.fsm_tid.is_some() {
            return;
        }
        let tid = self.th.len();
        self.th.add_theory(Box::new(FsmTheory::new(tid)));
        self.fsm_tid = Some(tid);
    }

    fn fsm_tid(&mut self) -> usize {
        self.init_fsm_theory();
        self.fsm_tid.unwrap()
    }

    pub fn new_fsm(&mut self, in_alphabet: u32, out_alphabet: u32) -> Result<usize> {
        let tid = self.fsm_tid();
        let id = self
            .th
            .theory_mut::<FsmTheory>(tid)
            .unwrap()
            .new_fsm(in_alphabet, out_alphabet);
        wout!(self, "fsm {} {} {}", id, in_alphabet, out_alphabet);
        Ok(id)
    }

    pub fn new_fsm_state(&mut self, fsm: usize) -> Result<usize> {
        let tid = self.fsm_tid();
        let s = self.th.theory_mut::<FsmTheory>(tid).unwrap().new_state(fsm)?;
        wout!(self, "fsm_state {}", fsm);
        Ok(s)
    }

    pub fn new_fsm_transition(
        &mut self,
        fsm: usize,
        from: usize,
        to: usize,
        in_label: u32,
        out_label: u32,
    ) -> Result<Lit> {
        self.new_fsm_transition_with_var(fsm, from, to, in_label, out_label, None)
    }

    pub(crate) fn new_fsm_transition_with_var(
        &mut self,
        fsm: usize,
        from: usize,
        to: usize,
        in_label: u32,
        out_label: u32,
        var: Option<Var>,
    ) -> Result<Lit> {
        let tid = self.fsm_tid();
        let v = var.unwrap_or_else(|| self.sat.new_var_default());
        self.sat.set_frozen(v, true);
        self.vars.expose(v);
        self.th
            .theory_mut::<FsmTheory>(tid)
            .unwrap()
            .new_transition(fsm, from, to, in_label, out_label, v)?;
        let l = Lit::new(v, true);
        let d = self.vars.dimacs(l);
        wout!(
            self,
            "transition {} {} {} {} {} {}",
            fsm,
            from,
            to,
            in_label,
            out_label,
            d
        );
        Ok(l)
    }

    pub fn new_fsm_string(&mut self, labels: &[u32]) -> Result<usize> {
        let tid = self.fsm_tid();
        let id = self
            .th
            .theory_mut::<FsmTheory>(tid)
            .unwrap()
            .new_string(labels.to_vec())?;
        if self.transcript.is_active() {
            let mut line = format!("str {}", id);
            for &l in labels {
                line.push_str(&format!(" {}", l));
            }
            wout!(self, "{}", line);
        }
        Ok(id)
    }

    pub fn fsm_accepts(
        &mut self,
        fsm: usize,
        start: usize,
        accept: usize,
        string: usize,
    ) -> Result<Lit> {
        self.fsm_accepts_with_var(fsm, start, accept, string, None)
    }

    pub(crate) fn fsm_accepts_with_var(
        &mut self,
        fsm: usize,
        start: usize,
        accept: usize,
        string: usize,
        var: Option<Var>,
    ) -> Result<Lit> {
        let tid = self.fsm_tid();
        let v = var.unwrap_or_else(|| self.sat.new_var_default());
        self.sat.set_frozen(v, true);
        self.vars.expose(v);
        let lit = self
            .th
            .theory_mut::<FsmTheory>(tid)
            .unwrap()
            .accept_atom(fsm, start, accept, string, v)?;
        self.th.set_owner(v, tid);
        let d = self.vars.dimacs(lit);
        wout!(self, "accepts {} {} {} {} {}", fsm, start, accept, string, d);
        Ok(lit)
    }

    /// The generator/acceptor composition acceptor is not available.
    pub fn fsm_composition_accepts(&mut self) -> Result<Lit> {
        Err(Error::domain(
            "fsm composition acceptance is not supported".to_string(),
        ))
    }

    // ---------- flow routing ----------

    pub fn create_flow_routing(
        &mut self,
        g: usize,
        source: usize,
        dest: usize,
        maxflow_lit: Lit,
    ) -> Result<usize> {
        self.graph_tid(g)?;
        self.check_lit(maxflow_lit)?;
        let rid = self.routers.len();
        let tid = self.th.len();
        self.th.add_theory(Box::new(FlowRouter::new(
            tid,
            rid,
            g,
            source,
            dest,
            maxflow_lit,
        )));
        self.routers.push(tid);
        let d = self.vars.dimacs(maxflow_lit);
        wout!(self, "f_router {} {} {} {} {}", g, rid, source, dest, d);
        Ok(rid)
    }

    pub fn add_routing_net(
        &mut self,
        g: usize,
        router: usize,
        disabled_edge: Lit,
        members: &[(Lit, Lit)],
    ) -> Result<()> {
        let tid = *self
            .routers
            .get(router)
            .ok_or_else(|| Error::domain(format!("flow router {} does not exist", router)))?;
        self.check_lit(disabled_edge)?;
        for &(e, r) in members {
            self.check_lit(e)?;
            self.check_lit(r)?;
        }
        if self.transcript.is_active() {
            let mut line = format!(
                "f_router_net {} {} {} {}",
                g,
                router,
                self.vars.dimacs(disabled_edge),
                members.len()
            );
            for &(e, r) in members {
                line.push_str(&format!(" {} {}", self.vars.dimacs(e), self.vars.dimacs(r)));
            }
            wout!(self, "{}", line);
        }
        self.th
            .theory_mut::<FlowRouter>(tid)
            .unwrap()
            .add_net(disabled_edge, members.to_vec());
        Ok(())
    }

    // ---------- objectives ----------

    pub fn clear_optimization_objectives(&mut self) -> Result<()> {
        wout!(self, "clear_opt");
        self.objectives.clear();
        Ok(())
    }

    pub fn maximize_bv(&mut self, id: usize) -> Result<()> {
        self.optimize_bv(id, true)
    }

    pub fn minimize_bv(&mut self, id: usize) -> Result<()> {
        self.optimize_bv(id, false)
    }

    pub(crate) fn optimize_bv(&mut self, id: usize, maximize: bool) -> Result<()> {
        if !self.bv_ref()?.has_bv(id) {
            return Err(Error::domain(format!(
                "optimization bitvector {} is not allocated",
                id
            )));
        }
        wout!(
            self,
            "{} bv {}",
            if maximize { "maximize" } else { "minimize" },
            id
        );
        self.objectives.push(Objective::Bv { bv: id, maximize });
        Ok(())
    }

    pub fn maximize_lits(&mut self, lits: &[Lit]) -> Result<()> {
        self.optimize_lits(lits, None, true)
    }

    pub fn minimize_lits(&mut self, lits: &[Lit]) -> Result<()> {
        self.optimize_lits(lits, None, false)
    }

    pub fn maximize_weighted_lits(&mut self, lits: &[Lit], weights: &[i64]) -> Result<()> {
        self.optimize_lits(lits, Some(weights), true)
    }

    pub fn minimize_weighted_lits(&mut self, lits: &[Lit], weights: &[i64]) -> Result<()> {
        self.optimize_lits(lits, Some(weights), false)
    }

    pub(crate) fn optimize_lits(
        &mut self,
        lits: &[Lit],
        weights: Option<&[i64]>,
        maximize: bool,
    ) -> Result<()> {
        if lits.is_empty() {
            return Ok(());
        }
        for &l in lits {
            self.check_lit(l)?;
        }
        // missing weights default to 1; extras are dropped
        let weights: Vec<u64> = match weights {
            None => vec![1; lits.len()],
            Some(ws) => {
                let mut w: Vec<u64> = ws
                    .iter()
                    .take(lits.len())
                    .map(|&x| if x < 0 { 0 } else { x as u64 })
                    .collect();
                while w.len() < lits.len() {
                    w.push(1);
                }
                w
            }
        };
        if self.transcript.is_active() {
            let kw = if maximize { "maximize" } else { "minimize" };
            let mut line = format!("{} lits {}", kw, lits.len());
            for &l in lits {
                line.push_str(&format!(" {}", self.vars.dimacs(l)));
            }
            for &w in &weights {
                line.push_str(&format!(" {}", w));
            }
            line.push_str(" 0");
            wout!(self, "{}", line);
        }
        self.objectives.push(Objective::Lits {
            lits: lits.to_vec(),
            weights,
            maximize,
        });
        Ok(())
    }

    // ---------- solving ----------

    pub fn set_time_limit(&mut self, seconds: i32) {
        limits::set_time_limit(seconds);
    }

    pub fn set_memory_limit(&mut self, mb: i32) {
        limits::set_memory_limit(mb);
    }

    pub fn set_conflict_limit(&mut self, num_conflicts: i64) {
        self.sat.set_conf_budget(num_conflicts);
    }

    pub fn set_propagation_limit(&mut self, num_propagations: i64) {
        self.sat.set_prop_budget(num_propagations);
    }

    /// Make the current solve return UNKNOWN at its next safe point; the
    /// solver stays usable afterwards.
    pub fn interrupt(&self) {
        self.sat.interrupt_async();
    }

    pub fn solve(&mut self) -> Result<bool> {
        Ok(self.solve_limited(&[])? == lbool::TRUE)
    }

    pub fn solve_assumptions(&mut self, assumps: &[Lit]) -> Result<bool> {
        Ok(self.solve_limited(assumps)? == lbool::TRUE)
    }

    /// Solve under assumptions: TRUE, FALSE, or UNDEF when a budget or
    /// limit fired.
    pub fn solve_limited(&mut self, assumps: &[Lit]) -> Result<lbool> {
        self.has_conflict = false;
        for &l in assumps {
            if l.var().idx() >= self.sat.num_vars() {
                return Err(Error::domain(format!(
                    "assumption literal {:?} is not allocated",
                    l
                )));
            }
            self.vars.expose(l.var());
        }
        if self.transcript.is_active() {
            let mut line = String::from("solve");
            for &l in assumps {
                line.push_str(&format!(" {}", self.vars.dimacs(l)));
            }
            wout!(self, "{}", line);
        }
        limits::enable_resource_limits();
        let (res, found_optimal) = {
            let Self {
                sat,
                th,
                pb,
                objectives,
                bv_tid,
                ..
            } = self;
            let mut ok = sat.preprocess(th);
            ok &= pb.convert(sat);
            let mut found_optimal = true;
            let r = if !ok {
                lbool::FALSE
            } else {
                optimize::optimize_and_solve(sat, th, *bv_tid, objectives, assumps, &mut found_optimal)
            };
            (r, found_optimal)
        };
        limits::disable_resource_limits();
        self.last_solution_optimal = found_optimal;
        self.last_result = res;
        if res == lbool::FALSE {
            self.has_conflict = true;
        }
        Ok(res)
    }

    /// Whether the last solution is optimal with respect to the objective
    /// list. Note: this stays true when the solve itself was UNSAT
    /// ("optimal among the empty set").
    pub fn last_solution_was_optimal(&self) -> bool {
        self.last_solution_optimal
    }

    /// The conflicting assumption set of the last UNSAT solve, as the
    /// negations of a sufficient subset of the assumptions; `None` if the
    /// last solve was not UNSAT.
    pub fn conflict_clause(&self) -> Option<Vec<Lit>> {
        if self.has_conflict {
            Some(self.sat.unsat_core().to_vec())
        } else {
            None
        }
    }

    /// Shrink a known-UNSAT assumption set in place to a locally minimal
    /// core; the solver's conflict is updated to match. Returns the new
    /// size.
    pub fn minimize_unsat_core(&mut self, assumptions: &mut Vec<Lit>) -> Result<usize> {
        for &l in assumptions.iter() {
            if l.var().idx() >= self.sat.num_vars() {
                return Err(Error::domain(format!(
                    "assumption literal {:?} is not allocated",
                    l
                )));
            }
        }
        if self.transcript.is_active() {
            let mut line = String::from("minimize_core");
            for &l in assumptions.iter() {
                line.push_str(&format!(" {}", self.vars.dimacs(l)));
            }
            wout!(self, "{}", line);
        }
        limits::enable_resource_limits();
        let r = {
            let Self { sat, th, pb, .. } = self;
            let ok = sat.preprocess(th) && pb.convert(sat);
            if !ok {
                lbool::FALSE
            } else {
                optimize::minimize_unsat_core(sat, th, assumptions)
            }
        };
        limits::disable_resource_limits();
        self.last_solution_optimal = r != lbool::UNDEF;
        self.has_conflict = r != lbool::TRUE;
        self.last_result = r;
        Ok(assumptions.len())
    }

    /// Minimize the conflict of the last UNSAT solve in place.
    pub fn minimize_conflict_clause(&mut self) -> Result<()> {
        if self.has_conflict {
            let mut assumptions: Vec<Lit> = self.sat.unsat_core().iter().map(|&l| !l).collect();
            self.minimize_unsat_core(&mut assumptions)?;
        }
        Ok(())
    }

    // ---------- models ----------

    pub fn has_model(&self) -> bool {
        self.last_result == lbool::TRUE
    }

    /// Ternary model value of a literal.
    pub fn model_lit(&self, l: Lit) -> Result<lbool> {
        if l.var().idx() >= self.sat.num_vars() {
            return Err(Error::domain(format!("variable of {:?} is undefined", l)));
        }
        Ok(self.sat.value_lit(l))
    }

    /// The literal's value if it is fixed at level 0, UNDEF otherwise.
    pub fn constant_model_lit(&self, l: Lit) -> Result<lbool> {
        if l.var().idx() >= self.sat.num_vars() {
            return Err(Error::domain(format!("variable of {:?} is undefined", l)));
        }
        Ok(self.sat.value_lvl_0(l))
    }

    /// Model value of a bitvector: its under-approximation, or the
    /// over-approximation when `maximize` is set.
    pub fn model_bv(&self, id: usize, maximize: bool) -> Result<u64> {
        self.bv_ref()?.model_value(id, maximize)
    }

    fn checked_graph_atom(&self, g: usize, l: Lit) -> Result<&GraphTheory> {
        let gr = self.graph_ref(g)?;
        if !gr.owns_atom(l) {
            return Err(Error::domain(format!(
                "literal {:?} is not a graph atom of graph {}",
                l, g
            )));
        }
        Ok(gr)
    }

    /// Witness path, as node ids, for a true reach/distance atom.
    pub fn model_path_nodes(&self, g: usize, l: Lit) -> Result<Option<Vec<usize>>> {
        Ok(self.checked_graph_atom(g, l)?.model_path_nodes(l))
    }

    /// Witness path, as edge-enable literals.
    pub fn model_path_edge_lits(&self, g: usize, l: Lit) -> Result<Option<Vec<Lit>>> {
        Ok(self.checked_graph_atom(g, l)?.model_path_edge_lits(l))
    }

    /// Value of the maximum flow witnessing a maxflow atom under the model.
    pub fn model_maxflow(&self, g: usize, l: Lit) -> Result<u64> {
        self.checked_graph_atom(g, l)?
            .model_maxflow(l)
            .ok_or_else(|| Error::domain(format!("literal {:?} is not a maxflow atom", l)))
    }

    /// Flow assigned to one edge under the model.
    pub fn model_edge_flow(&self, g: usize, maxflow_lit: Lit, edge_lit: Lit) -> Result<u64> {
        let gr = self.checked_graph_atom(g, maxflow_lit)?;
        if gr.edge_id_of_var(edge_lit.var()).is_none() {
            return Err(Error::domain(format!(
                "literal {:?} is not an edge of graph {}",
                edge_lit, g
            )));
        }
        gr.model_edge_flow(maxflow_lit, edge_lit)
            .ok_or_else(|| Error::domain(format!("literal {:?} is not a maxflow atom", maxflow_lit)))
    }

    /// Flow assigned to one edge in the cycle-free decomposition of the
    /// witness flow.
    pub fn model_acyclic_edge_flow(&self, g: usize, maxflow_lit: Lit, edge_lit: Lit) -> Result<u64> {
        let gr = self.checked_graph_atom(g, maxflow_lit)?;
        if gr.edge_id_of_var(edge_lit.var()).is_none() {
            return Err(Error::domain(format!(
                "literal {:?} is not an edge of graph {}",
                edge_lit, g
            )));
        }
        gr.model_acyclic_edge_flow(maxflow_lit, edge_lit)
            .ok_or_else(|| Error::domain(format!("literal {:?} is not a maxflow atom", maxflow_lit)))
    }

    /// Weight of the minimum spanning tree under the model; `u64::MAX` when
    /// the model graph does not span.
    pub fn model_mst_weight(&self, g: usize, l: Lit) -> Result<u64> {
        Ok(self
            .checked_graph_atom(g, l)?
            .model_mst_weight(l)
            .unwrap_or(u64::MAX))
    }

    // ---------- transcript ----------

    /// Start recording every constructive call to the given path; an empty
    /// path stops recording.
    pub fn set_output_file(&mut self, path: &str) -> Result<()> {
        self.transcript.set_output_file(path)?;
        if self.transcript.is_active() {
            wout!(self, "c monosat {}", Self::version());
            if let Some(l) = self.const_true {
                let d = self.vars.dimacs(l);
                wout!(self, "{} 0", d);
            }
        }
        Ok(())
    }

    /// Replay a recorded transcript, re-running its solve calls. Returns
    /// the result of the last solve (true when none was recorded).
    pub fn read_transcript<R: BufRead>(&mut self, input: R) -> Result<bool> {
        transcript::parse_transcript(self, input)
    }

    pub fn read_transcript_file(&mut self, path: &str) -> Result<bool> {
        let f = std::fs::File::open(path)?;
        self.read_transcript(std::io::BufReader::new(f))
    }
}

impl Default for Solver {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Solver {
    fn drop(&mut self) {
        self.sat.interrupt_async();
        if let Some(token) = self.guard_token.take() {
            limits::unregister_solver(token);
        }
    }
}
