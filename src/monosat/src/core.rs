/*****************************************************************************************[core.rs]
Copyright (c) 2003-2006, Niklas Een, Niklas Sorensson (MiniSat)
Copyright (c) 2007-2010, Niklas Sorensson (MiniSat)

Permission is hereby granted, free of charge, to any person obtaining a copy of this software and
associated documentation files (the "Software"), to deal in the Software without restriction,
including without limitation the rights to use, copy, modify, merge, publish, distribute,
sublicense, and/or sell copies of the Software, and to permit persons to whom the Software is
furnished to do so, subject to the following conditions:

The above copyright notice and this permission notice shall be included in all copies or
substantial portions of the Software.

THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR IMPLIED, INCLUDING BUT
NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY, FITNESS FOR A PARTICULAR PURPOSE AND
NONINFRINGEMENT. IN NO EVENT SHALL THE AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM,
DAMAGES OR OTHER LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM, OUT
OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN THE SOFTWARE.
**************************************************************************************************/

use {
    crate::callbacks::{Callbacks, ProgressStatus},
    crate::clause::{
        self, lbool, CRef, ClauseAllocator, ClauseRef, DeletePred, LSet, Lit, OccLists,
        OccListsData, VMap, Var,
    },
    crate::intmap::{Comparator, Heap, HeapData},
    crate::theory::Theory,
    std::{
        cmp, mem,
        sync::atomic::{AtomicBool, Ordering},
        sync::Arc,
    },
};

/// The main CDCL solver structure.
///
/// A `Solver` holds the whole state of the SAT engine: clause allocator,
/// assignment trail, watcher lists, activity heap and statistics. Theory
/// propagators are passed in at each solve call and are consulted at every
/// propagation fixpoint; their propagations carry the `CRef::SPECIAL` reason
/// token and are explained lazily during conflict analysis.
pub struct Solver<Cb: Callbacks> {
    /// If the problem is satisfiable, this vector holds the model (if any).
    model: Vec<lbool>,
    /// If the problem is unsatisfiable under assumptions, this holds the
    /// final conflict expressed in the assumptions.
    conflict: LSet,

    cb: Cb,
    asynch_interrupt: Arc<AtomicBool>,

    /// List of problem clauses.
    clauses: Vec<CRef>,
    /// List of learnt clauses.
    learnts: Vec<CRef>,

    s: SolverState,
    tmp_c_th: Vec<Lit>,     // used for theory conflicts
    tmp_c_add_cl: Vec<Lit>, // used for adding clauses during search
}

/// The current assignments.
struct VarState {
    /// A heuristic measurement of the activity of a variable.
    activity: VMap<f64>,
    /// Current assignment for each variable.
    ass: VMap<lbool>,
    /// Stores reason and level for each variable.
    vardata: VMap<VarData>,
    /// Amount to bump next variable with.
    var_inc: f64,
    var_decay: f64,

    /// Assignment stack; stores all assigments made in the order they were made.
    trail: Vec<Lit>,
    /// Separator indices for different decision levels in `trail`.
    trail_lim: Vec<i32>,
}

struct SolverState {
    vars: VarState,

    learntsize_adjust_start_confl: i32,
    learntsize_adjust_inc: f64,
    max_learnts: f64,
    learntsize_adjust_confl: f64,
    learntsize_adjust_cnt: i32,

    remove_satisfied: bool,

    // Statistics:
    solves: u64,
    starts: u64,
    decisions: u64,
    rnd_decisions: u64,
    propagations: u64,
    conflicts: u64,
    dec_vars: u64,
    max_literals: u64,
    tot_literals: u64,

    num_clauses: u64,
    num_learnts: u64,
    clauses_literals: u64,
    learnts_literals: u64,

    // Mode of operation:
    clause_decay: f64,
    random_var_freq: f64,
    random_seed: f64,
    luby_restart: bool,
    /// Controls conflict clause minimization (0=none, 1=basic, 2=deep).
    ccmin_mode: i32,
    /// Controls the level of phase saving (0=none, 1=limited, 2=full).
    phase_saving: i32,
    /// Use random polarities for branching heuristics.
    rnd_pol: bool,
    /// Initialize variable activities with a small random value.
    rnd_init_act: bool,
    /// The fraction of wasted memory allowed before a garbage collection is triggered.
    garbage_frac: f64,
    /// Minimum number to set the learnts limit to.
    min_learnts_lim: i32,

    /// The initial restart limit.
    restart_first: i32,
    /// The factor with which the restart limit is multiplied in each restart.
    restart_inc: f64,
    /// The initial limit for learnt clauses as a factor of the original clauses.
    learntsize_factor: f64,
    /// The limit for learnt clauses is multiplied with this factor each restart.
    learntsize_inc: f64,

    /// The preferred polarity of each variable (phase saving).
    polarity: VMap<bool>,
    /// The user's preferred polarity of each variable.
    user_pol: VMap<lbool>,
    /// Declares whether a variable is eligible for selection in the decision heuristic.
    decision: VMap<bool>,
    /// User-assigned decision priority; higher-priority variables are decided first.
    priority: VMap<i32>,
    /// `watches[lit]` is a list of constraints watching `lit` (will go there if literal becomes true).
    watches_data: OccListsData<Lit, Watcher>,
    /// A priority queue of variables ordered with respect to the variable activity.
    order_heap_data: HeapData<Var>,
    /// If `false`, the constraints are already unsatisfiable. No part of the solver state may be used!
    ok: bool,
    /// Amount to bump next clause with.
    cla_inc: f64,
    /// Head of the propagation queue (as index into the trail).
    qhead: i32,
    /// Number of top-level assignments since last execution of `simplify()`.
    simp_db_assigns: i32,
    /// Remaining number of propagations before the next execution of `simplify()`.
    simp_db_props: i64,
    /// Set by `search()`.
    progress_estimate: f64,

    /// Next variable to be created.
    next_var: Var,
    ca: ClauseAllocator,

    /// Current set of assumptions provided to solve by the user.
    assumptions: Vec<Lit>,

    // Temporaries, to reduce allocation overhead.
    seen: VMap<Seen>,
    minimize_stack: Vec<Lit>,
    analyze_toclear: Vec<Lit>,

    // Resource constraints:
    conflict_budget: i64,
    propagation_budget: i64,

    th_st: TheoryState,
}

/// Buffer for theory lemmas pushed during a theory check.
struct TheoryState {
    lemma_lits: Vec<Lit>,
    lemma_offsets: Vec<(usize, usize)>, // slices in `lemma_lits`
}

impl TheoryState {
    fn new() -> Self {
        TheoryState {
            lemma_lits: vec![],
            lemma_offsets: vec![],
        }
    }

    fn clear(&mut self) {
        self.lemma_lits.clear();
        self.lemma_offsets.clear();
    }

    fn push_lemma(&mut self, lits: &[Lit]) {
        let idx = self.lemma_lits.len();
        self.lemma_offsets.push((idx, lits.len()));
        self.lemma_lits.extend_from_slice(lits);
    }

    fn iter_lemmas<'a>(&'a self) -> impl Iterator<Item = &'a [Lit]> + 'a {
        self.lemma_offsets
            .iter()
            .map(move |&(off, len)| &self.lemma_lits[off..off + len])
    }
}

// public API
impl<Cb: Callbacks> Solver<Cb> {
    /// Create a new solver with the given options and callbacks.
    pub fn new(opts: SolverOpts, cb: Cb) -> Self {
        assert!(opts.check());
        Self {
            model: vec![],
            conflict: LSet::new(),
            cb,
            clauses: vec![],
            learnts: vec![],
            asynch_interrupt: Arc::new(AtomicBool::new(false)),
            s: SolverState::new(&opts),
            tmp_c_th: vec![],
            tmp_c_add_cl: vec![],
        }
    }

    /// Creates a new SAT variable. If `dvar` is cleared, the variable will not
    /// be used as a decision variable (which has effects on the meaning of a
    /// SATISFIABLE result).
    pub fn new_var(&mut self, upol: lbool, dvar: bool) -> Var {
        self.s.new_var(upol, dvar)
    }

    /// Create a new variable with the default polarity and decision setting.
    pub fn new_var_default(&mut self) -> Var {
        self.new_var(lbool::UNDEF, true)
    }

    /// The variable of index `v_idx`, allocating it (and all indices below) if needed.
    pub fn var_of_int(&mut self, v_idx: u32) -> Var {
        while v_idx >= self.num_vars() {
            self.new_var_default();
        }
        Var::from_idx(v_idx)
    }

    /// Add a clause at level 0. Returns `false` iff the solver is now in an
    /// UNSAT state. Literals are sorted, duplicates merged, tautologies dropped.
    pub fn add_clause_reuse(&mut self, clause: &mut Vec<Lit>) -> bool {
        debug!("add toplevel clause {:?}", clause);
        debug_assert_eq!(
            self.s.decision_level(),
            0,
            "add clause at non-zero decision level"
        );
        clause.sort_unstable();
        self.add_clause_(clause)
    }

    /// Search for a model that respects the given assumptions, consulting the
    /// theory at each propagation fixpoint.
    pub fn solve_limited_th<Th: Theory + ?Sized>(&mut self, th: &mut Th, assumps: &[Lit]) -> lbool {
        self.asynch_interrupt.store(false, Ordering::SeqCst);
        self.s.assumptions.clear();
        self.s.assumptions.extend_from_slice(assumps);
        self.solve_internal(th)
    }

    /// Simplify the clause database according to the current top-level assignment.
    #[inline(always)]
    pub fn simplify_th<Th: Theory + ?Sized>(&mut self, th: &mut Th) -> bool {
        self.simplify_internal(th)
    }

    /// Query model for a variable. Precondition: last result was SAT.
    pub fn value_var(&self, v: Var) -> lbool {
        self.model
            .get(v.idx() as usize)
            .map_or(lbool::UNDEF, |&v| v)
    }
    /// Query model for a literal.
    pub fn value_lit(&self, v: Lit) -> lbool {
        self.value_var(v.var()) ^ !v.sign()
    }
    /// Query the whole model.
    pub fn get_model(&self) -> &[lbool] {
        &self.model
    }
    /// `false` means the solver is in a conflicting state and must not be used.
    pub fn is_ok(&self) -> bool {
        self.s.ok
    }

    /// Current (trail) value of a literal, irrespective of any model.
    pub fn raw_value_lit(&self, l: Lit) -> lbool {
        self.s.value_lit(l)
    }

    /// Value of this literal if it is assigned at level 0, `UNDEF` otherwise.
    pub fn value_lvl_0(&self, lit: Lit) -> lbool {
        let mut res = self.s.value_lit(lit);
        if self.s.level(lit.var()) != 0 {
            res = lbool::UNDEF;
        }
        res
    }

    pub fn num_vars(&self) -> u32 {
        self.s.num_vars()
    }
    pub fn num_clauses(&self) -> u64 {
        self.s.num_clauses
    }
    pub fn num_conflicts(&self) -> u64 {
        self.s.conflicts
    }
    pub fn num_propagations(&self) -> u64 {
        self.s.propagations
    }
    pub fn num_decisions(&self) -> u64 {
        self.s.decisions
    }
    pub fn num_restarts(&self) -> u64 {
        self.s.starts
    }

    pub fn print_stats(&self) {
        println!("c restarts              : {}", self.s.starts);
        println!("c conflicts             : {:<12}", self.s.conflicts);
        println!(
            "c decisions             : {:<12}   ({:4.2} % random)",
            self.s.decisions,
            self.s.rnd_decisions as f32 * 100.0 / self.s.decisions as f32
        );
        println!("c propagations          : {:<12}", self.s.propagations);
        println!(
            "c conflict literals     : {:<12}   ({:4.2} % deleted)",
            self.s.tot_literals,
            (self.s.max_literals - self.s.tot_literals) as f64 * 100.0 / self.s.max_literals as f64
        );
    }

    /// The unsat core (a subset of the assumptions, negated).
    /// Precondition: last result was UNSAT.
    pub fn unsat_core(&self) -> &[Lit] {
        self.conflict.as_slice()
    }

    pub fn unsat_core_contains_lit(&self, lit: Lit) -> bool {
        self.conflict.has(lit)
    }

    pub fn unsat_core_contains_var(&self, v: Var) -> bool {
        let lit = Lit::new(v, true);
        self.unsat_core_contains_lit(lit) || self.unsat_core_contains_lit(!lit)
    }

    /// Restore a previously saved model (used by the optimizer when a
    /// resource limit fires after a model was already found).
    pub(crate) fn force_model(&mut self, m: &[lbool]) {
        self.model.clear();
        self.model.extend_from_slice(m);
    }

    /// Replace the stored assumption conflict (used by the core minimizer).
    pub(crate) fn set_conflict(&mut self, lits: &[Lit]) {
        self.conflict.clear();
        for &l in lits {
            self.conflict.insert(l);
        }
    }

    /// The literals proved at level 0; they keep this value from now on.
    pub fn proved_at_lvl_0(&self) -> &[Lit] {
        self.s.vars.proved_at_lvl_0()
    }

    /// Declare whether `v` is eligible for decisions.
    pub fn set_decision_var(&mut self, v: Var, dvar: bool) {
        self.s.set_decision_var(v, dvar)
    }

    pub fn is_decision_var(&self, v: Var) -> bool {
        self.s.decision[v]
    }

    /// Set the user-preferred polarity of `v`.
    pub fn set_polarity(&mut self, v: Var, pol: lbool) {
        self.s.user_pol[v] = pol;
    }

    pub fn polarity(&self, v: Var) -> lbool {
        self.s.user_pol[v]
    }

    /// Set the decision priority of `v`; variables with higher priority are
    /// picked before any variable of lower priority, regardless of activity.
    pub fn set_priority(&mut self, v: Var, p: i32) {
        self.s.priority[v] = p;
        let mut heap = self.s.order_heap();
        if heap.in_heap(v) {
            heap.update(v);
        }
    }

    pub fn priority(&self, v: Var) -> i32 {
        self.s.priority[v]
    }

    /// Limit the number of conflicts of subsequent solves (negative = none).
    pub fn set_conf_budget(&mut self, x: i64) {
        self.s.conflict_budget = if x < 0 { -1 } else { self.s.conflicts as i64 + x };
    }

    /// Limit the number of propagations of subsequent solves (negative = none).
    pub fn set_prop_budget(&mut self, x: i64) {
        self.s.propagation_budget = if x < 0 {
            -1
        } else {
            self.s.propagations as i64 + x
        };
    }

    /// Remove any conflict/propagation budget.
    pub fn budget_off(&mut self) {
        self.s.conflict_budget = -1;
        self.s.propagation_budget = -1;
    }

    /// The shared interrupt flag; setting it makes the solver return UNKNOWN
    /// at the next safe point. Shared so a process-wide signal hook can
    /// interrupt every live solver.
    pub fn interrupt_flag(&self) -> Arc<AtomicBool> {
        self.asynch_interrupt.clone()
    }

    /// Interrupt the search asynchronously.
    pub fn interrupt_async(&self) {
        self.asynch_interrupt.store(true, Ordering::Relaxed);
    }

    pub fn cb_mut(&mut self) -> &mut Cb {
        &mut self.cb
    }

    pub fn cb(&self) -> &Cb {
        &self.cb
    }

    #[inline(always)]
    pub fn decision_level(&self) -> u32 {
        self.s.decision_level()
    }

    /// Backtrack to `level`, notifying the theory.
    pub fn cancel_until_th<Th: Theory + ?Sized>(&mut self, th: &mut Th, level: u32) {
        self.cancel_until(th, level)
    }
}

impl<Cb: Callbacks + Default> Default for Solver<Cb> {
    fn default() -> Self {
        Solver::new(SolverOpts::default(), Default::default())
    }
}

// partial check, or final check?
enum TheoryCall {
    Partial,
    Final,
}

// main algorithm
impl<Cb: Callbacks> Solver<Cb> {
    /// Begins a new decision level.
    fn new_decision_level<Th: Theory + ?Sized>(&mut self, th: &mut Th) {
        trace!("new decision level {}", 1 + self.s.decision_level());
        self.s.vars.new_decision_level();
        th.create_level();
        debug_assert_eq!(
            self.s.decision_level() as usize,
            th.n_levels(),
            "same number of levels for theory and trail"
        );
    }

    fn simplify_internal<Th: Theory + ?Sized>(&mut self, _: &mut Th) -> bool {
        debug_assert_eq!(self.s.decision_level(), 0);

        if !self.s.ok || self.s.propagate().is_some() {
            self.s.ok = false;
            return false;
        }

        if self.s.num_assigns() as i32 == self.s.simp_db_assigns || self.s.simp_db_props > 0 {
            return true;
        }

        self.remove_satisfied(ClauseSetSelect::Learnt);
        if self.s.remove_satisfied {
            self.remove_satisfied(ClauseSetSelect::Original);
        }
        self.check_garbage();
        self.s.rebuild_order_heap();

        self.s.simp_db_assigns = self.s.num_assigns() as i32;
        self.s.simp_db_props = (self.s.clauses_literals + self.s.learnts_literals) as i64;

        true
    }

    /// Search for a model within the given number of conflicts
    /// (negative = no bound).
    ///
    /// Returns TRUE if a consistent total assignment was found and validated
    /// by the theory, FALSE if the clause set is unsatisfiable, and UNDEF if
    /// the conflict bound was reached.
    fn search<Th: Theory + ?Sized>(
        &mut self,
        th: &mut Th,
        nof_conflicts: i32,
        tmp_learnt: &mut Vec<Lit>,
    ) -> lbool {
        debug_assert!(self.s.ok);
        let mut conflict_c = 0;
        self.s.starts += 1;

        'main: loop {
            // boolean propagation
            let confl = self.s.propagate();

            if let Some(confl) = confl {
                // conflict analysis
                self.s.conflicts += 1;
                conflict_c += 1;
                if self.s.decision_level() == 0 {
                    return lbool::FALSE;
                }

                let learnt = self
                    .s
                    .analyze(Conflict::Bcp(confl), &self.learnts, tmp_learnt, th);
                self.add_learnt_and_backtrack(th, learnt, clause::Kind::Learnt);

                self.s.vars.var_decay_activity();
                self.s.cla_decay_activity();

                self.s.learntsize_adjust_cnt -= 1;
                if self.s.learntsize_adjust_cnt == 0 {
                    self.s.learntsize_adjust_confl *= self.s.learntsize_adjust_inc;
                    self.s.learntsize_adjust_cnt = self.s.learntsize_adjust_confl as i32;
                    self.s.max_learnts *= self.s.learntsize_inc;

                    let trail_lim_head = self
                        .s
                        .vars
                        .trail_lim
                        .first()
                        .cloned()
                        .unwrap_or(self.s.vars.trail.len() as i32);
                    let s = &self.s;
                    self.cb.on_progress(|| ProgressStatus {
                        conflicts: s.conflicts as i32,
                        dec_vars: s.dec_vars as i32 - trail_lim_head,
                        n_clauses: s.num_clauses,
                        n_clause_lits: s.clauses_literals as i32,
                        max_learnt: s.max_learnts as i32,
                        n_learnt: s.num_learnts,
                        n_learnt_lits: s.learnts_literals as f64 / s.num_learnts as f64,
                        progress_estimate: s.progress_estimate() * 100.0,
                    });
                }
            } else {
                // no boolean conflict
                if (nof_conflicts >= 0 && conflict_c >= nof_conflicts) || !self.within_budget() {
                    // Reached bound on number of conflicts:
                    self.s.progress_estimate = self.s.progress_estimate();
                    self.cancel_until(th, 0);
                    return lbool::UNDEF;
                }

                // Simplify the set of problem clauses:
                if self.s.decision_level() == 0 && !self.simplify_th(th) {
                    return lbool::FALSE;
                }

                if self.learnts.len() as f64 - self.s.num_assigns() as f64 >= self.s.max_learnts {
                    // Reduce the set of learnt clauses:
                    self.reduce_db();
                }

                // a partial theory check
                {
                    let th_res = self.call_theory(th, TheoryCall::Partial, tmp_learnt);

                    if th_res == lbool::UNDEF {
                        // some theory propagations, do not decide yet
                        continue 'main;
                    } else if th_res == lbool::FALSE {
                        // conflict, we backtracked and propagated a SAT literal
                        self.s.conflicts += 1;
                        conflict_c += 1;
                        continue 'main;
                    }
                }

                // select the next decision (using assumptions, or the variable heap)
                let mut next = Lit::UNDEF;
                while (self.s.decision_level() as usize) < self.s.assumptions.len() {
                    // Perform user provided assumption:
                    let p = self.s.assumptions[self.s.decision_level() as usize];
                    if self.s.value_lit(p) == lbool::TRUE {
                        // Dummy decision level, since `p` is true already:
                        self.new_decision_level(th);
                    } else if self.s.value_lit(p) == lbool::FALSE {
                        // assumption falsified, extract the conflicting subset
                        let mut conflict = mem::replace(&mut self.conflict, LSet::new());
                        self.s.analyze_final(th, !p, &mut conflict);
                        self.cb.on_new_clause(&conflict, clause::Kind::Learnt);
                        self.conflict = conflict;
                        return lbool::FALSE;
                    } else {
                        next = p;
                        break;
                    }
                }

                if next == Lit::UNDEF {
                    // new variable decision:
                    next = self.s.pick_branch_lit();

                    if next == Lit::UNDEF {
                        // no decision? time for a theory final-check
                        let th_res = self.call_theory(th, TheoryCall::Final, tmp_learnt);

                        if th_res == lbool::TRUE {
                            // Model found and validated by the theory
                            return lbool::TRUE;
                        } else if th_res == lbool::UNDEF {
                            // some propagations in final-check
                            continue 'main;
                        } else {
                            assert_eq!(th_res, lbool::FALSE);
                            self.s.conflicts += 1;
                            conflict_c += 1;
                            continue 'main;
                        }
                    } else {
                        // proper decision, keep `next`
                        self.s.decisions += 1;
                    }
                }

                debug_assert_ne!(next, Lit::UNDEF);

                // Increase decision level and enqueue `next`
                // with no justification since it's a decision
                self.new_decision_level(th);
                debug!("pick-next {:?}", next);
                self.s.vars.unchecked_enqueue(next, CRef::UNDEF);
            }
        }
    }

    /// Add a learnt clause and backtrack/propagate as necessary.
    fn add_learnt_and_backtrack<Th: Theory + ?Sized>(
        &mut self,
        th: &mut Th,
        learnt: LearntClause,
        k: clause::Kind,
    ) {
        self.cb.on_new_clause(&learnt.clause, k);
        self.cancel_until(th, learnt.backtrack_lvl as u32);

        // propagate the only lit of `learnt.clause` that isn't false
        if learnt.clause.len() == 1 {
            // directly propagate the unit clause at level 0
            self.s.vars.unchecked_enqueue(learnt.clause[0], CRef::UNDEF);
        } else if learnt.clause.len() == 0 {
            self.s.ok = false;
        } else {
            // propagate the lit, justified by `cr`
            let cr = self.s.ca.alloc_with_learnt(&learnt.clause, true);
            self.learnts.push(cr);
            self.s.attach_clause(cr);
            self.s.cla_bump_activity(&self.learnts, cr);
            self.s.vars.unchecked_enqueue(learnt.clause[0], cr);
        }

        if learnt.add_orig {
            debug!("add original lemma {:?}", learnt.orig_lits);
            // add the theory lemma too, it was deemed costly to produce
            let mut c = vec![];
            mem::swap(&mut c, &mut self.tmp_c_add_cl);
            c.clear();
            c.extend_from_slice(learnt.orig_lits);
            self.add_clause_during_search(th, &mut c);
            mem::swap(&mut c, &mut self.tmp_c_add_cl);
        }
    }

    /// Call the theory to check the current (possibly partial) model.
    ///
    /// Returns `UNDEF` if the theory propagated something, `TRUE` if
    /// the theory accepted the model without propagations, and `FALSE` if
    /// the theory rejected the model.
    fn call_theory<Th: Theory + ?Sized>(
        &mut self,
        th: &mut Th,
        k: TheoryCall,
        tmp_learnt: &mut Vec<Lit>,
    ) -> lbool {
        let mut th_arg = {
            let confl_cl = &mut self.tmp_c_th;
            confl_cl.clear();
            TheoryArg {
                s: &mut self.s,
                lits: confl_cl,
                has_propagated: false,
                conflict: TheoryConflict::Nil,
            }
        };
        // call theory
        match k {
            TheoryCall::Partial => th.partial_check(&mut th_arg),
            TheoryCall::Final => th.final_check(&mut th_arg),
        }
        if let TheoryConflict::Clause { costly } = th_arg.conflict {
            let mut local_confl_cl = vec![];
            mem::swap(&mut local_confl_cl, th_arg.lits);
            drop(th_arg);

            debug!("theory conflict {:?} (costly: {})", local_confl_cl, costly);
            self.s.sort_clause_lits(&mut local_confl_cl); // as if it were a normal clause
            local_confl_cl.dedup();
            let learnt = {
                let r = Conflict::ThLemma {
                    lits: &local_confl_cl,
                    add: costly,
                };
                self.s.analyze(r, &self.learnts, tmp_learnt, th)
            };
            self.add_learnt_and_backtrack(th, learnt, clause::Kind::Theory);
            mem::swap(&mut local_confl_cl, &mut self.tmp_c_th); // re-use lits
            lbool::FALSE
        } else if let TheoryConflict::Prop(p) = th_arg.conflict {
            // conflict: propagation of a lit known to be false
            debug!("inconsistent theory propagation {:?}", p);
            let learnt = {
                let r = Conflict::ThProp(p);
                self.s.analyze(r, &self.learnts, tmp_learnt, th)
            };
            self.add_learnt_and_backtrack(th, learnt, clause::Kind::Theory);
            lbool::FALSE
        } else {
            debug_assert!(match th_arg.conflict {
                TheoryConflict::Nil => true,
                _ => false,
            });

            let mut has_propagated = th_arg.has_propagated;
            drop(th_arg);

            let mut lemmas: Vec<Vec<Lit>> = vec![];
            for c in self.s.th_st.iter_lemmas() {
                has_propagated = true;
                lemmas.push(c.into());
            }
            // now add lemmas
            for mut c in lemmas {
                self.add_clause_during_search(th, &mut c);
            }

            if has_propagated {
                self.s.th_st.clear();
                lbool::UNDEF
            } else {
                lbool::TRUE // Model validated without further work needed
            }
        }
    }

    /// Main solve method (assumptions given in `self.s.assumptions`).
    fn solve_internal<Th: Theory + ?Sized>(&mut self, th: &mut Th) -> lbool {
        assert_eq!(self.s.decision_level(), 0);
        self.model.clear();
        self.conflict.clear();
        if !self.s.ok {
            return lbool::FALSE;
        }

        self.s.solves += 1;
        let mut tmp_learnt: Vec<Lit> = vec![];

        self.s.max_learnts = self.num_clauses() as f64 * self.s.learntsize_factor;
        if self.s.max_learnts < self.s.min_learnts_lim as f64 {
            self.s.max_learnts = self.s.min_learnts_lim as f64;
        }

        self.s.learntsize_adjust_confl = self.s.learntsize_adjust_start_confl as f64;
        self.s.learntsize_adjust_cnt = self.s.learntsize_adjust_confl as i32;
        let mut status;

        info!("search.start");
        self.cb.on_start();

        // Search:
        let mut curr_restarts: i32 = 0;
        loop {
            let rest_base = if self.s.luby_restart {
                utils::luby(self.s.restart_inc, curr_restarts)
            } else {
                f64::powi(self.s.restart_inc, curr_restarts)
            };
            let nof_clauses = (rest_base * self.s.restart_first as f64) as i32;
            status = self.search(th, nof_clauses, &mut tmp_learnt);
            if !self.within_budget() {
                break;
            }

            if status != lbool::UNDEF {
                break;
            } else {
                info!("search.restart({})", curr_restarts);
                curr_restarts += 1;
                self.cb.on_restart();
            }
        }

        self.cb.on_result(status);

        if status == lbool::TRUE {
            // Extend & copy model:
            let num_vars = self.num_vars();
            self.model.resize(num_vars as usize, lbool::UNDEF);
            for i in 0..num_vars {
                self.model[i as usize] = self.s.value(Var::from_idx(i));
            }
        } else if status == lbool::FALSE && self.conflict.len() == 0 {
            // NOTE: we may return `false` without an empty conflict in case we
            // had assumptions. In this case `self.conflict` contains the
            // unsat-core but adding new clauses might succeed in the absence
            // of these assumptions.
            self.s.ok = false;
        }

        self.cancel_until(th, 0);
        debug!("res: {:?}", status);
        status
    }

    /// Remove half of the learnt clauses, minus the clauses locked by the
    /// current assignment. Binary clauses are never removed.
    fn reduce_db(&mut self) {
        let extra_lim = self.s.cla_inc / self.learnts.len() as f64; // Remove any clause below this activity

        debug!("reduce_db.start");

        {
            let ca = &self.s.ca;
            self.learnts.sort_unstable_by(|&x, &y| {
                let x = ca.get_ref(x);
                let y = ca.get_ref(y);
                debug_assert!(x.learnt());
                debug_assert!(y.learnt());
                Ord::cmp(&(x.size() <= 2), &(y.size() <= 2)).then(
                    PartialOrd::partial_cmp(&x.activity(), &y.activity()).expect("NaN activity"),
                )
            });
        }
        // Don't delete binary or locked clauses. From the rest, delete clauses
        // from the first half and clauses with activity smaller than `extra_lim`:
        let mut j = 0;
        for i in 0..self.learnts.len() {
            let cr = self.learnts[i];
            let cond = {
                let c = self.s.ca.get_ref(cr);
                c.size() > 2
                    && !self.s.locked(c)
                    && (i < self.learnts.len() / 2 || (c.activity() as f64) < extra_lim)
            };
            if cond {
                self.s.remove_clause(cr);
                self.cb.on_delete_clause(self.s.ca.get_ref(cr).lits());
            } else {
                self.learnts[j] = cr;
                j += 1;
            }
        }

        let _deleted = self.learnts.len() - j;
        self.learnts.resize(j, CRef::UNDEF);

        debug!("reduce_db.done (deleted {})", _deleted);

        self.check_garbage();
    }

    /// Shrink the given set to contain only non-satisfied clauses.
    fn remove_satisfied(&mut self, which: ClauseSetSelect) {
        assert_eq!(self.s.decision_level(), 0);
        let cs: &mut Vec<CRef> = match which {
            ClauseSetSelect::Learnt => &mut self.learnts,
            ClauseSetSelect::Original => &mut self.clauses,
        };
        let self_s = &mut self.s;
        cs.retain(|&cr| {
            let satisfied = self_s.satisfied(self_s.ca.get_ref(cr));
            if satisfied {
                self_s.remove_clause(cr);
                debug!("remove satisfied clause {:?}", self_s.ca.get_ref(cr).lits());
            } else {
                let amount_shaved = {
                    let mut c = self_s.ca.get_mut(cr);
                    // Trim clause (but keep the 2 first lits as they are watching):
                    debug_assert_eq!(self_s.vars.value_lit(c[0]), lbool::UNDEF);
                    debug_assert_eq!(self_s.vars.value_lit(c[1]), lbool::UNDEF);
                    let mut k = 2;
                    let orig_size = c.size();
                    let mut end = c.size();
                    while k < end {
                        if self_s.vars.value_lit(c[k]) == lbool::FALSE {
                            // this lit is false at level 0, remove it from `c`
                            debug_assert_eq!(self_s.vars.level(c[k].var()), 0);
                            end -= 1;
                            let lit = c[end];
                            c[k] = lit;
                        } else {
                            k += 1;
                        }
                    }
                    c.shrink(end);
                    (orig_size - end) as usize
                };
                self_s.ca.free_amount(amount_shaved);
            }
            !satisfied
        });
    }

    /// Revert to the state at the given level (keeping all assignments at
    /// `level` but not beyond), popping theory levels to match.
    fn cancel_until<Th: Theory + ?Sized>(&mut self, th: &mut Th, level: u32) {
        let dl = self.s.decision_level();
        if dl > level {
            let n_th_levels = (dl - level) as usize;
            trace!(
                "solver.cancel-until {} (pop {} theory levels)",
                level,
                n_th_levels
            );
            self.s.cancel_until(level);
            th.pop_levels(n_th_levels); // backtrack theory state
        }
    }

    /// Garbage collect the clause allocator by moving alive clauses into
    /// another allocator.
    fn garbage_collect(&mut self) {
        // Initialize the next region to a size corresponding to the estimated
        // utilization degree:
        let mut to = ClauseAllocator::with_start_cap(self.s.ca.len() - self.s.ca.wasted());

        self.s
            .reloc_all(&mut self.learnts, &mut self.clauses, &mut to);

        self.cb.on_gc(
            (self.s.ca.len() * ClauseAllocator::UNIT_SIZE as usize) as usize,
            (to.len() * ClauseAllocator::UNIT_SIZE as usize) as usize,
        );
        self.s.ca = to;
    }

    /// Check whether the space wasted by dead clauses in the clause allocator
    /// exceeds the threshold.
    fn check_garbage(&mut self) {
        if self.s.ca.wasted() as f64 > self.s.ca.len() as f64 * self.s.garbage_frac {
            self.garbage_collect();
        }
    }

    fn has_been_interrupted(&self) -> bool {
        self.asynch_interrupt.load(Ordering::Relaxed)
    }

    fn within_budget(&self) -> bool {
        !self.has_been_interrupted()
            && (self.s.conflict_budget < 0 || self.s.conflicts < self.s.conflict_budget as u64)
            && (self.s.propagation_budget < 0
                || self.s.propagations < self.s.propagation_budget as u64)
            && !self.cb.stop()
    }

    /// Add clause. Precondition: `clause` is sorted for some ordering on `Lit`.
    fn add_clause_(&mut self, clause: &mut Vec<Lit>) -> bool {
        if !self.s.ok {
            return false;
        }

        let mut last_lit = Lit::UNDEF;
        let mut j = 0;
        // remove duplicates, true literals, etc.
        for i in 0..clause.len() {
            let lit_i = clause[i];
            let value = self.s.value_lit(lit_i);
            let lvl = self.s.level_lit(lit_i);
            if (value == lbool::TRUE && lvl == 0) || lit_i == !last_lit {
                return true; // tautology, or satisfied already at level 0
            } else if !(value == lbool::FALSE && lvl == 0) && lit_i != last_lit {
                // not a duplicate
                last_lit = lit_i;
                clause[j] = lit_i;
                j += 1;
            }
        }

        clause.resize(j, Lit::UNDEF);
        if clause.len() == 0 {
            self.s.ok = false;
            return false;
        } else if clause.len() == 1 {
            self.s.vars.unchecked_enqueue(clause[0], CRef::UNDEF);
        } else {
            let cr = self.s.ca.alloc_with_learnt(&clause, false);
            self.clauses.push(cr);
            self.s.attach_clause(cr);
        }

        true
    }

    /// Add a clause during search; backtracks to level 0 first for unit clauses.
    fn add_clause_during_search<Th: Theory + ?Sized>(
        &mut self,
        th: &mut Th,
        clause: &mut Vec<Lit>,
    ) -> bool {
        debug!("add internal clause {:?}", clause);
        if !self.s.ok {
            return false;
        }
        if clause.len() == 1 {
            self.cancel_until(th, 0); // only at level 0
        }

        self.s.sort_clause_lits(clause);
        self.add_clause_(clause)
    }
}

/// Theory-triggered conflict.
enum TheoryConflict {
    Nil,
    Clause { costly: bool },
    Prop(Lit),
}

/// The interface the solver hands to theories during checks.
///
/// This is where a theory can inspect the trail, enqueue propagations,
/// push lemmas, and raise conflicts.
pub struct TheoryArg<'a> {
    s: &'a mut SolverState,
    lits: &'a mut Vec<Lit>,
    has_propagated: bool,
    conflict: TheoryConflict,
}

/// Temporary representation of a learnt clause, produced in `analyze`.
struct LearntClause<'a> {
    orig_lits: &'a [Lit], // original theory lemma
    add_orig: bool,       // should we also add `orig_lits`?
    clause: &'a [Lit],    // the learnt clause
    backtrack_lvl: i32,   // where to backtrack?
}

#[derive(Clone, Copy, Debug)]
enum Conflict<'a> {
    Bcp(CRef), // boolean propagation conflict
    ThLemma { lits: &'a [Lit], add: bool },
    ThProp(Lit), // literal was propagated, but is false
}

#[derive(Clone, Copy, Debug)]
enum ResolveWith<'a> {
    Init(Conflict<'a>), // initial conflict
    Resolve(Lit, CRef), // propagation of lit because of clause
}

impl SolverState {
    #[inline(always)]
    pub fn num_assigns(&self) -> u32 {
        self.vars.num_assigns()
    }

    #[inline(always)]
    fn num_vars(&self) -> u32 {
        self.next_var.idx()
    }

    #[inline(always)]
    pub fn level(&self, x: Var) -> i32 {
        self.vars.level(x)
    }

    #[inline(always)]
    pub fn level_lit(&self, x: Lit) -> i32 {
        self.level(x.var())
    }

    #[inline(always)]
    pub fn value(&self, x: Var) -> lbool {
        self.vars.value(x)
    }

    #[inline(always)]
    pub fn value_lit(&self, x: Lit) -> lbool {
        self.vars.value_lit(x)
    }

    fn order_heap(&mut self) -> Heap<Var, VarOrder> {
        self.order_heap_data.promote(VarOrder {
            activity: &self.vars.activity,
            priority: &self.priority,
        })
    }

    fn set_decision_var(&mut self, v: Var, b: bool) {
        if b && !self.decision[v] {
            self.dec_vars += 1;
        } else if !b && self.decision[v] {
            self.dec_vars -= 1;
        }
        self.decision[v] = b;
        self.insert_var_order(v);
    }

    fn insert_var_order(&mut self, x: Var) {
        if !self.order_heap().in_heap(x) && self.decision[x] {
            self.order_heap().insert(x);
        }
    }

    fn cla_decay_activity(&mut self) {
        self.cla_inc *= 1.0 / self.clause_decay;
    }

    fn cla_bump_activity(&mut self, learnts: &[CRef], cr: CRef) {
        let new_activity = {
            let mut c = self.ca.get_mut(cr);
            let r = c.activity() + self.cla_inc as f32;
            c.set_activity(r);
            r
        };
        if new_activity > 1e20 {
            // Rescale:
            for &learnt in learnts.iter() {
                let mut c = self.ca.get_mut(learnt);
                let r = c.activity() * 1e-20;
                c.set_activity(r);
            }
            self.cla_inc *= 1e-20;
        }
    }

    /// Pick a literal to make a decision with.
    fn pick_branch_lit(&mut self) -> Lit {
        let mut next = Var::UNDEF;

        // Random decision:
        if utils::drand(&mut self.random_seed) < self.random_var_freq
            && !self.order_heap().is_empty()
        {
            let idx_tmp =
                utils::irand(&mut self.random_seed, self.order_heap_data.len() as i32) as usize;
            next = self.order_heap_data[idx_tmp];
            if self.value(next) == lbool::UNDEF && self.decision[next] {
                self.rnd_decisions += 1;
            }
        }

        // Activity based decision:
        while next == Var::UNDEF || self.value(next) != lbool::UNDEF || !self.decision[next] {
            let mut order_heap = self.order_heap();
            if order_heap.is_empty() {
                next = Var::UNDEF;
                break;
            } else {
                next = order_heap.remove_min();
            }
        }

        // Choose polarity based on different polarity modes (global or per-variable):
        if next == Var::UNDEF {
            Lit::UNDEF
        } else if self.user_pol[next] != lbool::UNDEF {
            Lit::new(next, self.user_pol[next] == lbool::TRUE)
        } else if self.rnd_pol {
            Lit::new(next, utils::drand(&mut self.random_seed) < 0.5)
        } else {
            Lit::new(next, self.polarity[next])
        }
    }

    fn watches(&mut self) -> OccLists<Lit, Watcher, WatcherDeleted> {
        self.watches_data.promote(WatcherDeleted { ca: &self.ca })
    }

    fn new_var(&mut self, upol: lbool, dvar: bool) -> Var {
        let v = self.next_var;
        self.next_var = Var::from_idx(self.next_var.idx() + 1);
        self.watches().init(Lit::new(v, false));
        self.watches().init(Lit::new(v, true));
        self.vars.ass.insert_default(v, lbool::UNDEF);
        self.vars
            .vardata
            .insert_default(v, VarData::new(CRef::UNDEF, 0));
        if self.rnd_init_act {
            self.vars
                .activity
                .insert_default(v, utils::drand(&mut self.random_seed) * 0.00001);
        } else {
            self.vars.activity.insert_default(v, 0.0);
        }
        self.seen.insert_default(v, Seen::UNDEF);
        self.polarity.insert_default(v, false);
        self.user_pol.insert_default(v, upol);
        self.priority.insert_default(v, 0);
        self.decision.reserve_default(v);
        let len = self.vars.trail.len();
        if v.idx() as usize > len {
            self.vars.trail.reserve(v.idx() as usize + 1 - len);
        }
        self.set_decision_var(v, dvar);
        v
    }

    /// Analyze a conflict and produce a learnt clause.
    ///
    /// # Pre-conditions:
    ///
    /// - current decision level must be greater than root level.
    /// - `orig` is false in the current trail.
    ///
    /// # Post-conditions:
    ///
    /// - `backtrack_lvl` is the level to jump to.
    /// - `clause[0]` is the asserting literal at that level.
    /// - if `clause.len() > 1` then `clause[1]` has the greatest decision
    ///   level of the rest of the literals.
    fn analyze<'a, Th: Theory + ?Sized>(
        &mut self,
        orig: Conflict<'a>,
        learnts: &[CRef],
        out_learnt: &'a mut Vec<Lit>,
        th: &mut Th,
    ) -> LearntClause<'a> {
        out_learnt.clear();

        debug!("analyze.start {:?}", orig);

        // at what level did the conflict happen?
        let conflict_level = match orig {
            Conflict::Bcp(_) | Conflict::ThProp(_) => {
                self.decision_level() as i32 // current level
            }
            Conflict::ThLemma { lits, .. } => {
                // check it's a proper conflict clause
                debug_assert!(lits.iter().all(|&p| self.value_lit(p) == lbool::FALSE));
                debug_assert!(lits.len() >= 1, "theory lemma should have at least 1 lit");

                let lvl = lits
                    .iter()
                    .map(|&lit| self.level_lit(lit))
                    .max()
                    .unwrap_or(0);

                if lits.len() == 1 {
                    // unit clause: learn the clause itself at level 0
                    trace!("analyze: learn unit clause {:?} itself", lits);
                    out_learnt.extend_from_slice(lits);
                    return LearntClause {
                        clause: lits,
                        backtrack_lvl: 0,
                        orig_lits: lits,
                        add_orig: false,
                    };
                } else if lvl == 0 {
                    // all at level 0: empty clause
                    trace!("analyze: conflict level 0, learn empty clause");
                    return LearntClause {
                        clause: &[],
                        backtrack_lvl: 0,
                        orig_lits: lits,
                        add_orig: false,
                    };
                }

                lvl
            }
        };

        let mut cur_clause = ResolveWith::Init(orig);
        let mut path_c = 0;
        #[allow(unused)]
        let mut p = Lit::UNDEF;

        out_learnt.push(Lit::UNDEF); // leave room for the UIP

        let mut index = self.vars.trail.len();

        loop {
            // obtain literals to resolve with, as well as a flag indicating
            // whether they should be true or false in the trail
            let mut lits_are_true = false;
            let lits = match cur_clause {
                ResolveWith::Init(Conflict::ThLemma { lits, .. }) => lits,
                ResolveWith::Init(Conflict::ThProp(lit)) => {
                    // theory propagation; ask the theory to justify `lit` with Γ.
                    // The initial conflict is `Γ => lit`, which is false in the
                    // current trail.
                    let expl = th.explain_propagation(lit);
                    let lits = &mut self.th_st.lemma_lits;
                    lits.clear();
                    lits.push(lit);
                    lits.extend(expl.iter().map(|&a| !a));
                    debug_assert!({
                        let vars = &self.vars;
                        lits.iter().all(|&q| vars.value_lit(q) == lbool::FALSE)
                    });
                    &self.th_st.lemma_lits[..]
                }
                ResolveWith::Init(Conflict::Bcp(cr)) => {
                    // bump activity if `cr` is a learnt clause
                    let mut c = self.ca.get_ref(cr);
                    if c.learnt() {
                        self.cla_bump_activity(learnts, cr);
                        c = self.ca.get_ref(cr); // re-borrow
                    }

                    c.lits()
                }
                ResolveWith::Resolve(lit, cr) if cr == CRef::SPECIAL => {
                    // theory propagation, ask the theory to justify `lit`
                    lits_are_true = true;
                    let lits = th.explain_propagation(lit);
                    debug_assert!(lits.iter().all(|&q| self.vars.value_lit(q) == lbool::TRUE));
                    let buf = &mut self.th_st.lemma_lits;
                    buf.clear();
                    buf.extend_from_slice(lits);
                    &self.th_st.lemma_lits[..]
                }
                ResolveWith::Resolve(_lit, cr) if cr == CRef::UNDEF => {
                    // should have `path_c == 0`
                    panic!(
                        "analyze: reached a decision literal {:?}, path_c={}",
                        _lit, path_c
                    );
                }
                ResolveWith::Resolve(lit, cr) => {
                    // bump activity if `cr` is a learnt clause
                    let mut c = self.ca.get_ref(cr);
                    if c.learnt() {
                        self.cla_bump_activity(learnts, cr);
                        c = self.ca.get_ref(cr); // re-borrow
                    }

                    let lits = c.lits();

                    // we are resolving with the clause which propagated `lit`,
                    // so we skip its first literal since it cannot appear in
                    // the learnt clause
                    debug_assert_eq!(lit.var(), lits[0].var());
                    &lits[1..]
                }
            };
            trace!(
                "analyze.resolve-with {:?} (p: {:?}, path_c: {})",
                lits,
                p,
                path_c
            );

            for i in 0..lits.len() {
                let q0 = lits[i];
                let q = if lits_are_true { !q0 } else { q0 }; // be sure that `q` is false
                let lvl = self.vars.level(q.var());
                debug_assert!(lvl <= conflict_level);
                if !self.seen[q.var()].is_seen() && lvl > 0 {
                    self.vars
                        .var_bump_activity(&mut self.order_heap_data, &self.priority, q.var());
                    self.seen[q.var()] = Seen::SOURCE;
                    if lvl == conflict_level {
                        // at conflict level: need to eliminate this lit by resolution
                        path_c += 1;
                    } else {
                        out_learnt.push(q); // part of the learnt clause
                    }
                }
            }
            // Select next literal in the trail to look at:
            while !self.seen[self.vars.trail[index - 1].var()].is_seen() {
                debug_assert_eq!(
                    self.vars.level(self.vars.trail[index - 1].var()),
                    conflict_level
                );
                index -= 1;
            }

            p = self.vars.trail[index - 1];
            index -= 1;
            cur_clause = ResolveWith::Resolve(p, self.vars.reason(p.var()));
            self.seen[p.var()] = Seen::REMOVABLE;
            path_c -= 1;

            if path_c <= 0 {
                break;
            }
        }

        // cleanup literals flagged `REMOVABLE`
        index = self.vars.trail.len() - 1;
        loop {
            let q = self.vars.trail[index];
            if self.seen[q.var()] == Seen::REMOVABLE {
                self.seen[q.var()] = Seen::UNDEF;
            }
            if q == p {
                break;
            }
            // avoid overflow by decreasing index only if we keep looping
            index -= 1;
        }

        assert_ne!(p, Lit::UNDEF);
        debug_assert!(self.value_lit(p) == lbool::TRUE);
        out_learnt[0] = !p;

        trace!("analyze-learnt: {:?} (before minimization)", &out_learnt);
        self.max_literals += out_learnt.len() as u64;

        self.minimize_conflict(out_learnt);

        // Find correct backtrack level:
        let btlevel = if out_learnt.len() == 1 {
            0
        } else {
            let mut max_i = 1;
            let mut max_level = self.level(out_learnt[max_i].var());
            // Find the first literal assigned at the next-highest level:
            for i in 2..out_learnt.len() {
                let level = self.level(out_learnt[i].var());
                if level > max_level {
                    max_i = i;
                    max_level = level;
                }
            }
            // Swap-in this literal at index 1:
            out_learnt.swap(max_i, 1);
            self.level_lit(out_learnt[1])
        };

        for i in 0..self.analyze_toclear.len() {
            let lit = self.analyze_toclear[i];
            self.seen[lit.var()] = Seen::UNDEF; // `seen[]` is now cleared
        }
        debug_assert!(out_learnt
            .iter()
            .all(|&l| self.value_lit(l) == lbool::FALSE));
        let (orig_lits, add_orig) = match orig {
            Conflict::ThLemma { lits, add } => {
                // add original lemma only if it's not the same as the clause
                let not_eq = lits != out_learnt.as_slice();
                (lits, add && not_eq)
            }
            Conflict::ThProp(_) | Conflict::Bcp(_) => (&[][..], false),
        };
        LearntClause {
            orig_lits,
            add_orig,
            backtrack_lvl: btlevel,
            clause: out_learnt,
        }
    }

    /// An abstraction of the level of a variable.
    #[inline]
    fn abstract_level(&self, v: Var) -> u32 {
        1 << (self.level(v) & 31)
    }

    fn minimize_conflict(&mut self, out_learnt: &mut Vec<Lit>) {
        // Simplify conflict clause:
        self.analyze_toclear.clear();
        self.analyze_toclear.extend_from_slice(&out_learnt);
        let new_size = if self.ccmin_mode == 2 {
            let mut abstract_levels = 0;
            for a in out_learnt[1..].iter() {
                abstract_levels |= self.abstract_level(a.var())
            }

            let mut j = 1;
            for i in 1..out_learnt.len() {
                let lit = out_learnt[i];
                // can eliminate `lit` only if it's redundant *and* not a decision
                if self.reason(lit.var()) == CRef::UNDEF
                    || !self.lit_redundant(lit, abstract_levels)
                {
                    out_learnt[j] = lit;
                    j += 1;
                }
            }
            j
        } else if self.ccmin_mode == 1 {
            let mut j = 1;
            for i in 1..out_learnt.len() {
                let lit = out_learnt[i];
                let x = lit.var();
                let reason = self.reason(x);

                let mut retain = true;
                if reason != CRef::UNDEF && reason != CRef::SPECIAL {
                    retain = false;
                    let c = self.ca.get_ref(reason);
                    for k in 1..c.size() {
                        let v = c[k].var();
                        if !self.seen[v].is_seen() && self.level(v) > 0 {
                            retain = true;
                            break;
                        }
                    }
                }
                if retain {
                    out_learnt[j] = lit;
                    j += 1;
                }
            }
            j
        } else {
            out_learnt.len()
        };

        self.tot_literals += new_size as u64;
        debug_assert!(new_size <= out_learnt.len());
        out_learnt.truncate(new_size);
    }

    /// Specialized analysis procedure to express the final conflict in terms
    /// of assumptions. Calculates the (possibly empty) set of assumptions
    /// that led to the assignment of `p`, and stores the result in
    /// `out_conflict`.
    fn analyze_final<Th: Theory + ?Sized>(&mut self, th: &mut Th, p: Lit, out_conflict: &mut LSet) {
        out_conflict.clear();
        out_conflict.insert(p);
        debug!("analyze_final lit={:?}", p);

        if self.decision_level() == 0 {
            return; // no assumptions
        }

        self.seen[p.var()] = Seen::SOURCE;

        for i in (self.vars.trail_lim[0] as usize..self.vars.trail.len()).rev() {
            let lit = self.vars.trail[i];
            let x = lit.var();
            if self.seen[x].is_seen() {
                let reason = self.reason(x);
                if reason == CRef::UNDEF {
                    debug_assert!(self.level(x) > 0);
                    out_conflict.insert(!lit);
                } else if reason == CRef::SPECIAL {
                    // resolution with the theory propagation reason
                    let expl = th.explain_propagation(lit);
                    for &q in expl {
                        if self.vars.level(q.var()) > 0 {
                            self.seen[q.var()] = Seen::SOURCE;
                        }
                    }
                } else {
                    let c = self.ca.get_ref(reason);
                    for j in 1..c.size() {
                        if self.vars.level(c[j].var()) > 0 {
                            self.seen[c[j].var()] = Seen::SOURCE;
                        }
                    }
                }
                self.seen[x] = Seen::UNDEF;
            }
        }

        self.seen[p.var()] = Seen::UNDEF;
        debug_assert!(self.seen.iter().all(|(_, &s)| s == Seen::UNDEF));
    }

    /// Check whether `p` can be removed from a conflict clause `C`.
    ///
    /// It can be removed from `C` if it is propagation-implied by literals of
    /// level 0 exclusively, or if `C x p.reason` subsumes `C`.
    fn lit_redundant(&mut self, p: Lit, abstract_levels: u32) -> bool {
        self.minimize_stack.clear();
        self.minimize_stack.push(p);

        let top = self.analyze_toclear.len();

        while self.minimize_stack.len() > 0 {
            let q = *self.minimize_stack.last().unwrap();
            let cr = self.reason(q.var());
            debug_assert_ne!(cr, CRef::UNDEF);
            self.minimize_stack.pop();

            // special case: theory propagation
            if cr == CRef::SPECIAL {
                if self.vars.level(q.var()) == 0 {
                    continue; // level 0, just continue
                } else {
                    // bail out; the theory propagation could in principle be
                    // resolved further but we do not chase it here
                    for i in top..self.analyze_toclear.len() {
                        let a = self.analyze_toclear[i];
                        self.seen[a.var()] = Seen::UNDEF;
                    }
                    self.analyze_toclear.resize(top, Lit::UNDEF);
                    return false;
                }
            }

            let c = self.ca.get_ref(cr);
            // `q` comes from some propagation with `c`; check whether these
            // lits can also be eliminated or are already in the learnt clause
            for i in 1..c.size() {
                let l = c[i as u32];
                // Variable at level 0 or previously removable: just skip
                if self.vars.level(l.var()) == 0 || self.seen[l.var()] == Seen::SOURCE {
                    continue;
                }

                if self.reason(l.var()) != CRef::UNDEF
                    && (self.abstract_level(l.var()) & abstract_levels) != 0
                {
                    // keep this literal; it may be resolvable in turn
                    self.seen[l.var()] = Seen::SOURCE;
                    self.minimize_stack.push(l);
                    self.analyze_toclear.push(l);
                } else {
                    // cannot remove `l`, cancel
                    for i in top..self.analyze_toclear.len() {
                        let a = self.analyze_toclear[i];
                        self.seen[a.var()] = Seen::UNDEF;
                    }
                    self.analyze_toclear.resize(top, Lit::UNDEF);
                    return false;
                }
            }
        }

        true
    }

    /// Propagate all enqueued facts.
    ///
    /// If a conflict arises, the conflicting clause is returned, otherwise
    /// `None`. The propagation queue is empty afterwards, even on conflict.
    fn propagate(&mut self) -> Option<CRef> {
        let mut confl = None;
        let mut num_props: u32 = 0;

        while (self.qhead as usize) < self.vars.trail.len() {
            // `p` is the next enqueued fact to propagate.
            let p = self.vars.trail[self.qhead as usize];

            self.qhead += 1;
            let watches_data_ptr: *mut OccListsData<_, _> = &mut self.watches_data;
            let ws = self
                .watches_data
                .lookup_mut_pred(p, &WatcherDeleted { ca: &self.ca });
            let mut i: usize = 0;
            let mut j: usize = 0;
            let end: usize = ws.len();
            num_props += 1;
            'clauses: while i < end {
                // Try to avoid inspecting the clause:
                let blocker = ws[i].blocker;
                if self.vars.value_lit(blocker) == lbool::TRUE {
                    ws[j] = ws[i];
                    j += 1;
                    i += 1;
                    continue;
                }

                // Make sure the false literal is data[1]:
                let cr = ws[i].cref;
                let mut c = self.ca.get_mut(cr);
                let false_lit = !p;
                if c[0] == false_lit {
                    let l1 = c[1];
                    c[0] = l1;
                    c[1] = false_lit;
                }
                debug_assert_eq!(c[1], false_lit);
                i += 1;

                // If 0th watch is true, then clause is already satisfied.
                let first = c[0];
                let w = Watcher::new(cr, first);
                if first != blocker && self.vars.value_lit(first) == lbool::TRUE {
                    ws[j] = w;
                    j += 1;
                    continue;
                }

                // Look for new watch:
                for k in 2..c.size() {
                    if self.vars.value_lit(c[k]) != lbool::FALSE {
                        let lk = c[k];
                        c[1] = lk;
                        c[k] = false_lit;

                        // safe because `!c[1] != p`, so watches are not aliased
                        debug_assert_ne!(!c[1], p);
                        let w1 = !c[1];
                        unsafe { (&mut *watches_data_ptr)[w1].push(w) };
                        continue 'clauses;
                    }
                }

                // Did not find watch -- clause is unit under assignment:
                ws[j] = w;
                j += 1;
                if self.vars.value_lit(first) == lbool::FALSE {
                    confl = Some(cr);
                    self.qhead = self.vars.trail.len() as i32;
                    // Copy the remaining watches:
                    while i < end {
                        ws[j] = ws[i];
                        j += 1;
                        i += 1;
                    }
                } else {
                    self.vars.unchecked_enqueue(first, cr);
                }
            }
            let dummy = Watcher::DUMMY;
            ws.resize(j, dummy);
        }
        self.propagations += num_props as u64;
        self.simp_db_props -= num_props as i64;

        confl
    }

    fn rebuild_order_heap(&mut self) {
        let mut vs = vec![];
        for v in (0..self.num_vars()).map(Var::from_idx) {
            if self.decision[v] && self.value(v) == lbool::UNDEF {
                vs.push(v);
            }
        }
        self.order_heap().build(&vs);
    }

    /// Sort literals of `clause` so that unassigned literals come first,
    /// followed by literals in decreasing assignment level.
    fn sort_clause_lits(&self, clause: &mut [Lit]) {
        clause.sort_unstable_by(|&lit1, &lit2| {
            let has_val1 = self.value_lit(lit1) != lbool::UNDEF;
            let has_val2 = self.value_lit(lit2) != lbool::UNDEF;

            // unassigned variables come first
            if has_val1 && !has_val2 {
                return cmp::Ordering::Greater;
            }
            if !has_val1 && has_val2 {
                return cmp::Ordering::Less;
            }

            let lvl1 = self.level_lit(lit1);
            let lvl2 = self.level_lit(lit2);
            if lvl1 != lvl2 {
                lvl2.cmp(&lvl1) // higher level comes first
            } else {
                lit1.cmp(&lit2) // otherwise default comparison
            }
        });

        // check that the first literal is a proper watch
        debug_assert!(
            self.value_lit(clause[0]) == lbool::UNDEF || {
                let lvl0 = self.level_lit(clause[0]);
                clause[1..].iter().all(|&lit2| self.level_lit(lit2) <= lvl0)
            }
        );
    }

    /// Move clauses to the given allocator, where clause indices might differ.
    fn reloc_all(
        &mut self,
        learnts: &mut Vec<CRef>,
        clauses: &mut Vec<CRef>,
        to: &mut ClauseAllocator,
    ) {
        macro_rules! is_removed {
            ($ca:expr, $cr:expr) => {
                $ca.get_ref($cr).mark() == 1
            };
        }
        // All watchers:
        self.watches().clean_all();
        for v in (0..self.num_vars()).map(Var::from_idx) {
            for s in 0..2 {
                let p = Lit::new(v, s != 0);
                for i in 0..self.watches_data[p].len() {
                    let mut cref = self.watches_data[p][i].cref;
                    self.ca.reloc(&mut cref, to);
                    self.watches_data[p][i].cref = cref;
                }
            }
        }

        // All reasons:
        for i in 0..self.vars.trail.len() {
            let v = self.vars.trail[i].var();

            // Note: it is not safe to call `locked()` on a relocated clause.
            let reason = self.vars.reason(v);
            if reason != CRef::UNDEF && reason != CRef::SPECIAL {
                let cond = {
                    let c = self.ca.get_ref(reason);
                    c.reloced() || self.locked(c)
                };
                if cond {
                    debug_assert!(!is_removed!(self.ca, reason));
                    let mut r = reason;
                    self.ca.reloc(&mut r, to);
                    self.vars.vardata[v].reason = r;
                }
            }
        }

        // All learnt:
        {
            let mut j = 0;
            for i in 0..learnts.len() {
                let mut cr = learnts[i];
                if !is_removed!(self.ca, cr) {
                    self.ca.reloc(&mut cr, to);
                    learnts[j] = cr;
                    j += 1;
                }
            }
            learnts.resize(j, CRef::UNDEF);
        }

        // All original:
        {
            let mut j = 0;
            for i in 0..clauses.len() {
                let mut cr = clauses[i];
                if !is_removed!(self.ca, cr) {
                    self.ca.reloc(&mut cr, to);
                    clauses[j] = cr;
                    j += 1;
                }
            }
            clauses.resize(j, CRef::UNDEF);
        }
    }

    /// Attach a clause to watcher lists.
    fn attach_clause(&mut self, cr: CRef) {
        let (c0, c1, learnt, size) = {
            let c = self.ca.get_ref(cr);
            debug_assert!(c.size() > 1);
            (c[0], c[1], c.learnt(), c.size())
        };
        self.watches()[!c0].push(Watcher::new(cr, c1));
        self.watches()[!c1].push(Watcher::new(cr, c0));
        if learnt {
            self.num_learnts += 1;
            self.learnts_literals += size as u64;
        } else {
            self.num_clauses += 1;
            self.clauses_literals += size as u64;
        }
    }

    /// Revert to the state at the given level (keeping all assignments at
    /// `level` but not beyond).
    fn cancel_until(&mut self, level: u32) {
        debug_assert!(self.decision_level() > level);
        let trail_lim_last = *self.vars.trail_lim.last().expect("trail_lim is empty") as usize;
        let trail_lim_level = self.vars.trail_lim[level as usize] as usize;
        for c in (trail_lim_level..self.vars.trail.len()).rev() {
            let x = self.vars.trail[c].var();
            self.vars.ass[x] = lbool::UNDEF;
            if self.phase_saving > 1 || (self.phase_saving == 1 && c > trail_lim_last) {
                self.polarity[x] = self.vars.trail[c].sign();
            }
            self.insert_var_order(x);
        }
        self.qhead = trail_lim_level as i32;
        self.vars.trail.resize(trail_lim_level, Lit::UNDEF);
        self.th_st.clear();
        self.vars.trail_lim.resize(level as usize, 0);
    }

    /// Detach a clause from watcher lists.
    ///
    /// `strict` means we remove the clause from watchers eagerly, instead
    /// of just marking the watchlist as dirty.
    fn detach_clause(&mut self, cr: CRef, strict: bool) {
        let (c0, c1, csize, clearnt) = {
            let c = self.ca.get_ref(cr);
            (c[0], c[1], c.size(), c.learnt())
        };
        debug_assert!(csize > 1);

        let mut watches = self.watches_data.promote(WatcherDeleted { ca: &self.ca });

        // Strict or lazy detaching:
        if strict {
            let pos = watches[!c0]
                .iter()
                .position(|x| x == &Watcher::new(cr, c1))
                .expect("watcher not found");
            watches[!c0].remove(pos);
            let pos = watches[!c1]
                .iter()
                .position(|x| x == &Watcher::new(cr, c0))
                .expect("watcher not found");
            watches[!c1].remove(pos);
        } else {
            watches.smudge(!c0);
            watches.smudge(!c1);
        }

        if clearnt {
            self.num_learnts -= 1;
            self.learnts_literals -= csize as u64;
        } else {
            self.num_clauses -= 1;
            self.clauses_literals -= csize as u64;
        }
    }

    /// Detach and free a clause.
    fn remove_clause(&mut self, cr: CRef) {
        self.detach_clause(cr, false);
        {
            let c = self.ca.get_ref(cr);
            // Don't leave pointers to freed memory!
            if self.locked(c) {
                let v = c[0].var();
                self.vars.vardata[v].reason = CRef::UNDEF;
            }
        }
        self.ca.get_mut(cr).set_mark(1); // used in reloc
        self.ca.free(cr);
    }

    pub fn satisfied(&self, c: ClauseRef) -> bool {
        c.iter().any(|&lit| self.value_lit(lit) == lbool::TRUE)
    }

    #[inline(always)]
    pub fn decision_level(&self) -> u32 {
        self.vars.decision_level()
    }

    #[inline(always)]
    fn reason(&self, x: Var) -> CRef {
        self.vars.reason(x)
    }

    /// Returns `true` if a clause is a reason for some implication in the
    /// current state.
    fn locked(&self, c: ClauseRef) -> bool {
        let reason = self.reason(c[0].var());
        self.value_lit(c[0]) == lbool::TRUE
            && reason != CRef::UNDEF
            && reason != CRef::SPECIAL
            && self.ca.get_ref(reason) == c
    }

    fn progress_estimate(&self) -> f64 {
        let mut progress = 0.0;
        let f = 1.0 / self.num_vars() as f64;

        for i in 0..self.decision_level() + 1 {
            let beg: i32 = if i == 0 {
                0
            } else {
                self.vars.trail_lim[i as usize - 1]
            };
            let end: i32 = if i == self.decision_level() {
                self.vars.trail.len() as i32
            } else {
                self.vars.trail_lim[i as usize]
            };
            progress += f64::powi(f, i as i32) * (end - beg) as f64;
        }

        progress / self.num_vars() as f64
    }

    fn new(opts: &SolverOpts) -> Self {
        Self {
            vars: VarState::new(opts),
            num_clauses: 0,
            num_learnts: 0,
            clauses_literals: 0,
            learnts_literals: 0,

            clause_decay: opts.clause_decay,
            random_var_freq: opts.random_var_freq,
            random_seed: opts.random_seed,
            luby_restart: opts.luby_restart,
            ccmin_mode: opts.ccmin_mode,
            phase_saving: opts.phase_saving,
            rnd_pol: false,
            rnd_init_act: opts.rnd_init_act,
            garbage_frac: opts.garbage_frac,
            min_learnts_lim: opts.min_learnts_lim,
            restart_first: opts.restart_first,
            restart_inc: opts.restart_inc,

            learntsize_adjust_start_confl: 100,
            learntsize_adjust_inc: 1.5,

            solves: 0,
            starts: 0,
            decisions: 0,
            rnd_decisions: 0,
            propagations: 0,
            conflicts: 0,
            dec_vars: 0,
            max_literals: 0,
            tot_literals: 0,

            learntsize_factor: 1.0 / 3.0,
            learntsize_inc: 1.1,

            polarity: VMap::new(),
            user_pol: VMap::new(),
            decision: VMap::new(),
            priority: VMap::new(),
            watches_data: OccListsData::new(),
            order_heap_data: HeapData::new(),
            ok: true,
            cla_inc: 1.0,
            qhead: 0,
            simp_db_assigns: -1,
            simp_db_props: 0,
            progress_estimate: 0.0,
            remove_satisfied: false,
            next_var: Var::from_idx(0),

            ca: ClauseAllocator::new(),
            assumptions: vec![],

            seen: VMap::new(),
            minimize_stack: vec![],
            analyze_toclear: vec![],
            max_learnts: 0.0,
            learntsize_adjust_confl: 0.0,
            learntsize_adjust_cnt: 0,

            conflict_budget: -1,
            propagation_budget: -1,

            th_st: TheoryState::new(),
        }
    }
}

impl VarState {
    fn new(opts: &SolverOpts) -> Self {
        Self {
            ass: VMap::new(),
            vardata: VMap::new(),
            activity: VMap::new(),
            var_inc: 1.0,
            var_decay: opts.var_decay,
            trail: vec![],
            trail_lim: vec![],
        }
    }

    #[inline(always)]
    pub fn num_assigns(&self) -> u32 {
        self.trail.len() as u32
    }

    /// Begins a new decision level.
    fn new_decision_level(&mut self) {
        let lvl = self.trail.len() as i32;
        self.trail_lim.push(lvl);
    }

    fn proved_at_lvl_0(&self) -> &[Lit] {
        // find where the end of the level-0 part of the trail is
        let end = self
            .trail_lim
            .get(0)
            .map_or(self.trail.len(), |&x| x as usize);
        &self.trail[..end]
    }

    #[inline(always)]
    pub fn value(&self, x: Var) -> lbool {
        self.ass[x]
    }

    #[inline(always)]
    fn value_lit(&self, x: Lit) -> lbool {
        self.ass[x.var()] ^ !x.sign()
    }

    #[inline(always)]
    fn level(&self, x: Var) -> i32 {
        self.vardata[x].level
    }

    #[inline(always)]
    fn reason(&self, x: Var) -> CRef {
        self.vardata[x].reason
    }

    fn var_decay_activity(&mut self) {
        self.var_inc *= 1.0 / self.var_decay;
    }

    #[inline(always)]
    pub fn decision_level(&self) -> u32 {
        self.trail_lim.len() as u32
    }

    fn unchecked_enqueue(&mut self, p: Lit, from: CRef) {
        debug_assert_eq!(
            self.value_lit(p),
            lbool::UNDEF,
            "lit {:?} should be undef",
            p
        );
        self.ass[p.var()] = lbool::new(p.sign());
        self.vardata[p.var()] = VarData::new(from, self.decision_level() as i32);
        self.trail.push(p);
    }

    /// Increase a variable with the current 'bump' value.
    fn var_bump_activity(
        &mut self,
        order_heap_data: &mut HeapData<Var>,
        priority: &VMap<i32>,
        v: Var,
    ) {
        self.activity[v] += self.var_inc;
        if self.activity[v] > 1e100 {
            // Rescale:
            for (_, x) in self.activity.iter_mut() {
                *x *= 1e-100;
            }
            self.var_inc *= 1e-100;
        }

        // Update order_heap with respect to the new activity:
        let mut order_heap = order_heap_data.promote(VarOrder {
            activity: &self.activity,
            priority,
        });
        if order_heap.in_heap(v) {
            order_heap.decrease(v);
        }
    }
}

impl<'a> TheoryArg<'a> {
    /// `false` once a conflict was raised during this check.
    #[inline]
    pub fn is_ok(&self) -> bool {
        match self.conflict {
            TheoryConflict::Nil => true,
            TheoryConflict::Prop(_) | TheoryConflict::Clause { .. } => false,
        }
    }

    /// Value of the given var in the current partial model.
    #[inline(always)]
    pub fn value(&self, v: Var) -> lbool {
        self.s.vars.value(v)
    }

    /// Value of the given literal in the current partial model.
    #[inline(always)]
    pub fn value_lit(&self, l: Lit) -> lbool {
        self.s.vars.value_lit(l)
    }

    /// Current (possibly partial) model: the whole trail, in assignment order.
    #[inline(always)]
    pub fn model(&self) -> &[Lit] {
        &self.s.vars.trail
    }

    /// Allocate a new literal.
    pub fn mk_new_lit(&mut self) -> Lit {
        let v = self.s.new_var(lbool::FALSE, true);
        Lit::new(v, true)
    }

    /// Push a theory lemma into the solver. Useful for lemma-on-demand or
    /// theory splitting, but can be relatively costly.
    pub fn add_theory_lemma(&mut self, c: &[Lit]) {
        if self.is_ok() {
            self.s.th_st.push_lemma(c)
        }
    }

    /// Propagate the literal `p`, which is theory-implied by the current
    /// trail.
    ///
    /// This adds `p` to the trail with a lazy reason; the theory must be
    /// ready to provide an explanation via `explain_propagation(p)` if asked
    /// to during conflict resolution.
    ///
    /// Returns `true` if propagation succeeded (or did nothing), `false` if
    /// the propagation results in an immediate conflict; in that case the
    /// theory should return as early as reasonably possible.
    pub fn propagate(&mut self, p: Lit) -> bool {
        if !self.is_ok() {
            return false;
        }
        let v_p = self.s.vars.value_lit(p);
        if v_p == lbool::TRUE {
            true
        } else if v_p == lbool::UNDEF {
            // propagate on the fly
            self.has_propagated = true;
            let cr = CRef::SPECIAL; // indicates a theory propagation
            self.s.vars.unchecked_enqueue(p, cr);
            true
        } else {
            debug_assert_eq!(v_p, lbool::FALSE);
            // conflict
            self.conflict = TheoryConflict::Prop(p);
            false
        }
    }

    /// Add a conflict clause.
    ///
    /// This should be used in the theory when the current partial model is
    /// unsatisfiable. It will force the SAT solver to backtrack. All
    /// propagations added with `propagate` during this session are discarded.
    ///
    /// ## Params
    /// - `lits`: a clause that is a tautology of the theory (a lemma) and
    ///   that is false in the current (partial) model.
    /// - `costly`: hint that the lemma was costly to produce, and the solver
    ///   should keep it along with the learnt clause.
    pub fn raise_conflict(&mut self, lits: &[Lit], costly: bool) {
        if lits.len() == 0 {
            panic!("conflicts must have at least one literal")
        }
        if self.is_ok() {
            self.conflict = TheoryConflict::Clause { costly };
            self.lits.clear();
            self.lits.extend_from_slice(lits);
        }
    }
}

#[derive(Debug)]
enum ClauseSetSelect {
    Original,
    Learnt,
}

#[derive(Debug, Clone, Copy)]
struct VarData {
    reason: CRef,
    level: i32,
}

#[derive(Debug, Clone, Copy)]
struct Watcher {
    cref: CRef,
    blocker: Lit,
}

struct VarOrder<'a> {
    activity: &'a VMap<f64>,
    priority: &'a VMap<i32>,
}

/// Predicate to test whether a clause has been removed from some lit's watchlist.
struct WatcherDeleted<'a> {
    ca: &'a ClauseAllocator,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
enum Seen {
    UNDEF,
    SOURCE,
    REMOVABLE,
}

mod utils {
    /// Finite subsequences of the Luby-sequence:
    ///
    /// > 0: 1
    /// > 1: 1 1 2
    /// > 2: 1 1 2 1 1 2 4
    /// > 3: 1 1 2 1 1 2 4 1 1 2 1 1 2 4 8
    pub(super) fn luby(y: f64, mut x: i32) -> f64 {
        // Find the finite subsequence that contains index 'x', and the
        // size of that subsequence:
        let mut size = 1;
        let mut seq = 0;
        while size < x + 1 {
            seq += 1;
            size = 2 * size + 1;
        }

        while size - 1 != x {
            size = (size - 1) >> 1;
            seq -= 1;
            x = x % size;
        }

        f64::powi(y, seq)
    }

    /// Generate a random double:
    pub(super) fn drand(seed: &mut f64) -> f64 {
        *seed *= 1389796.0;
        let q = (*seed / 2147483647.0) as i32;
        *seed -= q as f64 * 2147483647.0;
        *seed / 2147483647.0
    }

    /// Generate a random integer:
    pub(super) fn irand(seed: &mut f64, size: i32) -> i32 {
        (drand(seed) * size as f64) as i32
    }
}

impl Default for VarData {
    fn default() -> Self {
        Self {
            reason: CRef::UNDEF,
            level: 0,
        }
    }
}

impl VarData {
    #[inline(always)]
    pub(super) fn new(reason: CRef, level: i32) -> Self {
        Self { reason, level }
    }
}

impl PartialEq for Watcher {
    #[inline(always)]
    fn eq(&self, rhs: &Self) -> bool {
        self.cref == rhs.cref
    }
}
impl Eq for Watcher {}

impl<'a> Comparator<Var> for VarOrder<'a> {
    fn cmp(&self, lhs: &Var, rhs: &Var) -> cmp::Ordering {
        // higher priority first, then higher activity first
        self.priority[*rhs].cmp(&self.priority[*lhs]).then(
            PartialOrd::partial_cmp(&self.activity[*rhs], &self.activity[*lhs])
                .expect("NaN activity"),
        )
    }
}

impl<'a> DeletePred<Watcher> for WatcherDeleted<'a> {
    #[inline]
    fn deleted(&self, w: &Watcher) -> bool {
        self.ca.get_ref(w.cref).mark() == 1
    }
}

impl Default for Seen {
    #[inline]
    fn default() -> Self {
        Seen::UNDEF
    }
}

impl Seen {
    #[inline(always)]
    fn is_seen(&self) -> bool {
        *self != Seen::UNDEF
    }
}

impl Watcher {
    const DUMMY: Watcher = Watcher {
        cref: CRef::UNDEF,
        blocker: Lit::UNDEF,
    };
    fn new(cref: CRef, blocker: Lit) -> Self {
        Self { cref, blocker }
    }
}

/// User-settable solver options, checked at construction.
pub struct SolverOpts {
    pub var_decay: f64,
    pub clause_decay: f64,
    pub random_var_freq: f64,
    pub random_seed: f64,
    pub ccmin_mode: i32,
    pub phase_saving: i32,
    pub rnd_init_act: bool,
    pub luby_restart: bool,
    pub restart_first: i32,
    pub restart_inc: f64,
    pub garbage_frac: f64,
    pub min_learnts_lim: i32,
}

impl Default for SolverOpts {
    fn default() -> SolverOpts {
        Self {
            var_decay: 0.95,
            clause_decay: 0.999,
            random_var_freq: 0.0,
            random_seed: 91648253.0,
            ccmin_mode: 2,
            phase_saving: 2,
            rnd_init_act: false,
            luby_restart: true,
            restart_first: 100,
            restart_inc: 2.0,
            garbage_frac: 0.20,
            min_learnts_lim: 0,
        }
    }
}

impl SolverOpts {
    /// Check that options are valid.
    pub fn check(&self) -> bool {
        (0.0 < self.var_decay && self.var_decay < 1.0)
            && (0.0 < self.clause_decay && self.clause_decay < 1.0)
            && (0.0 <= self.random_var_freq && self.random_var_freq <= 1.0)
            && (0.0 < self.random_seed && self.random_seed < std::f64::INFINITY)
            && (0 <= self.ccmin_mode && self.ccmin_mode <= 2)
            && (0 <= self.phase_saving && self.phase_saving <= 2)
            && 1 <= self.restart_first
            && (1.0 < self.restart_inc && self.restart_inc < std::f64::INFINITY)
            && (0.0 < self.garbage_frac && self.garbage_frac < std::f64::INFINITY)
            && 0 <= self.min_learnts_lim
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::callbacks::Basic;
    use crate::theory::EmptyTheory;

    fn mk_solver() -> Solver<Basic> {
        Solver::new(SolverOpts::default(), Basic::new())
    }

    #[test]
    fn test_trivial_sat() {
        let mut s = mk_solver();
        let mut th = EmptyTheory::new();
        // no vars, no clauses => SAT with empty model
        assert_eq!(s.solve_limited_th(&mut th, &[]), lbool::TRUE);
        assert_eq!(s.get_model().len(), 0);
    }

    #[test]
    fn test_unit_propagation() {
        let mut s = mk_solver();
        let mut th = EmptyTheory::new();
        let a = Lit::new(s.new_var_default(), true);
        let b = Lit::new(s.new_var_default(), true);
        assert!(s.add_clause_reuse(&mut vec![a]));
        assert!(s.add_clause_reuse(&mut vec![!a, b]));
        assert_eq!(s.solve_limited_th(&mut th, &[]), lbool::TRUE);
        assert_eq!(s.value_lit(a), lbool::TRUE);
        assert_eq!(s.value_lit(b), lbool::TRUE);
    }

    #[test]
    fn test_empty_clause_unsat() {
        let mut s = mk_solver();
        let mut th = EmptyTheory::new();
        let a = Lit::new(s.new_var_default(), true);
        assert!(s.add_clause_reuse(&mut vec![a]));
        // adding the negation produces an immediate top-level conflict
        assert!(!s.add_clause_reuse(&mut vec![!a]));
        assert!(!s.is_ok());
        assert_eq!(s.solve_limited_th(&mut th, &[]), lbool::FALSE);
    }

    #[test]
    fn test_assumption_conflict_set() {
        let mut s = mk_solver();
        let mut th = EmptyTheory::new();
        let x1 = Lit::new(s.new_var_default(), true);
        let x2 = Lit::new(s.new_var_default(), true);
        assert!(s.add_clause_reuse(&mut vec![x1, x2]));
        assert!(s.add_clause_reuse(&mut vec![!x1, x2]));
        assert!(s.add_clause_reuse(&mut vec![!x2]));
        // UNSAT without assumptions: the conflict set stays empty
        assert_eq!(s.solve_limited_th(&mut th, &[]), lbool::FALSE);
        assert_eq!(s.unsat_core().len(), 0);
    }

    #[test]
    fn test_unsat_core_under_assumptions() {
        let mut s = mk_solver();
        let mut th = EmptyTheory::new();
        let a = Lit::new(s.new_var_default(), true);
        let b = Lit::new(s.new_var_default(), true);
        assert!(s.add_clause_reuse(&mut vec![!a, !b]));
        assert_eq!(s.solve_limited_th(&mut th, &[a, b]), lbool::FALSE);
        let core = s.unsat_core();
        assert!(core.len() >= 1 && core.len() <= 2);
        // solving with the negated core as assumptions must still be UNSAT
        let core: Vec<Lit> = core.iter().map(|&l| !l).collect();
        assert_eq!(s.solve_limited_th(&mut th, &core), lbool::FALSE);
    }

    #[test]
    fn test_budget_exhaustion_unknown() {
        let mut s = mk_solver();
        let mut th = EmptyTheory::new();
        let a = Lit::new(s.new_var_default(), true);
        let b = Lit::new(s.new_var_default(), true);
        s.add_clause_reuse(&mut vec![a, b]);
        s.set_conf_budget(0);
        assert_eq!(s.solve_limited_th(&mut th, &[]), lbool::UNDEF);
        s.budget_off();
        assert_eq!(s.solve_limited_th(&mut th, &[]), lbool::TRUE);
    }
}
