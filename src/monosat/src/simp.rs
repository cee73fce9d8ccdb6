//! A thin preprocessing wrapper over the core solver.
//!
//! Tracks which variables are frozen (referenced by theories or exposed by
//! name, and therefore never eligible for elimination) and which have been
//! eliminated. Eliminated variables can never be reintroduced: no clause
//! containing one may be added.

use crate::callbacks::Callbacks;
use crate::clause::{lbool, Lit, VMapBool, Var};
use crate::core::{Solver, SolverOpts};
use crate::theory::Theory;
use std::ops;

pub struct SimpSolver<Cb: Callbacks> {
    base: Solver<Cb>,
    frozen: VMapBool,
    eliminated: VMapBool,
    use_simplification: bool,
}

impl<Cb: Callbacks> ops::Deref for SimpSolver<Cb> {
    type Target = Solver<Cb>;
    fn deref(&self) -> &Self::Target {
        &self.base
    }
}
impl<Cb: Callbacks> ops::DerefMut for SimpSolver<Cb> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.base
    }
}

impl<Cb: Callbacks> SimpSolver<Cb> {
    pub fn new(opts: SolverOpts, cb: Cb) -> Self {
        Self {
            base: Solver::new(opts, cb),
            frozen: VMapBool::new(),
            eliminated: VMapBool::new(),
            use_simplification: true,
        }
    }

    pub fn new_var(&mut self, upol: lbool, dvar: bool) -> Var {
        let v = self.base.new_var(upol, dvar);
        self.frozen.reserve(v);
        self.eliminated.reserve(v);
        v
    }

    pub fn new_var_default(&mut self) -> Var {
        self.new_var(lbool::UNDEF, true)
    }

    pub fn var_of_int(&mut self, v_idx: u32) -> Var {
        while v_idx >= self.base.num_vars() {
            self.new_var_default();
        }
        Var::from_idx(v_idx)
    }

    /// Protect `v` against elimination. Returns `false` if `v` has already
    /// been eliminated, in which case it cannot be reintroduced.
    pub fn set_frozen(&mut self, v: Var, frozen: bool) -> bool {
        if self.is_eliminated(v) {
            return false;
        }
        self.frozen.reserve(v);
        self.frozen.set(v, frozen);
        true
    }

    pub fn is_frozen(&self, v: Var) -> bool {
        self.frozen.has(v) && self.frozen[v]
    }

    pub fn is_eliminated(&self, v: Var) -> bool {
        self.eliminated.has(v) && self.eliminated[v]
    }

    /// Permanently disable preprocessing.
    pub fn disable_preprocessing(&mut self) {
        self.use_simplification = false;
    }

    pub fn preprocessing_enabled(&self) -> bool {
        self.use_simplification
    }

    /// Run the preprocessor at level 0. This must be called at every solve
    /// entry, even when variable elimination is disabled, so that the clause
    /// database is simplified against the top-level assignment.
    pub fn preprocess<Th: Theory + ?Sized>(&mut self, th: &mut Th) -> bool {
        debug_assert_eq!(self.base.decision_level(), 0);
        if !self.base.is_ok() {
            return false;
        }
        self.base.simplify_th(th)
    }

    pub fn add_clause_reuse(&mut self, clause: &mut Vec<Lit>) -> bool {
        debug_assert!(
            clause.iter().all(|l| !self.is_eliminated(l.var())),
            "adding a clause over an eliminated variable"
        );
        self.base.add_clause_reuse(clause)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::callbacks::Basic;

    #[test]
    fn test_freeze() {
        let mut s: SimpSolver<Basic> = SimpSolver::new(SolverOpts::default(), Basic::new());
        let v = s.new_var_default();
        assert!(!s.is_frozen(v));
        assert!(s.set_frozen(v, true));
        assert!(s.is_frozen(v));
        assert!(s.set_frozen(v, false));
        assert!(!s.is_frozen(v));
    }
}
