//! The theory propagator interface and the registry that routes solver
//! callbacks to the registered theories.

use crate::clause::{Lit, VMap, Var};
use crate::core::TheoryArg;
use std::any::Any;

/// A theory propagator, cooperating with the CDCL engine.
///
/// The solver consults every theory at each propagation fixpoint
/// (`partial_check`) and once a full assignment is reached (`final_check`).
/// A theory may enqueue propagations with a lazy reason, push lemmas, or
/// raise a conflict clause through the [`TheoryArg`].
///
/// Invariant: after `pop_levels`, the theory's incremental state must be
/// exactly the state it held at that level; theory state is a pure function
/// of the current assignment prefix.
pub trait Theory: 'static {
    /// Check the full model candidate thoroughly.
    ///
    /// If the model is not satisfiable in the theory, this *must* call
    /// `acts.raise_conflict` with a valid lemma that is falsified by the
    /// current trail.
    fn final_check(&mut self, acts: &mut TheoryArg);

    /// Push a new backtracking level.
    fn create_level(&mut self);

    /// Pop `n` levels from the stack.
    fn pop_levels(&mut self, n: usize);

    /// Number of levels currently pushed.
    fn n_levels(&self) -> usize;

    /// Check the partial model (best effort).
    ///
    /// The whole partial model so far is `acts.model()`; the theory may
    /// remember the length of the previous slice and only look at
    /// `acts.model()[prev_len..]` for the new literals.
    ///
    /// This is allowed to not raise a conflict even if the partial model is
    /// invalid, if the theory deems it too costly to verify. The model will
    /// be checked again in `final_check`.
    fn partial_check(&mut self, _acts: &mut TheoryArg) {}

    /// If the theory uses `TheoryArg::propagate`, it must implement this
    /// function to explain the propagations.
    ///
    /// `p` is a literal propagated by this theory in a prefix of the current
    /// trail; the returned literals are all true in that prefix and imply `p`.
    fn explain_propagation(&mut self, _p: Lit) -> &[Lit];

    /// The solver accepted the full model the theory last staged in
    /// `final_check`; make it current for witness queries. Witness state
    /// staged by later, rejected candidates must not leak into queries.
    fn commit_model(&mut self) {}

    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// Trivial theory that does nothing.
pub struct EmptyTheory(usize);

impl EmptyTheory {
    pub fn new() -> Self {
        EmptyTheory(0)
    }
}

impl Default for EmptyTheory {
    fn default() -> Self {
        EmptyTheory::new()
    }
}

impl Theory for EmptyTheory {
    fn final_check(&mut self, _: &mut TheoryArg) {}
    fn create_level(&mut self) {
        self.0 += 1
    }
    fn pop_levels(&mut self, n: usize) {
        debug_assert!(self.0 >= n);
        self.0 -= n
    }
    fn n_levels(&self) -> usize {
        self.0
    }
    fn explain_propagation(&mut self, _p: Lit) -> &[Lit] {
        unreachable!()
    }
    fn as_any(&self) -> &dyn Any {
        self
    }
    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

const NO_OWNER: i32 = -1;

/// Routes solver callbacks to a set of theory propagators.
///
/// Each theory gets a stable index when added. Every literal a theory owns
/// (its atoms) is registered here so explanations can be dispatched to the
/// owner in O(1). Backtracking notifications are broadcast; propagation
/// checks run over the theories in index order, which is deterministic and
/// order-insensitive because each theory's propagations are implied by the
/// shared trail prefix alone.
pub struct TheoryRegistry {
    theories: Vec<Box<dyn Theory>>,
    owner: VMap<i32>,
    levels: usize,
}

impl TheoryRegistry {
    pub fn new() -> Self {
        Self {
            theories: vec![],
            owner: VMap::new(),
            levels: 0,
        }
    }

    /// Register a theory, returning its stable index.
    pub fn add_theory(&mut self, mut th: Box<dyn Theory>) -> usize {
        // late-registered theories catch up with the current level count
        for _ in 0..self.levels {
            th.create_level();
        }
        self.theories.push(th);
        self.theories.len() - 1
    }

    pub fn len(&self) -> usize {
        self.theories.len()
    }

    pub fn get(&self, idx: usize) -> &dyn Theory {
        &*self.theories[idx]
    }

    pub fn get_mut(&mut self, idx: usize) -> &mut dyn Theory {
        &mut *self.theories[idx]
    }

    /// Downcast the theory at `idx` to a concrete type.
    pub fn theory_ref<T: Theory>(&self, idx: usize) -> Option<&T> {
        self.theories[idx].as_any().downcast_ref::<T>()
    }

    /// Downcast the theory at `idx` to a concrete type, mutably.
    pub fn theory_mut<T: Theory>(&mut self, idx: usize) -> Option<&mut T> {
        self.theories[idx].as_any_mut().downcast_mut::<T>()
    }

    /// Record that variable `v` is an atom of theory `tid`.
    pub fn set_owner(&mut self, v: Var, tid: usize) {
        debug_assert!(tid < self.theories.len());
        self.owner.insert(v, tid as i32, NO_OWNER);
    }

    /// The theory owning variable `v`, if any.
    pub fn owner(&self, v: Var) -> Option<usize> {
        match self.owner.get(v) {
            Some(&t) if t != NO_OWNER => Some(t as usize),
            _ => None,
        }
    }
}

impl Default for TheoryRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl Theory for TheoryRegistry {
    fn final_check(&mut self, acts: &mut TheoryArg) {
        for th in self.theories.iter_mut() {
            th.final_check(acts);
            if !acts.is_ok() {
                return;
            }
        }
    }

    fn partial_check(&mut self, acts: &mut TheoryArg) {
        for th in self.theories.iter_mut() {
            th.partial_check(acts);
            if !acts.is_ok() {
                return;
            }
        }
    }

    fn create_level(&mut self) {
        self.levels += 1;
        for th in self.theories.iter_mut() {
            th.create_level();
        }
    }

    fn pop_levels(&mut self, n: usize) {
        debug_assert!(self.levels >= n);
        self.levels -= n;
        for th in self.theories.iter_mut() {
            th.pop_levels(n);
        }
    }

    fn n_levels(&self) -> usize {
        self.levels
    }

    fn explain_propagation(&mut self, p: Lit) -> &[Lit] {
        let tid = match self.owner.get(p.var()) {
            Some(&t) if t != NO_OWNER => t as usize,
            _ => panic!("explain_propagation: literal {:?} has no owning theory", p),
        };
        self.theories[tid].explain_propagation(p)
    }

    fn commit_model(&mut self) {
        for th in self.theories.iter_mut() {
            th.commit_model();
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_registry_levels() {
        let mut reg = TheoryRegistry::new();
        reg.add_theory(Box::new(EmptyTheory::new()));
        reg.create_level();
        reg.create_level();
        // a theory added later catches up with the current level count
        let t2 = reg.add_theory(Box::new(EmptyTheory::new()));
        assert_eq!(reg.get(t2).n_levels(), 2);
        reg.pop_levels(1);
        assert_eq!(reg.n_levels(), 1);
        assert_eq!(reg.get(0).n_levels(), 1);
        assert_eq!(reg.get(t2).n_levels(), 1);
    }

    #[test]
    fn test_owner_lookup() {
        let mut reg = TheoryRegistry::new();
        let t = reg.add_theory(Box::new(EmptyTheory::new()));
        let v = Var::from_idx(3);
        assert_eq!(reg.owner(v), None);
        reg.set_owner(v, t);
        assert_eq!(reg.owner(v), Some(t));
        assert_eq!(reg.owner(Var::from_idx(1)), None);
    }
}
