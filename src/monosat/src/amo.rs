//! An at-most-one constraint implemented as a theory propagator: once one
//! member variable is assigned true, all other members are propagated false;
//! two true members raise a conflict.

use crate::clause::{lbool, Lit, VMap, Var};
use crate::core::TheoryArg;
use crate::theory::Theory;
use fnv::FnvHashMap;
use std::any::Any;

#[derive(Clone, Copy)]
struct LevelMark {
    head: usize,
    trues_len: usize,
}

pub struct AmoTheory {
    tid: usize,
    members: Vec<Var>,
    /// Members the registry could assign to this theory; only those may be
    /// eagerly propagated (the constraint itself is still enforced for all
    /// members through conflicts).
    propagatable: Vec<bool>,
    member_idx: VMap<i32>,
    head: usize,
    level_marks: Vec<LevelMark>,
    /// Member literals assigned true, in trail order.
    trues: Vec<Lit>,
    expl_map: FnvHashMap<Lit, Vec<Lit>>,
    expl: Vec<Lit>,
    incoming: Vec<Lit>,
}

impl AmoTheory {
    pub fn new(tid: usize) -> Self {
        Self {
            tid,
            members: vec![],
            propagatable: vec![],
            member_idx: VMap::new(),
            head: 0,
            level_marks: vec![],
            trues: vec![],
            expl_map: FnvHashMap::default(),
            expl: vec![],
            incoming: vec![],
        }
    }

    pub fn theory_index(&self) -> usize {
        self.tid
    }

    /// Add a member variable. `propagatable` records whether this theory owns
    /// the variable for explanation dispatch.
    pub fn add_var(&mut self, v: Var, propagatable: bool) {
        debug_assert!(!matches!(self.member_idx.get(v), Some(&i) if i >= 0));
        self.member_idx.insert(v, self.members.len() as i32, -1);
        self.members.push(v);
        self.propagatable.push(propagatable);
    }

    pub fn n_members(&self) -> usize {
        self.members.len()
    }

    fn is_member(&self, v: Var) -> bool {
        matches!(self.member_idx.get(v), Some(&i) if i >= 0)
    }

    fn check(&mut self, acts: &mut TheoryArg) {
        self.incoming.clear();
        {
            let model = acts.model();
            if self.head > model.len() {
                self.head = 0;
            }
            self.incoming.extend_from_slice(&model[self.head..]);
            self.head = model.len();
        }
        for i in 0..self.incoming.len() {
            let l = self.incoming[i];
            if !l.sign() || !self.is_member(l.var()) {
                continue;
            }
            self.trues.push(l);
            if self.trues.len() >= 2 {
                let c = [!self.trues[0], !self.trues[1]];
                acts.raise_conflict(&c, false);
                return;
            }
        }
        if self.trues.len() == 1 {
            let witness = self.trues[0];
            for m in 0..self.members.len() {
                let v = self.members[m];
                if v == witness.var() || !self.propagatable[m] {
                    continue;
                }
                if acts.value(v) == lbool::UNDEF {
                    let p = Lit::new(v, false);
                    self.expl_map.insert(p, vec![witness]);
                    if !acts.propagate(p) {
                        return;
                    }
                }
            }
        }
    }
}

impl Theory for AmoTheory {
    fn partial_check(&mut self, acts: &mut TheoryArg) {
        self.check(acts)
    }

    fn final_check(&mut self, acts: &mut TheoryArg) {
        self.check(acts)
    }

    fn create_level(&mut self) {
        self.level_marks.push(LevelMark {
            head: self.head,
            trues_len: self.trues.len(),
        });
    }

    fn pop_levels(&mut self, n: usize) {
        debug_assert!(self.level_marks.len() >= n);
        let target = self.level_marks.len() - n;
        let mark = self.level_marks[target];
        self.trues.truncate(mark.trues_len);
        self.head = mark.head;
        self.level_marks.truncate(target);
    }

    fn n_levels(&self) -> usize {
        self.level_marks.len()
    }

    fn explain_propagation(&mut self, p: Lit) -> &[Lit] {
        let expl = self
            .expl_map
            .get(&p)
            .expect("amo: no explanation recorded for propagated literal");
        self.expl.clear();
        self.expl.extend_from_slice(expl);
        &self.expl
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
