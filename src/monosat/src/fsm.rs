//! The finite-state-machine theory: acceptance atoms over transition-enable
//! literals.
//!
//! Acceptance is a positive monotone predicate in the transitions, so the
//! same two-sided scheme as the graph theory applies: an accept atom is
//! forced true when the enabled transitions alone accept the string, and
//! forced false when even the possible transitions (enabled plus undecided)
//! do not. Runs are searched by BFS over the (state, position) product;
//! transitions with input label 0 are epsilon moves.

use crate::clause::{lbool, Lit, VMap, Var};
use crate::core::TheoryArg;
use crate::errors::{Error, Result};
use crate::theory::Theory;
use fnv::FnvHashMap;
use std::any::Any;
use std::collections::VecDeque;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TState {
    Undef,
    Enabled,
    Disabled,
}

#[derive(Debug, Clone, Copy)]
struct Transition {
    fsm: usize,
    from: usize,
    to: usize,
    in_label: u32,
    out_label: u32,
    var: Var,
}

struct Fsm {
    in_alphabet: u32,
    out_alphabet: u32,
    n_states: usize,
    transitions: Vec<usize>, // global transition ids
}

#[derive(Debug, Clone, Copy)]
struct AcceptAtom {
    fsm: usize,
    start: usize,
    accept: usize,
    string: usize,
    lit: Lit,
}

#[derive(Clone, Copy)]
struct LevelMark {
    head: usize,
    undo_len: usize,
}

pub struct FsmTheory {
    tid: usize,
    fsms: Vec<Fsm>,
    transitions: Vec<Transition>,
    transition_of_var: VMap<i32>,
    state: Vec<TState>,
    strings: Vec<Vec<u32>>,
    atoms: Vec<AcceptAtom>,
    atom_of_var: VMap<i32>,
    head: usize,
    level_marks: Vec<LevelMark>,
    undo: Vec<usize>,
    dirty: bool,
    incoming: Vec<Lit>,
    expl_map: FnvHashMap<Lit, Vec<Lit>>,
    expl: Vec<Lit>,
}

impl FsmTheory {
    pub fn new(tid: usize) -> Self {
        Self {
            tid,
            fsms: vec![],
            transitions: vec![],
            transition_of_var: VMap::new(),
            state: vec![],
            strings: vec![],
            atoms: vec![],
            atom_of_var: VMap::new(),
            head: 0,
            level_marks: vec![],
            undo: vec![],
            dirty: true,
            incoming: vec![],
            expl_map: FnvHashMap::default(),
            expl: vec![],
        }
    }

    pub fn theory_index(&self) -> usize {
        self.tid
    }

    pub fn new_fsm(&mut self, in_alphabet: u32, out_alphabet: u32) -> usize {
        self.fsms.push(Fsm {
            in_alphabet,
            out_alphabet,
            n_states: 0,
            transitions: vec![],
        });
        self.fsms.len() - 1
    }

    pub fn n_fsms(&self) -> usize {
        self.fsms.len()
    }

    fn check_fsm(&self, fsm: usize) -> Result<()> {
        if fsm < self.fsms.len() {
            Ok(())
        } else {
            Err(Error::domain(format!("fsm {} does not exist", fsm)))
        }
    }

    pub fn new_state(&mut self, fsm: usize) -> Result<usize> {
        self.check_fsm(fsm)?;
        self.fsms[fsm].n_states += 1;
        Ok(self.fsms[fsm].n_states - 1)
    }

    /// A transition controlled by (the positive literal of) `var`.
    pub fn new_transition(
        &mut self,
        fsm: usize,
        from: usize,
        to: usize,
        in_label: u32,
        out_label: u32,
        var: Var,
    ) -> Result<usize> {
        self.check_fsm(fsm)?;
        let f = &self.fsms[fsm];
        if from >= f.n_states || to >= f.n_states {
            return Err(Error::domain(format!(
                "state does not exist in fsm {}",
                fsm
            )));
        }
        if in_label > f.in_alphabet || out_label > f.out_alphabet {
            return Err(Error::domain(format!(
                "label out of alphabet range in fsm {}",
                fsm
            )));
        }
        let t = self.transitions.len();
        self.transitions.push(Transition {
            fsm,
            from,
            to,
            in_label,
            out_label,
            var,
        });
        self.state.push(TState::Undef);
        self.fsms[fsm].transitions.push(t);
        self.transition_of_var.insert(var, t as i32, -1);
        self.dirty = true;
        Ok(t)
    }

    /// Strings consist of positive labels.
    pub fn new_string(&mut self, labels: Vec<u32>) -> Result<usize> {
        for (i, &l) in labels.iter().enumerate() {
            if l == 0 {
                return Err(Error::domain(format!(
                    "strings must consist of positive integers, found 0 at position {} in string {}",
                    i,
                    self.strings.len()
                )));
            }
        }
        self.strings.push(labels);
        Ok(self.strings.len() - 1)
    }

    pub fn n_strings(&self) -> usize {
        self.strings.len()
    }

    /// The acceptance atom: the machine accepts `string` from `start` at
    /// `accept` over the enabled transitions.
    pub fn accept_atom(
        &mut self,
        fsm: usize,
        start: usize,
        accept: usize,
        string: usize,
        var: Var,
    ) -> Result<Lit> {
        self.check_fsm(fsm)?;
        if string >= self.strings.len() {
            return Err(Error::domain(format!("string {} does not exist", string)));
        }
        let f = &self.fsms[fsm];
        if start >= f.n_states || accept >= f.n_states {
            return Err(Error::domain(format!(
                "state does not exist in fsm {}",
                fsm
            )));
        }
        let lit = Lit::new(var, true);
        let idx = self.atoms.len();
        self.atoms.push(AcceptAtom {
            fsm,
            start,
            accept,
            string,
            lit,
        });
        self.atom_of_var.insert(var, idx as i32, -1);
        self.dirty = true;
        Ok(lit)
    }

    fn present(&self, t: usize, over: bool) -> bool {
        match self.state[t] {
            TState::Enabled => true,
            TState::Undef => over,
            TState::Disabled => false,
        }
    }

    /// BFS over the (state, consumed-prefix) product. Returns the accepting
    /// run's transitions, or the reachable product states for cut building.
    fn run_product(
        &self,
        atom: &AcceptAtom,
        over: bool,
    ) -> (Option<Vec<usize>>, Vec<Vec<bool>>) {
        let f = &self.fsms[atom.fsm];
        let s = &self.strings[atom.string];
        let n = f.n_states;
        let len = s.len();
        let mut seen = vec![vec![false; len + 1]; n];
        let mut parent: Vec<Vec<Option<(usize, usize, usize)>>> = vec![vec![None; len + 1]; n];
        let mut queue = VecDeque::new();
        seen[atom.start][0] = true;
        queue.push_back((atom.start, 0usize));
        let mut goal: Option<(usize, usize)> = None;
        'bfs: while let Some((u, pos)) = queue.pop_front() {
            for &t in &f.transitions {
                let tr = self.transitions[t];
                if tr.from != u || !self.present(t, over) {
                    continue;
                }
                let next = if tr.in_label == 0 {
                    Some(pos) // epsilon move
                } else if pos < len && s[pos] == tr.in_label {
                    Some(pos + 1)
                } else {
                    None
                };
                if let Some(npos) = next {
                    if !seen[tr.to][npos] {
                        seen[tr.to][npos] = true;
                        parent[tr.to][npos] = Some((u, pos, t));
                        if tr.to == atom.accept && npos == len {
                            goal = Some((tr.to, npos));
                            break 'bfs;
                        }
                        queue.push_back((tr.to, npos));
                    }
                }
            }
        }
        // the start state with the whole string consumed accepts trivially
        // only when the string is empty
        if goal.is_none() && atom.start == atom.accept && len == 0 {
            goal = Some((atom.start, 0));
        }
        let run = goal.map(|(mut u, mut pos)| {
            let mut run = vec![];
            while let Some((pu, ppos, t)) = parent[u][pos] {
                run.push(t);
                u = pu;
                pos = ppos;
            }
            run.reverse();
            run
        });
        (run, seen)
    }

    fn evaluate_atom(&self, atom: &AcceptAtom) -> Option<(bool, Vec<Lit>)> {
        // forced true: the enabled transitions alone accept
        let (run, _) = self.run_product(atom, false);
        if let Some(run) = run {
            let expl = run
                .iter()
                .map(|&t| Lit::new(self.transitions[t].var, true))
                .collect();
            return Some((true, expl));
        }
        // forced false: even the possible transitions do not accept; the
        // reason is the disabled transitions leaving a reachable product
        // state with a matching label
        let (run, seen) = self.run_product(atom, true);
        if run.is_none() {
            let s = &self.strings[atom.string];
            let mut cut = vec![];
            for &t in &self.fsms[atom.fsm].transitions {
                if self.state[t] != TState::Disabled {
                    continue;
                }
                let tr = self.transitions[t];
                let from_reachable = seen[tr.from].iter().enumerate().any(|(pos, &r)| {
                    r && (tr.in_label == 0 || (pos < s.len() && s[pos] == tr.in_label))
                });
                if from_reachable {
                    cut.push(Lit::new(tr.var, false));
                }
            }
            return Some((false, cut));
        }
        None
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
            if let Some(&t) = self.transition_of_var.get(l.var()) {
                if t >= 0 {
                    let t = t as usize;
                    let new = if l.sign() {
                        TState::Enabled
                    } else {
                        TState::Disabled
                    };
                    if self.state[t] != new {
                        self.state[t] = new;
                        self.undo.push(t);
                        self.dirty = true;
                    }
                }
            }
        }
        if !self.dirty {
            return;
        }
        for i in 0..self.atoms.len() {
            let atom = self.atoms[i];
            if let Some((val, expl)) = self.evaluate_atom(&atom) {
                let pl = if val { atom.lit } else { !atom.lit };
                if acts.value_lit(pl) == lbool::TRUE {
                    continue;
                }
                self.expl_map.insert(pl, expl);
                if !acts.propagate(pl) {
                    return;
                }
            }
        }
        self.dirty = false;
    }
}

impl Theory for FsmTheory {
    fn partial_check(&mut self, acts: &mut TheoryArg) {
        self.check(acts)
    }

    fn final_check(&mut self, acts: &mut TheoryArg) {
        self.check(acts)
    }

    fn create_level(&mut self) {
        self.level_marks.push(LevelMark {
            head: self.head,
            undo_len: self.undo.len(),
        });
    }

    fn pop_levels(&mut self, n: usize) {
        debug_assert!(self.level_marks.len() >= n);
        let target = self.level_marks.len() - n;
        let mark = self.level_marks[target];
        while self.undo.len() > mark.undo_len {
            let t = self.undo.pop().unwrap();
            self.state[t] = TState::Undef;
        }
        self.head = mark.head;
        self.level_marks.truncate(target);
        self.dirty = true;
    }

    fn n_levels(&self) -> usize {
        self.level_marks.len()
    }

    fn explain_propagation(&mut self, p: Lit) -> &[Lit] {
        let expl = self
            .expl_map
            .get(&p)
            .expect("fsm: no explanation recorded for propagated literal");
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

#[cfg(test)]
mod test {
    use super::*;

    /// Two states, transition 0->1 on label 1, accepting "1".
    fn mk() -> (FsmTheory, usize, usize) {
        let mut th = FsmTheory::new(0);
        let f = th.new_fsm(2, 0);
        th.new_state(f).unwrap();
        th.new_state(f).unwrap();
        let t = th
            .new_transition(f, 0, 1, 1, 0, Var::from_idx(0))
            .unwrap();
        (th, f, t)
    }

    #[test]
    fn test_accept_two_sided() {
        let (mut th, f, t) = mk();
        let s = th.new_string(vec![1]).unwrap();
        th.accept_atom(f, 0, 1, s, Var::from_idx(1)).unwrap();
        let atom = th.atoms[0];
        // undecided transition: nothing forced
        assert!(th.evaluate_atom(&atom).is_none());
        th.state[t] = TState::Enabled;
        let (val, expl) = th.evaluate_atom(&atom).unwrap();
        assert!(val);
        assert_eq!(expl, vec![Lit::new(Var::from_idx(0), true)]);
        th.state[t] = TState::Disabled;
        let (val, expl) = th.evaluate_atom(&atom).unwrap();
        assert!(!val);
        assert_eq!(expl, vec![Lit::new(Var::from_idx(0), false)]);
    }

    #[test]
    fn test_wrong_string_rejected() {
        let (mut th, f, t) = mk();
        let s = th.new_string(vec![2]).unwrap();
        th.accept_atom(f, 0, 1, s, Var::from_idx(1)).unwrap();
        th.state[t] = TState::Enabled;
        let atom = th.atoms[0];
        // no transition consumes label 2, so the atom is forced false even
        // with everything enabled (and the cut is empty of disabled lits)
        let (val, expl) = th.evaluate_atom(&atom).unwrap();
        assert!(!val);
        assert!(expl.is_empty());
    }

    #[test]
    fn test_zero_label_is_invalid() {
        let (mut th, _, _) = mk();
        assert!(th.new_string(vec![1, 0]).is_err());
    }
}
