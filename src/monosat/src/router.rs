//! The flow router: a composite constraint grouping a max-flow atom with a
//! set of routing nets over the same graph.
//!
//! Each net holds a disable literal, a list of candidate member edges and
//! the reachability literal paired with each member. A net is routed when
//! exactly one member edge is enabled and that member's reachability holds;
//! enabling the net's disable edge instead opts the net out of the shared
//! flow. Violations are repaired lazily with lemmas raised as theory
//! conflicts.

use crate::clause::{lbool, Lit};
use crate::core::TheoryArg;
use crate::theory::Theory;
use std::any::Any;

struct Net {
    disable: Lit,
    members: Vec<(Lit, Lit)>, // (edge enable lit, reach lit)
}

pub struct FlowRouter {
    tid: usize,
    router_id: usize,
    graph_id: usize,
    source: usize,
    dest: usize,
    maxflow_lit: Lit,
    nets: Vec<Net>,
    levels: usize,
}

impl FlowRouter {
    pub fn new(
        tid: usize,
        router_id: usize,
        graph_id: usize,
        source: usize,
        dest: usize,
        maxflow_lit: Lit,
    ) -> Self {
        Self {
            tid,
            router_id,
            graph_id,
            source,
            dest,
            maxflow_lit,
            nets: vec![],
            levels: 0,
        }
    }

    pub fn theory_index(&self) -> usize {
        self.tid
    }

    pub fn router_id(&self) -> usize {
        self.router_id
    }

    pub fn graph_id(&self) -> usize {
        self.graph_id
    }

    pub fn source(&self) -> usize {
        self.source
    }

    pub fn dest(&self) -> usize {
        self.dest
    }

    pub fn maxflow_lit(&self) -> Lit {
        self.maxflow_lit
    }

    pub fn add_net(&mut self, disable: Lit, members: Vec<(Lit, Lit)>) {
        self.nets.push(Net { disable, members });
    }

    pub fn n_nets(&self) -> usize {
        self.nets.len()
    }

    fn check(&mut self, acts: &mut TheoryArg, final_check: bool) {
        for net in &self.nets {
            let disabled = acts.value_lit(net.disable) == lbool::TRUE;
            let mut active: Option<(Lit, Lit)> = None;
            for &(edge, reach) in &net.members {
                if acts.value_lit(edge) != lbool::TRUE {
                    continue;
                }
                if let Some((first, _)) = active {
                    // two members routed: mutual exclusion lemma
                    acts.raise_conflict(&[!first, !edge], false);
                    return;
                }
                active = Some((edge, reach));
            }
            match active {
                Some((edge, reach)) => {
                    if disabled {
                        // a routed net must not also be opted out
                        acts.raise_conflict(&[!net.disable, !edge], false);
                        return;
                    }
                    // the chosen member must actually route through the flow
                    if acts.value_lit(reach) == lbool::FALSE {
                        acts.raise_conflict(&[!edge, reach], false);
                        return;
                    }
                }
                None => {
                    if final_check && !disabled {
                        // every member undecided-or-false at the full model:
                        // the net is neither routed nor opted out
                        let mut lemma = vec![net.disable];
                        lemma.extend(net.members.iter().map(|&(e, _)| e));
                        acts.raise_conflict(&lemma, true);
                        return;
                    }
                }
            }
        }
    }
}

impl Theory for FlowRouter {
    fn partial_check(&mut self, acts: &mut TheoryArg) {
        self.check(acts, false)
    }

    fn final_check(&mut self, acts: &mut TheoryArg) {
        self.check(acts, true)
    }

    fn create_level(&mut self) {
        self.levels += 1;
    }

    fn pop_levels(&mut self, n: usize) {
        debug_assert!(self.levels >= n);
        self.levels -= n;
    }

    fn n_levels(&self) -> usize {
        self.levels
    }

    fn explain_propagation(&mut self, _p: Lit) -> &[Lit] {
        unreachable!("the flow router only raises conflict lemmas")
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
    use crate::clause::Var;

    fn lit(idx: u32) -> Lit {
        Lit::new(Var::from_idx(idx), true)
    }

    #[test]
    fn test_router_construction() {
        let mut r = FlowRouter::new(3, 1, 0, 4, 7, lit(0));
        assert_eq!(r.theory_index(), 3);
        assert_eq!(r.router_id(), 1);
        assert_eq!(r.graph_id(), 0);
        assert_eq!(r.source(), 4);
        assert_eq!(r.dest(), 7);
        assert_eq!(r.maxflow_lit(), lit(0));
        assert_eq!(r.n_nets(), 0);
        r.add_net(lit(1), vec![(lit(2), lit(3)), (lit(4), lit(5))]);
        r.add_net(lit(6), vec![(lit(7), lit(8))]);
        assert_eq!(r.n_nets(), 2);
    }

    #[test]
    fn test_router_levels() {
        let mut r = FlowRouter::new(0, 0, 0, 0, 1, lit(0));
        r.create_level();
        r.create_level();
        assert_eq!(r.n_levels(), 2);
        r.pop_levels(1);
        assert_eq!(r.n_levels(), 1);
    }
}
