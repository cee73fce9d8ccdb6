//! The graph theory: monotone predicate atoms over edge-enable literals.
//!
//! Every edge holds a SAT literal controlling its presence, so each edge is
//! in one of three states: undecided, enabled or disabled. An atom is forced
//! true as soon as a witness exists over the *enabled-only* subgraph (a
//! path, flow, or spanning tree built from edges that are present in every
//! completion of the current assignment), and forced false as soon as it
//! fails over the *possible* subgraph (enabled plus undecided edges). The
//! explanation of a verdict is the witness's edge literals, or the
//! separating set of disabled edges; for bitvector-weighted edges the
//! literals justifying the current weight bounds are cited as well.
//!
//! Atoms are cached by their full descriptor, so re-requesting one returns
//! the same literal.

pub mod dsu;
pub mod flow;
pub mod search;

use crate::bv::BvBounds;
use crate::clause::{lbool, Lit, VMap, Var};
use crate::core::TheoryArg;
use crate::errors::{check_name, Error, Result};
use crate::options::{GraphOptions, MaxFlowAlg, MstAlg, ReachAlg};
use crate::theory::Theory;
use dsu::Dsu;
use fnv::FnvHashMap;
use search::Adjacency;
use std::any::Any;
use std::cell::RefCell;
use std::rc::Rc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeState {
    Undef,
    Enabled,
    Disabled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeWeight {
    Const(u64),
    Bv(usize),
}

#[derive(Debug, Clone, Copy)]
pub struct EdgeInfo {
    pub from: usize,
    pub to: usize,
    pub var: Var,
    pub weight: EdgeWeight,
}

/// Full descriptor of a graph atom; the dedup key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AtomKind {
    /// Reachable within `within` edges (-1 = unbounded).
    Reach {
        from: usize,
        to: usize,
        within: i64,
    },
    /// Reachability along reversed edges.
    ReachBackward {
        from: usize,
        to: usize,
    },
    /// Some path from `from` to `to` passes through `node`.
    OnPath {
        node: usize,
        from: usize,
        to: usize,
    },
    /// Shortest weighted path <= dist (or < when strict).
    Distance {
        from: usize,
        to: usize,
        dist: u64,
        strict: bool,
    },
    DistanceBv {
        from: usize,
        to: usize,
        bv: usize,
        strict: bool,
    },
    /// Maximum flow >= flow (or > when strict).
    MaxFlow {
        source: usize,
        sink: usize,
        flow: u64,
        strict: bool,
    },
    MaxFlowBv {
        source: usize,
        sink: usize,
        bv: usize,
        strict: bool,
    },
    /// Minimum spanning tree weight <= weight (or < when strict);
    /// a disconnected graph has infinite weight.
    MstWeight {
        weight: u64,
        strict: bool,
    },
    Acyclic {
        directed: bool,
    },
}

#[derive(Debug, Clone, Copy)]
struct Atom {
    kind: AtomKind,
    lit: Lit,
}

#[derive(Clone, Copy)]
struct LevelMark {
    head: usize,
    undo_len: usize,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum View {
    /// Enabled edges only: what is present in every completion.
    Under,
    /// Enabled and undecided edges: what could still be present.
    Over,
}

pub struct GraphTheory {
    tid: usize,
    graph_id: usize,
    name: String,
    bitwidth: i32,
    opts: GraphOptions,
    n_nodes: usize,
    node_names: FnvHashMap<String, usize>,
    name_of_node: Vec<String>,
    edges: Vec<EdgeInfo>,
    edge_of_var: VMap<i32>,
    state: Vec<EdgeState>,
    atoms: Vec<Atom>,
    atom_of_var: VMap<i32>,
    dedup: FnvHashMap<AtomKind, Lit>,
    bv_bounds: Option<Rc<RefCell<BvBounds>>>,
    assign_weight: Option<u64>,

    head: usize,
    level_marks: Vec<LevelMark>,
    undo: Vec<usize>,
    dirty: bool,
    incoming: Vec<Lit>,
    expl_map: FnvHashMap<Lit, Vec<Lit>>,
    expl: Vec<Lit>,

    /// Edge states staged at the last full-model check.
    staged_state: Vec<EdgeState>,
    /// Edge states at the last accepted full model.
    model_state: Vec<EdgeState>,
}

impl GraphTheory {
    pub fn new(tid: usize, graph_id: usize, name: String, bitwidth: i32, opts: GraphOptions) -> Self {
        Self {
            tid,
            graph_id,
            name,
            bitwidth,
            opts,
            n_nodes: 0,
            node_names: FnvHashMap::default(),
            name_of_node: vec![],
            edges: vec![],
            edge_of_var: VMap::new(),
            state: vec![],
            atoms: vec![],
            atom_of_var: VMap::new(),
            dedup: FnvHashMap::default(),
            bv_bounds: None,
            assign_weight: None,
            head: 0,
            level_marks: vec![],
            undo: vec![],
            dirty: true,
            incoming: vec![],
            expl_map: FnvHashMap::default(),
            expl: vec![],
            staged_state: vec![],
            model_state: vec![],
        }
    }

    pub fn theory_index(&self) -> usize {
        self.tid
    }

    pub fn graph_id(&self) -> usize {
        self.graph_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn edge_weight_bitwidth(&self) -> i32 {
        self.bitwidth
    }

    /// Attach the bitvector bound store; required before edges with
    /// bitvector weights can be created.
    pub fn set_bv_bounds(&mut self, store: Rc<RefCell<BvBounds>>) {
        self.bv_bounds = Some(store);
    }

    pub fn has_bv_bounds(&self) -> bool {
        self.bv_bounds.is_some()
    }

    // ---------- construction ----------

    pub fn new_node(&mut self) -> usize {
        self.n_nodes += 1;
        self.name_of_node.push(String::new());
        self.n_nodes - 1
    }

    pub fn n_nodes(&self) -> usize {
        self.n_nodes
    }

    pub fn n_edges(&self) -> usize {
        self.edges.len()
    }

    pub fn set_node_name(&mut self, node: usize, name: &str) -> Result<()> {
        self.check_node(node)?;
        if name.is_empty() {
            return Ok(());
        }
        check_name(name)?;
        if self.node_names.contains_key(name) {
            return Err(Error::domain(format!(
                "all nodes in a graph must have unique names; duplicate name: {}",
                name
            )));
        }
        self.node_names.insert(name.to_string(), node);
        self.name_of_node[node] = name.to_string();
        Ok(())
    }

    pub fn has_named_node(&self, name: &str) -> bool {
        self.node_names.contains_key(name)
    }

    pub fn node_by_name(&self, name: &str) -> Option<usize> {
        self.node_names.get(name).copied()
    }

    pub fn node_name(&self, node: usize) -> &str {
        &self.name_of_node[node]
    }

    fn check_node(&self, node: usize) -> Result<()> {
        if node < self.n_nodes {
            Ok(())
        } else {
            Err(Error::domain(format!(
                "node {} does not exist in graph {}",
                node, self.graph_id
            )))
        }
    }

    /// Create an edge controlled by (the positive literal of) `var`.
    pub fn new_edge(&mut self, from: usize, to: usize, var: Var, weight: EdgeWeight) -> Result<usize> {
        self.check_node(from)?;
        self.check_node(to)?;
        if let EdgeWeight::Bv(id) = weight {
            match &self.bv_bounds {
                None => {
                    return Err(Error::state(
                        "no bitvector theory attached to this graph".to_string(),
                    ))
                }
                Some(b) => {
                    if id >= b.borrow().len() {
                        return Err(Error::domain(format!("bitvector {} is not allocated", id)));
                    }
                }
            }
        }
        let e = self.edges.len();
        self.edges.push(EdgeInfo {
            from,
            to,
            var,
            weight,
        });
        self.state.push(EdgeState::Undef);
        self.edge_of_var.insert(var, e as i32, -1);
        self.dirty = true;
        Ok(e)
    }

    pub fn is_edge_var(&self, v: Var) -> bool {
        matches!(self.edge_of_var.get(v), Some(&e) if e >= 0)
    }

    pub fn edge_id_of_var(&self, v: Var) -> Option<usize> {
        match self.edge_of_var.get(v) {
            Some(&e) if e >= 0 => Some(e as usize),
            _ => None,
        }
    }

    pub fn edge_lit(&self, e: usize) -> Lit {
        Lit::new(self.edges[e].var, true)
    }

    pub fn edge_info(&self, e: usize) -> &EdgeInfo {
        &self.edges[e]
    }

    /// Override the weight of `e` (used by edge sets under
    /// `set_assign_edges_to_weight`).
    pub fn set_edge_weight(&mut self, e: usize, w: u64) {
        self.edges[e].weight = EdgeWeight::Const(w);
        self.dirty = true;
    }

    pub fn set_assign_edges_to_weight(&mut self, w: u64) {
        self.assign_weight = Some(w);
    }

    pub fn assign_edges_to_weight(&self) -> Option<u64> {
        self.assign_weight
    }

    /// Does `l` name an atom of this graph?
    pub fn owns_atom(&self, l: Lit) -> bool {
        matches!(self.atom_of_var.get(l.var()), Some(&a) if a >= 0)
    }

    fn atom_of_lit(&self, l: Lit) -> Option<Atom> {
        match self.atom_of_var.get(l.var()) {
            Some(&a) if a >= 0 => Some(self.atoms[a as usize]),
            _ => None,
        }
    }

    fn intern_atom(&mut self, kind: AtomKind, var: Var) -> Lit {
        let lit = Lit::new(var, true);
        let idx = self.atoms.len();
        self.atoms.push(Atom { kind, lit });
        self.atom_of_var.insert(var, idx as i32, -1);
        self.dedup.insert(kind, lit);
        self.dirty = true;
        lit
    }

    /// The literal for `kind`, allocating `mk_var` only when the atom is new.
    pub fn atom_lit(
        &mut self,
        kind: AtomKind,
        mk_var: impl FnOnce() -> Var,
    ) -> Result<(Lit, bool)> {
        self.validate_kind(&kind)?;
        if let Some(&l) = self.dedup.get(&kind) {
            return Ok((l, false));
        }
        let v = mk_var();
        Ok((self.intern_atom(kind, v), true))
    }

    fn validate_kind(&self, kind: &AtomKind) -> Result<()> {
        let check_bv = |id: &usize| -> Result<()> {
            match &self.bv_bounds {
                None => Err(Error::state(
                    "no bitvector theory attached to this graph".to_string(),
                )),
                Some(b) if *id >= b.borrow().len() => {
                    Err(Error::domain(format!("bitvector {} is not allocated", id)))
                }
                _ => Ok(()),
            }
        };
        match kind {
            AtomKind::Reach { from, to, .. } | AtomKind::ReachBackward { from, to } => {
                self.check_node(*from)?;
                self.check_node(*to)
            }
            AtomKind::OnPath { node, from, to } => {
                self.check_node(*node)?;
                self.check_node(*from)?;
                self.check_node(*to)
            }
            AtomKind::Distance { from, to, .. } => {
                self.check_node(*from)?;
                self.check_node(*to)
            }
            AtomKind::DistanceBv { from, to, bv, .. } => {
                self.check_node(*from)?;
                self.check_node(*to)?;
                check_bv(bv)
            }
            AtomKind::MaxFlow { source, sink, .. } => {
                self.check_node(*source)?;
                self.check_node(*sink)
            }
            AtomKind::MaxFlowBv {
                source, sink, bv, ..
            } => {
                self.check_node(*source)?;
                self.check_node(*sink)?;
                check_bv(bv)
            }
            AtomKind::MstWeight { .. } | AtomKind::Acyclic { .. } => Ok(()),
        }
    }

    // ---------- views and weights ----------

    fn present(&self, e: usize, view: View) -> bool {
        match self.state[e] {
            EdgeState::Enabled => true,
            EdgeState::Undef => view == View::Over,
            EdgeState::Disabled => false,
        }
    }

    fn adjacency(&self, view: View, reversed: bool) -> Adjacency {
        let mut adj = vec![vec![]; self.n_nodes];
        for (e, info) in self.edges.iter().enumerate() {
            if self.present(e, view) {
                if reversed {
                    adj[info.to].push((info.from, e));
                } else {
                    adj[info.from].push((info.to, e));
                }
            }
        }
        adj
    }

    /// Smallest possible weight of `e` in any completion.
    fn weight_under(&self, e: usize) -> u64 {
        match self.edges[e].weight {
            EdgeWeight::Const(w) => w,
            EdgeWeight::Bv(id) => self.bv_bounds.as_ref().unwrap().borrow().under(id),
        }
    }

    /// Largest possible weight of `e` in any completion.
    fn weight_over(&self, e: usize) -> u64 {
        match self.edges[e].weight {
            EdgeWeight::Const(w) => w,
            EdgeWeight::Bv(id) => self.bv_bounds.as_ref().unwrap().borrow().over(id),
        }
    }

    fn weight_model(&self, e: usize) -> u64 {
        match self.edges[e].weight {
            EdgeWeight::Const(w) => w,
            EdgeWeight::Bv(id) => self.bv_bounds.as_ref().unwrap().borrow().model_bounds(id).0,
        }
    }

    /// Push the literals justifying the current weight bounds of `e`.
    fn push_weight_reason(&self, e: usize, out: &mut Vec<Lit>) {
        if let EdgeWeight::Bv(id) = self.edges[e].weight {
            let b = self.bv_bounds.as_ref().unwrap().borrow();
            out.extend_from_slice(b.reason(id));
        }
    }

    fn push_bv_reason(&self, id: usize, out: &mut Vec<Lit>) {
        let b = self.bv_bounds.as_ref().unwrap().borrow();
        out.extend_from_slice(b.reason(id));
    }

    fn bv_under(&self, id: usize) -> u64 {
        self.bv_bounds.as_ref().unwrap().borrow().under(id)
    }

    fn bv_over(&self, id: usize) -> u64 {
        self.bv_bounds.as_ref().unwrap().borrow().over(id)
    }

    // ---------- evaluation ----------

    fn reach_path(&self, adj: &Adjacency, from: usize, to: usize, hops: Option<u64>) -> Option<Vec<usize>> {
        match self.opts.reach {
            ReachAlg::Dfs if hops.is_none() => search::dfs_path(adj, from, to),
            _ => search::bfs_path(adj, from, to, hops),
        }
    }

    /// Disabled edges whose tail is reachable (within the hop bound) in the
    /// possible view; enabling any other edge cannot connect `from` to `to`.
    fn reach_cut(&self, from: usize, hops: Option<u64>, reversed: bool) -> Vec<Lit> {
        let adj = self.adjacency(View::Over, reversed);
        let level = search::bfs_levels(&adj, from, hops);
        let mut cut = vec![];
        for (e, info) in self.edges.iter().enumerate() {
            if self.state[e] == EdgeState::Disabled {
                let tail = if reversed { info.to } else { info.from };
                if let Some(d) = level[tail] {
                    if hops.map_or(true, |k| d < k) {
                        cut.push(!self.edge_lit(e));
                    }
                }
            }
        }
        cut
    }

    fn path_expl(&self, path: &[usize], with_weights: bool) -> Vec<Lit> {
        let mut expl: Vec<Lit> = path.iter().map(|&e| self.edge_lit(e)).collect();
        if with_weights {
            for &e in path {
                self.push_weight_reason(e, &mut expl);
            }
        }
        dedup_lits(&mut expl);
        expl
    }

    fn eval_reach(&self, from: usize, to: usize, within: i64, reversed: bool) -> Option<(bool, Vec<Lit>)> {
        let hops = if within < 0 { None } else { Some(within as u64) };
        let under_adj = self.adjacency(View::Under, reversed);
        if let Some(path) = self.reach_path(&under_adj, from, to, hops) {
            return Some((true, self.path_expl(&path, false)));
        }
        let over_adj = self.adjacency(View::Over, reversed);
        let level = search::bfs_levels(&over_adj, from, hops);
        if level[to].is_none() {
            return Some((false, self.reach_cut(from, hops, reversed)));
        }
        None
    }

    fn eval_on_path(&self, node: usize, from: usize, to: usize) -> Option<(bool, Vec<Lit>)> {
        let under_adj = self.adjacency(View::Under, false);
        let p1 = self.reach_path(&under_adj, from, node, None);
        let p2 = self.reach_path(&under_adj, node, to, None);
        if let (Some(p1), Some(p2)) = (&p1, &p2) {
            let mut expl = self.path_expl(p1, false);
            expl.extend(self.path_expl(p2, false));
            dedup_lits(&mut expl);
            return Some((true, expl));
        }
        let over_adj = self.adjacency(View::Over, false);
        if search::bfs_levels(&over_adj, from, None)[node].is_none() {
            return Some((false, self.reach_cut(from, None, false)));
        }
        if search::bfs_levels(&over_adj, node, None)[to].is_none() {
            return Some((false, self.reach_cut(node, None, false)));
        }
        None
    }

    fn within_bound(d: u64, bound: u64, strict: bool) -> bool {
        if strict {
            d < bound
        } else {
            d <= bound
        }
    }

    /// Distance cut: disabled edges whose tail could start a path of weight
    /// below the bound, plus the weight-bound reasons of possible edges.
    fn distance_cut(&self, from: usize, bound: u64, strict: bool) -> Vec<Lit> {
        let adj = self.adjacency(View::Over, false);
        let w = |e: usize| self.weight_under(e);
        let (dist, _) = search::dijkstra(&adj, from, &w);
        let mut cut = vec![];
        for (e, info) in self.edges.iter().enumerate() {
            match self.state[e] {
                EdgeState::Disabled => {
                    if let Some(d) = dist[info.from] {
                        if Self::within_bound(d, bound, strict) {
                            cut.push(!self.edge_lit(e));
                        }
                    }
                }
                _ => self.push_weight_reason(e, &mut cut),
            }
        }
        dedup_lits(&mut cut);
        cut
    }

    fn eval_distance(
        &self,
        from: usize,
        to: usize,
        bound_under: u64,
        bound_over: u64,
        strict: bool,
        bv: Option<usize>,
    ) -> Option<(bool, Vec<Lit>)> {
        // forced true: a guaranteed path whose pessimistic weight meets the
        // bound that holds in every completion
        let under_adj = self.adjacency(View::Under, false);
        let wmax = |e: usize| self.weight_over(e);
        let ef = |e: usize| self.edges[e].from;
        if let Some((d, path)) = search::dijkstra_path(&under_adj, &ef, from, to, &wmax) {
            if Self::within_bound(d, bound_under, strict) {
                let mut expl = self.path_expl(&path, true);
                if let Some(id) = bv {
                    self.push_bv_reason(id, &mut expl);
                    dedup_lits(&mut expl);
                }
                return Some((true, expl));
            }
        }
        // forced false: even the optimistic shortest path misses the most
        // permissive bound
        let over_adj = self.adjacency(View::Over, false);
        let wmin = |e: usize| self.weight_under(e);
        let (dist, _) = search::dijkstra(&over_adj, from, &wmin);
        let beyond = match dist[to] {
            None => true,
            Some(d) => !Self::within_bound(d, bound_over, strict),
        };
        if beyond {
            let mut expl = self.distance_cut(from, bound_over, strict);
            if let Some(id) = bv {
                self.push_bv_reason(id, &mut expl);
                dedup_lits(&mut expl);
            }
            return Some((false, expl));
        }
        None
    }

    fn run_maxflow(&self, caps: &[(usize, usize, u64)], s: usize, t: usize) -> flow::FlowResult {
        match self.opts.maxflow {
            MaxFlowAlg::Dinitz | MaxFlowAlg::DinitzLinkCut => {
                flow::max_flow_dinitz(self.n_nodes, caps, s, t)
            }
            _ => flow::max_flow_edmonds_karp(self.n_nodes, caps, s, t),
        }
    }

    fn eval_maxflow(
        &self,
        source: usize,
        sink: usize,
        target_true: u64,
        target_false: u64,
        bv: Option<usize>,
    ) -> Option<(bool, Vec<Lit>)> {
        // forced true: the enabled edges alone, at their guaranteed
        // capacities, already carry the required flow
        let caps_under: Vec<(usize, usize, u64)> = self
            .edges
            .iter()
            .enumerate()
            .map(|(e, info)| {
                let c = if self.present(e, View::Under) {
                    self.weight_under(e)
                } else {
                    0
                };
                (info.from, info.to, c)
            })
            .collect();
        let r = self.run_maxflow(&caps_under, source, sink);
        if r.value >= target_true {
            let mut expl = vec![];
            for (e, _) in self.edges.iter().enumerate() {
                if r.edge_flow[e] > 0 {
                    expl.push(self.edge_lit(e));
                    self.push_weight_reason(e, &mut expl);
                }
            }
            if let Some(id) = bv {
                self.push_bv_reason(id, &mut expl);
            }
            dedup_lits(&mut expl);
            return Some((true, expl));
        }
        // forced false: even with every undecided edge enabled at its
        // largest possible capacity, the flow falls short
        let caps_over: Vec<(usize, usize, u64)> = self
            .edges
            .iter()
            .enumerate()
            .map(|(e, info)| {
                let c = if self.present(e, View::Over) {
                    self.weight_over(e)
                } else {
                    0
                };
                (info.from, info.to, c)
            })
            .collect();
        let r = self.run_maxflow(&caps_over, source, sink);
        if r.value < target_false {
            let side = flow::min_cut_side(self.n_nodes, &caps_over, &r.edge_flow, source);
            let mut expl = vec![];
            for (e, info) in self.edges.iter().enumerate() {
                if side[info.from] && !side[info.to] {
                    match self.state[e] {
                        EdgeState::Disabled => expl.push(!self.edge_lit(e)),
                        _ => self.push_weight_reason(e, &mut expl),
                    }
                }
            }
            if let Some(id) = bv {
                self.push_bv_reason(id, &mut expl);
            }
            dedup_lits(&mut expl);
            return Some((false, expl));
        }
        None
    }

    /// Minimum spanning forest over the given view; returns whether it spans
    /// all nodes, the total weight, and the tree edges.
    fn mst(&self, view: View, weight: &dyn Fn(usize) -> u64) -> (bool, u64, Vec<usize>) {
        let mut order: Vec<usize> = (0..self.edges.len())
            .filter(|&e| self.present(e, view))
            .collect();
        let tree = match self.opts.mst {
            MstAlg::Prim | MstAlg::SpiraPan => self.prim(&order, weight),
            MstAlg::Kruskal => {
                order.sort_by_key(|&e| (weight(e), e));
                let mut d = Dsu::new(self.n_nodes);
                let mut tree = vec![];
                for e in order {
                    if d.union(self.edges[e].from, self.edges[e].to) {
                        tree.push(e);
                    }
                }
                tree
            }
        };
        let total = tree.iter().map(|&e| weight(e)).fold(0u64, u64::saturating_add);
        let spans = self.n_nodes == 0 || tree.len() + 1 == self.n_nodes;
        (spans, total, tree)
    }

    fn prim(&self, present: &[usize], weight: &dyn Fn(usize) -> u64) -> Vec<usize> {
        use std::cmp::Reverse;
        use std::collections::BinaryHeap;
        let mut adj = vec![vec![]; self.n_nodes];
        for &e in present {
            adj[self.edges[e].from].push((self.edges[e].to, e));
            adj[self.edges[e].to].push((self.edges[e].from, e));
        }
        let mut in_tree = vec![false; self.n_nodes];
        let mut tree = vec![];
        // grow a forest: one Prim pass per component
        for root in 0..self.n_nodes {
            if in_tree[root] {
                continue;
            }
            in_tree[root] = true;
            let mut heap = BinaryHeap::new();
            for &(v, e) in &adj[root] {
                heap.push(Reverse((weight(e), e, v)));
            }
            while let Some(Reverse((_, e, v))) = heap.pop() {
                if in_tree[v] {
                    continue;
                }
                in_tree[v] = true;
                tree.push(e);
                for &(w, e2) in &adj[v] {
                    if !in_tree[w] {
                        heap.push(Reverse((weight(e2), e2, w)));
                    }
                }
            }
        }
        tree
    }

    fn eval_mst(&self, bound: u64, strict: bool) -> Option<(bool, Vec<Lit>)> {
        // forced true: the enabled edges already span at pessimistic weights
        let wmax = |e: usize| self.weight_over(e);
        let (spans, total, tree) = self.mst(View::Under, &wmax);
        if spans && Self::within_bound(total, bound, strict) {
            let mut expl: Vec<Lit> = tree.iter().map(|&e| self.edge_lit(e)).collect();
            for &e in &tree {
                self.push_weight_reason(e, &mut expl);
            }
            dedup_lits(&mut expl);
            return Some((true, expl));
        }
        // forced false: even with every undecided edge at its smallest
        // weight the forest is too heavy (or cannot span)
        let wmin = |e: usize| self.weight_under(e);
        let (spans, total, _tree) = self.mst(View::Over, &wmin);
        if !spans || !Self::within_bound(total, bound, strict) {
            let mut expl = vec![];
            for (e, _) in self.edges.iter().enumerate() {
                match self.state[e] {
                    EdgeState::Disabled => expl.push(!self.edge_lit(e)),
                    _ => self.push_weight_reason(e, &mut expl),
                }
            }
            dedup_lits(&mut expl);
            return Some((false, expl));
        }
        None
    }

    fn find_cycle(&self, view: View, directed: bool) -> Option<Vec<usize>> {
        if directed {
            let adj = self.adjacency(view, false);
            search::find_cycle_directed(&adj)
        } else {
            // DSU: the first edge joining two already-connected nodes closes
            // a cycle; recover it as the forest path plus that edge
            let mut d = Dsu::new(self.n_nodes);
            let mut forest: Adjacency = vec![vec![]; self.n_nodes];
            for (e, info) in self.edges.iter().enumerate() {
                if !self.present(e, view) {
                    continue;
                }
                if d.union(info.from, info.to) {
                    forest[info.from].push((info.to, e));
                    forest[info.to].push((info.from, e));
                } else {
                    let mut cycle = search::bfs_path(&forest, info.from, info.to, None)
                        .expect("endpoints are connected in the forest");
                    cycle.push(e);
                    return Some(cycle);
                }
            }
            None
        }
    }

    fn eval_acyclic(&self, directed: bool) -> Option<(bool, Vec<Lit>)> {
        if let Some(cycle) = self.find_cycle(View::Under, directed) {
            let expl = cycle.iter().map(|&e| self.edge_lit(e)).collect();
            return Some((false, expl));
        }
        if self.find_cycle(View::Over, directed).is_none() {
            let expl = self
                .edges
                .iter()
                .enumerate()
                .filter(|&(e, _)| self.state[e] == EdgeState::Disabled)
                .map(|(e, _)| !self.edge_lit(e))
                .collect();
            return Some((true, expl));
        }
        None
    }

    fn evaluate_atom(&self, kind: AtomKind) -> Option<(bool, Vec<Lit>)> {
        match kind {
            AtomKind::Reach { from, to, within } => self.eval_reach(from, to, within, false),
            AtomKind::ReachBackward { from, to } => self.eval_reach(from, to, -1, true),
            AtomKind::OnPath { node, from, to } => self.eval_on_path(node, from, to),
            AtomKind::Distance {
                from,
                to,
                dist,
                strict,
            } => self.eval_distance(from, to, dist, dist, strict, None),
            AtomKind::DistanceBv {
                from,
                to,
                bv,
                strict,
            } => {
                // dist <= BV must hold for every completion of BV's value
                self.eval_distance(from, to, self.bv_under(bv), self.bv_over(bv), strict, Some(bv))
            }
            AtomKind::MaxFlow {
                source,
                sink,
                flow,
                strict,
            } => {
                let target = flow.saturating_add(strict as u64);
                self.eval_maxflow(source, sink, target, target, None)
            }
            AtomKind::MaxFlowBv {
                source,
                sink,
                bv,
                strict,
            } => {
                let tt = self.bv_over(bv).saturating_add(strict as u64);
                let tf = self.bv_under(bv).saturating_add(strict as u64);
                self.eval_maxflow(source, sink, tt, tf, Some(bv))
            }
            AtomKind::MstWeight { weight, strict } => self.eval_mst(weight, strict),
            AtomKind::Acyclic { directed } => self.eval_acyclic(directed),
        }
    }

    // ---------- propagation ----------

    fn sync(&mut self, acts: &mut TheoryArg) {
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
            if let Some(e) = self.edge_id_of_var(l.var()) {
                let new = if l.sign() {
                    EdgeState::Enabled
                } else {
                    EdgeState::Disabled
                };
                if self.state[e] != new {
                    debug_assert_eq!(self.state[e], EdgeState::Undef);
                    self.state[e] = new;
                    self.undo.push(e);
                    self.dirty = true;
                }
            }
        }
    }

    fn check(&mut self, acts: &mut TheoryArg, final_check: bool) {
        self.sync(acts);
        if !self.dirty && !final_check {
            return;
        }
        for i in 0..self.atoms.len() {
            let Atom { kind, lit } = self.atoms[i];
            if let Some((val, expl)) = self.evaluate_atom(kind) {
                let pl = if val { lit } else { !lit };
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
        if final_check {
            self.staged_state.clear();
            self.staged_state.extend_from_slice(&self.state);
        }
    }

    // ---------- model witnesses ----------

    fn model_adjacency(&self, reversed: bool) -> Adjacency {
        let mut adj = vec![vec![]; self.n_nodes];
        for (e, info) in self.edges.iter().enumerate() {
            if self.model_state.get(e) == Some(&EdgeState::Enabled) {
                if reversed {
                    adj[info.to].push((info.from, e));
                } else {
                    adj[info.from].push((info.to, e));
                }
            }
        }
        adj
    }

    /// The witness path (as edge ids) for a reach/distance atom that is true
    /// in the model, or `None`.
    fn model_path_edges_ids(&self, l: Lit) -> Option<Vec<usize>> {
        let atom = self.atom_of_lit(l)?;
        match atom.kind {
            AtomKind::Reach { from, to, within } => {
                let hops = if within < 0 { None } else { Some(within as u64) };
                search::bfs_path(&self.model_adjacency(false), from, to, hops)
            }
            AtomKind::ReachBackward { from, to } => {
                search::bfs_path(&self.model_adjacency(true), from, to, None)
            }
            AtomKind::OnPath { node, from, to } => {
                let adj = self.model_adjacency(false);
                let mut p1 = search::bfs_path(&adj, from, node, None)?;
                let p2 = search::bfs_path(&adj, node, to, None)?;
                p1.extend(p2);
                Some(p1)
            }
            AtomKind::Distance { from, to, .. } | AtomKind::DistanceBv { from, to, .. } => {
                let adj = self.model_adjacency(false);
                let w = |e: usize| self.weight_model(e);
                let ef = |e: usize| self.edges[e].from;
                search::dijkstra_path(&adj, &ef, from, to, &w).map(|(_, p)| p)
            }
            _ => None,
        }
    }

    /// Witness path as node ids.
    pub fn model_path_nodes(&self, l: Lit) -> Option<Vec<usize>> {
        let atom = self.atom_of_lit(l)?;
        let path = self.model_path_edges_ids(l)?;
        let (start, reversed) = match atom.kind {
            AtomKind::Reach { from, .. }
            | AtomKind::OnPath { from, .. }
            | AtomKind::Distance { from, .. }
            | AtomKind::DistanceBv { from, .. } => (from, false),
            AtomKind::ReachBackward { from, .. } => (from, true),
            _ => return None,
        };
        let mut nodes = vec![start];
        let mut cur = start;
        for &e in &path {
            cur = if reversed {
                self.edges[e].from
            } else {
                self.edges[e].to
            };
            nodes.push(cur);
        }
        Some(nodes)
    }

    /// Witness path as edge-enable literals.
    pub fn model_path_edge_lits(&self, l: Lit) -> Option<Vec<Lit>> {
        let path = self.model_path_edges_ids(l)?;
        Some(path.iter().map(|&e| self.edge_lit(e)).collect())
    }

    fn model_flow_for(&self, l: Lit) -> Option<(flow::FlowResult, Vec<(usize, usize, u64)>)> {
        let atom = self.atom_of_lit(l)?;
        let (source, sink) = match atom.kind {
            AtomKind::MaxFlow { source, sink, .. } | AtomKind::MaxFlowBv { source, sink, .. } => {
                (source, sink)
            }
            _ => return None,
        };
        let caps: Vec<(usize, usize, u64)> = self
            .edges
            .iter()
            .enumerate()
            .map(|(e, info)| {
                let c = if self.model_state.get(e) == Some(&EdgeState::Enabled) {
                    self.weight_model(e)
                } else {
                    0
                };
                (info.from, info.to, c)
            })
            .collect();
        Some((self.run_maxflow(&caps, source, sink), caps))
    }

    /// The value of the maximum flow under the model.
    pub fn model_maxflow(&self, l: Lit) -> Option<u64> {
        self.model_flow_for(l).map(|(r, _)| r.value)
    }

    /// The flow assigned to one edge under the model.
    pub fn model_edge_flow(&self, l: Lit, edge_lit: Lit) -> Option<u64> {
        let e = self.edge_id_of_var(edge_lit.var())?;
        let (r, _) = self.model_flow_for(l)?;
        Some(r.edge_flow[e])
    }

    /// Like `model_edge_flow`, but on the cycle-free decomposition of the
    /// flow.
    pub fn model_acyclic_edge_flow(&self, l: Lit, edge_lit: Lit) -> Option<u64> {
        let e = self.edge_id_of_var(edge_lit.var())?;
        let (r, caps) = self.model_flow_for(l)?;
        let acyc = flow::acyclic_flow(self.n_nodes, &caps, &r.edge_flow);
        Some(acyc[e])
    }

    /// Weight of the minimum spanning tree under the model; `None` when the
    /// model graph does not span.
    pub fn model_mst_weight(&self, l: Lit) -> Option<u64> {
        let atom = self.atom_of_lit(l)?;
        match atom.kind {
            AtomKind::MstWeight { .. } => {}
            _ => return None,
        }
        let saved_state;
        let state_ref: &[EdgeState] = if self.model_state.len() == self.edges.len() {
            &self.model_state
        } else {
            saved_state = vec![EdgeState::Undef; self.edges.len()];
            &saved_state
        };
        let mut order: Vec<usize> = (0..self.edges.len())
            .filter(|&e| state_ref[e] == EdgeState::Enabled)
            .collect();
        let w = |e: usize| self.weight_model(e);
        order.sort_by_key(|&e| (w(e), e));
        let mut d = Dsu::new(self.n_nodes);
        let mut total = 0u64;
        let mut joined = 0;
        for e in order {
            if d.union(self.edges[e].from, self.edges[e].to) {
                total = total.saturating_add(w(e));
                joined += 1;
            }
        }
        if self.n_nodes == 0 || joined + 1 == self.n_nodes {
            Some(total)
        } else {
            None
        }
    }
}

fn dedup_lits(lits: &mut Vec<Lit>) {
    lits.sort_unstable();
    lits.dedup();
}

impl Theory for GraphTheory {
    fn partial_check(&mut self, acts: &mut TheoryArg) {
        self.check(acts, false);
    }

    fn final_check(&mut self, acts: &mut TheoryArg) {
        self.check(acts, true);
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
            let e = self.undo.pop().unwrap();
            self.state[e] = EdgeState::Undef;
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
            .expect("graph: no explanation recorded for propagated literal");
        self.expl.clear();
        self.expl.extend_from_slice(expl);
        &self.expl
    }

    fn commit_model(&mut self) {
        self.model_state.clear();
        self.model_state.extend_from_slice(&self.staged_state);
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
    use crate::options::GraphOptions;

    fn mk_graph(nodes: usize) -> GraphTheory {
        let mut g = GraphTheory::new(0, 0, String::new(), -2, GraphOptions::default());
        for _ in 0..nodes {
            g.new_node();
        }
        g
    }

    #[test]
    fn test_reach_two_sided() {
        let mut g = mk_graph(3);
        let e0 = g
            .new_edge(0, 1, Var::from_idx(0), EdgeWeight::Const(1))
            .unwrap();
        let e1 = g
            .new_edge(1, 2, Var::from_idx(1), EdgeWeight::Const(1))
            .unwrap();
        // nothing forced while both edges are undecided
        assert!(g
            .evaluate_atom(AtomKind::Reach {
                from: 0,
                to: 2,
                within: -1
            })
            .is_none());
        // both enabled: forced true with the path as reason
        g.state[e0] = EdgeState::Enabled;
        g.state[e1] = EdgeState::Enabled;
        let (val, expl) = g
            .evaluate_atom(AtomKind::Reach {
                from: 0,
                to: 2,
                within: -1
            })
            .unwrap();
        assert!(val);
        assert_eq!(expl.len(), 2);
        // one disabled: forced false with the cut as reason
        g.state[e1] = EdgeState::Disabled;
        let (val, expl) = g
            .evaluate_atom(AtomKind::Reach {
                from: 0,
                to: 2,
                within: -1
            })
            .unwrap();
        assert!(!val);
        assert_eq!(expl, vec![!g.edge_lit(e1)]);
    }

    #[test]
    fn test_hop_bound() {
        let mut g = mk_graph(3);
        let e0 = g
            .new_edge(0, 1, Var::from_idx(0), EdgeWeight::Const(1))
            .unwrap();
        let e1 = g
            .new_edge(1, 2, Var::from_idx(1), EdgeWeight::Const(1))
            .unwrap();
        g.state[e0] = EdgeState::Enabled;
        g.state[e1] = EdgeState::Enabled;
        // two hops are needed, so `within = 1` is forced false even with
        // every edge enabled
        let (val, _) = g
            .evaluate_atom(AtomKind::Reach {
                from: 0,
                to: 2,
                within: 1
            })
            .unwrap();
        assert!(!val);
        let (val, _) = g
            .evaluate_atom(AtomKind::Reach {
                from: 0,
                to: 2,
                within: 2
            })
            .unwrap();
        assert!(val);
    }

    #[test]
    fn test_distance_strictness() {
        let mut g = mk_graph(3);
        let e0 = g
            .new_edge(0, 1, Var::from_idx(0), EdgeWeight::Const(3))
            .unwrap();
        let e1 = g
            .new_edge(1, 2, Var::from_idx(1), EdgeWeight::Const(5))
            .unwrap();
        g.state[e0] = EdgeState::Enabled;
        g.state[e1] = EdgeState::Enabled;
        let leq = g
            .evaluate_atom(AtomKind::Distance {
                from: 0,
                to: 2,
                dist: 8,
                strict: false,
            })
            .unwrap();
        assert!(leq.0);
        let lt = g
            .evaluate_atom(AtomKind::Distance {
                from: 0,
                to: 2,
                dist: 8,
                strict: true,
            })
            .unwrap();
        assert!(!lt.0);
    }

    #[test]
    fn test_acyclic_directed() {
        let mut g = mk_graph(2);
        let e0 = g
            .new_edge(0, 1, Var::from_idx(0), EdgeWeight::Const(1))
            .unwrap();
        let e1 = g
            .new_edge(1, 0, Var::from_idx(1), EdgeWeight::Const(1))
            .unwrap();
        g.state[e0] = EdgeState::Enabled;
        // cycle still possible while e1 is undecided: nothing forced
        assert!(g.evaluate_atom(AtomKind::Acyclic { directed: true }).is_none());
        g.state[e1] = EdgeState::Disabled;
        let (val, _) = g
            .evaluate_atom(AtomKind::Acyclic { directed: true })
            .unwrap();
        assert!(val);
        g.state[e1] = EdgeState::Enabled;
        let (val, expl) = g
            .evaluate_atom(AtomKind::Acyclic { directed: true })
            .unwrap();
        assert!(!val);
        assert_eq!(expl.len(), 2);
    }

    #[test]
    fn test_mst_bound() {
        let mut g = mk_graph(3);
        for (i, (u, v, w)) in [(0usize, 1usize, 2u64), (1, 2, 3), (0, 2, 10)].iter().enumerate() {
            let e = g
                .new_edge(*u, *v, Var::from_idx(i as u32), EdgeWeight::Const(*w))
                .unwrap();
            g.state[e] = EdgeState::Enabled;
        }
        let (val, expl) = g
            .evaluate_atom(AtomKind::MstWeight {
                weight: 5,
                strict: false,
            })
            .unwrap();
        assert!(val);
        assert_eq!(expl.len(), 2); // the two tree edges
        let (val, _) = g
            .evaluate_atom(AtomKind::MstWeight {
                weight: 4,
                strict: false,
            })
            .unwrap();
        assert!(!val);
    }

    #[test]
    fn test_atom_dedup() {
        let mut g = mk_graph(2);
        let kind = AtomKind::Reach {
            from: 0,
            to: 1,
            within: -1,
        };
        let mut next = 5u32;
        let (l1, fresh1) = g
            .atom_lit(kind, || {
                next += 1;
                Var::from_idx(next)
            })
            .unwrap();
        let (l2, fresh2) = g
            .atom_lit(kind, || {
                next += 1;
                Var::from_idx(next)
            })
            .unwrap();
        assert!(fresh1);
        assert!(!fresh2);
        assert_eq!(l1, l2);
    }
}
