//! Maximum-flow computation over a capacitated edge list, with the residual
//! min-cut and an acyclic flow decomposition for model extraction.
//!
//! Two engines are provided: Edmonds–Karp (BFS augmenting paths) and Dinitz
//! (level graph + blocking flow). Both operate on an arc pool where arc `2i`
//! is original edge `i` and arc `2i+1` is its residual reverse.

use std::collections::VecDeque;

struct Arcs {
    n: usize,
    to: Vec<usize>,
    cap: Vec<u64>,
    adj: Vec<Vec<usize>>, // node -> arc ids
}

impl Arcs {
    fn new(n: usize, edges: &[(usize, usize, u64)]) -> Self {
        let mut to = Vec::with_capacity(edges.len() * 2);
        let mut cap = Vec::with_capacity(edges.len() * 2);
        let mut adj = vec![vec![]; n];
        for (i, &(u, v, c)) in edges.iter().enumerate() {
            adj[u].push(2 * i);
            to.push(v);
            cap.push(c);
            adj[v].push(2 * i + 1);
            to.push(u);
            cap.push(0);
        }
        Self { n, to, cap, adj }
    }

    #[inline]
    fn from_of(&self, arc: usize) -> usize {
        self.to[arc ^ 1]
    }
}

/// Result of a max-flow run: the total flow value and the flow carried by
/// each original edge.
pub struct FlowResult {
    pub value: u64,
    pub edge_flow: Vec<u64>,
}

/// Edmonds–Karp: repeated BFS augmenting paths in the residual graph.
pub fn max_flow_edmonds_karp(n: usize, edges: &[(usize, usize, u64)], s: usize, t: usize) -> FlowResult {
    let mut arcs = Arcs::new(n, edges);
    let mut value = 0u64;
    if s == t {
        return FlowResult {
            value: 0,
            edge_flow: vec![0; edges.len()],
        };
    }
    loop {
        // BFS for an augmenting path
        let mut pred_arc = vec![usize::MAX; arcs.n];
        let mut queue = VecDeque::new();
        queue.push_back(s);
        let mut found = false;
        'bfs: while let Some(u) = queue.pop_front() {
            for &a in &arcs.adj[u] {
                let v = arcs.to[a];
                if arcs.cap[a] > 0 && pred_arc[v] == usize::MAX && v != s {
                    pred_arc[v] = a;
                    if v == t {
                        found = true;
                        break 'bfs;
                    }
                    queue.push_back(v);
                }
            }
        }
        if !found {
            break;
        }
        // bottleneck
        let mut bottleneck = u64::MAX;
        let mut x = t;
        while x != s {
            let a = pred_arc[x];
            bottleneck = bottleneck.min(arcs.cap[a]);
            x = arcs.from_of(a);
        }
        // augment
        let mut x = t;
        while x != s {
            let a = pred_arc[x];
            arcs.cap[a] -= bottleneck;
            arcs.cap[a ^ 1] += bottleneck;
            x = arcs.from_of(a);
        }
        value += bottleneck;
    }
    finish(arcs, edges, value)
}

/// Dinitz: BFS level graph, then DFS blocking flows.
pub fn max_flow_dinitz(n: usize, edges: &[(usize, usize, u64)], s: usize, t: usize) -> FlowResult {
    let mut arcs = Arcs::new(n, edges);
    let mut value = 0u64;
    if s == t {
        return FlowResult {
            value: 0,
            edge_flow: vec![0; edges.len()],
        };
    }
    loop {
        // build the level graph
        let mut level = vec![usize::MAX; arcs.n];
        level[s] = 0;
        let mut queue = VecDeque::new();
        queue.push_back(s);
        while let Some(u) = queue.pop_front() {
            for &a in &arcs.adj[u] {
                let v = arcs.to[a];
                if arcs.cap[a] > 0 && level[v] == usize::MAX {
                    level[v] = level[u] + 1;
                    queue.push_back(v);
                }
            }
        }
        if level[t] == usize::MAX {
            break;
        }
        // blocking flow via iterative DFS with per-node arc cursors
        let mut cursor = vec![0usize; arcs.n];
        loop {
            // find one augmenting path in the level graph
            let mut path: Vec<usize> = vec![];
            let mut u = s;
            let found = loop {
                if u == t {
                    break true;
                }
                let mut advanced = false;
                while cursor[u] < arcs.adj[u].len() {
                    let a = arcs.adj[u][cursor[u]];
                    let v = arcs.to[a];
                    if arcs.cap[a] > 0 && level[v] == level[u] + 1 {
                        path.push(a);
                        u = v;
                        advanced = true;
                        break;
                    }
                    cursor[u] += 1;
                }
                if advanced {
                    continue;
                }
                // dead end: retreat
                match path.pop() {
                    None => break false,
                    Some(a) => {
                        u = arcs.from_of(a);
                        cursor[u] += 1;
                    }
                }
            };
            if !found {
                break;
            }
            let bottleneck = path.iter().map(|&a| arcs.cap[a]).min().unwrap();
            for &a in &path {
                arcs.cap[a] -= bottleneck;
                arcs.cap[a ^ 1] += bottleneck;
            }
            value += bottleneck;
        }
    }
    finish(arcs, edges, value)
}

fn finish(arcs: Arcs, edges: &[(usize, usize, u64)], value: u64) -> FlowResult {
    // flow on edge i is the capacity accumulated on its reverse arc
    let edge_flow = (0..edges.len()).map(|i| arcs.cap[2 * i + 1]).collect();
    FlowResult { value, edge_flow }
}

/// The source side of a residual min-cut: nodes reachable from `s` in the
/// residual graph of the given flow.
pub fn min_cut_side(
    n: usize,
    edges: &[(usize, usize, u64)],
    edge_flow: &[u64],
    s: usize,
) -> Vec<bool> {
    let mut residual_adj = vec![vec![]; n];
    for (i, &(u, v, c)) in edges.iter().enumerate() {
        if edge_flow[i] < c {
            residual_adj[u].push(v);
        }
        if edge_flow[i] > 0 {
            residual_adj[v].push(u);
        }
    }
    let mut side = vec![false; n];
    side[s] = true;
    let mut queue = VecDeque::new();
    queue.push_back(s);
    while let Some(u) = queue.pop_front() {
        for &v in &residual_adj[u] {
            if !side[v] {
                side[v] = true;
                queue.push_back(v);
            }
        }
    }
    side
}

/// Remove directed cycles from a flow assignment, preserving the flow value:
/// repeatedly find a cycle among positive-flow edges and cancel the minimum
/// flow along it.
pub fn acyclic_flow(n: usize, edges: &[(usize, usize, u64)], edge_flow: &[u64]) -> Vec<u64> {
    let mut flow = edge_flow.to_vec();
    loop {
        let mut adj = vec![vec![]; n];
        for (i, &(u, _v, _)) in edges.iter().enumerate() {
            if flow[i] > 0 {
                adj[u].push((edges[i].1, i));
            }
        }
        match super::search::find_cycle_directed(&adj) {
            None => return flow,
            Some(cycle) => {
                let cancel = cycle.iter().map(|&e| flow[e]).min().unwrap();
                debug_assert!(cancel > 0);
                for &e in &cycle {
                    flow[e] -= cancel;
                }
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    /// 4-node diamond with unit capacities: two disjoint augmenting paths.
    fn diamond() -> (usize, Vec<(usize, usize, u64)>) {
        (4, vec![(0, 1, 1), (0, 2, 1), (1, 3, 1), (2, 3, 1)])
    }

    #[test]
    fn test_edmonds_karp_diamond() {
        let (n, edges) = diamond();
        let r = max_flow_edmonds_karp(n, &edges, 0, 3);
        assert_eq!(r.value, 2);
        assert_eq!(r.edge_flow, vec![1, 1, 1, 1]);
    }

    #[test]
    fn test_dinitz_matches_edmonds_karp() {
        let (n, edges) = diamond();
        let a = max_flow_edmonds_karp(n, &edges, 0, 3);
        let b = max_flow_dinitz(n, &edges, 0, 3);
        assert_eq!(a.value, b.value);

        let edges2 = vec![(0, 1, 3), (0, 2, 2), (1, 2, 2), (1, 3, 1), (2, 3, 4)];
        let a = max_flow_edmonds_karp(4, &edges2, 0, 3);
        let b = max_flow_dinitz(4, &edges2, 0, 3);
        assert_eq!(a.value, 5);
        assert_eq!(b.value, 5);
    }

    #[test]
    fn test_min_cut_side() {
        let edges = vec![(0, 1, 1), (1, 2, 5)];
        let r = max_flow_edmonds_karp(3, &edges, 0, 2);
        assert_eq!(r.value, 1);
        let side = min_cut_side(3, &edges, &r.edge_flow, 0);
        // the bottleneck edge 0->1 is saturated, so only the source is on
        // the source side
        assert!(side[0]);
        assert!(!side[1]);
        assert!(!side[2]);
    }

    #[test]
    fn test_acyclic_flow_cancels_cycle() {
        // flow of 1 along 0->1->2 plus a spurious cycle 1->3->1
        let edges = vec![(0, 1, 1), (1, 2, 1), (1, 3, 1), (3, 1, 1)];
        let flow = vec![1, 1, 1, 1];
        let acyc = acyclic_flow(4, &edges, &flow);
        assert_eq!(acyc, vec![1, 1, 0, 0]);
    }
}
