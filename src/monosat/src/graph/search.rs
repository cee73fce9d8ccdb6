//! Path search over edge views: BFS (optionally hop-bounded), DFS, Dijkstra
//! and DFS-based cycle detection. All functions work on an adjacency list of
//! `(successor node, edge id)` pairs and return paths as edge-id sequences.

use std::cmp::Reverse;
use std::collections::BinaryHeap;

pub type Adjacency = Vec<Vec<(usize, usize)>>;

const NO_EDGE: usize = usize::MAX;

/// Hop counts from `src`, bounded by `max_hops` when given; `None` marks
/// nodes out of reach (within the bound).
pub fn bfs_levels(adj: &Adjacency, src: usize, max_hops: Option<u64>) -> Vec<Option<u64>> {
    let mut level = vec![None; adj.len()];
    level[src] = Some(0);
    let mut queue = std::collections::VecDeque::new();
    queue.push_back(src);
    while let Some(u) = queue.pop_front() {
        let d = level[u].unwrap();
        if let Some(k) = max_hops {
            if d >= k {
                continue;
            }
        }
        for &(v, _) in &adj[u] {
            if level[v].is_none() {
                level[v] = Some(d + 1);
                queue.push_back(v);
            }
        }
    }
    level
}

/// A shortest (fewest-hops) path from `src` to `dst` as edge ids, within
/// `max_hops` when given.
pub fn bfs_path(
    adj: &Adjacency,
    src: usize,
    dst: usize,
    max_hops: Option<u64>,
) -> Option<Vec<usize>> {
    if src == dst {
        return Some(vec![]);
    }
    let n = adj.len();
    let mut parent_edge = vec![NO_EDGE; n];
    let mut parent = vec![NO_EDGE; n];
    let mut level = vec![None; n];
    level[src] = Some(0u64);
    let mut queue = std::collections::VecDeque::new();
    queue.push_back(src);
    while let Some(u) = queue.pop_front() {
        let d = level[u].unwrap();
        if let Some(k) = max_hops {
            if d >= k {
                continue;
            }
        }
        for &(v, e) in &adj[u] {
            if level[v].is_none() {
                level[v] = Some(d + 1);
                parent[v] = u;
                parent_edge[v] = e;
                if v == dst {
                    let mut path = vec![];
                    let mut x = dst;
                    while x != src {
                        path.push(parent_edge[x]);
                        x = parent[x];
                    }
                    path.reverse();
                    return Some(path);
                }
                queue.push_back(v);
            }
        }
    }
    None
}

/// Any path from `src` to `dst` as edge ids, found depth-first.
pub fn dfs_path(adj: &Adjacency, src: usize, dst: usize) -> Option<Vec<usize>> {
    if src == dst {
        return Some(vec![]);
    }
    let n = adj.len();
    let mut seen = vec![false; n];
    let mut parent_edge = vec![NO_EDGE; n];
    let mut parent = vec![NO_EDGE; n];
    let mut stack = vec![src];
    seen[src] = true;
    while let Some(u) = stack.pop() {
        for &(v, e) in &adj[u] {
            if !seen[v] {
                seen[v] = true;
                parent[v] = u;
                parent_edge[v] = e;
                if v == dst {
                    let mut path = vec![];
                    let mut x = dst;
                    while x != src {
                        path.push(parent_edge[x]);
                        x = parent[x];
                    }
                    path.reverse();
                    return Some(path);
                }
                stack.push(v);
            }
        }
    }
    None
}

/// Single-source shortest path weights, and the parent edge of each settled
/// node. `weight(edge)` supplies the edge weights.
pub fn dijkstra(
    adj: &Adjacency,
    src: usize,
    weight: &dyn Fn(usize) -> u64,
) -> (Vec<Option<u64>>, Vec<usize>) {
    let n = adj.len();
    let mut dist: Vec<Option<u64>> = vec![None; n];
    let mut parent_edge = vec![NO_EDGE; n];
    let mut heap = BinaryHeap::new();
    dist[src] = Some(0);
    heap.push(Reverse((0u64, src)));
    while let Some(Reverse((d, u))) = heap.pop() {
        if dist[u] != Some(d) {
            continue;
        }
        for &(v, e) in &adj[u] {
            let nd = d.saturating_add(weight(e));
            if dist[v].map_or(true, |old| nd < old) {
                dist[v] = Some(nd);
                parent_edge[v] = e;
                heap.push(Reverse((nd, v)));
            }
        }
    }
    (dist, parent_edge)
}

/// Shortest weighted path from `src` to `dst`: total weight plus the path as
/// edge ids.
pub fn dijkstra_path(
    adj: &Adjacency,
    edges_from: &dyn Fn(usize) -> usize,
    src: usize,
    dst: usize,
    weight: &dyn Fn(usize) -> u64,
) -> Option<(u64, Vec<usize>)> {
    let (dist, parent_edge) = dijkstra(adj, src, weight);
    let total = dist[dst]?;
    let mut path = vec![];
    let mut x = dst;
    while x != src {
        let e = parent_edge[x];
        debug_assert_ne!(e, NO_EDGE);
        path.push(e);
        x = edges_from(e);
    }
    path.reverse();
    Some((total, path))
}

/// A directed cycle in the graph, as edge ids, if one exists.
pub fn find_cycle_directed(adj: &Adjacency) -> Option<Vec<usize>> {
    let n = adj.len();
    // 0 = white, 1 = on stack, 2 = done
    let mut color = vec![0u8; n];
    let mut parent = vec![NO_EDGE; n];
    let mut parent_edge = vec![NO_EDGE; n];
    for root in 0..n {
        if color[root] != 0 {
            continue;
        }
        // iterative DFS with an explicit edge-iterator stack
        let mut stack: Vec<(usize, usize)> = vec![(root, 0)];
        color[root] = 1;
        while let Some(&mut (u, ref mut it)) = stack.last_mut() {
            if *it < adj[u].len() {
                let (v, e) = adj[u][*it];
                *it += 1;
                if color[v] == 0 {
                    color[v] = 1;
                    parent[v] = u;
                    parent_edge[v] = e;
                    stack.push((v, 0));
                } else if color[v] == 1 {
                    // back edge: walk parents from u back to v
                    let mut cycle = vec![e];
                    let mut x = u;
                    while x != v {
                        cycle.push(parent_edge[x]);
                        x = parent[x];
                    }
                    cycle.reverse();
                    return Some(cycle);
                }
            } else {
                color[u] = 2;
                stack.pop();
            }
        }
    }
    None
}

#[cfg(test)]
mod test {
    use super::*;

    fn adj(n: usize, edges: &[(usize, usize)]) -> Adjacency {
        let mut a = vec![vec![]; n];
        for (i, &(u, v)) in edges.iter().enumerate() {
            a[u].push((v, i));
        }
        a
    }

    #[test]
    fn test_bfs_path() {
        let a = adj(4, &[(0, 1), (1, 2), (2, 3), (0, 3)]);
        assert_eq!(bfs_path(&a, 0, 3, None), Some(vec![3]));
        assert_eq!(bfs_path(&a, 0, 3, Some(1)), Some(vec![3]));
        assert_eq!(bfs_path(&a, 0, 2, Some(1)), None);
        assert_eq!(bfs_path(&a, 0, 2, Some(2)), Some(vec![0, 1]));
        assert_eq!(bfs_path(&a, 3, 0, None), None);
    }

    #[test]
    fn test_dfs_path_exists() {
        let a = adj(4, &[(0, 1), (1, 2), (2, 3)]);
        let p = dfs_path(&a, 0, 3).unwrap();
        assert_eq!(p, vec![0, 1, 2]);
        assert!(dfs_path(&a, 2, 0).is_none());
    }

    #[test]
    fn test_dijkstra_path() {
        let edges = [(0, 1), (1, 2), (0, 2)];
        let a = adj(3, &edges);
        let w = |e: usize| [3u64, 5, 9][e];
        let ef = |e: usize| edges[e].0;
        let (total, path) = dijkstra_path(&a, &ef, 0, 2, &w).unwrap();
        assert_eq!(total, 8);
        assert_eq!(path, vec![0, 1]);
    }

    #[test]
    fn test_cycle_detection() {
        let a = adj(3, &[(0, 1), (1, 2)]);
        assert!(find_cycle_directed(&a).is_none());
        let b = adj(3, &[(0, 1), (1, 2), (2, 0)]);
        let cycle = find_cycle_directed(&b).unwrap();
        assert_eq!(cycle.len(), 3);
    }
}
