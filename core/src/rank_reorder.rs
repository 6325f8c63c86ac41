//! Pearce-Kelly incremental topological order maintenance.
//!
//! [`add_edge`] absorbs a single edge insertion without recomputing the
//! whole order: the fast path is O(1) when the existing rank already
//! satisfies the new edge, and the slow path touches only the bounded
//! `δ⁻(u) ∪ δ⁺(v)` neighbourhood (locality guarantee P8 in the design
//! notes), not every node between the two ranks.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashSet, VecDeque};

use crate::error::SchedulerError;
use crate::graph_store::{GraphStore, NodeIdx};

/// Outcome of a successful [`add_edge`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeOutcome {
    /// `v` was already a direct successor of `u`; nothing changed.
    AlreadyPresent,
    /// The edge was inserted via the O(1) fast path.
    FastPath,
    /// The edge was inserted and a bounded neighbourhood of ranks was
    /// repaired via Kahn's algorithm.
    Reordered { affected: usize },
}

/// Insert `u -> v`, repairing ranks if necessary. Returns `CYCLE_DETECTED`
/// (carrying the closed path `u -> v -> .. -> u`) without mutating any
/// state if the edge would close a cycle.
pub fn add_edge(
    graph: &mut GraphStore,
    u: NodeIdx,
    v: NodeIdx,
) -> Result<EdgeOutcome, SchedulerError> {
    if graph.has_edge(u, v) {
        return Ok(EdgeOutcome::AlreadyPresent);
    }

    if graph.rank(u) < graph.rank(v) {
        graph.insert_edge(u, v);
        return Ok(EdgeOutcome::FastPath);
    }

    // rank[u] >= rank[v]: the edge may close a cycle. Collect the forward
    // star of v, bounded above by rank[u], without mutating the graph yet.
    let forward = bounded_forward(graph, v, graph.rank(u));
    if forward.contains(&u) {
        let path = reconstruct_forward_path(graph, v, u);
        let mut full = vec![graph.name_of(u).to_string()];
        full.extend(path);
        return Err(SchedulerError::CycleDetected { path: full });
    }

    // Safe to commit the edge now; the reorder below folds it into the
    // induced subgraph so Kahn's algorithm places u before v.
    graph.insert_edge(u, v);

    let backward = bounded_backward(graph, u, graph.rank(v));
    let mut affected: HashSet<NodeIdx> = backward;
    affected.extend(forward.iter().copied());

    let mut occupied_ranks: Vec<i64> = affected.iter().map(|&n| graph.rank(n)).collect();
    occupied_ranks.sort_unstable();

    let order = kahn_order_within(graph, &affected);
    debug_assert_eq!(order.len(), affected.len());

    for (node, rank) in order.into_iter().zip(occupied_ranks.into_iter()) {
        graph.set_rank(node, rank);
    }

    Ok(EdgeOutcome::Reordered {
        affected: affected.len(),
    })
}

/// Descendants of `start` (including `start`) reachable via forward edges,
/// pruning any node whose rank exceeds `bound` (and, by the topological
/// invariant over existing edges, everything beyond it too).
fn bounded_forward(graph: &GraphStore, start: NodeIdx, bound: i64) -> HashSet<NodeIdx> {
    let mut visited = HashSet::new();
    let mut stack = vec![start];
    visited.insert(start);

    while let Some(node) = stack.pop() {
        for &succ in graph.successors(node) {
            if graph.rank(succ) <= bound && visited.insert(succ) {
                stack.push(succ);
            }
        }
    }

    visited
}

/// Ancestors of `start` (including `start`) reachable via back edges,
/// pruning any node whose rank is below `bound`.
fn bounded_backward(graph: &GraphStore, start: NodeIdx, bound: i64) -> HashSet<NodeIdx> {
    let mut visited = HashSet::new();
    let mut stack = vec![start];
    visited.insert(start);

    while let Some(node) = stack.pop() {
        for &pred in graph.predecessors(node) {
            if graph.rank(pred) >= bound && visited.insert(pred) {
                stack.push(pred);
            }
        }
    }

    visited
}

/// Shortest `start -> target` path via forward edges, found by BFS.
/// Only called once a cycle has already been confirmed, so `target` is
/// guaranteed reachable.
fn reconstruct_forward_path(graph: &GraphStore, start: NodeIdx, target: NodeIdx) -> Vec<String> {
    let mut parent: std::collections::HashMap<NodeIdx, NodeIdx> = std::collections::HashMap::new();
    let mut visited = HashSet::new();
    let mut queue = VecDeque::new();
    visited.insert(start);
    queue.push_back(start);

    while let Some(node) = queue.pop_front() {
        if node == target {
            break;
        }
        for &succ in graph.successors(node) {
            if visited.insert(succ) {
                parent.insert(succ, node);
                queue.push_back(succ);
            }
        }
    }

    let mut path = vec![target];
    let mut cur = target;
    while cur != start {
        cur = parent[&cur];
        path.push(cur);
    }
    path.reverse();
    path.into_iter().map(|n| graph.name_of(n).to_string()).collect()
}

/// Kahn's algorithm confined to `affected`, using only edges with both
/// endpoints inside it. Ties among zero-indegree nodes are broken by the
/// node's current rank, ascending, for deterministic, minimally-disruptive
/// output.
fn kahn_order_within(graph: &GraphStore, affected: &HashSet<NodeIdx>) -> Vec<NodeIdx> {
    let mut indeg: std::collections::HashMap<NodeIdx, usize> = std::collections::HashMap::new();
    for &node in affected {
        let count = graph
            .predecessors(node)
            .iter()
            .filter(|p| affected.contains(p))
            .count();
        indeg.insert(node, count);
    }

    let mut heap: BinaryHeap<Reverse<(i64, NodeIdx)>> = BinaryHeap::new();
    for (&node, &deg) in &indeg {
        if deg == 0 {
            heap.push(Reverse((graph.rank(node), node)));
        }
    }

    let mut order = Vec::with_capacity(affected.len());
    while let Some(Reverse((_, node))) = heap.pop() {
        order.push(node);
        for &succ in graph.successors(node) {
            if let Some(deg) = indeg.get_mut(&succ) {
                *deg -= 1;
                if *deg == 0 {
                    heap.push(Reverse((graph.rank(succ), succ)));
                }
            }
        }
    }

    order
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain(names: &[&str]) -> GraphStore {
        let mut g = GraphStore::new();
        for n in names {
            g.register(n);
        }
        g
    }

    #[test]
    fn fast_path_when_rank_already_ordered() {
        let mut g = chain(&["a", "b"]);
        let a = g.index_of("a").unwrap();
        let b = g.index_of("b").unwrap();
        let outcome = add_edge(&mut g, a, b).unwrap();
        assert_eq!(outcome, EdgeOutcome::FastPath);
        assert!(g.rank(a) < g.rank(b));
    }

    #[test]
    fn idempotent_insertion() {
        let mut g = chain(&["a", "b"]);
        let a = g.index_of("a").unwrap();
        let b = g.index_of("b").unwrap();
        add_edge(&mut g, a, b).unwrap();
        let outcome = add_edge(&mut g, a, b).unwrap();
        assert_eq!(outcome, EdgeOutcome::AlreadyPresent);
    }

    #[test]
    fn reorders_when_rank_disagrees() {
        // Registered in order b, a (so rank[b] < rank[a]) then add a -> b.
        let mut g = chain(&["b", "a"]);
        let b = g.index_of("b").unwrap();
        let a = g.index_of("a").unwrap();
        let outcome = add_edge(&mut g, a, b).unwrap();
        assert!(matches!(outcome, EdgeOutcome::Reordered { .. }));
        assert!(g.rank(a) < g.rank(b));
    }

    #[test]
    fn detects_cycle_and_leaves_graph_untouched() {
        let mut g = chain(&["t0", "t1", "t2"]);
        let t0 = g.index_of("t0").unwrap();
        let t1 = g.index_of("t1").unwrap();
        let t2 = g.index_of("t2").unwrap();
        add_edge(&mut g, t0, t1).unwrap();
        add_edge(&mut g, t1, t2).unwrap();

        let before_ranks: Vec<i64> = [t0, t1, t2].iter().map(|&n| g.rank(n)).collect();
        let err = add_edge(&mut g, t2, t0).unwrap_err();
        match err {
            SchedulerError::CycleDetected { path } => {
                // path is u -> v -> .. -> u; here u = t2, v = t0.
                assert_eq!(path.first(), Some(&"t2".to_string()));
                assert_eq!(path.last(), Some(&"t2".to_string()));
                assert!(path.contains(&"t0".to_string()));
                assert!(path.contains(&"t1".to_string()));
            }
            other => panic!("expected CycleDetected, got {other:?}"),
        }
        assert!(!g.has_edge(t2, t0));
        let after_ranks: Vec<i64> = [t0, t1, t2].iter().map(|&n| g.rank(n)).collect();
        assert_eq!(before_ranks, after_ranks);
    }

    #[test]
    fn reorder_locality_leaves_unrelated_ranks_untouched() {
        let mut g = chain(&["t0", "t1", "t2", "t3", "t4"]);
        let t0 = g.index_of("t0").unwrap();
        let t1 = g.index_of("t1").unwrap();
        let t2 = g.index_of("t2").unwrap();
        let t3 = g.index_of("t3").unwrap();
        let t4 = g.index_of("t4").unwrap();
        let t4_rank_before = g.rank(t4);

        add_edge(&mut g, t2, t3).unwrap();
        add_edge(&mut g, t0, t1).unwrap();
        add_edge(&mut g, t1, t3).unwrap();

        assert!(g.rank(t0) < g.rank(t1));
        assert!(g.rank(t1) < g.rank(t3));
        assert!(g.rank(t2) < g.rank(t3));
        assert_eq!(g.rank(t4), t4_rank_before);
    }
}
