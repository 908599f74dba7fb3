//! Min-cost bipartite matching.
//!
//! Left nodes are matched to right nodes over weighted edges so that as many
//! left nodes as possible are matched and, among those matchings, the total
//! edge cost is minimal. The graph is split into connected components which
//! are dealt round-robin into `jobs` groups; each group is solved as a unit
//! flow problem with successive shortest paths, and the groups run in
//! parallel on the current rayon pool. Results are merged on the calling
//! thread.

use hiplace_common::{InternalError, PlaceResult};
use rayon::prelude::*;
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, VecDeque};

/// A bipartite matching problem and, after [`solve`](Self::solve), its
/// solution.
#[derive(Clone, Debug)]
pub struct MinCostMatching {
    edges: Vec<Vec<(usize, f64)>>,
    groups: Vec<Vec<usize>>,
    components: usize,
    left_to_right: Vec<Option<usize>>,
    right_to_left: Vec<Option<usize>>,
}

impl MinCostMatching {
    /// Creates a problem with `left` and `right` nodes. `edges[l]` lists the
    /// `(right node, cost)` pairs of left node `l`.
    ///
    /// Costs must be finite and positive.
    pub fn new(left: usize, right: usize, edges: Vec<Vec<(usize, f64)>>, jobs: usize) -> PlaceResult<Self> {
        if edges.len() != left {
            return Err(InternalError::new(format!(
                "matching has {left} left nodes but {} adjacency lists",
                edges.len()
            )));
        }
        for (l, list) in edges.iter().enumerate() {
            for &(r, cost) in list {
                if r >= right {
                    return Err(InternalError::new(format!(
                        "matching edge {l} -> {r} points past the {right} right nodes"
                    )));
                }
                if !cost.is_finite() || cost <= 0.0 {
                    return Err(InternalError::new(format!(
                        "matching edge {l} -> {r} has cost {cost}, expected a positive finite value"
                    )));
                }
            }
        }
        let (groups, components) = group_components(&edges, right, jobs.max(1));
        Ok(Self {
            edges,
            groups,
            components,
            left_to_right: vec![None; left],
            right_to_left: vec![None; right],
        })
    }

    /// Number of connected components of the graph.
    pub fn component_count(&self) -> usize {
        self.components
    }

    /// Solves the problem and returns the number of matched left nodes.
    pub fn solve(&mut self) -> PlaceResult<usize> {
        let edges = &self.edges;
        let pairs: Vec<Vec<(usize, usize)>> = self
            .groups
            .par_iter()
            .map(|lefts| solve_group(edges, lefts))
            .collect();

        self.left_to_right.iter_mut().for_each(|m| *m = None);
        self.right_to_left.iter_mut().for_each(|m| *m = None);
        let mut matched = 0;
        for (l, r) in pairs.into_iter().flatten() {
            if self.left_to_right[l].is_some() || self.right_to_left[r].is_some() {
                return Err(InternalError::new(format!(
                    "matching paired left node {l} or right node {r} twice"
                )));
            }
            self.left_to_right[l] = Some(r);
            self.right_to_left[r] = Some(l);
            matched += 1;
        }
        Ok(matched)
    }

    /// Right node matched to `left`, if any.
    pub fn matched_right(&self, left: usize) -> Option<usize> {
        self.left_to_right.get(left).copied().flatten()
    }
}

/// Labels connected components by breadth-first search from every left
/// node and deals them into `jobs` groups of left nodes.
fn group_components(edges: &[Vec<(usize, f64)>], right: usize, jobs: usize) -> (Vec<Vec<usize>>, usize) {
    let mut inverse: Vec<Vec<usize>> = vec![Vec::new(); right];
    for (l, list) in edges.iter().enumerate() {
        for &(r, _) in list {
            inverse[r].push(l);
        }
    }

    let mut component = vec![usize::MAX; edges.len()];
    let mut right_seen = vec![false; right];
    let mut count = 0;
    let mut groups: Vec<Vec<usize>> = vec![Vec::new(); jobs];
    for start in 0..edges.len() {
        if component[start] != usize::MAX {
            continue;
        }
        let group = count % jobs;
        component[start] = count;
        let mut queue = VecDeque::from([start]);
        while let Some(l) = queue.pop_front() {
            groups[group].push(l);
            for &(r, _) in &edges[l] {
                if std::mem::replace(&mut right_seen[r], true) {
                    continue;
                }
                for &next in &inverse[r] {
                    if component[next] == usize::MAX {
                        component[next] = count;
                        queue.push_back(next);
                    }
                }
            }
        }
        count += 1;
    }
    groups.retain(|g| !g.is_empty());
    (groups, count)
}

#[derive(Clone, Copy, Debug)]
struct FlowEdge {
    to: usize,
    capacity: u32,
    cost: f64,
}

/// Residual network of one group. Edge `e ^ 1` is the reverse of edge `e`.
struct FlowNetwork {
    edges: Vec<FlowEdge>,
    adjacency: Vec<Vec<usize>>,
}

impl FlowNetwork {
    fn new(nodes: usize) -> Self {
        Self {
            edges: Vec::new(),
            adjacency: vec![Vec::new(); nodes],
        }
    }

    fn add_edge(&mut self, from: usize, to: usize, cost: f64) -> usize {
        let id = self.edges.len();
        self.edges.push(FlowEdge { to, capacity: 1, cost });
        self.edges.push(FlowEdge {
            to: from,
            capacity: 0,
            cost: -cost,
        });
        self.adjacency[from].push(id);
        self.adjacency[to].push(id + 1);
        id
    }

    /// Dijkstra over reduced costs. Returns the edge used to reach every
    /// node and the distances.
    fn shortest_paths(&self, source: usize, potential: &[f64]) -> (Vec<Option<usize>>, Vec<f64>) {
        let n = self.adjacency.len();
        let mut dist = vec![f64::INFINITY; n];
        let mut via = vec![None; n];
        let mut heap = BinaryHeap::new();
        dist[source] = 0.0;
        heap.push(QueueEntry { node: source, dist: 0.0 });
        while let Some(QueueEntry { node, dist: d }) = heap.pop() {
            if d > dist[node] {
                continue;
            }
            for &e in &self.adjacency[node] {
                let edge = self.edges[e];
                if edge.capacity == 0 {
                    continue;
                }
                let reduced = (edge.cost + potential[node] - potential[edge.to]).max(0.0);
                let next = d + reduced;
                if next < dist[edge.to] {
                    dist[edge.to] = next;
                    via[edge.to] = Some(e);
                    heap.push(QueueEntry {
                        node: edge.to,
                        dist: next,
                    });
                }
            }
        }
        (via, dist)
    }
}

#[derive(Clone, Copy, Debug)]
struct QueueEntry {
    node: usize,
    dist: f64,
}

impl PartialEq for QueueEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for QueueEntry {}

impl Ord for QueueEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Min-heap on distance, ties by node for determinism.
        other
            .dist
            .total_cmp(&self.dist)
            .then_with(|| other.node.cmp(&self.node))
    }
}

impl PartialOrd for QueueEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Solves one group by successive shortest augmenting paths and returns its
/// `(left, right)` pairs in global numbering.
fn solve_group(edges: &[Vec<(usize, f64)>], lefts: &[usize]) -> Vec<(usize, usize)> {
    const SOURCE: usize = 0;
    const SINK: usize = 1;
    let mut rights: Vec<usize> = Vec::new();
    let mut right_node: HashMap<usize, usize> = HashMap::new();
    for &l in lefts {
        for &(r, _) in &edges[l] {
            right_node.entry(r).or_insert_with(|| {
                rights.push(r);
                2 + lefts.len() + rights.len() - 1
            });
        }
    }

    let mut net = FlowNetwork::new(2 + lefts.len() + rights.len());
    let mut pair_edges: Vec<(usize, usize, usize)> = Vec::new();
    for (i, &l) in lefts.iter().enumerate() {
        net.add_edge(SOURCE, 2 + i, 0.0);
        for &(r, cost) in &edges[l] {
            let e = net.add_edge(2 + i, right_node[&r], cost);
            pair_edges.push((e, l, r));
        }
    }
    for j in 0..rights.len() {
        net.add_edge(2 + lefts.len() + j, SINK, 0.0);
    }

    let mut potential = vec![0.0; net.adjacency.len()];
    for _ in 0..lefts.len() {
        let (via, dist) = net.shortest_paths(SOURCE, &potential);
        if via[SINK].is_none() {
            break;
        }
        for (p, d) in potential.iter_mut().zip(&dist) {
            if d.is_finite() {
                *p += d;
            }
        }
        let mut node = SINK;
        while let Some(e) = via[node] {
            net.edges[e].capacity -= 1;
            net.edges[e ^ 1].capacity += 1;
            node = net.edges[e ^ 1].to;
        }
    }

    pair_edges
        .into_iter()
        .filter(|&(e, _, _)| net.edges[e].capacity == 0)
        .map(|(_, l, r)| (l, r))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solved(left: usize, right: usize, edges: Vec<Vec<(usize, f64)>>, jobs: usize) -> MinCostMatching {
        let mut m = MinCostMatching::new(left, right, edges, jobs).unwrap();
        m.solve().unwrap();
        m
    }

    #[test]
    fn picks_cheapest_perfect_assignment() {
        // 0->0 + 1->1 costs 101, 0->1 + 1->0 costs 12.
        let m = solved(2, 2, vec![vec![(0, 1.0), (1, 10.0)], vec![(0, 2.0), (1, 100.0)]], 1);
        assert_eq!(m.matched_right(0), Some(1));
        assert_eq!(m.matched_right(1), Some(0));
    }

    #[test]
    fn cardinality_beats_cost() {
        let m = solved(2, 2, vec![vec![(0, 1.0), (1, 50.0)], vec![(0, 1.0)]], 1);
        assert_eq!(m.matched_right(0), Some(1));
        assert_eq!(m.matched_right(1), Some(0));
    }

    #[test]
    fn contended_node_goes_to_cheaper_left() {
        let mut m = MinCostMatching::new(2, 1, vec![vec![(0, 1.0)], vec![(0, 0.5)]], 1).unwrap();
        assert_eq!(m.solve().unwrap(), 1);
        assert_eq!(m.matched_right(0), None);
        assert_eq!(m.matched_right(1), Some(0));
    }

    #[test]
    fn components_are_solved_independently() {
        let edges = vec![
            vec![(0, 3.0), (1, 1.0)],
            vec![(1, 2.0)],
            vec![(2, 1.0), (3, 4.0)],
            vec![],
        ];
        let mut m = MinCostMatching::new(4, 4, edges, 2).unwrap();
        assert_eq!(m.component_count(), 3);
        assert_eq!(m.solve().unwrap(), 3);
        assert_eq!(m.matched_right(0), Some(0));
        assert_eq!(m.matched_right(1), Some(1));
        assert_eq!(m.matched_right(2), Some(2));
        assert_eq!(m.matched_right(3), None);
    }

    #[test]
    fn solution_is_optimal_on_a_dense_instance() {
        let costs = [[4.0, 1.0, 3.0], [2.0, 0.5, 5.0], [3.0, 2.0, 2.0]];
        let edges = costs
            .iter()
            .map(|row| row.iter().copied().enumerate().collect())
            .collect();
        let m = solved(3, 3, edges, 4);
        let total: f64 = (0..3).map(|l| costs[l][m.matched_right(l).unwrap()]).sum();
        // Best of all six permutations.
        assert!((total - 5.0).abs() < 1e-12);
    }

    #[test]
    fn rejects_malformed_edges() {
        assert!(MinCostMatching::new(1, 1, vec![vec![(1, 1.0)]], 1).is_err());
        assert!(MinCostMatching::new(1, 1, vec![vec![(0, 0.0)]], 1).is_err());
        assert!(MinCostMatching::new(1, 1, vec![vec![(0, f64::NAN)]], 1).is_err());
        assert!(MinCostMatching::new(2, 1, vec![vec![(0, 1.0)]], 1).is_err());
    }
}
