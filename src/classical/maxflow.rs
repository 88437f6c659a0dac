//! s/t minimum cut on capacitated graphs (Dinic's algorithm)
//!
//! Nodes are `0..n`; the source and sink are two extra terminal nodes. Edges
//! live in flat arrays where edge `i ^ 1` is the residual twin of edge `i`.
//! Augmenting paths are found iteratively so long paths cannot exhaust the
//! call stack.

use std::collections::VecDeque;

const EPS: f64 = 1e-9;
const UNREACHED: u32 = u32::MAX;

/// Flow network with a fixed number of inner nodes plus source and sink
#[derive(Debug, Clone)]
pub struct FlowGraph {
    source: usize,
    sink: usize,
    adjacency: Vec<Vec<u32>>,
    to: Vec<u32>,
    capacity: Vec<f64>,
    /// Flow pushed directly through terminal links when they were added
    preflow: f64,
}

impl FlowGraph {
    /// Graph with `nodes` inner nodes and no edges
    #[must_use]
    pub fn new(nodes: usize) -> Self {
        Self {
            source: nodes,
            sink: nodes + 1,
            adjacency: vec![Vec::new(); nodes + 2],
            to: Vec::new(),
            capacity: Vec::new(),
            preflow: 0.0,
        }
    }

    /// Number of inner nodes
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.source
    }

    fn push_edge(&mut self, from: usize, to: usize, capacity: f64, reverse_capacity: f64) {
        let index = self.to.len() as u32;
        self.to.push(to as u32);
        self.capacity.push(capacity);
        self.to.push(from as u32);
        self.capacity.push(reverse_capacity);
        self.adjacency[from].push(index);
        self.adjacency[to].push(index + 1);
    }

    /// Undirected-style edge between two inner nodes with per-direction capacities
    pub fn add_edge(&mut self, a: usize, b: usize, capacity: f64, reverse_capacity: f64) {
        self.push_edge(a, b, capacity.max(0.0), reverse_capacity.max(0.0));
    }

    /// Capacities from the source to `node` and from `node` to the sink
    ///
    /// The shared part of both capacities is pushed immediately; it crosses
    /// every cut, so only the remainder needs a residual edge. Only the
    /// difference matters for the cut, so negative costs are accepted.
    pub fn add_terminal_weights(&mut self, node: usize, source_capacity: f64, sink_capacity: f64) {
        let shared = source_capacity.min(sink_capacity);
        self.preflow += shared;

        if source_capacity - shared > EPS {
            self.push_edge(self.source, node, source_capacity - shared, 0.0);
        }
        if sink_capacity - shared > EPS {
            self.push_edge(node, self.sink, sink_capacity - shared, 0.0);
        }
    }

    fn levels(&self) -> Vec<u32> {
        let mut level = vec![UNREACHED; self.adjacency.len()];
        let mut queue = VecDeque::new();
        level[self.source] = 0;
        queue.push_back(self.source);
        while let Some(u) = queue.pop_front() {
            for &e in &self.adjacency[u] {
                let v = self.to[e as usize] as usize;
                if self.capacity[e as usize] > EPS && level[v] == UNREACHED {
                    level[v] = level[u] + 1;
                    queue.push_back(v);
                }
            }
        }
        level
    }

    /// Push a blocking flow along the current level graph
    fn blocking_flow(&mut self, level: &[u32]) -> f64 {
        let mut next = vec![0usize; self.adjacency.len()];
        let mut path: Vec<u32> = Vec::new();
        let mut total = 0.0;
        let mut u = self.source;

        loop {
            if u == self.sink {
                let bottleneck = path
                    .iter()
                    .map(|&e| self.capacity[e as usize])
                    .fold(f64::INFINITY, f64::min);
                for &e in &path {
                    self.capacity[e as usize] -= bottleneck;
                    self.capacity[(e ^ 1) as usize] += bottleneck;
                }
                total += bottleneck;

                // Retreat to the tail of the first saturated edge
                let cut = path
                    .iter()
                    .position(|&e| self.capacity[e as usize] <= EPS)
                    .unwrap_or(0);
                path.truncate(cut);
                u = match path.last() {
                    Some(&e) => self.to[e as usize] as usize,
                    None => self.source,
                };
                continue;
            }

            let mut advanced = false;
            while let Some(&e) = self.adjacency[u].get(next[u]) {
                let v = self.to[e as usize] as usize;
                if self.capacity[e as usize] > EPS && level[v] == level[u].wrapping_add(1) {
                    path.push(e);
                    u = v;
                    advanced = true;
                    break;
                }
                next[u] += 1;
            }

            if !advanced {
                match path.pop() {
                    Some(e) => {
                        u = self.to[(e ^ 1) as usize] as usize;
                        next[u] += 1;
                    },
                    None => return total,
                }
            }
        }
    }

    /// Run max-flow to completion and return the flow value
    pub fn max_flow(&mut self) -> f64 {
        let mut flow = self.preflow;
        loop {
            let level = self.levels();
            if level[self.sink] == UNREACHED {
                return flow;
            }
            let pushed = self.blocking_flow(&level);
            if pushed <= EPS {
                return flow;
            }
            flow += pushed;
        }
    }

    /// Source side of the minimum cut, indexed by inner node
    ///
    /// Only meaningful after [`FlowGraph::max_flow`].
    #[must_use]
    pub fn source_side(&self) -> Vec<bool> {
        let mut reached = vec![false; self.adjacency.len()];
        let mut queue = VecDeque::new();
        reached[self.source] = true;
        queue.push_back(self.source);
        while let Some(u) = queue.pop_front() {
            for &e in &self.adjacency[u] {
                let v = self.to[e as usize] as usize;
                if self.capacity[e as usize] > EPS && !reached[v] {
                    reached[v] = true;
                    queue.push_back(v);
                }
            }
        }
        reached.truncate(self.source);
        reached
    }
}
