use std::collections::VecDeque;

const NONE: usize = usize::MAX;
const EPS: f64 = 1e-9;

/// Directed flow network solved with Dinic's algorithm.
/// Arcs are stored in pairs so that `e ^ 1` is the reverse of `e`.
#[derive(Debug, Default)]
pub struct FlowGraph {
    head: Vec<usize>,
    next: Vec<usize>,
    to: Vec<usize>,
    cap: Vec<f64>,
    level: Vec<i32>,
    cursor: Vec<usize>,
}

impl FlowGraph {
    pub fn new(nodes: usize) -> Self {
        Self {
            head: vec![NONE; nodes],
            next: Vec::new(),
            to: Vec::new(),
            cap: Vec::new(),
            level: vec![-1; nodes],
            cursor: vec![NONE; nodes],
        }
    }

    pub fn with_capacity(nodes: usize, edges: usize) -> Self {
        let mut graph = Self::new(nodes);
        graph.next.reserve(edges * 2);
        graph.to.reserve(edges * 2);
        graph.cap.reserve(edges * 2);
        graph
    }

    fn push_arc(&mut self, from: usize, to: usize, cap: f64) {
        self.to.push(to);
        self.cap.push(cap);
        self.next.push(self.head[from]);
        self.head[from] = self.to.len() - 1;
    }

    /// Add an edge `u -> v` with capacity `forward` and `v -> u` with capacity `backward`
    pub fn add_edge(&mut self, u: usize, v: usize, forward: f64, backward: f64) {
        self.push_arc(u, v, forward.max(0.0));
        self.push_arc(v, u, backward.max(0.0));
    }

    fn build_levels(&mut self, source: usize, sink: usize) -> bool {
        self.level.iter_mut().for_each(|l| *l = -1);
        self.level[source] = 0;
        let mut queue = VecDeque::from([source]);
        while let Some(u) = queue.pop_front() {
            let mut e = self.head[u];
            while e != NONE {
                let v = self.to[e];
                if self.cap[e] > EPS && self.level[v] < 0 {
                    self.level[v] = self.level[u] + 1;
                    queue.push_back(v);
                }
                e = self.next[e];
            }
        }
        self.level[sink] >= 0
    }

    /// Find and saturate one augmenting path in the level graph, returning its flow
    fn augment(&mut self, source: usize, sink: usize) -> f64 {
        let mut path: Vec<usize> = Vec::new();
        let mut u = source;
        loop {
            if u == sink {
                let flow = path
                    .iter()
                    .map(|&e| self.cap[e])
                    .fold(f64::INFINITY, f64::min);
                for &e in &path {
                    self.cap[e] -= flow;
                    self.cap[e ^ 1] += flow;
                }
                return flow;
            }

            let mut advanced = false;
            while self.cursor[u] != NONE {
                let e = self.cursor[u];
                let v = self.to[e];
                if self.cap[e] > EPS && self.level[v] == self.level[u] + 1 {
                    path.push(e);
                    u = v;
                    advanced = true;
                    break;
                }
                self.cursor[u] = self.next[e];
            }

            if !advanced {
                // dead end, prune it from the level graph
                self.level[u] = -1;
                match path.pop() {
                    None => return 0.0,
                    Some(e) => {
                        u = self.to[e ^ 1];
                        self.cursor[u] = self.next[e];
                    }
                }
            }
        }
    }

    /// Compute the maximum flow from `source` to `sink`
    pub fn max_flow(&mut self, source: usize, sink: usize) -> f64 {
        let mut total = 0.0;
        while self.build_levels(source, sink) {
            self.cursor.copy_from_slice(&self.head);
            loop {
                let flow = self.augment(source, sink);
                if flow <= EPS {
                    break;
                }
                total += flow;
            }
        }
        total
    }

    /// Nodes reachable from `source` in the residual graph (the source side of the min cut)
    pub fn source_side(&self, source: usize) -> Vec<bool> {
        let mut seen = vec![false; self.head.len()];
        seen[source] = true;
        let mut queue = VecDeque::from([source]);
        while let Some(u) = queue.pop_front() {
            let mut e = self.head[u];
            while e != NONE {
                let v = self.to[e];
                if self.cap[e] > EPS && !seen[v] {
                    seen[v] = true;
                    queue.push_back(v);
                }
                e = self.next[e];
            }
        }
        seen
    }
}
