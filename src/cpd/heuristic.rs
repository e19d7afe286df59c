//! Oracle walk: turns first-move queries into a concrete path and cost.
//!
//! For a forward table the walk steps source-to-target along out-edges;
//! for a reverse table it steps target-to-source along in-edges and
//! reverses at the end. Edge costs are read from the live graph, so under
//! perturbation the returned value is the cost of a real path (an upper
//! bound), just not necessarily the optimal one.
//!
//! Successful walks backfill a per-node cache of (cost-to-target, next
//! hop); the cache is keyed on the current target and graph version, so a
//! perturbation or a new target invalidates it wholesale in O(1).

use crate::graph::{Cost, Graph, NodeId, COST_MAX};

use super::{GraphOracle, TableKind, NO_MOVES};

#[derive(Clone, Copy)]
struct CacheEntry {
    cost: Cost,
    next: NodeId,
    stamp: u32,
}

const NO_ENTRY: CacheEntry = CacheEntry { cost: COST_MAX, next: NodeId::MAX, stamp: 0 };

pub struct CpdHeuristic<'a> {
    g: &'a Graph,
    oracle: &'a GraphOracle,
    hscale: f64,
    cache: Vec<CacheEntry>,
    stamp: u32,
    cached_target: NodeId,
    cached_version: u64,
    /// Set once when a query hits a source with no stored row, so a
    /// sharded oracle degrades quietly instead of flooding the log.
    degraded: bool,
}

impl<'a> CpdHeuristic<'a> {
    pub fn new(g: &'a Graph, oracle: &'a GraphOracle, hscale: f64) -> Self {
        CpdHeuristic {
            g,
            oracle,
            hscale: hscale.max(1.0),
            cache: vec![NO_ENTRY; g.num_nodes()],
            stamp: 1,
            cached_target: NodeId::MAX,
            cached_version: u64::MAX,
            degraded: false,
        }
    }

    pub fn set_hscale(&mut self, hscale: f64) {
        self.hscale = hscale.max(1.0);
    }

    pub fn hscale(&self) -> f64 {
        self.hscale
    }

    /// Inflate a cost by `hscale` for bounded-suboptimal f-values.
    #[inline]
    pub fn scale(&self, cost: Cost) -> Cost {
        if self.hscale == 1.0 || cost == COST_MAX {
            cost
        } else {
            (cost as f64 * self.hscale).ceil() as Cost
        }
    }

    /// Walk the oracle from `from` toward `target`. Returns the path and
    /// its cost under current edge weights, or `None` when the oracle has
    /// no answer (missing row, unreachable target) or the walk exceeds
    /// `max_moves` steps or `cost_cap`.
    pub fn h(
        &mut self,
        from: NodeId,
        target: NodeId,
        max_moves: u32,
        cost_cap: Cost,
    ) -> Option<(Cost, Vec<NodeId>)> {
        self.revalidate(target);
        if from == target {
            return Some((0, vec![from]));
        }
        if let Some(hit) = self.cached_walk(from, target) {
            return Some(hit);
        }
        let result = match self.oracle.kind() {
            TableKind::Forward => self.walk_forward(from, target, max_moves, cost_cap),
            TableKind::Reverse => self.walk_reverse(from, target, max_moves, cost_cap),
        };
        if let Some((cost, path)) = &result {
            self.backfill(*cost, path);
        }
        result
    }

    /// Whether any query so far fell off the oracle (empty row).
    pub fn degraded(&self) -> bool {
        self.degraded
    }

    fn revalidate(&mut self, target: NodeId) {
        if self.cached_target != target || self.cached_version != self.g.version {
            self.stamp = self.stamp.wrapping_add(1);
            if self.stamp == 0 {
                self.cache.fill(NO_ENTRY);
                self.stamp = 1;
            }
            self.cached_target = target;
            self.cached_version = self.g.version;
        }
    }

    fn cached_walk(&self, from: NodeId, target: NodeId) -> Option<(Cost, Vec<NodeId>)> {
        let entry = self.cache[from as usize];
        if entry.stamp != self.stamp {
            return None;
        }
        let mut path = vec![from];
        let mut cur = from;
        while cur != target {
            let e = self.cache[cur as usize];
            debug_assert_eq!(e.stamp, self.stamp, "cache chains end at the target");
            cur = e.next;
            path.push(cur);
        }
        Some((entry.cost, path))
    }

    fn backfill(&mut self, cost: Cost, path: &[NodeId]) {
        // Suffix costs: walk the path backwards re-reading edge weights.
        let mut suffix = 0;
        for window in path.windows(2).rev() {
            let (node, next) = (window[0], window[1]);
            suffix += self.edge_cost(node, next);
            self.cache[node as usize] = CacheEntry { cost: suffix, next, stamp: self.stamp };
        }
        debug_assert_eq!(suffix, cost);
    }

    fn edge_cost(&self, from: NodeId, to: NodeId) -> Cost {
        self.g
            .out_edges(from)
            .find(|&(head, _)| head == to)
            .map(|(_, w)| w as Cost)
            .unwrap_or(COST_MAX)
    }

    fn walk_forward(
        &mut self,
        from: NodeId,
        target: NodeId,
        max_moves: u32,
        cost_cap: Cost,
    ) -> Option<(Cost, Vec<NodeId>)> {
        let mut cur = from;
        let mut cost: Cost = 0;
        let mut path = vec![from];
        let step_cap = (max_moves as usize).min(self.g.num_nodes());
        for _ in 0..step_cap {
            let moves = self.oracle.first_moves(cur, target);
            if moves == NO_MOVES {
                self.note_missing(cur);
                return None;
            }
            let (next, weight) = self.g.out_edge(cur, moves.trailing_zeros());
            cost += weight as Cost;
            if cost > cost_cap {
                return None;
            }
            path.push(next);
            cur = next;
            if cur == target {
                return Some((cost, path));
            }
        }
        None
    }

    fn walk_reverse(
        &mut self,
        from: NodeId,
        target: NodeId,
        max_moves: u32,
        cost_cap: Cost,
    ) -> Option<(Cost, Vec<NodeId>)> {
        let mut cur = target;
        let mut cost: Cost = 0;
        let mut path = vec![target];
        let step_cap = (max_moves as usize).min(self.g.num_nodes());
        for _ in 0..step_cap {
            let moves = self.oracle.first_moves(cur, from);
            if moves == NO_MOVES {
                self.note_missing(cur);
                return None;
            }
            let (pred, weight) = self.g.in_edge(cur, moves.trailing_zeros());
            cost += weight as Cost;
            if cost > cost_cap {
                return None;
            }
            path.push(pred);
            cur = pred;
            if cur == from {
                path.reverse();
                return Some((cost, path));
            }
        }
        None
    }

    fn note_missing(&mut self, node: NodeId) {
        if !self.oracle.has_row(node) && !self.degraded {
            self.degraded = true;
            log::warn!(
                "oracle has no row for node {}; degrading to uninformed search",
                node
            );
        }
    }
}
