//! CPD-guided A*.
//!
//! The oracle walk plays two roles: its cost is the heuristic driving the
//! f-ordering, and the walked path itself is a feasible incumbent the
//! search keeps improving. On an unperturbed graph the seed walk is
//! already optimal and the loop collapses to a handful of pops along that
//! path; after perturbations the walk cost is only an upper bound, so the
//! A* exploration closes the gap, reopening nodes when shorter paths
//! surface.
//!
//! A popped node whose f exceeds the incumbent cannot improve it and is
//! skipped rather than expanded (it counts toward `nodes_surplus`). The
//! quality bound relaxes this: once the incumbent is strictly within
//! `fscale` of the best open f, the incumbent is returned as is. Wall-time
//! and expansion cutoffs are checked on every expansion; hitting one is a
//! normal outcome, not an error, and the caller gets the best incumbent
//! plus the reason the loop stopped.

use std::time::Instant;

use crate::cpd::heuristic::CpdHeuristic;
use crate::expand::{ExpansionPolicy, Successor};
use crate::graph::{Cost, NodeId, COST_MAX};
use crate::pqueue::PriorityQueue;
use crate::search::{Metrics, NodePool, NodeState, Problem, Solution, StopReason, NO_PARENT};

/// Per-query limits; `u64::MAX`/`u32::MAX` disable a cutoff.
#[derive(Debug, Clone, Copy)]
pub struct Cutoffs {
    pub max_time_ns: u64,
    pub max_expansions: u64,
    pub max_k_moves: u32,
    /// Quality bound, >= 1.0: return the incumbent once it is strictly
    /// within `fscale` of the smallest open f. At exactly 1.0 the search
    /// runs to proven optimality (modulo perturbation, where the f-values
    /// are themselves upper bounds).
    pub fscale: f64,
}

impl Default for Cutoffs {
    fn default() -> Self {
        Cutoffs {
            max_time_ns: u64::MAX,
            max_expansions: u64::MAX,
            max_k_moves: u32::MAX,
            fscale: 1.0,
        }
    }
}

/// Reusable per-thread search memory; survives across queries and batches
/// so the hot path never allocates.
pub struct SearchState {
    pool: NodePool,
    queue: PriorityQueue,
    scratch: Vec<Successor>,
}

impl SearchState {
    pub fn new(num_nodes: usize) -> Self {
        SearchState {
            pool: NodePool::new(num_nodes),
            queue: PriorityQueue::new(num_nodes),
            scratch: Vec::new(),
        }
    }
}

pub struct CpdSearch<'s, 'a, E: ExpansionPolicy> {
    state: &'s mut SearchState,
    expander: E,
    heur: CpdHeuristic<'a>,
    cutoffs: Cutoffs,
}

struct Incumbent {
    path: Vec<NodeId>,
    cost: Cost,
}

impl<'s, 'a, E: ExpansionPolicy> CpdSearch<'s, 'a, E> {
    pub fn new(
        state: &'s mut SearchState,
        expander: E,
        heur: CpdHeuristic<'a>,
        cutoffs: Cutoffs,
    ) -> Self {
        CpdSearch { state, expander, heur, cutoffs }
    }

    pub fn cutoffs_mut(&mut self) -> &mut Cutoffs {
        &mut self.cutoffs
    }

    pub fn heuristic_mut(&mut self) -> &mut CpdHeuristic<'a> {
        &mut self.heur
    }

    pub fn get_path(&mut self, pi: Problem) -> Solution {
        let begin = Instant::now();
        let mut metrics = Metrics::default();
        let mut incumbent: Option<Incumbent> = None;

        self.state.pool.reset();
        self.state.queue.clear();
        self.expander.prepare(&pi);

        let f0 = self.admit(pi.start, 0, NO_PARENT, &pi, &mut incumbent);
        self.state.pool.set(pi.start, 0, f0, NO_PARENT, NodeState::Open);
        self.state.queue.push(pi.start, f0, 0);
        metrics.nodes_generated += 1;

        let mut stop = loop {
            let Some((node, f_node)) = self.state.queue.pop() else {
                break StopReason::Exhausted;
            };

            if node == pi.target {
                let path = self.state.pool.extract_path(node);
                incumbent = Some(Incumbent { path, cost: self.state.pool.g(node) });
                break StopReason::Done;
            }
            if let Some(inc) = &incumbent {
                if (inc.cost as f64) < self.cutoffs.fscale * f_node as f64 {
                    break StopReason::Done;
                }
                if f_node > inc.cost {
                    // Cannot beat the incumbent through this node. Close
                    // it so a later, shorter rediscovery reopens cleanly.
                    self.state.pool.close(node);
                    metrics.nodes_surplus += 1;
                    continue;
                }
            }
            if begin.elapsed().as_nanos() as u64 >= self.cutoffs.max_time_ns {
                break StopReason::TimeCutoff;
            }
            if metrics.nodes_expanded >= self.cutoffs.max_expansions {
                break StopReason::ExpansionCutoff;
            }

            self.state.pool.close(node);
            metrics.nodes_expanded += 1;
            let g_node = self.state.pool.g(node);
            let parent = self.state.pool.parent(node);

            let mut scratch = std::mem::take(&mut self.state.scratch);
            scratch.clear();
            self.expander.expand(node, parent, &pi, &mut scratch);
            for &(succ, weight, _) in &scratch {
                let tentative = g_node + weight as Cost;
                match self.state.pool.state(succ) {
                    NodeState::Fresh => {
                        let f = self.admit(succ, tentative, node, &pi, &mut incumbent);
                        self.state.pool.set(succ, tentative, f, node, NodeState::Open);
                        self.state.queue.push(succ, f, tentative);
                        metrics.nodes_generated += 1;
                    }
                    NodeState::Open => {
                        let old_g = self.state.pool.g(succ);
                        if tentative < old_g {
                            // The h-term is unchanged; shift f by the g gain.
                            let f = self.state.pool.f(succ) - (old_g - tentative);
                            self.state.pool.set(succ, tentative, f, node, NodeState::Open);
                            self.state.queue.decrease_key(succ, f, tentative);
                        }
                    }
                    NodeState::Closed => {
                        let old_g = self.state.pool.g(succ);
                        if tentative < old_g {
                            let f = self.state.pool.f(succ) - (old_g - tentative);
                            self.state.pool.set(succ, tentative, f, node, NodeState::Open);
                            self.state.queue.push(succ, f, tentative);
                            metrics.nodes_reopen += 1;
                            metrics.nodes_generated += 1;
                        }
                    }
                }
            }
            self.state.scratch = scratch;
        };

        if stop == StopReason::Exhausted && incumbent.is_some() {
            // The open list drained, so nothing can beat the incumbent.
            stop = StopReason::Done;
        }

        metrics.nodes_surplus += self.state.queue.len() as u64;
        metrics.heap_ops = self.state.queue.take_heap_ops();
        metrics.time_elapsed_ns = begin.elapsed().as_nanos() as u64;

        match incumbent {
            Some(inc) => Solution { path: inc.path, cost: inc.cost, stop, metrics },
            None => Solution { path: Vec::new(), cost: COST_MAX, stop, metrics },
        }
    }

    /// Compute a node's f-value via the oracle walk, folding the walked
    /// path into the incumbent when it completes and improves on it.
    /// `parent` is the node whose expansion generated this one.
    fn admit(
        &mut self,
        node: NodeId,
        g: Cost,
        parent: NodeId,
        pi: &Problem,
        incumbent: &mut Option<Incumbent>,
    ) -> Cost {
        let cap = match incumbent {
            Some(inc) => inc.cost.saturating_sub(g),
            None => COST_MAX,
        };
        match self.heur.h(node, pi.target, self.cutoffs.max_k_moves, cap) {
            Some((h_cost, walk)) => {
                let total = g + h_cost;
                let improves = incumbent.as_ref().map_or(true, |inc| total < inc.cost);
                if improves {
                    let mut path = if parent == NO_PARENT {
                        Vec::new()
                    } else {
                        self.state.pool.extract_path(parent)
                    };
                    path.extend(walk);
                    *incumbent = Some(Incumbent { path, cost: total });
                }
                g + self.heur.scale(h_cost)
            }
            // No oracle answer: fall back to an uninformed f.
            None => g,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpd::builder::{build_oracle, BuildOptions};
    use crate::cpd::TableKind;
    use crate::expand::SimpleExpansion;
    use crate::graph::testutil::square_graph;
    use crate::graph::{EdgePatch, Graph};

    fn run_query(
        g: &Graph,
        kind: TableKind,
        cutoffs: Cutoffs,
        start: u32,
        target: u32,
    ) -> Solution {
        let sources: Vec<u32> = (0..g.num_nodes() as u32).collect();
        let oracle = build_oracle(g, kind, &sources, &BuildOptions::default()).unwrap();
        let mut state = SearchState::new(g.num_nodes());
        let heur = CpdHeuristic::new(g, &oracle, 1.0);
        let mut search = CpdSearch::new(&mut state, SimpleExpansion::new(g), heur, cutoffs);
        search.get_path(Problem { start, target })
    }

    #[test]
    fn unperturbed_query_expands_only_the_optimal_path() {
        let g = square_graph(false);
        let sol = run_query(&g, TableKind::Forward, Cutoffs::default(), 0, 3);
        assert_eq!(sol.path, vec![0, 1, 2, 3]);
        assert_eq!(sol.cost, 3);
        assert_eq!(sol.stop, StopReason::Done);
        assert!(sol.metrics.nodes_expanded <= 3);
    }

    #[test]
    fn quality_bound_returns_seed_walk_without_expanding() {
        let g = square_graph(false);
        let cutoffs = Cutoffs { fscale: 1.5, ..Default::default() };
        let sol = run_query(&g, TableKind::Forward, cutoffs, 0, 3);
        assert_eq!(sol.path, vec![0, 1, 2, 3]);
        assert_eq!(sol.cost, 3);
        assert_eq!(sol.metrics.nodes_expanded, 0);
    }

    #[test]
    fn perturbed_query_falls_back_to_search() {
        let mut g = square_graph(false);
        let sources: Vec<u32> = (0..4).collect();
        let oracle =
            build_oracle(&g, TableKind::Forward, &sources, &BuildOptions::default()).unwrap();
        g.perturb(&[EdgePatch { tail: 0, head: 1, weight: 100 }]).unwrap();

        let mut state = SearchState::new(g.num_nodes());
        let heur = CpdHeuristic::new(&g, &oracle, 1.0);
        let mut search =
            CpdSearch::new(&mut state, SimpleExpansion::new(&g), heur, Cutoffs::default());
        let sol = search.get_path(Problem { start: 0, target: 3 });
        assert_eq!(sol.path, vec![0, 3]);
        assert_eq!(sol.cost, 5);
        assert!(sol.reached_target(3));
    }

    #[test]
    fn expansion_cutoff_is_respected() {
        let mut g = square_graph(false);
        let sources: Vec<u32> = (0..4).collect();
        let oracle =
            build_oracle(&g, TableKind::Forward, &sources, &BuildOptions::default()).unwrap();
        g.perturb(&[EdgePatch { tail: 0, head: 1, weight: 100 }]).unwrap();

        let cutoffs = Cutoffs { max_expansions: 0, ..Default::default() };
        let mut state = SearchState::new(g.num_nodes());
        let heur = CpdHeuristic::new(&g, &oracle, 1.0);
        let mut search = CpdSearch::new(&mut state, SimpleExpansion::new(&g), heur, cutoffs);
        let sol = search.get_path(Problem { start: 0, target: 3 });
        assert_eq!(sol.metrics.nodes_expanded, 0);
        // The cutoff still hands back the seed walk as incumbent.
        assert!(sol.reached_target(3));
        assert_eq!(sol.cost, 102);
        assert_eq!(sol.stop, StopReason::ExpansionCutoff);
    }

    #[test]
    fn reverse_table_drives_the_same_search() {
        let g = square_graph(true);
        let sol = run_query(&g, TableKind::Reverse, Cutoffs::default(), 0, 3);
        assert_eq!(sol.path, vec![0, 1, 2, 3]);
        assert_eq!(sol.cost, 3);
    }

    #[test]
    fn start_equals_target() {
        let g = square_graph(false);
        let sol = run_query(&g, TableKind::Forward, Cutoffs::default(), 2, 2);
        assert_eq!(sol.path, vec![2]);
        assert_eq!(sol.cost, 0);
    }

    #[test]
    fn unreachable_target_exhausts() {
        let g = square_graph(false);
        let sol = run_query(&g, TableKind::Forward, Cutoffs::default(), 3, 0);
        assert!(sol.path.is_empty());
        assert_eq!(sol.stop, StopReason::Exhausted);
    }
}
