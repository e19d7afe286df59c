//! Single-source Dijkstra sweep with a relaxation listener.
//!
//! This is the workhorse of CPD construction: one sweep per source, with
//! the listener recording first-move sets as labels are set, improved, or
//! tied. The pool and queue are owned and reused across sweeps, so a
//! builder thread allocates once per graph, not once per source.

use crate::expand::{ExpansionPolicy, Successor};
use crate::graph::{Cost, NodeId, COST_MAX};
use crate::pqueue::PriorityQueue;
use crate::search::{NodePool, NodeState, Problem, NO_PARENT};

/// Invoked on every successful relaxation. `tied` distinguishes an
/// equal-cost alternative from a strict improvement; equal-cost parents
/// are how multi-bit first-move sets arise.
pub trait SweepListener {
    fn relaxed(&mut self, node: NodeId, parent: NodeId, edge_idx: u32, tied: bool);
}

/// Listener that records nothing; used for plain distance sweeps.
pub struct NoListener;

impl SweepListener for NoListener {
    #[inline(always)]
    fn relaxed(&mut self, _node: NodeId, _parent: NodeId, _edge_idx: u32, _tied: bool) {}
}

pub struct Dijkstra {
    pool: NodePool,
    queue: PriorityQueue,
    scratch: Vec<Successor>,
}

impl Dijkstra {
    pub fn new(num_nodes: usize) -> Self {
        Dijkstra {
            pool: NodePool::new(num_nodes),
            queue: PriorityQueue::new(num_nodes),
            scratch: Vec::with_capacity(DEGREE_HINT),
        }
    }

    /// Settle every node reachable from `source`. Distances are readable
    /// via [`Dijkstra::dist`] until the next sweep.
    pub fn sweep<E, L>(&mut self, source: NodeId, expander: &mut E, listener: &mut L)
    where
        E: ExpansionPolicy,
        L: SweepListener,
    {
        let problem = Problem { start: source, target: NodeId::MAX };
        self.pool.reset();
        self.queue.clear();
        self.pool.set(source, 0, 0, NO_PARENT, NodeState::Open);
        self.queue.push(source, 0, 0);

        while let Some((node, _)) = self.queue.pop() {
            self.pool.close(node);
            let g = self.pool.g(node);
            let parent = self.pool.parent(node);

            self.scratch.clear();
            expander.expand(node, parent, &problem, &mut self.scratch);
            for i in 0..self.scratch.len() {
                let (succ, weight, edge_idx) = self.scratch[i];
                let tentative = g + weight as Cost;
                match self.pool.state(succ) {
                    NodeState::Fresh => {
                        self.pool.set(succ, tentative, tentative, node, NodeState::Open);
                        self.queue.push(succ, tentative, tentative);
                        listener.relaxed(succ, node, edge_idx, false);
                    }
                    NodeState::Open => {
                        let old = self.pool.g(succ);
                        if tentative < old {
                            self.pool.set(succ, tentative, tentative, node, NodeState::Open);
                            self.queue.decrease_key(succ, tentative, tentative);
                            listener.relaxed(succ, node, edge_idx, false);
                        } else if tentative == old {
                            listener.relaxed(succ, node, edge_idx, true);
                        }
                    }
                    NodeState::Closed => {
                        // Non-negative weights keep settled labels final;
                        // only zero-weight ties can still arrive here.
                        if tentative == self.pool.g(succ) {
                            listener.relaxed(succ, node, edge_idx, true);
                        }
                    }
                }
            }
        }
    }

    /// Distance of `node` from the last sweep's source; `COST_MAX` when
    /// unreachable.
    #[inline(always)]
    pub fn dist(&self, node: NodeId) -> Cost {
        if self.pool.state(node) == NodeState::Closed {
            self.pool.g(node)
        } else {
            COST_MAX
        }
    }

    pub fn path_to(&self, node: NodeId) -> Option<Vec<NodeId>> {
        (self.pool.state(node) == NodeState::Closed).then(|| self.pool.extract_path(node))
    }
}

const DEGREE_HINT: usize = 16;
