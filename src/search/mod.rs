//! Per-query search state: the node pool, problem instance, and the
//! solution/metrics types shared by every algorithm in the crate.

pub mod cpd_search;
pub mod dijkstra;

use crate::graph::{Cost, NodeId, COST_MAX};

pub const NO_PARENT: NodeId = NodeId::MAX;

/// Lifecycle of a search node within one query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeState {
    Fresh,
    Open,
    Closed,
}

#[derive(Debug, Clone, Copy)]
struct NodeData {
    g: Cost,
    f: Cost,
    parent: NodeId,
    state: NodeState,
    stamp: u32,
}

const BLANK: NodeData = NodeData {
    g: COST_MAX,
    f: COST_MAX,
    parent: NO_PARENT,
    state: NodeState::Fresh,
    stamp: 0,
};

/// Dense pool of search nodes, reused across queries. Reset is O(1) via a
/// query stamp; entries from older queries read back as `Fresh`.
#[derive(Debug)]
pub struct NodePool {
    data: Vec<NodeData>,
    stamp: u32,
}

impl NodePool {
    pub fn new(num_nodes: usize) -> Self {
        NodePool { data: vec![BLANK; num_nodes], stamp: 1 }
    }

    pub fn reset(&mut self) {
        self.stamp = self.stamp.wrapping_add(1);
        if self.stamp == 0 {
            // Stamp wrapped; old entries must not alias the new query.
            self.data.fill(BLANK);
            self.stamp = 1;
        }
    }

    #[inline(always)]
    fn entry(&self, id: NodeId) -> NodeData {
        let data = self.data[id as usize];
        if data.stamp == self.stamp {
            data
        } else {
            BLANK
        }
    }

    #[inline(always)]
    pub fn state(&self, id: NodeId) -> NodeState {
        self.entry(id).state
    }

    #[inline(always)]
    pub fn g(&self, id: NodeId) -> Cost {
        self.entry(id).g
    }

    #[inline(always)]
    pub fn f(&self, id: NodeId) -> Cost {
        self.entry(id).f
    }

    #[inline(always)]
    pub fn parent(&self, id: NodeId) -> NodeId {
        self.entry(id).parent
    }

    #[inline(always)]
    pub fn set(&mut self, id: NodeId, g: Cost, f: Cost, parent: NodeId, state: NodeState) {
        self.data[id as usize] = NodeData { g, f, parent, state, stamp: self.stamp };
    }

    #[inline(always)]
    pub fn close(&mut self, id: NodeId) {
        let mut data = self.entry(id);
        data.state = NodeState::Closed;
        data.stamp = self.stamp;
        self.data[id as usize] = data;
    }

    /// Walk parent pointers from `id` back to the start node.
    pub fn extract_path(&self, id: NodeId) -> Vec<NodeId> {
        let mut path = vec![id];
        let mut cur = id;
        while self.parent(cur) != NO_PARENT {
            cur = self.parent(cur);
            path.push(cur);
        }
        path.reverse();
        path
    }
}

/// One point-to-point query.
#[derive(Debug, Clone, Copy)]
pub struct Problem {
    pub start: NodeId,
    pub target: NodeId,
}

/// Per-query counters, summed across threads at the reply barrier.
#[derive(Debug, Default, Clone, Copy)]
pub struct Metrics {
    pub nodes_expanded: u64,
    pub nodes_generated: u64,
    pub nodes_reopen: u64,
    pub nodes_surplus: u64,
    pub heap_ops: u64,
    pub time_elapsed_ns: u64,
}

impl Metrics {
    pub fn accumulate(&mut self, other: &Metrics) {
        self.nodes_expanded += other.nodes_expanded;
        self.nodes_generated += other.nodes_generated;
        self.nodes_reopen += other.nodes_reopen;
        self.nodes_surplus += other.nodes_surplus;
        self.heap_ops += other.heap_ops;
        self.time_elapsed_ns += other.time_elapsed_ns;
    }
}

/// Why a search stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The target was popped, or the incumbent met the quality cutoff.
    Done,
    TimeCutoff,
    ExpansionCutoff,
    /// Open list ran dry without reaching the target.
    Exhausted,
}

/// Search outcome: the best path found (possibly empty) plus metrics.
/// Cutoffs are not errors; `reached_target` distinguishes a real arrival
/// from a gave-up incumbent.
#[derive(Debug, Clone)]
pub struct Solution {
    pub path: Vec<NodeId>,
    pub cost: Cost,
    pub stop: StopReason,
    pub metrics: Metrics,
}

impl Solution {
    pub fn none(stop: StopReason) -> Self {
        Solution { path: Vec::new(), cost: COST_MAX, stop, metrics: Metrics::default() }
    }

    pub fn reached_target(&self, target: NodeId) -> bool {
        self.path.last() == Some(&target)
    }
}
