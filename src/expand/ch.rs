//! Forward-driven expansion over a contraction hierarchy.
//!
//! When the parent ranks below the current node the search is climbing and
//! every neighbour is generated; when it ranks above, the search is
//! descending and only lower-ranked neighbours are generated. This rule
//! alone preserves optimality; the labelled variants additionally prune
//! edges whose precomputed reach label cannot contain the target.

use crate::graph::{Graph, NodeId};
use crate::search::{Problem, NO_PARENT};

use super::{ExpansionPolicy, Successor};

/// Axis-aligned box over node coordinates; one per down-edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundingBox {
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
}

impl BoundingBox {
    #[inline(always)]
    pub fn contains(&self, x: i32, y: i32) -> bool {
        self.x1 <= x && x <= self.x2 && self.y1 <= y && y <= self.y2
    }
}

/// Half-open id range in some fixed node ordering; one per down-edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DfsRange {
    pub low: u32,
    pub high: u32,
}

impl DfsRange {
    #[inline(always)]
    pub fn contains(&self, id: NodeId) -> bool {
        self.low <= id && id < self.high
    }
}

#[inline(always)]
fn going_up(rank: &[u32], node: NodeId, parent: NodeId) -> bool {
    parent == NO_PARENT || rank[parent as usize] < rank[node as usize]
}

/// Plain forward-CH expansion: rank rule only.
pub struct FwdChExpansion<'g> {
    g: &'g Graph,
    rank: Vec<u32>,
}

impl<'g> FwdChExpansion<'g> {
    pub fn new(g: &'g Graph, rank: Vec<u32>) -> Self {
        assert_eq!(rank.len(), g.num_nodes());
        FwdChExpansion { g, rank }
    }
}

impl ExpansionPolicy for FwdChExpansion<'_> {
    fn expand(
        &mut self,
        node: NodeId,
        parent: NodeId,
        _problem: &Problem,
        out: &mut Vec<Successor>,
    ) {
        let up = going_up(&self.rank, node, parent);
        let node_rank = self.rank[node as usize];
        for (idx, (head, weight)) in self.g.out_edges(node).enumerate() {
            if up || self.rank[head as usize] < node_rank {
                out.push((head, weight, idx as u32));
            }
        }
    }

    fn xy(&self, node: NodeId) -> (i32, i32) {
        self.g.xy(node)
    }
}

/// Forward-CH with per-edge bounding boxes: an edge survives only if its
/// box contains the target's coordinates.
pub struct FwdChBbExpansion<'g> {
    g: &'g Graph,
    rank: Vec<u32>,
    boxes: Vec<Vec<BoundingBox>>,
    tx: i32,
    ty: i32,
}

impl<'g> FwdChBbExpansion<'g> {
    /// `boxes[node][edge_idx]` labels the node's `edge_idx`-th out-edge.
    pub fn new(g: &'g Graph, rank: Vec<u32>, boxes: Vec<Vec<BoundingBox>>) -> Self {
        assert_eq!(rank.len(), g.num_nodes());
        assert_eq!(boxes.len(), g.num_nodes());
        FwdChBbExpansion { g, rank, boxes, tx: 0, ty: 0 }
    }
}

impl ExpansionPolicy for FwdChBbExpansion<'_> {
    fn prepare(&mut self, problem: &Problem) {
        let (tx, ty) = self.g.xy(problem.target);
        self.tx = tx;
        self.ty = ty;
    }

    fn expand(
        &mut self,
        node: NodeId,
        parent: NodeId,
        _problem: &Problem,
        out: &mut Vec<Successor>,
    ) {
        let up = going_up(&self.rank, node, parent);
        let node_rank = self.rank[node as usize];
        let labels = &self.boxes[node as usize];
        for (idx, (head, weight)) in self.g.out_edges(node).enumerate() {
            if !(up || self.rank[head as usize] < node_rank) {
                continue;
            }
            if labels[idx].contains(self.tx, self.ty) {
                out.push((head, weight, idx as u32));
            }
        }
    }

    fn xy(&self, node: NodeId) -> (i32, i32) {
        self.g.xy(node)
    }
}

/// Forward-CH with DFS id-range labels: an edge survives only if its range
/// contains the target's id in the labelling order.
pub struct FchDfsExpansion<'g> {
    g: &'g Graph,
    rank: Vec<u32>,
    ranges: Vec<Vec<DfsRange>>,
    target_id: NodeId,
}

impl<'g> FchDfsExpansion<'g> {
    /// `ranges[node][edge_idx]` labels the node's `edge_idx`-th out-edge.
    pub fn new(g: &'g Graph, rank: Vec<u32>, ranges: Vec<Vec<DfsRange>>) -> Self {
        assert_eq!(rank.len(), g.num_nodes());
        assert_eq!(ranges.len(), g.num_nodes());
        FchDfsExpansion { g, rank, ranges, target_id: 0 }
    }
}

impl ExpansionPolicy for FchDfsExpansion<'_> {
    fn prepare(&mut self, problem: &Problem) {
        self.target_id = problem.target;
    }

    fn expand(
        &mut self,
        node: NodeId,
        parent: NodeId,
        _problem: &Problem,
        out: &mut Vec<Successor>,
    ) {
        let up = going_up(&self.rank, node, parent);
        let node_rank = self.rank[node as usize];
        let labels = &self.ranges[node as usize];
        for (idx, (head, weight)) in self.g.out_edges(node).enumerate() {
            if !(up || self.rank[head as usize] < node_rank) {
                continue;
            }
            if labels[idx].contains(self.target_id) {
                out.push((head, weight, idx as u32));
            }
        }
    }

    fn xy(&self, node: NodeId) -> (i32, i32) {
        self.g.xy(node)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Graph;

    // Diamond 0-1-3 / 0-2-3 with node 3 ranked highest.
    fn diamond() -> (Graph, Vec<u32>) {
        let g = Graph::new(
            vec![(0, 0), (0, 2), (2, 0), (2, 2)],
            &[(0, 1, 1), (0, 3, 4), (1, 3, 1), (3, 2, 1), (2, 0, 1)],
            false,
        )
        .unwrap();
        (g, vec![0, 1, 2, 3])
    }

    #[test]
    fn up_node_generates_everything() {
        let (g, rank) = diamond();
        let mut policy = FwdChExpansion::new(&g, rank);
        let pi = Problem { start: 0, target: 2 };
        let mut out = Vec::new();
        policy.expand(0, NO_PARENT, &pi, &mut out);
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn down_node_generates_only_lower_ranks() {
        let (g, rank) = diamond();
        let mut policy = FwdChExpansion::new(&g, rank);
        let pi = Problem { start: 0, target: 2 };
        let mut out = Vec::new();
        // Parent 3 ranks above node 2: descent, so only down-edges survive.
        policy.expand(2, 3, &pi, &mut out);
        assert_eq!(out, vec![(0, 1, 0)]);
    }

    #[test]
    fn bb_filter_prunes_by_target_xy() {
        let (g, rank) = diamond();
        let wide = BoundingBox { x1: 0, y1: 0, x2: 2, y2: 2 };
        let empty = BoundingBox { x1: -1, y1: -1, x2: -1, y2: -1 };
        // Label 0's first edge with a box excluding everything.
        let boxes = vec![vec![empty, wide], vec![wide], vec![wide], vec![wide, wide]];
        let mut policy = FwdChBbExpansion::new(&g, rank, boxes);
        let pi = Problem { start: 0, target: 3 };
        policy.prepare(&pi);
        let mut out = Vec::new();
        policy.expand(0, NO_PARENT, &pi, &mut out);
        assert_eq!(out, vec![(3, 4, 1)]);
    }

    #[test]
    fn dfs_filter_prunes_by_target_id() {
        let (g, rank) = diamond();
        let all = DfsRange { low: 0, high: 4 };
        let none = DfsRange { low: 0, high: 0 };
        let ranges = vec![vec![all, none], vec![all], vec![all], vec![all, all]];
        let mut policy = FchDfsExpansion::new(&g, rank, ranges);
        let pi = Problem { start: 0, target: 3 };
        policy.prepare(&pi);
        let mut out = Vec::new();
        policy.expand(0, NO_PARENT, &pi, &mut out);
        assert_eq!(out, vec![(1, 1, 0)]);
    }
}
