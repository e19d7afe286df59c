//! Successor generation, abstracted so the same search loop runs on a plain
//! graph or on a contraction hierarchy.
//!
//! `expand` writes `(successor, weight, edge_idx)` triples into a caller
//! buffer; `edge_idx` is the successor's position in the node's adjacency
//! list (the first-move bit index when the node is a CPD source).

mod ch;

pub use ch::{BoundingBox, DfsRange, FchDfsExpansion, FwdChBbExpansion, FwdChExpansion};

use crate::graph::{Graph, NodeId};
use crate::search::Problem;

/// A generated successor: `(node, edge weight, edge index at the parent)`.
pub type Successor = (NodeId, u32, u32);

pub trait ExpansionPolicy {
    /// Per-query hook; policies that cache target data override this.
    fn prepare(&mut self, _problem: &Problem) {}

    /// Append the successors of `node` (reached via `parent`) to `out`.
    /// `parent` is [`crate::search::NO_PARENT`] for the start node.
    fn expand(&mut self, node: NodeId, parent: NodeId, problem: &Problem, out: &mut Vec<Successor>);

    fn xy(&self, node: NodeId) -> (i32, i32);
}

/// Yields every outgoing edge; the baseline policy for plain graphs.
pub struct SimpleExpansion<'g> {
    g: &'g Graph,
    reverse: bool,
}

impl<'g> SimpleExpansion<'g> {
    pub fn new(g: &'g Graph) -> Self {
        SimpleExpansion { g, reverse: false }
    }

    /// Expand incoming edges instead; used when sweeping the reverse graph
    /// for reverse path databases.
    pub fn reverse(g: &'g Graph) -> Self {
        SimpleExpansion { g, reverse: true }
    }
}

impl ExpansionPolicy for SimpleExpansion<'_> {
    fn expand(
        &mut self,
        node: NodeId,
        _parent: NodeId,
        _problem: &Problem,
        out: &mut Vec<Successor>,
    ) {
        if self.reverse {
            for (idx, (tail, weight)) in self.g.in_edges(node).enumerate() {
                out.push((tail, weight, idx as u32));
            }
        } else {
            for (idx, (head, weight)) in self.g.out_edges(node).enumerate() {
                out.push((head, weight, idx as u32));
            }
        }
    }

    fn xy(&self, node: NodeId) -> (i32, i32) {
        self.g.xy(node)
    }
}
