//! Records first-move sets into a row buffer while a Dijkstra sweep runs.
//!
//! The rule: a node relaxed directly from the source inherits the bit of
//! the edge used; any other node inherits its parent's set. Equal-cost
//! relaxations OR their contribution in, so a target reachable through
//! several optimal first edges carries all of their bits. The same
//! listener serves forward and reverse tables — orientation lives in the
//! expansion policy driving the sweep, and the bit indexes that policy's
//! adjacency.

use crate::graph::NodeId;
use crate::search::dijkstra::SweepListener;

use super::{FirstMoves, NO_MOVES};

pub struct FirstMoveListener<'a> {
    source: NodeId,
    row: &'a mut [FirstMoves],
}

impl<'a> FirstMoveListener<'a> {
    /// Wrap `row` for a sweep from `source`; clears the buffer so stale
    /// sets from the previous source cannot leak into this row.
    pub fn new(source: NodeId, row: &'a mut [FirstMoves]) -> Self {
        row.fill(NO_MOVES);
        FirstMoveListener { source, row }
    }
}

impl SweepListener for FirstMoveListener<'_> {
    #[inline]
    fn relaxed(&mut self, node: NodeId, parent: NodeId, edge_idx: u32, tied: bool) {
        let moves = if parent == self.source {
            1u32 << edge_idx
        } else {
            self.row[parent as usize]
        };
        if tied {
            self.row[node as usize] |= moves;
        } else {
            self.row[node as usize] = moves;
        }
    }
}
