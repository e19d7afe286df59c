//! Pure oracle path extraction: answer queries by walking first moves
//! only, with no search on top. This is the `table` algorithm of the query
//! server; `table-search` layers A* over the same walk.

use crate::graph::{Graph, COST_MAX};
use crate::search::{Metrics, Problem, Solution, StopReason};

use super::heuristic::CpdHeuristic;
use super::GraphOracle;

pub struct CpdExtraction<'a> {
    heur: CpdHeuristic<'a>,
    max_k_moves: u32,
}

impl<'a> CpdExtraction<'a> {
    pub fn new(g: &'a Graph, oracle: &'a GraphOracle) -> Self {
        CpdExtraction { heur: CpdHeuristic::new(g, oracle, 1.0), max_k_moves: u32::MAX }
    }

    pub fn set_max_k_moves(&mut self, k: u32) {
        self.max_k_moves = k;
    }

    pub fn get_path(&mut self, pi: Problem) -> Solution {
        let begin = std::time::Instant::now();
        let walk = self.heur.h(pi.start, pi.target, self.max_k_moves, COST_MAX);
        let metrics = Metrics {
            time_elapsed_ns: begin.elapsed().as_nanos() as u64,
            ..Default::default()
        };
        match walk {
            Some((cost, path)) => Solution { path, cost, stop: StopReason::Done, metrics },
            None => {
                Solution { path: Vec::new(), cost: COST_MAX, stop: StopReason::Exhausted, metrics }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpd::builder::{build_oracle, BuildOptions};
    use crate::cpd::TableKind;
    use crate::graph::testutil::square_graph;
    use crate::graph::NodeId;

    #[test]
    fn extraction_returns_oracle_path() {
        let g = square_graph(false);
        let sources: Vec<NodeId> = (0..4).collect();
        let oracle =
            build_oracle(&g, TableKind::Forward, &sources, &BuildOptions::default()).unwrap();
        let mut alg = CpdExtraction::new(&g, &oracle);
        let sol = alg.get_path(Problem { start: 0, target: 3 });
        assert_eq!(sol.path, vec![0, 1, 2, 3]);
        assert_eq!(sol.cost, 3);
        assert!(sol.reached_target(3));
    }

    #[test]
    fn unreachable_pair_gives_empty_solution() {
        let g = square_graph(false);
        let sources: Vec<NodeId> = (0..4).collect();
        let oracle =
            build_oracle(&g, TableKind::Forward, &sources, &BuildOptions::default()).unwrap();
        let mut alg = CpdExtraction::new(&g, &oracle);
        let sol = alg.get_path(Problem { start: 3, target: 0 });
        assert!(sol.path.is_empty());
        assert!(!sol.reached_target(0));
    }
}
