//! Oracle correctness validation.
//!
//! Compares the oracle walk against a fresh Dijkstra baseline on random
//! node pairs, in parallel. Zero tolerance: for every reachable pair whose
//! source has a stored row, the walked path must cost exactly the
//! shortest-path distance. Used by the build tool's `--validate` flag and
//! by the test suite.

use anyhow::Result;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;

use crate::cpd::heuristic::CpdHeuristic;
use crate::cpd::GraphOracle;
use crate::expand::SimpleExpansion;
use crate::graph::{Cost, Graph, NodeId, COST_MAX};
use crate::search::dijkstra::{Dijkstra, NoListener};

#[derive(Debug, Default)]
pub struct ValidationReport {
    pub total_pairs: usize,
    pub checked_pairs: usize,
    pub unreachable_pairs: usize,
    pub skipped_pairs: usize,
    pub mismatches: Vec<Mismatch>,
}

impl ValidationReport {
    pub fn passed(&self) -> bool {
        self.mismatches.is_empty()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Mismatch {
    pub source: NodeId,
    pub target: NodeId,
    pub walk_cost: Cost,
    pub dijkstra_cost: Cost,
}

/// Check `n_pairs` seeded random pairs. Pairs whose source has no row in
/// this shard are skipped (sharded builds only cover their block);
/// unreachable pairs must come back as "no move" on an intact oracle.
pub fn validate_oracle(
    g: &Graph,
    oracle: &GraphOracle,
    n_pairs: usize,
    seed: u64,
) -> Result<ValidationReport> {
    let n = g.num_nodes() as NodeId;
    let mut rng = StdRng::seed_from_u64(seed);
    let pairs: Vec<(NodeId, NodeId)> =
        (0..n_pairs).map(|_| (rng.gen_range(0..n), rng.gen_range(0..n))).collect();

    let chunks: Vec<ValidationReport> = pairs
        .par_chunks(1024.max(n_pairs / 64).max(1))
        .map(|chunk| {
            let mut report = ValidationReport::default();
            let mut dijkstra = Dijkstra::new(g.num_nodes());
            let mut heur = CpdHeuristic::new(g, oracle, 1.0);
            let mut last_source = NodeId::MAX;
            // Sort by source so one Dijkstra sweep serves repeats.
            let mut chunk: Vec<_> = chunk.to_vec();
            chunk.sort_unstable();
            for (source, target) in chunk {
                report.total_pairs += 1;
                check_pair(g, oracle, &mut dijkstra, &mut heur, &mut last_source, source, target, &mut report);
            }
            report
        })
        .collect();

    let mut report = ValidationReport::default();
    for chunk in chunks {
        report.total_pairs += chunk.total_pairs;
        report.checked_pairs += chunk.checked_pairs;
        report.unreachable_pairs += chunk.unreachable_pairs;
        report.skipped_pairs += chunk.skipped_pairs;
        report.mismatches.extend(chunk.mismatches);
    }
    Ok(report)
}

/// Exhaustively check every (source, target) pair; for small graphs and
/// tests.
pub fn validate_all_pairs(g: &Graph, oracle: &GraphOracle) -> Result<ValidationReport> {
    let n = g.num_nodes() as NodeId;
    let mut report = ValidationReport::default();
    let mut dijkstra = Dijkstra::new(g.num_nodes());
    let mut heur = CpdHeuristic::new(g, oracle, 1.0);
    for source in 0..n {
        let mut last_source = NodeId::MAX;
        for target in 0..n {
            report.total_pairs += 1;
            check_pair(g, oracle, &mut dijkstra, &mut heur, &mut last_source, source, target, &mut report);
        }
    }
    Ok(report)
}

#[allow(clippy::too_many_arguments)]
fn check_pair(
    g: &Graph,
    oracle: &GraphOracle,
    dijkstra: &mut Dijkstra,
    heur: &mut CpdHeuristic<'_>,
    last_source: &mut NodeId,
    source: NodeId,
    target: NodeId,
    report: &mut ValidationReport,
) {
    if !oracle.has_row(source) && source != target {
        report.skipped_pairs += 1;
        return;
    }
    if *last_source != source {
        let mut expander = SimpleExpansion::new(g);
        dijkstra.sweep(source, &mut expander, &mut NoListener);
        *last_source = source;
    }
    let truth = dijkstra.dist(target);
    let walk = heur.h(source, target, u32::MAX, COST_MAX);
    match (truth, walk) {
        (COST_MAX, None) => report.unreachable_pairs += 1,
        (truth, Some((cost, _))) if truth == cost => report.checked_pairs += 1,
        (truth, walk) => {
            report.mismatches.push(Mismatch {
                source,
                target,
                walk_cost: walk.map_or(COST_MAX, |(c, _)| c),
                dijkstra_cost: truth,
            });
        }
    }
}
