//! End-to-end oracle pipeline: build shards per worker, serialize, reload,
//! merge, and query — the same road the CLI tools take.

use cpd_route::cpd::builder::{build_oracle, BuildOptions};
use cpd_route::cpd::format::{conf_path, read_oracle, shard_path, write_oracle, ShardConf};
use cpd_route::cpd::heuristic::CpdHeuristic;
use cpd_route::expand::SimpleExpansion;
use cpd_route::graph::EdgePatch;
use cpd_route::search::cpd_search::{CpdSearch, Cutoffs, SearchState};
use cpd_route::search::{Problem, StopReason};
use cpd_route::validate::validate_all_pairs;
use cpd_route::{DistributeController, Graph, GraphOracle, PartMethod, TableKind};
use std::path::Path;

/// The four-node square: 0 -> 1 -> 2 -> 3 in unit steps, plus a direct
/// 0 -> 3 edge of weight 5.
fn square_graph(store_incoming: bool) -> Graph {
    Graph::new(
        vec![(0, 0), (1, 0), (1, 1), (0, 1)],
        &[(0, 1, 1), (1, 2, 1), (2, 3, 1), (0, 3, 5)],
        store_incoming,
    )
    .unwrap()
}

/// Ring of `n` nodes with deterministic chords; strongly connected.
fn ring_graph(n: u32) -> Graph {
    let coords: Vec<(i32, i32)> = (0..n).map(|i| (i as i32, 0)).collect();
    let mut edges = Vec::new();
    for i in 0..n {
        edges.push((i, (i + 1) % n, 1 + (i * 7 % 5)));
        if i % 3 == 0 {
            let chord = (i + n / 2) % n;
            if chord != (i + 1) % n && chord != i {
                edges.push((i, chord, 2 + (i % 4)));
            }
        }
    }
    Graph::new(coords, &edges, false).unwrap()
}

#[test]
fn square_first_move_and_walk() {
    let g = square_graph(false);
    let sources: Vec<u32> = (0..4).collect();
    let oracle =
        build_oracle(&g, TableKind::Forward, &sources, &BuildOptions::default()).unwrap();

    // Toward 3 the cheap way out of 0 is edge 0 (0 -> 1), not the direct
    // edge 1 (0 -> 3).
    assert_eq!(oracle.first_moves(0, 3), 0b01);

    let mut heur = CpdHeuristic::new(&g, &oracle, 1.0);
    let (cost, path) = heur.h(0, 3, u32::MAX, u64::MAX).unwrap();
    assert_eq!(path, vec![0, 1, 2, 3]);
    assert_eq!(cost, 3);
}

#[test]
fn sharded_build_roundtrips_through_disk() {
    let g = ring_graph(30);
    let dir = tempfile::tempdir().unwrap();
    let xy = Path::new("ring.xy");
    let maxworker = 2;
    let method = PartMethod::Div(8);
    let opts = BuildOptions { threads: 2, seed: 3, progress: false };

    // Every worker builds and serializes its own blocks.
    for wid in 0..maxworker {
        let dc = DistributeController::new(30, maxworker, wid, method).unwrap();
        for nodes in dc.worker_blocks() {
            let bid = dc.block_id(nodes[0]);
            let oracle = build_oracle(&g, TableKind::Forward, &nodes, &opts).unwrap();
            let cpd_file = shard_path(xy, dir.path(), wid, bid);
            write_oracle(&cpd_file, &oracle).unwrap();
            ShardConf::new(xy, method, wid, bid, TableKind::Forward)
                .write(conf_path(&cpd_file))
                .unwrap();
        }
    }

    // The server side: reload each worker's shards, merge, and check that
    // the union answers every pair exactly.
    let mut merged: Option<GraphOracle> = None;
    for wid in 0..maxworker {
        let dc = DistributeController::new(30, maxworker, wid, method).unwrap();
        for nodes in dc.worker_blocks() {
            let bid = dc.block_id(nodes[0]);
            let shard =
                read_oracle(shard_path(xy, dir.path(), wid, bid), TableKind::Forward).unwrap();
            match merged.as_mut() {
                None => merged = Some(shard),
                Some(oracle) => oracle.merge(shard).unwrap(),
            }
        }
    }
    let oracle = merged.unwrap();
    let report = validate_all_pairs(&g, &oracle).unwrap();
    assert!(report.passed(), "mismatches: {:?}", report.mismatches);
    assert_eq!(report.skipped_pairs, 0, "merged shards must cover every source");
    assert_eq!(report.unreachable_pairs, 0, "the ring is strongly connected");
}

#[test]
fn reverse_table_covers_the_same_pairs() {
    let g = Graph::new(
        vec![(0, 0), (1, 0), (1, 1), (0, 1)],
        &[(0, 1, 1), (1, 2, 1), (2, 3, 1), (0, 3, 5), (3, 0, 2)],
        true,
    )
    .unwrap();
    let sources: Vec<u32> = (0..4).collect();
    let oracle =
        build_oracle(&g, TableKind::Reverse, &sources, &BuildOptions::default()).unwrap();
    let mut heur = CpdHeuristic::new(&g, &oracle, 1.0);
    for start in 0..4u32 {
        for target in 0..4u32 {
            let (_, path) = heur.h(start, target, u32::MAX, u64::MAX).unwrap();
            assert_eq!(path.first(), Some(&start));
            assert_eq!(path.last(), Some(&target));
        }
    }
}

#[test]
fn perturbed_search_still_returns_a_valid_optimal_path() {
    let mut g = square_graph(false);
    let sources: Vec<u32> = (0..4).collect();
    let oracle =
        build_oracle(&g, TableKind::Forward, &sources, &BuildOptions::default()).unwrap();

    g.perturb(&[EdgePatch { tail: 0, head: 1, weight: 100 }]).unwrap();

    let mut state = SearchState::new(4);
    let heur = CpdHeuristic::new(&g, &oracle, 1.0);
    let mut search =
        CpdSearch::new(&mut state, SimpleExpansion::new(&g), heur, Cutoffs::default());
    let sol = search.get_path(Problem { start: 0, target: 3 });

    // The stale oracle path would cost 102; the search must recover the
    // direct edge.
    assert_eq!(sol.path, vec![0, 3]);
    assert_eq!(sol.cost, 5);
    assert_eq!(sol.stop, StopReason::Done);
}

#[test]
fn expansion_cutoff_bounds_every_query() {
    let mut g = ring_graph(40);
    let sources: Vec<u32> = (0..40).collect();
    let oracle =
        build_oracle(&g, TableKind::Forward, &sources, &BuildOptions::default()).unwrap();

    // Perturb a few ring edges so the searches actually have to expand.
    g.perturb(&[
        EdgePatch { tail: 0, head: 1, weight: 90 },
        EdgePatch { tail: 10, head: 11, weight: 90 },
        EdgePatch { tail: 20, head: 21, weight: 90 },
    ])
    .unwrap();

    let max_expansions = 5;
    let mut state = SearchState::new(40);
    for (start, target) in [(0u32, 15u32), (5, 30), (39, 12), (11, 2)] {
        let heur = CpdHeuristic::new(&g, &oracle, 1.0);
        let cutoffs = Cutoffs { max_expansions, ..Default::default() };
        let mut search =
            CpdSearch::new(&mut state, SimpleExpansion::new(&g), heur, cutoffs);
        let sol = search.get_path(Problem { start, target });
        assert!(
            sol.metrics.nodes_expanded <= max_expansions,
            "{} -> {} expanded {}",
            start,
            target,
            sol.metrics.nodes_expanded
        );
        // Whatever the cutoff did, any returned path must be real: walk
        // it and re-price it against the live graph.
        if sol.reached_target(target) {
            let mut priced = 0u64;
            for pair in sol.path.windows(2) {
                let (weight, found) = g
                    .out_edges(pair[0])
                    .find(|&(head, _)| head == pair[1])
                    .map(|(_, w)| (w as u64, true))
                    .unwrap_or((0, false));
                assert!(found, "edge {} -> {} does not exist", pair[0], pair[1]);
                priced += weight;
            }
            assert_eq!(priced, sol.cost);
        }
    }
}
