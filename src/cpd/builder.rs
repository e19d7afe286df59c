//! Thread-parallel CPD construction.
//!
//! Sources are dealt round-robin across worker threads; each thread owns a
//! private Dijkstra, expansion policy and row buffer, and ships compressed
//! rows back for a single merge after the join. Row slots are independent,
//! so the merge is the only synchronization point.

use anyhow::{ensure, Result};
use indicatif::{ProgressBar, ProgressStyle};

use crate::expand::SimpleExpansion;
use crate::graph::{Graph, NodeId};
use crate::search::dijkstra::Dijkstra;

use super::listener::FirstMoveListener;
use super::{compress_row, GraphOracle, Run, TableKind, NO_MOVES};

#[derive(Debug, Clone)]
pub struct BuildOptions {
    pub threads: usize,
    /// DFS pre-order seed node.
    pub seed: NodeId,
    /// Draw a progress bar on stderr.
    pub progress: bool,
}

impl Default for BuildOptions {
    fn default() -> Self {
        BuildOptions { threads: 1, seed: 0, progress: false }
    }
}

fn progress_bar(len: u64, enabled: bool) -> ProgressBar {
    if !enabled {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new(len);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("progress: [{bar:50}] {percent:>3}% ({pos}/{len} rows)")
            .expect("static progress template")
            .progress_chars("=> "),
    );
    pb
}

/// Build the table for the given `sources` (one worker block). Rows for
/// nodes outside `sources` stay empty, which is what shard files store.
pub fn build_oracle(
    g: &Graph,
    kind: TableKind,
    sources: &[NodeId],
    opts: &BuildOptions,
) -> Result<GraphOracle> {
    let n = g.num_nodes();
    ensure!(opts.threads >= 1, "need at least one build thread");
    ensure!((opts.seed as usize) < n, "seed {} out of range [0, {})", opts.seed, n);
    if kind == TableKind::Reverse {
        ensure!(
            g.has_incoming(),
            "reverse tables need a graph loaded with incoming adjacency"
        );
    }

    let mut oracle = GraphOracle::new(n as u32, kind);
    oracle.compute_dfs_preorder(g, opts.seed);

    let order = oracle.order();
    let threads = opts.threads.min(sources.len().max(1));
    let pb = progress_bar(sources.len() as u64, opts.progress);

    let rows: Vec<Vec<(NodeId, Vec<Run>)>> = std::thread::scope(|scope| {
        let mut handles = Vec::with_capacity(threads);
        for tid in 0..threads {
            let pb = &pb;
            handles.push(scope.spawn(move || {
                let mut dijkstra = Dijkstra::new(n);
                let mut expander = match kind {
                    TableKind::Forward => SimpleExpansion::new(g),
                    TableKind::Reverse => SimpleExpansion::reverse(g),
                };
                let mut row = vec![NO_MOVES; n];
                let mut done = Vec::new();
                // Thread t owns sources t, t + threads, t + 2*threads, ...
                for &source in sources.iter().skip(tid).step_by(threads) {
                    let mut listener = FirstMoveListener::new(source, &mut row);
                    dijkstra.sweep(source, &mut expander, &mut listener);
                    done.push((source, compress_row(order, &row)));
                    pb.inc(1);
                }
                done
            }));
        }
        handles.into_iter().map(|h| h.join().expect("builder thread panicked")).collect()
    });
    pb.finish_and_clear();

    for (source, runs) in rows.into_iter().flatten() {
        oracle.set_runs(source, runs);
    }
    oracle.invert_order();
    Ok(oracle)
}
