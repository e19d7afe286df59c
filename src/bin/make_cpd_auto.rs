//! Build CPD shards for one worker of a partitioned construction run.
//!
//! The distribution controller decides which blocks this worker owns; for
//! each block one table is built (thread-parallel Dijkstra sweeps) and
//! serialized as `<map>-<wid>-<bid>.cpd` with a `.conf` sidecar recording
//! how the run was partitioned. Workers are independent, so a cluster
//! builds a large network's CPD by running this once per worker id.

use anyhow::{ensure, Context, Result};
use clap::Parser;
use rand::Rng;
use std::path::PathBuf;
use std::time::Instant;

use cpd_route::cpd::builder::{build_oracle, BuildOptions};
use cpd_route::cpd::format::{conf_path, shard_path, write_oracle, ShardConf};
use cpd_route::validate::validate_oracle;
use cpd_route::{DistributeController, Graph, PartMethod, TableKind};

#[derive(Parser)]
#[command(name = "make_cpd_auto")]
#[command(about = "Build CPD shards for this worker's blocks", long_about = None)]
struct Cli {
    /// Input xy-graph file
    #[arg(long)]
    input: PathBuf,

    /// Output directory for .cpd and .conf files
    #[arg(long, default_value = ".")]
    outdir: PathBuf,

    /// Partition method
    #[arg(long, value_parser = ["mod", "div"], default_value = "mod")]
    partition: String,

    /// Parameter of the partition method
    #[arg(long, default_value = "1")]
    partkey: u32,

    /// Id of this worker
    #[arg(long, default_value = "0")]
    workerid: u32,

    /// Total number of workers
    #[arg(long, default_value = "1")]
    maxworker: u32,

    /// Table orientation
    #[arg(long, value_parser = ["fwd", "rev"], default_value = "rev")]
    cpdtype: String,

    /// DFS pre-order seed node; random when omitted
    #[arg(long)]
    seed: Option<u32>,

    /// Worker threads per block; defaults to all cores
    #[arg(long)]
    threads: Option<usize>,

    /// After building each shard, check this many random pairs against a
    /// Dijkstra baseline and fail on any mismatch
    #[arg(long)]
    validate: Option<usize>,

    #[arg(long)]
    verbose: bool,
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let kind = TableKind::parse(&cli.cpdtype)?;
    let begin = Instant::now();

    println!("Loading graph from {}...", cli.input.display());
    let g = Graph::load(&cli.input, kind == TableKind::Reverse)?;
    println!("  {} nodes, {} edges", g.num_nodes(), g.num_edges());
    ensure!(g.num_nodes() > 0, "refusing to build a CPD for an empty graph");

    let method = PartMethod::parse(&cli.partition, cli.partkey)?;
    let dc = DistributeController::new(g.num_nodes() as u32, cli.maxworker, cli.workerid, method)?;

    let seed = match cli.seed {
        Some(seed) => seed,
        None => rand::thread_rng().gen_range(0..g.num_nodes() as u32),
    };
    let opts = BuildOptions {
        threads: cli.threads.unwrap_or_else(|| {
            std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1)
        }),
        seed,
        progress: true,
    };

    std::fs::create_dir_all(&cli.outdir)
        .with_context(|| format!("could not create {}", cli.outdir.display()))?;

    let blocks = dc.worker_blocks();
    println!(
        "Worker {} owns {} of {} blocks ({} {})",
        dc.wid,
        blocks.len(),
        dc.num_blocks(),
        method.name(),
        method.key()
    );

    for nodes in &blocks {
        let bid = dc.block_id(nodes[0]);
        let cpd_file = shard_path(&cli.input, &cli.outdir, dc.wid, bid);

        println!(
            "Block {}: {} sources, {} threads -> {}",
            bid,
            nodes.len(),
            opts.threads,
            cpd_file.display()
        );
        let block_start = Instant::now();
        let oracle = build_oracle(&g, kind, nodes, &opts)?;
        println!(
            "  {} runs total ({:.1} per source) in {:.2}s",
            oracle.total_runs(),
            oracle.total_runs() as f64 / nodes.len() as f64,
            block_start.elapsed().as_secs_f64()
        );

        if let Some(n_pairs) = cli.validate {
            let report = validate_oracle(&g, &oracle, n_pairs, seed as u64)?;
            ensure!(
                report.passed(),
                "oracle validation failed on {} of {} pairs (first: {:?})",
                report.mismatches.len(),
                report.total_pairs,
                report.mismatches.first()
            );
            println!(
                "  validated {} pairs ({} checked, {} unreachable, {} off-shard)",
                report.total_pairs,
                report.checked_pairs,
                report.unreachable_pairs,
                report.skipped_pairs
            );
        }

        write_oracle(&cpd_file, &oracle)?;
        ShardConf::new(&cli.input, method, dc.wid, bid, kind).write(conf_path(&cpd_file))?;
        if cli.verbose {
            println!("  wrote {} and sidecar", cpd_file.display());
        }
    }

    println!("Done: {} blocks in {:.2}s", blocks.len(), begin.elapsed().as_secs_f64());
    Ok(())
}
