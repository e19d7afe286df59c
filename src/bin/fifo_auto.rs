//! The query server: load this worker's CPD shards, open a named pipe,
//! and answer request frames until killed. SIGINT/SIGTERM/SIGABRT unlink
//! the pipe on the way out so a restart does not trip over a stale FIFO.

use anyhow::{bail, Context, Result};
use clap::Parser;
use std::path::PathBuf;

use cpd_route::cpd::format::{conf_path, read_oracle, shard_path, ShardConf};
use cpd_route::server::{create_fifo, install_signal_handlers, remove_fifo, AlgKind, Server};
use cpd_route::{DistributeController, Graph, GraphOracle, PartMethod, TableKind};

#[derive(Parser)]
#[command(name = "fifo_auto")]
#[command(about = "CPD query server reading request frames from a named pipe", long_about = None)]
struct Cli {
    /// Input xy-graph file
    #[arg(long)]
    input: PathBuf,

    /// Path of the request pipe
    #[arg(long, default_value = "/tmp/cpd-route.fifo")]
    fifo: PathBuf,

    /// Query algorithm
    #[arg(long, value_parser = ["table", "table-search"])]
    alg: String,

    /// Partition method used when the shards were built
    #[arg(long, value_parser = ["mod", "div"], default_value = "mod")]
    partmethod: String,

    /// Parameter of the partition method
    #[arg(long, default_value = "1")]
    partkey: u32,

    /// Id of this worker
    #[arg(long, default_value = "0")]
    wid: u32,

    /// Total number of workers
    #[arg(long, default_value = "1")]
    maxworker: u32,

    /// Directory holding the .cpd shards and .conf sidecars
    #[arg(long, default_value = ".")]
    outdir: PathBuf,

    /// Worker threads; defaults to all cores
    #[arg(long)]
    threads: Option<usize>,
}

/// Read every shard this worker owns and merge them into one oracle.
fn load_shards(
    cli: &Cli,
    dc: &DistributeController,
    kind: TableKind,
) -> Result<GraphOracle> {
    let mut merged: Option<GraphOracle> = None;
    for nodes in dc.worker_blocks() {
        let bid = dc.block_id(nodes[0]);
        let path = shard_path(&cli.input, &cli.outdir, dc.wid, bid);
        let shard = read_oracle(&path, kind)
            .with_context(|| format!("while loading shard {}", path.display()))?;
        println!("  loaded {} ({} runs)", path.display(), shard.total_runs());
        match merged.as_mut() {
            None => merged = Some(shard),
            Some(oracle) => oracle.merge(shard)?,
        }
    }
    merged.context("this worker owns no blocks")
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    let alg = AlgKind::parse(&cli.alg)?;

    // The sidecar of the first owned shard records how the CPDs were
    // built; the table orientation decides whether the graph needs its
    // incoming adjacency.
    let method = PartMethod::parse(&cli.partmethod, cli.partkey)?;
    let probe_conf = {
        // Worker w's first block is w itself under round-robin dealing.
        let path = conf_path(&shard_path(&cli.input, &cli.outdir, cli.wid, cli.wid));
        ShardConf::read(&path)
            .with_context(|| format!("could not read shard sidecar {}", path.display()))?
    };
    let kind = TableKind::parse(&probe_conf.cpdtype)?;
    if probe_conf.method != cli.partmethod || probe_conf.methodkey != cli.partkey {
        bail!(
            "shards were built with {} {} but the server was started with {} {}",
            probe_conf.method,
            probe_conf.methodkey,
            cli.partmethod,
            cli.partkey
        );
    }

    println!("Loading graph from {}...", cli.input.display());
    let g = Graph::load(&cli.input, kind == TableKind::Reverse)?;
    println!("  {} nodes, {} edges", g.num_nodes(), g.num_edges());

    let dc = DistributeController::new(g.num_nodes() as u32, cli.maxworker, cli.wid, method)?;
    println!("Loading {} shard(s) from {}...", dc.worker_blocks().len(), cli.outdir.display());
    let oracle = load_shards(&cli, &dc, kind)?;

    let threads = cli.threads.unwrap_or_else(|| {
        std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1)
    });

    create_fifo(&cli.fifo)?;
    install_signal_handlers(&cli.fifo)?;
    println!("Reading request frames from {} ({} threads)", cli.fifo.display(), threads);

    let mut server = Server::new(g, oracle, alg, cli.fifo.clone(), threads);
    let result = server.run();
    remove_fifo(&cli.fifo);
    result
}
