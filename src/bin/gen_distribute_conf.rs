//! Print the node -> (worker, block, index) table for a partitioning, as
//! CSV on stdout. Handy for eyeballing a sharding plan before spending
//! hours building the CPDs it implies.

use anyhow::Result;
use clap::Parser;

use cpd_route::{DistributeController, PartMethod};

#[derive(Parser)]
#[command(name = "gen_distribute_conf")]
#[command(about = "Print the node-to-worker distribution table as CSV", long_about = None)]
struct Cli {
    /// Number of nodes in the graph
    #[arg(long)]
    nodenum: u32,

    /// Number of workers the blocks are dealt to
    #[arg(long, default_value = "1")]
    maxworker: u32,

    /// Partition method
    #[arg(long, value_parser = ["mod", "div"], default_value = "mod")]
    partmethod: String,

    /// Parameter of the partition method
    #[arg(long, default_value = "1")]
    partkey: u32,
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let method = PartMethod::parse(&cli.partmethod, cli.partkey)?;
    let dc = DistributeController::new(cli.nodenum, cli.maxworker, 0, method)?;

    println!("node,worker,block,bindex");
    for worker in 0..cli.maxworker {
        for block in dc.worker_blocks_of(worker) {
            for node in block {
                println!(
                    "{},{},{},{}",
                    node,
                    worker,
                    dc.block_id(node),
                    dc.index_in_block(node)
                );
            }
        }
    }
    Ok(())
}
