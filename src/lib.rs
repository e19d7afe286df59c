//! cpd-route: Compressed Path Database construction and CPD-guided query
//! answering for static road networks.
//!
//! The crate splits into a build side and a query side. Building sweeps a
//! full-graph Dijkstra from every source in a worker's blocks, folds the
//! resulting first-move tables into run-length rows ([`cpd`]), and writes
//! one shard file per block. Querying loads a shard read-only and answers
//! point-to-point requests either by walking the oracle directly or by
//! running the CPD-guided A* ([`search::cpd_search`]), multiplexed over a
//! named pipe by [`server`].

pub mod cpd;
pub mod distribute;
pub mod expand;
pub mod graph;
pub mod pqueue;
pub mod search;
pub mod server;
pub mod validate;

pub use cpd::{GraphOracle, TableKind};
pub use distribute::{DistributeController, PartMethod};
pub use graph::Graph;
