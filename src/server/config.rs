//! Per-request search configuration, received as a JSON blob at the head
//! of every FIFO frame. Every field is optional; a malformed blob falls
//! back to this default wholesale, and out-of-range values are clamped
//! rather than rejected so a sloppy client still gets answers.

use serde::{Deserialize, Serialize};

use crate::search::cpd_search::Cutoffs;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct QueryConfig {
    /// Wall-time cutoff per query, nanoseconds. Stored as f64 so clients
    /// may write `1e9`.
    pub time: f64,
    /// Expansion-count cutoff per query.
    pub itrs: u64,
    /// Cap on oracle walk depth.
    pub k_moves: u32,
    /// Quality bound for early incumbent return.
    pub fscale: f64,
    /// Heuristic inflation for bounded-suboptimal search.
    pub hscale: f64,
    /// Worker threads for this batch (capped by the server's pool).
    pub threads: usize,
    /// Assign queries by `target % threads` instead of by range, to keep
    /// each thread on the same oracle rows.
    pub thread_alloc: bool,
    /// Bump the graph version before the batch so heuristic caches from
    /// earlier batches cannot be reused.
    pub no_cache: bool,
    pub verbose: bool,
    pub debug: bool,
}

impl Default for QueryConfig {
    fn default() -> Self {
        QueryConfig {
            time: f64::MAX,
            itrs: u64::MAX,
            k_moves: u32::MAX,
            fscale: 1.0,
            hscale: 1.0,
            threads: 1,
            thread_alloc: false,
            no_cache: false,
            verbose: false,
            debug: false,
        }
    }
}

impl QueryConfig {
    /// Clamp nonsense values instead of failing the request.
    pub fn sanitize(&mut self) {
        if !self.time.is_finite() || self.time <= 0.0 {
            self.time = f64::MAX;
        }
        if self.fscale < 1.0 || !self.fscale.is_finite() {
            self.fscale = 1.0;
        }
        if self.hscale < 1.0 || !self.hscale.is_finite() {
            self.hscale = 1.0;
        }
        if self.threads == 0 {
            self.threads = 1;
        }
        if self.k_moves == 0 {
            self.k_moves = u32::MAX;
        }
    }

    pub fn cutoffs(&self) -> Cutoffs {
        Cutoffs {
            max_time_ns: if self.time >= u64::MAX as f64 { u64::MAX } else { self.time as u64 },
            max_expansions: self.itrs,
            max_k_moves: self.k_moves,
            fscale: self.fscale,
        }
    }
}
