//! Long-lived FIFO query server.
//!
//! One request frame = a JSON config blob, then three tokens
//! `queries_path reply_path diff_path`. The server opens the pipe, drains
//! one frame, optionally perturbs the graph, fans the queries out over its
//! pre-allocated worker states, and writes a single CSV reply line. The
//! protocol is stateless: every frame is self-contained, and a malformed
//! config falls back to defaults instead of poisoning the loop.
//!
//! The graph is read-shared by the workers and mutated only between
//! batches, on the main thread; the join barrier before the reply is the
//! only synchronization.

pub mod config;

use anyhow::{bail, Context, Result};
use std::ffi::CString;
use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Instant;

use crate::cpd::extraction::CpdExtraction;
use crate::cpd::heuristic::CpdHeuristic;
use crate::cpd::GraphOracle;
use crate::expand::SimpleExpansion;
use crate::graph::{load_diff, Graph, NodeId};
use crate::search::cpd_search::{CpdSearch, SearchState};
use crate::search::{Metrics, Problem, Solution, StopReason};

use config::QueryConfig;

/// Which algorithm answers the queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlgKind {
    /// Pure oracle walk.
    Table,
    /// CPD-guided A*.
    TableSearch,
}

impl AlgKind {
    pub fn parse(name: &str) -> Result<Self> {
        match name {
            "table" => Ok(AlgKind::Table),
            "table-search" => Ok(AlgKind::TableSearch),
            other => bail!("unknown algorithm '{}', expected 'table' or 'table-search'", other),
        }
    }
}

#[derive(Debug)]
struct Frame {
    conf: QueryConfig,
    queries_path: String,
    reply_path: String,
    diff_path: String,
}

/// Split a frame into its config and path tokens. A blob that fails to
/// parse is dropped (with a warning) and the defaults apply; the three
/// path tokens are mandatory.
fn parse_frame(input: &str) -> Result<Frame> {
    let mut stream = serde_json::Deserializer::from_str(input).into_iter::<QueryConfig>();
    let (mut conf, rest) = match stream.next() {
        Some(Ok(conf)) => (conf, &input[stream.byte_offset()..]),
        _ => {
            log::warn!("malformed config blob in request frame; using defaults");
            // Skip the blob token if there was one, keep the path tokens.
            let trimmed = input.trim_start();
            let rest = if trimmed.starts_with('{') {
                match trimmed.find('}') {
                    Some(end) => &trimmed[end + 1..],
                    None => trimmed,
                }
            } else {
                input
            };
            (QueryConfig::default(), rest)
        }
    };
    conf.sanitize();

    let mut tokens = rest.split_whitespace();
    let queries_path = tokens.next().context("frame is missing the queries path")?;
    let reply_path = tokens.next().context("frame is missing the reply path")?;
    let diff_path = tokens.next().context("frame is missing the diff path")?;
    Ok(Frame {
        conf,
        queries_path: queries_path.to_string(),
        reply_path: reply_path.to_string(),
        diff_path: diff_path.to_string(),
    })
}

fn read_queries(path: &str) -> Result<Vec<(u64, u64)>> {
    let file = File::open(path).with_context(|| format!("could not open queries {}", path))?;
    let mut tokens = crate::graph::Tokens::new(std::io::BufReader::new(file));
    let s: usize = tokens.next_num()?;
    let mut queries = Vec::with_capacity(s);
    for _ in 0..s {
        queries.push((tokens.next_num()?, tokens.next_num()?));
    }
    Ok(queries)
}

#[derive(Debug, Default, Clone, Copy)]
struct BatchTotals {
    metrics: Metrics,
    plen: u64,
    finished: u64,
}

impl BatchTotals {
    fn absorb(&mut self, sol: &Solution, target: NodeId) {
        self.metrics.accumulate(&sol.metrics);
        self.plen += sol.path.len() as u64;
        self.finished += sol.reached_target(target) as u64;
    }

    fn merge(&mut self, other: &BatchTotals) {
        self.metrics.accumulate(&other.metrics);
        self.plen += other.plen;
        self.finished += other.finished;
    }
}

pub struct Server {
    g: Graph,
    oracle: GraphOracle,
    alg: AlgKind,
    fifo: PathBuf,
    states: Vec<SearchState>,
}

impl Server {
    pub fn new(
        g: Graph,
        oracle: GraphOracle,
        alg: AlgKind,
        fifo: PathBuf,
        max_threads: usize,
    ) -> Self {
        let n = g.num_nodes();
        let states = (0..max_threads.max(1)).map(|_| SearchState::new(n)).collect();
        Server { g, oracle, alg, fifo, states }
    }

    /// Block for one request frame on the FIFO, process it, reply.
    /// Returns false when the request was dropped (unreadable queries
    /// file); the caller keeps looping either way.
    pub fn serve_once(&mut self) -> Result<bool> {
        let t_read = Instant::now();
        let mut raw = String::new();
        File::open(&self.fifo)
            .with_context(|| format!("could not open request pipe {}", self.fifo.display()))?
            .read_to_string(&mut raw)?;
        let frame = parse_frame(&raw)?;
        log::debug!(
            "frame: queries={} reply={} diff={}",
            frame.queries_path,
            frame.reply_path,
            frame.diff_path
        );

        let queries = match read_queries(&frame.queries_path) {
            Ok(queries) => queries,
            Err(err) => {
                log::warn!("dropping request: {:#}", err);
                return Ok(false);
            }
        };
        let t_read_ns = t_read.elapsed().as_nanos() as u64;

        if frame.diff_path != "-" {
            match load_diff(&frame.diff_path).and_then(|p| self.g.perturb(&p).map(|_| p.len())) {
                Ok(count) => log::info!("applied {} weight perturbations", count),
                Err(err) => {
                    log::warn!("dropping request, bad diff {}: {:#}", frame.diff_path, err);
                    return Ok(false);
                }
            }
        } else if frame.conf.no_cache {
            self.g.perturb(&[])?;
        }

        let t_wall = Instant::now();
        let totals = self.run_batch(&frame.conf, &queries);
        let t_wall_ns = t_wall.elapsed().as_nanos() as u64;

        write_reply(&frame.reply_path, &totals, t_read_ns, t_wall_ns)?;
        Ok(true)
    }

    pub fn run(&mut self) -> Result<()> {
        loop {
            self.serve_once()?;
        }
    }

    fn run_batch(&mut self, conf: &QueryConfig, queries: &[(u64, u64)]) -> BatchTotals {
        let threads = conf.threads.min(self.states.len()).max(1);
        let n = self.g.num_nodes();
        let g = &self.g;
        let oracle = &self.oracle;
        let alg = self.alg;

        let per_thread: Vec<BatchTotals> = std::thread::scope(|scope| {
            let mut handles = Vec::with_capacity(threads);
            for (tid, state) in self.states.iter_mut().take(threads).enumerate() {
                handles.push(scope.spawn(move || {
                    let mut totals = BatchTotals::default();
                    let mut run = make_runner(alg, g, oracle, conf, state);

                    // Range split by default; modulo-of-target when the
                    // client asked for oracle locality.
                    let (from, to) = if conf.thread_alloc {
                        (0, queries.len())
                    } else {
                        let step = queries.len() * tid;
                        (step / threads, (step + queries.len()) / threads)
                    };
                    for &(origin, destination) in &queries[from..to] {
                        if conf.thread_alloc && destination % threads as u64 != tid as u64 {
                            continue;
                        }
                        if origin >= n as u64 || destination >= n as u64 {
                            log::warn!("query {} -> {} outside graph", origin, destination);
                            totals.absorb(&Solution::none(StopReason::Exhausted), NodeId::MAX);
                            continue;
                        }
                        let pi = Problem { start: origin as NodeId, target: destination as NodeId };
                        let sol = run(pi);
                        totals.absorb(&sol, pi.target);
                    }
                    totals
                }));
            }
            handles.into_iter().map(|h| h.join().expect("worker thread panicked")).collect()
        });

        let mut totals = BatchTotals::default();
        for t in &per_thread {
            totals.merge(t);
        }
        totals
    }
}

/// Build the per-thread query runner for this batch. The worker states
/// persist across batches; only this thin wrapper is rebuilt, because it
/// borrows the (possibly just perturbed) graph.
fn make_runner<'b>(
    alg: AlgKind,
    g: &'b Graph,
    oracle: &'b GraphOracle,
    conf: &QueryConfig,
    state: &'b mut SearchState,
) -> Box<dyn FnMut(Problem) -> Solution + 'b> {
    match alg {
        AlgKind::Table => {
            let mut extraction = CpdExtraction::new(g, oracle);
            extraction.set_max_k_moves(conf.k_moves);
            Box::new(move |pi| extraction.get_path(pi))
        }
        AlgKind::TableSearch => {
            let heur = CpdHeuristic::new(g, oracle, conf.hscale);
            let mut search =
                CpdSearch::new(state, SimpleExpansion::new(g), heur, conf.cutoffs());
            Box::new(move |pi| search.get_path(pi))
        }
    }
}

fn write_reply(reply_path: &str, totals: &BatchTotals, t_read_ns: u64, t_wall_ns: u64) -> Result<()> {
    let line = format!(
        "{},{},{},{},{},{},{},{},{},{}\n",
        totals.metrics.nodes_expanded,
        totals.metrics.nodes_generated,
        totals.metrics.nodes_reopen,
        totals.metrics.nodes_surplus,
        totals.metrics.heap_ops,
        totals.plen,
        totals.finished,
        t_read_ns,
        totals.metrics.time_elapsed_ns,
        t_wall_ns,
    );
    if reply_path == "-" {
        std::io::stdout().write_all(line.as_bytes())?;
        std::io::stdout().flush()?;
    } else {
        let mut file = File::create(reply_path)
            .with_context(|| format!("could not open reply stream {}", reply_path))?;
        file.write_all(line.as_bytes())?;
        file.flush()?;
    }
    Ok(())
}

static FIFO_PATH: OnceLock<CString> = OnceLock::new();

/// Create the request pipe. Fails if something already sits at the path.
pub fn create_fifo(path: &Path) -> Result<()> {
    let cpath = CString::new(path.as_os_str().as_encoded_bytes())
        .context("fifo path contains a NUL byte")?;
    let status = unsafe { libc::mkfifo(cpath.as_ptr(), 0o666) };
    if status != 0 {
        bail!(
            "mkfifo {} failed: {}",
            path.display(),
            std::io::Error::last_os_error()
        );
    }
    Ok(())
}

/// Unlink the pipe and die with the signal number. Only async-signal-safe
/// calls in here.
extern "C" fn remove_fifo_and_exit(signum: libc::c_int) {
    if let Some(path) = FIFO_PATH.get() {
        unsafe {
            libc::unlink(path.as_ptr());
        }
    }
    unsafe { libc::_exit(signum) }
}

/// Arrange for the pipe to be unlinked on SIGINT/SIGTERM/SIGABRT.
pub fn install_signal_handlers(path: &Path) -> Result<()> {
    let cpath = CString::new(path.as_os_str().as_encoded_bytes())
        .context("fifo path contains a NUL byte")?;
    FIFO_PATH.set(cpath).ok();
    unsafe {
        libc::signal(libc::SIGINT, remove_fifo_and_exit as libc::sighandler_t);
        libc::signal(libc::SIGTERM, remove_fifo_and_exit as libc::sighandler_t);
        libc::signal(libc::SIGABRT, remove_fifo_and_exit as libc::sighandler_t);
    }
    Ok(())
}

/// Remove the pipe on orderly shutdown paths.
pub fn remove_fifo(path: &Path) {
    let _ = std::fs::remove_file(path);
}
