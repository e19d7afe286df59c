//! xy-graph: immutable road-network topology with mutable edge weights.
//!
//! Storage is flat CSR (offsets/heads/weights) for cache-friendly expansion.
//! Incoming adjacency is materialized only on request; it is needed when
//! building reverse path databases. Weights can be rewritten in place via
//! [`Graph::perturb`], which also bumps a version counter so downstream
//! caches know to invalidate.

use anyhow::{bail, ensure, Context, Result};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

pub type NodeId = u32;

/// Accumulated path cost. Edge weights are `u32`; sums use 64 bits so a
/// long walk cannot overflow.
pub type Cost = u64;

pub const COST_MAX: Cost = u64::MAX;

/// A node's out-degree (and in-degree, when incoming storage is kept) is
/// capped by the width of the first-move bitmask in the path database.
pub const DEGREE_MAX: usize = 32;

/// Weight patch: replace the weight of existing edge `tail -> head`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EdgePatch {
    pub tail: NodeId,
    pub head: NodeId,
    pub weight: u32,
}

#[derive(Debug, Default)]
struct Csr {
    offsets: Vec<u32>,
    heads: Vec<u32>,
    weights: Vec<u32>,
}

impl Csr {
    fn from_lists(lists: &[Vec<(u32, u32)>]) -> Self {
        let mut offsets = Vec::with_capacity(lists.len() + 1);
        let mut heads = Vec::new();
        let mut weights = Vec::new();
        offsets.push(0);
        for list in lists {
            for &(head, weight) in list {
                heads.push(head);
                weights.push(weight);
            }
            offsets.push(heads.len() as u32);
        }
        Csr { offsets, heads, weights }
    }

    #[inline(always)]
    fn range(&self, node: NodeId) -> std::ops::Range<usize> {
        self.offsets[node as usize] as usize..self.offsets[node as usize + 1] as usize
    }
}

/// Directed weighted graph with integer node coordinates.
#[derive(Debug, Default)]
pub struct Graph {
    xs: Vec<i32>,
    ys: Vec<i32>,
    out: Csr,
    inc: Option<Csr>,
    /// Bumped on every perturb call, including empty ones.
    pub version: u64,
}

impl Graph {
    /// Assemble a graph from edge triples. `store_incoming` keeps the
    /// reverse adjacency as well (required for reverse CPD construction).
    pub fn new(
        coords: Vec<(i32, i32)>,
        edges: &[(NodeId, NodeId, u32)],
        store_incoming: bool,
    ) -> Result<Self> {
        let n = coords.len();
        let mut out_lists = vec![Vec::new(); n];
        let mut in_lists = vec![Vec::new(); n];
        for &(tail, head, weight) in edges {
            ensure!(
                (tail as usize) < n && (head as usize) < n,
                "edge {}->{} references a node outside [0, {})",
                tail,
                head,
                n
            );
            out_lists[tail as usize].push((head, weight));
            if store_incoming {
                in_lists[head as usize].push((tail, weight));
            }
        }
        for (id, list) in out_lists.iter().enumerate() {
            ensure!(
                list.len() <= DEGREE_MAX,
                "node {} has out-degree {} but the first-move bitmask holds at most {}",
                id,
                list.len(),
                DEGREE_MAX
            );
        }
        if store_incoming {
            for (id, list) in in_lists.iter().enumerate() {
                ensure!(
                    list.len() <= DEGREE_MAX,
                    "node {} has in-degree {} but the first-move bitmask holds at most {}",
                    id,
                    list.len(),
                    DEGREE_MAX
                );
            }
        }
        let (xs, ys) = coords.into_iter().unzip();
        Ok(Graph {
            xs,
            ys,
            out: Csr::from_lists(&out_lists),
            inc: store_incoming.then(|| Csr::from_lists(&in_lists)),
            version: 0,
        })
    }

    /// Parse an xy-graph file: optional `reverse` token, `nodes N`,
    /// N records `v x y`, `edges M`, M records `tail head weight`.
    /// A `reverse` header (or `store_incoming`) keeps incoming adjacency.
    pub fn load<P: AsRef<Path>>(path: P, store_incoming: bool) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)
            .with_context(|| format!("could not open xy-graph {}", path.display()))?;
        let mut tokens = Tokens::new(BufReader::new(file));

        let mut first = tokens.next_str()?;
        let mut reverse = store_incoming;
        if first == "reverse" {
            reverse = true;
            first = tokens.next_str()?;
        }
        ensure!(first == "nodes", "expected 'nodes' header, got '{}'", first);
        let n: usize = tokens.next_num()?;

        let mut coords = vec![(0i32, 0i32); n];
        let mut seen = vec![false; n];
        for _ in 0..n {
            let id: usize = tokens.next_num()?;
            ensure!(id < n, "node id {} out of range [0, {})", id, n);
            ensure!(!seen[id], "duplicate node record for id {}", id);
            seen[id] = true;
            coords[id] = (tokens.next_num()?, tokens.next_num()?);
        }

        let kw = tokens.next_str()?;
        ensure!(kw == "edges", "expected 'edges' header, got '{}'", kw);
        let m: usize = tokens.next_num()?;
        let mut edges = Vec::with_capacity(m);
        for _ in 0..m {
            let tail: NodeId = tokens.next_num()?;
            let head: NodeId = tokens.next_num()?;
            let weight: u32 = tokens.next_num()?;
            edges.push((tail, head, weight));
        }

        Graph::new(coords, &edges, reverse)
            .with_context(|| format!("while loading {}", path.display()))
    }

    #[inline(always)]
    pub fn num_nodes(&self) -> usize {
        self.xs.len()
    }

    pub fn num_edges(&self) -> usize {
        self.out.heads.len()
    }

    #[inline(always)]
    pub fn xy(&self, node: NodeId) -> (i32, i32) {
        (self.xs[node as usize], self.ys[node as usize])
    }

    /// Outgoing edges of `node` as `(head, weight)` pairs, in load order.
    /// The position of an edge in this iterator is its first-move bit index.
    #[inline(always)]
    pub fn out_edges(&self, node: NodeId) -> impl Iterator<Item = (NodeId, u32)> + '_ {
        self.out
            .range(node)
            .map(move |i| (self.out.heads[i], self.out.weights[i]))
    }

    #[inline(always)]
    pub fn out_degree(&self, node: NodeId) -> usize {
        self.out.range(node).len()
    }

    /// `edge_idx`-th outgoing edge of `node`.
    #[inline(always)]
    pub fn out_edge(&self, node: NodeId, edge_idx: u32) -> (NodeId, u32) {
        let i = self.out.offsets[node as usize] as usize + edge_idx as usize;
        (self.out.heads[i], self.out.weights[i])
    }

    pub fn has_incoming(&self) -> bool {
        self.inc.is_some()
    }

    /// Incoming edges of `node` as `(tail, weight)` pairs. Panics if the
    /// graph was loaded without incoming storage.
    #[inline(always)]
    pub fn in_edges(&self, node: NodeId) -> impl Iterator<Item = (NodeId, u32)> + '_ {
        let inc = self.inc.as_ref().expect("graph loaded without incoming adjacency");
        inc.range(node).map(move |i| (inc.heads[i], inc.weights[i]))
    }

    /// `edge_idx`-th incoming edge of `node`.
    #[inline(always)]
    pub fn in_edge(&self, node: NodeId, edge_idx: u32) -> (NodeId, u32) {
        let inc = self.inc.as_ref().expect("graph loaded without incoming adjacency");
        let i = inc.offsets[node as usize] as usize + edge_idx as usize;
        (inc.heads[i], inc.weights[i])
    }

    /// Replace the weights of the patched edges in place. Topology never
    /// changes; patching an edge that does not exist is an error. An empty
    /// patch list still bumps `version`.
    pub fn perturb(&mut self, patches: &[EdgePatch]) -> Result<()> {
        for patch in patches {
            ensure!(
                (patch.tail as usize) < self.num_nodes()
                    && (patch.head as usize) < self.num_nodes(),
                "patch {}->{} references a node outside the graph",
                patch.tail,
                patch.head
            );
            let range = self.out.range(patch.tail);
            let mut found = false;
            for i in range {
                if self.out.heads[i] == patch.head {
                    self.out.weights[i] = patch.weight;
                    found = true;
                }
            }
            if !found {
                bail!("no edge {}->{} to perturb", patch.tail, patch.head);
            }
            if let Some(inc) = self.inc.as_mut() {
                let range = inc.offsets[patch.head as usize] as usize
                    ..inc.offsets[patch.head as usize + 1] as usize;
                for i in range {
                    if inc.heads[i] == patch.tail {
                        inc.weights[i] = patch.weight;
                    }
                }
            }
        }
        self.version += 1;
        Ok(())
    }
}

/// Parse a diff file: `s`, then s records `tail head weight`.
pub fn load_diff<P: AsRef<Path>>(path: P) -> Result<Vec<EdgePatch>> {
    let path = path.as_ref();
    let file =
        File::open(path).with_context(|| format!("could not open diff {}", path.display()))?;
    let mut tokens = Tokens::new(BufReader::new(file));
    let s: usize = tokens.next_num()?;
    let mut patches = Vec::with_capacity(s);
    for _ in 0..s {
        patches.push(EdgePatch {
            tail: tokens.next_num()?,
            head: tokens.next_num()?,
            weight: tokens.next_num()?,
        });
    }
    Ok(patches)
}

/// Whitespace token stream over a buffered reader.
pub(crate) struct Tokens<R> {
    reader: R,
    line: Vec<String>,
    pos: usize,
}

impl<R: BufRead> Tokens<R> {
    pub(crate) fn new(reader: R) -> Self {
        Tokens { reader, line: Vec::new(), pos: 0 }
    }

    pub(crate) fn next_str(&mut self) -> Result<String> {
        while self.pos == self.line.len() {
            let mut buf = String::new();
            if self.reader.read_line(&mut buf)? == 0 {
                bail!("unexpected end of input");
            }
            self.line = buf.split_whitespace().map(str::to_owned).collect();
            self.pos = 0;
        }
        self.pos += 1;
        Ok(self.line[self.pos - 1].clone())
    }

    pub(crate) fn next_num<T: std::str::FromStr>(&mut self) -> Result<T>
    where
        T::Err: std::error::Error + Send + Sync + 'static,
    {
        let tok = self.next_str()?;
        tok.parse()
            .with_context(|| format!("expected a number, got '{}'", tok))
    }
}
