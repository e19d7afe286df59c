//! On-disk CPD shard format plus its config sidecar.
//!
//! Binary layout, all little-endian:
//!
//! ```text
//! magic u32 | n_nodes u32 | order n_nodes x u32 | n_sources u32
//! then per source: n_runs u32 | n_runs x (start u32, moves u32)
//! ```
//!
//! `n_sources` equals `n_nodes`; sources outside the shard's block are
//! written with zero runs. This file is the contract between the build
//! tool and the query server — do not change it without bumping the magic.

use anyhow::{ensure, Context, Result};
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use crate::distribute::PartMethod;

use super::{GraphOracle, Run, TableKind};

const MAGIC: u32 = 0x43504431; // "CPD1"

pub fn write_oracle<P: AsRef<Path>>(path: P, oracle: &GraphOracle) -> Result<()> {
    let path = path.as_ref();
    let file = File::create(path)
        .with_context(|| format!("could not create CPD file {}", path.display()))?;
    let mut w = BufWriter::new(file);

    w.write_all(&MAGIC.to_le_bytes())?;
    w.write_all(&oracle.num_nodes().to_le_bytes())?;
    for &node in oracle.order() {
        w.write_all(&node.to_le_bytes())?;
    }
    w.write_all(&oracle.num_nodes().to_le_bytes())?;
    for source in 0..oracle.num_nodes() {
        let runs = oracle.runs(source);
        w.write_all(&(runs.len() as u32).to_le_bytes())?;
        for run in runs {
            w.write_all(&run.start.to_le_bytes())?;
            w.write_all(&run.moves.to_le_bytes())?;
        }
    }
    w.flush()?;
    Ok(())
}

fn read_u32<R: Read>(r: &mut R) -> Result<u32> {
    let mut buf = [0u8; 4];
    r.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

pub fn read_oracle<P: AsRef<Path>>(path: P, kind: TableKind) -> Result<GraphOracle> {
    let path = path.as_ref();
    let file = File::open(path)
        .with_context(|| format!("could not open CPD file {}", path.display()))?;
    let mut r = BufReader::new(file);

    let magic = read_u32(&mut r)?;
    ensure!(
        magic == MAGIC,
        "{} is not a CPD file (magic {:#010x})",
        path.display(),
        magic
    );
    let n_nodes = read_u32(&mut r)?;
    let mut order = Vec::with_capacity(n_nodes as usize);
    for _ in 0..n_nodes {
        order.push(read_u32(&mut r)?);
    }

    let mut oracle = GraphOracle::new(n_nodes, kind);
    oracle.set_order(order)?;

    let n_sources = read_u32(&mut r)?;
    ensure!(
        n_sources == n_nodes,
        "CPD file declares {} sources for {} nodes",
        n_sources,
        n_nodes
    );
    for source in 0..n_sources {
        let n_runs = read_u32(&mut r)?;
        let mut runs = Vec::with_capacity(n_runs as usize);
        for _ in 0..n_runs {
            let start = read_u32(&mut r)?;
            let moves = read_u32(&mut r)?;
            ensure!(start < n_nodes, "run start {} out of rank range", start);
            runs.push(Run { start, moves });
        }
        oracle.set_runs(source, runs);
    }
    oracle.invert_order();
    Ok(oracle)
}

/// Shard file path: `<outdir>/<map-stem>-<wid>-<bid>.cpd`.
pub fn shard_path(xyfile: &Path, outdir: &Path, wid: u32, bid: u32) -> PathBuf {
    let stem = xyfile.file_stem().unwrap_or_default().to_string_lossy();
    outdir.join(format!("{}-{}-{}.cpd", stem, wid, bid))
}

/// Build-time metadata written next to each shard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShardConf {
    pub xyfile: String,
    pub method: String,
    pub methodkey: u32,
    pub wid: u32,
    pub bid: u32,
    pub cpdtype: String,
}

impl ShardConf {
    pub fn new(xyfile: &Path, method: PartMethod, wid: u32, bid: u32, kind: TableKind) -> Self {
        ShardConf {
            xyfile: xyfile.display().to_string(),
            method: method.name().to_string(),
            methodkey: method.key(),
            wid,
            bid,
            cpdtype: kind.label().to_string(),
        }
    }

    pub fn write<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let file = File::create(path)
            .with_context(|| format!("could not create conf file {}", path.display()))?;
        let mut w = BufWriter::new(file);
        writeln!(w, "xyfile,method,methodkey,wid,bid,cpdtype")?;
        writeln!(
            w,
            "{},{},{},{},{},{}",
            self.xyfile, self.method, self.methodkey, self.wid, self.bid, self.cpdtype
        )?;
        w.flush()?;
        Ok(())
    }

    pub fn read<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)
            .with_context(|| format!("could not open conf file {}", path.display()))?;
        let mut lines = BufReader::new(file).lines();
        let header = lines.next().context("conf file is empty")??;
        ensure!(
            header.trim() == "xyfile,method,methodkey,wid,bid,cpdtype",
            "unexpected conf header '{}'",
            header
        );
        let row = lines.next().context("conf file has no data row")??;
        let fields: Vec<&str> = row.trim().split(',').collect();
        ensure!(fields.len() == 6, "conf row has {} fields, expected 6", fields.len());
        Ok(ShardConf {
            xyfile: fields[0].to_string(),
            method: fields[1].to_string(),
            methodkey: fields[2].parse().context("bad methodkey")?,
            wid: fields[3].parse().context("bad wid")?,
            bid: fields[4].parse().context("bad bid")?,
            cpdtype: fields[5].to_string(),
        })
    }
}

/// Sidecar path for a shard: same stem, `.conf` extension.
pub fn conf_path(cpd_path: &Path) -> PathBuf {
    cpd_path.with_extension("conf")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpd::builder::{build_oracle, BuildOptions};
    use crate::graph::testutil::square_graph;

    #[test]
    fn cpd_file_roundtrip() {
        let g = square_graph(false);
        let sources: Vec<u32> = (0..4).collect();
        let oracle =
            build_oracle(&g, TableKind::Forward, &sources, &BuildOptions::default()).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("square-0-0.cpd");
        write_oracle(&path, &oracle).unwrap();

        let loaded = read_oracle(&path, TableKind::Forward).unwrap();
        assert_eq!(loaded.num_nodes(), oracle.num_nodes());
        assert_eq!(loaded.order(), oracle.order());
        for s in 0..4 {
            assert_eq!(loaded.runs(s), oracle.runs(s));
            for t in 0..4 {
                assert_eq!(loaded.first_moves(s, t), oracle.first_moves(s, t));
            }
        }
    }

    #[test]
    fn rejects_foreign_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("not-a-cpd");
        std::fs::write(&path, b"plain text, definitely no magic").unwrap();
        assert!(read_oracle(&path, TableKind::Forward).is_err());
    }

    #[test]
    fn shard_naming_drops_the_extension() {
        let p = shard_path(Path::new("/maps/melb-both.xy"), Path::new("/out"), 4, 17);
        assert_eq!(p, PathBuf::from("/out/melb-both-4-17.cpd"));
        assert_eq!(conf_path(&p), PathBuf::from("/out/melb-both-4-17.conf"));
    }

    #[test]
    fn conf_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("melb-0-3.conf");
        let conf = ShardConf::new(
            Path::new("melb-both.xy"),
            PartMethod::Div(9000),
            0,
            3,
            TableKind::Reverse,
        );
        conf.write(&path).unwrap();
        let back = ShardConf::read(&path).unwrap();
        assert_eq!(back, conf);
        assert_eq!(back.cpdtype, "reverse-table");
    }
}
