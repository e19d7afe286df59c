//! Request-frame handling through the public server API. Frames are fed
//! from regular files — the receive path reads whatever sits at the pipe
//! path, which keeps these tests free of actual FIFO plumbing.

use cpd_route::cpd::builder::{build_oracle, BuildOptions};
use cpd_route::server::{AlgKind, Server};
use cpd_route::{Graph, TableKind};
use std::fs;
use std::path::Path;

fn square_graph() -> Graph {
    Graph::new(
        vec![(0, 0), (1, 0), (1, 1), (0, 1)],
        &[(0, 1, 1), (1, 2, 1), (2, 3, 1), (0, 3, 5)],
        false,
    )
    .unwrap()
}

fn square_server(dir: &Path, alg: AlgKind) -> Server {
    let g = square_graph();
    let sources: Vec<u32> = (0..4).collect();
    let oracle =
        build_oracle(&g, TableKind::Forward, &sources, &BuildOptions::default()).unwrap();
    Server::new(g, oracle, alg, dir.join("request.frame"), 2)
}

fn reply_fields(reply: &str) -> Vec<String> {
    reply.trim().split(',').map(str::to_string).collect()
}

#[test]
fn one_query_frame_produces_a_csv_reply() {
    let dir = tempfile::tempdir().unwrap();
    let mut server = square_server(dir.path(), AlgKind::TableSearch);

    let queries = dir.path().join("queries.txt");
    fs::write(&queries, "1\n0 3\n").unwrap();
    let reply = dir.path().join("out.csv");
    fs::write(
        dir.path().join("request.frame"),
        format!("{{\"time\": 1e9}}\n{} {} -\n", queries.display(), reply.display()),
    )
    .unwrap();

    assert!(server.serve_once().unwrap());

    let fields = reply_fields(&fs::read_to_string(&reply).unwrap());
    assert_eq!(fields.len(), 10);
    // plen: the path 0 -> 1 -> 2 -> 3 has four nodes; finished: 1.
    assert_eq!(fields[5], "4");
    assert_eq!(fields[6], "1");
}

#[test]
fn identical_frames_reply_identically_modulo_timings() {
    let dir = tempfile::tempdir().unwrap();
    let mut server = square_server(dir.path(), AlgKind::TableSearch);

    let queries = dir.path().join("queries.txt");
    fs::write(&queries, "3\n0 3\n1 3\n0 2\n").unwrap();
    let reply = dir.path().join("out.csv");
    let frame = format!("{{}}\n{} {} -\n", queries.display(), reply.display());

    fs::write(dir.path().join("request.frame"), &frame).unwrap();
    assert!(server.serve_once().unwrap());
    let first = reply_fields(&fs::read_to_string(&reply).unwrap());

    fs::write(dir.path().join("request.frame"), &frame).unwrap();
    assert!(server.serve_once().unwrap());
    let second = reply_fields(&fs::read_to_string(&reply).unwrap());

    // Fields 7..10 are wall-clock readings; everything else must match.
    assert_eq!(first[..7], second[..7]);
}

#[test]
fn perturbation_batch_reroutes_subsequent_queries() {
    let dir = tempfile::tempdir().unwrap();
    let mut server = square_server(dir.path(), AlgKind::TableSearch);

    let queries = dir.path().join("queries.txt");
    fs::write(&queries, "1\n0 3\n").unwrap();
    let diff = dir.path().join("patch.diff");
    fs::write(&diff, "1\n0 1 100\n").unwrap();
    let reply = dir.path().join("out.csv");
    fs::write(
        dir.path().join("request.frame"),
        format!("{{}}\n{} {} {}\n", queries.display(), reply.display(), diff.display()),
    )
    .unwrap();

    assert!(server.serve_once().unwrap());

    let fields = reply_fields(&fs::read_to_string(&reply).unwrap());
    // The rerouted optimum 0 -> 3 is the two-node direct edge.
    assert_eq!(fields[5], "2");
    assert_eq!(fields[6], "1");
}

#[test]
fn malformed_config_still_answers() {
    let dir = tempfile::tempdir().unwrap();
    let mut server = square_server(dir.path(), AlgKind::Table);

    let queries = dir.path().join("queries.txt");
    fs::write(&queries, "2\n0 3\n2 3\n").unwrap();
    let reply = dir.path().join("out.csv");
    fs::write(
        dir.path().join("request.frame"),
        format!("{{time=1e9, nonsense}}\n{} {} -\n", queries.display(), reply.display()),
    )
    .unwrap();

    assert!(server.serve_once().unwrap());
    let fields = reply_fields(&fs::read_to_string(&reply).unwrap());
    assert_eq!(fields[6], "2");
}

#[test]
fn unreadable_queries_path_drops_the_request() {
    let dir = tempfile::tempdir().unwrap();
    let mut server = square_server(dir.path(), AlgKind::Table);

    fs::write(
        dir.path().join("request.frame"),
        format!("{{}}\n{} {} -\n", dir.path().join("missing.txt").display(), dir.path().join("out.csv").display()),
    )
    .unwrap();

    assert!(!server.serve_once().unwrap());
    assert!(!dir.path().join("out.csv").exists());
}
