#![allow(missing_docs)]

use std::fs;

use assert_cmd::cargo::cargo_bin_cmd;
use serde_json::Value;
use tempfile::TempDir;

fn weighted_triangle(dir: &TempDir) -> std::path::PathBuf {
    let path = dir.path().join("g.txt");
    fs::write(&path, "3\n3\n0 1 7\n0 2 8\n1 2 9\n").expect("write input");
    path
}

#[test]
fn converts_and_reports_json_summary() {
    let dir = TempDir::new().expect("tempdir");
    let input = weighted_triangle(&dir);
    let output = dir.path().join("g.adj");

    let stdout = cargo_bin_cmd!("edgeconv")
        .arg(format!("--inputfile={}", input.display()))
        .arg(format!("--outputfile={}", output.display()))
        .args([
            "--inputformat=TextEdgeList",
            "--outputformat=polymer",
            "--edgedata=int",
            "--buffer-mib=1",
            "--threads=2",
            "--no-pin",
            "--format",
            "json",
        ])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let summary: Value = serde_json::from_slice(&stdout).expect("json summary");
    assert_eq!(summary["vertices"], 3);
    assert_eq!(summary["edges"], 3);
    assert_eq!(summary["edge_data"], "u64");
    assert_eq!(
        fs::read_to_string(&output).expect("output"),
        "WeightedAdjacencyGraph\n3\n3\n0\n2\n3\n1\n2\n2\n7\n8\n9\n"
    );
}

#[test]
fn noedgedata_drops_payloads() {
    let dir = TempDir::new().expect("tempdir");
    let input = weighted_triangle(&dir);
    let output = dir.path().join("g.bin");

    cargo_bin_cmd!("edgeconv")
        .arg(format!("--inputfile={}", input.display()))
        .arg(format!("--outputfile={}", output.display()))
        .args([
            "--inputformat=edgelist",
            "--outputformat=grazelle",
            "--noedgedata",
            "--no-pin",
        ])
        .assert()
        .success();
    assert_eq!(fs::read(&output).expect("output").len(), 16 + 3 * 16);
}

#[test]
fn transforms_and_vector_sparse_flags_apply() {
    let dir = TempDir::new().expect("tempdir");
    let input = weighted_triangle(&dir);
    let output = dir.path().join("g.out.txt");

    let stdout = cargo_bin_cmd!("edgeconv")
        .arg(format!("--inputfile={}", input.display()))
        .arg(format!("--outputfile={}", output.display()))
        .args([
            "--inputformat=textedgelist",
            "--outputformat=textedgelist",
            "--edgedata=int",
            "--transform=hash",
            "--transform=null",
            "--write-vectorsparse",
            "--no-pin",
            "--format=json",
        ])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let summary: Value = serde_json::from_slice(&stdout).expect("json summary");
    assert!(summary["packing_efficiency"].as_f64().is_some());
    assert_eq!(
        fs::read_to_string(&output).expect("output"),
        "3\n3\n0 1 0\n0 2 0\n1 2 0\n"
    );
}

#[test]
fn missing_required_option_exits_two() {
    let dir = TempDir::new().expect("tempdir");
    let input = weighted_triangle(&dir);
    cargo_bin_cmd!("edgeconv")
        .arg(format!("--inputfile={}", input.display()))
        .args(["--inputformat=textedgelist", "--outputformat=matrix32"])
        .assert()
        .code(2);
}

#[test]
fn malformed_option_exits_one() {
    let dir = TempDir::new().expect("tempdir");
    let input = weighted_triangle(&dir);
    let output = dir.path().join("g.out");

    for bad in ["--outputformat=parquet", "--transform=pagerank", "--edgedata=string"] {
        let mut args = vec![
            "--inputformat=textedgelist".to_string(),
            "--outputformat=matrix32".to_string(),
        ];
        args.push(bad.to_string());
        cargo_bin_cmd!("edgeconv")
            .arg(format!("--inputfile={}", input.display()))
            .arg(format!("--outputfile={}", output.display()))
            .args(&args)
            .assert()
            .code(1);
        assert!(!output.exists(), "{bad} created output");
    }

    cargo_bin_cmd!("edgeconv")
        .arg(format!("--inputfile={}", input.display()))
        .arg(format!("--outputfile={}", output.display()))
        .args(["--inputformat=textedgelist", "--outputformat=matrix32", "--bogus"])
        .assert()
        .code(1);

    for mib in ["0".to_string(), usize::MAX.to_string()] {
        cargo_bin_cmd!("edgeconv")
            .arg(format!("--inputfile={}", input.display()))
            .arg(format!("--outputfile={}", output.display()))
            .args(["--inputformat=textedgelist", "--outputformat=matrix32"])
            .arg(format!("--buffer-mib={mib}"))
            .assert()
            .code(1);
        assert!(!output.exists(), "--buffer-mib={mib} created output");
    }
}

#[test]
fn unreadable_input_is_a_runtime_failure() {
    let dir = TempDir::new().expect("tempdir");
    let output = dir.path().join("g.out");
    cargo_bin_cmd!("edgeconv")
        .arg(format!("--inputfile={}", dir.path().join("absent.bin").display()))
        .arg(format!("--outputfile={}", output.display()))
        .args(["--inputformat=binaryedgelist", "--outputformat=textedgelist"])
        .assert()
        .code(3);
    assert!(!output.exists());
}

#[test]
fn tuning_file_is_loaded() {
    let dir = TempDir::new().expect("tempdir");
    let input = weighted_triangle(&dir);
    let output = dir.path().join("g.bin");
    let tuning = dir.path().join("tuning.toml");
    fs::write(&tuning, "[pipeline]\nbuffer_bytes = 48\nread_threads = 2\npin_threads = false\n")
        .expect("write tuning");

    cargo_bin_cmd!("edgeconv")
        .arg(format!("--inputfile={}", input.display()))
        .arg(format!("--outputfile={}", output.display()))
        .arg(format!("--config={}", tuning.display()))
        .args(["--inputformat=textedgelist", "--outputformat=binaryedgelist", "--edgedata=int"])
        .assert()
        .success();
    assert_eq!(fs::read(&output).expect("output").len(), 16 + 3 * 24);

    fs::write(&tuning, "[pipeline]\nbuffers = 2\n").expect("write tuning");
    cargo_bin_cmd!("edgeconv")
        .arg(format!("--inputfile={}", input.display()))
        .arg(format!("--outputfile={}", output.display()))
        .arg(format!("--config={}", tuning.display()))
        .args(["--inputformat=textedgelist", "--outputformat=binaryedgelist"])
        .assert()
        .code(1);
}
