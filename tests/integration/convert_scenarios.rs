#![allow(missing_docs)]

use std::fs;
use std::io::{self, Write};
use std::path::Path;

use edgeconv::cli::{run_convert, ConvertConfig};
use edgeconv::formats::{
    descriptor_path, BinaryEdgeListWriter, FormatKind, FormatOptions, TextAdjacencyListWriter,
};
use edgeconv::pipeline::{write_from_source, GraphCursor, PipelineOptions};
use edgeconv::storage::{MutableGraph, Orientation};
use edgeconv::transform::{hash_edge, EdgeDataTransform};
use edgeconv::types::{ConvertError, EdgeDataKind, EdgeRecord};
use tempfile::TempDir;

fn pipeline(records_per_buffer: usize) -> PipelineOptions {
    PipelineOptions {
        buffer_bytes: records_per_buffer * 24,
        read_threads: Some(3),
        numa_node: 0,
        pin_threads: false,
    }
}

fn config(input: &Path, output: &Path, from: &str, to: &str, edge_data: &str) -> ConvertConfig {
    let mut config = ConvertConfig::from_names(
        input.to_path_buf(),
        output.to_path_buf(),
        from,
        to,
        "",
        "",
        edge_data,
        &[],
    )
    .expect("valid names");
    config.pipeline = pipeline(2);
    config
}

/// Sink that takes `room` bytes and then reports a full disk.
struct FullDisk {
    written: Vec<u8>,
    room: usize,
}

impl Write for FullDisk {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.room == 0 {
            return Err(io::Error::other("no space left on device"));
        }
        let take = buf.len().min(self.room);
        self.written.extend_from_slice(&buf[..take]);
        self.room -= take;
        Ok(take)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

fn write_words(path: &Path, words: &[u64]) {
    let bytes: Vec<u8> = words.iter().flat_map(|w| w.to_le_bytes()).collect();
    fs::write(path, bytes).expect("write input");
}

#[test]
fn binary_to_text_unweighted() {
    let dir = TempDir::new().expect("tempdir");
    let input = dir.path().join("cycle.bin");
    let output = dir.path().join("cycle.txt");
    write_words(&input, &[4, 4, 0, 1, 1, 2, 2, 3, 3, 0]);

    let summary = run_convert(&config(&input, &output, "binaryedgelist", "textedgelist", "void"))
        .expect("convert");
    assert_eq!(summary.vertices, 4);
    assert_eq!(summary.edges, 4);
    assert_eq!(
        fs::read_to_string(&output).expect("output"),
        "4\n4\n0 1\n1 2\n2 3\n3 0\n"
    );
}

#[test]
fn text_to_matrix32_weighted() {
    let dir = TempDir::new().expect("tempdir");
    let input = dir.path().join("tri.txt");
    let output = dir.path().join("tri.m32");
    fs::write(&input, "3\n3\n0 1 10\n1 2 20\n2 0 30\n").expect("write input");

    run_convert(&config(&input, &output, "textedgelist", "matrix32", "int")).expect("convert");
    let expected: Vec<u8> = [3u32, 3, 3, 1, 2, 10, 2, 3, 20, 3, 1, 30]
        .iter()
        .flat_map(|w| w.to_le_bytes())
        .collect();
    assert_eq!(fs::read(&output).expect("output"), expected);
}

#[test]
fn adjacency_two_pass_write_from_text() {
    let dir = TempDir::new().expect("tempdir");
    let input = dir.path().join("g.txt");
    let output = dir.path().join("g.adj");
    fs::write(&input, "3\n3\n0 1 7\n0 2 8\n1 2 9\n").expect("write input");

    run_convert(&config(&input, &output, "textedgelist", "ligra", "int")).expect("convert");
    assert_eq!(
        fs::read_to_string(&output).expect("output"),
        "WeightedAdjacencyGraph\n3\n3\n0\n2\n3\n1\n2\n2\n7\n8\n9\n"
    );
}

#[test]
fn adjacency_round_trip_through_xstream() {
    let dir = TempDir::new().expect("tempdir");
    let adjacency = dir.path().join("g.adj");
    let stream = dir.path().join("g.xs");
    let back = dir.path().join("back.adj");
    let text = "WeightedAdjacencyGraph\n4\n4\n0\n2\n3\n3\n1\n3\n0\n2\n5\n6\n7\n8\n";
    fs::write(&adjacency, text).expect("write input");

    run_convert(&config(&adjacency, &stream, "adjacencygraph", "x-stream", "int"))
        .expect("to xstream");
    let descriptor = fs::read_to_string(descriptor_path(&stream)).expect("descriptor");
    assert!(descriptor.contains("type=1\n"));
    assert!(descriptor.contains("vertices=4\n"));
    assert!(descriptor.contains("edges=4\n"));

    run_convert(&config(&stream, &back, "xstream", "textadjacencylist", "int"))
        .expect("back to adjacency");
    assert_eq!(fs::read_to_string(&back).expect("output"), text);
}

#[test]
fn destination_grouping_walks_in_edges() {
    let dir = TempDir::new().expect("tempdir");
    let input = dir.path().join("g.txt");
    let output = dir.path().join("g.out.txt");
    fs::write(&input, "3\n3\n0 2\n1 0\n2 1\n").expect("write input");

    let mut cfg = config(&input, &output, "textedgelist", "textedgelist", "void");
    cfg.output_options = FormatOptions::parse("groupbydestination").expect("options");
    run_convert(&cfg).expect("convert");
    assert_eq!(
        fs::read_to_string(&output).expect("output"),
        "3\n3\n1 0\n2 1\n0 2\n"
    );
}

#[test]
fn destination_grouped_adjacency_reads_back_with_input_options() {
    let dir = TempDir::new().expect("tempdir");
    let input = dir.path().join("g.txt");
    let adjacency = dir.path().join("g.adj");
    let back = dir.path().join("back.txt");
    fs::write(&input, "3\n3\n0 2\n1 2\n2 0\n").expect("write input");

    let mut to_adjacency = config(&input, &adjacency, "textedgelist", "ligra", "void");
    to_adjacency.output_options = FormatOptions::parse("groupbydestination").expect("options");
    run_convert(&to_adjacency).expect("to adjacency");

    let mut from_adjacency = config(&adjacency, &back, "ligra", "textedgelist", "void");
    from_adjacency.input_options = FormatOptions::parse("groupbydestination").expect("options");
    run_convert(&from_adjacency).expect("back to edges");
    assert_eq!(
        fs::read_to_string(&back).expect("output"),
        "3\n3\n0 2\n1 2\n2 0\n"
    );
}

#[test]
fn hash_transform_then_vector_sparse_route() {
    let dir = TempDir::new().expect("tempdir");
    let input = dir.path().join("g.bin");
    let output = dir.path().join("g.out.bin");
    write_words(&input, &[2, 2, 0, 1, 1, 0]);

    let mut cfg = config(&input, &output, "binaryedgelist", "binaryedgelist", "void");
    cfg.transforms = vec![EdgeDataTransform::Hash];
    cfg.write_from_vector_sparse = true;
    let summary = run_convert(&cfg).expect("convert");
    assert_eq!(summary.edge_data, EdgeDataKind::U64);

    let words: Vec<u64> = fs::read(&output)
        .expect("output")
        .chunks_exact(8)
        .map(|c| u64::from_le_bytes(c.try_into().expect("word")))
        .collect();
    assert_eq!(words, vec![2, 2, 0, 1, 238, 1, 0, hash_edge(1, 0)]);
}

#[test]
fn out_of_range_records_are_counted_not_inserted() {
    let dir = TempDir::new().expect("tempdir");
    let input = dir.path().join("g.txt");
    let output = dir.path().join("g.out.txt");
    fs::write(&input, "2\n3\n0 1\n1 7\nnot an edge\n1 0\n").expect("write input");

    let summary = run_convert(&config(&input, &output, "snap", "edgelist", "void")).expect("convert");
    assert_eq!(summary.edges, 2);
    assert_eq!(summary.skipped_records, 2);
    assert_eq!(fs::read_to_string(&output).expect("output"), "2\n2\n0 1\n1 0\n");
}

#[test]
fn injected_write_failure_stops_without_deadlock() {
    let mut graph = MutableGraph::new(EdgeDataKind::None);
    for v in 0..64u64 {
        graph.insert(&EdgeRecord::new(v, (v + 1) % 64)).expect("insert");
    }
    let sink = FullDisk {
        written: Vec::new(),
        room: 16 + 8 * 16,
    };
    let mut writer = BinaryEdgeListWriter::from_sink(sink, &graph).expect("writer");
    let mut cursor = GraphCursor::new(&graph, Orientation::BySource);
    let options = PipelineOptions {
        buffer_bytes: 8 * 16,
        ..pipeline(8)
    };
    let err = write_from_source(&mut cursor, &mut writer, false, EdgeDataKind::None, &options)
        .expect_err("sink fails after one buffer");
    assert!(matches!(err, ConvertError::Io(_)));
    assert_eq!(writer.into_inner().written.len(), 16 + 8 * 16);
}

#[test]
fn adjacency_writer_in_destination_order() {
    let mut graph = MutableGraph::new(EdgeDataKind::None);
    for (s, d) in [(0, 2), (1, 2), (2, 0)] {
        graph.insert(&EdgeRecord::new(s, d)).expect("insert");
    }
    let mut writer =
        TextAdjacencyListWriter::from_sink(Vec::new(), &graph, Orientation::ByDestination)
            .expect("writer");
    let mut cursor = GraphCursor::new(&graph, Orientation::ByDestination);
    write_from_source(&mut cursor, &mut writer, true, EdgeDataKind::None, &pipeline(2))
        .expect("write");
    assert_eq!(
        String::from_utf8(writer.into_inner()).expect("utf8"),
        "AdjacencyGraph\n3\n3\n0\n1\n1\n2\n0\n1\n"
    );
}

#[test]
fn unknown_format_never_touches_disk() {
    let dir = TempDir::new().expect("tempdir");
    let err = ConvertConfig::from_names(
        dir.path().join("missing"),
        dir.path().join("out"),
        "binaryedgelist",
        "parquet",
        "",
        "",
        "void",
        &[],
    )
    .expect_err("unknown format");
    assert_eq!(err.exit_code(), 1);
    assert_eq!(FormatKind::parse("GraphMat").expect("alias"), FormatKind::Matrix32);
    assert!(!dir.path().join("out").exists());
}
