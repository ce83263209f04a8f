use std::fs;
use std::path::Path;
use std::time::Instant;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::formats::{descriptor_path, FormatKind, GraphMeta};
use crate::pipeline::{
    read_into_graph, write_from_source, EdgeSource, GraphCursor, VectorSparseCursor, WriteStats,
};
use crate::storage::vector_sparse::{self, VectorSparseGraph};
use crate::storage::{MutableGraph, Orientation};
use crate::types::{EdgeDataKind, Result};

use super::{CliError, ConvertConfig};

/// What a finished conversion produced.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ConvertSummary {
    /// Vertices in the written graph.
    pub vertices: u64,
    /// Edges in the written graph.
    pub edges: u64,
    /// Payload kind of the written graph.
    pub edge_data: EdgeDataKind,
    /// Four-edge vectors in the by-source index.
    pub vectors_by_source: u64,
    /// Four-edge vectors in the by-destination index.
    pub vectors_by_destination: u64,
    /// Input records dropped as malformed or out of range.
    pub skipped_records: u64,
    /// Fraction of Vector-Sparse slots holding an edge, when built.
    pub packing_efficiency: Option<f64>,
    /// Wall-clock time of the whole conversion.
    pub duration_ms: f64,
}

/// Reads, transforms and writes one graph.
///
/// A failed write removes whatever output was created so a partial file is
/// never left behind.
pub fn run_convert(config: &ConvertConfig) -> std::result::Result<ConvertSummary, CliError> {
    let start = Instant::now();
    let mut reader = config
        .input_format
        .open_reader(&config.input_path, config.edge_data, &config.input_options)?;
    let mut graph = MutableGraph::new(config.edge_data);
    let read = read_into_graph(reader.as_mut(), &mut graph, &config.pipeline)?;
    reader.close()?;

    for transform in &config.transforms {
        let step = Instant::now();
        transform.apply(&mut graph);
        info!(
            transform = %transform,
            duration_ms = step.elapsed().as_secs_f64() * 1_000.0,
            "convert.transform.complete"
        );
    }

    let vector_sparse = if config.build_vector_sparse || config.write_from_vector_sparse {
        let built = VectorSparseGraph::build(&graph)?;
        vector_sparse::log_summary(&built);
        Some(built)
    } else {
        None
    };

    let written = match write_output(config, &graph, vector_sparse.as_ref()) {
        Ok(stats) => stats,
        Err(err) => {
            remove_output(&config.output_path, config.output_format);
            return Err(err.into());
        }
    };
    debug!(records = written.records, passes = written.passes, "convert.write.complete");

    let summary = ConvertSummary {
        vertices: graph.num_vertices(),
        edges: graph.num_edges(),
        edge_data: graph.edge_data(),
        vectors_by_source: graph.num_vectors(Orientation::BySource),
        vectors_by_destination: graph.num_vectors(Orientation::ByDestination),
        skipped_records: read.skipped,
        packing_efficiency: vector_sparse.as_ref().map(VectorSparseGraph::packing_efficiency),
        duration_ms: start.elapsed().as_secs_f64() * 1_000.0,
    };
    info!(
        input = %config.input_path.display(),
        output = %config.output_path.display(),
        vertices = summary.vertices,
        edges = summary.edges,
        skipped = summary.skipped_records,
        duration_ms = summary.duration_ms,
        "convert.complete"
    );
    Ok(summary)
}

fn write_output(
    config: &ConvertConfig,
    graph: &MutableGraph,
    vector_sparse: Option<&VectorSparseGraph>,
) -> Result<WriteStats> {
    let options = &config.output_options;
    let orientation = options.orientation();
    let routed = vector_sparse.filter(|_| config.write_from_vector_sparse);
    let meta: &dyn GraphMeta = match routed {
        Some(vs) => vs,
        None => graph,
    };
    let mut source: Box<dyn EdgeSource + '_> = match routed {
        Some(vs) => Box::new(VectorSparseCursor::new(vs, orientation)),
        None => Box::new(GraphCursor::new(graph, orientation)),
    };
    let mut writer = config
        .output_format
        .open_writer(&config.output_path, meta, options)?;
    let stats = write_from_source(
        source.as_mut(),
        writer.as_mut(),
        options.grouped_by_destination,
        meta.edge_data(),
        &config.pipeline,
    )?;
    writer.close()?;
    Ok(stats)
}

fn remove_output(path: &Path, format: FormatKind) {
    let mut targets = vec![path.to_path_buf()];
    if format == FormatKind::XStream {
        targets.push(descriptor_path(path));
    }
    for target in targets {
        match fs::remove_file(&target) {
            Ok(()) => warn!(path = %target.display(), "convert.output.removed"),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => warn!(path = %target.display(), error = %err, "convert.output.remove_failed"),
        }
    }
}
