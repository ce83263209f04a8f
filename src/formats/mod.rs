//! On-disk graph formats and the plugin contract the pipeline drives them through.
//!
//! A reader is opened on a path, reports the header counts, and then fills
//! record buffers until it returns zero. A writer is opened with a read-only
//! [`GraphMeta`] view of the graph it will receive, writes its header
//! immediately, and is then handed one buffer of records at a time, once per
//! pass it requested.

use std::fmt;
use std::path::Path;

use crate::storage::vector_sparse::VectorSparseGraph;
use crate::storage::{MutableGraph, Orientation};
use crate::types::{ConvertError, EdgeDataKind, EdgeRecord, Result, VertexId};

mod binary_edge_list;
mod matrix32;
mod text_adjacency_list;
mod text_edge_list;
mod xstream;

pub use binary_edge_list::{BinaryEdgeListReader, BinaryEdgeListWriter};
pub use matrix32::{Matrix32Reader, Matrix32Writer};
pub use text_adjacency_list::{TextAdjacencyListReader, TextAdjacencyListWriter};
pub use text_edge_list::{TextEdgeListReader, TextEdgeListWriter};
pub use xstream::{descriptor_path, XStreamReader, XStreamWriter};

/// Counts announced by an input file's header.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct InputHeader {
    /// Number of vertices; every valid id is below it.
    pub num_vertices: u64,
    /// Number of edges the file claims to hold.
    pub num_edges: u64,
}

/// A format-specific edge source driven by the pipeline producer.
pub trait EdgeReader: Send {
    /// Counts from the file header.
    fn header(&self) -> InputHeader;

    /// Fills `buf` from the front and returns the number of records written.
    /// Zero means end of stream.
    fn read_edges(&mut self, buf: &mut [EdgeRecord]) -> Result<usize>;

    /// Malformed records skipped so far.
    fn skipped(&self) -> u64 {
        0
    }

    /// Releases the input.
    fn close(self: Box<Self>) -> Result<()>;
}

/// A format-specific edge sink driven by the pipeline consumer.
pub trait EdgeWriter: Send {
    /// Number of full passes over the edges this format needs.
    fn passes(&self) -> usize {
        1
    }

    /// Emits `edges`, which arrive grouped by destination when
    /// `grouped_by_destination` is set and by source otherwise.
    fn write_edges(
        &mut self,
        edges: &[EdgeRecord],
        grouped_by_destination: bool,
        pass: usize,
    ) -> Result<()>;

    /// Flushes and releases the output.
    fn close(self: Box<Self>) -> Result<()>;
}

/// The read-only graph facts a writer may use while writing its header.
pub trait GraphMeta {
    /// Vertex count.
    fn num_vertices(&self) -> u64;
    /// Edge count.
    fn num_edges(&self) -> u64;
    /// Payload kind of every edge.
    fn edge_data(&self) -> EdgeDataKind;
    /// Degree of `vertex` in `orientation`.
    fn degree(&self, orientation: Orientation, vertex: VertexId) -> u64;
}

impl GraphMeta for MutableGraph {
    fn num_vertices(&self) -> u64 {
        MutableGraph::num_vertices(self)
    }

    fn num_edges(&self) -> u64 {
        MutableGraph::num_edges(self)
    }

    fn edge_data(&self) -> EdgeDataKind {
        MutableGraph::edge_data(self)
    }

    fn degree(&self, orientation: Orientation, vertex: VertexId) -> u64 {
        self.index(orientation).degree(vertex)
    }
}

impl GraphMeta for VectorSparseGraph {
    fn num_vertices(&self) -> u64 {
        VectorSparseGraph::num_vertices(self)
    }

    fn num_edges(&self) -> u64 {
        VectorSparseGraph::num_edges(self, Orientation::BySource)
    }

    fn edge_data(&self) -> EdgeDataKind {
        VectorSparseGraph::edge_data(self)
    }

    fn degree(&self, orientation: Orientation, vertex: VertexId) -> u64 {
        let (vectors, _) = self.vectors_for(orientation, vertex);
        vectors.iter().map(|v| v.count() as u64).sum()
    }
}

/// Options that apply to one side of a conversion.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct FormatOptions {
    /// Edges are grouped by destination instead of by source: writers walk
    /// in-edges and the adjacency reader treats rows as destinations.
    pub grouped_by_destination: bool,
}

impl FormatOptions {
    /// Parses a comma-separated option list such as `groupbydestination`.
    pub fn parse(raw: &str) -> Result<Self> {
        let mut options = Self::default();
        for token in raw.split(',').map(str::trim).filter(|t| !t.is_empty()) {
            match token.to_ascii_lowercase().as_str() {
                "groupbysource" | "source" => options.grouped_by_destination = false,
                "groupbydestination" | "destination" => options.grouped_by_destination = true,
                other => {
                    return Err(ConvertError::Config(format!("unknown format option: {other}")))
                }
            }
        }
        Ok(options)
    }

    /// Orientation writers walk.
    pub fn orientation(&self) -> Orientation {
        Orientation::grouped_by_destination(self.grouped_by_destination)
    }
}

/// Supported file formats.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum FormatKind {
    /// Little-endian u64 header and records.
    BinaryEdgeList,
    /// Whitespace-separated `src dst [data]` lines.
    TextEdgeList,
    /// Ligra-style offsets followed by neighbour (and weight) lines.
    TextAdjacencyList,
    /// 1-based u32 coordinate triples.
    Matrix32,
    /// Headerless edge stream plus an `.ini` descriptor.
    XStream,
}

const ALIASES: &[(&str, FormatKind)] = &[
    ("binaryedgelist", FormatKind::BinaryEdgeList),
    ("grazelle", FormatKind::BinaryEdgeList),
    ("textedgelist", FormatKind::TextEdgeList),
    ("edgelist", FormatKind::TextEdgeList),
    ("snap", FormatKind::TextEdgeList),
    ("textadjacencylist", FormatKind::TextAdjacencyList),
    ("adjacencygraph", FormatKind::TextAdjacencyList),
    ("ligra", FormatKind::TextAdjacencyList),
    ("polymer", FormatKind::TextAdjacencyList),
    ("matrix32", FormatKind::Matrix32),
    ("graphmat", FormatKind::Matrix32),
    ("xstream", FormatKind::XStream),
    ("x-stream", FormatKind::XStream),
];

impl FormatKind {
    /// Resolves a case-insensitive format name or alias.
    pub fn parse(name: &str) -> Result<Self> {
        let wanted = name.trim().to_ascii_lowercase();
        ALIASES
            .iter()
            .find(|(alias, _)| *alias == wanted)
            .map(|(_, kind)| *kind)
            .ok_or_else(|| ConvertError::UnknownFormat(name.to_string()))
    }

    /// Canonical name.
    pub fn name(self) -> &'static str {
        match self {
            FormatKind::BinaryEdgeList => "binaryedgelist",
            FormatKind::TextEdgeList => "textedgelist",
            FormatKind::TextAdjacencyList => "textadjacencylist",
            FormatKind::Matrix32 => "matrix32",
            FormatKind::XStream => "xstream",
        }
    }

    /// Opens `path` for reading with payloads interpreted as `edge_data`.
    /// The grouping in `options` only matters for the adjacency list, whose
    /// rows name either the source or the destination of their neighbours.
    pub fn open_reader(
        self,
        path: &Path,
        edge_data: EdgeDataKind,
        options: &FormatOptions,
    ) -> Result<Box<dyn EdgeReader>> {
        Ok(match self {
            FormatKind::BinaryEdgeList => Box::new(BinaryEdgeListReader::open(path, edge_data)?),
            FormatKind::TextEdgeList => Box::new(TextEdgeListReader::open(path, edge_data)?),
            FormatKind::TextAdjacencyList => Box::new(
                TextAdjacencyListReader::open(path, edge_data)?
                    .with_orientation(options.orientation()),
            ),
            FormatKind::Matrix32 => Box::new(Matrix32Reader::open(path, edge_data)?),
            FormatKind::XStream => Box::new(XStreamReader::open(path, edge_data)?),
        })
    }

    /// Creates `path` and writes the header for `meta`.
    pub fn open_writer(
        self,
        path: &Path,
        meta: &dyn GraphMeta,
        options: &FormatOptions,
    ) -> Result<Box<dyn EdgeWriter>> {
        Ok(match self {
            FormatKind::BinaryEdgeList => Box::new(BinaryEdgeListWriter::create(path, meta)?),
            FormatKind::TextEdgeList => Box::new(TextEdgeListWriter::create(path, meta)?),
            FormatKind::TextAdjacencyList => {
                Box::new(TextAdjacencyListWriter::create(path, meta, options.orientation())?)
            }
            FormatKind::Matrix32 => Box::new(Matrix32Writer::create(path, meta)?),
            FormatKind::XStream => Box::new(XStreamWriter::create(path, meta)?),
        })
    }
}

impl fmt::Display for FormatKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Formats a payload as decimal text: integers verbatim, floats in shortest round-trip form.
pub(crate) fn format_payload(kind: EdgeDataKind, bits: u64) -> String {
    match kind {
        EdgeDataKind::None => String::new(),
        EdgeDataKind::U64 => bits.to_string(),
        EdgeDataKind::F64 => f64::from_bits(bits).to_string(),
    }
}

/// Parses a decimal payload field into raw bits for `kind`.
pub(crate) fn parse_payload(kind: EdgeDataKind, field: &str) -> Option<u64> {
    match kind {
        EdgeDataKind::None => Some(0),
        EdgeDataKind::U64 => field.parse::<u64>().ok(),
        EdgeDataKind::F64 => field.parse::<f64>().ok().map(f64::to_bits),
    }
}
