//! Ligra-style adjacency text:
//!
//! ```text
//! AdjacencyGraph | WeightedAdjacencyGraph
//! <num_vertices>
//! <num_edges>
//! <offset per vertex>...
//! <neighbour per edge>...
//! <weight per edge>...      (weighted only)
//! ```

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::primitives::io::{create_write, next_data_line, open_read, read_header_u64, DataLine};
use crate::storage::Orientation;
use crate::types::{ConvertError, EdgeDataKind, EdgeRecord, Result, VertexId};

use super::{format_payload, parse_payload, EdgeReader, EdgeWriter, GraphMeta, InputHeader};

const TAG: &str = "AdjacencyGraph";
const WEIGHTED_TAG: &str = "WeightedAdjacencyGraph";

/// Streaming reader. Neighbours and weights are read through two handles on
/// the same file so neither section is buffered.
pub struct TextAdjacencyListReader {
    neighbours: BufReader<File>,
    weights: Option<BufReader<File>>,
    path: PathBuf,
    edge_data: EdgeDataKind,
    orientation: Orientation,
    header: InputHeader,
    offsets: Vec<u64>,
    vertex: VertexId,
    edge_index: u64,
    line: Vec<u8>,
    weight_line: Vec<u8>,
    skipped: u64,
}

impl TextAdjacencyListReader {
    /// Opens `path`, reads the header and offsets, and positions the weight
    /// handle when payloads are wanted.
    pub fn open(path: &Path, edge_data: EdgeDataKind) -> Result<Self> {
        let mut neighbours = open_read(path)?;
        let mut line = Vec::new();
        let weighted = match next_data_line(&mut neighbours, &mut line)? {
            Some(DataLine::Text(TAG)) => false,
            Some(DataLine::Text(WEIGHTED_TAG)) => true,
            Some(other) => {
                return Err(ConvertError::header(path, format!("unknown tag {other:?}")))
            }
            None => return Err(ConvertError::header(path, "empty file")),
        };
        let num_vertices = read_header_u64(&mut neighbours, path, "vertex count")?;
        let num_edges = read_header_u64(&mut neighbours, path, "edge count")?;
        let mut offsets = Vec::new();
        for _ in 0..num_vertices {
            offsets.push(read_header_u64(&mut neighbours, path, "vertex offset")?);
        }

        let weights = if weighted && edge_data.has_data() {
            let mut handle = open_read(path)?;
            let mut skip = Vec::new();
            let weight_start = num_vertices
                .checked_add(num_edges)
                .and_then(|lines| lines.checked_add(3))
                .ok_or_else(|| {
                    ConvertError::header(path, "vertex and edge counts overflow the file layout")
                })?;
            for _ in 0..weight_start {
                if next_data_line(&mut handle, &mut skip)?.is_none() {
                    return Err(ConvertError::header(path, "weight section missing"));
                }
            }
            Some(handle)
        } else {
            None
        };
        debug!(
            path = %path.display(),
            weighted,
            num_vertices,
            num_edges,
            "formats.adjacency.open"
        );
        Ok(Self {
            neighbours,
            weights,
            path: path.to_path_buf(),
            edge_data,
            orientation: Orientation::BySource,
            header: InputHeader {
                num_vertices,
                num_edges,
            },
            offsets,
            vertex: 0,
            edge_index: 0,
            line,
            weight_line: Vec::new(),
            skipped: 0,
        })
    }

    /// Treats each listed vertex as the destination of its neighbours, for
    /// files written grouped by destination.
    pub fn with_orientation(mut self, orientation: Orientation) -> Self {
        self.orientation = orientation;
        self
    }

    fn advance_vertex(&mut self) {
        let last = self.offsets.len() as u64;
        while self.vertex + 1 < last && self.offsets[(self.vertex + 1) as usize] <= self.edge_index
        {
            self.vertex += 1;
        }
    }
}

impl EdgeReader for TextAdjacencyListReader {
    fn header(&self) -> InputHeader {
        self.header
    }

    fn read_edges(&mut self, buf: &mut [EdgeRecord]) -> Result<usize> {
        let mut filled = 0usize;
        while filled < buf.len() && self.edge_index < self.header.num_edges {
            self.advance_vertex();
            let Some(neighbour) = next_data_line(&mut self.neighbours, &mut self.line)? else {
                break;
            };
            let neighbour = neighbour.text().and_then(|text| text.parse::<VertexId>().ok());
            let data = match self.weights.as_mut() {
                Some(weights) => next_data_line(weights, &mut self.weight_line)?
                    .and_then(DataLine::text)
                    .and_then(|field| parse_payload(self.edge_data, field)),
                None => Some(0),
            };
            self.edge_index += 1;
            match (neighbour, data) {
                (Some(other), Some(data)) => {
                    buf[filled] = match self.orientation {
                        Orientation::BySource => EdgeRecord::with_data(self.vertex, other, data),
                        Orientation::ByDestination => {
                            EdgeRecord::with_data(other, self.vertex, data)
                        }
                    };
                    filled += 1;
                }
                _ => self.skipped += 1,
            }
        }
        Ok(filled)
    }

    fn skipped(&self) -> u64 {
        self.skipped
    }

    fn close(self: Box<Self>) -> Result<()> {
        if self.edge_index < self.header.num_edges {
            warn!(
                path = %self.path.display(),
                expected = self.header.num_edges,
                read = self.edge_index,
                "formats.adjacency.truncated"
            );
        }
        if self.skipped > 0 {
            warn!(
                path = %self.path.display(),
                skipped = self.skipped,
                "formats.adjacency.skipped_lines"
            );
        }
        Ok(())
    }
}

/// Writer. Weighted graphs take a second pass for the weight section.
pub struct TextAdjacencyListWriter<W: Write + Send = BufWriter<File>> {
    sink: W,
    edge_data: EdgeDataKind,
}

impl TextAdjacencyListWriter {
    /// Creates `path` and writes the header and per-vertex offsets of `orientation`.
    pub fn create(path: &Path, meta: &dyn GraphMeta, orientation: Orientation) -> Result<Self> {
        Self::from_sink(create_write(path)?, meta, orientation)
    }
}

impl<W: Write + Send> TextAdjacencyListWriter<W> {
    /// Returns the underlying sink without flushing it.
    pub fn into_inner(self) -> W {
        self.sink
    }

    /// Writes the header and offsets into `sink`.
    pub fn from_sink(mut sink: W, meta: &dyn GraphMeta, orientation: Orientation) -> Result<Self> {
        let edge_data = meta.edge_data();
        let tag = if edge_data.has_data() { WEIGHTED_TAG } else { TAG };
        writeln!(sink, "{tag}")?;
        writeln!(sink, "{}", meta.num_vertices())?;
        writeln!(sink, "{}", meta.num_edges())?;
        let mut offset = 0u64;
        for v in 0..meta.num_vertices() {
            writeln!(sink, "{offset}")?;
            offset += meta.degree(orientation, v);
        }
        Ok(Self { sink, edge_data })
    }
}

impl<W: Write + Send> EdgeWriter for TextAdjacencyListWriter<W> {
    fn passes(&self) -> usize {
        if self.edge_data.has_data() {
            2
        } else {
            1
        }
    }

    fn write_edges(
        &mut self,
        edges: &[EdgeRecord],
        grouped_by_destination: bool,
        pass: usize,
    ) -> Result<()> {
        for edge in edges {
            if pass == 0 {
                let neighbour = if grouped_by_destination {
                    edge.src
                } else {
                    edge.dst
                };
                writeln!(self.sink, "{neighbour}")?;
            } else {
                writeln!(self.sink, "{}", format_payload(self.edge_data, edge.data))?;
            }
        }
        Ok(())
    }

    fn close(mut self: Box<Self>) -> Result<()> {
        self.sink.flush()?;
        Ok(())
    }
}
