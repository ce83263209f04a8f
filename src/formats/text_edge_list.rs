use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use tracing::warn;

use crate::primitives::io::{create_write, next_data_line, open_read, read_header_u64};
use crate::types::{EdgeDataKind, EdgeRecord, Result};

use super::{format_payload, parse_payload, EdgeReader, EdgeWriter, GraphMeta, InputHeader};

/// Reader for whitespace-separated `src dst [data]` lines after a vertex-count
/// and an edge-count header line. Unparseable lines are skipped.
pub struct TextEdgeListReader {
    reader: BufReader<File>,
    path: PathBuf,
    edge_data: EdgeDataKind,
    header: InputHeader,
    line: Vec<u8>,
    skipped: u64,
}

impl TextEdgeListReader {
    /// Opens `path` and consumes the two header lines.
    pub fn open(path: &Path, edge_data: EdgeDataKind) -> Result<Self> {
        let mut reader = open_read(path)?;
        let num_vertices = read_header_u64(&mut reader, path, "vertex count")?;
        let num_edges = read_header_u64(&mut reader, path, "edge count")?;
        Ok(Self {
            reader,
            path: path.to_path_buf(),
            edge_data,
            header: InputHeader {
                num_vertices,
                num_edges,
            },
            line: Vec::new(),
            skipped: 0,
        })
    }
}

fn parse_edge_line(line: &str, edge_data: EdgeDataKind) -> Option<EdgeRecord> {
    let mut fields = line.split_whitespace();
    let src = fields.next()?.parse().ok()?;
    let dst = fields.next()?.parse().ok()?;
    let data = match fields.next() {
        Some(field) => parse_payload(edge_data, field)?,
        None => 0,
    };
    Some(EdgeRecord::with_data(src, dst, data))
}

impl EdgeReader for TextEdgeListReader {
    fn header(&self) -> InputHeader {
        self.header
    }

    fn read_edges(&mut self, buf: &mut [EdgeRecord]) -> Result<usize> {
        let mut filled = 0usize;
        while filled < buf.len() {
            let Some(line) = next_data_line(&mut self.reader, &mut self.line)? else {
                break;
            };
            match line.text().and_then(|text| parse_edge_line(text, self.edge_data)) {
                Some(edge) => {
                    buf[filled] = edge;
                    filled += 1;
                }
                None => self.skipped += 1,
            }
        }
        Ok(filled)
    }

    fn skipped(&self) -> u64 {
        self.skipped
    }

    fn close(self: Box<Self>) -> Result<()> {
        if self.skipped > 0 {
            warn!(
                path = %self.path.display(),
                skipped = self.skipped,
                "formats.text_edge_list.skipped_lines"
            );
        }
        Ok(())
    }
}

/// Writer for the text edge list.
pub struct TextEdgeListWriter<W: Write + Send = BufWriter<File>> {
    sink: W,
    edge_data: EdgeDataKind,
}

impl TextEdgeListWriter {
    /// Creates `path` and writes the two header lines.
    pub fn create(path: &Path, meta: &dyn GraphMeta) -> Result<Self> {
        Self::from_sink(create_write(path)?, meta)
    }
}

impl<W: Write + Send> TextEdgeListWriter<W> {
    /// Returns the underlying sink without flushing it.
    pub fn into_inner(self) -> W {
        self.sink
    }

    /// Writes the header for `meta` into `sink`.
    pub fn from_sink(mut sink: W, meta: &dyn GraphMeta) -> Result<Self> {
        writeln!(sink, "{}", meta.num_vertices())?;
        writeln!(sink, "{}", meta.num_edges())?;
        Ok(Self {
            sink,
            edge_data: meta.edge_data(),
        })
    }
}

impl<W: Write + Send> EdgeWriter for TextEdgeListWriter<W> {
    fn write_edges(&mut self, edges: &[EdgeRecord], _grouped: bool, _pass: usize) -> Result<()> {
        for edge in edges {
            if self.edge_data.has_data() {
                writeln!(
                    self.sink,
                    "{} {} {}",
                    edge.src,
                    edge.dst,
                    format_payload(self.edge_data, edge.data)
                )?;
            } else {
                writeln!(self.sink, "{} {}", edge.src, edge.dst)?;
            }
        }
        Ok(())
    }

    fn close(mut self: Box<Self>) -> Result<()> {
        self.sink.flush()?;
        Ok(())
    }
}
