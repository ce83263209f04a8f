use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use tracing::warn;

use crate::primitives::bytes::le;
use crate::primitives::io::{create_write, open_read, read_full};
use crate::types::{ConvertError, EdgeDataKind, EdgeRecord, Result};

use super::{EdgeReader, EdgeWriter, GraphMeta, InputHeader};

const HEADER_BYTES: usize = 12;
const TRIPLE_BYTES: usize = 12;

fn weight_to_bits(kind: EdgeDataKind, weight: u32) -> u64 {
    match kind {
        EdgeDataKind::None => 0,
        EdgeDataKind::U64 => u64::from(weight),
        EdgeDataKind::F64 => f64::from(f32::from_bits(weight)).to_bits(),
    }
}

fn bits_to_weight(kind: EdgeDataKind, bits: u64) -> u32 {
    match kind {
        EdgeDataKind::None => 1,
        EdgeDataKind::U64 => bits as u32,
        EdgeDataKind::F64 => (f64::from_bits(bits) as f32).to_bits(),
    }
}

/// Reader for 32-bit coordinate matrices: a `(rows, cols, nnz)` u32 header
/// followed by 1-based `(row, col, weight)` u32 triples.
pub struct Matrix32Reader {
    reader: BufReader<File>,
    path: PathBuf,
    edge_data: EdgeDataKind,
    header: InputHeader,
    scratch: Vec<u8>,
    skipped: u64,
    exhausted: bool,
}

impl Matrix32Reader {
    /// Opens `path` and consumes the header.
    pub fn open(path: &Path, edge_data: EdgeDataKind) -> Result<Self> {
        let mut reader = open_read(path)?;
        let mut raw = [0u8; HEADER_BYTES];
        if read_full(&mut reader, &mut raw)? < HEADER_BYTES {
            return Err(ConvertError::header(path, "file shorter than the 12-byte header"));
        }
        let field = |idx: usize| le::get_u32(&raw[idx * 4..]).unwrap_or(0);
        let (rows, cols, nnz) = (field(0), field(1), field(2));
        Ok(Self {
            reader,
            path: path.to_path_buf(),
            edge_data,
            header: InputHeader {
                num_vertices: u64::from(rows.max(cols)),
                num_edges: u64::from(nnz),
            },
            scratch: Vec::new(),
            skipped: 0,
            exhausted: false,
        })
    }
}

impl EdgeReader for Matrix32Reader {
    fn header(&self) -> InputHeader {
        self.header
    }

    fn read_edges(&mut self, buf: &mut [EdgeRecord]) -> Result<usize> {
        let mut filled = 0usize;
        while filled < buf.len() && !self.exhausted {
            let want = buf.len() - filled;
            self.scratch.resize(want * TRIPLE_BYTES, 0);
            let read = read_full(&mut self.reader, &mut self.scratch)?;
            if read < self.scratch.len() {
                self.exhausted = true;
                if read % TRIPLE_BYTES != 0 {
                    self.skipped += 1;
                }
            }
            for triple in self.scratch[..read - read % TRIPLE_BYTES].chunks_exact(TRIPLE_BYTES) {
                let row = le::get_u32(triple).unwrap_or(0);
                let col = le::get_u32(&triple[4..]).unwrap_or(0);
                let weight = le::get_u32(&triple[8..]).unwrap_or(0);
                if row == 0 || col == 0 {
                    self.skipped += 1;
                    continue;
                }
                buf[filled] = EdgeRecord::with_data(
                    u64::from(row - 1),
                    u64::from(col - 1),
                    weight_to_bits(self.edge_data, weight),
                );
                filled += 1;
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
                "formats.matrix32.skipped_records"
            );
        }
        Ok(())
    }
}

/// Writer for 32-bit coordinate matrices. Integer payloads are truncated to
/// u32, floats narrowed to f32, and topology-only graphs get weight 1.
pub struct Matrix32Writer<W: Write + Send = BufWriter<File>> {
    sink: W,
    edge_data: EdgeDataKind,
    scratch: Vec<u8>,
}

impl Matrix32Writer {
    /// Creates `path` and writes the header for `meta`.
    pub fn create(path: &Path, meta: &dyn GraphMeta) -> Result<Self> {
        Self::check_fits(meta)?;
        Self::from_sink(create_write(path)?, meta)
    }
}

impl<W: Write + Send> Matrix32Writer<W> {
    /// Returns the underlying sink without flushing it.
    pub fn into_inner(self) -> W {
        self.sink
    }

    fn check_fits(meta: &dyn GraphMeta) -> Result<()> {
        let limit = u64::from(u32::MAX);
        if meta.num_vertices() > limit || meta.num_edges() > limit {
            return Err(ConvertError::Config(format!(
                "graph with {} vertices and {} edges does not fit matrix32",
                meta.num_vertices(),
                meta.num_edges()
            )));
        }
        Ok(())
    }

    /// Writes the header for `meta` into `sink`.
    pub fn from_sink(mut sink: W, meta: &dyn GraphMeta) -> Result<Self> {
        Self::check_fits(meta)?;
        let n = meta.num_vertices() as u32;
        let mut header = Vec::with_capacity(HEADER_BYTES);
        le::put_u32(&mut header, n);
        le::put_u32(&mut header, n);
        le::put_u32(&mut header, meta.num_edges() as u32);
        sink.write_all(&header)?;
        Ok(Self {
            sink,
            edge_data: meta.edge_data(),
            scratch: Vec::new(),
        })
    }
}

impl<W: Write + Send> EdgeWriter for Matrix32Writer<W> {
    fn write_edges(&mut self, edges: &[EdgeRecord], _grouped: bool, _pass: usize) -> Result<()> {
        self.scratch.clear();
        self.scratch.reserve(edges.len() * TRIPLE_BYTES);
        for edge in edges {
            le::put_u32(&mut self.scratch, edge.src as u32 + 1);
            le::put_u32(&mut self.scratch, edge.dst as u32 + 1);
            le::put_u32(&mut self.scratch, bits_to_weight(self.edge_data, edge.data));
        }
        self.sink.write_all(&self.scratch)?;
        Ok(())
    }

    fn close(mut self: Box<Self>) -> Result<()> {
        self.sink.flush()?;
        Ok(())
    }
}
