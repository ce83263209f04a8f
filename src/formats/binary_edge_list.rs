use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use tracing::warn;

use crate::primitives::bytes::{le, record};
use crate::primitives::io::{create_write, open_read, read_full};
use crate::types::{ConvertError, EdgeDataKind, EdgeRecord, Result};

use super::{EdgeReader, EdgeWriter, GraphMeta, InputHeader};

const HEADER_BYTES: usize = 16;

/// Reader for the binary edge list: a `(num_vertices, num_edges)` u64 header
/// followed by packed `(src, dst[, data])` u64 records.
pub struct BinaryEdgeListReader {
    reader: BufReader<File>,
    path: PathBuf,
    edge_data: EdgeDataKind,
    header: InputHeader,
    scratch: Vec<u8>,
    skipped: u64,
    exhausted: bool,
}

impl BinaryEdgeListReader {
    /// Opens `path` and consumes the header.
    pub fn open(path: &Path, edge_data: EdgeDataKind) -> Result<Self> {
        let mut reader = open_read(path)?;
        let mut raw = [0u8; HEADER_BYTES];
        if read_full(&mut reader, &mut raw)? < HEADER_BYTES {
            return Err(ConvertError::header(path, "file shorter than the 16-byte header"));
        }
        let [num_vertices, num_edges] = le::get_u64s::<2>(&raw)
            .ok_or_else(|| ConvertError::header(path, "unreadable header"))?;
        Ok(Self {
            reader,
            path: path.to_path_buf(),
            edge_data,
            header: InputHeader {
                num_vertices,
                num_edges,
            },
            scratch: Vec::new(),
            skipped: 0,
            exhausted: false,
        })
    }
}

impl EdgeReader for BinaryEdgeListReader {
    fn header(&self) -> InputHeader {
        self.header
    }

    fn read_edges(&mut self, buf: &mut [EdgeRecord]) -> Result<usize> {
        if self.exhausted || buf.is_empty() {
            return Ok(0);
        }
        let width = record::width(self.edge_data);
        self.scratch.resize(buf.len() * width, 0);
        let read = read_full(&mut self.reader, &mut self.scratch)?;
        if read < self.scratch.len() {
            self.exhausted = true;
        }
        if read % width != 0 {
            self.skipped += 1;
            warn!(
                path = %self.path.display(),
                trailing_bytes = read % width,
                "formats.binary_edge_list.truncated_record"
            );
        }
        let records = read / width;
        for (slot, raw) in buf.iter_mut().zip(self.scratch[..records * width].chunks_exact(width)) {
            if let Some(edge) = record::decode(raw, self.edge_data) {
                *slot = edge;
            }
        }
        Ok(records)
    }

    fn skipped(&self) -> u64 {
        self.skipped
    }

    fn close(self: Box<Self>) -> Result<()> {
        Ok(())
    }
}

/// Writer for the binary edge list.
pub struct BinaryEdgeListWriter<W: Write + Send = BufWriter<File>> {
    sink: W,
    edge_data: EdgeDataKind,
    scratch: Vec<u8>,
}

impl BinaryEdgeListWriter {
    /// Creates `path` and writes the header for `meta`.
    pub fn create(path: &Path, meta: &dyn GraphMeta) -> Result<Self> {
        Self::from_sink(create_write(path)?, meta)
    }
}

impl<W: Write + Send> BinaryEdgeListWriter<W> {
    /// Returns the underlying sink without flushing it.
    pub fn into_inner(self) -> W {
        self.sink
    }

    /// Writes the header for `meta` into `sink`.
    pub fn from_sink(mut sink: W, meta: &dyn GraphMeta) -> Result<Self> {
        let mut header = Vec::with_capacity(HEADER_BYTES);
        le::put_u64(&mut header, meta.num_vertices());
        le::put_u64(&mut header, meta.num_edges());
        sink.write_all(&header)?;
        Ok(Self {
            sink,
            edge_data: meta.edge_data(),
            scratch: Vec::new(),
        })
    }
}

impl<W: Write + Send> EdgeWriter for BinaryEdgeListWriter<W> {
    fn write_edges(&mut self, edges: &[EdgeRecord], _grouped: bool, _pass: usize) -> Result<()> {
        self.scratch.clear();
        self.scratch.reserve(edges.len() * record::width(self.edge_data));
        for edge in edges {
            record::encode(edge, self.edge_data, &mut self.scratch);
        }
        self.sink.write_all(&self.scratch)?;
        Ok(())
    }

    fn close(mut self: Box<Self>) -> Result<()> {
        self.sink.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MutableGraph;
    use tempfile::tempdir;

    fn write_raw(path: &Path, words: &[u64]) {
        let bytes: Vec<u8> = words.iter().flat_map(|w| w.to_le_bytes()).collect();
        std::fs::write(path, bytes).unwrap();
    }

    #[test]
    fn reads_header_and_records() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("g.bin");
        write_raw(&path, &[4, 2, 0, 1, 9, 3, 2, 7]);
        let mut reader = BinaryEdgeListReader::open(&path, EdgeDataKind::U64).unwrap();
        assert_eq!(
            reader.header(),
            InputHeader {
                num_vertices: 4,
                num_edges: 2
            }
        );
        let mut buf = vec![EdgeRecord::default(); 8];
        assert_eq!(reader.read_edges(&mut buf).unwrap(), 2);
        assert_eq!(buf[0], EdgeRecord::with_data(0, 1, 9));
        assert_eq!(buf[1], EdgeRecord::with_data(3, 2, 7));
        assert_eq!(reader.read_edges(&mut buf).unwrap(), 0);
    }

    #[test]
    fn small_buffers_stream_every_record() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("g.bin");
        write_raw(&path, &[3, 3, 0, 1, 1, 2, 2, 0]);
        let mut reader = BinaryEdgeListReader::open(&path, EdgeDataKind::None).unwrap();
        let mut buf = vec![EdgeRecord::default(); 2];
        assert_eq!(reader.read_edges(&mut buf).unwrap(), 2);
        assert_eq!(reader.read_edges(&mut buf).unwrap(), 1);
        assert_eq!(buf[0], EdgeRecord::new(2, 0));
        assert_eq!(reader.read_edges(&mut buf).unwrap(), 0);
    }

    #[test]
    fn truncated_tail_is_skipped() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("g.bin");
        let mut bytes: Vec<u8> = [2u64, 1, 0, 1].iter().flat_map(|w| w.to_le_bytes()).collect();
        bytes.extend_from_slice(&[1, 2, 3]);
        std::fs::write(&path, bytes).unwrap();
        let mut reader = BinaryEdgeListReader::open(&path, EdgeDataKind::None).unwrap();
        let mut buf = vec![EdgeRecord::default(); 4];
        assert_eq!(reader.read_edges(&mut buf).unwrap(), 1);
        assert_eq!(reader.skipped(), 1);
    }

    #[test]
    fn short_header_is_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("g.bin");
        std::fs::write(&path, [0u8; 9]).unwrap();
        let err = BinaryEdgeListReader::open(&path, EdgeDataKind::None).err().unwrap();
        assert!(matches!(err, ConvertError::Header { .. }));
    }

    #[test]
    fn writer_emits_header_and_payloads() {
        let mut graph = MutableGraph::new(EdgeDataKind::U64);
        graph.insert(&EdgeRecord::with_data(0, 1, 5)).unwrap();
        let mut writer = BinaryEdgeListWriter::from_sink(Vec::new(), &graph).unwrap();
        writer
            .write_edges(&[EdgeRecord::with_data(0, 1, 5)], false, 0)
            .unwrap();
        let words: Vec<u64> = writer
            .sink
            .chunks_exact(8)
            .map(|c| u64::from_le_bytes(c.try_into().unwrap()))
            .collect();
        assert_eq!(words, vec![2, 1, 0, 1, 5]);
    }
}
