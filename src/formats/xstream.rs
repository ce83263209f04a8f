use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::primitives::bytes::record;
use crate::primitives::io::{create_write, open_read, read_full};
use crate::types::{ConvertError, EdgeDataKind, EdgeRecord, Result};

use super::{EdgeReader, EdgeWriter, GraphMeta, InputHeader};

const TYPE_WEIGHTED: u32 = 1;
const TYPE_TOPOLOGY: u32 = 2;

/// Path of the descriptor that accompanies the edge stream at `stream`.
pub fn descriptor_path(stream: &Path) -> PathBuf {
    let mut raw = stream.as_os_str().to_owned();
    raw.push(".ini");
    PathBuf::from(raw)
}

#[derive(Debug, Eq, PartialEq)]
struct Descriptor {
    weighted: bool,
    num_vertices: u64,
    num_edges: u64,
}

fn parse_descriptor(path: &Path, text: &str) -> Result<Descriptor> {
    let (mut kind, mut vertices, mut edges) = (None, None, None);
    for line in text.lines().map(str::trim) {
        if line.is_empty() || line.starts_with(['#', ';', '[']) {
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let value = value.trim();
        let number = || {
            value
                .parse::<u64>()
                .map_err(|_| ConvertError::header(path, format!("{} is not a number", key.trim())))
        };
        match key.trim().to_ascii_lowercase().as_str() {
            "type" => kind = Some(number()?),
            "vertices" => vertices = Some(number()?),
            "edges" => edges = Some(number()?),
            _ => {}
        }
    }
    let weighted = match kind {
        Some(t) if t == u64::from(TYPE_WEIGHTED) => true,
        Some(t) if t == u64::from(TYPE_TOPOLOGY) => false,
        Some(t) => return Err(ConvertError::header(path, format!("unsupported type {t}"))),
        None => return Err(ConvertError::header(path, "missing type")),
    };
    Ok(Descriptor {
        weighted,
        num_vertices: vertices.ok_or_else(|| ConvertError::header(path, "missing vertices"))?,
        num_edges: edges.ok_or_else(|| ConvertError::header(path, "missing edges"))?,
    })
}

/// Reader for an X-Stream pair: a headerless packed edge stream and its
/// `.ini` descriptor. Either path may be given.
pub struct XStreamReader {
    reader: BufReader<File>,
    path: PathBuf,
    edge_data: EdgeDataKind,
    stored: EdgeDataKind,
    header: InputHeader,
    scratch: Vec<u8>,
    skipped: u64,
    exhausted: bool,
}

impl XStreamReader {
    /// Opens the descriptor and the edge stream.
    pub fn open(path: &Path, edge_data: EdgeDataKind) -> Result<Self> {
        let (stream, ini) = match path.extension() {
            Some(ext) if ext == "ini" => (path.with_extension(""), path.to_path_buf()),
            _ => (path.to_path_buf(), descriptor_path(path)),
        };
        let text = fs::read_to_string(&ini).map_err(|source| ConvertError::Open {
            path: ini.clone(),
            source,
        })?;
        let descriptor = parse_descriptor(&ini, &text)?;
        debug!(path = %ini.display(), ?descriptor, "formats.xstream.descriptor");
        Ok(Self {
            reader: open_read(&stream)?,
            path: stream,
            edge_data,
            stored: if descriptor.weighted {
                EdgeDataKind::U64
            } else {
                EdgeDataKind::None
            },
            header: InputHeader {
                num_vertices: descriptor.num_vertices,
                num_edges: descriptor.num_edges,
            },
            scratch: Vec::new(),
            skipped: 0,
            exhausted: false,
        })
    }
}

impl EdgeReader for XStreamReader {
    fn header(&self) -> InputHeader {
        self.header
    }

    fn read_edges(&mut self, buf: &mut [EdgeRecord]) -> Result<usize> {
        if self.exhausted || buf.is_empty() {
            return Ok(0);
        }
        let width = record::width(self.stored);
        self.scratch.resize(buf.len() * width, 0);
        let read = read_full(&mut self.reader, &mut self.scratch)?;
        if read < self.scratch.len() {
            self.exhausted = true;
        }
        if read % width != 0 {
            self.skipped += 1;
        }
        let keep_data = self.edge_data.has_data();
        let records = read / width;
        for (slot, raw) in buf.iter_mut().zip(self.scratch.chunks_exact(width).take(records)) {
            if let Some(mut edge) = record::decode(raw, self.stored) {
                if !keep_data {
                    edge.data = 0;
                }
                *slot = edge;
            }
        }
        Ok(records)
    }

    fn skipped(&self) -> u64 {
        self.skipped
    }

    fn close(self: Box<Self>) -> Result<()> {
        if self.skipped > 0 {
            warn!(path = %self.path.display(), "formats.xstream.truncated_record");
        }
        Ok(())
    }
}

/// Writer for an X-Stream pair. The descriptor is written at open time.
pub struct XStreamWriter<W: Write + Send = BufWriter<File>> {
    sink: W,
    edge_data: EdgeDataKind,
    scratch: Vec<u8>,
}

fn descriptor_text(name: &str, meta: &dyn GraphMeta) -> String {
    let kind = if meta.edge_data().has_data() {
        TYPE_WEIGHTED
    } else {
        TYPE_TOPOLOGY
    };
    format!(
        "[graph]\ntype={kind}\nname={name}\nvertices={}\nedges={}\n",
        meta.num_vertices(),
        meta.num_edges()
    )
}

impl XStreamWriter {
    /// Creates the edge stream at `path` and its descriptor at `path.ini`.
    pub fn create(path: &Path, meta: &dyn GraphMeta) -> Result<Self> {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let ini = descriptor_path(path);
        fs::write(&ini, descriptor_text(&name, meta)).map_err(|source| ConvertError::Open {
            path: ini.clone(),
            source,
        })?;
        Ok(Self::from_sink(create_write(path)?, meta))
    }
}

impl<W: Write + Send> XStreamWriter<W> {
    /// Returns the underlying sink without flushing it.
    pub fn into_inner(self) -> W {
        self.sink
    }

    /// Wraps `sink` as the edge stream for `meta`.
    pub fn from_sink(sink: W, meta: &dyn GraphMeta) -> Self {
        Self {
            sink,
            edge_data: meta.edge_data(),
            scratch: Vec::new(),
        }
    }
}

impl<W: Write + Send> EdgeWriter for XStreamWriter<W> {
    fn write_edges(&mut self, edges: &[EdgeRecord], _grouped: bool, _pass: usize) -> Result<()> {
        self.scratch.clear();
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
