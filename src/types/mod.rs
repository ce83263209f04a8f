//! Shared identifiers, edge records and the crate-wide error type.

use std::fmt;
use std::path::PathBuf;

use serde::Serialize;

/// Vertex identifier. Only the low 48 bits are meaningful.
pub type VertexId = u64;

/// Largest representable vertex identifier (48 bits).
pub const MAX_VERTEX_ID: VertexId = (1 << 48) - 1;

/// Kind of per-edge data carried by a graph. All edges of one graph share a kind.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum EdgeDataKind {
    /// Topology only.
    #[default]
    None,
    /// Unsigned 64-bit integer payload.
    U64,
    /// 64-bit floating-point payload.
    F64,
}

impl EdgeDataKind {
    /// Width in bytes of one pipeline record for this kind.
    pub const fn record_size(self) -> usize {
        match self {
            EdgeDataKind::None => 16,
            EdgeDataKind::U64 | EdgeDataKind::F64 => 24,
        }
    }

    /// Returns true when edges carry a payload.
    pub const fn has_data(self) -> bool {
        !matches!(self, EdgeDataKind::None)
    }

    /// Parses a user-supplied edge data name (case-insensitive).
    pub fn parse(name: &str) -> Result<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "void" | "none" => Ok(EdgeDataKind::None),
            "int" | "integer" | "u64" => Ok(EdgeDataKind::U64),
            "float" | "double" | "f64" => Ok(EdgeDataKind::F64),
            other => Err(ConvertError::UnknownEdgeData(other.to_string())),
        }
    }

    /// Interprets raw payload bits as a typed value.
    pub fn value(self, bits: u64) -> EdgeValue {
        match self {
            EdgeDataKind::None => EdgeValue::None,
            EdgeDataKind::U64 => EdgeValue::U64(bits),
            EdgeDataKind::F64 => EdgeValue::F64(f64::from_bits(bits)),
        }
    }
}

impl fmt::Display for EdgeDataKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EdgeDataKind::None => "void",
            EdgeDataKind::U64 => "int",
            EdgeDataKind::F64 => "float",
        };
        f.write_str(name)
    }
}

/// Typed view of an edge payload.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum EdgeValue {
    /// No payload.
    None,
    /// Integer payload.
    U64(u64),
    /// Floating-point payload.
    F64(f64),
}

impl EdgeValue {
    /// Raw 64-bit storage form of the payload.
    pub fn to_bits(self) -> u64 {
        match self {
            EdgeValue::None => 0,
            EdgeValue::U64(v) => v,
            EdgeValue::F64(v) => v.to_bits(),
        }
    }
}

/// One edge as it travels through the pipeline buffers.
///
/// `data` holds the raw payload bits; its interpretation is given by the
/// graph's [`EdgeDataKind`] and it is zero for topology-only graphs.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[repr(C)]
pub struct EdgeRecord {
    /// Source vertex.
    pub src: VertexId,
    /// Destination vertex.
    pub dst: VertexId,
    /// Raw edge payload bits.
    pub data: u64,
}

impl EdgeRecord {
    /// Creates a record without payload.
    pub const fn new(src: VertexId, dst: VertexId) -> Self {
        Self { src, dst, data: 0 }
    }

    /// Creates a record carrying raw payload bits.
    pub const fn with_data(src: VertexId, dst: VertexId, data: u64) -> Self {
        Self { src, dst, data }
    }
}

impl fmt::Display for EdgeRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.src, self.dst)
    }
}

/// Errors surfaced by the conversion core.
#[derive(thiserror::Error, Debug)]
pub enum ConvertError {
    /// I/O failure while streaming records.
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),
    /// A file could not be opened or created.
    #[error("cannot open {}: {source}", path.display())]
    Open {
        /// Offending path.
        path: PathBuf,
        /// Underlying failure.
        #[source]
        source: std::io::Error,
    },
    /// A file header is missing or malformed.
    #[error("malformed header in {}: {reason}", path.display())]
    Header {
        /// Offending path.
        path: PathBuf,
        /// What was wrong.
        reason: String,
    },
    /// Invalid configuration value.
    #[error("invalid configuration: {0}")]
    Config(String),
    /// Unknown file format name.
    #[error("unknown format: {0}")]
    UnknownFormat(String),
    /// Unknown transform name.
    #[error("unknown transform: {0}")]
    UnknownTransform(String),
    /// Unknown edge data kind name.
    #[error("unknown edge data kind: {0}")]
    UnknownEdgeData(String),
    /// Allocation for a large structure failed.
    #[error("out of memory allocating {what} ({requested} elements)")]
    OutOfMemory {
        /// Structure being allocated.
        what: &'static str,
        /// Number of elements requested.
        requested: usize,
    },
    /// The two indices of a graph disagree.
    #[error("coherency violation: {0}")]
    Coherency(String),
    /// The pipeline stopped before draining its input.
    #[error("pipeline stopped: {0}")]
    PipelineStopped(String),
}

impl ConvertError {
    /// Process exit code for this error: 1 for configuration problems, 3 for runtime failures.
    pub fn exit_code(&self) -> i32 {
        match self {
            ConvertError::Config(_)
            | ConvertError::UnknownFormat(_)
            | ConvertError::UnknownTransform(_)
            | ConvertError::UnknownEdgeData(_) => 1,
            _ => 3,
        }
    }

    pub(crate) fn header(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        ConvertError::Header {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, ConvertError>;
