#![forbid(unsafe_code)]

//! Command-line plumbing shared by the `edgeconv` binary.
//!
//! The binary turns its flags into a [`ConvertConfig`] and hands it to
//! [`convert::run_convert`]. Everything that can be rejected without touching
//! the input is rejected while building the config.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use rayon::ThreadPoolBuilder;
use serde::Deserialize;
use thiserror::Error;
use tracing::warn;
use tracing_subscriber::{fmt, EnvFilter};

use crate::formats::{FormatKind, FormatOptions};
use crate::pipeline::PipelineOptions;
use crate::transform::EdgeDataTransform;
use crate::types::{ConvertError, EdgeDataKind};

/// The conversion driver.
pub mod convert;

pub use convert::{run_convert, ConvertSummary};

/// Validated description of one conversion.
#[derive(Debug, Clone)]
pub struct ConvertConfig {
    /// File to read.
    pub input_path: PathBuf,
    /// File to create.
    pub output_path: PathBuf,
    /// Dialect of the input.
    pub input_format: FormatKind,
    /// Dialect of the output.
    pub output_format: FormatKind,
    /// Options for the input side; selects how adjacency rows are read.
    pub input_options: FormatOptions,
    /// Options for the output side; selects the write grouping.
    pub output_options: FormatOptions,
    /// Payload kind carried through the conversion.
    pub edge_data: EdgeDataKind,
    /// Transforms applied in order after ingestion.
    pub transforms: Vec<EdgeDataTransform>,
    /// Build the Vector-Sparse view after the transforms.
    pub build_vector_sparse: bool,
    /// Feed the writer from the Vector-Sparse view instead of the mutable graph.
    pub write_from_vector_sparse: bool,
    /// Buffer sizing and thread placement.
    pub pipeline: PipelineOptions,
}

impl ConvertConfig {
    /// Resolves format, option, payload and transform names.
    #[allow(clippy::too_many_arguments)]
    pub fn from_names(
        input_path: PathBuf,
        output_path: PathBuf,
        input_format: &str,
        output_format: &str,
        input_options: &str,
        output_options: &str,
        edge_data: &str,
        transforms: &[String],
    ) -> Result<Self, CliError> {
        let transforms = transforms
            .iter()
            .map(|name| EdgeDataTransform::parse(name))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            input_path,
            output_path,
            input_format: FormatKind::parse(input_format)?,
            output_format: FormatKind::parse(output_format)?,
            input_options: FormatOptions::parse(input_options)?,
            output_options: FormatOptions::parse(output_options)?,
            edge_data: EdgeDataKind::parse(edge_data)?,
            transforms,
            build_vector_sparse: false,
            write_from_vector_sparse: false,
            pipeline: PipelineOptions::default(),
        })
    }
}

/// Optional TOML tuning file.
///
/// ```toml
/// [pipeline]
/// buffer_bytes = 16777216
/// read_threads = 8
/// numa_node = 0
/// pin_threads = false
/// ```
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TuningFile {
    /// Pipeline overrides.
    pub pipeline: PipelineOptions,
}

impl TuningFile {
    /// Reads and parses `path`.
    pub fn load(path: &Path) -> Result<Self, CliError> {
        let contents = fs::read_to_string(path).map_err(|source| CliError::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&contents).map_err(|source| CliError::ConfigParse {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Error type for the command-line layer.
#[derive(Error, Debug)]
pub enum CliError {
    /// Generic error message.
    #[error("{0}")]
    Message(String),
    /// IO error from file operations.
    #[error(transparent)]
    Io(#[from] std::io::Error),
    /// Failure inside the conversion core.
    #[error(transparent)]
    Convert(#[from] ConvertError),
    /// The tuning file could not be read.
    #[error("failed to read config {}: {source}", path.display())]
    ConfigRead {
        /// Offending path.
        path: PathBuf,
        /// Underlying failure.
        source: std::io::Error,
    },
    /// The tuning file is not valid TOML for [`TuningFile`].
    #[error("failed to parse config {}: {source}", path.display())]
    ConfigParse {
        /// Offending path.
        path: PathBuf,
        /// Underlying failure.
        source: toml::de::Error,
    },
}

impl CliError {
    /// Process exit code: 1 for configuration problems, 3 for runtime failures.
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Convert(err) => err.exit_code(),
            CliError::Io(_) => 3,
            CliError::Message(_) | CliError::ConfigRead { .. } | CliError::ConfigParse { .. } => 1,
        }
    }
}

impl From<&str> for CliError {
    fn from(value: &str) -> Self {
        CliError::Message(value.to_string())
    }
}

impl From<String> for CliError {
    fn from(value: String) -> Self {
        CliError::Message(value)
    }
}

/// Installs the global `tracing` subscriber. `RUST_LOG` wins over `level`.
pub fn init_logging(level: &str) -> Result<(), CliError> {
    let filter = match std::env::var("RUST_LOG") {
        Ok(env) if !env.trim().is_empty() => EnvFilter::try_new(env),
        _ => EnvFilter::try_new(level),
    }
    .map_err(|e| CliError::Message(format!("invalid log level: {e}")))?;
    fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_ids(true)
        .try_init()
        .map_err(|_| CliError::Message("logging already initialized".into()))
}

static RAYON_THREAD_POOL: OnceLock<()> = OnceLock::new();

/// Sizes the global rayon pool used by the transforms. Only the first call
/// has an effect.
pub fn configure_thread_pool(threads: Option<usize>) {
    let _ = RAYON_THREAD_POOL.get_or_init(|| {
        let mut builder = ThreadPoolBuilder::new();
        if let Some(num_threads) = threads {
            builder = builder.num_threads(num_threads);
        }
        if let Err(err) = builder.build_global() {
            warn!(threads = ?threads, error = %err, "cli.thread_pool.configure_failed");
        }
    });
}
