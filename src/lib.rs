//! Parallel conversion of large directed graphs between on-disk edge formats.
//!
//! A conversion streams an input file through a double-buffered pipeline into
//! a [`storage::MutableGraph`] indexed both by source and by destination,
//! optionally rewrites edge payloads with an [`transform::EdgeDataTransform`],
//! optionally packs the graph into the Vector-Sparse layout, and streams it
//! back out through a format writer.

#![warn(missing_docs)]

pub mod cli;
pub mod formats;
pub mod pipeline;
pub mod primitives;
pub mod storage;
pub mod transform;
pub mod types;
