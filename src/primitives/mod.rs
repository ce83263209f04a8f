//! Low-level primitives shared by the storage, pipeline and format layers.

/// Little-endian packing helpers for the binary formats.
pub mod bytes;

/// Thread groups, refresh scratch space and NUMA placement.
pub mod concurrency;

/// Buffered file handles, text tokenizing and write-failure injection.
pub mod io;
