//! In-memory graph representations.
//!
//! The mutable store keeps every edge twice, once under its source and once
//! under its destination. The Vector-Sparse form is built from it and is
//! read-only.

mod edge_list;
mod mutable_graph;
mod vertex_index;

/// Vector-Sparse codec and the immutable graph built with it.
pub mod vector_sparse;

pub use edge_list::{EdgeList, IndexedEdge, EDGES_PER_VECTOR};
pub use mutable_graph::{MutableGraph, Orientation};
pub use vector_sparse::{SparseVector, VectorSparseGraph};
pub use vertex_index::VertexIndex;
