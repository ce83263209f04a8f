use crate::storage::vector_sparse::VectorSparseGraph;
use crate::storage::{MutableGraph, Orientation, EDGES_PER_VECTOR};
use crate::types::{EdgeRecord, VertexId};

/// Resumable walk over a graph's edges, driven by the write producer.
pub trait EdgeSource: Send {
    /// Fills `buf` from the front with the next edges and returns how many
    /// were written. Zero means the walk is complete.
    fn fill(&mut self, buf: &mut [EdgeRecord]) -> usize;

    /// Restarts the walk from the first edge.
    fn rewind(&mut self);
}

/// Walks one orientation of a [`MutableGraph`] in vertex order.
pub struct GraphCursor<'g> {
    graph: &'g MutableGraph,
    orientation: Orientation,
    vertex: VertexId,
    position: usize,
}

impl<'g> GraphCursor<'g> {
    /// Starts at the first edge of `orientation`.
    pub fn new(graph: &'g MutableGraph, orientation: Orientation) -> Self {
        Self {
            graph,
            orientation,
            vertex: 0,
            position: 0,
        }
    }
}

impl EdgeSource for GraphCursor<'_> {
    fn fill(&mut self, buf: &mut [EdgeRecord]) -> usize {
        let index = self.graph.index(self.orientation);
        let top_is_destination = self.orientation.is_destination();
        let end = index.num_vertices();
        let mut filled = 0usize;
        while filled < buf.len() && self.vertex < end {
            let Some(list) = index.edge_list(self.vertex) else {
                self.vertex += 1;
                continue;
            };
            while filled < buf.len() {
                match list.fill_edge(self.position, self.vertex, top_is_destination) {
                    Some(edge) => {
                        buf[filled] = edge;
                        filled += 1;
                        self.position += 1;
                    }
                    None => break,
                }
            }
            if self.position as u64 >= list.degree() {
                self.vertex += 1;
                self.position = 0;
            }
        }
        filled
    }

    fn rewind(&mut self) {
        self.vertex = 0;
        self.position = 0;
    }
}

/// Walks one orientation of a [`VectorSparseGraph`], decoding vectors in storage order.
pub struct VectorSparseCursor<'g> {
    graph: &'g VectorSparseGraph,
    orientation: Orientation,
    vector: usize,
    slot: usize,
}

impl<'g> VectorSparseCursor<'g> {
    /// Starts at the first vector of `orientation`.
    pub fn new(graph: &'g VectorSparseGraph, orientation: Orientation) -> Self {
        Self {
            graph,
            orientation,
            vector: 0,
            slot: 0,
        }
    }
}

impl EdgeSource for VectorSparseCursor<'_> {
    fn fill(&mut self, buf: &mut [EdgeRecord]) -> usize {
        let index = self.graph.index(self.orientation);
        let (vectors, lanes) = (index.vectors(), index.data());
        let is_destination = self.orientation.is_destination();
        let slots = EDGES_PER_VECTOR as usize;
        let mut filled = 0usize;
        while filled < buf.len() && self.vector < vectors.len() {
            let vector = &vectors[self.vector];
            let shared = vector.shared_vertex();
            while filled < buf.len() && self.slot < slots {
                if vector.is_valid(self.slot) {
                    let other = vector.other(self.slot);
                    let data = lanes
                        .get(self.vector)
                        .map_or(0, |lane| lane.values()[self.slot]);
                    buf[filled] = if is_destination {
                        EdgeRecord::with_data(other, shared, data)
                    } else {
                        EdgeRecord::with_data(shared, other, data)
                    };
                    filled += 1;
                }
                self.slot += 1;
            }
            if self.slot == slots {
                self.vector += 1;
                self.slot = 0;
            }
        }
        filled
    }

    fn rewind(&mut self) {
        self.vector = 0;
        self.slot = 0;
    }
}
