use crate::types::{EdgeRecord, VertexId};

/// Number of edges packed into one Vector-Sparse vector.
pub const EDGES_PER_VECTOR: u64 = 4;

/// One entry of an [`EdgeList`]. The indexed endpoint is implicit.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct IndexedEdge {
    /// The endpoint that is not the indexed vertex.
    pub other: VertexId,
    /// Raw payload bits (zero for topology-only graphs).
    pub data: u64,
}

/// Append-ordered list of the edges sharing one indexed endpoint.
///
/// Endpoints and payloads are kept in separate columns so topology-only
/// graphs pay nothing for edge data. The payload column may be shorter than
/// the endpoint column when the list was filled without data; missing cells
/// read as zero.
#[derive(Clone, Debug, Default)]
pub struct EdgeList {
    others: Vec<VertexId>,
    data: Vec<u64>,
    degree: u64,
    num_vectors: u64,
}

impl EdgeList {
    /// Creates an empty list.
    pub const fn new() -> Self {
        Self {
            others: Vec::new(),
            data: Vec::new(),
            degree: 0,
            num_vectors: 0,
        }
    }

    /// Number of edges in the list.
    pub fn degree(&self) -> u64 {
        self.degree
    }

    /// Number of Vector-Sparse vectors needed to encode the list.
    pub fn num_vectors(&self) -> u64 {
        self.num_vectors
    }

    /// Returns true when the list holds no edges.
    pub fn is_empty(&self) -> bool {
        self.degree == 0
    }

    /// Appends `edge`, storing its destination as the other endpoint when
    /// `use_destination_as_other` is set (by-source lists) and its source otherwise.
    pub fn insert_from_edge(
        &mut self,
        edge: &EdgeRecord,
        use_destination_as_other: bool,
        carry_data: bool,
    ) {
        let other = if use_destination_as_other {
            edge.dst
        } else {
            edge.src
        };
        if carry_data {
            if self.data.len() < self.others.len() {
                self.data.resize(self.others.len(), 0);
            }
            self.data.push(edge.data);
        }
        self.others.push(other);
        self.degree += 1;
        if self.degree % EDGES_PER_VECTOR == 1 {
            self.num_vectors += 1;
        }
    }

    /// Removes every entry whose other endpoint equals `other` and returns how
    /// many were removed. A coherent graph holds at most one such entry.
    pub fn remove(&mut self, other: VertexId) -> u64 {
        let mut removed = 0u64;
        let mut idx = 0usize;
        while idx < self.others.len() {
            if self.others[idx] != other {
                idx += 1;
                continue;
            }
            self.others.remove(idx);
            if idx < self.data.len() {
                self.data.remove(idx);
            }
            removed += 1;
            self.degree -= 1;
            if self.degree % EDGES_PER_VECTOR == 0 {
                self.num_vectors -= 1;
            }
        }
        debug_assert!(removed <= 1, "duplicate entries for other vertex {other}");
        removed
    }

    /// Returns true when some entry points at `other`.
    pub fn contains(&self, other: VertexId) -> bool {
        self.others.contains(&other)
    }

    /// Payload stored with the first entry pointing at `other`.
    pub fn data_for(&self, other: VertexId) -> Option<u64> {
        self.others
            .iter()
            .position(|&candidate| candidate == other)
            .map(|idx| self.data_at(idx))
    }

    /// Entry at `position`, in stored order.
    pub fn get(&self, position: usize) -> Option<IndexedEdge> {
        self.others.get(position).map(|&other| IndexedEdge {
            other,
            data: self.data_at(position),
        })
    }

    /// Read-only iteration in stored order.
    pub fn scan(&self) -> impl ExactSizeIterator<Item = IndexedEdge> + '_ {
        self.others
            .iter()
            .enumerate()
            .map(move |(idx, &other)| IndexedEdge {
                other,
                data: self.data_at(idx),
            })
    }

    /// Other endpoints in stored order.
    pub fn others(&self) -> &[VertexId] {
        &self.others
    }

    /// Rewrites every payload in place with `f(other, old_data)`.
    pub fn rewrite_data(&mut self, mut f: impl FnMut(VertexId, u64) -> u64) {
        self.data.resize(self.others.len(), 0);
        for (other, data) in self.others.iter().zip(self.data.iter_mut()) {
            *data = f(*other, *data);
        }
    }

    /// Rebuilds the full edge at `position`, given the vertex this list is indexed by.
    pub fn fill_edge(
        &self,
        position: usize,
        top_level_vertex: VertexId,
        top_level_is_destination: bool,
    ) -> Option<EdgeRecord> {
        let entry = self.get(position)?;
        let record = if top_level_is_destination {
            EdgeRecord::with_data(entry.other, top_level_vertex, entry.data)
        } else {
            EdgeRecord::with_data(top_level_vertex, entry.other, entry.data)
        };
        Some(record)
    }

    fn data_at(&self, idx: usize) -> u64 {
        self.data.get(idx).copied().unwrap_or(0)
    }
}
