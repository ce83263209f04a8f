#![allow(unsafe_code)]

use std::fmt;

use crate::primitives::concurrency::{RefreshScratch, ThreadGroup};
use crate::types::{ConvertError, EdgeDataKind, EdgeRecord, Result, VertexId};

use super::edge_list::EdgeList;
use super::vertex_index::VertexIndex;

/// Which endpoint keys a [`VertexIndex`].
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum Orientation {
    /// Lists are keyed by source; entries hold destinations.
    BySource,
    /// Lists are keyed by destination; entries hold sources.
    ByDestination,
}

impl Orientation {
    /// Both orientations, source first.
    pub const ALL: [Orientation; 2] = [Orientation::BySource, Orientation::ByDestination];

    /// Orientation matching a writer's grouping flag.
    pub fn grouped_by_destination(grouped_by_destination: bool) -> Self {
        if grouped_by_destination {
            Orientation::ByDestination
        } else {
            Orientation::BySource
        }
    }

    /// Returns true for [`Orientation::ByDestination`].
    pub fn is_destination(self) -> bool {
        matches!(self, Orientation::ByDestination)
    }
}

impl fmt::Display for Orientation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Orientation::BySource => f.write_str("source"),
            Orientation::ByDestination => f.write_str("destination"),
        }
    }
}

/// Directed graph indexed both by source and by destination.
///
/// Every edge is stored twice by value, once in each index, with identical
/// payload. All edges share the graph's [`EdgeDataKind`].
pub struct MutableGraph {
    by_source: VertexIndex,
    by_destination: VertexIndex,
    edge_data: EdgeDataKind,
}

impl MutableGraph {
    /// Creates an empty graph.
    pub fn new(edge_data: EdgeDataKind) -> Self {
        Self {
            by_source: VertexIndex::new(),
            by_destination: VertexIndex::new(),
            edge_data,
        }
    }

    /// Creates a graph with `n` empty vertex slots in each index.
    pub fn with_num_vertices(n: usize, edge_data: EdgeDataKind) -> Result<Self> {
        Ok(Self {
            by_source: VertexIndex::try_with_num_vertices(n)?,
            by_destination: VertexIndex::try_with_num_vertices(n)?,
            edge_data,
        })
    }

    /// Kind of payload carried by every edge.
    pub fn edge_data(&self) -> EdgeDataKind {
        self.edge_data
    }

    /// Records a new payload kind. Stored payload bits are not converted.
    pub fn set_edge_data_kind(&mut self, kind: EdgeDataKind) {
        self.edge_data = kind;
    }

    /// Index for `orientation`.
    pub fn index(&self, orientation: Orientation) -> &VertexIndex {
        match orientation {
            Orientation::BySource => &self.by_source,
            Orientation::ByDestination => &self.by_destination,
        }
    }

    /// By-source index.
    pub fn by_source(&self) -> &VertexIndex {
        &self.by_source
    }

    /// By-destination index.
    pub fn by_destination(&self) -> &VertexIndex {
        &self.by_destination
    }

    pub(crate) fn indices_mut(&mut self) -> (&mut VertexIndex, &mut VertexIndex) {
        (&mut self.by_source, &mut self.by_destination)
    }

    /// Vertex count; by convention taken from the by-source index.
    pub fn num_vertices(&self) -> u64 {
        self.by_source.num_vertices()
    }

    /// Edge count; by convention taken from the by-source index.
    pub fn num_edges(&self) -> u64 {
        self.by_source.num_edges()
    }

    /// Vector count of one orientation.
    pub fn num_vectors(&self, orientation: Orientation) -> u64 {
        self.index(orientation).num_vectors()
    }

    /// Out-degree of `vertex`.
    pub fn outdegree(&self, vertex: VertexId) -> u64 {
        self.by_source.degree(vertex)
    }

    /// In-degree of `vertex`.
    pub fn indegree(&self, vertex: VertexId) -> u64 {
        self.by_destination.degree(vertex)
    }

    /// Resizes both indices.
    pub fn set_num_vertices(&mut self, n: usize) -> Result<()> {
        self.by_source.set_num_vertices(n)?;
        self.by_destination.set_num_vertices(n)
    }

    /// Inserts `edge` into both indices without maintaining counters.
    ///
    /// # Safety
    ///
    /// No other thread may access the by-source slot of `edge.src` or the
    /// by-destination slot of `edge.dst` during the call. Both endpoints must
    /// be below [`MutableGraph::num_vertices`].
    pub unsafe fn fast_insert(&self, edge: &EdgeRecord) {
        // SAFETY: forwarded from the caller's contract.
        unsafe {
            self.fast_insert_oriented(Orientation::BySource, edge);
            self.fast_insert_oriented(Orientation::ByDestination, edge);
        }
    }

    /// Inserts `edge` into one index without maintaining counters.
    ///
    /// # Safety
    ///
    /// No other thread may access the slot of `edge`'s indexed vertex in
    /// `orientation` during the call.
    pub unsafe fn fast_insert_oriented(&self, orientation: Orientation, edge: &EdgeRecord) {
        let carry_data = self.edge_data.has_data();
        // SAFETY: forwarded from the caller's contract.
        unsafe {
            match orientation {
                Orientation::BySource => self.by_source.fast_insert_by_source(edge, carry_data),
                Orientation::ByDestination => {
                    self.by_destination
                        .fast_insert_by_destination(edge, carry_data)
                }
            }
        }
    }

    /// Serial insert into both indices, growing the vertex range as needed.
    pub fn insert(&mut self, edge: &EdgeRecord) -> Result<()> {
        let carry_data = self.edge_data.has_data();
        self.by_source.insert_by_source(edge, carry_data)?;
        self.by_destination.insert_by_destination(edge, carry_data)?;
        let n = self
            .by_source
            .num_vertices()
            .max(self.by_destination.num_vertices());
        self.set_num_vertices(n as usize)
    }

    /// Removes `(src, dst)` from both indices and returns the number of copies removed.
    pub fn remove_edge(&mut self, src: VertexId, dst: VertexId) -> u64 {
        let removed = self.by_source.remove_edge(src, dst);
        let mirrored = self.by_destination.remove_edge(dst, src);
        debug_assert_eq!(removed, mirrored, "indices disagree on ({src}, {dst})");
        removed
    }

    /// Removes every edge touching `vertex` from both indices.
    pub fn remove_vertex(&mut self, vertex: VertexId) {
        if let Some(out) = self.by_source.remove_vertex(vertex) {
            for &dst in out.others() {
                self.by_destination.remove_edge(dst, vertex);
            }
        }
        if let Some(incoming) = self.by_destination.remove_vertex(vertex) {
            for &src in incoming.others() {
                self.by_source.remove_edge(src, vertex);
            }
        }
    }

    /// Refreshes the counters of both indices from every member of a region.
    ///
    /// `scratch` needs `2 * local_count` cells: one block per orientation.
    pub fn parallel_refresh_metadata(&self, group: &ThreadGroup<'_>, scratch: &RefreshScratch) {
        self.by_source.parallel_refresh_metadata(group, scratch, 0);
        self.by_destination
            .parallel_refresh_metadata(group, scratch, group.local_count());
    }

    /// Scratch sized for [`MutableGraph::parallel_refresh_metadata`] with `threads` members.
    pub fn refresh_scratch(threads: usize) -> RefreshScratch {
        RefreshScratch::new(threads, Orientation::ALL.len())
    }

    /// Every edge as seen from `orientation`, in index order.
    pub fn edges(&self, orientation: Orientation) -> impl Iterator<Item = EdgeRecord> + '_ {
        let top_is_destination = orientation.is_destination();
        self.index(orientation).iter().flat_map(move |(v, list)| {
            (0..list.others().len())
                .filter_map(move |pos| list.fill_edge(pos, v, top_is_destination))
        })
    }

    /// Edge list of `vertex` in `orientation`.
    pub fn edge_list(&self, orientation: Orientation, vertex: VertexId) -> Option<&EdgeList> {
        self.index(orientation).edge_list(vertex)
    }

    /// Verifies that both indices hold the same edge multiset with matching payloads.
    pub fn check_coherency(&self) -> Result<()> {
        if self.by_source.num_edges() != self.by_destination.num_edges() {
            return Err(ConvertError::Coherency(format!(
                "edge counts differ: {} by source, {} by destination",
                self.by_source.num_edges(),
                self.by_destination.num_edges()
            )));
        }
        let mut forward: Vec<EdgeRecord> = self.edges(Orientation::BySource).collect();
        let mut backward: Vec<EdgeRecord> = self.edges(Orientation::ByDestination).collect();
        let key = |e: &EdgeRecord| (e.src, e.dst, e.data);
        forward.sort_unstable_by_key(key);
        backward.sort_unstable_by_key(key);
        if let Some((a, b)) = forward.iter().zip(&backward).find(|(a, b)| a != b) {
            return Err(ConvertError::Coherency(format!(
                "by-source holds {a} data {} but by-destination holds {b} data {}",
                a.data, b.data
            )));
        }
        if forward.len() != backward.len() {
            return Err(ConvertError::Coherency(format!(
                "enumerated {} edges by source and {} by destination",
                forward.len(),
                backward.len()
            )));
        }
        Ok(())
    }
}

impl fmt::Debug for MutableGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MutableGraph")
            .field("vertices", &self.num_vertices())
            .field("edges", &self.num_edges())
            .field("edge_data", &self.edge_data)
            .finish()
    }
}
