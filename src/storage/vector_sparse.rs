//! Vector-Sparse: the immutable, traversal-oriented graph representation.
//!
//! Each vector is a 256-bit lane of four 64-bit words holding up to four
//! edges of one indexed ("shared") vertex:
//!
//! | bits  | words 0..=2                     | word 3                         |
//! |-------|---------------------------------|--------------------------------|
//! | 47:0  | other endpoint                  | other endpoint                 |
//! | 62:48 | 15-bit slice `i` of shared id   | 50:48 shared bits 47:45, 62:51 variable field |
//! | 63    | slot valid                      | slot valid                     |
//!
//! Weighted graphs carry a second lane with the four payloads in slot order.

#![allow(unsafe_code)]

use std::time::Instant;

use tracing::{debug, info};

use crate::types::{ConvertError, EdgeDataKind, EdgeRecord, Result, VertexId, MAX_VERTEX_ID};

use super::edge_list::{EdgeList, IndexedEdge, EDGES_PER_VECTOR};
use super::mutable_graph::{MutableGraph, Orientation};

/// `index[v]` sentinel for a vertex without edges below the last present vertex.
pub const NOT_PRESENT: u64 = (1 << 63) - 1;
/// `index[v]` sentinel for every vertex above the last present vertex.
pub const PAST_END: u64 = u64::MAX;

const SLOTS: usize = EDGES_PER_VECTOR as usize;
const VALID_BIT: u64 = 1 << 63;
const OTHER_MASK: u64 = 0x0000_FFFF_FFFF_FFFF;
const SLICE_SHIFT: u32 = 48;
const SLICE_MASK: u64 = 0x7fff;
const TOP_SLICE_MASK: u64 = 0x0007;
const VARIABLE_SHIFT: u32 = 51;
const VARIABLE_MASK: u64 = 0xfff;

/// Largest value the per-vector variable field can hold.
pub const MAX_VARIABLE_FIELD: u16 = VARIABLE_MASK as u16;

/// Topology lane of one Vector-Sparse element.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash)]
#[repr(C, align(32))]
pub struct SparseVector {
    words: [u64; SLOTS],
}

/// Payload lane matching a [`SparseVector`] slot for slot.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash)]
#[repr(C, align(32))]
pub struct DataLane {
    values: [u64; SLOTS],
}

impl DataLane {
    /// Raw payload bits by slot.
    pub fn values(&self) -> &[u64; SLOTS] {
        &self.values
    }
}

impl SparseVector {
    /// Packs up to four edges of `shared` into one vector and its payload lane.
    ///
    /// # Panics
    ///
    /// Panics if `edges` is empty or holds more than four entries.
    pub fn encode(shared: VertexId, edges: &[IndexedEdge]) -> (SparseVector, DataLane) {
        assert!(
            !edges.is_empty() && edges.len() <= SLOTS,
            "a vector holds 1..=4 edges, got {}",
            edges.len()
        );
        debug_assert!(shared <= MAX_VERTEX_ID);
        let mut vector = SparseVector::default();
        let mut lane = DataLane::default();
        for slot in 0..SLOTS {
            let slice = if slot < SLOTS - 1 {
                (shared >> (15 * slot as u32)) & SLICE_MASK
            } else {
                (shared >> 45) & TOP_SLICE_MASK
            };
            let mut word = slice << SLICE_SHIFT;
            if let Some(edge) = edges.get(slot) {
                word |= (edge.other & OTHER_MASK) | VALID_BIT;
                lane.values[slot] = edge.data;
            }
            vector.words[slot] = word;
        }
        (vector, lane)
    }

    /// Raw words.
    pub fn words(&self) -> &[u64; SLOTS] {
        &self.words
    }

    /// Rebuilds the shared vertex from the four id slices.
    pub fn shared_vertex(&self) -> VertexId {
        #[cfg(target_arch = "x86_64")]
        {
            if std::arch::is_x86_feature_detected!("avx2") {
                // SAFETY: AVX2 support was just verified at runtime.
                return unsafe { avx2::shared_vertex(self) };
            }
        }
        self.shared_vertex_scalar()
    }

    pub(crate) fn shared_vertex_scalar(&self) -> VertexId {
        let [w0, w1, w2, w3] = self.words;
        ((w0 >> SLICE_SHIFT) & SLICE_MASK)
            | (((w1 >> SLICE_SHIFT) & SLICE_MASK) << 15)
            | (((w2 >> SLICE_SHIFT) & SLICE_MASK) << 30)
            | (((w3 >> SLICE_SHIFT) & TOP_SLICE_MASK) << 45)
    }

    /// Bit `i` is set when slot `i` holds a real edge.
    pub fn valid_mask(&self) -> u8 {
        #[cfg(target_arch = "x86_64")]
        {
            if std::arch::is_x86_feature_detected!("avx2") {
                // SAFETY: AVX2 support was just verified at runtime.
                return unsafe { avx2::valid_mask(self) };
            }
        }
        self.valid_mask_scalar()
    }

    pub(crate) fn valid_mask_scalar(&self) -> u8 {
        self.words
            .iter()
            .enumerate()
            .fold(0u8, |mask, (slot, word)| mask | (((word >> 63) as u8) << slot))
    }

    /// Returns true when `slot` holds a real edge.
    pub fn is_valid(&self, slot: usize) -> bool {
        self.words[slot] & VALID_BIT != 0
    }

    /// Number of real edges (1..=4 for built vectors).
    pub fn count(&self) -> usize {
        self.valid_mask().count_ones() as usize
    }

    /// Other endpoint stored in `slot`.
    pub fn other(&self, slot: usize) -> VertexId {
        self.words[slot] & OTHER_MASK
    }

    /// The 12-bit per-vector variable field.
    pub fn variable_field(&self) -> u16 {
        ((self.words[SLOTS - 1] >> VARIABLE_SHIFT) & VARIABLE_MASK) as u16
    }

    /// Stores the low 12 bits of `value` in the variable field.
    pub fn set_variable_field(&mut self, value: u16) {
        let word = &mut self.words[SLOTS - 1];
        *word &= !(VARIABLE_MASK << VARIABLE_SHIFT);
        *word |= (u64::from(value) & VARIABLE_MASK) << VARIABLE_SHIFT;
    }

    /// Valid `(slot, other)` pairs in slot order.
    pub fn valid_slots(&self) -> impl Iterator<Item = (usize, VertexId)> + '_ {
        (0..SLOTS)
            .filter(|&slot| self.is_valid(slot))
            .map(|slot| (slot, self.other(slot)))
    }
}

#[cfg(target_arch = "x86_64")]
mod avx2 {
    use std::arch::x86_64::*;

    use super::{SparseVector, SLICE_MASK, TOP_SLICE_MASK};

    #[target_feature(enable = "avx2")]
    pub(super) unsafe fn shared_vertex(vector: &SparseVector) -> u64 {
        // SAFETY: `SparseVector` is 32-byte aligned and exactly 256 bits wide.
        let words = unsafe { _mm256_load_si256(vector.words.as_ptr().cast::<__m256i>()) };
        let masks = _mm256_set_epi64x(
            TOP_SLICE_MASK as i64,
            SLICE_MASK as i64,
            SLICE_MASK as i64,
            SLICE_MASK as i64,
        );
        let slices = _mm256_and_si256(_mm256_srli_epi64::<48>(words), masks);
        let placed = _mm256_sllv_epi64(slices, _mm256_set_epi64x(45, 30, 15, 0));
        let folded = _mm_or_si128(
            _mm256_castsi256_si128(placed),
            _mm256_extracti128_si256::<1>(placed),
        );
        let total = _mm_or_si128(folded, _mm_unpackhi_epi64(folded, folded));
        _mm_cvtsi128_si64(total) as u64
    }

    #[target_feature(enable = "avx2")]
    pub(super) unsafe fn valid_mask(vector: &SparseVector) -> u8 {
        // SAFETY: `SparseVector` is 32-byte aligned and exactly 256 bits wide.
        let words = unsafe { _mm256_load_si256(vector.words.as_ptr().cast::<__m256i>()) };
        _mm256_movemask_pd(_mm256_castsi256_pd(words)) as u8
    }
}

/// One orientation of a [`VectorSparseGraph`].
#[derive(Clone, Debug, Default)]
pub struct VectorSparseIndex {
    counts: Vec<u64>,
    index: Vec<u64>,
    vectors: Vec<SparseVector>,
    data: Vec<DataLane>,
}

impl VectorSparseIndex {
    /// Vectors per vertex.
    pub fn counts(&self) -> &[u64] {
        &self.counts
    }

    /// Start offset per vertex, or [`NOT_PRESENT`] / [`PAST_END`].
    pub fn offsets(&self) -> &[u64] {
        &self.index
    }

    /// Packed topology lanes.
    pub fn vectors(&self) -> &[SparseVector] {
        &self.vectors
    }

    /// Packed payload lanes; empty for topology-only graphs.
    pub fn data(&self) -> &[DataLane] {
        &self.data
    }

    /// Mutable topology lanes, for writing per-vector variable fields.
    pub fn vectors_mut(&mut self) -> &mut [SparseVector] {
        &mut self.vectors
    }

    /// Vectors (and payload lanes, when weighted) of `vertex`.
    pub fn vectors_for(&self, vertex: VertexId) -> (&[SparseVector], &[DataLane]) {
        let v = vertex as usize;
        let (Some(&start), Some(&count)) = (self.index.get(v), self.counts.get(v)) else {
            return (&[], &[]);
        };
        if start == NOT_PRESENT || start == PAST_END {
            return (&[], &[]);
        }
        let range = start as usize..(start + count) as usize;
        let data = if self.data.is_empty() {
            &[][..]
        } else {
            &self.data[range.clone()]
        };
        (&self.vectors[range], data)
    }

    fn build(list_source: &super::vertex_index::VertexIndex, weighted: bool) -> Result<Self> {
        let n = list_source.num_vertices() as usize;
        let total = list_source.num_vectors() as usize;
        let mut vectors = Vec::new();
        vectors
            .try_reserve_exact(total)
            .map_err(|_| ConvertError::OutOfMemory {
                what: "vector-sparse vectors",
                requested: total,
            })?;
        let mut data = Vec::new();
        if weighted {
            data.try_reserve_exact(total)
                .map_err(|_| ConvertError::OutOfMemory {
                    what: "vector-sparse payload lanes",
                    requested: total,
                })?;
        }
        let mut counts = Vec::new();
        let mut index = Vec::new();
        for (buf, what) in [(&mut counts, "vector-sparse counts"), (&mut index, "vector-sparse index")] {
            buf.try_reserve_exact(n)
                .map_err(|_| ConvertError::OutOfMemory { what, requested: n })?;
        }

        let last_present = list_source.last_present();
        let mut cursor = 0u64;
        for (v, list) in list_source.iter() {
            if last_present.map_or(true, |last| v > last) {
                index.push(PAST_END);
                counts.push(0);
                continue;
            }
            if list.is_empty() {
                index.push(NOT_PRESENT);
                counts.push(0);
                continue;
            }
            index.push(cursor);
            let emitted = encode_list(v, list, &mut vectors, weighted.then_some(&mut data));
            counts.push(emitted);
            cursor += emitted;
        }
        debug_assert_eq!(cursor as usize, vectors.len());
        Ok(Self {
            counts,
            index,
            vectors,
            data,
        })
    }

    fn valid_slots(&self) -> u64 {
        self.vectors.iter().map(|v| v.count() as u64).sum()
    }
}

fn encode_list(
    shared: VertexId,
    list: &EdgeList,
    vectors: &mut Vec<SparseVector>,
    mut data: Option<&mut Vec<DataLane>>,
) -> u64 {
    let mut chunk = [IndexedEdge { other: 0, data: 0 }; SLOTS];
    let mut filled = 0usize;
    let mut emitted = 0u64;
    let mut flush = |chunk: &[IndexedEdge], emitted: &mut u64| {
        let (vector, lane) = SparseVector::encode(shared, chunk);
        vectors.push(vector);
        if let Some(data) = data.as_deref_mut() {
            data.push(lane);
        }
        *emitted += 1;
    };
    for edge in list.scan() {
        chunk[filled] = edge;
        filled += 1;
        if filled == SLOTS {
            flush(&chunk, &mut emitted);
            filled = 0;
        }
    }
    if filled > 0 {
        flush(&chunk[..filled], &mut emitted);
    }
    emitted
}

/// Immutable Vector-Sparse form of a [`MutableGraph`], both orientations.
#[derive(Clone, Debug)]
pub struct VectorSparseGraph {
    edge_data: EdgeDataKind,
    by_source: VectorSparseIndex,
    by_destination: VectorSparseIndex,
}

impl VectorSparseGraph {
    /// Encodes both orientations of `graph`. The source graph is left untouched.
    pub fn build(graph: &MutableGraph) -> Result<Self> {
        if graph.num_vertices() > MAX_VERTEX_ID + 1 {
            return Err(ConvertError::Config(format!(
                "{} vertices exceed the 48-bit vertex id range",
                graph.num_vertices()
            )));
        }
        let weighted = graph.edge_data().has_data();
        let mut built = Vec::with_capacity(2);
        for orientation in Orientation::ALL {
            let start = Instant::now();
            let index = VectorSparseIndex::build(graph.index(orientation), weighted)?;
            info!(
                orientation = %orientation,
                vectors = index.vectors.len(),
                vertices = index.counts.len(),
                duration_ms = start.elapsed().as_secs_f64() * 1_000.0,
                "vector_sparse.build.orientation"
            );
            built.push(index);
        }
        let by_destination = built.pop().unwrap_or_default();
        let by_source = built.pop().unwrap_or_default();
        Ok(Self {
            edge_data: graph.edge_data(),
            by_source,
            by_destination,
        })
    }

    /// Payload kind of the source graph.
    pub fn edge_data(&self) -> EdgeDataKind {
        self.edge_data
    }

    /// Encoded orientation.
    pub fn index(&self, orientation: Orientation) -> &VectorSparseIndex {
        match orientation {
            Orientation::BySource => &self.by_source,
            Orientation::ByDestination => &self.by_destination,
        }
    }

    /// Mutable access to one orientation.
    pub fn index_mut(&mut self, orientation: Orientation) -> &mut VectorSparseIndex {
        match orientation {
            Orientation::BySource => &mut self.by_source,
            Orientation::ByDestination => &mut self.by_destination,
        }
    }

    /// Vertex count (from the by-source orientation).
    pub fn num_vertices(&self) -> u64 {
        self.by_source.counts.len() as u64
    }

    /// Vector count of one orientation.
    pub fn num_vectors(&self, orientation: Orientation) -> u64 {
        self.index(orientation).vectors.len() as u64
    }

    /// Number of valid edge slots of one orientation.
    pub fn num_edges(&self, orientation: Orientation) -> u64 {
        self.index(orientation).valid_slots()
    }

    /// Vectors (and payload lanes) of `vertex` in `orientation`.
    pub fn vectors_for(
        &self,
        orientation: Orientation,
        vertex: VertexId,
    ) -> (&[SparseVector], &[DataLane]) {
        self.index(orientation).vectors_for(vertex)
    }

    /// Fraction of slots holding real edges, over both orientations.
    pub fn packing_efficiency(&self) -> f64 {
        let slots = (self.by_source.vectors.len() + self.by_destination.vectors.len()) * SLOTS;
        if slots == 0 {
            return 1.0;
        }
        let valid = self.by_source.valid_slots() + self.by_destination.valid_slots();
        valid as f64 / slots as f64
    }

    /// Decodes every valid slot of `orientation` into full edges, in vector order.
    pub fn edges(&self, orientation: Orientation) -> impl Iterator<Item = EdgeRecord> + '_ {
        let index = self.index(orientation);
        let is_destination = orientation.is_destination();
        index
            .vectors
            .iter()
            .enumerate()
            .flat_map(move |(pos, vector)| {
                let shared = vector.shared_vertex();
                let lane = index.data.get(pos).copied().unwrap_or_default();
                vector.valid_slots().map(move |(slot, other)| {
                    let data = lane.values[slot];
                    if is_destination {
                        EdgeRecord::with_data(other, shared, data)
                    } else {
                        EdgeRecord::with_data(shared, other, data)
                    }
                })
            })
    }
}

/// Logs a one-line summary of a finished build.
pub fn log_summary(graph: &VectorSparseGraph) {
    debug!(
        vertices = graph.num_vertices(),
        vectors_by_source = graph.num_vectors(Orientation::BySource),
        vectors_by_destination = graph.num_vectors(Orientation::ByDestination),
        packing_efficiency = graph.packing_efficiency(),
        "vector_sparse.build.summary"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graph_of(edges: &[(VertexId, VertexId, u64)], kind: EdgeDataKind) -> MutableGraph {
        let mut graph = MutableGraph::new(kind);
        for &(src, dst, data) in edges {
            graph
                .insert(&EdgeRecord::with_data(src, dst, data))
                .expect("insert");
        }
        graph
    }

    #[test]
    fn five_edges_of_one_source_pack_into_two_vectors() -> Result<()> {
        let edges = [(5, 1, 0), (5, 2, 0), (5, 3, 0), (5, 4, 0), (5, 7, 0)];
        let graph = graph_of(&edges, EdgeDataKind::None);
        let vs = VectorSparseGraph::build(&graph)?;
        let index = vs.index(Orientation::BySource);
        assert_eq!(index.counts()[5], 2);
        let (vectors, lanes) = vs.vectors_for(Orientation::BySource, 5);
        assert!(lanes.is_empty());
        assert_eq!(vectors.len(), 2);
        assert_eq!(vectors[0].count(), 4);
        assert_eq!(vectors[1].count(), 1);
        assert_eq!(vectors[0].shared_vertex(), 5);
        assert_eq!(vectors[1].shared_vertex(), 5);
        let first: Vec<_> = (0..4).map(|slot| vectors[0].other(slot)).collect();
        assert_eq!(first, vec![1, 2, 3, 4]);
        assert_eq!(vectors[1].other(0), 7);
        assert!(vectors[1].is_valid(0));
        for slot in 1..4 {
            assert!(!vectors[1].is_valid(slot));
        }
        assert_eq!(vectors[1].valid_mask(), 0b0001);
        Ok(())
    }

    #[test]
    fn sentinels_mark_absent_and_trailing_vertices() -> Result<()> {
        let mut graph = graph_of(&[(1, 3, 0), (3, 0, 0)], EdgeDataKind::None);
        graph.set_num_vertices(6)?;
        let vs = VectorSparseGraph::build(&graph)?;
        let by_src = vs.index(Orientation::BySource);
        assert_eq!(by_src.offsets(), &[NOT_PRESENT, 0, NOT_PRESENT, 1, PAST_END, PAST_END]);
        assert_eq!(by_src.counts(), &[0, 1, 0, 1, 0, 0]);
        let by_dst = vs.index(Orientation::ByDestination);
        assert_eq!(by_dst.offsets(), &[0, NOT_PRESENT, NOT_PRESENT, 1, PAST_END, PAST_END]);
        assert!(vs.vectors_for(Orientation::BySource, 4).0.is_empty());
        assert!(vs.vectors_for(Orientation::BySource, 99).0.is_empty());
        Ok(())
    }

    #[test]
    fn decoding_reproduces_each_orientation() -> Result<()> {
        let edges: Vec<(VertexId, VertexId, u64)> = (0..40u64)
            .map(|i| ((i * 7) % 11, (i * 3) % 13, i * 100 + 1))
            .collect();
        let graph = graph_of(&edges, EdgeDataKind::U64);
        let vs = VectorSparseGraph::build(&graph)?;
        for orientation in Orientation::ALL {
            let decoded: Vec<_> = vs.edges(orientation).collect();
            let expected: Vec<_> = graph.edges(orientation).collect();
            assert_eq!(decoded, expected, "orientation {orientation}");
            assert_eq!(vs.num_edges(orientation), graph.num_edges());
            assert_eq!(vs.num_vectors(orientation), graph.num_vectors(orientation));
        }
        Ok(())
    }

    #[test]
    fn variable_field_round_trips_without_disturbing_ids() {
        let edges = [
            IndexedEdge { other: OTHER_MASK, data: 1 },
            IndexedEdge { other: 17, data: 2 },
            IndexedEdge { other: 0, data: 3 },
        ];
        let shared = MAX_VERTEX_ID;
        let (mut vector, lane) = SparseVector::encode(shared, &edges);
        assert_eq!(lane.values(), &[1, 2, 3, 0]);
        for value in [0u16, 1, 0x800, MAX_VARIABLE_FIELD] {
            vector.set_variable_field(value);
            assert_eq!(vector.variable_field(), value);
            assert_eq!(vector.shared_vertex(), shared);
            assert_eq!(vector.other(0), OTHER_MASK);
            assert_eq!(vector.valid_mask(), 0b0111);
        }
        vector.set_variable_field(0xffff);
        assert_eq!(vector.variable_field(), MAX_VARIABLE_FIELD);
    }

    #[test]
    fn tagging_vectors_in_place_keeps_decoded_edges() -> Result<()> {
        let graph = graph_of(&[(0, 1, 0), (0, 2, 0), (3, 0, 0)], EdgeDataKind::None);
        let mut vs = VectorSparseGraph::build(&graph)?;
        let before: Vec<_> = vs.edges(Orientation::ByDestination).collect();
        for (i, vector) in vs
            .index_mut(Orientation::ByDestination)
            .vectors_mut()
            .iter_mut()
            .enumerate()
        {
            vector.set_variable_field(i as u16 + 1);
        }
        let tags: Vec<u16> = vs
            .index(Orientation::ByDestination)
            .vectors()
            .iter()
            .map(SparseVector::variable_field)
            .collect();
        assert_eq!(tags, vec![1, 2, 3]);
        assert_eq!(vs.edges(Orientation::ByDestination).collect::<Vec<_>>(), before);
        Ok(())
    }

    #[test]
    fn simd_and_scalar_decoders_agree() {
        for shared in [0u64, 1, 0x7fff, 0x8000, 0x1234_5678_9abc, MAX_VERTEX_ID] {
            for len in 1..=4usize {
                let edges: Vec<_> = (0..len as u64)
                    .map(|i| IndexedEdge { other: i * 31, data: 0 })
                    .collect();
                let (vector, _) = SparseVector::encode(shared, &edges);
                assert_eq!(vector.shared_vertex(), vector.shared_vertex_scalar());
                assert_eq!(vector.shared_vertex(), shared);
                assert_eq!(vector.valid_mask(), vector.valid_mask_scalar());
                assert_eq!(vector.count(), len);
            }
        }
    }

    #[test]
    fn word_layout_matches_bit_positions() {
        let shared = 0b101u64 << 45 | 0x1111 << 30 | 0x2222 << 15 | 0x3333;
        let (vector, _) = SparseVector::encode(shared, &[IndexedEdge { other: 9, data: 0 }]);
        let w = vector.words();
        assert_eq!(w[0], VALID_BIT | (0x3333 << 48) | 9);
        assert_eq!(w[1], 0x2222 << 48);
        assert_eq!(w[2], 0x1111 << 48);
        assert_eq!(w[3], 0b101 << 48);
    }

    #[test]
    fn vectors_are_aligned_for_256_bit_loads() {
        assert_eq!(std::mem::align_of::<SparseVector>(), 32);
        assert_eq!(std::mem::size_of::<SparseVector>(), 32);
        assert_eq!(std::mem::align_of::<DataLane>(), 32);
    }

    #[test]
    fn packing_efficiency_counts_valid_slots() -> Result<()> {
        let graph = graph_of(&[(0, 1, 0), (0, 2, 0)], EdgeDataKind::None);
        let vs = VectorSparseGraph::build(&graph)?;
        assert_eq!(vs.num_vectors(Orientation::BySource), 1);
        assert_eq!(vs.num_vectors(Orientation::ByDestination), 2);
        assert!((vs.packing_efficiency() - 4.0 / 12.0).abs() < 1e-9);
        Ok(())
    }
}
