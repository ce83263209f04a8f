#![allow(unsafe_code)]

use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::primitives::concurrency::{RefreshScratch, ThreadGroup};
use crate::types::{ConvertError, EdgeRecord, Result, VertexId};

use super::edge_list::EdgeList;

static EMPTY_LIST: EdgeList = EdgeList::new();

/// One vertex slot. Holds the vertex's edge list once it has at least one edge.
#[derive(Default)]
pub(crate) struct Slot(UnsafeCell<Option<Box<EdgeList>>>);

impl Slot {
    pub(crate) fn get_mut(&mut self) -> Option<&mut EdgeList> {
        self.0.get_mut().as_deref_mut()
    }

    fn take(&mut self) -> Option<Box<EdgeList>> {
        self.0.get_mut().take()
    }
}

/// Dense array of per-vertex edge lists keyed by the indexed vertex id.
///
/// Aggregate counters (`num_edges`, `num_vectors`, `num_vertices_present`) are
/// kept exact by the serial mutators. The `fast_insert_*` family skips them;
/// [`VertexIndex::parallel_refresh_metadata`] restores them afterwards.
pub struct VertexIndex {
    slots: Vec<Slot>,
    num_edges: AtomicU64,
    num_vectors: AtomicU64,
    num_vertices_present: AtomicU64,
}

// SAFETY: shared access to a slot's contents only mutates through the unsafe
// `fast_insert_*` methods, whose contract forbids any concurrent access to the
// same slot. Every other mutation requires `&mut self`.
unsafe impl Sync for VertexIndex {}

impl Default for VertexIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl VertexIndex {
    /// Creates an empty index with no slots.
    pub fn new() -> Self {
        Self::with_num_vertices(0)
    }

    /// Creates an index with `n` empty slots.
    pub fn with_num_vertices(n: usize) -> Self {
        let mut slots = Vec::with_capacity(n);
        slots.resize_with(n, Slot::default);
        Self {
            slots,
            num_edges: AtomicU64::new(0),
            num_vectors: AtomicU64::new(0),
            num_vertices_present: AtomicU64::new(0),
        }
    }

    /// Like [`VertexIndex::with_num_vertices`] but reports allocation failure instead of aborting.
    pub fn try_with_num_vertices(n: usize) -> Result<Self> {
        let mut index = Self::new();
        index.try_reserve(n)?;
        index.slots.resize_with(n, Slot::default);
        Ok(index)
    }

    /// Number of slots (the vertex count of this orientation).
    pub fn num_vertices(&self) -> u64 {
        self.slots.len() as u64
    }

    /// Total number of indexed edges.
    pub fn num_edges(&self) -> u64 {
        self.num_edges.load(Ordering::Relaxed)
    }

    /// Total number of Vector-Sparse vectors over all lists.
    pub fn num_vectors(&self) -> u64 {
        self.num_vectors.load(Ordering::Relaxed)
    }

    /// Number of slots holding a non-empty list.
    pub fn num_vertices_present(&self) -> u64 {
        self.num_vertices_present.load(Ordering::Relaxed)
    }

    /// Resizes the slot array. Shrinking destroys the lists of removed slots.
    pub fn set_num_vertices(&mut self, n: usize) -> Result<()> {
        if n < self.slots.len() {
            let mut dropped = [0u64; 3];
            for mut slot in self.slots.drain(n..) {
                if let Some(list) = slot.take() {
                    dropped[0] += list.degree();
                    dropped[1] += list.num_vectors();
                    dropped[2] += 1;
                }
            }
            *self.num_edges.get_mut() -= dropped[0];
            *self.num_vectors.get_mut() -= dropped[1];
            *self.num_vertices_present.get_mut() -= dropped[2];
            self.slots.shrink_to_fit();
        } else {
            self.try_reserve(n - self.slots.len())?;
            self.slots.resize_with(n, Slot::default);
        }
        Ok(())
    }

    /// Edge list of `vertex`, if it has one.
    pub fn edge_list(&self, vertex: VertexId) -> Option<&EdgeList> {
        let slot = self.slots.get(vertex as usize)?;
        // SAFETY: concurrent writers to this slot are excluded by the
        // `fast_insert_*` contract.
        unsafe { (*slot.0.get()).as_deref() }
    }

    /// Mutable edge list of `vertex`, if it has one.
    pub fn edge_list_mut(&mut self, vertex: VertexId) -> Option<&mut EdgeList> {
        self.slots.get_mut(vertex as usize)?.get_mut()
    }

    /// Number of edges indexed at `vertex`.
    pub fn degree(&self, vertex: VertexId) -> u64 {
        self.edge_list(vertex).map_or(0, EdgeList::degree)
    }

    /// Iterates slots in id order; absent slots surface as empty lists.
    pub fn iter(&self) -> impl Iterator<Item = (VertexId, &EdgeList)> + '_ {
        (0..self.slots.len()).map(move |v| {
            let v = v as VertexId;
            (v, self.edge_list(v).unwrap_or(&EMPTY_LIST))
        })
    }

    /// Largest vertex id holding a non-empty list.
    pub fn last_present(&self) -> Option<VertexId> {
        (0..self.slots.len() as VertexId)
            .rev()
            .find(|&v| self.edge_list(v).is_some())
    }

    /// Appends `edge` to the list at its destination without touching the counters.
    ///
    /// # Safety
    ///
    /// No other thread may read or write the slot at `edge.dst` while this call
    /// runs. Concurrent callers must confine themselves to disjoint destination ids.
    ///
    /// # Panics
    ///
    /// Panics if `edge.dst` is not below [`VertexIndex::num_vertices`].
    pub unsafe fn fast_insert_by_destination(&self, edge: &EdgeRecord, carry_data: bool) {
        // SAFETY: forwarded from the caller's contract.
        unsafe { self.fast_insert_at(edge.dst, edge, false, carry_data) }
    }

    /// Appends `edge` to the list at its source without touching the counters.
    ///
    /// # Safety
    ///
    /// No other thread may read or write the slot at `edge.src` while this call
    /// runs. Concurrent callers must confine themselves to disjoint source ids.
    ///
    /// # Panics
    ///
    /// Panics if `edge.src` is not below [`VertexIndex::num_vertices`].
    pub unsafe fn fast_insert_by_source(&self, edge: &EdgeRecord, carry_data: bool) {
        // SAFETY: forwarded from the caller's contract.
        unsafe { self.fast_insert_at(edge.src, edge, true, carry_data) }
    }

    unsafe fn fast_insert_at(
        &self,
        indexed: VertexId,
        edge: &EdgeRecord,
        destination_is_other: bool,
        carry_data: bool,
    ) {
        let slot = &self.slots[indexed as usize];
        // SAFETY: the caller guarantees exclusive access to this slot.
        let cell = unsafe { &mut *slot.0.get() };
        cell.get_or_insert_with(Box::default)
            .insert_from_edge(edge, destination_is_other, carry_data);
    }

    /// Serial insert at the destination; grows the slot array and keeps counters exact.
    pub fn insert_by_destination(&mut self, edge: &EdgeRecord, carry_data: bool) -> Result<()> {
        self.insert_at(edge.dst, edge, false, carry_data)
    }

    /// Serial insert at the source; grows the slot array and keeps counters exact.
    pub fn insert_by_source(&mut self, edge: &EdgeRecord, carry_data: bool) -> Result<()> {
        self.insert_at(edge.src, edge, true, carry_data)
    }

    fn insert_at(
        &mut self,
        indexed: VertexId,
        edge: &EdgeRecord,
        destination_is_other: bool,
        carry_data: bool,
    ) -> Result<()> {
        let needed = indexed as usize + 1;
        if needed > self.slots.len() {
            self.set_num_vertices(needed)?;
        }
        let cell = self.slots[indexed as usize].0.get_mut();
        if cell.is_none() {
            *self.num_vertices_present.get_mut() += 1;
        }
        let list = cell.get_or_insert_with(Box::default);
        let before = list.num_vectors();
        list.insert_from_edge(edge, destination_is_other, carry_data);
        *self.num_vectors.get_mut() += list.num_vectors() - before;
        *self.num_edges.get_mut() += 1;
        Ok(())
    }

    /// Removes every `indexed -> other` entry; deletes the list once it is empty.
    /// Returns the number of entries removed.
    pub fn remove_edge(&mut self, indexed: VertexId, other: VertexId) -> u64 {
        let Some(slot) = self.slots.get_mut(indexed as usize) else {
            return 0;
        };
        let Some(list) = slot.get_mut() else {
            return 0;
        };
        let before = list.num_vectors();
        let removed = list.remove(other);
        let vectors_dropped = before - list.num_vectors();
        let emptied = list.is_empty();
        if emptied {
            slot.take();
            *self.num_vertices_present.get_mut() -= 1;
        }
        *self.num_edges.get_mut() -= removed;
        *self.num_vectors.get_mut() -= vectors_dropped;
        removed
    }

    /// Drops the list at `indexed` and returns it. Other indices are not touched.
    pub fn remove_vertex(&mut self, indexed: VertexId) -> Option<Box<EdgeList>> {
        let list = self.slots.get_mut(indexed as usize)?.take()?;
        *self.num_edges.get_mut() -= list.degree();
        *self.num_vectors.get_mut() -= list.num_vectors();
        *self.num_vertices_present.get_mut() -= 1;
        Some(list)
    }

    /// Recomputes the aggregate counters from every member of a parallel region.
    ///
    /// Each member sums a strided stripe of slots into its scratch cells at
    /// `scratch_base + local_id`, all members meet at the region barrier, and
    /// the leader reduces the partial sums into the counters. A second barrier
    /// publishes the result to every member before returning.
    ///
    /// `scratch` must provide at least `scratch_base + local_count` cells, and
    /// no `fast_insert_*` may run concurrently.
    pub fn parallel_refresh_metadata(
        &self,
        group: &ThreadGroup<'_>,
        scratch: &RefreshScratch,
        scratch_base: usize,
    ) {
        debug_assert!(scratch.capacity() >= scratch_base + group.local_count());
        let mut partial = [0u64; 3];
        for v in group.stripe(self.slots.len()) {
            if let Some(list) = self.edge_list(v as VertexId) {
                partial[0] += list.degree();
                partial[1] += list.num_vectors();
                partial[2] += u64::from(!list.is_empty());
            }
        }
        scratch.publish(scratch_base + group.local_id(), partial);
        group.wait();
        if group.is_leader() {
            let totals = scratch.sum(scratch_base..scratch_base + group.local_count());
            self.num_edges.store(totals[0], Ordering::Relaxed);
            self.num_vectors.store(totals[1], Ordering::Relaxed);
            self.num_vertices_present.store(totals[2], Ordering::Relaxed);
        }
        group.wait();
    }

    /// Recounts edges, vectors and present vertices from the lists themselves.
    pub fn recount(&self) -> (u64, u64, u64) {
        self.iter()
            .filter(|(_, list)| !list.is_empty())
            .fold((0, 0, 0), |(edges, vectors, present), (_, list)| {
                (edges + list.degree(), vectors + list.num_vectors(), present + 1)
            })
    }

    pub(crate) fn slots_mut(&mut self) -> &mut [Slot] {
        &mut self.slots
    }

    fn try_reserve(&mut self, additional: usize) -> Result<()> {
        self.slots
            .try_reserve(additional)
            .map_err(|_| ConvertError::OutOfMemory {
                what: "vertex index slots",
                requested: self.slots.len() + additional,
            })
    }
}
