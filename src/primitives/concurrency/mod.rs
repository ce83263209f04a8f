//! Thread-group coordination for the parallel phases.
//!
//! A parallel region is a fixed set of threads that share one local
//! [`Barrier`]. Each member knows its `local_id` within the region and the
//! region size; region-wide operations (such as metadata refresh) are invoked
//! by every member with its own [`ThreadGroup`] handle.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Barrier;

mod numa;

pub use numa::{pin_current_thread, NumaTopology};

/// A member's view of the parallel region it belongs to.
#[derive(Clone, Copy)]
pub struct ThreadGroup<'a> {
    local_id: usize,
    local_count: usize,
    barrier: &'a Barrier,
}

impl<'a> ThreadGroup<'a> {
    /// Creates a member handle. `barrier` must have been built for exactly `local_count` threads.
    pub fn new(local_id: usize, local_count: usize, barrier: &'a Barrier) -> Self {
        debug_assert!(local_id < local_count);
        Self {
            local_id,
            local_count,
            barrier,
        }
    }

    /// Identifier of this member within the region, `0..local_count`.
    pub fn local_id(&self) -> usize {
        self.local_id
    }

    /// Number of members in the region.
    pub fn local_count(&self) -> usize {
        self.local_count
    }

    /// Returns true for the member that performs region-wide reductions.
    pub fn is_leader(&self) -> bool {
        self.local_id == 0
    }

    /// Blocks until every member of the region reaches the barrier.
    pub fn wait(&self) {
        self.barrier.wait();
    }

    /// Slot ids `local_id, local_id + local_count, ...` below `len`.
    pub fn stripe(&self, len: usize) -> impl Iterator<Item = usize> {
        (self.local_id..len).step_by(self.local_count.max(1))
    }
}

/// Number of partial sums a metadata refresh publishes per thread.
pub const REFRESH_CELLS: usize = 3;

#[repr(align(64))]
#[derive(Default)]
struct ScratchLine([AtomicU64; REFRESH_CELLS]);

/// Per-thread partial-sum cells used by metadata refresh.
///
/// Each participating thread owns one cache line of three cells, and an
/// orientation refresh needs one block of lines per region member.
pub struct RefreshScratch {
    lines: Vec<ScratchLine>,
}

impl RefreshScratch {
    /// Allocates scratch for `blocks` independent refreshes of `threads` members each.
    pub fn new(threads: usize, blocks: usize) -> Self {
        let mut lines = Vec::with_capacity(threads * blocks);
        lines.resize_with(threads * blocks, ScratchLine::default);
        Self { lines }
    }

    /// Total number of thread slots available.
    pub fn capacity(&self) -> usize {
        self.lines.len()
    }

    pub(crate) fn publish(&self, slot: usize, values: [u64; REFRESH_CELLS]) {
        let line = &self.lines[slot].0;
        for (cell, value) in line.iter().zip(values) {
            cell.store(value, Ordering::Relaxed);
        }
    }

    pub(crate) fn sum(&self, slots: std::ops::Range<usize>) -> [u64; REFRESH_CELLS] {
        let mut totals = [0u64; REFRESH_CELLS];
        for line in &self.lines[slots] {
            for (total, cell) in totals.iter_mut().zip(line.0.iter()) {
                *total += cell.load(Ordering::Relaxed);
            }
        }
        totals
    }
}

/// Runs `f` on `threads` scoped threads forming one parallel region.
pub fn run_region<F>(threads: usize, f: F)
where
    F: Fn(ThreadGroup<'_>) + Sync,
{
    let threads = threads.max(1);
    let barrier = Barrier::new(threads);
    std::thread::scope(|scope| {
        for local_id in 0..threads {
            let barrier = &barrier;
            let f = &f;
            scope.spawn(move || f(ThreadGroup::new(local_id, threads, barrier)));
        }
    });
}
