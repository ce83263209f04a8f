//! Double-buffered producer/consumer engine that moves edges between files and graphs.
//!
//! One producer fills buffer `cur` while the consumer group drains the other
//! buffer. Every participant meets at one barrier per cycle; after it, the
//! roles of the two buffers swap. A published count of zero ends the stream,
//! and the `stop` flag ends it early after an I/O failure. Both sides enter
//! the barrier on every cycle, so a failure on either side can never strand
//! the other.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Barrier;

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use serde::{Deserialize, Serialize};

use crate::primitives::concurrency::{pin_current_thread, NumaTopology};
use crate::types::{ConvertError, EdgeDataKind, EdgeRecord, Result};

mod read;
mod source;
mod write;

pub use read::{read_into_graph, ReadStats};
pub use source::{EdgeSource, GraphCursor, VectorSparseCursor};
pub use write::{write_from_source, WriteStats};

/// Default size of each of the two pipeline buffers.
pub const DEFAULT_BUFFER_BYTES: usize = 64 << 20;

/// Tuning knobs for the pipeline.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineOptions {
    /// Bytes per buffer; the record capacity is this divided by the record width.
    pub buffer_bytes: usize,
    /// Read consumer count. `None` uses every other logical core of the node.
    pub read_threads: Option<usize>,
    /// NUMA node whose cores run the pipeline.
    pub numa_node: usize,
    /// Pin pipeline threads to the node's cores.
    pub pin_threads: bool,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            buffer_bytes: DEFAULT_BUFFER_BYTES,
            read_threads: None,
            numa_node: 0,
            pin_threads: true,
        }
    }
}

impl PipelineOptions {
    /// Records per buffer for `kind`, at least one.
    pub fn record_capacity(&self, kind: EdgeDataKind) -> usize {
        (self.buffer_bytes / kind.record_size()).max(1)
    }
}

/// Cores a pipeline run is placed on.
#[derive(Clone, Debug)]
pub(crate) struct Placement {
    cpus: Vec<usize>,
    pin: bool,
}

impl Placement {
    pub(crate) fn for_options(options: &PipelineOptions) -> Self {
        let topology = NumaTopology::detect();
        Self {
            cpus: topology.cpus(options.numa_node).to_vec(),
            pin: options.pin_threads,
        }
    }

    /// Logical threads available on the chosen node.
    pub(crate) fn threads(&self) -> usize {
        self.cpus.len().max(1)
    }

    /// Pins the calling thread as pipeline member `member`; the producer is member 0.
    pub(crate) fn pin(&self, member: usize) {
        if self.pin && !self.cpus.is_empty() {
            pin_current_thread(self.cpus[member % self.cpus.len()]);
        }
    }
}

/// The two record buffers, their published counts and the cycle barrier.
pub(crate) struct DoubleBuffer {
    buffers: [RwLock<Vec<EdgeRecord>>; 2],
    counts: [AtomicUsize; 2],
    stop: AtomicBool,
    barrier: Barrier,
}

fn allocate(capacity: usize) -> Result<Vec<EdgeRecord>> {
    let mut buffer = Vec::new();
    buffer
        .try_reserve_exact(capacity)
        .map_err(|_| ConvertError::OutOfMemory {
            what: "pipeline buffer",
            requested: capacity,
        })?;
    buffer.resize(capacity, EdgeRecord::default());
    Ok(buffer)
}

impl DoubleBuffer {
    /// Allocates both buffers for `participants` threads (producer included).
    pub(crate) fn new(capacity: usize, participants: usize) -> Result<Self> {
        Ok(Self {
            buffers: [RwLock::new(allocate(capacity)?), RwLock::new(allocate(capacity)?)],
            counts: [AtomicUsize::new(0), AtomicUsize::new(0)],
            stop: AtomicBool::new(false),
            barrier: Barrier::new(participants),
        })
    }

    /// Clears the counts and the stop flag for another run over the same buffers.
    pub(crate) fn reset(&mut self) {
        self.counts = [AtomicUsize::new(0), AtomicUsize::new(0)];
        self.stop = AtomicBool::new(false);
    }

    pub(crate) fn fill(&self, cur: usize) -> RwLockWriteGuard<'_, Vec<EdgeRecord>> {
        self.buffers[cur].write()
    }

    pub(crate) fn drain(&self, cur: usize) -> RwLockReadGuard<'_, Vec<EdgeRecord>> {
        self.buffers[cur].read()
    }

    pub(crate) fn publish(&self, cur: usize, count: usize) {
        self.counts[cur].store(count, Ordering::Release);
    }

    pub(crate) fn count(&self, cur: usize) -> usize {
        self.counts[cur].load(Ordering::Acquire)
    }

    pub(crate) fn request_stop(&self) {
        self.stop.store(true, Ordering::Release);
    }

    pub(crate) fn stopped(&self) -> bool {
        self.stop.load(Ordering::Acquire)
    }

    /// Cycle barrier shared by the producer and every consumer.
    pub(crate) fn wait(&self) {
        self.barrier.wait();
    }

    /// True when the cycle that published `cur` ends the run.
    ///
    /// Only the published count decides this. The stop flag can flip while a
    /// consumer is mid-buffer; the producer answers it by publishing an
    /// empty buffer on the next cycle.
    pub(crate) fn finished(&self, cur: usize) -> bool {
        self.count(cur) == 0
    }
}

pub(crate) fn joined<T>(result: std::thread::Result<T>, role: &str) -> Result<T> {
    result.map_err(|_| ConvertError::PipelineStopped(format!("{role} thread panicked")))
}
