#![allow(unsafe_code)]

use std::sync::Barrier;
use std::thread;
use std::time::Instant;

use tracing::{debug, info, warn};

use crate::formats::EdgeReader;
use crate::primitives::concurrency::ThreadGroup;
use crate::storage::{MutableGraph, Orientation};
use crate::types::{ConvertError, EdgeRecord, Result, VertexId, MAX_VERTEX_ID};

use super::{joined, DoubleBuffer, Placement, PipelineOptions};

// Different multipliers per side so one hot vertex does not pin both of its
// indices to the same consumer.
const SOURCE_MIX: u64 = 0x9E37_79B9_7F4A_7C15;
const DESTINATION_MIX: u64 = 0xC2B2_AE3D_27D4_EB4F;

fn owner(vertex: VertexId, mix: u64, consumers: usize) -> usize {
    ((vertex.wrapping_mul(mix) >> 32) % consumers as u64) as usize
}

/// Outcome of one ingestion run.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ReadStats {
    /// Records inserted into the graph.
    pub records: u64,
    /// Malformed or out-of-range records dropped.
    pub skipped: u64,
    /// Non-empty buffers handed to the consumers.
    pub buffers: u64,
    /// Size of the consumer group.
    pub consumers: usize,
}

#[derive(Default)]
struct Produced {
    records: u64,
    skipped: u64,
    buffers: u64,
}

/// Streams every record of `reader` into `graph`.
///
/// The graph is first grown to the reader's announced vertex count; records
/// naming a vertex outside that range are dropped and counted. Consumers
/// insert with the unlocked fast path, each owning the slots whose vertex
/// hashes to it, and refresh the graph counters together once the stream
/// ends.
pub fn read_into_graph(
    reader: &mut dyn EdgeReader,
    graph: &mut MutableGraph,
    options: &PipelineOptions,
) -> Result<ReadStats> {
    let start = Instant::now();
    let header = reader.header();
    if header.num_vertices > MAX_VERTEX_ID + 1 {
        return Err(ConvertError::Config(format!(
            "input announces {} vertices, beyond the 48-bit id range",
            header.num_vertices
        )));
    }
    if header.num_vertices > graph.num_vertices() {
        graph.set_num_vertices(header.num_vertices as usize)?;
    }
    let limit = graph.num_vertices();

    let placement = Placement::for_options(options);
    let consumers = options
        .read_threads
        .unwrap_or_else(|| placement.threads().saturating_sub(1))
        .max(1);
    let shared = DoubleBuffer::new(options.record_capacity(graph.edge_data()), consumers + 1)?;
    let region = Barrier::new(consumers);
    let scratch = MutableGraph::refresh_scratch(consumers);
    debug!(
        consumers,
        capacity = options.record_capacity(graph.edge_data()),
        vertices = limit,
        "pipeline.read.start"
    );

    let view: &MutableGraph = graph;
    let produced = thread::scope(|scope| -> Result<Result<Produced>> {
        let mut handles = Vec::with_capacity(consumers);
        for local_id in 0..consumers {
            let (shared, region, scratch, placement) = (&shared, &region, &scratch, &placement);
            handles.push(scope.spawn(move || {
                placement.pin(local_id + 1);
                let group = ThreadGroup::new(local_id, consumers, region);
                consume(shared, view, &group);
                view.parallel_refresh_metadata(&group, scratch);
            }));
        }
        let (shared_ref, placement_ref) = (&shared, &placement);
        let source: &mut dyn EdgeReader = &mut *reader;
        let producer = scope.spawn(move || {
            placement_ref.pin(0);
            produce(shared_ref, source, limit)
        });
        let produced = joined(producer.join(), "producer")?;
        for handle in handles {
            joined(handle.join(), "consumer")?;
        }
        Ok(produced)
    })??;

    let stats = ReadStats {
        records: produced.records,
        skipped: produced.skipped + reader.skipped(),
        buffers: produced.buffers,
        consumers,
    };
    info!(
        records = stats.records,
        skipped = stats.skipped,
        buffers = stats.buffers,
        consumers,
        edges = graph.num_edges(),
        duration_ms = start.elapsed().as_secs_f64() * 1_000.0,
        "pipeline.read.complete"
    );
    Ok(stats)
}

fn produce(shared: &DoubleBuffer, reader: &mut dyn EdgeReader, limit: u64) -> Result<Produced> {
    let mut produced = Produced::default();
    let mut failure = None;
    let mut cur = 0usize;
    loop {
        let count = {
            let mut buf = shared.fill(cur);
            match fill_in_range(reader, &mut buf, limit, &mut produced.skipped) {
                Ok(count) => count,
                Err(err) => {
                    warn!(error = %err, "pipeline.read.stop");
                    shared.request_stop();
                    failure = Some(err);
                    0
                }
            }
        };
        shared.publish(cur, count);
        if count > 0 {
            produced.records += count as u64;
            produced.buffers += 1;
        }
        debug!(buffer = cur, count, "pipeline.read.buffer");
        shared.wait();
        if shared.finished(cur) {
            break;
        }
        cur ^= 1;
    }
    match failure {
        Some(err) => Err(err),
        None => Ok(produced),
    }
}

/// Reads until at least one in-range record is available or the stream ends,
/// compacting in-range records to the front of `buf`.
fn fill_in_range(
    reader: &mut dyn EdgeReader,
    buf: &mut [EdgeRecord],
    limit: u64,
    skipped: &mut u64,
) -> Result<usize> {
    loop {
        let read = reader.read_edges(buf)?;
        if read == 0 {
            return Ok(0);
        }
        let mut kept = 0usize;
        for idx in 0..read {
            let edge = buf[idx];
            if edge.src < limit && edge.dst < limit {
                buf[kept] = edge;
                kept += 1;
            } else {
                *skipped += 1;
            }
        }
        if kept > 0 {
            return Ok(kept);
        }
    }
}

fn consume(shared: &DoubleBuffer, graph: &MutableGraph, group: &ThreadGroup<'_>) {
    let (me, members) = (group.local_id(), group.local_count());
    let mut cur = 0usize;
    loop {
        shared.wait();
        if shared.finished(cur) {
            break;
        }
        let count = shared.count(cur);
        let buf = shared.drain(cur);
        for edge in &buf[..count] {
            if owner(edge.src, SOURCE_MIX, members) == me {
                // SAFETY: by-source slot `edge.src` is owned by this member
                // alone, and the producer only publishes in-range ids.
                unsafe { graph.fast_insert_oriented(Orientation::BySource, edge) };
            }
            if owner(edge.dst, DESTINATION_MIX, members) == me {
                // SAFETY: as above, for by-destination slot `edge.dst`.
                unsafe { graph.fast_insert_oriented(Orientation::ByDestination, edge) };
            }
        }
        drop(buf);
        cur ^= 1;
    }
}
