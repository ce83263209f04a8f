use std::thread;
use std::time::Instant;

use tracing::{debug, info, warn};

use crate::formats::EdgeWriter;
use crate::types::{EdgeDataKind, Result};

use super::{joined, DoubleBuffer, EdgeSource, Placement, PipelineOptions};

/// Outcome of one write run.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct WriteStats {
    /// Records handed to the writer, summed over passes.
    pub records: u64,
    /// Non-empty buffers handed to the writer, summed over passes.
    pub buffers: u64,
    /// Passes the writer requested.
    pub passes: usize,
}

/// Drains `source` into `writer` once per pass the writer requests.
///
/// The producer walks the source into one buffer while a single consumer
/// hands the other buffer to the writer. The first writer error asks the
/// producer to stop; both sides leave on the first empty buffer it publishes
/// and the error is returned.
pub fn write_from_source(
    source: &mut dyn EdgeSource,
    writer: &mut dyn EdgeWriter,
    grouped_by_destination: bool,
    edge_data: EdgeDataKind,
    options: &PipelineOptions,
) -> Result<WriteStats> {
    let start = Instant::now();
    let placement = Placement::for_options(options);
    let mut shared = DoubleBuffer::new(options.record_capacity(edge_data), 2)?;
    let mut stats = WriteStats {
        passes: writer.passes(),
        ..WriteStats::default()
    };
    for pass in 0..stats.passes {
        source.rewind();
        shared.reset();
        let (records, buffers) = run_pass(
            &shared,
            &placement,
            &mut *source,
            &mut *writer,
            grouped_by_destination,
            pass,
        )?;
        debug!(pass, records, buffers, "pipeline.write.pass");
        stats.records += records;
        stats.buffers += buffers;
    }
    info!(
        records = stats.records,
        buffers = stats.buffers,
        passes = stats.passes,
        grouped_by_destination,
        duration_ms = start.elapsed().as_secs_f64() * 1_000.0,
        "pipeline.write.complete"
    );
    Ok(stats)
}

fn run_pass(
    shared: &DoubleBuffer,
    placement: &Placement,
    source: &mut dyn EdgeSource,
    writer: &mut dyn EdgeWriter,
    grouped_by_destination: bool,
    pass: usize,
) -> Result<(u64, u64)> {
    thread::scope(|scope| {
        let producer = scope.spawn(move || {
            placement.pin(0);
            produce(shared, source)
        });
        let consumer = scope.spawn(move || {
            placement.pin(1);
            consume(shared, writer, grouped_by_destination, pass)
        });
        joined(producer.join(), "producer")?;
        joined(consumer.join(), "consumer")?
    })
}

fn produce(shared: &DoubleBuffer, source: &mut dyn EdgeSource) {
    let mut cur = 0usize;
    loop {
        let count = {
            let mut buf = shared.fill(cur);
            if shared.stopped() {
                0
            } else {
                source.fill(&mut buf)
            }
        };
        shared.publish(cur, count);
        shared.wait();
        if shared.finished(cur) {
            break;
        }
        cur ^= 1;
    }
}

fn consume(
    shared: &DoubleBuffer,
    writer: &mut dyn EdgeWriter,
    grouped_by_destination: bool,
    pass: usize,
) -> Result<(u64, u64)> {
    let (mut records, mut buffers) = (0u64, 0u64);
    let mut cur = 0usize;
    let mut failure = None;
    loop {
        shared.wait();
        if shared.finished(cur) {
            break;
        }
        if failure.is_some() {
            // Drop whatever the producer filled before it saw the stop flag.
            cur ^= 1;
            continue;
        }
        let count = shared.count(cur);
        let buf = shared.drain(cur);
        match writer.write_edges(&buf[..count], grouped_by_destination, pass) {
            Ok(()) => {
                records += count as u64;
                buffers += 1;
            }
            Err(err) => {
                warn!(error = %err, pass, buffer = cur, "pipeline.write.stop");
                shared.request_stop();
                failure = Some(err);
            }
        }
        drop(buf);
        cur ^= 1;
    }
    match failure {
        Some(err) => Err(err),
        None => Ok((records, buffers)),
    }
}
