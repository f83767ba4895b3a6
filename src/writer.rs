//! Buffered, chunked persistence of computed edges.
//!
//! `EdgeSink` is the contract between the evaluation loop and storage. Each
//! worker owns a disjoint output region, so flushes need no cross-worker
//! coordination; the only collective step is `finalize`, which fixes the
//! true per-region record counts once every worker is done.
//!
//! ## Sinks
//!
//! - [`MemorySink`] (here): per-worker in-memory regions. The reference
//!   implementation — use it for tests and embedding.
//! - [`SegmentSink`](crate::readwrite::SegmentSink): per-worker fixed-width
//!   segment files plus a JSON manifest.

use parking_lot::Mutex;
use tracing::{debug, info};

use crate::model::EdgeRecord;
use crate::{Error, Result};

// ============================================================================
// EdgeSink
// ============================================================================

/// Chunked, concurrently writable edge storage.
///
/// Ownership discipline: region `rank` is written only by worker `rank`, at
/// monotonically increasing offsets. Implementations may rely on it.
pub trait EdgeSink: Sync {
    /// Append one chunk to the worker's region as a single atomic write.
    /// `offset` is the record offset of the chunk's first record within the
    /// region and always equals the count of records written there so far.
    fn write_chunk(&self, rank: usize, offset: u64, records: &[EdgeRecord]) -> Result<()>;

    /// Collective close: fix the true record count of every region.
    /// `counts[rank]` is the total persisted by worker `rank`. Called once,
    /// after all workers have finished writing.
    fn finalize(&self, counts: &[u64]) -> Result<()>;
}

// ============================================================================
// MemorySink
// ============================================================================

/// In-memory edge storage, one growable region per worker.
pub struct MemorySink {
    regions: Mutex<Vec<Vec<EdgeRecord>>>,
    finalized: Mutex<bool>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self {
            regions: Mutex::new(Vec::new()),
            finalized: Mutex::new(false),
        }
    }

    /// Records persisted by one worker, in write order.
    pub fn region(&self, rank: usize) -> Vec<EdgeRecord> {
        let regions = self.regions.lock();
        regions.get(rank).cloned().unwrap_or_default()
    }

    /// All records across workers, in (rank, write-order) order.
    pub fn all_edges(&self) -> Vec<EdgeRecord> {
        self.regions.lock().iter().flatten().copied().collect()
    }

    pub fn is_finalized(&self) -> bool {
        *self.finalized.lock()
    }
}

impl Default for MemorySink {
    fn default() -> Self {
        Self::new()
    }
}

impl EdgeSink for MemorySink {
    fn write_chunk(&self, rank: usize, offset: u64, records: &[EdgeRecord]) -> Result<()> {
        let mut regions = self.regions.lock();
        if regions.len() <= rank {
            regions.resize_with(rank + 1, Vec::new);
        }
        let region = &mut regions[rank];
        if region.len() as u64 != offset {
            return Err(Error::Sink(format!(
                "non-contiguous write to region {rank}: offset {offset}, extent {}",
                region.len()
            )));
        }
        region.extend_from_slice(records);
        Ok(())
    }

    fn finalize(&self, counts: &[u64]) -> Result<()> {
        let regions = self.regions.lock();
        for (rank, &count) in counts.iter().enumerate() {
            let extent = regions.get(rank).map_or(0, Vec::len) as u64;
            if extent != count {
                return Err(Error::Sink(format!(
                    "finalize count mismatch for region {rank}: {count} declared, {extent} written"
                )));
            }
        }
        *self.finalized.lock() = true;
        Ok(())
    }
}

// ============================================================================
// ResultWriter
// ============================================================================

/// Per-stream statistics returned by [`ResultWriter::write_stream`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamStats {
    /// Pairs consumed from the iterator.
    pub evaluated: u64,
    /// Records with positive weight handed to the sink.
    pub persisted: u64,
}

/// Fixed-capacity buffer between one worker's evaluation loop and its sink
/// region. Keeps only `weight > 0` records; flushes full buffers as one
/// chunk and the partial tail at stream end.
pub struct ResultWriter<'s> {
    sink: &'s dyn EdgeSink,
    rank: usize,
    chunk_size: usize,
    buffer: Vec<EdgeRecord>,
    offset: u64,
}

impl<'s> ResultWriter<'s> {
    pub fn new(sink: &'s dyn EdgeSink, rank: usize, chunk_size: usize) -> Result<Self> {
        if chunk_size == 0 {
            return Err(Error::Config("chunk_size must be at least 1".into()));
        }
        Ok(Self {
            sink,
            rank,
            chunk_size,
            buffer: Vec::with_capacity(chunk_size),
            offset: 0,
        })
    }

    /// Drain `pairs`, buffering and flushing positive-weight records.
    /// Consumes the writer: a stream is written exactly once.
    pub fn write_stream<I>(mut self, pairs: I) -> Result<StreamStats>
    where
        I: IntoIterator<Item = (usize, usize, f64)>,
    {
        let start = chrono::Utc::now();
        let mut stats = StreamStats::default();

        for (i, j, weight) in pairs {
            stats.evaluated += 1;
            if weight > 0.0 {
                self.buffer.push(EdgeRecord::new(i as i64, j as i64, weight));
                if self.buffer.len() == self.chunk_size {
                    self.flush()?;
                    info!(
                        rank = self.rank,
                        position = ?(i, j),
                        flushed = self.offset,
                        elapsed = %(chrono::Utc::now() - start),
                        "chunk flushed"
                    );
                    crate::engine::advise_resource_pressure();
                }
            }
        }

        // Tail flush of the partial buffer.
        if !self.buffer.is_empty() {
            self.flush()?;
        }

        stats.persisted = self.offset;
        debug!(
            rank = self.rank,
            evaluated = stats.evaluated,
            persisted = stats.persisted,
            "stream complete"
        );
        Ok(stats)
    }

    fn flush(&mut self) -> Result<()> {
        self.sink.write_chunk(self.rank, self.offset, &self.buffer)?;
        self.offset += self.buffer.len() as u64;
        self.buffer.clear();
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
