//! Reading attribute tables and writing edge segments.
//!
//! The thin I/O seam around the engine: a self-describing JSON attribute
//! table on the way in, per-worker segment files of fixed-width edge
//! records on the way out.
//!
//! Segment layout under the output directory:
//!
//! ```text
//! out/
//! ├── edges.rank-0.bin     24-byte records, worker 0's region
//! ├── edges.rank-1.bin
//! ├── …
//! └── manifest.json        per-segment record counts + creation time
//! ```
//!
//! A segment file is append-only during the run and truncated to its true
//! record count at finalize, so a crashed run leaves behind a valid flushed
//! prefix and no manifest.

use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use hashbrown::HashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::model::{AttrValue, AttributeTable, EdgeRecord, EDGE_RECORD_BYTES};
use crate::writer::EdgeSink;
use crate::{Error, Result};

// ============================================================================
// Attribute table input
// ============================================================================

/// On-disk shape of an attribute-table file.
#[derive(Debug, Serialize, Deserialize)]
struct AttrTableFile {
    /// Attribute names, one per column.
    names: Vec<String>,
    /// Type-tag string, one character per column (`c`/`o`/`g`).
    types: String,
    /// Row-major records. Integer-looking numbers parse as categorical
    /// codes; coordinates must carry a decimal point.
    rows: Vec<Vec<AttrValue>>,
}

/// Read a self-describing JSON attribute table.
///
/// Validation (tag count vs column count, even geographic column count,
/// ragged rows) happens in [`AttributeTable::new`] and fails before any
/// distributed work begins.
pub fn read_attr_table_json(path: impl AsRef<Path>) -> Result<AttributeTable> {
    let file = File::open(path.as_ref())?;
    let parsed: AttrTableFile = serde_json::from_reader(file)?;
    let table = AttributeTable::new(parsed.names, &parsed.types, parsed.rows)?;
    info!(
        agents = table.len(),
        attributes = table.width(),
        "attribute table loaded"
    );
    Ok(table)
}

// ============================================================================
// SegmentSink
// ============================================================================

/// Manifest written at finalize: the authoritative record counts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmentManifest {
    pub created: chrono::DateTime<chrono::Utc>,
    pub record_bytes: usize,
    pub segments: Vec<SegmentEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmentEntry {
    pub rank: usize,
    pub file: String,
    pub records: u64,
}

/// Per-worker segment files of fixed-width edge records.
///
/// Each worker's region is its own file, so disjoint-region writes need no
/// coordination beyond one short-lived map lock to look up the handle.
pub struct SegmentSink {
    dir: PathBuf,
    files: Mutex<HashMap<usize, File>>,
}

impl SegmentSink {
    /// Create the sink, creating `dir` if needed.
    pub fn create(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir, files: Mutex::new(HashMap::new()) })
    }

    pub fn segment_path(&self, rank: usize) -> PathBuf {
        self.dir.join(format!("edges.rank-{rank}.bin"))
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.dir.join("manifest.json")
    }
}

impl EdgeSink for SegmentSink {
    fn write_chunk(&self, rank: usize, offset: u64, records: &[EdgeRecord]) -> Result<()> {
        let mut files = self.files.lock();
        let file = match files.entry(rank) {
            hashbrown::hash_map::Entry::Occupied(entry) => entry.into_mut(),
            // First write wins over any stale segment from an earlier run.
            hashbrown::hash_map::Entry::Vacant(entry) => entry.insert(
                OpenOptions::new()
                    .write(true)
                    .create(true)
                    .truncate(true)
                    .open(self.segment_path(rank))?,
            ),
        };

        let expected = offset * EDGE_RECORD_BYTES as u64;
        let extent = file.metadata()?.len();
        if extent != expected {
            return Err(Error::Sink(format!(
                "non-contiguous write to segment {rank}: offset {expected} bytes, extent {extent}"
            )));
        }

        // One buffer, one write: the chunk lands atomically or the run dies.
        let mut buf = Vec::with_capacity(records.len() * EDGE_RECORD_BYTES);
        for record in records {
            buf.extend_from_slice(&record.to_bytes());
        }
        file.write_all(&buf)?;
        Ok(())
    }

    fn finalize(&self, counts: &[u64]) -> Result<()> {
        let mut files = self.files.lock();
        let mut segments = Vec::with_capacity(counts.len());

        for (rank, &records) in counts.iter().enumerate() {
            let path = self.segment_path(rank);
            match files.get_mut(&rank) {
                Some(file) => {
                    // Truncate to the true record count and make it durable.
                    file.set_len(records * EDGE_RECORD_BYTES as u64)?;
                    file.sync_all()?;
                }
                None if records == 0 => {
                    // Worker never flushed: materialize its empty segment so
                    // downstream consumers see one file per rank.
                    File::create(&path)?.sync_all()?;
                }
                None => {
                    return Err(Error::Sink(format!(
                        "finalize declares {records} records for segment {rank} but nothing was written"
                    )));
                }
            }
            segments.push(SegmentEntry {
                rank,
                file: path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default(),
                records,
            });
        }

        let manifest = SegmentManifest {
            created: chrono::Utc::now(),
            record_bytes: EDGE_RECORD_BYTES,
            segments,
        };
        let mut out = File::create(self.manifest_path())?;
        serde_json::to_writer_pretty(&mut out, &manifest)?;
        out.sync_all()?;
        info!(dir = %self.dir.display(), "edge segments finalized");
        Ok(())
    }
}

// ============================================================================
// Segment input
// ============================================================================

/// Read one segment file back into records.
pub fn read_segment(path: impl AsRef<Path>) -> Result<Vec<EdgeRecord>> {
    let mut bytes = Vec::new();
    File::open(path.as_ref())?.read_to_end(&mut bytes)?;
    if bytes.len() % EDGE_RECORD_BYTES != 0 {
        return Err(Error::Sink(format!(
            "segment {} is {} bytes, not a multiple of the {EDGE_RECORD_BYTES}-byte record width",
            path.as_ref().display(),
            bytes.len()
        )));
    }
    Ok(bytes
        .chunks_exact(EDGE_RECORD_BYTES)
        .map(|chunk| EdgeRecord::from_bytes(chunk.try_into().expect("chunk width")))
        .collect())
}

/// Read the manifest written at finalize.
pub fn read_manifest(dir: impl AsRef<Path>) -> Result<SegmentManifest> {
    let file = File::open(dir.as_ref().join("manifest.json"))?;
    Ok(serde_json::from_reader(file)?)
}

// ============================================================================
// Tests
// ============================================================================
