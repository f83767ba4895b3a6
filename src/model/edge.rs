//! The output record: one weighted candidate edge.
//!
//! On-disk layout is fixed-width little-endian
//! `{src_node: i64, trg_node: i64, weight: f64}` — 24 bytes per record, so a
//! segment file's record count is its length divided by
//! [`EDGE_RECORD_BYTES`] and truncation to the true count is just a file
//! length.

use serde::{Deserialize, Serialize};

/// Bytes per encoded [`EdgeRecord`].
pub const EDGE_RECORD_BYTES: usize = 24;

/// One candidate edge `(src, trg, weight)` with `src < trg`.
/// Only records with `weight > 0` are ever persisted.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EdgeRecord {
    pub src: i64,
    pub trg: i64,
    pub weight: f64,
}

impl EdgeRecord {
    pub fn new(src: i64, trg: i64, weight: f64) -> Self {
        Self { src, trg, weight }
    }

    /// Encode as 24 fixed-width little-endian bytes.
    pub fn to_bytes(&self) -> [u8; EDGE_RECORD_BYTES] {
        let mut buf = [0u8; EDGE_RECORD_BYTES];
        buf[0..8].copy_from_slice(&self.src.to_le_bytes());
        buf[8..16].copy_from_slice(&self.trg.to_le_bytes());
        buf[16..24].copy_from_slice(&self.weight.to_le_bytes());
        buf
    }

    /// Decode from the fixed-width layout.
    pub fn from_bytes(buf: &[u8; EDGE_RECORD_BYTES]) -> Self {
        Self {
            src: i64::from_le_bytes(buf[0..8].try_into().unwrap()),
            trg: i64::from_le_bytes(buf[8..16].try_into().unwrap()),
            weight: f64::from_le_bytes(buf[16..24].try_into().unwrap()),
        }
    }
}
