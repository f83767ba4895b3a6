//! # simnet-rs — Similarity Networks for Synthetic Populations
//!
//! Reconstructs a probabilistic similarity network over a population of
//! agents: for every unordered pair of agents it computes an edge weight
//! combining a geographic-proximity term and an information-theoretic
//! (Lin) attribute-similarity term, and persists only non-zero edges.
//!
//! ## Design Principles
//!
//! 1. **Trait-first**: `EdgeSink` is the contract between the evaluation
//!    loop and edge storage
//! 2. **Pure metric**: `SimilarityEngine::edge_weight` is a pure function of
//!    the table, the sample, and two agent indices
//! 3. **Closed-form scheduling**: every worker derives its own share of the
//!    pair space independently — no coordinator round-trip
//! 4. **Embarrassingly parallel**: after the one sample broadcast, workers
//!    never communicate until the final collective finalize
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use simnet_rs::{AttributeTable, AttrValue, MemorySink, NetworkConfig, build_network};
//!
//! # fn example() -> simnet_rs::Result<()> {
//! let table = AttributeTable::new(
//!     vec!["age".into(), "hh_lon".into(), "hh_lat".into()],
//!     "ogg",
//!     vec![
//!         vec![AttrValue::Int(42), AttrValue::Float(7.66), AttrValue::Float(45.05)],
//!         vec![AttrValue::Int(57), AttrValue::Float(7.69), AttrValue::Float(45.07)],
//!     ],
//! )?;
//!
//! let sink = MemorySink::new();
//! let summary = build_network(&NetworkConfig::default(), &table, &sink)?;
//! println!("{} edges persisted", summary.edges_persisted());
//! # Ok(())
//! # }
//! ```
//!
//! ## Edge Sinks
//!
//! | Sink | Module | Description |
//! |------|--------|-------------|
//! | `MemorySink` | `writer` | Per-worker in-memory regions for testing/embedding |
//! | `SegmentSink` | `readwrite` | Per-worker fixed-width segment files + JSON manifest |

// ============================================================================
// Modules
// ============================================================================

pub mod model;
pub mod sample;
pub mod schedule;
pub mod similarity;
pub mod writer;
pub mod engine;
pub mod readwrite;

// ============================================================================
// Re-exports: Model
// ============================================================================

pub use model::{AttrType, AttrValue, AttributeTable, EdgeRecord};

// ============================================================================
// Re-exports: Engine pieces
// ============================================================================

pub use sample::{Broadcast, Sample};
pub use schedule::{ij_to_pos, pos_to_ij, share, PairShare, SchedulingPolicy};
pub use similarity::{SimilarityEngine, SimilarityParams, SIMILARITY_THRESHOLD};
pub use writer::{EdgeSink, MemorySink, ResultWriter, StreamStats};

// ============================================================================
// Re-exports: Driver
// ============================================================================

pub use engine::{build_network, NetworkConfig, NetworkSummary};
pub use readwrite::{
    read_attr_table_json, read_manifest, read_segment, SegmentEntry, SegmentManifest, SegmentSink,
};

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid configuration detected before any distributed work begins.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Attribute table shape or typing violation.
    #[error("Attribute table error: {0}")]
    Table(String),

    /// Unknown scheduling policy name.
    #[error("Unknown scheduling policy {name:?} (expected one of: even, round_robin)")]
    UnknownPolicy { name: String },

    /// A worker thread panicked; the whole run is invalid.
    #[error("Worker {rank} failed; run aborted")]
    WorkerFailed { rank: usize },

    /// Sink rejected a chunk or the finalize step.
    #[error("Sink error: {0}")]
    Sink(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
