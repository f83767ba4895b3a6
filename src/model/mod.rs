//! # Population Data Model
//!
//! Clean DTOs that define the agent population and the network output.
//! These types cross every boundary: input ↔ engine ↔ sink.
//!
//! Design rule: this module is pure data — no I/O, no threads, no locks.

pub mod value;
pub mod table;
pub mod edge;

pub use value::{AttrType, AttrValue};
pub use table::AttributeTable;
pub use edge::{EdgeRecord, EDGE_RECORD_BYTES};
