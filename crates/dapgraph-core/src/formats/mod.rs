//! # Formats
//!
//! Serialized forms of the graph. Pure transformations between bytes and
//! values; file I/O lives in the app layer.

pub mod snapshot;

pub use snapshot::{Snapshot, SnapshotHeader, snapshot_from_bytes, snapshot_to_bytes};
