//! # Snapshot Files
//!
//! Reading and writing snapshots on disk. The encoding follows the file
//! extension: `.json` is JSON, anything else the binary format.

use dapgraph_core::primitives::MAX_SNAPSHOT_PAYLOAD_SIZE;
use dapgraph_core::{DebugState, GraphError, Schema, Snapshot, snapshot_from_bytes, snapshot_to_bytes};
use std::path::Path;

/// On-disk snapshot encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    Binary,
    Json,
}

impl Encoding {
    pub fn for_path(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => Self::Json,
            _ => Self::Binary,
        }
    }
}

/// Read and decode a snapshot file.
pub fn read_snapshot(path: &Path) -> Result<Snapshot, GraphError> {
    let metadata = std::fs::metadata(path)
        .map_err(|e| GraphError::IoError(format!("Cannot read file metadata: {e}")))?;
    if metadata.len() > MAX_SNAPSHOT_PAYLOAD_SIZE as u64 {
        return Err(GraphError::DeserializationError(format!(
            "File size {} bytes exceeds maximum allowed {} bytes",
            metadata.len(),
            MAX_SNAPSHOT_PAYLOAD_SIZE
        )));
    }
    let data = std::fs::read(path)
        .map_err(|e| GraphError::IoError(format!("Read {}: {e}", path.display())))?;

    match Encoding::for_path(path) {
        Encoding::Binary => snapshot_from_bytes(&data),
        Encoding::Json => serde_json::from_slice(&data)
            .map_err(|e| GraphError::DeserializationError(format!("Invalid JSON snapshot: {e}"))),
    }
}

/// Encode and write a snapshot file.
pub fn write_snapshot(path: &Path, snapshot: &Snapshot) -> Result<(), GraphError> {
    let data = match Encoding::for_path(path) {
        Encoding::Binary => snapshot_to_bytes(snapshot)?,
        Encoding::Json => serde_json::to_vec_pretty(snapshot)
            .map_err(|e| GraphError::SerializationError(e.to_string()))?,
    };
    std::fs::write(path, data)
        .map_err(|e| GraphError::IoError(format!("Write {}: {e}", path.display())))
}

/// A fresh state over `schema`, restored from `path` when it exists.
pub fn load_state(path: Option<&Path>, schema: Schema) -> Result<DebugState, GraphError> {
    let state = DebugState::with_schema(schema);
    if let Some(path) = path
        && path.exists()
    {
        let snapshot = read_snapshot(path)?;
        snapshot.restore(&state.store, Some(&state.focus))?;
        tracing::debug!(
            path = %path.display(),
            entities = state.store.len(),
            edges = state.store.edge_count(),
            "snapshot loaded"
        );
    }
    Ok(state)
}

/// Capture `state` (store and global focus) into `path`.
pub fn save_state(state: &DebugState, path: &Path) -> Result<(), GraphError> {
    write_snapshot(path, &Snapshot::capture(&state.store, Some(&state.focus)))
}
