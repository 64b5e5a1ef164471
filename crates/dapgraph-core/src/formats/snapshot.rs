//! # Snapshot Format
//!
//! Point-in-time copy of a store (and optionally its global focus) that can
//! be written to disk and restored into a fresh store.
//!
//! Binary format: Header (5 bytes) + postcard-serialized [`Snapshot`].
//! - 4 bytes: Magic ("DAPG")
//! - 1 byte: Version
//!
//! Size and header are validated before the payload is decoded.

use crate::focus::Focus;
use crate::primitives::{self, MAX_SNAPSHOT_PAYLOAD_SIZE};
use crate::reactive::{batch, untracked};
use crate::store::Store;
use crate::{Edge, EntitySpec, GraphError, Uri};
use serde::{Deserialize, Serialize};

/// Header only.
const MIN_SNAPSHOT_SIZE: usize = 5;

// =============================================================================
// SNAPSHOT
// =============================================================================

/// Entities in creation order, edges in incoming-list order, focused URIs
/// outermost first.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Snapshot {
    pub entities: Vec<EntitySpec>,
    #[serde(default)]
    pub edges: Vec<Edge>,
    #[serde(default)]
    pub focus: Vec<Uri>,
}

impl Snapshot {
    /// Copy the current state of `store` and the global roles of `focus`.
    pub fn capture(store: &Store, focus: Option<&Focus>) -> Self {
        untracked(|| {
            let mut entities = store.entities();
            entities.sort_by_key(|entity| entity.seq());
            Self {
                entities: entities
                    .iter()
                    .map(|entity| EntitySpec {
                        uri: entity.uri().clone(),
                        kind: entity.kind().to_string(),
                        props: entity.properties(),
                    })
                    .collect(),
                edges: store.edges(),
                focus: focus.map(Focus::focused).unwrap_or_default(),
            }
        })
    }

    /// Add every entity and edge to `store` in one batch, then re-apply the
    /// focus.
    ///
    /// Fails with [`GraphError::UniqueViolation`] if `store` already holds
    /// one of the URIs; entities added before the failure stay.
    pub fn restore(&self, store: &Store, focus: Option<&Focus>) -> Result<(), GraphError> {
        batch(|| {
            for spec in &self.entities {
                store.add(spec.clone())?;
            }
            for edge in &self.edges {
                if !store.add_edge(&edge.kind, edge.from.as_str(), edge.to.as_str()) {
                    tracing::warn!(target: "dapgraph_core::formats", from = %edge.from, to = %edge.to, kind = %edge.kind, "snapshot edge skipped");
                }
            }
            Ok::<(), GraphError>(())
        })?;
        if let Some(focus) = focus {
            for uri in &self.focus {
                if !focus.focus(uri.as_str()) {
                    tracing::warn!(target: "dapgraph_core::formats", %uri, "snapshot focus target missing");
                }
            }
        }
        Ok(())
    }
}

// =============================================================================
// FILE HEADER
// =============================================================================

/// The header precedes every binary snapshot.
#[derive(Debug, Clone, Copy)]
pub struct SnapshotHeader {
    pub magic: [u8; 4],
    pub version: u8,
}

impl SnapshotHeader {
    /// Header with the current format version.
    #[must_use]
    pub fn new() -> Self {
        Self {
            magic: *primitives::MAGIC_BYTES,
            version: primitives::FORMAT_VERSION,
        }
    }

    pub fn validate(&self) -> Result<(), GraphError> {
        if &self.magic != primitives::MAGIC_BYTES {
            return Err(GraphError::DeserializationError(
                "Invalid magic bytes".to_string(),
            ));
        }
        if self.version != primitives::FORMAT_VERSION {
            return Err(GraphError::DeserializationError(format!(
                "Unsupported version: {} (expected {})",
                self.version,
                primitives::FORMAT_VERSION
            )));
        }
        Ok(())
    }

    pub fn to_bytes(&self) -> [u8; 5] {
        let mut bytes = [0u8; 5];
        bytes[0..4].copy_from_slice(&self.magic);
        bytes[4] = self.version;
        bytes
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, GraphError> {
        let Some((magic, rest)) = bytes.split_first_chunk::<4>() else {
            return Err(GraphError::DeserializationError(
                "Header too short".to_string(),
            ));
        };
        let Some(&version) = rest.first() else {
            return Err(GraphError::DeserializationError(
                "Header too short".to_string(),
            ));
        };
        Ok(Self {
            magic: *magic,
            version,
        })
    }
}

impl Default for SnapshotHeader {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// SERIALIZATION FUNCTIONS
// =============================================================================

/// Serialize a snapshot to bytes (header + payload).
pub fn snapshot_to_bytes(snapshot: &Snapshot) -> Result<Vec<u8>, GraphError> {
    let header = SnapshotHeader::new();
    let payload = postcard::to_stdvec(snapshot)
        .map_err(|e| GraphError::SerializationError(e.to_string()))?;

    let mut result = Vec::with_capacity(MIN_SNAPSHOT_SIZE + payload.len());
    result.extend_from_slice(&header.to_bytes());
    result.extend_from_slice(&payload);
    Ok(result)
}

/// Deserialize a snapshot from bytes.
///
/// Validates, in order: minimum size, maximum size, header magic and
/// version. The payload is decoded only after all three pass.
pub fn snapshot_from_bytes(bytes: &[u8]) -> Result<Snapshot, GraphError> {
    if bytes.len() < MIN_SNAPSHOT_SIZE {
        return Err(GraphError::DeserializationError(format!(
            "Data too short: minimum {MIN_SNAPSHOT_SIZE} bytes required"
        )));
    }
    if bytes.len() > MAX_SNAPSHOT_PAYLOAD_SIZE {
        return Err(GraphError::DeserializationError(format!(
            "Data size {} bytes exceeds maximum allowed {} bytes",
            bytes.len(),
            MAX_SNAPSHOT_PAYLOAD_SIZE
        )));
    }

    let header = SnapshotHeader::from_bytes(bytes)?;
    header.validate()?;

    let payload = bytes.get(MIN_SNAPSHOT_SIZE..).unwrap_or_default();
    postcard::from_bytes(payload).map_err(|e| {
        GraphError::DeserializationError(format!("Failed to decode snapshot: {e}"))
    })
}

// =============================================================================
// TESTS
// =============================================================================
