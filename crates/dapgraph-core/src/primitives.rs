//! # Primitives
//!
//! Hardcoded limits and constants for the graph.
//!
//! These values are compiled into the binary and are immutable at runtime.
//! Everything that walks the graph is bounded by one of them.

/// Wildcard entity type for store subscriptions.
///
/// Listeners registered under this kind receive events for every type.
pub const ANY_KIND: &str = "*";

/// Maximum number of parent hops followed when walking ancestors.
///
/// Parent chains are session > thread > frame > scope > variable, plus
/// nested variables and child sessions. Anything deeper is malformed.
pub const MAX_ANCESTOR_DEPTH: usize = 64;

/// Maximum length of a query pattern in bytes.
pub const MAX_PATTERN_LENGTH: usize = 4096;

/// Number of store change clocks above which removal sweeps out the
/// clocks no derived value reads any more.
pub const CLOCK_SWEEP_THRESHOLD: usize = 256;

/// Default window size for views created without an explicit limit.
pub const DEFAULT_VIEW_LIMIT: usize = 50;

/// Magic bytes for the snapshot binary format header.
///
/// - File Header = Magic Bytes ("DAPG") + Version (u8) before payload.
pub const MAGIC_BYTES: &[u8; 4] = b"DAPG";

/// Current snapshot format version.
///
/// Increment this when making breaking changes to the serialization format.
pub const FORMAT_VERSION: u8 = 1;

/// Maximum allowed snapshot payload size (64 MB).
///
/// Validated before deserialization to prevent allocation blowups on
/// corrupted input.
pub const MAX_SNAPSHOT_PAYLOAD_SIZE: usize = 64 * 1024 * 1024;
