//! # LOB Configuration Constants
//!
//! This module centralizes all configuration constants of the LOB layer,
//! grouping interdependent values together and documenting their relationships.
//!
//! ## Dependency Graph
//!
//! ```text
//! DEFAULT_LOB_IN_MEMORY_THRESHOLD (4096 bytes)
//!       │
//!       └─> LOB_COPY_BUFFER_SIZE (must be >=)
//!             A promotion copies through one buffer of this size. Keeping it
//!             at least as large as the threshold means a LOB that still fits
//!             in memory is copied with a single read.
//!
//! HEADER_MARKER_TINY (0x80)
//!       │
//!       ├─> HEADER_TINY_MAX (31, low five bits)
//!       ├─> HEADER_MARKER_SHORT (0xA0, u16 length follows)
//!       └─> HEADER_MARKER_INT (0xC0, i32 length follows)
//!             Any first byte without the high bit set starts a legacy
//!             LEGACY_HEADER_SIZE (4) byte header holding a bit count.
//!
//! FIRST_LOCATOR (1)
//!       │
//!       └─> RESERVED_LOCATORS (never issued)
//!             0x8000..=0x8008 step 2 collide with legacy DSS length encodings
//!             used by older protocol peers.
//! ```
//!
//! ## Critical Invariants
//!
//! 1. `LOB_COPY_BUFFER_SIZE >= DEFAULT_LOB_IN_MEMORY_THRESHOLD`
//! 2. `FIRST_LOCATOR` is not reserved
//! 3. The header markers are distinguishable from each other and from a
//!    tiny header carrying `HEADER_TINY_MAX`

// ============================================================================
// LOCAL MATERIALIZED STORE
// ============================================================================

/// Bytes a materialized LOB may hold in memory before it spills to a temp
/// file. Overridable through `LobConfig::in_memory_threshold`.
pub const DEFAULT_LOB_IN_MEMORY_THRESHOLD: usize = 4096;

/// Buffer size used when draining streams into a local store.
pub const LOB_COPY_BUFFER_SIZE: usize = 8192;

/// Chunk size of the read-ahead buffer used by pattern search cursors.
pub const SEARCH_BUFFER_SIZE: usize = 4096;

const _: () = assert!(
    LOB_COPY_BUFFER_SIZE >= DEFAULT_LOB_IN_MEMORY_THRESHOLD,
    "LOB_COPY_BUFFER_SIZE must cover the default in-memory threshold"
);

// ============================================================================
// LONG-COLUMN STREAM HEADER
// ============================================================================

pub const HEADER_MARKER_TINY: u8 = 0x80;
pub const HEADER_MARKER_SHORT: u8 = 0xA0;
pub const HEADER_MARKER_INT: u8 = 0xC0;

/// Largest length encodable in the one-byte header.
pub const HEADER_TINY_MAX: u64 = 0x1F;

/// Legacy header: four bytes, big-endian length in bits.
pub const LEGACY_HEADER_SIZE: usize = 4;

/// Longest header the codec can produce.
pub const MAX_HEADER_SIZE: usize = 5;

const _: () = assert!(HEADER_MARKER_TINY | HEADER_TINY_MAX as u8 != HEADER_MARKER_SHORT);
const _: () = assert!(HEADER_MARKER_SHORT != HEADER_MARKER_INT);
const _: () = assert!(LEGACY_HEADER_SIZE <= MAX_HEADER_SIZE);

// ============================================================================
// LOCATORS
// ============================================================================

pub const FIRST_LOCATOR: i32 = 1;

/// Locator values that must never be issued.
pub const RESERVED_LOCATORS: [i32; 5] = [0x8000, 0x8002, 0x8004, 0x8006, 0x8008];

const _: () = {
    let mut i = 0;
    while i < RESERVED_LOCATORS.len() {
        assert!(RESERVED_LOCATORS[i] != FIRST_LOCATOR);
        i += 1;
    }
};
