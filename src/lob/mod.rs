//! # Large Objects
//!
//! This module implements BLOB and CLOB values on top of the long-column
//! storage in [`crate::storage`].
//!
//! ## Representations
//!
//! A LOB fetched from a row starts out **stream-backed**: it wraps the
//! long-column stream and reads straight from it, without copying. The first
//! mutation **materializes** it into a [`LobStreamControl`], an in-memory
//! buffer that spills to a temp file once it grows past the configured
//! threshold.
//!
//! ```text
//!        row fetch                       write / truncate
//!   ┌──────────────┐   Stream backend   ┌────────────────┐   Local backend
//!   │ StoreStream  │ ─────────────────► │   LobHandle    │ ───────────────► LobStreamControl
//!   └──────────────┘                    └────────────────┘                  (Vec<u8> | tempfile)
//! ```
//!
//! ## Submodules
//!
//! - `handle`: the `LobHandle` state machine and its two backends
//! - `control`: the local materialized store
//! - `blob` / `clob`: public byte and character APIs (1-based positions)
//! - `search`: pattern search over forward cursors
//! - `cursor`: byte cursors used by search and character scanning
//! - `stream`: `Read`/`Write` adapters that lock the monitor per call, plus
//!   the character writer for CLOBs

mod blob;
mod clob;
mod control;
mod cursor;
pub(crate) mod handle;
mod search;
mod stream;

pub use blob::Blob;
pub use clob::Clob;
pub use control::{LobStreamControl, StoreReader, StoreWriter};
pub use handle::{LobKind, LobSource};
pub use stream::{ClobWriter, LobReader, LobWriter};
