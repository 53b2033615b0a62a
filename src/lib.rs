//! # TurDB LOB - Large Object Layer
//!
//! This crate implements the client-facing large object layer of TurDB:
//! BLOB and CLOB values that are read straight from long-column storage and
//! copied into a local, writable store only when they are first modified.
//!
//! ## Quick Start
//!
//! ```ignore
//! use turdb_lob::{LobConnection, TransactionEvent};
//!
//! let conn = LobConnection::builder()
//!     .in_memory_threshold(64 * 1024)
//!     .open()?;
//!
//! let blob = conn.blob_from_store_stream(Box::new(column_stream))?;
//! let len = blob.length()?;            // answered from the length header
//! let head = blob.get_bytes(1, 16)?;   // read from the stream, no copy
//! blob.set_bytes(len as i64 + 1, b"!")?; // materializes, then appends
//!
//! conn.on_transaction_boundary(TransactionEvent::Commit);
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │  LobConnection (monitor, locators)      │
//! ├─────────────────────────────────────────┤
//! │  Blob / Clob / LobReader / LobWriter    │
//! ├─────────────────────────────────────────┤
//! │  LobHandle: Stream ──promote──► Local   │
//! ├────────────────────┬────────────────────┤
//! │  PositionedStream  │  LobStreamControl  │
//! │  StreamHeader      │  (memory/tempfile) │
//! ├────────────────────┴────────────────────┤
//! │  StoreStream (engine long columns)      │
//! └─────────────────────────────────────────┘
//! ```
//!
//! ## Lifetime
//!
//! LOBs are owned by their connection and live until they are freed or the
//! transaction ends. The engine reports transaction boundaries through
//! [`LobConnection::on_transaction_boundary`]; every live LOB is released
//! there and any stale `Blob`/`Clob` key reports `ObjectInvalid`.
//!
//! ## Module Overview
//!
//! - [`storage`]: store streams, positioning, length header codec
//! - [`lob`]: handles, local store, BLOB/CLOB APIs, search
//! - [`connection`]: registry arena, locators, builder
//! - [`config`]: constants and runtime configuration
//! - [`error`]: error taxonomy

pub mod config;
pub mod connection;
pub mod error;
pub mod lob;
pub mod storage;

pub use config::LobConfig;
pub use connection::{LobConnection, LobConnectionBuilder, LobRef, TransactionEvent};
pub use error::{ErrorSeverity, LobError, Result};
pub use lob::{Blob, Clob, ClobWriter, LobKind, LobReader, LobSource, LobWriter};
pub use storage::{ContainerHandle, FileStoreStream, MemoryStoreStream, StoreStream, StreamHeader};
