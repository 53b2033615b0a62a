//! # Storage Access for Large Objects
//!
//! This module holds the pieces of the LOB layer that talk to the engine's
//! long-column storage:
//!
//! - [`StoreStream`]: resettable, forward-only long-column byte source
//! - [`PositionedStream`]: absolute positioning on top of a store stream
//! - [`StreamHeader`]: decoder/encoder for the length header in front of the
//!   payload
//!
//! ```text
//! ┌──────────┬───────────────────────────────────────────────┐
//! │  header  │                    payload                    │
//! └──────────┴───────────────────────────────────────────────┘
//! 0          payload_offset                                   payload_offset + length
//! ```
//!
//! Nothing in this module is synchronized. All access happens under the
//! connection monitor owned by `LobConnection`.

mod header;
mod positioned;
mod stream;

pub use header::StreamHeader;
pub use positioned::{PositionedStream, SeekError};
pub use stream::{
    container_closed_error, is_container_closed, ContainerClosed, ContainerHandle,
    FileStoreStream, MemoryStoreStream, StoreStream,
};
