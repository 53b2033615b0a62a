//! # LOB Configuration Module
//!
//! This module centralizes configuration for the LOB layer. Constants live in
//! [`constants`]; the runtime knobs a connection is opened with live in
//! [`LobConfig`].
//!
//! ## Runtime Options
//!
//! | Option                | Default                           | Effect                                  |
//! |-----------------------|-----------------------------------|-----------------------------------------|
//! | `in_memory_threshold` | `DEFAULT_LOB_IN_MEMORY_THRESHOLD` | above this size, spill to temp file     |
//! | `spill_dir`           | OS temp dir                       | directory for spill files               |
//! | `copy_buffer_size`    | `LOB_COPY_BUFFER_SIZE`            | chunk size when draining/copying streams|
//!
//! `LobConfig` values are normally produced by `LobConnection::builder()`,
//! which validates them.

pub mod constants;
pub use constants::*;

use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LobConfig {
    pub in_memory_threshold: usize,
    pub spill_dir: Option<PathBuf>,
    pub copy_buffer_size: usize,
}

impl Default for LobConfig {
    fn default() -> Self {
        Self {
            in_memory_threshold: DEFAULT_LOB_IN_MEMORY_THRESHOLD,
            spill_dir: None,
            copy_buffer_size: LOB_COPY_BUFFER_SIZE,
        }
    }
}
