//! # LOB Connection Builder
//!
//! `LobConnectionBuilder` configures the LOB layer of one connection before it
//! is opened. Settings are chained and validated by `open()`.
//!
//! ## Configuration Options
//!
//! | Option                | Default                 | Description                              |
//! |-----------------------|-------------------------|------------------------------------------|
//! | in_memory_threshold   | 4096 bytes              | Size above which a local LOB spills      |
//! | spill_dir             | OS temp directory       | Where spill files are created            |
//! | copy_buffer_size      | 8192 bytes              | Chunk size for stream copies             |
//!
//! ## Usage Examples
//!
//! ```ignore
//! let conn = LobConnection::builder()
//!     .in_memory_threshold(64 * 1024)
//!     .spill_dir("/var/tmp/turdb")
//!     .open()?;
//! ```
//!
//! A threshold of 0 is allowed and makes every non-empty local LOB live in a
//! spill file, which is handy for exercising the file path in tests.

use std::path::{Path, PathBuf};

use eyre::{ensure, Result, WrapErr};

use crate::config::LobConfig;

use super::LobConnection;

pub struct LobConnectionBuilder {
    in_memory_threshold: Option<usize>,
    spill_dir: Option<PathBuf>,
    copy_buffer_size: Option<usize>,
}

impl Default for LobConnectionBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl LobConnectionBuilder {
    pub fn new() -> Self {
        Self {
            in_memory_threshold: None,
            spill_dir: None,
            copy_buffer_size: None,
        }
    }

    /// Sets the largest size, in bytes, a materialized LOB keeps in memory.
    pub fn in_memory_threshold(mut self, bytes: usize) -> Self {
        self.in_memory_threshold = Some(bytes);
        self
    }

    /// Sets the directory spill files are created in. The directory must
    /// exist when `open()` is called.
    pub fn spill_dir<P: AsRef<Path>>(mut self, dir: P) -> Self {
        self.spill_dir = Some(dir.as_ref().to_path_buf());
        self
    }

    pub fn copy_buffer_size(mut self, bytes: usize) -> Self {
        self.copy_buffer_size = Some(bytes);
        self
    }

    pub fn get_in_memory_threshold(&self) -> Option<usize> {
        self.in_memory_threshold
    }

    pub fn get_spill_dir(&self) -> Option<&Path> {
        self.spill_dir.as_deref()
    }

    pub fn get_copy_buffer_size(&self) -> Option<usize> {
        self.copy_buffer_size
    }

    /// Validates the settings and produces the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - `copy_buffer_size` is 0
    /// - `spill_dir` does not exist or is not a directory
    pub fn build_config(&self) -> Result<LobConfig> {
        let defaults = LobConfig::default();
        let copy_buffer_size = self.copy_buffer_size.unwrap_or(defaults.copy_buffer_size);
        ensure!(copy_buffer_size > 0, "copy buffer size must be greater than 0");

        if let Some(dir) = &self.spill_dir {
            let meta = std::fs::metadata(dir)
                .wrap_err_with(|| format!("failed to access spill directory '{}'", dir.display()))?;
            ensure!(
                meta.is_dir(),
                "spill directory '{}' is not a directory",
                dir.display()
            );
        }

        Ok(LobConfig {
            in_memory_threshold: self
                .in_memory_threshold
                .unwrap_or(defaults.in_memory_threshold),
            spill_dir: self.spill_dir.clone(),
            copy_buffer_size,
        })
    }

    /// Opens a LOB connection with the configured settings.
    pub fn open(self) -> Result<LobConnection> {
        let config = self.build_config()?;
        tracing::debug!(
            in_memory_threshold = config.in_memory_threshold,
            spill_dir = ?config.spill_dir,
            "opening LOB connection"
        );
        Ok(LobConnection::with_config(config))
    }
}
