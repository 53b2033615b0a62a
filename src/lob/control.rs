//! # Local Materialized LOB Store
//!
//! `LobStreamControl` is the random-access container behind every writable
//! LOB. It starts as an in-memory buffer and transparently spills to an
//! anonymous temp file once the data would grow past the configured
//! `in_memory_threshold`:
//!
//! ```text
//!   write_at(off, data)
//!         │
//!         ▼
//!   off + len <= threshold ?──yes──► Memory(Vec<u8>)
//!         │ no
//!         ▼
//!   spill(): tempfile + copy buffer ──► File { file, len }
//! ```
//!
//! Truncating a spilled store below the threshold pulls the data back into
//! memory and drops the temp file.
//!
//! ## Gaps
//!
//! Writing past the current end leaves a gap that reads back as zero bytes.
//! In memory the buffer is zero-extended; on disk the file system does it.
//!
//! ## Bound Streams
//!
//! [`LobStreamControl::input_stream`] and [`LobStreamControl::output_stream`]
//! borrow the store and expose `Read`/`Write` starting at a fixed offset.
//! `replace_bytes` uses them to splice a range through a scratch store.

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::sync::Arc;

use crate::config::LobConfig;
use crate::error::{LobError, Result};

enum Medium {
    Memory(Vec<u8>),
    File { file: File, len: u64 },
}

pub struct LobStreamControl {
    medium: Medium,
    config: Arc<LobConfig>,
}

impl LobStreamControl {
    pub fn new(config: Arc<LobConfig>) -> Self {
        Self {
            medium: Medium::Memory(Vec::new()),
            config,
        }
    }

    pub fn with_bytes(data: &[u8], config: Arc<LobConfig>) -> io::Result<Self> {
        let mut store = Self::new(config);
        store.write_at(0, data)?;
        Ok(store)
    }

    pub fn length(&self) -> u64 {
        match &self.medium {
            Medium::Memory(buf) => buf.len() as u64,
            Medium::File { len, .. } => *len,
        }
    }

    pub fn is_spilled(&self) -> bool {
        matches!(self.medium, Medium::File { .. })
    }

    /// Reads from `offset` into `buf`, returning the bytes read. Returns 0 at
    /// or past the end.
    pub fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
        let len = self.length();
        if offset >= len || buf.is_empty() {
            return Ok(0);
        }
        let n = ((len - offset) as usize).min(buf.len());
        match &mut self.medium {
            Medium::Memory(data) => {
                let start = offset as usize;
                buf[..n].copy_from_slice(&data[start..start + n]);
            }
            Medium::File { file, .. } => {
                file.seek(SeekFrom::Start(offset))?;
                file.read_exact(&mut buf[..n])?;
            }
        }
        Ok(n)
    }

    /// Writes `data` at `offset` and returns the position after the last byte
    /// written.
    pub fn write_at(&mut self, offset: u64, data: &[u8]) -> io::Result<u64> {
        let end = offset
            .checked_add(data.len() as u64)
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "LOB offset overflow"))?;
        if data.is_empty() {
            return Ok(end);
        }
        if !self.is_spilled() && end > self.config.in_memory_threshold as u64 {
            self.spill()?;
        }
        match &mut self.medium {
            Medium::Memory(buf) => {
                let (start, end) = (offset as usize, end as usize);
                if end > buf.len() {
                    buf.resize(end, 0);
                }
                buf[start..end].copy_from_slice(data);
            }
            Medium::File { file, len } => {
                file.seek(SeekFrom::Start(offset))?;
                file.write_all(data)?;
                *len = (*len).max(end);
            }
        }
        Ok(end)
    }

    pub fn truncate(&mut self, new_len: u64) -> Result<()> {
        let len = self.length();
        if new_len > len {
            return Err(LobError::LengthTooLarge {
                requested: new_len as i64,
                available: len,
            });
        }
        match &mut self.medium {
            Medium::Memory(buf) => buf.truncate(new_len as usize),
            Medium::File { file, len } => {
                if new_len <= self.config.in_memory_threshold as u64 {
                    let mut data = vec![0u8; new_len as usize];
                    file.seek(SeekFrom::Start(0))?;
                    file.read_exact(&mut data)?;
                    tracing::debug!(bytes = new_len, "truncated LOB back into memory");
                    self.medium = Medium::Memory(data);
                } else {
                    file.set_len(new_len)?;
                    *len = new_len;
                }
            }
        }
        Ok(())
    }

    /// Replaces `[start, end)` with `data`, shifting the tail. Returns the new
    /// length.
    pub fn replace_bytes(&mut self, data: &[u8], start: u64, end: u64) -> Result<u64> {
        let len = self.length();
        if start > end || end > len {
            return Err(LobError::LengthTooLarge {
                requested: end as i64,
                available: len,
            });
        }
        if (end - start) as usize == data.len() {
            self.write_at(start, data)?;
            return Ok(len);
        }

        let mut tail = LobStreamControl::new(Arc::clone(&self.config));
        tail.copy_data(&mut self.input_stream(end), None)?;
        self.truncate(start)?;
        let mut writer = self.output_stream(start);
        writer.write_all(data)?;
        io::copy(&mut tail.input_stream(0), &mut writer)?;
        tail.free();
        Ok(self.length())
    }

    /// Drains `reader` onto the end of the store, stopping after `upto` bytes
    /// when given. Returns the number of bytes copied.
    pub fn copy_data<R: Read + ?Sized>(&mut self, reader: &mut R, upto: Option<u64>) -> io::Result<u64> {
        let mut buf = vec![0u8; self.config.copy_buffer_size.max(1)];
        let mut copied = 0u64;
        loop {
            let want = match upto {
                Some(limit) if copied >= limit => break,
                Some(limit) => ((limit - copied) as usize).min(buf.len()),
                None => buf.len(),
            };
            let n = match reader.read(&mut buf[..want]) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            };
            let at = self.length();
            self.write_at(at, &buf[..n])?;
            copied += n as u64;
        }
        Ok(copied)
    }

    pub fn input_stream(&mut self, offset: u64) -> StoreReader<'_> {
        StoreReader {
            store: self,
            position: offset,
        }
    }

    pub fn output_stream(&mut self, offset: u64) -> StoreWriter<'_> {
        StoreWriter {
            store: self,
            position: offset,
        }
    }

    /// Releases memory and deletes the temp file. Safe to call repeatedly.
    pub fn free(&mut self) {
        if self.is_spilled() {
            tracing::trace!("releasing LOB spill file");
        }
        self.medium = Medium::Memory(Vec::new());
    }

    fn spill(&mut self) -> io::Result<()> {
        let Medium::Memory(buf) = &self.medium else {
            return Ok(());
        };
        let mut file = match &self.config.spill_dir {
            Some(dir) => tempfile::tempfile_in(dir)?,
            None => tempfile::tempfile()?,
        };
        file.write_all(buf)?;
        tracing::debug!(bytes = buf.len(), "spilling LOB to temp file");
        self.medium = Medium::File {
            len: buf.len() as u64,
            file,
        };
        Ok(())
    }
}

pub struct StoreReader<'a> {
    store: &'a mut LobStreamControl,
    position: u64,
}

impl Read for StoreReader<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.store.read_at(self.position, buf)?;
        self.position += n as u64;
        Ok(n)
    }
}

pub struct StoreWriter<'a> {
    store: &'a mut LobStreamControl,
    position: u64,
}

impl Write for StoreWriter<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.position = self.store.write_at(self.position, buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        if let Medium::File { file, .. } = &mut self.store.medium {
            file.flush()?;
        }
        Ok(())
    }
}
