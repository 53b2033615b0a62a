//! # Positioned Store Stream
//!
//! `PositionedStream` adds absolute positioning to a forward-only
//! [`StoreStream`]. Forward moves skip; backward moves reset the stream to its
//! absolute start and skip forward again:
//!
//! ```text
//!   current ──────────► target          skip(target - current)
//!
//!   target ◄────────── current          reset_stream(); skip(target)
//! ```
//!
//! Offsets are absolute, measured before any length-header adjustment. Callers
//! add the payload offset themselves.
//!
//! ## Validity of Positions
//!
//! The offset is only meaningful from one call until the next positioning call,
//! and only while the connection monitor is held. The stream has no locking of
//! its own.
//!
//! ## Interrupts
//!
//! A read that fails with `ErrorKind::Interrupted` is retried. The observation
//! is remembered and handed back through [`PositionedStream::take_interrupted`]
//! so the connection can re-assert it once the operation has finished.
//!
//! ## Failed Skips
//!
//! Any other error during a skip leaves the offset of the underlying stream
//! unknown. The stream is marked lost and the next [`reposition`] starts over
//! from a reset, so a recovered caller never reads from a stale offset.
//!
//! [`reposition`]: PositionedStream::reposition

use std::io::{self, Read};

use thiserror::Error;

use super::StoreStream;

#[derive(Error, Debug)]
pub enum SeekError {
    #[error("stream ended at offset {reached} before reaching {requested}")]
    PastEnd { requested: u64, reached: u64 },

    #[error(transparent)]
    Io(#[from] io::Error),
}

pub struct PositionedStream {
    inner: Box<dyn StoreStream>,
    position: u64,
    closed: bool,
    interrupted: bool,
    lost: bool,
}

impl PositionedStream {
    pub fn new(inner: Box<dyn StoreStream>) -> Self {
        Self {
            inner,
            position: 0,
            closed: false,
            interrupted: false,
            lost: false,
        }
    }

    pub fn position(&self) -> u64 {
        self.position
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn reposition(&mut self, target: u64) -> Result<(), SeekError> {
        if self.lost || target < self.position {
            self.reset_stream()?;
        }
        if target == self.position {
            return Ok(());
        }
        let wanted = target - self.position;
        let skipped = self.skip_retrying(wanted)?;
        if skipped < wanted {
            return Err(SeekError::PastEnd {
                requested: target,
                reached: self.position,
            });
        }
        Ok(())
    }

    pub fn read_byte(&mut self) -> io::Result<Option<u8>> {
        let mut byte = [0u8; 1];
        match self.read_into(&mut byte)? {
            0 => Ok(None),
            _ => Ok(Some(byte[0])),
        }
    }

    /// Reads into `buf`, returning 0 only at end of stream.
    pub fn read_into(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.ensure_open()?;
        loop {
            match self.inner.read(buf) {
                Ok(n) => {
                    self.position += n as u64;
                    return Ok(n);
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => self.interrupted = true,
                Err(e) => return Err(e),
            }
        }
    }

    /// Skips everything that is left and returns how many bytes that was.
    pub fn skip_to_end(&mut self) -> io::Result<u64> {
        if self.lost {
            return Err(io::Error::other("stream offset lost after a failed skip"));
        }
        self.skip_retrying(u64::MAX)
    }

    pub fn reset_stream(&mut self) -> io::Result<()> {
        self.ensure_open()?;
        self.inner.reset_stream()?;
        self.position = 0;
        self.lost = false;
        Ok(())
    }

    pub fn close_stream(&mut self) {
        if !self.closed {
            self.inner.close_stream();
            self.closed = true;
        }
    }

    pub fn take_interrupted(&mut self) -> bool {
        std::mem::take(&mut self.interrupted)
    }

    fn ensure_open(&self) -> io::Result<()> {
        if self.closed {
            return Err(io::Error::other("positioned stream is closed"));
        }
        Ok(())
    }

    /// Advances `position` as it goes. A hard error marks the stream lost.
    fn skip_retrying(&mut self, n: u64) -> io::Result<u64> {
        self.ensure_open()?;
        let mut total = 0;
        while total < n {
            match self.inner.skip(n - total) {
                Ok(0) => break,
                Ok(k) => {
                    total += k;
                    self.position += k;
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => self.interrupted = true,
                Err(e) => {
                    self.lost = true;
                    return Err(e);
                }
            }
        }
        Ok(total)
    }

    #[cfg(test)]
    pub(crate) fn is_lost(&self) -> bool {
        self.lost
    }
}

impl Read for PositionedStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.read_into(buf)
    }
}

impl Drop for PositionedStream {
    fn drop(&mut self) {
        self.close_stream();
    }
}
