//! Forward byte cursors used by pattern search and character scanning.

use crate::config::SEARCH_BUFFER_SIZE;
use crate::error::{LobError, Result};

use super::handle::LobHandle;

pub(crate) trait ByteCursor {
    /// Moves to a zero-based offset. Offsets past the end fail with
    /// `PositionTooLarge`; the end itself is a valid position.
    fn seek(&mut self, offset: u64) -> Result<()>;

    fn position(&self) -> u64;

    fn next_byte(&mut self) -> Result<Option<u8>>;
}

pub(crate) struct SliceCursor<'a> {
    data: &'a [u8],
    position: usize,
}

impl<'a> SliceCursor<'a> {
    pub(crate) fn new(data: &'a [u8]) -> Self {
        Self { data, position: 0 }
    }
}

impl ByteCursor for SliceCursor<'_> {
    fn seek(&mut self, offset: u64) -> Result<()> {
        if offset > self.data.len() as u64 {
            return Err(LobError::PositionTooLarge {
                position: offset as i64 + 1,
            });
        }
        self.position = offset as usize;
        Ok(())
    }

    fn position(&self) -> u64 {
        self.position as u64
    }

    fn next_byte(&mut self) -> Result<Option<u8>> {
        let byte = self.data.get(self.position).copied();
        if byte.is_some() {
            self.position += 1;
        }
        Ok(byte)
    }
}

/// Buffered cursor over a handle's payload. Reads ahead in chunks so a
/// stream-backed handle sees sequential repositions, which cost nothing.
pub(crate) struct HandleCursor<'a> {
    handle: &'a mut LobHandle,
    position: u64,
    buf: Vec<u8>,
    buf_start: u64,
    buf_len: usize,
}

impl<'a> HandleCursor<'a> {
    pub(crate) fn new(handle: &'a mut LobHandle) -> Self {
        Self {
            handle,
            position: 0,
            buf: vec![0u8; SEARCH_BUFFER_SIZE],
            buf_start: 0,
            buf_len: 0,
        }
    }

    fn buffered(&self, offset: u64) -> Option<u8> {
        if offset >= self.buf_start && offset < self.buf_start + self.buf_len as u64 {
            Some(self.buf[(offset - self.buf_start) as usize])
        } else {
            None
        }
    }
}

impl ByteCursor for HandleCursor<'_> {
    fn seek(&mut self, offset: u64) -> Result<()> {
        if self.buffered(offset).is_none() {
            self.handle.check_position(offset)?;
        }
        self.position = offset;
        Ok(())
    }

    fn position(&self) -> u64 {
        self.position
    }

    fn next_byte(&mut self) -> Result<Option<u8>> {
        if let Some(byte) = self.buffered(self.position) {
            self.position += 1;
            return Ok(Some(byte));
        }
        let n = self.handle.read_at(self.position, &mut self.buf)?;
        self.buf_start = self.position;
        self.buf_len = n;
        if n == 0 {
            return Ok(None);
        }
        self.position += 1;
        Ok(Some(self.buf[0]))
    }
}

/// Pattern-side adapter: any failure to produce pattern bytes becomes
/// `UnableToReadPattern`.
pub(crate) struct PatternCursor<C>(pub(crate) C);

impl<C: ByteCursor> ByteCursor for PatternCursor<C> {
    fn seek(&mut self, offset: u64) -> Result<()> {
        self.0.seek(offset).map_err(pattern_error)
    }

    fn position(&self) -> u64 {
        self.0.position()
    }

    fn next_byte(&mut self) -> Result<Option<u8>> {
        self.0.next_byte().map_err(pattern_error)
    }
}

fn pattern_error(err: LobError) -> LobError {
    tracing::debug!(error = %err, "failed to read LOB search pattern");
    LobError::UnableToReadPattern
}
