//! # CLOB
//!
//! `Clob` is the character large object. Its content is UTF-8 and every
//! position and length in its API counts characters, not bytes. Storage,
//! materialization and lifetime are shared with `Blob`: both sit on a
//! `LobHandle` in the connection registry.
//!
//! ## Character Addressing
//!
//! Characters have variable width, so a character position is turned into a
//! byte offset by scanning the content from the start:
//!
//! ```text
//!   bytes:  h  é(2)  l  l  o
//!           0  1 2   3  4  5
//!   chars:  0  1     2  3  4
//! ```
//!
//! The scan validates UTF-8 as it goes; malformed content is reported as
//! `InvalidCharacterData` with the byte offset of the first bad byte. The total
//! character count is cached on the handle until the next write.
//!
//! ## Updates
//!
//! `set_string` overwrites characters in place. Replacement characters may
//! have a different encoded width than the ones they replace, so the update is
//! a byte-range splice (`replace_bytes`) rather than a positioned write.
//! [`ClobWriter`] applies the same splice to each chunk of UTF-8 it is given.

use std::fmt;
use std::sync::Arc;

use crate::config::LobConfig;
use crate::connection::{LobConnection, LobId};
use crate::error::{LobError, Result};

use super::blob::{check_length, check_position};
use super::cursor::{HandleCursor, SliceCursor};
use super::handle::LobHandle;
use super::search::search;
use super::stream::{ClobWriter, LobReader};

/// Smallest buffer that can hold a carried-over partial character plus one
/// more byte.
const MIN_SCAN_BUFFER: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScanTarget {
    Char(u64),
    Byte(u64),
    End,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct CharScan {
    /// Characters before the stopping point.
    chars: u64,
    /// Byte offset of the stopping point.
    byte_offset: u64,
    reached: bool,
}

/// Walks the content from byte 0 until `target` is reached or the content
/// ends.
fn scan(handle: &mut LobHandle, target: ScanTarget, chunk: usize) -> Result<CharScan> {
    let mut buf = vec![0u8; chunk.max(MIN_SCAN_BUFFER)];
    let mut carry = 0usize;
    let mut base = 0u64;
    let mut chars = 0u64;

    loop {
        let n = handle.read_at(base + carry as u64, &mut buf[carry..])?;
        if n == 0 {
            if carry > 0 {
                return Err(LobError::InvalidCharacterData { byte_offset: base });
            }
            let reached = match target {
                ScanTarget::Char(c) => c == chars,
                ScanTarget::Byte(b) => b == base,
                ScanTarget::End => true,
            };
            return Ok(CharScan {
                chars,
                byte_offset: base,
                reached,
            });
        }

        let filled = carry + n;
        let valid = match std::str::from_utf8(&buf[..filled]) {
            Ok(text) => text.len(),
            Err(e) if e.error_len().is_none() => e.valid_up_to(),
            Err(e) => {
                return Err(LobError::InvalidCharacterData {
                    byte_offset: base + e.valid_up_to() as u64,
                })
            }
        };

        for (i, &byte) in buf[..valid].iter().enumerate() {
            if byte & 0xC0 == 0x80 {
                continue;
            }
            let at = base + i as u64;
            let hit = match target {
                ScanTarget::Char(c) => c == chars,
                ScanTarget::Byte(b) => b == at,
                ScanTarget::End => false,
            };
            if hit {
                return Ok(CharScan {
                    chars,
                    byte_offset: at,
                    reached: true,
                });
            }
            chars += 1;
        }

        buf.copy_within(valid..filled, 0);
        carry = filled - valid;
        base += valid as u64;
    }
}

/// Overwrites characters from `first` with `text`, extending the content past
/// its end if needed. Returns the number of characters written.
pub(super) fn overwrite_chars(
    handle: &mut LobHandle,
    first: u64,
    text: &str,
    config: &Arc<LobConfig>,
) -> Result<u64> {
    let chunk = config.copy_buffer_size;
    let start = scan(handle, ScanTarget::Char(first), chunk)?;
    if !start.reached {
        return Err(LobError::PositionTooLarge {
            position: first as i64 + 1,
        });
    }
    let written = text.chars().count() as u64;
    if written == 0 {
        return Ok(0);
    }
    let end = scan(handle, ScanTarget::Char(first + written), chunk)?;
    let known = handle.cached_char_length();
    handle.replace_bytes(text.as_bytes(), start.byte_offset, end.byte_offset, config)?;
    if let Some(before) = known {
        handle.set_char_length(Some(before.max(first + written)));
    }
    Ok(written)
}

fn char_length(handle: &mut LobHandle, chunk: usize) -> Result<u64> {
    if let Some(len) = handle.cached_char_length() {
        return Ok(len);
    }
    let len = scan(handle, ScanTarget::End, chunk)?.chars;
    handle.set_char_length(Some(len));
    Ok(len)
}

/// Byte offset of character `index` in `text`, or `text.len()` past the end.
fn char_boundary(text: &str, index: usize) -> usize {
    text.char_indices()
        .nth(index)
        .map_or(text.len(), |(at, _)| at)
}

#[derive(Clone)]
pub struct Clob {
    conn: LobConnection,
    id: LobId,
}

impl fmt::Debug for Clob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Clob").field("id", &self.id).finish()
    }
}

impl Clob {
    pub(crate) fn new(conn: LobConnection, id: LobId) -> Self {
        Self { conn, id }
    }

    pub fn connection(&self) -> &LobConnection {
        &self.conn
    }

    fn with_handle<T, F>(&self, op: F) -> Result<T>
    where
        F: FnOnce(&mut LobHandle, &Arc<LobConfig>) -> Result<T>,
    {
        let config = &self.conn.shared.config;
        self.conn
            .shared
            .monitor
            .lock()
            .with_handle(self.id, |handle| op(handle, config))
    }

    pub fn is_valid(&self) -> bool {
        self.conn.shared.monitor.lock().contains(self.id)
    }

    /// Length in characters.
    pub fn length(&self) -> Result<u64> {
        self.with_handle(|handle, config| char_length(handle, config.copy_buffer_size))
    }

    /// Returns up to `len` characters starting at character `pos`.
    pub fn get_sub_string(&self, pos: i64, len: i64) -> Result<String> {
        self.with_handle(|handle, config| {
            let first = check_position(pos)?;
            let len = check_length(len)?;
            let chunk = config.copy_buffer_size;

            let start = scan(handle, ScanTarget::Char(first), chunk)?;
            if !start.reached {
                return Err(LobError::PositionTooLarge { position: pos });
            }
            let end = scan(handle, ScanTarget::Char(first.saturating_add(len)), chunk)?;
            let bytes = handle.read_range(
                start.byte_offset,
                end.byte_offset - start.byte_offset,
                chunk,
            )?;
            String::from_utf8(bytes).map_err(|e| LobError::InvalidCharacterData {
                byte_offset: start.byte_offset + e.utf8_error().valid_up_to() as u64,
            })
        })
    }

    /// Reads the whole content as a string.
    pub fn contents(&self) -> Result<String> {
        self.with_handle(|handle, config| {
            let len = handle.length()?;
            let bytes = handle.read_range(0, len, config.copy_buffer_size)?;
            String::from_utf8(bytes).map_err(|e| LobError::InvalidCharacterData {
                byte_offset: e.utf8_error().valid_up_to() as u64,
            })
        })
    }

    /// Stream over the UTF-8 encoded content.
    pub fn utf8_stream(&self) -> Result<LobReader> {
        self.with_handle(|_, _| Ok(()))?;
        Ok(LobReader::new(self.conn.clone(), self.id, 0, None))
    }

    /// Stream over the UTF-8 encoding of `len` characters starting at `pos`.
    /// The whole range must lie within the CLOB.
    pub fn character_stream_range(&self, pos: i64, len: i64) -> Result<LobReader> {
        let (start, end) = self.with_handle(|handle, config| {
            let first = check_position(pos)?;
            let len = check_length(len)?;
            let chunk = config.copy_buffer_size;
            let lob_length = char_length(handle, chunk)?;
            if first > lob_length || len > lob_length - first {
                return Err(LobError::PosAndLengthGreaterThanLob {
                    position: pos,
                    length: len as i64,
                    lob_length,
                });
            }
            let start = scan(handle, ScanTarget::Char(first), chunk)?;
            let end = scan(handle, ScanTarget::Char(first + len), chunk)?;
            Ok((start.byte_offset, end.byte_offset))
        })?;
        Ok(LobReader::new(self.conn.clone(), self.id, start, Some(end - start)))
    }

    /// Returns the 1-based character position of the first occurrence of
    /// `pattern` at or after character `start`.
    pub fn position(&self, pattern: Option<&str>, start: i64) -> Result<Option<u64>> {
        self.with_handle(|handle, config| {
            let first = check_position(start)?;
            let pattern = pattern.ok_or(LobError::NullPatternOrSearchString)?;
            if pattern.is_empty() {
                return Ok(Some(first + 1));
            }
            let chunk = config.copy_buffer_size;

            let from = scan(handle, ScanTarget::Char(first), chunk)?;
            if !from.reached {
                return Err(LobError::PositionTooLarge { position: start });
            }
            let found = search(
                &mut HandleCursor::new(handle),
                &mut SliceCursor::new(pattern.as_bytes()),
                from.byte_offset,
            )?;
            match found {
                Some(byte_offset) => {
                    let at = scan(handle, ScanTarget::Byte(byte_offset), chunk)?;
                    Ok(Some(at.chars + 1))
                }
                None => Ok(None),
            }
        })
    }

    /// Like [`Clob::position`], with the pattern taken from another CLOB.
    pub fn position_clob(&self, pattern: Option<&Clob>, start: i64) -> Result<Option<u64>> {
        self.with_handle(|_, _| {
            check_position(start)?;
            Ok(())
        })?;
        let Some(pattern) = pattern else {
            return Err(LobError::NullPatternOrSearchString);
        };
        let text = pattern
            .contents()
            .map_err(|_| LobError::UnableToReadPattern)?;
        self.position(Some(&text), start)
    }

    /// Overwrites characters starting at `pos` with `text`. Writing at
    /// `length + 1` appends. Returns the number of characters written.
    pub fn set_string(&self, pos: i64, text: &str) -> Result<usize> {
        self.with_handle(|handle, config| {
            let first = check_position(pos)?;
            let written = overwrite_chars(handle, first, text, config)?;
            Ok(written as usize)
        })
    }

    /// Writes the `len` characters of `text` that start at character
    /// `offset`, overwriting from `pos`.
    pub fn set_string_range(&self, pos: i64, text: &str, offset: usize, len: i64) -> Result<usize> {
        self.with_handle(|handle, config| {
            let first = check_position(pos)?;
            let lob_length = char_length(handle, config.copy_buffer_size)?;
            if first > lob_length {
                return Err(LobError::PositionTooLarge { position: pos });
            }
            if text.is_empty() {
                return Ok(0);
            }
            let text_chars = text.chars().count();
            if offset >= text_chars {
                return Err(LobError::InvalidOffset {
                    offset,
                    buffer_len: text_chars,
                });
            }
            let len = check_length(len)?;
            let available = (text_chars - offset) as u64;
            if len > available {
                return Err(LobError::LengthTooLarge {
                    requested: len as i64,
                    available,
                });
            }
            let from = char_boundary(text, offset);
            let to = char_boundary(text, offset + len as usize);
            let written = overwrite_chars(handle, first, &text[from..to], config)?;
            Ok(written as usize)
        })
    }

    /// Returns a writer that overwrites characters from `pos` onward. The
    /// CLOB is materialized before the writer is handed out.
    pub fn set_character_stream(&self, pos: i64) -> Result<ClobWriter> {
        let first = self.with_handle(|handle, config| {
            let first = check_position(pos)?;
            let at = scan(handle, ScanTarget::Char(first), config.copy_buffer_size)?;
            if !at.reached {
                return Err(LobError::PositionTooLarge { position: pos });
            }
            handle.local_mut(None, config)?;
            Ok(first)
        })?;
        Ok(ClobWriter::new(self.conn.clone(), self.id, first))
    }

    /// Cuts the CLOB down to `len` characters.
    pub fn truncate(&self, len: i64) -> Result<()> {
        self.with_handle(|handle, config| {
            let new_len = check_length(len)?;
            let at = scan(handle, ScanTarget::Char(new_len), config.copy_buffer_size)?;
            if !at.reached {
                return Err(LobError::LengthTooLarge {
                    requested: len,
                    available: at.chars,
                });
            }
            handle.truncate(at.byte_offset, config)?;
            handle.set_char_length(Some(new_len));
            Ok(())
        })
    }

    pub fn locator(&self) -> Result<i32> {
        self.conn.shared.monitor.lock().assign_locator(self.id)
    }

    /// Releases the CLOB. Calling it again is a no-op.
    pub fn free(&self) {
        if self.conn.shared.monitor.lock().free(self.id) {
            tracing::trace!(id = ?self.id, "freed CLOB");
        }
    }

    pub fn is_materialized(&self) -> Result<bool> {
        self.with_handle(|handle, _| Ok(handle.is_materialized()))
    }
}
