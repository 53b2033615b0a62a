//! # BLOB
//!
//! `Blob` is the public binary large object. It is a key, not a container:
//! every call locks the owning connection's monitor, resolves the key to its
//! `LobHandle` and operates on it.
//!
//! ## Positions
//!
//! Positions are 1-based and arguments are signed so that invalid values can
//! be passed and rejected:
//!
//! | Check                           | Error                        |
//! |---------------------------------|------------------------------|
//! | LOB freed                       | `ObjectInvalid`              |
//! | `pos < 1`                       | `BadPosition`                |
//! | `len < 0`                       | `NonPositiveLength`          |
//! | `pos - 1 > length`              | `PositionTooLarge`           |
//! | range past end (bounded stream) | `PosAndLengthGreaterThanLob` |
//!
//! Checks run top to bottom; the first failing one decides the error.
//! `pos == length + 1` is a valid position: reads there are empty and writes
//! there append.
//!
//! ## Materialization
//!
//! Reads on a stream-backed BLOB go to the long-column stream. The first write
//! or truncate copies the payload into a local store and closes the stream.
//! Zero-length writes do not materialize.

use std::fmt;
use std::sync::Arc;

use crate::config::LobConfig;
use crate::connection::{lock_pair, LobConnection, LobId};
use crate::error::{LobError, Result};

use super::cursor::{HandleCursor, PatternCursor, SliceCursor};
use super::handle::LobHandle;
use super::search::search;
use super::stream::{LobReader, LobWriter};

#[derive(Clone)]
pub struct Blob {
    conn: LobConnection,
    id: LobId,
}

impl fmt::Debug for Blob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Blob").field("id", &self.id).finish()
    }
}

pub(crate) fn check_position(pos: i64) -> Result<u64> {
    if pos < 1 {
        return Err(LobError::BadPosition { position: pos });
    }
    Ok((pos - 1) as u64)
}

pub(crate) fn check_length(len: i64) -> Result<u64> {
    if len < 0 {
        return Err(LobError::NonPositiveLength { length: len });
    }
    Ok(len as u64)
}

impl Blob {
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

    /// Length in bytes. Stream-backed BLOBs with a declared length answer
    /// without touching the payload.
    pub fn length(&self) -> Result<u64> {
        self.with_handle(|handle, _| handle.length())
    }

    /// Returns up to `len` bytes starting at `pos`. Fewer bytes come back when
    /// the BLOB ends first.
    pub fn get_bytes(&self, pos: i64, len: i64) -> Result<Vec<u8>> {
        self.with_handle(|handle, config| {
            let offset = check_position(pos)?;
            let len = check_length(len)?;
            if offset > handle.length()? {
                return Err(LobError::PositionTooLarge { position: pos });
            }
            handle.read_range(offset, len, config.copy_buffer_size)
        })
    }

    pub fn binary_stream(&self) -> Result<LobReader> {
        self.with_handle(|_, _| Ok(()))?;
        Ok(LobReader::new(self.conn.clone(), self.id, 0, None))
    }

    /// Stream over `len` bytes starting at `pos`. The whole range must lie
    /// within the BLOB.
    pub fn binary_stream_range(&self, pos: i64, len: i64) -> Result<LobReader> {
        let (offset, len) = self.with_handle(|handle, _| {
            let offset = check_position(pos)?;
            let len = check_length(len)?;
            let lob_length = handle.length()?;
            if offset.saturating_add(len) > lob_length {
                return Err(LobError::PosAndLengthGreaterThanLob {
                    position: pos,
                    length: len as i64,
                    lob_length,
                });
            }
            Ok((offset, len))
        })?;
        Ok(LobReader::new(self.conn.clone(), self.id, offset, Some(len)))
    }

    /// Returns the 1-based position of the first occurrence of `pattern` at
    /// or after `start`.
    pub fn position(&self, pattern: Option<&[u8]>, start: i64) -> Result<Option<u64>> {
        self.with_handle(|handle, _| {
            let offset = check_position(start)?;
            let pattern = pattern.ok_or(LobError::NullPatternOrSearchString)?;
            let found = search(
                &mut HandleCursor::new(handle),
                &mut SliceCursor::new(pattern),
                offset,
            )?;
            Ok(found.map(|at| at + 1))
        })
    }

    /// Like [`Blob::position`], with the pattern read from another BLOB. The
    /// pattern may live on a different connection.
    pub fn position_blob(&self, pattern: Option<&Blob>, start: i64) -> Result<Option<u64>> {
        let Some(pattern) = pattern else {
            return self.with_handle(|_, _| {
                check_position(start)?;
                Err(LobError::NullPatternOrSearchString)
            });
        };

        if !self.conn.same_connection(&pattern.conn) {
            let (mut mine, mut theirs) = lock_pair(&self.conn.shared, &pattern.conn.shared);
            let handle = mine.handle_mut(self.id)?;
            let offset = check_position(start)?;
            let pattern_handle = theirs
                .handle_mut(pattern.id)
                .map_err(|_| LobError::UnableToReadPattern)?;
            let found = search(
                &mut HandleCursor::new(handle),
                &mut PatternCursor(HandleCursor::new(pattern_handle)),
                offset,
            );
            let interrupted = handle.take_interrupted();
            mine.note_interrupt(interrupted);
            let interrupted = pattern_handle.take_interrupted();
            theirs.note_interrupt(interrupted);
            return Ok(found?.map(|at| at + 1));
        }

        let mut registry = self.conn.shared.monitor.lock();
        if pattern.id == self.id {
            // A non-empty BLOB can only contain itself at offset 0.
            return registry.with_handle(self.id, |handle| {
                let offset = check_position(start)?;
                let len = handle
                    .length()
                    .map_err(|_| LobError::UnableToReadPattern)?;
                if len == 0 {
                    return Ok(Some(offset + 1));
                }
                handle.check_position(offset)?;
                Ok((offset == 0).then_some(1))
            });
        }

        let offset = {
            registry.handle_mut(self.id)?;
            check_position(start)?
        };
        let (handle, pattern_handle) = registry.pattern_pair_mut(self.id, pattern.id)?;
        let found = search(
            &mut HandleCursor::new(handle),
            &mut PatternCursor(HandleCursor::new(pattern_handle)),
            offset,
        );
        let interrupted = handle.take_interrupted() | pattern_handle.take_interrupted();
        registry.note_interrupt(interrupted);
        Ok(found?.map(|at| at + 1))
    }

    pub fn set_bytes(&self, pos: i64, bytes: &[u8]) -> Result<usize> {
        self.set_bytes_range(pos, bytes, 0, bytes.len())
    }

    /// Writes `bytes[offset..offset + len]` at `pos`, materializing the BLOB
    /// if needed. Returns the number of bytes written.
    pub fn set_bytes_range(&self, pos: i64, bytes: &[u8], offset: usize, len: usize) -> Result<usize> {
        self.with_handle(|handle, config| {
            let at = check_position(pos)?;
            if at > handle.length()? {
                return Err(LobError::PositionTooLarge { position: pos });
            }
            if offset > bytes.len() {
                return Err(LobError::InvalidOffset {
                    offset,
                    buffer_len: bytes.len(),
                });
            }
            let available = bytes.len() - offset;
            if len > available {
                return Err(LobError::LengthTooLarge {
                    requested: len as i64,
                    available: available as u64,
                });
            }
            if len == 0 {
                return Ok(0);
            }
            handle.write_at(at, &bytes[offset..offset + len], config)?;
            Ok(len)
        })
    }

    /// Returns a writer positioned at `pos`. The BLOB is materialized before
    /// the writer is handed out.
    pub fn set_binary_stream(&self, pos: i64) -> Result<LobWriter> {
        let at = self.with_handle(|handle, config| {
            let at = check_position(pos)?;
            if at > handle.length()? {
                return Err(LobError::PositionTooLarge { position: pos });
            }
            handle.local_mut(None, config)?;
            Ok(at)
        })?;
        Ok(LobWriter::new(self.conn.clone(), self.id, at))
    }

    /// Cuts the BLOB down to `len` bytes.
    pub fn truncate(&self, len: i64) -> Result<()> {
        self.with_handle(|handle, config| {
            let new_len = check_length(len)?;
            let available = handle.length()?;
            if new_len > available {
                return Err(LobError::LengthTooLarge {
                    requested: len,
                    available,
                });
            }
            handle.truncate(new_len, config)
        })
    }

    /// Returns the locator of this BLOB, assigning one on first use.
    pub fn locator(&self) -> Result<i32> {
        self.conn.shared.monitor.lock().assign_locator(self.id)
    }

    /// Releases the BLOB. Calling it again is a no-op.
    pub fn free(&self) {
        if self.conn.shared.monitor.lock().free(self.id) {
            tracing::trace!(id = ?self.id, "freed BLOB");
        }
    }

    pub fn is_materialized(&self) -> Result<bool> {
        self.with_handle(|handle, _| Ok(handle.is_materialized()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{ContainerHandle, MemoryStoreStream};
    use std::io::{Read, Write};

    fn streamed(conn: &LobConnection, payload: &[u8]) -> (Blob, ContainerHandle) {
        let container = ContainerHandle::new();
        let stream = MemoryStoreStream::with_payload(payload, container.clone());
        (conn.blob_from_store_stream(Box::new(stream)).unwrap(), container)
    }

    #[test]
    fn test_get_bytes_bounds() {
        let conn = LobConnection::new();
        let blob = conn.blob_from_bytes(b"hello".to_vec()).unwrap();

        assert_eq!(blob.get_bytes(1, 5).unwrap(), b"hello");
        assert_eq!(blob.get_bytes(4, 10).unwrap(), b"lo");
        assert_eq!(blob.get_bytes(6, 3).unwrap(), b"");
        assert!(matches!(
            blob.get_bytes(7, 1),
            Err(LobError::PositionTooLarge { position: 7 })
        ));
        assert!(matches!(
            blob.get_bytes(0, 1),
            Err(LobError::BadPosition { position: 0 })
        ));
        assert!(matches!(
            blob.get_bytes(1, -1),
            Err(LobError::NonPositiveLength { length: -1 })
        ));
    }

    #[test]
    fn test_bad_position_wins_over_bad_length() {
        let blob = LobConnection::new().create_blob().unwrap();
        assert!(matches!(
            blob.get_bytes(0, -1),
            Err(LobError::BadPosition { .. })
        ));
    }

    #[test]
    fn test_freed_blob_reports_object_invalid_first() {
        let blob = LobConnection::new().create_blob().unwrap();
        blob.free();
        blob.free();
        assert!(!blob.is_valid());
        assert!(matches!(blob.get_bytes(0, -1), Err(LobError::ObjectInvalid)));
        assert!(matches!(blob.truncate(0), Err(LobError::ObjectInvalid)));
        assert!(matches!(blob.locator(), Err(LobError::ObjectInvalid)));
    }

    #[test]
    fn test_set_bytes_promotes_and_appends() {
        let conn = LobConnection::new();
        let (blob, _) = streamed(&conn, b"abcdef");
        assert!(!blob.is_materialized().unwrap());

        assert_eq!(blob.set_bytes(7, b"gh").unwrap(), 2);
        assert!(blob.is_materialized().unwrap());
        assert_eq!(blob.get_bytes(1, 100).unwrap(), b"abcdefgh");

        assert!(matches!(
            blob.set_bytes(10, b"x"),
            Err(LobError::PositionTooLarge { position: 10 })
        ));
    }

    #[test]
    fn test_zero_length_write_does_not_promote() {
        let conn = LobConnection::new();
        let (blob, _) = streamed(&conn, b"abc");
        assert_eq!(blob.set_bytes_range(2, b"xyz", 3, 0).unwrap(), 0);
        assert!(!blob.is_materialized().unwrap());
    }

    #[test]
    fn test_set_bytes_range_offset_checks() {
        let blob = LobConnection::new().create_blob().unwrap();
        assert!(matches!(
            blob.set_bytes_range(1, b"abc", 4, 0),
            Err(LobError::InvalidOffset { offset: 4, buffer_len: 3 })
        ));
        assert!(matches!(
            blob.set_bytes_range(1, b"abc", 1, 3),
            Err(LobError::LengthTooLarge { requested: 3, available: 2 })
        ));
        assert_eq!(blob.set_bytes_range(1, b"abc", 1, 2).unwrap(), 2);
        assert_eq!(blob.get_bytes(1, 10).unwrap(), b"bc");
    }

    #[test]
    fn test_truncate_checks_length() {
        let blob = LobConnection::new().blob_from_bytes(b"abcdef".to_vec()).unwrap();
        assert!(matches!(
            blob.truncate(7),
            Err(LobError::LengthTooLarge { requested: 7, available: 6 })
        ));
        assert!(matches!(
            blob.truncate(-1),
            Err(LobError::NonPositiveLength { length: -1 })
        ));
        blob.truncate(2).unwrap();
        assert_eq!(blob.length().unwrap(), 2);
    }

    #[test]
    fn test_position_within_blob() {
        let blob = LobConnection::new()
            .blob_from_bytes(b"abcabcX".to_vec())
            .unwrap();
        assert_eq!(blob.position(Some(&b"cab"[..]), 1).unwrap(), Some(3));
        assert_eq!(blob.position(Some(&b"X"[..]), 1).unwrap(), Some(7));
        assert_eq!(blob.position(Some(&b"abc"[..]), 2).unwrap(), Some(4));
        assert_eq!(blob.position(Some(&b"zz"[..]), 1).unwrap(), None);
        assert_eq!(blob.position(Some(&b""[..]), 5).unwrap(), Some(5));
        assert!(matches!(
            blob.position(None, 1),
            Err(LobError::NullPatternOrSearchString)
        ));
        assert!(matches!(
            blob.position(Some(&b"a"[..]), 0),
            Err(LobError::BadPosition { .. })
        ));
        assert!(matches!(
            blob.position(Some(&b"a"[..]), 9),
            Err(LobError::PositionTooLarge { .. })
        ));
    }

    #[test]
    fn test_position_blob_same_and_other_connection() {
        let conn = LobConnection::new();
        let hay = conn.blob_from_bytes(b"xxneedlexx".to_vec()).unwrap();
        let needle = conn.blob_from_bytes(b"needle".to_vec()).unwrap();
        assert_eq!(hay.position_blob(Some(&needle), 1).unwrap(), Some(3));
        assert_eq!(hay.position_blob(Some(&hay), 1).unwrap(), Some(1));

        let other = LobConnection::new();
        let remote = other.blob_from_bytes(b"lex".to_vec()).unwrap();
        assert_eq!(hay.position_blob(Some(&remote), 1).unwrap(), Some(7));
        assert_eq!(remote.position_blob(Some(&hay), 1).unwrap(), None);

        let empty = conn.create_blob().unwrap();
        assert_eq!(hay.position_blob(Some(&empty), 4).unwrap(), Some(4));
    }

    #[test]
    fn test_self_search_reads_nothing_from_stream() {
        let conn = LobConnection::new();
        let payload = vec![5u8; 10_000];
        let (blob, container) = streamed(&conn, &payload);
        let served = container.bytes_served();

        assert_eq!(blob.position_blob(Some(&blob), 1).unwrap(), Some(1));
        assert_eq!(blob.position_blob(Some(&blob), 2).unwrap(), None);
        assert!(matches!(
            blob.position_blob(Some(&blob), 10_002),
            Err(LobError::PositionTooLarge { position: 10_002 })
        ));
        assert!(container.bytes_served() - served < 100);
        assert_eq!(blob.position_blob(Some(&blob), 10_001).unwrap(), None);
        assert!(!blob.is_materialized().unwrap());

        let empty = conn.create_blob().unwrap();
        assert_eq!(empty.position_blob(Some(&empty), 7).unwrap(), Some(7));
    }

    #[test]
    fn test_position_blob_with_freed_pattern() {
        let conn = LobConnection::new();
        let hay = conn.blob_from_bytes(b"abc".to_vec()).unwrap();
        let needle = conn.blob_from_bytes(b"b".to_vec()).unwrap();
        needle.free();
        assert!(matches!(
            hay.position_blob(Some(&needle), 1),
            Err(LobError::UnableToReadPattern)
        ));
        assert!(matches!(
            hay.position_blob(None, 1),
            Err(LobError::NullPatternOrSearchString)
        ));

        let other = LobConnection::new();
        let remote = other.blob_from_bytes(b"b".to_vec()).unwrap();
        remote.free();
        assert!(matches!(
            hay.position_blob(Some(&remote), 1),
            Err(LobError::UnableToReadPattern)
        ));
    }

    #[test]
    fn test_binary_stream_range_checks() {
        let blob = LobConnection::new().blob_from_bytes(b"0123456789".to_vec()).unwrap();
        let mut out = String::new();
        blob.binary_stream_range(3, 4)
            .unwrap()
            .read_to_string(&mut out)
            .unwrap();
        assert_eq!(out, "2345");
        assert!(matches!(
            blob.binary_stream_range(8, 4),
            Err(LobError::PosAndLengthGreaterThanLob { .. })
        ));
    }

    #[test]
    fn test_binary_stream_writer_roundtrip() {
        let blob = LobConnection::new().blob_from_bytes(b"aaaa".to_vec()).unwrap();
        let mut writer = blob.set_binary_stream(3).unwrap();
        writer.write_all(b"bbbb").unwrap();
        writer.flush().unwrap();

        let mut out = Vec::new();
        blob.binary_stream().unwrap().read_to_end(&mut out).unwrap();
        assert_eq!(out, b"aabbbb");
    }
}
