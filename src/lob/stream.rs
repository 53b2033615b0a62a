//! Monitor-bound LOB streams.
//!
//! `LobReader` and `LobWriter` hold a key, not a borrow: each `read` or
//! `write` takes the connection monitor, resolves the LOB and performs one
//! positioned operation. A LOB freed while a stream is open makes the next
//! call fail with an `io::Error` wrapping `LobError::ObjectInvalid`.
//!
//! `ClobWriter` takes UTF-8 and overwrites whole characters. A character split
//! across two `write` calls is held back until its last byte arrives.

use std::fmt;
use std::io::{self, Read, Write};

use crate::connection::{LobConnection, LobId};
use crate::error::LobError;

use super::clob::overwrite_chars;

pub struct LobReader {
    conn: LobConnection,
    id: LobId,
    position: u64,
    remaining: Option<u64>,
}

impl LobReader {
    pub(crate) fn new(conn: LobConnection, id: LobId, position: u64, limit: Option<u64>) -> Self {
        Self {
            conn,
            id,
            position,
            remaining: limit,
        }
    }

    /// Zero-based payload offset of the next byte to read.
    pub fn position(&self) -> u64 {
        self.position
    }
}

impl fmt::Debug for LobReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LobReader")
            .field("id", &self.id)
            .field("position", &self.position)
            .field("remaining", &self.remaining)
            .finish()
    }
}

impl Read for LobReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let want = match self.remaining {
            Some(0) => return Ok(0),
            Some(left) => buf.len().min(left as usize),
            None => buf.len(),
        };
        let position = self.position;
        let n = self
            .conn
            .shared
            .monitor
            .lock()
            .with_handle(self.id, |handle| handle.read_at(position, &mut buf[..want]))
            .map_err(LobError::into_io)?;
        self.position += n as u64;
        if let Some(left) = self.remaining.as_mut() {
            *left -= n as u64;
        }
        Ok(n)
    }
}

pub struct LobWriter {
    conn: LobConnection,
    id: LobId,
    position: u64,
}

impl LobWriter {
    pub(crate) fn new(conn: LobConnection, id: LobId, position: u64) -> Self {
        Self { conn, id, position }
    }

    pub fn position(&self) -> u64 {
        self.position
    }
}

impl fmt::Debug for LobWriter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LobWriter")
            .field("id", &self.id)
            .field("position", &self.position)
            .finish()
    }
}

impl Write for LobWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        let config = &self.conn.shared.config;
        let position = self.position;
        self.position = self
            .conn
            .shared
            .monitor
            .lock()
            .with_handle(self.id, |handle| handle.write_at(position, buf, config))
            .map_err(LobError::into_io)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

pub struct ClobWriter {
    conn: LobConnection,
    id: LobId,
    position: u64,
    pending: Vec<u8>,
}

impl ClobWriter {
    pub(crate) fn new(conn: LobConnection, id: LobId, position: u64) -> Self {
        Self {
            conn,
            id,
            position,
            pending: Vec::new(),
        }
    }

    /// Zero-based character offset of the next character to write.
    pub fn position(&self) -> u64 {
        self.position
    }
}

impl fmt::Debug for ClobWriter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClobWriter")
            .field("id", &self.id)
            .field("position", &self.position)
            .field("pending", &self.pending.len())
            .finish()
    }
}

impl Write for ClobWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        let held = self.pending.len();
        self.pending.extend_from_slice(buf);
        let checked = std::str::from_utf8(&self.pending).map(str::len);
        let complete = match checked {
            Ok(len) => len,
            Err(e) if e.error_len().is_none() => e.valid_up_to(),
            Err(e) => {
                self.pending.truncate(held);
                return Err(io::Error::new(io::ErrorKind::InvalidData, e));
            }
        };
        if complete == 0 {
            return Ok(buf.len());
        }

        let bytes: Vec<u8> = self.pending.drain(..complete).collect();
        let text = String::from_utf8(bytes)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        let config = &self.conn.shared.config;
        let first = self.position;
        let written = self
            .conn
            .shared
            .monitor
            .lock()
            .with_handle(self.id, |handle| overwrite_chars(handle, first, &text, config))
            .map_err(LobError::into_io)?;
        self.position += written;
        Ok(buf.len())
    }

    /// Fails if the input so far ends inside a character.
    fn flush(&mut self) -> io::Result<()> {
        if !self.pending.is_empty() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "CLOB writer holds an incomplete UTF-8 sequence",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reader_fails_after_free() {
        let conn = LobConnection::new();
        let blob = conn.blob_from_bytes(b"abcdef".to_vec()).unwrap();
        let mut reader = blob.binary_stream().unwrap();
        let mut buf = [0u8; 2];
        reader.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"ab");
        assert_eq!(reader.position(), 2);

        blob.free();
        let err = reader.read(&mut buf).unwrap_err();
        assert!(matches!(LobError::from(err), LobError::ObjectInvalid));
    }

    #[test]
    fn test_bounded_reader_stops_at_limit() {
        let conn = LobConnection::new();
        let blob = conn.blob_from_bytes(b"abcdef".to_vec()).unwrap();
        let mut out = Vec::new();
        blob.binary_stream_range(2, 3)
            .unwrap()
            .read_to_end(&mut out)
            .unwrap();
        assert_eq!(out, b"bcd");
    }

    #[test]
    fn test_writer_extends_and_spills() {
        let dir = tempfile::tempdir().unwrap();
        let conn = LobConnection::builder()
            .in_memory_threshold(8)
            .spill_dir(dir.path())
            .open()
            .unwrap();
        let blob = conn.create_blob().unwrap();
        let mut writer = blob.set_binary_stream(1).unwrap();
        for _ in 0..4 {
            writer.write_all(b"0123").unwrap();
        }
        assert_eq!(writer.position(), 16);
        assert_eq!(blob.length().unwrap(), 16);
        assert_eq!(conn.open_spill_files(), 1);

        blob.free();
        assert_eq!(conn.open_spill_files(), 0);
        assert!(writer.write(b"x").is_err());
    }

    #[test]
    fn test_clob_writer_overwrites_characters() {
        let conn = LobConnection::builder().copy_buffer_size(3).open().unwrap();
        let clob = conn.clob_from_string("abcdef").unwrap();
        let mut writer = clob.set_character_stream(2).unwrap();

        writer.write_all("ö✓".as_bytes()).unwrap();
        assert_eq!(writer.position(), 3);
        assert_eq!(clob.contents().unwrap(), "aö✓def");

        writer.write_all(b"DEFG").unwrap();
        writer.flush().unwrap();
        assert_eq!(clob.contents().unwrap(), "aö✓DEFG");
        assert_eq!(clob.length().unwrap(), 7);
    }

    #[test]
    fn test_clob_writer_holds_split_character() {
        let conn = LobConnection::new();
        let clob = conn.clob_from_string("xyz").unwrap();
        let mut writer = clob.set_character_stream(1).unwrap();
        let check = "✓".as_bytes();

        assert_eq!(writer.write(&check[..1]).unwrap(), 1);
        assert!(writer.flush().is_err());
        assert_eq!(clob.contents().unwrap(), "xyz");

        assert_eq!(writer.write(&check[1..]).unwrap(), 2);
        writer.flush().unwrap();
        assert_eq!(clob.contents().unwrap(), "✓yz");
        assert_eq!(writer.position(), 1);
    }

    #[test]
    fn test_clob_writer_rejects_invalid_utf8() {
        let conn = LobConnection::new();
        let clob = conn.clob_from_string("keep").unwrap();
        let mut writer = clob.set_character_stream(1).unwrap();
        let err = writer.write(&[b'a', 0xFF]).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
        assert_eq!(clob.contents().unwrap(), "keep");

        writer.write_all(b"K").unwrap();
        assert_eq!(clob.contents().unwrap(), "Keep");
    }
}
