//! # LOB Handle State Machine
//!
//! A `LobHandle` owns the bytes of one large object in one of two
//! representations:
//!
//! ```text
//! ┌──────────────────────────┐   first write / truncate   ┌──────────────────────┐
//! │ Stream                   │ ─────────────────────────► │ Local                │
//! │  PositionedStream        │   copy payload, close      │  LobStreamControl    │
//! │  content_offset          │   stream, forget length    │  (memory or file)    │
//! │  declared_length (cache) │                            │                      │
//! └──────────────────────────┘                            └──────────────────────┘
//!            │                                                       │
//!            └───────────────── release() ──────────────────┬────────┘
//!                                                          ▼
//!                                          removed from the registry arena
//! ```
//!
//! Promotion is one-way. A handle created from bytes, from a non-resettable
//! reader, or empty starts out `Local`.
//!
//! All offsets here are zero-based payload offsets. The 1-based argument
//! validation of the public API lives in `Blob` and `Clob`.

use std::io::{self, Read};
use std::sync::Arc;

use crate::config::LobConfig;
use crate::error::{LobError, Result};
use crate::storage::{PositionedStream, SeekError, StoreStream, StreamHeader};

use super::control::LobStreamControl;

/// Where the bytes of a new LOB come from.
pub enum LobSource {
    /// A value already in memory.
    Bytes(Vec<u8>),
    /// A long-column stream, length header included.
    Resettable(Box<dyn StoreStream>),
    /// An arbitrary stream of raw payload bytes. Drained at construction.
    Reader(Box<dyn Read + Send>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LobKind {
    Binary,
    Character,
}

pub(crate) enum LobBackend {
    Stream {
        stream: PositionedStream,
        content_offset: u64,
        declared_length: Option<u64>,
    },
    Local(LobStreamControl),
}

pub(crate) struct LobHandle {
    backend: LobBackend,
    kind: LobKind,
    locator: Option<i32>,
    char_length: Option<u64>,
    interrupted: bool,
}

impl LobHandle {
    pub(crate) fn empty(kind: LobKind, config: Arc<LobConfig>) -> Self {
        Self::local(kind, LobStreamControl::new(config))
    }

    pub(crate) fn from_source(
        kind: LobKind,
        source: LobSource,
        config: Arc<LobConfig>,
    ) -> Result<Self> {
        match source {
            LobSource::Bytes(data) => {
                let store = LobStreamControl::with_bytes(&data, config).map_err(LobError::setup)?;
                Ok(Self::local(kind, store))
            }
            LobSource::Resettable(inner) => Self::from_store_stream(kind, inner),
            LobSource::Reader(mut reader) => {
                let mut store = LobStreamControl::new(config);
                store
                    .copy_data(&mut reader, None)
                    .map_err(LobError::setup)?;
                Ok(Self::local(kind, store))
            }
        }
    }

    fn from_store_stream(kind: LobKind, inner: Box<dyn StoreStream>) -> Result<Self> {
        let mut stream = PositionedStream::new(inner);
        stream.reset_stream().map_err(LobError::setup)?;
        let header = StreamHeader::read_from(&mut stream).map_err(LobError::setup)?;
        tracing::trace!(
            declared_length = ?header.declared_length(),
            payload_offset = header.payload_offset(),
            "wrapped long-column stream"
        );
        let interrupted = stream.take_interrupted();
        Ok(Self {
            backend: LobBackend::Stream {
                stream,
                content_offset: header.payload_offset(),
                declared_length: header.declared_length(),
            },
            kind,
            locator: None,
            char_length: None,
            interrupted,
        })
    }

    fn local(kind: LobKind, store: LobStreamControl) -> Self {
        Self {
            backend: LobBackend::Local(store),
            kind,
            locator: None,
            char_length: None,
            interrupted: false,
        }
    }

    pub(crate) fn kind(&self) -> LobKind {
        self.kind
    }

    pub(crate) fn locator(&self) -> Option<i32> {
        self.locator
    }

    pub(crate) fn set_locator(&mut self, locator: Option<i32>) {
        self.locator = locator;
    }

    pub(crate) fn cached_char_length(&self) -> Option<u64> {
        self.char_length
    }

    pub(crate) fn set_char_length(&mut self, len: Option<u64>) {
        self.char_length = len;
    }

    pub(crate) fn is_materialized(&self) -> bool {
        matches!(self.backend, LobBackend::Local(_))
    }

    pub(crate) fn is_spilled(&self) -> bool {
        match &self.backend {
            LobBackend::Local(store) => store.is_spilled(),
            LobBackend::Stream { .. } => false,
        }
    }

    pub(crate) fn take_interrupted(&mut self) -> bool {
        let from_stream = match &mut self.backend {
            LobBackend::Stream { stream, .. } => stream.take_interrupted(),
            LobBackend::Local(_) => false,
        };
        std::mem::take(&mut self.interrupted) | from_stream
    }

    /// Payload length in bytes. For a stream whose header did not declare a
    /// length, the payload is read to its end once and the result cached.
    pub(crate) fn length(&mut self) -> Result<u64> {
        match &mut self.backend {
            LobBackend::Local(store) => Ok(store.length()),
            LobBackend::Stream {
                declared_length: Some(len),
                ..
            } => Ok(*len),
            LobBackend::Stream {
                stream,
                content_offset,
                declared_length,
            } => {
                stream
                    .reposition(*content_offset)
                    .map_err(|e| seek_error(e, 1))?;
                let len = stream.skip_to_end().map_err(LobError::from_io)?;
                tracing::trace!(length = len, "computed length of undeclared LOB stream");
                *declared_length = Some(len);
                Ok(len)
            }
        }
    }

    /// Fails with `PositionTooLarge` when `offset` lies beyond the payload end.
    pub(crate) fn check_position(&mut self, offset: u64) -> Result<()> {
        let position = offset as i64 + 1;
        match &mut self.backend {
            LobBackend::Local(store) => {
                if offset > store.length() {
                    return Err(LobError::PositionTooLarge { position });
                }
                Ok(())
            }
            LobBackend::Stream {
                stream,
                content_offset,
                declared_length,
            } => {
                if let Some(len) = declared_length {
                    if offset > *len {
                        return Err(LobError::PositionTooLarge { position });
                    }
                }
                stream
                    .reposition(*content_offset + offset)
                    .map_err(|e| seek_error(e, position))
            }
        }
    }

    /// Reads from `offset`, returning the number of bytes read. 0 means the
    /// end of the payload.
    pub(crate) fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        match &mut self.backend {
            LobBackend::Local(store) => store.read_at(offset, buf).map_err(LobError::from_io),
            LobBackend::Stream {
                stream,
                content_offset,
                declared_length,
            } => {
                let want = match declared_length {
                    Some(len) if offset >= *len => return Ok(0),
                    Some(len) => ((*len - offset) as usize).min(buf.len()),
                    None => buf.len(),
                };
                match stream.reposition(*content_offset + offset) {
                    Ok(()) => {}
                    Err(SeekError::PastEnd { .. }) => return Ok(0),
                    Err(SeekError::Io(e)) => return Err(LobError::from_io(e)),
                }
                let mut filled = 0;
                while filled < want {
                    let n = stream
                        .read_into(&mut buf[filled..want])
                        .map_err(LobError::from_io)?;
                    if n == 0 {
                        break;
                    }
                    filled += n;
                }
                Ok(filled)
            }
        }
    }

    /// Reads up to `len` bytes from `offset` into a vector sized to what was
    /// actually available.
    pub(crate) fn read_range(&mut self, offset: u64, len: u64, chunk: usize) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(len.min(chunk as u64) as usize);
        let mut buf = vec![0u8; chunk.max(1)];
        while (out.len() as u64) < len {
            let want = ((len - out.len() as u64) as usize).min(buf.len());
            let n = self.read_at(offset + out.len() as u64, &mut buf[..want])?;
            if n == 0 {
                break;
            }
            out.extend_from_slice(&buf[..n]);
        }
        Ok(out)
    }

    /// Promotes a stream-backed handle to a local store, copying `upto` bytes
    /// of payload (all of it when `None`).
    pub(crate) fn materialize(&mut self, upto: Option<u64>, config: &Arc<LobConfig>) -> Result<()> {
        let LobBackend::Stream {
            stream,
            content_offset,
            ..
        } = &mut self.backend
        else {
            return Ok(());
        };

        stream.reposition(*content_offset).map_err(|e| match e {
            SeekError::PastEnd { .. } => {
                LobError::StreamSetupFailure(io::Error::from(io::ErrorKind::UnexpectedEof))
            }
            SeekError::Io(e) => LobError::setup(e),
        })?;
        let mut store = LobStreamControl::new(Arc::clone(config));
        let copied = store.copy_data(stream, upto).map_err(LobError::setup)?;
        if let Some(limit) = upto {
            if copied < limit {
                return Err(LobError::StreamSetupFailure(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    format!("LOB stream ended after {copied} of {limit} bytes"),
                )));
            }
        }
        self.interrupted |= stream.take_interrupted();

        let previous = std::mem::replace(&mut self.backend, LobBackend::Local(store));
        if let LobBackend::Stream { mut stream, .. } = previous {
            stream.close_stream();
        }
        tracing::debug!(copied, spilled = self.is_spilled(), "materialized stream-backed LOB");
        Ok(())
    }

    pub(crate) fn write_at(&mut self, offset: u64, data: &[u8], config: &Arc<LobConfig>) -> Result<u64> {
        let store = self.local_mut(None, config)?;
        let end = store.write_at(offset, data).map_err(LobError::from_io)?;
        self.char_length = None;
        Ok(end)
    }

    pub(crate) fn truncate(&mut self, new_len: u64, config: &Arc<LobConfig>) -> Result<()> {
        if !self.is_materialized() {
            self.materialize(Some(new_len), config)?;
            self.char_length = None;
            return Ok(());
        }
        self.local_mut(None, config)?.truncate(new_len)?;
        self.char_length = None;
        Ok(())
    }

    pub(crate) fn replace_bytes(
        &mut self,
        data: &[u8],
        start: u64,
        end: u64,
        config: &Arc<LobConfig>,
    ) -> Result<u64> {
        let new_len = self.local_mut(None, config)?.replace_bytes(data, start, end)?;
        self.char_length = None;
        Ok(new_len)
    }

    /// Promotes if needed and returns the local store.
    pub(crate) fn local_mut(
        &mut self,
        upto: Option<u64>,
        config: &Arc<LobConfig>,
    ) -> Result<&mut LobStreamControl> {
        self.materialize(upto, config)?;
        match &mut self.backend {
            LobBackend::Local(store) => Ok(store),
            LobBackend::Stream { .. } => Err(LobError::StreamSetupFailure(io::Error::other(
                "LOB still stream-backed after materialization",
            ))),
        }
    }

    /// Closes the stream or frees the local store.
    pub(crate) fn release(&mut self) {
        match &mut self.backend {
            LobBackend::Stream { stream, .. } => stream.close_stream(),
            LobBackend::Local(store) => store.free(),
        }
    }
}

fn seek_error(err: SeekError, position: i64) -> LobError {
    match err {
        SeekError::PastEnd { .. } => LobError::PositionTooLarge { position },
        SeekError::Io(e) => LobError::from_io(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{ContainerHandle, MemoryStoreStream};

    fn config() -> Arc<LobConfig> {
        Arc::new(LobConfig::default())
    }

    fn stream_handle(payload: &[u8], declared: bool) -> (LobHandle, ContainerHandle) {
        let container = ContainerHandle::new();
        let stream = if declared {
            MemoryStoreStream::with_payload(payload, container.clone())
        } else {
            let mut data = StreamHeader::encode(None);
            data.extend_from_slice(payload);
            MemoryStoreStream::new(data, container.clone())
        };
        let handle = LobHandle::from_source(
            LobKind::Binary,
            LobSource::Resettable(Box::new(stream)),
            config(),
        )
        .unwrap();
        (handle, container)
    }

    #[test]
    fn test_declared_length_needs_no_payload_read() {
        let (mut handle, container) = stream_handle(&[5u8; 300], true);
        let served = container.bytes_served();
        assert_eq!(handle.length().unwrap(), 300);
        assert_eq!(container.bytes_served(), served);
        assert!(!handle.is_materialized());
    }

    #[test]
    fn test_undeclared_length_is_computed_once() {
        let (mut handle, container) = stream_handle(b"abcdefgh", false);
        assert_eq!(handle.length().unwrap(), 8);
        let served = container.bytes_served();
        assert_eq!(handle.length().unwrap(), 8);
        assert_eq!(container.bytes_served(), served);
    }

    #[test]
    fn test_read_at_stream_backed() {
        let (mut handle, _) = stream_handle(b"0123456789", true);
        let mut buf = [0u8; 4];
        assert_eq!(handle.read_at(6, &mut buf).unwrap(), 4);
        assert_eq!(&buf, b"6789");
        assert_eq!(handle.read_at(2, &mut buf).unwrap(), 4);
        assert_eq!(&buf, b"2345");
        assert_eq!(handle.read_at(10, &mut buf).unwrap(), 0);
        assert_eq!(handle.read_at(50, &mut buf).unwrap(), 0);
    }

    #[test]
    fn test_check_position() {
        let (mut handle, _) = stream_handle(b"0123", false);
        handle.check_position(4).unwrap();
        assert!(matches!(
            handle.check_position(5),
            Err(LobError::PositionTooLarge { position: 6 })
        ));

        let mut local = LobHandle::empty(LobKind::Binary, config());
        local.check_position(0).unwrap();
        assert!(local.check_position(1).is_err());
    }

    #[test]
    fn test_write_promotes_and_keeps_tail() {
        let (mut handle, _) = stream_handle(b"hello world", true);
        handle.write_at(0, b"J", &config()).unwrap();
        assert!(handle.is_materialized());
        assert_eq!(handle.read_range(0, 100, 4).unwrap(), b"Jello world");
    }

    #[test]
    fn test_truncate_promotion_copies_prefix_only() {
        let (mut handle, container) = stream_handle(&[1u8; 1000], true);
        handle.truncate(10, &config()).unwrap();
        assert!(handle.is_materialized());
        assert_eq!(handle.length().unwrap(), 10);
        assert!(container.bytes_served() < 100);
    }

    #[test]
    fn test_closed_container_during_promotion() {
        let (mut handle, container) = stream_handle(b"abc", true);
        container.close();
        assert!(matches!(
            handle.write_at(0, b"x", &config()),
            Err(LobError::AccessedAfterCommit)
        ));
        assert!(!handle.is_materialized());
    }

    #[test]
    fn test_reader_source_is_drained() {
        let reader: Box<dyn Read + Send> = Box::new(io::Cursor::new(b"raw bytes".to_vec()));
        let mut handle =
            LobHandle::from_source(LobKind::Binary, LobSource::Reader(reader), config()).unwrap();
        assert!(handle.is_materialized());
        assert_eq!(handle.length().unwrap(), 9);
    }
}
