//! # Store Streams
//!
//! A store stream is the engine's view of a long column: a forward-only byte
//! source that begins with a length header and can be rewound to its absolute
//! start. The LOB layer never seeks a store stream directly; it resets and
//! skips forward through [`PositionedStream`](super::PositionedStream).
//!
//! ## Container Lifetime
//!
//! Long columns live in containers owned by the transaction that opened them.
//! When that transaction commits, the container is closed underneath any
//! stream still reading from it. Streams report this with an `io::Error`
//! carrying the [`ContainerClosed`] marker, which the LOB layer surfaces as
//! `LobError::AccessedAfterCommit` rather than a generic I/O failure.
//!
//! ## Implementations
//!
//! - [`MemoryStoreStream`]: long column held in memory, sharing a
//!   [`ContainerHandle`] that the owner closes at commit time
//! - [`FileStoreStream`]: long column stored in a region of a file

use std::fmt;
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

pub trait StoreStream: Read + Send {
    /// Rewinds to absolute offset 0, before the length header.
    fn reset_stream(&mut self) -> io::Result<()>;

    /// Releases engine resources. Must tolerate repeated calls.
    fn close_stream(&mut self);

    /// Skips up to `n` bytes, returning how many were skipped. Returns 0 only
    /// at end of stream. An `Interrupted` read is passed to the caller so the
    /// observation is not lost.
    fn skip(&mut self, n: u64) -> io::Result<u64> {
        let mut scratch = [0u8; SKIP_SCRATCH_SIZE];
        let want = n.min(SKIP_SCRATCH_SIZE as u64) as usize;
        let read = self.read(&mut scratch[..want])?;
        Ok(read as u64)
    }
}

const SKIP_SCRATCH_SIZE: usize = 4096;

#[derive(Debug, Clone, Copy)]
pub struct ContainerClosed;

impl fmt::Display for ContainerClosed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "long-column container has been closed")
    }
}

impl std::error::Error for ContainerClosed {}

pub fn container_closed_error() -> io::Error {
    io::Error::other(ContainerClosed)
}

pub fn is_container_closed(err: &io::Error) -> bool {
    err.get_ref().is_some_and(|inner| inner.is::<ContainerClosed>())
}

/// Shared view of a container's state, held by the engine side.
#[derive(Debug, Clone, Default)]
pub struct ContainerHandle {
    inner: Arc<ContainerState>,
}

#[derive(Debug, Default)]
struct ContainerState {
    closed: AtomicBool,
    bytes_served: AtomicU64,
}

impl ContainerHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Closes the container, as a commit would.
    pub fn close(&self) {
        self.inner.closed.store(true, Ordering::Release);
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// Total bytes read or skipped through every stream on this container.
    pub fn bytes_served(&self) -> u64 {
        self.inner.bytes_served.load(Ordering::Acquire)
    }

    fn check_open(&self) -> io::Result<()> {
        if self.is_closed() {
            return Err(container_closed_error());
        }
        Ok(())
    }

    fn record(&self, n: u64) {
        self.inner.bytes_served.fetch_add(n, Ordering::AcqRel);
    }
}

pub struct MemoryStoreStream {
    data: Arc<[u8]>,
    pos: usize,
    container: ContainerHandle,
    closed: bool,
}

impl MemoryStoreStream {
    /// Wraps raw column bytes, header included.
    pub fn new(data: impl Into<Arc<[u8]>>, container: ContainerHandle) -> Self {
        Self {
            data: data.into(),
            pos: 0,
            container,
            closed: false,
        }
    }

    /// Builds a column from a payload, prefixing it with the encoded header.
    pub fn with_payload(payload: &[u8], container: ContainerHandle) -> Self {
        let header = super::StreamHeader::encode(Some(payload.len() as u64));
        let mut data = Vec::with_capacity(header.len() + payload.len());
        data.extend_from_slice(&header);
        data.extend_from_slice(payload);
        Self::new(data, container)
    }

    fn check(&self) -> io::Result<()> {
        if self.closed {
            return Err(io::Error::other("store stream already closed"));
        }
        self.container.check_open()
    }
}

impl Read for MemoryStoreStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.check()?;
        let remaining = &self.data[self.pos.min(self.data.len())..];
        let n = remaining.len().min(buf.len());
        buf[..n].copy_from_slice(&remaining[..n]);
        self.pos += n;
        self.container.record(n as u64);
        Ok(n)
    }
}

impl StoreStream for MemoryStoreStream {
    fn reset_stream(&mut self) -> io::Result<()> {
        self.check()?;
        self.pos = 0;
        Ok(())
    }

    fn close_stream(&mut self) {
        self.closed = true;
    }

    fn skip(&mut self, n: u64) -> io::Result<u64> {
        self.check()?;
        let available = self.data.len().saturating_sub(self.pos) as u64;
        let skipped = n.min(available);
        self.pos += skipped as usize;
        self.container.record(skipped);
        Ok(skipped)
    }
}

/// Long column occupying `[start, start + len)` of a file.
pub struct FileStoreStream {
    file: Option<File>,
    start: u64,
    len: u64,
    pos: u64,
    container: ContainerHandle,
}

impl FileStoreStream {
    pub fn open(
        path: impl AsRef<Path>,
        start: u64,
        len: u64,
        container: ContainerHandle,
    ) -> io::Result<Self> {
        let mut file = File::open(path)?;
        file.seek(SeekFrom::Start(start))?;
        Ok(Self {
            file: Some(file),
            start,
            len,
            pos: 0,
            container,
        })
    }

    fn file(&mut self) -> io::Result<&mut File> {
        self.container.check_open()?;
        self.file
            .as_mut()
            .ok_or_else(|| io::Error::other("store stream already closed"))
    }
}

impl Read for FileStoreStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let remaining = self.len.saturating_sub(self.pos);
        let want = (buf.len() as u64).min(remaining) as usize;
        if want == 0 {
            return Ok(0);
        }
        let n = self.file()?.read(&mut buf[..want])?;
        self.pos += n as u64;
        self.container.record(n as u64);
        Ok(n)
    }
}

impl StoreStream for FileStoreStream {
    fn reset_stream(&mut self) -> io::Result<()> {
        let start = self.start;
        self.file()?.seek(SeekFrom::Start(start))?;
        self.pos = 0;
        Ok(())
    }

    fn close_stream(&mut self) {
        self.file = None;
    }

    fn skip(&mut self, n: u64) -> io::Result<u64> {
        let skipped = n.min(self.len.saturating_sub(self.pos));
        let target = self.start + self.pos + skipped;
        self.file()?.seek(SeekFrom::Start(target))?;
        self.pos += skipped;
        self.container.record(skipped);
        Ok(skipped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_memory_stream_reset_and_skip() {
        let container = ContainerHandle::new();
        let mut stream = MemoryStoreStream::new(vec![1u8, 2, 3, 4, 5], container.clone());

        assert_eq!(stream.skip(3).unwrap(), 3);
        let mut buf = [0u8; 4];
        assert_eq!(stream.read(&mut buf).unwrap(), 2);
        assert_eq!(&buf[..2], &[4, 5]);
        assert_eq!(stream.skip(10).unwrap(), 0);

        stream.reset_stream().unwrap();
        assert_eq!(stream.read(&mut buf).unwrap(), 4);
        assert_eq!(buf, [1, 2, 3, 4]);
        assert_eq!(container.bytes_served(), 3 + 2 + 4);
    }

    #[test]
    fn test_closed_container_reports_marker() {
        let container = ContainerHandle::new();
        let mut stream = MemoryStoreStream::new(vec![0u8; 8], container.clone());
        container.close();

        let err = stream.read(&mut [0u8; 2]).unwrap_err();
        assert!(is_container_closed(&err));
        assert!(is_container_closed(&stream.reset_stream().unwrap_err()));
    }

    #[test]
    fn test_close_stream_is_idempotent() {
        let mut stream = MemoryStoreStream::new(vec![0u8; 8], ContainerHandle::new());
        stream.close_stream();
        stream.close_stream();
        let err = stream.read(&mut [0u8; 2]).unwrap_err();
        assert!(!is_container_closed(&err));
    }

    #[test]
    fn test_file_stream_reads_region() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"xxxxHELLOWORLDyyyy").unwrap();
        file.flush().unwrap();

        let mut stream =
            FileStoreStream::open(file.path(), 4, 10, ContainerHandle::new()).unwrap();
        let mut out = String::new();
        stream.read_to_string(&mut out).unwrap();
        assert_eq!(out, "HELLOWORLD");

        stream.reset_stream().unwrap();
        assert_eq!(stream.skip(5).unwrap(), 5);
        let mut out = String::new();
        stream.read_to_string(&mut out).unwrap();
        assert_eq!(out, "WORLD");
        assert_eq!(stream.skip(1).unwrap(), 0);
    }
}
