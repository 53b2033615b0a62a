//! # LOB Connection
//!
//! `LobConnection` is the connection-scoped owner of every large object
//! created on a connection. It holds the connection monitor, a single
//! `parking_lot::Mutex` around the [`registry`](registry) arena, and every
//! LOB operation takes that monitor for its whole duration.
//!
//! ```text
//!   LobConnection ──Arc──► ConnectionShared
//!        ▲                   ├── monitor: Mutex<LobRegistry>
//!        │                   │       ├── Slab<Slot{generation, LobHandle}>
//!        │                   │       └── LocatorTable
//!        │                   └── config: Arc<LobConfig>
//!        │
//!   Blob / Clob { conn, id: LobId }   (keys, no data)
//! ```
//!
//! ## Transaction Boundary
//!
//! The engine calls [`LobConnection::on_transaction_boundary`] after every
//! commit, rollback and on close. All live LOBs are released: streams are
//! closed, spill files deleted, locators forgotten. A `Blob` kept across the
//! boundary resolves to `ObjectInvalid` afterwards. After `Close`, creating
//! new LOBs fails with `ConnectionClosed`.
//!
//! ## Locators
//!
//! Remote clients refer to LOBs through integer locators. `lookup_locator`
//! maps one back to its LOB; `release_locator` frees the LOB it names.
//!
//! ## Lock Ordering
//!
//! The only operation that needs two monitors is a pattern search whose
//! pattern LOB lives on another connection. Both monitors are then taken in
//! address order.

mod builder;
mod locator;
pub(crate) mod registry;

use std::io::Read;
use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};

use crate::config::LobConfig;
use crate::error::Result;
use crate::lob::handle::{LobHandle, LobKind, LobSource};
use crate::lob::{Blob, Clob};
use crate::storage::StoreStream;

pub use builder::LobConnectionBuilder;
pub(crate) use registry::{LobId, LobRegistry};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionEvent {
    Commit,
    Rollback,
    Close,
}

/// A live LOB found through its locator.
#[derive(Debug, Clone)]
pub enum LobRef {
    Blob(Blob),
    Clob(Clob),
}

pub(crate) struct ConnectionShared {
    pub(crate) monitor: Mutex<LobRegistry>,
    pub(crate) config: Arc<LobConfig>,
}

#[derive(Clone)]
pub struct LobConnection {
    pub(crate) shared: Arc<ConnectionShared>,
}

impl Default for LobConnection {
    fn default() -> Self {
        Self::with_config(LobConfig::default())
    }
}

impl std::fmt::Debug for LobConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LobConnection")
            .field("config", &self.shared.config)
            .field("live_lobs", &self.live_lobs())
            .finish()
    }
}

impl LobConnection {
    pub fn builder() -> LobConnectionBuilder {
        LobConnectionBuilder::new()
    }

    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: LobConfig) -> Self {
        Self {
            shared: Arc::new(ConnectionShared {
                monitor: Mutex::new(LobRegistry::new()),
                config: Arc::new(config),
            }),
        }
    }

    pub fn config(&self) -> &LobConfig {
        &self.shared.config
    }

    pub(crate) fn same_connection(&self, other: &LobConnection) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }

    /// Inserts `handle` and reports any interrupt seen while building it.
    fn register(&self, mut handle: LobHandle) -> Result<LobId> {
        let interrupted = handle.take_interrupted();
        let mut registry = self.shared.monitor.lock();
        let id = registry.insert(handle)?;
        registry.note_interrupt(interrupted);
        Ok(id)
    }

    fn create(&self, kind: LobKind, source: LobSource) -> Result<LobId> {
        if self.shared.monitor.lock().is_closed() {
            return Err(crate::error::LobError::ConnectionClosed);
        }
        let handle = LobHandle::from_source(kind, source, Arc::clone(&self.shared.config))?;
        self.register(handle)
    }

    /// Creates an empty, writable BLOB.
    pub fn create_blob(&self) -> Result<Blob> {
        let handle = LobHandle::empty(LobKind::Binary, Arc::clone(&self.shared.config));
        Ok(Blob::new(self.clone(), self.register(handle)?))
    }

    pub fn create_blob_from(&self, source: LobSource) -> Result<Blob> {
        Ok(Blob::new(self.clone(), self.create(LobKind::Binary, source)?))
    }

    pub fn blob_from_bytes(&self, data: impl Into<Vec<u8>>) -> Result<Blob> {
        self.create_blob_from(LobSource::Bytes(data.into()))
    }

    /// Wraps a long-column stream without reading its payload.
    pub fn blob_from_store_stream(&self, stream: Box<dyn StoreStream>) -> Result<Blob> {
        self.create_blob_from(LobSource::Resettable(stream))
    }

    /// Drains `reader` into a new local BLOB.
    pub fn blob_from_reader(&self, reader: Box<dyn Read + Send>) -> Result<Blob> {
        self.create_blob_from(LobSource::Reader(reader))
    }

    pub fn create_clob(&self) -> Result<Clob> {
        let handle = LobHandle::empty(LobKind::Character, Arc::clone(&self.shared.config));
        Ok(Clob::new(self.clone(), self.register(handle)?))
    }

    pub fn create_clob_from(&self, source: LobSource) -> Result<Clob> {
        Ok(Clob::new(self.clone(), self.create(LobKind::Character, source)?))
    }

    pub fn clob_from_string(&self, text: impl Into<String>) -> Result<Clob> {
        self.create_clob_from(LobSource::Bytes(text.into().into_bytes()))
    }

    pub fn clob_from_store_stream(&self, stream: Box<dyn StoreStream>) -> Result<Clob> {
        self.create_clob_from(LobSource::Resettable(stream))
    }

    /// Releases every live LOB of this connection. Returns how many were
    /// released.
    pub fn on_transaction_boundary(&self, event: TransactionEvent) -> usize {
        let mut registry = self.shared.monitor.lock();
        let released = match event {
            TransactionEvent::Commit | TransactionEvent::Rollback => registry.free_all(),
            TransactionEvent::Close => registry.close(),
        };
        tracing::debug!(?event, released, "released LOBs at transaction boundary");
        released
    }

    pub fn lookup_locator(&self, locator: i32) -> Option<LobRef> {
        let mut registry = self.shared.monitor.lock();
        let id = registry.lookup_locator(locator)?;
        let kind = registry.handle_mut(id).ok()?.kind();
        Some(match kind {
            LobKind::Binary => LobRef::Blob(Blob::new(self.clone(), id)),
            LobKind::Character => LobRef::Clob(Clob::new(self.clone(), id)),
        })
    }

    /// Frees the LOB named by `locator`. Returns false if no live LOB had it.
    pub fn release_locator(&self, locator: i32) -> Result<bool> {
        let mut registry = self.shared.monitor.lock();
        let Some(id) = registry.lookup_locator(locator) else {
            return Ok(false);
        };
        Ok(registry.free(id))
    }

    /// Returns whether an interrupt was observed during LOB I/O since the
    /// last call, clearing the flag.
    pub fn take_interrupt_status(&self) -> bool {
        self.shared.monitor.lock().take_interrupt()
    }

    /// Number of live LOBs currently holding a spill file.
    pub fn open_spill_files(&self) -> usize {
        self.shared.monitor.lock().spilled_count()
    }

    pub fn live_lobs(&self) -> usize {
        self.shared.monitor.lock().live_count()
    }

    /// Number of locators currently issued.
    pub fn open_locators(&self) -> usize {
        self.shared.monitor.lock().locator_count()
    }

    pub fn is_closed(&self) -> bool {
        self.shared.monitor.lock().is_closed()
    }
}

/// Locks the monitors of two different connections in address order and
/// returns the guards in argument order.
pub(crate) fn lock_pair<'a>(
    a: &'a ConnectionShared,
    b: &'a ConnectionShared,
) -> (MutexGuard<'a, LobRegistry>, MutexGuard<'a, LobRegistry>) {
    if (a as *const ConnectionShared) < (b as *const ConnectionShared) {
        let first = a.monitor.lock();
        let second = b.monitor.lock();
        (first, second)
    } else {
        let first = b.monitor.lock();
        let second = a.monitor.lock();
        (second, first)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LobError;

    #[test]
    fn test_boundary_releases_everything() {
        let conn = LobConnection::new();
        let a = conn.blob_from_bytes(b"abc".to_vec()).unwrap();
        conn.create_clob().unwrap();
        assert_eq!(conn.live_lobs(), 2);

        assert_eq!(conn.on_transaction_boundary(TransactionEvent::Commit), 2);
        assert_eq!(conn.live_lobs(), 0);
        assert!(matches!(a.length(), Err(LobError::ObjectInvalid)));

        conn.create_blob().unwrap();
        assert_eq!(conn.on_transaction_boundary(TransactionEvent::Rollback), 1);
    }

    #[test]
    fn test_close_rejects_new_lobs() {
        let conn = LobConnection::new();
        conn.on_transaction_boundary(TransactionEvent::Close);
        assert!(conn.is_closed());
        assert!(matches!(conn.create_blob(), Err(LobError::ConnectionClosed)));
        assert!(matches!(
            conn.clob_from_string("x"),
            Err(LobError::ConnectionClosed)
        ));
    }

    #[test]
    fn test_lookup_locator_returns_matching_kind() {
        let conn = LobConnection::new();
        let blob = conn.create_blob().unwrap();
        let clob = conn.create_clob().unwrap();
        let bl = blob.locator().unwrap();
        let cl = clob.locator().unwrap();

        assert!(matches!(conn.lookup_locator(bl), Some(LobRef::Blob(_))));
        assert!(matches!(conn.lookup_locator(cl), Some(LobRef::Clob(_))));
        assert!(conn.lookup_locator(cl + 100).is_none());

        assert!(conn.release_locator(bl).unwrap());
        assert!(!conn.release_locator(bl).unwrap());
        assert!(matches!(blob.length(), Err(LobError::ObjectInvalid)));
    }

    #[test]
    fn test_lock_pair_returns_guards_in_argument_order() {
        let a = LobConnection::new();
        let b = LobConnection::new();
        a.create_blob().unwrap();
        let (ga, gb) = lock_pair(&a.shared, &b.shared);
        assert_eq!(ga.live_count(), 1);
        assert_eq!(gb.live_count(), 0);
    }
}
