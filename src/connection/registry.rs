//! # LOB Registry
//!
//! The registry is the per-connection arena that owns every live `LobHandle`.
//! Public `Blob`/`Clob` objects hold only a [`LobId`] and resolve it here on
//! every call, under the connection monitor.
//!
//! ```text
//!   LobId { slot: 3, generation: 17 }
//!            │
//!            ▼
//!   ┌──────┬──────┬──────┬──────────────────────────┐
//!   │  0   │  1   │  2   │ 3: Slot { gen 17, handle}│  slab::Slab<Slot>
//!   └──────┴──────┴──────┴──────────────────────────┘
//! ```
//!
//! Slots are reused by the slab, so each insert stamps a fresh generation. A
//! `LobId` whose generation no longer matches its slot refers to a freed LOB
//! and resolves to `ObjectInvalid`.
//!
//! ## Transaction Boundary
//!
//! [`LobRegistry::free_all`] drains the arena, releasing each handle (closing
//! its stream or deleting its spill file) and clearing the locator table. The
//! arena is the only record of live handles; there is no secondary set of open
//! files to keep in sync.

use slab::Slab;

use crate::error::{LobError, Result};
use crate::lob::handle::LobHandle;

use super::locator::LocatorTable;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct LobId {
    slot: usize,
    generation: u64,
}

impl LobId {
    pub(crate) fn new(slot: usize, generation: u64) -> Self {
        Self { slot, generation }
    }
}

struct Slot {
    generation: u64,
    handle: LobHandle,
}

pub(crate) struct LobRegistry {
    slots: Slab<Slot>,
    next_generation: u64,
    locators: LocatorTable,
    interrupt_seen: bool,
    closed: bool,
}

impl LobRegistry {
    pub(crate) fn new() -> Self {
        Self {
            slots: Slab::new(),
            next_generation: 1,
            locators: LocatorTable::new(),
            interrupt_seen: false,
            closed: false,
        }
    }

    pub(crate) fn insert(&mut self, handle: LobHandle) -> Result<LobId> {
        if self.closed {
            return Err(LobError::ConnectionClosed);
        }
        let generation = self.next_generation;
        self.next_generation += 1;
        let slot = self.slots.insert(Slot { generation, handle });
        tracing::trace!(slot, generation, "registered LOB");
        Ok(LobId::new(slot, generation))
    }

    pub(crate) fn contains(&self, id: LobId) -> bool {
        self.slots
            .get(id.slot)
            .is_some_and(|slot| slot.generation == id.generation)
    }

    pub(crate) fn handle_mut(&mut self, id: LobId) -> Result<&mut LobHandle> {
        match self.slots.get_mut(id.slot) {
            Some(slot) if slot.generation == id.generation => Ok(&mut slot.handle),
            _ => Err(LobError::ObjectInvalid),
        }
    }

    /// Runs `op` on the handle behind `id` and records any interrupt the
    /// handle observed, whether or not `op` succeeded.
    pub(crate) fn with_handle<T, F>(&mut self, id: LobId, op: F) -> Result<T>
    where
        F: FnOnce(&mut LobHandle) -> Result<T>,
    {
        let handle = self.handle_mut(id)?;
        let result = op(handle);
        let interrupted = handle.take_interrupted();
        self.note_interrupt(interrupted);
        result
    }

    /// Resolves two distinct ids at once. The second id failing to resolve
    /// is reported as `UnableToReadPattern`.
    pub(crate) fn pattern_pair_mut(
        &mut self,
        id: LobId,
        pattern: LobId,
    ) -> Result<(&mut LobHandle, &mut LobHandle)> {
        self.handle_mut(id)?;
        if id.slot == pattern.slot || !self.contains(pattern) {
            return Err(LobError::UnableToReadPattern);
        }
        match self.slots.get2_mut(id.slot, pattern.slot) {
            Some((a, b)) => Ok((&mut a.handle, &mut b.handle)),
            None => Err(LobError::UnableToReadPattern),
        }
    }

    pub(crate) fn assign_locator(&mut self, id: LobId) -> Result<i32> {
        let handle = self.handle_mut(id)?;
        if let Some(locator) = handle.locator() {
            return Ok(locator);
        }
        let locator = self.locators.assign(id)?;
        self.handle_mut(id)?.set_locator(Some(locator));
        tracing::trace!(locator, "assigned LOB locator");
        Ok(locator)
    }

    pub(crate) fn lookup_locator(&self, locator: i32) -> Option<LobId> {
        self.locators
            .get(locator)
            .filter(|id| self.contains(*id))
    }

    pub(crate) fn locator_count(&self) -> usize {
        self.locators.len()
    }

    /// Releases the handle behind `id`. Returns false if it was already gone.
    pub(crate) fn free(&mut self, id: LobId) -> bool {
        if !self.contains(id) {
            return false;
        }
        let mut slot = self.slots.remove(id.slot);
        if let Some(locator) = slot.handle.locator() {
            self.locators.remove(locator);
            tracing::trace!(locator, "released LOB locator");
        }
        slot.handle.release();
        true
    }

    /// Releases every live handle. Returns how many were released.
    pub(crate) fn free_all(&mut self) -> usize {
        let mut released = 0;
        for mut slot in self.slots.drain() {
            slot.handle.release();
            released += 1;
        }
        self.locators.clear();
        released
    }

    pub(crate) fn close(&mut self) -> usize {
        self.closed = true;
        self.free_all()
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed
    }

    pub(crate) fn live_count(&self) -> usize {
        self.slots.len()
    }

    pub(crate) fn spilled_count(&self) -> usize {
        self.slots
            .iter()
            .filter(|(_, slot)| slot.handle.is_spilled())
            .count()
    }

    pub(crate) fn note_interrupt(&mut self, interrupted: bool) {
        if interrupted {
            tracing::warn!("interrupt observed during LOB I/O; operation completed");
            self.interrupt_seen = true;
        }
    }

    pub(crate) fn take_interrupt(&mut self) -> bool {
        std::mem::take(&mut self.interrupt_seen)
    }
}
