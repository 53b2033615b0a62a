//! # LOB Locators
//!
//! A locator is a small positive integer naming a live LOB for a remote
//! client. Locators are issued lazily, on the first `locator()` call, and stay
//! stable until the LOB is freed.
//!
//! ## Allocation
//!
//! ```text
//!   last ──► last + 1 ──► reserved? ──yes──► try next
//!                 │            │
//!                 │            no
//!                 ▼            ▼
//!          overflow / ≤ 0   in use? ──yes──► try next
//!          wrap to 1           │
//!                              no ──► issue
//! ```
//!
//! The values in `RESERVED_LOCATORS` collide with protocol markers and are
//! never issued. When the counter wraps, values still held by live LOBs are
//! skipped; if every issuable value is in use, allocation fails with
//! `LocatorsExhausted`.

use hashbrown::HashMap;

use crate::config::{FIRST_LOCATOR, RESERVED_LOCATORS};
use crate::error::{LobError, Result};

use super::registry::LobId;

const ISSUABLE_LOCATORS: usize = i32::MAX as usize - RESERVED_LOCATORS.len();

#[derive(Debug)]
pub(crate) struct LocatorAllocator {
    last: i32,
}

impl LocatorAllocator {
    pub(crate) fn new() -> Self {
        Self {
            last: FIRST_LOCATOR - 1,
        }
    }

    #[cfg(test)]
    pub(crate) fn starting_after(last: i32) -> Self {
        Self { last }
    }

    fn candidate_after(value: i32) -> i32 {
        match value.checked_add(1) {
            Some(next) if next >= FIRST_LOCATOR => next,
            _ => FIRST_LOCATOR,
        }
    }

    /// Issues the next value for which `in_use` is false.
    pub(crate) fn next<F>(&mut self, used: usize, in_use: F) -> Result<i32>
    where
        F: Fn(i32) -> bool,
    {
        if used >= ISSUABLE_LOCATORS {
            return Err(LobError::LocatorsExhausted);
        }
        let mut candidate = Self::candidate_after(self.last);
        while RESERVED_LOCATORS.contains(&candidate) || in_use(candidate) {
            candidate = Self::candidate_after(candidate);
        }
        self.last = candidate;
        Ok(candidate)
    }
}

#[derive(Debug)]
pub(crate) struct LocatorTable {
    allocator: LocatorAllocator,
    entries: HashMap<i32, LobId>,
}

impl LocatorTable {
    pub(crate) fn new() -> Self {
        Self::with_allocator(LocatorAllocator::new())
    }

    pub(crate) fn with_allocator(allocator: LocatorAllocator) -> Self {
        Self {
            allocator,
            entries: HashMap::new(),
        }
    }

    pub(crate) fn assign(&mut self, id: LobId) -> Result<i32> {
        let entries = &self.entries;
        let locator = self
            .allocator
            .next(entries.len(), |value| entries.contains_key(&value))?;
        self.entries.insert(locator, id);
        Ok(locator)
    }

    pub(crate) fn get(&self, locator: i32) -> Option<LobId> {
        self.entries.get(&locator).copied()
    }

    pub(crate) fn remove(&mut self, locator: i32) -> Option<LobId> {
        self.entries.remove(&locator)
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn clear(&mut self) {
        self.entries.clear();
    }
}
