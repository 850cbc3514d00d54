//! Fixed array of cache slots plus the URL → slot index.
//!
//! ## Architecture
//!
//! ```text
//!   by_url (FxHashMap<Arc<str>, usize>)      slots (Vec<Slot>, index = id)
//!   ┌──────────────┬──────┐                  ┌────┬───────────────────────────┐
//!   │ "https://a"  │  0   │ ───────────────► │ 0  │ occupant: a, artifacts {…}│
//!   │ "https://c"  │  2   │ ─────────┐       │ 1  │ occupant: -, artifacts {} │
//!   └──────────────┴──────┘          └─────► │ 2  │ occupant: c, artifacts {…}│
//!                                            └────┴───────────────────────────┘
//! ```
//!
//! `SlotStore` is not synchronized; its owner wraps it in a lock so that
//! clearing the previous occupant and writing the new one is one step.
//!
//! ## Invariants
//! - `len() <= capacity()`
//! - `by_url` and the slots' occupants are mutual inverses (injective)
//! - slot ids never change

use std::sync::Arc;

use rustc_hash::FxHashMap;

use crate::scheme::{RenderedImage, SchemeId};

/// One storage unit holding a single URL's rendered artifacts.
#[derive(Debug, Clone)]
pub struct Slot {
    id: usize,
    occupant: Option<Arc<str>>,
    artifacts: FxHashMap<SchemeId, RenderedImage>,
}

impl Slot {
    fn vacant(id: usize) -> Self {
        Self {
            id,
            occupant: None,
            artifacts: FxHashMap::default(),
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn occupant(&self) -> Option<&str> {
        self.occupant.as_deref()
    }

    pub fn is_vacant(&self) -> bool {
        self.occupant.is_none()
    }

    pub fn artifact(&self, scheme: SchemeId) -> Option<&RenderedImage> {
        self.artifacts.get(&scheme)
    }

    pub fn artifacts(&self) -> &FxHashMap<SchemeId, RenderedImage> {
        &self.artifacts
    }
}

/// Fixed-size slot array with a URL index.
#[derive(Debug)]
pub struct SlotStore {
    slots: Vec<Slot>,
    by_url: FxHashMap<Arc<str>, usize>,
}

impl SlotStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: (0..capacity).map(Slot::vacant).collect(),
            by_url: FxHashMap::with_capacity_and_hasher(capacity, Default::default()),
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of occupied slots.
    pub fn len(&self) -> usize {
        self.by_url.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_url.is_empty()
    }

    /// Slot id currently holding `url`.
    pub fn lookup(&self, url: &str) -> Option<usize> {
        self.by_url.get(url).copied()
    }

    pub fn contains(&self, url: &str) -> bool {
        self.by_url.contains_key(url)
    }

    pub fn slot(&self, id: usize) -> Option<&Slot> {
        self.slots.get(id)
    }

    /// Slot holding `url`, if any.
    pub fn get(&self, url: &str) -> Option<&Slot> {
        self.lookup(url).and_then(|id| self.slots.get(id))
    }

    /// Writes `url` and its artifacts into slot `id`, replacing whatever was
    /// there.
    ///
    /// Returns the evicted occupant, if the slot was taken by a different URL.
    /// Returns `None` without changes if `id` is out of range.
    pub fn install(
        &mut self,
        id: usize,
        url: Arc<str>,
        artifacts: FxHashMap<SchemeId, RenderedImage>,
    ) -> Option<Arc<str>> {
        if id >= self.slots.len() {
            return None;
        }

        // keep the mapping injective if `url` already lives elsewhere
        if let Some(previous) = self.by_url.get(&url).copied()
            && previous != id
        {
            self.slots[previous] = Slot::vacant(previous);
        }

        let slot = &mut self.slots[id];
        let evicted = slot.occupant.take();
        if let Some(old) = &evicted {
            self.by_url.remove(old);
        }
        slot.occupant = Some(Arc::clone(&url));
        slot.artifacts = artifacts;
        self.by_url.insert(url.clone(), id);

        evicted.filter(|old| *old != url)
    }

    #[cfg(any(test, debug_assertions))]
    pub fn debug_validate_invariants(&self) {
        assert!(self.by_url.len() <= self.slots.len());
        for (url, &id) in &self.by_url {
            assert_eq!(self.slots[id].occupant.as_ref(), Some(url));
        }
        let occupied = self.slots.iter().filter(|slot| !slot.is_vacant()).count();
        assert_eq!(occupied, self.by_url.len());
        for (id, slot) in self.slots.iter().enumerate() {
            assert_eq!(slot.id, id);
        }
    }
}
