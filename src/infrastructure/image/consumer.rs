//! Registry of display targets with recycling-safe handles.
//!
//! List views reuse their rows: the view that asked for image A may be
//! showing image B by the time A arrives. Each registered target carries the
//! key it currently displays, and handles carry a generation so a released
//! and reused slot is never mistaken for its previous owner.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::trace;

use crate::domain::entities::CacheKey;
use crate::domain::ports::ImageTarget;

/// Handle to a registered target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConsumerHandle {
    index: u32,
    generation: u32,
}

struct Entry {
    target: Arc<dyn ImageTarget>,
    bound: Option<CacheKey>,
}

struct Slot {
    generation: u32,
    entry: Option<Entry>,
}

#[derive(Default)]
struct Arena {
    slots: Vec<Slot>,
    free: Vec<u32>,
}

impl Arena {
    fn entry(&self, handle: ConsumerHandle) -> Option<&Entry> {
        self.slots
            .get(handle.index as usize)
            .filter(|slot| slot.generation == handle.generation)
            .and_then(|slot| slot.entry.as_ref())
    }

    fn entry_mut(&mut self, handle: ConsumerHandle) -> Option<&mut Entry> {
        self.slots
            .get_mut(handle.index as usize)
            .filter(|slot| slot.generation == handle.generation)
            .and_then(|slot| slot.entry.as_mut())
    }
}

/// Arena of display targets keyed by [`ConsumerHandle`].
#[derive(Default)]
pub struct ConsumerTable {
    arena: Mutex<Arena>,
}

impl ConsumerTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a target and returns its handle.
    pub fn register(&self, target: Arc<dyn ImageTarget>) -> ConsumerHandle {
        let mut arena = self.arena.lock();
        let entry = Entry {
            target,
            bound: None,
        };
        if let Some(index) = arena.free.pop() {
            let slot = &mut arena.slots[index as usize];
            slot.entry = Some(entry);
            return ConsumerHandle {
                index,
                generation: slot.generation,
            };
        }

        let index = u32::try_from(arena.slots.len()).unwrap_or(u32::MAX);
        arena.slots.push(Slot {
            generation: 0,
            entry: Some(entry),
        });
        ConsumerHandle {
            index,
            generation: 0,
        }
    }

    /// Releases a target. Stale handles are ignored.
    ///
    /// Returns true if the handle was live.
    pub fn release(&self, handle: ConsumerHandle) -> bool {
        let mut arena = self.arena.lock();
        let Some(slot) = arena.slots.get_mut(handle.index as usize) else {
            return false;
        };
        if slot.generation != handle.generation || slot.entry.is_none() {
            return false;
        }
        slot.entry = None;
        slot.generation = slot.generation.wrapping_add(1);
        arena.free.push(handle.index);
        trace!(index = handle.index, "Released consumer");
        true
    }

    /// Records that the target now displays `key`.
    ///
    /// Returns false for a stale handle.
    pub fn bind(&self, handle: ConsumerHandle, key: CacheKey) -> bool {
        let mut arena = self.arena.lock();
        match arena.entry_mut(handle) {
            Some(entry) => {
                entry.bound = Some(key);
                true
            }
            None => false,
        }
    }

    /// Returns the key the target currently displays.
    pub fn bound_key(&self, handle: ConsumerHandle) -> Option<CacheKey> {
        self.arena.lock().entry(handle).and_then(|e| e.bound.clone())
    }

    /// Returns the target behind a live handle.
    pub fn resolve(&self, handle: ConsumerHandle) -> Option<Arc<dyn ImageTarget>> {
        self.arena.lock().entry(handle).map(|e| e.target.clone())
    }

    /// Returns the target only if it is live and still bound to `key`.
    pub fn resolve_for(
        &self,
        handle: ConsumerHandle,
        key: &CacheKey,
    ) -> Option<Arc<dyn ImageTarget>> {
        self.arena
            .lock()
            .entry(handle)
            .filter(|e| e.bound.as_ref() == Some(key))
            .map(|e| e.target.clone())
    }

    /// Returns the number of live targets.
    pub fn len(&self) -> usize {
        let arena = self.arena.lock();
        arena.slots.len() - arena.free.len()
    }

    /// Returns true if no targets are registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for ConsumerTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConsumerTable")
            .field("live", &self.len())
            .finish()
    }
}

/// Whether list row `position` lies within the visible range `first..=last`.
#[must_use]
pub const fn position_visible(first: usize, last: usize, position: usize) -> bool {
    first <= position && position <= last
}
