use std::fmt;

use parking_lot::Mutex;

/// Generation-checked index of a live component.
///
/// A handle stays valid until [`HandleArena::release`] is called for it;
/// the slot may then be reused, but under a new generation, so stale
/// handles never alias a newer instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Handle {
    index: u32,
    generation: u32,
}

impl Handle {
    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}v{}", self.index, self.generation)
    }
}

#[derive(Default)]
pub struct HandleArena {
    inner: Mutex<ArenaInner>,
}

#[derive(Default)]
struct ArenaInner {
    entries: Vec<ArenaEntry>,
    free: Vec<u32>,
}

struct ArenaEntry {
    generation: u32,
    live: bool,
}

impl HandleArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allocate(&self) -> Handle {
        let mut inner = self.inner.lock();
        if let Some(index) = inner.free.pop() {
            let entry = &mut inner.entries[index as usize];
            entry.generation = entry.generation.wrapping_add(1);
            entry.live = true;
            return Handle {
                index,
                generation: entry.generation,
            };
        }
        let index = inner.entries.len() as u32;
        inner.entries.push(ArenaEntry {
            generation: 0,
            live: true,
        });
        Handle { index, generation: 0 }
    }

    /// Invalidate `handle`. Returns false if it was already stale.
    pub fn release(&self, handle: Handle) -> bool {
        let mut inner = self.inner.lock();
        let Some(entry) = inner.entries.get_mut(handle.index as usize) else {
            return false;
        };
        if !entry.live || entry.generation != handle.generation {
            return false;
        }
        entry.live = false;
        inner.free.push(handle.index);
        true
    }

    pub fn is_live(&self, handle: Handle) -> bool {
        self.inner
            .lock()
            .entries
            .get(handle.index as usize)
            .is_some_and(|e| e.live && e.generation == handle.generation)
    }

    pub fn live_count(&self) -> usize {
        self.inner.lock().entries.iter().filter(|e| e.live).count()
    }
}

impl fmt::Debug for HandleArena {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandleArena")
            .field("live", &self.live_count())
            .finish()
    }
}
