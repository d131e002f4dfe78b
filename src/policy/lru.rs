//! Implements the LRU eviction policy.

use hashlink::LinkedHashMap;
use tracing::trace;

use crate::manager::FileId;
use crate::policy::EvictionPolicy;

/// Least-recently-used eviction.
///
/// Keeps ids in a linked hash map ordered oldest-first. A use unlinks the id
/// and re-appends it at the back, so the front is always the best victim.
/// Ids opened at the same instant stay in insertion order, which makes ties
/// FIFO.
#[derive(Debug, Default)]
pub struct LruPolicy {
    queue: LinkedHashMap<FileId, ()>,
}

impl LruPolicy {
    /// Create an empty policy.
    #[must_use]
    pub fn new() -> Self {
        Self {
            queue: LinkedHashMap::new(),
        }
    }
}

impl EvictionPolicy for LruPolicy {
    fn note_intent_to_open(&mut self, _write: bool) {}

    fn note_opened(&mut self, id: FileId) {
        self.queue.insert(id, ());
    }

    fn note_closed(&mut self, id: FileId) {
        self.queue.remove(&id);
    }

    fn note_used(&mut self, id: FileId) {
        // Unlink and re-append; the back is the most recently used.
        if self.queue.remove(&id).is_some() {
            self.queue.insert(id, ());
        } else {
            trace!(id, "use notification for an id no longer tracked");
        }
    }

    fn eviction_order(&self) -> Vec<FileId> {
        self.queue.keys().copied().collect()
    }
}
