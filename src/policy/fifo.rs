//! Implements the FIFO eviction policy.

use hashlink::LinkedHashMap;

use crate::manager::FileId;
use crate::policy::EvictionPolicy;

/// First-in-first-out eviction.
///
/// Candidates are ordered purely by open time; uses do not refresh an id's
/// position. Useful when accesses are close to uniform and the reordering
/// work of [`LruPolicy`](crate::policy::LruPolicy) buys nothing.
#[derive(Debug, Default)]
pub struct FifoPolicy {
    queue: LinkedHashMap<FileId, ()>,
}

impl FifoPolicy {
    /// Create an empty policy.
    #[must_use]
    pub fn new() -> Self {
        Self {
            queue: LinkedHashMap::new(),
        }
    }
}

impl EvictionPolicy for FifoPolicy {
    fn note_intent_to_open(&mut self, _write: bool) {}

    fn note_opened(&mut self, id: FileId) {
        self.queue.insert(id, ());
    }

    fn note_closed(&mut self, id: FileId) {
        self.queue.remove(&id);
    }

    fn note_used(&mut self, _id: FileId) {}

    fn eviction_order(&self) -> Vec<FileId> {
        self.queue.keys().copied().collect()
    }
}
