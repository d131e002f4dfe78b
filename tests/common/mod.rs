#![allow(dead_code, missing_docs, clippy::unwrap_used)]

use std::path::Path;
use std::sync::{Arc, Mutex};

use fd_pool::policy::LruPolicy;
use fd_pool::{EvictionPolicy, FileDescriptor, FileId};

/// Install a subscriber so `RUST_LOG=trace cargo test` shows pool activity.
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Descriptor that never touches the filesystem. Handy for registry and
/// eviction tests where only the bookkeeping matters.
#[derive(Debug)]
pub struct NullFd;

impl FileDescriptor for NullFd {
    fn open(_path: &Path, _write: bool) -> std::io::Result<Self> {
        Ok(NullFd)
    }

    fn close(self) -> std::io::Result<()> {
        Ok(())
    }
}

/// One policy-visible lifecycle event.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PoolEvent {
    IntentToOpen { write: bool },
    Opened(FileId),
    Closed(FileId),
    Used(FileId),
}

/// Shared recording of every event a [`CountingPolicy`] sees.
#[derive(Clone, Default)]
pub struct EventLog {
    events: Arc<Mutex<Vec<PoolEvent>>>,
}

impl EventLog {
    pub fn push(&self, event: PoolEvent) {
        self.events.lock().unwrap().push(event);
    }

    pub fn intents(&self) -> usize {
        self.count(|e| matches!(e, PoolEvent::IntentToOpen { .. }))
    }

    pub fn opened(&self) -> usize {
        self.count(|e| matches!(e, PoolEvent::Opened(_)))
    }

    pub fn closed(&self) -> usize {
        self.count(|e| matches!(e, PoolEvent::Closed(_)))
    }

    pub fn used(&self) -> usize {
        self.count(|e| matches!(e, PoolEvent::Used(_)))
    }

    pub fn closed_ids(&self) -> Vec<FileId> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter_map(|e| match e {
                PoolEvent::Closed(id) => Some(*id),
                _ => None,
            })
            .collect()
    }

    fn count(&self, pred: impl Fn(&PoolEvent) -> bool) -> usize {
        self.events.lock().unwrap().iter().filter(|e| pred(e)).count()
    }
}

/// LRU policy that records every event it observes.
pub struct CountingPolicy {
    log: EventLog,
    inner: LruPolicy,
}

impl CountingPolicy {
    /// Returns the policy and a handle to its event log.
    pub fn new() -> (Self, EventLog) {
        let log = EventLog::default();
        (
            Self {
                log: log.clone(),
                inner: LruPolicy::new(),
            },
            log,
        )
    }
}

impl EvictionPolicy for CountingPolicy {
    fn note_intent_to_open(&mut self, write: bool) {
        self.log.push(PoolEvent::IntentToOpen { write });
        self.inner.note_intent_to_open(write);
    }

    fn note_opened(&mut self, id: FileId) {
        self.log.push(PoolEvent::Opened(id));
        self.inner.note_opened(id);
    }

    fn note_closed(&mut self, id: FileId) {
        self.log.push(PoolEvent::Closed(id));
        self.inner.note_closed(id);
    }

    fn note_used(&mut self, id: FileId) {
        self.log.push(PoolEvent::Used(id));
        self.inner.note_used(id);
    }

    fn eviction_order(&self) -> Vec<FileId> {
        self.inner.eviction_order()
    }
}
