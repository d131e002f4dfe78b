//! The process-wide authority over descriptor opens and closes.
//!
//! [`FileManager`] enforces the global cap on simultaneously open
//! descriptors, mediates every open/close through the eviction policy, and
//! owns the registry mapping canonical paths to live handlers.

use std::any::{Any, TypeId, type_name};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Instant;

use nix::sys::resource::{Resource, getrlimit};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tracing::{debug, trace, warn};

use crate::canonical::weakly_canonical;
use crate::descriptor::FileDescriptor;
use crate::error::PoolError;
use crate::handler::FileHandler;
use crate::policy::{EvictionPolicy, LruPolicy};

/// Stable, hashable identifier of one open descriptor.
///
/// Unique for the lifetime of the open; ids are never reused within one
/// manager.
pub type FileId = u64;

/// Fallback cap when the OS refuses to report its open-file limit.
const FALLBACK_LIMIT: usize = 1024;

/// Pool construction options.
///
/// `limit == 0` (the default) means: discover the cap from the OS
/// per-process soft limit on open files, minus `reserved` slots for the
/// standard streams. A positive `limit` is used as-is.
#[derive(Debug, Clone, Copy)]
pub struct PoolOptions {
    /// Maximum number of simultaneously open descriptors; 0 to discover.
    pub limit: usize,
    /// Slots subtracted from the discovered OS limit (stdin/stdout/stderr).
    pub reserved: usize,
}

impl Default for PoolOptions {
    fn default() -> Self {
        Self {
            limit: 0,
            reserved: 3,
        }
    }
}

/// Manager-side bookkeeping for one open descriptor.
///
/// Lives in the record table from the moment `open` returns until the
/// owning handler has released the descriptor through `close`.
struct FileRecord {
    path: PathBuf,
    write: bool,
    /// Nanoseconds since manager construction; advanced with `fetch_max` so
    /// it never moves backwards.
    last_used: AtomicU64,
    use_count: AtomicU64,
    /// Asks the owning handler to close this descriptor. Returns true iff
    /// the handler released it (it was idle). Valid for the whole lifetime
    /// of the record; must be invoked without the manager mutex held.
    request_close: Box<dyn Fn(FileId) -> bool + Send + Sync>,
}

struct RegistryEntry {
    handler: Weak<dyn Any + Send + Sync>,
    descriptor_type: TypeId,
    descriptor_type_name: &'static str,
}

struct ManagerState {
    records: FxHashMap<FileId, Arc<FileRecord>>,
    registry: FxHashMap<PathBuf, RegistryEntry>,
    policy: Box<dyn EvictionPolicy>,
}

/// Bounded pool of open file descriptors.
///
/// The manager never hands out descriptors directly; callers obtain a
/// [`FileHandler`] for a path via [`handler`](FileManager::handler) and go
/// through its accessors. Handlers keep a weak reference back to the
/// manager and may outlive it, though they cannot vend new accessors once
/// it is gone.
///
/// All record-table and registry mutations are serialised under one
/// manager-level mutex. `request_close` callbacks are always invoked with
/// that mutex released: the callback takes the handler's own mutex and
/// re-enters [`close`](FileManager::close), and holding the manager mutex
/// across that would deadlock.
pub struct FileManager {
    limit: usize,
    epoch: Instant,
    next_id: AtomicU64,
    state: Mutex<ManagerState>,
}

impl FileManager {
    /// Create a manager with the default options and LRU eviction.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Self::with_options(PoolOptions::default(), Box::new(LruPolicy::new()))
    }

    /// Create a manager with an explicit cap and LRU eviction.
    ///
    /// `limit == 0` discovers the cap from the OS.
    #[must_use]
    pub fn with_limit(limit: usize) -> Arc<Self> {
        Self::with_options(
            PoolOptions {
                limit,
                ..PoolOptions::default()
            },
            Box::new(LruPolicy::new()),
        )
    }

    /// Create a manager with explicit options and eviction policy.
    #[must_use]
    pub fn with_options(options: PoolOptions, policy: Box<dyn EvictionPolicy>) -> Arc<Self> {
        let limit = if options.limit == 0 {
            discover_limit(options.reserved)
        } else {
            options.limit
        };
        debug!(limit, "file manager created");
        Arc::new(Self {
            limit,
            epoch: Instant::now(),
            next_id: AtomicU64::new(1),
            state: Mutex::new(ManagerState {
                records: FxHashMap::default(),
                registry: FxHashMap::default(),
                policy,
            }),
        })
    }

    /// The configured or discovered cap.
    #[must_use]
    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Number of currently registered open descriptors.
    #[must_use]
    pub fn used(&self) -> usize {
        self.state.lock().records.len()
    }

    /// Free slots under the cap.
    #[must_use]
    pub fn available(&self) -> usize {
        self.limit.saturating_sub(self.used())
    }

    /// Get or create the handler for `path`.
    ///
    /// The path is canonicalised first, so two paths naming the same file
    /// (through symlinks or `..`/`.` segments) share one handler. Fails with
    /// [`PoolError::TypeMismatch`] if a live handler for this path was
    /// created with a different descriptor type.
    pub fn handler<T: FileDescriptor>(
        self: &Arc<Self>,
        path: impl AsRef<Path>,
    ) -> Result<Arc<FileHandler<T>>, PoolError> {
        let canonical = weakly_canonical(path.as_ref());

        let mut state = self.state.lock();
        if let Some(entry) = state.registry.get(&canonical) {
            if let Some(existing) = entry.handler.upgrade() {
                if entry.descriptor_type != TypeId::of::<T>() {
                    return Err(PoolError::TypeMismatch {
                        path: canonical,
                        requested: type_name::<T>(),
                        existing: entry.descriptor_type_name,
                    });
                }
                return match existing.downcast::<FileHandler<T>>() {
                    Ok(handler) => Ok(handler),
                    Err(_) => unreachable!("registry type tag matched but downcast failed"),
                };
            }
            // The handler died but its drop has not unregistered yet; the
            // entry is replaced below.
        }

        let handler = Arc::new(FileHandler::new(canonical.clone(), Arc::downgrade(self)));
        let erased: Arc<dyn Any + Send + Sync> = handler.clone();
        state.registry.insert(
            canonical,
            RegistryEntry {
                handler: Arc::downgrade(&erased),
                descriptor_type: TypeId::of::<T>(),
                descriptor_type_name: type_name::<T>(),
            },
        );
        Ok(handler)
    }

    /// Whether a live handler exists for the canonical form of `path`.
    ///
    /// Diagnostic only; the answer can be stale by the time it is observed.
    #[must_use]
    pub fn has_handler(&self, path: impl AsRef<Path>) -> bool {
        let canonical = weakly_canonical(path.as_ref());
        let state = self.state.lock();
        state
            .registry
            .get(&canonical)
            .is_some_and(|entry| entry.handler.upgrade().is_some())
    }

    /// Open a descriptor of type `T` for `path`.
    ///
    /// If the pool is at its cap, the eviction policy selects victims and
    /// their `request_close` callbacks are invoked until a slot is free.
    /// Fails with [`PoolError::LimitReached`] when no victim accepts, and
    /// with [`PoolError::OpenFailed`] when the descriptor type refuses the
    /// open; in the latter case no record is registered.
    ///
    /// `request_close` is stored for the lifetime of the record. It is
    /// handed the returned [`FileId`] and must return true iff the owning
    /// handler was able to release the descriptor.
    pub fn open<T, F>(
        &self,
        path: &Path,
        write: bool,
        request_close: F,
    ) -> Result<(FileId, T), PoolError>
    where
        T: FileDescriptor,
        F: Fn(FileId) -> bool + Send + Sync + 'static,
    {
        self.make_room(write)?;

        let fd = T::open(path, write).map_err(|source| PoolError::OpenFailed {
            path: path.to_path_buf(),
            source,
        })?;

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let record = Arc::new(FileRecord {
            path: path.to_path_buf(),
            write,
            last_used: AtomicU64::new(self.elapsed_nanos()),
            use_count: AtomicU64::new(0),
            request_close: Box::new(request_close),
        });

        {
            let mut state = self.state.lock();
            state.records.insert(id, record);
            state.policy.note_opened(id);
        }
        trace!(id, path = %path.display(), write, "descriptor opened");
        Ok((id, fd))
    }

    /// Close a descriptor previously returned by [`open`](FileManager::open).
    ///
    /// Drops the record, notifies the policy, and closes `fd` through its
    /// [`FileDescriptor`] impl. Must be called exactly once per successful
    /// open. A close failure is logged, not propagated: there is no recovery
    /// path once the pool has decided to close.
    pub fn close<T: FileDescriptor>(&self, id: FileId, fd: T) {
        {
            let mut state = self.state.lock();
            if state.records.remove(&id).is_none() {
                warn!(id, "close for a descriptor the manager does not know");
            }
            state.policy.note_closed(id);
        }
        trace!(id, "descriptor closed");
        if let Err(error) = fd.close() {
            warn!(id, %error, "descriptor close failed");
        }
    }

    /// Record a use of `id`: bump its use count, advance its timestamp, and
    /// let the policy reorder its queue.
    pub fn notify_used(&self, id: FileId) {
        let nanos = self.elapsed_nanos();
        let mut state = self.state.lock();
        if let Some(record) = state.records.get(&id) {
            record.last_used.fetch_max(nanos, Ordering::Relaxed);
            record.use_count.fetch_add(1, Ordering::Relaxed);
        }
        state.policy.note_used(id);
    }

    /// Free a slot if the cap is reached.
    ///
    /// Walks the policy's candidates in preferred order and invokes each
    /// `request_close` with the manager mutex released. A racing open may
    /// re-exhaust the cap between a successful eviction and our own open,
    /// so the cap is re-checked after every accepted eviction and once more
    /// after the sweep.
    fn make_room(&self, write: bool) -> Result<(), PoolError> {
        let candidates = {
            let mut state = self.state.lock();
            state.policy.note_intent_to_open(write);
            if state.records.len() < self.limit {
                return Ok(());
            }
            state.policy.eviction_order()
        };

        for id in candidates {
            let record = {
                let state = self.state.lock();
                match state.records.get(&id) {
                    Some(record) => Arc::clone(record),
                    // Already closed by a racing sweep.
                    None => continue,
                }
            };
            if (record.request_close)(id) {
                trace!(
                    id,
                    path = %record.path.display(),
                    write = record.write,
                    "evicted idle descriptor"
                );
                if self.state.lock().records.len() < self.limit {
                    return Ok(());
                }
            }
        }

        // A racing close may have freed a slot even though every candidate
        // we asked refused.
        if self.state.lock().records.len() < self.limit {
            return Ok(());
        }
        debug!(limit = self.limit, "descriptor limit reached, nothing evictable");
        Err(PoolError::LimitReached { limit: self.limit })
    }

    /// Remove the registry entry for `path` if its handler is gone.
    ///
    /// Called from a handler's drop. A newer handler may already have been
    /// installed for the same path between the old handler's death and this
    /// call; a live entry is left untouched.
    pub(crate) fn unregister(&self, path: &Path) {
        let mut state = self.state.lock();
        if let Some(entry) = state.registry.get(path) {
            if entry.handler.upgrade().is_none() {
                state.registry.remove(path);
            }
        }
    }

    fn elapsed_nanos(&self) -> u64 {
        u64::try_from(self.epoch.elapsed().as_nanos()).unwrap_or(u64::MAX)
    }

    #[cfg(test)]
    fn record_stats(&self, id: FileId) -> Option<(u64, u64)> {
        let state = self.state.lock();
        state.records.get(&id).map(|record| {
            (
                record.last_used.load(Ordering::Relaxed),
                record.use_count.load(Ordering::Relaxed),
            )
        })
    }

    #[cfg(test)]
    fn record_is_write(&self, id: FileId) -> Option<bool> {
        self.state.lock().records.get(&id).map(|record| record.write)
    }
}

/// Query the OS per-process soft limit on open files, keeping `reserved`
/// slots for the standard streams.
fn discover_limit(reserved: usize) -> usize {
    match getrlimit(Resource::RLIMIT_NOFILE) {
        Ok((soft, _hard)) => usize::try_from(soft)
            .unwrap_or(usize::MAX)
            .saturating_sub(reserved)
            .max(1),
        Err(error) => {
            warn!(%error, "could not query RLIMIT_NOFILE, assuming {FALLBACK_LIMIT}");
            FALLBACK_LIMIT.saturating_sub(reserved)
        }
    }
}
