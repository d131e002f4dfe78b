//! Per-canonical-path coordination of readers, writers, and idle descriptors.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashMap;
use tracing::{trace, warn};

use crate::accessor::{FileAccessor, LockToken};
use crate::descriptor::FileDescriptor;
use crate::error::PoolError;
use crate::manager::{FileId, FileManager};

/// How an accessor is requested.
///
/// The `Try*` modes fail fast instead of blocking when the file lock is
/// contended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    /// Shared access; blocks while a writer holds the file.
    Read,
    /// Exclusive access; blocks while any accessor holds the file.
    Write,
    /// Shared access; `None` instead of blocking.
    TryRead,
    /// Exclusive access; `None` instead of blocking.
    TryWrite,
}

impl AccessMode {
    fn is_write(self) -> bool {
        matches!(self, AccessMode::Write | AccessMode::TryWrite)
    }
}

struct HandlerState<T> {
    /// Descriptors currently parked here, not handed out to any accessor.
    idle: FxHashMap<FileId, T>,
    /// True while the handler holds only read-opened descriptors.
    read_only: bool,
}

/// Coordinates access to one logical file.
///
/// A handler owns the reader/writer lock for its file, a small cache of
/// idle descriptors so repeated accesses do not thrash the manager, and the
/// callbacks through which the manager can reclaim those idle descriptors
/// under cap pressure. Handlers are created through
/// [`FileManager::handler`] and shared via `Arc`; the registry keeps only a
/// weak reference, so the handler dies with its last external holder.
///
/// A descriptor known to belong to this handler is either in the idle set
/// or held by exactly one live accessor, never both. An in-use descriptor
/// is never closed: the manager's close requests are refused for any id
/// not currently idle.
///
/// The handler mutex is never held while blocking on the file lock, never
/// held across a call into the manager, and accessors are vended by taking
/// the file lock first; the manager mutex nests innermost.
pub struct FileHandler<T: FileDescriptor> {
    path: PathBuf,
    manager: Weak<FileManager>,
    /// Guards the logical file: shared among readers, exclusive for a
    /// writer. Accessors hold owned tokens on this lock.
    file_lock: Arc<RwLock<()>>,
    state: Mutex<HandlerState<T>>,
}

impl<T: FileDescriptor> FileHandler<T> {
    pub(crate) fn new(path: PathBuf, manager: Weak<FileManager>) -> Self {
        Self {
            path,
            manager,
            file_lock: Arc::new(RwLock::new(())),
            state: Mutex::new(HandlerState {
                idle: FxHashMap::default(),
                read_only: true,
            }),
        }
    }

    /// The canonical path this handler coordinates.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// True while the handler holds only read-opened descriptors.
    #[must_use]
    pub fn is_read_only(&self) -> bool {
        self.state.lock().read_only
    }

    /// Get an accessor for the file.
    ///
    /// Blocking modes wait for the appropriate side of the file lock;
    /// `Try*` modes return `Ok(None)` when it is contended. Vending a mode
    /// that differs from the handler's current one first closes every idle
    /// descriptor (a read-opened descriptor cannot serve a write, and stale
    /// readers behind a writer would waste slots), then opens a fresh
    /// descriptor through the manager, which may in turn evict an idle
    /// descriptor elsewhere. Fails if the manager is gone, the cap cannot
    /// be freed, or the open itself fails; the file lock is released on
    /// every failure path.
    pub fn accessor(
        self: &Arc<Self>,
        mode: AccessMode,
    ) -> Result<Option<FileAccessor<T>>, PoolError> {
        let token = match mode {
            AccessMode::Read => Some(LockToken::Shared(self.file_lock.read_arc())),
            AccessMode::Write => Some(LockToken::Exclusive(self.file_lock.write_arc())),
            AccessMode::TryRead => self.file_lock.try_read_arc().map(LockToken::Shared),
            AccessMode::TryWrite => self.file_lock.try_write_arc().map(LockToken::Exclusive),
        };
        let Some(token) = token else {
            return Ok(None);
        };
        self.vend(mode.is_write(), token).map(Some)
    }

    fn vend(self: &Arc<Self>, write: bool, token: LockToken) -> Result<FileAccessor<T>, PoolError> {
        let manager = self.manager.upgrade().ok_or(PoolError::ManagerGone)?;

        // Mode flip: the requested mode differs from the idle descriptors'
        // mode, so they are useless from here on. The file lock we hold
        // guarantees no live accessor owns any of them.
        let stale: Vec<(FileId, T)> = {
            let mut state = self.state.lock();
            let flip = state.read_only == write;
            state.read_only = !write;
            if flip {
                state.idle.drain().collect()
            } else {
                Vec::new()
            }
        };
        if !stale.is_empty() {
            trace!(
                path = %self.path.display(),
                count = stale.len(),
                to_write = write,
                "mode flip, closing idle descriptors"
            );
        }
        for (id, fd) in stale {
            manager.close(id, fd);
        }

        // Reuse an idle descriptor if one is parked; after the flip logic
        // everything left in the idle set matches the requested mode.
        let reused = {
            let mut state = self.state.lock();
            let id = state.idle.keys().next().copied();
            id.and_then(|id| state.idle.remove(&id).map(|fd| (id, fd)))
        };

        let (id, fd) = match reused {
            Some(pair) => pair,
            None => {
                let handler = Arc::downgrade(self);
                let request_close = move |id: FileId| -> bool {
                    match handler.upgrade() {
                        Some(handler) => handler.release_idle(id),
                        None => false,
                    }
                };
                manager.open::<T, _>(&self.path, write, request_close)?
            }
        };

        manager.notify_used(id);
        Ok(FileAccessor::new(fd, id, Arc::clone(self), token))
    }

    /// Close the descriptor `id` if it is idle.
    ///
    /// This is the manager's `request_close` path. Returns false when the
    /// descriptor is held by a live accessor (or unknown); the eviction
    /// sweep then moves on to the next candidate.
    fn release_idle(&self, id: FileId) -> bool {
        let Some(fd) = self.state.lock().idle.remove(&id) else {
            return false;
        };
        match self.manager.upgrade() {
            Some(manager) => manager.close(id, fd),
            None => {
                if let Err(error) = fd.close() {
                    warn!(id, %error, "descriptor close failed");
                }
            }
        }
        true
    }

    /// Park a descriptor back into the idle set. Accessor drop path.
    pub(crate) fn park(&self, id: FileId, fd: T) {
        self.state.lock().idle.insert(id, fd);
    }
}

impl<T: FileDescriptor> fmt::Debug for FileHandler<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("FileHandler")
            .field("path", &self.path)
            .field("read_only", &state.read_only)
            .field("idle", &state.idle.len())
            .finish_non_exhaustive()
    }
}

impl<T: FileDescriptor> Drop for FileHandler<T> {
    /// Unregister from the manager and close every idle descriptor.
    ///
    /// If the manager is already gone the records are gone with it, so the
    /// descriptors are closed directly through their trait.
    fn drop(&mut self) {
        let idle = std::mem::take(&mut self.state.get_mut().idle);
        match self.manager.upgrade() {
            Some(manager) => {
                manager.unregister(&self.path);
                for (id, fd) in idle {
                    manager.close(id, fd);
                }
            }
            None => {
                for (id, fd) in idle {
                    if let Err(error) = fd.close() {
                        warn!(id, %error, "descriptor close failed");
                    }
                }
            }
        }
    }
}
