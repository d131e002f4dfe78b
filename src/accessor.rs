//! Scoped access to one descriptor, with its side of the file lock.

use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use parking_lot::RawRwLock;
use parking_lot::lock_api::{ArcRwLockReadGuard, ArcRwLockWriteGuard};

use crate::descriptor::FileDescriptor;
use crate::handler::FileHandler;
use crate::manager::FileId;

/// The side of the file lock an accessor holds.
///
/// Owned guards: the token keeps its `RwLock` alive through an internal
/// `Arc`, so the accessor can outlive any borrow of the handler.
pub(crate) enum LockToken {
    Shared(ArcRwLockReadGuard<RawRwLock, ()>),
    Exclusive(ArcRwLockWriteGuard<RawRwLock, ()>),
}

/// Scoped capability over one open descriptor.
///
/// While an accessor is alive its descriptor is out of the handler's idle
/// set and cannot be closed by the manager. Read accessors hold the file
/// lock shared, so several can read the same file at once, each through its
/// own descriptor (descriptors have seek positions and buffers and are
/// never shared); a write accessor holds it exclusively.
///
/// Dropping the accessor parks the descriptor back into the handler's idle
/// set and then releases the lock, on every exit path including panics.
/// The descriptor is reached through `Deref`/`DerefMut`.
pub struct FileAccessor<T: FileDescriptor> {
    /// `Some` until drop, which moves the descriptor back to the handler.
    fd: Option<T>,
    id: FileId,
    handler: Arc<FileHandler<T>>,
    /// Declared last: released only after the descriptor has been parked.
    token: LockToken,
}

impl<T: FileDescriptor> FileAccessor<T> {
    pub(crate) fn new(fd: T, id: FileId, handler: Arc<FileHandler<T>>, token: LockToken) -> Self {
        Self {
            fd: Some(fd),
            id,
            handler,
            token,
        }
    }

    /// Identifier of the underlying descriptor in the manager's table.
    #[must_use]
    pub fn id(&self) -> FileId {
        self.id
    }

    /// True for read accessors, false for write accessors.
    #[must_use]
    pub fn is_read_only(&self) -> bool {
        matches!(self.token, LockToken::Shared(_))
    }
}

impl<T: FileDescriptor> Deref for FileAccessor<T> {
    type Target = T;

    fn deref(&self) -> &T {
        match &self.fd {
            Some(fd) => fd,
            None => unreachable!("descriptor is only taken during drop"),
        }
    }
}

impl<T: FileDescriptor> DerefMut for FileAccessor<T> {
    fn deref_mut(&mut self) -> &mut T {
        match &mut self.fd {
            Some(fd) => fd,
            None => unreachable!("descriptor is only taken during drop"),
        }
    }
}

impl<T: FileDescriptor> fmt::Debug for FileAccessor<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileAccessor")
            .field("id", &self.id)
            .field("read_only", &self.is_read_only())
            .finish_non_exhaustive()
    }
}

impl<T: FileDescriptor> Drop for FileAccessor<T> {
    fn drop(&mut self) {
        if let Some(fd) = self.fd.take() {
            self.handler.park(self.id, fd);
        }
        // The lock token is a field, so it is released when the fields drop
        // right after this body: after the park, even on unwind.
    }
}
