//! The open/close capability implemented by every supported descriptor type.

use std::fs::{File, OpenOptions};
use std::io;
use std::path::Path;

/// Open/close capability for a descriptor type.
///
/// The pool is generic over the descriptor it manages; anything that can be
/// opened from a path and closed exactly once qualifies. Descriptors are
/// treated as move-only throughout the pool: `close` consumes `self`, and no
/// part of the pool requires `Clone`.
///
/// Implementations must respect the `write` flag: a write open truncates or
/// creates the file as appropriate, a read open is read-only.
pub trait FileDescriptor: Send + Sized + 'static {
    /// Open the file at `path`.
    fn open(path: &Path, write: bool) -> io::Result<Self>;

    /// Release all OS resources held by this descriptor.
    ///
    /// Called exactly once per successful [`open`](Self::open). A failure is
    /// logged by the pool, never propagated.
    fn close(self) -> io::Result<()>;
}

/// Stock implementation for [`std::fs::File`].
impl FileDescriptor for File {
    fn open(path: &Path, write: bool) -> io::Result<Self> {
        if write {
            OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .truncate(true)
                .open(path)
        } else {
            File::open(path)
        }
    }

    fn close(self) -> io::Result<()> {
        // Dropping a File releases the OS descriptor; close errors on
        // regular files are not observable through std.
        Ok(())
    }
}
