//! Error type shared by the manager and the handlers.

use std::path::PathBuf;

use thiserror::Error;

/// Errors surfaced by [`FileManager`](crate::FileManager) and
/// [`FileHandler`](crate::FileHandler).
///
/// Close failures are deliberately *not* represented here: once the pool has
/// decided to close a descriptor there is no recovery path, so they are
/// logged and swallowed at the closing site.
#[derive(Debug, Error)]
pub enum PoolError {
    /// The descriptor cap is reached and no idle descriptor could be closed.
    ///
    /// Callers may retry later, once some accessor has been released.
    #[error("descriptor limit reached ({limit}) and no idle descriptor could be closed")]
    LimitReached {
        /// The configured or discovered cap.
        limit: usize,
    },

    /// The descriptor type refused to open the file.
    #[error("could not open {}: {source}", path.display())]
    OpenFailed {
        /// The canonical path that failed to open.
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A handler for this path already exists with a different descriptor type.
    ///
    /// The descriptor type is part of a handler's identity even though it is
    /// not part of the path key. The existing handler must be dropped before
    /// a handler with another type can be created for the same path.
    #[error("handler for {} already uses descriptor type {existing}, requested {requested}", path.display())]
    TypeMismatch {
        /// The canonical path both requests resolved to.
        path: PathBuf,
        /// The descriptor type of this request.
        requested: &'static str,
        /// The descriptor type the live handler was created with.
        existing: &'static str,
    },

    /// The manager behind this handler has been dropped.
    ///
    /// A handler may outlive its manager, but it can no longer vend new
    /// accessors once the manager is gone.
    #[error("the file manager behind this handler is gone")]
    ManagerGone,
}
