//! Bounded file-descriptor pool.
//!
//! Lets a program address an unbounded set of files through long-lived
//! [`FileHandler`]s while keeping the number of simultaneously open OS
//! descriptors under a cap. When the cap is about to be exceeded, an
//! eviction policy (LRU by default) picks an idle descriptor to close so
//! the new one can be opened.
//!
//! The pool caches *descriptors*, never data: it is not a page cache. It is
//! blocking and multithreaded; any handler and the manager can be shared
//! freely across threads.
//!
//! ```no_run
//! use std::fs::File;
//! use std::io::Read as _;
//!
//! use fd_pool::{AccessMode, FileManager};
//!
//! # fn main() -> Result<(), fd_pool::PoolError> {
//! let manager = FileManager::with_limit(64);
//! let handler = manager.handler::<File>("/var/data/catalog")?;
//!
//! let mut accessor = handler
//!     .accessor(AccessMode::Read)?
//!     .expect("blocking modes always yield an accessor");
//! let mut buf = String::new();
//! accessor.read_to_string(&mut buf).ok();
//! // Dropping the accessor parks the descriptor for reuse.
//! # Ok(())
//! # }
//! ```

/// Scoped descriptor access.
pub mod accessor;
/// Best-effort path canonicalisation.
pub mod canonical;
/// The open/close capability for descriptor types.
pub mod descriptor;
pub mod error;
/// Per-path reader/writer coordination.
pub mod handler;
/// The cap-enforcing descriptor manager.
pub mod manager;
/// Eviction policies.
pub mod policy;

pub use accessor::FileAccessor;
pub use descriptor::FileDescriptor;
pub use error::PoolError;
pub use handler::{AccessMode, FileHandler};
pub use manager::{FileId, FileManager, PoolOptions};
pub use policy::{EvictionPolicy, FifoPolicy, LruPolicy};
