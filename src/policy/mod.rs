//! Eviction policies for the descriptor cap.

/// Least-recently-used eviction, the default policy.
pub mod lru;

/// Insertion-ordered eviction with no refresh on use.
pub mod fifo;

pub use fifo::FifoPolicy;
pub use lru::LruPolicy;

use crate::manager::FileId;

/// Decides which open descriptor to close when the cap is about to be
/// exceeded.
///
/// The manager feeds every lifecycle event to the policy while holding its
/// own mutex, so implementations need no internal locking. When an open
/// would exceed the cap, the manager asks for [`eviction_order`] and walks
/// it front to back, invoking each candidate's `request_close` callback
/// *outside* the manager mutex; the first candidate whose handler releases
/// it frees the slot. A candidate that is currently held by a live accessor
/// refuses, and the sweep moves on.
///
/// [`eviction_order`]: EvictionPolicy::eviction_order
pub trait EvictionPolicy: Send {
    /// A descriptor is about to be opened. Called before any eviction sweep,
    /// whether or not the cap is reached.
    fn note_intent_to_open(&mut self, write: bool);

    /// A descriptor was opened and registered under `id`.
    fn note_opened(&mut self, id: FileId);

    /// The descriptor `id` was closed and unregistered.
    ///
    /// Must tolerate ids the policy has never seen.
    fn note_closed(&mut self, id: FileId);

    /// The descriptor `id` was used. Policies that order candidates by
    /// recency reorder their queue here.
    fn note_used(&mut self, id: FileId);

    /// Candidate ids in preferred eviction order, best victim first.
    fn eviction_order(&self) -> Vec<FileId>;
}
