//! Index engine traits.
//!
//! This module defines the primitives Lumen consumes from a full-text engine.
//! The core never stores documents, builds postings or merges segments; it
//! only decides when writers and snapshots are created, shared, refreshed and
//! released.
//!
//! ## Implementing an Engine
//!
//! 1. Implement [`EngineWriter`] for the engine's writer. Writers must accept
//!    concurrent callers and release their resources when dropped.
//! 2. Implement [`ReadSnapshot`] for an immutable point-in-time view. A
//!    snapshot remembers where it came from (writer or storage) so that
//!    [`ReadSnapshot::refreshed`] can look at the same source again.
//! 3. Implement [`IndexEngine`] to tie them together.

use crate::locator::StorageLocation;
use crate::types::MergeTuning;
use std::sync::Arc;

/// An immutable, point-in-time view of an index.
///
/// Lumen counts borrows of a snapshot itself; `release` is called exactly
/// once, after the last borrower has returned it.
pub trait ReadSnapshot: Send + Sync + Sized + 'static {
    /// Error type for refresh and release failures
    type Error: std::error::Error + Send + Sync + 'static;

    /// Produce a snapshot reflecting the latest state of the source this
    /// snapshot was taken from.
    ///
    /// Returns `Ok(None)` when nothing changed since this snapshot was taken.
    fn refreshed(&self) -> Result<Option<Self>, Self::Error>;

    /// Free the storage resources backing this snapshot.
    fn release(&self) -> Result<(), Self::Error>;

    /// Monotonic generation identifying the state this snapshot shows
    fn generation(&self) -> u64;

    /// Number of live documents visible in this snapshot
    fn doc_count(&self) -> u64;
}

/// The single mutator of an index.
pub trait EngineWriter: Send + Sync + 'static {
    /// Snapshot type produced by this writer
    type Snapshot: ReadSnapshot;

    /// Error type for snapshot construction
    type Error: std::error::Error + Send + Sync + 'static;

    /// Open a realtime snapshot that includes flushed but uncommitted changes.
    fn snapshot(&self) -> Result<Self::Snapshot, Self::Error>;
}

/// Factory for writers, snapshots and search views.
pub trait IndexEngine: Send + Sync + 'static {
    /// Writer type
    type Writer: EngineWriter<Snapshot = Self::Snapshot>;

    /// Snapshot type
    type Snapshot: ReadSnapshot;

    /// Disposable query handle built over a borrowed snapshot
    type SearchView: Send;

    /// Error type for opening writers and snapshots
    type Error: std::error::Error + Send + Sync + 'static;

    /// Open the writer for a storage location with the given tuning.
    fn open_writer(
        &self,
        location: &StorageLocation,
        tuning: &MergeTuning,
    ) -> Result<Self::Writer, Self::Error>;

    /// Open a snapshot of the committed state at a storage location.
    fn open_snapshot(&self, location: &StorageLocation) -> Result<Self::Snapshot, Self::Error>;

    /// Build a search view over a borrowed snapshot.
    ///
    /// The view is only used while the snapshot is borrowed.
    fn search_view(&self, snapshot: Arc<Self::Snapshot>) -> Self::SearchView;

    /// Human-readable name of this engine
    fn name(&self) -> &'static str;
}
