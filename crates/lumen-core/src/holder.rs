//! Per-index writer and snapshot holder.
//!
//! An [`IndexHolder`] owns the single writer of one index and a pointer to its
//! *current* read snapshot. Readers borrow the current snapshot through a
//! [`ReaderLease`] (or a [`SearcherLease`] that also carries a search view);
//! each lease counts as one reference on the snapshot it captured.
//!
//! ## Reopen
//!
//! Reopening follows a read-copy-update pattern:
//!
//! 1. The current snapshot is captured under the publish lock.
//! 2. The engine refreshes it with no lock held, so borrowers are never
//!    blocked by the expensive part.
//! 3. If the engine reports no new generation nothing changes.
//! 4. Otherwise the fresh snapshot is published under the publish lock and
//!    the holder drops its own reference on the old one. Borrowers that
//!    captured the old snapshot keep it alive until they return it.
//!
//! Reopens of one holder are serialized; reopens of different holders run
//! independently.
//!
//! ## Reference counting
//!
//! The holder keeps one reference on whichever snapshot is current. A
//! snapshot's `release` runs when its count drops to zero, which can only
//! happen after it stopped being current and every lease on it was returned.

use crate::engine::{EngineWriter, IndexEngine, ReadSnapshot};
use crate::error::{LumenError, Result};
use crate::locator::StorageLocation;
use crate::types::{HolderStats, MergeTuning, ReaderMode, ReopenOutcome};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::fmt;
use std::ops::Deref;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, instrument, trace, warn};

static NEXT_HOLDER_ID: AtomicU64 = AtomicU64::new(1);

/// A snapshot together with its borrow count.
struct SnapshotCell<S> {
    snapshot: Arc<S>,
    refs: AtomicUsize,
}

impl<S: ReadSnapshot> SnapshotCell<S> {
    /// Wrap a freshly opened snapshot, counting the holder's own reference.
    fn new(snapshot: S) -> Arc<Self> {
        Arc::new(SnapshotCell {
            snapshot: Arc::new(snapshot),
            refs: AtomicUsize::new(1),
        })
    }

    fn acquire(&self) {
        self.refs.fetch_add(1, Ordering::AcqRel);
    }

    /// Drop one reference, releasing the snapshot when it was the last.
    fn release(&self, index: &str) -> Result<()> {
        let previous = self
            .refs
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
            .map_err(|_| {
                LumenError::borrow_protocol(
                    index,
                    format!(
                        "snapshot generation {} returned more often than borrowed",
                        self.snapshot.generation()
                    ),
                )
            })?;

        if previous == 1 {
            debug!(
                index,
                generation = self.snapshot.generation(),
                "Releasing snapshot"
            );
            self.snapshot
                .release()
                .map_err(|e| LumenError::release(index, e))?;
        }
        Ok(())
    }

    fn refs(&self) -> usize {
        self.refs.load(Ordering::Acquire)
    }
}

/// One outstanding borrow of a read snapshot.
///
/// Dereferences to the snapshot. Hand it back with
/// [`IndexHolder::return_reader`] to observe release failures; a lease that is
/// dropped instead (early return, panic) returns itself and logs any failure.
pub struct ReaderLease<S: ReadSnapshot> {
    holder_id: u64,
    index: Arc<str>,
    cell: Arc<SnapshotCell<S>>,
    returned: bool,
}

impl<S: ReadSnapshot> ReaderLease<S> {
    pub(crate) fn snapshot(&self) -> &Arc<S> {
        &self.cell.snapshot
    }

    /// Generation of the borrowed snapshot
    pub fn generation(&self) -> u64 {
        self.cell.snapshot.generation()
    }

    /// Name of the index this lease was borrowed from
    pub fn index_name(&self) -> &str {
        &self.index
    }

    fn finish(mut self) -> Result<()> {
        self.returned = true;
        self.cell.release(&self.index)
    }
}

impl<S: ReadSnapshot> Deref for ReaderLease<S> {
    type Target = S;

    fn deref(&self) -> &S {
        &self.cell.snapshot
    }
}

impl<S: ReadSnapshot> Drop for ReaderLease<S> {
    fn drop(&mut self) {
        if self.returned {
            return;
        }
        trace!(index = %self.index, "Returning dropped reader lease");
        if let Err(e) = self.cell.release(&self.index) {
            error!(index = %self.index, error = %e, "Failed to return dropped reader lease");
        }
    }
}

impl<S: ReadSnapshot> fmt::Debug for ReaderLease<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReaderLease")
            .field("index", &self.index)
            .field("generation", &self.generation())
            .finish()
    }
}

/// A borrowed snapshot plus a search view built over it.
///
/// Dereferences to the search view. The view is dropped before the snapshot
/// is returned.
pub struct SearcherLease<E: IndexEngine> {
    view: E::SearchView,
    reader: ReaderLease<E::Snapshot>,
}

impl<E: IndexEngine> SearcherLease<E> {
    /// The search view
    pub fn view(&self) -> &E::SearchView {
        &self.view
    }

    /// The underlying reader lease
    pub fn reader(&self) -> &ReaderLease<E::Snapshot> {
        &self.reader
    }
}

impl<E: IndexEngine> Deref for SearcherLease<E> {
    type Target = E::SearchView;

    fn deref(&self) -> &E::SearchView {
        &self.view
    }
}

/// Owns the writer and the current read snapshot of a single index.
pub struct IndexHolder<E: IndexEngine> {
    id: u64,
    name: Arc<str>,
    mode: ReaderMode,
    location: StorageLocation,
    engine: Arc<E>,
    writer: E::Writer,

    /// Publish pointer; held only to clone or swap, never across I/O
    current: Mutex<Arc<SnapshotCell<E::Snapshot>>>,

    /// Serializes reopens of this holder
    reopen_lock: Mutex<()>,

    reopens: AtomicU64,
    unchanged_reopens: AtomicU64,
    failed_reopens: AtomicU64,
    last_reopened: Mutex<Option<DateTime<Utc>>>,
}

impl<E: IndexEngine> IndexHolder<E> {
    /// Open the writer and the initial snapshot of an index.
    ///
    /// If the snapshot cannot be opened the writer is dropped before the
    /// error is returned, so a later attempt starts from a clean slate.
    #[instrument(skip(engine, location, tuning), fields(location = %location))]
    pub fn open(
        engine: Arc<E>,
        name: &str,
        location: StorageLocation,
        mode: ReaderMode,
        tuning: &MergeTuning,
    ) -> Result<Self> {
        let writer = engine
            .open_writer(&location, tuning)
            .map_err(|e| LumenError::open(name, e))?;

        let initial = match mode {
            ReaderMode::Realtime => writer.snapshot().map_err(|e| LumenError::open(name, e)),
            ReaderMode::Snapshot => engine
                .open_snapshot(&location)
                .map_err(|e| LumenError::open(name, e)),
        };

        let snapshot = match initial {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(error = %e, "Initial snapshot failed, closing writer");
                drop(writer);
                return Err(e);
            }
        };

        info!(
            engine = engine.name(),
            %mode,
            generation = snapshot.generation(),
            docs = snapshot.doc_count(),
            "Opened index holder"
        );

        Ok(IndexHolder {
            id: NEXT_HOLDER_ID.fetch_add(1, Ordering::Relaxed),
            name: Arc::from(name),
            mode,
            location,
            engine,
            writer,
            current: Mutex::new(SnapshotCell::new(snapshot)),
            reopen_lock: Mutex::new(()),
            reopens: AtomicU64::new(0),
            unchanged_reopens: AtomicU64::new(0),
            failed_reopens: AtomicU64::new(0),
            last_reopened: Mutex::new(None),
        })
    }

    /// Index name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Reader mode fixed at creation
    pub fn mode(&self) -> ReaderMode {
        self.mode
    }

    /// Storage location the holder was opened with
    pub fn location(&self) -> &StorageLocation {
        &self.location
    }

    /// Borrow the current snapshot.
    pub fn borrow_reader(&self) -> ReaderLease<E::Snapshot> {
        let cell = {
            let current = self.current.lock();
            current.acquire();
            Arc::clone(&current)
        };
        trace!(index = %self.name, generation = cell.snapshot.generation(), "Borrowed reader");

        ReaderLease {
            holder_id: self.id,
            index: Arc::clone(&self.name),
            cell,
            returned: false,
        }
    }

    /// Borrow the current snapshot together with a fresh search view over it.
    pub fn borrow_searcher(&self) -> SearcherLease<E> {
        let reader = self.borrow_reader();
        let view = self.engine.search_view(Arc::clone(reader.snapshot()));
        SearcherLease { view, reader }
    }

    /// Return a reader lease borrowed from this holder.
    ///
    /// A lease from another holder is rejected with
    /// [`LumenError::BorrowProtocol`]; it is still returned to the holder
    /// that lent it.
    pub fn return_reader(&self, lease: ReaderLease<E::Snapshot>) -> Result<()> {
        if lease.holder_id != self.id {
            return Err(LumenError::borrow_protocol(
                self.name(),
                format!("lease was borrowed from index {}", lease.index),
            ));
        }
        trace!(index = %self.name, generation = lease.generation(), "Returned reader");
        lease.finish()
    }

    /// Return a searcher lease borrowed from this holder.
    pub fn return_searcher(&self, lease: SearcherLease<E>) -> Result<()> {
        let SearcherLease { view, reader } = lease;
        drop(view);
        self.return_reader(reader)
    }

    /// The single writer of this index.
    ///
    /// No lock is taken; the writer handles concurrent callers itself.
    pub fn writer(&self) -> &E::Writer {
        &self.writer
    }

    /// Run a callback against the writer.
    pub fn with_writer<T>(&self, f: impl FnOnce(&E::Writer) -> T) -> T {
        f(&self.writer)
    }

    /// Publish a fresh snapshot if the index changed since the last one.
    ///
    /// On failure the current snapshot is left untouched and keeps serving.
    /// An error always means nothing was published; a failure to release the
    /// superseded snapshot after publishing is logged, not returned.
    #[instrument(skip(self), fields(index = %self.name))]
    pub fn reopen_reader(&self) -> Result<ReopenOutcome> {
        let _serial = self.reopen_lock.lock();
        let old = Arc::clone(&self.current.lock());
        let previous = old.snapshot.generation();

        let refreshed = match old.snapshot.refreshed() {
            Ok(refreshed) => refreshed,
            Err(e) => {
                self.failed_reopens.fetch_add(1, Ordering::Relaxed);
                warn!(generation = previous, error = %e, "Reopen failed, keeping current snapshot");
                return Err(LumenError::refresh(self.name(), e));
            }
        };

        let Some(fresh) = refreshed else {
            self.unchanged_reopens.fetch_add(1, Ordering::Relaxed);
            debug!(generation = previous, "Reopen found no changes");
            return Ok(ReopenOutcome::Unchanged {
                generation: previous,
            });
        };

        let current = fresh.generation();
        let superseded = std::mem::replace(&mut *self.current.lock(), SnapshotCell::new(fresh));
        debug_assert!(Arc::ptr_eq(&old, &superseded));
        drop(old);

        self.reopens.fetch_add(1, Ordering::Relaxed);
        *self.last_reopened.lock() = Some(Utc::now());
        info!(previous, current, "Published new snapshot");

        // The new snapshot is already current, so this reopen succeeded
        if let Err(e) = superseded.release(&self.name) {
            error!(
                generation = previous,
                error = %e,
                "Failed to release superseded snapshot"
            );
        }

        Ok(ReopenOutcome::Reopened { previous, current })
    }

    /// Generation of the current snapshot
    pub fn current_generation(&self) -> u64 {
        self.current.lock().snapshot.generation()
    }

    /// Snapshot statistics for this holder.
    pub fn stats(&self) -> HolderStats {
        let cell = Arc::clone(&self.current.lock());
        HolderStats {
            name: self.name.to_string(),
            mode: self.mode,
            generation: cell.snapshot.generation(),
            doc_count: cell.snapshot.doc_count(),
            borrowed: cell.refs().saturating_sub(1),
            reopens: self.reopens.load(Ordering::Relaxed),
            unchanged_reopens: self.unchanged_reopens.load(Ordering::Relaxed),
            failed_reopens: self.failed_reopens.load(Ordering::Relaxed),
            last_reopened: *self.last_reopened.lock(),
        }
    }
}

impl<E: IndexEngine> Drop for IndexHolder<E> {
    fn drop(&mut self) {
        let current = Arc::clone(self.current.get_mut());
        if let Err(e) = current.release(&self.name) {
            error!(index = %self.name, error = %e, "Failed to release current snapshot");
        }
    }
}

impl<E: IndexEngine> fmt::Debug for IndexHolder<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IndexHolder")
            .field("name", &self.name)
            .field("mode", &self.mode)
            .field("location", &self.location)
            .field("generation", &self.current_generation())
            .finish()
    }
}
