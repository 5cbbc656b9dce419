//! Immutable snapshots of an in-memory index.

use crate::engine::{FailPoint, Shared, Store};
use crate::error::MemoryError;
use crate::writer::{DocMap, Document, WriterCore};
use lumen_core::ReadSnapshot;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::trace;

/// Where a snapshot was taken from, and where a refresh looks again.
#[derive(Clone)]
pub(crate) enum Source {
    /// The writer's buffered state, including uncommitted changes
    Writer(Arc<WriterCore>),

    /// The committed state of a storage location
    Store(Arc<Store>),
}

/// A point-in-time view of an in-memory index.
pub struct MemorySnapshot {
    generation: u64,
    docs: DocMap,
    source: Source,
    shared: Arc<Shared>,
    released: AtomicBool,
}

impl MemorySnapshot {
    pub(crate) fn from_writer(core: Arc<WriterCore>, shared: Arc<Shared>) -> Self {
        let (generation, docs) = {
            let working = core.working.lock();
            (working.version, Arc::clone(&working.docs))
        };
        Self::new(generation, docs, Source::Writer(core), shared)
    }

    pub(crate) fn from_store(store: Arc<Store>, shared: Arc<Shared>) -> Self {
        let (generation, docs) = {
            let committed = store.committed.read();
            (committed.generation, Arc::clone(&committed.docs))
        };
        Self::new(generation, docs, Source::Store(store), shared)
    }

    fn new(generation: u64, docs: DocMap, source: Source, shared: Arc<Shared>) -> Self {
        shared
            .counters
            .snapshots_opened
            .fetch_add(1, Ordering::Relaxed);
        trace!(generation, docs = docs.len(), "Opened memory snapshot");

        MemorySnapshot {
            generation,
            docs,
            source,
            shared,
            released: AtomicBool::new(false),
        }
    }

    /// Look up a document by id
    pub fn get(&self, id: &str) -> Option<&Document> {
        self.docs.get(id)
    }

    /// All documents in id order
    pub fn documents(&self) -> impl Iterator<Item = &Document> {
        self.docs.values()
    }

    /// Check whether this snapshot follows the writer rather than commits
    pub fn is_realtime(&self) -> bool {
        matches!(self.source, Source::Writer(_))
    }

    /// Check whether `release` has been called
    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }

    /// Latest state of the source, or None if it is still this generation.
    fn latest(&self) -> Option<(u64, DocMap)> {
        let (generation, docs) = match &self.source {
            Source::Writer(core) => {
                let working = core.working.lock();
                (working.version, Arc::clone(&working.docs))
            }
            Source::Store(store) => {
                let committed = store.committed.read();
                (committed.generation, Arc::clone(&committed.docs))
            }
        };
        (generation != self.generation).then_some((generation, docs))
    }
}

impl ReadSnapshot for MemorySnapshot {
    type Error = MemoryError;

    fn refreshed(&self) -> Result<Option<Self>, MemoryError> {
        if self.is_released() {
            return Err(MemoryError::Released {
                generation: self.generation,
            });
        }
        self.shared.faults.check(FailPoint::Refresh)?;

        Ok(self.latest().map(|(generation, docs)| {
            Self::new(
                generation,
                docs,
                self.source.clone(),
                Arc::clone(&self.shared),
            )
        }))
    }

    fn release(&self) -> Result<(), MemoryError> {
        self.shared.faults.check(FailPoint::Release)?;

        if self.released.swap(true, Ordering::AcqRel) {
            self.shared
                .counters
                .double_releases
                .fetch_add(1, Ordering::Relaxed);
            return Err(MemoryError::Released {
                generation: self.generation,
            });
        }

        self.shared
            .counters
            .snapshots_released
            .fetch_add(1, Ordering::Relaxed);
        trace!(generation = self.generation, "Released memory snapshot");
        Ok(())
    }

    fn generation(&self) -> u64 {
        self.generation
    }

    fn doc_count(&self) -> u64 {
        self.docs.len() as u64
    }
}

impl fmt::Debug for MemorySnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemorySnapshot")
            .field("generation", &self.generation)
            .field("docs", &self.docs.len())
            .field("realtime", &self.is_realtime())
            .field("released", &self.is_released())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::writer::MemoryWriter;
    use lumen_core::{EngineWriter, MergeTuning};

    fn writer_and_store() -> (MemoryWriter, Arc<Store>, Arc<Shared>) {
        let store = Arc::new(Store::default());
        let shared = Arc::new(Shared::default());
        let writer = MemoryWriter::open(
            Arc::clone(&store),
            MergeTuning::default(),
            Arc::clone(&shared),
        );
        (writer, store, shared)
    }

    #[test]
    fn test_realtime_sees_uncommitted() {
        let (writer, _store, _shared) = writer_and_store();
        let snapshot = writer.snapshot().unwrap();
        assert!(snapshot.refreshed().unwrap().is_none());

        writer.add_document(Document::new("a", "alpha")).unwrap();
        let fresh = snapshot.refreshed().unwrap().expect("writer changed");
        assert_eq!(fresh.doc_count(), 1);
        assert!(fresh.is_realtime());

        // The old snapshot is immutable
        assert_eq!(snapshot.doc_count(), 0);
    }

    #[test]
    fn test_store_snapshot_waits_for_commit() {
        let (writer, store, shared) = writer_and_store();
        let snapshot = MemorySnapshot::from_store(store, shared);

        writer.add_document(Document::new("a", "alpha")).unwrap();
        assert!(snapshot.refreshed().unwrap().is_none());

        writer.commit();
        let fresh = snapshot.refreshed().unwrap().expect("commit changed store");
        assert_eq!(fresh.doc_count(), 1);
        assert_eq!(fresh.generation(), 1);
        assert!(fresh.get("a").is_some());
    }

    #[test]
    fn test_release_twice_is_an_error() {
        let (writer, _store, shared) = writer_and_store();
        let snapshot = writer.snapshot().unwrap();

        snapshot.release().unwrap();
        assert!(snapshot.is_released());
        assert!(matches!(
            snapshot.release(),
            Err(MemoryError::Released { .. })
        ));
        assert_eq!(shared.counters.double_releases.load(Ordering::SeqCst), 1);

        // A released snapshot cannot be refreshed
        assert!(snapshot.refreshed().is_err());
    }
}
