//! Buffered in-memory writer.

use crate::engine::{FailPoint, Shared, Store};
use crate::error::MemoryError;
use crate::snapshot::MemorySnapshot;
use lumen_core::{EngineWriter, MergeTuning};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::debug;

/// Documents keyed by id, shared copy-on-write between writer and snapshots.
pub(crate) type DocMap = Arc<BTreeMap<String, Document>>;

/// A stored document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Document {
    /// Unique id within the index
    pub id: String,

    /// Free text searched by [`crate::MemorySearcher`]
    pub body: String,
}

impl Document {
    /// Create a document
    pub fn new(id: impl Into<String>, body: impl Into<String>) -> Self {
        Document {
            id: id.into(),
            body: body.into(),
        }
    }

    /// Check whether any whitespace-separated word equals `term_lower`,
    /// ignoring case.
    pub(crate) fn contains_term(&self, term_lower: &str) -> bool {
        self.body
            .split_whitespace()
            .any(|word| word.to_lowercase() == term_lower)
    }
}

/// Buffered state of a writer.
pub(crate) struct Working {
    /// Bumped on every change; realtime snapshots use it as their generation
    pub(crate) version: u64,

    /// Version at the last commit
    pub(crate) committed_version: u64,

    pub(crate) docs: DocMap,
}

pub(crate) struct WriterCore {
    pub(crate) working: Mutex<Working>,
    pub(crate) store: Arc<Store>,
}

/// The writer of one in-memory index.
///
/// All methods take `&self`; concurrent callers are serialized internally.
pub struct MemoryWriter {
    core: Arc<WriterCore>,
    tuning: MergeTuning,
    shared: Arc<Shared>,
}

impl MemoryWriter {
    pub(crate) fn open(store: Arc<Store>, tuning: MergeTuning, shared: Arc<Shared>) -> Self {
        let docs = Arc::clone(&store.committed.read().docs);
        shared
            .counters
            .writers_opened
            .fetch_add(1, Ordering::Relaxed);
        debug!(docs = docs.len(), ?tuning, "Opened memory writer");

        MemoryWriter {
            core: Arc::new(WriterCore {
                working: Mutex::new(Working {
                    version: 0,
                    committed_version: 0,
                    docs,
                }),
                store,
            }),
            tuning,
            shared,
        }
    }

    /// Add a document, replacing any document with the same id.
    pub fn add_document(&self, doc: Document) -> Result<(), MemoryError> {
        if doc.id.is_empty() {
            return Err(MemoryError::EmptyDocumentId);
        }
        let mut working = self.core.working.lock();
        Arc::make_mut(&mut working.docs).insert(doc.id.clone(), doc);
        working.version += 1;
        Ok(())
    }

    /// Delete a document by id. Returns false if no such document exists.
    pub fn delete_document(&self, id: &str) -> bool {
        let mut working = self.core.working.lock();
        if !working.docs.contains_key(id) {
            return false;
        }
        Arc::make_mut(&mut working.docs).remove(id);
        working.version += 1;
        true
    }

    /// Make buffered changes visible at the storage location.
    ///
    /// Returns the committed generation. A commit without changes leaves the
    /// generation as it was.
    pub fn commit(&self) -> u64 {
        let mut working = self.core.working.lock();
        let mut committed = self.core.store.committed.write();

        if working.version != working.committed_version {
            committed.generation += 1;
            committed.docs = Arc::clone(&working.docs);
            working.committed_version = working.version;
            debug!(
                generation = committed.generation,
                docs = committed.docs.len(),
                "Committed memory writer"
            );
        }
        committed.generation
    }

    /// Check whether there are changes not yet committed
    pub fn has_uncommitted_changes(&self) -> bool {
        let working = self.core.working.lock();
        working.version != working.committed_version
    }

    /// Number of documents including uncommitted changes
    pub fn doc_count(&self) -> usize {
        self.core.working.lock().docs.len()
    }

    /// Tuning this writer was opened with
    pub fn tuning(&self) -> &MergeTuning {
        &self.tuning
    }
}

impl EngineWriter for MemoryWriter {
    type Snapshot = MemorySnapshot;
    type Error = MemoryError;

    fn snapshot(&self) -> Result<MemorySnapshot, MemoryError> {
        self.shared.faults.check(FailPoint::WriterSnapshot)?;
        Ok(MemorySnapshot::from_writer(
            Arc::clone(&self.core),
            Arc::clone(&self.shared),
        ))
    }
}

impl Drop for MemoryWriter {
    fn drop(&mut self) {
        self.shared
            .counters
            .writers_dropped
            .fetch_add(1, Ordering::Relaxed);
        debug!("Closed memory writer");
    }
}
