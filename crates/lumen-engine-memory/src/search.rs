//! Term lookup over a snapshot.

use crate::snapshot::MemorySnapshot;
use crate::writer::Document;
use lumen_core::ReadSnapshot;
use std::sync::Arc;

/// A disposable search handle over one borrowed snapshot.
pub struct MemorySearcher {
    snapshot: Arc<MemorySnapshot>,
}

impl MemorySearcher {
    pub(crate) fn new(snapshot: Arc<MemorySnapshot>) -> Self {
        MemorySearcher { snapshot }
    }

    /// Generation of the snapshot being searched
    pub fn generation(&self) -> u64 {
        self.snapshot.generation()
    }

    /// Number of searchable documents
    pub fn count(&self) -> usize {
        self.snapshot.doc_count() as usize
    }

    /// Look up a document by id
    pub fn get(&self, id: &str) -> Option<&Document> {
        self.snapshot.get(id)
    }

    /// Documents containing `term` as a whole word, case-insensitively,
    /// in id order.
    pub fn search(&self, term: &str) -> Vec<&Document> {
        let term_lower = term.to_lowercase();
        self.snapshot
            .documents()
            .filter(|doc| doc.contains_term(&term_lower))
            .collect()
    }

    /// Ids of the documents matching `term`
    pub fn search_ids(&self, term: &str) -> Vec<String> {
        self.search(term).into_iter().map(|doc| doc.id.clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{MemoryEngine, MemoryWriter};
    use lumen_core::{EngineWriter, IndexEngine, MergeTuning, StorageLocation};
    use tempfile::TempDir;

    fn populated(writer: &MemoryWriter) {
        writer
            .add_document(Document::new("1", "the quick brown fox"))
            .unwrap();
        writer
            .add_document(Document::new("2", "a Quick rust compiler"))
            .unwrap();
        writer
            .add_document(Document::new("3", "slow and steady"))
            .unwrap();
    }

    #[test]
    fn test_search_matches_whole_words() {
        let temp_dir = TempDir::new().unwrap();
        let location = StorageLocation::open(temp_dir.path()).unwrap();
        let engine = MemoryEngine::new();
        let writer = engine
            .open_writer(&location, &MergeTuning::default())
            .unwrap();
        populated(&writer);

        let searcher = engine.search_view(Arc::new(writer.snapshot().unwrap()));

        assert_eq!(searcher.count(), 3);
        assert_eq!(searcher.search_ids("quick"), vec!["1", "2"]);
        assert_eq!(searcher.search_ids("QUICK"), vec!["1", "2"]);
        assert!(searcher.search("qui").is_empty());
        assert_eq!(searcher.get("3").map(|d| d.body.as_str()), Some("slow and steady"));
        assert_eq!(engine.stats().search_views, 1);
    }
}
