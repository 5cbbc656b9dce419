//! Shared fixtures for registry and holder tests.

#![allow(dead_code)]

use lumen_core::{IndexRegistry, LumenError, MergeTuning, ReaderMode, StorageLocator};
use lumen_engine_memory::{Document, MemoryEngine, MemoryError};
use std::sync::Arc;
use tempfile::TempDir;

/// Error type a caller of the scoped-access API would define.
#[derive(Debug)]
pub enum TestError {
    Lumen(LumenError),
    Engine(MemoryError),
    Missing(String),
}

impl From<LumenError> for TestError {
    fn from(err: LumenError) -> Self {
        TestError::Lumen(err)
    }
}

impl From<MemoryError> for TestError {
    fn from(err: MemoryError) -> Self {
        TestError::Engine(err)
    }
}

pub struct Fixture {
    pub temp_dir: TempDir,
    pub engine: Arc<MemoryEngine>,
    pub registry: IndexRegistry<MemoryEngine>,
}

pub fn fixture(mode: ReaderMode) -> Fixture {
    init_tracing();
    let temp_dir = TempDir::new().unwrap();
    let engine = Arc::new(MemoryEngine::new());
    let registry = IndexRegistry::new(
        Arc::clone(&engine),
        StorageLocator::per_index(temp_dir.path()),
        mode,
        MergeTuning::default(),
    )
    .unwrap();

    Fixture {
        temp_dir,
        engine,
        registry,
    }
}

pub fn shared_fixture(mode: ReaderMode) -> Fixture {
    init_tracing();
    let temp_dir = TempDir::new().unwrap();
    let engine = Arc::new(MemoryEngine::new());
    let registry = IndexRegistry::new(
        Arc::clone(&engine),
        StorageLocator::shared(temp_dir.path().join("all")),
        mode,
        MergeTuning::default(),
    )
    .unwrap();

    Fixture {
        temp_dir,
        engine,
        registry,
    }
}

/// Add a document through the scoped writer API.
pub fn write(registry: &IndexRegistry<MemoryEngine>, index: &str, id: &str, body: &str) {
    registry
        .with_writer(index, |writer| {
            writer.add_document(Document::new(id, body))?;
            Ok::<_, TestError>(())
        })
        .unwrap();
}

/// Commit an index through the scoped writer API.
pub fn commit(registry: &IndexRegistry<MemoryEngine>, index: &str) -> u64 {
    registry
        .with_writer(index, |writer| Ok::<_, TestError>(writer.commit()))
        .unwrap()
}

/// Documents visible to a fresh borrow.
pub fn visible_docs(registry: &IndexRegistry<MemoryEngine>, index: &str) -> u64 {
    registry
        .with_reader(index, |reader| {
            Ok::<_, TestError>(lumen_core::ReadSnapshot::doc_count(reader))
        })
        .unwrap()
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
