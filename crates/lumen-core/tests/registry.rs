//! Registry creation, scoped access and bulk reopen.

mod common;

use common::{commit, fixture, shared_fixture, visible_docs, write, TestError};
use lumen_core::{
    IndexRegistry, LocatorLayout, LumenConfig, LumenError, MergeTuning, ReaderMode,
    StorageLocator,
};
use lumen_engine_memory::{Document, FailPoint, MemoryEngine, MemoryError};
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Barrier};
use std::thread;
use tempfile::TempDir;

#[test]
fn concurrent_first_access_creates_one_holder() {
    const THREADS: usize = 8;

    let fx = fixture(ReaderMode::Realtime);
    let start = Barrier::new(THREADS);

    let holders: Vec<_> = thread::scope(|s| {
        let handles: Vec<_> = (0..THREADS)
            .map(|_| {
                s.spawn(|| {
                    start.wait();
                    fx.registry.get_or_create("docs").unwrap()
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    for holder in &holders[1..] {
        assert!(Arc::ptr_eq(&holders[0], holder));
    }
    assert_eq!(fx.registry.len(), 1);
    assert_eq!(fx.engine.stats().writers_opened, 1);
}

#[test]
fn get_does_not_create() {
    let fx = fixture(ReaderMode::Realtime);
    assert!(fx.registry.get("docs").is_none());
    assert!(fx.registry.is_empty());

    let created = fx.registry.get_or_create("docs").unwrap();
    let found = fx.registry.get("docs").unwrap();
    assert!(Arc::ptr_eq(&created, &found));
    assert!(fx.temp_dir.path().join("docs").is_dir());
}

#[test]
fn index_names_keep_first_access_order() {
    let fx = fixture(ReaderMode::Realtime);
    for name in ["zeta", "alpha", "mid", "alpha"] {
        fx.registry.get_or_create(name).unwrap();
    }
    assert_eq!(fx.registry.index_names(), vec!["zeta", "alpha", "mid"]);

    let stats = fx.registry.stats();
    let names: Vec<_> = stats.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, vec!["zeta", "alpha", "mid"]);
}

#[test]
fn with_searcher_runs_queries() {
    let fx = fixture(ReaderMode::Realtime);
    write(&fx.registry, "docs", "1", "rust borrow checker");
    write(&fx.registry, "docs", "2", "python garbage collector");
    write(&fx.registry, "docs", "3", "Rust lifetimes");
    fx.registry.reopen("docs").unwrap();

    let hits = fx
        .registry
        .with_searcher("docs", |searcher| Ok::<_, TestError>(searcher.search_ids("rust")))
        .unwrap();
    assert_eq!(hits, vec!["1", "3"]);

    let holder = fx.registry.get("docs").unwrap();
    assert_eq!(holder.stats().borrowed, 0);
}

#[test]
fn callback_error_is_propagated_and_handle_returned() {
    let fx = fixture(ReaderMode::Realtime);

    let result = fx.registry.with_reader("docs", |reader| {
        reader
            .get("missing")
            .map(|doc| doc.body.clone())
            .ok_or_else(|| TestError::Missing("missing".to_string()))
    });
    assert!(matches!(result, Err(TestError::Missing(ref id)) if id == "missing"));

    let result = fx.registry.with_writer("docs", |writer| {
        writer.add_document(Document::new("", "no id"))?;
        Ok::<_, TestError>(())
    });
    assert!(matches!(
        result,
        Err(TestError::Engine(MemoryError::EmptyDocumentId))
    ));

    let holder = fx.registry.get("docs").unwrap();
    assert_eq!(holder.stats().borrowed, 0);
}

#[test]
fn panicking_callback_returns_its_handle() {
    let fx = fixture(ReaderMode::Realtime);

    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        fx.registry
            .with_searcher("docs", |_searcher| -> Result<(), TestError> {
                panic!("callback blew up")
            })
    }));
    assert!(outcome.is_err());

    let holder = fx.registry.get("docs").unwrap();
    assert_eq!(holder.stats().borrowed, 0);

    // Still fully usable afterwards
    write(&fx.registry, "docs", "1", "after the panic");
    fx.registry.reopen("docs").unwrap();
    assert_eq!(visible_docs(&fx.registry, "docs"), 1);
}

#[test]
fn open_failure_leaves_no_holder_behind() {
    let fx = fixture(ReaderMode::Realtime);
    fx.engine.fail_next(FailPoint::WriterSnapshot);

    let result = fx
        .registry
        .with_reader("docs", |_reader| Ok::<_, TestError>(()));
    match result {
        Err(TestError::Lumen(err)) => {
            assert!(matches!(err, LumenError::Open { .. }));
            assert!(err.is_retryable());
        }
        other => panic!("expected open failure, got {:?}", other),
    }

    assert!(fx.registry.is_empty());
    let stats = fx.engine.stats();
    assert_eq!(stats.writers_opened, 1);
    assert_eq!(stats.writers_open, 0);

    // The next access opens it cleanly
    assert_eq!(visible_docs(&fx.registry, "docs"), 0);
    assert_eq!(fx.registry.len(), 1);
    assert_eq!(fx.engine.stats().writers_open, 1);
}

#[test]
fn snapshot_mode_open_failure_closes_writer() {
    let fx = fixture(ReaderMode::Snapshot);
    fx.engine.fail_next(FailPoint::OpenSnapshot);

    let err = fx.registry.get_or_create("docs").unwrap_err();
    assert!(matches!(err, LumenError::Open { ref index, .. } if index == "docs"));
    assert_eq!(fx.engine.stats().writers_open, 0);

    fx.engine.fail_next(FailPoint::OpenWriter);
    assert!(fx.registry.get_or_create("docs").is_err());
    assert!(fx.registry.get_or_create("docs").is_ok());
    assert_eq!(fx.engine.stats().writers_open, 1);
}

#[test]
fn invalid_name_is_a_storage_error() {
    let fx = fixture(ReaderMode::Realtime);
    for name in ["", "..", "a/b"] {
        let err = fx.registry.get_or_create(name).unwrap_err();
        assert!(matches!(err, LumenError::Storage { .. }), "{:?}", name);
    }
    assert!(fx.registry.is_empty());
    assert_eq!(fx.engine.stats().writers_opened, 0);
}

#[test]
fn reopen_all_reports_each_index() {
    let fx = fixture(ReaderMode::Snapshot);
    for name in ["a", "b", "c"] {
        fx.registry.get_or_create(name).unwrap();
    }
    write(&fx.registry, "a", "1", "doc");
    commit(&fx.registry, "a");
    write(&fx.registry, "c", "1", "doc");
    commit(&fx.registry, "c");

    let results = fx.registry.reopen_all();
    let summary: Vec<(String, bool)> = results
        .into_iter()
        .map(|(name, result)| (name, result.unwrap().is_reopened()))
        .collect();
    assert_eq!(
        summary,
        vec![
            ("a".to_string(), true),
            ("b".to_string(), false),
            ("c".to_string(), true),
        ]
    );

    // Nothing changed since, so a second pass is a no-op everywhere
    assert!(fx
        .registry
        .reopen_all()
        .into_iter()
        .all(|(_, result)| !result.unwrap().is_reopened()));
}

#[test]
fn reopen_all_isolates_failures() {
    let fx = fixture(ReaderMode::Realtime);
    for name in ["a", "b"] {
        write(&fx.registry, name, "1", "doc");
    }
    fx.engine.fail_next(FailPoint::Refresh);

    let results = fx.registry.reopen_all();
    let failed = results.iter().filter(|(_, r)| r.is_err()).count();
    let reopened = results
        .iter()
        .filter(|(_, r)| matches!(r, Ok(outcome) if outcome.is_reopened()))
        .count();
    assert_eq!(failed, 1);
    assert_eq!(reopened, 1);
}

#[test]
fn shared_layout_maps_every_index_to_one_location() {
    let fx = shared_fixture(ReaderMode::Snapshot);
    let a = fx.registry.get_or_create("a").unwrap();
    let b = fx.registry.get_or_create("b").unwrap();

    assert_eq!(a.location(), b.location());
    assert_eq!(a.location().path(), fx.temp_dir.path().join("all"));
    assert!(!Arc::ptr_eq(&a, &b));

    // A commit through one holder is visible to the other after reopen
    write(&fx.registry, "a", "1", "shared doc");
    commit(&fx.registry, "a");
    assert!(fx.registry.reopen("b").unwrap().is_reopened());
    assert_eq!(visible_docs(&fx.registry, "b"), 1);
}

#[test]
fn invalid_tuning_is_rejected() {
    let temp_dir = TempDir::new().unwrap();
    let tuning = MergeTuning {
        merge_factor: 1,
        ..MergeTuning::default()
    };

    let result = IndexRegistry::new(
        Arc::new(MemoryEngine::new()),
        StorageLocator::per_index(temp_dir.path()),
        ReaderMode::Realtime,
        tuning,
    );
    assert!(matches!(result, Err(LumenError::Config { .. })));
}

#[test]
fn registry_from_config() {
    let temp_dir = TempDir::new().unwrap();
    let mut config = LumenConfig::default();
    config.storage.base_dir = Some(temp_dir.path().join("data"));
    config.storage.layout = LocatorLayout::Shared;
    config.readers.mode = ReaderMode::Snapshot;
    config.merge.ram_buffer_mb = 64;

    let registry = IndexRegistry::from_config(Arc::new(MemoryEngine::new()), &config).unwrap();
    assert_eq!(registry.mode(), ReaderMode::Snapshot);
    assert_eq!(registry.locator().layout(), LocatorLayout::Shared);
    assert_eq!(registry.tuning().ram_buffer_mb, 64);

    let holder = registry.get_or_create("docs").unwrap();
    assert_eq!(holder.mode(), ReaderMode::Snapshot);
    assert!(temp_dir.path().join("data").is_dir());
    assert_eq!(holder.writer().tuning().ram_buffer_mb, 64);
}
