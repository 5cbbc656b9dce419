//! The in-memory engine: store map, instrumentation and failure injection.

use crate::error::MemoryError;
use crate::search::MemorySearcher;
use crate::snapshot::MemorySnapshot;
use crate::writer::{DocMap, MemoryWriter};
use dashmap::DashMap;
use lumen_core::{IndexEngine, MergeTuning, StorageLocation};
use parking_lot::RwLock;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Committed state of one storage location.
#[derive(Default)]
pub(crate) struct Store {
    pub(crate) committed: RwLock<Committed>,
}

#[derive(Default)]
pub(crate) struct Committed {
    pub(crate) generation: u64,
    pub(crate) docs: DocMap,
}

/// Operations that can be made to fail on demand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailPoint {
    /// `IndexEngine::open_writer`
    OpenWriter,
    /// `IndexEngine::open_snapshot`
    OpenSnapshot,
    /// `EngineWriter::snapshot`
    WriterSnapshot,
    /// `ReadSnapshot::refreshed`
    Refresh,
    /// `ReadSnapshot::release`
    Release,
}

impl FailPoint {
    const COUNT: usize = 5;

    fn slot(self) -> usize {
        match self {
            FailPoint::OpenWriter => 0,
            FailPoint::OpenSnapshot => 1,
            FailPoint::WriterSnapshot => 2,
            FailPoint::Refresh => 3,
            FailPoint::Release => 4,
        }
    }

    fn operation(self) -> &'static str {
        match self {
            FailPoint::OpenWriter => "open_writer",
            FailPoint::OpenSnapshot => "open_snapshot",
            FailPoint::WriterSnapshot => "writer_snapshot",
            FailPoint::Refresh => "refresh",
            FailPoint::Release => "release",
        }
    }
}

#[derive(Default)]
pub(crate) struct Faults {
    armed: [AtomicU32; FailPoint::COUNT],
}

impl Faults {
    fn arm(&self, point: FailPoint) {
        self.armed[point.slot()].fetch_add(1, Ordering::AcqRel);
    }

    /// Fail if a failure is armed for `point`, consuming it.
    pub(crate) fn check(&self, point: FailPoint) -> Result<(), MemoryError> {
        let fired = self.armed[point.slot()]
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
            .is_ok();
        if fired {
            debug!(operation = point.operation(), "Injected failure");
            return Err(MemoryError::Injected {
                operation: point.operation(),
            });
        }
        Ok(())
    }
}

#[derive(Default)]
pub(crate) struct Counters {
    pub(crate) writers_opened: AtomicU64,
    pub(crate) writers_dropped: AtomicU64,
    pub(crate) snapshots_opened: AtomicU64,
    pub(crate) snapshots_released: AtomicU64,
    pub(crate) double_releases: AtomicU64,
    pub(crate) search_views: AtomicU64,
}

/// State shared by the engine and everything it hands out.
#[derive(Default)]
pub(crate) struct Shared {
    pub(crate) counters: Counters,
    pub(crate) faults: Faults,
}

/// Resource counters of an engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct EngineStats {
    /// Writers ever opened
    pub writers_opened: u64,

    /// Writers opened and not yet dropped
    pub writers_open: u64,

    /// Snapshots ever opened, including refreshed ones
    pub snapshots_opened: u64,

    /// Snapshots released
    pub snapshots_released: u64,

    /// Snapshots opened and not yet released
    pub snapshots_open: u64,

    /// Release calls on an already released snapshot
    pub double_releases: u64,

    /// Search views built
    pub search_views: u64,
}

/// An engine keeping every index in memory.
///
/// Indexes are keyed by the path of their storage location, so two holders
/// opened on the same location see the same committed data.
#[derive(Default)]
pub struct MemoryEngine {
    stores: DashMap<PathBuf, Arc<Store>>,
    shared: Arc<Shared>,
}

impl MemoryEngine {
    /// Create an empty engine.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next call of an operation fail.
    ///
    /// Calling this `n` times makes the next `n` calls fail.
    pub fn fail_next(&self, point: FailPoint) {
        self.shared.faults.arm(point);
    }

    /// Current resource counters.
    pub fn stats(&self) -> EngineStats {
        let c = &self.shared.counters;
        let writers_opened = c.writers_opened.load(Ordering::Acquire);
        let writers_dropped = c.writers_dropped.load(Ordering::Acquire);
        let snapshots_opened = c.snapshots_opened.load(Ordering::Acquire);
        let snapshots_released = c.snapshots_released.load(Ordering::Acquire);

        EngineStats {
            writers_opened,
            writers_open: writers_opened.saturating_sub(writers_dropped),
            snapshots_opened,
            snapshots_released,
            snapshots_open: snapshots_opened.saturating_sub(snapshots_released),
            double_releases: c.double_releases.load(Ordering::Acquire),
            search_views: c.search_views.load(Ordering::Acquire),
        }
    }

    /// Committed generation at a location, if anything was ever opened there.
    pub fn committed_generation(&self, location: &StorageLocation) -> Option<u64> {
        self.stores
            .get(location.path())
            .map(|store| store.committed.read().generation)
    }

    fn store(&self, location: &StorageLocation) -> Arc<Store> {
        self.stores
            .entry(location.path().to_path_buf())
            .or_insert_with(|| Arc::new(Store::default()))
            .value()
            .clone()
    }
}

impl IndexEngine for MemoryEngine {
    type Writer = MemoryWriter;
    type Snapshot = MemorySnapshot;
    type SearchView = MemorySearcher;
    type Error = MemoryError;

    fn open_writer(
        &self,
        location: &StorageLocation,
        tuning: &MergeTuning,
    ) -> Result<MemoryWriter, MemoryError> {
        self.shared.faults.check(FailPoint::OpenWriter)?;
        Ok(MemoryWriter::open(
            self.store(location),
            *tuning,
            Arc::clone(&self.shared),
        ))
    }

    fn open_snapshot(&self, location: &StorageLocation) -> Result<MemorySnapshot, MemoryError> {
        self.shared.faults.check(FailPoint::OpenSnapshot)?;
        Ok(MemorySnapshot::from_store(
            self.store(location),
            Arc::clone(&self.shared),
        ))
    }

    fn search_view(&self, snapshot: Arc<MemorySnapshot>) -> MemorySearcher {
        self.shared
            .counters
            .search_views
            .fetch_add(1, Ordering::Relaxed);
        MemorySearcher::new(snapshot)
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}
