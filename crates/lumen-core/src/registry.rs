//! Process-wide registry of index holders.
//!
//! The [`IndexRegistry`] maps index names to [`IndexHolder`]s, creating each
//! holder the first time its name is used. Lookups of known names only take a
//! shared read lock; creation is serialized by a single lock so two threads
//! racing on a new name end up with the same holder and a single writer.
//!
//! ## Scoped access
//!
//! Callers do not keep raw handles. Each `with_*` method borrows the handle,
//! hands it to a callback of the form `FnOnce(&Handle) -> Result<T, X>` and
//! returns it afterwards, whether the callback succeeds, fails or panics.
//! `X` is the caller's own error type; it only needs `From<LumenError>`.
//!
//! ```rust,ignore
//! let registry = IndexRegistry::new(engine, StorageLocator::per_index(dir), ReaderMode::Realtime, MergeTuning::default())?;
//!
//! registry.with_writer("docs", |writer| writer.add(doc))?;
//! registry.reopen("docs")?;
//! let hits = registry.with_searcher("docs", |searcher| Ok::<_, LumenError>(searcher.search("rust")))?;
//! ```

use crate::config::LumenConfig;
use crate::engine::IndexEngine;
use crate::error::{LumenError, Result};
use crate::holder::IndexHolder;
use crate::locator::StorageLocator;
use crate::types::{HolderStats, MergeTuning, ReaderMode, ReopenOutcome};
use indexmap::IndexMap;
use parking_lot::{Mutex, RwLock};
use rayon::prelude::*;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Name-to-holder map with lazy, race-free holder creation.
pub struct IndexRegistry<E: IndexEngine> {
    engine: Arc<E>,
    locator: StorageLocator,
    mode: ReaderMode,
    tuning: MergeTuning,

    /// Holders in creation order
    holders: RwLock<IndexMap<String, Arc<IndexHolder<E>>>>,

    /// Serializes check-then-insert of new holders
    create_lock: Mutex<()>,
}

impl<E: IndexEngine> IndexRegistry<E> {
    /// Create an empty registry.
    ///
    /// The locator, reader mode and tuning apply to every holder the
    /// registry creates and cannot be changed afterwards.
    pub fn new(
        engine: Arc<E>,
        locator: StorageLocator,
        mode: ReaderMode,
        tuning: MergeTuning,
    ) -> Result<Self> {
        tuning
            .validate()
            .map_err(|reason| LumenError::Config { reason })?;

        info!(
            engine = engine.name(),
            base_dir = %locator.base_dir().display(),
            layout = ?locator.layout(),
            %mode,
            "Created index registry"
        );

        Ok(IndexRegistry {
            engine,
            locator,
            mode,
            tuning,
            holders: RwLock::new(IndexMap::new()),
            create_lock: Mutex::new(()),
        })
    }

    /// Create a registry from loaded configuration.
    pub fn from_config(engine: Arc<E>, config: &LumenConfig) -> Result<Self> {
        let locator = config.locator()?;
        Self::new(engine, locator, config.readers.mode, config.merge)
    }

    /// Look up an existing holder without creating one.
    pub fn get(&self, name: &str) -> Option<Arc<IndexHolder<E>>> {
        self.holders.read().get(name).cloned()
    }

    /// Look up a holder, opening it on first access.
    pub fn get_or_create(&self, name: &str) -> Result<Arc<IndexHolder<E>>> {
        if let Some(holder) = self.get(name) {
            return Ok(holder);
        }
        self.create(name)
    }

    #[instrument(skip(self))]
    fn create(&self, name: &str) -> Result<Arc<IndexHolder<E>>> {
        let _create = self.create_lock.lock();

        // Another thread may have created it while we waited
        if let Some(holder) = self.get(name) {
            debug!("Holder created concurrently");
            return Ok(holder);
        }

        let location = self.locator.map(name)?;
        let holder = Arc::new(IndexHolder::open(
            Arc::clone(&self.engine),
            name,
            location,
            self.mode,
            &self.tuning,
        )?);

        self.holders
            .write()
            .insert(name.to_string(), Arc::clone(&holder));
        Ok(holder)
    }

    /// Run a callback against a borrowed snapshot of an index.
    pub fn with_reader<T, X, F>(&self, name: &str, f: F) -> std::result::Result<T, X>
    where
        F: FnOnce(&E::Snapshot) -> std::result::Result<T, X>,
        X: From<LumenError>,
    {
        let holder = self.get_or_create(name)?;
        let lease = holder.borrow_reader();
        let result = f(&*lease);
        settle(name, result, holder.return_reader(lease))
    }

    /// Run a callback against a search view over a borrowed snapshot.
    pub fn with_searcher<T, X, F>(&self, name: &str, f: F) -> std::result::Result<T, X>
    where
        F: FnOnce(&E::SearchView) -> std::result::Result<T, X>,
        X: From<LumenError>,
    {
        let holder = self.get_or_create(name)?;
        let lease = holder.borrow_searcher();
        let result = f(lease.view());
        settle(name, result, holder.return_searcher(lease))
    }

    /// Run a callback against the single writer of an index.
    pub fn with_writer<T, X, F>(&self, name: &str, f: F) -> std::result::Result<T, X>
    where
        F: FnOnce(&E::Writer) -> std::result::Result<T, X>,
        X: From<LumenError>,
    {
        let holder = self.get_or_create(name)?;
        f(holder.writer())
    }

    /// Publish a fresh snapshot for an index if it changed.
    pub fn reopen(&self, name: &str) -> Result<ReopenOutcome> {
        self.get_or_create(name)?.reopen_reader()
    }

    /// Reopen every known index in parallel.
    ///
    /// Results are returned in registry order; a failure on one index does
    /// not affect the others.
    pub fn reopen_all(&self) -> Vec<(String, Result<ReopenOutcome>)> {
        let holders: Vec<Arc<IndexHolder<E>>> = self.holders.read().values().cloned().collect();

        let results: Vec<(String, Result<ReopenOutcome>)> = holders
            .par_iter()
            .map(|holder| (holder.name().to_string(), holder.reopen_reader()))
            .collect();

        let failed = results.iter().filter(|(_, r)| r.is_err()).count();
        if failed > 0 {
            warn!(total = results.len(), failed, "Some indexes failed to reopen");
        }
        results
    }

    /// Names of all opened indexes, in the order they were first accessed
    pub fn index_names(&self) -> Vec<String> {
        self.holders.read().keys().cloned().collect()
    }

    /// Statistics for every opened index, in registry order
    pub fn stats(&self) -> Vec<HolderStats> {
        let holders: Vec<Arc<IndexHolder<E>>> = self.holders.read().values().cloned().collect();
        holders.iter().map(|holder| holder.stats()).collect()
    }

    /// Number of opened indexes
    pub fn len(&self) -> usize {
        self.holders.read().len()
    }

    /// Check if no index has been opened yet
    pub fn is_empty(&self) -> bool {
        self.holders.read().is_empty()
    }

    /// Reader mode used for every holder
    pub fn mode(&self) -> ReaderMode {
        self.mode
    }

    /// Tuning used for every writer
    pub fn tuning(&self) -> &MergeTuning {
        &self.tuning
    }

    /// Storage locator used for every holder
    pub fn locator(&self) -> &StorageLocator {
        &self.locator
    }

    /// The engine backing this registry
    pub fn engine(&self) -> &Arc<E> {
        &self.engine
    }
}

/// Combine a callback result with the outcome of returning its handle.
///
/// The callback's own error takes precedence; a return failure behind it is
/// logged.
fn settle<T, X>(
    index: &str,
    result: std::result::Result<T, X>,
    returned: Result<()>,
) -> std::result::Result<T, X>
where
    X: From<LumenError>,
{
    match (result, returned) {
        (Ok(value), Ok(())) => Ok(value),
        (Ok(_), Err(e)) => Err(e.into()),
        (Err(e), Ok(())) => Err(e),
        (Err(e), Err(return_err)) => {
            warn!(index, error = %return_err, "Return failed after callback error");
            Err(e)
        }
    }
}
