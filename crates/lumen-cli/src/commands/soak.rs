//! Soak command - concurrent writers, readers and reopens against a registry.
//!
//! Every index gets its own writer and reader threads; a single reopener
//! thread runs `reopen_all` in a loop. Readers check that the snapshot they
//! borrow is internally consistent and that generations never go backwards.
//! After the run the registry is dropped and the engine must report no open
//! writers or snapshots.

use crate::app::App;
use crate::OutputFormat;
use anyhow::{anyhow, bail};
use chrono::{DateTime, Utc};
use lumen_core::{HolderStats, IndexRegistry, LumenConfig, ReaderMode};
use lumen_engine_memory::{Document, EngineStats, MemoryEngine};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread;
use std::time::{Duration, Instant};
use tempfile::TempDir;
use tracing::{debug, info, warn};

/// Term every soak document contains.
const SOAK_TERM: &str = "lumen";

/// Parameters of a soak run.
#[derive(Debug, Clone)]
pub struct SoakOptions {
    pub indexes: Vec<String>,
    pub writers: usize,
    pub readers: usize,
    pub duration: Duration,
    pub reopen_interval: Duration,
    pub commit_every: usize,
}

#[derive(Default)]
struct Counters {
    documents_written: AtomicU64,
    documents_deleted: AtomicU64,
    commits: AtomicU64,
    reads: AtomicU64,
    reopen_passes: AtomicU64,
    reopens_published: AtomicU64,
    reopen_failures: AtomicU64,
}

/// Operation totals of a soak run.
#[derive(Debug, Clone, Serialize)]
pub struct SoakTotals {
    pub documents_written: u64,
    pub documents_deleted: u64,
    pub commits: u64,
    pub reads: u64,
    pub reopen_passes: u64,
    pub reopens_published: u64,
    pub reopen_failures: u64,
}

impl From<&Counters> for SoakTotals {
    fn from(c: &Counters) -> Self {
        SoakTotals {
            documents_written: c.documents_written.load(Ordering::Relaxed),
            documents_deleted: c.documents_deleted.load(Ordering::Relaxed),
            commits: c.commits.load(Ordering::Relaxed),
            reads: c.reads.load(Ordering::Relaxed),
            reopen_passes: c.reopen_passes.load(Ordering::Relaxed),
            reopens_published: c.reopens_published.load(Ordering::Relaxed),
            reopen_failures: c.reopen_failures.load(Ordering::Relaxed),
        }
    }
}

/// Outcome of a soak run.
#[derive(Debug, Clone, Serialize)]
pub struct SoakReport {
    pub started_at: DateTime<Utc>,
    pub elapsed_secs: f64,
    pub mode: ReaderMode,
    pub totals: SoakTotals,
    pub holders: Vec<HolderStats>,
    pub engine: EngineStats,
    pub after_shutdown: EngineStats,
    pub violations: Vec<String>,
}

/// Run the soak command.
pub fn run(
    mut config: LumenConfig,
    options: SoakOptions,
    output: OutputFormat,
) -> anyhow::Result<()> {
    let _scratch = scratch_base_dir(&mut config)?;
    let app = App::new(config)?;
    let report = execute(app, &options)?;

    match output {
        OutputFormat::Text => print_text(&report),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
    }

    if !report.violations.is_empty() {
        bail!("soak found {} violation(s)", report.violations.len());
    }
    Ok(())
}

/// Point an unconfigured base directory at a scratch directory.
///
/// The engine keeps everything in memory, so a soak run without an explicit
/// base directory must not create index directories in the user's data
/// directory. The returned directory is removed when dropped.
fn scratch_base_dir(config: &mut LumenConfig) -> anyhow::Result<Option<TempDir>> {
    if config.storage.base_dir.is_some() {
        return Ok(None);
    }

    let scratch = tempfile::Builder::new().prefix("lumen-soak-").tempdir()?;
    debug!(base_dir = %scratch.path().display(), "Using scratch base directory");
    config.storage.base_dir = Some(scratch.path().to_path_buf());
    Ok(Some(scratch))
}

/// Drive the registry for the configured duration and collect the report.
pub fn execute(app: App, options: &SoakOptions) -> anyhow::Result<SoakReport> {
    if options.indexes.is_empty() {
        bail!("at least one index is required");
    }
    if options.commit_every == 0 {
        bail!("--commit-every must be greater than zero");
    }

    for name in &options.indexes {
        app.registry.get_or_create(name)?;
    }

    let counters = Counters::default();
    let stop = AtomicBool::new(false);
    let started_at = Utc::now();
    let start = Instant::now();
    info!(
        indexes = options.indexes.len(),
        writers = options.writers,
        readers = options.readers,
        mode = %app.config.readers.mode,
        "Starting soak"
    );

    let registry = &app.registry;
    let outcomes: Vec<anyhow::Result<()>> = thread::scope(|s| {
        let mut handles = Vec::new();

        for name in &options.indexes {
            for writer in 0..options.writers {
                let (counters, stop) = (&counters, &stop);
                handles.push(s.spawn(move || {
                    write_loop(registry, name, writer, options.commit_every, counters, stop)
                }));
            }
            for _ in 0..options.readers {
                let (counters, stop) = (&counters, &stop);
                handles.push(s.spawn(move || read_loop(registry, name, counters, stop)));
            }
        }

        {
            let (counters, stop) = (&counters, &stop);
            handles.push(
                s.spawn(move || reopen_loop(registry, options.reopen_interval, counters, stop)),
            );
        }

        thread::sleep(options.duration);
        stop.store(true, Ordering::Release);

        handles
            .into_iter()
            .map(|handle| {
                handle
                    .join()
                    .unwrap_or_else(|_| Err(anyhow!("soak worker panicked")))
            })
            .collect()
    });

    let mut violations: Vec<String> = outcomes
        .into_iter()
        .filter_map(|outcome| outcome.err().map(|e| format!("{:#}", e)))
        .collect();

    // Publish whatever the writers left behind
    for (name, result) in registry.reopen_all() {
        if let Err(e) = result {
            violations.push(format!("final reopen of {} failed: {}", name, e));
        }
    }

    let holders = registry.stats();
    let engine = app.engine.stats();
    for holder in &holders {
        if holder.borrowed != 0 {
            violations.push(format!(
                "{} still has {} outstanding borrow(s)",
                holder.name, holder.borrowed
            ));
        }
    }
    if engine.double_releases != 0 {
        violations.push(format!(
            "{} snapshot(s) were released twice",
            engine.double_releases
        ));
    }
    if engine.snapshots_open != holders.len() as u64 {
        violations.push(format!(
            "{} snapshot(s) open for {} holder(s)",
            engine.snapshots_open,
            holders.len()
        ));
    }

    let App {
        config,
        engine: memory_engine,
        registry,
    } = app;
    drop(registry);
    let after_shutdown = memory_engine.stats();
    if after_shutdown.writers_open != 0 || after_shutdown.snapshots_open != 0 {
        violations.push(format!(
            "after shutdown {} writer(s) and {} snapshot(s) are still open",
            after_shutdown.writers_open, after_shutdown.snapshots_open
        ));
    }

    for violation in &violations {
        warn!(%violation, "Soak violation");
    }

    Ok(SoakReport {
        started_at,
        elapsed_secs: start.elapsed().as_secs_f64(),
        mode: config.readers.mode,
        totals: SoakTotals::from(&counters),
        holders,
        engine,
        after_shutdown,
        violations,
    })
}

fn write_loop(
    registry: &IndexRegistry<MemoryEngine>,
    index: &str,
    writer_id: usize,
    commit_every: usize,
    counters: &Counters,
    stop: &AtomicBool,
) -> anyhow::Result<()> {
    let mut n: usize = 0;
    while !stop.load(Ordering::Acquire) {
        let id = format!("w{}-{}", writer_id, n);
        let body = format!("{} soak {} batch {}", SOAK_TERM, index, n / commit_every);
        registry.with_writer(index, |writer| {
            writer.add_document(Document::new(id, body))?;
            Ok::<_, anyhow::Error>(())
        })?;
        counters.documents_written.fetch_add(1, Ordering::Relaxed);

        // Retire every fifth document so deletes flow through reopens too
        if n % 5 == 4 {
            let victim = format!("w{}-{}", writer_id, n - 2);
            if registry.with_writer(index, |writer| {
                Ok::<_, anyhow::Error>(writer.delete_document(&victim))
            })? {
                counters.documents_deleted.fetch_add(1, Ordering::Relaxed);
            }
        }

        n += 1;
        if n % commit_every == 0 {
            let generation =
                registry.with_writer(index, |writer| Ok::<_, anyhow::Error>(writer.commit()))?;
            counters.commits.fetch_add(1, Ordering::Relaxed);
            debug!(index, writer_id, generation, "Committed");
        }
    }
    Ok(())
}

fn read_loop(
    registry: &IndexRegistry<MemoryEngine>,
    index: &str,
    counters: &Counters,
    stop: &AtomicBool,
) -> anyhow::Result<()> {
    let mut last_generation = 0;
    while !stop.load(Ordering::Acquire) {
        let (generation, count, hits) = registry.with_searcher(index, |searcher| {
            Ok::<_, anyhow::Error>((
                searcher.generation(),
                searcher.count(),
                searcher.search(SOAK_TERM).len(),
            ))
        })?;

        if generation < last_generation {
            bail!(
                "{}: generation went backwards from {} to {}",
                index,
                last_generation,
                generation
            );
        }
        if hits != count {
            bail!(
                "{}: generation {} has {} documents but {} match the soak term",
                index,
                generation,
                count,
                hits
            );
        }

        last_generation = generation;
        counters.reads.fetch_add(1, Ordering::Relaxed);
    }
    Ok(())
}

fn reopen_loop(
    registry: &IndexRegistry<MemoryEngine>,
    interval: Duration,
    counters: &Counters,
    stop: &AtomicBool,
) -> anyhow::Result<()> {
    while !stop.load(Ordering::Acquire) {
        for (name, result) in registry.reopen_all() {
            match result {
                Ok(outcome) if outcome.is_reopened() => {
                    counters.reopens_published.fetch_add(1, Ordering::Relaxed);
                }
                Ok(_) => {}
                Err(e) => {
                    counters.reopen_failures.fetch_add(1, Ordering::Relaxed);
                    warn!(index = %name, error = %e, "Reopen failed");
                }
            }
        }
        counters.reopen_passes.fetch_add(1, Ordering::Relaxed);
        thread::sleep(interval);
    }
    Ok(())
}

fn print_text(report: &SoakReport) {
    let t = &report.totals;

    println!("Lumen Soak Report");
    println!("=================");
    println!();
    println!(
        "Started:   {}",
        report.started_at.format("%Y-%m-%d %H:%M:%S")
    );
    println!("Elapsed:   {:.2}s", report.elapsed_secs);
    println!("Mode:      {}", report.mode);
    println!();
    println!("Totals:");
    println!("  Documents written:  {}", t.documents_written);
    println!("  Documents deleted:  {}", t.documents_deleted);
    println!("  Commits:            {}", t.commits);
    println!("  Reads:              {}", t.reads);
    println!(
        "  Reopens:            {} published in {} passes ({} failed)",
        t.reopens_published, t.reopen_passes, t.reopen_failures
    );

    println!();
    println!("Indexes:");
    for holder in &report.holders {
        println!(
            "  {} generation {} ({} docs, {} reopens, {} unchanged)",
            holder.name, holder.generation, holder.doc_count, holder.reopens, holder.unchanged_reopens
        );
        if let Some(at) = holder.last_reopened {
            println!("    Last reopened: {}", at.format("%H:%M:%S%.3f"));
        }
    }

    let e = &report.engine;
    println!();
    println!("Engine:");
    println!(
        "  Writers:    {} opened, {} open",
        e.writers_opened, e.writers_open
    );
    println!(
        "  Snapshots:  {} opened, {} released, {} open",
        e.snapshots_opened, e.snapshots_released, e.snapshots_open
    );
    println!("  Searchers:  {}", e.search_views);

    println!();
    if report.violations.is_empty() {
        println!("✓ All snapshots returned and released");
    } else {
        println!("Violations:");
        for violation in &report.violations {
            println!("  ⚠ {}", violation);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn soak(mode: ReaderMode) -> SoakReport {
        let temp_dir = TempDir::new().unwrap();
        let mut config = LumenConfig::default();
        config.storage.base_dir = Some(temp_dir.path().to_path_buf());
        config.readers.mode = mode;

        let options = SoakOptions {
            indexes: vec!["a".to_string(), "b".to_string()],
            writers: 2,
            readers: 3,
            duration: Duration::from_millis(300),
            reopen_interval: Duration::from_millis(5),
            commit_every: 10,
        };
        execute(App::new(config).unwrap(), &options).unwrap()
    }

    #[test]
    fn test_realtime_soak_is_clean() {
        let report = soak(ReaderMode::Realtime);
        assert!(report.violations.is_empty(), "{:?}", report.violations);
        assert!(report.totals.documents_written > 0);
        assert!(report.totals.reads > 0);
        assert_eq!(report.holders.len(), 2);
        assert_eq!(report.after_shutdown.snapshots_open, 0);
        assert_eq!(report.after_shutdown.writers_open, 0);
    }

    #[test]
    fn test_snapshot_soak_is_clean() {
        let report = soak(ReaderMode::Snapshot);
        assert!(report.violations.is_empty(), "{:?}", report.violations);
        assert_eq!(report.mode, ReaderMode::Snapshot);
        assert_eq!(report.engine.writers_opened, 2);
    }

    #[test]
    fn test_unconfigured_base_dir_uses_scratch() {
        let mut config = LumenConfig::default();
        let scratch = scratch_base_dir(&mut config).unwrap().unwrap();
        let base_dir = config.storage.base_dir.clone().unwrap();
        assert_eq!(base_dir, scratch.path());

        let app = App::new(config).unwrap();
        app.registry.get_or_create("docs").unwrap();
        assert!(base_dir.join("docs").is_dir());

        drop(app);
        drop(scratch);
        assert!(!base_dir.exists());
    }

    #[test]
    fn test_configured_base_dir_is_kept() {
        let temp_dir = TempDir::new().unwrap();
        let mut config = LumenConfig::default();
        config.storage.base_dir = Some(temp_dir.path().to_path_buf());

        assert!(scratch_base_dir(&mut config).unwrap().is_none());
        assert_eq!(config.storage.base_dir.as_deref(), Some(temp_dir.path()));
    }

    #[test]
    fn test_zero_commit_interval_is_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let mut config = LumenConfig::default();
        config.storage.base_dir = Some(temp_dir.path().to_path_buf());

        let options = SoakOptions {
            indexes: vec!["a".to_string()],
            writers: 1,
            readers: 1,
            duration: Duration::from_millis(10),
            reopen_interval: Duration::from_millis(1),
            commit_every: 0,
        };
        assert!(execute(App::new(config).unwrap(), &options).is_err());
    }
}
