//! # Lumen In-Memory Engine
//!
//! A reference implementation of the `lumen_core` engine traits that keeps
//! every index in memory, keyed by its storage location. It is small enough
//! to reason about in tests yet honours the same contracts a disk-backed
//! engine would:
//!
//! - Writers buffer changes; `commit` makes them visible to snapshots opened
//!   from the storage location.
//! - Realtime snapshots taken from a writer see uncommitted changes.
//! - `refreshed` reports "no new generation" when nothing changed.
//! - `release` is counted, so tests can check that every snapshot opened is
//!   eventually released exactly once.
//!
//! ## Architecture
//!
//! - `engine.rs`: the engine, its store map and failure injection
//! - `writer.rs`: the buffered writer
//! - `snapshot.rs`: immutable snapshots and refresh
//! - `search.rs`: term lookup over a snapshot
//!
//! Two writers opened on the same location do not see each other's buffered
//! changes; the last commit wins. Callers sharing a location partition their
//! document ids themselves.

mod engine;
mod search;
mod snapshot;
mod writer;

/// Error types specific to the in-memory engine
pub mod error;

pub use engine::{EngineStats, FailPoint, MemoryEngine};
pub use error::MemoryError;
pub use search::MemorySearcher;
pub use snapshot::MemorySnapshot;
pub use writer::{Document, MemoryWriter};
