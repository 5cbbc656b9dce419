//! # Lumen Core Library
//!
//! This crate manages the lifecycle of per-index search resources: one
//! exclusive writer and a shared, reference-counted read snapshot for each of
//! a set of independently named full-text indexes. The text engine itself is
//! abstracted behind traits; Lumen decides when its writers and snapshots are
//! created, shared, refreshed and released.
//!
//! ## Architecture
//!
//! - **Engine** (`engine`): Traits an index engine implements
//! - **Locator** (`locator`): Maps index names to storage directories
//! - **Holder** (`holder`): One writer plus the current snapshot of one index
//! - **Registry** (`registry`): Lazily created holders, keyed by index name
//! - **Config** (`config`): Configuration management
//!
//! ## Example
//!
//! ```rust,ignore
//! use lumen_core::{IndexRegistry, LumenConfig};
//!
//! let registry = IndexRegistry::from_config(engine, &LumenConfig::load()?)?;
//!
//! registry.with_writer("docs", |writer| writer.add_document(doc))?;
//! registry.reopen("docs")?;
//! let count = registry.with_reader("docs", |reader| Ok::<_, LumenError>(reader.doc_count()))?;
//! ```

pub mod config;
pub mod engine;
pub mod error;
pub mod holder;
pub mod locator;
pub mod registry;
pub mod types;

// Re-export commonly used types
pub use config::LumenConfig;
pub use engine::{EngineWriter, IndexEngine, ReadSnapshot};
pub use error::{LumenError, Result};
pub use holder::{IndexHolder, ReaderLease, SearcherLease};
pub use locator::{LocatorLayout, StorageLocation, StorageLocator};
pub use registry::IndexRegistry;
pub use types::{HolderStats, MergeTuning, ReaderMode, ReopenOutcome};
