//! Application state management.

use lumen_core::{IndexRegistry, LumenConfig};
use lumen_engine_memory::MemoryEngine;
use std::sync::Arc;
use tracing::info;

/// Shared application state.
pub struct App {
    /// Configuration
    pub config: LumenConfig,

    /// Engine backing every index
    pub engine: Arc<MemoryEngine>,

    /// The index registry
    pub registry: IndexRegistry<MemoryEngine>,
}

impl App {
    /// Create a new application instance.
    pub fn new(config: LumenConfig) -> anyhow::Result<Self> {
        let engine = Arc::new(MemoryEngine::new());
        let registry = IndexRegistry::from_config(Arc::clone(&engine), &config)?;

        info!(
            base_dir = %registry.locator().base_dir().display(),
            mode = %registry.mode(),
            "Application initialized"
        );

        Ok(App {
            config,
            engine,
            registry,
        })
    }
}
