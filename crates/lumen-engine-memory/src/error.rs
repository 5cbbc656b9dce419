//! Error types for the in-memory engine.

use thiserror::Error;

/// Errors produced by the in-memory engine.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MemoryError {
    /// A failure requested through [`crate::MemoryEngine::fail_next`]
    #[error("injected failure in {operation}")]
    Injected { operation: &'static str },

    /// A snapshot was used after its resources were released
    #[error("snapshot generation {generation} was already released")]
    Released { generation: u64 },

    /// A document without an identifier was written
    #[error("document id must not be empty")]
    EmptyDocumentId,
}
