//! Error types for Lumen core operations.
//!
//! Engine failures arrive as the engine's own error type and are boxed into
//! [`LumenError`] together with the index name they concern, so callers can
//! tell an open failure (retry later) from a refresh failure (keep serving the
//! old snapshot) from a borrow contract violation (a bug in the caller).

use std::error::Error as StdError;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using LumenError
pub type Result<T> = std::result::Result<T, LumenError>;

/// Boxed engine error carried as the source of engine-originated failures.
pub type EngineError = Box<dyn StdError + Send + Sync + 'static>;

/// Core error types for Lumen operations.
#[derive(Error, Debug)]
pub enum LumenError {
    // === Storage Errors ===
    /// The storage location for an index could not be created or opened
    #[error("cannot open storage at {path}: {source}")]
    Storage {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // === Engine Errors ===
    /// The writer or the initial snapshot could not be constructed
    #[error("cannot open index {index}: {source}")]
    Open {
        index: String,
        #[source]
        source: EngineError,
    },

    /// A reopen failed; the previous snapshot is still current
    #[error("cannot refresh snapshot of index {index}: {source}")]
    Refresh {
        index: String,
        #[source]
        source: EngineError,
    },

    /// Freeing the resources of a fully returned snapshot failed
    #[error("cannot release snapshot of index {index}: {source}")]
    Release {
        index: String,
        #[source]
        source: EngineError,
    },

    // === Contract Errors ===
    /// A lease was returned to a holder that did not lend it, or a snapshot
    /// was returned more often than it was borrowed
    #[error("borrow protocol violated on index {index}: {reason}")]
    BorrowProtocol { index: String, reason: String },

    // === Configuration Errors ===
    /// Configuration file parsing or validation failed
    #[error("configuration error: {reason}")]
    Config { reason: String },

    // === I/O Errors ===
    /// Generic I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl LumenError {
    /// Returns true if a later attempt at the same operation may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            LumenError::Storage { .. }
                | LumenError::Open { .. }
                | LumenError::Refresh { .. }
                | LumenError::Io(_)
        )
    }

    /// Returns true if this error reports a caller bug rather than a runtime
    /// condition.
    pub fn is_contract_violation(&self) -> bool {
        matches!(self, LumenError::BorrowProtocol { .. })
    }

    /// Create an open error for an index
    pub fn open(index: impl Into<String>, source: impl Into<EngineError>) -> Self {
        LumenError::Open {
            index: index.into(),
            source: source.into(),
        }
    }

    /// Create a refresh error for an index
    pub fn refresh(index: impl Into<String>, source: impl Into<EngineError>) -> Self {
        LumenError::Refresh {
            index: index.into(),
            source: source.into(),
        }
    }

    /// Create a release error for an index
    pub fn release(index: impl Into<String>, source: impl Into<EngineError>) -> Self {
        LumenError::Release {
            index: index.into(),
            source: source.into(),
        }
    }

    /// Create a borrow protocol error
    pub fn borrow_protocol(index: impl Into<String>, reason: impl Into<String>) -> Self {
        LumenError::BorrowProtocol {
            index: index.into(),
            reason: reason.into(),
        }
    }
}
