//! Core data types for Lumen.
//!
//! These types describe how an index is opened (reader mode, merge tuning) and
//! what a holder reports back about itself (reopen outcomes and statistics).
//! They are engine-agnostic: nothing here knows how a snapshot is stored.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// How a holder derives its read snapshots.
///
/// The mode is fixed when the holder is created and never mixed within one
/// holder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum ReaderMode {
    /// Snapshots come from the writer and see flushed but uncommitted changes
    #[default]
    Realtime,

    /// Snapshots come from the storage location and see committed changes only
    Snapshot,
}

impl fmt::Display for ReaderMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReaderMode::Realtime => write!(f, "realtime"),
            ReaderMode::Snapshot => write!(f, "snapshot"),
        }
    }
}

impl std::str::FromStr for ReaderMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "realtime" | "rt" => Ok(ReaderMode::Realtime),
            "snapshot" | "nrt" => Ok(ReaderMode::Snapshot),
            _ => Err(format!("Unknown reader mode: {}", s)),
        }
    }
}

/// Merge-policy and buffering parameters handed to the engine when a writer
/// is constructed.
///
/// These are fixed for the lifetime of a writer; the defaults match the
/// values every index has always been opened with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MergeTuning {
    /// Number of segments merged at once
    pub merge_factor: u32,

    /// Segments larger than this (in MB) are never merged further
    pub max_merge_mb: u64,

    /// In-memory buffer before the writer flushes a segment (in MB)
    pub ram_buffer_mb: u64,

    /// Whether segments are packed into compound files
    pub use_compound_file: bool,
}

impl Default for MergeTuning {
    fn default() -> Self {
        MergeTuning {
            merge_factor: 5,
            max_merge_mb: 1000,
            ram_buffer_mb: 16,
            use_compound_file: false,
        }
    }
}

impl MergeTuning {
    /// Check that the parameters describe a usable merge policy.
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.merge_factor < 2 {
            return Err(format!(
                "merge_factor must be at least 2, got {}",
                self.merge_factor
            ));
        }
        if self.ram_buffer_mb == 0 {
            return Err("ram_buffer_mb must be greater than zero".to_string());
        }
        if self.max_merge_mb == 0 {
            return Err("max_merge_mb must be greater than zero".to_string());
        }
        Ok(())
    }
}

/// Result of a single reopen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReopenOutcome {
    /// Nothing changed since the current snapshot was taken
    Unchanged { generation: u64 },

    /// A fresh snapshot was published
    Reopened { previous: u64, current: u64 },
}

impl ReopenOutcome {
    /// Returns true if a new snapshot was published.
    pub fn is_reopened(&self) -> bool {
        matches!(self, ReopenOutcome::Reopened { .. })
    }

    /// Generation of the snapshot that is current after the reopen.
    pub fn generation(&self) -> u64 {
        match *self {
            ReopenOutcome::Unchanged { generation } => generation,
            ReopenOutcome::Reopened { current, .. } => current,
        }
    }
}

impl fmt::Display for ReopenOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReopenOutcome::Unchanged { generation } => {
                write!(f, "unchanged at generation {}", generation)
            }
            ReopenOutcome::Reopened { previous, current } => {
                write!(f, "reopened {} -> {}", previous, current)
            }
        }
    }
}

/// Point-in-time statistics about a holder.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HolderStats {
    /// Index name
    pub name: String,

    /// Reader mode of the holder
    pub mode: ReaderMode,

    /// Generation of the current snapshot
    pub generation: u64,

    /// Documents visible in the current snapshot
    pub doc_count: u64,

    /// Outstanding borrows of the current snapshot (excluding the holder's own)
    pub borrowed: usize,

    /// Reopens that published a new snapshot
    pub reopens: u64,

    /// Reopens that found nothing new
    pub unchanged_reopens: u64,

    /// Reopens that failed
    pub failed_reopens: u64,

    /// When a new snapshot was last published
    pub last_reopened: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_tuning() {
        let tuning = MergeTuning::default();
        assert_eq!(tuning.merge_factor, 5);
        assert_eq!(tuning.max_merge_mb, 1000);
        assert_eq!(tuning.ram_buffer_mb, 16);
        assert!(!tuning.use_compound_file);
        assert!(tuning.validate().is_ok());
    }

    #[test]
    fn test_tuning_validation() {
        let mut tuning = MergeTuning::default();
        tuning.merge_factor = 1;
        assert!(tuning.validate().is_err());

        let mut tuning = MergeTuning::default();
        tuning.ram_buffer_mb = 0;
        assert!(tuning.validate().is_err());
    }

    #[test]
    fn test_reader_mode_parse() {
        assert_eq!("realtime".parse::<ReaderMode>(), Ok(ReaderMode::Realtime));
        assert_eq!("Snapshot".parse::<ReaderMode>(), Ok(ReaderMode::Snapshot));
        assert_eq!("nrt".parse::<ReaderMode>(), Ok(ReaderMode::Snapshot));
        assert!("eventual".parse::<ReaderMode>().is_err());
    }

    #[test]
    fn test_reopen_outcome() {
        let outcome = ReopenOutcome::Reopened {
            previous: 3,
            current: 4,
        };
        assert!(outcome.is_reopened());
        assert_eq!(outcome.generation(), 4);
        assert_eq!(outcome.to_string(), "reopened 3 -> 4");

        let outcome = ReopenOutcome::Unchanged { generation: 7 };
        assert!(!outcome.is_reopened());
        assert_eq!(outcome.generation(), 7);
    }
}
