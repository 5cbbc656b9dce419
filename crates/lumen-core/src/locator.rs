//! Mapping of index names to storage locations.
//!
//! A [`StorageLocator`] is chosen once, when the registry is built, and turns
//! an index name into a [`StorageLocation`] the engine can open. Results are
//! not cached here; each holder keeps the location it was opened with.

use crate::error::{LumenError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// A directory that exists and that an engine may open an index in.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StorageLocation {
    path: PathBuf,
}

impl StorageLocation {
    /// Open an existing directory as a storage location.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let metadata = fs::metadata(&path).map_err(|source| LumenError::Storage {
            path: path.clone(),
            source,
        })?;
        if !metadata.is_dir() {
            return Err(LumenError::Storage {
                path,
                source: std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    "storage location is not a directory",
                ),
            });
        }
        Ok(StorageLocation { path })
    }

    /// Create the directory if needed, then open it.
    pub fn create(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        fs::create_dir_all(&path).map_err(|source| LumenError::Storage {
            path: path.clone(),
            source,
        })?;
        Self::open(path)
    }

    /// Filesystem path of this location
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl fmt::Display for StorageLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path.display())
    }
}

/// How index names map onto directories below a base directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum LocatorLayout {
    /// Every index gets its own sub-directory named after it
    #[default]
    PerIndex,

    /// All indexes share the base directory
    Shared,
}

/// Strategy mapping an index name to its storage location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageLocator {
    /// `base_dir/<index name>`, created on demand
    PerIndex { base_dir: PathBuf },

    /// `base_dir` for every name; the caller partitions data itself
    Shared { base_dir: PathBuf },
}

impl StorageLocator {
    /// One directory per index below `base_dir`.
    pub fn per_index(base_dir: impl Into<PathBuf>) -> Self {
        StorageLocator::PerIndex {
            base_dir: base_dir.into(),
        }
    }

    /// The same `base_dir` for every index.
    pub fn shared(base_dir: impl Into<PathBuf>) -> Self {
        StorageLocator::Shared {
            base_dir: base_dir.into(),
        }
    }

    /// Build a locator of the given layout.
    pub fn with_layout(layout: LocatorLayout, base_dir: impl Into<PathBuf>) -> Self {
        match layout {
            LocatorLayout::PerIndex => Self::per_index(base_dir),
            LocatorLayout::Shared => Self::shared(base_dir),
        }
    }

    /// Layout of this locator
    pub fn layout(&self) -> LocatorLayout {
        match self {
            StorageLocator::PerIndex { .. } => LocatorLayout::PerIndex,
            StorageLocator::Shared { .. } => LocatorLayout::Shared,
        }
    }

    /// Base directory all locations live under
    pub fn base_dir(&self) -> &Path {
        match self {
            StorageLocator::PerIndex { base_dir } | StorageLocator::Shared { base_dir } => base_dir,
        }
    }

    /// Map an index name to an opened storage location.
    pub fn map(&self, index_name: &str) -> Result<StorageLocation> {
        let location = match self {
            StorageLocator::PerIndex { base_dir } => {
                validate_index_name(index_name, base_dir)?;
                StorageLocation::create(base_dir.join(index_name))?
            }
            StorageLocator::Shared { base_dir } => StorageLocation::create(base_dir)?,
        };
        debug!(index = index_name, location = %location, "Mapped index to storage");
        Ok(location)
    }
}

/// A per-index name becomes a single path component, so it must not be able
/// to escape the base directory or name it.
fn validate_index_name(index_name: &str, base_dir: &Path) -> Result<()> {
    let invalid = index_name.is_empty()
        || index_name == "."
        || index_name == ".."
        || index_name.contains('/')
        || index_name.contains('\\')
        || index_name.contains('\0');

    if invalid {
        return Err(LumenError::Storage {
            path: base_dir.join(index_name),
            source: std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("invalid index name {:?}", index_name),
            ),
        });
    }
    Ok(())
}
