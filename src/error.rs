//! Errors raised by import runs.

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::store::{IdentityKind, StoreError};

/// Result type alias for import operations.
pub type Result<T> = std::result::Result<T, ImportError>;

/// Error type for import runs.
///
/// None of these are recovered from inside a run: every variant unwinds to
/// the top-level import, which rolls the session back and returns it.
#[derive(Debug, Error)]
pub enum ImportError {
    /// A record candidate does not follow the record naming convention.
    #[error("record path does not match the naming convention: {}", path.display())]
    PatternMismatch {
        /// Offending path.
        path: PathBuf,
    },
    /// A record's child directory leads back to the record or one of its ancestors.
    #[error("record {id} at {} is its own ancestor", path.display())]
    Cycle {
        /// Record reached a second time.
        path: PathBuf,
        /// Its identifier.
        id: String,
    },
    /// The repository or user an import is attributed to does not exist.
    #[error("{kind} '{id}' not found")]
    NotFound {
        /// Which identity was looked up.
        kind: IdentityKind,
        /// External id that failed to resolve.
        id: String,
    },
    /// Record content is not well-formed XML.
    #[error("malformed XML in {} at byte {position}: {message}", path.display())]
    Parse {
        /// Record being parsed.
        path: PathBuf,
        /// Byte offset reported by the reader.
        position: u64,
        /// Reader diagnostic.
        message: String,
    },
    /// Record content is well-formed but lacks required data.
    #[error("invalid record {}: {message}", path.display())]
    Validation {
        /// Record being parsed.
        path: PathBuf,
        /// What is missing.
        message: String,
    },
    /// The persistence store rejected a mutation or commit.
    #[error(transparent)]
    Persistence(#[from] StoreError),
    /// Reading a record or listing a directory failed.
    #[error("failed to read {}: {source}", path.display())]
    Io {
        /// Path being read.
        path: PathBuf,
        /// Underlying error.
        source: io::Error,
    },
}

impl ImportError {
    pub(crate) fn io(path: impl AsRef<Path>, source: io::Error) -> Self {
        ImportError::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    pub(crate) fn pattern_mismatch(path: impl AsRef<Path>) -> Self {
        ImportError::PatternMismatch {
            path: path.as_ref().to_path_buf(),
        }
    }
}
