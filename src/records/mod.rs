#![forbid(unsafe_code)]

//! Record discovery from filesystem naming conventions.
//!
//! A record file is named `<prefix><marker><digits>.<extension>`, by default
//! something like `ushmm_irn000123.xml`. The digit run is the record's
//! identifier. A record with identifier `D` has children when the import root
//! contains a directory literally named `D`; every record file directly
//! inside that directory is a child. Hierarchy depth is carried by these
//! directory names, never by path nesting.

use std::cmp::Ordering;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

use crate::error::{ImportError, Result};

/// Default marker preceding the identifier digits.
pub const DEFAULT_MARKER: &str = "irn";
/// Default record file extension.
pub const DEFAULT_EXTENSION: &str = "xml";

static DEFAULT_NAMING: Lazy<RecordNaming> = Lazy::new(|| RecordNaming {
    marker: DEFAULT_MARKER.to_string(),
    extension: DEFAULT_EXTENSION.to_string(),
    pattern: Regex::new(r"irn(\d+)\.xml$").expect("literal record pattern is valid"),
});

/// Error raised when a custom naming convention is unusable.
#[derive(Debug, Error)]
pub enum NamingError {
    /// Marker or extension was blank.
    #[error("record naming {0} must not be empty")]
    Empty(&'static str),
    /// The derived pattern failed to compile.
    #[error(transparent)]
    Regex(#[from] regex::Error),
}

/// Record file naming convention.
#[derive(Clone, Debug)]
pub struct RecordNaming {
    marker: String,
    extension: String,
    pattern: Regex,
}

impl Default for RecordNaming {
    fn default() -> Self {
        DEFAULT_NAMING.clone()
    }
}

impl RecordNaming {
    /// Builds a convention from a marker (e.g. `irn`) and extension (e.g. `xml`).
    pub fn new(marker: &str, extension: &str) -> std::result::Result<Self, NamingError> {
        let marker = marker.trim();
        let extension = extension.trim().trim_start_matches('.');
        if marker.is_empty() {
            return Err(NamingError::Empty("marker"));
        }
        if extension.is_empty() {
            return Err(NamingError::Empty("extension"));
        }
        Self::compile(marker, extension)
    }

    fn compile(marker: &str, extension: &str) -> std::result::Result<Self, NamingError> {
        let pattern = Regex::new(&format!(
            r"{}(\d+)\.{}$",
            regex::escape(marker),
            regex::escape(extension)
        ))?;
        Ok(Self {
            marker: marker.to_string(),
            extension: extension.to_string(),
            pattern,
        })
    }

    /// Marker preceding the identifier digits.
    pub fn marker(&self) -> &str {
        &self.marker
    }

    /// File extension, without the dot.
    pub fn extension(&self) -> &str {
        &self.extension
    }

    /// Extracts the identifier from a record path.
    ///
    /// Only the file name is inspected. Fails with
    /// [`ImportError::PatternMismatch`] when it does not match.
    pub fn extract_id(&self, path: &Path) -> Result<RecordId> {
        let name = path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| ImportError::pattern_mismatch(path))?;
        self.pattern
            .captures(name)
            .and_then(|caps| caps.get(1))
            .map(|digits| RecordId(digits.as_str().to_string()))
            .ok_or_else(|| ImportError::pattern_mismatch(path))
    }

    /// Whether a file name looks like a record and must therefore parse as one.
    ///
    /// The marker has to start the name or follow a non-alphanumeric
    /// separator, so `ushmm_irn12.xml` is a candidate and `birnbaum.xml` is
    /// not. Looser than [`RecordNaming::extract_id`]: `irnabc.xml` is a
    /// candidate that later fails extraction instead of being skipped.
    pub fn is_candidate(&self, file_name: &str) -> bool {
        let Some(stem) = file_name
            .strip_suffix(&self.extension)
            .and_then(|stem| stem.strip_suffix('.'))
        else {
            return false;
        };
        stem.match_indices(&self.marker).any(|(at, _)| {
            stem[..at]
                .chars()
                .next_back()
                .map_or(true, |prev| !prev.is_alphanumeric())
        })
    }
}

/// Identifier extracted from a record file name; leading zeros preserved.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct RecordId(String);

impl RecordId {
    /// The raw digit run.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn significant(&self) -> &str {
        let trimmed = self.0.trim_start_matches('0');
        if trimmed.is_empty() {
            "0"
        } else {
            trimmed
        }
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Ord for RecordId {
    /// Numeric order of arbitrarily long digit runs, then raw text.
    fn cmp(&self, other: &Self) -> Ordering {
        let (a, b) = (self.significant(), other.significant());
        a.len()
            .cmp(&b.len())
            .then_with(|| a.cmp(b))
            .then_with(|| self.0.cmp(&other.0))
    }
}

impl PartialOrd for RecordId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// A record file and its identifier.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RecordPath {
    /// Location of the record file.
    pub path: PathBuf,
    /// Identifier extracted from the file name.
    pub id: RecordId,
}

/// Resolves records and their children below one import root.
#[derive(Clone, Debug)]
pub struct PathResolver {
    root: PathBuf,
    naming: RecordNaming,
}

impl PathResolver {
    /// Creates a resolver for `root` using `naming`.
    pub fn new(root: impl Into<PathBuf>, naming: RecordNaming) -> Self {
        Self {
            root: root.into(),
            naming,
        }
    }

    /// Import root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Extracts the identifier of the record at `path`.
    pub fn extract_id(&self, path: &Path) -> Result<RecordId> {
        self.naming.extract_id(path)
    }

    /// Records directly under the import root.
    pub fn top_level_paths(&self) -> Result<Vec<RecordPath>> {
        self.list(&self.root)
    }

    /// Children of the record identified by `id`.
    ///
    /// Returns an empty list when `root/<id>` is not a directory.
    pub fn child_paths(&self, id: &RecordId) -> Result<Vec<RecordPath>> {
        let dir = self.root.join(id.as_str());
        if !dir.is_dir() {
            return Ok(Vec::new());
        }
        self.list(&dir)
    }

    fn list(&self, dir: &Path) -> Result<Vec<RecordPath>> {
        let entries = fs::read_dir(dir).map_err(|err| ImportError::io(dir, err))?;
        let mut records = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|err| ImportError::io(dir, err))?;
            let path = entry.path();
            let is_candidate = entry
                .file_name()
                .to_str()
                .is_some_and(|name| self.naming.is_candidate(name));
            if !is_candidate || !path.is_file() {
                continue;
            }
            let id = self.naming.extract_id(&path)?;
            records.push(RecordPath { path, id });
        }
        records.sort_by(|a, b| a.id.cmp(&b.id).then_with(|| a.path.cmp(&b.path)));
        Ok(records)
    }
}
