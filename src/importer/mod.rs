#![forbid(unsafe_code)]

//! Import drivers.
//!
//! An import resolves the repository and user it is attributed to, opens an
//! [`ImportSession`], walks the data directory through a [`RecordImporter`]
//! and commits. Any error on the way rolls the whole run back exactly once
//! and is returned unchanged.

mod flat;
mod hierarchical;
mod session;

pub use flat::FlatImporter;
pub use hierarchical::HierarchicalImporter;
pub use session::{ImportLog, ImportSession};

use std::fmt;
use std::num::NonZeroU64;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::error::{ImportError, Result};
use crate::records::RecordNaming;
use crate::store::{GraphStore, IdentityKind, IdentityResolver};
use crate::types::{EventType, GraphNode, NodeId};

/// Successful imports between two checkpoints unless configured otherwise.
pub const DEFAULT_COMMIT_EVERY: u64 = 2500;

/// Tunables shared by all importers.
#[derive(Clone, Debug)]
pub struct ImportOptions {
    /// Checkpoint after this many successful creates or updates.
    pub commit_every: NonZeroU64,
    /// Record file naming convention.
    pub naming: RecordNaming,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            commit_every: NonZeroU64::new(DEFAULT_COMMIT_EVERY).unwrap_or(NonZeroU64::MIN),
            naming: RecordNaming::default(),
        }
    }
}

/// Final counts of a committed import.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize)]
pub struct ImportSummary {
    /// Nodes created.
    pub created: u64,
    /// Nodes updated.
    pub updated: u64,
}

impl From<ImportLog> for ImportSummary {
    fn from(log: ImportLog) -> Self {
        Self {
            created: log.created(),
            updated: log.updated(),
        }
    }
}

/// Layout of the data directory.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ImportFormat {
    /// Child records live in directories named after their parent's id.
    #[default]
    Hierarchical,
    /// Every record sits directly under the repository.
    Flat,
}

impl ImportFormat {
    /// Builds the importer for this layout.
    pub fn importer(self, source: &str, options: ImportOptions) -> Box<dyn RecordImporter> {
        match self {
            ImportFormat::Hierarchical => Box::new(HierarchicalImporter::new(source, options)),
            ImportFormat::Flat => Box::new(FlatImporter::new(source, options)),
        }
    }

    /// Lowercase name.
    pub fn as_str(self) -> &'static str {
        match self {
            ImportFormat::Hierarchical => "hierarchical",
            ImportFormat::Flat => "flat",
        }
    }
}

impl fmt::Display for ImportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ImportFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "hierarchical" => Ok(ImportFormat::Hierarchical),
            "flat" => Ok(ImportFormat::Flat),
            other => Err(format!("unknown import format '{other}'")),
        }
    }
}

/// A strategy for walking a data directory inside an import session.
pub trait RecordImporter {
    /// Source name used in the event description.
    fn source_name(&self) -> &str;

    /// Tunables for this importer.
    fn options(&self) -> &ImportOptions;

    /// Imports every record under `data_dir` into `session`, attaching
    /// top-level records to `scope`.
    fn import_records(
        &self,
        session: &mut ImportSession<'_>,
        data_dir: &Path,
        scope: NodeId,
    ) -> Result<()>;

    /// Runs a complete import attributed to `repository_id` and `user_id`.
    ///
    /// Identities are resolved before any transaction is opened. On failure
    /// the session is rolled back and the original error returned.
    fn import(
        &self,
        store: &mut dyn GraphStore,
        data_dir: &Path,
        repository_id: &str,
        user_id: &str,
    ) -> Result<ImportSummary> {
        let repository = resolve_identity(&*store, IdentityKind::Repository, repository_id)?;
        let user = resolve_identity(&*store, IdentityKind::User, user_id)?;
        let description = format!("Importing {} data", self.source_name());
        info!(
            data_dir = %data_dir.display(),
            repository = repository_id,
            user = user_id,
            "import.start"
        );

        let mut session = ImportSession::start(
            store,
            &user,
            EventType::Ingest,
            &description,
            &repository,
            self.options().commit_every,
        )?;
        match self.import_records(&mut session, data_dir, repository.id) {
            Ok(()) => {
                let summary = ImportSummary::from(session.finish()?);
                info!(
                    created = summary.created,
                    updated = summary.updated,
                    "Imported {} items, updated {} items",
                    summary.created,
                    summary.updated
                );
                Ok(summary)
            }
            Err(err) => {
                error!(error = %err, "import.failed");
                session.abort();
                Err(err)
            }
        }
    }
}

fn resolve_identity(
    store: &dyn GraphStore,
    kind: IdentityKind,
    external_id: &str,
) -> Result<GraphNode> {
    store
        .resolve(kind, external_id)?
        .ok_or_else(|| ImportError::NotFound {
            kind,
            id: external_id.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_options_use_standard_threshold() {
        let options = ImportOptions::default();
        assert_eq!(options.commit_every.get(), DEFAULT_COMMIT_EVERY);
        assert_eq!(options.naming.marker(), "irn");
    }

    #[test]
    fn format_parses_case_insensitively() {
        assert_eq!("Flat".parse::<ImportFormat>(), Ok(ImportFormat::Flat));
        assert_eq!(
            "hierarchical".parse::<ImportFormat>(),
            Ok(ImportFormat::Hierarchical)
        );
        assert!("tree".parse::<ImportFormat>().is_err());
    }

    #[test]
    fn format_builds_matching_importer() {
        let importer = ImportFormat::Flat.importer("ushmm", ImportOptions::default());
        assert_eq!(importer.source_name(), "ushmm");
    }
}
