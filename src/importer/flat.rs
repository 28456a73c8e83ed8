use std::fs;
use std::path::{Path, PathBuf};

use tracing::info;

use super::{ImportOptions, ImportSession, RecordImporter};
use crate::error::{ImportError, Result};
use crate::parser::{MutationHandler, RecordParser};
use crate::types::{GraphNode, NodeId};

/// Imports every record file directly under the data directory, all scoped
/// to the repository.
///
/// File names only need the configured extension; no identifier is
/// extracted and subdirectories are ignored.
#[derive(Clone, Debug)]
pub struct FlatImporter {
    source: String,
    options: ImportOptions,
    parser: RecordParser,
}

impl FlatImporter {
    /// Creates an importer whose events describe `source` data.
    pub fn new(source: impl Into<String>, options: ImportOptions) -> Self {
        Self {
            source: source.into(),
            options,
            parser: RecordParser::new(),
        }
    }

    fn record_files(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        let suffix = format!(".{}", self.options.naming.extension());
        let mut files = Vec::new();
        for entry in fs::read_dir(dir).map_err(|err| ImportError::io(dir, err))? {
            let entry = entry.map_err(|err| ImportError::io(dir, err))?;
            let path = entry.path();
            let matches = entry
                .file_name()
                .to_str()
                .is_some_and(|name| name.ends_with(&suffix));
            if matches && path.is_file() {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }
}

impl RecordImporter for FlatImporter {
    fn source_name(&self) -> &str {
        &self.source
    }

    fn options(&self) -> &ImportOptions {
        &self.options
    }

    fn import_records(
        &self,
        session: &mut ImportSession<'_>,
        data_dir: &Path,
        scope: NodeId,
    ) -> Result<()> {
        for path in self.record_files(data_dir)? {
            info!(path = %path.display(), "Importing path");
            self.parser.parse(&path, scope, session, &mut CountOnly)?;
        }
        Ok(())
    }
}

struct CountOnly;

impl MutationHandler for CountOnly {
    fn on_create(&mut self, session: &mut ImportSession<'_>, node: &GraphNode) -> Result<()> {
        session.record_created(node)
    }

    fn on_update(&mut self, session: &mut ImportSession<'_>, node: &GraphNode) -> Result<()> {
        session.record_updated(node)
    }
}
