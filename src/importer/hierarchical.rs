use std::path::Path;

use tracing::info;

use super::{ImportOptions, ImportSession, RecordImporter};
use crate::error::{ImportError, Result};
use crate::parser::{MutationHandler, RecordParser};
use crate::records::{PathResolver, RecordId, RecordPath};
use crate::types::{GraphNode, NodeId};

/// Imports a tree of records whose hierarchy is encoded in directory names.
///
/// Top-level records are attached to the repository. After each entity is
/// persisted, the records in `<data_dir>/<id>` are imported beneath it,
/// depth first and before the parent file's next entity is read.
#[derive(Clone, Debug)]
pub struct HierarchicalImporter {
    source: String,
    options: ImportOptions,
    parser: RecordParser,
}

impl HierarchicalImporter {
    /// Creates an importer whose events describe `source` data.
    pub fn new(source: impl Into<String>, options: ImportOptions) -> Self {
        Self {
            source: source.into(),
            options,
            parser: RecordParser::new(),
        }
    }

    /// Replaces the record parser.
    pub fn with_parser(mut self, parser: RecordParser) -> Self {
        self.parser = parser;
        self
    }

    /// Imports `record` under `scope`, then recursively its children under
    /// each node the record produces.
    ///
    /// Fails with [`ImportError::Cycle`] when a child directory leads back to
    /// a record already being imported on the current path.
    pub fn import_with_scope(
        &self,
        resolver: &PathResolver,
        record: &RecordPath,
        scope: NodeId,
        session: &mut ImportSession<'_>,
    ) -> Result<()> {
        self.import_nested(resolver, record, scope, session, &mut Vec::new())
    }

    fn import_nested(
        &self,
        resolver: &PathResolver,
        record: &RecordPath,
        scope: NodeId,
        session: &mut ImportSession<'_>,
        ancestors: &mut Vec<RecordId>,
    ) -> Result<()> {
        if ancestors.contains(&record.id) {
            return Err(ImportError::Cycle {
                path: record.path.clone(),
                id: record.id.to_string(),
            });
        }
        info!(path = %record.path.display(), id = %record.id, scope = %scope, "Importing path");
        let children = resolver.child_paths(&record.id)?;

        ancestors.push(record.id.clone());
        let mut handler = Descend {
            importer: self,
            resolver,
            children: &children,
            ancestors: &mut *ancestors,
        };
        let result = self
            .parser
            .parse(&record.path, scope, session, &mut handler);
        ancestors.pop();
        result
    }
}

impl RecordImporter for HierarchicalImporter {
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
        let resolver = PathResolver::new(data_dir, self.options.naming.clone());
        for record in resolver.top_level_paths()? {
            self.import_with_scope(&resolver, &record, scope, session)?;
        }
        Ok(())
    }
}

/// Counts each persisted entity, then imports the record's children under it.
struct Descend<'a> {
    importer: &'a HierarchicalImporter,
    resolver: &'a PathResolver,
    children: &'a [RecordPath],
    ancestors: &'a mut Vec<RecordId>,
}

impl Descend<'_> {
    fn descend(&mut self, session: &mut ImportSession<'_>, parent: &GraphNode) -> Result<()> {
        for child in self.children {
            self.importer.import_nested(
                self.resolver,
                child,
                parent.id,
                session,
                &mut *self.ancestors,
            )?;
        }
        Ok(())
    }
}

impl MutationHandler for Descend<'_> {
    fn on_create(&mut self, session: &mut ImportSession<'_>, node: &GraphNode) -> Result<()> {
        session.record_created(node)?;
        self.descend(session, node)
    }

    fn on_update(&mut self, session: &mut ImportSession<'_>, node: &GraphNode) -> Result<()> {
        session.record_updated(node)?;
        self.descend(session, node)
    }
}
