#![forbid(unsafe_code)]

//! Streaming record parser.
//!
//! Records are EAD-style XML documents read event by event with
//! `quick-xml`; no document tree is built. Every top-level `archdesc`
//! element becomes one [`RecordEntity`]. As soon as an entity closes it is
//! persisted under the current scope and handed to a [`MutationHandler`],
//! and parsing resumes only after the handler returns. Handlers may
//! therefore import whole subtrees before the next entity is read.

use std::fs::File;
use std::io::{self, BufReader};
use std::path::Path;

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use serde_json::Value;
use tracing::debug;

use crate::error::{ImportError, Result};
use crate::importer::ImportSession;
use crate::store::NodeSpec;
use crate::types::{GraphNode, NodeId, NodeKind, Props};

/// Element that delimits one importable entity.
pub const ENTITY_ELEMENT: &str = "archdesc";
const DID_ELEMENT: &str = "did";
const IDENTIFIER_FIELD: &str = "unitid";
const FIELD_SEPARATOR: &str = "\n\n";

/// Receives the outcome of each persisted entity.
///
/// Exactly one of the two methods fires per entity. Both run while the
/// parser is suspended mid-document.
pub trait MutationHandler {
    /// Called after a new node was created for an entity.
    fn on_create(&mut self, session: &mut ImportSession<'_>, node: &GraphNode) -> Result<()>;
    /// Called after an existing node with the same external reference was updated.
    fn on_update(&mut self, session: &mut ImportSession<'_>, node: &GraphNode) -> Result<()>;
}

/// One archival description extracted from a record.
#[derive(Clone, Debug, PartialEq)]
pub struct RecordEntity {
    /// External reference id (`did/unitid`).
    pub identifier: String,
    /// Flattened descriptive fields.
    pub props: Props,
}

/// Parses record files and persists their entities.
#[derive(Clone, Debug)]
pub struct RecordParser {
    entity_element: String,
}

impl Default for RecordParser {
    fn default() -> Self {
        Self {
            entity_element: ENTITY_ELEMENT.to_string(),
        }
    }
}

impl RecordParser {
    /// Creates a parser using the default entity element.
    pub fn new() -> Self {
        Self::default()
    }

    /// Overrides the element that delimits entities.
    pub fn with_entity_element(mut self, name: impl Into<String>) -> Self {
        self.entity_element = name.into();
        self
    }

    /// Streams `path`, creating or updating one node per entity under `scope`.
    ///
    /// Create-vs-update is decided by looking up a documentary unit with the
    /// entity's identifier. The handler's callback runs before the next entity
    /// is read; its errors abort the parse and are returned unchanged.
    pub fn parse(
        &self,
        path: &Path,
        scope: NodeId,
        session: &mut ImportSession<'_>,
        handler: &mut dyn MutationHandler,
    ) -> Result<()> {
        self.read_entities(path, |entity| {
            let spec = NodeSpec {
                kind: NodeKind::DocumentaryUnit,
                ext_ref: &entity.identifier,
                scope: Some(scope),
                props: &entity.props,
            };
            let existing = session
                .store()
                .find_node(NodeKind::DocumentaryUnit, &entity.identifier)?;
            match existing {
                Some(node) => {
                    let node = session.store().update_node(node.id, spec)?;
                    handler.on_update(session, &node)
                }
                None => {
                    let node = session.store().create_node(spec)?;
                    handler.on_create(session, &node)
                }
            }
        })
    }

    /// Streams `path` and calls `visit` for every top-level entity in
    /// document order.
    pub fn read_entities<F>(&self, path: &Path, mut visit: F) -> Result<()>
    where
        F: FnMut(RecordEntity) -> Result<()>,
    {
        let file = File::open(path).map_err(|err| ImportError::io(path, err))?;
        let mut reader = Reader::from_reader(BufReader::new(file));
        reader.trim_text(true);

        let source_file = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let mut buf = Vec::with_capacity(4096);
        let mut depth = 0usize;
        let mut seen_root = false;
        let mut entity: Option<EntityBuilder> = None;

        loop {
            buf.clear();
            let event = reader
                .read_event_into(&mut buf)
                .map_err(|err| xml_error(path, &reader, err))?;
            match event {
                Event::Start(ref e) => {
                    depth += 1;
                    seen_root = true;
                    let name = local_name(e);
                    match entity.as_mut() {
                        Some(builder) => builder.open(&name, depth),
                        None if name == self.entity_element => {
                            let level = attribute(e, "level")
                                .map_err(|err| xml_error(path, &reader, err))?;
                            entity = Some(EntityBuilder::new(depth, level));
                        }
                        None => {}
                    }
                }
                Event::Empty(ref e) => {
                    seen_root = true;
                    if entity.is_none() && local_name(e) == self.entity_element {
                        let level =
                            attribute(e, "level").map_err(|err| xml_error(path, &reader, err))?;
                        let done = EntityBuilder::new(depth + 1, level);
                        visit(done.finish(path, &source_file)?)?;
                    }
                }
                Event::Text(ref t) => {
                    if let Some(builder) = entity.as_mut() {
                        if builder.capturing() {
                            let text = t.unescape().map_err(|err| xml_error(path, &reader, err))?;
                            builder.push_text(&text);
                        }
                    }
                }
                Event::CData(ref c) => {
                    if let Some(builder) = entity.as_mut() {
                        if builder.capturing() {
                            builder.push_text(&String::from_utf8_lossy(c.as_ref()));
                        }
                    }
                }
                Event::End(_) => {
                    let closes_entity = match entity.as_mut() {
                        Some(builder) => builder.close(depth),
                        None => false,
                    };
                    if closes_entity {
                        if let Some(done) = entity.take() {
                            let done = done.finish(path, &source_file)?;
                            debug!(path = %path.display(), id = %done.identifier, "parser.entity");
                            visit(done)?;
                        }
                    }
                    depth = depth.saturating_sub(1);
                }
                Event::Eof => break,
                _ => {}
            }
        }

        if depth != 0 {
            return Err(ImportError::Parse {
                path: path.to_path_buf(),
                position: reader.buffer_position() as u64,
                message: format!("unexpected end of document with {depth} unclosed element(s)"),
            });
        }
        if !seen_root {
            return Err(ImportError::Parse {
                path: path.to_path_buf(),
                position: reader.buffer_position() as u64,
                message: "document has no root element".into(),
            });
        }
        Ok(())
    }
}

struct FieldCapture {
    name: String,
    depth: usize,
    text: String,
}

/// Accumulates fields while an entity element is open.
struct EntityBuilder {
    depth: usize,
    level: Option<String>,
    did_depth: Option<usize>,
    skip_depth: Option<usize>,
    current: Option<FieldCapture>,
    fields: Vec<(String, String)>,
}

impl EntityBuilder {
    fn new(depth: usize, level: Option<String>) -> Self {
        Self {
            depth,
            level,
            did_depth: None,
            skip_depth: None,
            current: None,
            fields: Vec::new(),
        }
    }

    fn capturing(&self) -> bool {
        self.skip_depth.is_none() && self.current.is_some()
    }

    fn open(&mut self, name: &str, depth: usize) {
        if self.skip_depth.is_some() || self.current.is_some() {
            return;
        }
        if is_component(name) {
            self.skip_depth = Some(depth);
            return;
        }
        let direct_child = depth == self.depth + 1;
        let did_child = self.did_depth.is_some_and(|did| depth == did + 1);
        if direct_child && name == DID_ELEMENT {
            self.did_depth = Some(depth);
        } else if direct_child || did_child {
            self.current = Some(FieldCapture {
                name: name.to_string(),
                depth,
                text: String::new(),
            });
        }
    }

    fn push_text(&mut self, text: &str) {
        if let Some(field) = self.current.as_mut() {
            let text = text.trim();
            if text.is_empty() {
                return;
            }
            if !field.text.is_empty() {
                field.text.push(' ');
            }
            field.text.push_str(text);
        }
    }

    /// Handles an end tag at `depth`; returns true when it closes the entity.
    fn close(&mut self, depth: usize) -> bool {
        if self.skip_depth == Some(depth) {
            self.skip_depth = None;
        } else if self.current.as_ref().is_some_and(|f| f.depth == depth) {
            if let Some(field) = self.current.take() {
                self.fields.push((field.name, field.text));
            }
        } else if self.did_depth == Some(depth) {
            self.did_depth = None;
        }
        depth == self.depth
    }

    fn finish(self, path: &Path, source_file: &str) -> Result<RecordEntity> {
        let mut props = Props::new();
        for (name, text) in self.fields {
            if text.is_empty() {
                continue;
            }
            match props.get_mut(&name) {
                Some(Value::String(existing)) => {
                    existing.push_str(FIELD_SEPARATOR);
                    existing.push_str(&text);
                }
                _ => {
                    props.insert(name, Value::String(text));
                }
            }
        }
        let identifier = props
            .get(IDENTIFIER_FIELD)
            .and_then(Value::as_str)
            .map(|id| id.split(FIELD_SEPARATOR).next().unwrap_or(id).trim().to_string())
            .filter(|id| !id.is_empty())
            .ok_or_else(|| ImportError::Validation {
                path: path.to_path_buf(),
                message: format!("{ENTITY_ELEMENT} is missing {DID_ELEMENT}/{IDENTIFIER_FIELD}"),
            })?;
        if let Some(level) = self.level {
            props.insert("level".into(), Value::String(level));
        }
        props.insert("identifier".into(), Value::String(identifier.clone()));
        props.insert("source_file".into(), Value::String(source_file.to_string()));
        Ok(RecordEntity { identifier, props })
    }
}

/// Nested components are described by their own records and skipped here.
fn is_component(name: &str) -> bool {
    match name {
        "dsc" | "c" => true,
        _ => name
            .strip_prefix('c')
            .and_then(|rest| rest.parse::<u8>().ok())
            .is_some_and(|n| (1..=12).contains(&n) && name.len() == 3),
    }
}

fn local_name(e: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(e.local_name().as_ref()).into_owned()
}

fn attribute(e: &BytesStart<'_>, name: &str) -> std::result::Result<Option<String>, quick_xml::Error> {
    match e.try_get_attribute(name)? {
        Some(attr) => Ok(Some(attr.unescape_value()?.trim().to_string())),
        None => Ok(None),
    }
}

fn xml_error<R>(path: &Path, reader: &Reader<R>, err: impl Into<quick_xml::Error>) -> ImportError {
    match err.into() {
        quick_xml::Error::Io(io_err) => {
            ImportError::io(path, io::Error::new(io_err.kind(), io_err.to_string()))
        }
        other => ImportError::Parse {
            path: path.to_path_buf(),
            position: reader.buffer_position() as u64,
            message: other.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn entities(xml: &str) -> Result<Vec<RecordEntity>> {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("irn1.xml");
        fs::write(&path, xml).expect("write record");
        let mut out = Vec::new();
        RecordParser::new().read_entities(&path, |entity| {
            out.push(entity);
            Ok(())
        })?;
        Ok(out)
    }

    #[test]
    fn extracts_identifier_and_fields() -> Result<()> {
        let found = entities(
            r#"<?xml version="1.0"?>
            <ead xmlns="urn:isbn:1-931666-22-9">
              <eadheader><eadid>ignored</eadid></eadheader>
              <archdesc level="fonds">
                <did>
                  <unitid>irn1</unitid>
                  <unittitle>Family papers &amp; letters</unittitle>
                  <unitdate>1939-1945</unitdate>
                </did>
                <scopecontent><p>First.</p><p>Second.</p></scopecontent>
                <scopecontent><p>Addendum</p></scopecontent>
              </archdesc>
            </ead>"#,
        )?;
        assert_eq!(found.len(), 1);
        let entity = &found[0];
        assert_eq!(entity.identifier, "irn1");
        assert_eq!(entity.props["unittitle"], "Family papers & letters");
        assert_eq!(entity.props["unitdate"], "1939-1945");
        assert_eq!(entity.props["scopecontent"], "First. Second.\n\nAddendum");
        assert_eq!(entity.props["level"], "fonds");
        assert_eq!(entity.props["source_file"], "irn1.xml");
        assert!(!entity.props.contains_key("eadid"));
        Ok(())
    }

    #[test]
    fn nested_components_are_not_entities() -> Result<()> {
        let found = entities(
            "<ead><archdesc><did><unitid>A</unitid></did>\
             <dsc><c01><did><unitid>B</unitid></did></c01></dsc>\
             </archdesc></ead>",
        )?;
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].identifier, "A");
        Ok(())
    }

    #[test]
    fn multiple_top_level_entities_in_document_order() -> Result<()> {
        let found = entities(
            "<collection>\
             <archdesc><did><unitid>2</unitid></did></archdesc>\
             <archdesc><did><unitid>1</unitid></did></archdesc>\
             </collection>",
        )?;
        let ids: Vec<&str> = found.iter().map(|e| e.identifier.as_str()).collect();
        assert_eq!(ids, vec!["2", "1"]);
        Ok(())
    }

    #[test]
    fn missing_identifier_is_a_validation_error() {
        let err = entities("<ead><archdesc><did><unittitle>x</unittitle></did></archdesc></ead>")
            .unwrap_err();
        assert!(matches!(err, ImportError::Validation { .. }), "{err}");
    }

    #[test]
    fn malformed_documents_are_parse_errors() {
        for xml in [
            "<ead><archdesc></ead>",
            "<ead><archdesc><did><unitid>1</unitid></did></archdesc>",
            "",
            "<ead><archdesc><did><unitid>&bogus;</unitid></did></archdesc></ead>",
        ] {
            let err = entities(xml).unwrap_err();
            assert!(matches!(err, ImportError::Parse { .. }), "{xml:?} -> {err}");
        }
    }

    #[test]
    fn visitor_errors_stop_the_stream() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("irn1.xml");
        fs::write(
            &path,
            "<c><archdesc><did><unitid>1</unitid></did></archdesc>\
             <archdesc><did><unitid>2</unitid></did></archdesc></c>",
        )
        .expect("write");
        let mut seen = 0;
        let err = RecordParser::new()
            .read_entities(&path, |_| {
                seen += 1;
                Err(ImportError::Validation {
                    path: path.clone(),
                    message: "stop".into(),
                })
            })
            .unwrap_err();
        assert_eq!(seen, 1);
        assert!(matches!(err, ImportError::Validation { .. }));
    }

    #[test]
    fn component_names() {
        for name in ["c", "dsc", "c01", "c09", "c12"] {
            assert!(is_component(name), "{name}");
        }
        for name in ["c13", "c00", "custodhist", "c1", "controlaccess"] {
            assert!(!is_component(name), "{name}");
        }
    }
}
