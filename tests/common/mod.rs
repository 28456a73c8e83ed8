#![allow(dead_code)]

use std::fs;
use std::path::Path;

use arbor::store::{EventSpec, GraphStore, NodeSpec, Result as StoreResult};
use arbor::types::{EventId, EventRecord, GraphNode, NodeId, NodeKind, Props};
use arbor::{MemoryStore, StoreError};

pub const REPOSITORY: &str = "r1";
pub const USER: &str = "u1";

/// EAD document with one `archdesc` per identifier.
pub fn record_xml(identifiers: &[&str]) -> String {
    let mut xml = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<ead>\n");
    for id in identifiers {
        xml.push_str(&format!(
            "  <archdesc level=\"collection\">\n    <did>\n      <unitid>{id}</unitid>\n      <unittitle>Title of {id}</unittitle>\n    </did>\n  </archdesc>\n"
        ));
    }
    xml.push_str("</ead>\n");
    xml
}

/// Writes `contents` to `root/rel`, creating parent directories.
pub fn write_file(root: &Path, rel: &str, contents: &str) {
    let path = root.join(rel);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("create record directory");
    }
    fs::write(path, contents).expect("write record");
}

pub fn write_record(root: &Path, rel: &str, identifiers: &[&str]) {
    write_file(root, rel, &record_xml(identifiers));
}

/// `irn001.xml` (A), `irn002.xml` (B) and `002/irn010.xml` (C, child of B).
pub fn sample_tree(root: &Path) {
    write_record(root, "irn001.xml", &["A"]);
    write_record(root, "irn002.xml", &["B"]);
    write_record(root, "002/irn010.xml", &["C"]);
}

/// Creates the repository and user imports are attributed to.
pub fn seed_identities(store: &mut dyn GraphStore) -> (GraphNode, GraphNode) {
    let props = Props::new();
    store.begin().expect("begin seed");
    let repository = store
        .create_node(NodeSpec {
            kind: NodeKind::Repository,
            ext_ref: REPOSITORY,
            scope: None,
            props: &props,
        })
        .expect("seed repository");
    let user = store
        .create_node(NodeSpec {
            kind: NodeKind::UserProfile,
            ext_ref: USER,
            scope: None,
            props: &props,
        })
        .expect("seed user");
    store.commit().expect("commit seed");
    (repository, user)
}

pub fn seeded_store() -> MemoryStore {
    let mut store = MemoryStore::new();
    seed_identities(&mut store);
    store
}

pub fn unit(store: &dyn GraphStore, ext_ref: &str) -> GraphNode {
    store
        .find_node(NodeKind::DocumentaryUnit, ext_ref)
        .expect("lookup")
        .unwrap_or_else(|| panic!("documentary unit {ext_ref} missing"))
}

/// Calls observed by a [`RecordingStore`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Calls {
    pub begins: u32,
    pub checkpoints: u32,
    pub commits: u32,
    pub rollbacks: u32,
    pub creates: u32,
    pub updates: u32,
}

/// Wraps a [`MemoryStore`], counting calls and failing on request.
#[derive(Default)]
pub struct RecordingStore {
    pub inner: MemoryStore,
    pub calls: Calls,
    pub fail_create_of: Option<String>,
    pub fail_commit: bool,
    pub created_refs: Vec<String>,
}

impl RecordingStore {
    pub fn seeded() -> Self {
        let mut store = Self::default();
        seed_identities(&mut store.inner);
        store
    }
}

impl GraphStore for RecordingStore {
    fn begin(&mut self) -> StoreResult<()> {
        self.calls.begins += 1;
        self.inner.begin()
    }

    fn in_transaction(&self) -> bool {
        self.inner.in_transaction()
    }

    fn find_node(&self, kind: NodeKind, ext_ref: &str) -> StoreResult<Option<GraphNode>> {
        self.inner.find_node(kind, ext_ref)
    }

    fn node(&self, id: NodeId) -> StoreResult<Option<GraphNode>> {
        self.inner.node(id)
    }

    fn children(&self, scope: NodeId) -> StoreResult<Vec<GraphNode>> {
        self.inner.children(scope)
    }

    fn count_nodes(&self, kind: NodeKind) -> StoreResult<u64> {
        self.inner.count_nodes(kind)
    }

    fn create_node(&mut self, spec: NodeSpec<'_>) -> StoreResult<GraphNode> {
        self.calls.creates += 1;
        if self.fail_create_of.as_deref() == Some(spec.ext_ref) {
            return Err(StoreError::Corrupt(format!("injected failure for {}", spec.ext_ref)));
        }
        self.created_refs.push(spec.ext_ref.to_string());
        self.inner.create_node(spec)
    }

    fn update_node(&mut self, id: NodeId, spec: NodeSpec<'_>) -> StoreResult<GraphNode> {
        self.calls.updates += 1;
        self.inner.update_node(id, spec)
    }

    fn create_event(&mut self, spec: EventSpec<'_>) -> StoreResult<EventId> {
        self.inner.create_event(spec)
    }

    fn add_event_subject(&mut self, event: EventId, node: NodeId) -> StoreResult<()> {
        self.inner.add_event_subject(event, node)
    }

    fn event(&self, id: EventId) -> StoreResult<Option<EventRecord>> {
        self.inner.event(id)
    }

    fn count_events(&self) -> StoreResult<u64> {
        self.inner.count_events()
    }

    fn checkpoint(&mut self) -> StoreResult<()> {
        self.calls.checkpoints += 1;
        self.inner.checkpoint()
    }

    fn commit(&mut self) -> StoreResult<()> {
        self.calls.commits += 1;
        if self.fail_commit {
            return Err(StoreError::Corrupt("injected commit failure".into()));
        }
        self.inner.commit()
    }

    fn rollback(&mut self) -> StoreResult<()> {
        self.calls.rollbacks += 1;
        self.inner.rollback()
    }
}
