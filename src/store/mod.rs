#![forbid(unsafe_code)]

//! Graph persistence.
//!
//! A [`GraphStore`] holds documentary units, the repositories and users they
//! are attributed to, and the events recording who imported what. Writes
//! happen inside a single explicit transaction opened with
//! [`GraphStore::begin`] and closed with [`GraphStore::commit`] or
//! [`GraphStore::rollback`].
//!
//! [`GraphStore::checkpoint`] is a durability flush: it pushes pending state
//! towards stable storage without ending the transaction, so a later
//! rollback still discards everything written since `begin`.

mod memory;
mod sqlite;

pub use memory::{MemoryStore, TxCounters};
pub use sqlite::SqliteStore;

use thiserror::Error;

use crate::types::{EventId, EventRecord, EventType, GraphNode, NodeId, NodeKind, Props};

/// Error type for store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// SQLite failure.
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
    /// Property or subject payload could not be (de)serialized.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    /// A write was attempted outside a transaction.
    #[error("no transaction in progress")]
    NoTransaction,
    /// `begin` was called while a transaction was already open.
    #[error("a transaction is already in progress")]
    TransactionActive,
    /// The referenced node does not exist.
    #[error("node {0} not found")]
    MissingNode(NodeId),
    /// A node with the same kind and external reference already exists.
    #[error("{kind} '{ext_ref}' already exists")]
    DuplicateNode {
        /// Kind of the conflicting node.
        kind: NodeKind,
        /// External reference shared by both nodes.
        ext_ref: String,
    },
    /// The store holds data it cannot interpret.
    #[error("corrupt row: {0}")]
    Corrupt(String),
}

/// Result type alias for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Description of a node to create or the new state of a node to update.
#[derive(Clone, Copy, Debug)]
pub struct NodeSpec<'a> {
    /// Entity class.
    pub kind: NodeKind,
    /// External reference id.
    pub ext_ref: &'a str,
    /// Parent node, if any.
    pub scope: Option<NodeId>,
    /// Full property map; replaces existing properties on update.
    pub props: &'a Props,
}

/// Description of an event to open.
#[derive(Clone, Copy, Debug)]
pub struct EventSpec<'a> {
    /// User the action is attributed to.
    pub actor: NodeId,
    /// Kind of action.
    pub action: EventType,
    /// Human readable description.
    pub description: &'a str,
    /// Scope the action applies to.
    pub scope: NodeId,
    /// RFC 3339 timestamp.
    pub timestamp: &'a str,
}

/// Transactional graph persistence.
pub trait GraphStore {
    /// Opens the write transaction.
    fn begin(&mut self) -> Result<()>;
    /// Whether a transaction is currently open.
    fn in_transaction(&self) -> bool;
    /// Looks up a node by kind and external reference id.
    fn find_node(&self, kind: NodeKind, ext_ref: &str) -> Result<Option<GraphNode>>;
    /// Fetches a node by id.
    fn node(&self, id: NodeId) -> Result<Option<GraphNode>>;
    /// Nodes attached directly under `scope`, ordered by id.
    fn children(&self, scope: NodeId) -> Result<Vec<GraphNode>>;
    /// Number of nodes of the given kind.
    fn count_nodes(&self, kind: NodeKind) -> Result<u64>;
    /// Creates a node.
    fn create_node(&mut self, spec: NodeSpec<'_>) -> Result<GraphNode>;
    /// Replaces scope and properties of an existing node.
    fn update_node(&mut self, id: NodeId, spec: NodeSpec<'_>) -> Result<GraphNode>;
    /// Opens an event record.
    fn create_event(&mut self, spec: EventSpec<'_>) -> Result<EventId>;
    /// Adds `node` to the subjects of `event`.
    fn add_event_subject(&mut self, event: EventId, node: NodeId) -> Result<()>;
    /// Fetches an event with its subjects.
    fn event(&self, id: EventId) -> Result<Option<EventRecord>>;
    /// Number of recorded events.
    fn count_events(&self) -> Result<u64>;
    /// Flushes pending writes without ending the transaction.
    fn checkpoint(&mut self) -> Result<()>;
    /// Commits and closes the transaction.
    fn commit(&mut self) -> Result<()>;
    /// Discards all writes since `begin` and closes the transaction.
    fn rollback(&mut self) -> Result<()>;
}

/// The identity kinds an import is attributed to.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum IdentityKind {
    /// Holding repository (import scope).
    Repository,
    /// Acting user.
    User,
}

impl IdentityKind {
    /// Node kind identities of this kind are stored as.
    pub fn node_kind(self) -> NodeKind {
        match self {
            IdentityKind::Repository => NodeKind::Repository,
            IdentityKind::User => NodeKind::UserProfile,
        }
    }
}

impl std::fmt::Display for IdentityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IdentityKind::Repository => f.write_str("repository"),
            IdentityKind::User => f.write_str("user"),
        }
    }
}

/// Resolves external identities to graph nodes.
pub trait IdentityResolver {
    /// Returns the node for `external_id`, or `None` when unknown.
    fn resolve(&self, kind: IdentityKind, external_id: &str) -> Result<Option<GraphNode>>;
}

impl<S: GraphStore + ?Sized> IdentityResolver for S {
    fn resolve(&self, kind: IdentityKind, external_id: &str) -> Result<Option<GraphNode>> {
        self.find_node(kind.node_kind(), external_id)
    }
}
