use std::collections::BTreeMap;

use tracing::debug;

use super::{EventSpec, GraphStore, NodeSpec, Result, StoreError};
use crate::types::{EventId, EventRecord, GraphNode, NodeId, NodeKind};

/// Counts of transaction boundaries observed by a [`MemoryStore`].
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct TxCounters {
    /// Transactions opened.
    pub begins: u64,
    /// Checkpoint flushes issued.
    pub checkpoints: u64,
    /// Successful commits.
    pub commits: u64,
    /// Rollbacks.
    pub rollbacks: u64,
}

#[derive(Clone, Debug, Default)]
struct GraphState {
    nodes: BTreeMap<NodeId, GraphNode>,
    by_ref: BTreeMap<(NodeKind, String), NodeId>,
    events: BTreeMap<EventId, EventRecord>,
    next_node: u64,
    next_event: u64,
}

/// Transactional in-memory graph.
///
/// `begin` snapshots the committed state; reads inside a transaction see the
/// working copy, `commit` publishes it and `rollback` drops it.
#[derive(Debug, Default)]
pub struct MemoryStore {
    committed: GraphState,
    working: Option<GraphState>,
    counters: TxCounters,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Transaction boundary counters since creation.
    pub fn counters(&self) -> TxCounters {
        self.counters
    }

    fn view(&self) -> &GraphState {
        self.working.as_ref().unwrap_or(&self.committed)
    }

    fn working_mut(&mut self) -> Result<&mut GraphState> {
        self.working.as_mut().ok_or(StoreError::NoTransaction)
    }
}

impl GraphStore for MemoryStore {
    fn begin(&mut self) -> Result<()> {
        if self.working.is_some() {
            return Err(StoreError::TransactionActive);
        }
        self.working = Some(self.committed.clone());
        self.counters.begins += 1;
        Ok(())
    }

    fn in_transaction(&self) -> bool {
        self.working.is_some()
    }

    fn find_node(&self, kind: NodeKind, ext_ref: &str) -> Result<Option<GraphNode>> {
        let state = self.view();
        Ok(state
            .by_ref
            .get(&(kind, ext_ref.to_string()))
            .and_then(|id| state.nodes.get(id))
            .cloned())
    }

    fn node(&self, id: NodeId) -> Result<Option<GraphNode>> {
        Ok(self.view().nodes.get(&id).cloned())
    }

    fn children(&self, scope: NodeId) -> Result<Vec<GraphNode>> {
        Ok(self
            .view()
            .nodes
            .values()
            .filter(|node| node.scope == Some(scope))
            .cloned()
            .collect())
    }

    fn count_nodes(&self, kind: NodeKind) -> Result<u64> {
        Ok(self.view().nodes.values().filter(|n| n.kind == kind).count() as u64)
    }

    fn create_node(&mut self, spec: NodeSpec<'_>) -> Result<GraphNode> {
        let state = self.working_mut()?;
        let key = (spec.kind, spec.ext_ref.to_string());
        if state.by_ref.contains_key(&key) {
            return Err(StoreError::DuplicateNode {
                kind: spec.kind,
                ext_ref: spec.ext_ref.to_string(),
            });
        }
        if let Some(scope) = spec.scope {
            if !state.nodes.contains_key(&scope) {
                return Err(StoreError::MissingNode(scope));
            }
        }
        state.next_node += 1;
        let node = GraphNode {
            id: NodeId(state.next_node),
            kind: spec.kind,
            ext_ref: spec.ext_ref.to_string(),
            scope: spec.scope,
            props: spec.props.clone(),
        };
        state.by_ref.insert(key, node.id);
        state.nodes.insert(node.id, node.clone());
        Ok(node)
    }

    fn update_node(&mut self, id: NodeId, spec: NodeSpec<'_>) -> Result<GraphNode> {
        let state = self.working_mut()?;
        if let Some(scope) = spec.scope {
            if !state.nodes.contains_key(&scope) {
                return Err(StoreError::MissingNode(scope));
            }
        }
        let node = state.nodes.get_mut(&id).ok_or(StoreError::MissingNode(id))?;
        node.scope = spec.scope;
        node.props = spec.props.clone();
        Ok(node.clone())
    }

    fn create_event(&mut self, spec: EventSpec<'_>) -> Result<EventId> {
        let state = self.working_mut()?;
        state.next_event += 1;
        let id = EventId(state.next_event);
        state.events.insert(
            id,
            EventRecord {
                id,
                actor: spec.actor,
                action: spec.action,
                description: spec.description.to_string(),
                scope: spec.scope,
                timestamp: spec.timestamp.to_string(),
                subjects: Vec::new(),
            },
        );
        Ok(id)
    }

    fn add_event_subject(&mut self, event: EventId, node: NodeId) -> Result<()> {
        let state = self.working_mut()?;
        if !state.nodes.contains_key(&node) {
            return Err(StoreError::MissingNode(node));
        }
        let record = state
            .events
            .get_mut(&event)
            .ok_or_else(|| StoreError::Corrupt(format!("event {event} does not exist")))?;
        record.subjects.push(node);
        Ok(())
    }

    fn event(&self, id: EventId) -> Result<Option<EventRecord>> {
        Ok(self.view().events.get(&id).cloned())
    }

    fn count_events(&self) -> Result<u64> {
        Ok(self.view().events.len() as u64)
    }

    fn checkpoint(&mut self) -> Result<()> {
        self.working_mut()?;
        self.counters.checkpoints += 1;
        debug!(checkpoints = self.counters.checkpoints, "memory_store.checkpoint");
        Ok(())
    }

    fn commit(&mut self) -> Result<()> {
        let state = self.working.take().ok_or(StoreError::NoTransaction)?;
        self.committed = state;
        self.counters.commits += 1;
        Ok(())
    }

    fn rollback(&mut self) -> Result<()> {
        self.working.take().ok_or(StoreError::NoTransaction)?;
        self.counters.rollbacks += 1;
        Ok(())
    }
}
