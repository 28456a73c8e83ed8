#![forbid(unsafe_code)]

//! Identifier newtypes and the graph entities shared by the store and the
//! importers.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Property map attached to every graph node.
pub type Props = Map<String, Value>;

/// Store-assigned node identifier.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Serialize, Deserialize)]
pub struct NodeId(pub u64);
/// Store-assigned event identifier.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Serialize, Deserialize)]
pub struct EventId(pub u64);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Entity class of a graph node.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    /// Holding institution; the root scope of an import.
    Repository,
    /// User account that actions are attributed to.
    UserProfile,
    /// One archival description imported from a record file.
    DocumentaryUnit,
}

impl NodeKind {
    /// All kinds, in display order.
    pub const ALL: [NodeKind; 3] = [
        NodeKind::Repository,
        NodeKind::UserProfile,
        NodeKind::DocumentaryUnit,
    ];

    /// Stable name used in storage and on the command line.
    pub fn as_str(self) -> &'static str {
        match self {
            NodeKind::Repository => "repository",
            NodeKind::UserProfile => "user_profile",
            NodeKind::DocumentaryUnit => "documentary_unit",
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NodeKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        NodeKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| format!("unknown node kind '{s}'"))
    }
}

/// A persisted graph node.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct GraphNode {
    /// Store-assigned id.
    pub id: NodeId,
    /// Entity class.
    pub kind: NodeKind,
    /// External reference id; unique per kind.
    pub ext_ref: String,
    /// Parent node the entity is attached under, if any.
    pub scope: Option<NodeId>,
    /// Descriptive properties.
    pub props: Props,
}

impl GraphNode {
    /// Returns a string property, if present.
    pub fn prop_str(&self, name: &str) -> Option<&str> {
        self.props.get(name).and_then(Value::as_str)
    }
}

/// Kind of action an event records.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    /// Bulk ingest of external data.
    Ingest,
}

impl EventType {
    /// Stable name used in storage.
    pub fn as_str(self) -> &'static str {
        match self {
            EventType::Ingest => "ingest",
        }
    }
}

impl FromStr for EventType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ingest" => Ok(EventType::Ingest),
            other => Err(format!("unknown event type '{other}'")),
        }
    }
}

/// An attributed action and the nodes it touched.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct EventRecord {
    /// Store-assigned id.
    pub id: EventId,
    /// User the action is attributed to.
    pub actor: NodeId,
    /// Kind of action.
    pub action: EventType,
    /// Human readable description.
    pub description: String,
    /// Repository the action applies to.
    pub scope: NodeId,
    /// RFC 3339 timestamp of when the event was opened.
    pub timestamp: String,
    /// Nodes created or updated under this event, in order.
    pub subjects: Vec<NodeId>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_kind_names_roundtrip() {
        for kind in NodeKind::ALL {
            assert_eq!(kind.as_str().parse::<NodeKind>(), Ok(kind));
        }
        assert!("collection".parse::<NodeKind>().is_err());
    }

    #[test]
    fn prop_str_ignores_non_strings() {
        let mut props = Props::new();
        props.insert("title".into(), Value::String("Fonds".into()));
        props.insert("count".into(), Value::from(3));
        let node = GraphNode {
            id: NodeId(1),
            kind: NodeKind::DocumentaryUnit,
            ext_ref: "irn1".into(),
            scope: None,
            props,
        };
        assert_eq!(node.prop_str("title"), Some("Fonds"));
        assert_eq!(node.prop_str("count"), None);
        assert_eq!(node.prop_str("missing"), None);
    }
}
