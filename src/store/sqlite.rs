use std::path::Path;

use rusqlite::{ffi, params, Connection, OptionalExtension, Row};
use tracing::{debug, warn};

use super::{EventSpec, GraphStore, NodeSpec, Result, StoreError};
use crate::types::{EventId, EventRecord, EventType, GraphNode, NodeId, NodeKind, Props};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS nodes (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    kind TEXT NOT NULL,
    ext_ref TEXT NOT NULL,
    scope_id INTEGER REFERENCES nodes (id),
    props TEXT NOT NULL,
    UNIQUE (kind, ext_ref)
);
CREATE INDEX IF NOT EXISTS idx_nodes_scope ON nodes (scope_id);
CREATE TABLE IF NOT EXISTS events (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    actor_id INTEGER NOT NULL REFERENCES nodes (id),
    action TEXT NOT NULL,
    description TEXT NOT NULL,
    scope_id INTEGER NOT NULL REFERENCES nodes (id),
    timestamp TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS event_subjects (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    event_id INTEGER NOT NULL REFERENCES events (id),
    node_id INTEGER NOT NULL REFERENCES nodes (id)
);
CREATE INDEX IF NOT EXISTS idx_event_subjects_event ON event_subjects (event_id);
";

const NODE_COLUMNS: &str = "id, kind, ext_ref, scope_id, props";

type NodeRow = (i64, String, String, Option<i64>, String);

/// SQLite-backed graph store.
///
/// Nodes live in a single table keyed by `(kind, ext_ref)` with properties
/// stored as JSON text. Checkpoints use `sqlite3_db_cacheflush`, which writes
/// dirty pages out mid-transaction while keeping them undoable.
pub struct SqliteStore {
    conn: Connection,
    in_tx: bool,
}

impl SqliteStore {
    /// Opens (creating if needed) the database at `path` and ensures the schema.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path.as_ref())?;
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get::<_, String>(0))?;
        conn.pragma_update(None, "synchronous", "FULL")?;
        Self::with_connection(conn)
    }

    /// Opens a private in-memory database.
    pub fn open_in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn, in_tx: false })
    }

    fn ensure_tx(&self) -> Result<()> {
        if self.in_tx {
            Ok(())
        } else {
            Err(StoreError::NoTransaction)
        }
    }

    fn load_node(&self, id: NodeId) -> Result<Option<GraphNode>> {
        let row = self
            .conn
            .query_row(
                &format!("SELECT {NODE_COLUMNS} FROM nodes WHERE id = ?1"),
                params![to_sql_id(id.0)?],
                node_row,
            )
            .optional()?;
        row.map(decode_node).transpose()
    }
}

impl GraphStore for SqliteStore {
    fn begin(&mut self) -> Result<()> {
        if self.in_tx {
            return Err(StoreError::TransactionActive);
        }
        self.conn.execute_batch("BEGIN IMMEDIATE")?;
        self.in_tx = true;
        debug!("sqlite_store.begin");
        Ok(())
    }

    fn in_transaction(&self) -> bool {
        self.in_tx
    }

    fn find_node(&self, kind: NodeKind, ext_ref: &str) -> Result<Option<GraphNode>> {
        let row = self
            .conn
            .query_row(
                &format!("SELECT {NODE_COLUMNS} FROM nodes WHERE kind = ?1 AND ext_ref = ?2"),
                params![kind.as_str(), ext_ref],
                node_row,
            )
            .optional()?;
        row.map(decode_node).transpose()
    }

    fn node(&self, id: NodeId) -> Result<Option<GraphNode>> {
        self.load_node(id)
    }

    fn children(&self, scope: NodeId) -> Result<Vec<GraphNode>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {NODE_COLUMNS} FROM nodes WHERE scope_id = ?1 ORDER BY id"
        ))?;
        let rows = stmt
            .query_map(params![to_sql_id(scope.0)?], node_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        rows.into_iter().map(decode_node).collect()
    }

    fn count_nodes(&self, kind: NodeKind) -> Result<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM nodes WHERE kind = ?1",
            params![kind.as_str()],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    fn create_node(&mut self, spec: NodeSpec<'_>) -> Result<GraphNode> {
        self.ensure_tx()?;
        let props = serde_json::to_string(spec.props)?;
        let scope = spec.scope.map(|id| to_sql_id(id.0)).transpose()?;
        let inserted = self.conn.execute(
            "INSERT INTO nodes (kind, ext_ref, scope_id, props) VALUES (?1, ?2, ?3, ?4)",
            params![spec.kind.as_str(), spec.ext_ref, scope, props],
        );
        match inserted {
            Ok(_) => {}
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.extended_code == ffi::SQLITE_CONSTRAINT_UNIQUE =>
            {
                return Err(StoreError::DuplicateNode {
                    kind: spec.kind,
                    ext_ref: spec.ext_ref.to_string(),
                });
            }
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.extended_code == ffi::SQLITE_CONSTRAINT_FOREIGNKEY =>
            {
                return Err(StoreError::MissingNode(spec.scope.unwrap_or(NodeId(0))));
            }
            Err(err) => return Err(err.into()),
        }
        let id = NodeId(self.conn.last_insert_rowid() as u64);
        Ok(GraphNode {
            id,
            kind: spec.kind,
            ext_ref: spec.ext_ref.to_string(),
            scope: spec.scope,
            props: spec.props.clone(),
        })
    }

    fn update_node(&mut self, id: NodeId, spec: NodeSpec<'_>) -> Result<GraphNode> {
        self.ensure_tx()?;
        let props = serde_json::to_string(spec.props)?;
        let scope = spec.scope.map(|id| to_sql_id(id.0)).transpose()?;
        let changed = self
            .conn
            .execute(
                "UPDATE nodes SET scope_id = ?1, props = ?2 WHERE id = ?3",
                params![scope, props, to_sql_id(id.0)?],
            )
            .map_err(|err| match err {
                rusqlite::Error::SqliteFailure(e, _)
                    if e.extended_code == ffi::SQLITE_CONSTRAINT_FOREIGNKEY =>
                {
                    StoreError::MissingNode(spec.scope.unwrap_or(NodeId(0)))
                }
                other => other.into(),
            })?;
        if changed == 0 {
            return Err(StoreError::MissingNode(id));
        }
        self.load_node(id)?.ok_or(StoreError::MissingNode(id))
    }

    fn create_event(&mut self, spec: EventSpec<'_>) -> Result<EventId> {
        self.ensure_tx()?;
        self.conn.execute(
            "INSERT INTO events (actor_id, action, description, scope_id, timestamp)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                to_sql_id(spec.actor.0)?,
                spec.action.as_str(),
                spec.description,
                to_sql_id(spec.scope.0)?,
                spec.timestamp
            ],
        )?;
        Ok(EventId(self.conn.last_insert_rowid() as u64))
    }

    fn add_event_subject(&mut self, event: EventId, node: NodeId) -> Result<()> {
        self.ensure_tx()?;
        self.conn.execute(
            "INSERT INTO event_subjects (event_id, node_id) VALUES (?1, ?2)",
            params![to_sql_id(event.0)?, to_sql_id(node.0)?],
        )?;
        Ok(())
    }

    fn event(&self, id: EventId) -> Result<Option<EventRecord>> {
        let row = self
            .conn
            .query_row(
                "SELECT actor_id, action, description, scope_id, timestamp FROM events WHERE id = ?1",
                params![to_sql_id(id.0)?],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, i64>(3)?,
                        row.get::<_, String>(4)?,
                    ))
                },
            )
            .optional()?;
        let Some((actor, action, description, scope, timestamp)) = row else {
            return Ok(None);
        };
        let action = action.parse::<EventType>().map_err(StoreError::Corrupt)?;
        let mut stmt = self
            .conn
            .prepare("SELECT node_id FROM event_subjects WHERE event_id = ?1 ORDER BY id")?;
        let subjects = stmt
            .query_map(params![to_sql_id(id.0)?], |row| row.get::<_, i64>(0))?
            .map(|res| res.map(|raw| NodeId(raw as u64)))
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(Some(EventRecord {
            id,
            actor: NodeId(actor as u64),
            action,
            description,
            scope: NodeId(scope as u64),
            timestamp,
            subjects,
        }))
    }

    fn count_events(&self) -> Result<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM events", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    fn checkpoint(&mut self) -> Result<()> {
        self.ensure_tx()?;
        self.conn.cache_flush()?;
        debug!("sqlite_store.checkpoint");
        Ok(())
    }

    fn commit(&mut self) -> Result<()> {
        self.ensure_tx()?;
        self.conn.execute_batch("COMMIT")?;
        self.in_tx = false;
        debug!("sqlite_store.commit");
        Ok(())
    }

    fn rollback(&mut self) -> Result<()> {
        self.ensure_tx()?;
        self.in_tx = false;
        self.conn.execute_batch("ROLLBACK")?;
        warn!("sqlite_store.rollback");
        Ok(())
    }
}

impl Drop for SqliteStore {
    fn drop(&mut self) {
        if self.in_tx {
            warn!("sqlite_store dropped with open transaction; rolling back");
            let _ = self.conn.execute_batch("ROLLBACK");
        }
    }
}

fn to_sql_id(raw: u64) -> Result<i64> {
    i64::try_from(raw).map_err(|_| StoreError::Corrupt(format!("id {raw} out of range")))
}

fn node_row(row: &Row<'_>) -> rusqlite::Result<NodeRow> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
    ))
}

fn decode_node((id, kind, ext_ref, scope, props): NodeRow) -> Result<GraphNode> {
    let kind = kind.parse::<NodeKind>().map_err(StoreError::Corrupt)?;
    let props: Props = serde_json::from_str(&props)?;
    Ok(GraphNode {
        id: NodeId(id as u64),
        kind,
        ext_ref,
        scope: scope.map(|raw| NodeId(raw as u64)),
        props,
    })
}
