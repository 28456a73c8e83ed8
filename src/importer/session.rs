use std::num::NonZeroU64;

use serde::Serialize;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::store::{EventSpec, GraphStore};
use crate::types::{EventId, EventType, GraphNode};

/// Running counts of one import.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize)]
pub struct ImportLog {
    created: u64,
    updated: u64,
}

impl ImportLog {
    /// Entities persisted as new nodes.
    pub fn created(&self) -> u64 {
        self.created
    }

    /// Entities that replaced an existing node.
    pub fn updated(&self) -> u64 {
        self.updated
    }

    /// Created plus updated.
    pub fn successful(&self) -> u64 {
        self.created + self.updated
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum SessionState {
    Running,
    Committed,
    Aborted,
}

/// One import run: the open transaction, its event and its counts.
///
/// The session owns the store borrow for the whole run and is handed down
/// the recursion by `&mut`. It ends through [`ImportSession::finish`] or
/// [`ImportSession::abort`]; dropping a running session rolls it back.
pub struct ImportSession<'s> {
    store: &'s mut dyn GraphStore,
    event: EventId,
    log: ImportLog,
    commit_every: NonZeroU64,
    checkpoints: u64,
    state: SessionState,
}

impl<'s> ImportSession<'s> {
    /// Opens the transaction and records the event every imported node is
    /// attached to.
    pub fn start(
        store: &'s mut dyn GraphStore,
        actor: &GraphNode,
        action: EventType,
        description: &str,
        scope: &GraphNode,
        commit_every: NonZeroU64,
    ) -> Result<Self> {
        store.begin()?;
        let timestamp = now_rfc3339();
        let event = match store.create_event(EventSpec {
            actor: actor.id,
            action,
            description,
            scope: scope.id,
            timestamp: &timestamp,
        }) {
            Ok(event) => event,
            Err(err) => {
                if let Err(rollback) = store.rollback() {
                    warn!(error = %rollback, "import_session.rollback_failed");
                }
                return Err(err.into());
            }
        };
        info!(
            event = %event,
            actor = %actor.ext_ref,
            scope = %scope.ext_ref,
            description,
            "import_session.start"
        );
        Ok(Self {
            store,
            event,
            log: ImportLog::default(),
            commit_every,
            checkpoints: 0,
            state: SessionState::Running,
        })
    }

    /// Store the session writes through.
    pub fn store(&mut self) -> &mut (dyn GraphStore + 's) {
        &mut *self.store
    }

    /// Event opened for this run.
    pub fn event(&self) -> EventId {
        self.event
    }

    /// Counts so far.
    pub fn log(&self) -> ImportLog {
        self.log
    }

    /// Checkpoints issued so far.
    pub fn checkpoints(&self) -> u64 {
        self.checkpoints
    }

    /// Attaches a newly created node to the event and counts it.
    pub fn record_created(&mut self, node: &GraphNode) -> Result<()> {
        self.store.add_event_subject(self.event, node.id)?;
        self.log.created += 1;
        info!(id = %node.ext_ref, node = %node.id, "Created item");
        self.maybe_checkpoint()
    }

    /// Attaches an updated node to the event and counts it.
    pub fn record_updated(&mut self, node: &GraphNode) -> Result<()> {
        self.store.add_event_subject(self.event, node.id)?;
        self.log.updated += 1;
        info!(id = %node.ext_ref, node = %node.id, "Updated item");
        self.maybe_checkpoint()
    }

    fn maybe_checkpoint(&mut self) -> Result<()> {
        if self.log.successful() % self.commit_every.get() != 0 {
            return Ok(());
        }
        self.store.checkpoint()?;
        self.checkpoints += 1;
        debug!(
            successful = self.log.successful(),
            checkpoints = self.checkpoints,
            "import_session.checkpoint"
        );
        Ok(())
    }

    /// Commits the run and returns its final counts.
    ///
    /// A failed commit rolls the transaction back before the error is returned.
    pub fn finish(mut self) -> Result<ImportLog> {
        match self.store.commit() {
            Ok(()) => {
                self.state = SessionState::Committed;
                info!(
                    created = self.log.created,
                    updated = self.log.updated,
                    checkpoints = self.checkpoints,
                    "import_session.commit"
                );
                Ok(self.log)
            }
            Err(err) => {
                self.rollback();
                Err(err.into())
            }
        }
    }

    /// Rolls the run back. Counts reported so far become meaningless.
    pub fn abort(mut self) {
        self.rollback();
    }

    fn rollback(&mut self) {
        self.state = SessionState::Aborted;
        if !self.store.in_transaction() {
            return;
        }
        match self.store.rollback() {
            Ok(()) => warn!(
                discarded = self.log.successful(),
                "import_session.rollback"
            ),
            Err(err) => warn!(error = %err, "import_session.rollback_failed"),
        }
    }
}

impl Drop for ImportSession<'_> {
    fn drop(&mut self) {
        if self.state == SessionState::Running {
            self.rollback();
        }
    }
}

fn now_rfc3339() -> String {
    let now = OffsetDateTime::now_utc();
    now.format(&Rfc3339)
        .unwrap_or_else(|_| now.unix_timestamp().to_string())
}
