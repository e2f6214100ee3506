//! Command Module
//!
//! Data commands decoded from the nested payload and run against a
//! [`StorageBackend`].
//!
//! ## Responsibilities
//! - Turn a verb plus payload into a typed [`Command`]
//! - Report the resources a command touches and the lock modes it needs
//! - Run the command and build exactly one [`Response`]
//!
//! Status codes: 200 when anything took effect (or was found), 404 when
//! nothing matched, otherwise the status of the first failure. A failure on
//! one resource does not undo work already done on others in the same
//! payload.

mod create;
mod delete;
mod list;
mod read;
mod search;
mod update;

use serde_json::Value;

use crate::coordinator::Session;
use crate::error::{MpdbError, Result};
use crate::protocol::{
    lock_plan, status, Access, CommandType, Frame, PayloadTree, Resource, ResourceId, Response, SearchEnvelope,
};
use crate::storage::StorageBackend;

pub use list::ListTarget;

/// A decoded data command
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Create(PayloadTree),
    Read(PayloadTree),
    Update(PayloadTree),
    Delete(PayloadTree),
    Search(SearchEnvelope),
    List(ListTarget),
}

impl Command {
    /// Decode a data command. Auth and transfer verbs are rejected.
    pub fn parse(kind: CommandType, payload: &Value) -> Result<Self> {
        match kind {
            CommandType::Create => Ok(Command::Create(PayloadTree::parse(payload)?)),
            CommandType::Read => Ok(Command::Read(PayloadTree::parse(payload)?)),
            CommandType::Update => Ok(Command::Update(PayloadTree::parse(payload)?)),
            CommandType::Delete => Ok(Command::Delete(PayloadTree::parse(payload)?)),
            CommandType::Search => Ok(Command::Search(SearchEnvelope::parse(payload)?)),
            CommandType::List => Ok(Command::List(ListTarget::parse(payload)?)),
            other => Err(MpdbError::Protocol(format!(
                "'{}' is not a data command",
                other.name()
            ))),
        }
    }

    pub fn kind(&self) -> CommandType {
        match self {
            Command::Create(_) => CommandType::Create,
            Command::Read(_) => CommandType::Read,
            Command::Update(_) => CommandType::Update,
            Command::Delete(_) => CommandType::Delete,
            Command::Search(_) => CommandType::Search,
            Command::List(_) => CommandType::List,
        }
    }

    /// Mode the command's own targets are locked in
    pub fn access(&self) -> Access {
        match self {
            Command::Read(_) | Command::Search(_) | Command::List(_) => Access::Shared,
            Command::Create(_) | Command::Update(_) | Command::Delete(_) => Access::Exclusive,
        }
    }

    /// Resources checked against the caller's permissions
    pub fn targets(&self) -> Vec<ResourceId> {
        match self {
            Command::Create(tree) | Command::Read(tree) | Command::Update(tree) | Command::Delete(tree) => {
                tree.targets()
            }
            Command::Search(envelope) => envelope.tree.targets(),
            Command::List(target) => target.resource().into_iter().collect(),
        }
    }

    /// Sorted lock plan: targets in [`Command::access`] mode, ancestors shared
    ///
    /// Create locks whole collections since new document ids are not known
    /// up front; Delete locks whole databases since it may prune parents.
    /// Rename destinations are locked alongside their sources.
    pub fn lock_set(&self) -> Vec<Resource> {
        let access = self.access();
        let mut ids = self.targets();
        match self {
            Command::Create(_) => ids = ids.iter().map(|id| id.truncate(2)).collect(),
            Command::Delete(_) => ids = ids.iter().map(|id| id.truncate(1)).collect(),
            Command::Update(tree) => ids.extend(tree.rename_destinations()),
            _ => {}
        }
        lock_plan(ids.into_iter().map(|id| Resource { id, access }))
    }

    /// Run against storage and build the response
    pub fn run(&self, storage: &dyn StorageBackend) -> Result<Response> {
        match self {
            Command::Create(tree) => create::execute(tree, storage),
            Command::Read(tree) => read::execute(tree, storage),
            Command::Update(tree) => update::execute(tree, storage),
            Command::Delete(tree) => delete::execute(tree, storage),
            Command::Search(envelope) => search::execute(envelope, storage),
            Command::List(target) => list::execute(target, storage),
        }
    }

    /// Run, emit the response on the session (if any) and return it
    pub fn execute(&self, storage: &dyn StorageBackend, session: Option<&Session>) -> Result<Response> {
        let response = self.run(storage)?;
        tracing::debug!(
            "{} finished with {}: {}",
            self.kind().name(),
            response.response,
            response.message
        );
        if let Some(session) = session {
            session.emit(Frame::Response(response.clone()));
        }
        Ok(response)
    }
}

// =============================================================================
// Shared Helpers
// =============================================================================

/// Per-resource failures of a multi-resource command
#[derive(Debug, Default)]
struct Progress {
    failed: usize,
    first_error: Option<MpdbError>,
    skip_missing: bool,
}

impl Progress {
    /// Progress where a missing target is nothing to apply, not a failure
    fn skipping_missing() -> Self {
        Self {
            skip_missing: true,
            ..Self::default()
        }
    }

    /// Keep a success, remember a failure and carry on
    fn record<T>(&mut self, what: &str, result: Result<T>) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(e) if self.skip_missing && e.is_not_found() => {
                tracing::debug!("{}: {}", what, e);
                None
            }
            Err(e) => {
                if e.is_not_found() {
                    tracing::debug!("{}: {}", what, e);
                } else {
                    tracing::warn!("{} failed: {}", what, e);
                }
                self.failed += 1;
                self.first_error.get_or_insert(e);
                None
            }
        }
    }

    /// `ok` when something was applied, otherwise the first failure or 404
    fn finish(self, kind: CommandType, applied: usize, ok: impl FnOnce() -> Response) -> Result<Response> {
        if applied > 0 {
            return Ok(ok());
        }
        match self.first_error {
            Some(e) => Err(e),
            None => Ok(not_found(kind)),
        }
    }
}

fn not_found(kind: CommandType) -> Response {
    Response::new(status::NOT_FOUND, kind, "No records found")
}

fn unsupported(kind: CommandType, shape: &str) -> MpdbError {
    MpdbError::validation(format!("{} does not accept {}", kind.name(), shape))
}
