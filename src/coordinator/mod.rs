//! Coordinator Module
//!
//! Serializes and gates every request.
//!
//! ## Request Path
//! 1. Enqueue on the session's FIFO; drain in arrival order
//! 2. Require an identity (except login/register) → 401
//! 3. Decode the payload and check permissions on its targets → 400 / 403
//! 4. Acquire the sorted lock plan
//! 5. Execute against storage; locks drop on every exit path
//!
//! The coordinator is the single error boundary: any failure past this point
//! becomes one `{response, message}` frame on the session. Failures of a
//! data command from a logged-in session also echo its `type`.

mod locks;
mod queue;
mod session;

use std::sync::Arc;

use crossbeam::channel;
use serde_json::{json, Value};

use crate::auth::{Auth, Identity};
use crate::command::Command;
use crate::error::{MpdbError, Result};
use crate::protocol::{lock_plan, status, Access, CommandType, Frame, Request, Resource, ResourceId, Response};
use crate::storage::{ExportSelector, StorageBackend};

pub use locks::{LockGuard, LockTable};
pub use queue::{CommandQueue, QueueRegistry};
pub use session::Session;

/// A queued request and where its result goes
struct Job {
    request: Request,
    reply: channel::Sender<Frame>,
}

/// Queues, locks and the auth gate in front of storage
pub struct Coordinator {
    storage: Arc<dyn StorageBackend>,
    auth: Auth,
    locks: LockTable,
    queues: QueueRegistry<Job>,
}

impl Coordinator {
    pub fn new(storage: Arc<dyn StorageBackend>, auth: Auth) -> Self {
        Self {
            storage,
            auth,
            locks: LockTable::new(),
            queues: QueueRegistry::new(),
        }
    }

    pub fn storage(&self) -> &Arc<dyn StorageBackend> {
        &self.storage
    }

    pub fn auth(&self) -> &Auth {
        &self.auth
    }

    pub fn locks(&self) -> &LockTable {
        &self.locks
    }

    /// Number of sessions with a queue
    pub fn queue_count(&self) -> usize {
        self.queues.len()
    }

    /// Queue `request` behind the session's earlier requests, run it, and
    /// return the frame it produced (also emitted on the session)
    pub fn submit(&self, session: &Session, request: Request) -> Frame {
        let queue = self.queues.get(session.id());
        let (reply, result) = channel::bounded(1);
        queue.push(Job { request, reply });
        queue.drain(|job| {
            let frame = self.process(session, &job.request);
            let _ = job.reply.send(frame);
        });
        result
            .recv()
            .unwrap_or_else(|_| Frame::Response(Response::from_error(&internal("reply channel closed"))))
    }

    /// Forget the session's queue and stop emitting to it
    pub fn disconnect(&self, session: &Session) {
        self.queues.remove(session.id());
        session.close();
        tracing::debug!("Session {} disconnected", session.id());
    }

    /// Run one request to a frame. Never fails: errors become responses.
    fn process(&self, session: &Session, request: &Request) -> Frame {
        tracing::debug!("Session {}: {}", session.id(), request.kind.name());
        match self.dispatch(session, request) {
            Ok(frame) => frame,
            Err(e) => {
                if e.status_code() == status::INTERNAL_ERROR {
                    tracing::error!("{} failed: {}", request.kind.name(), e);
                } else {
                    tracing::debug!("{} rejected: {}", request.kind.name(), e);
                }
                let mut response = Response::from_error(&e);
                if request.kind.is_data_command() && session.is_authenticated() {
                    response.kind = Some(request.kind);
                }
                let frame = Frame::Response(response);
                session.emit(frame.clone());
                frame
            }
        }
    }

    fn dispatch(&self, session: &Session, request: &Request) -> Result<Frame> {
        let kind = request.kind;
        if kind.is_auth_exempt() {
            let frame = self.authenticate(session, request)?;
            session.emit(frame.clone());
            return Ok(frame);
        }

        let identity = session.identity().ok_or(MpdbError::Unauthenticated)?;
        if kind.is_data_command() {
            let payload = request.payload()?;
            let response = self.run_command(&identity, kind, &payload, Some(session))?;
            return Ok(Frame::Response(response));
        }

        let frame = match kind {
            CommandType::SetPermission => {
                self.auth.set_permission(&identity, &request.payload()?)?;
                Frame::Response(Response::status(status::OK, "Permissions updated successfully"))
            }
            CommandType::Export => self.export(&identity, &request.payload()?)?,
            CommandType::Import => self.import(&identity, &request.body)?,
            other => {
                return Err(MpdbError::Protocol(format!(
                    "Unhandled command type: {}",
                    other.name()
                )))
            }
        };
        session.emit(frame.clone());
        Ok(frame)
    }

    fn authenticate(&self, session: &Session, request: &Request) -> Result<Frame> {
        let payload = request.payload()?;
        let response = match request.kind {
            CommandType::Login => {
                let identity = self.auth.login(&payload)?;
                tracing::info!("Session {} logged in as {}", session.id(), identity.username);
                session.set_identity(identity);
                Response::status(status::OK, "Login successful")
            }
            _ => {
                self.auth.register(&payload)?;
                Response::status(status::OK, "User registered successfully")
            }
        };
        Ok(Frame::Response(response))
    }

    /// Permission check, lock plan and execution for a data command
    fn run_command(
        &self,
        identity: &Identity,
        kind: CommandType,
        payload: &Value,
        session: Option<&Session>,
    ) -> Result<Response> {
        let command = Command::parse(kind, payload)?;
        self.auth
            .authorize(identity, kind, &command.targets(), self.storage.as_ref())?;

        let _guard = self.locks.acquire(command.lock_set());
        command.execute(self.storage.as_ref(), session)
    }

    /// `{database?, collection?, document?}` → export frame of the subtree
    fn export(&self, identity: &Identity, payload: &Value) -> Result<Frame> {
        let selector = export_selector(payload)?;
        let target = match (&selector.database, &selector.collection, &selector.document) {
            (Some(db), Some(col), Some(doc)) => ResourceId::document(db, col, doc),
            (Some(db), Some(col), None) => ResourceId::collection(db, col),
            (Some(db), None, None) => ResourceId::database(db),
            (None, None, None) => ResourceId::root(),
            _ => {
                return Err(MpdbError::validation(
                    "Export selector must name a database before a collection or document",
                ))
            }
        };
        self.auth.authorize(
            identity,
            CommandType::Export,
            std::slice::from_ref(&target),
            self.storage.as_ref(),
        )?;

        let _guard = self.locks.acquire(lock_plan([Resource {
            id: target,
            access: Access::Shared,
        }]));
        let tree = self.storage.export(&selector)?;
        Ok(Frame::Export(serde_json::to_vec(&tree)?.into()))
    }

    /// Apply each newline-delimited JSON object as its own Create
    fn import(&self, identity: &Identity, body: &[u8]) -> Result<Frame> {
        let text = std::str::from_utf8(body)
            .map_err(|e| MpdbError::validation(format!("Import body is not UTF-8: {}", e)))?;

        let (mut imported, mut failed) = (0usize, 0usize);
        for (number, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let result = serde_json::from_str::<Value>(line)
                .map_err(MpdbError::from)
                .and_then(|payload| self.run_command(identity, CommandType::Create, &payload, None));
            match result {
                Ok(_) => imported += 1,
                Err(e) => {
                    tracing::warn!("Import line {} skipped: {}", number + 1, e);
                    failed += 1;
                }
            }
        }

        tracing::info!("Import finished: {} imported, {} failed", imported, failed);
        let response = Response::new(
            status::OK,
            CommandType::Import,
            format!("Imported {} records, {} failed", imported, failed),
        )
        .with_data(json!({ "imported": imported, "failed": failed }));
        Ok(Frame::Response(response))
    }
}

fn export_selector(payload: &Value) -> Result<ExportSelector> {
    let field = |key: &str| -> Result<Option<String>> {
        match payload.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(s)) if s.is_empty() => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.clone())),
            Some(_) => Err(MpdbError::validation(format!("'{}' must be a string", key))),
        }
    };
    Ok(ExportSelector {
        database: field("database")?,
        collection: field("collection")?,
        document: field("document")?,
    })
}

fn internal(message: &str) -> MpdbError {
    MpdbError::Io(std::io::Error::new(std::io::ErrorKind::Other, message.to_string()))
}
