//! Connection sessions
//!
//! A session carries the authenticated identity (server side only) and the
//! sending half of the connection's outbound frame channel.

use std::sync::atomic::{AtomicU64, Ordering};

use crossbeam::channel::Sender;
use parking_lot::{Mutex, RwLock};

use crate::auth::Identity;
use crate::protocol::Frame;

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug)]
pub struct Session {
    id: u64,
    identity: RwLock<Option<Identity>>,
    outbound: Mutex<Option<Sender<Frame>>>,
}

impl Session {
    /// Session whose frames go to `outbound`
    pub fn new(outbound: Sender<Frame>) -> Self {
        Self::with_outbound(Some(outbound))
    }

    /// Session without a connection; emitted frames are dropped
    pub fn detached() -> Self {
        Self::with_outbound(None)
    }

    fn with_outbound(outbound: Option<Sender<Frame>>) -> Self {
        Self {
            id: NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed),
            identity: RwLock::new(None),
            outbound: Mutex::new(outbound),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn identity(&self) -> Option<Identity> {
        self.identity.read().clone()
    }

    pub fn set_identity(&self, identity: Identity) {
        *self.identity.write() = Some(identity);
    }

    pub fn is_authenticated(&self) -> bool {
        self.identity.read().is_some()
    }

    /// Queue a frame for the connection. A closed session drops it.
    pub fn emit(&self, frame: Frame) {
        let outbound = self.outbound.lock();
        let Some(sender) = outbound.as_ref() else {
            return;
        };
        if sender.send(frame).is_err() {
            tracing::debug!("Session {} is gone, frame dropped", self.id);
        }
    }

    /// Stop accepting frames; the connection's writer ends once drained
    pub fn close(&self) {
        self.outbound.lock().take();
    }

    pub fn is_closed(&self) -> bool {
        self.outbound.lock().is_none()
    }
}
