//! Engine Module
//!
//! Composition root that wires storage, auth and the coordinator together.
//!
//! ## Responsibilities
//! - Create the data directory and open the filesystem storage
//! - Load users and permissions, create the bootstrap admin
//! - Hand requests to the [`Coordinator`]

use std::fs;
use std::path::Path;
use std::sync::Arc;

use serde_json::Value;

use crate::auth::{Auth, PermissionStore, UserStore};
use crate::config::Config;
use crate::coordinator::{Coordinator, Session};
use crate::error::Result;
use crate::protocol::{status, CommandType, Frame, Request, Response};
use crate::storage::{FsStorage, StorageBackend};

/// The document store
///
/// ## Concurrency Model: Hierarchical Resource Locks
///
/// - **Per session**: requests run strictly in submission order
/// - **Across sessions**: requests interleave freely unless their lock
///   plans overlap (shared for reads, exclusive for writes, shared on every
///   ancestor)
/// - Locks are always acquired in ascending resource-id order
pub struct Engine {
    /// Engine configuration
    config: Config,

    /// Queues, locks, auth gate and the storage behind them
    coordinator: Coordinator,
}

impl Engine {
    /// Open or create a store with the given config
    ///
    /// On startup:
    /// 1. Open/create data directory
    /// 2. Load users and permissions
    /// 3. Ensure the bootstrap admin exists (if configured)
    /// 4. Ready to serve requests
    pub fn open(config: Config) -> Result<Self> {
        // Step 1: Data directory and storage
        fs::create_dir_all(&config.data_dir)?;
        let storage: Arc<dyn StorageBackend> = Arc::new(FsStorage::open(&config.data_dir)?);

        // Step 2: Credentials and permission records
        let users = UserStore::open(&config.users_file)?;
        let permissions = PermissionStore::open(&config.permissions_file)?;
        let auth = Auth::new(users, permissions);

        // Step 3: Bootstrap admin
        if let Some(admin) = &config.bootstrap_admin {
            auth.bootstrap_admin(admin)?;
        }

        tracing::info!(
            "Engine opened at {} ({} users)",
            config.data_dir.display(),
            auth.users().len()
        );

        Ok(Self {
            coordinator: Coordinator::new(storage, auth),
            config,
        })
    }

    /// Open with a path (convenience method)
    ///
    /// Uses default config with the specified data directory
    pub fn open_path(path: &Path) -> Result<Self> {
        Self::open(Config::builder().data_dir(path).build())
    }

    /// Run a request for `session` and return the frame it produced
    pub fn submit(&self, session: &Session, request: Request) -> Frame {
        self.coordinator.submit(session, request)
    }

    /// Run a JSON request and return its response
    ///
    /// Export requests answer with an export frame; this returns a plain
    /// 200 response for those. Use [`Engine::submit`] to get the buffer.
    pub fn execute(&self, session: &Session, kind: CommandType, payload: &Value) -> Response {
        match self.submit(session, Request::json(kind, payload)) {
            Frame::Response(response) => response,
            Frame::Export(_) => Response::new(status::OK, kind, "Export ready"),
            Frame::Shutdown => Response::status(status::INTERNAL_ERROR, "Server shutting down"),
        }
    }

    /// Drop the session's queue and stop emitting to it
    pub fn disconnect(&self, session: &Session) {
        self.coordinator.disconnect(session);
    }

    // =========================================================================
    // Accessors (for testing and debugging)
    // =========================================================================

    /// Get the data directory path
    pub fn data_dir(&self) -> &Path {
        &self.config.data_dir
    }

    pub fn coordinator(&self) -> &Coordinator {
        &self.coordinator
    }

    pub fn storage(&self) -> &dyn StorageBackend {
        self.coordinator.storage().as_ref()
    }

    pub fn auth(&self) -> &Auth {
        self.coordinator.auth()
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.config
    }
}
