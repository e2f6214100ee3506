//! Configuration for MPDB
//!
//! Centralized configuration with sensible defaults.

use std::path::PathBuf;

/// Main configuration for an MPDB daemon
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Storage Configuration
    // -------------------------------------------------------------------------
    /// Root directory for all databases
    /// Internal structure:
    ///   {data_dir}/
    ///     └── {database}/
    ///           └── {collection}/
    ///                 └── {document id}.json
    pub data_dir: PathBuf,

    // -------------------------------------------------------------------------
    // Auth Configuration
    // -------------------------------------------------------------------------
    /// Credentials file (`id|username|email|sha256` per line)
    pub users_file: PathBuf,

    /// Permission records keyed by user id (JSON)
    pub permissions_file: PathBuf,

    /// Admin account created on startup when absent
    pub bootstrap_admin: Option<AdminCredentials>,

    // -------------------------------------------------------------------------
    // Network Configuration
    // -------------------------------------------------------------------------
    /// TCP listen address
    pub listen_addr: String,

    /// Max concurrent client connections
    pub max_connections: usize,

    /// Connection read timeout (milliseconds, 0 disables)
    pub read_timeout_ms: u64,

    /// Connection write timeout (milliseconds, 0 disables)
    pub write_timeout_ms: u64,
}

/// Username/password pair for the bootstrap admin
#[derive(Debug, Clone)]
pub struct AdminCredentials {
    pub username: String,
    pub password: String,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = PathBuf::from("./mpdb_data");
        Self {
            users_file: data_dir.join("users.cf"),
            permissions_file: data_dir.join("permissions.cf"),
            data_dir,
            bootstrap_admin: None,
            listen_addr: "127.0.0.1:8008".to_string(),
            max_connections: 1024,
            read_timeout_ms: 0,
            write_timeout_ms: 5000,
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }
}

/// Builder for Config
///
/// Setting `data_dir` moves the auth files along with it unless they were
/// set explicitly.
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
    users_file_set: bool,
    permissions_file_set: bool,
}

impl ConfigBuilder {
    /// Set the data directory (root for all databases)
    pub fn data_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.data_dir = path.into();
        if !self.users_file_set {
            self.config.users_file = self.config.data_dir.join("users.cf");
        }
        if !self.permissions_file_set {
            self.config.permissions_file = self.config.data_dir.join("permissions.cf");
        }
        self
    }

    /// Set the credentials file path
    pub fn users_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.users_file = path.into();
        self.users_file_set = true;
        self
    }

    /// Set the permissions file path
    pub fn permissions_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.permissions_file = path.into();
        self.permissions_file_set = true;
        self
    }

    /// Create this admin account on startup if it does not exist yet
    pub fn bootstrap_admin(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.config.bootstrap_admin = Some(AdminCredentials {
            username: username.into(),
            password: password.into(),
        });
        self
    }

    /// Set the TCP listen address
    pub fn listen_addr(mut self, addr: impl Into<String>) -> Self {
        self.config.listen_addr = addr.into();
        self
    }

    /// Set the maximum number of concurrent connections
    pub fn max_connections(mut self, count: usize) -> Self {
        self.config.max_connections = count;
        self
    }

    /// Set the read timeout (in milliseconds)
    pub fn read_timeout_ms(mut self, ms: u64) -> Self {
        self.config.read_timeout_ms = ms;
        self
    }

    /// Set the write timeout (in milliseconds)
    pub fn write_timeout_ms(mut self, ms: u64) -> Self {
        self.config.write_timeout_ms = ms;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
