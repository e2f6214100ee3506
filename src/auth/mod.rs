//! Auth Module
//!
//! Accounts and per-database permissions.
//!
//! ## Responsibilities
//! - Register/login against the users file
//! - Role and capability checks before any command touches storage
//! - Admin-only permission grants
//!
//! Admins and holders of a `"*"` database grant bypass capability checks.
//! Creating a database that does not exist yet is always permitted.

mod permissions;
mod users;

use serde_json::Value;

use crate::config::AdminCredentials;
use crate::error::{MpdbError, Result};
use crate::protocol::{CommandType, ResourceId};
use crate::storage::StorageBackend;

pub use permissions::{Capability, DatabaseAccess, Grant, PermissionRecord, PermissionStore, Role, Wildcard};
pub use users::{hash_password, Identity, UserStore};

/// Users plus permissions
pub struct Auth {
    users: UserStore,
    permissions: PermissionStore,
}

impl Auth {
    pub fn new(users: UserStore, permissions: PermissionStore) -> Self {
        Self { users, permissions }
    }

    pub fn users(&self) -> &UserStore {
        &self.users
    }

    pub fn permissions(&self) -> &PermissionStore {
        &self.permissions
    }

    /// Make sure the configured admin account exists with the admin role
    pub fn bootstrap_admin(&self, admin: &AdminCredentials) -> Result<Identity> {
        let identity = match self.users.find(&admin.username) {
            Some(identity) => identity,
            None => self.users.register(&admin.username, &admin.password, None)?,
        };
        if !self.permissions.is_admin(&identity.user_id) {
            self.permissions.insert(&identity.user_id, PermissionRecord::admin())?;
            tracing::info!("Granted admin role to {}", identity.username);
        }
        Ok(identity)
    }

    /// `{username, password[, email]}`
    pub fn register(&self, payload: &Value) -> Result<Identity> {
        let username = required_str(payload, "username")?;
        let password = required_str(payload, "password")?;
        let email = payload.get("email").and_then(Value::as_str);

        let identity = self.users.register(username, password, email)?;
        self.permissions.insert(&identity.user_id, PermissionRecord::user())?;
        Ok(identity)
    }

    /// `{username, password}`
    pub fn login(&self, payload: &Value) -> Result<Identity> {
        let username = required_str(payload, "username")?;
        let password = required_str(payload, "password")?;
        self.users.login(username, password)
    }

    /// `{targetUser, database, permissions}`, admins only. `targetUser` is a
    /// username or a user id.
    pub fn set_permission(&self, caller: &Identity, payload: &Value) -> Result<()> {
        if !self.permissions.is_admin(&caller.user_id) {
            return Err(MpdbError::PermissionDenied(
                "Only administrators can modify permissions".to_string(),
            ));
        }

        let (Some(target), Some(database), Some(grant)) = (
            payload.get("targetUser").and_then(Value::as_str).filter(|s| !s.is_empty()),
            payload.get("database").and_then(Value::as_str).filter(|s| !s.is_empty()),
            payload.get("permissions"),
        ) else {
            return Err(MpdbError::validation(
                "Missing required fields: targetUser, database, permissions",
            ));
        };
        let grant = Grant::from_value(grant)?;

        let user_id = self
            .users
            .find(target)
            .map(|identity| identity.user_id)
            .unwrap_or_else(|| target.to_string());
        self.permissions.set_permission(&user_id, database, grant)?;
        tracing::info!("{} updated permissions of {} on {}", caller.username, user_id, database);
        Ok(())
    }

    pub fn authorize(
        &self,
        identity: &Identity,
        kind: CommandType,
        targets: &[ResourceId],
        storage: &dyn StorageBackend,
    ) -> Result<()> {
        self.permissions.authorize(&identity.user_id, kind, targets, storage)
    }
}

fn required_str<'a>(payload: &'a Value, key: &str) -> Result<&'a str> {
    payload
        .get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| MpdbError::validation(format!("Missing required field: {}", key)))
}
