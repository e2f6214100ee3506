//! Permission records
//!
//! One record per user id, persisted as pretty JSON:
//!
//! ```text
//! { "<user id>": { "role": "admin" | "user",
//!                  "databases": "*" | { "<db>": "*" | ["read", "write", "delete"] } } }
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{MpdbError, Result};
use crate::protocol::{CommandType, ResourceId};
use crate::storage::StorageBackend;

// =============================================================================
// Record Types
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    User,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Capability {
    Read,
    Write,
    Delete,
}

impl Capability {
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "read" => Some(Capability::Read),
            "write" => Some(Capability::Write),
            "delete" => Some(Capability::Delete),
            _ => None,
        }
    }

    /// Capability a verb needs on every database it touches
    pub fn required_for(kind: CommandType) -> Option<Self> {
        match kind {
            CommandType::Read | CommandType::Search | CommandType::List | CommandType::Export => {
                Some(Capability::Read)
            }
            CommandType::Create | CommandType::Update | CommandType::Delete | CommandType::Import => {
                Some(Capability::Write)
            }
            CommandType::Login | CommandType::Register | CommandType::SetPermission => None,
        }
    }
}

/// The literal `"*"`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Wildcard;

impl TryFrom<String> for Wildcard {
    type Error = String;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        if value == "*" {
            Ok(Wildcard)
        } else {
            Err(format!("expected \"*\", got {:?}", value))
        }
    }
}

impl From<Wildcard> for String {
    fn from(_: Wildcard) -> String {
        "*".to_string()
    }
}

/// Capabilities on one database
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Grant {
    All(Wildcard),
    Only(Vec<Capability>),
}

impl Grant {
    pub fn allows(&self, capability: Capability) -> bool {
        match self {
            Grant::All(_) => true,
            Grant::Only(capabilities) => capabilities.contains(&capability),
        }
    }

    /// Parse the `permissions` field of a setPermission payload
    pub fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::String(s) if s == "*" => Ok(Grant::All(Wildcard)),
            Value::Array(items) => {
                let mut capabilities = Vec::new();
                let mut invalid = Vec::new();
                for item in items {
                    match item.as_str().and_then(Capability::parse) {
                        Some(capability) if !capabilities.contains(&capability) => capabilities.push(capability),
                        Some(_) => {}
                        None => invalid.push(item.to_string()),
                    }
                }
                if !invalid.is_empty() {
                    return Err(MpdbError::validation(format!(
                        "Invalid permissions: {}",
                        invalid.join(", ")
                    )));
                }
                capabilities.sort();
                Ok(Grant::Only(capabilities))
            }
            _ => Err(MpdbError::validation(
                "Permissions must be \"*\" or an array of read, write, delete",
            )),
        }
    }
}

/// Databases a user may touch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DatabaseAccess {
    All(Wildcard),
    Only(BTreeMap<String, Grant>),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionRecord {
    pub role: Role,
    pub databases: DatabaseAccess,
}

impl PermissionRecord {
    pub fn user() -> Self {
        Self {
            role: Role::User,
            databases: DatabaseAccess::Only(BTreeMap::new()),
        }
    }

    pub fn admin() -> Self {
        Self {
            role: Role::Admin,
            databases: DatabaseAccess::All(Wildcard),
        }
    }

    fn bypasses_checks(&self) -> bool {
        self.role == Role::Admin || matches!(self.databases, DatabaseAccess::All(_))
    }
}

// =============================================================================
// Store
// =============================================================================

/// Permission records cached in memory and written through on change
pub struct PermissionStore {
    path: PathBuf,
    records: RwLock<BTreeMap<String, PermissionRecord>>,
}

impl PermissionStore {
    /// Load the permissions file; a missing file is an empty store
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let records = match fs::read(&path) {
            Ok(bytes) if bytes.iter().all(u8::is_ascii_whitespace) => BTreeMap::new(),
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|e| {
                MpdbError::Config(format!("Unreadable permissions file {}: {}", path.display(), e))
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e.into()),
        };

        Ok(Self {
            path,
            records: RwLock::new(records),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self, user_id: &str) -> Option<PermissionRecord> {
        self.records.read().get(user_id).cloned()
    }

    pub fn is_admin(&self, user_id: &str) -> bool {
        self.records
            .read()
            .get(user_id)
            .map_or(false, |record| record.role == Role::Admin)
    }

    /// Write `record` for `user_id`, replacing any existing one
    pub fn insert(&self, user_id: &str, record: PermissionRecord) -> Result<()> {
        let mut records = self.records.write();
        records.insert(user_id.to_string(), record);
        self.persist(&records)
    }

    /// Grant `grant` on `database` (`"*"` for every database)
    pub fn set_permission(&self, user_id: &str, database: &str, grant: Grant) -> Result<()> {
        let mut records = self.records.write();
        let record = records
            .entry(user_id.to_string())
            .or_insert_with(PermissionRecord::user);

        if database == "*" {
            record.databases = DatabaseAccess::All(Wildcard);
        } else {
            if let DatabaseAccess::All(_) = record.databases {
                record.databases = DatabaseAccess::Only(BTreeMap::new());
            }
            if let DatabaseAccess::Only(grants) = &mut record.databases {
                grants.insert(database.to_string(), grant);
            }
        }
        self.persist(&records)
    }

    /// Check that `user_id` may run `kind` against every target
    pub fn authorize(
        &self,
        user_id: &str,
        kind: CommandType,
        targets: &[ResourceId],
        storage: &dyn StorageBackend,
    ) -> Result<()> {
        let records = self.records.read();
        let record = records.get(user_id).ok_or_else(denied)?;
        if record.bypasses_checks() {
            return Ok(());
        }
        let Some(required) = Capability::required_for(kind) else {
            return Ok(());
        };
        let DatabaseAccess::Only(grants) = &record.databases else {
            return Ok(());
        };

        for target in targets {
            let database = target.database_name().ok_or_else(denied)?;
            if kind == CommandType::Create && !storage.exists(database, None) {
                continue;
            }
            let allowed = grants
                .get(database)
                .map_or(false, |grant| grant.allows(required));
            if !allowed {
                tracing::debug!("User {} lacks {:?} on {}", user_id, required, database);
                return Err(denied());
            }
        }
        Ok(())
    }

    fn persist(&self, records: &BTreeMap<String, PermissionRecord>) -> Result<()> {
        let json = serde_json::to_string_pretty(records)?;
        let tmp = self.path.with_extension("cf.tmp");
        fs::write(&tmp, json)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

fn denied() -> MpdbError {
    MpdbError::PermissionDenied("Insufficient permissions".to_string())
}
