//! User accounts
//!
//! Persisted as one line per user:
//!
//! ```text
//! id|username|email|sha256(password) hex
//! ```
//!
//! Ids are base-36 millisecond timestamps.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::Utc;
use parking_lot::RwLock;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use crate::error::{MpdbError, Result};

/// Field separator of the users file
const SEPARATOR: char = '|';

/// An authenticated user, attached to a session after login
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: String,
    pub username: String,
}

#[derive(Debug, Clone)]
struct UserRecord {
    id: String,
    username: String,
    email: String,
    password_hash: String,
}

impl UserRecord {
    fn parse(line: &str) -> Option<Self> {
        let mut fields = line.split(SEPARATOR);
        let record = Self {
            id: fields.next()?.to_string(),
            username: fields.next()?.to_string(),
            email: fields.next()?.to_string(),
            password_hash: fields.next()?.to_string(),
        };
        if record.id.is_empty() || record.username.is_empty() {
            return None;
        }
        Some(record)
    }

    fn to_line(&self) -> String {
        format!(
            "{}{sep}{}{sep}{}{sep}{}\n",
            self.id,
            self.username,
            self.email,
            self.password_hash,
            sep = SEPARATOR
        )
    }

    fn identity(&self) -> Identity {
        Identity {
            user_id: self.id.clone(),
            username: self.username.clone(),
        }
    }
}

/// Credential store backed by the users file
pub struct UserStore {
    path: PathBuf,
    users: RwLock<Vec<UserRecord>>,
}

impl UserStore {
    /// Load the users file; a missing file is an empty store
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let users = match fs::read_to_string(&path) {
            Ok(content) => content
                .lines()
                .filter(|line| !line.trim().is_empty())
                .filter_map(|line| {
                    let record = UserRecord::parse(line);
                    if record.is_none() {
                        tracing::warn!("Skipping malformed line in {}", path.display());
                    }
                    record
                })
                .collect(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(e.into()),
        };

        tracing::debug!("Loaded {} users from {}", users.len(), path.display());
        Ok(Self {
            path,
            users: RwLock::new(users),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Add a user. Username and email (when given) must be unused.
    pub fn register(&self, username: &str, password: &str, email: Option<&str>) -> Result<Identity> {
        validate_field("username", username)?;
        if password.is_empty() {
            return Err(MpdbError::validation("Password must not be empty"));
        }
        let email = email.unwrap_or_default();
        if !email.is_empty() {
            validate_field("email", email)?;
        }

        let mut users = self.users.write();
        let taken = users
            .iter()
            .any(|user| user.username == username || (!email.is_empty() && user.email == email));
        if taken {
            return Err(MpdbError::Conflict("User already exists".to_string()));
        }

        let record = UserRecord {
            id: next_user_id(&users),
            username: username.to_string(),
            email: email.to_string(),
            password_hash: hash_password(password),
        };

        let mut file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        file.write_all(record.to_line().as_bytes())?;
        file.sync_all()?;

        let identity = record.identity();
        users.push(record);
        tracing::info!("Registered user {} ({})", identity.username, identity.user_id);
        Ok(identity)
    }

    /// Resolve credentials to an identity
    pub fn login(&self, username: &str, password: &str) -> Result<Identity> {
        let digest = hash_password(password);
        self.users
            .read()
            .iter()
            .find(|user| user.username == username && digests_match(&user.password_hash, &digest))
            .map(UserRecord::identity)
            .ok_or(MpdbError::InvalidCredentials)
    }

    pub fn find(&self, username: &str) -> Option<Identity> {
        self.users
            .read()
            .iter()
            .find(|user| user.username == username)
            .map(UserRecord::identity)
    }

    pub fn find_by_id(&self, user_id: &str) -> Option<Identity> {
        self.users
            .read()
            .iter()
            .find(|user| user.id == user_id)
            .map(UserRecord::identity)
    }

    pub fn len(&self) -> usize {
        self.users.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Lowercase hex SHA-256 of the password
pub fn hash_password(password: &str) -> String {
    hex::encode(Sha256::digest(password.as_bytes()))
}

/// Constant-time digest comparison
fn digests_match(stored: &str, presented: &str) -> bool {
    stored.as_bytes().ct_eq(presented.as_bytes()).into()
}

/// Base-36 millisecond timestamp, bumped past any id already taken
fn next_user_id(users: &[UserRecord]) -> String {
    let mut millis = Utc::now().timestamp_millis().max(0) as u64;
    loop {
        let id = to_base36(millis);
        if users.iter().all(|user| user.id != id) {
            return id;
        }
        millis += 1;
    }
}

fn to_base36(mut value: u64) -> String {
    const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if value == 0 {
        return "0".to_string();
    }
    let mut out = Vec::new();
    while value > 0 {
        out.push(DIGITS[(value % 36) as usize]);
        value /= 36;
    }
    out.reverse();
    String::from_utf8_lossy(&out).into_owned()
}

fn validate_field(kind: &str, value: &str) -> Result<()> {
    if value.is_empty() {
        return Err(MpdbError::validation(format!("{} must not be empty", kind)));
    }
    if value.contains(SEPARATOR) || value.contains('\n') || value.contains('\r') {
        return Err(MpdbError::validation(format!(
            "{} must not contain '{}' or line breaks",
            kind, SEPARATOR
        )));
    }
    Ok(())
}
