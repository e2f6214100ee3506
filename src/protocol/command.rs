//! Command definitions
//!
//! Represents requests from clients.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;

/// Command types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[repr(u8)]
pub enum CommandType {
    Create = 0x01,
    Read = 0x02,
    Update = 0x03,
    Delete = 0x04,
    Search = 0x05,
    List = 0x06,
    Login = 0x10,
    Register = 0x11,
    SetPermission = 0x12,
    Export = 0x20,
    Import = 0x21,
}

impl CommandType {
    pub const ALL: [CommandType; 11] = [
        CommandType::Create,
        CommandType::Read,
        CommandType::Update,
        CommandType::Delete,
        CommandType::Search,
        CommandType::List,
        CommandType::Login,
        CommandType::Register,
        CommandType::SetPermission,
        CommandType::Export,
        CommandType::Import,
    ];

    /// Decode the verb byte of a request frame
    pub fn from_byte(byte: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| *kind as u8 == byte)
    }

    /// Wire name, as echoed in the response `type` field
    pub fn name(&self) -> &'static str {
        match self {
            CommandType::Create => "create",
            CommandType::Read => "read",
            CommandType::Update => "update",
            CommandType::Delete => "delete",
            CommandType::Search => "search",
            CommandType::List => "list",
            CommandType::Login => "login",
            CommandType::Register => "register",
            CommandType::SetPermission => "setPermission",
            CommandType::Export => "export",
            CommandType::Import => "import",
        }
    }

    /// Parse a wire name
    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.name() == name)
    }

    /// Verbs that may run without an authenticated identity
    pub fn is_auth_exempt(&self) -> bool {
        matches!(self, CommandType::Login | CommandType::Register)
    }

    /// Verbs that carry the nested database/collection/document payload
    pub fn is_data_command(&self) -> bool {
        matches!(
            self,
            CommandType::Create
                | CommandType::Read
                | CommandType::Update
                | CommandType::Delete
                | CommandType::Search
                | CommandType::List
        )
    }
}

/// A request as received from the transport: a verb and an undecoded body
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub kind: CommandType,
    pub body: Bytes,
}

impl Request {
    /// Request with a JSON body
    pub fn json(kind: CommandType, payload: &Value) -> Self {
        Self {
            kind,
            body: Bytes::from(payload.to_string()),
        }
    }

    /// Request with a raw body (import buffers)
    pub fn raw(kind: CommandType, body: impl Into<Bytes>) -> Self {
        Self {
            kind,
            body: body.into(),
        }
    }

    /// Decode the body as JSON; an empty body is `{}`
    pub fn payload(&self) -> Result<Value> {
        if self.body.iter().all(u8::is_ascii_whitespace) {
            return Ok(Value::Object(Default::default()));
        }
        Ok(serde_json::from_slice(&self.body)?)
    }
}
