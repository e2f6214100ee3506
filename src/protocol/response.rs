//! Response definitions
//!
//! Represents what the daemon sends back to clients.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::MpdbError;

use super::CommandType;

/// Status codes carried in the `response` field
pub mod status {
    pub const OK: u16 = 200;
    pub const BAD_REQUEST: u16 = 400;
    pub const UNAUTHORIZED: u16 = 401;
    pub const FORBIDDEN: u16 = 403;
    pub const NOT_FOUND: u16 = 404;
    pub const CONFLICT: u16 = 409;
    pub const INTERNAL_ERROR: u16 = 500;
}

/// A response to send to a client
///
/// Create/Read/Update/Delete/List answer in `data`, Search in `results`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    /// Status code
    pub response: u16,

    /// Echo of the command type (absent for auth and error responses)
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<CommandType>,

    pub message: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub results: Option<Value>,
}

impl Response {
    /// Response echoing a command type
    pub fn new(code: u16, kind: CommandType, message: impl Into<String>) -> Self {
        Self {
            response: code,
            kind: Some(kind),
            message: message.into(),
            data: None,
            results: None,
        }
    }

    /// Bare `{response, message}` response
    pub fn status(code: u16, message: impl Into<String>) -> Self {
        Self {
            response: code,
            kind: None,
            message: message.into(),
            data: None,
            results: None,
        }
    }

    /// Error response produced at the coordinator boundary
    pub fn from_error(error: &MpdbError) -> Self {
        let code = error.status_code();
        let message = if code == status::INTERNAL_ERROR {
            "Command execution failed".to_string()
        } else {
            error.to_string()
        };
        Self::status(code, message)
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn with_results(mut self, results: Value) -> Self {
        self.results = Some(results);
        self
    }

    pub fn is_success(&self) -> bool {
        self.response == status::OK
    }
}

/// Outbound event types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Event {
    Response = 0x01,
    Export = 0x02,
    Shutdown = 0x03,
}

/// One outbound frame
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Response(Response),

    /// JSON buffer produced by `export`
    Export(Bytes),

    /// The server is going away
    Shutdown,
}

impl Frame {
    pub fn event(&self) -> Event {
        match self {
            Frame::Response(_) => Event::Response,
            Frame::Export(_) => Event::Export,
            Frame::Shutdown => Event::Shutdown,
        }
    }

    /// The response, if this is a response frame
    pub fn response(&self) -> Option<&Response> {
        match self {
            Frame::Response(response) => Some(response),
            _ => None,
        }
    }

    pub fn into_response(self) -> Option<Response> {
        match self {
            Frame::Response(response) => Some(response),
            _ => None,
        }
    }
}
