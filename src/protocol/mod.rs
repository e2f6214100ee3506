//! Protocol Module
//!
//! Defines the wire protocol for client-server communication and the typed
//! form of the nested data-command payload.
//!
//! ## Protocol Format (Length-prefixed Frames)
//!
//! ### Request Format
//! ```text
//! ┌──────────┬──────────┬─────────────────────────────┐
//! │ Verb (1) │ Len (4)  │         Body                │
//! └──────────┴──────────┴─────────────────────────────┘
//! ```
//!
//! ### Verbs
//! - 0x01 create, 0x02 read, 0x03 update, 0x04 delete, 0x05 search, 0x06 list
//! - 0x10 login, 0x11 register, 0x12 setPermission
//! - 0x20 export (JSON selector), 0x21 import (newline-delimited JSON)
//!
//! ### Events
//! - 0x01 response: `{response, type?, message, data?|results?}`
//! - 0x02 export: raw JSON buffer
//! - 0x03 shutdown: empty

mod codec;
mod command;
mod payload;
mod resource;
mod response;

pub use codec::{
    decode_frame, decode_request, encode_frame, encode_request, read_frame, read_request, write_frame,
    write_request, HEADER_SIZE, MAX_PAYLOAD_SIZE,
};
pub use command::{CommandType, Request};
pub use payload::{
    CollectionNode, DatabaseNode, DocumentEntry, NameFilter, Page, PayloadTree, SearchEnvelope, COLLECTION_KEY,
    DEFAULT_PAGE_LIMIT, DEFAULT_PAGE_NUMBER, DOCUMENTS_KEY, FIELD_KEY, RENAME_MARKER,
};
pub use resource::{lock_plan, Access, Resource, ResourceId};
pub use response::{status, Event, Frame, Response};
