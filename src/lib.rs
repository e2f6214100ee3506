//! # MPDB
//!
//! A lightweight document store daemon with:
//! - Filesystem storage (database → collection → document JSON files)
//! - A single nested-object command payload with rename, filter, operator
//!   and pattern markers
//! - Deadlock-free hierarchical resource locking across connections
//! - Per-connection FIFO ordering, login and per-database permissions
//! - TCP-based client protocol
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      TCP Server                              │
//! │                  (Multiple Clients)                          │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │ (verb, payload)
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                    Coordinator                               │
//! │   session FIFO → auth/permissions → sorted resource locks    │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//!          ┌────────────┴────────────┐
//!          │                         │
//!          ▼                         ▼
//!   ┌─────────────┐          ┌─────────────┐
//!   │  Commands   │─────────▶│   Storage   │
//!   │ (typed tree)│          │ (JSON files)│
//!   └─────────────┘          └─────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod storage;
pub mod protocol;
pub mod command;
pub mod auth;
pub mod coordinator;
pub mod network;
pub mod engine;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{MpdbError, Result};
pub use config::Config;
pub use engine::Engine;

// =============================================================================
// Version Info
// =============================================================================

/// Current version of MPDB
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
