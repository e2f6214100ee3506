//! Document id generation
//!
//! `8 hex (unix seconds) + 6 hex + 4 hex + 6 hex (random)` = 24 hex chars.
//! Not monotonic; collisions within one collection are astronomically
//! unlikely, and the create path still treats one as fatal.

use chrono::Utc;
use rand::Rng;

/// Length of a generated id in characters
pub const ID_LENGTH: usize = 24;

/// Generate a new document id
pub fn generate_id() -> String {
    let seconds = (Utc::now().timestamp() as u64) & 0xFFFF_FFFF;
    let mut rng = rand::thread_rng();
    let machine: u32 = rng.gen_range(0..=0xFF_FFFF);
    let process: u16 = rng.gen();
    let counter: u32 = rng.gen_range(0..=0xFF_FFFF);

    format!("{:08x}{:06x}{:04x}{:06x}", seconds, machine, process, counter)
}

/// True if `id` has the shape of a generated id
pub fn is_document_id(id: &str) -> bool {
    id.len() == ID_LENGTH && id.bytes().all(|b| b.is_ascii_hexdigit() && !b.is_ascii_uppercase())
}
