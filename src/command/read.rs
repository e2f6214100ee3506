//! Read
//!
//! `{ db: { col: { id: {}, ... } } }` reads each named document.

use serde_json::Value;

use crate::error::Result;
use crate::protocol::{status, CollectionNode, CommandType, DatabaseNode, PayloadTree, Response};
use crate::storage::StorageBackend;

use super::{unsupported, Progress};

const KIND: CommandType = CommandType::Read;

pub(super) fn execute(tree: &PayloadTree, storage: &dyn StorageBackend) -> Result<Response> {
    let mut wanted = Vec::new();
    for node in &tree.nodes {
        let DatabaseNode::Collections { database, nodes } = node else {
            return Err(unsupported(KIND, "database-level selectors"));
        };
        for node in nodes {
            let CollectionNode::Documents { collection, entries } = node else {
                return Err(unsupported(KIND, "collection-level selectors"));
            };
            wanted.extend(entries.iter().map(|entry| (database, collection, &entry.key)));
        }
    }

    let mut progress = Progress::default();
    let mut found = Vec::new();
    for (db, col, id) in wanted {
        let result = storage.read(db, col, id);
        if let Some(doc) = progress.record(&format!("read {}/{}/{}", db, col, id), result) {
            found.push(Value::Object(doc));
        }
    }

    let count = found.len();
    progress.finish(KIND, count, || {
        Response::new(status::OK, KIND, format!("Successfully read {} documents", count))
            .with_data(Value::Array(found))
    })
}
