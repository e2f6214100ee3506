//! Update
//!
//! Renames databases and collections (`"old#ref": "new"` or `old: "new"`)
//! and shallow-merges patches into documents (`"id#ref": {...}` or
//! `id: {...}`). Missing targets are skipped.

use serde_json::{json, Value};

use crate::error::Result;
use crate::protocol::{status, CollectionNode, CommandType, DatabaseNode, PayloadTree, Response};
use crate::storage::{StorageBackend, UpdateOutcome};

use super::{unsupported, Progress};

const KIND: CommandType = CommandType::Update;

/// Arguments of one `StorageBackend::update` call
struct Step<'a> {
    value: Value,
    database: &'a str,
    collection: Option<&'a str>,
    doc_id: Option<&'a str>,
}

pub(super) fn execute(tree: &PayloadTree, storage: &dyn StorageBackend) -> Result<Response> {
    let steps = plan(tree)?;
    let mut progress = Progress::skipping_missing();
    let (mut databases, mut collections, mut documents) = (0usize, 0usize, 0usize);

    for step in &steps {
        let what = format!(
            "update {}{}{}",
            step.database,
            step.collection.map(|c| format!("/{}", c)).unwrap_or_default(),
            step.doc_id.map(|d| format!("/{}", d)).unwrap_or_default()
        );
        let result = storage.update(&step.value, step.database, step.collection, step.doc_id);
        match progress.record(&what, result) {
            Some(UpdateOutcome::RenamedDatabase { .. }) => databases += 1,
            Some(UpdateOutcome::RenamedCollection { .. }) => collections += 1,
            Some(UpdateOutcome::Merged(_)) => documents += 1,
            None => {}
        }
    }

    let total = databases + collections + documents;
    let failed = progress.failed;
    progress.finish(KIND, total, || {
        let mut data = json!({
            "databases": databases,
            "collections": collections,
            "documents": documents,
        });
        if failed > 0 {
            data["failed"] = Value::from(failed);
        }
        Response::new(status::OK, KIND, format!("Successfully updated {} records", total)).with_data(data)
    })
}

fn plan(tree: &PayloadTree) -> Result<Vec<Step<'_>>> {
    let mut steps = Vec::new();
    for node in &tree.nodes {
        match node {
            DatabaseNode::Rename { from, to } => steps.push(Step {
                value: Value::String(to.clone()),
                database: from,
                collection: None,
                doc_id: None,
            }),
            DatabaseNode::Collections { database, nodes } => {
                for node in nodes {
                    match node {
                        CollectionNode::Rename { from, to } => steps.push(Step {
                            value: Value::String(to.clone()),
                            database,
                            collection: Some(from.as_str()),
                            doc_id: None,
                        }),
                        CollectionNode::Documents { collection, entries } => {
                            for entry in entries {
                                if !entry.value.is_object() {
                                    return Err(unsupported(KIND, "non-object document patches"));
                                }
                                steps.push(Step {
                                    value: entry.value.clone(),
                                    database,
                                    collection: Some(collection.as_str()),
                                    doc_id: Some(entry.key.as_str()),
                                });
                            }
                        }
                        _ => return Err(unsupported(KIND, "selectors without a new value")),
                    }
                }
            }
            _ => return Err(unsupported(KIND, "selectors without a new value")),
        }
    }
    Ok(steps)
}
