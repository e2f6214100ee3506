//! Create
//!
//! Databases and collections are upserted, every document value becomes a
//! new document under a fresh id. Document keys only label the payload.

use serde_json::{json, Value};

use crate::error::Result;
use crate::protocol::{status, CollectionNode, CommandType, DatabaseNode, PayloadTree, Response};
use crate::storage::{CreateOutcome, Document, StorageBackend};

use super::{unsupported, Progress};

const KIND: CommandType = CommandType::Create;

/// One storage call
enum Step<'a> {
    Database(&'a str),
    Collection(&'a str, &'a str),
    Document(&'a str, &'a str, &'a Document),
}

#[derive(Debug, Default)]
struct Created {
    databases: usize,
    collections: usize,
    documents: usize,
    ids: Vec<String>,
}

impl Created {
    fn add(&mut self, outcome: CreateOutcome) {
        self.databases += usize::from(outcome.database_created);
        self.collections += usize::from(outcome.collection_created);
        if let Some(id) = outcome.document_id {
            self.documents += 1;
            self.ids.push(id);
        }
    }
}

pub(super) fn execute(tree: &PayloadTree, storage: &dyn StorageBackend) -> Result<Response> {
    let steps = plan(tree)?;
    let mut progress = Progress::default();
    let mut created = Created::default();

    for step in steps {
        let (what, result) = match step {
            Step::Database(db) => (db.to_string(), storage.create(db, None, None)),
            Step::Collection(db, col) => (format!("{}/{}", db, col), storage.create(db, Some(col), None)),
            Step::Document(db, col, doc) => (
                format!("document in {}/{}", db, col),
                storage.create(db, Some(col), Some(doc.clone())),
            ),
        };
        if let Some(outcome) = progress.record(&format!("create {}", what), result) {
            created.add(outcome);
        }
    }

    if created.ids.is_empty() && created.databases + created.collections == 0 {
        if let Some(e) = progress.first_error {
            return Err(e);
        }
    }

    let message = format!(
        "Successfully created {} databases, {} collections, {} documents",
        created.databases, created.collections, created.documents
    );
    let mut data = json!({
        "databases": created.databases,
        "collections": created.collections,
        "documents": created.documents,
        "ids": created.ids,
    });
    if progress.failed > 0 {
        data["failed"] = Value::from(progress.failed);
    }
    Ok(Response::new(status::OK, KIND, message).with_data(data))
}

/// Validate the whole payload before touching storage
fn plan(tree: &PayloadTree) -> Result<Vec<Step<'_>>> {
    let mut steps = Vec::new();
    for node in &tree.nodes {
        match node {
            DatabaseNode::Whole(db) => steps.push(Step::Database(db)),
            DatabaseNode::Rename { .. } => return Err(unsupported(KIND, "renames")),
            DatabaseNode::Filter(_) => return Err(unsupported(KIND, "name filters")),
            DatabaseNode::Collections { database, nodes } => {
                for node in nodes {
                    match node {
                        CollectionNode::Whole(col) => steps.push(Step::Collection(database, col)),
                        CollectionNode::Documents { collection, entries } => {
                            for entry in entries {
                                let doc = match (&entry.value, entry.renamed) {
                                    (Value::Object(doc), false) => doc,
                                    _ => return Err(unsupported(KIND, "non-object documents")),
                                };
                                steps.push(Step::Document(database, collection, doc));
                            }
                        }
                        CollectionNode::Rename { .. } => return Err(unsupported(KIND, "renames")),
                        _ => return Err(unsupported(KIND, "queries")),
                    }
                }
            }
        }
    }
    Ok(steps)
}
