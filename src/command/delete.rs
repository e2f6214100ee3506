//! Delete
//!
//! Dispatches on the payload shape:
//! - a lone `==`/`!=` key deletes matching databases
//! - a database value that is a lone `==`/`!=` key deletes matching collections
//! - `{collectionKey, docsObj}` deletes pattern-matched collections, or the
//!   pattern-matched documents inside them
//! - `{$field, <op>: value}` and `{$field, "<pattern>": {}}` delete the
//!   matching documents
//! - otherwise each named document, or the whole collection/database for `{}`

use serde_json::{json, Value};

use crate::error::{MpdbError, Result};
use crate::protocol::{status, CollectionNode, CommandType, DatabaseNode, PayloadTree, Response};
use crate::storage::{Document, StorageBackend, ID_FIELD};

use super::{unsupported, Progress};

const KIND: CommandType = CommandType::Delete;

#[derive(Debug, Default)]
struct Deleted {
    databases: usize,
    collections: usize,
    documents: usize,
}

impl Deleted {
    fn total(&self) -> usize {
        self.databases + self.collections + self.documents
    }
}

struct Deleter<'a> {
    storage: &'a dyn StorageBackend,
    progress: Progress,
    deleted: Deleted,
}

pub(super) fn execute(tree: &PayloadTree, storage: &dyn StorageBackend) -> Result<Response> {
    check(tree)?;

    let mut deleter = Deleter {
        storage,
        progress: Progress::skipping_missing(),
        deleted: Deleted::default(),
    };
    for node in &tree.nodes {
        deleter.database_node(node);
    }

    let Deleter {
        progress, deleted, ..
    } = deleter;
    let total = deleted.total();
    let failed = progress.failed;
    progress.finish(KIND, total, || {
        let mut data = json!({
            "databases": deleted.databases,
            "collections": deleted.collections,
            "documents": deleted.documents,
        });
        if failed > 0 {
            data["failed"] = Value::from(failed);
        }
        let message = format!(
            "Successfully deleted {} databases, {} collections, and {} documents",
            deleted.databases, deleted.collections, deleted.documents
        );
        Response::new(status::OK, KIND, message).with_data(data)
    })
}

/// Reject shapes Delete cannot act on before anything is removed
fn check(tree: &PayloadTree) -> Result<()> {
    for node in &tree.nodes {
        match node {
            DatabaseNode::Rename { .. } => return Err(unsupported(KIND, "renames")),
            DatabaseNode::Collections { nodes, .. } => {
                if nodes
                    .iter()
                    .any(|node| matches!(node, CollectionNode::Rename { .. }))
                {
                    return Err(unsupported(KIND, "renames"));
                }
            }
            DatabaseNode::Whole(_) | DatabaseNode::Filter(_) => {}
        }
    }
    Ok(())
}

impl Deleter<'_> {
    fn database_node(&mut self, node: &DatabaseNode) {
        match node {
            DatabaseNode::Whole(db) => self.database(db),
            DatabaseNode::Filter(filter) => {
                let result = self.storage.filter_databases_by_op(filter.op, &filter.value);
                let what = format!("filter databases {} {}", filter.op.symbol(), filter.value);
                for db in self.progress.record(&what, result).unwrap_or_default() {
                    self.database(&db);
                }
            }
            DatabaseNode::Collections { database, nodes } => {
                for node in nodes {
                    self.collection_node(database, node);
                }
            }
            DatabaseNode::Rename { .. } => {}
        }
    }

    fn collection_node(&mut self, db: &str, node: &CollectionNode) {
        match node {
            CollectionNode::Whole(col) => self.collection(db, col),
            CollectionNode::Filter(filter) => {
                let result = self.storage.filter_collections_by_op(db, filter.op, &filter.value);
                let what = format!("filter collections of {}", db);
                for col in self.progress.record(&what, result).unwrap_or_default() {
                    self.collection(db, &col);
                }
            }
            CollectionNode::Pattern {
                collections,
                documents,
            } => {
                let result = self.storage.matching_collections(db, collections);
                let what = format!("match collections '{}' in {}", collections, db);
                for col in self.progress.record(&what, result).unwrap_or_default() {
                    match documents {
                        Some(query) if !query.patterns.is_empty() => {
                            for pattern in &query.patterns {
                                let result = self.storage.matching_documents(db, &col, pattern, &query.field);
                                let docs = self
                                    .progress
                                    .record(&format!("match documents in {}/{}", db, col), result)
                                    .unwrap_or_default();
                                self.documents(db, &col, docs);
                            }
                        }
                        _ => self.collection(db, &col),
                    }
                }
            }
            CollectionNode::Operator { collection, query } => {
                let result = self.storage.documents_by_operator(db, collection, query);
                let docs = self
                    .progress
                    .record(&format!("query {}/{}", db, collection), result)
                    .unwrap_or_default();
                self.documents(db, collection, docs);
            }
            CollectionNode::Regex { collection, query } => {
                let result = self.storage.search_by_regex(db, collection, query);
                let docs = self
                    .progress
                    .record(&format!("match {}/{}", db, collection), result)
                    .unwrap_or_default();
                self.documents(db, collection, docs);
            }
            CollectionNode::Documents { collection, entries } => {
                for entry in entries {
                    self.document(db, collection, &entry.key);
                }
            }
            CollectionNode::Rename { .. } => {}
        }
    }

    fn database(&mut self, db: &str) {
        let result = self.storage.delete(db, None, None);
        if self.progress.record(&format!("delete {}", db), result).is_some() {
            self.deleted.databases += 1;
        }
    }

    fn collection(&mut self, db: &str, col: &str) {
        let result = self.storage.delete(db, Some(col), None);
        if self
            .progress
            .record(&format!("delete {}/{}", db, col), result)
            .is_some()
        {
            self.deleted.collections += 1;
        }
    }

    fn document(&mut self, db: &str, col: &str, id: &str) {
        let result = self.storage.delete(db, Some(col), Some(id));
        if self
            .progress
            .record(&format!("delete {}/{}/{}", db, col, id), result)
            .is_some()
        {
            self.deleted.documents += 1;
        }
    }

    /// Delete fetched documents by their stored id
    fn documents(&mut self, db: &str, col: &str, docs: Vec<Document>) {
        for doc in docs {
            match doc.get(ID_FIELD).and_then(Value::as_str) {
                Some(id) => self.document(db, col, id),
                None => {
                    let e = MpdbError::validation(format!("Document in {}/{} has no {}", db, col, ID_FIELD));
                    self.progress.record::<()>("delete matched document", Err(e));
                }
            }
        }
    }
}
