//! Search
//!
//! Mirrors Delete's dispatch, collecting instead of removing. Results are
//! grouped per collection as `{database, collection, documents, count}`;
//! database name filters yield `{database, collections, count}`. Paging
//! slices the list of entries (page 1 of 10 unless the envelope says
//! otherwise); counts and status describe every match.

use std::ops::Range;

use serde_json::{json, Value};

use crate::error::Result;
use crate::protocol::{
    status, CollectionNode, CommandType, DatabaseNode, DocumentEntry, NameFilter, Page, Response, SearchEnvelope,
};
use crate::storage::{Document, RegexQuery, StorageBackend, ID_FIELD};

use super::{not_found, unsupported};

const KIND: CommandType = CommandType::Search;

enum Hit {
    Database { database: String, collections: Vec<String> },
    Collection { database: String, collection: String, documents: Vec<Document> },
}

impl Hit {
    fn into_value(self) -> Value {
        match self {
            Hit::Database { database, collections } => json!({
                "database": database,
                "count": collections.len(),
                "collections": collections,
            }),
            Hit::Collection {
                database,
                collection,
                documents,
            } => json!({
                "database": database,
                "collection": collection,
                "count": documents.len(),
                "documents": documents,
            }),
        }
    }
}

pub(super) fn execute(envelope: &SearchEnvelope, storage: &dyn StorageBackend) -> Result<Response> {
    let mut hits = Vec::new();
    for node in &envelope.tree.nodes {
        match node {
            DatabaseNode::Filter(filter) => database_filter(storage, filter, &mut hits)?,
            DatabaseNode::Whole(db) => {
                for col in storage.list_collections(db)? {
                    let documents = storage.list_documents(db, &col)?;
                    hits.push(collection_hit(db, &col, documents));
                }
            }
            DatabaseNode::Collections { database, nodes } => {
                for node in nodes {
                    collection_node(storage, database, node, &mut hits)?;
                }
            }
            DatabaseNode::Rename { .. } => return Err(unsupported(KIND, "renames")),
        }
    }

    let documents: usize = hits
        .iter()
        .map(|hit| match hit {
            Hit::Collection { documents, .. } => documents.len(),
            Hit::Database { .. } => 0,
        })
        .sum();
    let databases = hits
        .iter()
        .filter(|hit| matches!(hit, Hit::Database { .. }))
        .count();
    let results = Value::Array(
        paginate(hits, envelope.page)
            .into_iter()
            .map(Hit::into_value)
            .collect(),
    );

    if documents == 0 && databases == 0 {
        return Ok(not_found(KIND).with_results(results));
    }
    let message = if databases > 0 {
        format!("Found {} databases and {} documents", databases, documents)
    } else {
        format!("Found {} documents", documents)
    };
    Ok(Response::new(status::OK, KIND, message).with_results(results))
}

fn database_filter(storage: &dyn StorageBackend, filter: &NameFilter, hits: &mut Vec<Hit>) -> Result<()> {
    for database in storage.filter_databases_by_op(filter.op, &filter.value)? {
        let collections = storage.list_collections(&database)?;
        hits.push(Hit::Database {
            database,
            collections,
        });
    }
    Ok(())
}

fn collection_node(
    storage: &dyn StorageBackend,
    db: &str,
    node: &CollectionNode,
    hits: &mut Vec<Hit>,
) -> Result<()> {
    match node {
        CollectionNode::Whole(col) => {
            if storage.exists(db, Some(col.as_str())) {
                hits.push(collection_hit(db, col, storage.list_documents(db, col)?));
            }
        }
        CollectionNode::Filter(filter) => {
            for col in storage.filter_collections_by_op(db, filter.op, &filter.value)? {
                let documents = storage.list_documents(db, &col)?;
                hits.push(collection_hit(db, &col, documents));
            }
        }
        CollectionNode::Pattern {
            collections,
            documents,
        } => {
            for col in storage.matching_collections(db, collections)? {
                let found = match documents {
                    Some(query) if !query.patterns.is_empty() => pattern_documents(storage, db, &col, query)?,
                    _ => storage.list_documents(db, &col)?,
                };
                hits.push(collection_hit(db, &col, found));
            }
        }
        CollectionNode::Operator { collection, query } => {
            if storage.exists(db, Some(collection.as_str())) {
                let found = storage.documents_by_operator(db, collection, query)?;
                hits.push(collection_hit(db, collection, found));
            }
        }
        CollectionNode::Regex { collection, query } => {
            if storage.exists(db, Some(collection.as_str())) {
                let found = storage.search_by_regex(db, collection, query)?;
                hits.push(collection_hit(db, collection, found));
            }
        }
        CollectionNode::Documents { collection, entries } => {
            if storage.exists(db, Some(collection.as_str())) {
                let query = field_query(entries)?;
                let found = storage.search(db, collection, &query)?;
                hits.push(collection_hit(db, collection, found));
            }
        }
        CollectionNode::Rename { .. } => return Err(unsupported(KIND, "renames")),
    }
    Ok(())
}

/// Union of every pattern's matches, in collection order
fn pattern_documents(
    storage: &dyn StorageBackend,
    db: &str,
    col: &str,
    query: &RegexQuery,
) -> Result<Vec<Document>> {
    let mut found: Vec<Document> = Vec::new();
    for pattern in &query.patterns {
        for doc in storage.matching_documents(db, col, pattern, &query.field)? {
            let seen = found
                .iter()
                .any(|existing| existing.get(ID_FIELD).is_some() && existing.get(ID_FIELD) == doc.get(ID_FIELD));
            if !seen {
                found.push(doc);
            }
        }
    }
    Ok(found)
}

/// Document-level entries of a search are `field: literal` or
/// `field: {$eq|$ne: value}` conditions
fn field_query(entries: &[DocumentEntry]) -> Result<Document> {
    let mut query = Document::new();
    for entry in entries {
        if entry.renamed {
            return Err(unsupported(KIND, "renames"));
        }
        query.insert(entry.key.clone(), entry.value.clone());
    }
    Ok(query)
}

fn collection_hit(db: &str, col: &str, documents: Vec<Document>) -> Hit {
    Hit::Collection {
        database: db.to_string(),
        collection: col.to_string(),
        documents,
    }
}

/// Keep one page of the result entries
fn paginate(hits: Vec<Hit>, page: Page) -> Vec<Hit> {
    let Range { start, end } = page.bounds();
    hits.into_iter().skip(start).take(end - start).collect()
}
