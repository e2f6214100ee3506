//! Storage Module
//!
//! Filesystem-backed persistence for databases, collections and documents.
//!
//! ## Responsibilities
//! - Upsert-create of databases and collections, create-new of documents
//! - Level-specific reads, renames, merges and deletes
//! - Listing and the small match/query language (literal, `$eq`/`$ne`,
//!   comparison operators, case-insensitive patterns)
//! - Collision-resistant document id generation
//!
//! ## On-disk Layout
//! ```text
//! {root}/
//!   ├── {database}/
//!   │     ├── {collection}/
//!   │     │     ├── {id}.json      (document + _id + _createdAt)
//!   │     │     └── ...
//!   │     └── ...
//!   └── ...
//! ```
//!
//! Everything the command layer needs goes through [`StorageBackend`]; the
//! matching helpers are provided methods built on `list`, so any backend
//! that implements the primitives gets the query language for free.

mod filesystem;
mod id;
mod matcher;

use serde_json::{Map, Value};

use crate::error::{MpdbError, Result};

pub use filesystem::{validate_name, FsStorage};
pub use id::{generate_id, is_document_id, ID_LENGTH};
pub use matcher::{build_regex, matches_query, values_equal, Comparator, NamePattern, OperatorQuery, RegexQuery};

/// A stored document: arbitrary fields plus the injected id/timestamp
pub type Document = Map<String, Value>;

/// Field holding the system-assigned document id
pub const ID_FIELD: &str = "_id";

/// Field holding the creation timestamp (RFC 3339)
pub const CREATED_AT_FIELD: &str = "_createdAt";

// =============================================================================
// Operation Outcomes
// =============================================================================

/// What a `create` call newly made
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CreateOutcome {
    pub database_created: bool,
    pub collection_created: bool,
    /// Id assigned to the new document, if one was supplied
    pub document_id: Option<String>,
}

impl CreateOutcome {
    /// Names of the levels that were newly created
    pub fn created(&self) -> Vec<&'static str> {
        let mut created = Vec::new();
        if self.database_created {
            created.push("database");
        }
        if self.collection_created {
            created.push("collection");
        }
        if self.document_id.is_some() {
            created.push("document");
        }
        created
    }
}

/// Parents removed because a delete emptied them
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeleteOutcome {
    pub pruned_collection: bool,
    pub pruned_database: bool,
}

/// Result of the arity-overloaded `update`
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateOutcome {
    RenamedDatabase { from: String, to: String },
    RenamedCollection { database: String, from: String, to: String },
    Merged(Document),
}

/// Result of `list`, shaped by how many path segments were given
#[derive(Debug, Clone, PartialEq)]
pub enum Listing {
    Databases(Vec<String>),
    Collections(Vec<String>),
    Documents(Vec<Document>),
}

impl Listing {
    pub fn len(&self) -> usize {
        match self {
            Listing::Databases(names) | Listing::Collections(names) => names.len(),
            Listing::Documents(docs) => docs.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// JSON array form used in responses
    pub fn into_value(self) -> Value {
        match self {
            Listing::Databases(names) | Listing::Collections(names) => {
                Value::Array(names.into_iter().map(Value::String).collect())
            }
            Listing::Documents(docs) => Value::Array(docs.into_iter().map(Value::Object).collect()),
        }
    }
}

/// Path-shaped selector for `export`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExportSelector {
    pub database: Option<String>,
    pub collection: Option<String>,
    pub document: Option<String>,
}

// =============================================================================
// Backend Trait
// =============================================================================

/// Storage primitives the command layer depends on
pub trait StorageBackend: Send + Sync {
    /// Upsert the database and collection, then create `document` (if any)
    /// under a fresh id. A document without a collection is rejected.
    fn create(
        &self,
        database: &str,
        collection: Option<&str>,
        document: Option<Document>,
    ) -> Result<CreateOutcome>;

    /// Read one document; fails with the NotFound of the first missing level
    fn read(&self, database: &str, collection: &str, doc_id: &str) -> Result<Document>;

    fn rename_database(&self, from: &str, to: &str) -> Result<()>;

    fn rename_collection(&self, database: &str, from: &str, to: &str) -> Result<()>;

    /// Shallow-merge `patch` over the stored document (patch wins)
    fn merge_document(
        &self,
        database: &str,
        collection: &str,
        doc_id: &str,
        patch: &Document,
    ) -> Result<Document>;

    /// Delete exactly one of database, collection or document, pruning
    /// parents the delete leaves empty
    fn delete(
        &self,
        database: &str,
        collection: Option<&str>,
        doc_id: Option<&str>,
    ) -> Result<DeleteOutcome>;

    /// List databases, collections or documents. Missing paths list as empty.
    fn list(&self, database: Option<&str>, collection: Option<&str>) -> Result<Listing>;

    /// True if the database (and collection, when given) exists
    fn exists(&self, database: &str, collection: Option<&str>) -> bool;

    /// Nested JSON object of the selected subtree
    fn export(&self, selector: &ExportSelector) -> Result<Value>;

    // =========================================================================
    // Provided: arity dispatch
    // =========================================================================

    /// `(name, db)` renames a database, `(name, db, col)` renames a
    /// collection, `(patch, db, col, id)` merges into a document.
    fn update(
        &self,
        new_value: &Value,
        database: &str,
        collection: Option<&str>,
        doc_id: Option<&str>,
    ) -> Result<UpdateOutcome> {
        match (collection, doc_id) {
            (None, None) => {
                let to = new_name(new_value)?;
                self.rename_database(database, to)?;
                Ok(UpdateOutcome::RenamedDatabase {
                    from: database.to_string(),
                    to: to.to_string(),
                })
            }
            (Some(collection), None) => {
                let to = new_name(new_value)?;
                self.rename_collection(database, collection, to)?;
                Ok(UpdateOutcome::RenamedCollection {
                    database: database.to_string(),
                    from: collection.to_string(),
                    to: to.to_string(),
                })
            }
            (Some(collection), Some(doc_id)) => {
                let patch = new_value
                    .as_object()
                    .ok_or_else(|| MpdbError::validation("Document patch must be an object"))?;
                let merged = self.merge_document(database, collection, doc_id, patch)?;
                Ok(UpdateOutcome::Merged(merged))
            }
            (None, Some(_)) => Err(MpdbError::validation(
                "Collection name and document ID required",
            )),
        }
    }

    // =========================================================================
    // Provided: listing shortcuts
    // =========================================================================

    fn list_databases(&self) -> Result<Vec<String>> {
        match self.list(None, None)? {
            Listing::Databases(names) => Ok(names),
            other => Err(unexpected_listing(&other)),
        }
    }

    fn list_collections(&self, database: &str) -> Result<Vec<String>> {
        match self.list(Some(database), None)? {
            Listing::Collections(names) => Ok(names),
            other => Err(unexpected_listing(&other)),
        }
    }

    fn list_documents(&self, database: &str, collection: &str) -> Result<Vec<Document>> {
        match self.list(Some(database), Some(collection))? {
            Listing::Documents(docs) => Ok(docs),
            other => Err(unexpected_listing(&other)),
        }
    }

    // =========================================================================
    // Provided: query helpers
    // =========================================================================

    /// Documents matching every field of `query` (empty query matches all).
    /// Unlike `list`, a missing collection is an error.
    fn search(&self, database: &str, collection: &str, query: &Document) -> Result<Vec<Document>> {
        if !self.exists(database, Some(collection)) {
            return Err(MpdbError::CollectionNotFound {
                database: database.to_string(),
                collection: collection.to_string(),
            });
        }
        let docs = self.list_documents(database, collection)?;
        Ok(docs.into_iter().filter(|doc| matches_query(doc, query)).collect())
    }

    /// Database names satisfying an `==` / `!=` test against `value`
    fn filter_databases_by_op(&self, op: Comparator, value: &str) -> Result<Vec<String>> {
        let op = op.require_equality()?;
        Ok(self
            .list_databases()?
            .into_iter()
            .filter(|name| op.matches_name(name, value))
            .collect())
    }

    /// Collection names in `database` satisfying an `==` / `!=` test
    fn filter_collections_by_op(&self, database: &str, op: Comparator, value: &str) -> Result<Vec<String>> {
        let op = op.require_equality()?;
        Ok(self
            .list_collections(database)?
            .into_iter()
            .filter(|name| op.matches_name(name, value))
            .collect())
    }

    /// Collection names in `database` matching a pattern; an invalid
    /// pattern falls back to exact name equality
    fn matching_collections(&self, database: &str, pattern: &str) -> Result<Vec<String>> {
        let pattern = NamePattern::compile(pattern);
        Ok(self
            .list_collections(database)?
            .into_iter()
            .filter(|name| pattern.is_match(name))
            .collect())
    }

    /// Documents whose string `field` matches `pattern`
    fn matching_documents(
        &self,
        database: &str,
        collection: &str,
        pattern: &str,
        field: &str,
    ) -> Result<Vec<Document>> {
        let Some(regex) = build_regex(pattern) else {
            tracing::warn!("Invalid pattern '{}', no documents matched", pattern);
            return Ok(Vec::new());
        };
        Ok(self
            .list_documents(database, collection)?
            .into_iter()
            .filter(|doc| {
                doc.get(field)
                    .and_then(Value::as_str)
                    .map_or(false, |target| regex.is_match(target))
            })
            .collect())
    }

    /// Documents whose `field` matches any of the query's patterns. A query
    /// without patterns returns the whole collection.
    fn search_by_regex(&self, database: &str, collection: &str, query: &RegexQuery) -> Result<Vec<Document>> {
        if query.patterns.is_empty() {
            return self.search(database, collection, &Document::new());
        }
        let regexes: Vec<_> = query
            .patterns
            .iter()
            .filter_map(|pattern| {
                let regex = build_regex(pattern);
                if regex.is_none() {
                    tracing::warn!("Invalid pattern '{}' skipped", pattern);
                }
                regex
            })
            .collect();
        Ok(self
            .list_documents(database, collection)?
            .into_iter()
            .filter(|doc| {
                doc.get(&query.field)
                    .and_then(Value::as_str)
                    .map_or(false, |target| regexes.iter().any(|re| re.is_match(target)))
            })
            .collect())
    }

    /// Documents where `field <op> value` holds
    fn documents_by_operator(
        &self,
        database: &str,
        collection: &str,
        query: &OperatorQuery,
    ) -> Result<Vec<Document>> {
        Ok(self
            .list_documents(database, collection)?
            .into_iter()
            .filter(|doc| query.matches(doc))
            .collect())
    }
}

fn new_name(value: &Value) -> Result<&str> {
    value
        .as_str()
        .ok_or_else(|| MpdbError::validation("New name must be a string"))
}

fn unexpected_listing(listing: &Listing) -> MpdbError {
    MpdbError::Io(std::io::Error::new(
        std::io::ErrorKind::Other,
        format!("backend returned a listing of the wrong level ({} entries)", listing.len()),
    ))
}
