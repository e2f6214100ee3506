//! Typed payload tree
//!
//! Every data command carries the same nested object:
//!
//! ```text
//! { db: { collection: { docKey: {...fields}, ... }, ... }, ... }
//! ```
//!
//! Markers change what a node means. `old#ref` keys and bare string values
//! are renames, a lone `==`/`!=` key is a name filter, `$field` plus one
//! comparator is an operator query, `$field` plus pattern keys is a regex
//! query and `{collectionKey, docsObj}` selects collections (and documents)
//! by pattern. The payload is parsed into a [`PayloadTree`] once; commands
//! and resource extraction both work from the tree.

use std::ops::Range;

use serde_json::{Map, Value};

use crate::error::{MpdbError, Result};
use crate::storage::{validate_name, Comparator, OperatorQuery, RegexQuery};

use super::resource::ResourceId;

/// Marks a key as `target#reference`
pub const RENAME_MARKER: char = '#';

/// Names the document field an operator or regex query applies to
pub const FIELD_KEY: &str = "$field";

/// Collection pattern of a pattern selector
pub const COLLECTION_KEY: &str = "collectionKey";

/// Document patterns of a pattern selector
pub const DOCUMENTS_KEY: &str = "docsObj";

// =============================================================================
// Tree Types
// =============================================================================

/// `==` / `!=` applied to database or collection names
#[derive(Debug, Clone, PartialEq)]
pub struct NameFilter {
    pub op: Comparator,
    pub value: String,
}

/// A document-level key and its value
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentEntry {
    /// Key with any `#reference` suffix removed
    pub key: String,
    /// True if the key carried a rename marker
    pub renamed: bool,
    pub value: Value,
}

/// What a payload says about one database's contents
#[derive(Debug, Clone, PartialEq)]
pub enum CollectionNode {
    /// `{ col: {} }`
    Whole(String),

    /// `{ "old#ref": "new" }` or `{ old: "new" }`
    Rename { from: String, to: String },

    /// The database value is a single `==`/`!=` key
    Filter(NameFilter),

    /// `{ collectionKey: "^pat", docsObj: { $field, "^pat": {} } }`
    Pattern {
        collections: String,
        /// `None` when `docsObj` is missing or empty
        documents: Option<RegexQuery>,
    },

    /// `{ col: { $field: "age", ">": 30 } }`
    Operator { collection: String, query: OperatorQuery },

    /// `{ col: { $field: "name", "^Jo": {} } }`
    Regex { collection: String, query: RegexQuery },

    /// `{ col: { key: value, ... } }`
    Documents {
        collection: String,
        entries: Vec<DocumentEntry>,
    },
}

/// One top-level entry of a payload
#[derive(Debug, Clone, PartialEq)]
pub enum DatabaseNode {
    /// `{ db: {} }`
    Whole(String),

    /// `{ "old#ref": "new" }` or `{ old: "new" }`
    Rename { from: String, to: String },

    /// The whole payload is a single `==`/`!=` key
    Filter(NameFilter),

    /// `{ db: { ... } }`
    Collections {
        database: String,
        nodes: Vec<CollectionNode>,
    },
}

/// A parsed data-command payload
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PayloadTree {
    pub nodes: Vec<DatabaseNode>,
}

// =============================================================================
// Parsing
// =============================================================================

impl PayloadTree {
    /// Parse a payload object. `{}` parses to an empty tree.
    pub fn parse(payload: &Value) -> Result<Self> {
        let map = payload
            .as_object()
            .ok_or_else(|| MpdbError::validation("Payload must be an object"))?;

        if let Some(filter) = name_filter(map)? {
            return Ok(Self {
                nodes: vec![DatabaseNode::Filter(filter)],
            });
        }

        let nodes = map
            .iter()
            .map(|(key, value)| parse_database(key, value))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { nodes })
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Canonical ids of every resource the payload targets, de-duplicated in
    /// payload order. Rename destinations are not included.
    pub fn targets(&self) -> Vec<ResourceId> {
        let mut ids = Vec::new();
        for node in &self.nodes {
            match node {
                DatabaseNode::Whole(database) => push_unique(&mut ids, ResourceId::database(database)),
                DatabaseNode::Rename { from, .. } => push_unique(&mut ids, ResourceId::database(from)),
                DatabaseNode::Filter(filter) => push_unique(&mut ids, filter_target(filter)),
                DatabaseNode::Collections { database, nodes } => {
                    for node in nodes {
                        collection_targets(database, node, &mut ids);
                    }
                }
            }
        }
        ids
    }

    /// Ids a rename would create
    pub fn rename_destinations(&self) -> Vec<ResourceId> {
        let mut ids = Vec::new();
        for node in &self.nodes {
            match node {
                DatabaseNode::Rename { to, .. } => push_unique(&mut ids, ResourceId::database(to)),
                DatabaseNode::Collections { database, nodes } => {
                    for node in nodes {
                        if let CollectionNode::Rename { to, .. } = node {
                            push_unique(&mut ids, ResourceId::collection(database, to));
                        }
                    }
                }
                _ => {}
            }
        }
        ids
    }
}

fn parse_database(key: &str, value: &Value) -> Result<DatabaseNode> {
    if let Some((from, _)) = split_marker(key) {
        validate_name("database", from)?;
        return Ok(DatabaseNode::Rename {
            from: from.to_string(),
            to: rename_target(key, value)?,
        });
    }
    validate_name("database", key)?;

    match value {
        Value::String(to) => Ok(DatabaseNode::Rename {
            from: key.to_string(),
            to: to.clone(),
        }),
        Value::Object(map) if map.is_empty() => Ok(DatabaseNode::Whole(key.to_string())),
        Value::Object(map) => Ok(DatabaseNode::Collections {
            database: key.to_string(),
            nodes: parse_collections(map)?,
        }),
        _ => Err(MpdbError::validation(format!(
            "Database '{}' must map to an object or a new name",
            key
        ))),
    }
}

fn parse_collections(map: &Map<String, Value>) -> Result<Vec<CollectionNode>> {
    if let Some(filter) = name_filter(map)? {
        return Ok(vec![CollectionNode::Filter(filter)]);
    }
    if map.contains_key(COLLECTION_KEY) {
        return parse_pattern(map).map(|node| vec![node]);
    }
    map.iter()
        .map(|(key, value)| parse_collection(key, value))
        .collect()
}

fn parse_collection(key: &str, value: &Value) -> Result<CollectionNode> {
    if let Some((from, _)) = split_marker(key) {
        validate_name("collection", from)?;
        return Ok(CollectionNode::Rename {
            from: from.to_string(),
            to: rename_target(key, value)?,
        });
    }
    validate_name("collection", key)?;

    let map = match value {
        Value::String(to) => {
            return Ok(CollectionNode::Rename {
                from: key.to_string(),
                to: to.clone(),
            })
        }
        Value::Object(map) => map,
        _ => {
            return Err(MpdbError::validation(format!(
                "Collection '{}' must map to an object or a new name",
                key
            )))
        }
    };

    if map.is_empty() {
        return Ok(CollectionNode::Whole(key.to_string()));
    }

    if let Some(field) = map.get(FIELD_KEY) {
        let field = field
            .as_str()
            .ok_or_else(|| MpdbError::validation(format!("'{}' must be a string", FIELD_KEY)))?
            .to_string();
        return parse_field_query(key, field, map);
    }

    let entries = map
        .iter()
        .map(|(doc_key, value)| {
            let (key, renamed) = match split_marker(doc_key) {
                Some((target, _)) => (target.to_string(), true),
                None => (doc_key.clone(), false),
            };
            DocumentEntry {
                key,
                renamed,
                value: value.clone(),
            }
        })
        .collect();
    Ok(CollectionNode::Documents {
        collection: key.to_string(),
        entries,
    })
}

/// `$field` plus either exactly one comparator or any number of patterns
fn parse_field_query(collection: &str, field: String, map: &Map<String, Value>) -> Result<CollectionNode> {
    let rest: Vec<(&String, &Value)> = map.iter().filter(|(key, _)| *key != FIELD_KEY).collect();
    let comparators = rest
        .iter()
        .filter(|(key, _)| Comparator::parse(key).is_some())
        .count();

    match (comparators, rest.as_slice()) {
        (0, _) => Ok(CollectionNode::Regex {
            collection: collection.to_string(),
            query: RegexQuery {
                field,
                patterns: rest.iter().map(|(key, _)| (*key).clone()).collect(),
            },
        }),
        (1, [(symbol, value)]) => {
            let op = Comparator::parse(symbol)
                .ok_or_else(|| MpdbError::validation(format!("Unknown operator '{}'", symbol)))?;
            Ok(CollectionNode::Operator {
                collection: collection.to_string(),
                query: OperatorQuery {
                    field,
                    op,
                    value: (*value).clone(),
                },
            })
        }
        _ => Err(MpdbError::validation(format!(
            "Operator query on '{}' must have exactly one comparator",
            collection
        ))),
    }
}

fn parse_pattern(map: &Map<String, Value>) -> Result<CollectionNode> {
    if let Some(key) = map
        .keys()
        .find(|key| *key != COLLECTION_KEY && *key != DOCUMENTS_KEY)
    {
        return Err(MpdbError::validation(format!(
            "Unexpected key '{}' in pattern selector",
            key
        )));
    }

    let collections = map
        .get(COLLECTION_KEY)
        .and_then(Value::as_str)
        .ok_or_else(|| MpdbError::validation(format!("'{}' must be a string", COLLECTION_KEY)))?
        .to_string();

    let documents = match map.get(DOCUMENTS_KEY) {
        None | Some(Value::Null) => None,
        Some(Value::Object(docs)) if docs.is_empty() => None,
        Some(Value::Object(docs)) => {
            let field = docs
                .get(FIELD_KEY)
                .and_then(Value::as_str)
                .ok_or_else(|| {
                    MpdbError::validation(format!("'{}' requires a '{}' string", DOCUMENTS_KEY, FIELD_KEY))
                })?
                .to_string();
            let patterns = docs.keys().filter(|key| *key != FIELD_KEY).cloned().collect();
            Some(RegexQuery { field, patterns })
        }
        Some(_) => {
            return Err(MpdbError::validation(format!(
                "'{}' must be an object",
                DOCUMENTS_KEY
            )))
        }
    };

    Ok(CollectionNode::Pattern {
        collections,
        documents,
    })
}

/// A map whose only key is a comparator symbol
fn name_filter(map: &Map<String, Value>) -> Result<Option<NameFilter>> {
    let mut keys = map.keys();
    let (Some(symbol), None) = (keys.next(), keys.next()) else {
        if map.keys().any(|key| Comparator::parse(key).is_some()) {
            return Err(MpdbError::validation("A name filter must be the only key at its level"));
        }
        return Ok(None);
    };
    let Some(op) = Comparator::parse(symbol) else {
        return Ok(None);
    };
    let value = map[symbol]
        .as_str()
        .ok_or_else(|| MpdbError::validation("Name filter value must be a string"))?;
    Ok(Some(NameFilter {
        op,
        value: value.to_string(),
    }))
}

/// `("old", "ref")` for `"old#ref"`
fn split_marker(key: &str) -> Option<(&str, &str)> {
    key.split_once(RENAME_MARKER)
}

fn rename_target(key: &str, value: &Value) -> Result<String> {
    let to = value
        .as_str()
        .ok_or_else(|| MpdbError::validation(format!("Rename '{}' needs a string value", key)))?;
    Ok(to.to_string())
}

// =============================================================================
// Resource Extraction
// =============================================================================

fn filter_target(filter: &NameFilter) -> ResourceId {
    match filter.op {
        Comparator::Eq => ResourceId::database(&filter.value),
        _ => ResourceId::root(),
    }
}

fn collection_targets(database: &str, node: &CollectionNode, ids: &mut Vec<ResourceId>) {
    match node {
        CollectionNode::Whole(collection)
        | CollectionNode::Operator { collection, .. }
        | CollectionNode::Regex { collection, .. } => {
            push_unique(ids, ResourceId::collection(database, collection))
        }
        CollectionNode::Rename { from, .. } => push_unique(ids, ResourceId::collection(database, from)),
        CollectionNode::Filter(_) | CollectionNode::Pattern { .. } => {
            push_unique(ids, ResourceId::database(database))
        }
        CollectionNode::Documents { collection, entries } => {
            for entry in entries {
                push_unique(ids, ResourceId::document(database, collection, &entry.key));
            }
        }
    }
}

fn push_unique(ids: &mut Vec<ResourceId>, id: ResourceId) {
    if !ids.contains(&id) {
        ids.push(id);
    }
}

// =============================================================================
// Search Envelope
// =============================================================================

/// Page used when a search names none
pub const DEFAULT_PAGE_NUMBER: usize = 1;
pub const DEFAULT_PAGE_LIMIT: usize = 10;

/// 1-based page of a search result
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub number: usize,
    pub limit: usize,
}

impl Default for Page {
    fn default() -> Self {
        Self {
            number: DEFAULT_PAGE_NUMBER,
            limit: DEFAULT_PAGE_LIMIT,
        }
    }
}

impl Page {
    /// Positions of this page in the result entry list
    pub fn bounds(&self) -> Range<usize> {
        let start = self.number.saturating_sub(1).saturating_mul(self.limit);
        start..start.saturating_add(self.limit)
    }
}

/// A search payload, optionally wrapped as `{data, pageNumber, limit}`
///
/// Missing or non-positive paging fields fall back to [`Page::default`].
#[derive(Debug, Clone, PartialEq)]
pub struct SearchEnvelope {
    pub tree: PayloadTree,
    pub page: Page,
}

impl SearchEnvelope {
    pub fn parse(payload: &Value) -> Result<Self> {
        let Some(map) = payload.as_object().filter(|map| is_envelope(map)) else {
            return Ok(Self {
                tree: PayloadTree::parse(payload)?,
                page: Page::default(),
            });
        };

        let tree = PayloadTree::parse(&map["data"])?;
        let page = Page {
            number: page_field(map, "pageNumber")?.unwrap_or(DEFAULT_PAGE_NUMBER),
            limit: page_field(map, "limit")?.unwrap_or(DEFAULT_PAGE_LIMIT),
        };
        Ok(Self { tree, page })
    }
}

fn is_envelope(map: &Map<String, Value>) -> bool {
    map.get("data").map_or(false, Value::is_object)
        && map
            .keys()
            .all(|key| matches!(key.as_str(), "data" | "pageNumber" | "limit"))
}

fn page_field(map: &Map<String, Value>, key: &str) -> Result<Option<usize>> {
    match map.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => Ok(n.as_u64().map(|n| n as usize).filter(|n| *n > 0)),
        Some(Value::String(s)) => s
            .trim()
            .parse::<usize>()
            .map(|n| Some(n).filter(|n| *n > 0))
            .map_err(|_| MpdbError::validation(format!("'{}' must be a positive integer", key))),
        Some(_) => Err(MpdbError::validation(format!("'{}' must be a positive integer", key))),
    }
}
