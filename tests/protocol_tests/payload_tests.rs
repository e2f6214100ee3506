//! Payload Tests
//!
//! Tests for the typed payload tree, resource ids and lock plans.

use mpdb::protocol::{
    lock_plan, Access, CollectionNode, DatabaseNode, DocumentEntry, NameFilter, Page, PayloadTree,
    Resource, ResourceId, SearchEnvelope,
};
use mpdb::storage::{Comparator, OperatorQuery, RegexQuery};
use mpdb::MpdbError;
use serde_json::json;

fn ids(list: &[&str]) -> Vec<ResourceId> {
    list.iter()
        .map(|id| {
            let parts: Vec<&str> = id.split('/').collect();
            match parts.as_slice() {
                [""] => ResourceId::root(),
                [db] => ResourceId::database(db),
                [db, col] => ResourceId::collection(db, col),
                [db, col, doc] => ResourceId::document(db, col, doc),
                _ => panic!("bad id {}", id),
            }
        })
        .collect()
}

// =============================================================================
// Tree Shape Tests
// =============================================================================

#[test]
fn test_empty_payload() {
    let tree = PayloadTree::parse(&json!({})).unwrap();

    assert!(tree.is_empty());
    assert!(tree.targets().is_empty());
}

#[test]
fn test_payload_must_be_object() {
    assert!(matches!(
        PayloadTree::parse(&json!([1, 2])),
        Err(MpdbError::Validation(_))
    ));
}

#[test]
fn test_whole_database_and_collection() {
    let tree = PayloadTree::parse(&json!({"users": {}, "shop": {"orders": {}}})).unwrap();

    assert_eq!(
        tree.nodes,
        vec![
            DatabaseNode::Whole("users".to_string()),
            DatabaseNode::Collections {
                database: "shop".to_string(),
                nodes: vec![CollectionNode::Whole("orders".to_string())],
            },
        ]
    );
}

#[test]
fn test_documents_node() {
    let tree = PayloadTree::parse(&json!({"users": {"admins": {"doc1": {"name": "John"}, "doc2#ref": "x"}}}))
        .unwrap();

    let DatabaseNode::Collections { nodes, .. } = &tree.nodes[0] else {
        panic!("expected collections");
    };
    assert_eq!(
        nodes[0],
        CollectionNode::Documents {
            collection: "admins".to_string(),
            entries: vec![
                DocumentEntry {
                    key: "doc1".to_string(),
                    renamed: false,
                    value: json!({"name": "John"}),
                },
                DocumentEntry {
                    key: "doc2".to_string(),
                    renamed: true,
                    value: json!("x"),
                },
            ],
        }
    );
}

#[test]
fn test_rename_forms() {
    let marked = PayloadTree::parse(&json!({"users#ref": "people"})).unwrap();
    let bare = PayloadTree::parse(&json!({"users": "people"})).unwrap();
    let collection = PayloadTree::parse(&json!({"users": {"admins#ref": "owners"}})).unwrap();

    let expected = DatabaseNode::Rename {
        from: "users".to_string(),
        to: "people".to_string(),
    };
    assert_eq!(marked.nodes, vec![expected.clone()]);
    assert_eq!(bare.nodes, vec![expected]);
    assert_eq!(
        collection.rename_destinations(),
        vec![ResourceId::collection("users", "owners")]
    );
}

#[test]
fn test_rename_requires_string() {
    let result = PayloadTree::parse(&json!({"users#ref": {"a": 1}}));

    assert!(matches!(result, Err(MpdbError::Validation(_))));
}

#[test]
fn test_database_name_filter() {
    let tree = PayloadTree::parse(&json!({"!=": "users"})).unwrap();

    assert_eq!(
        tree.nodes,
        vec![DatabaseNode::Filter(NameFilter {
            op: Comparator::Ne,
            value: "users".to_string(),
        })]
    );
    assert_eq!(tree.targets(), vec![ResourceId::root()]);
}

#[test]
fn test_equality_filter_targets_named_database() {
    let tree = PayloadTree::parse(&json!({"==": "users"})).unwrap();

    assert_eq!(tree.targets(), vec![ResourceId::database("users")]);
}

#[test]
fn test_filter_mixed_with_names_rejected() {
    let result = PayloadTree::parse(&json!({"==": "users", "shop": {}}));

    assert!(matches!(result, Err(MpdbError::Validation(_))));
}

#[test]
fn test_collection_name_filter() {
    let tree = PayloadTree::parse(&json!({"shop": {"==": "orders"}})).unwrap();

    assert_eq!(
        tree.nodes,
        vec![DatabaseNode::Collections {
            database: "shop".to_string(),
            nodes: vec![CollectionNode::Filter(NameFilter {
                op: Comparator::Eq,
                value: "orders".to_string(),
            })],
        }]
    );
    assert_eq!(tree.targets(), vec![ResourceId::database("shop")]);
}

#[test]
fn test_operator_query() {
    let tree = PayloadTree::parse(&json!({"users": {"admins": {"$field": "age", ">": 30}}})).unwrap();

    let DatabaseNode::Collections { nodes, .. } = &tree.nodes[0] else {
        panic!("expected collections");
    };
    assert_eq!(
        nodes[0],
        CollectionNode::Operator {
            collection: "admins".to_string(),
            query: OperatorQuery {
                field: "age".to_string(),
                op: Comparator::Gt,
                value: json!(30),
            },
        }
    );
    assert_eq!(tree.targets(), vec![ResourceId::collection("users", "admins")]);
}

#[test]
fn test_two_comparators_rejected() {
    let result = PayloadTree::parse(&json!({"users": {"admins": {"$field": "age", ">": 30, "<": 40}}}));

    assert!(matches!(result, Err(MpdbError::Validation(_))));
}

#[test]
fn test_regex_query() {
    let tree = PayloadTree::parse(&json!({"users": {"admins": {"$field": "name", "^Jo": {}, "ia$": {}}}}))
        .unwrap();

    let DatabaseNode::Collections { nodes, .. } = &tree.nodes[0] else {
        panic!("expected collections");
    };
    assert_eq!(
        nodes[0],
        CollectionNode::Regex {
            collection: "admins".to_string(),
            query: RegexQuery {
                field: "name".to_string(),
                patterns: vec!["^Jo".to_string(), "ia$".to_string()],
            },
        }
    );
}

#[test]
fn test_pattern_selector() {
    let with_docs = PayloadTree::parse(&json!({
        "shop": {"collectionKey": "^ord", "docsObj": {"$field": "status", "^open": {}}}
    }))
    .unwrap();
    let without_docs = PayloadTree::parse(&json!({"shop": {"collectionKey": "^ord", "docsObj": {}}})).unwrap();

    let DatabaseNode::Collections { nodes, .. } = &with_docs.nodes[0] else {
        panic!("expected collections");
    };
    assert_eq!(
        nodes[0],
        CollectionNode::Pattern {
            collections: "^ord".to_string(),
            documents: Some(RegexQuery {
                field: "status".to_string(),
                patterns: vec!["^open".to_string()],
            }),
        }
    );
    let DatabaseNode::Collections { nodes, .. } = &without_docs.nodes[0] else {
        panic!("expected collections");
    };
    assert!(matches!(&nodes[0], CollectionNode::Pattern { documents: None, .. }));
    assert_eq!(with_docs.targets(), vec![ResourceId::database("shop")]);
}

#[test]
fn test_pattern_selector_requires_field() {
    let result = PayloadTree::parse(&json!({"shop": {"collectionKey": "^ord", "docsObj": {"^open": {}}}}));

    assert!(matches!(result, Err(MpdbError::Validation(_))));
}

#[test]
fn test_invalid_names_rejected() {
    assert!(PayloadTree::parse(&json!({"..": {}})).is_err());
    assert!(PayloadTree::parse(&json!({"users": {"a/b": {}}})).is_err());
}

// =============================================================================
// Target Tests
// =============================================================================

#[test]
fn test_targets_are_deduplicated_in_order() {
    let tree = PayloadTree::parse(&json!({
        "users": {"admins": {"d1": {"a": 1}, "d2": {"a": 2}}, "guests": {}},
        "shop": {}
    }))
    .unwrap();

    assert_eq!(
        tree.targets(),
        ids(&["users/admins/d1", "users/admins/d2", "users/guests", "shop"])
    );
}

#[test]
fn test_rename_targets_source_only() {
    let tree = PayloadTree::parse(&json!({"users": "people"})).unwrap();

    assert_eq!(tree.targets(), vec![ResourceId::database("users")]);
    assert_eq!(tree.rename_destinations(), vec![ResourceId::database("people")]);
}

// =============================================================================
// Search Envelope Tests
// =============================================================================

#[test]
fn test_plain_search_payload() {
    let envelope = SearchEnvelope::parse(&json!({"users": {"admins": {}}})).unwrap();

    assert_eq!(envelope.page, Page { number: 1, limit: 10 });
    assert_eq!(envelope.tree.targets(), vec![ResourceId::collection("users", "admins")]);
}

#[test]
fn test_paged_search_payload() {
    let envelope = SearchEnvelope::parse(&json!({
        "data": {"users": {"admins": {}}},
        "pageNumber": "2",
        "limit": 10
    }))
    .unwrap();

    assert_eq!(envelope.page, Page { number: 2, limit: 10 });
    assert_eq!(envelope.page.bounds(), 10..20);
}

#[test]
fn test_missing_or_zero_page_fields_use_defaults() {
    let zero = SearchEnvelope::parse(&json!({"data": {"users": {}}, "pageNumber": 0, "limit": 5})).unwrap();
    let no_limit = SearchEnvelope::parse(&json!({"data": {"users": {}}, "pageNumber": 3})).unwrap();

    assert_eq!(zero.page, Page { number: 1, limit: 5 });
    assert_eq!(no_limit.page, Page { number: 3, limit: 10 });
    assert_eq!(no_limit.page.bounds(), 20..30);
}

#[test]
fn test_bad_page_field() {
    let result = SearchEnvelope::parse(&json!({"data": {"users": {}}, "pageNumber": "two", "limit": 10}));

    assert!(matches!(result, Err(MpdbError::Validation(_))));
}

// =============================================================================
// Resource Id Tests
// =============================================================================

#[test]
fn test_resource_id_levels() {
    let doc = ResourceId::document("users", "admins", "d1");

    assert_eq!(doc.as_str(), "users/admins/d1");
    assert_eq!(doc.depth(), 3);
    assert_eq!(doc.database_name(), Some("users"));
    assert_eq!(doc.parent(), Some(ResourceId::collection("users", "admins")));
    assert_eq!(ResourceId::root().depth(), 0);
    assert_eq!(ResourceId::root().parent(), None);
    assert_eq!(ResourceId::root().to_string(), "<root>");
}

#[test]
fn test_ancestors_root_first() {
    let doc = ResourceId::document("users", "admins", "d1");

    assert_eq!(doc.ancestors(), ids(&["", "users", "users/admins"]));
    assert!(ResourceId::root().ancestors().is_empty());
}

#[test]
fn test_truncate() {
    let doc = ResourceId::document("users", "admins", "d1");

    assert_eq!(doc.truncate(2), ResourceId::collection("users", "admins"));
    assert_eq!(doc.truncate(1), ResourceId::database("users"));
    assert_eq!(ResourceId::database("users").truncate(2), ResourceId::database("users"));
}

#[test]
fn test_ancestors_sort_before_descendants() {
    let mut all = ids(&["users/admins/d1", "users", "", "users/admins", "orders"]);
    all.sort();

    assert_eq!(all, ids(&["", "orders", "users", "users/admins", "users/admins/d1"]));
}

// =============================================================================
// Lock Plan Tests
// =============================================================================

#[test]
fn test_lock_plan_adds_shared_ancestors() {
    let plan = lock_plan([Resource::exclusive(ResourceId::document("users", "admins", "d1"))]);

    assert_eq!(
        plan,
        vec![
            Resource::shared(ResourceId::root()),
            Resource::shared(ResourceId::database("users")),
            Resource::shared(ResourceId::collection("users", "admins")),
            Resource::exclusive(ResourceId::document("users", "admins", "d1")),
        ]
    );
}

#[test]
fn test_lock_plan_keeps_strongest_mode() {
    let plan = lock_plan([
        Resource::exclusive(ResourceId::collection("users", "admins")),
        Resource::shared(ResourceId::document("users", "admins", "d1")),
        Resource::shared(ResourceId::collection("users", "admins")),
    ]);

    let admins = plan
        .iter()
        .find(|r| r.id == ResourceId::collection("users", "admins"))
        .unwrap();
    assert_eq!(admins.access, Access::Exclusive);
    assert_eq!(plan.len(), 4);
}

#[test]
fn test_lock_plan_always_has_root() {
    let plan = lock_plan(Vec::new());

    assert_eq!(plan, vec![Resource::shared(ResourceId::root())]);
}

#[test]
fn test_lock_plan_is_sorted() {
    let plan = lock_plan([
        Resource::exclusive(ResourceId::database("zeta")),
        Resource::exclusive(ResourceId::database("alpha")),
    ]);

    let order: Vec<&str> = plan.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(order, vec!["", "alpha", "zeta"]);
}
