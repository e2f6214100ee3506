//! Tests for FsStorage
//!
//! These tests verify:
//! - Idempotent database/collection creation and document id assignment
//! - Level-specific NotFound errors on read
//! - Renames and their conflicts
//! - Shallow merge semantics and id protection
//! - Deletes that prune emptied parents
//! - Listing, searching and export

use mpdb::storage::{
    is_document_id, Document, ExportSelector, FsStorage, Listing, RegexQuery, StorageBackend,
    UpdateOutcome, CREATED_AT_FIELD, ID_FIELD,
};
use mpdb::MpdbError;
use serde_json::{json, Value};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn setup_storage() -> (TempDir, FsStorage) {
    let temp_dir = TempDir::new().unwrap();
    let storage = FsStorage::open(temp_dir.path().join("data")).unwrap();
    (temp_dir, storage)
}

fn doc(value: Value) -> Document {
    value.as_object().unwrap().clone()
}

/// Create a document and return its assigned id
fn insert(storage: &FsStorage, db: &str, col: &str, value: Value) -> String {
    storage
        .create(db, Some(col), Some(doc(value)))
        .unwrap()
        .document_id
        .unwrap()
}

// =============================================================================
// Create Tests
// =============================================================================

#[test]
fn test_open_creates_root() {
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path().join("nested").join("data");

    let storage = FsStorage::open(&root).unwrap();

    assert!(root.is_dir());
    assert_eq!(storage.root(), root.as_path());
}

#[test]
fn test_create_database_is_idempotent() {
    let (_temp, storage) = setup_storage();

    let first = storage.create("users", None, None).unwrap();
    let second = storage.create("users", None, None).unwrap();

    assert!(first.database_created);
    assert!(!second.database_created);
    assert_eq!(storage.list_databases().unwrap(), vec!["users".to_string()]);
}

#[test]
fn test_create_collection_upserts_database() {
    let (_temp, storage) = setup_storage();

    let outcome = storage.create("users", Some("admins"), None).unwrap();

    assert!(outcome.database_created);
    assert!(outcome.collection_created);
    assert_eq!(outcome.created(), vec!["database", "collection"]);
    assert!(storage.exists("users", Some("admins")));
}

#[test]
fn test_create_document_assigns_id_and_timestamp() {
    let (_temp, storage) = setup_storage();

    let id = insert(&storage, "users", "admins", json!({"name": "John", "age": 30}));

    assert!(is_document_id(&id));
    let stored = storage.read("users", "admins", &id).unwrap();
    assert_eq!(stored["name"], json!("John"));
    assert_eq!(stored["age"], json!(30));
    assert_eq!(stored[ID_FIELD], json!(id));
    assert!(stored[CREATED_AT_FIELD].as_str().unwrap().ends_with('Z'));
}

#[test]
fn test_create_overwrites_client_supplied_id() {
    let (_temp, storage) = setup_storage();

    let id = insert(&storage, "users", "admins", json!({"_id": "mine", "name": "John"}));

    assert_ne!(id, "mine");
    assert_eq!(storage.read("users", "admins", &id).unwrap()[ID_FIELD], json!(id));
}

#[test]
fn test_create_twice_gives_distinct_documents() {
    let (_temp, storage) = setup_storage();

    let a = insert(&storage, "users", "admins", json!({"name": "John"}));
    let b = insert(&storage, "users", "admins", json!({"name": "John"}));

    assert_ne!(a, b);
    assert_eq!(storage.list_documents("users", "admins").unwrap().len(), 2);
}

#[test]
fn test_create_document_without_collection_rejected() {
    let (_temp, storage) = setup_storage();

    let result = storage.create("users", None, Some(doc(json!({"name": "John"}))));

    assert!(matches!(result, Err(MpdbError::Validation(_))));
    assert!(storage.list_databases().unwrap().is_empty());
}

#[test]
fn test_invalid_names_rejected() {
    let (_temp, storage) = setup_storage();

    for name in ["", "..", "a/b", "a#b"] {
        let result = storage.create(name, None, None);
        assert!(matches!(result, Err(MpdbError::Validation(_))), "name {:?}", name);
    }
}

// =============================================================================
// Read Tests
// =============================================================================

#[test]
fn test_read_reports_first_missing_level() {
    let (_temp, storage) = setup_storage();
    storage.create("users", Some("admins"), None).unwrap();

    assert!(matches!(
        storage.read("nope", "admins", "x"),
        Err(MpdbError::DatabaseNotFound(_))
    ));
    assert!(matches!(
        storage.read("users", "nope", "x"),
        Err(MpdbError::CollectionNotFound { .. })
    ));
    assert!(matches!(
        storage.read("users", "admins", "x"),
        Err(MpdbError::DocumentNotFound { .. })
    ));
}

#[test]
fn test_corrupt_document_is_io_error() {
    let (_temp, storage) = setup_storage();
    let id = insert(&storage, "users", "admins", json!({"name": "John"}));
    let path = storage.root().join("users").join("admins").join(format!("{}.json", id));
    std::fs::write(&path, b"{not json").unwrap();

    let err = storage.read("users", "admins", &id).unwrap_err();
    assert!(matches!(&err, MpdbError::Io(e) if e.kind() == std::io::ErrorKind::InvalidData));
    assert_eq!(err.status_code(), 500);

    std::fs::write(&path, b"[1, 2]").unwrap();
    let err = storage.read("users", "admins", &id).unwrap_err();
    assert!(matches!(&err, MpdbError::Io(e) if e.kind() == std::io::ErrorKind::InvalidData));
}

// =============================================================================
// Rename Tests
// =============================================================================

#[test]
fn test_rename_database() {
    let (_temp, storage) = setup_storage();
    let id = insert(&storage, "users", "admins", json!({"name": "John"}));

    let outcome = storage.update(&json!("people"), "users", None, None).unwrap();

    assert_eq!(
        outcome,
        UpdateOutcome::RenamedDatabase {
            from: "users".to_string(),
            to: "people".to_string()
        }
    );
    assert!(!storage.exists("users", None));
    assert_eq!(storage.read("people", "admins", &id).unwrap()["name"], json!("John"));
}

#[test]
fn test_rename_database_conflict() {
    let (_temp, storage) = setup_storage();
    storage.create("users", None, None).unwrap();
    storage.create("people", None, None).unwrap();

    let result = storage.rename_database("users", "people");

    assert!(matches!(result, Err(MpdbError::Conflict(_))));
    assert!(storage.exists("users", None));
}

#[test]
fn test_rename_missing_database() {
    let (_temp, storage) = setup_storage();

    let result = storage.rename_database("users", "people");

    assert!(matches!(result, Err(MpdbError::DatabaseNotFound(_))));
}

#[test]
fn test_rename_collection() {
    let (_temp, storage) = setup_storage();
    storage.create("users", Some("admins"), None).unwrap();

    storage.update(&json!("owners"), "users", Some("admins"), None).unwrap();

    assert_eq!(storage.list_collections("users").unwrap(), vec!["owners".to_string()]);
}

#[test]
fn test_rename_collection_conflict() {
    let (_temp, storage) = setup_storage();
    storage.create("users", Some("admins"), None).unwrap();
    storage.create("users", Some("owners"), None).unwrap();

    let result = storage.rename_collection("users", "admins", "owners");

    assert!(matches!(result, Err(MpdbError::Conflict(_))));
}

#[test]
fn test_rename_requires_string() {
    let (_temp, storage) = setup_storage();
    storage.create("users", None, None).unwrap();

    let result = storage.update(&json!(42), "users", None, None);

    assert!(matches!(result, Err(MpdbError::Validation(_))));
}

// =============================================================================
// Merge Tests
// =============================================================================

#[test]
fn test_merge_is_shallow_and_patch_wins() {
    let (_temp, storage) = setup_storage();
    let id = insert(
        &storage,
        "users",
        "admins",
        json!({"name": "John", "age": 30, "address": {"city": "Oslo", "zip": "0150"}}),
    );

    let outcome = storage
        .update(
            &json!({"age": 31, "address": {"city": "Bergen"}, "email": "j@x"}),
            "users",
            Some("admins"),
            Some(&id),
        )
        .unwrap();

    let UpdateOutcome::Merged(merged) = outcome else {
        panic!("expected merge");
    };
    assert_eq!(merged["name"], json!("John"));
    assert_eq!(merged["age"], json!(31));
    assert_eq!(merged["email"], json!("j@x"));
    // Nested objects are replaced, not merged
    assert_eq!(merged["address"], json!({"city": "Bergen"}));
    assert_eq!(storage.read("users", "admins", &id).unwrap(), merged);
}

#[test]
fn test_merge_keeps_id_and_timestamp() {
    let (_temp, storage) = setup_storage();
    let id = insert(&storage, "users", "admins", json!({"name": "John"}));
    let created_at = storage.read("users", "admins", &id).unwrap()[CREATED_AT_FIELD].clone();

    let merged = storage
        .merge_document(
            "users",
            "admins",
            &id,
            &doc(json!({"_id": id.clone(), "_createdAt": "yesterday"})),
        )
        .unwrap();

    assert_eq!(merged[ID_FIELD], json!(id));
    assert_eq!(merged[CREATED_AT_FIELD], created_at);
}

#[test]
fn test_merge_rejects_id_mismatch() {
    let (_temp, storage) = setup_storage();
    let id = insert(&storage, "users", "admins", json!({"name": "John"}));

    let result = storage.merge_document("users", "admins", &id, &doc(json!({"_id": "other"})));

    assert!(matches!(result, Err(MpdbError::Validation(_))));
    assert_eq!(storage.read("users", "admins", &id).unwrap()["name"], json!("John"));
}

#[test]
fn test_merge_missing_document() {
    let (_temp, storage) = setup_storage();
    storage.create("users", Some("admins"), None).unwrap();

    let result = storage.merge_document("users", "admins", "missing", &doc(json!({"a": 1})));

    assert!(matches!(result, Err(MpdbError::DocumentNotFound { .. })));
}

// =============================================================================
// Delete Tests
// =============================================================================

#[test]
fn test_delete_last_document_prunes_parents() {
    let (_temp, storage) = setup_storage();
    let id = insert(&storage, "users", "admins", json!({"name": "John"}));

    let outcome = storage.delete("users", Some("admins"), Some(&id)).unwrap();

    assert!(outcome.pruned_collection);
    assert!(outcome.pruned_database);
    assert!(storage.list_databases().unwrap().is_empty());
}

#[test]
fn test_delete_document_keeps_non_empty_collection() {
    let (_temp, storage) = setup_storage();
    let id = insert(&storage, "users", "admins", json!({"name": "John"}));
    insert(&storage, "users", "admins", json!({"name": "Jane"}));

    let outcome = storage.delete("users", Some("admins"), Some(&id)).unwrap();

    assert!(!outcome.pruned_collection);
    assert!(!outcome.pruned_database);
    assert_eq!(storage.list_documents("users", "admins").unwrap().len(), 1);
}

#[test]
fn test_delete_collection_prunes_empty_database() {
    let (_temp, storage) = setup_storage();
    storage.create("users", Some("admins"), None).unwrap();
    storage.create("users", Some("guests"), None).unwrap();

    let first = storage.delete("users", Some("admins"), None).unwrap();
    let second = storage.delete("users", Some("guests"), None).unwrap();

    assert!(!first.pruned_database);
    assert!(second.pruned_database);
    assert!(!storage.exists("users", None));
}

#[test]
fn test_delete_database() {
    let (_temp, storage) = setup_storage();
    insert(&storage, "users", "admins", json!({"name": "John"}));

    storage.delete("users", None, None).unwrap();

    assert!(!storage.exists("users", None));
}

#[test]
fn test_delete_missing_levels() {
    let (_temp, storage) = setup_storage();
    storage.create("users", Some("admins"), None).unwrap();

    assert!(matches!(
        storage.delete("nope", None, None),
        Err(MpdbError::DatabaseNotFound(_))
    ));
    assert!(matches!(
        storage.delete("users", Some("nope"), None),
        Err(MpdbError::CollectionNotFound { .. })
    ));
    assert!(matches!(
        storage.delete("users", Some("admins"), Some("nope")),
        Err(MpdbError::DocumentNotFound { .. })
    ));
}

// =============================================================================
// List Tests
// =============================================================================

#[test]
fn test_list_levels() {
    let (_temp, storage) = setup_storage();
    insert(&storage, "users", "admins", json!({"name": "John"}));
    storage.create("users", Some("guests"), None).unwrap();
    storage.create("orders", None, None).unwrap();

    assert_eq!(
        storage.list(None, None).unwrap(),
        Listing::Databases(vec!["orders".to_string(), "users".to_string()])
    );
    assert_eq!(
        storage.list(Some("users"), None).unwrap(),
        Listing::Collections(vec!["admins".to_string(), "guests".to_string()])
    );
    assert_eq!(storage.list(Some("users"), Some("admins")).unwrap().len(), 1);
}

#[test]
fn test_list_missing_path_is_empty() {
    let (_temp, storage) = setup_storage();

    assert!(storage.list(Some("nope"), None).unwrap().is_empty());
    assert!(storage.list(Some("nope"), Some("nope")).unwrap().is_empty());
}

#[test]
fn test_listing_into_value() {
    let listing = Listing::Databases(vec!["a".to_string(), "b".to_string()]);

    assert_eq!(listing.into_value(), json!(["a", "b"]));
}

// =============================================================================
// Search Tests
// =============================================================================

#[test]
fn test_search_literal_and_operators() {
    let (_temp, storage) = setup_storage();
    insert(&storage, "users", "admins", json!({"name": "John", "age": 25}));
    insert(&storage, "users", "admins", json!({"name": "Jane", "age": 30}));

    let by_name = storage.search("users", "admins", &doc(json!({"name": "John"}))).unwrap();
    let not_25 = storage
        .search("users", "admins", &doc(json!({"age": {"$ne": 25}})))
        .unwrap();
    let all = storage.search("users", "admins", &Document::new()).unwrap();

    assert_eq!(by_name.len(), 1);
    assert_eq!(not_25.len(), 1);
    assert_eq!(not_25[0]["name"], json!("Jane"));
    assert_eq!(all.len(), 2);
}

#[test]
fn test_search_missing_collection_errors() {
    let (_temp, storage) = setup_storage();
    storage.create("users", None, None).unwrap();

    let result = storage.search("users", "admins", &Document::new());

    assert!(matches!(result, Err(MpdbError::CollectionNotFound { .. })));
}

#[test]
fn test_search_by_regex_any_pattern() {
    let (_temp, storage) = setup_storage();
    insert(&storage, "users", "admins", json!({"name": "John"}));
    insert(&storage, "users", "admins", json!({"name": "Maria"}));
    insert(&storage, "users", "admins", json!({"name": "Bob"}));

    let query = RegexQuery {
        field: "name".to_string(),
        patterns: vec!["^jo".to_string(), "ia$".to_string()],
    };
    let mut names: Vec<Value> = storage
        .search_by_regex("users", "admins", &query)
        .unwrap()
        .into_iter()
        .map(|d| d["name"].clone())
        .collect();
    names.sort_by(|a, b| a.as_str().cmp(&b.as_str()));

    assert_eq!(names, vec![json!("John"), json!("Maria")]);
}

#[test]
fn test_matching_collections_falls_back_to_literal() {
    let (_temp, storage) = setup_storage();
    storage.create("shop", Some("orders"), None).unwrap();
    storage.create("shop", Some("orders_2024"), None).unwrap();
    storage.create("shop", Some("users"), None).unwrap();

    let prefixed = storage.matching_collections("shop", "^ord").unwrap();
    let invalid = storage.matching_collections("shop", "(users").unwrap();

    assert_eq!(prefixed, vec!["orders".to_string(), "orders_2024".to_string()]);
    assert!(invalid.is_empty());
}

// =============================================================================
// Export Tests
// =============================================================================

#[test]
fn test_export_levels() {
    let (_temp, storage) = setup_storage();
    let id = insert(&storage, "users", "admins", json!({"name": "John"}));

    let everything = storage.export(&ExportSelector::default()).unwrap();
    let collection = storage
        .export(&ExportSelector {
            database: Some("users".to_string()),
            collection: Some("admins".to_string()),
            document: None,
        })
        .unwrap();
    let document = storage
        .export(&ExportSelector {
            database: Some("users".to_string()),
            collection: Some("admins".to_string()),
            document: Some(id.clone()),
        })
        .unwrap();

    assert_eq!(everything["users"]["admins"][&id]["name"], json!("John"));
    assert_eq!(collection["users"]["admins"][&id]["name"], json!("John"));
    assert_eq!(document["users"]["admins"][&id]["name"], json!("John"));
}

#[test]
fn test_export_missing_database() {
    let (_temp, storage) = setup_storage();

    let result = storage.export(&ExportSelector {
        database: Some("nope".to_string()),
        ..ExportSelector::default()
    });

    assert!(matches!(result, Err(MpdbError::DatabaseNotFound(_))));
}

// =============================================================================
// Persistence Tests
// =============================================================================

#[test]
fn test_reopen_sees_existing_data() {
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path().join("data");
    let id = {
        let storage = FsStorage::open(&root).unwrap();
        insert(&storage, "users", "admins", json!({"name": "John"}))
    };

    let storage = FsStorage::open(&root).unwrap();

    assert_eq!(storage.read("users", "admins", &id).unwrap()["name"], json!("John"));
}
