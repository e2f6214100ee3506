//! Filesystem storage engine
//!
//! Databases and collections are directories, documents are `<id>.json`
//! files. All methods take `&self`; the coordinator's resource locks are
//! what keep concurrent commands from stepping on each other.

use std::fs::{self, OpenOptions};
use std::io::{BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};

use chrono::{SecondsFormat, Utc};
use serde_json::{Map, Value};

use crate::error::{MpdbError, Result};

use super::{
    generate_id, CreateOutcome, DeleteOutcome, Document, ExportSelector, Listing, StorageBackend,
    CREATED_AT_FIELD, ID_FIELD,
};

const DOCUMENT_EXTENSION: &str = "json";

/// Storage engine rooted at a data directory
#[derive(Debug, Clone)]
pub struct FsStorage {
    root: PathBuf,
}

impl FsStorage {
    /// Open (creating if needed) a storage root
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        tracing::debug!("Storage root ready at {}", root.display());
        Ok(Self { root })
    }

    /// Root data directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    // =========================================================================
    // Path Helpers
    // =========================================================================

    fn database_path(&self, database: &str) -> Result<PathBuf> {
        validate_name("Database", database)?;
        Ok(self.root.join(database))
    }

    fn collection_path(&self, database: &str, collection: &str) -> Result<PathBuf> {
        validate_name("Collection", collection)?;
        Ok(self.database_path(database)?.join(collection))
    }

    fn document_path(&self, database: &str, collection: &str, doc_id: &str) -> Result<PathBuf> {
        validate_name("Document id", doc_id)?;
        Ok(self
            .collection_path(database, collection)?
            .join(format!("{}.{}", doc_id, DOCUMENT_EXTENSION)))
    }

    /// Resolve the path of a document, reporting the first missing level
    fn existing_document_path(&self, database: &str, collection: &str, doc_id: &str) -> Result<PathBuf> {
        let db_path = self.database_path(database)?;
        if !db_path.is_dir() {
            return Err(MpdbError::DatabaseNotFound(database.to_string()));
        }
        let col_path = self.collection_path(database, collection)?;
        if !col_path.is_dir() {
            return Err(not_found_collection(database, collection));
        }
        let doc_path = self.document_path(database, collection, doc_id)?;
        if !doc_path.is_file() {
            return Err(not_found_document(collection, doc_id));
        }
        Ok(doc_path)
    }

    // =========================================================================
    // File Helpers
    // =========================================================================

    /// A stored file that is not a JSON object is an I/O failure, not a bad request
    fn read_document_file(path: &Path) -> Result<Document> {
        let raw = fs::read(path)?;
        let corrupt = |detail: String| {
            MpdbError::Io(std::io::Error::new(
                ErrorKind::InvalidData,
                format!("{}: {}", path.display(), detail),
            ))
        };
        match serde_json::from_slice::<Value>(&raw).map_err(|e| corrupt(e.to_string()))? {
            Value::Object(doc) => Ok(doc),
            _ => Err(corrupt("does not hold a JSON object".to_string())),
        }
    }

    /// Write to a sibling temp file, then rename over the target
    fn replace_document_file(path: &Path, document: &Document) -> Result<()> {
        let tmp_path = path.with_extension("json.tmp");
        {
            let file = fs::File::create(&tmp_path)?;
            let mut writer = BufWriter::new(file);
            serde_json::to_writer_pretty(&mut writer, document)?;
            writer.flush()?;
        }
        fs::rename(&tmp_path, path)?;
        Ok(())
    }

    /// Create `dir` if absent; returns whether it was newly made
    fn ensure_dir(dir: &Path) -> Result<bool> {
        match fs::create_dir(dir) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::AlreadyExists && dir.is_dir() => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Remove `dir` if it has no entries left
    fn prune_if_empty(dir: &Path) -> Result<bool> {
        let is_empty = match fs::read_dir(dir) {
            Ok(mut entries) => entries.next().is_none(),
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(e.into()),
        };
        if !is_empty {
            return Ok(false);
        }
        match fs::remove_dir(dir) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn subdirectories(dir: &Path) -> Result<Vec<String>> {
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut names = Vec::new();
        for entry in entries {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                if let Some(name) = entry.file_name().to_str() {
                    names.push(name.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }

    fn document_files(dir: &Path) -> Result<Vec<PathBuf>> {
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut files = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if path.is_file() && path.extension().map_or(false, |ext| ext == DOCUMENT_EXTENSION) {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }

    /// Directories become objects, `<id>.json` files become entries
    fn build_object_from_dir(dir: &Path) -> Result<Value> {
        let mut object = Map::new();
        let mut entries = fs::read_dir(dir)?.collect::<std::io::Result<Vec<_>>>()?;
        entries.sort_by_key(|entry| entry.file_name());

        for entry in entries {
            let path = entry.path();
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            if entry.file_type()?.is_dir() {
                object.insert(name, Self::build_object_from_dir(&path)?);
            } else if path.extension().map_or(false, |ext| ext == DOCUMENT_EXTENSION) {
                let key = name.trim_end_matches(".json").to_string();
                match Self::read_document_file(&path) {
                    Ok(doc) => {
                        object.insert(key, Value::Object(doc));
                    }
                    Err(e) => tracing::warn!("Skipping {} during export: {}", path.display(), e),
                }
            }
        }

        Ok(Value::Object(object))
    }
}

impl StorageBackend for FsStorage {
    fn create(
        &self,
        database: &str,
        collection: Option<&str>,
        document: Option<Document>,
    ) -> Result<CreateOutcome> {
        if document.is_some() && collection.is_none() {
            return Err(MpdbError::validation(
                "Database and Document provided but no Collection",
            ));
        }

        let mut outcome = CreateOutcome::default();

        let db_path = self.database_path(database)?;
        outcome.database_created = Self::ensure_dir(&db_path)?;

        let Some(collection) = collection else {
            return Ok(outcome);
        };
        let col_path = self.collection_path(database, collection)?;
        outcome.collection_created = Self::ensure_dir(&col_path)?;

        let Some(mut document) = document else {
            return Ok(outcome);
        };

        let id = generate_id();
        document.insert(ID_FIELD.to_string(), Value::String(id.clone()));
        document.insert(
            CREATED_AT_FIELD.to_string(),
            Value::String(Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)),
        );

        let doc_path = self.document_path(database, collection, &id)?;
        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&doc_path)
            .map_err(|e| match e.kind() {
                ErrorKind::AlreadyExists => {
                    MpdbError::Conflict(format!("Document with ID {} already exists", id))
                }
                _ => MpdbError::Io(e),
            })?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, &document)?;
        writer.flush()?;

        tracing::debug!("Created document {}/{}/{}", database, collection, id);
        outcome.document_id = Some(id);
        Ok(outcome)
    }

    fn read(&self, database: &str, collection: &str, doc_id: &str) -> Result<Document> {
        let path = self.existing_document_path(database, collection, doc_id)?;
        Self::read_document_file(&path)
    }

    fn rename_database(&self, from: &str, to: &str) -> Result<()> {
        let from_path = self.database_path(from)?;
        let to_path = self.database_path(to)?;
        if !from_path.is_dir() {
            return Err(MpdbError::DatabaseNotFound(from.to_string()));
        }
        if to_path.exists() {
            return Err(MpdbError::Conflict(format!("Database '{}' already exists", to)));
        }
        fs::rename(&from_path, &to_path)?;
        tracing::debug!("Renamed database {} -> {}", from, to);
        Ok(())
    }

    fn rename_collection(&self, database: &str, from: &str, to: &str) -> Result<()> {
        let from_path = self.collection_path(database, from)?;
        let to_path = self.collection_path(database, to)?;
        if !from_path.is_dir() {
            return Err(not_found_collection(database, from));
        }
        if to_path.exists() {
            return Err(MpdbError::Conflict(format!(
                "Collection '{}' already exists in database {}",
                to, database
            )));
        }
        fs::rename(&from_path, &to_path)?;
        tracing::debug!("Renamed collection {}/{} -> {}", database, from, to);
        Ok(())
    }

    fn merge_document(
        &self,
        database: &str,
        collection: &str,
        doc_id: &str,
        patch: &Document,
    ) -> Result<Document> {
        let path = self.existing_document_path(database, collection, doc_id)?;
        let stored = Self::read_document_file(&path)?;

        if let (Some(stored_id), Some(incoming_id)) = (stored.get(ID_FIELD), patch.get(ID_FIELD)) {
            if stored_id != incoming_id {
                return Err(MpdbError::validation(
                    "Object ID mismatch: cannot update document with different ID",
                ));
            }
        }

        let mut merged = stored.clone();
        for (field, value) in patch {
            merged.insert(field.clone(), value.clone());
        }
        for fixed in [ID_FIELD, CREATED_AT_FIELD] {
            if let Some(value) = stored.get(fixed) {
                merged.insert(fixed.to_string(), value.clone());
            }
        }

        Self::replace_document_file(&path, &merged)?;
        Ok(merged)
    }

    fn delete(
        &self,
        database: &str,
        collection: Option<&str>,
        doc_id: Option<&str>,
    ) -> Result<DeleteOutcome> {
        let db_path = self.database_path(database)?;
        let mut outcome = DeleteOutcome::default();

        match (collection, doc_id) {
            (None, None) => {
                fs::remove_dir_all(&db_path).map_err(|e| match e.kind() {
                    ErrorKind::NotFound => MpdbError::DatabaseNotFound(database.to_string()),
                    _ => MpdbError::Io(e),
                })?;
            }
            (Some(collection), None) => {
                let col_path = self.collection_path(database, collection)?;
                fs::remove_dir_all(&col_path).map_err(|e| match e.kind() {
                    ErrorKind::NotFound => not_found_collection(database, collection),
                    _ => MpdbError::Io(e),
                })?;
                outcome.pruned_database = Self::prune_if_empty(&db_path)?;
            }
            (Some(collection), Some(doc_id)) => {
                let doc_path = self.existing_document_path(database, collection, doc_id)?;
                fs::remove_file(&doc_path).map_err(|e| match e.kind() {
                    ErrorKind::NotFound => not_found_document(collection, doc_id),
                    _ => MpdbError::Io(e),
                })?;
                let col_path = self.collection_path(database, collection)?;
                outcome.pruned_collection = Self::prune_if_empty(&col_path)?;
                if outcome.pruned_collection {
                    outcome.pruned_database = Self::prune_if_empty(&db_path)?;
                }
            }
            (None, Some(_)) => {
                return Err(MpdbError::validation(
                    "Collection name is required to delete a document",
                ));
            }
        }

        tracing::debug!(
            "Deleted {}{}{}",
            database,
            collection.map(|c| format!("/{}", c)).unwrap_or_default(),
            doc_id.map(|d| format!("/{}", d)).unwrap_or_default()
        );
        Ok(outcome)
    }

    fn list(&self, database: Option<&str>, collection: Option<&str>) -> Result<Listing> {
        match (database, collection) {
            (None, None) => Ok(Listing::Databases(Self::subdirectories(&self.root)?)),
            (Some(database), None) => {
                let db_path = self.database_path(database)?;
                Ok(Listing::Collections(Self::subdirectories(&db_path)?))
            }
            (Some(database), Some(collection)) => {
                let col_path = self.collection_path(database, collection)?;
                let docs = Self::document_files(&col_path)?
                    .iter()
                    .map(|path| Self::read_document_file(path))
                    .collect::<Result<Vec<_>>>()?;
                Ok(Listing::Documents(docs))
            }
            (None, Some(_)) => Err(MpdbError::validation(
                "Database name is required to list a collection",
            )),
        }
    }

    fn exists(&self, database: &str, collection: Option<&str>) -> bool {
        let path = match collection {
            Some(collection) => self.collection_path(database, collection),
            None => self.database_path(database),
        };
        path.map_or(false, |p| p.is_dir())
    }

    fn export(&self, selector: &ExportSelector) -> Result<Value> {
        let ExportSelector {
            database,
            collection,
            document,
        } = selector;

        match (database, collection, document) {
            (None, None, None) => Self::build_object_from_dir(&self.root),
            (Some(db), None, None) => {
                let path = self.database_path(db)?;
                if !path.is_dir() {
                    return Err(MpdbError::DatabaseNotFound(db.clone()));
                }
                Ok(wrap(&[db], Self::build_object_from_dir(&path)?))
            }
            (Some(db), Some(col), None) => {
                if !self.exists(db, None) {
                    return Err(MpdbError::DatabaseNotFound(db.clone()));
                }
                let path = self.collection_path(db, col)?;
                if !path.is_dir() {
                    return Err(not_found_collection(db, col));
                }
                Ok(wrap(&[db, col], Self::build_object_from_dir(&path)?))
            }
            (Some(db), Some(col), Some(doc)) => {
                let built = Value::Object(self.read(db, col, doc)?);
                Ok(wrap(&[db, col, doc], built))
            }
            (None, Some(_), _) => Err(MpdbError::validation(
                "Database name is required to export a collection",
            )),
            (_, None, Some(_)) => Err(MpdbError::validation(
                "Database and collection name are required to export a document",
            )),
        }
    }
}

/// Reject names that are empty or could escape their directory
pub fn validate_name(kind: &str, name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(MpdbError::validation(format!("{} name must not be empty", kind)));
    }
    if name == "." || name == ".." || name.contains(['/', '\\', '#', '\0']) {
        return Err(MpdbError::validation(format!("Invalid {} name: '{}'", kind.to_lowercase(), name)));
    }
    Ok(())
}

fn wrap(path: &[&String], inner: Value) -> Value {
    path.iter().rev().fold(inner, |acc, segment| {
        let mut object = Map::new();
        object.insert((*segment).clone(), acc);
        Value::Object(object)
    })
}

fn not_found_collection(database: &str, collection: &str) -> MpdbError {
    MpdbError::CollectionNotFound {
        database: database.to_string(),
        collection: collection.to_string(),
    }
}

fn not_found_document(collection: &str, doc_id: &str) -> MpdbError {
    MpdbError::DocumentNotFound {
        collection: collection.to_string(),
        id: doc_id.to_string(),
    }
}
