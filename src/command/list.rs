//! List
//!
//! Only the first database key and the first collection key under it are
//! looked at; further keys are ignored.

use serde_json::Value;

use crate::error::{MpdbError, Result};
use crate::protocol::{status, CommandType, ResourceId, Response};
use crate::storage::{validate_name, StorageBackend};

use super::not_found;

const KIND: CommandType = CommandType::List;

/// What to list: databases, collections of a database, or documents
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListTarget {
    pub database: Option<String>,
    pub collection: Option<String>,
}

impl ListTarget {
    pub fn parse(payload: &Value) -> Result<Self> {
        let map = match payload {
            Value::Object(map) => map,
            Value::Null => return Ok(Self::default()),
            _ => return Err(MpdbError::validation("Payload must be an object")),
        };

        let Some((database, nested)) = map.iter().next() else {
            return Ok(Self::default());
        };
        validate_name("database", database)?;

        let collection = nested
            .as_object()
            .and_then(|collections| collections.keys().next())
            .cloned();
        if let Some(collection) = &collection {
            validate_name("collection", collection)?;
        }

        Ok(Self {
            database: Some(database.clone()),
            collection,
        })
    }

    /// The listed resource, `None` when listing databases
    pub fn resource(&self) -> Option<ResourceId> {
        match (&self.database, &self.collection) {
            (Some(db), Some(col)) => Some(ResourceId::collection(db, col)),
            (Some(db), None) => Some(ResourceId::database(db)),
            _ => None,
        }
    }
}

pub(super) fn execute(target: &ListTarget, storage: &dyn StorageBackend) -> Result<Response> {
    let listing = storage.list(target.database.as_deref(), target.collection.as_deref())?;
    let count = listing.len();
    let data = listing.into_value();

    if count == 0 {
        return Ok(not_found(KIND).with_data(data));
    }
    Ok(Response::new(status::OK, KIND, format!("Successfully listed {} records", count)).with_data(data))
}
