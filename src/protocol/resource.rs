//! Resource identifiers
//!
//! Canonical `db`, `db/collection`, `db/collection/doc` paths used for
//! locking and permission checks. The empty id is the root resource that
//! stands for "every database".

use std::collections::BTreeMap;
use std::fmt;

/// Separator between path segments
pub const SEPARATOR: char = '/';

/// A canonical resource path
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct ResourceId(String);

impl ResourceId {
    pub fn root() -> Self {
        Self(String::new())
    }

    pub fn database(database: &str) -> Self {
        Self(database.to_string())
    }

    pub fn collection(database: &str, collection: &str) -> Self {
        Self(format!("{database}{SEPARATOR}{collection}"))
    }

    pub fn document(database: &str, collection: &str, doc_id: &str) -> Self {
        Self(format!("{database}{SEPARATOR}{collection}{SEPARATOR}{doc_id}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    /// Path segments; empty for the root
    pub fn segments(&self) -> Vec<&str> {
        if self.is_root() {
            Vec::new()
        } else {
            self.0.split(SEPARATOR).collect()
        }
    }

    /// 0 for the root, 1 for a database, 2 for a collection, 3 for a document
    pub fn depth(&self) -> usize {
        self.segments().len()
    }

    /// Database segment, `None` for the root
    pub fn database_name(&self) -> Option<&str> {
        self.0.split(SEPARATOR).next().filter(|name| !name.is_empty())
    }

    pub fn parent(&self) -> Option<ResourceId> {
        if self.is_root() {
            return None;
        }
        match self.0.rfind(SEPARATOR) {
            Some(pos) => Some(Self(self.0[..pos].to_string())),
            None => Some(Self::root()),
        }
    }

    /// Every strict ancestor, root first
    pub fn ancestors(&self) -> Vec<ResourceId> {
        let mut ancestors = Vec::new();
        let mut current = self.parent();
        while let Some(id) = current {
            current = id.parent();
            ancestors.push(id);
        }
        ancestors.reverse();
        ancestors
    }

    /// The database (depth 1) or collection (depth 2) this id lives in.
    /// Ids already at or above `depth` are returned unchanged.
    pub fn truncate(&self, depth: usize) -> ResourceId {
        let segments = self.segments();
        if segments.len() <= depth {
            return self.clone();
        }
        Self(segments[..depth].join(&SEPARATOR.to_string()))
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_root() {
            f.write_str("<root>")
        } else {
            f.write_str(&self.0)
        }
    }
}

/// Lock mode a command needs on a resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Access {
    Shared,
    Exclusive,
}

/// One entry of a command's lock plan
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resource {
    pub id: ResourceId,
    pub access: Access,
}

impl Resource {
    pub fn shared(id: ResourceId) -> Self {
        Self {
            id,
            access: Access::Shared,
        }
    }

    pub fn exclusive(id: ResourceId) -> Self {
        Self {
            id,
            access: Access::Exclusive,
        }
    }
}

/// Lock plan for a set of requested resources: every request plus all of
/// its ancestors (shared), merged to the strongest mode per id and sorted
/// ascending. The root is always present.
pub fn lock_plan(requests: impl IntoIterator<Item = Resource>) -> Vec<Resource> {
    let mut plan = BTreeMap::new();
    plan.insert(ResourceId::root(), Access::Shared);
    for Resource { id, access } in requests {
        for ancestor in id.ancestors() {
            plan.entry(ancestor).or_insert(Access::Shared);
        }
        let mode = plan.entry(id).or_insert(access);
        *mode = (*mode).max(access);
    }
    plan.into_iter()
        .map(|(id, access)| Resource { id, access })
        .collect()
}
