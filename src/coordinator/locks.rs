//! Resource lock table
//!
//! One reader/writer lock per resource id, created on first use and kept for
//! the life of the process. A command acquires its whole plan in ascending
//! id order and releases it in reverse when the [`LockGuard`] drops.
//!
//! ## Deadlock Freedom
//! Every acquirer walks the same global order, so a thread only ever waits
//! on an id greater than every id it already holds. Waiting writers block
//! new readers on the same id, which keeps writers from starving without
//! breaking the ordering argument. The locks are parking_lot `RwLock`s,
//! whose fair unlocking gives exactly that.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::{ArcRwLockReadGuard, ArcRwLockWriteGuard, Mutex, RawRwLock, RwLock};

use crate::protocol::{Access, Resource, ResourceId};

/// Process-wide map of resource locks
#[derive(Debug, Default)]
pub struct LockTable {
    locks: Mutex<HashMap<ResourceId, Arc<RwLock<()>>>>,
}

impl LockTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Block until every resource in `plan` is held in its mode.
    ///
    /// The plan is sorted by id before acquisition; duplicate ids keep the
    /// strongest mode.
    pub fn acquire(&self, mut plan: Vec<Resource>) -> LockGuard {
        plan.sort_by(|a, b| a.id.cmp(&b.id).then(b.access.cmp(&a.access)));
        plan.dedup_by(|later, earlier| later.id == earlier.id);

        let mut held = Vec::with_capacity(plan.len());
        for Resource { id, access } in plan {
            let lock = self.lock_for(&id);
            let guard = match access {
                Access::Shared => HeldGuard::Shared(lock.read_arc()),
                Access::Exclusive => HeldGuard::Exclusive(lock.write_arc()),
            };
            tracing::trace!("Locked {} ({:?})", id, access);
            held.push(Held { id, access, guard });
        }
        LockGuard { held }
    }

    /// Number of resources that have ever been locked
    pub fn len(&self) -> usize {
        self.locks.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock_for(&self, id: &ResourceId) -> Arc<RwLock<()>> {
        let mut locks = self.locks.lock();
        Arc::clone(locks.entry(id.clone()).or_default())
    }
}

enum HeldGuard {
    Shared(ArcRwLockReadGuard<RawRwLock, ()>),
    Exclusive(ArcRwLockWriteGuard<RawRwLock, ()>),
}

struct Held {
    id: ResourceId,
    access: Access,
    guard: HeldGuard,
}

impl fmt::Debug for Held {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Held")
            .field("id", &self.id)
            .field("access", &self.access)
            .finish()
    }
}

/// Locks held by one command; released in reverse order on drop
#[derive(Debug)]
pub struct LockGuard {
    held: Vec<Held>,
}

impl LockGuard {
    /// Held resources in acquisition order
    pub fn resources(&self) -> Vec<Resource> {
        self.held
            .iter()
            .map(|held| Resource {
                id: held.id.clone(),
                access: held.access,
            })
            .collect()
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        while let Some(held) = self.held.pop() {
            match held.guard {
                HeldGuard::Shared(guard) => drop(guard),
                HeldGuard::Exclusive(guard) => drop(guard),
            }
            tracing::trace!("Released {} ({:?})", held.id, held.access);
        }
    }
}
