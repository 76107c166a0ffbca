use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::OwnedMutexGuard;

use crate::db::types::{CommunityId, CourseId};

/// State guarded by one fetch-detect-persist sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKey {
    /// Announcement cursor of one community for one course
    Announcements(CommunityId, CourseId),
    /// Due-soon sets of one community for one course
    DueDates(CommunityId, CourseId),
    /// Module snapshot and subscriber list of a course
    Modules(CourseId),
}

/// Lazily created async mutex per entity key
#[derive(Default)]
pub struct EntityLocks {
    locks: Mutex<HashMap<EntityKey, Arc<tokio::sync::Mutex<()>>>>,
}

impl EntityLocks {
    pub async fn lock(&self, key: EntityKey) -> OwnedMutexGuard<()> {
        let mutex = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            locks.entry(key).or_default().clone()
        };
        mutex.lock_owned().await
    }

    /// Drop the mutex of an entity that is no longer tracked
    ///
    /// Kept while a guard or a waiter still refers to it, otherwise a later
    /// `lock` would hand out a second mutex for the same key.
    pub fn forget(&self, key: EntityKey) {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        if locks.get(&key).is_some_and(|m| Arc::strong_count(m) == 1) {
            locks.remove(&key);
        }
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.locks.lock().unwrap().len()
    }
}
