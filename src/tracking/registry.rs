//! Which communities track which courses, and where their updates go
//!
//! Every mutation clones the affected record, edits the clone, writes it to
//! the store and only then swaps it into memory. A failed write therefore
//! leaves the in-memory state exactly as it was.

use chrono::NaiveDateTime;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use tracing::{error, info, warn};

use super::locks::{EntityKey, EntityLocks};
use crate::db::store::Store;
use crate::db::types::{
    add_unique, remove_item, ChannelId, CommunityId, CommunityRecord, CourseEntity, CourseId,
    ForumEntity, ForumTracking, ReminderWindow,
};
use crate::error::{Result, TrackerError};
use crate::platform::CoursePlatform;
use crate::utils::window::{format_timestamp, parse_timestamp};

/// Result of a `track` call, per requested id
#[derive(Debug, Default)]
pub struct TrackOutcome {
    pub added: Vec<CourseEntity>,
    pub already: Vec<CourseId>,
    pub failed: Vec<(CourseId, TrackerError)>,
}

#[derive(Debug, Default)]
pub struct UntrackOutcome {
    pub removed: Vec<CourseId>,
    pub missing: Vec<CourseId>,
}

pub struct TrackRegistry {
    communities: RwLock<HashMap<CommunityId, CommunityRecord>>,
    /// Serialises read-modify-write of community records
    write_lock: Mutex<()>,
    store: Store,
    platform: Arc<dyn CoursePlatform>,
    locks: EntityLocks,
}

impl TrackRegistry {
    pub fn new(store: Store, platform: Arc<dyn CoursePlatform>) -> Self {
        Self {
            communities: RwLock::new(HashMap::new()),
            write_lock: Mutex::new(()),
            store,
            platform,
            locks: EntityLocks::default(),
        }
    }

    /// Load every community record, then bring per-entity subscriber lists in line
    pub async fn load(&self) -> Result<usize> {
        let records = self
            .store
            .communities()
            .await
            .map_err(TrackerError::PersistenceRead)?;
        let count = records.len();
        *self.communities.write().await = records.into_iter().collect();
        info!("📚 Loaded {} tracking communities", count);

        let mut courses: BTreeSet<CourseId> = self.tracked_courses().await.into_iter().collect();
        courses.extend(
            self.store
                .subscribed_courses()
                .await
                .map_err(TrackerError::PersistenceRead)?,
        );
        for course in courses {
            if let Err(e) = self.resync_entity(course).await {
                error!("Failed to reconcile state of course {}: {:#}", course, e);
            }
        }

        Ok(count)
    }

    // ==================== Reads ====================

    pub async fn community(&self, id: CommunityId) -> Option<CommunityRecord> {
        self.communities.read().await.get(&id).cloned()
    }

    /// Copy of every community record
    pub async fn snapshot(&self) -> Vec<(CommunityId, CommunityRecord)> {
        let mut all: Vec<_> = self
            .communities
            .read()
            .await
            .iter()
            .map(|(id, record)| (*id, record.clone()))
            .collect();
        all.sort_by_key(|(id, _)| *id);
        all
    }

    /// Courses tracked by at least one community
    pub async fn tracked_courses(&self) -> Vec<CourseId> {
        let communities = self.communities.read().await;
        let courses: BTreeSet<CourseId> = communities
            .values()
            .flat_map(|r| r.entity_ids())
            .collect();
        courses.into_iter().collect()
    }

    pub async fn lock_entity(&self, key: EntityKey) -> OwnedMutexGuard<()> {
        self.locks.lock(key).await
    }

    // ==================== Community mutations ====================

    /// Apply `f` to a copy of the record, persist, then publish
    async fn mutate<T>(
        &self,
        community: CommunityId,
        f: impl FnOnce(&mut CommunityRecord) -> T,
    ) -> Result<T> {
        let _guard = self.write_lock.lock().await;

        let original = self.community(community).await;
        let mut record = original.clone().unwrap_or_default();
        let out = f(&mut record);

        if original.as_ref() != Some(&record) {
            self.store
                .save_community(community, &record)
                .await
                .map_err(TrackerError::PersistenceWrite)?;
            self.communities.write().await.insert(community, record);
        }
        Ok(out)
    }

    /// Start tracking courses; already tracked ids are left untouched
    pub async fn track(
        &self,
        community: CommunityId,
        ids: &[CourseId],
        now: NaiveDateTime,
    ) -> Result<TrackOutcome> {
        let mut outcome = TrackOutcome::default();
        let current = self.community(community).await.unwrap_or_default();

        let mut requested: Vec<CourseId> = Vec::new();
        for id in ids {
            if !requested.contains(id) {
                requested.push(*id);
            }
        }

        for id in requested {
            if current.tracks(id) {
                outcome.already.push(id);
                continue;
            }
            match self.platform.course(id).await {
                Ok(entity) => outcome.added.push(entity),
                Err(e) => {
                    warn!("Cannot track course {} in {}: {}", id, community, e);
                    outcome.failed.push((id, e));
                }
            }
        }

        if outcome.added.is_empty() {
            return Ok(outcome);
        }

        let cursor = format_timestamp(now);
        let added = outcome.added.clone();
        let skipped = self
            .mutate(community, |record| {
                added
                    .into_iter()
                    .filter_map(|entity| {
                        let id = entity.id;
                        (!record.insert_entity(entity, cursor.clone())).then_some(id)
                    })
                    .collect::<Vec<_>>()
            })
            .await?;

        // Raced with another track of the same id
        if !skipped.is_empty() {
            outcome.added.retain(|e| !skipped.contains(&e.id));
            outcome.already.extend(skipped);
        }

        for entity in &outcome.added {
            info!("➕ {} now tracks {} ({})", community, entity.name, entity.id);
            if let Err(e) = self.resync_entity(entity.id).await {
                error!("Failed to update subscribers of course {}: {:#}", entity.id, e);
            }
        }

        Ok(outcome)
    }

    /// Stop tracking courses, dropping their cursors
    pub async fn untrack(&self, community: CommunityId, ids: &[CourseId]) -> Result<UntrackOutcome> {
        let requested = ids.to_vec();
        let outcome = self
            .mutate(community, |record| {
                let mut outcome = UntrackOutcome::default();
                for id in requested {
                    if record.remove_entity(id) {
                        outcome.removed.push(id);
                    } else if !outcome.removed.contains(&id) && !outcome.missing.contains(&id) {
                        outcome.missing.push(id);
                    }
                }
                outcome
            })
            .await?;

        for course in &outcome.removed {
            info!("➖ {} no longer tracks {}", community, course);
            self.locks.forget(EntityKey::Announcements(community, *course));
            self.locks.forget(EntityKey::DueDates(community, *course));
            if let Err(e) = self.resync_entity(*course).await {
                error!("Failed to update subscribers of course {}: {:#}", course, e);
            }
        }

        Ok(outcome)
    }

    /// Add a delivery channel for every course of the community
    pub async fn subscribe_channel(&self, community: CommunityId, channel: ChannelId) -> Result<bool> {
        let added = self
            .mutate(community, |record| record.add_channel(channel))
            .await?;
        if added {
            self.resync_community_entities(community).await;
        }
        Ok(added)
    }

    /// Remove a delivery channel; tracked courses stay tracked
    pub async fn unsubscribe_channel(
        &self,
        community: CommunityId,
        channel: ChannelId,
    ) -> Result<bool> {
        let removed = self
            .mutate(community, |record| record.remove_channel(channel))
            .await?;
        if removed {
            self.resync_community_entities(community).await;
        }
        Ok(removed)
    }

    /// Move the announcement cursor forward; older values are ignored
    pub async fn advance_last_seen(
        &self,
        community: CommunityId,
        course: CourseId,
        to: NaiveDateTime,
    ) -> Result<()> {
        self.mutate(community, |record| {
            let Some(current) = record.last_seen.get_mut(&course) else {
                return;
            };
            if parse_timestamp(current).is_none_or(|c| to > c) {
                *current = format_timestamp(to);
            }
        })
        .await
    }

    /// Replace a due-soon identifier set of a tracked course
    pub async fn replace_due_set(
        &self,
        community: CommunityId,
        course: CourseId,
        window: ReminderWindow,
        ids: Vec<String>,
    ) -> Result<()> {
        self.mutate(community, |record| {
            if record.tracks(course) {
                record.due_set_mut(window).insert(course, ids);
            }
        })
        .await
    }

    // ==================== Forum ====================

    /// Point the community at a forum, keeping its channels when the network is unchanged
    pub async fn set_forum(&self, community: CommunityId, forum: ForumEntity) -> Result<()> {
        self.mutate(community, |record| {
            let channels = match &record.forum {
                Some(existing) if existing.entity.network_id == forum.network_id => {
                    existing.channels.clone()
                }
                _ => Vec::new(),
            };
            record.forum = Some(ForumTracking {
                entity: forum,
                channels,
            });
        })
        .await
    }

    /// `None` when the community has no forum configured
    pub async fn subscribe_forum_channel(
        &self,
        community: CommunityId,
        channel: ChannelId,
    ) -> Result<Option<bool>> {
        self.mutate(community, |record| {
            record
                .forum
                .as_mut()
                .map(|forum| add_unique(&mut forum.channels, channel))
        })
        .await
    }

    pub async fn unsubscribe_forum_channel(
        &self,
        community: CommunityId,
        channel: ChannelId,
    ) -> Result<Option<bool>> {
        self.mutate(community, |record| {
            record
                .forum
                .as_mut()
                .map(|forum| remove_item(&mut forum.channels, channel))
        })
        .await
    }

    // ==================== Entity state ====================

    pub async fn subscribed_courses(&self) -> Result<Vec<CourseId>> {
        self.store
            .subscribed_courses()
            .await
            .map_err(TrackerError::PersistenceRead)
    }

    pub async fn subscribers(&self, course: CourseId) -> Result<Vec<ChannelId>> {
        self.store
            .load_subscribers(course)
            .await
            .map_err(TrackerError::PersistenceRead)
    }

    pub async fn module_snapshot(&self, course: CourseId) -> Result<Option<Vec<String>>> {
        self.store
            .load_modules(course)
            .await
            .map_err(TrackerError::PersistenceRead)
    }

    pub async fn replace_module_snapshot(&self, course: CourseId, ids: &[String]) -> Result<()> {
        self.store
            .save_modules(course, ids)
            .await
            .map_err(TrackerError::PersistenceWrite)
    }

    /// Display entity of a course, from any community tracking it
    pub async fn course_entity(&self, course: CourseId) -> Option<CourseEntity> {
        self.communities
            .read()
            .await
            .values()
            .find_map(|r| r.entity(course).cloned())
    }

    async fn resync_community_entities(&self, community: CommunityId) {
        let courses = self
            .community(community)
            .await
            .map(|r| r.entity_ids())
            .unwrap_or_default();
        for course in courses {
            if let Err(e) = self.resync_entity(course).await {
                error!("Failed to update subscribers of course {}: {:#}", course, e);
            }
        }
    }

    /// Make the subscriber list of `course` the union of the channels of every
    /// community tracking it. An empty list discards all entity state; a new
    /// list without a module snapshot downloads a silent baseline.
    async fn resync_entity(&self, course: CourseId) -> Result<()> {
        let _guard = self.locks.lock(EntityKey::Modules(course)).await;

        let mut wanted: Vec<ChannelId> = Vec::new();
        for (_, record) in self.snapshot().await {
            if record.tracks(course) {
                for channel in record.channels {
                    add_unique(&mut wanted, channel);
                }
            }
        }

        let stored = self
            .store
            .load_subscribers(course)
            .await
            .map_err(TrackerError::PersistenceRead)?;

        if wanted.is_empty() {
            if !stored.is_empty() || self.module_snapshot(course).await?.is_some() {
                self.store
                    .discard_entity(course)
                    .await
                    .map_err(TrackerError::PersistenceWrite)?;
                info!("🗑️ Discarded module state of course {}", course);
            }
            return Ok(());
        }

        if stored != wanted {
            self.store
                .save_subscribers(course, &wanted)
                .await
                .map_err(TrackerError::PersistenceWrite)?;
        }

        if self.module_snapshot(course).await?.is_none() {
            match self.platform.modules(course).await {
                Ok(entries) => {
                    let ids: Vec<String> = entries.into_iter().map(|e| e.id).collect();
                    self.replace_module_snapshot(course, &ids).await?;
                    info!("Downloaded {} module ids of course {} as baseline", ids.len(), course);
                }
                // The module poll records the baseline on its first pass instead
                Err(e) => warn!("Module baseline for course {} failed: {}", course, e),
            }
        }

        Ok(())
    }
}
