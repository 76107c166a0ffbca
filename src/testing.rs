//! In-memory fakes shared by unit tests

use async_trait::async_trait;
use chrono::NaiveDateTime;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::db::store::StoreBackend;
use crate::db::types::{ChannelId, CourseEntity, CourseId, ForumEntity};
use crate::error::{Result, StoreError, TrackerError};
use crate::platform::{
    Announcement, Assignment, CoursePlatform, ForumAnswer, ForumPlatform, ForumPost, ModuleEntry,
    ModuleEntryKind,
};
use crate::tracking::{DeliveryReport, Notification, NotificationSink};

pub fn course_entity(id: u64) -> CourseEntity {
    CourseEntity {
        id: CourseId(id),
        name: format!("Course {}", id),
        url: format!("https://canvas.example.edu/courses/{}", id),
    }
}

pub fn announcement(id: &str, created_at: Option<NaiveDateTime>) -> Announcement {
    Announcement {
        id: id.to_string(),
        title: format!("Announcement {}", id),
        body: "Body".to_string(),
        url: format!("https://canvas.example.edu/a/{}", id),
        created_at,
    }
}

pub fn assignment(id: &str, due_at: Option<NaiveDateTime>) -> Assignment {
    Assignment {
        id: id.to_string(),
        name: format!("Assignment {}", id),
        description: String::new(),
        url: format!("https://canvas.example.edu/asg/{}", id),
        created_at: None,
        due_at,
    }
}

#[derive(Default)]
struct CourseData {
    entity: Option<CourseEntity>,
    announcements: Vec<Announcement>,
    assignments: Vec<Assignment>,
    modules: Vec<ModuleEntry>,
}

/// Scriptable `CoursePlatform`
#[derive(Default)]
pub struct FakeCoursePlatform {
    courses: Mutex<HashMap<CourseId, CourseData>>,
    failing: Mutex<HashSet<CourseId>>,
    panicking: Mutex<HashSet<CourseId>>,
    pub fetches: AtomicUsize,
}

impl FakeCoursePlatform {
    pub fn add_course(&self, entity: CourseEntity) {
        let id = entity.id;
        self.courses
            .lock()
            .unwrap()
            .entry(id)
            .or_default()
            .entity = Some(entity);
    }

    pub fn set_announcements(&self, id: CourseId, items: Vec<Announcement>) {
        self.courses.lock().unwrap().entry(id).or_default().announcements = items;
    }

    pub fn set_assignments(&self, id: CourseId, items: Vec<Assignment>) {
        self.courses.lock().unwrap().entry(id).or_default().assignments = items;
    }

    pub fn set_modules(&self, id: CourseId, ids: &[&str]) {
        self.courses.lock().unwrap().entry(id).or_default().modules = ids
            .iter()
            .map(|m| ModuleEntry {
                id: m.to_string(),
                kind: ModuleEntryKind::Module,
                name: m.to_uppercase(),
                url: None,
            })
            .collect();
    }

    /// Every fetch for `id` fails with `TransientFetch` until cleared
    pub fn set_failing(&self, id: CourseId, failing: bool) {
        let mut set = self.failing.lock().unwrap();
        if failing {
            set.insert(id);
        } else {
            set.remove(&id);
        }
    }

    pub fn set_panicking(&self, id: CourseId) {
        self.panicking.lock().unwrap().insert(id);
    }

    fn check(&self, id: CourseId) -> Result<()> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if self.panicking.lock().unwrap().contains(&id) {
            panic!("platform blew up for course {}", id);
        }
        if self.failing.lock().unwrap().contains(&id) {
            return Err(TrackerError::TransientFetch(format!("course {} is down", id)));
        }
        Ok(())
    }

    fn with_course<T>(&self, id: CourseId, f: impl FnOnce(&CourseData) -> T) -> Result<T> {
        self.check(id)?;
        let courses = self.courses.lock().unwrap();
        match courses.get(&id) {
            Some(data) if data.entity.is_some() => Ok(f(data)),
            _ => Err(TrackerError::EntityNotFound(format!("course {}", id))),
        }
    }
}

#[async_trait]
impl CoursePlatform for FakeCoursePlatform {
    async fn course(&self, id: CourseId) -> Result<CourseEntity> {
        self.with_course(id, |c| c.entity.clone())?
            .ok_or_else(|| TrackerError::EntityNotFound(format!("course {}", id)))
    }

    async fn announcements(
        &self,
        id: CourseId,
        _since: Option<NaiveDateTime>,
    ) -> Result<Vec<Announcement>> {
        self.with_course(id, |c| c.announcements.clone())
    }

    async fn assignments(&self, id: CourseId) -> Result<Vec<Assignment>> {
        self.with_course(id, |c| c.assignments.clone())
    }

    async fn modules(&self, id: CourseId) -> Result<Vec<ModuleEntry>> {
        self.with_course(id, |c| c.modules.clone())
    }
}

pub fn forum_post(number: u64, created_at: NaiveDateTime, tag: &str) -> ForumPost {
    ForumPost {
        number,
        subject: format!("Post {}", number),
        body: String::new(),
        url: format!("https://piazza.com/class/abc?cid={}", number),
        created_at,
        is_note: tag == "instructor-note",
        tags: vec![tag.to_string()],
        is_private: false,
        is_pinned: false,
        is_instructor_note: tag == "instructor-note",
        is_student_post: tag == "student",
        answer: ForumAnswer {
            heading: "Answers".to_string(),
            body: "No answers yet :(".to_string(),
        },
        answer_count: 0,
    }
}

/// Scriptable `ForumPlatform` serving one post list for every network
#[derive(Default)]
pub struct FakeForumPlatform {
    pub posts: Mutex<Vec<ForumPost>>,
    pub requested_limits: Mutex<Vec<u32>>,
}

#[async_trait]
impl ForumPlatform for FakeForumPlatform {
    async fn forum(&self, network_id: &str) -> Result<ForumEntity> {
        Ok(ForumEntity {
            name: format!("Forum {}", network_id),
            network_id: network_id.to_string(),
            url: format!("https://piazza.com/class/{}", network_id),
        })
    }

    async fn recent_posts(&self, _network_id: &str, limit: u32) -> Result<Vec<ForumPost>> {
        self.requested_limits.lock().unwrap().push(limit);
        Ok(self
            .posts
            .lock()
            .unwrap()
            .iter()
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn pinned_posts(&self, network_id: &str, limit: u32) -> Result<Vec<ForumPost>> {
        Ok(self
            .recent_posts(network_id, limit)
            .await?
            .into_iter()
            .filter(|p| p.is_pinned && !p.is_private)
            .collect())
    }

    async fn post(&self, _network_id: &str, number: u64) -> Result<ForumPost> {
        self.posts
            .lock()
            .unwrap()
            .iter()
            .find(|p| p.number == number && !p.is_private)
            .cloned()
            .ok_or_else(|| TrackerError::EntityNotFound(format!("post @{}", number)))
    }
}

/// `StoreBackend` over a `BTreeMap`
#[derive(Default)]
pub struct MemoryBackend {
    entries: Mutex<BTreeMap<String, serde_json::Value>>,
}

#[async_trait]
impl StoreBackend for MemoryBackend {
    async fn get(&self, key: &str) -> std::result::Result<Option<serde_json::Value>, StoreError> {
        Ok(self.entries.lock().unwrap().get(key).cloned())
    }

    async fn set(&self, key: &str, value: serde_json::Value) -> std::result::Result<(), StoreError> {
        self.entries.lock().unwrap().insert(key.to_string(), value);
        Ok(())
    }

    async fn delete(&self, key: &str) -> std::result::Result<(), StoreError> {
        self.entries.lock().unwrap().remove(key);
        Ok(())
    }

    async fn keys(&self, prefix: &str) -> std::result::Result<Vec<String>, StoreError> {
        Ok(self
            .entries
            .lock()
            .unwrap()
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect())
    }
}

/// Wraps a backend and rejects writes on demand
pub struct FlakyBackend {
    inner: Arc<dyn StoreBackend>,
    fail_writes: AtomicBool,
}

impl FlakyBackend {
    pub fn new(inner: Arc<dyn StoreBackend>) -> Self {
        Self {
            inner,
            fail_writes: AtomicBool::new(false),
        }
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn check(&self) -> std::result::Result<(), StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Database(sea_orm::DbErr::Custom(
                "disk full".to_string(),
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl StoreBackend for FlakyBackend {
    async fn get(&self, key: &str) -> std::result::Result<Option<serde_json::Value>, StoreError> {
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: serde_json::Value) -> std::result::Result<(), StoreError> {
        self.check()?;
        self.inner.set(key, value).await
    }

    async fn delete(&self, key: &str) -> std::result::Result<(), StoreError> {
        self.check()?;
        self.inner.delete(key).await
    }

    async fn keys(&self, prefix: &str) -> std::result::Result<Vec<String>, StoreError> {
        self.inner.keys(prefix).await
    }
}

/// Sink that records deliveries; channels in `failing` report failure
#[derive(Default)]
pub struct RecordingSink {
    pub delivered: Mutex<Vec<(Notification, Vec<ChannelId>)>>,
    pub failing: Mutex<HashSet<ChannelId>>,
}

impl RecordingSink {
    pub fn items(&self) -> Vec<String> {
        self.delivered
            .lock()
            .unwrap()
            .iter()
            .map(|(n, _)| n.item_id.clone())
            .collect()
    }

    pub fn count(&self) -> usize {
        self.delivered.lock().unwrap().len()
    }
}

#[async_trait]
impl NotificationSink for RecordingSink {
    async fn deliver(&self, notification: &Notification, channels: &[ChannelId]) -> DeliveryReport {
        let failing = self.failing.lock().unwrap().clone();
        let mut report = DeliveryReport::default();
        let mut reached = Vec::new();
        for channel in channels {
            if failing.contains(channel) {
                report.failed.push(*channel);
            } else {
                report.succeeded.push(*channel);
                reached.push(*channel);
            }
        }
        self.delivered
            .lock()
            .unwrap()
            .push((notification.clone(), reached));
        report
    }
}
