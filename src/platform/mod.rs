//! Seams between the tracking core and the course platforms

mod canvas;
mod models;
mod piazza;

pub use canvas::CanvasPlatform;
pub use models::*;
pub use piazza::PiazzaPlatform;

use async_trait::async_trait;
use chrono::NaiveDateTime;

use crate::db::types::{CourseEntity, CourseId, ForumEntity};
use crate::error::Result;

/// Course LMS (Canvas)
#[async_trait]
pub trait CoursePlatform: Send + Sync {
    /// Course metadata; `EntityNotFound` when the id is unknown
    async fn course(&self, id: CourseId) -> Result<CourseEntity>;

    /// Announcements posted after `since` (everything when `None`)
    async fn announcements(
        &self,
        id: CourseId,
        since: Option<NaiveDateTime>,
    ) -> Result<Vec<Announcement>>;

    /// Published assignments
    async fn assignments(&self, id: CourseId) -> Result<Vec<Assignment>>;

    /// Modules and module items, flattened in course order
    async fn modules(&self, id: CourseId) -> Result<Vec<ModuleEntry>>;
}

/// Discussion forum (Piazza)
#[async_trait]
pub trait ForumPlatform: Send + Sync {
    async fn forum(&self, network_id: &str) -> Result<ForumEntity>;

    /// The latest `limit` posts, private ones included
    async fn recent_posts(&self, network_id: &str, limit: u32) -> Result<Vec<ForumPost>>;

    /// Public pinned posts among the latest `limit`
    async fn pinned_posts(&self, network_id: &str, limit: u32) -> Result<Vec<ForumPost>>;

    /// One public post by number
    async fn post(&self, network_id: &str, number: u64) -> Result<ForumPost>;
}
