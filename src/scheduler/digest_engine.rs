use chrono::{Duration as ChronoDuration, Local, NaiveDateTime, NaiveTime};
use std::sync::Arc;
use tokio::time::{sleep, Duration};
use tracing::info;

use super::helpers::{deliver, next_daily_run, run_once, TickStats};
use crate::db::types::{CommunityId, ForumTracking};
use crate::error::Result;
use crate::platform::{ForumPlatform, ForumPost};
use crate::tracking::{Notification, NotificationSink, TrackRegistry};

/// Posts one forum digest per community every day
pub struct DigestEngine {
    registry: Arc<TrackRegistry>,
    platform: Arc<dyn ForumPlatform>,
    sink: Arc<dyn NotificationSink>,
    at: NaiveTime,
    fetch_max: u32,
    show_limit: usize,
}

/// Public posts of the last day, split for the digest
#[derive(Debug, Default)]
pub struct DigestSelection {
    pub instructor: Vec<ForumPost>,
    pub students: Vec<ForumPost>,
    /// More student posts than `show_limit`
    pub truncated: bool,
}

impl DigestSelection {
    pub fn from_posts(posts: Vec<ForumPost>, now: NaiveDateTime, show_limit: usize) -> Self {
        let since = now - ChronoDuration::days(1);
        let mut selection = DigestSelection::default();

        for post in posts {
            if post.is_private || post.created_at < since || post.created_at > now {
                continue;
            }
            if post.is_instructor_note {
                selection.instructor.push(post);
            } else if post.is_student_post {
                if selection.students.len() < show_limit {
                    selection.students.push(post);
                } else {
                    selection.truncated = true;
                }
            }
        }
        selection
    }
}

impl DigestEngine {
    pub fn new(
        registry: Arc<TrackRegistry>,
        platform: Arc<dyn ForumPlatform>,
        sink: Arc<dyn NotificationSink>,
        at: NaiveTime,
        fetch_max: u32,
        show_limit: usize,
    ) -> Self {
        Self {
            registry,
            platform,
            sink,
            at,
            fetch_max,
            show_limit,
        }
    }

    /// Main loop - runs once a day at the configured local time
    pub async fn run(self: Arc<Self>) {
        info!("🚀 Digest engine started (execution time: {})", self.at.format("%H:%M"));

        loop {
            let now = Local::now().naive_local();
            let next = next_daily_run(now, self.at);
            let wait = (next - now).to_std().unwrap_or_default();
            info!(
                "⏰ Next forum digest at: {} (in {} seconds)",
                next.format("%Y-%m-%d %H:%M:%S"),
                wait.as_secs()
            );
            sleep(wait).await;

            let engine = self.clone();
            run_once("Digest", async move {
                engine.tick_at(Local::now().naive_local()).await
            })
            .await;

            // Avoid running twice in the same minute
            sleep(Duration::from_secs(60)).await;
        }
    }

    pub async fn tick_at(&self, now: NaiveDateTime) -> TickStats {
        let mut stats = TickStats::default();
        for (community, record) in self.registry.snapshot().await {
            let Some(forum) = record.forum else {
                continue;
            };
            if forum.channels.is_empty() {
                continue;
            }
            let outcome = self.send_digest(community, &forum, now).await;
            stats.record(outcome, "forum digest", &forum.entity.network_id);
        }
        stats
    }

    async fn send_digest(
        &self,
        community: CommunityId,
        forum: &ForumTracking,
        now: NaiveDateTime,
    ) -> Result<usize> {
        let posts = self
            .platform
            .recent_posts(&forum.entity.network_id, self.fetch_max)
            .await?;
        let selection = DigestSelection::from_posts(posts, now, self.show_limit);

        let notification = Notification::forum_digest(
            &forum.entity,
            &selection.instructor,
            &selection.students,
            selection.truncated,
            now,
        );
        deliver(self.sink.as_ref(), &notification, &forum.channels).await;

        info!(
            "📰 Sent digest of {} to {} ({} notes, {} student posts)",
            forum.entity.name,
            community,
            selection.instructor.len(),
            selection.students.len()
        );
        Ok(1)
    }
}
