use chrono::{Local, NaiveDateTime};
use std::sync::Arc;
use tracing::info;

use super::helpers::{deliver, run_every, TickStats};
use crate::db::types::{CommunityId, CourseEntity, ReminderWindow};
use crate::error::Result;
use crate::platform::CoursePlatform;
use crate::tracking::detector::detect_due;
use crate::tracking::{EntityKey, Notification, NotificationSink, TrackRegistry};
use crate::utils::window::Window;

/// Reminds communities of assignments due within a week and within a day
pub struct ReminderEngine {
    registry: Arc<TrackRegistry>,
    platform: Arc<dyn CoursePlatform>,
    sink: Arc<dyn NotificationSink>,
    interval_sec: u64,
}

impl ReminderEngine {
    pub fn new(
        registry: Arc<TrackRegistry>,
        platform: Arc<dyn CoursePlatform>,
        sink: Arc<dyn NotificationSink>,
        interval_sec: u64,
    ) -> Self {
        Self {
            registry,
            platform,
            sink,
            interval_sec,
        }
    }

    pub async fn run(self: Arc<Self>) {
        let interval_sec = self.interval_sec;
        run_every("Reminder", interval_sec, move || {
            let engine = self.clone();
            async move { engine.tick_at(Local::now().naive_local()).await }
        })
        .await;
    }

    pub async fn tick_at(&self, now: NaiveDateTime) -> TickStats {
        let mut stats = TickStats::default();
        for (community, record) in self.registry.snapshot().await {
            if record.channels.is_empty() {
                continue;
            }
            for entity in &record.entities {
                let outcome = self.poll_entity(community, entity, now).await;
                stats.record(outcome, "reminder", format_args!("{} in {}", entity.id, community));
            }
        }
        stats
    }

    async fn poll_entity(
        &self,
        community: CommunityId,
        entity: &CourseEntity,
        now: NaiveDateTime,
    ) -> Result<usize> {
        let _guard = self
            .registry
            .lock_entity(EntityKey::DueDates(community, entity.id))
            .await;

        let Some(record) = self.registry.community(community).await else {
            return Ok(0);
        };
        if !record.tracks(entity.id) || record.channels.is_empty() {
            return Ok(0);
        }

        // One fetch serves both windows
        let assignments = self.platform.assignments(entity.id).await?;

        let mut sent = 0;
        for window in ReminderWindow::ALL {
            let limit = Window::from_spec(window.spec(), now)?;
            let seen = record.due_set(window, entity.id);
            let scan = detect_due(&assignments, limit, seen, now);

            for item in &scan.fresh {
                let notification = Notification::reminder(entity, item, window);
                deliver(self.sink.as_ref(), &notification, &record.channels).await;
            }
            sent += scan.fresh.len();

            if scan.retained.as_slice() != seen {
                self.registry
                    .replace_due_set(community, entity.id, window, scan.retained)
                    .await?;
            }

            if !scan.fresh.is_empty() {
                info!(
                    "⏰ Sent {} reminders ({}) of {} to {}",
                    scan.fresh.len(),
                    window.label(),
                    entity.name,
                    community
                );
            }
        }

        Ok(sent)
    }
}
