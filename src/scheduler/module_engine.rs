use std::sync::Arc;
use tracing::{error, info, warn};

use super::helpers::{deliver, run_every, TickStats};
use crate::db::types::CourseId;
use crate::error::Result;
use crate::platform::CoursePlatform;
use crate::tracking::detector::diff_modules;
use crate::tracking::{EntityKey, Notification, NotificationSink, TrackRegistry};

/// Reports modules and module items that appear in subscribed courses
pub struct ModuleEngine {
    registry: Arc<TrackRegistry>,
    platform: Arc<dyn CoursePlatform>,
    sink: Arc<dyn NotificationSink>,
    interval_sec: u64,
}

impl ModuleEngine {
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
        run_every("Module", interval_sec, move || {
            let engine = self.clone();
            async move { engine.tick().await }
        })
        .await;
    }

    /// One pass over every course with a subscriber list
    pub async fn tick(&self) -> TickStats {
        let mut stats = TickStats::default();
        let courses = match self.registry.subscribed_courses().await {
            Ok(courses) => courses,
            Err(e) => {
                error!("Failed to list subscribed courses: {:#}", e);
                return stats;
            }
        };

        for course in courses {
            let outcome = self.poll_entity(course).await;
            stats.record(outcome, "module", course);
        }
        stats
    }

    async fn poll_entity(&self, course: CourseId) -> Result<usize> {
        let _guard = self.registry.lock_entity(EntityKey::Modules(course)).await;

        let channels = self.registry.subscribers(course).await?;
        if channels.is_empty() {
            return Ok(0);
        }
        let Some(entity) = self.registry.course_entity(course).await else {
            warn!("Course {} has subscribers but no tracking community", course);
            return Ok(0);
        };

        let current = self.platform.modules(course).await?;
        let previous = self.registry.module_snapshot(course).await?;
        let diff = diff_modules(&current, previous.as_deref());

        for entry in &diff.fresh {
            let notification = Notification::module(&entity, entry);
            deliver(self.sink.as_ref(), &notification, &channels).await;
        }

        if previous.as_ref() != Some(&diff.snapshot) {
            self.registry
                .replace_module_snapshot(course, &diff.snapshot)
                .await?;
            if previous.is_none() {
                info!(
                    "Recorded {} module ids of {} as baseline",
                    diff.snapshot.len(),
                    entity.name
                );
            }
        }

        if !diff.fresh.is_empty() {
            info!(
                "📦 Sent {} new modules of {} to {} channels",
                diff.fresh.len(),
                entity.name,
                channels.len()
            );
        }
        Ok(diff.fresh.len())
    }
}
