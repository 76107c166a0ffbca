use chrono::{Local, NaiveDateTime};
use std::sync::Arc;
use tracing::{info, warn};

use super::helpers::{deliver, log_entity_error, run_every, TickStats};
use crate::db::types::{CommunityId, CourseEntity, CourseId};
use crate::error::{Result, TrackerError};
use crate::platform::CoursePlatform;
use crate::tracking::detector::detect_announcements;
use crate::tracking::{EntityKey, FeedOrder, Notification, NotificationSink, TrackRegistry};
use crate::utils::window::{parse_timestamp, Window};

/// Outcome of a manual refresh
#[derive(Debug, Default)]
pub struct RefreshSummary {
    pub polled: usize,
    pub notified: usize,
    pub failed: Vec<(CourseId, String)>,
}

/// Polls announcement feeds and advances the per-community cursors
pub struct AnnouncementEngine {
    registry: Arc<TrackRegistry>,
    platform: Arc<dyn CoursePlatform>,
    sink: Arc<dyn NotificationSink>,
    interval_sec: u64,
    order: FeedOrder,
}

impl AnnouncementEngine {
    pub fn new(
        registry: Arc<TrackRegistry>,
        platform: Arc<dyn CoursePlatform>,
        sink: Arc<dyn NotificationSink>,
        interval_sec: u64,
        order: FeedOrder,
    ) -> Self {
        Self {
            registry,
            platform,
            sink,
            interval_sec,
            order,
        }
    }

    /// Main loop - runs indefinitely
    pub async fn run(self: Arc<Self>) {
        let interval_sec = self.interval_sec;
        run_every("Announcement", interval_sec, move || {
            let engine = self.clone();
            async move { engine.tick_at(Local::now().naive_local()).await }
        })
        .await;
    }

    /// One pass over every course of every community with a live channel
    pub async fn tick_at(&self, now: NaiveDateTime) -> TickStats {
        let mut stats = TickStats::default();
        for (community, record) in self.registry.snapshot().await {
            if record.channels.is_empty() {
                continue;
            }
            for entity in &record.entities {
                let outcome = self.poll_entity(community, entity, now).await;
                stats.record(outcome, "announcement", format_args!("{} in {}", entity.id, community));
            }
        }
        stats
    }

    /// Poll every course of one community right away
    pub async fn refresh(&self, community: CommunityId, now: NaiveDateTime) -> Result<RefreshSummary> {
        let record = self
            .registry
            .community(community)
            .await
            .ok_or_else(|| TrackerError::EntityNotFound(format!("community {}", community)))?;

        let mut summary = RefreshSummary::default();
        for entity in &record.entities {
            summary.polled += 1;
            match self.poll_entity(community, entity, now).await {
                Ok(n) => summary.notified += n,
                Err(e) => {
                    log_entity_error("announcement", entity.id, &e);
                    summary.failed.push((entity.id, e.to_string()));
                }
            }
        }
        info!(
            "🔄 Manual refresh of {}: {} courses, {} new announcements",
            community, summary.polled, summary.notified
        );
        Ok(summary)
    }

    /// Fetch, detect, deliver, then persist the cursor
    async fn poll_entity(
        &self,
        community: CommunityId,
        entity: &CourseEntity,
        now: NaiveDateTime,
    ) -> Result<usize> {
        let _guard = self
            .registry
            .lock_entity(EntityKey::Announcements(community, entity.id))
            .await;

        // Re-read under the lock: the course may have been untracked meanwhile
        let Some(record) = self.registry.community(community).await else {
            return Ok(0);
        };
        let Some(raw_cursor) = record.last_seen.get(&entity.id) else {
            return Ok(0);
        };
        if record.channels.is_empty() {
            return Ok(0);
        }

        let Some(cursor) = parse_timestamp(raw_cursor) else {
            warn!(
                "Unreadable cursor '{}' for course {} in {}, resetting to now",
                raw_cursor, entity.id, community
            );
            self.registry
                .advance_last_seen(community, entity.id, now)
                .await?;
            return Ok(0);
        };

        let items = self.platform.announcements(entity.id, Some(cursor)).await?;
        let window = Window::Within((now - cursor).abs());
        let scan = detect_announcements(&items, window, Some(cursor), now, self.order);

        let mut fresh = scan.fresh.clone();
        fresh.sort_by_key(|a| a.created_at);
        for item in &fresh {
            let notification = Notification::announcement(entity, item);
            deliver(self.sink.as_ref(), &notification, &record.channels).await;
        }

        if let Some(next) = scan.advanced_cursor(Some(cursor)) {
            if next > cursor {
                self.registry
                    .advance_last_seen(community, entity.id, next)
                    .await?;
            }
        }

        if !fresh.is_empty() {
            info!(
                "📢 Sent {} announcements of {} to {}",
                fresh.len(),
                entity.name,
                community
            );
        }
        Ok(fresh.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::store::Store;
    use crate::db::types::ChannelId;
    use crate::platform::{Announcement, Assignment, ModuleEntry};
    use crate::testing::{
        announcement, course_entity, FakeCoursePlatform, FlakyBackend, MemoryBackend,
        RecordingSink,
    };
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::sync::Semaphore;

    /// Holds every announcements fetch until a permit is released
    struct GatedPlatform {
        inner: Arc<FakeCoursePlatform>,
        gate: Semaphore,
        entered: AtomicUsize,
        since_seen: Mutex<Vec<Option<NaiveDateTime>>>,
    }

    #[async_trait]
    impl CoursePlatform for GatedPlatform {
        async fn course(&self, id: CourseId) -> Result<CourseEntity> {
            self.inner.course(id).await
        }

        async fn announcements(
            &self,
            id: CourseId,
            since: Option<NaiveDateTime>,
        ) -> Result<Vec<Announcement>> {
            self.since_seen.lock().unwrap().push(since);
            self.entered.fetch_add(1, Ordering::SeqCst);
            let _permit = self.gate.acquire().await.unwrap();
            self.inner.announcements(id, since).await
        }

        async fn assignments(&self, id: CourseId) -> Result<Vec<Assignment>> {
            self.inner.assignments(id).await
        }

        async fn modules(&self, id: CourseId) -> Result<Vec<ModuleEntry>> {
            self.inner.modules(id).await
        }
    }

    fn at(s: &str) -> NaiveDateTime {
        parse_timestamp(s).unwrap()
    }

    struct Fixture {
        platform: Arc<FakeCoursePlatform>,
        registry: Arc<TrackRegistry>,
        sink: Arc<RecordingSink>,
        engine: AnnouncementEngine,
    }

    async fn fixture(store: Store, courses: &[u64]) -> Fixture {
        let platform = Arc::new(FakeCoursePlatform::default());
        for id in courses {
            platform.add_course(course_entity(*id));
        }
        let registry = Arc::new(TrackRegistry::new(store, platform.clone()));
        let sink = Arc::new(RecordingSink::default());
        let engine = AnnouncementEngine::new(
            registry.clone(),
            platform.clone(),
            sink.clone(),
            30,
            FeedOrder::Unordered,
        );
        Fixture {
            platform,
            registry,
            sink,
            engine,
        }
    }

    async fn track(f: &Fixture, community: CommunityId, courses: &[u64], now: &str) {
        let ids: Vec<CourseId> = courses.iter().map(|c| CourseId(*c)).collect();
        f.registry.track(community, &ids, at(now)).await.unwrap();
        f.registry
            .subscribe_channel(community, ChannelId(community.0))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_second_tick_is_silent() {
        let f = fixture(Store::new(Arc::new(MemoryBackend::default())), &[1]).await;
        let community = CommunityId(-10);
        track(&f, community, &[1], "2024-01-01 00:00:00").await;

        f.platform.set_announcements(
            CourseId(1),
            vec![
                announcement("a3", Some(at("2024-01-03 09:00:00"))),
                announcement("a2", Some(at("2024-01-02 09:00:00"))),
                announcement("a0", Some(at("2023-12-31 09:00:00"))),
            ],
        );

        let now = at("2024-01-04 00:00:00");
        let stats = f.engine.tick_at(now).await;
        assert_eq!(stats.notified, 2);
        // Delivered oldest first
        assert_eq!(f.sink.items(), vec!["a2", "a3"]);
        assert_eq!(
            f.registry.community(community).await.unwrap().last_seen[&CourseId(1)],
            "2024-01-03 09:00:00"
        );

        let again = f.engine.tick_at(at("2024-01-04 00:00:30")).await;
        assert_eq!(again.notified, 0);
        assert_eq!(f.sink.count(), 2);
    }

    #[tokio::test]
    async fn test_communities_without_channels_are_skipped() {
        let f = fixture(Store::new(Arc::new(MemoryBackend::default())), &[1]).await;
        let community = CommunityId(-11);
        f.registry
            .track(community, &[CourseId(1)], at("2024-01-01 00:00:00"))
            .await
            .unwrap();
        f.platform.set_announcements(
            CourseId(1),
            vec![announcement("a1", Some(at("2024-01-02 00:00:00")))],
        );

        let stats = f.engine.tick_at(at("2024-01-03 00:00:00")).await;
        assert_eq!(stats.entities, 0);
        assert_eq!(f.sink.count(), 0);
    }

    #[tokio::test]
    async fn test_failing_course_does_not_block_others() {
        let f = fixture(Store::new(Arc::new(MemoryBackend::default())), &[1, 2]).await;
        let community = CommunityId(-12);
        track(&f, community, &[1, 2], "2024-01-01 00:00:00").await;

        f.platform.set_failing(CourseId(1), true);
        f.platform.set_announcements(
            CourseId(2),
            vec![announcement("b1", Some(at("2024-01-02 00:00:00")))],
        );

        let stats = f.engine.tick_at(at("2024-01-03 00:00:00")).await;
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.notified, 1);
        assert_eq!(f.sink.items(), vec!["b1"]);

        // Course 1 keeps its cursor and catches up once it recovers
        f.platform.set_failing(CourseId(1), false);
        f.platform.set_announcements(
            CourseId(1),
            vec![announcement("a1", Some(at("2024-01-02 12:00:00")))],
        );
        let stats = f.engine.tick_at(at("2024-01-03 00:01:00")).await;
        assert_eq!(stats.notified, 1);
        assert_eq!(f.sink.items(), vec!["b1", "a1"]);
    }

    #[tokio::test]
    async fn test_failed_cursor_write_redelivers() {
        let flaky = Arc::new(FlakyBackend::new(Arc::new(MemoryBackend::default())));
        let f = fixture(Store::new(flaky.clone()), &[1]).await;
        let community = CommunityId(-13);
        track(&f, community, &[1], "2024-01-01 00:00:00").await;
        f.platform.set_announcements(
            CourseId(1),
            vec![announcement("a1", Some(at("2024-01-02 00:00:00")))],
        );

        flaky.fail_writes(true);
        let stats = f.engine.tick_at(at("2024-01-03 00:00:00")).await;
        assert_eq!(stats.failed, 1);
        assert_eq!(
            f.registry.community(community).await.unwrap().last_seen[&CourseId(1)],
            "2024-01-01 00:00:00"
        );

        // At-least-once: the item comes again after the store recovers
        flaky.fail_writes(false);
        f.engine.tick_at(at("2024-01-03 00:00:30")).await;
        assert_eq!(f.sink.items(), vec!["a1", "a1"]);
        f.engine.tick_at(at("2024-01-03 00:01:00")).await;
        assert_eq!(f.sink.count(), 2);
    }

    #[tokio::test]
    async fn test_refresh_reports_failures() {
        let f = fixture(Store::new(Arc::new(MemoryBackend::default())), &[1, 2]).await;
        let community = CommunityId(-14);
        track(&f, community, &[1, 2], "2024-01-01 00:00:00").await;
        f.platform.set_failing(CourseId(2), true);
        f.platform.set_announcements(
            CourseId(1),
            vec![announcement("a1", Some(at("2024-01-02 00:00:00")))],
        );

        let summary = f
            .engine
            .refresh(community, at("2024-01-03 00:00:00"))
            .await
            .unwrap();
        assert_eq!(summary.polled, 2);
        assert_eq!(summary.notified, 1);
        assert_eq!(summary.failed.len(), 1);
        assert_eq!(summary.failed[0].0, CourseId(2));

        assert!(matches!(
            f.engine.refresh(CommunityId(1), at("2024-01-03 00:00:00")).await,
            Err(TrackerError::EntityNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_refresh_during_tick_delivers_once() {
        let fake = Arc::new(FakeCoursePlatform::default());
        fake.add_course(course_entity(1));
        let store = Store::new(Arc::new(MemoryBackend::default()));
        let registry = Arc::new(TrackRegistry::new(store, fake.clone()));
        let sink = Arc::new(RecordingSink::default());
        let gated = Arc::new(GatedPlatform {
            inner: fake.clone(),
            gate: Semaphore::new(0),
            entered: AtomicUsize::new(0),
            since_seen: Mutex::new(Vec::new()),
        });
        let engine = Arc::new(AnnouncementEngine::new(
            registry.clone(),
            gated.clone(),
            sink.clone(),
            30,
            FeedOrder::Unordered,
        ));

        let community = CommunityId(-15);
        registry
            .track(community, &[CourseId(1)], at("2024-01-01 00:00:00"))
            .await
            .unwrap();
        registry
            .subscribe_channel(community, ChannelId(community.0))
            .await
            .unwrap();
        fake.set_announcements(
            CourseId(1),
            vec![announcement("a1", Some(at("2024-01-02 10:00:00")))],
        );

        let now = at("2024-01-03 00:00:00");
        let tick = {
            let engine = engine.clone();
            tokio::spawn(async move { engine.tick_at(now).await })
        };
        let refresh = {
            let engine = engine.clone();
            tokio::spawn(async move { engine.refresh(community, now).await })
        };

        while gated.entered.load(Ordering::SeqCst) == 0 {
            tokio::task::yield_now().await;
        }
        // The other poll waits on the course lock, not inside the fetch
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(gated.entered.load(Ordering::SeqCst), 1);

        gated.gate.add_permits(2);
        let stats = tick.await.unwrap();
        let summary = refresh.await.unwrap().unwrap();

        assert_eq!(stats.notified + summary.notified, 1);
        assert_eq!(sink.items(), vec!["a1"]);
        assert_eq!(
            registry.community(community).await.unwrap().last_seen[&CourseId(1)],
            "2024-01-02 10:00:00"
        );
        // The second poll starts from the cursor the first one advanced
        assert_eq!(
            *gated.since_seen.lock().unwrap(),
            vec![Some(at("2024-01-01 00:00:00")), Some(at("2024-01-02 10:00:00"))]
        );
    }
}
