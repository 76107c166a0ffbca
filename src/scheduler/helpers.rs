use anyhow::{Context, Result};
use chrono::{Duration as ChronoDuration, NaiveDateTime, NaiveTime};
use std::fmt::Display;
use std::future::Future;
use tokio::time::{sleep, Duration};
use tracing::{error, info, warn};

use crate::db::types::ChannelId;
use crate::error::TrackerError;
use crate::tracking::{DeliveryReport, Notification, NotificationSink};

/// Counters of one loop iteration
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickStats {
    pub entities: usize,
    pub notified: usize,
    pub failed: usize,
}

impl TickStats {
    pub fn record(&mut self, outcome: Result<usize, TrackerError>, category: &str, entity: impl Display) {
        self.entities += 1;
        match outcome {
            Ok(n) => self.notified += n,
            Err(e) => {
                self.failed += 1;
                log_entity_error(category, entity, &e);
            }
        }
    }
}

/// Skipped entities: persistence problems are errors, everything else a warning
pub fn log_entity_error(category: &str, entity: impl Display, error: &TrackerError) {
    match error {
        TrackerError::PersistenceRead(_) | TrackerError::PersistenceWrite(_) => {
            error!("❌ {} poll of {} lost its state update: {:#}", category, entity, error)
        }
        _ => warn!("Skipping {} poll of {}: {}", category, entity, error),
    }
}

/// Hand one notification to the sink and log partial failures
pub async fn deliver(
    sink: &dyn NotificationSink,
    notification: &Notification,
    channels: &[ChannelId],
) -> DeliveryReport {
    let report = sink.deliver(notification, channels).await;
    if report.is_complete_failure() {
        error!(
            "❌ Failed to deliver {} from {} to any of {} channels",
            notification.item_id,
            notification.source.name,
            channels.len()
        );
    } else if report.has_failures() {
        warn!(
            "⚠️  Delivered {} to {}/{} channels, failed: {:?}",
            notification.item_id,
            report.succeeded.len(),
            channels.len(),
            report.failed
        );
    }
    report
}

/// Fixed-interval loop; every iteration runs in its own task so a panic is
/// logged and the next tick still happens
pub async fn run_every<F, Fut>(name: &'static str, interval_sec: u64, mut tick: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = TickStats> + Send + 'static,
{
    let interval_sec = interval_sec.max(1);

    // Spread the engines out a little
    let jitter = rand::random_range(0..=interval_sec / 2);
    sleep(Duration::from_secs(jitter)).await;
    info!("🚀 {} engine started (every {}s)", name, interval_sec);

    let mut interval = tokio::time::interval(Duration::from_secs(interval_sec));
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        interval.tick().await;
        run_once(name, tick()).await;
    }
}

/// Run one iteration in a separate task, absorbing panics
pub async fn run_once<Fut>(name: &str, iteration: Fut) -> Option<TickStats>
where
    Fut: Future<Output = TickStats> + Send + 'static,
{
    match tokio::spawn(iteration).await {
        Ok(stats) => {
            if stats.notified > 0 || stats.failed > 0 {
                info!(
                    "{} tick: {} entities, {} notifications, {} skipped",
                    name, stats.entities, stats.notified, stats.failed
                );
            }
            Some(stats)
        }
        Err(e) if e.is_panic() => {
            error!("❌ {} tick panicked: {}", name, e);
            None
        }
        Err(e) => {
            error!("{} tick was cancelled: {}", name, e);
            None
        }
    }
}

/// `HH:MM`, local time
pub fn parse_daily_time(value: &str) -> Result<NaiveTime> {
    NaiveTime::parse_from_str(value.trim(), "%H:%M")
        .with_context(|| format!("Invalid daily time '{}', expected HH:MM", value))
}

/// First occurrence of `at` strictly after `now`
pub fn next_daily_run(now: NaiveDateTime, at: NaiveTime) -> NaiveDateTime {
    let today = now.date().and_time(at);
    if now < today {
        today
    } else {
        today + ChronoDuration::days(1)
    }
}
