use chrono::{Local, NaiveDateTime};
use teloxide::prelude::*;
use teloxide::types::ChatAction;
use teloxide::utils::markdown;
use tracing::{error, warn};

use crate::bot::handler::target_channel;
use crate::bot::notifier::{link, render, ThrottledBot};
use crate::bot::BotHandler;
use crate::db::types::{CommunityId, CourseEntity, CourseId};
use crate::error::TrackerError;
use crate::tracking::detector::{detect_announcements, detect_due};
use crate::tracking::{FeedOrder, Notification};
use crate::utils::args::parse_args;
use crate::utils::window::Window;

/// Window used when a listing gets no flag
const DEFAULT_LISTING_WINDOW: &str = "2-week";
/// Messages sent per course by one listing
const MAX_LISTED: usize = 15;

// ============================================================================
// Helpers
// ============================================================================

/// Split `1 2,3` into ids; returns the tokens that are not ids separately
fn parse_course_ids(args: &str) -> (Vec<CourseId>, Vec<String>) {
    let mut ids = Vec::new();
    let mut invalid = Vec::new();
    for token in args
        .split(|c: char| c.is_whitespace() || c == ',')
        .filter(|s| !s.is_empty())
    {
        match token.parse::<CourseId>() {
            Ok(id) => ids.push(id),
            Err(_) => invalid.push(token.to_string()),
        }
    }
    (ids, invalid)
}

/// `-all` beats `-<flag> <window>`; otherwise the default window
fn listing_window(
    args: &str,
    flag: &str,
    now: NaiveDateTime,
) -> Result<(Window, Vec<String>), TrackerError> {
    let parsed = parse_args(args, &[flag]);
    let window = if parsed.has("all") {
        Window::All
    } else if parsed.has(flag) {
        let spec = parsed
            .value(flag)
            .ok_or_else(|| TrackerError::InvalidSpec(format!("-{} needs a window", flag)))?;
        Window::from_spec(spec, now)?
    } else {
        Window::from_spec(DEFAULT_LISTING_WINDOW, now)?
    };
    Ok((window, parsed.positional))
}

/// Lower bound of an announcement listing; a window reaching past the
/// representable range is unbounded
fn listing_since(window: Window, now: NaiveDateTime) -> Option<NaiveDateTime> {
    match window {
        Window::All => None,
        Window::Within(d) => now.checked_sub_signed(d),
    }
}

fn describe_error(e: &TrackerError) -> String {
    match e {
        TrackerError::EntityNotFound(_) => "not found".to_string(),
        TrackerError::TransientFetch(_) => "temporarily unavailable, try again later".to_string(),
        other => other.to_string(),
    }
}

// ============================================================================
// Tracking Commands
// ============================================================================

impl BotHandler {
    pub async fn handle_track(
        &self,
        bot: ThrottledBot,
        community: CommunityId,
        args: String,
    ) -> ResponseResult<()> {
        let chat_id = ChatId(community.0);
        let (ids, invalid) = parse_course_ids(&args);
        if ids.is_empty() {
            bot.send_message(chat_id, "❌ Usage: /track <course_id> ...")
                .await?;
            return Ok(());
        }

        if let Err(e) = bot.send_chat_action(chat_id, ChatAction::Typing).await {
            warn!("Failed to set chat action for chat {}: {:#}", chat_id, e);
        }

        let now = Local::now().naive_local();
        let outcome = match self.registry.track(community, &ids, now).await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!("Failed to track {:?} in {}: {:#}", ids, community, e);
                bot.send_message(chat_id, "⚠️ Could not save tracking state, please retry")
                    .await?;
                return Ok(());
            }
        };

        let mut response = String::new();
        if !outcome.added.is_empty() {
            response.push_str("✅ Now tracking:\n");
            for course in &outcome.added {
                response.push_str(&format!("  • {}\n", link(&course.name, &course.url)));
            }
        }
        if !outcome.already.is_empty() {
            response.push_str("ℹ️ Already tracked:\n");
            for id in &outcome.already {
                response.push_str(&format!("  • `{}`\n", id));
            }
        }
        if !outcome.failed.is_empty() || !invalid.is_empty() {
            response.push_str("❌ Failed:\n");
            for (id, e) in &outcome.failed {
                response.push_str(&format!(
                    "  • `{}`: {}\n",
                    id,
                    markdown::escape(&describe_error(e))
                ));
            }
            for token in &invalid {
                response.push_str(&format!(
                    "  • {}: not a course id\n",
                    markdown::escape(token)
                ));
            }
        }

        self.reply_markdown(&bot, chat_id, &response).await
    }

    pub async fn handle_untrack(
        &self,
        bot: ThrottledBot,
        community: CommunityId,
        args: String,
    ) -> ResponseResult<()> {
        let chat_id = ChatId(community.0);
        let (ids, _) = parse_course_ids(&args);
        if ids.is_empty() {
            bot.send_message(chat_id, "❌ Usage: /untrack <course_id> ...")
                .await?;
            return Ok(());
        }

        let outcome = match self.registry.untrack(community, &ids).await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!("Failed to untrack {:?} in {}: {:#}", ids, community, e);
                bot.send_message(chat_id, "⚠️ Could not save tracking state, please retry")
                    .await?;
                return Ok(());
            }
        };

        let mut response = String::new();
        if !outcome.removed.is_empty() {
            let removed: Vec<String> = outcome.removed.iter().map(|id| id.to_string()).collect();
            response.push_str(&format!("✅ Stopped tracking {}\n", removed.join(", ")));
        }
        if !outcome.missing.is_empty() {
            let missing: Vec<String> = outcome.missing.iter().map(|id| id.to_string()).collect();
            response.push_str(&format!("ℹ️ Not tracked: {}\n", missing.join(", ")));
        }
        bot.send_message(chat_id, response).await?;
        Ok(())
    }

    pub async fn handle_courses(
        &self,
        bot: ThrottledBot,
        community: CommunityId,
    ) -> ResponseResult<()> {
        let chat_id = ChatId(community.0);
        let Some(record) = self.registry.community(community).await else {
            bot.send_message(chat_id, "📭 No courses tracked here. Use /track <course_id>")
                .await?;
            return Ok(());
        };

        let mut response = String::from("📋 *Tracked courses*\n");
        if record.entities.is_empty() {
            response.push_str("  none\n");
        }
        for course in &record.entities {
            response.push_str(&format!(
                "  • {} \\(`{}`\\)\n",
                link(&course.name, &course.url),
                course.id
            ));
        }

        response.push_str("\n📡 *Live chats*\n");
        if record.channels.is_empty() {
            response.push_str("  none, use /live\n");
        }
        for channel in &record.channels {
            response.push_str(&format!("  • `{}`\n", channel));
        }

        if let Some(forum) = &record.forum {
            response.push_str(&format!(
                "\n📰 *Forum:* {} \\({} digest chats\\)\n",
                link(&forum.entity.name, &forum.entity.url),
                forum.channels.len()
            ));
        }

        self.reply_markdown(&bot, chat_id, &response).await
    }

    pub async fn handle_live(
        &self,
        bot: ThrottledBot,
        community: CommunityId,
        args: String,
        enable: bool,
    ) -> ResponseResult<()> {
        let chat_id = ChatId(community.0);
        let channel = match target_channel(&args, community) {
            Ok(channel) => channel,
            Err(e) => {
                bot.send_message(chat_id, format!("❌ {}", e)).await?;
                return Ok(());
            }
        };

        let result = if enable {
            self.registry.subscribe_channel(community, channel).await
        } else {
            self.registry.unsubscribe_channel(community, channel).await
        };

        let text = match (result, enable) {
            (Ok(true), true) => format!("✅ Chat {} now receives course updates", channel),
            (Ok(false), true) => format!("ℹ️ Chat {} already receives course updates", channel),
            (Ok(true), false) => format!("✅ Chat {} no longer receives course updates", channel),
            (Ok(false), false) => format!("ℹ️ Chat {} was not receiving course updates", channel),
            (Err(e), _) => {
                error!("Failed to update live chats of {}: {:#}", community, e);
                "⚠️ Could not save tracking state, please retry".to_string()
            }
        };
        bot.send_message(chat_id, text).await?;
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Listings
    // ------------------------------------------------------------------------

    /// Tracked entity, or metadata fetched for an untracked id
    async fn resolve_course(
        &self,
        community: CommunityId,
        id: CourseId,
    ) -> Result<CourseEntity, TrackerError> {
        if let Some(entity) = self
            .registry
            .community(community)
            .await
            .and_then(|r| r.entity(id).cloned())
        {
            return Ok(entity);
        }
        self.courses.course(id).await
    }

    /// Explicit ids, or every tracked course
    async fn listing_targets(
        &self,
        community: CommunityId,
        positional: &[String],
    ) -> Vec<CourseId> {
        let (ids, _) = parse_course_ids(&positional.join(" "));
        if !ids.is_empty() {
            return ids;
        }
        self.registry
            .community(community)
            .await
            .map(|r| r.entity_ids())
            .unwrap_or_default()
    }

    async fn send_listing(
        &self,
        bot: &ThrottledBot,
        chat_id: ChatId,
        course: &CourseEntity,
        notifications: Vec<Notification>,
        empty_text: &str,
    ) -> ResponseResult<()> {
        if notifications.is_empty() {
            let text = format!("{} {}", empty_text, link(&course.name, &course.url));
            return self.reply_markdown(bot, chat_id, &text).await;
        }

        let total = notifications.len();
        for notification in notifications.iter().take(MAX_LISTED) {
            self.reply_markdown(bot, chat_id, &render(notification)).await?;
        }
        if total > MAX_LISTED {
            bot.send_message(
                chat_id,
                format!("… {} more in {}", total - MAX_LISTED, course.name),
            )
            .await?;
        }
        Ok(())
    }

    pub async fn handle_annc(
        &self,
        bot: ThrottledBot,
        community: CommunityId,
        args: String,
    ) -> ResponseResult<()> {
        let chat_id = ChatId(community.0);
        let now = Local::now().naive_local();
        let (window, positional) = match listing_window(&args, "since", now) {
            Ok(parsed) => parsed,
            Err(e) => {
                bot.send_message(chat_id, format!("❌ {}", e)).await?;
                return Ok(());
            }
        };

        let targets = self.listing_targets(community, &positional).await;
        if targets.is_empty() {
            bot.send_message(chat_id, "📭 No courses tracked here. Use /track <course_id>")
                .await?;
            return Ok(());
        }

        let since = listing_since(window, now);

        for id in targets {
            let fetched = match self.resolve_course(community, id).await {
                Ok(course) => self
                    .courses
                    .announcements(id, since)
                    .await
                    .map(|items| (course, items)),
                Err(e) => Err(e),
            };
            let (course, items) = match fetched {
                Ok(fetched) => fetched,
                Err(e) => {
                    warn!("Announcement listing of {} failed: {}", id, e);
                    bot.send_message(chat_id, format!("❌ Course {}: {}", id, describe_error(&e)))
                        .await?;
                    continue;
                }
            };

            let scan = detect_announcements(&items, window, None, now, FeedOrder::Unordered);
            let notifications: Vec<Notification> = scan
                .fresh
                .iter()
                .map(|a| Notification::announcement(&course, a))
                .collect();
            self.send_listing(&bot, chat_id, &course, notifications, "📭 No announcements in")
                .await?;
        }
        Ok(())
    }

    pub async fn handle_asgn(
        &self,
        bot: ThrottledBot,
        community: CommunityId,
        args: String,
    ) -> ResponseResult<()> {
        let chat_id = ChatId(community.0);
        let now = Local::now().naive_local();
        let (window, positional) = match listing_window(&args, "due", now) {
            Ok(parsed) => parsed,
            Err(e) => {
                bot.send_message(chat_id, format!("❌ {}", e)).await?;
                return Ok(());
            }
        };

        let targets = self.listing_targets(community, &positional).await;
        if targets.is_empty() {
            bot.send_message(chat_id, "📭 No courses tracked here. Use /track <course_id>")
                .await?;
            return Ok(());
        }

        for id in targets {
            let fetched = match self.resolve_course(community, id).await {
                Ok(course) => self
                    .courses
                    .assignments(id)
                    .await
                    .map(|items| (course, items)),
                Err(e) => Err(e),
            };
            let (course, items) = match fetched {
                Ok(fetched) => fetched,
                Err(e) => {
                    warn!("Assignment listing of {} failed: {}", id, e);
                    bot.send_message(chat_id, format!("❌ Course {}: {}", id, describe_error(&e)))
                        .await?;
                    continue;
                }
            };

            let scan = detect_due(&items, window, &[], now);
            let mut upcoming = scan.fresh;
            upcoming.sort_by_key(|a| a.due_at);
            let notifications: Vec<Notification> = upcoming
                .iter()
                .map(|a| Notification::assignment(&course, a))
                .collect();
            self.send_listing(&bot, chat_id, &course, notifications, "📭 Nothing due in")
                .await?;
        }
        Ok(())
    }

    pub async fn handle_refresh(
        &self,
        bot: ThrottledBot,
        community: CommunityId,
    ) -> ResponseResult<()> {
        let chat_id = ChatId(community.0);
        let Some(record) = self.registry.community(community).await else {
            bot.send_message(chat_id, "📭 No courses tracked here. Use /track <course_id>")
                .await?;
            return Ok(());
        };
        if record.channels.is_empty() {
            bot.send_message(chat_id, "ℹ️ No live chats yet, use /live first")
                .await?;
            return Ok(());
        }

        let now = Local::now().naive_local();
        let text = match self.announcements.refresh(community, now).await {
            Ok(summary) => {
                let mut text = format!(
                    "🔄 Checked {} courses, {} new announcements",
                    summary.polled, summary.notified
                );
                for (id, reason) in &summary.failed {
                    text.push_str(&format!("\n❌ {}: {}", id, reason));
                }
                text
            }
            Err(e) => format!("❌ {}", e),
        };
        bot.send_message(chat_id, text).await?;
        Ok(())
    }
}
