use async_trait::async_trait;
use chrono::NaiveDateTime;
use teloxide::adaptors::Throttle;
use teloxide::prelude::*;
use teloxide::types::{LinkPreviewOptions, ParseMode};
use teloxide::utils::markdown;
use tracing::{info, warn};

use crate::db::types::ChannelId;
use crate::tracking::{Category, DeliveryReport, Notification, NotificationSink};
use crate::utils::html;

/// Bot with Telegram's rate limits applied
pub type ThrottledBot = Throttle<Bot>;

/// Telegram refuses longer messages
const MAX_MESSAGE_CHARS: usize = 4096;
/// Longest excerpt taken from a notification before escaping
const MAX_EXCERPT_CHARS: usize = 3000;

/// `NotificationSink` that posts MarkdownV2 messages
#[derive(Clone)]
pub struct TelegramNotifier {
    bot: ThrottledBot,
}

impl TelegramNotifier {
    pub fn new(bot: ThrottledBot) -> Self {
        Self { bot }
    }

    /// Send a pre-formatted MarkdownV2 message
    pub async fn send_markdown(&self, chat_id: ChatId, text: &str) -> ResponseResult<()> {
        self.bot
            .send_message(chat_id, text)
            .parse_mode(ParseMode::MarkdownV2)
            .link_preview_options(no_preview())
            .await?;
        Ok(())
    }
}

#[async_trait]
impl NotificationSink for TelegramNotifier {
    async fn deliver(&self, notification: &Notification, channels: &[ChannelId]) -> DeliveryReport {
        let text = render(notification);
        let mut report = DeliveryReport::default();

        for channel in channels {
            match self.send_markdown(ChatId(channel.0), &text).await {
                Ok(()) => report.succeeded.push(*channel),
                Err(e) => {
                    warn!(
                        "Failed to send {} to channel {}: {:#}",
                        notification.item_id, channel, e
                    );
                    report.failed.push(*channel);
                }
            }
        }

        if report.is_complete_success() && !channels.is_empty() {
            info!(
                "✅ Sent {} to {} channel(s)",
                notification.item_id,
                channels.len()
            );
        }
        report
    }
}

pub fn no_preview() -> LinkPreviewOptions {
    LinkPreviewOptions {
        is_disabled: true,
        url: None,
        prefer_small_media: false,
        prefer_large_media: false,
        show_above_text: false,
    }
}

/// `[text](url)` with both parts escaped
pub fn link(text: &str, url: &str) -> String {
    format!(
        "[{}]({})",
        markdown::escape(text),
        markdown::escape_link_url(url)
    )
}

fn format_time(t: NaiveDateTime) -> String {
    markdown::escape(&t.format("%Y-%m-%d %H:%M").to_string())
}

/// Escape `text` for MarkdownV2, stopping before the output would exceed
/// `budget` characters
///
/// Whole escape sequences are kept or dropped together. Returns whether the
/// text was cut.
fn escape_within(text: &str, budget: usize) -> (String, bool) {
    let mut out = String::new();
    let mut used = 0;
    let mut buf = [0u8; 4];
    for c in text.chars() {
        let escaped = markdown::escape(c.encode_utf8(&mut buf));
        let len = escaped.chars().count();
        if used + len > budget {
            return (out, true);
        }
        out.push_str(&escaped);
        used += len;
    }
    (out, false)
}

/// MarkdownV2 body of a notification
pub fn render(n: &Notification) -> String {
    let title = match &n.url {
        Some(url) => link(&n.title, url),
        None => markdown::escape(&n.title),
    };
    let source = link(&n.source.name, &n.source.url);

    let header = match n.category {
        Category::Announcement => format!("📢 *{}*\n{}", title, source),
        Category::Assignment => format!("📝 *{}*\n{}", title, source),
        Category::Reminder(window) => format!(
            "⏰ *Due {}: {}*\n{}",
            markdown::escape(window.label()),
            title,
            source
        ),
        Category::Module => format!("📦 *New module:* {}\n{}", title, source),
        Category::ForumDigest => format!("📰 *{}*", title),
    };

    let footer = match (n.category, n.created_at, n.due_at) {
        (Category::ForumDigest, _, _) => String::new(),
        (_, created, Some(due)) => {
            let mut footer = format!("\n\n📅 Due {}", format_time(due));
            if let Some(created) = created {
                footer.push_str(&format!(" \\| created {}", format_time(created)));
            }
            footer
        }
        (_, Some(created), None) => format!("\n\n🕒 {}", format_time(created)),
        _ => String::new(),
    };

    let mut text = header;
    let excerpt = n.excerpt.trim();
    if !excerpt.is_empty() {
        // Separator plus the cut marker
        let reserved = text.chars().count() + footer.chars().count() + 3;
        let budget = MAX_MESSAGE_CHARS.saturating_sub(reserved);
        let (body, cut) = escape_within(&html::truncate(excerpt, MAX_EXCERPT_CHARS), budget);
        if cut {
            warn!("Truncated {} to fit one message", n.item_id);
        }
        if !body.is_empty() {
            text.push_str("\n\n");
            text.push_str(&body);
            if cut {
                text.push('…');
            }
        }
    }
    text.push_str(&footer);

    if text.chars().count() > MAX_MESSAGE_CHARS {
        // Header alone is too long, keep what fits of the plain title
        warn!("Header of {} does not fit one message", n.item_id);
        let (title, _) = escape_within(&n.title, MAX_MESSAGE_CHARS - 1);
        return format!("{}…", title);
    }
    text
}
