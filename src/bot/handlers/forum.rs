use std::sync::Arc;
use teloxide::prelude::*;
use teloxide::utils::markdown;
use tracing::{error, info, warn};

use crate::bot::handler::target_channel;
use crate::bot::notifier::{link, ThrottledBot};
use crate::bot::BotHandler;
use crate::db::types::{CommunityId, ForumEntity};
use crate::platform::{ForumPlatform, ForumPost};
use crate::utils::html;

/// Pinned posts listed by /ppinned
const MAX_PINNED_LISTED: usize = 20;
const MAX_BODY_SHOWN: usize = 1500;

/// `<name words> <network_id>`; the name may be empty
fn parse_pinit_args(args: &str) -> Option<(String, String)> {
    let mut tokens: Vec<&str> = args.split_whitespace().collect();
    let network_id = tokens.pop()?.to_string();
    Some((tokens.join(" "), network_id))
}

fn render_post(post: &ForumPost) -> String {
    let mut text = format!(
        "🔎 *{}*\n",
        link(&format!("@{} {}", post.number, post.subject), &post.url)
    );
    if !post.tags.is_empty() {
        text.push_str(&format!("🏷 {}\n", markdown::escape(&post.tags.join(", "))));
    }
    text.push('\n');
    text.push_str(&markdown::escape(&html::truncate(&post.body, MAX_BODY_SHOWN)));
    if !post.answer.body.is_empty() {
        text.push_str(&format!(
            "\n\n*{}*\n{}",
            markdown::escape(&post.answer.heading),
            markdown::escape(&html::truncate(&post.answer.body, MAX_BODY_SHOWN))
        ));
    }
    text
}

impl BotHandler {
    /// Forum client, or a reply saying there is none
    async fn forum_platform(
        &self,
        bot: &ThrottledBot,
        chat_id: ChatId,
    ) -> ResponseResult<Option<Arc<dyn ForumPlatform>>> {
        match &self.forum {
            Some(forum) => Ok(Some(forum.clone())),
            None => {
                bot.send_message(chat_id, "ℹ️ Piazza is not configured for this bot")
                    .await?;
                Ok(None)
            }
        }
    }

    /// Forum of the community, or a hint to run /pinit
    async fn community_forum(
        &self,
        bot: &ThrottledBot,
        community: CommunityId,
    ) -> ResponseResult<Option<ForumEntity>> {
        let forum = self
            .registry
            .community(community)
            .await
            .and_then(|r| r.forum.map(|f| f.entity));
        if forum.is_none() {
            bot.send_message(
                ChatId(community.0),
                "ℹ️ No forum set for this chat, run /pinit <name> <network_id> first",
            )
            .await?;
        }
        Ok(forum)
    }

    // ------------------------------------------------------------------------
    // Forum Setup
    // ------------------------------------------------------------------------

    pub async fn handle_pinit(
        &self,
        bot: ThrottledBot,
        community: CommunityId,
        args: String,
    ) -> ResponseResult<()> {
        let chat_id = ChatId(community.0);
        let Some(platform) = self.forum_platform(&bot, chat_id).await? else {
            return Ok(());
        };
        let Some((name, network_id)) = parse_pinit_args(&args) else {
            bot.send_message(chat_id, "❌ Usage: /pinit <name> <network_id>")
                .await?;
            return Ok(());
        };

        let mut forum = match platform.forum(&network_id).await {
            Ok(forum) => forum,
            Err(e) => {
                warn!("Cannot look up forum {} for {}: {}", network_id, community, e);
                bot.send_message(chat_id, format!("❌ Forum {}: {}", network_id, e))
                    .await?;
                return Ok(());
            }
        };
        if !name.is_empty() {
            forum.name = name;
        }

        if let Err(e) = self.registry.set_forum(community, forum.clone()).await {
            error!("Failed to set forum of {}: {:#}", community, e);
            bot.send_message(chat_id, "⚠️ Could not save tracking state, please retry")
                .await?;
            return Ok(());
        }

        info!("🧭 {} now uses forum {} ({})", community, forum.name, forum.network_id);
        let text = format!(
            "✅ Forum set to {}\nUse /ptrack to get the daily digest",
            link(&forum.name, &forum.url)
        );
        self.reply_markdown(&bot, chat_id, &text).await
    }

    pub async fn handle_ptrack(
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
            self.registry.subscribe_forum_channel(community, channel).await
        } else {
            self.registry
                .unsubscribe_forum_channel(community, channel)
                .await
        };

        let text = match (result, enable) {
            (Ok(None), _) => "ℹ️ No forum set for this chat, run /pinit first".to_string(),
            (Ok(Some(true)), true) => format!("✅ Chat {} now receives the daily digest", channel),
            (Ok(Some(false)), true) => {
                format!("ℹ️ Chat {} already receives the daily digest", channel)
            }
            (Ok(Some(true)), false) => {
                format!("✅ Chat {} no longer receives the daily digest", channel)
            }
            (Ok(Some(false)), false) => {
                format!("ℹ️ Chat {} was not receiving the daily digest", channel)
            }
            (Err(e), _) => {
                error!("Failed to update digest chats of {}: {:#}", community, e);
                "⚠️ Could not save tracking state, please retry".to_string()
            }
        };
        bot.send_message(chat_id, text).await?;
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Forum Reads
    // ------------------------------------------------------------------------

    pub async fn handle_ppinned(
        &self,
        bot: ThrottledBot,
        community: CommunityId,
    ) -> ResponseResult<()> {
        let chat_id = ChatId(community.0);
        let Some(platform) = self.forum_platform(&bot, chat_id).await? else {
            return Ok(());
        };
        let Some(forum) = self.community_forum(&bot, community).await? else {
            return Ok(());
        };

        let posts = match platform
            .pinned_posts(&forum.network_id, self.pinned_fetch)
            .await
        {
            Ok(posts) => posts,
            Err(e) => {
                warn!("Pinned posts of {} failed: {}", forum.network_id, e);
                bot.send_message(chat_id, format!("❌ {}", e)).await?;
                return Ok(());
            }
        };

        let mut text = format!("📌 *Pinned in {}*\n", link(&forum.name, &forum.url));
        if posts.is_empty() {
            text.push_str("  none\n");
        }
        for post in posts.iter().take(MAX_PINNED_LISTED) {
            text.push_str(&format!(
                "  • {}\n",
                link(&format!("@{} {}", post.number, post.subject), &post.url)
            ));
        }
        self.reply_markdown(&bot, chat_id, &text).await
    }

    pub async fn handle_pread(
        &self,
        bot: ThrottledBot,
        community: CommunityId,
        args: String,
    ) -> ResponseResult<()> {
        let chat_id = ChatId(community.0);
        let Some(platform) = self.forum_platform(&bot, chat_id).await? else {
            return Ok(());
        };
        let Some(number) = args
            .split_whitespace()
            .next()
            .map(|s| s.trim_start_matches('@'))
            .and_then(|s| s.parse::<u64>().ok())
        else {
            bot.send_message(chat_id, "❌ Usage: /pread <post_number>")
                .await?;
            return Ok(());
        };
        let Some(forum) = self.community_forum(&bot, community).await? else {
            return Ok(());
        };

        match platform.post(&forum.network_id, number).await {
            Ok(post) => self.reply_markdown(&bot, chat_id, &render_post(&post)).await,
            Err(e) => {
                warn!("Post @{} of {} failed: {}", number, forum.network_id, e);
                bot.send_message(chat_id, format!("❌ Post @{}: {}", number, e))
                    .await?;
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::forum_post;
    use crate::utils::window::parse_timestamp;

    #[test]
    fn test_parse_pinit_args() {
        assert_eq!(
            parse_pinit_args("CPSC 310 k0abc123"),
            Some(("CPSC 310".to_string(), "k0abc123".to_string()))
        );
        assert_eq!(
            parse_pinit_args("k0abc123"),
            Some((String::new(), "k0abc123".to_string()))
        );
        assert_eq!(parse_pinit_args("   "), None);
    }

    #[test]
    fn test_render_post_includes_answer() {
        let created = parse_timestamp("2024-02-01 10:00:00").unwrap();
        let mut post = forum_post(12, created, "student");
        post.subject = "Lab 3 (part b)".to_string();
        post.answer.heading = "Instructor Answer".to_string();
        post.answer.body = "Use v2.1".to_string();

        let text = render_post(&post);
        assert!(text.contains("Lab 3 \\(part b\\)"));
        assert!(text.contains("*Instructor Answer*"));
        assert!(text.contains("Use v2\\.1"));
    }
}
