use std::sync::Arc;
use teloxide::prelude::*;
use teloxide::types::ParseMode;
use tracing::{info, warn};

use super::notifier::{no_preview, ThrottledBot};
use super::Command;
use crate::db::types::{ChannelId, CommunityId};
use crate::platform::{CoursePlatform, ForumPlatform};
use crate::scheduler::AnnouncementEngine;
use crate::tracking::TrackRegistry;

#[derive(Clone)]
pub struct BotHandler {
    pub(super) registry: Arc<TrackRegistry>,
    pub(super) courses: Arc<dyn CoursePlatform>,
    pub(super) forum: Option<Arc<dyn ForumPlatform>>,
    pub(super) announcements: Arc<AnnouncementEngine>,
    pub(super) owner_id: Option<i64>,
    /// Posts scanned for pinned ones
    pub(super) pinned_fetch: u32,
}

impl BotHandler {
    pub fn new(
        registry: Arc<TrackRegistry>,
        courses: Arc<dyn CoursePlatform>,
        forum: Option<Arc<dyn ForumPlatform>>,
        announcements: Arc<AnnouncementEngine>,
        owner_id: Option<i64>,
        pinned_fetch: u32,
    ) -> Self {
        Self {
            registry,
            courses,
            forum,
            announcements,
            owner_id,
            pinned_fetch,
        }
    }

    pub async fn handle_command(
        &self,
        bot: ThrottledBot,
        msg: Message,
        cmd: Command,
    ) -> ResponseResult<()> {
        let chat_id = msg.chat.id;
        let community = CommunityId(chat_id.0);
        let user_id = msg.from.as_ref().map(|u| u.id.0);

        info!(
            "Received command from user {:?} in chat {}: {:?}",
            user_id, chat_id, cmd
        );

        if cmd.is_mutating() && !self.is_privileged(&bot, &msg).await {
            info!("User {:?} lacks permission for {:?} in chat {}", user_id, cmd, chat_id);
            bot.send_message(chat_id, "❌ Only chat administrators can use this command")
                .await?;
            return Ok(());
        }

        match cmd {
            Command::Help => self.handle_help(bot, chat_id).await,
            Command::Track(args) => self.handle_track(bot, community, args).await,
            Command::Untrack(args) => self.handle_untrack(bot, community, args).await,
            Command::Courses => self.handle_courses(bot, community).await,
            Command::Live(args) => self.handle_live(bot, community, args, true).await,
            Command::Unlive(args) => self.handle_live(bot, community, args, false).await,
            Command::Annc(args) => self.handle_annc(bot, community, args).await,
            Command::Asgn(args) => self.handle_asgn(bot, community, args).await,
            Command::Refresh => self.handle_refresh(bot, community).await,
            Command::Pinit(args) => self.handle_pinit(bot, community, args).await,
            Command::Ptrack(args) => self.handle_ptrack(bot, community, args, true).await,
            Command::Puntrack(args) => self.handle_ptrack(bot, community, args, false).await,
            Command::Ppinned => self.handle_ppinned(bot, community).await,
            Command::Pread(args) => self.handle_pread(bot, community, args).await,
        }
    }

    /// Private chats, the owner, and chat administrators
    async fn is_privileged(&self, bot: &ThrottledBot, msg: &Message) -> bool {
        if msg.chat.is_private() {
            return true;
        }
        let Some(user) = msg.from.as_ref() else {
            return false;
        };
        if self.owner_id == Some(user.id.0 as i64) {
            return true;
        }

        match bot.get_chat_member(msg.chat.id, user.id).await {
            Ok(member) => member.is_privileged(),
            Err(e) => {
                warn!(
                    "Failed to look up member {} of chat {}: {:#}",
                    user.id, msg.chat.id, e
                );
                false
            }
        }
    }

    pub(super) async fn reply_markdown(
        &self,
        bot: &ThrottledBot,
        chat_id: ChatId,
        text: &str,
    ) -> ResponseResult<()> {
        bot.send_message(chat_id, text)
            .parse_mode(ParseMode::MarkdownV2)
            .link_preview_options(no_preview())
            .await?;
        Ok(())
    }
}

/// `[chat_id]` argument: another chat, or the current one
pub(super) fn target_channel(args: &str, community: CommunityId) -> Result<ChannelId, String> {
    match args.split_whitespace().next() {
        None => Ok(community.into()),
        Some(raw) => raw
            .parse()
            .map_err(|_| format!("'{}' is not a chat id", raw)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_channel() {
        let here = CommunityId(-100);
        assert_eq!(target_channel("", here), Ok(ChannelId(-100)));
        assert_eq!(target_channel(" -1001234 ", here), Ok(ChannelId(-1001234)));
        assert!(target_channel("general", here).is_err());
    }
}
