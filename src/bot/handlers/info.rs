use crate::bot::notifier::ThrottledBot;
use crate::bot::BotHandler;
use teloxide::prelude::*;

impl BotHandler {
    // ------------------------------------------------------------------------
    // Help Command
    // ------------------------------------------------------------------------

    pub async fn handle_help(&self, bot: ThrottledBot, chat_id: ChatId) -> ResponseResult<()> {
        let help_text = r#"
📚 *Course Bot Help*

*Canvas:*

📌 `/track <course_id> ...`
   Track courses in this chat
   \- Example: `/track 53540 53541`

🗑 `/untrack <course_id> ...`
   Stop tracking courses

📋 `/courses`
   List tracked courses and live chats

📡 `/live [chat_id]`
   Send announcements, reminders and new modules to a chat \(this one by default\)

🔕 `/unlive [chat_id]`
   Stop sending updates to a chat

📢 `/annc [\-since <window> | \-all] [course_id ...]`
   List announcements \(default: `2\-week`\)
   \- Window: `4\-hour`, `1\.5\-day`, `2\-week`, `2021\-01\-01`, `2021\-01\-01\-13:00:00`

📝 `/asgn [\-due <window> | \-all] [course_id ...]`
   List assignments due within a window \(default: `2\-week`\)

🔄 `/refresh`
   Check for new announcements now

*Piazza:*

🧭 `/pinit <name> <network_id>`
   Set the forum of this chat

📰 `/ptrack [chat_id]` / `/puntrack [chat_id]`
   Start or stop the daily digest in a chat

📌 `/ppinned`
   List pinned posts

🔎 `/pread <post_number>`
   Show a post and its answer
"#;

        self.reply_markdown(&bot, chat_id, help_text).await
    }
}
