pub mod commands;
mod handler;
mod handlers;
pub mod notifier;

use anyhow::Result;
use teloxide::dispatching::{Dispatcher, DpHandlerDescription, UpdateFilterExt};
use teloxide::dptree;
use teloxide::prelude::*;
use teloxide::types::{BotCommandScope, Me};
use teloxide::utils::command::BotCommands;
use tracing::{info, warn};

pub use commands::Command;
pub use handler::BotHandler;
use notifier::ThrottledBot;

/// Handler return type
type HandlerResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

pub async fn run(bot: ThrottledBot, handler: BotHandler) -> Result<()> {
    info!("Starting Telegram Bot...");

    setup_commands(&bot).await;

    let handler_tree = build_handler_tree();

    info!("✅ Bot initialized, starting command handler");

    Dispatcher::builder(bot, handler_tree)
        .dependencies(dptree::deps![handler])
        .default_handler(|_| async {})
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    Ok(())
}

fn build_handler_tree(
) -> teloxide::dispatching::UpdateHandler<Box<dyn std::error::Error + Send + Sync + 'static>> {
    let command_handler = Message::filter_text()
        .chain(filter_hybrid_command::<Command, HandlerResult>())
        .endpoint(handle_command);

    dptree::entry()
        .chain(Update::filter_message())
        .branch(command_handler)
}

async fn handle_command(
    bot: ThrottledBot,
    msg: Message,
    cmd: Command,
    handler: BotHandler,
) -> HandlerResult {
    handler.handle_command(bot, msg, cmd).await?;
    Ok(())
}

/// Publish the command list shown in Telegram's menu
async fn setup_commands(bot: &ThrottledBot) {
    if let Err(e) = bot
        .set_my_commands(Command::bot_commands())
        .scope(BotCommandScope::Default)
        .await
    {
        warn!("Failed to set default commands: {:#}", e);
    } else {
        info!("✅ Set default commands for all users");
    }
}

/// Command filter that accepts:
/// - in private chats, `/cmd` and `/cmd@bot`
/// - in groups, only `/cmd@bot`
///
/// Needs [`Message`] and [`Me`], both provided by the dispatcher.
#[must_use]
pub fn filter_hybrid_command<C, Output>() -> Handler<'static, Output, DpHandlerDescription>
where
    C: BotCommands + Send + Sync + 'static,
    Output: Send + Sync + 'static,
{
    dptree::filter_map(move |message: Message, me: Me, text: String| {
        let bot_name = me.user.username.as_deref()?;

        let cmd = C::parse(&text, bot_name).ok()?;

        if message.chat.is_private() {
            return Some(cmd);
        }

        // A bare command also parses with an empty bot name; `/cmd@bot` does not
        if C::parse(&text, "").is_ok() {
            return None;
        }

        Some(cmd)
    })
}
