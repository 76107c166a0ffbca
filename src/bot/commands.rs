use teloxide::utils::command::BotCommands;

#[derive(BotCommands, Clone, Debug, PartialEq, Eq)]
#[command(rename_rule = "lowercase", description = "Supported commands:")]
pub enum Command {
    #[command(description = "show this help")]
    Help,
    #[command(description = "track courses\n  usage: /track <course_id> ...")]
    Track(String),
    #[command(description = "stop tracking courses\n  usage: /untrack <course_id> ...")]
    Untrack(String),
    #[command(description = "list tracked courses")]
    Courses,
    #[command(description = "send course updates to a chat\n  usage: /live [chat_id]")]
    Live(String),
    #[command(description = "stop sending course updates to a chat\n  usage: /unlive [chat_id]")]
    Unlive(String),
    #[command(
        description = "list announcements\n  usage: /annc [-since <window> | -all] [course_id ...]"
    )]
    Annc(String),
    #[command(
        description = "list upcoming assignments\n  usage: /asgn [-due <window> | -all] [course_id ...]"
    )]
    Asgn(String),
    #[command(description = "check tracked courses for announcements now")]
    Refresh,
    #[command(description = "set the Piazza forum\n  usage: /pinit <name> <network_id>")]
    Pinit(String),
    #[command(description = "send the daily forum digest to a chat\n  usage: /ptrack [chat_id]")]
    Ptrack(String),
    #[command(description = "stop the daily forum digest\n  usage: /puntrack [chat_id]")]
    Puntrack(String),
    #[command(description = "list pinned forum posts")]
    Ppinned,
    #[command(description = "show a forum post\n  usage: /pread <post_number>")]
    Pread(String),
}

impl Command {
    /// Commands that change tracking state
    pub fn is_mutating(&self) -> bool {
        matches!(
            self,
            Command::Track(_)
                | Command::Untrack(_)
                | Command::Live(_)
                | Command::Unlive(_)
                | Command::Refresh
                | Command::Pinit(_)
                | Command::Ptrack(_)
                | Command::Puntrack(_)
        )
    }
}
