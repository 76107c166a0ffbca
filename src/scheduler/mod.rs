mod announcement_engine;
mod digest_engine;
mod helpers;
mod module_engine;
mod reminder_engine;

pub use announcement_engine::{AnnouncementEngine, RefreshSummary};
pub use digest_engine::DigestEngine;
pub use helpers::parse_daily_time;
pub use module_engine::ModuleEngine;
pub use reminder_engine::ReminderEngine;
