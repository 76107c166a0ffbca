use anyhow::{Context, Result};
use serde::Deserialize;

use crate::tracking::FeedOrder;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub telegram: TelegramConfig,
    pub canvas: CanvasConfig,
    /// Piazza login (optional, forum commands are disabled without it)
    #[serde(default)]
    pub piazza: Option<PiazzaConfig>,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct TelegramConfig {
    pub bot_token: String,
    /// Allowed to run mutating commands in any chat
    pub owner_id: Option<i64>,
    pub api_url: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CanvasConfig {
    /// Instance root, e.g. "https://canvas.ubc.ca"
    pub base_url: String,
    pub access_token: String,
    /// Also report modules and items that are not yet published
    #[serde(default)]
    pub include_unpublished_modules: bool,
    #[serde(default = "default_request_timeout_sec")]
    pub timeout_sec: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PiazzaConfig {
    pub email: String,
    pub password: String,
    /// Upper bound of posts fetched for the daily digest
    #[serde(default = "default_fetch_max")]
    pub fetch_max: u32,
    /// Posts fetched for pinned lookups
    #[serde(default = "default_fetch_min")]
    pub fetch_min: u32,
    /// Student posts listed per digest
    #[serde(default = "default_show_limit")]
    pub show_limit: usize,
    #[serde(default = "default_request_timeout_sec")]
    pub timeout_sec: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite:./data/coursebot.db?mode=rwc".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub dir: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            dir: "data/logs".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct SchedulerConfig {
    /// Announcement poll interval in seconds (default: 30)
    #[serde(default = "default_announcement_interval_sec")]
    pub announcement_interval_sec: u64,
    /// Due-date reminder poll interval in seconds (default: 30)
    #[serde(default = "default_reminder_interval_sec")]
    pub reminder_interval_sec: u64,
    /// Module poll interval in seconds (default: 60)
    #[serde(default = "default_module_interval_sec")]
    pub module_interval_sec: u64,
    /// Forum digest time in HH:MM format, local time (default: "00:00")
    #[serde(default = "default_digest_time")]
    pub digest_time: String,
    /// Stop scanning an announcement feed at the first item outside the window.
    /// Only safe when the platform returns newest first (default: false)
    #[serde(default)]
    pub trust_feed_order: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            announcement_interval_sec: default_announcement_interval_sec(),
            reminder_interval_sec: default_reminder_interval_sec(),
            module_interval_sec: default_module_interval_sec(),
            digest_time: default_digest_time(),
            trust_feed_order: false,
        }
    }
}

impl SchedulerConfig {
    pub fn feed_order(&self) -> FeedOrder {
        if self.trust_feed_order {
            FeedOrder::Descending
        } else {
            FeedOrder::Unordered
        }
    }
}

fn default_request_timeout_sec() -> u64 {
    30
}

fn default_fetch_max() -> u32 {
    55
}

fn default_fetch_min() -> u32 {
    30
}

fn default_show_limit() -> usize {
    10
}

fn default_announcement_interval_sec() -> u64 {
    30
}

fn default_reminder_interval_sec() -> u64 {
    30
}

fn default_module_interval_sec() -> u64 {
    60
}

fn default_digest_time() -> String {
    "00:00".to_string()
}

impl Config {
    pub fn load() -> Result<Self> {
        let builder = config::Config::builder()
            .add_source(config::File::with_name("config.toml").required(false))
            .add_source(config::Environment::with_prefix("COURSEBOT").separator("__"));

        Self::from_builder(builder)
    }

    fn from_builder(
        builder: config::ConfigBuilder<config::builder::DefaultState>,
    ) -> Result<Self> {
        builder
            .build()
            .context("Failed to build configuration")?
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }

    pub fn log_level(&self) -> tracing::Level {
        match self.logging.level.to_lowercase().as_str() {
            "error" => tracing::Level::ERROR,
            "warn" => tracing::Level::WARN,
            "info" => tracing::Level::INFO,
            "debug" => tracing::Level::DEBUG,
            "trace" => tracing::Level::TRACE,
            _ => tracing::Level::INFO,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::FileFormat;

    fn parse(toml: &str) -> Result<Config> {
        Config::from_builder(
            config::Config::builder().add_source(config::File::from_str(toml, FileFormat::Toml)),
        )
    }

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = parse(
            r#"
            [telegram]
            bot_token = "123:abc"

            [canvas]
            base_url = "https://canvas.example.edu"
            access_token = "secret"
            "#,
        )
        .unwrap();

        assert!(config.piazza.is_none());
        assert!(!config.canvas.include_unpublished_modules);
        assert_eq!(config.scheduler.announcement_interval_sec, 30);
        assert_eq!(config.scheduler.reminder_interval_sec, 30);
        assert_eq!(config.scheduler.module_interval_sec, 60);
        assert_eq!(config.scheduler.digest_time, "00:00");
        assert_eq!(config.scheduler.feed_order(), FeedOrder::Unordered);
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.log_level(), tracing::Level::INFO);
    }

    #[test]
    fn test_piazza_section_defaults() {
        let config = parse(
            r#"
            [telegram]
            bot_token = "123:abc"
            owner_id = 42

            [canvas]
            base_url = "https://canvas.example.edu"
            access_token = "secret"

            [piazza]
            email = "me@example.edu"
            password = "hunter2"

            [scheduler]
            trust_feed_order = true
            digest_time = "07:30"
            "#,
        )
        .unwrap();

        let piazza = config.piazza.unwrap();
        assert_eq!(piazza.fetch_max, 55);
        assert_eq!(piazza.fetch_min, 30);
        assert_eq!(piazza.show_limit, 10);
        assert_eq!(config.telegram.owner_id, Some(42));
        assert_eq!(config.scheduler.feed_order(), FeedOrder::Descending);
        assert_eq!(config.scheduler.digest_time, "07:30");
    }

    #[test]
    fn test_missing_canvas_section_is_an_error() {
        assert!(parse("[telegram]\nbot_token = \"x\"\n").is_err());
    }
}
