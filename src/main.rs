mod bot;
mod config;
mod db;
mod error;
mod platform;
mod scheduler;
#[cfg(test)]
mod testing;
mod tracking;
mod utils;

use crate::config::Config;
use anyhow::{Context, Result};
use canvas_client::{CanvasClient, CanvasClientConfig};
use piazza_client::{PiazzaClient, PiazzaClientConfig};
use sea_orm_migration::MigratorTrait;
use std::sync::Arc;
use teloxide::adaptors::throttle::Limits;
use teloxide::requests::RequesterExt;
use tracing::{error, info};
use tracing_subscriber::fmt::time::ChronoLocal;
use tracing_subscriber::{prelude::*, EnvFilter};

use crate::bot::notifier::TelegramNotifier;
use crate::db::store::{SqliteBackend, Store};
use crate::platform::{CanvasPlatform, CoursePlatform, ForumPlatform, PiazzaPlatform};
use crate::tracking::{NotificationSink, TrackRegistry};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = Config::load()?;

    let log_level = config.log_level();
    let log_dir = &config.logging.dir;

    std::fs::create_dir_all(log_dir)?;

    // Setup file appender (daily rotation)
    let file_appender = tracing_appender::rolling::daily(log_dir, "coursebot.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    // Use local time for log timestamps
    let local_timer = ChronoLocal::rfc_3339();

    let stdout_layer = tracing_subscriber::fmt::layer()
        .with_line_number(true)
        .with_file(true)
        .with_target(false)
        .with_timer(local_timer.clone());

    let file_layer = tracing_subscriber::fmt::layer()
        .with_ansi(false)
        .with_timer(local_timer)
        .with_writer(non_blocking);

    let filter_layer = EnvFilter::from_default_env()
        .add_directive(log_level.into())
        .add_directive("sqlx=warn".parse()?)
        .add_directive("sea_orm=warn".parse()?)
        .add_directive("reqwest=warn".parse()?);

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(stdout_layer)
        .with(file_layer)
        .init();

    info!("Starting CourseBot...");
    info!("Logs are written to: {}", log_dir);

    // Connect to database
    let db = db::establish_connection(&config.database.url).await?;
    info!("Database connection established");

    migration::Migrator::up(&db, None).await?;
    info!("✅ Database migrations completed");

    let backend = SqliteBackend::new(db.clone());
    backend.ping().await?;
    info!("✅ Database ping successful");
    let store = Store::new(Arc::new(backend));

    // Canvas
    let canvas_client = CanvasClient::new(CanvasClientConfig {
        base_url: config.canvas.base_url.clone(),
        access_token: config.canvas.access_token.clone(),
        timeout_secs: config.canvas.timeout_sec,
    })
    .context("Failed to create Canvas client")?;
    let courses: Arc<dyn CoursePlatform> = Arc::new(CanvasPlatform::new(
        canvas_client,
        config.canvas.include_unpublished_modules,
    ));
    info!("✅ Canvas client initialized ({})", config.canvas.base_url);

    // Piazza, logs in on first use
    let forum: Option<Arc<dyn ForumPlatform>> = match &config.piazza {
        Some(piazza) => {
            let client = PiazzaClient::new(PiazzaClientConfig {
                email: piazza.email.clone(),
                password: piazza.password.clone(),
                timeout_secs: piazza.timeout_sec,
                ..Default::default()
            })
            .context("Failed to create Piazza client")?;
            info!("✅ Piazza client initialized");
            let platform: Arc<dyn ForumPlatform> = Arc::new(PiazzaPlatform::new(client));
            Some(platform)
        }
        None => {
            info!("Piazza is not configured, forum commands are disabled");
            None
        }
    };

    let registry = Arc::new(TrackRegistry::new(store, courses.clone()));
    registry.load().await?;

    // Telegram
    let mut raw_bot = teloxide::Bot::new(config.telegram.bot_token.clone());
    if let Some(api_url) = &config.telegram.api_url {
        let url = url::Url::parse(api_url).context("Invalid telegram.api_url")?;
        raw_bot = raw_bot.set_api_url(url);
    }
    let bot = raw_bot.throttle(Limits::default());
    let sink: Arc<dyn NotificationSink> = Arc::new(TelegramNotifier::new(bot.clone()));

    // Engines
    let scheduler_config = &config.scheduler;
    let announcements = Arc::new(scheduler::AnnouncementEngine::new(
        registry.clone(),
        courses.clone(),
        sink.clone(),
        scheduler_config.announcement_interval_sec,
        scheduler_config.feed_order(),
    ));
    let reminders = Arc::new(scheduler::ReminderEngine::new(
        registry.clone(),
        courses.clone(),
        sink.clone(),
        scheduler_config.reminder_interval_sec,
    ));
    let modules = Arc::new(scheduler::ModuleEngine::new(
        registry.clone(),
        courses.clone(),
        sink.clone(),
        scheduler_config.module_interval_sec,
    ));

    let mut handles = vec![
        tokio::spawn(announcements.clone().run()),
        tokio::spawn(reminders.run()),
        tokio::spawn(modules.run()),
    ];

    if let (Some(forum), Some(piazza)) = (&forum, &config.piazza) {
        let at = scheduler::parse_daily_time(&scheduler_config.digest_time)?;
        let digest = Arc::new(scheduler::DigestEngine::new(
            registry.clone(),
            forum.clone(),
            sink.clone(),
            at,
            piazza.fetch_max,
            piazza.show_limit,
        ));
        handles.push(tokio::spawn(digest.run()));
    }

    info!("✅ Scheduler initialized");

    let handler = bot::BotHandler::new(
        registry.clone(),
        courses.clone(),
        forum.clone(),
        announcements,
        config.telegram.owner_id,
        config.piazza.as_ref().map_or(30, |p| p.fetch_min),
    );

    info!("🤖 Starting Telegram Bot...");

    // Setup Ctrl+C handler
    let (shutdown_tx, mut shutdown_rx) = tokio::sync::mpsc::channel::<()>(1);
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            // Keep the sender alive so the bot keeps running
            std::future::pending::<()>().await;
        }
        info!("Received Ctrl+C, shutting down...");
        let _ = shutdown_tx.send(()).await;
    });

    let bot_handle = tokio::spawn(async move {
        if let Err(e) = bot::run(bot, handler).await {
            error!("Bot error: {:?}", e);
        }
    });

    shutdown_rx.recv().await;
    info!("Shutting down gracefully...");

    bot_handle.abort();
    for handle in handles {
        handle.abort();
    }

    info!("✅ Shutdown complete");
    Ok(())
}
