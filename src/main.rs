use std::sync::Arc;

use teloxide::prelude::*;
use tracing::{error, info, warn};

use locale_bot::config::Config;
use locale_bot::database::Database;
use locale_bot::handlers;
use locale_bot::i18n::TranslatorHub;
use locale_bot::lifecycle::{notify_admins, set_commands};
use locale_bot::logging;
use locale_bot::pipeline::Pipeline;
use locale_bot::throttle::RateLimiter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::from_env()?;
    let _guard = logging::init(&config)?;

    info!("🚀 Starting bot...");
    info!("Admin IDs: {:?}", config.admin_ids);

    // Bad translations must stop us here, not on the first message.
    let hub = Arc::new(TranslatorHub::embedded()?);
    info!("Loaded locales {:?} (root: {})", hub.locales(), hub.root_locale());

    let db = Arc::new(Database::open(&config.db_url)?);
    let limiter = RateLimiter::with_window(config.throttle_window, config.throttle_capacity);
    let pipeline = Arc::new(Pipeline::new(limiter, hub.clone(), db.clone()));

    let bot = Bot::new(&config.bot_token);
    let root = hub.resolve(None);

    if let Err(e) = bot.delete_webhook().drop_pending_updates(true).await {
        warn!("Failed to delete webhook: {e}");
    }
    if let Err(e) = set_commands(&bot, &root).await {
        warn!("Failed to set bot commands: {e}");
    }
    notify_admins(&bot, &config.admin_ids, &root.bot_started()).await;
    info!("Bot successfully started.");

    let config = Arc::new(config);
    Dispatcher::builder(bot.clone(), handlers::schema())
        .dependencies(dptree::deps![pipeline, db, config.clone()])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    notify_admins(&bot, &config.admin_ids, &root.bot_stopped()).await;
    error!("Bot stopped!");

    Ok(())
}
