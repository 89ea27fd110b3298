//! Command handlers and the dispatch tree that wires them to the pipeline.

use std::sync::Arc;

use teloxide::dispatching::UpdateHandler;
use teloxide::prelude::*;
use teloxide::RequestError;
use teloxide::utils::command::BotCommands;
use tracing::{info, warn};

use crate::config::Config;
use crate::database::Database;
use crate::pipeline::{EventUser, InboundEvent, Pipeline, RequestContext};

#[derive(BotCommands, Clone, Debug, PartialEq)]
#[command(rename_rule = "lowercase")]
pub enum Command {
    #[command(description = "start the bot")]
    Start,
    #[command(description = "administrator panel")]
    Admin,
}

/// Dispatch tree for inbound messages.
///
/// Needs `Arc<Pipeline>`, `Arc<Database>` and `Arc<Config>` as dependencies.
pub fn schema() -> UpdateHandler<RequestError> {
    inbound().branch(commands())
}

/// Runs the pipeline, then records the sender. Dropped messages stop here.
fn inbound() -> UpdateHandler<RequestError> {
    Update::filter_message()
        .filter_map_async(run_pipeline)
        .inspect_async(record_sender)
}

fn commands() -> UpdateHandler<RequestError> {
    dptree::entry()
        .filter_command::<Command>()
        .branch(dptree::case![Command::Start].endpoint(start))
        .branch(
            dptree::case![Command::Admin]
                .filter(|msg: Message, config: Arc<Config>| sent_by_admin(&msg, &config))
                .endpoint(admin_panel),
        )
}

fn sent_by_admin(msg: &Message, config: &Config) -> bool {
    msg.from.as_ref().is_some_and(|u| config.is_admin(u.id))
}

// Both steps touch SQLite, so they run on the blocking pool.

async fn run_pipeline(msg: Message, pipeline: Arc<Pipeline>) -> Option<RequestContext> {
    let event = InboundEvent::from(&msg);
    match tokio::task::spawn_blocking(move || pipeline.run(&event)).await {
        Ok(ctx) => ctx,
        Err(e) => {
            warn!("Pipeline task for chat {} failed: {e}", msg.chat.id);
            None
        }
    }
}

async fn record_sender(msg: Message, users: Arc<Database>) {
    let Some(user) = msg.from.as_ref().map(EventUser::from) else {
        return;
    };
    let id = user.id;
    match tokio::task::spawn_blocking(move || users.upsert_user(&user)).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!("Failed to store user {id}: {e}"),
        Err(e) => warn!("Store task for user {id} failed: {e}"),
    }
}

async fn start(bot: Bot, msg: Message, ctx: RequestContext) -> ResponseResult<()> {
    bot.send_message(msg.chat.id, ctx.translator.start_message()).await?;
    Ok(())
}

async fn admin_panel(bot: Bot, msg: Message, ctx: RequestContext) -> ResponseResult<()> {
    if let Some(user) = msg.from.as_ref() {
        info!("Admin panel opened by {}", user.id);
    }
    bot.send_message(msg.chat.id, ctx.translator.admin_panel()).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ops::ControlFlow;
    use std::sync::Mutex;
    use std::time::Duration;

    use serde_json::json;
    use teloxide::dptree::di::DependencyMap;
    use teloxide::types::{Me, UserId};

    use crate::i18n::TranslatorHub;
    use crate::throttle::RateLimiter;

    const ADMIN: u64 = 1;

    struct Fixture {
        limiter: RateLimiter,
        pipeline: Arc<Pipeline>,
        db: Arc<Database>,
        config: Arc<Config>,
    }

    impl Fixture {
        fn new() -> Self {
            let db = Arc::new(Database::in_memory().unwrap());
            let hub = Arc::new(TranslatorHub::embedded().unwrap());
            let limiter = RateLimiter::with_window(Duration::from_secs(5), 10_000);
            let pipeline = Arc::new(Pipeline::new(limiter.clone(), hub, db.clone()));
            let config = Config::from_lookup(|name| match name {
                "BOT_TOKEN" => Some("123456:TEST-token".to_string()),
                "ADMIN_IDS" => Some(ADMIN.to_string()),
                _ => None,
            })
            .unwrap();
            Self { limiter, pipeline, db, config: Arc::new(config) }
        }

        fn deps(&self, update: Update) -> DependencyMap {
            dptree::deps![update, self.pipeline.clone(), self.db.clone(), self.config.clone(), me()]
        }
    }

    fn me() -> Me {
        serde_json::from_value(json!({
            "id": 100,
            "is_bot": true,
            "first_name": "Locale Bot",
            "username": "locale_bot",
            "can_join_groups": true,
            "can_read_all_group_messages": false,
            "supports_inline_queries": false,
            "can_connect_to_business": false,
            "has_main_web_app": false
        }))
        .unwrap()
    }

    fn message(user_id: u64, language: &str, text: &str) -> Update {
        // `Update` only deserializes reliably from a string, not from a `Value`.
        serde_json::from_str(&json!({
            "update_id": 1,
            "message": {
                "message_id": 1,
                "from": {
                    "id": user_id,
                    "is_bot": false,
                    "first_name": "Test",
                    "language_code": language
                },
                "chat": {"id": user_id, "first_name": "Test", "type": "private"},
                "date": 1700000000,
                "text": text
            }
        }).to_string())
        .unwrap()
    }

    #[test]
    fn test_parse_commands() {
        assert_eq!(Command::parse("/start", "locale_bot").unwrap(), Command::Start);
        assert_eq!(Command::parse("/admin", "locale_bot").unwrap(), Command::Admin);
        assert_eq!(Command::parse("/start@locale_bot", "locale_bot").unwrap(), Command::Start);
    }

    #[test]
    fn test_unknown_command_rejected() {
        assert!(Command::parse("/help", "locale_bot").is_err());
        assert!(Command::parse("start", "locale_bot").is_err());
    }

    #[tokio::test]
    async fn test_throttled_update_stops_before_handlers() {
        let fx = Fixture::new();
        assert!(fx.limiter.admit(Some(UserId(5))));

        // No `Bot` in the dependencies: reaching `start` would panic.
        let result = schema().dispatch(fx.deps(message(5, "en", "/start"))).await;

        assert!(matches!(result, ControlFlow::Continue(_)));
        assert!(fx.db.get_user(UserId(5)).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_plain_text_records_sender() {
        let fx = Fixture::new();

        let result = schema().dispatch(fx.deps(message(6, "en", "hello"))).await;

        assert!(matches!(result, ControlFlow::Continue(_)));
        assert_eq!(fx.db.language_code(UserId(6)).unwrap().as_deref(), Some("en"));
    }

    #[tokio::test]
    async fn test_second_update_in_window_dropped() {
        let fx = Fixture::new();

        schema().dispatch(fx.deps(message(7, "en", "hello"))).await;
        let first_seen = fx.db.get_user(UserId(7)).unwrap().expect("recorded").updated_at;

        let result = schema().dispatch(fx.deps(message(7, "ru", "hello again"))).await;

        assert!(matches!(result, ControlFlow::Continue(_)));
        let user = fx.db.get_user(UserId(7)).unwrap().unwrap();
        assert_eq!(user.language_code.as_deref(), Some("en"));
        assert_eq!(user.updated_at, first_seen);
    }

    #[tokio::test]
    async fn test_sender_recorded_after_locale_read() {
        let fx = Fixture::new();
        let seen = Arc::new(Mutex::new(Vec::<String>::new()));

        let handler = inbound().endpoint(|ctx: RequestContext, seen: Arc<Mutex<Vec<String>>>| async move {
            seen.lock().unwrap().push(ctx.translator.locale().to_string());
            Ok::<(), RequestError>(())
        });
        let mut deps = fx.deps(message(8, "en", "/start"));
        deps.insert(seen.clone());

        assert!(matches!(handler.dispatch(deps).await, ControlFlow::Break(Ok(()))));
        assert_eq!(*seen.lock().unwrap(), vec!["ru".to_string()]);
        assert_eq!(fx.db.language_code(UserId(8)).unwrap().as_deref(), Some("en"));
    }

    #[tokio::test]
    async fn test_admin_command_ignored_for_non_admin() {
        let fx = Fixture::new();

        let result = schema().dispatch(fx.deps(message(ADMIN + 1, "ru", "/admin"))).await;

        assert!(matches!(result, ControlFlow::Continue(_)));
        assert!(fx.db.get_user(UserId(ADMIN + 1)).unwrap().is_some());
    }
}
