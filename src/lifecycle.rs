//! Startup and shutdown housekeeping.

use std::fmt;
use std::future::Future;

use teloxide::prelude::*;
use teloxide::RequestError;
use teloxide::types::{BotCommand, BotCommandScope};
use tracing::error;

use crate::i18n::Translator;

/// Something that can deliver a plain text notice to a user.
pub trait NoticeSender {
    type Error: fmt::Display;

    fn send_notice(&self, user: UserId, text: &str) -> impl Future<Output = Result<(), Self::Error>> + Send;
}

impl NoticeSender for Bot {
    type Error = RequestError;

    async fn send_notice(&self, user: UserId, text: &str) -> Result<(), RequestError> {
        self.send_message(ChatId::from(user), text).await.map(|_| ())
    }
}

/// Send `text` to every administrator. Returns how many got it.
///
/// A failed delivery is logged and does not stop the others.
pub async fn notify_admins<S: NoticeSender>(sender: &S, admins: &[UserId], text: &str) -> usize {
    let mut delivered = 0;
    for &admin in admins {
        match sender.send_notice(admin, text).await {
            Ok(()) => delivered += 1,
            Err(e) => error!("Failed to send message to admin {}: {e}", admin),
        }
    }
    delivered
}

/// Register the command menu shown to every user.
pub async fn set_commands(bot: &Bot, translator: &Translator) -> ResponseResult<()> {
    let commands = vec![BotCommand::new("start", translator.start_command())];
    bot.set_my_commands(commands).scope(BotCommandScope::Default).await?;
    Ok(())
}
