//! Per-event middleware: throttle, then pick a translator, then dispatch.
//!
//! Stages run strictly in [`Pipeline::STAGES`] order for one event. Events of
//! different users share nothing but the throttle store and may interleave.

use std::sync::Arc;

use teloxide::types::{ChatId, Message, UserId};
use tracing::{debug, warn};

use crate::database::Database;
use crate::i18n::{Translator, TranslatorHub};
use crate::throttle::RateLimiter;

/// The sender of an inbound event, as declared by Telegram.
#[derive(Debug, Clone, PartialEq)]
pub struct EventUser {
    pub id: UserId,
    pub username: Option<String>,
    pub first_name: String,
    pub last_name: Option<String>,
    pub language_code: Option<String>,
    pub is_premium: Option<bool>,
}

impl From<&teloxide::types::User> for EventUser {
    fn from(user: &teloxide::types::User) -> Self {
        Self {
            id: user.id,
            username: user.username.clone(),
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
            language_code: user.language_code.clone(),
            is_premium: Some(user.is_premium),
        }
    }
}

/// Transport-independent view of an inbound update.
#[derive(Debug, Clone)]
pub struct InboundEvent {
    pub chat_id: ChatId,
    pub user: Option<EventUser>,
}

impl From<&Message> for InboundEvent {
    fn from(msg: &Message) -> Self {
        Self {
            chat_id: msg.chat.id,
            user: msg.from.as_ref().map(EventUser::from),
        }
    }
}

impl InboundEvent {
    pub fn user_id(&self) -> Option<UserId> {
        self.user.as_ref().map(|u| u.id)
    }
}

/// Per-event state handed to handlers.
///
/// Starts out with the root translator, the locale stage replaces it.
#[derive(Clone)]
pub struct RequestContext {
    pub translator: Translator,
    /// Language preference read from the user store, if any.
    pub stored_language: Option<String>,
}

impl RequestContext {
    pub fn new(translator: Translator) -> Self {
        Self { translator, stored_language: None }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Throttle,
    Locale,
}

/// Outcome of one stage.
pub enum Flow {
    Continue(RequestContext),
    /// Stop processing, nothing is sent back.
    Halt,
}

pub struct Pipeline {
    limiter: RateLimiter,
    hub: Arc<TranslatorHub>,
    users: Arc<Database>,
}

impl Pipeline {
    pub const STAGES: [Stage; 2] = [Stage::Throttle, Stage::Locale];

    pub fn new(limiter: RateLimiter, hub: Arc<TranslatorHub>, users: Arc<Database>) -> Self {
        Self { limiter, hub, users }
    }

    /// Context every event starts from.
    pub fn initial_context(&self) -> RequestContext {
        RequestContext::new(self.hub.resolve(None))
    }

    /// Run all stages. `None` means the event was dropped.
    ///
    /// The locale stage reads the user store, call this off the async workers.
    pub fn run(&self, event: &InboundEvent) -> Option<RequestContext> {
        let mut ctx = self.initial_context();
        for stage in Self::STAGES {
            ctx = match self.run_stage(stage, event, ctx) {
                Flow::Continue(ctx) => ctx,
                Flow::Halt => {
                    debug!("Event in chat {} halted at {:?}", event.chat_id, stage);
                    return None;
                }
            };
        }
        Some(ctx)
    }

    pub fn run_stage(&self, stage: Stage, event: &InboundEvent, ctx: RequestContext) -> Flow {
        match stage {
            Stage::Throttle => self.throttle_stage(event, ctx),
            Stage::Locale => self.locale_stage(event, ctx),
        }
    }

    fn throttle_stage(&self, event: &InboundEvent, ctx: RequestContext) -> Flow {
        if self.limiter.admit(event.user_id()) {
            Flow::Continue(ctx)
        } else {
            Flow::Halt
        }
    }

    fn locale_stage(&self, event: &InboundEvent, mut ctx: RequestContext) -> Flow {
        ctx.stored_language = event.user_id().and_then(|id| match self.users.language_code(id) {
            Ok(code) => code,
            Err(e) => {
                warn!("Failed to read language of user {}: {e}", id);
                None
            }
        });
        ctx.translator = self.hub.resolve(ctx.stored_language.as_deref());
        Flow::Continue(ctx)
    }
}
