//! Telegram bot with per-user throttling and locale-aware replies.

pub mod config;
pub mod database;
pub mod handlers;
pub mod i18n;
pub mod lifecycle;
pub mod logging;
pub mod pipeline;
pub mod throttle;
