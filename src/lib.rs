//! Telegram assistant that answers with Gemini and keeps a per-user conversation log.

pub mod assistant;
pub mod config;
pub mod telegram_log;
