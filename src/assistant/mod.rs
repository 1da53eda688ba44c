//! Assistant module - relays Telegram messages to Gemini and logs every turn.

pub mod database;
pub mod engine;
pub mod gemini;
pub mod message;
pub mod store;
pub mod telegram;


pub use database::SqliteStore;
pub use engine::{AssistantEngine, Outcome, APOLOGY_MESSAGE, GREETING_COMMAND, ONBOARDING_MESSAGE};
pub use gemini::{Completion, CompletionError, GeminiClient};
pub use message::{ConversationTurn, InboundMessage, Store, User, UserRecord};
pub use store::{ConversationStore, JsonFileStore, StoreError};
pub use telegram::{ChatTransport, Reply, TelegramClient};
