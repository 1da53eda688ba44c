//! Conversation log records and the inbound message shape.
//!
//! The serialized field names follow the deployed `conversations.json`
//! format (`first_name`, `conversations`) so existing logs stay readable.

use std::collections::BTreeMap;

use chrono::{Local, SecondsFormat};
use serde::{Deserialize, Serialize};

/// The whole persisted log, keyed by Telegram user ID.
///
/// `BTreeMap` keeps keys in numeric order, so records that were not touched
/// serialize to the same bytes on every rewrite.
pub type Store = BTreeMap<i64, UserRecord>;

/// Identity of the person who sent a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: i64,
    pub display_name: String,
    /// Only consulted when the user's record is created.
    pub phone_number: Option<String>,
}

impl User {
    pub fn new(id: i64, display_name: impl Into<String>) -> Self {
        Self {
            id,
            display_name: display_name.into(),
            phone_number: None,
        }
    }

    pub fn with_phone(mut self, phone_number: impl Into<String>) -> Self {
        self.phone_number = Some(phone_number.into());
        self
    }
}

/// One user message paired with the bot's reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConversationTurn {
    pub user_message: String,
    pub bot_response: String,
    pub arrival_time: String,
    pub response_time: String,
}

/// Everything logged for a single user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UserRecord {
    pub user_id: i64,
    #[serde(rename = "first_name")]
    pub display_name: String,
    /// Empty until the user shares a contact. Set once, never overwritten.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub phone_number: String,
    #[serde(rename = "conversations")]
    pub turns: Vec<ConversationTurn>,
}

impl UserRecord {
    pub fn new(user: &User) -> Self {
        Self {
            user_id: user.id,
            display_name: user.display_name.clone(),
            phone_number: user.phone_number.clone().unwrap_or_default(),
            turns: Vec::new(),
        }
    }

    /// Fill the phone number if none is stored yet.
    ///
    /// Returns `true` if the record changed.
    pub fn fill_phone(&mut self, phone_number: &str) -> bool {
        if !self.phone_number.is_empty() || phone_number.is_empty() {
            return false;
        }
        self.phone_number = phone_number.to_string();
        true
    }
}

/// Shared contact payload attached to a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Contact {
    pub phone_number: String,
    /// Telegram user the contact belongs to, when it is a Telegram account.
    pub user_id: Option<i64>,
}

impl Contact {
    /// Whether this is the sender's own contact rather than someone else's.
    pub fn belongs_to(&self, user: &User) -> bool {
        self.user_id == Some(user.id)
    }
}

/// The transport-independent shape of an inbound chat message.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub chat_id: i64,
    pub from: User,
    /// `@username`, if the sender has one. Only used for log lines.
    pub username: Option<String>,
    pub text: Option<String>,
    pub contact: Option<Contact>,
}

impl InboundMessage {
    /// Name to show in log lines: the username if set, else the display name.
    pub fn sender_label(&self) -> &str {
        self.username.as_deref().unwrap_or(&self.from.display_name)
    }
}

/// Current wall-clock time as an RFC 3339 string with second precision.
pub fn timestamp_now() -> String {
    Local::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}
