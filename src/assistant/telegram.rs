//! Telegram client using teloxide.

use async_trait::async_trait;
use teloxide::prelude::*;
use teloxide::types::{ButtonRequest, KeyboardButton, KeyboardMarkup};

use crate::assistant::message::{Contact, InboundMessage, User};

/// Label of the one-button keyboard that asks for the user's contact.
pub const CONTACT_BUTTON_LABEL: &str = "Enviar teléfono";

/// An outbound chat message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub chat_id: i64,
    pub text: String,
    /// Attach the share-contact keyboard.
    pub request_contact: bool,
}

/// Where replies are delivered.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    async fn send_reply(&self, reply: &Reply) -> Result<(), String>;
}

/// Telegram API client.
pub struct TelegramClient {
    bot: Bot,
}

impl TelegramClient {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }
}

#[async_trait]
impl ChatTransport for TelegramClient {
    async fn send_reply(&self, reply: &Reply) -> Result<(), String> {
        let mut request = self.bot.send_message(ChatId(reply.chat_id), &reply.text);

        if reply.request_contact {
            request = request.reply_markup(contact_keyboard());
        }

        request.await.map(|_| ()).map_err(|e| format!("Failed to send: {e}"))
    }
}

fn contact_keyboard() -> KeyboardMarkup {
    KeyboardMarkup::new(vec![vec![
        KeyboardButton::new(CONTACT_BUTTON_LABEL).request(ButtonRequest::Contact),
    ]])
}

/// Convert a Telegram message into the shape the engine works with.
///
/// Returns `None` for messages without a sender (channel posts).
pub fn inbound_from_telegram(msg: &Message) -> Option<InboundMessage> {
    let user = msg.from.as_ref()?;

    Some(InboundMessage {
        chat_id: msg.chat.id.0,
        from: User::new(user.id.0 as i64, user.first_name.clone()),
        username: user.username.clone(),
        text: msg.text().map(str::to_string),
        contact: msg.contact().map(|c| Contact {
            phone_number: c.phone_number.clone(),
            user_id: c.user_id.map(|id| id.0 as i64),
        }),
    })
}
