//! Assistant engine - answers Telegram messages with Gemini and logs each turn.

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::assistant::gemini::Completion;
use crate::assistant::message::{ConversationTurn, InboundMessage, timestamp_now};
use crate::assistant::store::ConversationStore;
use crate::assistant::telegram::{ChatTransport, Reply};

/// Command that triggers the onboarding message.
pub const GREETING_COMMAND: &str = "/start";

pub const ONBOARDING_MESSAGE: &str =
    "¡Hola! Soy un asistente ético. ¿En qué puedo ayudarte? Por favor, comparte tu número telefónico.";

/// Sent in place of a reply whenever the completion fails.
pub const APOLOGY_MESSAGE: &str = "Lo siento, hubo un error al procesar tu solicitud.";

/// What the engine did with one inbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// No text and no contact of the sender's own.
    Skipped,
    /// A shared contact was recorded; nothing was sent.
    ContactRecorded,
    /// A reply was produced (and delivery attempted).
    Replied {
        reply: Reply,
        /// The completion failed and the apology was used.
        apologized: bool,
        logged: bool,
        delivered: bool,
    },
}

/// The assistant engine.
pub struct AssistantEngine {
    completion: Arc<dyn Completion>,
    store: Arc<dyn ConversationStore>,
    transport: Arc<dyn ChatTransport>,
    /// Held for the whole of one message so events are handled one at a time.
    turn_lock: Mutex<()>,
}

impl AssistantEngine {
    pub fn new(
        completion: Arc<dyn Completion>,
        store: Arc<dyn ConversationStore>,
        transport: Arc<dyn ChatTransport>,
    ) -> Self {
        Self {
            completion,
            store,
            transport,
            turn_lock: Mutex::new(()),
        }
    }

    /// Handle one inbound message end to end.
    pub async fn handle_message(&self, msg: InboundMessage) -> Outcome {
        let _turn = self.turn_lock.lock().await;

        let text = match msg.text.as_deref() {
            Some(t) if !t.is_empty() => t,
            _ => {
                return match msg.contact {
                    Some(ref contact) if contact.belongs_to(&msg.from) => {
                        self.record_contact(&msg, &contact.phone_number);
                        Outcome::ContactRecorded
                    }
                    Some(_) => {
                        info!("Ignoring contact from [{}] that is not their own", msg.sender_label());
                        Outcome::Skipped
                    }
                    None => Outcome::Skipped,
                };
            }
        };

        let arrival_time = timestamp_now();
        info!("📨 [{}] {}", msg.sender_label(), text);

        let is_greeting = text == GREETING_COMMAND;
        let (reply_text, apologized) = if is_greeting {
            (ONBOARDING_MESSAGE.to_string(), false)
        } else {
            match self.completion.generate(text).await {
                Ok(generated) => (generated, false),
                Err(e) => {
                    error!("Error generating response for user {}: {e}", msg.from.id);
                    (APOLOGY_MESSAGE.to_string(), true)
                }
            }
        };
        let response_time = timestamp_now();

        let turn = ConversationTurn {
            user_message: text.to_string(),
            bot_response: reply_text.clone(),
            arrival_time,
            response_time,
        };
        let logged = match self.store.append_turn(&msg.from, turn) {
            Ok(()) => true,
            Err(e) => {
                error!("Failed to log conversation for user {}: {e}", msg.from.id);
                false
            }
        };

        let reply = Reply {
            chat_id: msg.chat_id,
            text: reply_text,
            request_contact: is_greeting,
        };
        let delivered = match self.transport.send_reply(&reply).await {
            Ok(()) => true,
            Err(e) => {
                warn!("Error sending reply to chat {}: {e}", reply.chat_id);
                false
            }
        };

        Outcome::Replied { reply, apologized, logged, delivered }
    }

    fn record_contact(&self, msg: &InboundMessage, phone_number: &str) {
        info!("📇 Contact shared by [{}]", msg.sender_label());
        if let Err(e) = self.store.record_contact(&msg.from, phone_number) {
            error!("Failed to store contact for user {}: {e}", msg.from.id);
        }
    }
}
