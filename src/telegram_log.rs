//! Mirrors the bot's own log output into an operator Telegram chat.

use std::time::Duration;

use teloxide::prelude::*;
use teloxide::types::ChatId;
use tokio::sync::mpsc;
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::Layer;
use tracing_subscriber::layer::Context;

/// Telegram rejects messages longer than 4096 chars.
const MAX_LOG_CHARS: usize = 4000;
const FLUSH_INTERVAL: Duration = Duration::from_secs(5);
const MAX_BATCH: usize = 50;

#[derive(Debug, PartialEq, Eq)]
enum LogLine {
    /// WARN/ERROR, sent right away.
    Urgent(String),
    /// INFO, batched.
    Info(String),
}

impl LogLine {
    fn for_event(level: Level, message: String) -> Option<Self> {
        match level {
            Level::ERROR => Some(Self::Urgent(format!("❌ {message}"))),
            Level::WARN => Some(Self::Urgent(format!("⚠️ {message}"))),
            Level::INFO => Some(Self::Info(message)),
            _ => None,
        }
    }
}

pub struct TelegramLogLayer {
    tx: mpsc::UnboundedSender<LogLine>,
}

impl TelegramLogLayer {
    /// Spawns the sender task; must be called inside a tokio runtime.
    pub fn new(bot: Bot, chat_id: ChatId) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(forward(bot, chat_id, rx));
        Self { tx }
    }
}

async fn forward(bot: Bot, chat_id: ChatId, mut rx: mpsc::UnboundedReceiver<LogLine>) {
    let mut pending: Vec<String> = Vec::new();
    let mut interval = tokio::time::interval(FLUSH_INTERVAL);

    loop {
        tokio::select! {
            line = rx.recv() => match line {
                Some(LogLine::Urgent(text)) => send_log(&bot, chat_id, &text).await,
                Some(LogLine::Info(text)) => {
                    pending.push(text);
                    if pending.len() >= MAX_BATCH {
                        flush(&bot, chat_id, &mut pending).await;
                    }
                }
                None => {
                    flush(&bot, chat_id, &mut pending).await;
                    break;
                }
            },
            _ = interval.tick() => flush(&bot, chat_id, &mut pending).await,
        }
    }
}

async fn flush(bot: &Bot, chat_id: ChatId, pending: &mut Vec<String>) {
    if pending.is_empty() {
        return;
    }
    let combined = pending.join("\n");
    pending.clear();
    send_log(bot, chat_id, &combined).await;
}

async fn send_log(bot: &Bot, chat_id: ChatId, text: &str) {
    // Can't use tracing here: the event would loop back into this layer
    if let Err(e) = bot.send_message(chat_id, truncate(text)).await {
        eprintln!("Failed to send log to Telegram: {e}");
    }
}

fn truncate(text: &str) -> String {
    if text.chars().count() <= MAX_LOG_CHARS {
        return text.to_string();
    }
    let truncated: String = text.chars().take(MAX_LOG_CHARS).collect();
    format!("{truncated}...")
}

/// Flattens an event's fields into one line, message first.
#[derive(Default)]
struct LineVisitor {
    line: String,
}

impl Visit for LineVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.push(value.to_string(), true);
        } else {
            self.push(format!("{} = {}", field.name(), value), false);
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.push(format!("{:?}", value), true);
        } else {
            self.push(format!("{} = {:?}", field.name(), value), false);
        }
    }
}

impl LineVisitor {
    fn push(&mut self, part: String, is_message: bool) {
        if self.line.is_empty() {
            self.line = part;
        } else if is_message {
            self.line = format!("{part}, {}", self.line);
        } else {
            self.line.push_str(", ");
            self.line.push_str(&part);
        }
    }
}

impl<S: Subscriber> Layer<S> for TelegramLogLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let level = *event.metadata().level();
        if level > Level::INFO {
            return;
        }

        let mut visitor = LineVisitor::default();
        event.record(&mut visitor);

        if let Some(line) = LogLine::for_event(level, visitor.line)
            && self.tx.send(line).is_err()
        {
            eprintln!("Log channel closed, message dropped");
        }
    }
}
