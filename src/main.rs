use std::path::PathBuf;
use std::sync::Arc;

use teloxide::prelude::*;
use tracing::{error, info, warn};
use tracing_subscriber::prelude::*;

use xenox::assistant::telegram::inbound_from_telegram;
use xenox::assistant::{
    AssistantEngine, ConversationStore, GeminiClient, JsonFileStore, SqliteStore, StoreError,
    TelegramClient,
};
use xenox::config::{Config, StoreBackend};
use xenox::telegram_log::TelegramLogLayer;

struct BotState {
    engine: AssistantEngine,
}

impl BotState {
    fn new(config: &Config, bot: &Bot) -> Result<Self, StoreError> {
        let completion = Arc::new(GeminiClient::new(
            config.api_key.clone(),
            &config.api_base,
            &config.model,
        ));
        info!("Using model {} at {}", config.model, config.api_base);

        let store: Arc<dyn ConversationStore> = match config.store_backend {
            StoreBackend::Json => {
                info!("Conversation log: {:?} (json)", config.conversations_path);
                Arc::new(JsonFileStore::new(config.conversations_path.clone()))
            }
            StoreBackend::Sqlite => Arc::new(SqliteStore::open(&config.conversations_path)?),
        };

        let telegram = Arc::new(TelegramClient::new(bot.clone()));
        Ok(Self {
            engine: AssistantEngine::new(completion, store, telegram),
        })
    }
}

#[tokio::main]
async fn main() {
    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config = match Config::load(config_path.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            std::process::exit(1);
        }
    };

    let bot = Bot::new(&config.telegram_bot_token);

    // Setup logging
    let log_dir = config.data_dir.join("logs");
    std::fs::create_dir_all(&log_dir).ok();
    let log_file = match std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_dir.join("xenox.log"))
    {
        Ok(file) => file,
        Err(e) => {
            eprintln!("Failed to open log file in {}: {e}", log_dir.display());
            std::process::exit(1);
        }
    };
    let (non_blocking, _guard) = tracing_appender::non_blocking(log_file);

    let registry = tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stdout)
                .with_filter(
                    tracing_subscriber::EnvFilter::from_default_env()
                        .add_directive(tracing::Level::INFO.into()),
                ),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_filter(
                    tracing_subscriber::EnvFilter::from_default_env()
                        .add_directive(tracing::Level::INFO.into()),
                ),
        );

    if let Some(log_chat_id) = config.log_chat_id {
        let tg_layer = TelegramLogLayer::new(bot.clone(), log_chat_id);
        registry.with(tg_layer).init();
    } else {
        registry.init();
    }

    info!("🚀 Starting xenox...");
    if let Some(ref path) = config_path {
        info!("Loaded config from {}", path.display());
    }

    match bot.get_me().await {
        Ok(me) => info!("Authorized as @{}", me.username()),
        Err(e) => warn!("Failed to get bot info: {e}"),
    }

    let state = match BotState::new(&config, &bot) {
        Ok(state) => Arc::new(state),
        Err(e) => {
            error!("Failed to open conversation log: {e}");
            std::process::exit(1);
        }
    };

    let handler = dptree::entry().branch(Update::filter_message().endpoint(handle_message));

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![state])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;
}

async fn handle_message(msg: Message, state: Arc<BotState>) -> ResponseResult<()> {
    if let Some(inbound) = inbound_from_telegram(&msg) {
        state.engine.handle_message(inbound).await;
    }
    Ok(())
}
