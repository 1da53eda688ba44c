use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};
use teloxide::types::ChatId;

use crate::assistant::gemini::{DEFAULT_API_BASE, DEFAULT_MODEL};

pub const TOKEN_VAR: &str = "TELEGRAM_BOT_TOKEN";
pub const API_KEY_VAR: &str = "GENERATIVE_LANGUAGE_API_KEY";

/// Errors that can occur when loading configuration.
#[derive(Debug)]
pub enum ConfigError {
    /// Failed to read the config file.
    ReadFile { path: PathBuf, source: std::io::Error },
    /// Failed to parse JSON.
    ParseJson { path: PathBuf, source: serde_json::Error },
    /// A required secret is not set.
    Missing(&'static str),
    /// Validation error.
    Validation(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ReadFile { path, source } => {
                write!(f, "failed to read config file '{}': {}", path.display(), source)
            }
            Self::ParseJson { path, source } => {
                write!(f, "failed to parse config file '{}': {}", path.display(), source)
            }
            Self::Missing(var) => write!(f, "{var} is not set"),
            Self::Validation(msg) => write!(f, "config validation error: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::ReadFile { source, .. } => Some(source),
            Self::ParseJson { source, .. } => Some(source),
            Self::Missing(_) | Self::Validation(_) => None,
        }
    }
}

/// Which `ConversationStore` implementation to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    /// Whole-file JSON document.
    Json,
    /// SQLite database, one row per user and per turn.
    Sqlite,
}

impl StoreBackend {
    fn default_path(self) -> &'static str {
        match self {
            Self::Json => "conversations.json",
            Self::Sqlite => "conversations.db",
        }
    }

    fn parse(name: &str) -> Result<Self, ConfigError> {
        match name.trim().to_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "sqlite" => Ok(Self::Sqlite),
            other => Err(ConfigError::Validation(format!(
                "unknown store_backend '{other}' (expected \"json\" or \"sqlite\")"
            ))),
        }
    }
}

/// Optional JSON config file. Every field can also come from the environment.
#[derive(Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    telegram_bot_token: Option<String>,
    /// Generative Language API key
    api_key: Option<String>,
    model: Option<String>,
    api_base: Option<String>,
    conversations_path: Option<String>,
    store_backend: Option<String>,
    /// Directory for log files. Defaults to current directory.
    data_dir: Option<String>,
    log_chat_id: Option<i64>,
}

pub struct Config {
    pub telegram_bot_token: String,
    pub api_key: String,
    pub model: String,
    pub api_base: String,
    pub conversations_path: PathBuf,
    pub store_backend: StoreBackend,
    /// Directory for log files.
    pub data_dir: PathBuf,
    /// Operator chat that receives the bot's own log output.
    pub log_chat_id: Option<ChatId>,
}

impl Config {
    /// Load from an optional config file, then apply environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let file = match path {
            Some(path) => read_file(path)?,
            None => ConfigFile::default(),
        };
        Self::resolve(file, |var| std::env::var(var).ok())
    }

    fn resolve<F>(file: ConfigFile, env: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        // Environment wins over the file; blank values count as unset
        let pick = |var: &str, from_file: Option<String>| {
            env(var)
                .filter(|v| !v.trim().is_empty())
                .or(from_file.filter(|v| !v.trim().is_empty()))
        };

        let telegram_bot_token =
            pick(TOKEN_VAR, file.telegram_bot_token).ok_or(ConfigError::Missing(TOKEN_VAR))?;
        validate_token(&telegram_bot_token)?;

        let api_key = pick(API_KEY_VAR, file.api_key).ok_or(ConfigError::Missing(API_KEY_VAR))?;

        let model = pick("GEMINI_MODEL", file.model).unwrap_or_else(|| DEFAULT_MODEL.to_string());
        let api_base =
            pick("GEMINI_API_BASE", file.api_base).unwrap_or_else(|| DEFAULT_API_BASE.to_string());
        let store_backend = match pick("STORE_BACKEND", file.store_backend) {
            Some(name) => StoreBackend::parse(&name)?,
            None => StoreBackend::Json,
        };
        let conversations_path = pick("CONVERSATIONS_PATH", file.conversations_path)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(store_backend.default_path()));
        let data_dir = pick("DATA_DIR", file.data_dir)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."));

        let log_chat_id = match env("LOG_CHAT_ID").filter(|v| !v.trim().is_empty()) {
            Some(raw) => Some(raw.trim().parse::<i64>().map_err(|_| {
                ConfigError::Validation(format!("LOG_CHAT_ID must be a numeric chat id, got '{raw}'"))
            })?),
            None => file.log_chat_id,
        };

        Ok(Self {
            telegram_bot_token,
            api_key,
            model,
            api_base,
            conversations_path,
            store_backend,
            data_dir,
            log_chat_id: log_chat_id.map(ChatId),
        })
    }
}

fn read_file(path: &Path) -> Result<ConfigFile, ConfigError> {
    let config_path = path.to_path_buf();
    let content = std::fs::read_to_string(&config_path)
        .map_err(|e| ConfigError::ReadFile { path: config_path.clone(), source: e })?;
    serde_json::from_str(&content)
        .map_err(|e| ConfigError::ParseJson { path: config_path, source: e })
}

/// Telegram tokens are formatted as {bot_id}:{secret} where bot_id is numeric.
fn validate_token(token: &str) -> Result<(), ConfigError> {
    let token_parts: Vec<&str> = token.split(':').collect();
    if token_parts.len() != 2 || token_parts[0].parse::<u64>().is_err() || token_parts[1].is_empty() {
        return Err(ConfigError::Validation(format!(
            "{TOKEN_VAR} appears invalid (expected format: 123456789:ABCdefGHI...)"
        )));
    }
    Ok(())
}
