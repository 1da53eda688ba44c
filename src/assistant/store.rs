//! Conversation log persisted as a single JSON document.
//!
//! Every operation reads the whole file, changes one record, and writes the
//! whole file back. There is no in-memory state between calls.

use std::fmt;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::assistant::message::{ConversationTurn, Store, User, UserRecord};

/// Errors from reading or writing the conversation log.
#[derive(Debug)]
pub enum StoreError {
    /// Reading (other than "file absent") or writing the backing file failed.
    Io { path: PathBuf, source: io::Error },
    /// The backing file exists but is not a valid store.
    Corrupt { path: PathBuf, source: serde_json::Error },
    /// The store could not be serialized.
    Serialize(serde_json::Error),
    /// SQLite backend failure.
    Database(rusqlite::Error),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io { path, source } => {
                write!(f, "conversation log I/O error on '{}': {}", path.display(), source)
            }
            Self::Corrupt { path, source } => {
                write!(f, "conversation log '{}' is corrupt: {}", path.display(), source)
            }
            Self::Serialize(e) => write!(f, "failed to serialize conversation log: {e}"),
            Self::Database(e) => write!(f, "conversation database error: {e}"),
        }
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Corrupt { source, .. } => Some(source),
            Self::Serialize(e) => Some(e),
            Self::Database(e) => Some(e),
        }
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        Self::Database(e)
    }
}

/// Where conversation turns are recorded.
pub trait ConversationStore: Send + Sync {
    /// Append a turn to the user's history, creating the record on first
    /// contact. An existing record keeps its stored phone number.
    fn append_turn(&self, user: &User, turn: ConversationTurn) -> Result<(), StoreError>;

    /// Remember a shared phone number. Creates the record if needed and only
    /// fills the phone number while it is still empty.
    fn record_contact(&self, user: &User, phone_number: &str) -> Result<(), StoreError>;

    /// Snapshot of every user's record.
    fn load(&self) -> Result<Store, StoreError>;
}

/// Store backed by one pretty-printed JSON file.
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> Result<Store, StoreError> {
        let data = match fs::read(&self.path) {
            Ok(data) => data,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("No conversation log at {:?}, starting empty", self.path);
                return Ok(Store::new());
            }
            Err(e) => {
                return Err(StoreError::Io { path: self.path.clone(), source: e });
            }
        };

        let store: Store = serde_json::from_slice(&data).map_err(|e| StoreError::Corrupt {
            path: self.path.clone(),
            source: e,
        })?;

        // Each record must sit under its own user ID
        if let Some((key, record)) = store.iter().find(|(key, record)| **key != record.user_id) {
            let reason = format!("record under key {key} has user_id {}", record.user_id);
            return Err(StoreError::Corrupt {
                path: self.path.clone(),
                source: serde::de::Error::custom(reason),
            });
        }
        Ok(store)
    }

    /// Replace the file via a sibling temp file so a crash mid-write never
    /// leaves a truncated store behind.
    fn write(&self, store: &Store) -> Result<(), StoreError> {
        let json = serde_json::to_vec_pretty(store).map_err(StoreError::Serialize)?;
        let tmp_path = temp_path_for(&self.path);

        let result = (|| -> io::Result<()> {
            let mut file = File::create(&tmp_path)?;
            file.write_all(&json)?;
            file.sync_all()?;
            fs::rename(&tmp_path, &self.path)
        })();

        if let Err(e) = result {
            fs::remove_file(&tmp_path).ok();
            return Err(StoreError::Io { path: self.path.clone(), source: e });
        }
        Ok(())
    }

    fn update<F>(&self, user: &User, change: F) -> Result<(), StoreError>
    where
        F: FnOnce(&mut UserRecord),
    {
        let mut store = self.read()?;
        let record = store
            .entry(user.id)
            .or_insert_with(|| UserRecord::new(user));
        change(record);
        self.write(&store)
    }
}

impl ConversationStore for JsonFileStore {
    fn append_turn(&self, user: &User, turn: ConversationTurn) -> Result<(), StoreError> {
        let mut count = 0;
        self.update(user, |record| {
            record.turns.push(turn);
            count = record.turns.len();
        })?;
        debug!("💾 Logged turn #{} for user {}", count, user.id);
        Ok(())
    }

    fn record_contact(&self, user: &User, phone_number: &str) -> Result<(), StoreError> {
        let mut filled = false;
        self.update(user, |record| filled = record.fill_phone(phone_number))?;
        if filled {
            info!("📇 Stored phone number for user {}", user.id);
        } else {
            debug!("Phone number for user {} already known, not overwritten", user.id);
        }
        Ok(())
    }

    fn load(&self) -> Result<Store, StoreError> {
        self.read()
    }
}

fn temp_path_for(path: &Path) -> PathBuf {
    match path.file_name() {
        Some(name) => {
            let mut name = name.to_os_string();
            name.push(".tmp");
            path.with_file_name(name)
        }
        None => path.with_extension("tmp"),
    }
}
