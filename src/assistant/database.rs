//! SQLite conversation log: one row per user, one row per turn.
//!
//! Appends touch only the sender's rows inside a transaction instead of
//! rewriting every user's history.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use rusqlite::{Connection, params};
use tracing::{debug, info};

use crate::assistant::message::{ConversationTurn, Store, User, UserRecord};
use crate::assistant::store::{ConversationStore, StoreError};

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) the database at `path`.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        let store = Self::with_connection(conn)?;
        let users = store.user_count()?;
        info!("Opened conversation database {:?} ({} users)", path, users);
        Ok(store)
    }

    /// In-memory database, used by tests.
    pub fn in_memory() -> Result<Self, StoreError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                user_id INTEGER PRIMARY KEY,
                first_name TEXT NOT NULL,
                phone_number TEXT NOT NULL DEFAULT ''
            );

            CREATE TABLE IF NOT EXISTS turns (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL REFERENCES users(user_id),
                user_message TEXT NOT NULL,
                bot_response TEXT NOT NULL,
                arrival_time TEXT NOT NULL,
                response_time TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_turns_user_id ON turns(user_id);
        "#,
        )?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        // Uncommitted transactions roll back on drop
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn user_count(&self) -> Result<i64, StoreError> {
        let conn = self.lock();
        Ok(conn.query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))?)
    }
}

impl ConversationStore for SqliteStore {
    fn append_turn(&self, user: &User, turn: ConversationTurn) -> Result<(), StoreError> {
        let mut conn = self.lock();
        let tx = conn.transaction()?;

        // Existing rows keep their phone number
        tx.execute(
            "INSERT OR IGNORE INTO users (user_id, first_name, phone_number) VALUES (?1, ?2, ?3)",
            params![
                user.id,
                user.display_name,
                user.phone_number.as_deref().unwrap_or("")
            ],
        )?;
        tx.execute(
            "INSERT INTO turns (user_id, user_message, bot_response, arrival_time, response_time)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                user.id,
                turn.user_message,
                turn.bot_response,
                turn.arrival_time,
                turn.response_time
            ],
        )?;
        tx.commit()?;

        debug!("💾 Logged turn for user {}", user.id);
        Ok(())
    }

    fn record_contact(&self, user: &User, phone_number: &str) -> Result<(), StoreError> {
        let mut conn = self.lock();
        let tx = conn.transaction()?;

        tx.execute(
            "INSERT OR IGNORE INTO users (user_id, first_name, phone_number) VALUES (?1, ?2, '')",
            params![user.id, user.display_name],
        )?;
        let updated = tx.execute(
            "UPDATE users SET phone_number = ?2 WHERE user_id = ?1 AND phone_number = '' AND ?2 != ''",
            params![user.id, phone_number],
        )?;
        tx.commit()?;

        if updated > 0 {
            info!("📇 Stored phone number for user {}", user.id);
        }
        Ok(())
    }

    fn load(&self) -> Result<Store, StoreError> {
        let conn = self.lock();
        let mut store = Store::new();

        let mut users =
            conn.prepare("SELECT user_id, first_name, phone_number FROM users ORDER BY user_id")?;
        let rows = users.query_map([], |row| {
            Ok(UserRecord {
                user_id: row.get(0)?,
                display_name: row.get(1)?,
                phone_number: row.get(2)?,
                turns: Vec::new(),
            })
        })?;
        for record in rows {
            let record = record?;
            store.insert(record.user_id, record);
        }

        let mut turns = conn.prepare(
            "SELECT user_id, user_message, bot_response, arrival_time, response_time
             FROM turns ORDER BY id",
        )?;
        let rows = turns.query_map([], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                ConversationTurn {
                    user_message: row.get(1)?,
                    bot_response: row.get(2)?,
                    arrival_time: row.get(3)?,
                    response_time: row.get(4)?,
                },
            ))
        })?;
        for row in rows {
            let (user_id, turn) = row?;
            if let Some(record) = store.get_mut(&user_id) {
                record.turns.push(turn);
            }
        }

        Ok(store)
    }
}
