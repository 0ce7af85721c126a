//! Persisted store - SQLite-backed storage for chats, messages, feedback
//! rules, and API keys, plus the change feed that stands in for a hosted
//! backend's realtime subscription.

pub mod schema;
pub mod chat_store;
pub mod message_store;
pub mod rulebook_store;
pub mod key_store;

pub use schema::*;
pub use chat_store::ChatStore;
pub use key_store::KeyStore;
pub use message_store::MessageStore;
pub use rulebook_store::RulebookStore;

use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, NaiveDateTime, Utc};
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use tokio::sync::broadcast;
use tracing::info;

/// Change-notification feed: every successfully inserted message row is
/// published to all subscribers. Delivery is best-effort; consumers must
/// deduplicate by row id since a subscriber may also be the writer.
#[derive(Clone)]
pub struct ChangeFeed {
    tx: broadcast::Sender<MessageRow>,
}

impl ChangeFeed {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(256);
        Self { tx }
    }

    pub fn publish(&self, row: MessageRow) {
        // No receivers is not an error
        let _ = self.tx.send(row);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MessageRow> {
        self.tx.subscribe()
    }
}

impl Default for ChangeFeed {
    fn default() -> Self {
        Self::new()
    }
}

pub struct ChatDatabase {
    pub chats: ChatStore,
    pub messages: MessageStore,
    pub rulebook: RulebookStore,
    pub api_keys: KeyStore,
    pub feed: ChangeFeed,
    pool: Arc<Pool<SqliteConnectionManager>>,
}

impl ChatDatabase {
    pub fn new(db_path: &Path) -> anyhow::Result<Self> {
        info!("Opening chat database at: {}", db_path.display());
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let manager = SqliteConnectionManager::file(db_path)
            .with_flags(
                rusqlite::OpenFlags::SQLITE_OPEN_READ_WRITE
                    | rusqlite::OpenFlags::SQLITE_OPEN_CREATE
                    | rusqlite::OpenFlags::SQLITE_OPEN_FULL_MUTEX,
            )
            // Per-connection pragmas; every pooled connection needs them.
            .with_init(|conn| {
                conn.execute_batch(
                    "PRAGMA foreign_keys = ON;
                     PRAGMA journal_mode = WAL;
                     PRAGMA synchronous = NORMAL;
                     PRAGMA busy_timeout = 5000;",
                )
            });
        let pool = Pool::builder()
            .max_size(10)
            .build(manager)
            .map_err(|e| anyhow::anyhow!("Failed to create connection pool: {}", e))?;

        {
            let conn = pool.get()?;
            conn.execute_batch(schema::SCHEMA_SQL)?;
        }

        info!("Chat database initialized successfully");
        Ok(Self::build(Arc::new(pool)))
    }

    /// In-memory database for tests. The pool is capped at one connection so
    /// every handle sees the same database.
    pub fn new_in_memory() -> anyhow::Result<Self> {
        let manager = SqliteConnectionManager::memory();
        let pool = Pool::builder().max_size(1).build(manager)?;
        {
            let conn = pool.get()?;
            conn.execute_batch("PRAGMA foreign_keys = ON;")?;
            conn.execute_batch(schema::SCHEMA_SQL)?;
        }
        Ok(Self::build(Arc::new(pool)))
    }

    fn build(pool: Arc<Pool<SqliteConnectionManager>>) -> Self {
        let feed = ChangeFeed::new();
        Self {
            chats: ChatStore::new(Arc::clone(&pool)),
            messages: MessageStore::new(Arc::clone(&pool), feed.clone()),
            rulebook: RulebookStore::new(Arc::clone(&pool)),
            api_keys: KeyStore::new(Arc::clone(&pool)),
            feed,
            pool,
        }
    }
}

#[cfg(test)]
impl ChatDatabase {
    /// Raw connection for tests that need to tamper with the database
    /// underneath the stores.
    pub(crate) fn test_conn(&self) -> r2d2::PooledConnection<SqliteConnectionManager> {
        self.pool.get().unwrap()
    }
}

impl Drop for ChatDatabase {
    fn drop(&mut self) {
        if let Ok(conn) = self.pool.get() {
            let _ = conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);");
        }
    }
}

/// Timestamps are stored as RFC3339 text but tolerate a couple of legacy
/// layouts on the way back out.
pub(crate) fn parse_datetime_safe(datetime_str: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(datetime_str) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(datetime_str, "%Y-%m-%d %H:%M:%S") {
        return Some(DateTime::from_naive_utc_and_offset(dt, Utc));
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(datetime_str, "%Y-%m-%d %H:%M:%S%.f") {
        return Some(DateTime::from_naive_utc_and_offset(dt, Utc));
    }
    None
}
