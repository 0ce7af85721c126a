use crate::store::parse_datetime_safe;
use crate::store::schema::MessageRow;
use crate::store::ChangeFeed;
use chrono::Utc;
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, Row};
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

pub struct MessageStore {
    pool: Arc<Pool<SqliteConnectionManager>>,
    feed: ChangeFeed,
}

impl MessageStore {
    pub fn new(pool: Arc<Pool<SqliteConnectionManager>>, feed: ChangeFeed) -> Self {
        Self { pool, feed }
    }

    fn get_conn(&self) -> anyhow::Result<r2d2::PooledConnection<SqliteConnectionManager>> {
        self.pool
            .get()
            .map_err(|e| anyhow::anyhow!("Failed to get connection from pool: {}", e))
    }

    /// Inserts a message and publishes it to the change feed. The row id is
    /// assigned here; callers holding an optimistic local row should swap it
    /// for the returned one.
    pub fn insert(&self, chat_id: &str, role: &str, content: &str) -> anyhow::Result<MessageRow> {
        let row = MessageRow {
            id: Uuid::new_v4().to_string(),
            chat_id: chat_id.to_string(),
            role: role.to_string(),
            content: content.to_string(),
            created_at: Utc::now(),
        };

        let conn = self.get_conn()?;
        conn.execute(
            "INSERT INTO messages (id, chat_id, role, content, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                row.id,
                row.chat_id,
                row.role,
                row.content,
                row.created_at.to_rfc3339()
            ],
        )?;

        debug!("Inserted {} message {} in chat {}", role, row.id, chat_id);
        self.feed.publish(row.clone());
        Ok(row)
    }

    pub fn get(&self, message_id: &str) -> anyhow::Result<Option<MessageRow>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, chat_id, role, content, created_at FROM messages WHERE id = ?1",
        )?;
        let mut rows = stmt.query([message_id])?;

        if let Some(row) = rows.next()? {
            Ok(Some(Self::row_to_message(row)?))
        } else {
            Ok(None)
        }
    }

    /// Full transcript for a chat in insertion order. Rows that share a
    /// timestamp fall back to rowid order.
    pub fn for_chat(&self, chat_id: &str) -> anyhow::Result<Vec<MessageRow>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, chat_id, role, content, created_at
             FROM messages WHERE chat_id = ?1 ORDER BY created_at ASC, rowid ASC",
        )?;
        let mut rows = stmt.query([chat_id])?;
        let mut messages = Vec::new();

        while let Some(row) = rows.next()? {
            messages.push(Self::row_to_message(row)?);
        }

        Ok(messages)
    }

    pub fn count_for_chat(&self, chat_id: &str) -> anyhow::Result<usize> {
        let conn = self.get_conn()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM messages WHERE chat_id = ?1",
            [chat_id],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    fn row_to_message(row: &Row) -> anyhow::Result<MessageRow> {
        let created_at = parse_datetime_safe(&row.get::<_, String>(4)?).unwrap_or_else(|| {
            warn!("Failed to parse message created_at");
            Utc::now()
        });

        Ok(MessageRow {
            id: row.get(0)?,
            chat_id: row.get(1)?,
            role: row.get(2)?,
            content: row.get(3)?,
            created_at,
        })
    }
}
