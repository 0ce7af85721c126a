use crate::store::parse_datetime_safe;
use crate::store::schema::{FeedbackEntry, FeedbackKind};
use chrono::Utc;
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, Row};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// Append-only log of feedback events. Rows are never updated or deleted;
/// the ruleset renderer reads the whole log back in arrival order.
pub struct RulebookStore {
    pool: Arc<Pool<SqliteConnectionManager>>,
}

impl RulebookStore {
    pub fn new(pool: Arc<Pool<SqliteConnectionManager>>) -> Self {
        Self { pool }
    }

    fn get_conn(&self) -> anyhow::Result<r2d2::PooledConnection<SqliteConnectionManager>> {
        self.pool
            .get()
            .map_err(|e| anyhow::anyhow!("Failed to get connection from pool: {}", e))
    }

    pub fn insert(
        &self,
        user_id: &str,
        chat_id: Option<&str>,
        message_id: Option<&str>,
        kind: FeedbackKind,
        original_content: &str,
        new_content: Option<&str>,
    ) -> anyhow::Result<FeedbackEntry> {
        let entry = FeedbackEntry {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            chat_id: chat_id.map(str::to_string),
            message_id: message_id.map(str::to_string),
            kind,
            original_content: original_content.to_string(),
            new_content: new_content.map(str::to_string),
            created_at: Utc::now(),
        };

        let conn = self.get_conn()?;
        conn.execute(
            "INSERT INTO rulebook
                 (id, user_id, chat_id, message_id, feedback_type,
                  original_content, new_content, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                entry.id,
                entry.user_id,
                entry.chat_id,
                entry.message_id,
                entry.kind.as_str(),
                entry.original_content,
                entry.new_content,
                entry.created_at.to_rfc3339()
            ],
        )?;

        info!(
            "Recorded {} feedback {} for user {}",
            kind.as_str(),
            entry.id,
            user_id
        );
        Ok(entry)
    }

    /// All feedback for a user, oldest first. This is the order the ruleset
    /// renderer emits rules in.
    pub fn for_user(&self, user_id: &str) -> anyhow::Result<Vec<FeedbackEntry>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, user_id, chat_id, message_id, feedback_type,
                    original_content, new_content, created_at
             FROM rulebook WHERE user_id = ?1 ORDER BY created_at ASC, rowid ASC",
        )?;
        let mut rows = stmt.query([user_id])?;
        let mut entries = Vec::new();

        while let Some(row) = rows.next()? {
            entries.push(Self::row_to_entry(row)?);
        }

        Ok(entries)
    }

    pub fn for_chat(&self, chat_id: &str) -> anyhow::Result<Vec<FeedbackEntry>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, user_id, chat_id, message_id, feedback_type,
                    original_content, new_content, created_at
             FROM rulebook WHERE chat_id = ?1 ORDER BY created_at ASC, rowid ASC",
        )?;
        let mut rows = stmt.query([chat_id])?;
        let mut entries = Vec::new();

        while let Some(row) = rows.next()? {
            entries.push(Self::row_to_entry(row)?);
        }

        Ok(entries)
    }

    fn row_to_entry(row: &Row) -> anyhow::Result<FeedbackEntry> {
        let kind_str: String = row.get(4)?;
        let kind = FeedbackKind::parse(&kind_str)
            .ok_or_else(|| anyhow::anyhow!("Unknown feedback type: {}", kind_str))?;

        let created_at = parse_datetime_safe(&row.get::<_, String>(7)?).unwrap_or_else(|| {
            warn!("Failed to parse feedback created_at");
            Utc::now()
        });

        Ok(FeedbackEntry {
            id: row.get(0)?,
            user_id: row.get(1)?,
            chat_id: row.get(2)?,
            message_id: row.get(3)?,
            kind,
            original_content: row.get(5)?,
            new_content: row.get(6)?,
            created_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::ChatDatabase;

    #[test]
    fn feedback_comes_back_oldest_first() {
        let db = ChatDatabase::new_in_memory().unwrap();
        db.rulebook
            .insert("user-1", None, None, FeedbackKind::Like, "good", None)
            .unwrap();
        db.rulebook
            .insert("user-1", None, None, FeedbackKind::Dislike, "bad", None)
            .unwrap();
        db.rulebook
            .insert(
                "user-1",
                None,
                None,
                FeedbackKind::Edit,
                "old",
                Some("new"),
            )
            .unwrap();

        let entries = db.rulebook.for_user("user-1").unwrap();
        let kinds: Vec<FeedbackKind> = entries.iter().map(|e| e.kind).collect();
        assert_eq!(
            kinds,
            vec![FeedbackKind::Like, FeedbackKind::Dislike, FeedbackKind::Edit]
        );
        assert_eq!(entries[2].new_content.as_deref(), Some("new"));
    }

    #[test]
    fn for_chat_filters_by_chat() {
        let db = ChatDatabase::new_in_memory().unwrap();
        db.rulebook
            .insert("user-1", Some("chat-a"), None, FeedbackKind::Like, "a", None)
            .unwrap();
        db.rulebook
            .insert("user-1", Some("chat-b"), None, FeedbackKind::Like, "b", None)
            .unwrap();
        db.rulebook
            .insert("user-1", None, None, FeedbackKind::Like, "c", None)
            .unwrap();

        let entries = db.rulebook.for_chat("chat-a").unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].original_content, "a");
    }
}
