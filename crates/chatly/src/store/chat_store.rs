use crate::store::parse_datetime_safe;
use crate::store::schema::{Chat, Persona};
use chrono::Utc;
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, Row};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

pub struct ChatStore {
    pool: Arc<Pool<SqliteConnectionManager>>,
}

impl ChatStore {
    pub fn new(pool: Arc<Pool<SqliteConnectionManager>>) -> Self {
        Self { pool }
    }

    fn get_conn(&self) -> anyhow::Result<r2d2::PooledConnection<SqliteConnectionManager>> {
        self.pool
            .get()
            .map_err(|e| anyhow::anyhow!("Failed to get connection from pool: {}", e))
    }

    pub fn create(
        &self,
        user_id: &str,
        title: Option<&str>,
        persona: Option<&Persona>,
    ) -> anyhow::Result<Chat> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now();
        let persona_json = persona.map(serde_json::to_string).transpose()?;

        let conn = self.get_conn()?;
        conn.execute(
            "INSERT INTO chats (id, user_id, title, persona, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![id, user_id, title, persona_json, now.to_rfc3339()],
        )?;

        info!("Created chat {} for user {}", id, user_id);
        Ok(Chat {
            id,
            user_id: user_id.to_string(),
            title: title.map(str::to_string),
            persona: persona.cloned(),
            created_at: now,
        })
    }

    pub fn get(&self, chat_id: &str) -> anyhow::Result<Option<Chat>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, user_id, title, persona, created_at FROM chats WHERE id = ?1",
        )?;
        let mut rows = stmt.query([chat_id])?;

        if let Some(row) = rows.next()? {
            Ok(Some(Self::row_to_chat(row)?))
        } else {
            Ok(None)
        }
    }

    pub fn list_for_user(&self, user_id: &str) -> anyhow::Result<Vec<Chat>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, user_id, title, persona, created_at
             FROM chats WHERE user_id = ?1 ORDER BY created_at DESC",
        )?;
        let mut rows = stmt.query([user_id])?;
        let mut chats = Vec::new();

        while let Some(row) = rows.next()? {
            chats.push(Self::row_to_chat(row)?);
        }

        Ok(chats)
    }

    pub fn update_title(&self, chat_id: &str, title: &str) -> anyhow::Result<()> {
        let conn = self.get_conn()?;
        let updated = conn.execute(
            "UPDATE chats SET title = ?1 WHERE id = ?2",
            params![title, chat_id],
        )?;

        if updated == 0 {
            return Err(anyhow::anyhow!("Chat {} not found", chat_id));
        }
        info!("Updated chat {} title to: {}", chat_id, title);
        Ok(())
    }

    pub fn delete(&self, chat_id: &str) -> anyhow::Result<usize> {
        let conn = self.get_conn()?;
        let deleted = conn.execute("DELETE FROM chats WHERE id = ?1", [chat_id])?;
        info!("Deleted chat {}", chat_id);
        Ok(deleted)
    }

    fn row_to_chat(row: &Row) -> anyhow::Result<Chat> {
        let persona_json: Option<String> = row.get(3)?;
        let persona = persona_json
            .as_deref()
            .map(serde_json::from_str::<Persona>)
            .transpose()
            .map_err(|e| anyhow::anyhow!("Persona JSON error: {}", e))?;

        let created_at = parse_datetime_safe(&row.get::<_, String>(4)?).unwrap_or_else(|| {
            warn!("Failed to parse chat created_at");
            Utc::now()
        });

        Ok(Chat {
            id: row.get(0)?,
            user_id: row.get(1)?,
            title: row.get(2)?,
            persona,
            created_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::store::ChatDatabase;
    use crate::store::schema::Persona;

    #[test]
    fn create_and_fetch_round_trips_the_persona() {
        let db = ChatDatabase::new_in_memory().unwrap();
        let persona = Persona {
            role: Some("helper".into()),
            tone: Some("friendly".into()),
            api_key: Some("sk-abc".into()),
            ..Default::default()
        };
        let chat = db
            .chats
            .create("user-1", Some("My chat"), Some(&persona))
            .unwrap();

        let fetched = db.chats.get(&chat.id).unwrap().unwrap();
        assert_eq!(fetched.title.as_deref(), Some("My chat"));
        assert_eq!(fetched.persona, Some(persona));
    }

    #[test]
    fn list_is_scoped_to_the_owner() {
        let db = ChatDatabase::new_in_memory().unwrap();
        db.chats.create("user-1", Some("a"), None).unwrap();
        db.chats.create("user-1", Some("b"), None).unwrap();
        db.chats.create("user-2", Some("c"), None).unwrap();

        assert_eq!(db.chats.list_for_user("user-1").unwrap().len(), 2);
        assert_eq!(db.chats.list_for_user("user-2").unwrap().len(), 1);
        assert!(db.chats.list_for_user("user-3").unwrap().is_empty());
    }

    #[test]
    fn update_title_on_missing_chat_is_an_error() {
        let db = ChatDatabase::new_in_memory().unwrap();
        assert!(db.chats.update_title("nope", "title").is_err());
    }

    #[test]
    fn delete_returns_the_number_of_rows_removed() {
        let db = ChatDatabase::new_in_memory().unwrap();
        let chat = db.chats.create("user-1", None, None).unwrap();
        assert_eq!(db.chats.delete(&chat.id).unwrap(), 1);
        assert_eq!(db.chats.delete(&chat.id).unwrap(), 0);
    }
}
