use crate::store::parse_datetime_safe;
use crate::store::schema::ApiKey;
use chrono::Utc;
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, Row};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

pub struct KeyStore {
    pool: Arc<Pool<SqliteConnectionManager>>,
}

impl KeyStore {
    pub fn new(pool: Arc<Pool<SqliteConnectionManager>>) -> Self {
        Self { pool }
    }

    fn get_conn(&self) -> anyhow::Result<r2d2::PooledConnection<SqliteConnectionManager>> {
        self.pool
            .get()
            .map_err(|e| anyhow::anyhow!("Failed to get connection from pool: {}", e))
    }

    pub fn insert(&self, user_id: &str, name: &str, key_value: &str) -> anyhow::Result<ApiKey> {
        let key = ApiKey {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            name: name.to_string(),
            key_value: key_value.to_string(),
            enabled: true,
            created_at: Utc::now(),
        };

        let conn = self.get_conn()?;
        conn.execute(
            "INSERT INTO api_keys (id, user_id, name, key_value, enabled, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                key.id,
                key.user_id,
                key.name,
                key.key_value,
                key.enabled,
                key.created_at.to_rfc3339()
            ],
        )?;

        info!("Stored API key '{}' for user {}", name, user_id);
        Ok(key)
    }

    /// The credential to use for a user: the oldest enabled stored key, if
    /// any. Persona credentials take over only when this returns None.
    pub fn enabled_key_for_user(&self, user_id: &str) -> anyhow::Result<Option<String>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            "SELECT key_value FROM api_keys
             WHERE user_id = ?1 AND enabled = TRUE
             ORDER BY created_at ASC, rowid ASC LIMIT 1",
        )?;
        let mut rows = stmt.query([user_id])?;

        if let Some(row) = rows.next()? {
            Ok(Some(row.get(0)?))
        } else {
            Ok(None)
        }
    }

    pub fn list_for_user(&self, user_id: &str) -> anyhow::Result<Vec<ApiKey>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, user_id, name, key_value, enabled, created_at
             FROM api_keys WHERE user_id = ?1 ORDER BY created_at DESC",
        )?;
        let mut rows = stmt.query([user_id])?;
        let mut keys = Vec::new();

        while let Some(row) = rows.next()? {
            keys.push(Self::row_to_key(row)?);
        }

        Ok(keys)
    }

    pub fn set_enabled(&self, key_id: &str, enabled: bool) -> anyhow::Result<()> {
        let conn = self.get_conn()?;
        let updated = conn.execute(
            "UPDATE api_keys SET enabled = ?1 WHERE id = ?2",
            params![enabled, key_id],
        )?;

        if updated == 0 {
            return Err(anyhow::anyhow!("API key {} not found", key_id));
        }
        Ok(())
    }

    fn row_to_key(row: &Row) -> anyhow::Result<ApiKey> {
        let created_at = parse_datetime_safe(&row.get::<_, String>(5)?).unwrap_or_else(|| {
            warn!("Failed to parse api key created_at");
            Utc::now()
        });

        Ok(ApiKey {
            id: row.get(0)?,
            user_id: row.get(1)?,
            name: row.get(2)?,
            key_value: row.get(3)?,
            enabled: row.get(4)?,
            created_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::store::ChatDatabase;

    #[test]
    fn oldest_enabled_key_wins() {
        let db = ChatDatabase::new_in_memory().unwrap();
        let first = db.api_keys.insert("user-1", "first", "sk-one").unwrap();
        db.api_keys.insert("user-1", "second", "sk-two").unwrap();

        assert_eq!(
            db.api_keys.enabled_key_for_user("user-1").unwrap().as_deref(),
            Some("sk-one")
        );

        db.api_keys.set_enabled(&first.id, false).unwrap();
        assert_eq!(
            db.api_keys.enabled_key_for_user("user-1").unwrap().as_deref(),
            Some("sk-two")
        );
    }

    #[test]
    fn no_keys_means_no_credential() {
        let db = ChatDatabase::new_in_memory().unwrap();
        assert!(db.api_keys.enabled_key_for_user("user-1").unwrap().is_none());
    }
}
